//! Post-merge transform pipeline.
//!
//! Transforms are externally supplied code. Instead of loading them
//! dynamically by name from disk, callers register functions under a name and
//! jobs reference those names in their config. Each transform receives the
//! full template document and the original source container, and runs to
//! completion before the next one starts.

use std::collections::HashMap;

use anyhow::{Context, Result};
use markup5ever_rcdom::Handle;

/// A registered transform: (template document, source container).
pub type TransformFn = Box<dyn Fn(&Handle, &Handle) -> Result<()>>;

/// Name-to-function registry of available transforms.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform under a name, replacing any previous registration.
    pub fn register<F>(&mut self, name: &str, transform: F)
    where
        F: Fn(&Handle, &Handle) -> Result<()> + 'static,
    {
        self.transforms.insert(name.to_string(), Box::new(transform));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Run the named transforms strictly in the order given. A name with no
    /// registration is fatal; so is a transform error.
    pub fn run(&self, names: &[String], template: &Handle, container: &Handle) -> Result<()> {
        for name in names {
            let transform = self
                .transforms
                .get(name)
                .with_context(|| format!("unknown transform: {}", name))?;
            transform(template, container).with_context(|| format!("transform failed: {}", name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_transforms_run_in_config_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TransformRegistry::new();
        for name in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            registry.register(name, move |_, _| {
                order.borrow_mut().push(name);
                Ok(())
            });
        }

        let doc = dom::parse_html("<html><body></body></html>");
        let names: Vec<String> = ["third", "first", "second"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        registry
            .run(&names, &doc.document, &doc.document)
            .unwrap();
        assert_eq!(*order.borrow(), vec!["third", "first", "second"]);
    }

    #[test]
    fn test_unknown_transform_is_fatal() {
        let registry = TransformRegistry::new();
        let doc = dom::parse_html("<html><body></body></html>");
        let err = registry
            .run(&["missing".to_string()], &doc.document, &doc.document)
            .unwrap_err();
        assert!(err.to_string().contains("unknown transform"));
    }

    #[test]
    fn test_transform_error_stops_the_pipeline() {
        let ran_after = Rc::new(RefCell::new(false));
        let mut registry = TransformRegistry::new();
        registry.register("boom", |_, _| anyhow::bail!("exploded"));
        {
            let ran_after = Rc::clone(&ran_after);
            registry.register("after", move |_, _| {
                *ran_after.borrow_mut() = true;
                Ok(())
            });
        }

        let doc = dom::parse_html("<html><body></body></html>");
        let names: Vec<String> = ["boom", "after"].iter().map(|s| s.to_string()).collect();
        assert!(registry.run(&names, &doc.document, &doc.document).is_err());
        assert!(!*ran_after.borrow());
    }

    #[test]
    fn test_transform_sees_both_handles() {
        let mut registry = TransformRegistry::new();
        registry.register("tag-container", |template, container| {
            dom::set_attr(container, "data-transformed", "yes");
            assert!(dom::select_first(
                template,
                &dom::Selector::parse("body").unwrap()
            )
            .is_some());
            Ok(())
        });

        let doc = dom::parse_html(r#"<html><body><div class="c"></div></body></html>"#);
        let container =
            dom::select_first(&doc.document, &dom::Selector::parse(".c").unwrap()).unwrap();
        registry
            .run(&["tag-container".to_string()], &doc.document, &container)
            .unwrap();
        assert_eq!(
            dom::attr(&container, "data-transformed").as_deref(),
            Some("yes")
        );
    }
}
