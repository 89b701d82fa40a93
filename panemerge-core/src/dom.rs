//! DOM layer over html5ever's reference DOM.
//!
//! Documents are parsed into mutable `markup5ever_rcdom` trees and rewritten in
//! place. Elements move between trees by re-parenting; no node is ever copied.
//!
//! Selector support is deliberately small: a tag name, a class list, or both
//! (`h1`, `.leaflet`, `div.section.level2`). That covers every query the merge
//! pipeline makes.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, parse_document, Attribute, LocalName, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

/// A compiled selector: optional tag name plus zero or more required classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    /// Parse a selector string.
    ///
    /// Accepted forms: `tag`, `.class`, `tag.class1.class2`. Combinators,
    /// attribute selectors, ids, and pseudo-classes are rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("empty selector");
        }
        if input
            .chars()
            .any(|c| c.is_whitespace() || "#[]>+~:*,".contains(c))
        {
            bail!("unsupported selector: {}", input);
        }

        let mut parts = input.split('.');
        let first = parts.next().unwrap_or("");
        let tag = if first.is_empty() {
            None
        } else {
            Some(first.to_ascii_lowercase())
        };

        let mut classes = Vec::new();
        for class in parts {
            if class.is_empty() {
                bail!("unsupported selector: {}", input);
            }
            classes.push(class.to_string());
        }

        if tag.is_none() && classes.is_empty() {
            bail!("empty selector");
        }

        Ok(Selector { tag, classes })
    }

    /// Check whether a node is an element matching this selector.
    pub fn matches(&self, node: &Handle) -> bool {
        if let Some(ref tag) = self.tag {
            match tag_name(node) {
                Some(name) if name == *tag => {}
                _ => return false,
            }
        } else if !is_element(node) {
            return false;
        }
        self.classes.iter().all(|class| has_class(node, class))
    }
}

/// Parse an HTML string into a fresh document tree.
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

/// Read and parse an HTML file.
pub fn load_html(path: &Path) -> Result<RcDom> {
    let html = fs::read_to_string(path)
        .with_context(|| format!("failed to read document: {}", path.display()))?;
    Ok(parse_html(&html))
}

/// Serialize a document to an HTML string prefixed with a doctype declaration.
///
/// Any doctype node already in the tree is dropped first so the declaration
/// appears exactly once.
pub fn serialize_html(dom: &RcDom) -> Result<String> {
    dom.document
        .children
        .borrow_mut()
        .retain(|child| !matches!(child.data, NodeData::Doctype { .. }));

    let mut bytes = Vec::new();
    let handle: SerializableHandle = dom.document.clone().into();
    serialize(&mut bytes, &handle, SerializeOpts::default())
        .context("failed to serialize document")?;
    let body = String::from_utf8(bytes).context("serialized document is not valid UTF-8")?;
    Ok(format!("<!DOCTYPE html>\n{}", body))
}

/// Serialize a document and write it to disk as UTF-8, creating parent
/// directories as needed.
pub fn write_html(dom: &RcDom, path: &Path) -> Result<()> {
    let html = serialize_html(dom)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(path, html).with_context(|| format!("failed to write: {}", path.display()))
}

/// Collect all elements under `root` (inclusive) matching `selector`, in
/// document order.
pub fn select_all(root: &Handle, selector: &Selector) -> Vec<Handle> {
    let mut found = Vec::new();
    walk(root, &mut |node| {
        if selector.matches(node) {
            found.push(node.clone());
        }
    });
    found
}

/// First element under `root` (inclusive) matching `selector`, in document
/// order.
pub fn select_first(root: &Handle, selector: &Selector) -> Option<Handle> {
    select_all(root, selector).into_iter().next()
}

fn walk(node: &Handle, visit: &mut impl FnMut(&Handle)) {
    visit(node);
    for child in node.children.borrow().iter() {
        walk(child, visit);
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// Lowercase local tag name, or `None` for non-element nodes.
pub fn tag_name(node: &Handle) -> Option<String> {
    match node.data {
        NodeData::Element { ref name, .. } => Some(name.local.to_ascii_lowercase().to_string()),
        _ => None,
    }
}

/// Value of an attribute, by local name.
pub fn attr(node: &Handle, name: &str) -> Option<String> {
    match node.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref() == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Set an attribute, replacing any existing value.
pub fn set_attr(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { ref attrs, .. } = node.data {
        let mut attrs = attrs.borrow_mut();
        if let Some(existing) = attrs.iter_mut().find(|a| a.name.local.as_ref() == name) {
            existing.value = StrTendril::from(value);
            return;
        }
        attrs.push(Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name)),
            value: StrTendril::from(value),
        });
    }
}

/// Remove an attribute if present.
pub fn remove_attr(node: &Handle, name: &str) {
    if let NodeData::Element { ref attrs, .. } = node.data {
        attrs.borrow_mut().retain(|a| a.name.local.as_ref() != name);
    }
}

/// Check membership in the element's space-separated class list.
pub fn has_class(node: &Handle, class: &str) -> bool {
    attr(node, "class").is_some_and(|v| v.split_whitespace().any(|c| c == class))
}

/// The node's parent element, if attached.
pub fn parent_of(node: &Handle) -> Option<Handle> {
    // Cell<Option<Weak>> has no borrow; take and restore.
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

/// Detach a node from its parent, leaving it parentless.
pub fn detach(node: &Handle) {
    if let Some(parent) = parent_of(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// Re-parent `child` as the last child of `parent`.
pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// Move all children of `from` to the end of `to`, preserving order.
pub fn move_children(from: &Handle, to: &Handle) {
    let children: Vec<Handle> = from.children.borrow().clone();
    for child in children {
        append_child(to, &child);
    }
}

/// Remove all children of a node.
pub fn clear_children(node: &Handle) {
    let children: Vec<Handle> = node.children.borrow().clone();
    for child in children {
        detach(&child);
    }
}

/// Create a detached element in the HTML namespace.
pub fn new_element(tag: &str, classes: &[&str]) -> Handle {
    let node = Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(Vec::new()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    });
    if !classes.is_empty() {
        set_attr(&node, "class", &classes.join(" "));
    }
    node
}

/// Create a detached text node.
pub fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// Concatenated text of the node and all its descendants.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    walk(node, &mut |n| {
        if let NodeData::Text { ref contents } = n.data {
            out.push_str(&contents.borrow());
        }
    });
    out
}

/// Replace a node's children with a single text node.
pub fn set_text(node: &Handle, text: &str) {
    clear_children(node);
    append_child(node, &new_text(text));
}

/// Short human-readable description of an element, for diagnostics.
pub fn describe(node: &Handle) -> String {
    let tag = tag_name(node).unwrap_or_else(|| "#node".to_string());
    match attr(node, "class") {
        Some(classes) if !classes.is_empty() => {
            format!("<{} class=\"{}\">", tag, classes)
        }
        _ => format!("<{}>", tag),
    }
}
