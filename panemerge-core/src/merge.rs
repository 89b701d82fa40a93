//! Template merger.
//!
//! Combines a rendered source document with a page template:
//! map sections are recorded in document order, one widget pane is created per
//! section under the template's data pane, plot widgets and figure/data-pane
//! elements are re-parented into the pane of their enclosing section, the
//! heading and title are carried over, and the remaining source container is
//! appended into the template's content slot.
//!
//! Section-to-pane association is positional: pane N hosts the widgets of the
//! Nth recorded section. A widget outside every recorded section is left in
//! place and logged; a template missing an anchor slot aborts the job.

use std::rc::Rc;

use anyhow::{bail, Result};
use markup5ever_rcdom::{Handle, RcDom};

use crate::dom::{self, Selector};

/// Heading-level container that delimits one section of the source document.
const SECTION_SELECTOR: &str = ".section.level2";

/// Widget class that marks a section as a map section.
const MAP_WIDGET_SELECTOR: &str = ".leaflet";

/// Elements relocated from the source into widget panes, queried in this
/// order.
const MOVE_SELECTORS: &[&str] = &[".plotly", ".figure", ".data-pane"];

/// Template slot receiving the widget panes.
const DATA_PANE_SLOT: &str = ".mxcw-data";

/// Template slot receiving the source container.
const CONTENT_SLOT: &str = ".mxcw-content";

/// Source container appended into the content slot; falls back to `body`.
const MAIN_CONTAINER: &str = ".main-container";

/// Class given to each created widget pane.
const WIDGET_PANE_CLASS: &str = "widget-pane";

/// Attribute carrying the section index on panes and moved widgets.
pub const SECTION_ATTR: &str = "data-section";

/// Result of one merge: the re-parented source container plus move counts.
#[derive(Debug)]
pub struct MergeOutcome {
    /// The source container now living in the template's content slot. Handed
    /// to transforms after the merge.
    pub container: Handle,
    /// Number of recorded map sections (equals the number of panes created).
    pub sections: usize,
    /// Widgets relocated into panes.
    pub moved: usize,
    /// Widgets left in place because no recorded section encloses them.
    pub skipped: usize,
}

/// Merge `source` into `template` in place.
///
/// All template anchors are resolved up front, so a structurally invalid
/// template fails before either tree is touched.
pub fn merge_documents(source: &RcDom, template: &RcDom) -> Result<MergeOutcome> {
    let template_root = &template.document;
    let source_root = &source.document;

    let data_pane = require_anchor(template_root, DATA_PANE_SLOT)?;
    let content_slot = require_anchor(template_root, CONTENT_SLOT)?;
    require_anchor(template_root, "head")?;
    let template_h1 = require_anchor(template_root, "h1")?;
    let template_title = require_anchor(template_root, "title")?;

    let sections = collect_map_sections(source_root)?;

    // One fresh pane per section, appended in section order.
    let mut panes = Vec::with_capacity(sections.len());
    for (index, section) in sections.iter().enumerate() {
        dom::remove_attr(section, "style");
        let pane = dom::new_element("div", &[WIDGET_PANE_CLASS]);
        dom::set_attr(&pane, SECTION_ATTR, &index.to_string());
        dom::append_child(&data_pane, &pane);
        panes.push(pane);
    }

    // Resolve every widget's section before any move; moving a parent first
    // would sever the ancestor chain of a nested match.
    let mut moved = 0;
    let mut skipped = 0;
    let mut placements = Vec::new();
    for widget in elements_to_move(source_root)? {
        match enclosing_section_index(&widget, &sections) {
            Some(index) => placements.push((widget, index)),
            None => {
                eprintln!(
                    "warning: skipping {} outside any map section",
                    dom::describe(&widget)
                );
                skipped += 1;
            }
        }
    }
    for (widget, index) in placements {
        dom::set_attr(&widget, SECTION_ATTR, &index.to_string());
        dom::append_child(&panes[index], &widget);
        moved += 1;
    }

    transfer_heading(source_root, &template_h1)?;
    transfer_title(source_root, &template_title)?;

    let container = source_container(source_root)?;
    dom::append_child(&content_slot, &container);

    Ok(MergeOutcome {
        container,
        sections: sections.len(),
        moved,
        skipped,
    })
}

fn require_anchor(template_root: &Handle, selector: &str) -> Result<Handle> {
    match dom::select_first(template_root, &Selector::parse(selector)?) {
        Some(node) => Ok(node),
        None => bail!("template is missing required anchor: {}", selector),
    }
}

/// Sections containing a map widget, in document order.
fn collect_map_sections(source_root: &Handle) -> Result<Vec<Handle>> {
    let map_widget = Selector::parse(MAP_WIDGET_SELECTOR)?;
    Ok(dom::select_all(source_root, &Selector::parse(SECTION_SELECTOR)?)
        .into_iter()
        .filter(|section| dom::select_first(section, &map_widget).is_some())
        .collect())
}

/// All to-move elements in the source, deduplicated, in first-match order.
fn elements_to_move(source_root: &Handle) -> Result<Vec<Handle>> {
    let mut found: Vec<Handle> = Vec::new();
    for selector in MOVE_SELECTORS {
        for widget in dom::select_all(source_root, &Selector::parse(selector)?) {
            if !found.iter().any(|seen| Rc::ptr_eq(seen, &widget)) {
                found.push(widget);
            }
        }
    }
    Ok(found)
}

/// Index of the nearest enclosing recorded section, if any.
fn enclosing_section_index(widget: &Handle, sections: &[Handle]) -> Option<usize> {
    let mut current = dom::parent_of(widget);
    while let Some(node) = current {
        if let Some(index) = sections.iter().position(|s| Rc::ptr_eq(s, &node)) {
            return Some(index);
        }
        current = dom::parent_of(&node);
    }
    None
}

/// Replace the template heading with the source heading's content and drop
/// the source node. A source without a heading leaves the template's as is.
fn transfer_heading(source_root: &Handle, template_h1: &Handle) -> Result<()> {
    if let Some(source_h1) = dom::select_first(source_root, &Selector::parse("h1")?) {
        dom::clear_children(template_h1);
        dom::move_children(&source_h1, template_h1);
        dom::detach(&source_h1);
    }
    Ok(())
}

fn transfer_title(source_root: &Handle, template_title: &Handle) -> Result<()> {
    if let Some(source_title) = dom::select_first(source_root, &Selector::parse("title")?) {
        dom::set_text(template_title, &dom::text_content(&source_title));
        dom::detach(&source_title);
    }
    Ok(())
}

/// The source's main container, or its `body` when the document was rendered
/// without one.
fn source_container(source_root: &Handle) -> Result<Handle> {
    let main = dom::select_first(source_root, &Selector::parse(MAIN_CONTAINER)?);
    let body = dom::select_first(source_root, &Selector::parse("body")?);
    Ok(main.or(body).unwrap_or_else(|| source_root.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    const TEMPLATE: &str = r#"<!DOCTYPE html>
        <html><head><title>Template</title></head>
        <body>
          <h1>placeholder</h1>
          <div class="mxcw-content"></div>
          <div class="mxcw-data"></div>
        </body></html>"#;

    const SOURCE: &str = r#"<!DOCTYPE html>
        <html><head><title>Bird Atlas</title></head>
        <body><div class="container-fluid main-container">
          <h1>Bird <em>Atlas</em></h1>
          <div class="section level2" style="margin: 0" id="s0">
            <div class="leaflet" id="map0"></div>
          </div>
          <div class="section level2" id="s1">
            <div class="leaflet" id="map1"></div>
            <div class="plotly" id="plot1"></div>
          </div>
        </div></body></html>"#;

    fn panes_of(template: &RcDom) -> Vec<Handle> {
        let data = dom::select_first(
            &template.document,
            &Selector::parse(DATA_PANE_SLOT).unwrap(),
        )
        .unwrap();
        let panes = data.children.borrow().clone();
        panes
    }

    #[test]
    fn test_one_pane_per_section_in_order() {
        let source = parse_html(SOURCE);
        let template = parse_html(TEMPLATE);
        let outcome = merge_documents(&source, &template).unwrap();

        assert_eq!(outcome.sections, 2);
        let panes = panes_of(&template);
        assert_eq!(panes.len(), 2);
        for (index, pane) in panes.iter().enumerate() {
            assert!(dom::has_class(pane, WIDGET_PANE_CLASS));
            assert_eq!(
                dom::attr(pane, SECTION_ATTR).as_deref(),
                Some(index.to_string().as_str())
            );
        }
    }

    #[test]
    fn test_plotly_moves_into_second_pane_tagged_one() {
        let source = parse_html(SOURCE);
        let template = parse_html(TEMPLATE);
        let outcome = merge_documents(&source, &template).unwrap();

        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.skipped, 0);

        let panes = panes_of(&template);
        assert!(panes[0].children.borrow().is_empty());
        let moved = panes[1].children.borrow()[0].clone();
        assert_eq!(dom::attr(&moved, "id").as_deref(), Some("plot1"));
        assert_eq!(dom::attr(&moved, SECTION_ATTR).as_deref(), Some("1"));

        // The section in the content slot no longer holds the widget.
        let s1 = dom::select_all(&template.document, &Selector::parse(".section").unwrap())
            .into_iter()
            .find(|n| dom::attr(n, "id").as_deref() == Some("s1"))
            .unwrap();
        assert!(dom::select_first(&s1, &Selector::parse(".plotly").unwrap()).is_none());
    }

    #[test]
    fn test_sections_lose_inline_style() {
        let source = parse_html(SOURCE);
        let template = parse_html(TEMPLATE);
        merge_documents(&source, &template).unwrap();

        let s0 = dom::select_all(&template.document, &Selector::parse(".section").unwrap())
            .into_iter()
            .find(|n| dom::attr(n, "id").as_deref() == Some("s0"))
            .unwrap();
        assert_eq!(dom::attr(&s0, "style"), None);
    }

    #[test]
    fn test_widget_outside_sections_is_left_unmoved() {
        let html = r#"<html><head><title>t</title></head>
            <body><div class="main-container">
              <h1>t</h1>
              <div class="section level2"><div class="leaflet"></div></div>
              <div class="plotly" id="stray"></div>
            </div></body></html>"#;
        let source = parse_html(html);
        let template = parse_html(TEMPLATE);
        let outcome = merge_documents(&source, &template).unwrap();

        assert_eq!(outcome.moved, 0);
        assert_eq!(outcome.skipped, 1);

        // Still inside the relocated container, untagged.
        let stray =
            dom::select_first(&outcome.container, &Selector::parse(".plotly").unwrap()).unwrap();
        assert_eq!(dom::attr(&stray, "id").as_deref(), Some("stray"));
        assert_eq!(dom::attr(&stray, SECTION_ATTR), None);
        assert!(panes_of(&template)[0].children.borrow().is_empty());
    }

    #[test]
    fn test_section_without_map_widget_is_not_recorded() {
        let html = r#"<html><head><title>t</title></head>
            <body><div class="main-container">
              <h1>t</h1>
              <div class="section level2" id="text-only"><p>prose</p></div>
              <div class="section level2" id="mapped">
                <div class="leaflet"></div><div class="plotly" id="p"></div>
              </div>
            </div></body></html>"#;
        let source = parse_html(html);
        let template = parse_html(TEMPLATE);
        let outcome = merge_documents(&source, &template).unwrap();

        // Only the mapped section gets a pane, at index 0.
        assert_eq!(outcome.sections, 1);
        let panes = panes_of(&template);
        assert_eq!(panes.len(), 1);
        let moved = panes[0].children.borrow()[0].clone();
        assert_eq!(dom::attr(&moved, "id").as_deref(), Some("p"));
        assert_eq!(dom::attr(&moved, SECTION_ATTR).as_deref(), Some("0"));
    }

    #[test]
    fn test_heading_and_title_transfer() {
        let source = parse_html(SOURCE);
        let template = parse_html(TEMPLATE);
        merge_documents(&source, &template).unwrap();

        let h1 =
            dom::select_first(&template.document, &Selector::parse("h1").unwrap()).unwrap();
        assert_eq!(dom::text_content(&h1), "Bird Atlas");
        let title =
            dom::select_first(&template.document, &Selector::parse("title").unwrap()).unwrap();
        assert_eq!(dom::text_content(&title), "Bird Atlas");

        // The source heading moved out of the container, not a copy of it.
        let content = dom::select_first(
            &template.document,
            &Selector::parse(CONTENT_SLOT).unwrap(),
        )
        .unwrap();
        let headings = dom::select_all(&content, &Selector::parse("h1").unwrap());
        assert!(headings.is_empty());
    }

    #[test]
    fn test_container_lands_in_content_slot_once() {
        let source = parse_html(SOURCE);
        let template = parse_html(TEMPLATE);
        merge_documents(&source, &template).unwrap();

        let out = dom::serialize_html(&template).unwrap();
        assert_eq!(out.matches("main-container").count(), 1);

        let reparsed = parse_html(&out);
        let content = dom::select_first(
            &reparsed.document,
            &Selector::parse(CONTENT_SLOT).unwrap(),
        )
        .unwrap();
        assert_eq!(content.children.borrow().len(), 1);
    }

    #[test]
    fn test_missing_data_pane_anchor_is_fatal() {
        let template = parse_html(
            r#"<html><head><title>t</title></head>
               <body><h1>t</h1><div class="mxcw-content"></div></body></html>"#,
        );
        let source = parse_html(SOURCE);
        let err = merge_documents(&source, &template).unwrap_err();
        assert!(err.to_string().contains(".mxcw-data"));
    }

    #[test]
    fn test_missing_heading_anchor_is_fatal() {
        let template = parse_html(
            r#"<html><head><title>t</title></head>
               <body><div class="mxcw-content"></div><div class="mxcw-data"></div></body></html>"#,
        );
        let source = parse_html(SOURCE);
        assert!(merge_documents(&source, &template).is_err());
    }

    #[test]
    fn test_figure_and_data_pane_elements_move_too() {
        let html = r#"<html><head><title>t</title></head>
            <body><div class="main-container">
              <h1>t</h1>
              <div class="section level2">
                <div class="leaflet"></div>
                <div class="figure" id="f"></div>
                <div class="data-pane" id="d"></div>
              </div>
            </div></body></html>"#;
        let source = parse_html(html);
        let template = parse_html(TEMPLATE);
        let outcome = merge_documents(&source, &template).unwrap();

        assert_eq!(outcome.moved, 2);
        let panes = panes_of(&template);
        let ids: Vec<String> = panes[0]
            .children
            .borrow()
            .iter()
            .filter_map(|n| dom::attr(n, "id"))
            .collect();
        assert_eq!(ids, vec!["f", "d"]);
    }
}
