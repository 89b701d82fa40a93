//! Pane-data integrator.
//!
//! Each pane handler entry in a job's config may have a JSON side-data file
//! named `<key>-plotData.json` next to the input document. The side data is
//! merged over the handler's own fields, minus a few denylisted fields that
//! belong to the analysis pipeline rather than the page. The combined map is
//! serialized into a generated `<script>` element in the template's head as
//! an assignment to `window.paneHandlers`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use markup5ever_rcdom::RcDom;
use serde_json::Value;

use crate::dom::{self, Selector};

/// Side-data fields never carried into the page.
const EXCLUDED_FIELDS: &[&str] = &["palette", "taxa"];

/// Global the combined handler map is assigned to.
pub const GLOBAL_NAME: &str = "paneHandlers";

/// Merge side data into each handler and append the combined script element
/// to the template's head. A missing side-data file is logged and the handler
/// keeps only its own fields; a present-but-malformed one is fatal.
pub fn attach_pane_data(
    template: &RcDom,
    handlers: &BTreeMap<String, Value>,
    data_dir: &Path,
) -> Result<()> {
    if handlers.is_empty() {
        return Ok(());
    }

    let head = dom::select_first(&template.document, &Selector::parse("head")?)
        .context("template has no head element")?;

    let mut combined = serde_json::Map::new();
    for (key, handler) in handlers {
        combined.insert(key.clone(), Value::Object(merged_entry(key, handler, data_dir)?));
    }

    let payload = format!(
        "window.{} = {};",
        GLOBAL_NAME,
        serde_json::to_string(&Value::Object(combined)).context("failed to serialize pane data")?
    );
    let script = dom::new_element("script", &[]);
    dom::append_child(&script, &dom::new_text(&payload));
    dom::append_child(&head, &script);
    Ok(())
}

/// One handler's fields with its side data merged over them.
fn merged_entry(
    key: &str,
    handler: &Value,
    data_dir: &Path,
) -> Result<serde_json::Map<String, Value>> {
    let mut entry = handler
        .as_object()
        .cloned()
        .with_context(|| format!("pane handler is not a JSON object: {}", key))?;

    let side_path = data_dir.join(format!("{}-plotData.json", key));
    if !side_path.exists() {
        eprintln!(
            "warning: no side data for pane {} (expected {})",
            key,
            side_path.display()
        );
        return Ok(entry);
    }

    let raw = fs::read_to_string(&side_path)
        .with_context(|| format!("failed to read side data: {}", side_path.display()))?;
    let side: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse side data: {}", side_path.display()))?;
    let side = side
        .as_object()
        .with_context(|| format!("side data is not a JSON object: {}", side_path.display()))?;

    for (field, value) in side {
        if EXCLUDED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        entry.insert(field.clone(), value.clone());
    }
    Ok(entry)
}
