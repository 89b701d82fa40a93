//! Panemerge core library - merges rendered HTML widget documents into a fixed page template

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Jobs run strictly sequentially; the first unhandled error aborts the run
// - Each job parses its own fresh document pair; no state crosses jobs
// - Widgets move by re-parenting, never by copy
// - Section-to-pane association is positional: pane N hosts section N's widgets
// - Identical input yields byte-for-byte identical output

pub mod assets;
pub mod config;
pub mod dom;
pub mod merge;
pub mod panes;
pub mod transform;

pub use config::{load_build_config, BuildConfig};
pub use transform::TransformRegistry;

use std::path::Path;

use anyhow::{Context, Result};

use config::MergeJob;
use merge::MergeOutcome;

/// Counters accumulated over one full build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub jobs: usize,
    pub copies: usize,
    pub widgets_moved: usize,
    pub widgets_skipped: usize,
}

/// Run every merge job, then every copy job, strictly in config order.
///
/// Relative paths in the config resolve against `base_dir` (the config file's
/// directory). There is no partial-failure isolation: the first error aborts
/// the whole run, and later jobs do not execute.
pub fn run_build(
    config: &BuildConfig,
    base_dir: &Path,
    registry: &TransformRegistry,
) -> Result<BuildSummary> {
    let mut summary = BuildSummary::default();

    for job in &config.jobs {
        let outcome = run_merge_job(job, base_dir, registry)
            .with_context(|| format!("merge job failed for output: {}", job.output.display()))?;
        summary.jobs += 1;
        summary.widgets_moved += outcome.moved;
        summary.widgets_skipped += outcome.skipped;
    }

    for copy in &config.copies {
        assets::run_copy_job(copy, base_dir)
            .with_context(|| format!("copy job failed for: {}", copy.to.display()))?;
        summary.copies += 1;
    }

    Ok(summary)
}

/// One merge job: load both documents, merge, transform, attach pane data,
/// write. Nothing is written unless every step succeeds.
fn run_merge_job(
    job: &MergeJob,
    base_dir: &Path,
    registry: &TransformRegistry,
) -> Result<MergeOutcome> {
    let input_path = base_dir.join(&job.input);
    let template_path = base_dir.join(&job.template);
    let output_path = base_dir.join(&job.output);

    let source = dom::load_html(&input_path)?;
    let template = dom::load_html(&template_path)?;

    let outcome = merge::merge_documents(&source, &template)?;

    registry.run(&job.transforms, &template.document, &outcome.container)?;

    let data_dir = input_path.parent().unwrap_or(base_dir);
    panes::attach_pane_data(&template, &job.pane_handlers, data_dir)?;

    dom::write_html(&template, &output_path)?;

    Ok(outcome)
}
