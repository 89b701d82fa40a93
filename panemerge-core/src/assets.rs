//! Auxiliary file copy jobs.
//!
//! A copy job either copies a file byte-for-byte or, when substitutions are
//! configured, reads it as UTF-8, applies each `find`/`replace` pair in
//! order, and writes the result. Copy jobs run after all merge jobs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::CopyJob;

/// Run one copy job with paths resolved against `base_dir`.
pub fn run_copy_job(job: &CopyJob, base_dir: &Path) -> Result<()> {
    let from = base_dir.join(&job.from);
    let to = base_dir.join(&job.to);

    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
    }

    if job.replace.is_empty() {
        fs::copy(&from, &to).with_context(|| {
            format!("failed to copy {} to {}", from.display(), to.display())
        })?;
        return Ok(());
    }

    let mut text = fs::read_to_string(&from)
        .with_context(|| format!("failed to read: {}", from.display()))?;
    for replacement in &job.replace {
        text = text.replace(&replacement.find, &replacement.replace);
    }
    fs::write(&to, text).with_context(|| format!("failed to write: {}", to.display()))
}
