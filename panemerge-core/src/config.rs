//! Configuration file support for the build pipeline.
//!
//! Loads the job list from a JSON config file.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.panemergerc.json` in the project root
//! 3. `panemerge.config.json` in the project root
//!
//! All relative paths inside the config resolve against the directory the
//! config file was loaded from. A malformed config aborts the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Full build configuration: merge jobs followed by copy jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Merge jobs, run first, in order.
    #[serde(default)]
    pub jobs: Vec<MergeJob>,

    /// Copy jobs, run after all merge jobs, in order.
    #[serde(default)]
    pub copies: Vec<CopyJob>,
}

/// One merge job: combine a rendered source document with a page template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeJob {
    /// Rendered source document to read.
    pub input: PathBuf,

    /// Combined document to write.
    pub output: PathBuf,

    /// Page template providing the anchor slots.
    pub template: PathBuf,

    /// Names of registered transforms to run after the merge, in order.
    #[serde(default)]
    pub transforms: Vec<String>,

    /// Pane handler map: pane key to handler configuration object. Each entry
    /// is merged with an optional `<key>-plotData.json` side-data file found
    /// next to the input document.
    #[serde(default)]
    pub pane_handlers: BTreeMap<String, serde_json::Value>,
}

/// One copy job: a raw file copy, or a text-substitution copy when `replace`
/// is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyJob {
    /// File to copy.
    pub from: PathBuf,

    /// Destination path.
    pub to: PathBuf,

    /// Substitutions applied in order to the file text before writing.
    #[serde(default)]
    pub replace: Vec<Replacement>,
}

/// A literal text substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Replacement {
    pub find: String,
    pub replace: String,
}

impl BuildConfig {
    /// Validate the configuration for structural errors.
    pub fn validate(&self) -> Result<()> {
        let mut outputs = BTreeSet::new();
        for (i, job) in self.jobs.iter().enumerate() {
            for (field, path) in [
                ("input", &job.input),
                ("output", &job.output),
                ("template", &job.template),
            ] {
                if path.as_os_str().is_empty() {
                    anyhow::bail!("jobs[{}].{} must not be empty", i, field);
                }
            }
            if !outputs.insert(job.output.clone()) {
                anyhow::bail!(
                    "jobs[{}].output duplicates an earlier output: {}",
                    i,
                    job.output.display()
                );
            }
            for name in &job.transforms {
                if name.trim().is_empty() {
                    anyhow::bail!("jobs[{}].transforms contains an empty name", i);
                }
            }
            for (key, handler) in &job.pane_handlers {
                if !handler.is_object() {
                    anyhow::bail!(
                        "jobs[{}].pane_handlers.{} must be a JSON object",
                        i,
                        key
                    );
                }
            }
        }

        for (i, copy) in self.copies.iter().enumerate() {
            if copy.from.as_os_str().is_empty() {
                anyhow::bail!("copies[{}].from must not be empty", i);
            }
            if copy.to.as_os_str().is_empty() {
                anyhow::bail!("copies[{}].to must not be empty", i);
            }
            for (j, replacement) in copy.replace.iter().enumerate() {
                if replacement.find.is_empty() {
                    anyhow::bail!("copies[{}].replace[{}].find must not be empty", i, j);
                }
            }
        }

        Ok(())
    }
}

/// Load and validate a config from an explicit file path.
pub fn load_config_file(path: &Path) -> Result<BuildConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: BuildConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Discover a config file in the project root.
///
/// Returns `None` if neither `.panemergerc.json` nor `panemerge.config.json`
/// exists there.
pub fn discover_config(project_root: &Path) -> Result<Option<(BuildConfig, PathBuf)>> {
    for name in [".panemergerc.json", "panemerge.config.json"] {
        let path = project_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load the build config for a project.
///
/// If `config_path` is provided, loads from that file; otherwise discovers a
/// config in the project root. A project with no config has nothing to build,
/// so absence is an error.
pub fn load_build_config(
    project_root: &Path,
    config_path: Option<&Path>,
) -> Result<(BuildConfig, PathBuf)> {
    if let Some(path) = config_path {
        let config = load_config_file(path)?;
        return Ok((config, path.to_path_buf()));
    }
    match discover_config(project_root)? {
        Some(found) => Ok(found),
        None => anyhow::bail!(
            "no config file found in {} (expected .panemergerc.json or panemerge.config.json)",
            project_root.display()
        ),
    }
}
