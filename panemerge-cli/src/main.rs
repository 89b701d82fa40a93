//! Panemerge CLI - merges rendered HTML widget documents into a fixed page template

#![deny(warnings)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use panemerge_core::{config, dom, run_build, TransformRegistry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "panemerge")]
#[command(about = "Merge rendered HTML widget documents into a fixed page template")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all merge and copy jobs from the config file
    Build {
        /// Path to config file (default: auto-discover in the project root)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Project root to discover the config in (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Validate or inspect a configuration file
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running the build
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the parsed configuration
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { config, root } => {
            let root = match root {
                Some(path) => path,
                None => std::env::current_dir().context("failed to resolve current directory")?,
            };
            let (build_config, config_path) =
                config::load_build_config(&root, config.as_deref())?;
            eprintln!("Using config: {}", config_path.display());

            let base_dir = config_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or(root);

            let summary = run_build(&build_config, &base_dir, &default_registry())?;
            println!(
                "Merged {} document(s), copied {} file(s), moved {} widget(s), skipped {}",
                summary.jobs, summary.copies, summary.widgets_moved, summary.widgets_skipped
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let (_, config_path) = load_for_inspection(path)?;
                println!("Configuration is valid: {}", config_path.display());
            }
            ConfigAction::Show { path } => {
                let (config, config_path) = load_for_inspection(path)?;
                eprintln!("Using config: {}", config_path.display());
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config)
                        .context("failed to render configuration")?
                );
            }
        },
    }

    Ok(())
}

fn load_for_inspection(
    path: Option<PathBuf>,
) -> anyhow::Result<(config::BuildConfig, PathBuf)> {
    let root = std::env::current_dir().context("failed to resolve current directory")?;
    config::load_build_config(&root, path.as_deref())
}

/// Transforms shipped with the CLI. Library embedders register their own.
fn default_registry() -> TransformRegistry {
    let mut registry = TransformRegistry::new();

    // Drops inline styles the document renderer leaves on elements, so the
    // template's stylesheet wins.
    registry.register("strip-styles", |_, container| {
        for node in dom::select_all(container, &dom::Selector::parse("div")?) {
            dom::remove_attr(&node, "style");
        }
        Ok(())
    });

    registry
}
