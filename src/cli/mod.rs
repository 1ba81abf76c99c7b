//! CLI command definitions for confgraph
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::config::FactorySettings;
use crate::config::settings::parse_profiles;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// Output format for printed trees and specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    /// Render `value` in this format.
    pub fn render<T: Serialize>(self, value: &T) -> anyhow::Result<String> {
        Ok(match self {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)? + "\n",
        })
    }
}

/// Inspect and watch layered object-graph configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration search directory (repeatable, first wins)
    #[arg(short = 'd', long = "conf-dir", global = true)]
    pub conf_dirs: Vec<PathBuf>,

    /// Base resource name (overrides CONFGRAPH_BASE_NAME)
    #[arg(short, long, global = true)]
    pub base: Option<String>,

    /// Active profile, in ascending precedence (repeatable or comma-separated)
    #[arg(short, long = "profile", global = true)]
    pub profiles: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Output format for printed results
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Environment-discovered settings with command-line overrides applied.
    pub fn settings(&self) -> FactorySettings {
        self.apply_overrides(FactorySettings::discover())
    }

    fn apply_overrides(&self, mut settings: FactorySettings) -> FactorySettings {
        if let Some(base) = &self.base {
            settings.base_name = base.clone();
        }
        if !self.profiles.is_empty() {
            settings.profiles = self.profiles.iter().flat_map(|p| parse_profiles(p)).collect();
        }
        if !self.conf_dirs.is_empty() {
            settings.search_dirs = self.conf_dirs.clone();
        }
        settings
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Build the object specs and report problems (default if no subcommand given)
    Check,

    /// Print the merged configuration tree
    Tree,

    /// Keep reloading the configuration as source files change
    Watch {
        /// Debounce window for file changes, in milliseconds
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },
}
