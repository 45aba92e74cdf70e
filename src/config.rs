//! Configuration loading from TOML files
//!
//! Every key is optional; a missing file section falls back to defaults.
//! CLI flags override whatever the file sets.
//!
//! ```toml
//! [ingest]
//! on_malformed = "skip"     # or "abort"
//!
//! [ranking]
//! top_k = 10
//! incomplete = "exclude"    # or "fail"
//!
//! [output]
//! path = "output.txt"
//! format = "text"           # "json", "csv"
//!
//! [server]
//! addr = "0.0.0.0:3000"
//! ```

use crate::aggregator::IngestPolicy;
use crate::ranker::{IncompletePolicy, DEFAULT_TOP_K};
use crate::report::OutputFormat;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub on_malformed: IngestPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankingSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub incomplete: IncompletePolicy,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for RankingSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            incomplete: IncompletePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_output_path() -> String {
    "output.txt".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

/// Settings for one ranking run
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RankingConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub ranking: RankingSection,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl RankingConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load from `path` if given, otherwise defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
