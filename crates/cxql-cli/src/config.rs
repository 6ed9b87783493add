//! Optional JSON configuration file. Command-line flags win over it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use cxql_migrate::{RunOptions, DEFAULT_TARGET_APPLICATION, DEFAULT_TARGET_PROJECT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub log_level: String,
    pub plan_path: PathBuf,
    pub allow_remerge: bool,
    pub placeholder_source: String,
    pub target_project: String,
    pub target_application: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        let options = RunOptions::default();
        Self {
            log_level: "INFO".to_string(),
            plan_path: PathBuf::from("queries.json"),
            allow_remerge: options.allow_remerge,
            placeholder_source: options.placeholder_source,
            target_project: DEFAULT_TARGET_PROJECT.to_string(),
            target_application: DEFAULT_TARGET_APPLICATION.to_string(),
        }
    }
}

impl MigrationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// The file at `path`, or defaults when no file was given.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            allow_remerge: self.allow_remerge,
            placeholder_source: self.placeholder_source.clone(),
        }
    }
}
