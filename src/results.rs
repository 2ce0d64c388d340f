//! Run diagnostics and the results manifest
//!
//! Every phase records its warnings and errors into [`Diagnostics`]; each
//! entry is emitted as a `tracing` event as it is recorded. At the end of a
//! run the orchestrator writes a [`RunResults`] manifest next to the
//! settings file (`<settingsStem>-results.yaml`).

use crate::Result;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Warnings and errors collected during a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.errors.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Serialize a set as a list sorted case-insensitively
fn ci_sorted<S: Serializer>(set: &BTreeSet<String>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let mut items: Vec<&String> = set.iter().collect();
    items.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    serializer.collect_seq(items)
}

/// The results manifest written at the end of a run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    pub settings_path: PathBuf,
    /// RFC 3339 start timestamp
    pub started_at: String,
    pub phases: Vec<String>,

    #[serde(flatten)]
    pub diagnostics: Diagnostics,

    #[serde(serialize_with = "ci_sorted")]
    pub discovered_files: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub attachments_loaded: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub combos_added: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub combos_skipped: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub name_map_added: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub name_map_removed: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub source_paths: BTreeSet<String>,
    #[serde(serialize_with = "ci_sorted")]
    pub destination_paths: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pak_path: Option<PathBuf>,
    pub installer_actions: Vec<String>,
}

impl RunResults {
    pub fn new(settings_path: &Path) -> Self {
        Self {
            settings_path: settings_path.to_path_buf(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    pub fn add_source(&mut self, path: &Path) {
        self.source_paths.insert(path.display().to_string());
    }

    pub fn add_destination(&mut self, path: &Path) {
        self.destination_paths.insert(path.display().to_string());
    }

    /// 0 when no error was recorded, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.diagnostics.has_errors() {
            1
        } else {
            0
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the manifest, replacing any previous one
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_yaml()?)?;
        tracing::info!("Results written to {}", path.display());
        Ok(())
    }
}
