//! Path and filesystem helpers shared by every phase
//!
//! Besides path normalization and recursive listing, this module owns the
//! write gate: every component that produces a file or directory asks
//! [`WriteGate::ready_to_write`] first, which applies the session's
//! [`OverwritePolicy`] and clears the prior target when writing may proceed.
//!
//! # Examples
//!
//! ```
//! use dbd_workbench::fs_utils::{normalize_path, OverwritePolicy, WriteGate};
//! use std::path::Path;
//!
//! assert_eq!(
//!     normalize_path(Path::new("/mods/./paks/../attachments")),
//!     Path::new("/mods/attachments")
//! );
//!
//! let gate = WriteGate::new(OverwritePolicy::Never);
//! assert_eq!(gate.policy(), OverwritePolicy::Never);
//! ```

use crate::{Error, Result};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// How existing write targets are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Delete the prior target and write
    Always,
    /// Never touch an existing target
    Never,
    /// Ask the decision callback for every existing target
    Prompt,
}

impl FromStr for OverwritePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" | "yes" => Ok(OverwritePolicy::Always),
            "never" | "no" => Ok(OverwritePolicy::Never),
            "prompt" | "ask" => Ok(OverwritePolicy::Prompt),
            other => Err(format!(
                "unknown overwrite policy '{}' (expected always, never or prompt)",
                other
            )),
        }
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverwritePolicy::Always => "always",
            OverwritePolicy::Never => "never",
            OverwritePolicy::Prompt => "prompt",
        };
        f.write_str(name)
    }
}

/// Answer of the overwrite decision callback for one existing target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Keep the existing target and use it as the result
    Accept,
    /// Leave the target alone and fail the write
    Reject,
    /// Delete the existing target and write a new one
    Overwrite,
}

/// Callback consulted under [`OverwritePolicy::Prompt`]
pub type DecisionFn = Box<dyn FnMut(&Path) -> Result<WriteDecision>>;

/// The readyToWrite gate guarding every filesystem write
pub struct WriteGate {
    policy: OverwritePolicy,
    decide: Option<DecisionFn>,
}

impl WriteGate {
    /// Create a gate with a fixed policy and no prompt callback
    ///
    /// Under [`OverwritePolicy::Prompt`] a gate without callback rejects.
    pub fn new(policy: OverwritePolicy) -> Self {
        Self {
            policy,
            decide: None,
        }
    }

    /// Create a gate that asks `decide` about existing targets
    pub fn with_prompt(policy: OverwritePolicy, decide: DecisionFn) -> Self {
        Self {
            policy,
            decide: Some(decide),
        }
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    /// Check whether `path` may be written
    ///
    /// Returns `Ok(true)` when the caller should write (any prior target has
    /// been deleted), `Ok(false)` when the existing target was accepted as the
    /// result, and [`Error::OverwriteDenied`] when the target must not change.
    pub fn ready_to_write(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            return Ok(true);
        }

        let decision = match self.policy {
            OverwritePolicy::Always => WriteDecision::Overwrite,
            OverwritePolicy::Never => WriteDecision::Reject,
            OverwritePolicy::Prompt => match self.decide.as_mut() {
                Some(decide) => decide(path)?,
                None => WriteDecision::Reject,
            },
        };

        match decision {
            WriteDecision::Overwrite => {
                tracing::debug!("Removing existing {}", path.display());
                remove_path(path)?;
                Ok(true)
            }
            WriteDecision::Accept => {
                tracing::info!("Keeping existing {}", path.display());
                Ok(false)
            }
            WriteDecision::Reject => Err(Error::OverwriteDenied(path.to_path_buf())),
        }
    }
}

/// Remove a file or a directory tree
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Lexically normalize a path: drop `.` components and fold `..`
///
/// Does not touch the filesystem, so it works for paths that do not exist
/// yet. Leading `..` components of relative paths are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Expand `~` and environment variables in a settings value and resolve it
/// against `base` when relative
pub fn expand_path(raw: &str, base: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .map_err(|e| Error::Validation(format!("cannot expand path '{}': {}", raw, e)))?;
    let path = PathBuf::from(expanded.as_ref());
    let joined = if path.is_absolute() {
        path
    } else {
        base.join(path)
    };
    Ok(normalize_path(&joined))
}

/// Compare two paths after normalization, canonicalizing when both exist
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => normalize_path(a) == normalize_path(b),
    }
}

/// List files below `dir` recursively, sorted by file name per directory
///
/// When `extensions` is non-empty only files whose extension matches one of
/// them (case-insensitive, without the dot) are returned.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::missing_path("directory", dir));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Other(format!("cannot list {}: {}", dir.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !extensions.is_empty() {
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// Move a file, falling back to copy + delete across filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
