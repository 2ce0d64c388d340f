//! Pak staging and packing
//!
//! Assets listed for the destination pak are copied from the source content
//! root into a pak-shaped staging directory:
//!
//! ```text
//! <pakingDir>/pakchunk<N><name>-<platform>/<gameName>/Content/...
//! ```
//!
//! and the external packer turns the staging directory into
//! `<pakingDir>/pakchunk<N><name>-<platform>.pak`. Every asset contributes
//! its `.uasset` plus the `.uexp` / `.ubulk` split files that exist.

use crate::fs_utils::{same_path, WriteGate};
use crate::pakchunk::Pakchunk;
use crate::platform::ExternalTool;
use crate::settings::content_relative;
use crate::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions of the split files making up one cooked asset
pub const ASSET_EXTENSIONS: [&str; 3] = ["uasset", "uexp", "ubulk"];

/// Map a `destPakAssets` entry to a path relative to the content root
///
/// Accepts `/Game/...`, `/Content/...` and `Content/...`; a trailing
/// `.uasset` / `.uexp` / `.ubulk` is dropped, any other suffix is rejected.
pub fn asset_relative_path(raw: &str) -> Result<PathBuf> {
    let unified = raw.trim().replace('\\', "/");
    let relative = if unified.starts_with('/') {
        content_relative(&unified)
    } else {
        content_relative(&format!("/{}", unified))
            .filter(|_| unified.to_ascii_lowercase().starts_with("content/"))
    }
    .ok_or_else(|| {
        Error::Validation(format!(
            "asset path '{}' must start with /Game/ or /Content/",
            raw
        ))
    })?;

    match relative.extension().and_then(|e| e.to_str()) {
        None => Ok(relative),
        Some(ext) if ASSET_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)) => {
            Ok(relative.with_extension(""))
        }
        Some(ext) => Err(Error::Validation(format!(
            "asset path '{}' has unrecognized suffix '.{}'",
            raw, ext
        ))),
    }
}

/// Result of staging a pak
#[derive(Debug, Clone)]
pub struct StagedPak {
    pub chunk: Pakchunk,
    pub staging_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Drives the external packer
#[derive(Debug, Clone)]
pub struct PakBuilder {
    packer: ExternalTool,
    paking_dir: PathBuf,
    game_name: String,
}

impl PakBuilder {
    pub fn new(unreal_pak: PathBuf, paking_dir: PathBuf, game_name: impl Into<String>) -> Self {
        Self {
            packer: ExternalTool::new("UnrealPak", unreal_pak),
            paking_dir,
            game_name: game_name.into(),
        }
    }

    /// `<pakingDir>/<chunk stem>`
    pub fn staging_dir(&self, chunk: &Pakchunk) -> PathBuf {
        self.paking_dir.join(chunk.stem())
    }

    /// `<pakingDir>/<chunk file name>`
    pub fn output_path(&self, chunk: &Pakchunk) -> PathBuf {
        self.paking_dir.join(chunk.file_name())
    }

    /// Unpack `pak` into `<pakingDir>/<pak stem>` and return that directory
    pub fn unpack(&self, pak: &Path, gate: &mut WriteGate) -> Result<PathBuf> {
        if !pak.is_file() {
            return Err(Error::missing_path("source pak", pak));
        }
        let stem = pak
            .file_stem()
            .ok_or_else(|| Error::Validation(format!("invalid pak path {}", pak.display())))?;
        let dest = self.paking_dir.join(stem);
        if !gate.ready_to_write(&dest)? {
            return Ok(dest);
        }
        fs::create_dir_all(&dest)?;

        tracing::info!("Unpacking {} into {}", pak.display(), dest.display());
        let args = vec![
            self.packer.path_arg(pak),
            "-Extract".to_string(),
            self.packer.path_arg(&dest),
        ];
        self.packer.run(&args, pak)?;
        Ok(dest)
    }

    /// Copy `assets` from `source_root` (the directory holding `Content`)
    /// into the staging directory of `chunk`
    ///
    /// Nothing is written when any listed asset is missing.
    pub fn stage(
        &self,
        chunk: &Pakchunk,
        source_root: &Path,
        assets: &[String],
        gate: &mut WriteGate,
    ) -> Result<StagedPak> {
        let staging_dir = self.staging_dir(chunk);
        let content_root = staging_dir.join(&self.game_name);

        let mut planned: Vec<PathBuf> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for raw in assets {
            let relative = asset_relative_path(raw)?;
            if !source_root.join(&relative).with_extension("uasset").is_file() {
                missing.push(raw.clone());
                continue;
            }
            for ext in ASSET_EXTENSIONS {
                let file = relative.with_extension(ext);
                if source_root.join(&file).is_file() {
                    planned.push(file);
                }
            }
        }
        if !missing.is_empty() {
            return Err(Error::MissingInput(format!(
                "{} asset(s) not found under {}: {}",
                missing.len(),
                source_root.display(),
                missing.join(", ")
            )));
        }

        // An in-place repack reads from a sibling copy of the staging dir
        let in_place = same_path(source_root, &content_root);
        let (source_root, backup) = if in_place {
            let backup = self.paking_dir.join(format!(
                "{}-{}",
                chunk.stem(),
                chrono::Local::now().format("%Y%m%d%H%M%S")
            ));
            tracing::info!("Repacking in place; moving {} to {}", staging_dir.display(), backup.display());
            fs::rename(&staging_dir, &backup)?;
            (backup.join(&self.game_name), Some(backup))
        } else {
            (source_root.to_path_buf(), None)
        };

        let staged = self.copy_planned(&source_root, &staging_dir, &content_root, &planned, gate);
        match (staged, backup) {
            (Ok(files), Some(backup)) => {
                fs::remove_dir_all(&backup)?;
                Ok(StagedPak {
                    chunk: chunk.clone(),
                    staging_dir,
                    files,
                })
            }
            (Ok(files), None) => Ok(StagedPak {
                chunk: chunk.clone(),
                staging_dir,
                files,
            }),
            (Err(e), Some(backup)) => {
                if staging_dir.exists() {
                    fs::remove_dir_all(&staging_dir)?;
                }
                fs::rename(&backup, &staging_dir)?;
                Err(e)
            }
            (Err(e), None) => Err(e),
        }
    }

    fn copy_planned(
        &self,
        source_root: &Path,
        staging_dir: &Path,
        content_root: &Path,
        planned: &[PathBuf],
        gate: &mut WriteGate,
    ) -> Result<Vec<PathBuf>> {
        if !gate.ready_to_write(staging_dir)? {
            return list_staged(staging_dir);
        }

        let pb = ProgressBar::new(planned.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        pb.set_message("Staging assets...");

        let mut files = Vec::new();
        for relative in planned {
            let from = source_root.join(relative);
            let to = content_root.join(relative);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&from, &to)?;
            tracing::debug!("Staged {}", to.display());
            files.push(to);
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(files)
    }

    /// Render the packer's response file for `staged`
    ///
    /// One line per file: `"<absolute path>" "../../../<path in staging>"`.
    pub fn file_list(&self, staged: &StagedPak) -> String {
        let mut lines = Vec::new();
        for file in &staged.files {
            let relative = file
                .strip_prefix(&staged.staging_dir)
                .unwrap_or(file)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            lines.push(format!("\"{}\" \"../../../{}\"", self.packer.path_arg(file), relative));
        }
        let mut content = lines.join("\n");
        content.push('\n');
        content
    }

    /// Pack a staged directory into its pak and return the pak's path
    pub fn pack(&self, staged: &StagedPak, gate: &mut WriteGate) -> Result<PathBuf> {
        let output = self.output_path(&staged.chunk);
        if !gate.ready_to_write(&output)? {
            return Ok(output);
        }

        let file_list_path = self.paking_dir.join(format!("{}-filelist.txt", staged.chunk.stem()));
        fs::write(&file_list_path, self.file_list(staged))?;

        tracing::info!("Packing {} files into {}", staged.files.len(), output.display());
        let args = vec![
            self.packer.path_arg(&output),
            format!("-create={}", self.packer.path_arg(&file_list_path)),
            "-compress".to_string(),
        ];
        self.packer.run(&args, &output)?;

        if !output.is_file() {
            return Err(Error::Conversion {
                tool: self.packer.name().to_string(),
                status: "no pak written".to_string(),
                subject: output,
                command: args.join(" "),
            });
        }
        Ok(output)
    }
}

fn list_staged(staging_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(staging_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Other(format!("cannot list {}: {}", staging_dir.display(), e)))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
