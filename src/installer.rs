//! Mod installation by pakchunk reconciliation
//!
//! The active profile selects mod groups, each listing pakchunks. The game's
//! paks directory is reconciled against that declared set:
//!
//! - a declared pakchunk missing from the game is moved in from staging;
//! - an undeclared, non-reserved pakchunk in the game is deleted when
//!   staging already holds a copy, and moved back to staging otherwise.
//!
//! Files sharing a pakchunk's stem (`.sig`, `.ucas`, `.utoc`) travel with
//! it. Running the reconciliation twice performs no moves the second time.
//!
//! # Examples
//!
//! ```no_run
//! use dbd_workbench::fs_utils::{OverwritePolicy, WriteGate};
//! use dbd_workbench::installer::{apply_plan, declared_pakchunks, plan_install, reserved_pakchunks};
//! use dbd_workbench::Settings;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(Path::new("kate-mod.yaml"))?;
//! let plan = plan_install(
//!     &settings.game_paks_dir()?,
//!     &settings.paking_dir()?,
//!     &declared_pakchunks(&settings)?,
//!     &reserved_pakchunks(&settings)?,
//! )?;
//! for line in plan.describe() {
//!     println!("{}", line);
//! }
//! apply_plan(&plan, &mut WriteGate::new(OverwritePolicy::Never))?;
//! # Ok(())
//! # }
//! ```

use crate::fs_utils::{move_file, WriteGate};
use crate::pakchunk::Pakchunk;
use crate::settings::Settings;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One file operation of an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// Staging -> game paks
    MoveIn { from: PathBuf, to: PathBuf },
    /// Game paks -> staging
    MoveOut { from: PathBuf, to: PathBuf },
    /// Remove from game paks; staging already holds a copy
    Delete { path: PathBuf },
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallAction::MoveIn { from, to } => write!(f, "move in  {} -> {}", from.display(), to.display()),
            InstallAction::MoveOut { from, to } => write!(f, "move out {} -> {}", from.display(), to.display()),
            InstallAction::Delete { path } => write!(f, "delete   {}", path.display()),
        }
    }
}

/// Reconciliation result, computed before anything moves
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    pub actions: Vec<InstallAction>,
    /// Declared pakchunks already installed
    pub unchanged: Vec<String>,
    /// Declared pakchunks found neither in the game nor in staging
    pub missing: Vec<String>,
}

impl InstallPlan {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Human-readable lines for dry runs and the results manifest
    pub fn describe(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.actions.iter().map(|a| a.to_string()).collect();
        lines.extend(self.unchanged.iter().map(|s| format!("keep     {}", s)));
        lines.extend(self.missing.iter().map(|s| format!("missing  {}", s)));
        lines
    }
}

/// Pakchunks found in one directory, keyed by lowercase stem
struct PakDir {
    groups: BTreeMap<String, Vec<PathBuf>>,
}

impl PakDir {
    fn scan(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let pak_keys: BTreeSet<String> = files
            .iter()
            .filter_map(|f| f.file_name().and_then(|n| n.to_str()))
            .filter(|name| Pakchunk::is_pak_file_name(name))
            .filter_map(|name| Pakchunk::parse(name).ok())
            .map(|chunk| chunk.key())
            .collect();

        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for file in files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = stem.to_ascii_lowercase();
            if pak_keys.contains(&key) {
                groups.entry(key).or_default().push(file);
            }
        }
        Ok(Self { groups })
    }

    fn empty() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

fn parse_names(names: &[String], platform: &str, what: &str) -> Result<Vec<Pakchunk>> {
    let mut seen = BTreeSet::new();
    let mut chunks = Vec::new();
    for name in names {
        let chunk = Pakchunk::parse(name)
            .map_err(|e| Error::Validation(format!("{}: {}", what, e)))?
            .with_default_platform(platform);
        if seen.insert(chunk.key()) {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

/// Pakchunks selected by `activeModProfile` through `modConfigs` and `modGroups`
pub fn declared_pakchunks(settings: &Settings) -> Result<Vec<Pakchunk>> {
    let profile = settings
        .active_mod_profile
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| Error::missing_setting("activeModProfile"))?;
    let groups = settings.mod_configs.get(profile).ok_or_else(|| {
        Error::MissingInput(format!("mod profile '{}' is not defined in modConfigs", profile))
    })?;

    let mut names = Vec::new();
    for group in groups {
        let members = settings.mod_groups.get(group).ok_or_else(|| {
            Error::MissingInput(format!(
                "mod group '{}' (profile '{}') is not defined in modGroups",
                group, profile
            ))
        })?;
        names.extend(members.iter().cloned());
    }
    parse_names(&names, &settings.platform, "modGroups")
}

/// Pakchunks the installer never touches
pub fn reserved_pakchunks(settings: &Settings) -> Result<Vec<Pakchunk>> {
    parse_names(&settings.reserved_pakchunks, &settings.platform, "reservedPakchunks")
}

/// Compute the moves reconciling `game_paks` with `declared`
pub fn plan_install(
    game_paks: &Path,
    staging: &Path,
    declared: &[Pakchunk],
    reserved: &[Pakchunk],
) -> Result<InstallPlan> {
    if !game_paks.is_dir() {
        return Err(Error::missing_path("game paks directory", game_paks));
    }
    let game = PakDir::scan(game_paks)?;
    let staged = if staging.is_dir() {
        PakDir::scan(staging)?
    } else {
        PakDir::empty()
    };

    let declared_keys: BTreeSet<String> = declared.iter().map(Pakchunk::key).collect();
    let reserved_keys: BTreeSet<String> = reserved.iter().map(Pakchunk::key).collect();
    let mut plan = InstallPlan::default();

    for chunk in declared {
        let key = chunk.key();
        if game.groups.contains_key(&key) {
            plan.unchanged.push(chunk.stem());
        } else if let Some(files) = staged.groups.get(&key) {
            for from in files {
                if let Some(name) = from.file_name() {
                    plan.actions.push(InstallAction::MoveIn {
                        from: from.clone(),
                        to: game_paks.join(name),
                    });
                }
            }
        } else {
            plan.missing.push(chunk.stem());
        }
    }

    for (key, files) in &game.groups {
        if declared_keys.contains(key) || reserved_keys.contains(key) {
            continue;
        }
        let has_copy = staged.groups.contains_key(key);
        for from in files {
            if has_copy {
                plan.actions.push(InstallAction::Delete { path: from.clone() });
            } else if let Some(name) = from.file_name() {
                plan.actions.push(InstallAction::MoveOut {
                    from: from.clone(),
                    to: staging.join(name),
                });
            }
        }
    }

    Ok(plan)
}

/// Perform the plan's file operations, returning their descriptions
pub fn apply_plan(plan: &InstallPlan, gate: &mut WriteGate) -> Result<Vec<String>> {
    let mut done = Vec::new();
    for action in &plan.actions {
        match action {
            InstallAction::MoveIn { from, to } | InstallAction::MoveOut { from, to } => {
                if !gate.ready_to_write(to)? {
                    // Existing target accepted; drop the source copy
                    fs::remove_file(from)?;
                } else {
                    move_file(from, to)?;
                }
            }
            InstallAction::Delete { path } => fs::remove_file(path)?,
        }
        tracing::info!("{}", action);
        done.push(action.to_string());
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::OverwritePolicy;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"pak").unwrap();
    }

    fn settings_from(yaml: &str) -> Settings {
        Settings::from_yaml_str(yaml, Path::new("/mods")).unwrap()
    }

    const PROFILE_YAML: &str = r#"
reservedPakchunks: [pakchunk0]
activeModProfile: enhanced
modConfigs:
  enhanced: [essentials]
  vanilla: []
modGroups:
  essentials: [pakchunk790enhanced1v1]
"#;

    #[test]
    fn test_declared_pakchunks_from_profile() {
        let settings = settings_from(PROFILE_YAML);
        let declared = declared_pakchunks(&settings).unwrap();
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].stem(), "pakchunk790enhanced1v1-WindowsNoEditor");

        let reserved = reserved_pakchunks(&settings).unwrap();
        assert_eq!(reserved[0].stem(), "pakchunk0-WindowsNoEditor");
    }

    #[test]
    fn test_unknown_profile_and_group() {
        let settings = settings_from("activeModProfile: missing\nmodConfigs: {}\n");
        assert!(matches!(declared_pakchunks(&settings), Err(Error::MissingInput(_))));

        let settings = settings_from("activeModProfile: p\nmodConfigs:\n  p: [ghost]\n");
        let err = declared_pakchunks(&settings).unwrap_err();
        assert!(err.to_string().contains("ghost"));

        let settings = settings_from("activeModProfile: p\nmodConfigs:\n  p: [g]\nmodGroups:\n  g: [not-a-chunk]\n");
        assert!(matches!(declared_pakchunks(&settings), Err(Error::Validation(_))));
    }

    #[test]
    fn test_reconcile_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let game = temp_dir.path().join("game/Paks");
        let staging = temp_dir.path().join("paking");
        touch(&game.join("pakchunk0-WindowsNoEditor.pak"));
        touch(&game.join("pakchunk584sweet-WindowsNoEditor.pak"));
        touch(&game.join("pakchunk584sweet-WindowsNoEditor.sig"));
        touch(&staging.join("pakchunk790enhanced1v1-WindowsNoEditor.pak"));

        let settings = settings_from(PROFILE_YAML);
        let declared = declared_pakchunks(&settings).unwrap();
        let reserved = reserved_pakchunks(&settings).unwrap();

        let plan = plan_install(&game, &staging, &declared, &reserved).unwrap();
        assert_eq!(plan.actions.len(), 3);
        assert!(plan.missing.is_empty());

        let mut gate = WriteGate::new(OverwritePolicy::Never);
        apply_plan(&plan, &mut gate).unwrap();

        assert!(game.join("pakchunk0-WindowsNoEditor.pak").is_file());
        assert!(game.join("pakchunk790enhanced1v1-WindowsNoEditor.pak").is_file());
        assert!(!game.join("pakchunk584sweet-WindowsNoEditor.pak").exists());
        assert!(staging.join("pakchunk584sweet-WindowsNoEditor.pak").is_file());
        assert!(staging.join("pakchunk584sweet-WindowsNoEditor.sig").is_file());
        assert!(!staging.join("pakchunk790enhanced1v1-WindowsNoEditor.pak").exists());

        // Second run has nothing to do
        let again = plan_install(&game, &staging, &declared, &reserved).unwrap();
        assert!(again.is_noop());
        assert_eq!(again.unchanged, ["pakchunk790enhanced1v1-WindowsNoEditor"]);
    }

    #[test]
    fn test_undeclared_with_staged_copy_is_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let game = temp_dir.path().join("game");
        let staging = temp_dir.path().join("paking");
        touch(&game.join("pakchunk584sweet-WindowsNoEditor.pak"));
        touch(&staging.join("PAKCHUNK584sweet-windowsnoeditor.pak"));

        let plan = plan_install(&game, &staging, &[], &[]).unwrap();
        assert_eq!(
            plan.actions,
            [InstallAction::Delete {
                path: game.join("pakchunk584sweet-WindowsNoEditor.pak")
            }]
        );
    }

    #[test]
    fn test_missing_declared_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let game = temp_dir.path().join("game");
        fs::create_dir_all(&game).unwrap();
        let declared = vec![Pakchunk::parse("pakchunk791ghost-WindowsNoEditor").unwrap()];

        let plan = plan_install(&game, &temp_dir.path().join("paking"), &declared, &[]).unwrap();
        assert_eq!(plan.missing, ["pakchunk791ghost-WindowsNoEditor"]);
        assert!(plan.describe().iter().any(|l| l.starts_with("missing")));
    }

    #[test]
    fn test_missing_game_dir() {
        let temp_dir = TempDir::new().unwrap();
        let err = plan_install(&temp_dir.path().join("nope"), temp_dir.path(), &[], &[]).unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_non_pak_files_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let game = temp_dir.path().join("game");
        touch(&game.join("readme.txt"));
        touch(&game.join("global.ucas"));

        let plan = plan_install(&game, &temp_dir.path().join("paking"), &[], &[]).unwrap();
        assert!(plan.is_noop());
    }
}
