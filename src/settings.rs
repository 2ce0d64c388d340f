//! Settings file loading
//!
//! Settings are YAML files with camelCase keys. A top-level `import` list
//! names other settings files (relative to the importing file) that are
//! loaded recursively and merged key-by-key before the importing file's own
//! keys, so later imports override earlier ones and the file itself
//! overrides everything it imports.
//!
//! Path values expand `~` and environment variables and are resolved
//! relative to the directory of the top-level settings file.
//!
//! # Examples
//!
//! ```no_run
//! use dbd_workbench::Settings;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(Path::new("kate-mod.yaml"))?;
//! println!("Game paks: {}", settings.game_paks_dir()?.display());
//! println!("Results go to: {}", settings.results_path().display());
//! # Ok(())
//! # }
//! ```

use crate::fs_utils::{expand_path, normalize_path};
use crate::pakchunk::Pakchunk;
use crate::{Error, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Key holding the list of imported settings files
pub const IMPORT_KEY: &str = "import";

/// Maximum nesting of `import` chains
pub const MAX_IMPORT_DEPTH: usize = 16;

/// Typed view of a merged settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// External packer executable
    #[serde(default)]
    pub unreal_pak_path: Option<String>,

    /// External asset converter executable
    #[serde(default)]
    pub uasset_gui_path: Option<String>,

    /// Engine version argument passed to the asset converter
    #[serde(default = "default_engine_version")]
    pub uasset_engine_version: String,

    /// Working directory for staging, built paks and unpacked source paks
    #[serde(default)]
    pub paking_dir: Option<String>,

    /// Directory holding the attachment definitions
    #[serde(default)]
    pub attachments_dir: Option<String>,

    /// Template used by the attachment creation flow
    #[serde(default)]
    pub attachment_template_path: Option<String>,

    /// Game installation root
    #[serde(default)]
    pub game_dir: Option<String>,

    /// Game project name, e.g. `DeadByDaylight`
    #[serde(default)]
    pub game_name: Option<String>,

    /// Unreal project whose cooked content is the default source
    #[serde(default)]
    pub unreal_project_dir: Option<String>,

    /// Source pak to unpack and use as content source instead of the project
    #[serde(default)]
    pub src_pak_path: Option<String>,

    /// Data table asset to mutate; accepts `/Content/...` virtual paths
    #[serde(default)]
    pub customization_item_db_path: Option<String>,

    #[serde(default)]
    pub dest_pak_number: Option<u32>,

    #[serde(default)]
    pub dest_pak_name: Option<String>,

    /// Assets (without extension) to stage into the destination pak
    #[serde(default)]
    pub dest_pak_assets: Vec<String>,

    /// Platform suffix of pakchunk names and cooked content
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Pakchunks the installer never touches (case-insensitive)
    #[serde(default)]
    pub reserved_pakchunks: Vec<String>,

    #[serde(default)]
    pub active_mod_profile: Option<String>,

    /// Profile name -> mod group names
    #[serde(default)]
    pub mod_configs: BTreeMap<String, Vec<String>>,

    /// Mod group name -> pakchunk names
    #[serde(default)]
    pub mod_groups: BTreeMap<String, Vec<String>>,

    /// Executable started by the launch phase
    #[serde(default)]
    pub launcher_path: Option<String>,

    /// Process names terminated by the kill phase
    #[serde(default)]
    pub game_process_names: Vec<String>,

    #[serde(flatten)]
    pub rules: RuleInputs,

    #[serde(skip)]
    source_path: PathBuf,

    #[serde(skip)]
    base_dir: PathBuf,
}

/// Raw declarative rule inputs, keyed by category name
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInputs {
    /// aggregate id -> part sets it is equivalent to
    #[serde(default)]
    pub equivalent_parts: BTreeMap<String, BTreeMap<String, PartSets>>,

    /// outer id -> inner sets it contains
    #[serde(default)]
    pub superset_parts: BTreeMap<String, BTreeMap<String, PartSets>>,

    /// groups of ids that never co-occur
    #[serde(default)]
    pub mutually_exclusive: BTreeMap<String, Vec<Vec<String>>>,

    /// id -> ids it conflicts with
    #[serde(default)]
    pub attachment_conflicts: BTreeMap<String, BTreeMap<String, Vec<String>>>,

    /// combinations to skip; tokens are `id[==][:model,...]`
    #[serde(default)]
    pub combos_to_skip: BTreeMap<String, Vec<Vec<String>>>,
}

/// One or more id lists; a bare list is read as a single set
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "PartSetsRepr")]
pub struct PartSets(pub Vec<Vec<String>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PartSetsRepr {
    Many(Vec<Vec<String>>),
    One(Vec<String>),
}

impl From<PartSetsRepr> for PartSets {
    fn from(repr: PartSetsRepr) -> Self {
        match repr {
            PartSetsRepr::Many(sets) => PartSets(sets),
            PartSetsRepr::One(set) => PartSets(vec![set]),
        }
    }
}

fn default_engine_version() -> String {
    "VER_UE4_27".to_string()
}

fn default_platform() -> String {
    "WindowsNoEditor".to_string()
}

impl Settings {
    /// Load a settings file, resolving its imports
    pub fn load(path: &Path) -> Result<Self> {
        let merged = load_merged(path, 0)?;
        let mut settings: Settings = serde_yaml::from_value(Value::Mapping(merged))?;

        let source_path = normalize_path(&std::env::current_dir()?.join(path));
        settings.base_dir = source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        settings.source_path = source_path;
        Ok(settings)
    }

    /// Parse settings from a YAML string, resolving relative paths against
    /// `base_dir` (imports are not supported here)
    pub fn from_yaml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut settings: Settings = match serde_yaml::from_str::<Value>(content)? {
            Value::Null => Settings::default(),
            value => serde_yaml::from_value(value)?,
        };
        if settings.uasset_engine_version.is_empty() {
            settings.uasset_engine_version = default_engine_version();
        }
        if settings.platform.is_empty() {
            settings.platform = default_platform();
        }
        settings.base_dir = normalize_path(base_dir);
        settings.source_path = settings.base_dir.join("settings.yaml");
        Ok(settings)
    }

    /// Path of the top-level settings file
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Directory relative paths are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<settingsDir>/<settingsStem>-results.yaml`
    pub fn results_path(&self) -> PathBuf {
        let stem = self
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "settings".to_string());
        self.base_dir.join(format!("{}-results.yaml", stem))
    }

    /// Resolve a raw path value from the settings
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        expand_path(raw, &self.base_dir)
    }

    fn required_path(&self, key: &str, value: &Option<String>) -> Result<PathBuf> {
        match value.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => self.resolve(raw),
            _ => Err(Error::missing_setting(key)),
        }
    }

    fn optional_path(&self, value: &Option<String>) -> Result<Option<PathBuf>> {
        match value.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => self.resolve(raw).map(Some),
            _ => Ok(None),
        }
    }

    pub fn unreal_pak(&self) -> Result<PathBuf> {
        self.required_path("unrealPakPath", &self.unreal_pak_path)
    }

    pub fn uasset_gui(&self) -> Result<PathBuf> {
        self.required_path("uassetGuiPath", &self.uasset_gui_path)
    }

    pub fn paking_dir(&self) -> Result<PathBuf> {
        self.required_path("pakingDir", &self.paking_dir)
    }

    pub fn attachments_dir(&self) -> Result<PathBuf> {
        self.required_path("attachmentsDir", &self.attachments_dir)
    }

    pub fn attachment_template(&self) -> Result<Option<PathBuf>> {
        self.optional_path(&self.attachment_template_path)
    }

    pub fn game_dir(&self) -> Result<PathBuf> {
        self.required_path("gameDir", &self.game_dir)
    }

    pub fn game_name(&self) -> Result<&str> {
        match self.game_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(Error::missing_setting("gameName")),
        }
    }

    /// `<gameDir>/<gameName>/Content/Paks`
    pub fn game_paks_dir(&self) -> Result<PathBuf> {
        Ok(self
            .game_dir()?
            .join(self.game_name()?)
            .join("Content")
            .join("Paks"))
    }

    /// `<unrealProjectDir>/Saved/Cooked/<platform>/<gameName>`
    pub fn cooked_content_root(&self) -> Result<PathBuf> {
        let project = self.required_path("unrealProjectDir", &self.unreal_project_dir)?;
        Ok(project
            .join("Saved")
            .join("Cooked")
            .join(&self.platform)
            .join(self.game_name()?))
    }

    pub fn src_pak(&self) -> Result<Option<PathBuf>> {
        self.optional_path(&self.src_pak_path)
    }

    /// Directory a configured source pak unpacks into: `<pakingDir>/<srcPakStem>`
    pub fn unpacked_src_pak_dir(&self) -> Result<Option<PathBuf>> {
        let Some(src_pak) = self.src_pak()? else {
            return Ok(None);
        };
        let stem = src_pak
            .file_stem()
            .ok_or_else(|| Error::Validation(format!("invalid srcPakPath: {}", src_pak.display())))?;
        Ok(Some(self.paking_dir()?.join(stem)))
    }

    /// Root holding `Content/...` for the configured source
    ///
    /// The unpacked source pak when `srcPakPath` is set, the project's cooked
    /// content otherwise.
    pub fn source_content_root(&self) -> Result<PathBuf> {
        match self.unpacked_src_pak_dir()? {
            Some(dir) => Ok(dir.join(self.game_name()?)),
            None => self.cooked_content_root(),
        }
    }

    /// Location of the CustomizationItemDB asset
    ///
    /// `/Content/...` and `/Game/...` values are virtual paths under the
    /// source content root; `.uasset` is appended when no extension is given.
    pub fn item_db_path(&self) -> Result<PathBuf> {
        let raw = match self.customization_item_db_path.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(Error::missing_setting("customizationItemDbPath")),
        };

        let path = match content_relative(raw) {
            Some(relative) => self.source_content_root()?.join(relative),
            None => self.resolve(raw)?,
        };

        if path.extension().is_some() {
            Ok(path)
        } else {
            Ok(path.with_extension("uasset"))
        }
    }

    /// Pakchunk descriptor of the pak being built
    pub fn dest_pak(&self) -> Result<Pakchunk> {
        let number = self
            .dest_pak_number
            .ok_or_else(|| Error::missing_setting("destPakNumber"))?;
        let name = self.dest_pak_name.clone().unwrap_or_default();
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(Error::Validation(format!(
                "destPakName '{}' may only contain word characters",
                name
            )));
        }
        Ok(Pakchunk::new(number, name, Some(self.platform.clone())))
    }

    pub fn launcher(&self) -> Result<PathBuf> {
        match self.optional_path(&self.launcher_path)? {
            Some(path) => Ok(path),
            None => Ok(self.game_dir()?.join(format!("{}.exe", self.game_name()?))),
        }
    }
}

/// Map a `/Content/...` or `/Game/...` virtual path to `Content/...`
pub fn content_relative(raw: &str) -> Option<PathBuf> {
    let unified = raw.replace('\\', "/");
    if !unified.starts_with('/') {
        return None;
    }
    let trimmed = unified.trim_start_matches('/');
    let rest = strip_prefix_ci(trimmed, "Content/").or_else(|| strip_prefix_ci(trimmed, "Game/"))?;

    let mut relative = PathBuf::from("Content");
    for part in rest.split('/').filter(|p| !p.is_empty()) {
        relative.push(part);
    }
    Some(relative)
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => s.get(prefix.len()..),
        _ => None,
    }
}

fn load_merged(path: &Path, depth: usize) -> Result<Mapping> {
    if depth > MAX_IMPORT_DEPTH {
        return Err(Error::ImportDepthExceeded(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(Error::missing_path("settings file", path));
    }

    let content = fs::read_to_string(path)?;
    let mut own = match serde_yaml::from_str::<Value>(&content)? {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        _ => {
            return Err(Error::Validation(format!(
                "settings file {} must contain a mapping at the top level",
                path.display()
            )))
        }
    };

    let imports = match own.remove(IMPORT_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(single)) => vec![single],
        Some(Value::Sequence(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(Error::Validation(format!(
                    "import entries must be strings, found {:?} in {}",
                    other,
                    path.display()
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(Error::Validation(format!(
                "`import` must be a list of files, found {:?} in {}",
                other,
                path.display()
            )))
        }
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut merged = Mapping::new();
    for import in imports {
        let import_path = expand_path(&import, parent)?;
        tracing::debug!("Importing settings from {}", import_path.display());
        for (key, value) in load_merged(&import_path, depth + 1)? {
            merged.insert(key, value);
        }
    }
    for (key, value) in own {
        merged.insert(key, value);
    }
    Ok(merged)
}
