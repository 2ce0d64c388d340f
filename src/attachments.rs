//! Socket attachment definitions
//!
//! Each attachment lives in its own YAML (or JSON) file:
//!
//! ```yaml
//! attachmentId: KateBackpack
//! modelCategory: SurvivorTorso
//! displayName: Backpack
//! attachmentData:
//!   Name: SocketAttachements
//!   Value: [...]
//! ```
//!
//! `attachmentData` is an opaque node of the data table and is embedded
//! verbatim into generated rows. Files are loaded in filename order, which
//! also fixes the order attachments are combined in.

use crate::asset::{named_property_mut, AssetNode};
use crate::category::ModelCategory;
use crate::console::Prompter;
use crate::fs_utils::{list_files, WriteGate};
use crate::results::Diagnostics;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions recognized as attachment files
pub const ATTACHMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

const FILE_PREFIX: &str = "SocketAttachment";
const BLUEPRINT_PROPERTY: &str = "AttachementBlueprint";

/// On-disk layout of an attachment file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentFile {
    #[serde(default)]
    attachment_id: Option<String>,
    #[serde(default)]
    model_category: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_base_name: Option<String>,
    #[serde(default)]
    attachment_data: AssetNode,
}

/// A validated attachment definition
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub attachment_id: String,
    pub model_category: ModelCategory,
    pub display_name: String,
    pub attachment_data: AssetNode,
    /// Only used to build the canonical filename
    pub model_base_name: Option<String>,
    pub source_path: PathBuf,
}

impl Attachment {
    /// Name contributed to generated display names
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.attachment_id
        } else {
            self.display_name.trim()
        }
    }

    /// `SocketAttachment_[<modelBaseName>_]<shortCategory>_<attachmentId>.<ext>`
    ///
    /// JSON files keep their extension; everything else becomes `.yaml`.
    pub fn canonical_file_name(&self) -> String {
        let is_json = self
            .source_path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let ext = if is_json { "json" } else { "yaml" };

        let mut name = FILE_PREFIX.to_string();
        if let Some(base) = self.model_base_name.as_deref().filter(|b| !b.is_empty()) {
            name.push('_');
            name.push_str(base);
        }
        format!(
            "{}_{}_{}.{}",
            name,
            self.model_category.short_name(),
            self.attachment_id,
            ext
        )
    }
}

/// Whether an id is usable in filenames and row ids
pub fn is_valid_attachment_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Parse one attachment file
pub fn load_attachment(path: &Path) -> Result<Attachment> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let raw: AttachmentFile = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    let attachment_id = raw
        .attachment_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Validation(format!("{}: attachmentId is missing", path.display())))?;
    if !is_valid_attachment_id(&attachment_id) {
        return Err(Error::Validation(format!(
            "{}: attachmentId '{}' may only contain letters, digits, '_', '.' and '-'",
            path.display(),
            attachment_id
        )));
    }

    let category = raw
        .model_category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::Validation(format!("{}: modelCategory is missing", path.display())))?;
    let model_category = category
        .parse::<ModelCategory>()
        .map_err(|e| Error::Validation(format!("{}: {}", path.display(), e)))?;

    Ok(Attachment {
        attachment_id,
        model_category,
        display_name: raw.display_name.unwrap_or_default(),
        attachment_data: raw.attachment_data,
        model_base_name: raw.model_base_name,
        source_path: path.to_path_buf(),
    })
}

/// Attachments grouped by category, each group in load order
#[derive(Debug, Clone, Default)]
pub struct AttachmentStore {
    by_category: BTreeMap<ModelCategory, Vec<Attachment>>,
}

impl AttachmentStore {
    /// Load every attachment file below `dir`
    ///
    /// Invalid files are recorded as errors and skipped; a duplicate id
    /// within a category is a warning and the later file is skipped.
    pub fn load(dir: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let mut store = Self::default();
        for path in list_files(dir, &ATTACHMENT_EXTENSIONS)? {
            match load_attachment(&path) {
                Ok(attachment) => store.insert(attachment, diagnostics),
                Err(e) => diagnostics.error(format!("Skipping attachment file: {}", e)),
            }
        }
        tracing::debug!("Loaded {} attachments from {}", store.len(), dir.display());
        Ok(store)
    }

    /// Add an attachment, refusing duplicate ids within its category
    pub fn insert(&mut self, attachment: Attachment, diagnostics: &mut Diagnostics) {
        let group = self.by_category.entry(attachment.model_category).or_default();
        if let Some(existing) = group
            .iter()
            .find(|a| a.attachment_id == attachment.attachment_id)
        {
            diagnostics.warn(format!(
                "Duplicate attachment id '{}' in {}: keeping {}, skipping {}",
                attachment.attachment_id,
                attachment.model_category,
                existing.source_path.display(),
                attachment.source_path.display()
            ));
            return;
        }
        group.push(attachment);
    }

    /// Attachments of `category` in load order
    pub fn get(&self, category: ModelCategory) -> &[Attachment] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, category: ModelCategory, id: &str) -> bool {
        self.get(category).iter().any(|a| a.attachment_id == id)
    }

    pub fn categories(&self) -> impl Iterator<Item = ModelCategory> + '_ {
        self.by_category.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.by_category.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rename every attachment file to its canonical name
    ///
    /// Returns the performed `(from, to)` moves. A destination that already
    /// exists is recorded as an error and the file is left alone.
    pub fn rename_all(&mut self, diagnostics: &mut Diagnostics) -> Vec<(PathBuf, PathBuf)> {
        let mut moves = Vec::new();
        for attachment in self.by_category.values_mut().flatten() {
            let Some(dir) = attachment.source_path.parent() else {
                continue;
            };
            let target = dir.join(attachment.canonical_file_name());
            if target == attachment.source_path {
                continue;
            }
            if target.exists() {
                diagnostics.error(format!(
                    "Cannot rename {}: {} already exists",
                    attachment.source_path.display(),
                    target.display()
                ));
                continue;
            }
            match fs::rename(&attachment.source_path, &target) {
                Ok(()) => {
                    tracing::info!(
                        "Renamed {} -> {}",
                        attachment.source_path.display(),
                        target.display()
                    );
                    moves.push((attachment.source_path.clone(), target.clone()));
                    attachment.source_path = target;
                }
                Err(e) => diagnostics.error(format!(
                    "Cannot rename {}: {}",
                    attachment.source_path.display(),
                    e
                )),
            }
        }
        moves
    }
}

/// Append `.<Stem>_C` to a `/Game/.../<Stem>` reference when missing
pub fn normalize_blueprint_reference(reference: &str) -> Result<String> {
    let reference = reference.trim().replace('\\', "/");
    if !reference.starts_with('/') {
        return Err(Error::Validation(format!(
            "asset reference '{}' must be rooted, e.g. /Game/Characters/Kate/BP_KateBackpack",
            reference
        )));
    }
    let last = reference.rsplit('/').next().unwrap_or_default();
    if last.is_empty() {
        return Err(Error::Validation(format!(
            "asset reference '{}' does not name an asset",
            reference
        )));
    }
    if last.contains('.') {
        return Ok(reference.to_string());
    }
    Ok(format!("{}.{}_C", reference, last))
}

/// Socket attachment node used when no template file is configured
pub fn builtin_template() -> AssetNode {
    serde_json::json!({
        "$type": "UAssetAPI.PropertyTypes.Structs.StructPropertyData, UAssetAPI",
        "StructType": "SocketAttachement",
        "SerializeNone": true,
        "StructGUID": "{00000000-0000-0000-0000-000000000000}",
        "Name": "SocketAttachements",
        "DuplicationIndex": 0,
        "Value": [
            {
                "$type": "UAssetAPI.PropertyTypes.Objects.NamePropertyData, UAssetAPI",
                "Name": "SocketName",
                "DuplicationIndex": 0,
                "Value": "None"
            },
            {
                "$type": "UAssetAPI.PropertyTypes.Objects.SoftObjectPropertyData, UAssetAPI",
                "Name": BLUEPRINT_PROPERTY,
                "DuplicationIndex": 0,
                "Value": {
                    "$type": "UAssetAPI.PropertyTypes.Objects.FSoftObjectPath, UAssetAPI",
                    "AssetPath": {
                        "$type": "UAssetAPI.PropertyTypes.Objects.FTopLevelAssetPath, UAssetAPI",
                        "PackageName": null,
                        "AssetName": ""
                    },
                    "SubPathString": null
                }
            }
        ]
    })
}

fn set_first_key(node: &mut AssetNode, key: &str, value: &str) -> bool {
    match node {
        AssetNode::Object(map) => {
            if let Some(slot) = map.get_mut(key) {
                *slot = AssetNode::String(value.to_string());
                return true;
            }
            map.values_mut().any(|child| set_first_key(child, key, value))
        }
        AssetNode::Array(items) => items.iter_mut().any(|child| set_first_key(child, key, value)),
        _ => false,
    }
}

/// Point the template's `AttachementBlueprint` at `reference`
pub fn set_blueprint_reference(data: &mut AssetNode, reference: &str) -> Result<()> {
    let property = named_property_mut(data, BLUEPRINT_PROPERTY).ok_or_else(|| {
        Error::Validation(format!("attachment template has no {} property", BLUEPRINT_PROPERTY))
    })?;
    if set_first_key(property, "AssetName", reference) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} property of the template has no AssetName",
            BLUEPRINT_PROPERTY
        )))
    }
}

/// Load the template's `attachmentData`, or the built-in template
fn load_template(template: Option<&Path>) -> Result<AssetNode> {
    let Some(path) = template else {
        return Ok(builtin_template());
    };
    if !path.is_file() {
        return Err(Error::missing_path("attachment template", path));
    }
    let content = fs::read_to_string(path)?;
    let raw: AttachmentFile = if path.extension().map(|e| e == "json").unwrap_or(false) {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    if raw.attachment_data.is_null() {
        return Err(Error::Validation(format!(
            "attachment template {} has no attachmentData",
            path.display()
        )));
    }
    Ok(raw.attachment_data)
}

/// Interactive creation of a new attachment file
///
/// Prompts for category, id, display name and blueprint reference. Returns
/// `Ok(None)` when the user abandons the flow or keeps an existing file.
pub fn create_attachment(
    prompter: &mut dyn Prompter,
    attachments_dir: &Path,
    template: Option<&Path>,
    gate: &mut WriteGate,
) -> Result<Option<PathBuf>> {
    let choices = ModelCategory::ALL.map(|c| c.name());
    let Some(category) = prompter.choose("Model category of the new attachment?", &choices)? else {
        return Ok(None);
    };
    let model_category: ModelCategory = category.parse()?;

    let Some(attachment_id) = prompter.ask("Attachment id (letters, digits, '_', '.', '-'):")? else {
        return Ok(None);
    };
    if !is_valid_attachment_id(&attachment_id) {
        return Err(Error::Validation(format!("invalid attachment id '{}'", attachment_id)));
    }

    let Some(display_name) = prompter.ask("Display name:")? else {
        return Ok(None);
    };

    let Some(reference) = prompter.ask("Blueprint reference (/Game/.../<Name>):")? else {
        return Ok(None);
    };
    let reference = normalize_blueprint_reference(&reference)?;

    let mut attachment_data = load_template(template)?;
    set_blueprint_reference(&mut attachment_data, &reference)?;

    let attachment = Attachment {
        attachment_id,
        model_category,
        display_name,
        attachment_data,
        model_base_name: None,
        source_path: attachments_dir.join("new.yaml"),
    };
    let path = attachments_dir.join(attachment.canonical_file_name());
    if !gate.ready_to_write(&path)? {
        return Ok(None);
    }

    let file = AttachmentFile {
        attachment_id: Some(attachment.attachment_id.clone()),
        model_category: Some(attachment.model_category.name().to_string()),
        display_name: Some(attachment.display_name.clone()),
        model_base_name: None,
        attachment_data: attachment.attachment_data,
    };
    fs::write(&path, serde_yaml::to_string(&file)?)?;
    tracing::info!("Created attachment {}", path.display());
    Ok(Some(path))
}
