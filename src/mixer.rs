//! Combination engine
//!
//! For every base model row of the data table (a row whose socket
//! attachment list is empty) the mixer enumerates every non-empty subset of
//! the attachments loaded for the row's category, keeps the admissible ones
//! and writes one new row per subset right after the base row.
//!
//! Generated rows are named `<modelBaseName>_<shortCategory>_<HASH>` where
//! `HASH` is the upper-case MD5 of the attachment ids joined with `_`, and
//! carry the display name `<baseDisplay> (<attachment names>)` whose text
//! key is the upper-case MD5 of the lower-cased display name. Mixing an
//! already mixed table regenerates the same rows in the same places.

use crate::asset::name_map::{rebuild_name_map, NameMapDiff};
use crate::asset::{
    data_table_rows, data_table_rows_mut, find_enum_by_type, find_struct_by_type, find_struct_by_type_mut,
    named_property, named_property_mut, property_list, set_property_value, AssetNode,
};
use crate::attachments::{Attachment, AttachmentStore};
use crate::category::{ModelCategory, CATEGORY_ENUM_TYPE};
use crate::results::Diagnostics;
use crate::rules::CompiledRules;
use crate::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use md5::{Digest, Md5};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

pub const ID_PROPERTY: &str = "ID";
pub const UI_DATA_STRUCT: &str = "ItemUIData";
pub const DISPLAY_NAME_PROPERTY: &str = "DisplayName";
pub const SOCKET_ATTACHMENTS_PROPERTY: &str = "SocketAttachements";
const CULTURE_INVARIANT_KEY: &str = "CultureInvariantString";
const DUMMY_STRUCT_KEY: &str = "DummyStruct";

/// Upper-case hex MD5 of `input`
pub fn md5_upper(input: &str) -> String {
    hex::encode_upper(Md5::digest(input.as_bytes()))
}

/// `<modelBaseName>_<shortCategory>_<UPPER(MD5(ids joined by "_"))>`
pub fn combination_row_id(model_base_name: &str, category: ModelCategory, ids: &[&str]) -> String {
    format!(
        "{}_{}_{}",
        model_base_name,
        category.short_name(),
        md5_upper(&ids.join("_"))
    )
}

/// Text key of a display name: `UPPER(MD5(lower(display)))`
pub fn display_name_key(display: &str) -> String {
    md5_upper(&display.to_lowercase())
}

/// Outcome of a mixing pass
#[derive(Debug, Clone, Default)]
pub struct MixReport {
    /// Generated row ids, in table order
    pub added: Vec<String>,
    /// Rejected combinations as `<row> [<ids>]`
    pub skipped: Vec<String>,
    /// Previously generated rows that were regenerated
    pub replaced: usize,
    pub name_map: NameMapDiff,
}

/// Row name as stored in the table
pub fn row_name(row: &AssetNode) -> Option<&str> {
    row.get("Name").and_then(Value::as_str)
}

/// Whether `row` is a base model: its socket attachment list is empty
pub fn is_base_model(row: &AssetNode) -> bool {
    named_property(row, SOCKET_ATTACHMENTS_PROPERTY)
        .and_then(property_list)
        .map(|items| items.is_empty())
        .unwrap_or(false)
}

/// Display name of a row, if it has one
pub fn row_display_name(row: &AssetNode) -> Option<&str> {
    let ui = find_struct_by_type(row, UI_DATA_STRUCT)?;
    named_property(ui, DISPLAY_NAME_PROPERTY)?
        .get(CULTURE_INVARIANT_KEY)
        .and_then(Value::as_str)
}

/// Facts about a base model row the combinations are derived from
struct BaseModel<'a> {
    row: &'a AssetNode,
    name: &'a str,
    model_base_name: &'a str,
    category: ModelCategory,
    display_base: String,
}

impl<'a> BaseModel<'a> {
    fn inspect(row: &'a AssetNode) -> Result<Self> {
        let name = row_name(row).ok_or_else(|| Error::Validation("row has no Name".to_string()))?;
        let model_base_name = name.split('_').next().unwrap_or(name);

        let category_name = find_enum_by_type(row, CATEGORY_ENUM_TYPE)
            .ok_or_else(|| Error::Validation(format!("row {} has no {} property", name, CATEGORY_ENUM_TYPE)))?;
        let category = category_name
            .parse::<ModelCategory>()
            .map_err(|e| Error::Validation(format!("row {}: {}", name, e)))?;

        let display = row_display_name(row).unwrap_or_default();
        let display_base = display.split('(').next().unwrap_or_default().trim();
        let display_base = if display_base.is_empty() {
            model_base_name.to_string()
        } else {
            display_base.to_string()
        };

        Ok(Self {
            row,
            name,
            model_base_name,
            category,
            display_base,
        })
    }

    /// Copy of the base row carrying `attachments`
    fn derive(&self, attachments: &[&Attachment]) -> Result<(String, AssetNode)> {
        let ids: Vec<&str> = attachments.iter().map(|a| a.attachment_id.as_str()).collect();
        let row_id = combination_row_id(self.model_base_name, self.category, &ids);
        let display = format!(
            "{} ({})",
            self.display_base,
            attachments.iter().map(|a| a.label()).join(", ")
        );

        let mut row = self.row.clone();
        row["Name"] = Value::String(row_id.clone());

        let id = named_property_mut(&mut row, ID_PROPERTY)
            .ok_or_else(|| Error::Validation(format!("row {} has no {} property", self.name, ID_PROPERTY)))?;
        set_property_value(id, Value::String(row_id.clone()))?;

        let display_name = find_struct_by_type_mut(&mut row, UI_DATA_STRUCT)
            .and_then(|ui| named_property_mut(ui, DISPLAY_NAME_PROPERTY))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "row {} has no {}.{} property",
                    self.name, UI_DATA_STRUCT, DISPLAY_NAME_PROPERTY
                ))
            })?;
        display_name.insert(CULTURE_INVARIANT_KEY.to_string(), Value::String(display.clone()));
        display_name.insert("Value".to_string(), Value::String(display_name_key(&display)));

        let sockets = named_property_mut(&mut row, SOCKET_ATTACHMENTS_PROPERTY)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                Error::Validation(format!("row {} has no {} property", self.name, SOCKET_ATTACHMENTS_PROPERTY))
            })?;
        sockets.shift_remove(DUMMY_STRUCT_KEY);
        sockets.insert(
            "Value".to_string(),
            Value::Array(attachments.iter().map(|a| a.attachment_data.clone()).collect()),
        );

        Ok((row_id, row))
    }
}

/// Expand the data table of `tree` with every admissible combination
///
/// Row-level problems are recorded in `diagnostics` and the row is kept
/// unchanged; only a tree without a data table fails the whole pass.
pub fn mix(
    tree: &mut AssetNode,
    rules: &CompiledRules,
    store: &AttachmentStore,
    diagnostics: &mut Diagnostics,
) -> Result<MixReport> {
    let rows = data_table_rows(tree)?;
    let mut report = MixReport::default();

    let pb = ProgressBar::new(rows.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb.set_message("Mixing attachments...");

    // Derivatives per base row index
    let mut derived: Vec<Vec<AssetNode>> = vec![Vec::new(); rows.len()];
    let mut generated: HashSet<String> = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        pb.inc(1);
        if !is_base_model(row) {
            continue;
        }
        let base = match BaseModel::inspect(row) {
            Ok(base) => base,
            Err(e) => {
                diagnostics.error(format!("Skipping row: {}", e));
                continue;
            }
        };

        let attachments = store.get(base.category);
        if attachments.is_empty() {
            continue;
        }

        let mut new_rows = Vec::new();
        let mut row_failed = false;
        for subset in attachments.iter().powerset().skip(1) {
            let ids: BTreeSet<String> = subset.iter().map(|a| a.attachment_id.clone()).collect();
            if !rules.is_admissible(base.category, base.model_base_name, &ids) {
                report.skipped.push(format!(
                    "{} [{}]",
                    base.name,
                    subset.iter().map(|a| a.attachment_id.as_str()).join(", ")
                ));
                continue;
            }

            match base.derive(&subset) {
                Ok((row_id, new_row)) => {
                    if !generated.insert(row_id.clone()) {
                        diagnostics.warn(format!(
                            "Row {} generated again from base {}; keeping the first",
                            row_id, base.name
                        ));
                        continue;
                    }
                    new_rows.push((row_id, new_row));
                }
                Err(e) => {
                    diagnostics.error(format!("Skipping row {}: {}", base.name, e));
                    row_failed = true;
                    break;
                }
            }
        }
        if row_failed {
            for (row_id, _) in &new_rows {
                generated.remove(row_id);
            }
            continue;
        }

        for (row_id, new_row) in new_rows {
            report.added.push(row_id);
            derived[index].push(new_row);
        }
    }
    pb.finish_and_clear();

    let rows = data_table_rows_mut(tree)?;
    let original = std::mem::take(rows);
    for (row, mut children) in original.into_iter().zip(derived) {
        let regenerated = !is_base_model(&row) && row_name(&row).map(|n| generated.contains(n)).unwrap_or(false);
        if regenerated {
            report.replaced += 1;
            continue;
        }
        rows.push(row);
        rows.append(&mut children);
    }

    report.name_map = rebuild_name_map(tree)?;
    tracing::info!(
        "Mixed {} new rows ({} regenerated), skipped {} combinations",
        report.added.len(),
        report.replaced,
        report.skipped.len()
    );
    Ok(report)
}
