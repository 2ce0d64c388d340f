//! In-memory asset tree and selectors
//!
//! The asset converter exports a data-table asset as JSON; in memory that
//! JSON is kept as a plain [`AssetNode`] (object / array / string / number /
//! bool / null) and navigated with the small selectors below. Key order is
//! preserved so the tree converts back to the same binary layout.
//!
//! Navigational contracts used throughout the crate:
//!
//! - `Exports` holds one data-table export whose `Table.Data` is the ordered
//!   list of rows.
//! - Each row has a `Name` and a `Value` list of typed properties, among them
//!   an `ID` name property, an `ItemUIData` struct with a `DisplayName` text
//!   property, the category enum and the `SocketAttachements` array.
//! - `NameMap` lists every identifier referenced by `Imports` and `Exports`.
//!
//! # Examples
//!
//! ```
//! use dbd_workbench::asset::{find_next_item_by_fields, property_value};
//! use serde_json::json;
//!
//! let properties = json!([
//!     { "Name": "ID", "Value": "Kate_Torso01" },
//!     { "Name": "SocketAttachements", "Value": [] }
//! ]);
//! let id = find_next_item_by_fields(properties.as_array().unwrap(), &[("Name", "ID")]).unwrap();
//! assert_eq!(property_value(id).and_then(|v| v.as_str()), Some("Kate_Torso01"));
//! ```

pub mod bridge;
pub mod name_map;

use crate::{Error, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub use bridge::AssetConverter;
pub use name_map::{rebuild_name_map, NameMapDiff};

/// A node of the asset tree
pub type AssetNode = Value;

pub const STRUCT_TYPE_KEY: &str = "StructType";
pub const ENUM_TYPE_KEY: &str = "EnumType";
pub const NAME_KEY: &str = "Name";
pub const VALUE_KEY: &str = "Value";

/// Read an exported asset JSON file
pub fn load_tree(path: &Path) -> Result<AssetNode> {
    if !path.is_file() {
        return Err(Error::missing_path("asset JSON", path));
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write an asset tree as JSON
pub fn save_tree(tree: &AssetNode, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(tree)?;
    fs::write(path, content)?;
    Ok(())
}

fn find_descendant<'a>(node: &'a AssetNode, pred: &dyn Fn(&AssetNode) -> bool) -> Option<&'a AssetNode> {
    if pred(node) {
        return Some(node);
    }
    match node {
        Value::Object(map) => map.values().find_map(|child| find_descendant(child, pred)),
        Value::Array(items) => items.iter().find_map(|child| find_descendant(child, pred)),
        _ => None,
    }
}

fn find_descendant_mut<'a>(
    node: &'a mut AssetNode,
    pred: &dyn Fn(&AssetNode) -> bool,
) -> Option<&'a mut AssetNode> {
    if pred(node) {
        return Some(node);
    }
    match node {
        Value::Object(map) => map
            .values_mut()
            .find_map(|child| find_descendant_mut(child, pred)),
        Value::Array(items) => items
            .iter_mut()
            .find_map(|child| find_descendant_mut(child, pred)),
        _ => None,
    }
}

fn has_field(node: &AssetNode, key: &str, expected: &str) -> bool {
    node.get(key).and_then(Value::as_str) == Some(expected)
}

/// First node (pre-order, starting at `node`) whose `StructType` is `tag`
pub fn find_struct_by_type<'a>(node: &'a AssetNode, tag: &str) -> Option<&'a AssetNode> {
    find_descendant(node, &|n| has_field(n, STRUCT_TYPE_KEY, tag))
}

pub fn find_struct_by_type_mut<'a>(node: &'a mut AssetNode, tag: &str) -> Option<&'a mut AssetNode> {
    find_descendant_mut(node, &|n| has_field(n, STRUCT_TYPE_KEY, tag))
}

/// Member name of the first enum property whose `EnumType` is `tag`
///
/// The `EnumType::` prefix of the stored value is stripped.
pub fn find_enum_by_type(node: &AssetNode, tag: &str) -> Option<String> {
    let found = find_descendant(node, &|n| has_field(n, ENUM_TYPE_KEY, tag))?;
    let raw = property_value(found)?.as_str()?;
    Some(raw.rsplit("::").next().unwrap_or(raw).to_string())
}

/// First element of `items` whose named fields all equal the given values
pub fn find_next_item_by_fields<'a>(items: &'a [AssetNode], fields: &[(&str, &str)]) -> Option<&'a AssetNode> {
    items
        .iter()
        .find(|item| fields.iter().all(|(key, value)| has_field(item, key, value)))
}

pub fn find_next_item_by_fields_mut<'a>(
    items: &'a mut [AssetNode],
    fields: &[(&str, &str)],
) -> Option<&'a mut AssetNode> {
    items
        .iter_mut()
        .find(|item| fields.iter().all(|(key, value)| has_field(item, key, value)))
}

/// The element's `Value` field
pub fn property_value(node: &AssetNode) -> Option<&AssetNode> {
    node.get(VALUE_KEY)
}

/// Replace the element's `Value` field
pub fn set_property_value(node: &mut AssetNode, value: AssetNode) -> Result<()> {
    let object = node
        .as_object_mut()
        .ok_or_else(|| Error::Validation("property is not an object".to_string()))?;
    object.insert(VALUE_KEY.to_string(), value);
    Ok(())
}

/// The `Value` list of a struct-like property
pub fn property_list(node: &AssetNode) -> Option<&Vec<AssetNode>> {
    property_value(node).and_then(Value::as_array)
}

pub fn property_list_mut(node: &mut AssetNode) -> Option<&mut Vec<AssetNode>> {
    node.get_mut(VALUE_KEY).and_then(Value::as_array_mut)
}

/// Property named `name` inside a row or struct's `Value` list
pub fn named_property<'a>(node: &'a AssetNode, name: &str) -> Option<&'a AssetNode> {
    find_next_item_by_fields(property_list(node)?, &[(NAME_KEY, name)])
}

pub fn named_property_mut<'a>(node: &'a mut AssetNode, name: &str) -> Option<&'a mut AssetNode> {
    find_next_item_by_fields_mut(property_list_mut(node)?, &[(NAME_KEY, name)])
}

/// Rows of the first data-table export
pub fn data_table_rows_mut(tree: &mut AssetNode) -> Result<&mut Vec<AssetNode>> {
    tree.get_mut("Exports")
        .and_then(Value::as_array_mut)
        .and_then(|exports| {
            exports.iter_mut().find_map(|export| {
                export
                    .get_mut("Table")
                    .and_then(|table| table.get_mut("Data"))
                    .and_then(Value::as_array_mut)
            })
        })
        .ok_or_else(|| Error::Validation("asset has no data-table export with Table.Data".to_string()))
}

pub fn data_table_rows(tree: &AssetNode) -> Result<&Vec<AssetNode>> {
    tree.get("Exports")
        .and_then(Value::as_array)
        .and_then(|exports| {
            exports.iter().find_map(|export| {
                export
                    .get("Table")
                    .and_then(|table| table.get("Data"))
                    .and_then(Value::as_array)
            })
        })
        .ok_or_else(|| Error::Validation("asset has no data-table export with Table.Data".to_string()))
}
