//! Name table reconstruction
//!
//! After the data table is rewritten the asset's `NameMap` must list every
//! identifier referenced from `Imports` and `Exports`. The table is rebuilt
//! from scratch by walking both sections, then sorted by upper-cased value.

use super::AssetNode;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeSet;

/// Property-type tags that are always present in the name table
pub const NAME_FLOOR: [&str; 8] = [
    "EnumProperty",
    "TextProperty",
    "ObjectProperty",
    "BoolProperty",
    "UInt32Property",
    "MapProperty",
    "IntProperty",
    "ArrayProperty",
];

/// Keys whose values are opaque and never names
const OPAQUE_KEYS: [&str; 8] = [
    "PackageGuid",
    "PersistentGuid",
    "PackageFlags",
    "ObjectFlags",
    "HistoryType",
    "TransformType",
    "CultureInvariantString",
    "$type",
];

const TYPE_KEY: &str = "$type";

/// Entries added to and removed from the name table by a rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMapDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Collect every name referenced by `Imports` and `Exports`, floor included
pub fn collect_names(tree: &AssetNode) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = NAME_FLOOR.iter().map(|s| s.to_string()).collect();
    for section in ["Imports", "Exports"] {
        if let Some(node) = tree.get(section) {
            walk(node, &mut names);
        }
    }
    names
}

fn walk(node: &AssetNode, names: &mut BTreeSet<String>) {
    match node {
        Value::Object(map) => {
            let type_tag = map.get(TYPE_KEY).and_then(Value::as_str).unwrap_or("");
            let is_vector2d = type_tag.contains("FVector2D");
            let is_text_leaf = type_tag.contains("StrPropertyData") || type_tag.contains("TextPropertyData");

            for (key, child) in map {
                if OPAQUE_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if is_vector2d && (key == "X" || key == "Y") {
                    continue;
                }
                if is_text_leaf && key == "Value" {
                    continue;
                }
                if key == "AssetName" {
                    if let Some(path) = child.as_str() {
                        add_dotted_prefixes(path, names);
                        continue;
                    }
                }
                walk(child, names);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| walk(item, names)),
        Value::String(s) => add_name(s, names),
        _ => {}
    }
}

fn add_name(value: &str, names: &mut BTreeSet<String>) {
    if value.is_empty() || value == "0" || value == "+0" {
        return;
    }
    names.insert(value.to_string());
}

/// `/Game/A.B_C` adds `/Game/A` and `/Game/A.B_C`
fn add_dotted_prefixes(path: &str, names: &mut BTreeSet<String>) {
    for (idx, _) in path.match_indices('.') {
        add_name(&path[..idx], names);
    }
    add_name(path, names);
}

/// Order names by upper-cased value, ties broken ordinally
pub fn sort_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut sorted: Vec<String> = names.into_iter().collect();
    sorted.sort_by(|a, b| a.to_uppercase().cmp(&b.to_uppercase()).then_with(|| a.cmp(b)));
    sorted
}

/// Replace the tree's `NameMap` with the rebuilt table
pub fn rebuild_name_map(tree: &mut AssetNode) -> Result<NameMapDiff> {
    let names = collect_names(tree);

    let previous: BTreeSet<String> = tree
        .get("NameMap")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let diff = NameMapDiff {
        added: sort_names(names.difference(&previous).cloned()),
        removed: sort_names(previous.difference(&names).cloned()),
    };

    let ordered = sort_names(names).into_iter().map(Value::String).collect();
    let object = tree
        .as_object_mut()
        .ok_or_else(|| Error::Validation("asset JSON root is not an object".to_string()))?;
    object.insert("NameMap".to_string(), Value::Array(ordered));

    tracing::debug!(
        "Name map rebuilt: {} added, {} removed",
        diff.added.len(),
        diff.removed.len()
    );
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> AssetNode {
        json!({
            "NameMap": ["ArrayProperty", "Stale_Name", "IntProperty"],
            "Imports": [
                {
                    "$type": "UAssetAPI.Import, UAssetAPI",
                    "ObjectName": "KateBackpack_C",
                    "ClassPackage": "/Script/Engine",
                    "PackageGuid": "{00000000-0000-0000-0000-000000000000}"
                }
            ],
            "Exports": [
                {
                    "$type": "UAssetAPI.ExportTypes.DataTableExport, UAssetAPI",
                    "ObjectFlags": "RF_Public",
                    "Table": {
                        "Data": [
                            {
                                "$type": "UAssetAPI.PropertyTypes.Structs.StructPropertyData, UAssetAPI",
                                "Name": "Kate_Torso01",
                                "Value": [
                                    {
                                        "$type": "UAssetAPI.PropertyTypes.Objects.TextPropertyData, UAssetAPI",
                                        "Name": "DisplayName",
                                        "HistoryType": "Base",
                                        "CultureInvariantString": "Kate Cosmetic",
                                        "Value": "9C2B1E5A8F7D4C3B2A1908F7E6D5C4B3"
                                    },
                                    {
                                        "$type": "UAssetAPI.PropertyTypes.Objects.StrPropertyData, UAssetAPI",
                                        "Name": "Notes",
                                        "Value": "free text"
                                    },
                                    {
                                        "$type": "UAssetAPI.PropertyTypes.Structs.FVector2DPropertyData, UAssetAPI",
                                        "Name": "Offset",
                                        "X": "1.5",
                                        "Y": "0"
                                    },
                                    {
                                        "Name": "AttachementBlueprint",
                                        "Value": {
                                            "AssetPath": {
                                                "AssetName": "/Game/Characters/Kate/BP_KateBackpack.BP_KateBackpack_C"
                                            },
                                            "SubPathString": ""
                                        }
                                    },
                                    { "Name": "Count", "Value": "+0" }
                                ]
                            }
                        ]
                    }
                }
            ]
        })
    }

    #[test]
    fn test_collect_names_skips_opaque_values() {
        let names = collect_names(&sample_tree());

        for expected in [
            "KateBackpack_C",
            "/Script/Engine",
            "Kate_Torso01",
            "DisplayName",
            "Notes",
            "Offset",
            "AttachementBlueprint",
            "Count",
            "EnumProperty",
        ] {
            assert!(names.contains(expected), "missing {expected}");
        }

        for skipped in [
            "Kate Cosmetic",
            "9C2B1E5A8F7D4C3B2A1908F7E6D5C4B3",
            "free text",
            "1.5",
            "RF_Public",
            "Base",
            "+0",
            "",
            "{00000000-0000-0000-0000-000000000000}",
            "UAssetAPI.Import, UAssetAPI",
        ] {
            assert!(!names.contains(skipped), "unexpected {skipped}");
        }
    }

    #[test]
    fn test_asset_name_adds_dotted_prefixes() {
        let names = collect_names(&sample_tree());
        assert!(names.contains("/Game/Characters/Kate/BP_KateBackpack"));
        assert!(names.contains("/Game/Characters/Kate/BP_KateBackpack.BP_KateBackpack_C"));
    }

    #[test]
    fn test_sort_is_case_insensitive() {
        let sorted = sort_names(["beta", "Alpha", "ALPHA", "_x", "Gamma"].map(String::from));
        assert_eq!(sorted, ["ALPHA", "Alpha", "beta", "Gamma", "_x"]);
    }

    #[test]
    fn test_rebuild_name_map_diff() {
        let mut tree = sample_tree();
        let diff = rebuild_name_map(&mut tree).unwrap();

        assert_eq!(diff.removed, ["Stale_Name"]);
        assert!(diff.added.contains(&"Kate_Torso01".to_string()));
        assert!(!diff.added.contains(&"ArrayProperty".to_string()));

        let map: Vec<&str> = tree["NameMap"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let mut expected = map.clone();
        expected.sort_by_key(|s| s.to_uppercase());
        assert_eq!(map, expected);
        assert!(map.contains(&"UInt32Property"));
    }

    #[test]
    fn test_rebuild_is_stable() {
        let mut tree = sample_tree();
        rebuild_name_map(&mut tree).unwrap();
        let first = tree["NameMap"].clone();
        let diff = rebuild_name_map(&mut tree).unwrap();
        assert_eq!(tree["NameMap"], first);
        assert_eq!(diff, NameMapDiff::default());
    }
}
