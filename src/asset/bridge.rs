//! Asset <-> JSON conversion through the external asset converter
//!
//! The converter is invoked as
//!
//! ```text
//! UAssetGUI tojson <asset> <json> <engineVersion>
//! UAssetGUI fromjson <json> <asset>
//! ```
//!
//! and the JSON file always sits next to the asset with a `.json` extension.

use super::{load_tree, save_tree, AssetNode};
use crate::fs_utils::WriteGate;
use crate::platform::ExternalTool;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// JSON companion path of an asset: same location, `.json` extension
pub fn json_path_for(asset: &Path) -> PathBuf {
    asset.with_extension("json")
}

/// Wrapper around the configured asset converter
#[derive(Debug, Clone)]
pub struct AssetConverter {
    tool: ExternalTool,
    engine_version: String,
}

impl AssetConverter {
    pub fn new(converter_path: PathBuf, engine_version: impl Into<String>) -> Self {
        Self {
            tool: ExternalTool::new("UAssetGUI", converter_path),
            engine_version: engine_version.into(),
        }
    }

    /// Export `asset` to its JSON companion and return the companion's path
    pub fn to_json(&self, asset: &Path, gate: &mut WriteGate) -> Result<PathBuf> {
        if !asset.is_file() {
            return Err(Error::missing_path("asset", asset));
        }
        let json = json_path_for(asset);
        if !gate.ready_to_write(&json)? {
            tracing::info!("Keeping existing {}", json.display());
            return Ok(json);
        }

        let args = vec![
            "tojson".to_string(),
            self.tool.path_arg(asset),
            self.tool.path_arg(&json),
            self.engine_version.clone(),
        ];
        self.tool.run(&args, asset)?;

        if !json.is_file() {
            return Err(Error::Conversion {
                tool: self.tool.name().to_string(),
                status: "no JSON output".to_string(),
                subject: asset.to_path_buf(),
                command: args.join(" "),
            });
        }
        Ok(json)
    }

    /// Rebuild `asset` from `json`
    pub fn from_json(&self, json: &Path, asset: &Path, gate: &mut WriteGate) -> Result<()> {
        if !json.is_file() {
            return Err(Error::missing_path("asset JSON", json));
        }
        if !gate.ready_to_write(asset)? {
            tracing::info!("Keeping existing {}", asset.display());
            return Ok(());
        }

        let args = vec![
            "fromjson".to_string(),
            self.tool.path_arg(json),
            self.tool.path_arg(asset),
        ];
        self.tool.run(&args, json)
    }

    /// Export `asset` and parse the resulting JSON
    pub fn read_asset(&self, asset: &Path, gate: &mut WriteGate) -> Result<AssetNode> {
        let json = self.to_json(asset, gate)?;
        load_tree(&json)
    }

    /// Write `tree` to `dest`'s JSON companion and convert it into `dest`
    pub fn write_asset(&self, tree: &AssetNode, dest: &Path, gate: &mut WriteGate) -> Result<()> {
        let json = json_path_for(dest);
        if gate.ready_to_write(&json)? {
            save_tree(tree, &json)?;
        }
        self.from_json(&json, dest, gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::OverwritePolicy;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_json_path_for() {
        assert_eq!(
            json_path_for(Path::new("/paking/Content/Data/CustomizationItemDB.uasset")),
            Path::new("/paking/Content/Data/CustomizationItemDB.json")
        );
    }

    #[test]
    fn test_to_json_missing_asset() {
        let temp_dir = TempDir::new().unwrap();
        let converter = AssetConverter::new(temp_dir.path().join("UAssetGUI"), "VER_UE4_27");
        let mut gate = WriteGate::new(OverwritePolicy::Always);

        let err = converter
            .to_json(&temp_dir.path().join("missing.uasset"), &mut gate)
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_to_json_missing_converter() {
        let temp_dir = TempDir::new().unwrap();
        let asset = temp_dir.path().join("CustomizationItemDB.uasset");
        fs::write(&asset, b"binary").unwrap();

        let converter = AssetConverter::new(temp_dir.path().join("UAssetGUI"), "VER_UE4_27");
        let mut gate = WriteGate::new(OverwritePolicy::Always);
        let err = converter.to_json(&asset, &mut gate).unwrap_err();
        assert!(err.to_string().contains("UAssetGUI executable not found"));
    }

    #[test]
    fn test_to_json_never_refuses_existing_json() {
        let temp_dir = TempDir::new().unwrap();
        let asset = temp_dir.path().join("CustomizationItemDB.uasset");
        fs::write(&asset, b"binary").unwrap();
        fs::write(json_path_for(&asset), "{}").unwrap();

        let converter = AssetConverter::new(temp_dir.path().join("UAssetGUI"), "VER_UE4_27");
        let mut gate = WriteGate::new(OverwritePolicy::Never);
        let err = converter.to_json(&asset, &mut gate).unwrap_err();
        assert!(matches!(err, Error::OverwriteDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_converter_is_conversion_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let tool = temp_dir.path().join("UAssetGUI");
        fs::write(&tool, "#!/bin/sh\necho broken asset >&2\nexit 3\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let asset = temp_dir.path().join("CustomizationItemDB.uasset");
        fs::write(&asset, b"binary").unwrap();

        let converter = AssetConverter::new(tool, "VER_UE4_27");
        let mut gate = WriteGate::new(OverwritePolicy::Always);
        let err = converter.to_json(&asset, &mut gate).unwrap_err();
        match err {
            Error::Conversion { status, subject, .. } => {
                assert_eq!(status, "exit code 3");
                assert_eq!(subject, asset);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
