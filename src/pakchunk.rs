//! Pakchunk filename grammar
//!
//! Pakchunks are named `pakchunk<number><name>-<platform>.pak`, where the
//! name and platform parts are optional word runs and matching is
//! case-insensitive:
//!
//! ```
//! use dbd_workbench::Pakchunk;
//!
//! let chunk: Pakchunk = "pakchunk782essential1v4-WindowsNoEditor.pak".parse().unwrap();
//! assert_eq!(chunk.number, 782);
//! assert_eq!(chunk.name, "essential1v4");
//! assert_eq!(chunk.platform.as_deref(), Some("WindowsNoEditor"));
//! assert_eq!(chunk.file_name(), "pakchunk782essential1v4-WindowsNoEditor.pak");
//! ```

use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Components of a pakchunk name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pakchunk {
    pub number: u32,
    pub name: String,
    pub platform: Option<String>,
}

fn pakchunk_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^pakchunk(?P<number>\d+)(?P<name>\w*?)(?:-(?P<platform>\w+))?(?:\.pak)?$")
            .expect("pakchunk pattern is valid")
    })
}

impl Pakchunk {
    pub fn new(number: u32, name: impl Into<String>, platform: Option<String>) -> Self {
        Self {
            number,
            name: name.into(),
            platform,
        }
    }

    /// Parse a pakchunk stem or filename
    pub fn parse(text: &str) -> Result<Self> {
        let caps = pakchunk_regex()
            .captures(text.trim())
            .ok_or_else(|| Error::Validation(format!("malformed pakchunk name '{}'", text)))?;

        let number = caps["number"]
            .parse()
            .map_err(|_| Error::Validation(format!("pakchunk number out of range in '{}'", text)))?;
        let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
        let platform = caps.name("platform").map(|m| m.as_str().to_string());

        Ok(Self::new(number, name, platform))
    }

    /// Whether a filename looks like a pakchunk archive
    pub fn is_pak_file_name(file_name: &str) -> bool {
        file_name.to_ascii_lowercase().ends_with(".pak") && Self::parse(file_name).is_ok()
    }

    /// Stem without extension, e.g. `pakchunk790enhanced1v1-WindowsNoEditor`
    pub fn stem(&self) -> String {
        self.to_string()
    }

    /// Archive filename, e.g. `pakchunk790enhanced1v1-WindowsNoEditor.pak`
    pub fn file_name(&self) -> String {
        format!("{}.pak", self)
    }

    /// Fill in `platform` when the name did not carry one
    pub fn with_default_platform(mut self, platform: &str) -> Self {
        if self.platform.is_none() && !platform.is_empty() {
            self.platform = Some(platform.to_string());
        }
        self
    }

    /// Case-insensitive identity used for comparisons
    pub fn key(&self) -> String {
        self.stem().to_ascii_lowercase()
    }
}

impl FromStr for Pakchunk {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Pakchunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pakchunk{}{}", self.number, self.name)?;
        if let Some(platform) = &self.platform {
            write!(f, "-{}", platform)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_name() {
        let chunk = Pakchunk::parse("pakchunk782essential1v4-WindowsNoEditor.pak").unwrap();
        assert_eq!(chunk.number, 782);
        assert_eq!(chunk.name, "essential1v4");
        assert_eq!(chunk.platform.as_deref(), Some("WindowsNoEditor"));
    }

    #[test]
    fn test_parse_minimal_names() {
        let chunk = Pakchunk::parse("pakchunk0").unwrap();
        assert_eq!(chunk, Pakchunk::new(0, "", None));

        let chunk = Pakchunk::parse("PAKCHUNK0-WindowsNoEditor").unwrap();
        assert_eq!(chunk.number, 0);
        assert_eq!(chunk.name, "");
        assert_eq!(chunk.platform.as_deref(), Some("WindowsNoEditor"));

        let chunk = Pakchunk::parse("pakchunk584sweet.pak").unwrap();
        assert_eq!(chunk, Pakchunk::new(584, "sweet", None));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Pakchunk::parse("chunk782-WindowsNoEditor.pak").is_err());
        assert!(Pakchunk::parse("pakchunk-WindowsNoEditor.pak").is_err());
        assert!(Pakchunk::parse("pakchunk12 bad name.pak").is_err());
        assert!(Pakchunk::parse("pakchunk99999999999999.pak").is_err());
    }

    #[test]
    fn test_parse_format_parse_round_trip() {
        for text in [
            "pakchunk782essential1v4-WindowsNoEditor",
            "pakchunk0-WindowsNoEditor",
            "pakchunk584sweet",
            "pakchunk7",
        ] {
            let parsed = Pakchunk::parse(text).unwrap();
            assert_eq!(parsed.stem(), text);
            assert_eq!(Pakchunk::parse(&parsed.file_name()).unwrap(), parsed);
        }
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let a = Pakchunk::parse("pakchunk790Enhanced1v1-WindowsNoEditor").unwrap();
        let b = Pakchunk::parse("PAKCHUNK790enhanced1v1-windowsnoeditor.PAK").unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_default_platform() {
        let chunk = Pakchunk::parse("pakchunk0").unwrap().with_default_platform("WindowsNoEditor");
        assert_eq!(chunk.stem(), "pakchunk0-WindowsNoEditor");

        let chunk = Pakchunk::parse("pakchunk0-Other")
            .unwrap()
            .with_default_platform("WindowsNoEditor");
        assert_eq!(chunk.stem(), "pakchunk0-Other");
    }

    #[test]
    fn test_is_pak_file_name() {
        assert!(Pakchunk::is_pak_file_name("pakchunk0-WindowsNoEditor.pak"));
        assert!(!Pakchunk::is_pak_file_name("pakchunk0-WindowsNoEditor.sig"));
        assert!(!Pakchunk::is_pak_file_name("readme.pak.txt"));
    }
}
