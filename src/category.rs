//! Body-part categories of customization items
//!
//! Only survivor torso, legs and head items can carry socket attachments
//! that the mixer knows how to combine. Any other category found in the
//! data table (killer parts, charms, badges, ...) is reported as a
//! validation error on that row.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Enum type tag of the category property in the data table
pub const CATEGORY_ENUM_TYPE: &str = "ECustomizationCategory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelCategory {
    SurvivorHead,
    SurvivorTorso,
    SurvivorLegs,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 3] = [
        ModelCategory::SurvivorHead,
        ModelCategory::SurvivorTorso,
        ModelCategory::SurvivorLegs,
    ];

    /// Full enum member name, e.g. `SurvivorTorso`
    pub fn name(&self) -> &'static str {
        match self {
            ModelCategory::SurvivorHead => "SurvivorHead",
            ModelCategory::SurvivorTorso => "SurvivorTorso",
            ModelCategory::SurvivorLegs => "SurvivorLegs",
        }
    }

    /// Short name used in row ids and filenames, e.g. `Torso`
    pub fn short_name(&self) -> &'static str {
        match self {
            ModelCategory::SurvivorHead => "Head",
            ModelCategory::SurvivorTorso => "Torso",
            ModelCategory::SurvivorLegs => "Legs",
        }
    }
}

impl FromStr for ModelCategory {
    type Err = Error;

    /// Accepts the member name with or without the `ECustomizationCategory::`
    /// prefix, case-insensitively
    fn from_str(s: &str) -> Result<Self> {
        let member = s.rsplit("::").next().unwrap_or(s).trim();
        ModelCategory::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(member))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unsupported model category '{}' (supported: {})",
                    s,
                    ModelCategory::ALL.map(|c| c.name()).join(", ")
                ))
            })
    }
}

impl fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
