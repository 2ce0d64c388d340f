//! dbd-workbench - socket attachment mod workbench for Dead by Daylight cosmetics
//!
//! The workbench takes a cooked `CustomizationItemDB` data table, a folder of
//! attachment definitions and a set of combination rules, and produces a
//! modded pakchunk containing every admissible cosmetic combination:
//!
//! - Attachment definitions loaded from YAML/JSON files, renamed to a
//!   canonical scheme or created interactively
//! - Rule compilation (equivalent parts, supersets, mutual exclusions,
//!   explicit skips) into a per-category admissibility predicate
//! - Combination mixing with deterministic MD5-derived row ids and a
//!   rebuilt name map
//! - Asset <-> JSON conversion through UAssetGUI, packing through UnrealPak
//! - Mod installation by moving pakchunks in and out of the game's paks
//!   directory according to the active profile
//!
//! # Examples
//!
//! ```no_run
//! use dbd_workbench::console::{Console, ScriptedPrompter};
//! use dbd_workbench::fs_utils::{OverwritePolicy, WriteGate};
//! use dbd_workbench::orchestrator::{Phases, Session};
//! use dbd_workbench::Settings;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(Path::new("kate-mod.yaml"))?;
//! let mut session = Session::new(
//!     settings,
//!     Console::recording(),
//!     WriteGate::new(OverwritePolicy::Always),
//!     Box::new(ScriptedPrompter::default()),
//! );
//!
//! let phases = Phases { mix: true, pak: true, install: true, ..Default::default() };
//! let code = session.run(phases)?;
//! println!("exit code {}", code);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`settings`] - YAML settings with transitive imports
//! - [`attachments`] - Attachment definitions
//! - [`rules`] - Rule compiler and admissibility
//! - [`mixer`] - Combination engine
//! - [`asset`] - Asset JSON trees, the UAssetGUI bridge and the name map
//! - [`pak_builder`] - Pak staging and packing
//! - [`installer`] - Pakchunk reconciliation against the active profile
//! - [`orchestrator`] - Phase sequencing and the results manifest
//! - [`platform`] - External processes, WSL paths, game launch and kill
//! - [`error`] - Error types and result handling

pub mod asset;
pub mod attachments;
pub mod category;
pub mod console;
pub mod error;
pub mod fs_utils;
pub mod installer;
pub mod mixer;
pub mod orchestrator;
pub mod pak_builder;
pub mod pakchunk;
pub mod platform;
pub mod results;
pub mod rules;
pub mod settings;

pub use attachments::{Attachment, AttachmentStore};
pub use category::ModelCategory;
pub use error::{Error, Result};
pub use installer::{InstallAction, InstallPlan};
pub use orchestrator::{Phase, Phases, Session};
pub use pakchunk::Pakchunk;
pub use platform::wsl_to_windows_path;
pub use results::{Diagnostics, RunResults};
pub use rules::CompiledRules;
pub use settings::Settings;
