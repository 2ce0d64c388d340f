use anyhow::{Context, Result};
use dbd_workbench::console::Console;
use dbd_workbench::fs_utils::{OverwritePolicy, WriteGate};
use dbd_workbench::{Phases, Session, Settings};
use std::path::PathBuf;

use super::prompt::{overwrite_decision, StdinPrompter};

pub fn run(settings_path: PathBuf, phases: Phases, overwrite: OverwritePolicy, dry_run: bool) -> Result<i32> {
    if phases.is_empty() {
        anyhow::bail!(
            "No phase selected.\n\n\
            Pick one or more of:\n\
              --kill --list --extract --create --rename --mix --pak --install --launch"
        );
    }

    let settings = Settings::load(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let gate = match overwrite {
        OverwritePolicy::Prompt => WriteGate::with_prompt(overwrite, overwrite_decision()),
        policy => WriteGate::new(policy),
    };
    // Record console output so it can be replayed once the launcher returns
    let console = if phases.launch {
        Console::recording()
    } else {
        Console::new()
    };

    println!("Settings: {}", settings.source_path().display());
    if dry_run {
        println!("Dry run: nothing will be moved, packed or written back");
    }
    println!();

    let mut session = Session::new(settings, console, gate, Box::new(StdinPrompter)).with_dry_run(dry_run)
        .with_pause_on_error(overwrite == OverwritePolicy::Prompt);
    let code = session.run(phases).context("Failed to write the results manifest")?;
    Ok(code)
}
