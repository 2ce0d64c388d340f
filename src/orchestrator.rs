//! Phase sequencing
//!
//! A run executes the requested phases in a fixed order:
//!
//! ```text
//! kill -> list -> extract -> create -> rename -> mix -> pak -> install -> launch
//! ```
//!
//! A phase that fails records an error and the run moves on to the next
//! phase. The results manifest is written at the end of every run,
//! whatever happened before.

use crate::asset::AssetConverter;
use crate::attachments::{create_attachment, load_attachment, AttachmentStore};
use crate::console::{Console, Prompter};
use crate::fs_utils::{list_files, WriteGate};
use crate::installer::{apply_plan, declared_pakchunks, plan_install, reserved_pakchunks};
use crate::mixer::mix;
use crate::pak_builder::PakBuilder;
use crate::pakchunk::Pakchunk;
use crate::platform::{kill_game_processes, launch_detached};
use crate::results::RunResults;
use crate::rules::CompiledRules;
use crate::settings::Settings;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;

/// One step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Kill,
    List,
    Extract,
    Create,
    Rename,
    Mix,
    Pak,
    Install,
    Launch,
}

impl Phase {
    /// Execution order
    pub const ORDER: [Phase; 9] = [
        Phase::Kill,
        Phase::List,
        Phase::Extract,
        Phase::Create,
        Phase::Rename,
        Phase::Mix,
        Phase::Pak,
        Phase::Install,
        Phase::Launch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Kill => "kill",
            Phase::List => "list",
            Phase::Extract => "extract",
            Phase::Create => "create",
            Phase::Rename => "rename",
            Phase::Mix => "mix",
            Phase::Pak => "pak",
            Phase::Install => "install",
            Phase::Launch => "launch",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested phases, one flag each
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Phases {
    pub kill: bool,
    pub list: bool,
    pub extract: bool,
    pub create: bool,
    pub rename: bool,
    pub mix: bool,
    pub pak: bool,
    pub install: bool,
    pub launch: bool,
}

impl Phases {
    pub fn contains(&self, phase: Phase) -> bool {
        match phase {
            Phase::Kill => self.kill,
            Phase::List => self.list,
            Phase::Extract => self.extract,
            Phase::Create => self.create,
            Phase::Rename => self.rename,
            Phase::Mix => self.mix,
            Phase::Pak => self.pak,
            Phase::Install => self.install,
            Phase::Launch => self.launch,
        }
    }

    /// Requested phases in execution order
    pub fn selected(&self) -> Vec<Phase> {
        Phase::ORDER.into_iter().filter(|p| self.contains(*p)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected().is_empty()
    }
}

/// State shared by the phases of one run
pub struct Session {
    settings: Settings,
    console: Console,
    gate: WriteGate,
    prompter: Box<dyn Prompter>,
    dry_run: bool,
    pause_on_error: bool,
    results: RunResults,
    store: Option<AttachmentStore>,
}

impl Session {
    pub fn new(settings: Settings, console: Console, gate: WriteGate, prompter: Box<dyn Prompter>) -> Self {
        let results = RunResults::new(settings.source_path());
        Self {
            settings,
            console,
            gate,
            prompter,
            dry_run: false,
            pause_on_error: false,
            results,
            store: None,
        }
    }

    /// Print what the mix, pak, install, rename, kill and launch phases
    /// would do without doing it
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Wait for the user after a failed phase before moving on
    pub fn with_pause_on_error(mut self, pause: bool) -> Self {
        self.pause_on_error = pause;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn results(&self) -> &RunResults {
        &self.results
    }

    /// Run the requested phases, write the manifest and return the exit code
    pub fn run(&mut self, phases: Phases) -> Result<i32> {
        for phase in phases.selected() {
            tracing::info!("Running {} phase", phase);
            self.results.phases.push(phase.name().to_string());
            if let Err(e) = self.run_phase(phase) {
                self.results.diagnostics.error(format!("{} phase: {}", phase, e));
                if self.pause_on_error {
                    let question = format!("The {} phase failed. Press Enter to continue", phase);
                    if let Err(e) = self.prompter.ask(&question) {
                        tracing::debug!("Pause prompt failed: {}", e);
                    }
                }
            }
        }

        let manifest = self.settings.results_path();
        self.results.write(&manifest)?;
        self.console.blank();
        self.console.line(format!(
            "{} warning(s), {} error(s); results in {}",
            self.results.diagnostics.warnings().len(),
            self.results.diagnostics.errors().len(),
            manifest.display()
        ));
        Ok(self.results.exit_code())
    }

    fn run_phase(&mut self, phase: Phase) -> Result<()> {
        match phase {
            Phase::Kill => self.kill(),
            Phase::List => self.list(),
            Phase::Extract => self.extract(),
            Phase::Create => self.create(),
            Phase::Rename => self.rename(),
            Phase::Mix => self.mix(),
            Phase::Pak => self.pak(),
            Phase::Install => self.install(),
            Phase::Launch => self.launch(),
        }
    }

    /// Load the attachment store once per run; callers put it back
    fn take_store(&mut self) -> Result<AttachmentStore> {
        if let Some(store) = self.store.take() {
            return Ok(store);
        }
        let dir = self.settings.attachments_dir()?;
        let store = AttachmentStore::load(&dir, &mut self.results.diagnostics)?;
        for attachment in store.iter() {
            self.results.attachments_loaded.insert(format!(
                "{}:{}",
                attachment.model_category.name(),
                attachment.attachment_id
            ));
        }
        self.console
            .line(format!("Loaded {} attachment(s) from {}", store.len(), dir.display()));
        Ok(store)
    }

    fn pak_builder(&self) -> Result<PakBuilder> {
        Ok(PakBuilder::new(
            self.settings.unreal_pak()?,
            self.settings.paking_dir()?,
            self.settings.game_name()?,
        ))
    }

    fn converter(&self) -> Result<AssetConverter> {
        Ok(AssetConverter::new(
            self.settings.uasset_gui()?,
            self.settings.uasset_engine_version.clone(),
        ))
    }

    fn kill(&mut self) -> Result<()> {
        let game_name = self.settings.game_name.clone().unwrap_or_default();
        if self.settings.game_process_names.is_empty() && game_name.trim().is_empty() {
            return Err(Error::missing_setting("gameProcessNames"));
        }
        if self.dry_run {
            self.console.line("Would terminate running game processes");
            return Ok(());
        }

        let killed = kill_game_processes(&self.settings.game_process_names, game_name.trim());
        if killed.is_empty() {
            self.console.line("No game process running");
        }
        for name in killed {
            self.console.line(format!("Terminated {}", name));
        }
        Ok(())
    }

    fn list(&mut self) -> Result<()> {
        let store = self.take_store()?;
        for attachment in store.iter() {
            self.results
                .discovered_files
                .insert(attachment.source_path.display().to_string());
        }

        let rules = CompiledRules::compile(&self.settings.rules, Some(&store), &mut self.results.diagnostics);
        for category in store.categories() {
            self.console.line(format!(
                "  {}: {} attachment(s)",
                category,
                store.get(category).len()
            ));
        }
        for (category, category_rules) in rules.categories() {
            self.console
                .line(format!("  {} rules: {}", category, category_rules.summary()));
        }
        self.store = Some(store);

        if let Ok(root) = self.settings.source_content_root() {
            if root.is_dir() {
                let assets = list_files(&root, &["uasset"])?;
                self.console
                    .line(format!("{} cooked asset(s) under {}", assets.len(), root.display()));
                self.record_discovered(&assets);
            }
        }

        for (what, dir) in [
            ("installed", self.settings.game_paks_dir()),
            ("staged", self.settings.paking_dir()),
        ] {
            let Ok(dir) = dir else { continue };
            if !dir.is_dir() {
                continue;
            }
            let paks = pak_files(&dir)?;
            self.console
                .line(format!("{} {} pakchunk(s) in {}", paks.len(), what, dir.display()));
            self.record_discovered(&paks);
        }
        Ok(())
    }

    fn record_discovered(&mut self, files: &[std::path::PathBuf]) {
        for file in files {
            self.results.discovered_files.insert(file.display().to_string());
        }
    }

    fn extract(&mut self) -> Result<()> {
        match self.settings.src_pak()? {
            Some(pak) => {
                let builder = self.pak_builder()?;
                let dest = builder.unpack(&pak, &mut self.gate)?;
                self.results.add_source(&pak);
                self.results.add_destination(&dest);
                self.console.line(format!("Unpacked {} into {}", pak.display(), dest.display()));
            }
            None => self
                .results
                .diagnostics
                .warn("srcPakPath is not set; nothing to unpack"),
        }

        let item_db = self.settings.item_db_path()?;
        let json = self.converter()?.to_json(&item_db, &mut self.gate)?;
        self.results.add_source(&item_db);
        self.results.add_destination(&json);
        self.console.line(format!("Exported {}", json.display()));
        Ok(())
    }

    fn create(&mut self) -> Result<()> {
        let dir = self.settings.attachments_dir()?;
        let template = self.settings.attachment_template()?;
        let created = create_attachment(self.prompter.as_mut(), &dir, template.as_deref(), &mut self.gate)?;

        let Some(path) = created else {
            self.console.line("No attachment created");
            return Ok(());
        };
        self.console.line(format!("Created {}", path.display()));
        self.results.add_destination(&path);
        if let Some(store) = self.store.as_mut() {
            store.insert(load_attachment(&path)?, &mut self.results.diagnostics);
        }
        Ok(())
    }

    fn rename(&mut self) -> Result<()> {
        let mut store = self.take_store()?;
        if self.dry_run {
            for attachment in store.iter() {
                let target = attachment.canonical_file_name();
                let current = attachment.source_path.file_name().and_then(|n| n.to_str());
                if current != Some(target.as_str()) {
                    self.console
                        .line(format!("Would rename {} -> {}", attachment.source_path.display(), target));
                }
            }
        } else {
            let moves = store.rename_all(&mut self.results.diagnostics);
            for (from, to) in &moves {
                self.results.add_source(from);
                self.results.add_destination(to);
                self.console.line(format!("Renamed {} -> {}", from.display(), to.display()));
            }
            self.console.line(format!("{} attachment file(s) renamed", moves.len()));
        }
        self.store = Some(store);
        Ok(())
    }

    fn mix(&mut self) -> Result<()> {
        let item_db = self.settings.item_db_path()?;
        if !item_db.is_file() {
            return Err(Error::missing_path("customization item DB", &item_db));
        }
        let converter = self.converter()?;
        let mut tree = converter.read_asset(&item_db, &mut self.gate)?;
        self.results.add_source(&item_db);

        let store = self.take_store()?;
        let rules = CompiledRules::compile(&self.settings.rules, Some(&store), &mut self.results.diagnostics);
        let mixed = mix(&mut tree, &rules, &store, &mut self.results.diagnostics);
        self.store = Some(store);
        let report = mixed?;

        self.results.combos_added.extend(report.added.iter().cloned());
        self.results.combos_skipped.extend(report.skipped.iter().cloned());
        self.results.name_map_added.extend(report.name_map.added.iter().cloned());
        self.results
            .name_map_removed
            .extend(report.name_map.removed.iter().cloned());
        self.console.line(format!(
            "Mixed {} combination(s) ({} replaced), skipped {}",
            report.added.len(),
            report.replaced,
            report.skipped.len()
        ));

        if self.dry_run {
            self.console.line(format!("Would write {}", item_db.display()));
            return Ok(());
        }
        converter.write_asset(&tree, &item_db, &mut self.gate)?;
        self.results.add_destination(&item_db);
        Ok(())
    }

    fn pak(&mut self) -> Result<()> {
        let chunk = self.settings.dest_pak()?;
        if self.settings.dest_pak_assets.is_empty() {
            return Err(Error::missing_setting("destPakAssets"));
        }
        let source_root = self.settings.source_content_root()?;
        let builder = self.pak_builder()?;

        // A configured source pak is unpacked first unless extract already did it
        let pending_unpack = match (self.settings.src_pak()?, self.settings.unpacked_src_pak_dir()?) {
            (Some(pak), Some(dir)) if !dir.is_dir() => Some(pak),
            _ => None,
        };

        if self.dry_run {
            if let Some(pak) = &pending_unpack {
                self.console.line(format!("Would unpack {}", pak.display()));
            }
            self.console.line(format!(
                "Would pack {} asset(s) from {} into {}",
                self.settings.dest_pak_assets.len(),
                source_root.display(),
                builder.output_path(&chunk).display()
            ));
            return Ok(());
        }

        if let Some(pak) = pending_unpack {
            let dest = builder.unpack(&pak, &mut self.gate)?;
            self.results.add_source(&pak);
            self.results.add_destination(&dest);
            self.console.line(format!("Unpacked {} into {}", pak.display(), dest.display()));
        }

        let staged = builder.stage(&chunk, &source_root, &self.settings.dest_pak_assets, &mut self.gate)?;
        self.results.add_source(&source_root);
        let output = builder.pack(&staged, &mut self.gate)?;
        self.results.add_destination(&output);
        self.console.line(format!("Packed {} file(s) into {}", staged.files.len(), output.display()));
        self.results.pak_path = Some(output);
        Ok(())
    }

    fn install(&mut self) -> Result<()> {
        let declared = declared_pakchunks(&self.settings)?;
        let reserved = reserved_pakchunks(&self.settings)?;
        let game_paks = self.settings.game_paks_dir()?;
        let staging = self.settings.paking_dir()?;

        let plan = plan_install(&game_paks, &staging, &declared, &reserved)?;
        for stem in &plan.missing {
            self.results.diagnostics.error(format!(
                "Declared pakchunk {} found neither in {} nor in {}",
                stem,
                game_paks.display(),
                staging.display()
            ));
        }

        if self.dry_run {
            for line in plan.describe() {
                self.console.line(line.clone());
                self.results.installer_actions.push(format!("planned: {}", line));
            }
            return Ok(());
        }

        if plan.is_noop() {
            self.console.line("Installed pakchunks already match the active profile");
            return Ok(());
        }
        let done = apply_plan(&plan, &mut self.gate)?;
        for line in &done {
            self.console.line(line.clone());
        }
        self.results.installer_actions.extend(done);
        Ok(())
    }

    fn launch(&mut self) -> Result<()> {
        let launcher = self.settings.launcher()?;
        if self.dry_run {
            self.console.line(format!("Would launch {}", launcher.display()));
            return Ok(());
        }
        launch_detached(&launcher)?;
        self.console.line(format!("Launched {}", launcher.display()));
        self.console.replay();
        Ok(())
    }
}

/// Pakchunk archives directly inside `dir`
fn pak_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut paks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pak = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(Pakchunk::is_pak_file_name)
            .unwrap_or(false);
        if is_pak && path.is_file() {
            paks.push(path);
        }
    }
    paks.sort();
    Ok(paks)
}
