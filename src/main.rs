use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use dbd_workbench::fs_utils::OverwritePolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// dbd-workbench - socket attachment mod workbench for Dead by Daylight cosmetics
#[derive(Parser)]
#[command(name = "dbd-workbench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selected phases against a settings file
    Run {
        /// Settings file (YAML)
        settings: PathBuf,

        /// Terminate running game processes
        #[arg(long)]
        kill: bool,

        /// List attachments, rules, source assets and pakchunks
        #[arg(long)]
        list: bool,

        /// Unpack the source pak and export the item DB to JSON
        #[arg(long)]
        extract: bool,

        /// Create a new attachment definition interactively
        #[arg(long)]
        create: bool,

        /// Rename attachment files to their canonical names
        #[arg(long)]
        rename: bool,

        /// Add attachment combinations to the item DB
        #[arg(long)]
        mix: bool,

        /// Stage and pack the destination pakchunk
        #[arg(long)]
        pak: bool,

        /// Reconcile the game's pakchunks with the active mod profile
        #[arg(long)]
        install: bool,

        /// Start the game
        #[arg(long)]
        launch: bool,

        /// What to do with existing output files (always, never, prompt)
        #[arg(long, default_value = "prompt")]
        overwrite: OverwritePolicy,

        /// Show what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "dbd_workbench=debug"
    } else {
        "dbd_workbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            settings,
            kill,
            list,
            extract,
            create,
            rename,
            mix,
            pak,
            install,
            launch,
            overwrite,
            dry_run,
        } => {
            let phases = dbd_workbench::Phases {
                kill,
                list,
                extract,
                create,
                rename,
                mix,
                pak,
                install,
                launch,
            };
            commands::run::run(settings, phases, overwrite, dry_run)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "dbd-workbench", &mut std::io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
