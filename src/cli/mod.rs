use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::store::NoteStore;

pub mod commands;

use self::commands::{DeleteArgs, EditArgs, NewArgs, WatchArgs};

const LOG_FILE: &str = "notesync.log";

#[derive(Parser, Debug)]
#[command(
    name = "notesync",
    version,
    about = "Local notes with undo/redo that stay in sync across windows"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTESYNC_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTESYNC_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Print every note in display order
    List,
    /// Create a note from the command line
    New(NewArgs),
    /// Replace one field of an existing note
    Edit(EditArgs),
    /// Delete a note by identifier
    Delete(DeleteArgs),
    /// Print the collection whenever another window changes it
    Watch(WatchArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);
    let log_file = matches!(command, Commands::Tui).then(|| paths.log_dir.join(LOG_FILE));
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let config = Arc::new(loader.load_or_init()?);
    let store = NoteStore::open(&config).context("opening note store")?;
    match command {
        Commands::Tui => {
            let mut app = App::new(config, store);
            commands::run_tui(&mut app)
        }
        Commands::List => commands::list_notes(store),
        Commands::New(args) => commands::new_note(store, args),
        Commands::Edit(args) => commands::edit_note(store, args),
        Commands::Delete(args) => commands::delete_note(store, args),
        Commands::Watch(args) => commands::watch(store, config.store.tick_rate(), args),
    }
}

/// Installs the global subscriber once. With `log_file` set, output goes to
/// that file (appending) so a full-screen UI is not disturbed.
fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = fmt()
            .with_env_filter(env_filter)
            .with_timer(UtcTime::rfc_3339());
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                builder
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .try_init()
                    .map_err(|err| anyhow::anyhow!(err))?;
            }
            None => {
                builder
                    .with_writer(std::io::stderr)
                    .try_init()
                    .map_err(|err| anyhow::anyhow!(err))?;
            }
        }
        Ok(())
    })
    .map(|_| ())
}
