use clap::{Args, Parser, Subcommand};
use prefsync::{PageKind, SyncConfig};
use std::path::PathBuf;

/// CLI arguments for prefsync
#[derive(Parser, Debug)]
#[command(name = "prefsync")]
#[command(about = "Inspect and edit synced preferences and persisted page state")]
pub struct Cli {
    /// JSON file holding the preferences (env: PREFSYNC_PREFS_FILE)
    #[arg(long, global = true)]
    pub prefs_file: Option<PathBuf>,

    /// Directory of the persisted page state (env: PREFSYNC_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read, write and watch preferences
    Prefs(PrefsCommand),
    /// Show or reset persisted page state
    State(StateCommand),
}

#[derive(Args, Debug)]
pub struct PrefsCommand {
    #[command(subcommand)]
    pub command: PrefsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum PrefsSubcommand {
    /// Print preferences as a JSON object
    List {
        /// Filter by glob pattern, may be repeated (e.g., "brave.new_tab_page.*")
        #[arg(short, long = "query")]
        query: Vec<String>,
    },
    /// Print one preference value (strings unquoted)
    Get { key: String },
    /// Write one preference and print it once the change has synced
    Set {
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },
    /// Print changes of matching preferences until interrupted
    Watch {
        #[arg(short, long = "query")]
        query: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct StateCommand {
    #[command(subcommand)]
    pub command: StateSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum StateSubcommand {
    /// Print a page's state (stored values over defaults)
    Show {
        #[arg(value_enum)]
        page: PageKind,
    },
    /// Delete a page's stored state
    Reset {
        #[arg(value_enum)]
        page: PageKind,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::from_env();
        if let Some(path) = &self.prefs_file {
            config.prefs_file = path.clone();
        }
        if let Some(dir) = &self.storage_dir {
            config.storage_dir = dir.clone();
        }
        config
    }
}
