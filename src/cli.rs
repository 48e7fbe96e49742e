use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::mode::Mode;

/// Keep Plex ratings and audio file rating tags in agreement.
#[derive(Debug, Parser)]
#[command(name = "plex-ratings-sync", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Decide and report changes without writing to Plex or the files
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding rating_cache.json
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Reconcile both sides, Plex wins where both are rated
    Sync,
    /// Copy file ratings into Plex
    Import,
    /// Copy Plex ratings into the files
    Export,
}

impl Command {
    pub fn mode(self) -> Mode {
        match self {
            Command::Sync => Mode::Sync,
            Command::Import => Mode::Import,
            Command::Export => Mode::Export,
        }
    }
}
