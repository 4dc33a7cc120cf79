//! CLI argument parsing for memstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ms")]
#[command(author, version, about = "invisibrow long-term memory store", long_about = None)]
pub struct Cli {
    /// Path to the SQLite database (defaults to the invisibrow storage dir)
    #[arg(short, long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the bot-keyword list
    Keywords {
        #[command(subcommand)]
        action: KeywordAction,
    },

    /// Search stored task memories by keyword
    Search {
        /// One or more keywords (disjunctive match)
        #[arg(required = true)]
        keywords: Vec<String>,
    },

    /// Show a single memory record by task id
    Show {
        #[arg(required = true)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeywordAction {
    /// List all bot keywords with creation timestamps
    List,

    /// Add a keyword
    Add {
        #[arg(required = true)]
        keyword: String,
    },

    /// Delete a keyword
    Delete {
        #[arg(required = true)]
        keyword: String,
    },
}

/// Default database location: `<data-home>/invisibrow/storage/memory.sqlite`
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invisibrow")
        .join("storage")
        .join("memory.sqlite")
}
