//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ib")]
#[command(author, version, about = "Agentic browser-automation orchestration core", long_about = None)]
pub struct Cli {
    /// Path to config file (default: <config-home>/invisibrow.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one goal to completion in the foreground
    Run {
        /// Natural-language goal (or MANUAL_LOGIN for a hands-off window)
        goal: String,

        /// Session name (created if missing; default "default")
        #[arg(short, long)]
        session: Option<String>,

        /// Deterministic mock execution: no network, no browser
        #[arg(long)]
        mock: bool,
    },

    /// List tasks, newest first
    Tasks,

    /// Manage sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage the bot-keyword list
    Keywords {
        #[command(subcommand)]
        action: KeywordAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Create a session
    Create {
        name: String,
    },

    /// List sessions with their rolling stats
    List,

    /// Rename a session
    Rename {
        id: String,
        name: String,
    },

    /// Delete a session
    Delete {
        id: String,
    },

    /// Flip a session's preferred headless flag
    ToggleHeadless {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeywordAction {
    List,
    Add {
        keyword: String,
    },
    Delete {
        keyword: String,
    },
}
