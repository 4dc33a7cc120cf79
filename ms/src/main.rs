use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use memstore::MemoryStore;
use memstore::cli::{Cli, Command, KeywordAction, default_db_path};

fn setup_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(default_db_path);
    let store = MemoryStore::open(&db_path).context("Failed to open memory store")?;

    info!("memstore opened at {}", db_path.display());

    match cli.command {
        Command::Keywords { action } => match action {
            KeywordAction::List => {
                for kw in store.get_all_bot_keywords()? {
                    let created = chrono::DateTime::from_timestamp_millis(kw.created_at)
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!("{}  {}", created.dimmed(), kw.keyword);
                }
            }
            KeywordAction::Add { keyword } => {
                if store.add_bot_keyword(&keyword)? {
                    println!("{} added: {}", "✓".green(), keyword.to_lowercase().cyan());
                } else {
                    println!("{} already present (or empty): {}", "-".yellow(), keyword);
                }
            }
            KeywordAction::Delete { keyword } => {
                if store.delete_bot_keyword(&keyword)? {
                    println!("{} deleted: {}", "✓".green(), keyword.to_lowercase().cyan());
                } else {
                    println!("{} not found: {}", "-".yellow(), keyword);
                }
            }
        },
        Command::Search { keywords } => {
            let hits = store.search(&keywords)?;
            if hits.is_empty() {
                println!("{}", "no matches".dimmed());
            }
            for rec in hits {
                let when = chrono::DateTime::from_timestamp_millis(rec.timestamp)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{} {} {}", rec.id.yellow(), when.dimmed(), rec.goal);
                println!("    {}", rec.summary);
            }
        }
        Command::Show { id } => match store.get(&id)? {
            Some(rec) => {
                println!("{}", serde_json::to_string_pretty(&rec)?);
            }
            None => {
                println!("{} no record with id {}", "-".yellow(), id);
            }
        },
    }

    Ok(())
}
