//! invisibrow CLI entry point
//!
//! `ib run` drives one goal to completion in the foreground, printing the
//! event stream. Admin subcommands operate directly on the stores. The
//! binary wires the deterministic stub driver in mock mode; a real
//! browser driver is supplied by whatever embeds the crate.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, bail};
use tokio::io::AsyncBufReadExt;
use tracing::info;

use invisibrow::cli::{Cli, Command, KeywordAction, SessionAction};
use invisibrow::config::Config;
use invisibrow::events::{Event, EventBus, LogLevel};
use invisibrow::llm::{ChatClient, MessageLog, ScriptedChat};
use invisibrow::scheduler::{DriverFactory, Scheduler, SchedulerConfig, SchedulerDeps};
use invisibrow::store::{SessionStore, TaskStore};
use invisibrow::{PageDriver, StubDriver};
use memstore::MemoryStore;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invisibrow")
        .join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.map(|s| s.to_lowercase()).as_deref() {
        Some("trace") => tracing::Level::TRACE,
        Some("debug") => tracing::Level::DEBUG,
        Some("warn") => tracing::Level::WARN,
        Some("error") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("invisibrow.log")).context("Failed to create log file")?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref())?;
    let config = Config::load(cli.config.as_ref())?;
    let storage = config.storage_dir();

    match cli.command {
        Command::Run { goal, session, mock } => run_task(config, goal, session, mock).await,
        Command::Tasks => {
            let tasks = TaskStore::open(&storage)?;
            for task in tasks.tasks() {
                let outcome = task.result.as_deref().or(task.error.as_deref()).unwrap_or_default();
                println!("{}  {:9}  {}  {}", task.id, task.status.to_string(), task.goal, outcome);
            }
            Ok(())
        }
        Command::Sessions { action } => {
            let sessions = SessionStore::open(&storage)?;
            match action {
                SessionAction::Create { name } => {
                    let session = sessions.create(&name)?;
                    println!("{}", session.id);
                }
                SessionAction::List => {
                    for s in sessions.list() {
                        println!(
                            "{}  {}  headless={}  tokens={}  cost=${:.4}  history={}",
                            s.id,
                            s.name,
                            s.headless,
                            s.stats.tokens,
                            s.stats.cost,
                            s.session_history.len(),
                        );
                    }
                }
                SessionAction::Rename { id, name } => sessions.rename(&id, &name)?,
                SessionAction::Delete { id } => sessions.delete(&id)?,
                SessionAction::ToggleHeadless { id } => {
                    let headless = sessions.toggle_headless(&id)?;
                    println!("headless={}", headless);
                }
            }
            Ok(())
        }
        Command::Keywords { action } => {
            let memory = MemoryStore::open(storage.join("memory.sqlite"))?;
            match action {
                KeywordAction::List => {
                    for kw in memory.get_all_bot_keywords()? {
                        println!("{}", kw.keyword);
                    }
                }
                KeywordAction::Add { keyword } => {
                    memory.add_bot_keyword(&keyword)?;
                }
                KeywordAction::Delete { keyword } => {
                    memory.delete_bot_keyword(&keyword)?;
                }
            }
            Ok(())
        }
    }
}

async fn run_task(config: Config, goal: String, session_name: Option<String>, mock: bool) -> Result<()> {
    let mock = mock || Config::mock_mode();
    if !mock {
        bail!(
            "no browser driver is wired into this binary; run with --mock (or UI_TEST=1), \
             or embed the invisibrow crate with a PageDriver implementation"
        );
    }

    let storage = config.storage_dir();
    let tasks = Arc::new(TaskStore::open(&storage)?);
    let sessions = Arc::new(SessionStore::open(&storage)?);
    let memory = Arc::new(MemoryStore::open(storage.join("memory.sqlite"))?);
    let bus = Arc::new(EventBus::with_default_capacity());
    let audit = Arc::new(MessageLog::new(&storage));

    let chat: Arc<dyn ChatClient> = Arc::new(ScriptedChat::new());
    let driver_factory: DriverFactory = Arc::new(|| Arc::new(StubDriver::new()) as Arc<dyn PageDriver>);

    let scheduler = Scheduler::new(
        SchedulerConfig {
            max_concurrent: config.concurrency.max_tasks,
        },
        config.models.clone(),
        SchedulerDeps {
            tasks: tasks.clone(),
            sessions: sessions.clone(),
            memory,
            bus: bus.clone(),
            chat,
            audit,
            storage_dir: storage,
            driver_factory,
        },
    );

    let session = match session_name {
        Some(name) => sessions
            .list()
            .into_iter()
            .find(|s| s.name == name)
            .map(Ok)
            .unwrap_or_else(|| sessions.create(&name))?,
        None => sessions.get_or_create_default()?,
    };
    info!(session_id = %session.id, "Running in mock mode");

    let mut rx = bus.subscribe();
    let task_id = scheduler.submit(&session.id, &goal)?;
    let mut poll = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(Event::Log { message, level, .. }) => {
                        let tag = match level {
                            LogLevel::Info => "info",
                            LogLevel::Warn => "warn",
                            LogLevel::Error => "error",
                        };
                        println!("[{}] {}", tag, message);
                    }
                    Ok(Event::VerificationNeeded { session_id, reason, url }) => {
                        println!("verification needed for {} at {}: {}", session_id, url, reason);
                        println!("solve it in the browser window, then press Enter...");
                        let mut line = String::new();
                        let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
                        let _ = stdin.read_line(&mut line).await;
                        bus.emit(Event::VerificationResolved { session_id });
                    }
                    Ok(_) => {}
                    Err(_) => {}
                }
            }
            _ = poll.tick() => {
                if let Some(task) = tasks.get(&task_id)
                    && task.status.is_terminal()
                {
                    let outcome = task.result.as_deref().or(task.error.as_deref()).unwrap_or_default();
                    println!("task {}: {}", task.status, outcome);
                    let usage = task.token_usage;
                    println!(
                        "tokens: {} in / {} out, est. cost ${:.4}",
                        usage.input_tokens, usage.output_tokens, usage.cost
                    );
                    break;
                }
            }
        }
    }

    Ok(())
}
