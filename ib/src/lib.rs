//! invisibrow - orchestration core of an agentic browser-automation platform
//!
//! A user states a goal; the system plans the work, drives a browser
//! session, watches for blocks that need a human, persists what it
//! learned, and reports progress over an event bus.
//!
//! # Architecture
//!
//! - **Fixed budgets**: planner and executor loops are hard-capped at 15
//!   steps each; there is no per-task wall clock.
//! - **Summaries across the seam**: raw page state stays inside the
//!   executor; the planner only ever sees summarized results.
//! - **Cheap checks first**: the watchdog scans learned keywords before
//!   spending an LLM call, and grows that list from confirmed blocks.
//! - **Cooperative cancel**: every sleep, LLM call, and wait races the
//!   task's cancellation token.
//!
//! # Modules
//!
//! - [`scheduler`] - bounded-concurrency task runner and durable writes
//! - [`agent`] - planner / executor / watchdog control loop
//! - [`browser`] - opaque driver contract and per-session binding
//! - [`llm`] - JSON-mode chat transport, audit trail
//! - [`events`] - process-wide pub/sub consumed by the UI layer
//! - [`store`] - persisted sessions and tasks
//! - [`accounting`] - token cost estimation and session stats
//! - [`config`] - configuration loading
//!
//! Long-term memory lives in the companion `memstore` crate.

pub mod accounting;
pub mod agent;
pub mod browser;
pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod llm;
pub mod prompts;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use accounting::{TokenAccounting, estimate_cost, pricing_for, step_usage};
pub use agent::{
    EXECUTOR_MAX_STEPS, ExecOutcome, Executor, MANUAL_LOGIN_GOAL, PLANNER_MAX_STEPS, PlanOutcome, Planner, TaskHooks,
    Watchdog, WatchdogReport, WatchdogVerdict,
};
pub use browser::{BrowserAgent, DriverError, PageDriver, StubDriver};
pub use config::{Config, ConcurrencyConfig, LlmConfig, ModelsConfig, StorageConfig};
pub use domain::{
    AgentKind, BrowserResult, InteractiveElement, PageSnapshot, Session, SessionStats, StepUsage, Task, TaskStatus,
    TaskStep, TaskUsage,
};
pub use events::{Event, EventBus, LogLevel, create_event_bus};
pub use llm::{ChatClient, ChatMessage, ChatRequest, ChatResponse, LlmError, MessageLog, OpenAiChat, ScriptedChat};
pub use scheduler::{DriverFactory, Scheduler, SchedulerConfig, SchedulerDeps};
pub use store::{RESTART_ERROR, SessionStore, TaskStore};
