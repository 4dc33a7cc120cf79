//! Task and step domain types

use serde::{Deserialize, Serialize};

use super::{generate_id, now_ms};

/// Task lifecycle status. The terminal states (completed, failed,
/// cancelled) are set at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Which agent produced a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Planner,
    Executor,
    Watchdog,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Watchdog => "watchdog",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token usage and cost of a single LLM call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepUsage {
    pub input_tokens: u64,
    pub cached_tokens: u64,
    pub output_tokens: u64,
    /// Estimated cost in USD
    pub cost: f64,
}

impl StepUsage {
    /// Fold another call's usage into this one (watchdog + decision calls
    /// share one executor step record)
    pub fn merge(&mut self, other: &StepUsage) {
        self.input_tokens += other.input_tokens;
        self.cached_tokens += other.cached_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
    }
}

/// Per-task aggregate usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskUsage {
    pub input_tokens: u64,
    pub cached_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    /// Number of LLM calls folded in
    pub calls: u64,
}

impl TaskUsage {
    pub fn add(&mut self, usage: &StepUsage) {
        self.input_tokens += usage.input_tokens;
        self.cached_tokens += usage.cached_tokens;
        self.output_tokens += usage.output_tokens;
        self.cost += usage.cost;
        self.calls += 1;
    }
}

/// One unit of agent work within a task. Append-only, persisted eagerly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub agent: AgentKind,
    /// 1-based within the owning agent's loop
    pub step: u32,
    pub thought: String,
    pub command: String,
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<StepUsage>,
}

impl TaskStep {
    pub fn new(agent: AgentKind, step: u32, thought: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            agent,
            step,
            thought: thought.into(),
            command: command.into(),
            timestamp: now_ms(),
            token_usage: None,
        }
    }

    pub fn with_usage(mut self, usage: StepUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }
}

/// Unit of work: one goal driven through the planner/executor loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub goal: String,
    pub status: TaskStatus,
    /// Final answer on completion
    #[serde(default)]
    pub result: Option<String>,
    /// Last page URL when the task ended
    #[serde(default)]
    pub url: Option<String>,
    /// Failure reason when status is failed
    #[serde(default)]
    pub error: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
    /// Present iff status is terminal
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
    #[serde(default)]
    pub token_usage: TaskUsage,
}

impl Task {
    pub fn new(session_id: impl Into<String>, goal: impl Into<String>) -> Self {
        let goal = goal.into();
        Self {
            id: generate_id("task", &goal),
            session_id: session_id.into(),
            goal,
            status: TaskStatus::Pending,
            result: None,
            url: None,
            error: None,
            created_at: now_ms(),
            completed_at: None,
            steps: Vec::new(),
            token_usage: TaskUsage::default(),
        }
    }
}
