//! Planner - goal decomposition and session-scoped continuity
//!
//! The planner never sees a page. It recalls related past tasks, injects
//! the session's history, and loops: ask the plan model for one command,
//! run it, feed the executor's summary back in. Known values from memory
//! or history are pushed verbatim into executor goals so the browser is
//! not asked to re-discover them.

use std::sync::Arc;

use memstore::{MemoryRecord, MemoryStatus, MemoryStore};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::executor::{ExecOutcome, Executor, MANUAL_LOGIN_GOAL};
use super::hooks::TaskHooks;
use super::sleep_cancellable;
use crate::accounting::step_usage;
use crate::domain::{AgentKind, BrowserResult, StepUsage, TaskStep, now_ms};
use crate::events::{Event, EventBus, LogLevel, WaitOutcome};
use crate::llm::{ChatClient, ChatMessage, ChatRequest, MessageLog, parse_reply};
use crate::prompts;

/// Hard iteration cap for the planning loop
pub const PLANNER_MAX_STEPS: u32 = 15;

/// Sentinel user message for the first plan step, before any browser work
const NO_RESULT_YET: &str = "No browser actions performed yet. Decide the first step.";

/// Terminal outcome of one planned task
#[derive(Debug)]
pub enum PlanOutcome {
    Completed { answer: String, url: String },
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PlanCommand {
    Browser,
    Finish,
    Wait,
}

impl PlanCommand {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Finish => "finish",
            Self::Wait => "wait",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlanInput {
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    thought: String,
    command: PlanCommand,
    #[serde(default)]
    input: PlanInput,
}

#[derive(Debug, Deserialize)]
struct KeywordReply {
    keywords: Vec<String>,
}

enum Handshake {
    Resolved,
    Cancelled,
    Failed(String),
}

pub struct Planner {
    chat: Arc<dyn ChatClient>,
    model: String,
    audit: Arc<MessageLog>,
    memory: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    executor: Executor,
    task_id: String,
    session_id: String,
    /// The session's preferred browser mode, restored after interventions
    headless: bool,
}

impl Planner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatClient>,
        model: impl Into<String>,
        audit: Arc<MessageLog>,
        memory: Arc<MemoryStore>,
        bus: Arc<EventBus>,
        executor: Executor,
        task_id: impl Into<String>,
        session_id: impl Into<String>,
        headless: bool,
    ) -> Self {
        Self {
            chat,
            model: model.into(),
            audit,
            memory,
            bus,
            executor,
            task_id: task_id.into(),
            session_id: session_id.into(),
            headless,
        }
    }

    /// Drive one task to a terminal outcome
    pub async fn run(&self, goal: &str, cancel: &CancellationToken, hooks: &dyn TaskHooks) -> PlanOutcome {
        if goal == MANUAL_LOGIN_GOAL {
            return match self.executor.run(goal, cancel, hooks).await {
                ExecOutcome::Success(result) => {
                    let answer = result.summary.clone();
                    self.finish(goal, &[], &answer, &result, hooks);
                    PlanOutcome::Completed {
                        answer,
                        url: result.url,
                    }
                }
                ExecOutcome::Cancelled => PlanOutcome::Cancelled,
                ExecOutcome::Intervention { reason, .. } | ExecOutcome::Failed(reason) => PlanOutcome::Failed(reason),
            };
        }

        let keywords = self.extract_keywords(goal, hooks).await;
        let memory_block = match self.memory.search(&keywords) {
            Ok(hits) => format_memory_block(&hits),
            Err(e) => {
                warn!(error = %e, "Memory recall failed, planning without it");
                String::new()
            }
        };
        let history_block = format_history_block(&hooks.session_history());

        let mut trace: Vec<String> = Vec::new();
        let mut last_result: Option<BrowserResult> = None;
        let mut step: u32 = 1;

        while step <= PLANNER_MAX_STEPS {
            if cancel.is_cancelled() {
                return PlanOutcome::Cancelled;
            }

            let (reply, usage) = match self
                .plan_step(goal, &memory_block, &history_block, &trace, last_result.as_ref())
                .await
            {
                Ok(pair) => pair,
                Err(message) => return PlanOutcome::Failed(message),
            };
            hooks.record_usage(usage);

            let command = match reply.command {
                PlanCommand::Browser => {
                    format!("browser: {}", reply.input.goal.as_deref().unwrap_or(goal))
                }
                other => other.as_str().to_string(),
            };
            hooks.record_step(TaskStep::new(AgentKind::Planner, step, &reply.thought, &command).with_usage(usage));
            trace.push(format!("step {}: [{}] {}", step, reply.command.as_str(), reply.thought));
            self.bus
                .log(LogLevel::Info, format!("planner {}: {}", reply.command.as_str(), reply.thought));

            match reply.command {
                PlanCommand::Finish => {
                    let answer = reply
                        .input
                        .answer
                        .filter(|a| !a.trim().is_empty())
                        .or_else(|| last_result.as_ref().map(|r| r.summary.clone()))
                        .unwrap_or_else(|| "task complete".to_string());
                    let result = last_result.unwrap_or_default();
                    self.finish(goal, &keywords, &answer, &result, hooks);
                    return PlanOutcome::Completed {
                        answer,
                        url: result.url,
                    };
                }
                PlanCommand::Wait => {
                    if !sleep_cancellable(std::time::Duration::from_secs(5), cancel).await {
                        return PlanOutcome::Cancelled;
                    }
                    step += 1;
                }
                PlanCommand::Browser => {
                    let executor_goal = reply.input.goal.unwrap_or_else(|| goal.to_string());
                    match self.executor.run(&executor_goal, cancel, hooks).await {
                        ExecOutcome::Success(result) => {
                            last_result = Some(result);
                            step += 1;
                        }
                        ExecOutcome::Intervention { reason, url } => {
                            // this iteration does not count against the budget
                            match self.intervention_handshake(&reason, &url, cancel, hooks).await {
                                Handshake::Resolved => {}
                                Handshake::Cancelled => return PlanOutcome::Cancelled,
                                Handshake::Failed(message) => return PlanOutcome::Failed(message),
                            }
                        }
                        ExecOutcome::Cancelled => return PlanOutcome::Cancelled,
                        ExecOutcome::Failed(message) => return PlanOutcome::Failed(message),
                    }
                }
            }
        }

        PlanOutcome::Failed("max steps reached".to_string())
    }

    /// One plan-step call. The system prompt carries goal, context blocks,
    /// and the loop trace; the user message is only the last browser
    /// result (or the first-step sentinel).
    async fn plan_step(
        &self,
        goal: &str,
        memory_block: &str,
        history_block: &str,
        trace: &[String],
        last_result: Option<&BrowserResult>,
    ) -> Result<(PlanReply, StepUsage), String> {
        let system = prompts::render_planner(goal, memory_block, history_block, &trace.join("\n"))
            .map_err(|e| format!("failed to render planner prompt: {}", e))?;
        let user = match last_result {
            Some(result) => result.render(),
            None => NO_RESULT_YET.to_string(),
        };

        let request = ChatRequest {
            model: self.model.clone(),
            system,
            messages: vec![ChatMessage::user(user)],
            schema_name: prompts::SCHEMA_PLAN_STEP.to_string(),
            schema: prompts::plan_step_schema(),
        };

        let response = self
            .chat
            .chat(request.clone())
            .await
            .map_err(|e| format!("plan step failed: {}", e))?;
        self.audit
            .record_quietly(&self.session_id, AgentKind::Planner, &request, &response);
        let usage = step_usage(&self.model, &response.usage);

        let reply: PlanReply = parse_reply(&response).map_err(|e| format!("plan reply malformed: {}", e))?;
        Ok((reply, usage))
    }

    /// One LLM call turning the goal into 3-5 recall keywords. Failure
    /// here only costs the recall context, never the task.
    async fn extract_keywords(&self, goal: &str, hooks: &dyn TaskHooks) -> Vec<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: prompts::KEYWORDS.to_string(),
            messages: vec![ChatMessage::user(goal.to_string())],
            schema_name: prompts::SCHEMA_KEYWORDS.to_string(),
            schema: prompts::keywords_schema(),
        };

        let response = match self.chat.chat(request.clone()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Keyword extraction failed, skipping recall");
                return Vec::new();
            }
        };
        self.audit
            .record_quietly(&self.session_id, AgentKind::Planner, &request, &response);
        hooks.record_usage(step_usage(&self.model, &response.usage));

        match parse_reply::<KeywordReply>(&response) {
            Ok(reply) => reply.keywords.iter().map(|k| k.trim().to_lowercase()).collect(),
            Err(e) => {
                warn!(error = %e, "Keyword reply malformed, skipping recall");
                Vec::new()
            }
        }
    }

    /// Success epilogue: write the memory record and the session-history
    /// entry. Store trouble is logged, not propagated; the task outcome
    /// stands.
    fn finish(&self, goal: &str, keywords: &[String], answer: &str, result: &BrowserResult, hooks: &dyn TaskHooks) {
        let record = MemoryRecord {
            id: self.task_id.clone(),
            goal: goal.to_string(),
            keywords: keywords.to_vec(),
            summary: answer.to_string(),
            artifacts: result.extracted.clone(),
            status: MemoryStatus::Success,
            timestamp: now_ms(),
        };
        if let Err(e) = self.memory.save(&record) {
            warn!(error = %e, task_id = %self.task_id, "Failed to save memory record");
        }

        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
        hooks.append_history(&format!("{} goal: {} / result: {}", stamp, goal, answer));
        info!(task_id = %self.task_id, "Task finished");
    }

    /// The handshake: announce the block, open the browser window, wait
    /// for the human (or a cancel), then restore the preferred mode.
    async fn intervention_handshake(
        &self,
        reason: &str,
        url: &str,
        cancel: &CancellationToken,
        hooks: &dyn TaskHooks,
    ) -> Handshake {
        self.bus.emit(Event::VerificationNeeded {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
            url: url.to_string(),
        });
        self.bus
            .log(LogLevel::Warn, format!("verification needed: {}", reason));
        hooks.set_verifying(true);

        if let Err(e) = self.executor.browser().set_headless(false).await {
            hooks.set_verifying(false);
            return Handshake::Failed(format!("failed to open browser for verification: {}", e));
        }

        let outcome = self.bus.wait_for_resolution(&self.session_id, cancel).await;
        hooks.set_verifying(false);

        match outcome {
            WaitOutcome::Resolved => {
                if let Err(e) = self.executor.browser().set_headless(self.headless).await {
                    warn!(error = %e, "Failed to restore browser mode after verification");
                }
                self.bus.log(LogLevel::Info, "verification resolved, resuming");
                Handshake::Resolved
            }
            WaitOutcome::Cancelled => Handshake::Cancelled,
        }
    }
}

fn format_memory_block(hits: &[MemoryRecord]) -> String {
    hits.iter()
        .map(|rec| {
            let when = chrono::DateTime::from_timestamp_millis(rec.timestamp)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let mut line = format!("- [{}] goal: {} / result: {}", when, rec.goal, clip(&rec.summary, 300));
            if !rec.artifacts.is_null() && rec.artifacts != serde_json::json!({}) {
                line.push_str(&format!(" (extracted: {})", rec.artifacts));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_history_block(history: &[String]) -> String {
    history.iter().map(|entry| format!("- {}", entry)).collect::<Vec<_>>().join("\n")
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "..."
    }
}
