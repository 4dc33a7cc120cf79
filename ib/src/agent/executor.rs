//! Executor - the one-step browser action loop
//!
//! Each iteration: snapshot the page, let the watchdog screen it, ask the
//! decision model for one action, perform it, let the page settle. The
//! loop ends with a summarization call whose output is the only thing the
//! planner ever sees of the page.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::hooks::TaskHooks;
use super::sleep_cancellable;
use super::watchdog::{Watchdog, WatchdogVerdict};
use crate::accounting::step_usage;
use crate::browser::{BrowserAgent, DriverError, NAVIGATION_TIMEOUT, SEARCH_NAVIGATION_TIMEOUT};
use crate::domain::{AgentKind, BrowserResult, PageSnapshot, StepUsage, TaskStep};
use crate::llm::{ChatClient, ChatMessage, ChatRequest, MessageLog, parse_reply};
use crate::prompts;

/// Hard iteration cap for one executor invocation
pub const EXECUTOR_MAX_STEPS: u32 = 15;

/// Sentinel goal that opens a hands-off browser window for the user
pub const MANUAL_LOGIN_GOAL: &str = "MANUAL_LOGIN";

/// How long a manual session stays open
pub const MANUAL_LOGIN_WINDOW: Duration = Duration::from_secs(300);

/// Search engine used by the `search` action
const SEARCH_ENGINE_HOME: &str = "https://www.google.com";

/// What one executor invocation hands back to the planner
#[derive(Debug)]
pub enum ExecOutcome {
    Success(BrowserResult),
    Intervention { reason: String, url: String },
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ExecAction {
    Goto,
    Click,
    Type,
    Search,
    Wait,
    Finish,
    Answer,
}

impl ExecAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Goto => "goto",
            Self::Click => "click",
            Self::Type => "type",
            Self::Search => "search",
            Self::Wait => "wait",
            Self::Finish => "finish",
            Self::Answer => "answer",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecReply {
    thought: String,
    action: ExecAction,
    #[serde(default)]
    param: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryReply {
    summary: String,
    #[serde(default)]
    extracted: serde_json::Value,
}

pub struct Executor {
    chat: Arc<dyn ChatClient>,
    model: String,
    audit: Arc<MessageLog>,
    browser: Arc<BrowserAgent>,
    watchdog: Watchdog,
    session_id: String,
    /// The session's preferred mode, restored after manual sessions
    headless: bool,
}

impl Executor {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        model: impl Into<String>,
        audit: Arc<MessageLog>,
        browser: Arc<BrowserAgent>,
        watchdog: Watchdog,
        session_id: impl Into<String>,
        headless: bool,
    ) -> Self {
        Self {
            chat,
            model: model.into(),
            audit,
            browser,
            watchdog,
            session_id: session_id.into(),
            headless,
        }
    }

    pub fn browser(&self) -> &Arc<BrowserAgent> {
        &self.browser
    }

    /// Run one executor goal to an outcome. Driver faults inside the loop
    /// are logged and the loop continues; only an unreadable page aborts.
    pub async fn run(&self, goal: &str, cancel: &CancellationToken, hooks: &dyn TaskHooks) -> ExecOutcome {
        if goal == MANUAL_LOGIN_GOAL {
            return self.run_manual_session(cancel).await;
        }

        if let Err(e) = self.browser.ensure_started(self.headless).await {
            return ExecOutcome::Failed(format!("failed to start browser: {}", e));
        }

        let mut history: Vec<String> = Vec::new();

        for step in 1..=EXECUTOR_MAX_STEPS {
            if cancel.is_cancelled() {
                return ExecOutcome::Cancelled;
            }

            let snapshot = match self.browser.page_state().await {
                Ok(s) => s,
                Err(e) => return ExecOutcome::Failed(format!("failed to read page state: {}", e)),
            };

            let report = self.watchdog.check(goal, &snapshot, &history).await;
            let mut merged = StepUsage::default();
            if let Some(usage) = report.usage {
                hooks.record_usage(usage);
                merged.merge(&usage);
            }
            if let WatchdogVerdict::Intervention { reason } = report.verdict {
                return ExecOutcome::Intervention {
                    reason,
                    url: snapshot.url,
                };
            }

            let (reply, usage) = match self.decide(goal, &history, &snapshot).await {
                Ok(pair) => pair,
                Err(message) => return ExecOutcome::Failed(message),
            };
            hooks.record_usage(usage);
            merged.merge(&usage);

            let command = match &reply.param {
                Some(param) => format!("{} {}", reply.action.as_str(), param),
                None => reply.action.as_str().to_string(),
            };
            hooks.record_step(TaskStep::new(AgentKind::Executor, step, &reply.thought, &command).with_usage(merged));
            history.push(format!("{}: {}", step, reply.thought));

            if matches!(reply.action, ExecAction::Finish | ExecAction::Answer) {
                let result = self.summarize(goal, &snapshot, reply.answer.as_deref(), hooks).await;
                return ExecOutcome::Success(result);
            }

            if let Err(e) = self.perform(reply.action, reply.param.as_deref(), cancel).await {
                warn!(action = reply.action.as_str(), error = %e, "Action failed, continuing loop");
                history.push(format!("{}: action failed: {}", step, e));
            }

            // let the page settle before the next snapshot
            let settle = Duration::from_millis(rand::rng().random_range(2000..=4000));
            if !sleep_cancellable(settle, cancel).await {
                return ExecOutcome::Cancelled;
            }
        }

        ExecOutcome::Failed("max steps reached".to_string())
    }

    /// Open the browser in GUI mode and step aside so the user can log in.
    /// The window races the cancel token; the session's preferred mode is
    /// restored afterwards.
    pub async fn run_manual_session(&self, cancel: &CancellationToken) -> ExecOutcome {
        if let Err(e) = self.browser.ensure_started(false).await {
            return ExecOutcome::Failed(format!("failed to start browser: {}", e));
        }
        if let Err(e) = self.browser.set_headless(false).await {
            return ExecOutcome::Failed(format!("failed to open browser window: {}", e));
        }

        debug!(session_id = %self.session_id, "Manual session open");
        if !sleep_cancellable(MANUAL_LOGIN_WINDOW, cancel).await {
            return ExecOutcome::Cancelled;
        }

        if let Err(e) = self.browser.set_headless(self.headless).await {
            warn!(error = %e, "Failed to restore browser mode after manual session");
        }
        let url = self.browser.current_url().await.unwrap_or_default();
        ExecOutcome::Success(BrowserResult {
            summary: "manual session ended".to_string(),
            extracted: serde_json::json!({}),
            url,
        })
    }

    async fn decide(
        &self,
        goal: &str,
        history: &[String],
        snapshot: &PageSnapshot,
    ) -> Result<(ExecReply, StepUsage), String> {
        let system = prompts::render_executor(goal, &history.join("\n"))
            .map_err(|e| format!("failed to render executor prompt: {}", e))?;
        let request = ChatRequest {
            model: self.model.clone(),
            system,
            messages: vec![ChatMessage::user(snapshot.render())],
            schema_name: prompts::SCHEMA_EXECUTOR_DECISION.to_string(),
            schema: prompts::executor_decision_schema(),
        };

        let response = self
            .chat
            .chat(request.clone())
            .await
            .map_err(|e| format!("executor decision failed: {}", e))?;
        self.audit
            .record_quietly(&self.session_id, AgentKind::Executor, &request, &response);
        let usage = step_usage(&self.model, &response.usage);

        let reply: ExecReply = parse_reply(&response).map_err(|e| format!("executor reply malformed: {}", e))?;
        Ok((reply, usage))
    }

    /// Compress the outcome for the planner. Failures here are non-fatal:
    /// the decision's answer (or a stock phrase) stands in for the summary.
    async fn summarize(
        &self,
        goal: &str,
        snapshot: &PageSnapshot,
        answer: Option<&str>,
        hooks: &dyn TaskHooks,
    ) -> BrowserResult {
        let fallback = BrowserResult {
            summary: answer.unwrap_or("task complete").to_string(),
            extracted: serde_json::json!({}),
            url: snapshot.url.clone(),
        };

        let system = match prompts::render_summarize(goal) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to render summarize prompt");
                return fallback;
            }
        };
        let request = ChatRequest {
            model: self.model.clone(),
            system,
            messages: vec![ChatMessage::user(format!(
                "Final answer: {}\n\nPage snapshot:\n{}",
                answer.unwrap_or("(none)"),
                snapshot.render(),
            ))],
            schema_name: prompts::SCHEMA_SUMMARIZE.to_string(),
            schema: prompts::summarize_schema(),
        };

        let response = match self.chat.chat(request.clone()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Summarization failed, using decision answer");
                return fallback;
            }
        };
        self.audit
            .record_quietly(&self.session_id, AgentKind::Executor, &request, &response);
        hooks.record_usage(step_usage(&self.model, &response.usage));

        match parse_reply::<SummaryReply>(&response) {
            Ok(reply) => BrowserResult {
                summary: reply.summary,
                extracted: reply.extracted,
                url: snapshot.url.clone(),
            },
            Err(e) => {
                warn!(error = %e, "Summary reply malformed, using decision answer");
                fallback
            }
        }
    }

    async fn perform(&self, action: ExecAction, param: Option<&str>, cancel: &CancellationToken) -> Result<(), DriverError> {
        let driver = self.browser.driver();
        match action {
            ExecAction::Goto => {
                let url = param.ok_or_else(|| DriverError::Other("goto without url".to_string()))?;
                driver.goto(url, NAVIGATION_TIMEOUT).await
            }
            ExecAction::Click => {
                let index = parse_index(param)?;
                driver.scroll_into_view(index).await?;
                driver.click(index).await
            }
            ExecAction::Type => {
                let param = param.ok_or_else(|| DriverError::Other("type without param".to_string()))?;
                let (index, text) = param
                    .split_once(':')
                    .ok_or_else(|| DriverError::Other(format!("type param not id:text: {}", param)))?;
                let index = parse_index(Some(index))?;
                driver.focus(index).await?;
                driver.scroll_into_view(index).await?;
                driver.insert_text(text).await?;
                driver.press_enter().await
            }
            ExecAction::Search => {
                let query = param.ok_or_else(|| DriverError::Other("search without query".to_string()))?;
                self.human_search(query, cancel).await
            }
            ExecAction::Wait => {
                sleep_cancellable(Duration::from_secs(5), cancel).await;
                Ok(())
            }
            ExecAction::Finish | ExecAction::Answer => Ok(()),
        }
    }

    /// Simulate a human search: engine home, find the box, click, type
    /// with per-character jitter, pause, Enter. Any failure falls back to
    /// a direct query-string navigation.
    async fn human_search(&self, query: &str, cancel: &CancellationToken) -> Result<(), DriverError> {
        if let Err(e) = self.try_human_search(query, cancel).await {
            warn!(error = %e, "Human search failed, falling back to direct query URL");
            let url = format!("{}/search?q={}", SEARCH_ENGINE_HOME, urlencoding::encode(query));
            return self.browser.driver().goto(&url, SEARCH_NAVIGATION_TIMEOUT).await;
        }
        Ok(())
    }

    async fn try_human_search(&self, query: &str, cancel: &CancellationToken) -> Result<(), DriverError> {
        let driver = self.browser.driver();
        driver.goto(SEARCH_ENGINE_HOME, NAVIGATION_TIMEOUT).await?;

        let snapshot = driver.snapshot().await?;
        let index =
            find_search_input(&snapshot).ok_or_else(|| DriverError::Other("no search input found".to_string()))?;
        driver.scroll_into_view(index).await?;
        driver.focus(index).await?;
        driver.click(index).await?;

        for c in query.chars() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            driver.type_char(c).await?;
            let delay = Duration::from_millis(rand::rng().random_range(150..=350));
            tokio::time::sleep(delay).await;
        }

        let pause = Duration::from_millis(rand::rng().random_range(500..=1000));
        if !sleep_cancellable(pause, cancel).await {
            return Ok(());
        }
        driver.press_enter().await?;
        driver.wait_for_navigation(SEARCH_NAVIGATION_TIMEOUT).await
    }
}

fn parse_index(param: Option<&str>) -> Result<usize, DriverError> {
    param
        .and_then(|p| p.trim().parse::<usize>().ok())
        .ok_or_else(|| DriverError::Other(format!("invalid element index: {:?}", param)))
}

/// Prefer an input/textarea whose label mentions search, else the first
/// text-entry element on the page.
fn find_search_input(snapshot: &PageSnapshot) -> Option<usize> {
    let is_entry = |tag: &str| matches!(tag, "input" | "textarea");
    snapshot
        .interactive_elements
        .iter()
        .find(|el| is_entry(&el.tag) && el.text.to_lowercase().contains("search"))
        .or_else(|| snapshot.interactive_elements.iter().find(|el| is_entry(&el.tag)))
        .map(|el| el.index)
}
