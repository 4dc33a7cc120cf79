//! Prompt templates and reply schemas
//!
//! Templates are `.pmt` files compiled into the binary and rendered with
//! handlebars. Each LLM reply shape has a named JSON schema; the schema
//! name also routes scripted replies in mock mode.

mod embedded;

pub use embedded::{EXECUTOR, KEYWORDS, PLANNER, SUMMARIZE, WATCHDOG};

use std::sync::OnceLock;

use eyre::{Context, Result};
use handlebars::Handlebars;

// Schema names, shared with the scripted chat's reply routing
pub const SCHEMA_KEYWORDS: &str = "extract_keywords";
pub const SCHEMA_PLAN_STEP: &str = "plan_step";
pub const SCHEMA_EXECUTOR_DECISION: &str = "executor_decision";
pub const SCHEMA_WATCHDOG: &str = "watchdog_check";
pub const SCHEMA_SUMMARIZE: &str = "summarize_result";

fn registry() -> &'static Handlebars<'static> {
    static REGISTRY: OnceLock<Handlebars<'static>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        hb.register_template_string("planner", PLANNER)
            .expect("planner template parses");
        hb.register_template_string("executor", EXECUTOR)
            .expect("executor template parses");
        hb.register_template_string("summarize", SUMMARIZE)
            .expect("summarize template parses");
        hb
    })
}

/// System prompt for a plan step
pub fn render_planner(goal: &str, memory_block: &str, history_block: &str, trace: &str) -> Result<String> {
    registry()
        .render("planner", &serde_json::json!({
            "goal": goal,
            "memory_block": memory_block,
            "history_block": history_block,
            "trace": trace,
        }))
        .context("Failed to render planner prompt")
}

/// System prompt for an executor decision
pub fn render_executor(goal: &str, history: &str) -> Result<String> {
    registry()
        .render("executor", &serde_json::json!({
            "goal": goal,
            "history": history,
        }))
        .context("Failed to render executor prompt")
}

/// System prompt for result summarization
pub fn render_summarize(goal: &str) -> Result<String> {
    registry()
        .render("summarize", &serde_json::json!({ "goal": goal }))
        .context("Failed to render summarize prompt")
}

// === Reply schemas ===

pub fn keywords_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "keywords": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 3,
                "maxItems": 5,
            },
        },
        "required": ["keywords"],
        "additionalProperties": false,
    })
}

pub fn plan_step_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "thought": {"type": "string"},
            "command": {"type": "string", "enum": ["browser", "finish", "wait"]},
            "input": {
                "type": "object",
                "properties": {
                    "goal": {"type": ["string", "null"]},
                    "answer": {"type": ["string", "null"]},
                },
                "required": ["goal", "answer"],
                "additionalProperties": false,
            },
        },
        "required": ["thought", "command", "input"],
        "additionalProperties": false,
    })
}

pub fn executor_decision_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "thought": {"type": "string"},
            "action": {
                "type": "string",
                "enum": ["goto", "click", "type", "search", "wait", "finish", "answer"],
            },
            "param": {"type": ["string", "null"]},
            "answer": {"type": ["string", "null"]},
        },
        "required": ["thought", "action", "param", "answer"],
        "additionalProperties": false,
    })
}

pub fn watchdog_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "is_stuck": {"type": "boolean"},
            "needs_intervention": {"type": "boolean"},
            "reason": {"type": "string"},
            "new_block_keywords": {
                "type": "array",
                "items": {"type": "string"},
            },
        },
        "required": ["is_stuck", "needs_intervention", "reason", "new_block_keywords"],
        "additionalProperties": false,
    })
}

pub fn summarize_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string"},
            "extracted": {"type": "object"},
        },
        "required": ["summary", "extracted"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_renders_blocks_conditionally() {
        let with_blocks = render_planner("buy milk", "- past task", "- history line", "step 1: browser").unwrap();
        assert!(with_blocks.contains("buy milk"));
        assert!(with_blocks.contains("- past task"));
        assert!(with_blocks.contains("- history line"));
        assert!(with_blocks.contains("step 1: browser"));

        let bare = render_planner("buy milk", "", "", "").unwrap();
        assert!(!bare.contains("past tasks"));
        assert!(!bare.contains("session:"));
    }

    #[test]
    fn test_planner_states_verbatim_rule() {
        let prompt = render_planner("g", "", "", "").unwrap();
        assert!(prompt.contains("verbatim"));
    }

    #[test]
    fn test_executor_renders_goal_and_history() {
        let prompt = render_executor("open example.com", "1: looked around").unwrap();
        assert!(prompt.contains("open example.com"));
        assert!(prompt.contains("1: looked around"));
    }

    #[test]
    fn test_watchdog_prompt_encodes_negative_cases() {
        assert!(WATCHDOG.contains("ONLY"));
        assert!(WATCHDOG.contains("MAIN CONTENT"));
        assert!(WATCHDOG.contains("optional login"));
        assert!(WATCHDOG.contains("three or more"));
    }

    #[test]
    fn test_schemas_are_objects() {
        for schema in [
            keywords_schema(),
            plan_step_schema(),
            executor_decision_schema(),
            watchdog_schema(),
            summarize_schema(),
        ] {
            assert_eq!(schema["type"], "object");
            assert!(schema["required"].is_array());
        }
    }
}
