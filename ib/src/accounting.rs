//! Token accounting: per-call cost estimation and per-session rolling stats
//!
//! Pricing is USD per 1M tokens with three rates per model: non-cached
//! input, cached input (half the input rate), and output. Models not in
//! the table are charged at the highest tier so costs are never
//! underestimated.

use std::sync::Arc;

use crate::domain::StepUsage;
use crate::events::{Event, EventBus};
use crate::llm::TokenUsage;
use crate::store::SessionStore;

/// USD per 1M tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub cached_input: f64,
    pub output: f64,
}

/// Prefix-matched pricing table, most specific entries first
const PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-5-mini", ModelPricing {
        input: 0.25,
        cached_input: 0.125,
        output: 2.0,
    }),
    ("gpt-5-nano", ModelPricing {
        input: 0.05,
        cached_input: 0.025,
        output: 0.4,
    }),
    ("gpt-5", ModelPricing {
        input: 1.25,
        cached_input: 0.625,
        output: 10.0,
    }),
    ("gpt-4.1-mini", ModelPricing {
        input: 0.4,
        cached_input: 0.2,
        output: 1.6,
    }),
    ("gpt-4.1", ModelPricing {
        input: 2.0,
        cached_input: 1.0,
        output: 8.0,
    }),
    ("gpt-4o-mini", ModelPricing {
        input: 0.15,
        cached_input: 0.075,
        output: 0.6,
    }),
    ("gpt-4o", ModelPricing {
        input: 2.5,
        cached_input: 1.25,
        output: 10.0,
    }),
    ("o3", ModelPricing {
        input: 2.0,
        cached_input: 1.0,
        output: 8.0,
    }),
];

/// Fallback for unknown models: the most expensive entry in the table
const HIGHEST_TIER: ModelPricing = ModelPricing {
    input: 2.5,
    cached_input: 1.25,
    output: 10.0,
};

/// Look up pricing by model-name prefix
pub fn pricing_for(model: &str) -> ModelPricing {
    PRICING
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, p)| *p)
        .unwrap_or(HIGHEST_TIER)
}

/// Estimated USD cost of one call
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let pricing = pricing_for(model);
    let non_cached = usage.prompt_tokens.saturating_sub(usage.cached_tokens);
    (non_cached as f64 * pricing.input + usage.cached_tokens as f64 * pricing.cached_input
        + usage.completion_tokens as f64 * pricing.output)
        / 1_000_000.0
}

/// Convert one call's raw usage into a costed step record
pub fn step_usage(model: &str, usage: &TokenUsage) -> StepUsage {
    StepUsage {
        input_tokens: usage.prompt_tokens,
        cached_tokens: usage.cached_tokens,
        output_tokens: usage.completion_tokens,
        cost: estimate_cost(model, usage),
    }
}

/// Applies call usage to a session's rolling stats and notifies the UI
pub struct TokenAccounting {
    sessions: Arc<SessionStore>,
    bus: Arc<EventBus>,
}

impl TokenAccounting {
    pub fn new(sessions: Arc<SessionStore>, bus: Arc<EventBus>) -> Self {
        Self { sessions, bus }
    }

    /// Fold one costed call into the session stats and emit
    /// `session:stats-updated`.
    pub fn record(&self, session_id: &str, usage: &StepUsage) -> eyre::Result<()> {
        self.sessions.apply_usage(session_id, usage)?;
        self.bus.emit(Event::SessionStatsUpdated {
            session_id: session_id.to_string(),
        });
        Ok(())
    }
}
