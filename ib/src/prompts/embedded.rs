//! Embedded prompt templates
//!
//! Compiled into the binary from the `.pmt` files under `ib/prompts/`.

/// Planner plan-step system prompt (handlebars)
pub const PLANNER: &str = include_str!("../../prompts/planner.pmt");

/// Executor decision system prompt (handlebars)
pub const EXECUTOR: &str = include_str!("../../prompts/executor.pmt");

/// Watchdog tier-2 system prompt (static)
pub const WATCHDOG: &str = include_str!("../../prompts/watchdog.pmt");

/// Result summarization system prompt (handlebars)
pub const SUMMARIZE: &str = include_str!("../../prompts/summarize.pmt");

/// Keyword extraction system prompt (static)
pub const KEYWORDS: &str = include_str!("../../prompts/keywords.pmt");
