//! memstore - long-term memory for the invisibrow agent core
//!
//! Two concerns share one SQLite file:
//!
//! - **Task recall**: summaries of finished tasks, keyed by lowercase
//!   keywords, so later tasks can reuse answers instead of re-browsing.
//! - **Bot keywords**: a self-learned list of block-page markers used as a
//!   fast pre-LLM intervention filter. A seeded default set is the floor;
//!   the watchdog grows the list over time.
//!
//! All operations are synchronous; callers serialize access through the
//! store's internal mutex (single-process, multi-worker use).

pub mod cli;
pub mod store;

pub use store::{BotKeyword, MemoryRecord, MemoryStatus, MemoryStore, tokenize};

/// Maximum number of records returned by a recall search
pub const SEARCH_LIMIT: usize = 5;

/// Minimum token length considered worth learning
pub const TOKEN_MIN_LEN: usize = 4;

/// Maximum learned tokens accepted from a single text
pub const TOKEN_CAP: usize = 12;

/// Current time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
