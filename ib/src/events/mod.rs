//! Process-wide event fan-out
//!
//! The core emits logs, intervention requests, and stats updates here; the
//! UI layer subscribes and emits intervention resolutions back.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, WaitOutcome, create_event_bus};
pub use types::{Event, LogLevel};
