//! Domain types: sessions, tasks, steps, page snapshots

mod id;
mod session;
mod snapshot;
mod task;

pub use id::{generate_id, slugify};
pub use session::{Session, SessionStats};
pub use snapshot::{
    BrowserResult, InteractiveElement, MAX_CONTENT_SNIPPET, MAX_ELEMENT_TEXT, MAX_ELEMENTS, PageSnapshot,
};
pub use task::{AgentKind, StepUsage, Task, TaskStatus, TaskStep, TaskUsage};

/// Current time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
