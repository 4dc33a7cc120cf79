//! Browser driver contract and session binding
//!
//! The concrete driver (CDP, WebDriver, whatever) lives outside this
//! crate; the core only sees [`PageDriver`]. A [`BrowserAgent`] binds a
//! driver to one session's profile directory and owns headless toggling.
//! [`StubDriver`] is the deterministic in-memory fake used by mock mode.

mod agent;
mod stub;

pub use agent::BrowserAgent;
pub use stub::StubDriver;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::PageSnapshot;

/// Full-navigation timeout
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Post-search navigation timeout
pub const SEARCH_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);

/// Driver faults. The executor logs most of these and keeps looping;
/// only unrecoverable snapshot failures abort a task.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser not started")]
    NotStarted,

    #[error("navigation to {url} timed out")]
    NavigationTimeout { url: String },

    #[error("frame detached")]
    DetachedFrame,

    #[error("page closed")]
    PageClosed,

    #[error("no element with snapshot index {0}")]
    NoSuchElement(usize),

    #[error("driver error: {0}")]
    Other(String),
}

/// Opaque browser control surface.
///
/// Element-addressing methods take indices from the most recent snapshot;
/// the driver is responsible for keeping that mapping until the next
/// snapshot is taken.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Launch the browser bound to a profile directory. The profile (and
    /// with it cookies and logins) must survive restarts.
    async fn start(&self, profile_dir: &Path, headless: bool) -> Result<(), DriverError>;

    /// Relaunch with the same profile directory in the given mode
    async fn restart(&self, headless: bool) -> Result<(), DriverError>;

    /// Full navigation, waiting for network idle
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait for an in-flight navigation (e.g. after pressing Enter)
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Bounded structured view of the current page (see the snapshot
    /// contract on [`PageSnapshot`])
    async fn snapshot(&self) -> Result<PageSnapshot, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn scroll_into_view(&self, index: usize) -> Result<(), DriverError>;

    async fn click(&self, index: usize) -> Result<(), DriverError>;

    async fn focus(&self, index: usize) -> Result<(), DriverError>;

    /// Insert text into the focused element via the driver's text
    /// insertion primitive (no per-key events)
    async fn insert_text(&self, text: &str) -> Result<(), DriverError>;

    /// Type a single character as a key event (for human-paced typing)
    async fn type_char(&self, c: char) -> Result<(), DriverError>;

    async fn press_enter(&self) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}
