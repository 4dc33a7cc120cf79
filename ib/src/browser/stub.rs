//! Deterministic in-memory driver for mock mode and tests
//!
//! Pages are registered up front; navigation flips the current URL,
//! actions append to a log that tests can assert on. No real browser,
//! no timing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DriverError, PageDriver};
use crate::domain::{InteractiveElement, PageSnapshot};

struct StubState {
    started: bool,
    headless: bool,
    profile_dir: Option<PathBuf>,
    current_url: String,
    pages: HashMap<String, PageSnapshot>,
    actions: Vec<String>,
    start_count: u32,
    restart_count: u32,
    fail_snapshots: u32,
}

pub struct StubDriver {
    state: Mutex<StubState>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                started: false,
                headless: true,
                profile_dir: None,
                current_url: "about:blank".to_string(),
                pages: HashMap::new(),
                actions: Vec::new(),
                start_count: 0,
                restart_count: 0,
                fail_snapshots: 0,
            }),
        }
    }

    /// Register a page; navigating to `url` will serve this snapshot
    pub fn add_page(&self, url: &str, snapshot: PageSnapshot) {
        self.lock().pages.insert(url.to_string(), snapshot);
    }

    /// Make the next `n` snapshot calls fail with a detached frame
    pub fn fail_next_snapshots(&self, n: u32) {
        self.lock().fail_snapshots = n;
    }

    /// Everything the executor did, in order ("goto <url>", "click 3", ...)
    pub fn actions(&self) -> Vec<String> {
        self.lock().actions.clone()
    }

    pub fn start_count(&self) -> u32 {
        self.lock().start_count
    }

    pub fn restart_count(&self) -> u32 {
        self.lock().restart_count
    }

    pub fn profile_dir(&self) -> Option<PathBuf> {
        self.lock().profile_dir.clone()
    }

    pub fn is_headless(&self) -> bool {
        self.lock().headless
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn default_page(url: &str) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            title: "Stub page".to_string(),
            interactive_elements: vec![
                InteractiveElement {
                    index: 0,
                    tag: "input".to_string(),
                    text: "Search".to_string(),
                },
                InteractiveElement {
                    index: 1,
                    tag: "a".to_string(),
                    text: "First result".to_string(),
                },
            ],
            content_snippet: "Deterministic stub page content.".to_string(),
        }
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for StubDriver {
    async fn start(&self, profile_dir: &Path, headless: bool) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.started = true;
        state.headless = headless;
        state.profile_dir = Some(profile_dir.to_path_buf());
        state.start_count += 1;
        Ok(())
    }

    async fn restart(&self, headless: bool) -> Result<(), DriverError> {
        let mut state = self.lock();
        if !state.started {
            return Err(DriverError::NotStarted);
        }
        state.headless = headless;
        state.restart_count += 1;
        Ok(())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.lock();
        if !state.started {
            return Err(DriverError::NotStarted);
        }
        state.current_url = url.to_string();
        state.actions.push(format!("goto {}", url));
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), DriverError> {
        self.lock().actions.push("wait_for_navigation".to_string());
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        let mut state = self.lock();
        if !state.started {
            return Err(DriverError::NotStarted);
        }
        if state.fail_snapshots > 0 {
            state.fail_snapshots -= 1;
            return Err(DriverError::DetachedFrame);
        }
        let url = state.current_url.clone();
        Ok(state.pages.get(&url).cloned().unwrap_or_else(|| Self::default_page(&url)))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.lock().current_url.clone())
    }

    async fn scroll_into_view(&self, index: usize) -> Result<(), DriverError> {
        self.lock().actions.push(format!("scroll {}", index));
        Ok(())
    }

    async fn click(&self, index: usize) -> Result<(), DriverError> {
        self.lock().actions.push(format!("click {}", index));
        Ok(())
    }

    async fn focus(&self, index: usize) -> Result<(), DriverError> {
        self.lock().actions.push(format!("focus {}", index));
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<(), DriverError> {
        self.lock().actions.push(format!("insert {}", text));
        Ok(())
    }

    async fn type_char(&self, c: char) -> Result<(), DriverError> {
        self.lock().actions.push(format!("type {}", c));
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), DriverError> {
        self.lock().actions.push("enter".to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.started = false;
        state.actions.push("close".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_start() {
        let driver = StubDriver::new();
        assert!(matches!(
            driver.goto("https://example.com", Duration::from_secs(1)).await,
            Err(DriverError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_registered_page_served() {
        let driver = StubDriver::new();
        driver.start(Path::new("/tmp/p"), true).await.unwrap();
        driver.add_page("https://example.com", PageSnapshot {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            interactive_elements: vec![],
            content_snippet: "hi".to_string(),
        });

        driver.goto("https://example.com", Duration::from_secs(1)).await.unwrap();
        let snap = driver.snapshot().await.unwrap();
        assert_eq!(snap.title, "Example");
    }

    #[tokio::test]
    async fn test_action_log_order() {
        let driver = StubDriver::new();
        driver.start(Path::new("/tmp/p"), true).await.unwrap();
        driver.focus(2).await.unwrap();
        driver.insert_text("query").await.unwrap();
        driver.press_enter().await.unwrap();

        assert_eq!(driver.actions(), vec!["focus 2", "insert query", "enter"]);
    }
}
