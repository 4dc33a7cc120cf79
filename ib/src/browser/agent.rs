//! BrowserAgent - one session's driver binding
//!
//! Owns the profile directory (`<storage>/session/<session-id>/`), lazy
//! startup, and the headless toggle used by the intervention handshake.
//! Not safe for concurrent tasks; the scheduler serializes per session.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DriverError, PageDriver};
use crate::domain::PageSnapshot;

struct AgentState {
    started: bool,
    headless: bool,
}

pub struct BrowserAgent {
    session_id: String,
    profile_dir: PathBuf,
    driver: Arc<dyn PageDriver>,
    state: Mutex<AgentState>,
}

impl BrowserAgent {
    /// `storage_dir` is the invisibrow storage root; the profile lands in
    /// `session/<session-id>/` beneath it.
    pub fn new(
        session_id: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
        driver: Arc<dyn PageDriver>,
        headless: bool,
    ) -> Self {
        let session_id = session_id.into();
        let profile_dir = storage_dir.into().join("session").join(&session_id);
        Self {
            session_id,
            profile_dir,
            driver,
            state: Mutex::new(AgentState {
                started: false,
                headless,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    /// Start the browser if it is not running, honoring the given
    /// preferred mode. A running browser in the wrong mode is restarted.
    pub async fn ensure_started(&self, headless: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        if !state.started {
            debug!(session_id = %self.session_id, headless, "Starting browser");
            self.driver.start(&self.profile_dir, headless).await?;
            state.started = true;
            state.headless = headless;
        } else if state.headless != headless {
            drop(state);
            return self.set_headless(headless).await;
        }
        Ok(())
    }

    /// Switch modes by restarting the driver on the same profile, so
    /// cookies and logged-in state survive the toggle.
    pub async fn set_headless(&self, headless: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        if !state.started {
            self.driver.start(&self.profile_dir, headless).await?;
            state.started = true;
            state.headless = headless;
            return Ok(());
        }
        if state.headless == headless {
            return Ok(());
        }
        debug!(session_id = %self.session_id, headless, "Restarting browser to toggle mode");
        self.driver.restart(headless).await?;
        state.headless = headless;
        Ok(())
    }

    pub async fn is_headless(&self) -> bool {
        self.state.lock().await.headless
    }

    /// Snapshot the page with one retry. Retry is limited to this read
    /// path; action failures are handled by the executor loop.
    pub async fn page_state(&self) -> Result<PageSnapshot, DriverError> {
        match self.driver.snapshot().await {
            Ok(snapshot) => Ok(snapshot),
            Err(first) => {
                warn!(session_id = %self.session_id, error = %first, "Snapshot failed, retrying once");
                self.driver.snapshot().await
            }
        }
    }

    pub async fn current_url(&self) -> Result<String, DriverError> {
        self.driver.current_url().await
    }

    pub async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        if state.started {
            self.driver.close().await?;
            state.started = false;
        }
        Ok(())
    }
}
