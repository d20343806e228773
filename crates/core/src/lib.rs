use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable handle for a browsing context under supervision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TabId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Payload of a start command, trigger to supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperviseRequest {
    pub tab_id: TabId,
    /// URL expected to remain unchanged for the lifetime of the record.
    pub url: String,
    /// Reload budget; must be at least 1.
    pub max_retries: u32,
    /// Poll period in seconds; must be at least 1.
    pub interval_secs: u64,
}

/// Detector's answer to a load check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub fully_loaded: bool,
}

/// Unsolicited detector-to-supervisor event, fired at most once per page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    PageFullyLoaded { tab_id: TabId },
}

/// Transient in-page notification shown when supervision ends with a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    MaxRetriesReached,
}

/// Raw per-check observation of a page, produced by a `PageProbe`.
///
/// Field names follow the in-page snapshot object so probe output can be
/// deserialized directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// Document readiness, `"complete"` once fully parsed and loaded.
    pub ready_state: String,
    /// Direct children of the body element.
    pub body_child_count: u32,
    /// Whether any known main-content landmark has at least one child.
    pub landmark_populated: bool,
    /// Generic content-bearing elements anywhere in the document.
    pub content_element_count: u32,
    /// Loading indicators currently present in layout.
    pub visible_indicator_count: u32,
    /// Images intersecting the viewport vertically that have not finished.
    pub pending_viewport_images: u32,
    /// Total scrollable height of the document.
    pub scroll_height: u64,
}

/// Failures on the per-tab surface. All of them are absorbed by the
/// supervisor's state machine, never surfaced as a crash.
#[derive(Debug, Clone, Error)]
pub enum TabError {
    /// Tab lookup failed; the tab was closed or never existed.
    #[error("tab no longer exists")]
    Gone,
    /// The in-page detector could not be reached, e.g. the tab just reloaded
    /// and nothing is attached yet. Counts as a failed load check.
    #[error("load detector unreachable: {0}")]
    DetectorUnreachable(String),
    #[error("browser backend error: {0}")]
    Backend(String),
}

/// Failures on the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuperviseError {
    #[error("invalid supervision request: {0}")]
    InvalidRequest(String),
    #[error("supervisor is no longer running")]
    SupervisorGone,
}

/// The per-tab surface the supervisor drives: URL inspection, reload-in-place,
/// the load-check request channel into the page, and notification rendering.
#[async_trait]
pub trait TabSession: Send + Sync {
    fn id(&self) -> TabId;

    /// Current URL of the tab. `TabError::Gone` when the lookup fails.
    async fn current_url(&self) -> Result<String, TabError>;

    /// Reload the tab in place.
    async fn reload(&self) -> Result<(), TabError>;

    /// Ask the in-page detector whether the page counts as fully loaded.
    async fn check_loaded(&self) -> Result<CheckResponse, TabError>;

    /// Make sure the load detector is attached and watching this tab.
    async fn ensure_detector(&self) -> Result<(), TabError>;

    /// Render a transient in-page notification. Best effort.
    async fn show_notification(&self, kind: NotificationKind) -> Result<(), TabError>;
}

/// Produces `PageSnapshot`s from inside a live page.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn snapshot(&self) -> Result<PageSnapshot, TabError>;
}
