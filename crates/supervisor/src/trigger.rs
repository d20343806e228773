use std::sync::Arc;

use pagewatch_core::{SuperviseError, SuperviseRequest, TabId, TabSession};
use pagewatch_storage::FlagStore;
use tracing::warn;

use crate::Supervisor;

/// Short-lived control front-end: validates input locally, forwards start and
/// stop to the supervisor, and mirrors the supervised flag for display
/// continuity across re-opens.
pub struct Trigger<S: FlagStore + 'static> {
    supervisor: Supervisor<S>,
    flags: Arc<S>,
}

impl<S: FlagStore + 'static> Trigger<S> {
    pub fn new(supervisor: Supervisor<S>, flags: Arc<S>) -> Self {
        Self { supervisor, flags }
    }

    /// Displayed state only. Best effort, may be stale.
    pub async fn status(&self, tab_id: &TabId) -> bool {
        self.flags.get(tab_id).await.unwrap_or(false)
    }

    /// Start supervising `tab`. Rejected locally, with nothing sent to the
    /// supervisor, unless both `max_retries` and `interval_secs` are >= 1.
    pub async fn start(
        &self,
        tab: Arc<dyn TabSession>,
        url: impl Into<String>,
        max_retries: u32,
        interval_secs: u64,
    ) -> Result<(), SuperviseError> {
        if max_retries < 1 || interval_secs < 1 {
            return Err(SuperviseError::InvalidRequest(
                "maxRetries and intervalSecs must both be at least 1".to_string(),
            ));
        }

        let tab_id = tab.id();
        let request = SuperviseRequest {
            tab_id: tab_id.clone(),
            url: url.into(),
            max_retries,
            interval_secs,
        };
        self.supervisor.start(tab, request).await?;

        if let Err(e) = self.flags.set(&tab_id, true).await {
            warn!(tab = %tab_id, error = %e, "flag store update failed");
        }
        Ok(())
    }

    pub async fn stop(&self, tab_id: TabId) -> Result<(), SuperviseError> {
        self.supervisor.stop(tab_id.clone()).await?;

        if let Err(e) = self.flags.set(&tab_id, false).await {
            warn!(tab = %tab_id, error = %e, "flag store update failed");
        }
        Ok(())
    }
}
