use std::sync::{Arc, Mutex};
use std::time::Duration;

use pagewatch_core::{DetectorEvent, PageProbe, PageSnapshot, TabError, TabId};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Containers whose populated presence marks the page's main content.
pub const DEFAULT_LANDMARK_SELECTORS: &[&str] =
    &["main", "#main", "#content", ".content", "article", "#root", "#app"];

/// Generic content-bearing elements counted when no landmark matches.
pub const DEFAULT_CONTENT_SELECTORS: &[&str] = &["div", "p", "ul", "ol", "table", "form"];

/// Elements that mean the page is still loading while present in layout.
pub const DEFAULT_INDICATOR_SELECTORS: &[&str] = &[
    ".loading",
    ".loader",
    ".spinner",
    "[data-loading=\"true\"]",
    "progress",
    ".progress",
    ".preloader",
    "#loading",
    ".loading-spinner",
    "[aria-busy=\"true\"]",
];

/// Tunable settlement policy. The thresholds and selector lists are heuristic
/// choices, not hard semantics, and may need domain-specific tuning.
#[derive(Debug, Clone)]
pub struct DetectorPolicy {
    /// Consecutive successful evaluations required before reporting.
    pub confirmations: u32,
    /// Minimum generic content elements accepted when no landmark matches.
    pub min_content_elements: u32,
    /// Delay between autonomous evaluations after a load event.
    pub check_interval: Duration,
    /// Grace period after the load event before the first evaluation, so
    /// post-load scripts get a chance to run.
    pub post_load_delay: Duration,
    pub landmark_selectors: Vec<String>,
    pub content_selectors: Vec<String>,
    pub indicator_selectors: Vec<String>,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            confirmations: 3,
            min_content_elements: 3,
            check_interval: Duration::from_millis(300),
            post_load_delay: Duration::from_millis(1000),
            landmark_selectors: to_owned(DEFAULT_LANDMARK_SELECTORS),
            content_selectors: to_owned(DEFAULT_CONTENT_SELECTORS),
            indicator_selectors: to_owned(DEFAULT_INDICATOR_SELECTORS),
        }
    }
}

impl DetectorPolicy {
    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_check_interval(mut self, ms: u64) -> Self {
        self.check_interval = Duration::from_millis(ms);
        self
    }

    pub fn with_post_load_delay(mut self, ms: u64) -> Self {
        self.post_load_delay = Duration::from_millis(ms);
        self
    }
}

fn to_owned(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| s.to_string()).collect()
}

/// Settlement state for one page load: unconfirmed with a success streak
/// until the confirmation threshold, then reported.
#[derive(Debug)]
pub struct SettleTracker {
    confirmations: u32,
    min_content_elements: u32,
    streak: u32,
    reported: bool,
    last_height: Option<u64>,
}

impl SettleTracker {
    pub fn new(policy: &DetectorPolicy) -> Self {
        Self {
            confirmations: policy.confirmations,
            min_content_elements: policy.min_content_elements,
            streak: 0,
            reported: false,
            last_height: None,
        }
    }

    /// Forget everything about the previous page load.
    pub fn reset(&mut self) {
        self.streak = 0;
        self.reported = false;
        self.last_height = None;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    /// Feed one snapshot. Returns `true` only on the evaluation that crosses
    /// the confirmation threshold; any failed evaluation resets the streak.
    pub fn observe(&mut self, snapshot: &PageSnapshot) -> bool {
        if !self.evaluate(snapshot) {
            self.streak = 0;
            return false;
        }

        self.streak += 1;
        if self.streak >= self.confirmations && !self.reported {
            self.reported = true;
            return true;
        }
        false
    }

    fn evaluate(&mut self, snapshot: &PageSnapshot) -> bool {
        if snapshot.ready_state != "complete" {
            return false;
        }
        if snapshot.body_child_count == 0 {
            return false;
        }
        if !snapshot.landmark_populated
            && snapshot.content_element_count < self.min_content_elements
        {
            return false;
        }
        if snapshot.visible_indicator_count > 0 {
            return false;
        }
        if snapshot.pending_viewport_images > 0 {
            return false;
        }

        // Height is only compared once everything else holds, so a page that
        // is still fetching does not advance the growth baseline. The first
        // evaluation after navigation has no baseline and always fails.
        match self.last_height {
            Some(height) if height == snapshot.scroll_height => true,
            _ => {
                self.last_height = Some(snapshot.scroll_height);
                false
            }
        }
    }
}

/// In-page load detector for a single tab.
///
/// Answers supervisor-initiated load checks and, after each page load event,
/// runs its own confirmation loop, pushing a `PageFullyLoaded` event exactly
/// once per load regardless of whether the supervisor happens to be polling.
pub struct Detector {
    tab_id: TabId,
    probe: Arc<dyn PageProbe>,
    policy: DetectorPolicy,
    tracker: Mutex<SettleTracker>,
    events: mpsc::Sender<DetectorEvent>,
}

impl Detector {
    pub fn new(
        tab_id: TabId,
        probe: Arc<dyn PageProbe>,
        policy: DetectorPolicy,
        events: mpsc::Sender<DetectorEvent>,
    ) -> Self {
        let tracker = Mutex::new(SettleTracker::new(&policy));
        Self { tab_id, probe, policy, tracker, events }
    }

    pub fn policy(&self) -> &DetectorPolicy {
        &self.policy
    }

    pub fn is_reported(&self) -> bool {
        self.tracker.lock().unwrap().is_reported()
    }

    /// Reset settlement state for a fresh page load.
    pub fn page_navigated(&self) {
        self.tracker.lock().unwrap().reset();
    }

    /// Supervisor-initiated check. Answers `true` only on the call that
    /// confirms settlement; that call also fires the unsolicited event.
    pub async fn check_loaded(&self) -> Result<bool, TabError> {
        let snapshot = self.probe.snapshot().await?;
        let confirmed = self.tracker.lock().unwrap().observe(&snapshot);
        if confirmed {
            self.report().await;
        }
        Ok(confirmed)
    }

    /// Autonomous confirmation loop, run once per load event. Keeps
    /// re-evaluating until settlement is reported or the page goes away.
    pub async fn watch_load(&self) {
        sleep(self.policy.post_load_delay).await;

        loop {
            if self.tracker.lock().unwrap().is_reported() {
                return;
            }

            let snapshot = match self.probe.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(tab = %self.tab_id, error = %e, "probe failed, abandoning load watch");
                    return;
                }
            };

            if self.tracker.lock().unwrap().observe(&snapshot) {
                self.report().await;
                return;
            }

            sleep(self.policy.check_interval).await;
        }
    }

    async fn report(&self) {
        info!(tab = %self.tab_id, "page settled");
        let event = DetectorEvent::PageFullyLoaded { tab_id: self.tab_id.clone() };
        if self.events.send(event).await.is_err() {
            warn!(tab = %self.tab_id, "settlement event dropped, supervisor gone");
        }
    }
}
