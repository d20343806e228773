mod trigger;

pub use trigger::Trigger;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use pagewatch_core::{
    DetectorEvent, NotificationKind, SuperviseError, SuperviseRequest, TabId, TabSession,
};
use pagewatch_storage::FlagStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Control and event messages accepted by the supervisor actor.
pub enum Command {
    /// Start (or restart) supervising a tab.
    Start {
        tab: Arc<dyn TabSession>,
        request: SuperviseRequest,
        ack: oneshot::Sender<()>,
    },
    /// Stop supervising a tab; no-op if it is not supervised.
    Stop { tab_id: TabId, ack: oneshot::Sender<()> },
    /// The tab was closed; clean up the record and the flag-store entry.
    TabClosed { tab_id: TabId },
    /// Unsolicited settlement report from a load detector.
    PageSettled { tab_id: TabId },
    /// One poll-timer firing for a supervised tab. Internal.
    Tick { tab_id: TabId },
}

/// Per-tab supervision record. Exists exactly while the tab is being polled;
/// dropping it aborts the poll timer, so a record can never outlive its timer
/// or vice versa.
struct Record {
    target_url: String,
    retry_count: u32,
    max_retries: u32,
    tab: Arc<dyn TabSession>,
    poll: JoinHandle<()>,
}

impl Drop for Record {
    fn drop(&mut self) {
        self.poll.abort();
    }
}

struct TickOutcome {
    tab_id: TabId,
    action: TickAction,
}

enum TickAction {
    /// Page not settled yet; a reload was issued and a retry consumed.
    Reloaded,
    /// The detector confirmed settlement on this poll.
    Settled,
    /// Retry budget spent before this tick; no reload was issued.
    Exhausted,
    /// The tab's URL no longer matches; the user's navigation wins.
    NavigatedAway,
    /// Tab lookup failed.
    TabGone,
}

/// Coordinator for per-tab reload supervision.
///
/// A single actor owns the record table; per-tab timers are lightweight tasks
/// feeding `Tick` commands back into the actor's channel, and tick work runs
/// as futures multiplexed through `FuturesUnordered`. Outcomes are checked
/// against record existence before being applied, so responses that arrive
/// after a record was erased are silently dropped.
pub struct Supervisor<S: FlagStore + 'static> {
    flags: Arc<S>,
    sender: mpsc::Sender<Command>,
}

impl<S: FlagStore + 'static> Clone for Supervisor<S> {
    fn clone(&self) -> Self {
        Self { flags: Arc::clone(&self.flags), sender: self.sender.clone() }
    }
}

impl<S: FlagStore + 'static> Supervisor<S> {
    pub fn new(flags: Arc<S>, capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { flags, sender: tx }, rx)
    }

    /// Begin supervising `tab`. Restarting an already-supervised tab cancels
    /// its previous timer first. Acknowledged once the record is armed; the
    /// first poll fires one full interval later.
    pub async fn start(
        &self,
        tab: Arc<dyn TabSession>,
        request: SuperviseRequest,
    ) -> Result<(), SuperviseError> {
        if request.max_retries < 1 {
            return Err(SuperviseError::InvalidRequest(
                "maxRetries must be at least 1".to_string(),
            ));
        }
        if request.interval_secs < 1 {
            return Err(SuperviseError::InvalidRequest(
                "intervalSecs must be at least 1".to_string(),
            ));
        }

        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Start { tab, request, ack })
            .await
            .map_err(|_| SuperviseError::SupervisorGone)?;
        done.await.map_err(|_| SuperviseError::SupervisorGone)
    }

    pub async fn stop(&self, tab_id: TabId) -> Result<(), SuperviseError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Stop { tab_id, ack })
            .await
            .map_err(|_| SuperviseError::SupervisorGone)?;
        done.await.map_err(|_| SuperviseError::SupervisorGone)
    }

    /// Report that a tab was closed. Fire and forget.
    pub async fn notify_tab_closed(&self, tab_id: TabId) -> Result<(), SuperviseError> {
        self.sender
            .send(Command::TabClosed { tab_id })
            .await
            .map_err(|_| SuperviseError::SupervisorGone)
    }

    /// Channel end load detectors push their settlement events into. Must be
    /// called within a runtime; the forwarding task lives until the channel
    /// or the supervisor goes away.
    pub fn detector_events(&self, capacity: usize) -> mpsc::Sender<DetectorEvent> {
        let (tx, mut rx) = mpsc::channel(capacity);
        let commands = self.sender.clone();
        tokio::spawn(async move {
            while let Some(DetectorEvent::PageFullyLoaded { tab_id }) = rx.recv().await {
                if commands.send(Command::PageSettled { tab_id }).await.is_err() {
                    break;
                }
            }
        });
        tx
    }

    /// Drive the actor. Runs until every command sender is gone.
    pub async fn run(&self, mut commands: mpsc::Receiver<Command>) {
        let mut records: HashMap<TabId, Record> = HashMap::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            tokio::select! {
                Some(command) = commands.recv() => match command {
                    Command::Start { tab, request, ack } => {
                        self.start_supervision(&mut records, tab, request).await;
                        let _ = ack.send(());
                    }
                    Command::Stop { tab_id, ack } => {
                        if records.remove(&tab_id).is_some() {
                            info!(tab = %tab_id, "supervision stopped");
                        }
                        let _ = ack.send(());
                    }
                    Command::TabClosed { tab_id } => {
                        if records.remove(&tab_id).is_some() {
                            info!(tab = %tab_id, "supervised tab closed");
                        }
                        if let Err(e) = self.flags.remove(&tab_id).await {
                            warn!(tab = %tab_id, error = %e, "flag store cleanup failed");
                        }
                    }
                    Command::PageSettled { tab_id } => match records.remove(&tab_id) {
                        Some(record) => {
                            info!(tab = %tab_id, "page settled, supervision complete");
                            self.clear_flag(&tab_id).await;
                            let tab = Arc::clone(&record.tab);
                            tokio::spawn(async move {
                                if let Err(e) =
                                    tab.show_notification(NotificationKind::Success).await
                                {
                                    debug!(error = %e, "success notification not delivered");
                                }
                            });
                        }
                        None => {
                            debug!(tab = %tab_id, "settlement event for unsupervised tab ignored");
                        }
                    },
                    Command::Tick { tab_id } => {
                        if let Some(record) = records.get(&tab_id) {
                            in_flight.push(run_tick(
                                Arc::clone(&record.tab),
                                record.target_url.clone(),
                                record.retry_count,
                                record.max_retries,
                            ));
                        }
                    }
                },
                Some(outcome) = in_flight.next() => {
                    self.apply_outcome(&mut records, outcome).await;
                }
                else => break,
            }
        }
    }

    async fn start_supervision(
        &self,
        records: &mut HashMap<TabId, Record>,
        tab: Arc<dyn TabSession>,
        request: SuperviseRequest,
    ) {
        let tab_id = request.tab_id.clone();

        // Idempotent restart: an existing record gives up its timer first.
        if records.remove(&tab_id).is_some() {
            debug!(tab = %tab_id, "restarting supervision");
        }

        if let Err(e) = tab.ensure_detector().await {
            warn!(tab = %tab_id, error = %e, "load detector not attached yet");
        }

        let period = Duration::from_secs(request.interval_secs);
        let commands = self.sender.clone();
        let timer_tab = tab_id.clone();
        let poll = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if commands.send(Command::Tick { tab_id: timer_tab.clone() }).await.is_err() {
                    break;
                }
            }
        });

        info!(
            tab = %tab_id,
            url = %request.url,
            max_retries = request.max_retries,
            interval_secs = request.interval_secs,
            "supervision started"
        );
        records.insert(
            tab_id,
            Record {
                target_url: request.url,
                retry_count: 0,
                max_retries: request.max_retries,
                tab,
                poll,
            },
        );
    }

    async fn apply_outcome(&self, records: &mut HashMap<TabId, Record>, outcome: TickOutcome) {
        let TickOutcome { tab_id, action } = outcome;
        if !records.contains_key(&tab_id) {
            debug!(tab = %tab_id, "tick outcome for erased record ignored");
            return;
        }

        match action {
            TickAction::Reloaded => {
                if let Some(record) = records.get_mut(&tab_id) {
                    record.retry_count += 1;
                    debug!(
                        tab = %tab_id,
                        retry = record.retry_count,
                        max_retries = record.max_retries,
                        "page reloaded"
                    );
                }
            }
            TickAction::Settled => {
                records.remove(&tab_id);
                info!(tab = %tab_id, "page settled, supervision complete");
                self.clear_flag(&tab_id).await;
            }
            TickAction::Exhausted => {
                records.remove(&tab_id);
                info!(tab = %tab_id, "retry budget exhausted");
                self.clear_flag(&tab_id).await;
            }
            TickAction::NavigatedAway => {
                records.remove(&tab_id);
                info!(tab = %tab_id, "tab navigated away, supervision abandoned");
                self.clear_flag(&tab_id).await;
            }
            TickAction::TabGone => {
                records.remove(&tab_id);
                info!(tab = %tab_id, "tab gone, supervision abandoned");
                self.clear_flag(&tab_id).await;
            }
        }
    }

    async fn clear_flag(&self, tab_id: &TabId) {
        if let Err(e) = self.flags.set(tab_id, false).await {
            warn!(tab = %tab_id, error = %e, "flag store update failed");
        }
    }
}

/// One poll tick against a supervised tab. Pure decision logic over the tab
/// surface; state changes are applied by the actor from the returned outcome.
async fn run_tick(
    tab: Arc<dyn TabSession>,
    target_url: String,
    retry_count: u32,
    max_retries: u32,
) -> TickOutcome {
    let tab_id = tab.id();

    let url = match tab.current_url().await {
        Ok(url) => url,
        Err(e) => {
            debug!(tab = %tab_id, error = %e, "tab lookup failed");
            return TickOutcome { tab_id, action: TickAction::TabGone };
        }
    };

    // The user's own navigation supersedes supervision: no reload, no
    // notification, no retry consumed.
    if url != target_url {
        return TickOutcome { tab_id, action: TickAction::NavigatedAway };
    }

    // Budget is checked before polling, so a tick at the limit never reloads.
    if retry_count >= max_retries {
        if let Err(e) = tab.show_notification(NotificationKind::MaxRetriesReached).await {
            debug!(tab = %tab_id, error = %e, "failure notification not delivered");
        }
        return TickOutcome { tab_id, action: TickAction::Exhausted };
    }

    let loaded = match tab.check_loaded().await {
        Ok(response) => response.fully_loaded,
        Err(e) => {
            // Unreachable detector usually means the page is mid-reload and
            // nothing is attached yet; treat it as not loaded.
            debug!(tab = %tab_id, error = %e, "load check undeliverable");
            false
        }
    };

    if loaded {
        if let Err(e) = tab.show_notification(NotificationKind::Success).await {
            debug!(tab = %tab_id, error = %e, "success notification not delivered");
        }
        TickOutcome { tab_id, action: TickAction::Settled }
    } else {
        if let Err(e) = tab.reload().await {
            warn!(tab = %tab_id, error = %e, "reload failed");
        }
        TickOutcome { tab_id, action: TickAction::Reloaded }
    }
}
