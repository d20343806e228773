use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pagewatch_core::{DetectorEvent, PageProbe, PageSnapshot, TabError, TabId};
use pagewatch_detector::{Detector, DetectorPolicy, SettleTracker};
use tokio::sync::mpsc;

fn settled_snapshot(height: u64) -> PageSnapshot {
    PageSnapshot {
        ready_state: "complete".to_string(),
        body_child_count: 4,
        landmark_populated: true,
        content_element_count: 12,
        visible_indicator_count: 0,
        pending_viewport_images: 0,
        scroll_height: height,
    }
}

fn tracker() -> SettleTracker {
    SettleTracker::new(&DetectorPolicy::default())
}

#[test]
fn first_evaluation_always_fails_without_height_baseline() {
    let mut tracker = tracker();
    // Perfect snapshot, but no prior height to compare against.
    assert!(!tracker.observe(&settled_snapshot(1000)));
    assert_eq!(tracker.streak(), 0);
}

#[test]
fn reports_after_three_consecutive_successes() {
    let mut tracker = tracker();
    let results: Vec<bool> =
        (0..4).map(|_| tracker.observe(&settled_snapshot(1000))).collect();
    // Bootstrap evaluation, then the streak builds to the threshold.
    assert_eq!(results, vec![false, false, false, true]);
    assert!(tracker.is_reported());
}

#[test]
fn reporting_is_idempotent() {
    let mut tracker = tracker();
    for _ in 0..4 {
        tracker.observe(&settled_snapshot(1000));
    }
    assert!(tracker.is_reported());
    assert!(!tracker.observe(&settled_snapshot(1000)));
    assert!(!tracker.observe(&settled_snapshot(1000)));
}

#[test]
fn failed_evaluation_resets_the_streak() {
    let mut tracker = tracker();
    // Prime the height baseline.
    assert!(!tracker.observe(&settled_snapshot(1000)));

    let mut busy = settled_snapshot(1000);
    busy.visible_indicator_count = 1;

    // pass, pass, fail, pass, pass, pass: reports only on the sixth.
    assert!(!tracker.observe(&settled_snapshot(1000)));
    assert!(!tracker.observe(&settled_snapshot(1000)));
    assert!(!tracker.observe(&busy));
    assert_eq!(tracker.streak(), 0);
    assert!(!tracker.observe(&settled_snapshot(1000)));
    assert!(!tracker.observe(&settled_snapshot(1000)));
    assert!(tracker.observe(&settled_snapshot(1000)));
}

#[test]
fn growing_height_keeps_resetting_the_baseline() {
    let mut tracker = tracker();
    assert!(!tracker.observe(&settled_snapshot(1000)));
    // Infinite-scroll style growth: every change re-arms the comparison.
    assert!(!tracker.observe(&settled_snapshot(1400)));
    assert_eq!(tracker.streak(), 0);
    assert!(!tracker.observe(&settled_snapshot(1400)));
    assert!(!tracker.observe(&settled_snapshot(1400)));
    assert!(tracker.observe(&settled_snapshot(1400)));
}

#[test]
fn incomplete_document_fails_the_predicate() {
    let mut tracker = tracker();
    tracker.observe(&settled_snapshot(1000));

    let mut loading = settled_snapshot(1000);
    loading.ready_state = "interactive".to_string();
    assert!(!tracker.observe(&loading));
    assert_eq!(tracker.streak(), 0);
}

#[test]
fn empty_body_fails_the_predicate() {
    let mut tracker = tracker();
    tracker.observe(&settled_snapshot(1000));

    let mut empty = settled_snapshot(1000);
    empty.body_child_count = 0;
    assert!(!tracker.observe(&empty));
}

#[test]
fn sparse_page_without_landmark_fails_the_predicate() {
    let mut tracker = tracker();
    tracker.observe(&settled_snapshot(1000));

    let mut sparse = settled_snapshot(1000);
    sparse.landmark_populated = false;
    sparse.content_element_count = 2;
    assert!(!tracker.observe(&sparse));

    // Enough generic content substitutes for a missing landmark.
    let mut plain = settled_snapshot(1000);
    plain.landmark_populated = false;
    plain.content_element_count = 3;
    assert!(!tracker.observe(&plain));
    assert_eq!(tracker.streak(), 1);
}

#[test]
fn pending_viewport_images_fail_the_predicate() {
    let mut tracker = tracker();
    tracker.observe(&settled_snapshot(1000));

    let mut unloaded = settled_snapshot(1000);
    unloaded.pending_viewport_images = 2;
    assert!(!tracker.observe(&unloaded));
    assert_eq!(tracker.streak(), 0);
}

struct ScriptedProbe {
    snapshots: Mutex<VecDeque<Result<PageSnapshot, TabError>>>,
}

impl ScriptedProbe {
    fn new(snapshots: Vec<Result<PageSnapshot, TabError>>) -> Arc<Self> {
        Arc::new(Self { snapshots: Mutex::new(snapshots.into()) })
    }
}

#[async_trait]
impl PageProbe for ScriptedProbe {
    async fn snapshot(&self) -> Result<PageSnapshot, TabError> {
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TabError::DetectorUnreachable("script exhausted".to_string())))
    }
}

fn detector(
    snapshots: Vec<Result<PageSnapshot, TabError>>,
) -> (Detector, mpsc::Receiver<DetectorEvent>) {
    let (events_tx, events_rx) = mpsc::channel(8);
    let detector = Detector::new(
        TabId::from("tab-1"),
        ScriptedProbe::new(snapshots),
        DetectorPolicy::default(),
        events_tx,
    );
    (detector, events_rx)
}

#[tokio::test]
async fn polled_checks_answer_true_only_on_the_confirming_call() {
    let snapshots = (0..4).map(|_| Ok(settled_snapshot(900))).collect();
    let (detector, mut events) = detector(snapshots);

    assert!(!detector.check_loaded().await.unwrap());
    assert!(!detector.check_loaded().await.unwrap());
    assert!(!detector.check_loaded().await.unwrap());
    assert!(detector.check_loaded().await.unwrap());

    let event = events.recv().await.unwrap();
    assert_eq!(event, DetectorEvent::PageFullyLoaded { tab_id: TabId::from("tab-1") });
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn probe_failure_propagates_as_unreachable() {
    let (detector, _events) =
        detector(vec![Err(TabError::DetectorUnreachable("mid reload".to_string()))]);
    assert!(matches!(
        detector.check_loaded().await,
        Err(TabError::DetectorUnreachable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn load_watch_confirms_and_reports_once() {
    // Height grows once, then stays put; the watch loop rides it out.
    let snapshots = vec![
        Ok(settled_snapshot(1000)),
        Ok(settled_snapshot(1600)),
        Ok(settled_snapshot(1600)),
        Ok(settled_snapshot(1600)),
        Ok(settled_snapshot(1600)),
    ];
    let (detector, mut events) = detector(snapshots);

    detector.watch_load().await;

    assert!(detector.is_reported());
    assert!(events.recv().await.is_some());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn load_watch_stops_when_the_page_goes_away() {
    let snapshots = vec![
        Ok(settled_snapshot(1000)),
        Err(TabError::DetectorUnreachable("context destroyed".to_string())),
    ];
    let (detector, mut events) = detector(snapshots);

    detector.watch_load().await;

    assert!(!detector.is_reported());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn navigation_resets_settlement_state() {
    let snapshots = (0..8).map(|_| Ok(settled_snapshot(700))).collect();
    let (detector, mut events) = detector(snapshots);

    for _ in 0..3 {
        detector.check_loaded().await.unwrap();
    }
    assert!(detector.check_loaded().await.unwrap());
    events.recv().await.unwrap();

    detector.page_navigated();
    assert!(!detector.is_reported());

    // A fresh load needs a fresh baseline and a fresh streak.
    assert!(!detector.check_loaded().await.unwrap());
    assert!(events.try_recv().is_err());
}
