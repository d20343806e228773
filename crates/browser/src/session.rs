use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::page::EventLoadEventFired;
use chromiumoxide::page::Page;
use futures::StreamExt;
use pagewatch_core::{CheckResponse, DetectorEvent, NotificationKind, TabError, TabId, TabSession};
use pagewatch_detector::{Detector, DetectorPolicy};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::probe::ChromiumProbe;
use crate::shared::{js, to_tab_error};

/// Owns a Chromium instance and hands out supervisable tabs.
pub struct ChromiumBrowser {
    browser: Browser,
}

impl ChromiumBrowser {
    pub async fn launch(headless: bool) -> Result<Self, TabError> {
        // Unique user data dir per instance to avoid SingletonLock conflicts.
        let temp_dir = std::env::temp_dir().join(format!("chromium-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir)
            .map_err(|e| TabError::Backend(format!("failed to create temp dir: {}", e)))?;

        let config = ChromeConfig::builder()
            .headless_mode(if headless { HeadlessMode::True } else { HeadlessMode::False })
            .user_data_dir(temp_dir)
            .build()
            .map_err(|e| TabError::Backend(format!("browser config failed: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TabError::Backend(format!("browser launch failed: {}", e)))?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self { browser })
    }

    /// Opens `url` in a new tab wired up with a load detector that pushes
    /// settlement events into `events`.
    pub async fn open_tab(
        &self,
        url: &str,
        policy: DetectorPolicy,
        events: mpsc::Sender<DetectorEvent>,
    ) -> Result<Arc<ChromiumTab>, TabError> {
        let page = self.browser.new_page(url).await.map_err(|e| to_tab_error(e, "open tab"))?;

        let tab_id = TabId(uuid::Uuid::new_v4().to_string());
        let probe = Arc::new(ChromiumProbe::new(page.clone(), &policy));
        let detector = Arc::new(Detector::new(tab_id.clone(), probe, policy, events));

        Ok(Arc::new(ChromiumTab {
            id: tab_id,
            page,
            detector,
            watching: AtomicBool::new(false),
        }))
    }
}

/// One supervised Chromium tab: the supervisor-facing session surface plus
/// the in-page load detector.
pub struct ChromiumTab {
    id: TabId,
    page: Page,
    detector: Arc<Detector>,
    watching: AtomicBool,
}

impl ChromiumTab {
    pub fn detector(&self) -> &Detector {
        &self.detector
    }
}

#[async_trait]
impl TabSession for ChromiumTab {
    fn id(&self) -> TabId {
        self.id.clone()
    }

    async fn current_url(&self) -> Result<String, TabError> {
        // Any lookup failure is terminal for supervision.
        match self.page.url().await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => Err(TabError::Gone),
            Err(e) => {
                debug!(tab = %self.id, error = %e, "tab lookup failed");
                Err(TabError::Gone)
            }
        }
    }

    async fn reload(&self) -> Result<(), TabError> {
        self.page.reload().await.map(|_| ()).map_err(|e| to_tab_error(e, "reload"))
    }

    async fn check_loaded(&self) -> Result<CheckResponse, TabError> {
        let fully_loaded = self.detector.check_loaded().await?;
        Ok(CheckResponse { fully_loaded })
    }

    /// Starts the load-event watch task on first call; later calls no-op.
    /// Each load event resets the detector and re-runs its confirmation loop.
    async fn ensure_detector(&self) -> Result<(), TabError> {
        if self.watching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut loads = match self.page.event_listener::<EventLoadEventFired>().await {
            Ok(stream) => stream,
            Err(e) => {
                self.watching.store(false, Ordering::SeqCst);
                return Err(to_tab_error(e, "load events"));
            }
        };

        let detector = Arc::clone(&self.detector);
        let tab_id = self.id.clone();
        tokio::spawn(async move {
            while loads.next().await.is_some() {
                debug!(tab = %tab_id, "load event, restarting settlement watch");
                detector.page_navigated();
                detector.watch_load().await;
            }
        });
        Ok(())
    }

    async fn show_notification(&self, kind: NotificationKind) -> Result<(), TabError> {
        let (message, background) = match kind {
            NotificationKind::Success => ("Page successfully loaded!", "#4CAF50"),
            NotificationKind::MaxRetriesReached => {
                ("Max retries reached. Page may not be fully loaded.", "#F44336")
            }
        };

        let js = js::build_js_call(
            js::notify::SHOW_NOTIFICATION,
            &[json!(message), json!(background)],
        );
        self.page.evaluate(js).await.map_err(|e| to_tab_error(e, "notification"))?;
        Ok(())
    }
}
