use async_trait::async_trait;
use chromiumoxide::page::Page;
use pagewatch_core::{PageProbe, PageSnapshot, TabError};
use pagewatch_detector::DetectorPolicy;
use serde_json::{Value, json};

use crate::shared::{js, to_tab_error};

/// Evaluates the snapshot function inside the live page. Selector lists are
/// frozen at construction from the detector policy.
pub struct ChromiumProbe {
    page: Page,
    landmarks: Value,
    content: Value,
    indicators: Value,
}

impl ChromiumProbe {
    pub fn new(page: Page, policy: &DetectorPolicy) -> Self {
        Self {
            page,
            landmarks: json!(policy.landmark_selectors),
            content: json!(policy.content_selectors),
            indicators: json!(policy.indicator_selectors),
        }
    }
}

#[async_trait]
impl PageProbe for ChromiumProbe {
    async fn snapshot(&self) -> Result<PageSnapshot, TabError> {
        let js = js::build_js_call(
            js::snapshot::PAGE_SNAPSHOT,
            &[self.landmarks.clone(), self.content.clone(), self.indicators.clone()],
        );
        let result = self.page.evaluate(js).await.map_err(|e| to_tab_error(e, "snapshot"))?;
        let value = result
            .value()
            .cloned()
            .ok_or_else(|| TabError::DetectorUnreachable("snapshot returned no value".to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| TabError::DetectorUnreachable(format!("malformed snapshot: {}", e)))
    }
}
