use std::sync::Arc;
use std::time::Duration;

use browser::ChromiumBrowser;
use pagewatch_core::TabSession;
use pagewatch_detector::DetectorPolicy;
use pagewatch_storage::MemoryFlagStore;
use pagewatch_supervisor::{Supervisor, Trigger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "https://example.com".to_string());

    let flags = Arc::new(MemoryFlagStore::new());
    let (supervisor, commands) = Supervisor::new(Arc::clone(&flags), 32);
    let runner = supervisor.clone();
    tokio::spawn(async move { runner.run(commands).await });

    let chromium = ChromiumBrowser::launch(true).await?;
    let events = supervisor.detector_events(16);
    let tab = chromium.open_tab(&url, DetectorPolicy::default(), events).await?;
    let tab_id = tab.id();

    let trigger = Trigger::new(supervisor, flags);
    trigger.start(tab as Arc<dyn TabSession>, &url, 5, 2).await?;
    println!("supervising {} (budget: 5 reloads, 2s interval)", url);

    // Give the page up to 30s to settle or exhaust its budget.
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if !trigger.status(&tab_id).await {
            break;
        }
    }

    if trigger.status(&tab_id).await {
        println!("still unsettled, giving up the watch");
        trigger.stop(tab_id).await?;
    } else {
        println!("supervision finished");
    }

    Ok(())
}
