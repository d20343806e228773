use pagewatch_core::TabError;

/// Maps backend failures onto the supervision error taxonomy. chromiumoxide
/// surfaces most of these as strings, so this goes by message shape.
pub fn to_tab_error(e: impl std::fmt::Display, action: &str) -> TabError {
    let s = e.to_string();
    if s.contains("Cannot find context") || s.contains("Execution context was destroyed") {
        // Page is navigating or just reloaded; nothing is attached yet.
        TabError::DetectorUnreachable(format!("{}: {}", action, s))
    } else if s.contains("Session closed") || s.contains("Target closed") || s.contains("channel closed") {
        TabError::Gone
    } else {
        TabError::Backend(format!("{} failed: {}", action, s))
    }
}
