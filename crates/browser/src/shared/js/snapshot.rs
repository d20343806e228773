pub const PAGE_SNAPSHOT: &str = r#"
(landmarks, contentSelectors, indicators) => {
    const body = document.body;

    let landmarkPopulated = false;
    for (const selector of landmarks) {
        const el = document.querySelector(selector);
        if (el && el.children.length > 0) {
            landmarkPopulated = true;
            break;
        }
    }

    let visibleIndicatorCount = 0;
    for (const selector of indicators) {
        for (const el of document.querySelectorAll(selector)) {
            if (el.offsetParent !== null) visibleIndicatorCount++;
        }
    }

    const viewportHeight = window.innerHeight;
    const pendingViewportImages = Array.from(document.querySelectorAll('img')).filter(img => {
        const rect = img.getBoundingClientRect();
        return rect.top < viewportHeight && rect.bottom > 0 && !img.complete;
    }).length;

    return {
        readyState: document.readyState,
        bodyChildCount: body ? body.children.length : 0,
        landmarkPopulated: landmarkPopulated,
        contentElementCount: document.querySelectorAll(contentSelectors.join(', ')).length,
        visibleIndicatorCount: visibleIndicatorCount,
        pendingViewportImages: pendingViewportImages,
        scrollHeight: document.documentElement.scrollHeight
    };
}
"#;
