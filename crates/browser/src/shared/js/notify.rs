pub const SHOW_NOTIFICATION: &str = r#"
(message, background) => {
    const existing = document.getElementById('pagewatch-notification');
    if (existing) existing.remove();

    const notification = document.createElement('div');
    notification.id = 'pagewatch-notification';
    notification.style.position = 'fixed';
    notification.style.top = '20px';
    notification.style.right = '20px';
    notification.style.padding = '15px 20px';
    notification.style.borderRadius = '5px';
    notification.style.zIndex = '10000';
    notification.style.fontFamily = 'Arial, sans-serif';
    notification.style.fontSize = '14px';
    notification.style.boxShadow = '0 2px 10px rgba(0,0,0,0.2)';
    notification.style.backgroundColor = background;
    notification.style.color = 'white';
    notification.textContent = message;
    document.body.appendChild(notification);

    setTimeout(() => notification.remove(), 5000);
    return { success: true };
}
"#;
