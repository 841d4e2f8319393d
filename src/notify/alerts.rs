//! Alerts raised for pushed notifications

use crate::models::Notification;

/// Where pushed notifications are announced.
pub trait AlertSink: Send + Sync {
    fn alert(&self, notification: &Notification);
}

/// One-line banner on the terminal.
pub struct TerminalAlerts;

impl AlertSink for TerminalAlerts {
    fn alert(&self, notification: &Notification) {
        // BEL so the terminal can flag the window.
        println!("\x07{}", banner(notification));
    }
}

pub fn banner(notification: &Notification) -> String {
    format!(
        "{} {}: {}",
        notification.kind.icon(),
        notification.title,
        notification.message
    )
}
