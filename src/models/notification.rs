//! Notification models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    NewMessage,
    WorkUpdate,
    BookingUpdate,
    Payment,
    /// Any type this client does not know yet.
    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationType::NewMessage => "💬",
            NotificationType::WorkUpdate => "📋",
            NotificationType::BookingUpdate => "📅",
            NotificationType::Payment => "💰",
            NotificationType::Other => "🔔",
        }
    }
}

/// Optional correlation fields attached to a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub chat_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub sender_role: Option<String>,
}

/// A notification. `is_read` only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<NotificationData>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `GET /notification/notifications/unread-count`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UnreadCount {
    #[serde(default)]
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_format() {
        let json = r#"{
            "id": "n1",
            "userId": "u1",
            "type": "NEW_MESSAGE",
            "title": "New message",
            "message": "Asha: are you free tomorrow?",
            "data": {"chatId": "c9", "senderName": "Asha", "senderRole": "worker"},
            "isRead": false,
            "createdAt": "2025-03-01T10:00:00Z"
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationType::NewMessage);
        assert_eq!(n.data.unwrap().chat_id.as_deref(), Some("c9"));
        assert!(!n.is_read);
    }

    #[test]
    fn test_unknown_type_falls_back_to_bell() {
        let page = r#"[
            {"id": "n1", "type": "NEW_MESSAGE", "title": "Hi", "message": "m", "createdAt": "2025-03-01T10:00:00Z"},
            {"id": "n2", "type": "SYSTEM", "title": "Maintenance", "message": "m", "createdAt": "2025-03-01T11:00:00Z"}
        ]"#;
        let page: Vec<Notification> = serde_json::from_str(page).unwrap();
        assert_eq!(page[1].kind, NotificationType::Other);
        assert_eq!(page[1].kind.icon(), "🔔");
    }
}
