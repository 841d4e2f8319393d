//! Chat-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two parties of a marketplace conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participants {
    pub user_id: String,
    pub worker_id: String,
}

/// Display info for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantDetails {
    pub user: Option<ParticipantInfo>,
    pub worker: Option<ParticipantInfo>,
}

/// Chat entity. Fetched from the communication service, never created locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(alias = "_id")]
    pub id: String,
    pub participants: Participants,
    #[serde(default)]
    pub participant_details: Option<ParticipantDetails>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// Name of the other side of the conversation, as seen by `viewer_is_worker`.
    pub fn counterpart_name(&self, viewer_is_worker: bool) -> String {
        let details = self.participant_details.as_ref();
        let info = if viewer_is_worker {
            details.and_then(|d| d.user.as_ref())
        } else {
            details.and_then(|d| d.worker.as_ref())
        };
        match info {
            Some(p) if !p.name.is_empty() => p.name.clone(),
            _ if viewer_is_worker => self.participants.user_id.clone(),
            _ => self.participants.worker_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderDetails {
    pub name: String,
    pub avatar: Option<String>,
}

/// Chat message. Appended in arrival order; the server is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    /// Present on pushed messages; history responses may omit it.
    #[serde(default)]
    pub chat_id: Option<String>,
    pub content: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_role: String,
    #[serde(default)]
    pub sender_details: Option<SenderDetails>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn sender_name(&self) -> &str {
        self.sender_details
            .as_ref()
            .map(|d| d.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.sender_id)
    }
}
