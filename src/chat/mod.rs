//! Chat session over the communication socket
//!
//! A `ChatSession` is either idle or joined to exactly one chat. While
//! joined it mirrors the server's message stream for that chat and the
//! typing state of the other participants. Messages are only ever appended
//! when the server pushes them; sending does not append locally.

mod compose;
pub mod console;
mod typing;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::api::{self, ApiClient, ApiError};
use crate::models::Message;
use crate::realtime::{ConnectionManager, ConnectionState, RealtimeError, ServerEvent};
pub use typing::TypingTracker;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no chat joined")]
    NotJoined,
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Something that changed in the joined chat.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    Message(Message),
    Typing { user_id: String, is_typing: bool },
    /// The socket came back and the chat was joined again.
    Rejoined,
}

/// Identifies one history request. Stale once the session leaves or
/// switches chats after the request was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    chat_id: String,
    generation: u64,
}

impl HistoryTicket {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    user_id: String,
    is_typing: bool,
    #[serde(default)]
    chat_id: Option<String>,
}

struct Joined {
    chat_id: String,
    events: broadcast::Receiver<ServerEvent>,
    state: watch::Receiver<ConnectionState>,
}

enum Wake {
    Event(Result<ServerEvent, RecvError>),
    State(bool),
}

pub struct ChatSession {
    conn: Arc<ConnectionManager>,
    self_id: Option<String>,
    joined: Option<Joined>,
    generation: u64,
    messages: Vec<Message>,
    typing: TypingTracker,
    /// Last typing state we announced.
    local_typing: bool,
}

impl ChatSession {
    pub fn new(
        conn: Arc<ConnectionManager>,
        self_id: Option<String>,
        typing_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            self_id,
            joined: None,
            generation: 0,
            messages: Vec::new(),
            typing: TypingTracker::new(typing_timeout),
            local_typing: false,
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.joined.as_ref().map(|j| j.chat_id.as_str())
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Join `chat_id`, leaving the current chat first if it is a different one.
    pub fn join(&mut self, chat_id: &str) -> Result<(), ChatError> {
        if self.chat_id() == Some(chat_id) {
            return Ok(());
        }
        self.leave();

        // Subscribe first so nothing pushed right after the join is missed.
        let events = self.conn.subscribe();
        let state = self.conn.watch_state();
        self.conn.emit("join_chat", json!(chat_id))?;

        tracing::info!("Joined chat {}", chat_id);
        self.joined = Some(Joined {
            chat_id: chat_id.to_string(),
            events,
            state,
        });
        self.generation += 1;
        Ok(())
    }

    /// Leave the joined chat, if any, and drop its state.
    pub fn leave(&mut self) {
        let Some(joined) = self.joined.take() else {
            return;
        };

        if let Err(e) = self.conn.emit("leave_chat", json!(joined.chat_id)) {
            tracing::debug!("leave_chat for {} not sent: {}", joined.chat_id, e);
        }
        tracing::info!("Left chat {}", joined.chat_id);

        self.generation += 1;
        self.messages.clear();
        self.typing.clear();
        self.local_typing = false;
    }

    /// Send a text message. The message shows up once the server echoes it.
    pub fn send_message(&mut self, content: &str) -> Result<(), ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let chat_id = self.chat_id().ok_or(ChatError::NotJoined)?.to_string();

        self.conn.emit(
            "send_message",
            json!({ "chatId": chat_id, "content": content, "type": "text" }),
        )?;
        self.conn
            .emit("typing", json!({ "chatId": chat_id, "isTyping": false }))?;
        self.local_typing = false;
        Ok(())
    }

    /// Report the compose box contents; emits only when typing starts or stops.
    pub fn input_changed(&mut self, text: &str) -> Result<(), ChatError> {
        let chat_id = self.chat_id().ok_or(ChatError::NotJoined)?.to_string();
        let is_typing = !text.trim().is_empty();
        if is_typing == self.local_typing {
            return Ok(());
        }

        self.conn
            .emit("typing", json!({ "chatId": chat_id, "isTyping": is_typing }))?;
        self.local_typing = is_typing;
        Ok(())
    }

    /// Apply a server event to the joined chat.
    ///
    /// Returns the resulting update, or `None` when the event does not
    /// concern this chat.
    pub fn handle_event(&mut self, event: &ServerEvent) -> Option<ChatUpdate> {
        self.handle_event_at(event, Instant::now())
    }

    fn handle_event_at(&mut self, event: &ServerEvent, now: Instant) -> Option<ChatUpdate> {
        let chat_id = self.chat_id()?;

        match event.name.as_str() {
            "new_message" => {
                let message: Message = match serde_json::from_value(event.data.clone()) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("Malformed new_message payload: {}", e);
                        return None;
                    }
                };
                if message.chat_id.as_deref().is_some_and(|id| id != chat_id) {
                    tracing::debug!("Dropping message {} for another chat", message.id);
                    return None;
                }
                self.messages.push(message.clone());
                Some(ChatUpdate::Message(message))
            }
            "user_typing" => {
                let payload: TypingPayload = serde_json::from_value(event.data.clone()).ok()?;
                if payload.chat_id.as_deref().is_some_and(|id| id != chat_id) {
                    return None;
                }
                if self.self_id.as_deref() == Some(payload.user_id.as_str()) {
                    return None;
                }
                self.typing.set(&payload.user_id, payload.is_typing, now);
                Some(ChatUpdate::Typing {
                    user_id: payload.user_id,
                    is_typing: payload.is_typing,
                })
            }
            _ => None,
        }
    }

    /// Wait for the next update in the joined chat.
    ///
    /// Room membership does not survive a reconnect, so the chat is joined
    /// again whenever the socket comes back.
    pub async fn next_update(&mut self) -> Result<ChatUpdate, ChatError> {
        loop {
            let joined = self.joined.as_mut().ok_or(ChatError::NotJoined)?;
            let wake = tokio::select! {
                event = joined.events.recv() => Wake::Event(event),
                changed = joined.state.changed() => Wake::State(changed.is_ok()),
            };

            let event = match wake {
                Wake::Event(Ok(event)) => event,
                Wake::Event(Err(RecvError::Lagged(n))) => {
                    tracing::warn!("Chat fell behind, {} events skipped", n);
                    continue;
                }
                Wake::Event(Err(RecvError::Closed)) | Wake::State(false) => {
                    return Err(RealtimeError::NotConnected.into());
                }
                Wake::State(true) => {
                    if self.rejoin()? {
                        return Ok(ChatUpdate::Rejoined);
                    }
                    continue;
                }
            };
            if let Some(update) = self.handle_event(&event) {
                return Ok(update);
            }
        }
    }

    /// Re-send `join_chat` if the socket is freshly connected.
    fn rejoin(&mut self) -> Result<bool, ChatError> {
        let Some(joined) = self.joined.as_mut() else {
            return Ok(false);
        };
        if *joined.state.borrow_and_update() != ConnectionState::Connected {
            return Ok(false);
        }

        self.conn.emit("join_chat", json!(joined.chat_id))?;
        tracing::info!("Rejoined chat {} after reconnect", joined.chat_id);
        // The server forgot our typing flag along with the room.
        self.local_typing = false;
        Ok(true)
    }

    /// Other participants currently typing.
    pub fn typing_users(&self) -> Vec<String> {
        self.typing.active(Instant::now())
    }

    /// Capture the current chat for a history request.
    pub fn history_ticket(&self) -> Option<HistoryTicket> {
        self.chat_id().map(|chat_id| HistoryTicket {
            chat_id: chat_id.to_string(),
            generation: self.generation,
        })
    }

    /// Install fetched history if `ticket` is still current.
    ///
    /// History goes before anything pushed while the request was out;
    /// pushed messages already contained in the history are skipped.
    pub fn apply_history(&mut self, ticket: &HistoryTicket, history: Vec<Message>) -> bool {
        if self.history_ticket().as_ref() != Some(ticket) {
            tracing::debug!("Discarding stale history for chat {}", ticket.chat_id);
            return false;
        }

        let live = std::mem::replace(&mut self.messages, history);
        for message in live {
            if !self.messages.iter().any(|m| m.id == message.id) {
                self.messages.push(message);
            }
        }
        true
    }

    /// Fetch and install history for the joined chat.
    ///
    /// Events queued while the request was out are applied first, so they
    /// take part in the merge instead of arriving after it.
    pub async fn load_history(
        &mut self,
        client: &ApiClient,
        limit: Option<u32>,
    ) -> Result<bool, ChatError> {
        let ticket = self.history_ticket().ok_or(ChatError::NotJoined)?;
        let history = api::chat::messages(client, ticket.chat_id(), limit, None).await?;
        self.apply_pending();
        Ok(self.apply_history(&ticket, history))
    }

    fn apply_pending(&mut self) {
        loop {
            let Some(joined) = self.joined.as_mut() else {
                return;
            };
            match joined.events.try_recv() {
                Ok(event) => {
                    self.handle_event(&event);
                }
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!("Chat fell behind, {} events skipped", n);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return,
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.leave();
    }
}
