//! Notification center
//!
//! Keeps the newest page of notifications and the unread count in step
//! with the server: loaded once on mount, then updated by pushes on the
//! notification socket and by the user's mark-as-read actions.

mod alerts;
pub mod console;

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::api::{self, ApiClient, ApiError};
use crate::models::Notification;
use crate::realtime::{ConnectionManager, RealtimeError, ServerEvent};
pub use alerts::{banner, AlertSink, TerminalAlerts};

const PUSH_EVENT: &str = "new_notification";

pub struct NotificationCenter {
    conn: Arc<ConnectionManager>,
    page_size: u32,
    alerts: Option<Box<dyn AlertSink>>,
    notifications: Vec<Notification>,
    unread: u64,
    events: Option<broadcast::Receiver<ServerEvent>>,
}

impl NotificationCenter {
    /// `alerts` is `None` when the user has not allowed alerts.
    pub fn new(
        conn: Arc<ConnectionManager>,
        page_size: u32,
        alerts: Option<Box<dyn AlertSink>>,
    ) -> Self {
        Self {
            conn,
            page_size,
            alerts,
            notifications: Vec::new(),
            unread: 0,
            events: None,
        }
    }

    /// Load `page_size` notifications on mount instead of the configured size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Newest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    /// Load the first page and the unread count, then start listening for pushes.
    pub async fn mount(&mut self, client: &ApiClient) -> Result<(), ApiError> {
        let page = api::notification::list(client, Some(self.page_size), Some(0)).await?;
        let unread = api::notification::unread_count(client).await?;
        tracing::debug!("Loaded {} notifications, {} unread", page.len(), unread);

        self.notifications = page;
        self.unread = unread;
        self.events = Some(self.conn.subscribe());
        Ok(())
    }

    /// Apply a pushed notification.
    pub fn handle_push(&mut self, notification: Notification) {
        tracing::info!("Notification: {}", notification.title);
        if let Some(alerts) = &self.alerts {
            alerts.alert(&notification);
        }
        self.notifications.insert(0, notification);
        self.unread += 1;
    }

    /// Apply a socket event; returns the notification if it was a push.
    pub fn handle_event(&mut self, event: &ServerEvent) -> Option<Notification> {
        if event.name != PUSH_EVENT {
            return None;
        }
        match serde_json::from_value::<Notification>(event.data.clone()) {
            Ok(notification) => {
                self.handle_push(notification.clone());
                Some(notification)
            }
            Err(e) => {
                tracing::warn!("Malformed {} payload: {}", PUSH_EVENT, e);
                None
            }
        }
    }

    /// Wait for the next push and apply it. Requires `mount`.
    pub async fn next_push(&mut self) -> Result<Notification, RealtimeError> {
        loop {
            let events = self.events.as_mut().ok_or(RealtimeError::NotConnected)?;
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Notification feed fell behind, {} events skipped", n);
                    continue;
                }
                Err(RecvError::Closed) => return Err(RealtimeError::NotConnected),
            };
            if let Some(notification) = self.handle_event(&event) {
                return Ok(notification);
            }
        }
    }

    /// Mark one notification read.
    ///
    /// Only a loaded, unread notification triggers the server call; anything
    /// else returns `false` and changes nothing.
    pub async fn mark_read(&mut self, client: &ApiClient, id: &str) -> Result<bool, ApiError> {
        let known_unread = self
            .notifications
            .iter()
            .any(|n| n.id == id && !n.is_read);
        if !known_unread {
            return Ok(false);
        }

        api::notification::mark_read(client, id).await?;

        if let Some(n) = self.notifications.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
        }
        self.unread = self.unread.saturating_sub(1);
        Ok(true)
    }

    pub async fn mark_all_read(&mut self, client: &ApiClient) -> Result<(), ApiError> {
        api::notification::mark_all_read(client).await?;
        for n in &mut self.notifications {
            n.is_read = true;
        }
        self.unread = 0;
        Ok(())
    }
}
