//! Session-scoped owner of every client object
//!
//! Built once per authenticated session and passed to whoever needs it;
//! nothing in the crate keeps a global client or socket.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiClient;
use crate::auth::{FileTokenStore, TokenStore};
use crate::chat::ChatSession;
use crate::config::Config;
use crate::notify::{AlertSink, NotificationCenter, TerminalAlerts};
use crate::realtime::{ConnectionManager, RealtimeError, ReconnectPolicy};

pub struct Session {
    config: Config,
    store: Arc<dyn TokenStore>,
    api: Arc<ApiClient>,
    chat: Arc<ConnectionManager>,
    notifications: Arc<ConnectionManager>,
}

impl Session {
    pub fn open(config: Config, store: Arc<dyn TokenStore>) -> Self {
        let policy = ReconnectPolicy {
            attempts: config.reconnect_attempts,
            delay: config.reconnect_delay(),
        };

        Self {
            api: Arc::new(ApiClient::new(config.gateway_url.clone(), store.clone())),
            chat: Arc::new(ConnectionManager::new(
                "chat",
                config.communication_url.clone(),
                policy,
            )),
            notifications: Arc::new(ConnectionManager::new(
                "notification",
                config.notification_url.clone(),
                policy,
            )),
            config,
            store,
        }
    }

    /// Session from the config file and the persisted credentials.
    pub fn load() -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let path = Config::credentials_path()?;
        let store = FileTokenStore::open(path).context("Failed to open credentials")?;
        Ok(Self::open(config, Arc::new(store)))
    }

    pub fn ensure_signed_in(&self) -> Result<()> {
        anyhow::ensure!(
            self.store.is_logged_in(),
            "Not signed in. Run `workmarket login` first."
        );
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn chat_connection(&self) -> &Arc<ConnectionManager> {
        &self.chat
    }

    pub fn notification_connection(&self) -> &Arc<ConnectionManager> {
        &self.notifications
    }

    /// Connect the chat socket with the current access token.
    pub fn connect_chat(&self) -> Result<(), RealtimeError> {
        let token = self.store.access_token().ok_or(RealtimeError::NotAuthenticated)?;
        self.chat.connect(&token);
        Ok(())
    }

    /// Connect the notification socket with the current access token.
    pub fn connect_notifications(&self) -> Result<(), RealtimeError> {
        let token = self.store.access_token().ok_or(RealtimeError::NotAuthenticated)?;
        self.notifications.connect(&token);
        Ok(())
    }

    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(
            self.chat.clone(),
            self.store.user_id(),
            self.config.typing_timeout(),
        )
    }

    pub fn notification_center(&self) -> NotificationCenter {
        let alerts: Option<Box<dyn AlertSink>> = if self.config.desktop_alerts {
            Some(Box::new(TerminalAlerts))
        } else {
            None
        };
        NotificationCenter::new(
            self.notifications.clone(),
            self.config.notification_page_size,
            alerts,
        )
    }

    /// Close both sockets and forget the credentials.
    pub async fn logout(&self) {
        self.chat.disconnect().await;
        self.notifications.disconnect().await;
        self.store.clear_auth();
        tracing::info!("Signed out");
    }
}
