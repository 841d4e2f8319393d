//! Realtime socket.io connections
//!
//! One `ConnectionManager` per namespace (chat, notifications) per session.
//! The manager owns a background task that dials the server, presents the
//! access token in the socket.io connect packet, answers pings, fans
//! incoming events out on a broadcast channel and writes queued emits.

pub mod frame;
pub mod websocket;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;

pub use frame::ServerEvent;
use frame::Packet;
use websocket::SocketTransport;

/// Buffered events per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 256;

/// How long `disconnect` waits for the task to say goodbye.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    #[error("not connected")]
    NotConnected,
    #[error("not signed in")]
    NotAuthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No task running.
    Disconnected,
    Connecting,
    Connected,
    /// Lost the link; waiting before attempt `attempt`.
    Reconnecting { attempt: u32 },
}

/// Bounded retry with a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

enum Outbound {
    Frame(String),
    Close,
}

struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    name: &'static str,
    url: String,
    policy: ReconnectPolicy,
    events: broadcast::Sender<ServerEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    link: Mutex<Option<Link>>,
}

impl ConnectionManager {
    pub fn new(name: &'static str, url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            name,
            url: url.into(),
            policy,
            events,
            state: Arc::new(state),
            link: Mutex::new(None),
        }
    }

    /// Start the connection unless one is already live (connected or retrying).
    pub fn connect(&self, token: &str) {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = link.as_ref() {
            if !existing.task.is_finished() {
                tracing::debug!("{} socket already connected", self.name);
                return;
            }
        }

        tracing::info!("Connecting {} socket to {}", self.name, self.url);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        self.state.send_replace(ConnectionState::Connecting);

        let task = tokio::spawn(run_connection(
            self.name,
            self.url.clone(),
            token.to_string(),
            self.policy,
            self.events.clone(),
            self.state.clone(),
            outbound_rx,
        ));

        *link = Some(Link { outbound, task });
    }

    /// Tear down the connection. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let link = self.link.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut link) = link else {
            return;
        };

        if link.outbound.send(Outbound::Close).is_ok()
            && time::timeout(CLOSE_GRACE, &mut link.task).await.is_err()
        {
            link.task.abort();
            // Let the aborted task publish its final state before we do.
            let _ = link.task.await;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!("{} socket disconnected", self.name);
    }

    /// Emit an event. Fails unless the socket is currently connected.
    pub fn emit(&self, name: &str, data: Value) -> Result<(), RealtimeError> {
        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }

        let link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        let link = link.as_ref().ok_or(RealtimeError::NotConnected)?;
        tracing::debug!("{} emit {}", self.name, name);
        link.outbound
            .send(Outbound::Frame(frame::event_packet(name, &data)))
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Receive every event pushed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow state changes; the current state counts as seen.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Resolve once connected; fails if the manager gives up instead.
    pub async fn wait_connected(&self) -> Result<(), RealtimeError> {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => return Err(RealtimeError::NotConnected),
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(RealtimeError::NotConnected);
            }
        }
    }

    /// Resolve once the connection task has stopped for good.
    pub async fn wait_disconnected(&self) {
        let mut rx = self.state.subscribe();
        while *rx.borrow_and_update() != ConnectionState::Disconnected {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            link.task.abort();
        }
    }
}

/// How one connected session ended.
enum SessionEnd {
    /// Local disconnect; do not reconnect.
    Closed,
    /// Server refused or ended the session; do not reconnect.
    Refused(String),
    /// Transport failure; eligible for reconnection.
    Lost {
        was_connected: bool,
        error: anyhow::Error,
    },
}

/// Publishes `Disconnected` when the connection task ends, however it ends.
struct StateGuard(Arc<watch::Sender<ConnectionState>>);

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.0.send_replace(ConnectionState::Disconnected);
    }
}

async fn run_connection(
    name: &'static str,
    url: String,
    token: String,
    policy: ReconnectPolicy,
    events: broadcast::Sender<ServerEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let _guard = StateGuard(state.clone());
    let mut failures = 0u32;

    loop {
        match run_session(name, &url, &token, &events, &state, &mut outbound).await {
            SessionEnd::Closed => break,
            SessionEnd::Refused(reason) => {
                tracing::error!("{} socket refused: {}", name, reason);
                break;
            }
            SessionEnd::Lost {
                was_connected,
                error,
            } => {
                if was_connected {
                    failures = 0;
                }
                failures += 1;
                if failures > policy.attempts {
                    tracing::warn!(
                        "{} socket lost: {:#}. Giving up after {} attempts",
                        name,
                        error,
                        policy.attempts
                    );
                    break;
                }

                tracing::warn!(
                    "{} socket lost: {:#}. Reconnecting in {}ms ({}/{})",
                    name,
                    error,
                    policy.delay.as_millis(),
                    failures,
                    policy.attempts
                );
                state.send_replace(ConnectionState::Reconnecting { attempt: failures });

                tokio::select! {
                    _ = time::sleep(policy.delay) => {}
                    msg = outbound.recv() => match msg {
                        Some(Outbound::Frame(_)) => {
                            tracing::debug!("{} dropping emit while reconnecting", name);
                        }
                        Some(Outbound::Close) | None => break,
                    }
                }
                state.send_replace(ConnectionState::Connecting);
            }
        }
    }
}

fn lost(was_connected: bool, error: anyhow::Error) -> SessionEnd {
    SessionEnd::Lost {
        was_connected,
        error,
    }
}

/// Dial, handshake and pump one websocket session.
async fn run_session(
    name: &'static str,
    url: &str,
    token: &str,
    events: &broadcast::Sender<ServerEvent>,
    state: &watch::Sender<ConnectionState>,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) -> SessionEnd {
    let mut socket = match SocketTransport::connect(url).await {
        Ok(socket) => socket,
        Err(e) => return lost(false, e),
    };

    // 1. Engine.IO open
    let open = match socket.recv_frame().await {
        Ok(Some(text)) => match frame::parse(&text) {
            Packet::Open(info) => info,
            other => return lost(false, anyhow!("Expected open packet, got {:?}", other)),
        },
        Ok(None) => return lost(false, anyhow!("Closed before open packet")),
        Err(e) => return lost(false, e),
    };

    // 2. Socket.IO connect with the token as handshake auth
    if let Err(e) = socket.send_text(&frame::connect_packet(token)).await {
        return lost(false, e);
    }
    loop {
        match socket.recv_frame().await {
            Ok(Some(text)) => match frame::parse(&text) {
                Packet::Connected => break,
                Packet::ConnectError(reason) => return SessionEnd::Refused(reason),
                Packet::Ping => {
                    if let Err(e) = socket.send_text(frame::PONG).await {
                        return lost(false, e);
                    }
                }
                other => tracing::debug!("{} ignoring {:?} during handshake", name, other),
            },
            Ok(None) => return lost(false, anyhow!("Closed during handshake")),
            Err(e) => return lost(false, e),
        }
    }

    tracing::info!("{} socket connected (sid={})", name, open.sid);
    state.send_replace(ConnectionState::Connected);

    // 3. Event loop. The server pings every interval; silence past
    //    interval + timeout means the link is dead.
    let silence = Duration::from_millis(open.ping_interval + open.ping_timeout);
    loop {
        tokio::select! {
            incoming = time::timeout(silence, socket.recv_frame()) => {
                let text = match incoming {
                    Ok(Ok(Some(text))) => text,
                    Ok(Ok(None)) => return lost(true, anyhow!("Closed by server")),
                    Ok(Err(e)) => return lost(true, e),
                    Err(_) => return lost(true, anyhow!("Ping timeout")),
                };
                match frame::parse(&text) {
                    Packet::Ping => {
                        if let Err(e) = socket.send_text(frame::PONG).await {
                            return lost(true, e);
                        }
                    }
                    Packet::Event(event) => {
                        tracing::debug!("{} event {}", name, event.name);
                        // No subscribers is fine.
                        let _ = events.send(event);
                    }
                    Packet::Disconnect => {
                        return SessionEnd::Refused("server disconnect".to_string());
                    }
                    Packet::Close => return lost(true, anyhow!("Engine.IO close")),
                    other => tracing::debug!("{} ignoring {:?}", name, other),
                }
            }
            msg = outbound.recv() => match msg {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = socket.send_text(&text).await {
                        return lost(true, e);
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = socket.send_text(frame::DISCONNECT).await;
                    socket.close().await;
                    return SessionEnd::Closed;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::TestServer;
    use super::*;
    use serde_json::json;

    fn fast_policy(attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts,
            delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_connect_presents_token_and_is_idempotent() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(1));

        manager.connect("t1");
        manager.connect("t1");
        let conn = server.accept().await;
        assert_eq!(conn.token.as_deref(), Some("t1"));
        manager.wait_connected().await.unwrap();

        manager.connect("t2");
        time::sleep(Duration::from_millis(50)).await;
        assert!(server.conns.try_recv().is_err());
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_events_fan_out_and_emits_reach_server() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(1));
        let mut rx = manager.subscribe();

        manager.connect("t1");
        let mut conn = server.accept().await;
        manager.wait_connected().await.unwrap();

        conn.push("new_message", json!({"id": "m1"})).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "new_message");
        assert_eq!(event.data["id"], "m1");

        manager.emit("join_chat", json!("c1")).unwrap();
        assert_eq!(conn.next_event().await, Some(("join_chat".to_string(), json!("c1"))));
    }

    #[tokio::test]
    async fn test_answers_engineio_ping() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("notifications", server.url.clone(), fast_policy(1));
        manager.connect("t1");
        let mut conn = server.accept().await;
        manager.wait_connected().await.unwrap();

        conn.send_raw("2").await;
        assert_eq!(conn.next_packet().await, Some(Packet::Pong));
    }

    #[tokio::test]
    async fn test_malformed_frames_keep_the_link_up() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(1));
        let mut rx = manager.subscribe();
        manager.connect("t1");
        let mut conn = server.accept().await;
        manager.wait_connected().await.unwrap();

        for garbage in ["4é", "é", "42é[", "0ß"] {
            conn.send_raw(garbage).await;
        }
        conn.push("new_message", json!({"id": "m1"})).await;

        let event = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.data["id"], "m1");
        assert!(manager.is_connected());
        manager.emit("join_chat", json!("c1")).unwrap();
        assert_eq!(conn.next_event().await, Some(("join_chat".to_string(), json!("c1"))));
    }

    #[tokio::test]
    async fn test_state_reset_when_task_is_aborted() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(1));
        manager.connect("t1");
        let _conn = server.accept().await;
        manager.wait_connected().await.unwrap();

        if let Some(link) = manager.link.lock().unwrap().as_ref() {
            link.task.abort();
        }
        time::timeout(Duration::from_secs(2), manager.wait_disconnected())
            .await
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_emit_requires_connection() {
        let manager = ConnectionManager::new("chat", "http://127.0.0.1:9", fast_policy(0));
        assert_eq!(
            manager.emit("typing", json!({})),
            Err(RealtimeError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_reconnects_with_same_token_after_drop() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(3));
        manager.connect("t1");

        let first = server.accept().await;
        manager.wait_connected().await.unwrap();
        first.drop_connection().await;

        let second = server.accept().await;
        assert_eq!(second.token.as_deref(), Some("t1"));
        manager.wait_connected().await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        // Reserve a port, then free it so every dial is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let manager = ConnectionManager::new("chat", url, fast_policy(2));
        manager.connect("t1");
        assert_eq!(manager.wait_connected().await, Err(RealtimeError::NotConnected));
        manager.wait_disconnected().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_handshake_is_not_retried() {
        let server = TestServer::start(true).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(5));
        manager.connect("bad");
        assert_eq!(manager.wait_connected().await, Err(RealtimeError::NotConnected));

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.handshakes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_says_goodbye() {
        let mut server = TestServer::start(false).await;
        let manager = ConnectionManager::new("chat", server.url.clone(), fast_policy(1));
        manager.connect("t1");
        let mut conn = server.accept().await;
        manager.wait_connected().await.unwrap();

        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(conn.next_packet().await, Some(Packet::Disconnect));

        // A later connect dials again.
        manager.connect("t2");
        let again = server.accept().await;
        assert_eq!(again.token.as_deref(), Some("t2"));
    }
}
