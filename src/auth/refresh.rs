//! Single-flight access token refresh
//!
//! Any number of requests can fail authentication at the same time; only
//! the first one starts a refresh. The others clone the same shared future
//! and receive its result, success or failure.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use thiserror::Error;

use super::tokens::{TokenPair, TokenStore};
use super::LoginRoute;
use crate::models::Role;

const REFRESH_PATH: &str = "/auth/refresh-token";

/// Why a refresh could not produce new tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("unreadable refresh response: {0}")]
    Decode(String),
}

/// Terminal outcome of a failed refresh. Credentials are already cleared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session expired ({reason}); sign in again at {}", login.path())]
pub struct SessionExpired {
    pub login: LoginRoute,
    pub reason: RefreshError,
}

pub type RefreshResult = Result<TokenPair, SessionExpired>;

type Flight = Shared<BoxFuture<'static, RefreshResult>>;

/// Coordinates refreshes so at most one is in flight per client.
#[derive(Default)]
pub struct RefreshFlight {
    slot: Mutex<Option<(u64, Flight)>>,
    next_id: AtomicU64,
}

impl RefreshFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight refresh, or start one with `start` if none is running.
    pub async fn run<F, Fut>(&self, start: F) -> RefreshResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshResult> + Send + 'static,
    {
        let (id, flight) = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((id, flight)) => {
                    tracing::debug!("Joining in-flight token refresh");
                    (*id, flight.clone())
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let flight = start().boxed().shared();
                    *slot = Some((id, flight.clone()));
                    (id, flight)
                }
            }
        };

        let result = flight.await;

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            *slot = None;
        }
        result
    }

    pub fn in_flight(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefreshResponse {
    Wrapped { data: RefreshBody },
    Flat(RefreshBody),
}

/// Exchange the stored refresh token for a new pair.
///
/// On success the new pair is written to `store`. On any failure the
/// store is cleared and the login route for the previously held role is
/// returned, so every waiter sees the same forced logout. `held_role` is
/// the role seen when the failing request went out; it decides the route
/// once an earlier failed refresh has already cleared the store.
pub async fn refresh_session(
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    held_role: Option<Role>,
) -> RefreshResult {
    let login = LoginRoute::for_role(store.role().or(held_role));

    match exchange(&http, &base_url, store.as_ref()).await {
        Ok(pair) => {
            store.set_tokens(&pair);
            tracing::info!("Access token refreshed");
            Ok(pair)
        }
        Err(reason) => {
            tracing::warn!("Token refresh failed: {}. Clearing session", reason);
            store.clear_auth();
            Err(SessionExpired { login, reason })
        }
    }
}

async fn exchange(
    http: &reqwest::Client,
    base_url: &str,
    store: &dyn TokenStore,
) -> Result<TokenPair, RefreshError> {
    let refresh_token = store
        .refresh_token()
        .ok_or(RefreshError::MissingRefreshToken)?;

    let url = format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH);
    tracing::info!("Refreshing access token...");

    let resp = http
        .post(&url)
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(RefreshError::Rejected {
            status: status.as_u16(),
            message: crate::api::error::server_message(&text),
        });
    }

    let body = match serde_json::from_str::<RefreshResponse>(&text)
        .map_err(|e| RefreshError::Decode(e.to_string()))?
    {
        RefreshResponse::Wrapped { data } => data,
        RefreshResponse::Flat(body) => body,
    };

    Ok(TokenPair {
        access_token: body.access_token,
        // Some deployments rotate only the access token.
        refresh_token: body.refresh_token.unwrap_or(refresh_token),
    })
}
