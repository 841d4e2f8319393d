//! Authenticated HTTP client for the marketplace gateway
//!
//! Wraps reqwest::Client with bearer token injection and a one-shot
//! refresh-and-replay when the server rejects the token.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::{server_message, signals_bad_token, ApiError};
use crate::auth::refresh::{refresh_session, RefreshFlight, SessionExpired};
use crate::auth::{TokenPair, TokenStore};
use crate::models::Role;

/// Standard response envelope: `{ success, message, data }`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

fn default_success() -> bool {
    true
}

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        bytes: Vec<u8>,
        mime: Option<String>,
    },
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

/// Rebuildable request description, so a request can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Whether a 401 on this request should trigger refresh-and-replay.
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            authenticated: true,
        }
    }

    /// Mark as a sign-in style request: no bearer token, and a 401 is a
    /// plain error (bad credentials) rather than an expired session.
    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a query pair only when `value` is set.
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }
}

enum Checked {
    Ok(reqwest::Response),
    AuthFailure,
}

/// Gateway client shared by every REST call in a session.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh: RefreshFlight,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            refresh: RefreshFlight::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `request`, refreshing the token and replaying once on an auth failure.
    pub async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        if !request.authenticated {
            let resp = self.dispatch(request, None).await?;
            return match check_response(resp, false).await? {
                Checked::Ok(resp) => Ok(resp),
                Checked::AuthFailure => Err(ApiError::Unauthorized),
            };
        }

        let token = self.store.access_token();
        let role = self.store.role();
        let resp = self.dispatch(request, token.as_deref()).await?;
        match check_response(resp, true).await? {
            Checked::Ok(resp) => return Ok(resp),
            Checked::AuthFailure => {
                tracing::debug!("{} {} rejected the token", request.method, request.path);
            }
        }

        let fresh = match self.store.access_token() {
            // Someone else refreshed while this request was out.
            Some(current) if token.as_deref() != Some(current.as_str()) => current,
            _ => self.refresh(role).await?.access_token,
        };

        let resp = self.dispatch(request, Some(&fresh)).await?;
        match check_response(resp, true).await? {
            Checked::Ok(resp) => Ok(resp),
            Checked::AuthFailure => {
                tracing::warn!(
                    "{} {} still unauthorized after refresh",
                    request.method,
                    request.path
                );
                Err(ApiError::Unauthorized)
            }
        }
    }

    async fn refresh(&self, held_role: Option<Role>) -> Result<TokenPair, SessionExpired> {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let store = Arc::clone(&self.store);
        self.refresh
            .run(move || refresh_session(http, base_url, store, held_role))
            .await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(&request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        Ok(builder.send().await?)
    }

    /// Execute and decode the envelope's `data`.
    pub async fn fetch<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let envelope: ApiEnvelope<T> = self.decode(request).await?;
        envelope.data.ok_or_else(|| {
            ApiError::Decode(format!("{} {}: response has no data", request.method, request.path))
        })
    }

    /// Execute and return the envelope's `message`, ignoring any data.
    pub async fn submit(&self, request: &ApiRequest) -> Result<Option<String>, ApiError> {
        let envelope: ApiEnvelope<serde_json::Value> = self.decode(request).await?;
        Ok(envelope.message)
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let resp = self.execute(request).await?;
        let status = resp.status();
        let text = resp.text().await?;

        // Some endpoints answer 204 or an empty body.
        let envelope: ApiEnvelope<T> = if text.trim().is_empty() {
            ApiEnvelope {
                success: true,
                message: None,
                data: None,
            }
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ApiError::Decode(format!("{} {}: {}", request.method, request.path, e))
            })?
        };

        if !envelope.success {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| server_message(&text)),
            });
        }
        Ok(envelope)
    }
}

fn build_form(parts: &[FormPart]) -> Result<reqwest::multipart::Form, ApiError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                bytes,
                mime,
            } => {
                let mut file = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime)?;
                }
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// Classify a response: success, auth failure, or a user-facing error.
///
/// With `token_auth` off, 401/403 are ordinary errors carrying the server message.
async fn check_response(resp: reqwest::Response, token_auth: bool) -> Result<Checked, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(Checked::Ok(resp));
    }
    if token_auth && status == StatusCode::UNAUTHORIZED {
        return Ok(Checked::AuthFailure);
    }

    let body = resp.text().await.unwrap_or_default();
    if token_auth && status == StatusCode::FORBIDDEN && signals_bad_token(&body) {
        return Ok(Checked::AuthFailure);
    }

    tracing::debug!("HTTP {}: {}", status.as_u16(), body);
    Err(ApiError::Status {
        status: status.as_u16(),
        message: server_message(&body),
    })
}
