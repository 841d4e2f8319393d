//! Error type for the REST layer

use thiserror::Error;

use crate::auth::refresh::SessionExpired;

/// Shown when the server gives no usable message.
pub const FALLBACK_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected locally; no request was made.
    #[error("{0}")]
    Validation(String),

    /// The request still failed authentication after one refresh and replay.
    #[error("not authorized")]
    Unauthorized,

    /// Refresh failed; credentials were cleared.
    #[error(transparent)]
    SessionExpired(#[from] SessionExpired),

    /// Non-auth error status, or a `success: false` envelope.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Status { message, .. } => message.clone(),
            ApiError::SessionExpired(e) => {
                format!(
                    "Session expired. Please log in again with `{}`.",
                    e.login.command()
                )
            }
            ApiError::Unauthorized => "You are not authorized to do that.".to_string(),
            ApiError::Transport(_) | ApiError::Decode(_) => FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// Extract the `message` field from an error body, or the fallback text.
pub fn server_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

/// Whether a 403 body says the token itself is bad, rather than the permission.
pub fn signals_bad_token(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("expired") || lower.contains("invalid token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message() {
        assert_eq!(
            server_message(r#"{"success":false,"message":"Email already registered"}"#),
            "Email already registered"
        );
        assert_eq!(server_message(r#"{"message":"  "}"#), FALLBACK_MESSAGE);
        assert_eq!(server_message("<html>502 Bad Gateway</html>"), FALLBACK_MESSAGE);
    }

    #[test]
    fn test_session_expired_points_at_role_login() {
        use crate::auth::refresh::RefreshError;
        use crate::auth::LoginRoute;

        let err = ApiError::from(SessionExpired {
            login: LoginRoute::Worker,
            reason: RefreshError::MissingRefreshToken,
        });
        assert_eq!(
            err.user_message(),
            "Session expired. Please log in again with `workmarket login --as worker`."
        );
    }

    #[test]
    fn test_signals_bad_token() {
        assert!(signals_bad_token(r#"{"message":"jwt expired"}"#));
        assert!(signals_bad_token(r#"{"message":"Invalid token"}"#));
        assert!(!signals_bad_token(r#"{"message":"Admins only"}"#));
    }
}
