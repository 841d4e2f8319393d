//! Auth service endpoints

use anyhow::Result;
use serde::Deserialize;

use super::client::{ApiClient, ApiRequest};
use super::error::ApiError;
use crate::models::{Role, UserPage, UserProfile};
use crate::session::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    user: UserProfile,
}

/// Sign-in endpoint for each account kind.
fn login_path(role: Role) -> &'static str {
    match role {
        Role::User => "/auth/login",
        Role::Worker => "/auth/worker-login",
        Role::Admin => "/auth/admin/login",
    }
}

/// Sign in and store the issued credentials.
pub async fn login(
    client: &ApiClient,
    role: Role,
    email: &str,
    password: &str,
) -> Result<UserProfile, ApiError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let request = ApiRequest::post(login_path(role))
        .json(serde_json::json!({ "email": email, "password": password }))
        .public();
    let data: LoginData = client.fetch(&request).await?;

    tracing::info!("Signed in as {} ({})", data.user.email, data.user.role.as_str());
    client
        .store()
        .set_auth(data.access_token, data.refresh_token, data.user.clone());
    Ok(data.user)
}

/// Current user according to the server (`GET /auth/verify`).
pub async fn verify(client: &ApiClient) -> Result<UserProfile, ApiError> {
    client.fetch(&ApiRequest::get("/auth/verify")).await
}

/// Admin: list accounts.
pub async fn list_users(
    client: &ApiClient,
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<&str>,
) -> Result<UserPage, ApiError> {
    let request = ApiRequest::get("/auth/admin/get-users")
        .query_opt("page", page)
        .query_opt("limit", limit)
        .query_opt("search", search.filter(|s| !s.is_empty()));
    client.fetch(&request).await
}

/// Admin: toggle the blocked flag of an account.
pub async fn block_user(client: &ApiClient, id: &str) -> Result<Option<String>, ApiError> {
    client
        .submit(&ApiRequest::patch(format!("/auth/admin/block-user/{}", id)))
        .await
}

/// Fetch and display the current user as the server sees it.
pub async fn whoami() -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;
    let me = verify(session.api()).await?;

    println!();
    let or_none = |s: &str| if s.is_empty() { "(none)".to_string() } else { s.to_string() };
    println!("Name:  {}", or_none(&me.name));
    println!("Email: {}", or_none(&me.email));
    println!("Role:  {}", me.role.as_str());
    println!("ID:    {}", me.id);

    Ok(())
}

/// Admin user listing (prints to stdout).
pub async fn show_users(
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<&str>,
) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;
    let result = list_users(session.api(), page, limit, search).await?;

    println!(
        "\nUsers ({} total, page {} of {}):",
        result.total,
        page.unwrap_or(1),
        result.total_pages.max(1)
    );
    println!("{:-<60}", "");
    if result.users.is_empty() {
        println!("  (no users found)");
    }
    for user in &result.users {
        let blocked = if user.is_blocked { "  [blocked]" } else { "" };
        println!(
            "{} <{}> ({}){}",
            user.name,
            user.email,
            user.role.as_str(),
            blocked
        );
        println!("  ID: {}", user.id);
    }
    Ok(())
}

/// Admin: block or unblock an account.
pub async fn toggle_block(id: &str) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;
    let message = block_user(session.api(), id).await?;
    println!("{}", message.as_deref().unwrap_or("Done."));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, TokenStore};
    use std::sync::Arc;
    use tokio_test::assert_err;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_worker_login_stores_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/worker-login"))
            .and(body_json(serde_json::json!({ "email": "w@example.com", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "message": "Login Successful",
                "data": {
                    "accessToken": "a1",
                    "refreshToken": "r1",
                    "user": { "_id": "w1", "name": "Wes", "email": "w@example.com", "role": "worker" }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let client = ApiClient::new(server.uri(), store.clone());
        let user = login(&client, Role::Worker, " w@example.com ", "pw").await.unwrap();

        assert_eq!(user.id, "w1");
        assert_eq!(store.access_token().as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
        assert_eq!(store.user_id().as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_login_validates_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), Arc::new(MemoryTokenStore::new()));
        let err = assert_err!(login(&client, Role::User, "", "pw").await);
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_users_sends_only_set_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/admin/get-users"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "users": [{ "_id": "u1", "name": "Asha", "email": "a@example.com", "role": "user", "isBlocked": true }],
                    "total": 1,
                    "totalPages": 1
                }
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), Arc::new(MemoryTokenStore::new()));
        let page = list_users(&client, Some(2), None, Some("")).await.unwrap();
        assert_eq!(page.users.len(), 1);
        assert!(page.users[0].is_blocked);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), Some("page=2"));
    }
}
