//! REST client for the marketplace gateway

pub mod auth;
pub mod chat;
pub mod client;
pub mod error;
pub mod notification;
pub mod work;

use std::path::PathBuf;

use anyhow::Result;

pub use client::ApiClient;
pub use error::ApiError;
pub use work::WorkFilters;

/// List recent chats
pub async fn list_chats(limit: usize) -> Result<()> {
    chat::list_chats(limit).await
}

/// Print a chat's message history
pub async fn read_messages(chat_id: &str, limit: u32) -> Result<()> {
    chat::read_messages(chat_id, limit).await
}

/// Open a conversation with another account
pub async fn start_chat(counterpart: &str) -> Result<()> {
    chat::start_chat(counterpart).await
}

/// Show current user info
pub async fn whoami() -> Result<()> {
    auth::whoami().await
}

/// Browse posted works
pub async fn list_works(filters: &WorkFilters) -> Result<()> {
    work::show_works(filters).await
}

/// Post a new work
pub async fn post_work(fields: &[(String, String)], images: &[PathBuf]) -> Result<()> {
    work::create_work(fields, images).await
}

/// Admin: list accounts
pub async fn list_users(
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<&str>,
) -> Result<()> {
    auth::show_users(page, limit, search).await
}

/// Admin: block or unblock an account
pub async fn block_user(id: &str) -> Result<()> {
    auth::toggle_block(id).await
}
