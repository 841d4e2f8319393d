//! Communication service chat endpoints

use anyhow::Result;

use super::client::{ApiClient, ApiRequest};
use super::error::ApiError;
use crate::models::{Chat, Message, Role};
use crate::session::Session;

/// Chats the signed-in account takes part in.
pub async fn my_chats(client: &ApiClient) -> Result<Vec<Chat>, ApiError> {
    client
        .fetch(&ApiRequest::get("/communication/chat/my-chats"))
        .await
}

/// Message history of a chat, oldest first.
pub async fn messages(
    client: &ApiClient,
    chat_id: &str,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<Vec<Message>, ApiError> {
    let request = ApiRequest::get(format!("/communication/chat/{}/messages", chat_id))
        .query_opt("limit", limit)
        .query_opt("offset", offset);
    client.fetch(&request).await
}

/// Open (or reuse) the conversation between a user and a worker.
pub async fn create_chat(
    client: &ApiClient,
    user_id: &str,
    worker_id: &str,
) -> Result<Chat, ApiError> {
    let request = ApiRequest::post("/communication/chat/create")
        .json(serde_json::json!({ "userId": user_id, "workerId": worker_id }));
    client.fetch(&request).await
}

/// List the signed-in account's chats (prints to stdout).
pub async fn list_chats(limit: usize) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;
    let viewer_is_worker = session.store().role() == Some(Role::Worker);

    let chats = my_chats(session.api()).await?;

    println!("\nRecent Chats:");
    println!("{:-<60}", "");

    if chats.is_empty() {
        println!("  (no chats found)");
        return Ok(());
    }

    for chat in chats.iter().take(limit) {
        println!("{}", chat.counterpart_name(viewer_is_worker));
        println!("  ID: {}", chat.id);
        if let Some(at) = chat.last_message_at {
            println!("  Last: {}", at.format("%Y-%m-%d %H:%M"));
        }
        if let Some(preview) = chat.last_message.as_deref().map(str::trim) {
            if !preview.is_empty() {
                println!("  {}", preview);
            }
        }
        println!();
    }

    Ok(())
}

/// Open a conversation with `counterpart` and print its ID.
///
/// A user talks to workers and a worker to users, so the signed-in
/// account fills the other side.
pub async fn start_chat(counterpart: &str) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;
    let self_id = session
        .store()
        .user_id()
        .ok_or_else(|| anyhow::anyhow!("No user ID stored. Log in again."))?;

    let chat = match session.store().role() {
        Some(Role::Worker) => create_chat(session.api(), counterpart, &self_id).await?,
        _ => create_chat(session.api(), &self_id, counterpart).await?,
    };
    println!("Chat ID: {}", chat.id);
    Ok(())
}

/// Print the message history of a chat.
pub async fn read_messages(chat_id: &str, limit: u32) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;

    let msgs = messages(session.api(), chat_id, Some(limit), None).await?;
    if msgs.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    for msg in &msgs {
        println!(
            "[{}] {}: {}",
            msg.created_at.format("%Y-%m-%d %H:%M"),
            msg.sender_name(),
            msg.content
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_messages_with_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/communication/chat/c1/messages"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [
                    { "id": "m1", "content": "hi", "senderId": "u1", "senderRole": "user", "createdAt": "2025-01-01T00:00:00Z" },
                    { "id": "m2", "content": "hey", "senderId": "w1", "senderRole": "worker", "createdAt": "2025-01-01T00:00:05Z" }
                ]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), Arc::new(MemoryTokenStore::new()));
        let msgs = messages(&client, "c1", Some(50), None).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].sender_role, "worker");
    }

    #[tokio::test]
    async fn test_my_chats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/communication/chat/my-chats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [{
                    "id": "c1",
                    "participants": { "userId": "u1", "workerId": "w1" },
                    "lastMessage": "see you",
                    "lastMessageAt": "2025-01-01T00:00:05Z"
                }]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), Arc::new(MemoryTokenStore::new()));
        let chats = my_chats(&client).await.unwrap();
        assert_eq!(chats[0].participants.worker_id, "w1");
        assert_eq!(chats[0].last_message.as_deref(), Some("see you"));
    }

    #[tokio::test]
    async fn test_create_chat_posts_both_sides() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/communication/chat/create"))
            .and(body_json(serde_json::json!({ "userId": "u1", "workerId": "w1" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "success": true,
                "data": { "_id": "c7", "participants": { "userId": "u1", "workerId": "w1" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), Arc::new(MemoryTokenStore::new()));
        let chat = create_chat(&client, "u1", "w1").await.unwrap();
        assert_eq!(chat.id, "c7");
        assert_eq!(chat.last_message, None);
    }
}
