//! Notification service endpoints

use super::client::{ApiClient, ApiRequest};
use super::error::ApiError;
use crate::models::{Notification, UnreadCount};

pub async fn list(
    client: &ApiClient,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<Vec<Notification>, ApiError> {
    let request = ApiRequest::get("/notification/notifications")
        .query_opt("limit", limit)
        .query_opt("offset", offset);
    client.fetch(&request).await
}

pub async fn unread_count(client: &ApiClient) -> Result<u64, ApiError> {
    let count: UnreadCount = client
        .fetch(&ApiRequest::get("/notification/notifications/unread-count"))
        .await?;
    Ok(count.count)
}

pub async fn mark_read(client: &ApiClient, id: &str) -> Result<(), ApiError> {
    client
        .submit(&ApiRequest::patch(format!(
            "/notification/notifications/{}/read",
            id
        )))
        .await?;
    Ok(())
}

pub async fn mark_all_read(client: &ApiClient) -> Result<(), ApiError> {
    client
        .submit(&ApiRequest::patch("/notification/notifications/mark-all-read"))
        .await?;
    Ok(())
}
