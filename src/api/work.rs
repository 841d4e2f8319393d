//! Work service endpoints

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::client::{ApiClient, ApiRequest, FormPart};
use super::error::ApiError;
use crate::models::WorkPage;
use crate::session::Session;

/// Filters for the public work listing. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct WorkFilters {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub max_distance: Option<f64>,
}

impl WorkFilters {
    fn apply(&self, request: ApiRequest) -> ApiRequest {
        request
            .query_opt("search", self.search.as_deref().filter(|s| !s.is_empty()))
            .query_opt(
                "status",
                self.status.as_deref().filter(|s| !s.is_empty() && *s != "all"),
            )
            .query_opt("page", self.page.filter(|p| *p > 0))
            .query_opt("limit", self.limit.filter(|l| *l > 0))
            .query_opt("latitude", self.latitude)
            .query_opt("longitude", self.longitude)
            .query_opt("maxDistance", self.max_distance)
    }
}

pub async fn list_works(
    client: &ApiClient,
    filters: &WorkFilters,
) -> Result<WorkPage, ApiError> {
    let request = filters.apply(ApiRequest::get("/work/get-all-works"));
    client.fetch(&request).await
}

/// Text fields plus image files for `POST /work/post-work`.
pub fn work_form(
    fields: &[(String, String)],
    images: &[impl AsRef<Path>],
) -> Result<Vec<FormPart>> {
    let mut parts: Vec<FormPart> = fields
        .iter()
        .map(|(name, value)| FormPart::Text {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();

    for image in images {
        let path = image.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        parts.push(FormPart::File {
            name: "images".to_string(),
            mime: image_mime(&file_name).map(String::from),
            file_name,
            bytes,
        });
    }

    Ok(parts)
}

fn image_mime(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub async fn post_work(
    client: &ApiClient,
    parts: Vec<FormPart>,
) -> Result<Option<String>, ApiError> {
    client
        .submit(&ApiRequest::post("/work/post-work").multipart(parts))
        .await
}

/// Browse posted works (prints to stdout). No sign-in needed.
pub async fn show_works(filters: &WorkFilters) -> Result<()> {
    let session = Session::load()?;
    let page = list_works(session.api(), filters).await?;

    println!(
        "\nWorks ({} total, page {} of {}):",
        page.total,
        filters.page.unwrap_or(1),
        page.total_pages.max(1)
    );
    println!("{:-<60}", "");
    if page.works.is_empty() {
        println!("  (no works found)");
        return Ok(());
    }

    for work in &page.works {
        println!("{}", work.title);
        println!("  ID: {}", work.id);
        let mut facts = Vec::new();
        if let Some(status) = &work.status {
            facts.push(status.clone());
        }
        if let Some(category) = &work.category {
            facts.push(category.clone());
        }
        if let Some(budget) = work.budget {
            facts.push(format!("budget {}", budget));
        }
        if !facts.is_empty() {
            println!("  {}", facts.join(" | "));
        }
        if !work.description.trim().is_empty() {
            println!("  {}", work.description.trim());
        }
        println!();
    }
    Ok(())
}

/// Post a new work with optional image attachments.
pub async fn create_work(fields: &[(String, String)], images: &[PathBuf]) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;

    let parts = work_form(fields, images)?;
    let message = post_work(session.api(), parts).await?;
    println!("{}", message.as_deref().unwrap_or("Work posted."));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_skip_unset_and_all_status() {
        let filters = WorkFilters {
            search: Some("plumber".into()),
            status: Some("all".into()),
            page: Some(2),
            limit: Some(0),
            latitude: Some(11.25),
            ..Default::default()
        };
        let request = filters.apply(ApiRequest::get("/work/get-all-works"));
        let keys: Vec<&str> = request.query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["search", "page", "latitude"]);
        assert_eq!(request.query[2].1, "11.25");
    }

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime("Sink.JPG"), Some("image/jpeg"));
        assert_eq!(image_mime("notes.txt"), None);
    }

    #[test]
    fn test_work_form_reads_files() {
        let path = std::env::temp_dir().join(format!("workmarket-form-{}.png", std::process::id()));
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let parts = work_form(&[("title".to_string(), "Paint fence".to_string())], &[&path]).unwrap();
        assert_eq!(parts.len(), 2);
        match &parts[1] {
            FormPart::File { mime, bytes, .. } => {
                assert_eq!(mime.as_deref(), Some("image/png"));
                assert_eq!(bytes.len(), 4);
            }
            other => panic!("expected file part, got {:?}", other),
        }

        let _ = std::fs::remove_file(&path);
    }
}
