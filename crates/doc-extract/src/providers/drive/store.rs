//! Google Drive folder as a document source
//!
//! Lists a source folder, downloads files into memory, and marks them done by
//! moving them into a done folder.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AccessTokenProvider;
use crate::config::DriveConfig;
use crate::error::{Error, FetchReason, Result};
use crate::providers::http::{check_status, send_error};
use crate::providers::source::{finalize_listing, CompletionMarker, ContentFetcher, SourceLister};
use crate::types::{DocumentReference, FetchedContent, SourceLocation};

const SERVICE: &str = "drive";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,parents,mimeType)";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct FileParents {
    #[serde(default)]
    parents: Vec<String>,
}

/// Drive v3 client bound to one source folder and one done folder
pub struct DriveStore {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    api_base: String,
    folder_id: String,
    done_folder_id: String,
    page_size: u32,
}

impl DriveStore {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenProvider>,
        config: &DriveConfig,
    ) -> Result<Self> {
        let folder_id = config
            .folder_id
            .clone()
            .ok_or_else(|| Error::Config("Drive folder_id is not set".to_string()))?;
        let done_folder_id = config
            .done_folder_id
            .clone()
            .ok_or_else(|| Error::Config("Drive done_folder_id is not set".to_string()))?;

        Ok(Self {
            http,
            tokens,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            folder_id,
            done_folder_id,
            page_size: config.page_size.max(1),
        })
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/{}", self.files_url(), id)
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<FileList> {
        let token = self.tokens.access_token().await?;
        let query = format!("'{}' in parents and trashed = false", self.folder_id);
        let page_size = self.page_size.to_string();

        let mut request = self.http.get(self.files_url()).bearer_auth(token).query(&[
            ("q", query.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
            ("orderBy", "name"),
        ]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Malformed Drive listing: {}", e)))
    }

    async fn current_parents(&self, id: &str) -> Result<Vec<String>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.file_url(id))
            .bearer_auth(token)
            .query(&[("fields", "parents")])
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let file: FileParents = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Malformed Drive metadata: {}", e)))?;
        Ok(file.parents)
    }

    async fn download(&self, reference: &DocumentReference) -> Result<FetchedContent> {
        let fetch_error =
            |reason: FetchReason, message: String| Error::fetch(&reference.id, reason, message);

        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| fetch_error(FetchReason::PermissionDenied, e.to_string()))?;

        let mut response = self
            .http
            .get(self.file_url(&reference.id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| fetch_error(FetchReason::Network, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = match status.as_u16() {
                404 => FetchReason::NotFound,
                401 | 403 => FetchReason::PermissionDenied,
                _ => FetchReason::Other,
            };
            let body = response.text().await.unwrap_or_default();
            return Err(fetch_error(
                reason,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }

        let total = response.content_length().filter(|t| *t > 0);
        let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut last_percent = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(FetchReason::Network, e.to_string()))?
        {
            data.extend_from_slice(&chunk);

            if let Some(total) = total {
                let percent = (data.len() as u64 * 100 / total).min(100);
                if percent >= last_percent + 25 || (percent == 100 && last_percent < 100) {
                    tracing::debug!("[{}] Download {}%", reference.name, percent);
                    last_percent = percent;
                }
            }
        }

        Ok(FetchedContent::new(data, reference.kind()))
    }

    async fn move_to_done(&self, reference: &DocumentReference) -> Result<()> {
        let parents = match &reference.location {
            SourceLocation::Drive { parents } if !parents.is_empty() => parents.clone(),
            _ => self.current_parents(&reference.id).await?,
        };
        let remove = parents
            .iter()
            .filter(|p| **p != self.done_folder_id)
            .cloned()
            .collect::<Vec<_>>()
            .join(",");

        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .patch(self.file_url(&reference.id))
            .bearer_auth(token)
            .query(&[
                ("addParents", self.done_folder_id.as_str()),
                ("removeParents", remove.as_str()),
                ("fields", "id,parents"),
            ])
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        check_status(SERVICE, response).await?;

        tracing::debug!("Moved {} into done folder", reference.name);
        Ok(())
    }
}

#[async_trait]
impl SourceLister for DriveStore {
    async fn list(&self) -> Result<Vec<DocumentReference>> {
        let mut references = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_page(page_token.as_deref())
                .await
                .map_err(|e| Error::Listing(format!("Drive folder {}: {}", self.folder_id, e)))?;

            references.extend(page.files.into_iter().map(|f| {
                DocumentReference::drive(f.id, f.name, f.parents, f.mime_type)
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(finalize_listing(references))
    }

    fn name(&self) -> &str {
        "drive"
    }
}

#[async_trait]
impl ContentFetcher for DriveStore {
    async fn fetch(&self, reference: &DocumentReference) -> Result<FetchedContent> {
        self.download(reference).await
    }

    fn name(&self) -> &str {
        "drive"
    }
}

#[async_trait]
impl CompletionMarker for DriveStore {
    async fn mark_done(&self, reference: &DocumentReference) -> Result<()> {
        self.move_to_done(reference)
            .await
            .map_err(|e| Error::completion_mark(&reference.id, e))
    }

    fn name(&self) -> &str {
        "drive-move"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::drive::StaticToken;
    use crate::providers::test_support::serve;
    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    type Moves = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn list_files(
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-token") {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({}))).into_response();
        }
        assert_eq!(params["q"], "'src' in parents and trashed = false");

        let body = match params.get("pageToken").map(String::as_str) {
            None => serde_json::json!({
                "nextPageToken": "p2",
                "files": [
                    {"id": "f1", "name": "lab.pdf", "parents": ["src"], "mimeType": "application/pdf"},
                    {"id": "f0", "name": "~$lab.docx", "parents": ["src"]}
                ]
            }),
            _ => serde_json::json!({
                "files": [{"id": "f2", "name": "notes.txt", "parents": ["src"]}]
            }),
        };
        Json(body).into_response()
    }

    async fn file(
        Path(id): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        match (id.as_str(), params.get("alt").map(String::as_str)) {
            ("f1", Some("media")) => (StatusCode::OK, "%PDF-1.4 body").into_response(),
            ("f2", None) => Json(serde_json::json!({"parents": ["src"]})).into_response(),
            ("locked", _) => (StatusCode::FORBIDDEN, "forbidden").into_response(),
            _ => (StatusCode::NOT_FOUND, "not found").into_response(),
        }
    }

    async fn update(
        State(moves): State<Moves>,
        Path(id): Path<String>,
        Query(mut params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        params.insert("id".to_string(), id);
        moves.lock().unwrap().push(params);
        Json(serde_json::json!({"id": "ok"}))
    }

    async fn store() -> (DriveStore, Moves) {
        let moves: Moves = Arc::default();
        let app = Router::new()
            .route("/drive/v3/files", get(list_files))
            .route("/drive/v3/files/:id", get(file).patch(update))
            .with_state(moves.clone());
        let base = serve(app).await;

        let config = DriveConfig {
            folder_id: Some("src".to_string()),
            done_folder_id: Some("done".to_string()),
            api_base: base,
            ..Default::default()
        };
        let store = DriveStore::new(
            reqwest::Client::new(),
            Arc::new(StaticToken::new("test-token")),
            &config,
        )
        .unwrap();
        (store, moves)
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let (store, _) = store().await;

        let refs = store.list().await.unwrap();
        let ids: Vec<&str> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["f1", "f2"]);
        assert_eq!(refs[0].kind(), crate::types::ContentKind::Pdf);
    }

    #[tokio::test]
    async fn test_fetch_downloads_media() {
        let (store, _) = store().await;
        let reference = DocumentReference::drive("f1", "lab.pdf", vec!["src".into()], None);

        let content = store.fetch(&reference).await.unwrap();
        assert_eq!(content.data, b"%PDF-1.4 body");
        assert_eq!(content.kind, crate::types::ContentKind::Pdf);
    }

    #[tokio::test]
    async fn test_fetch_failures_are_classified() {
        let (store, _) = store().await;

        let missing = DocumentReference::drive("gone", "gone.pdf", vec![], None);
        assert!(matches!(
            store.fetch(&missing).await,
            Err(Error::Fetch {
                reason: FetchReason::NotFound,
                ..
            })
        ));

        let locked = DocumentReference::drive("locked", "locked.pdf", vec![], None);
        assert!(matches!(
            store.fetch(&locked).await,
            Err(Error::Fetch {
                reason: FetchReason::PermissionDenied,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_mark_done_moves_between_folders() {
        let (store, moves) = store().await;

        store
            .mark_done(&DocumentReference::drive("f1", "lab.pdf", vec!["src".into()], None))
            .await
            .unwrap();
        // parents looked up when the reference carries none
        store
            .mark_done(&DocumentReference::drive("f2", "notes.txt", vec![], None))
            .await
            .unwrap();

        let moves = moves.lock().unwrap();
        assert_eq!(moves.len(), 2);
        for (params, id) in moves.iter().zip(["f1", "f2"]) {
            assert_eq!(params["id"], id);
            assert_eq!(params["addParents"], "done");
            assert_eq!(params["removeParents"], "src");
        }
    }

    #[tokio::test]
    async fn test_mark_done_failure_is_completion_error() {
        let (store, _) = store().await;

        let err = store
            .mark_done(&DocumentReference::drive("gone", "gone.pdf", vec![], None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CompletionMark { .. }));
        assert!(!err.is_fatal());
    }
}
