//! Google Drive API v3 client.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;

use crate::auth::Authenticator;
use crate::backend::{DriveBackend, FilePage, ListQuery};
use crate::error::{DriveError, Result};
use crate::models::{
    ApiErrorResponse, Entry, EntryKind, FileListResponse, FileMetadata, FOLDER_MIME_TYPE,
};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for every entry.
const ENTRY_FIELDS: &str = "id, name, mimeType";

/// Client for the Drive files endpoints used by the tree walk.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    base_url: String,
    drive_id: Option<String>,
}

impl DriveClient {
    /// Create a client for My Drive and any shared items.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            base_url: DRIVE_API_BASE.to_string(),
            drive_id: None,
        }
    }

    /// Restrict listings to one Shared Drive.
    pub fn with_drive_id(mut self, drive_id: impl Into<String>) -> Self {
        self.drive_id = Some(drive_id.into());
        self
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn drive_id(&self) -> Option<&str> {
        self.drive_id.as_deref()
    }

    /// POST a JSON body and decode the returned metadata.
    async fn post_metadata(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<FileMetadata> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", ENTRY_FIELDS)])
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DriveBackend for DriveClient {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage> {
        let token = self.auth.get_access_token().await?;
        let q = query.to_drive_query();
        let page_size = page_size.to_string();

        let mut request = self
            .http
            .get(format!("{}/files", self.base_url))
            .bearer_auth(&token)
            .query(&[
                ("q", q.as_str()),
                ("pageSize", page_size.as_str()),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                ("fields", "nextPageToken, files(id, name, mimeType)"),
            ]);

        if let Some(ref drive_id) = self.drive_id {
            request = request.query(&[("corpora", "drive"), ("driveId", drive_id.as_str())]);
        }

        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let response = check_status(request.send().await?).await?;
        let list_response: FileListResponse = response.json().await?;
        debug!(
            parent = %query.parent_id,
            count = list_response.files.len(),
            more = list_response.next_page_token.is_some(),
            "listed page"
        );

        Ok(FilePage {
            entries: list_response.files.into_iter().map(Entry::from).collect(),
            next_page_token: list_response.next_page_token,
        })
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<Entry> {
        let body = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id]
        });
        let metadata = self
            .post_metadata(format!("{}/files", self.base_url), body)
            .await?;
        Ok(Entry::new(metadata.id, metadata.name, EntryKind::Folder))
    }

    async fn copy_file(&self, source_id: &str, name: &str, parent_id: &str) -> Result<Entry> {
        let body = json!({
            "name": name,
            "parents": [parent_id]
        });
        let metadata = self
            .post_metadata(format!("{}/files/{}/copy", self.base_url, source_id), body)
            .await?;
        Ok(Entry::new(metadata.id, metadata.name, EntryKind::File))
    }
}

/// Turn a non-2xx response into an `ApiError`, preferring Google's error body.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}
