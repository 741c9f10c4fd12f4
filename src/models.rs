//! Data models for Google Drive API responses and credential files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mime type Google Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Default Google OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Default Google OAuth2 consent endpoint.
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Whether an entry is a plain file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Classify a Drive mime type.
    pub fn from_mime_type(mime_type: Option<&str>) -> Self {
        match mime_type {
            Some(FOLDER_MIME_TYPE) => EntryKind::Folder,
            _ => EntryKind::File,
        }
    }
}

/// A listed remote object. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, EntryKind::File)
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, EntryKind::Folder)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Metadata for a file or folder as returned by the Drive API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl From<FileMetadata> for Entry {
    fn from(metadata: FileMetadata) -> Self {
        let kind = EntryKind::from_mime_type(metadata.mime_type.as_deref());
        Entry::new(metadata.id, metadata.name, kind)
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client registration, the `installed` (or `web`) object of a
/// client secrets file downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Wrapper matching the layout of a client secrets file.
#[derive(Debug, Deserialize)]
pub struct ClientSecretsFile {
    pub installed: Option<OAuthClientSecrets>,
    pub web: Option<OAuthClientSecrets>,
}

/// Persisted user token, in the same layout Google's client libraries
/// write to `token.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUserToken {
    /// True when the access token is present and outlives `now + margin`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        match (&self.token, self.expiry) {
            (Some(_), Some(expiry)) => expiry > now + margin,
            _ => false,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}
