//! Access-token acquisition for Google APIs.
//!
//! Three credential sources are supported:
//! - a service account key, exchanged through a signed JWT assertion,
//! - an OAuth client secrets file, backed by a persisted user token that is
//!   refreshed when stale and obtained through browser consent when missing,
//! - a raw access token supplied by the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::consent::{self, ConsentListener};
use crate::error::{DriveError, Result};
use crate::models::{
    AuthorizedUserToken, ClientSecretsFile, OAuthClientSecrets, ServiceAccountCredentials,
    TokenResponse, DEFAULT_TOKEN_URI,
};

/// File the user token is persisted to when none is configured.
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Lifetime assumed for caller-supplied access tokens.
const STATIC_TOKEN_LIFETIME_SECS: u64 = 3600;

/// OAuth scope requested from Google.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Full Drive access, needed to create folders and copy files.
    Drive,
    /// Read-only access to metadata, enough for listing and counting.
    DriveMetadataReadonly,
}

impl Scope {
    pub fn url(self) -> &'static str {
        match self {
            Scope::Drive => "https://www.googleapis.com/auth/drive",
            Scope::DriveMetadataReadonly => {
                "https://www.googleapis.com/auth/drive.metadata.readonly"
            }
        }
    }

    /// Whether a set of granted scopes permits this one. Full Drive access
    /// implies metadata access.
    pub fn is_satisfied_by(self, granted: &[String]) -> bool {
        granted
            .iter()
            .any(|g| g == self.url() || g == Scope::Drive.url())
    }
}

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// A parsed credentials file.
#[derive(Debug)]
pub enum CredentialsFile {
    ServiceAccount(ServiceAccountCredentials),
    InstalledApp(OAuthClientSecrets),
}

impl CredentialsFile {
    /// Detect the credential layout from JSON content.
    pub fn parse(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;

        if value.get("installed").is_some() || value.get("web").is_some() {
            let file: ClientSecretsFile = serde_json::from_value(value)?;
            return file
                .installed
                .or(file.web)
                .map(CredentialsFile::InstalledApp)
                .ok_or(DriveError::UnknownCredentialsFormat);
        }

        if value.get("client_email").is_some() {
            return Ok(CredentialsFile::ServiceAccount(serde_json::from_value(
                value,
            )?));
        }

        Err(DriveError::UnknownCredentialsFormat)
    }
}

enum TokenSource {
    ServiceAccount(ServiceAccountCredentials),
    InstalledApp(OAuthClientSecrets),
    Static(String),
}

/// Supplies bearer tokens for one scope. Cheap to clone; clones share the
/// token cache.
#[derive(Clone)]
pub struct Authenticator {
    source: Arc<TokenSource>,
    scope: Scope,
    token_file: PathBuf,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    consent_listener: Arc<Mutex<Option<ConsentListener>>>,
}

impl Authenticator {
    /// Create an authenticator from a service account key or an OAuth
    /// client secrets file.
    pub fn from_file<P: AsRef<Path>>(path: P, scope: Scope) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(match CredentialsFile::parse(&content)? {
            CredentialsFile::ServiceAccount(creds) => Self::service_account(creds, scope),
            CredentialsFile::InstalledApp(secrets) => Self::installed_app(secrets, scope),
        })
    }

    pub fn service_account(credentials: ServiceAccountCredentials, scope: Scope) -> Self {
        Self::with_source(TokenSource::ServiceAccount(credentials), scope)
    }

    pub fn installed_app(secrets: OAuthClientSecrets, scope: Scope) -> Self {
        Self::with_source(TokenSource::InstalledApp(secrets), scope)
    }

    /// Use an access token obtained elsewhere, e.g. `gcloud auth print-access-token`.
    pub fn from_access_token(token: impl Into<String>) -> Self {
        Self::with_source(TokenSource::Static(token.into()), Scope::Drive)
    }

    fn with_source(source: TokenSource, scope: Scope) -> Self {
        Self {
            source: Arc::new(source),
            scope,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
            consent_listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Where the user token is read from and written to. Only used with
    /// OAuth client secrets.
    pub fn with_token_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.token_file = path.into();
        self
    }

    /// Receive the next consent redirect on an already bound listener
    /// instead of a fresh one.
    pub fn with_consent_listener(self, listener: ConsentListener) -> Self {
        Self {
            consent_listener: Arc::new(Mutex::new(Some(listener))),
            ..self
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                let buffer = Duration::from_secs(EXPIRY_BUFFER_SECS);
                if token.expires_at > SystemTime::now() + buffer {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = match self.source.as_ref() {
            TokenSource::ServiceAccount(creds) => self.service_account_token(creds).await?,
            TokenSource::InstalledApp(secrets) => self.installed_app_token(secrets).await?,
            TokenSource::Static(token) => CachedToken {
                access_token: token.clone(),
                expires_at: SystemTime::now() + Duration::from_secs(STATIC_TOKEN_LIFETIME_SECS),
            },
        };

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn service_account_token(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<CachedToken> {
        let token_uri = credentials.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let now = Utc::now().timestamp().max(0) as u64;

        let claims = Claims {
            iss: credentials.client_email.clone(),
            scope: self.scope.url().to_string(),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ];
        let response = post_token_request(&self.client, token_uri, &params).await?;
        debug!(account = %credentials.client_email, "obtained service account token");

        Ok(CachedToken {
            access_token: response.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(response.expires_in),
        })
    }

    /// Load the persisted user token, refreshing it or running consent when
    /// it cannot be used as is. The token file is rewritten after any change.
    async fn installed_app_token(&self, secrets: &OAuthClientSecrets) -> Result<CachedToken> {
        let margin = chrono::Duration::seconds(EXPIRY_BUFFER_SECS as i64);
        let stored = load_token_file(&self.token_file)?
            .filter(|token| self.scope.is_satisfied_by(&token.scopes));

        let token = match stored {
            Some(token) if token.is_fresh(Utc::now(), margin) => {
                debug!(path = %self.token_file.display(), "using stored user token");
                token
            }
            Some(token) if token.refresh_token.is_some() => {
                match self.refresh_user_token(token).await {
                    Ok(refreshed) => {
                        save_token_file(&self.token_file, &refreshed)?;
                        refreshed
                    }
                    Err(err) => {
                        warn!(error = %err, "token refresh failed, requesting consent");
                        self.consent_and_save(secrets).await?
                    }
                }
            }
            _ => self.consent_and_save(secrets).await?,
        };

        let access_token = token
            .token
            .ok_or_else(|| DriveError::AuthenticationError("token file has no access token".into()))?;
        let expires_at = token
            .expiry
            .map(SystemTime::from)
            .unwrap_or_else(SystemTime::now);

        Ok(CachedToken {
            access_token,
            expires_at,
        })
    }

    async fn refresh_user_token(&self, mut token: AuthorizedUserToken) -> Result<AuthorizedUserToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| DriveError::TokenRefreshError("no refresh token".into()))?;

        info!("refreshing stored user token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", token.client_id.as_str()),
            ("client_secret", token.client_secret.as_str()),
        ];
        let response = post_token_request(&self.client, &token.token_uri, &params).await?;

        token.token = Some(response.access_token);
        token.expiry = Some(Utc::now() + chrono::Duration::seconds(response.expires_in as i64));
        if let Some(rotated) = response.refresh_token {
            token.refresh_token = Some(rotated);
        }
        Ok(token)
    }

    async fn consent_and_save(&self, secrets: &OAuthClientSecrets) -> Result<AuthorizedUserToken> {
        let preset = self.consent_listener.lock().await.take();
        let response = match preset {
            Some(listener) => {
                consent::authorize_with(&self.client, secrets, self.scope, listener).await?
            }
            None => consent::authorize(&self.client, secrets, self.scope).await?,
        };
        let token = AuthorizedUserToken {
            token: Some(response.access_token),
            refresh_token: response.refresh_token,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: vec![self.scope.url().to_string()],
            expiry: Some(Utc::now() + chrono::Duration::seconds(response.expires_in as i64)),
        };
        save_token_file(&self.token_file, &token)?;
        Ok(token)
    }
}

/// Read a persisted user token. A missing file is not an error.
pub fn load_token_file(path: &Path) -> Result<Option<AuthorizedUserToken>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

pub fn save_token_file(path: &Path, token: &AuthorizedUserToken) -> Result<()> {
    let content = serde_json::to_string_pretty(token)?;
    fs::write(path, content)?;
    debug!(path = %path.display(), "saved user token");
    Ok(())
}

/// POST a form to an OAuth2 token endpoint.
pub(crate) async fn post_token_request(
    client: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client.post(token_uri).form(params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DriveError::TokenRefreshError(format!(
            "Status {}: {}",
            status, body
        )));
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_serialization() {
        let claims = Claims {
            iss: "test@example.iam.gserviceaccount.com".to_string(),
            scope: Scope::Drive.url().to_string(),
            aud: DEFAULT_TOKEN_URI.to_string(),
            iat: 1234567890,
            exp: 1234571490,
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("test@example.iam.gserviceaccount.com"));
        assert!(json.contains(Scope::Drive.url()));
    }

    #[test]
    fn test_parse_service_account() {
        let json = r#"{
            "type": "service_account",
            "client_email": "bot@project.iam.gserviceaccount.com",
            "private_key": "key"
        }"#;
        assert!(matches!(
            CredentialsFile::parse(json).unwrap(),
            CredentialsFile::ServiceAccount(_)
        ));
    }

    #[test]
    fn test_parse_installed_client_secrets() {
        let json = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "secret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        match CredentialsFile::parse(json).unwrap() {
            CredentialsFile::InstalledApp(secrets) => {
                assert_eq!(secrets.client_id, "id.apps.googleusercontent.com");
                assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_layout() {
        assert!(matches!(
            CredentialsFile::parse(r#"{"foo": 1}"#),
            Err(DriveError::UnknownCredentialsFormat)
        ));
    }

    #[test]
    fn test_scope_satisfaction() {
        let full = vec![Scope::Drive.url().to_string()];
        let readonly = vec![Scope::DriveMetadataReadonly.url().to_string()];

        assert!(Scope::DriveMetadataReadonly.is_satisfied_by(&full));
        assert!(Scope::DriveMetadataReadonly.is_satisfied_by(&readonly));
        assert!(!Scope::Drive.is_satisfied_by(&readonly));
        assert!(!Scope::Drive.is_satisfied_by(&[]));
    }
}
