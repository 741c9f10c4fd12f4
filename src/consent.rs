//! Interactive OAuth consent through a loopback redirect.
//!
//! The consent URL is printed for the user to open. Google redirects the
//! browser back to a listener on `localhost` with an authorization code,
//! which is exchanged for tokens.

use reqwest::{Client, Url};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::auth::{post_token_request, Scope};
use crate::error::{DriveError, Result};
use crate::models::{OAuthClientSecrets, TokenResponse};

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";
const FAILURE_PAGE: &str = "The authentication flow failed. Check the terminal for details.";

/// Loopback endpoint that receives the consent redirect. Each listener
/// carries its own random `state` value.
pub struct ConsentListener {
    listener: TcpListener,
    port: u16,
    redirect_uri: String,
    state: String,
}

impl ConsentListener {
    /// Bind an ephemeral port on `127.0.0.1`.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| DriveError::ConsentError(format!("cannot bind loopback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| DriveError::ConsentError(e.to_string()))?
            .port();

        Ok(Self {
            listener,
            port,
            redirect_uri: format!("http://localhost:{}/", port),
            state: consent_state(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn consent_url(&self, secrets: &OAuthClientSecrets, scope: Scope) -> Result<Url> {
        consent_url(secrets, scope, &self.redirect_uri, &self.state)
    }

    /// Wait for the redirect and return its authorization code. Requests
    /// without a query string (favicon and the like) get a 404 and are
    /// skipped.
    pub async fn await_code(&self) -> Result<String> {
        loop {
            let (mut stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| DriveError::ConsentError(e.to_string()))?;
            debug!(%peer, "consent redirect connection");

            let request_line = read_request_line(&mut stream).await?;
            if !request_line.contains('?') {
                respond(&mut stream, "404 Not Found", "").await;
                continue;
            }

            let outcome = parse_redirect(&request_line, &self.state);
            let page = if outcome.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
            respond(&mut stream, "200 OK", page).await;
            return outcome;
        }
    }
}

/// Run browser consent on a fresh loopback listener and exchange the
/// returned code for tokens.
pub async fn authorize(
    http: &Client,
    secrets: &OAuthClientSecrets,
    scope: Scope,
) -> Result<TokenResponse> {
    let listener = ConsentListener::bind().await?;
    authorize_with(http, secrets, scope, listener).await
}

/// Same as [`authorize`], on a listener the caller already bound.
pub async fn authorize_with(
    http: &Client,
    secrets: &OAuthClientSecrets,
    scope: Scope,
    listener: ConsentListener,
) -> Result<TokenResponse> {
    let url = listener.consent_url(secrets, scope)?;
    eprintln!(
        "Please visit this URL to authorize this application: {}",
        url
    );

    let code = listener.await_code().await?;
    exchange_code(http, secrets, &code, listener.redirect_uri()).await
}

/// Trade an authorization code for tokens at the client's token endpoint.
pub async fn exchange_code(
    http: &Client,
    secrets: &OAuthClientSecrets,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
    ];
    post_token_request(http, &secrets.token_uri, &params).await
}

/// Build the consent URL the user opens in a browser.
pub fn consent_url(
    secrets: &OAuthClientSecrets,
    scope: Scope,
    redirect_uri: &str,
    state: &str,
) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.url()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| DriveError::ConsentError(format!("invalid auth_uri: {}", e)))
}

/// Extract the authorization code from the redirect's HTTP request line,
/// e.g. `GET /?state=s&code=c HTTP/1.1`.
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| DriveError::ConsentError("malformed redirect request".into()))?;
    let url = Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| DriveError::ConsentError(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(DriveError::ConsentError(format!("authorization denied: {}", error)));
    }
    if state.as_deref() != Some(expected_state) {
        return Err(DriveError::ConsentError("state mismatch in redirect".into()));
    }
    code.ok_or_else(|| DriveError::ConsentError("redirect carried no code".into()))
}

fn consent_state() -> String {
    let mut bytes = [0u8; 16];
    rand::fill(&mut bytes);
    hex::encode(bytes)
}

async fn read_request_line(stream: &mut TcpStream) -> Result<String> {
    let (reader, _) = stream.split();
    let mut line = String::new();
    BufReader::new(reader)
        .read_line(&mut line)
        .await
        .map_err(|e| DriveError::ConsentError(e.to_string()))?;
    Ok(line)
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        debug!(error = %err, "failed to answer consent redirect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_AUTH_URI;

    fn secrets() -> OAuthClientSecrets {
        OAuthClientSecrets {
            client_id: "id.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        }
    }

    #[test]
    fn test_consent_url_carries_scope_and_redirect() {
        let url = consent_url(
            &secrets(),
            Scope::DriveMetadataReadonly,
            "http://localhost:8080/",
            "xyz",
        )
        .unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".into(), Scope::DriveMetadataReadonly.url().into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost:8080/".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
    }

    #[test]
    fn test_parse_redirect_code() {
        let line = "GET /?state=xyz&code=4%2F0Abc&scope=drive HTTP/1.1\r\n";
        assert_eq!(parse_redirect(line, "xyz").unwrap(), "4/0Abc");
    }

    #[test]
    fn test_parse_redirect_state_mismatch() {
        let line = "GET /?state=other&code=abc HTTP/1.1\r\n";
        assert!(parse_redirect(line, "xyz").is_err());
    }

    #[test]
    fn test_parse_redirect_denied() {
        let line = "GET /?error=access_denied&state=xyz HTTP/1.1\r\n";
        let err = parse_redirect(line, "xyz").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_parse_redirect_malformed() {
        assert!(parse_redirect("", "xyz").is_err());
    }

    #[test]
    fn test_consent_state_is_random_hex() {
        let first = consent_state();
        let second = consent_state();

        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_listener_skips_requests_without_query() {
        let listener = ConsentListener::bind().await.unwrap();
        let port = listener.port();
        let request = format!("GET /?state={}&code=c0de HTTP/1.1\r\n\r\n", listener.state());

        let browser = tokio::spawn(async move {
            let mut favicon = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            favicon.write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n").await.unwrap();
            let mut redirect = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            redirect.write_all(request.as_bytes()).await.unwrap();
        });

        assert_eq!(listener.await_code().await.unwrap(), "c0de");
        browser.await.unwrap();
    }
}
