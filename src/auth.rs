//! OAuth authorization against Google's token endpoint.
//!
//! [`Authenticator::obtain`] resolves a usable [`Credential`] in three steps:
//! a valid cached credential is returned as-is; an expired one is refreshed
//! when it carries a refresh token; otherwise the interactive
//! authorization-code grant runs through an [`AuthorizationPrompt`]. Whatever
//! comes out of the last two steps is written back to the [`CredentialStore`].

use crate::credential::{Credential, CredentialStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

/// Read-only Gmail scope.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Redirect URI for installed apps that paste the code manually.
pub const OUT_OF_BAND_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

const AUTH_STATE: &str = "state-token";

// ─────────────────────────────────────────────────────────────────────────────
// Client secret
// ─────────────────────────────────────────────────────────────────────────────

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Clone)]
pub struct ClientSecret {
    client_id: String,
    client_secret: SecretString,
    auth_url: Url,
    token_url: Url,
    redirect_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretSection>,
    web: Option<ClientSecretSection>,
}

#[derive(Deserialize)]
struct ClientSecretSection {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl ClientSecret {
    /// Creates a client registration from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either endpoint is not a valid URL.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_uri: &str,
        token_uri: &str,
    ) -> Result<Self> {
        let parse = |uri: &str| {
            Url::parse(uri).map_err(|e| Error::InvalidConfig {
                message: format!("invalid OAuth endpoint '{uri}': {e}"),
            })
        };
        Ok(Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            auth_url: parse(auth_uri)?,
            token_url: parse(token_uri)?,
            redirect_uri: OUT_OF_BAND_REDIRECT.to_string(),
        })
    }

    /// Sets the redirect URI sent with the authorization request.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Reads a client secret JSON file (`installed` or `web` application).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialUnavailable`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |source: BoxError| Error::CredentialUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.into()))?;
        Self::from_json(&content).map_err(unavailable)
    }

    fn from_json(json: &str) -> std::result::Result<Self, BoxError> {
        let file: ClientSecretFile = serde_json::from_str(json)?;
        let section = file
            .installed
            .or(file.web)
            .ok_or("client secret has neither an 'installed' nor a 'web' section")?;

        let redirect_uri = section
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| OUT_OF_BAND_REDIRECT.to_string());

        Ok(Self {
            client_id: section.client_id,
            client_secret: SecretString::from(section.client_secret),
            auth_url: Url::parse(&section.auth_uri)?,
            token_url: Url::parse(&section.token_uri)?,
            redirect_uri,
        })
    }

    /// Returns the OAuth client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the token endpoint.
    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Builds the consent URL the user must open.
    #[must_use]
    pub fn authorization_url(&self) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GMAIL_READONLY_SCOPE)
            .append_pair("state", AUTH_STATE)
            .append_pair("access_type", "offline");
        url
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token endpoint wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_credential(self) -> Result<Credential> {
        let mut credential = Credential::new(self.access_token);
        if let Some(token_type) = self.token_type {
            credential.token_type = token_type;
        }
        credential.refresh_token = self.refresh_token;
        if let Some(secs) = self.expires_in {
            let expiry = ChronoDuration::try_seconds(secs)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .ok_or_else(|| Error::TokenExchangeFailed {
                    reason: format!("token endpoint returned an out-of-range expires_in: {secs}"),
                })?;
            credential.expiry = Some(expiry);
        }
        Ok(credential)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Channel through which the user completes the consent step.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Shows `authorization_url` to the user and returns the pasted code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenExchangeFailed`] if no code can be obtained.
    async fn request_code(&self, authorization_url: &Url) -> Result<String>;
}

/// Prompt that prints the consent URL to stderr and reads one line of input.
pub struct LinePrompt<R> {
    input: Mutex<R>,
}

impl LinePrompt<BufReader<Stdin>> {
    /// Reads the code from the process's standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LinePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Reads the code from `input`.
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

#[async_trait]
impl<R> AuthorizationPrompt for LinePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn request_code(&self, authorization_url: &Url) -> Result<String> {
        eprintln!("Go to the following link in your browser then type the authorization code:");
        eprintln!("{authorization_url}");

        let mut line = String::new();
        let read = self
            .input
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| Error::TokenExchangeFailed {
                reason: format!("unable to read authorization code: {e}"),
            })?;

        if read == 0 {
            return Err(Error::TokenExchangeFailed {
                reason: "input closed before an authorization code was entered".into(),
            });
        }

        let code = line.trim();
        if code.is_empty() {
            return Err(Error::TokenExchangeFailed {
                reason: "empty authorization code".into(),
            });
        }
        Ok(code.to_string())
    }
}

impl<R> std::fmt::Debug for LinePrompt<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinePrompt").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authenticator
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves, refreshes and persists the mailbox credential.
pub struct Authenticator {
    secret: ClientSecret,
    store: Box<dyn CredentialStore>,
    prompt: Box<dyn AuthorizationPrompt>,
    http: reqwest::Client,
    authorization_timeout: Duration,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("secret", &self.secret)
            .field("authorization_timeout", &self.authorization_timeout)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator with a default HTTP client and a five-minute
    /// authorization timeout.
    pub fn new(
        secret: ClientSecret,
        store: impl CredentialStore + 'static,
        prompt: impl AuthorizationPrompt + 'static,
    ) -> Self {
        Self {
            secret,
            store: Box::new(store),
            prompt: Box::new(prompt),
            http: reqwest::Client::new(),
            authorization_timeout: Duration::from_secs(300),
        }
    }

    /// Uses `http` for token endpoint requests.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Sets how long the prompt may take to return a code.
    #[must_use]
    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    /// Returns a credential that can be sent to the mail API.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenExchangeFailed`] or [`Error::TokenEndpoint`] if
    /// the interactive grant fails, and [`Error::TokenCache`] if the new
    /// credential cannot be saved.
    #[instrument(name = "Authenticator::obtain", skip(self), fields(client_id = %self.secret.client_id))]
    pub async fn obtain(&self) -> Result<Credential> {
        let cached = self.store.load();

        if let Some(credential) = &cached {
            if credential.is_valid() {
                debug!("Using cached credential");
                return Ok(credential.clone());
            }
        }

        if let Some(credential) = cached.filter(|c| c.refresh_token.is_some()) {
            match self.refresh(&credential).await {
                Ok(refreshed) => {
                    self.store.save(&refreshed)?;
                    debug!("Refreshed expired credential");
                    return Ok(refreshed);
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, falling back to interactive authorization");
                }
            }
        }

        let credential = self.authorize_interactively().await?;
        self.store.save(&credential)?;
        debug!("Saved new credential");
        Ok(credential)
    }

    /// Exchanges the refresh token of `credential` for a new access token.
    ///
    /// The old refresh token is kept when the endpoint does not issue a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if `credential` has no refresh token or the exchange fails.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token =
            credential
                .refresh_token
                .as_deref()
                .ok_or_else(|| Error::TokenExchangeFailed {
                    reason: "credential has no refresh token".into(),
                })?;

        let mut refreshed = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.secret.client_id),
                ("client_secret", self.secret.client_secret.expose_secret()),
            ])
            .await?;

        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token.clone_from(&credential.refresh_token);
        }
        Ok(refreshed)
    }

    async fn authorize_interactively(&self) -> Result<Credential> {
        let url = self.secret.authorization_url();
        debug!("Starting interactive authorization");

        let code = tokio::time::timeout(self.authorization_timeout, self.prompt.request_code(&url))
            .await
            .map_err(|_| Error::TokenExchangeFailed {
                reason: format!(
                    "no authorization code received within {:?}",
                    self.authorization_timeout
                ),
            })??;

        self.exchange_code(&code).await
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.secret.client_id),
            ("client_secret", self.secret.client_secret.expose_secret()),
            ("redirect_uri", &self.secret.redirect_uri),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<Credential> {
        let response = self
            .http
            .post(self.secret.token_url.clone())
            .form(params)
            .send()
            .await
            .map_err(|source| Error::TokenEndpoint { source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) if err.error_description.is_empty() => err.error,
                Ok(err) => format!("{}: {}", err.error, err.error_description),
                Err(_) => format!("token endpoint returned {status}: {body}"),
            };
            return Err(Error::TokenExchangeFailed { reason });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|source| Error::TokenEndpoint { source })?;

        if token.access_token.is_empty() {
            return Err(Error::TokenExchangeFailed {
                reason: "token endpoint returned an empty access token".into(),
            });
        }
        token.into_credential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryCredentialStore;
    use mockito::Matcher;
    use std::sync::Arc;

    fn secret(server_url: &str) -> ClientSecret {
        ClientSecret::new(
            "client-123",
            "shh",
            "https://accounts.google.com/o/oauth2/auth",
            &format!("{server_url}/token"),
        )
        .unwrap()
    }

    fn prompt(input: &'static [u8]) -> LinePrompt<&'static [u8]> {
        LinePrompt::new(input)
    }

    #[test]
    fn test_client_secret_from_json() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "client_secret": "GOCSPX-secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let secret = ClientSecret::from_json(json).unwrap();
        assert_eq!(secret.client_id(), "abc.apps.googleusercontent.com");
        assert_eq!(secret.token_url().as_str(), "https://oauth2.googleapis.com/token");
        assert_eq!(secret.redirect_uri, "http://localhost");
    }

    #[test]
    fn test_client_secret_web_section_default_redirect() {
        let json = r#"{"web": {
            "client_id": "id", "client_secret": "s",
            "auth_uri": "https://a.example/auth", "token_uri": "https://a.example/token"
        }}"#;
        let secret = ClientSecret::from_json(json).unwrap();
        assert_eq!(secret.redirect_uri, OUT_OF_BAND_REDIRECT);
    }

    #[test]
    fn test_client_secret_missing_section() {
        assert!(ClientSecret::from_json(r#"{"other": {}}"#).is_err());
        assert!(ClientSecret::from_json("not json").is_err());
    }

    #[test]
    fn test_client_secret_missing_file() {
        let err = ClientSecret::from_file("/nonexistent/client_secret.json").unwrap_err();
        assert!(matches!(err, Error::CredentialUnavailable { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_authorization_url() {
        let url = secret("http://localhost").authorization_url();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("client_id".into(), "client-123".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("scope".into(), GMAIL_READONLY_SCOPE.into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("redirect_uri".into(), OUT_OF_BAND_REDIRECT.into())));
        assert!(pairs.iter().any(|(k, _)| k == "state"));
    }

    #[test]
    fn test_secret_not_in_debug() {
        let debug_str = format!("{:?}", secret("http://localhost"));
        assert!(!debug_str.contains("shh"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_line_prompt_reads_trimmed_code() {
        let url = Url::parse("https://example.com/auth").unwrap();
        let code = prompt(b"  4/abc-code \n").request_code(&url).await.unwrap();
        assert_eq!(code, "4/abc-code");
    }

    #[tokio::test]
    async fn test_line_prompt_closed_input() {
        let url = Url::parse("https://example.com/auth").unwrap();
        let err = prompt(b"").request_code(&url).await.unwrap_err();
        assert!(matches!(err, Error::TokenExchangeFailed { .. }));

        let err = prompt(b"\n").request_code(&url).await.unwrap_err();
        assert!(matches!(err, Error::TokenExchangeFailed { .. }));
    }

    #[tokio::test]
    async fn test_cached_credential_skips_network() {
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("cached")));
        let auth = Authenticator::new(secret("http://127.0.0.1:1"), store, prompt(b""));

        let credential = auth.obtain().await.unwrap();
        assert_eq!(credential.access_token, "cached");
    }

    #[tokio::test]
    async fn test_interactive_exchange_saves_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "abc".into()),
                Matcher::UrlEncoded("client_secret".into(), "shh".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3599,"refresh_token":"r1"}"#,
            )
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        let auth = Authenticator::new(secret(&server.url()), Arc::clone(&store), prompt(b"abc\n"));

        let credential = auth.obtain().await.unwrap();
        mock.assert_async().await;

        assert_eq!(credential.access_token, "fresh");
        assert_eq!(credential.refresh_token.as_deref(), Some("r1"));
        assert!(credential.is_valid());
        assert_eq!(store.load(), Some(credential));
    }

    #[tokio::test]
    async fn test_closed_prompt_fails_exchange() {
        let store = Arc::new(MemoryCredentialStore::new());
        let auth = Authenticator::new(secret("http://127.0.0.1:1"), Arc::clone(&store), prompt(b""));

        let err = auth.obtain().await.unwrap_err();
        assert!(matches!(err, Error::TokenExchangeFailed { .. }));
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_token_error_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"Bad Request"}"#)
            .create_async()
            .await;

        let auth = Authenticator::new(
            secret(&server.url()),
            MemoryCredentialStore::new(),
            prompt(b"bad-code\n"),
        );

        match auth.obtain().await {
            Err(Error::TokenExchangeFailed { reason }) => {
                assert_eq!(reason, "invalid_grant: Bad Request");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"x","expires_in":9223372036854775807}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        let auth = Authenticator::new(secret(&server.url()), Arc::clone(&store), prompt(b"code\n"));

        match auth.obtain().await {
            Err(Error::TokenExchangeFailed { reason }) => {
                assert!(reason.contains("expires_in"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "keep-me".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"renewed","expires_in":3599}"#)
            .create_async()
            .await;

        let expired = Credential::new("stale")
            .with_refresh_token("keep-me")
            .with_expiry(Utc::now() - ChronoDuration::seconds(10));
        let store = Arc::new(MemoryCredentialStore::with_credential(expired));
        let auth = Authenticator::new(secret(&server.url()), Arc::clone(&store), prompt(b""));

        let credential = auth.obtain().await.unwrap();
        mock.assert_async().await;

        assert_eq!(credential.access_token, "renewed");
        assert_eq!(credential.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(store.load().unwrap().access_token, "renewed");
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_prompt() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let _exchange = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"from-code"}"#)
            .create_async()
            .await;

        let expired = Credential::new("stale")
            .with_refresh_token("revoked")
            .with_expiry(Utc::now() - ChronoDuration::seconds(10));
        let auth = Authenticator::new(
            secret(&server.url()),
            MemoryCredentialStore::with_credential(expired),
            prompt(b"code\n"),
        );

        let credential = auth.obtain().await.unwrap();
        assert_eq!(credential.access_token, "from-code");
    }

    struct PendingPrompt;

    #[async_trait]
    impl AuthorizationPrompt for PendingPrompt {
        async fn request_code(&self, _authorization_url: &Url) -> Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_timeout() {
        let auth = Authenticator::new(
            secret("http://127.0.0.1:1"),
            MemoryCredentialStore::new(),
            PendingPrompt,
        )
        .with_authorization_timeout(Duration::from_secs(5));

        let err = auth.obtain().await.unwrap_err();
        assert!(matches!(err, Error::TokenExchangeFailed { .. }));
    }
}
