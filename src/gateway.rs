//! Mail service access.
//!
//! [`MailGateway`] is the seam between the locator and the mail service: it
//! lists recent messages and fetches one message with its headers and body.
//! [`GmailGateway`] implements it over the Gmail REST API.

use crate::auth::Authenticator;
use crate::credential::Credential;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

// ─────────────────────────────────────────────────────────────────────────────
// Message model
// ─────────────────────────────────────────────────────────────────────────────

/// A search hit: enough to fetch the full message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Message id.
    pub id: String,
    /// Thread id, when the service reports one.
    pub thread_id: Option<String>,
}

impl MessageSummary {
    /// Creates a summary for message `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

/// A message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as sent.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// The body payload selected for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Base64url-encoded content.
    pub data: String,
    /// MIME type of the part the data came from.
    pub mime_type: Option<String>,
}

/// A fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message id.
    pub id: String,
    /// Headers in the order the service returned them.
    pub headers: Vec<Header>,
    /// Body payload, if the message had a readable one.
    pub body: Option<Body>,
}

impl Message {
    /// Returns the value of the first header called `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns the `Subject` header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }
}

/// Read access to a mailbox.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Lists up to `max_results` of the most recent messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailApi`] or [`Error::MailApiStatus`] if the request fails.
    async fn search(&self, max_results: u32) -> Result<Vec<MessageSummary>>;

    /// Fetches message `id` with headers and body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailApi`] or [`Error::MailApiStatus`] if the request fails.
    async fn fetch(&self, id: &str) -> Result<Message>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Gmail wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<WireHeader>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct WireHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    attachment_id: Option<String>,
    data: Option<String>,
}

impl MessagePart {
    /// Inline data of this part, ignoring attachments and empty bodies.
    fn inline_data(&self) -> Option<&str> {
        let body = self.body.as_ref()?;
        if body.attachment_id.is_some() {
            return None;
        }
        body.data.as_deref().filter(|data| !data.is_empty())
    }

    fn find_part(&self, mime_type: &str) -> Option<&MessagePart> {
        self.parts.iter().find_map(|part| {
            let is_match = part
                .mime_type
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(mime_type));
            if is_match && part.inline_data().is_some() {
                Some(part)
            } else {
                part.find_part(mime_type)
            }
        })
    }

    /// Picks the body: top-level data, else the HTML part, else the plain-text part.
    fn select_body(&self) -> Option<Body> {
        if let Some(data) = self.inline_data() {
            return Some(Body {
                data: data.to_string(),
                mime_type: self.mime_type.clone(),
            });
        }

        let part = self
            .find_part("text/html")
            .or_else(|| self.find_part("text/plain"))?;
        Some(Body {
            data: part.inline_data()?.to_string(),
            mime_type: part.mime_type.clone(),
        })
    }
}

impl From<GmailMessage> for Message {
    fn from(message: GmailMessage) -> Self {
        let (headers, body) = match message.payload {
            Some(payload) => {
                let body = payload.select_body();
                let headers = payload
                    .headers
                    .into_iter()
                    .map(|h| Header {
                        name: h.name,
                        value: h.value,
                    })
                    .collect();
                (headers, body)
            }
            None => (Vec::new(), None),
        };

        Message {
            id: message.id,
            headers,
            body,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gmail gateway
// ─────────────────────────────────────────────────────────────────────────────

/// [`MailGateway`] over the Gmail REST API.
///
/// The bearer token comes from the [`Authenticator`] on first use and is
/// reused until it expires.
#[derive(Debug)]
pub struct GmailGateway {
    http: reqwest::Client,
    auth: Authenticator,
    base_url: Url,
    user_id: String,
    credential: Mutex<Option<Credential>>,
}

impl GmailGateway {
    /// Creates a gateway for mailbox `user_id` under API root `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `base_url` is not an absolute URL.
    pub fn new(auth: Authenticator, base_url: &str, user_id: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| Error::InvalidConfig {
                message: format!("invalid mail API base URL '{base_url}'"),
            })?;

        Ok(Self {
            http: reqwest::Client::new(),
            auth,
            base_url,
            user_id: user_id.into(),
            credential: Mutex::new(None),
        })
    }

    /// Uses `http` for mail API requests.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Returns the mailbox user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.credential.lock().await;
        if let Some(credential) = cached.as_ref().filter(|c| c.is_valid()) {
            return Ok(credential.access_token.clone());
        }

        let credential = self.auth.obtain().await?;
        let token = credential.access_token.clone();
        *cached = Some(credential);
        Ok(token)
    }

    fn messages_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", self.user_id.as_str(), "messages"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    async fn get_json<T>(&self, operation: &'static str, url: Url) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| Error::MailApi { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::MailApiStatus {
                operation,
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|source| Error::MailApi { operation, source })
    }
}

#[async_trait]
impl MailGateway for GmailGateway {
    #[instrument(name = "GmailGateway::search", skip(self), fields(user = %self.user_id))]
    async fn search(&self, max_results: u32) -> Result<Vec<MessageSummary>> {
        let mut url = self.messages_url(None);
        url.query_pairs_mut()
            .append_pair("maxResults", &max_results.to_string());

        let list: ListMessagesResponse = self.get_json("search", url).await?;
        debug!(count = list.messages.len(), "Listed messages");

        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageSummary {
                id: m.id,
                thread_id: m.thread_id,
            })
            .collect())
    }

    #[instrument(
        name = "GmailGateway::fetch",
        skip(self, id),
        fields(user = %self.user_id, message_id = %id)
    )]
    async fn fetch(&self, id: &str) -> Result<Message> {
        let mut url = self.messages_url(Some(id));
        url.query_pairs_mut().append_pair("format", "full");

        let message: GmailMessage = self.get_json("fetch", url).await?;
        let message = Message::from(message);
        debug!(
            headers = message.headers.len(),
            has_body = message.body.is_some(),
            "Fetched message"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ClientSecret, LinePrompt};
    use crate::credential::MemoryCredentialStore;
    use mockito::Matcher;

    fn gateway(server_url: &str) -> GmailGateway {
        let secret = ClientSecret::new(
            "client",
            "secret",
            "https://accounts.google.com/o/oauth2/auth",
            &format!("{server_url}/token"),
        )
        .unwrap();
        let auth = Authenticator::new(
            secret,
            MemoryCredentialStore::with_credential(Credential::new("test_token")),
            LinePrompt::new(&b""[..]),
        );
        GmailGateway::new(auth, &format!("{server_url}/gmail/v1"), "me").unwrap()
    }

    fn parse(json: &str) -> Message {
        Message::from(serde_json::from_str::<GmailMessage>(json).unwrap())
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let message = parse(
            r#"{"id": "m1", "payload": {"headers": [
                {"name": "From", "value": "noreply@example.com"},
                {"name": "subject", "value": "Reset Password"}
            ]}}"#,
        );
        assert_eq!(message.subject(), Some("Reset Password"));
        assert_eq!(message.header("FROM"), Some("noreply@example.com"));
        assert_eq!(message.header("To"), None);
    }

    #[test]
    fn test_top_level_body() {
        let message = parse(
            r#"{"id": "m1", "payload": {"mimeType": "text/html", "body": {"size": 4, "data": "PGI-"}}}"#,
        );
        let body = message.body.unwrap();
        assert_eq!(body.data, "PGI-");
        assert_eq!(body.mime_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_multipart_prefers_html() {
        let message = parse(
            r#"{"id": "m1", "payload": {
                "mimeType": "multipart/alternative",
                "body": {"size": 0},
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "cGxhaW4"}},
                    {"mimeType": "text/html", "body": {"data": "aHRtbA"}}
                ]
            }}"#,
        );
        assert_eq!(message.body.unwrap().data, "aHRtbA");
    }

    #[test]
    fn test_nested_parts_and_attachments() {
        let message = parse(
            r#"{"id": "m1", "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    {"mimeType": "multipart/alternative", "parts": [
                        {"mimeType": "text/html", "body": {"attachmentId": "att1", "data": "YXR0"}},
                        {"mimeType": "text/plain", "body": {"data": "cGxhaW4"}}
                    ]},
                    {"mimeType": "application/pdf", "filename": "x.pdf", "body": {"attachmentId": "att2"}}
                ]
            }}"#,
        );
        let body = message.body.unwrap();
        assert_eq!(body.data, "cGxhaW4");
        assert_eq!(body.mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_no_payload() {
        let message = parse(r#"{"id": "m1"}"#);
        assert!(message.headers.is_empty());
        assert!(message.body.is_none());
    }

    #[tokio::test]
    async fn test_search() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(Matcher::UrlEncoded("maxResults".into(), "2".into()))
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"messages": [{"id": "m2", "threadId": "t2"}, {"id": "m1", "threadId": "t1"}], "resultSizeEstimate": 2}"#,
            )
            .create_async()
            .await;

        let summaries = gateway(&server.url()).search(2).await.unwrap();
        mock.assert_async().await;

        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m1"]);
        assert_eq!(summaries[0].thread_id.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_search_empty_mailbox() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"resultSizeEstimate": 0}"#)
            .create_async()
            .await;

        let summaries = gateway(&server.url()).search(2).await.unwrap();
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn test_fetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gmail/v1/users/me/messages/m1")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": "m1", "threadId": "t1", "payload": {
                    "mimeType": "text/html",
                    "headers": [{"name": "Subject", "value": "Verify Your Email"}],
                    "body": {"size": 4, "data": "PGI-"}
                }}"#,
            )
            .create_async()
            .await;

        let message = gateway(&server.url()).fetch("m1").await.unwrap();
        mock.assert_async().await;

        assert_eq!(message.id, "m1");
        assert_eq!(message.subject(), Some("Verify Your Email"));
        assert_eq!(message.body.unwrap().data, "PGI-");
    }

    #[tokio::test]
    async fn test_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "Unauthorized"}}"#)
            .create_async()
            .await;

        let err = gateway(&server.url()).search(2).await.unwrap_err();
        match &err {
            Error::MailApiStatus {
                operation,
                status,
                message,
            } => {
                assert_eq!(*operation, "search");
                assert_eq!(*status, 401);
                assert!(message.contains("Unauthorized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gmail/v1/users/me/messages/m1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = gateway(&server.url()).fetch("m1").await.unwrap_err();
        assert!(matches!(err, Error::MailApi { operation: "fetch", .. }));
    }

    #[test]
    fn test_invalid_base_url() {
        let secret = ClientSecret::new("c", "s", "https://a.example/auth", "https://a.example/token")
            .unwrap();
        let auth = Authenticator::new(
            secret,
            MemoryCredentialStore::new(),
            LinePrompt::new(&b""[..]),
        );
        assert!(GmailGateway::new(auth, "not a url", "me").is_err());
    }
}
