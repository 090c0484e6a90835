//! Link lookup across recent messages.
//!
//! The [`LinkLocator`] is the main entry point for this crate. It provides
//! async methods to:
//!
//! - Find the action link in the newest email with a given subject
//! - Poll until such an email arrives
//!
//! # Example
//!
//! ```no_run
//! use mail_link::{LinkLocator, MailLinkConfig, TargetSubject};
//!
//! # async fn example() -> mail_link::Result<()> {
//! let config = MailLinkConfig::builder()
//!     .client_secret_path("client_secret.json")
//!     .build()?;
//!
//! let locator = LinkLocator::from_config(&config)?;
//! let link = locator.locate(&TargetSubject::PasswordReset).await?;
//! println!("Reset link: {link}");
//! # Ok(())
//! # }
//! ```

use crate::auth::{Authenticator, ClientSecret, LinePrompt};
use crate::config::{MailLinkConfig, PollingConfig, DEFAULT_CANDIDATES};
use crate::credential::FileCredentialStore;
use crate::decode::decode_body;
use crate::error::{Error, NotFoundReason, Result};
use crate::gateway::{GmailGateway, MailGateway, Message};
use crate::html::extract_links;
use crate::selector::{LinkSelector, NthLink};
use crate::subject::TargetSubject;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Finds action links in a mailbox.
///
/// Create with [`LinkLocator::from_config`] for Gmail, or
/// [`LinkLocator::new`] around any [`MailGateway`].
pub struct LinkLocator<G = GmailGateway> {
    gateway: G,
    selector: Box<dyn LinkSelector>,
    candidates: u32,
    polling: PollingConfig,
}

impl<G> std::fmt::Debug for LinkLocator<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkLocator")
            .field("selector", &self.selector.description())
            .field("candidates", &self.candidates)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl LinkLocator<GmailGateway> {
    /// Wires a Gmail-backed locator from configuration.
    ///
    /// Reads the client secret file, caches tokens at the configured path
    /// and prompts on stdin when an authorization code is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialUnavailable`] if the client secret cannot be
    /// loaded, or [`Error::InvalidConfig`] if the HTTP client cannot be built.
    pub fn from_config(config: &MailLinkConfig) -> Result<Self> {
        let secret = ClientSecret::from_file(&config.client_secret_path)?;

        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request)
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let auth = Authenticator::new(
            secret,
            FileCredentialStore::new(&config.token_cache_path),
            LinePrompt::stdin(),
        )
        .with_http_client(http.clone())
        .with_authorization_timeout(config.timeouts.authorization);

        let gateway =
            GmailGateway::new(auth, &config.api_base_url, config.user_id())?.with_http_client(http);

        Ok(Self::new(gateway)
            .with_candidates(config.candidates)
            .with_polling(config.polling.clone()))
    }
}

impl<G: MailGateway> LinkLocator<G> {
    /// Creates a locator with the default policy: inspect the two most
    /// recent messages and take the second link.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            selector: Box::new(NthLink::call_to_action()),
            candidates: DEFAULT_CANDIDATES,
            polling: PollingConfig::default(),
        }
    }

    /// Replaces the link selection policy.
    #[must_use]
    pub fn with_selector(mut self, selector: impl LinkSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// Sets how many recent messages are inspected.
    ///
    /// Zero is rejected by [`locate`](Self::locate) with
    /// [`Error::InvalidConfig`], matching [`MailLinkConfig`] validation.
    #[must_use]
    pub fn with_candidates(mut self, candidates: u32) -> Self {
        self.candidates = candidates;
        self
    }

    /// Sets polling configuration for [`wait_for_link`](Self::wait_for_link).
    #[must_use]
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Returns the underlying gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the link from the newest message titled `subject`.
    ///
    /// Recent messages are fetched newest first. The first one whose subject
    /// matches and whose body decodes decides the outcome: its links go
    /// through the selector and the selected URL is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkNotFound`] if no message matched, none of the
    /// matches had a usable body, or the selector rejected every link. Mail
    /// API and authentication errors are returned as-is. A locator set up
    /// with zero candidates fails with [`Error::InvalidConfig`].
    #[instrument(
        name = "LinkLocator::locate",
        skip(self, subject),
        fields(
            subject = %subject,
            candidates = self.candidates,
            selector = %self.selector.description()
        )
    )]
    pub async fn locate(&self, subject: &TargetSubject) -> Result<String> {
        if self.candidates == 0 {
            return Err(Error::InvalidConfig {
                message: "candidates must be at least 1".into(),
            });
        }

        let summaries = self.gateway.search(self.candidates).await?;
        debug!(found = summaries.len(), "Searched recent messages");

        let mut matched = 0_usize;

        for summary in summaries.iter().take(self.candidates as usize) {
            let message = self.gateway.fetch(&summary.id).await?;

            let is_match = message.subject().is_some_and(|value| subject.matches(value));
            if !is_match {
                debug!(message_id = %message.id, "Subject does not match");
                continue;
            }
            matched += 1;

            let html = match Self::message_text(&message) {
                Ok(Some(html)) => html,
                Ok(None) => {
                    warn!(message_id = %message.id, "Matching message has no body, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Undecodable body, skipping");
                    continue;
                }
            };

            let links = extract_links(&html);
            debug!(message_id = %message.id, links = links.len(), "Extracted links");

            return match self.selector.select(&links) {
                Some(link) => {
                    debug!(position = link.position, "Selected link");
                    Ok(link.url.clone())
                }
                None => Err(Error::LinkNotFound {
                    subject: subject.to_string(),
                    reason: NotFoundReason::TooFewLinks { found: links.len() },
                }),
            };
        }

        let reason = if matched == 0 {
            NotFoundReason::NoMatchingMessage
        } else {
            NotFoundReason::NoUsableContent
        };
        Err(Error::LinkNotFound {
            subject: subject.to_string(),
            reason,
        })
    }

    /// Calls [`locate`](Self::locate) until a link shows up.
    ///
    /// Only [`Error::LinkNotFound`] is retried, at the configured polling
    /// interval. Every other error ends the wait immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WaitTimeout`] if no link appears within the
    /// configured maximum wait.
    #[instrument(
        name = "LinkLocator::wait_for_link",
        skip(self, subject),
        fields(
            subject = %subject,
            max_wait_secs = self.polling.max_wait.as_secs()
        )
    )]
    pub async fn wait_for_link(&self, subject: &TargetSubject) -> Result<String> {
        let timeout = self.polling.max_wait;
        let poll_interval = self.polling.interval;
        // A wait too long to represent has no deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            match self.locate(subject).await {
                Ok(link) => return Ok(link),
                Err(e) if e.is_retryable() => {
                    debug!(attempts, reason = %e, "Link not there yet");
                }
                Err(e) => return Err(e),
            }

            if let Some(deadline) = deadline {
                let next_poll = Instant::now().checked_add(poll_interval);
                if !matches!(next_poll, Some(next) if next <= deadline) {
                    return Err(Error::WaitTimeout { timeout });
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    fn message_text(message: &Message) -> Result<Option<String>> {
        let Some(body) = &message.body else {
            return Ok(None);
        };
        decode_body(&body.data)
            .map(Some)
            .map_err(|source| Error::Decode {
                message_id: message.id.clone(),
                source,
            })
    }
}
