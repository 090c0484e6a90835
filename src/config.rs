//! Configuration for the link locator.
//!
//! Use [`MailLinkConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use mail_link::MailLinkConfig;
//!
//! let config = MailLinkConfig::builder()
//!     .client_secret_path("client_secret.json")
//!     .token_cache_path("/tmp/mail-link-token.json")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.user_id(), "me");
//! assert_eq!(config.candidates, 2);
//! ```

use crate::credential::FileCredentialStore;
use crate::error::{Error, Result};
use email_address::EmailAddress;
use std::path::PathBuf;
use std::time::Duration;

/// Gmail REST API root.
pub const DEFAULT_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// Mailbox user id meaning "the authenticated account".
pub const AUTHENTICATED_USER: &str = "me";

/// Number of recent messages inspected per lookup.
pub const DEFAULT_CANDIDATES: u32 = 2;

/// Configuration for locating links in one mailbox.
///
/// Create using [`MailLinkConfig::builder()`].
#[derive(Debug, Clone)]
pub struct MailLinkConfig {
    /// Path of the Google OAuth client secret JSON file.
    pub client_secret_path: PathBuf,
    /// Path of the token cache file.
    pub token_cache_path: PathBuf,
    /// Mailbox user id (`me` or a validated email address).
    user_id: String,
    /// Gmail REST API root, without trailing slash.
    pub api_base_url: String,
    /// How many recent messages to inspect.
    pub candidates: u32,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Polling configuration for waiting operations.
    pub polling: PollingConfig,
}

impl MailLinkConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> MailLinkConfigBuilder {
        MailLinkConfigBuilder::default()
    }

    /// Returns the mailbox user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for each HTTP request to the mail and token endpoints.
    pub request: Duration,
    /// How long to wait for the user to paste an authorization code.
    pub authorization: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            authorization: Duration::from_secs(300),
        }
    }
}

/// Polling configuration for wait operations.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval between lookups when waiting for an email.
    pub interval: Duration,
    /// Maximum time to wait for the link to show up.
    pub max_wait: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Validates a mailbox user id.
///
/// `me` is accepted as-is; anything else must be an email address.
fn validate_user_id(user_id: &str) -> Result<String> {
    if user_id == AUTHENTICATED_USER {
        return Ok(user_id.to_string());
    }
    EmailAddress::parse_with_options(user_id, email_address::Options::default())
        .map(|email| email.as_str().to_string())
        .map_err(|_| Error::InvalidConfig {
            message: format!("user id '{user_id}' is neither 'me' nor an email address"),
        })
}

/// Builder for [`MailLinkConfig`].
#[derive(Debug, Default)]
pub struct MailLinkConfigBuilder {
    client_secret_path: Option<PathBuf>,
    token_cache_path: Option<PathBuf>,
    user_id: Option<String>,
    api_base_url: Option<String>,
    candidates: Option<u32>,
    timeouts: Option<TimeoutConfig>,
    polling: Option<PollingConfig>,
}

impl MailLinkConfigBuilder {
    /// Sets the client secret file path (required).
    #[must_use]
    pub fn client_secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secret_path = Some(path.into());
        self
    }

    /// Sets the token cache path.
    ///
    /// Defaults to [`FileCredentialStore::default_path()`].
    #[must_use]
    pub fn token_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache_path = Some(path.into());
        self
    }

    /// Sets the mailbox user id. Default is `me`.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the mail API root, e.g. to point at a local fake.
    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sets how many recent messages are inspected per lookup. Default is 2.
    #[must_use]
    pub fn candidates(mut self, candidates: u32) -> Self {
        self.candidates = Some(candidates);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .request = timeout;
        self
    }

    /// Sets how long the interactive authorization may take.
    #[must_use]
    pub fn authorization_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .authorization = timeout;
        self
    }

    /// Sets polling configuration.
    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Sets the polling interval for wait operations.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Sets the maximum wait time for wait operations.
    #[must_use]
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .max_wait = max_wait;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<MailLinkConfig> {
        let client_secret_path = self.client_secret_path.ok_or_else(|| Error::InvalidConfig {
            message: "client secret path is required".into(),
        })?;

        let token_cache_path = match self.token_cache_path {
            Some(path) => path,
            None => FileCredentialStore::default_path()?,
        };

        let user_id = validate_user_id(self.user_id.as_deref().unwrap_or(AUTHENTICATED_USER))?;

        let candidates = self.candidates.unwrap_or(DEFAULT_CANDIDATES);
        if candidates == 0 {
            return Err(Error::InvalidConfig {
                message: "candidates must be at least 1".into(),
            });
        }

        let api_base_url = self
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&api_base_url).map_err(|e| Error::InvalidConfig {
            message: format!("invalid API base URL '{api_base_url}': {e}"),
        })?;

        let polling = self.polling.unwrap_or_default();
        if polling.interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll interval must be non-zero".into(),
            });
        }

        Ok(MailLinkConfig {
            client_secret_path,
            token_cache_path,
            user_id,
            api_base_url,
            candidates,
            timeouts: self.timeouts.unwrap_or_default(),
            polling,
        })
    }
}
