//! Error types for the mail-link crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Setup and transport failures are fatal (see [`Error::is_fatal`]); a missing link is
//! reported as [`Error::LinkNotFound`] so callers can poll again (see [`Error::is_retryable`]).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating a link.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration errors (fatal)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The OAuth client secret file could not be read or parsed.
    #[error("client secret unavailable at {}", path.display())]
    CredentialUnavailable {
        /// Path of the client secret file.
        path: PathBuf,
        /// The underlying read or parse error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication errors (fatal)
    // ─────────────────────────────────────────────────────────────────────────
    /// The authorization-code grant or token refresh failed.
    #[error("token exchange failed: {reason}")]
    TokenExchangeFailed {
        /// What went wrong during the exchange.
        reason: String,
    },

    /// The token endpoint could not be reached.
    #[error("token endpoint request failed")]
    TokenEndpoint {
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The credential could not be written to the token cache.
    #[error("failed to write token cache {}", path.display())]
    TokenCache {
        /// Path of the token cache file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Mail API errors (fatal, never retried)
    // ─────────────────────────────────────────────────────────────────────────
    /// A mail API request failed in transport or its response could not be decoded.
    #[error("mail API {operation} request failed")]
    MailApi {
        /// The API operation (`search` or `fetch`).
        operation: &'static str,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The mail API answered with a non-success status.
    #[error("mail API {operation} returned {status}: {message}")]
    MailApiStatus {
        /// The API operation (`search` or `fetch`).
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the service.
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Content errors (local)
    // ─────────────────────────────────────────────────────────────────────────
    /// A message body was not valid base64url.
    #[error("failed to decode body of message {message_id}")]
    Decode {
        /// The message whose body failed to decode.
        message_id: String,
        /// The underlying decode error.
        #[source]
        source: base64::DecodeError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup errors (returned to the caller)
    // ─────────────────────────────────────────────────────────────────────────
    /// No qualifying link was found.
    #[error("no link found for subject '{subject}': {reason}")]
    LinkNotFound {
        /// The subject that was searched for.
        subject: String,
        /// Why the lookup came up empty.
        reason: NotFoundReason,
    },

    /// Timeout waiting for a link to show up.
    #[error("timeout waiting for link after {timeout:?}")]
    WaitTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },
}

/// Why [`Error::LinkNotFound`] was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No candidate message carried the target subject.
    NoMatchingMessage,
    /// Matching messages existed but none had a decodable body.
    NoUsableContent,
    /// The matching message did not contain a link the selector accepted.
    TooFewLinks {
        /// Number of links extracted from the message.
        found: usize,
    },
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundReason::NoMatchingMessage => write!(f, "no message with a matching subject"),
            NotFoundReason::NoUsableContent => write!(f, "matching message had no usable content"),
            NotFoundReason::TooFewLinks { found } => {
                write!(f, "matching message had {found} link(s), none selected")
            }
        }
    }
}

impl Error {
    /// Returns `true` if retrying the whole lookup later might succeed.
    ///
    /// Only [`Error::LinkNotFound`] qualifies: the email may simply not have
    /// arrived yet. Infrastructure failures are never retried automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LinkNotFound { .. })
    }

    /// Returns `true` for unrecoverable setup, authentication and transport errors.
    ///
    /// A binary should abort on these; business outcomes (`LinkNotFound`,
    /// `WaitTimeout`) and local decode failures are not fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidConfig { .. }
            | Error::CredentialUnavailable { .. }
            | Error::TokenExchangeFailed { .. }
            | Error::TokenEndpoint { .. }
            | Error::TokenCache { .. }
            | Error::MailApi { .. }
            | Error::MailApiStatus { .. } => true,

            Error::Decode { .. } | Error::LinkNotFound { .. } | Error::WaitTimeout { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig { .. } | Error::CredentialUnavailable { .. } => {
                ErrorCategory::Configuration
            }

            Error::TokenExchangeFailed { .. }
            | Error::TokenEndpoint { .. }
            | Error::TokenCache { .. } => ErrorCategory::Authentication,

            Error::MailApi { .. } | Error::MailApiStatus { .. } => ErrorCategory::MailApi,

            Error::Decode { .. } => ErrorCategory::Decode,

            Error::LinkNotFound { .. } => ErrorCategory::NotFound,

            Error::WaitTimeout { .. } => ErrorCategory::Timeout,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or client secret errors.
    Configuration,
    /// OAuth token acquisition or caching errors.
    Authentication,
    /// Mail service request errors.
    MailApi,
    /// Body decoding errors.
    Decode,
    /// No qualifying link found.
    NotFound,
    /// Timeout errors.
    Timeout,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::MailApi => write!(f, "mail_api"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Timeout => write!(f, "timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(reason: NotFoundReason) -> Error {
        Error::LinkNotFound {
            subject: "Reset Password".into(),
            reason,
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(not_found(NotFoundReason::NoMatchingMessage).is_retryable());

        let err = Error::TokenExchangeFailed {
            reason: "closed".into(),
        };
        assert!(!err.is_retryable());

        let err = Error::MailApiStatus {
            operation: "search",
            status: 401,
            message: "unauthorized".into(),
        };
        assert!(!err.is_retryable());

        let err = Error::WaitTimeout {
            timeout: Duration::from_secs(30),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_fatal_split() {
        let err = Error::CredentialUnavailable {
            path: PathBuf::from("client_secret.json"),
            source: Box::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        assert!(err.is_fatal());

        let err = Error::MailApiStatus {
            operation: "fetch",
            status: 500,
            message: "backend".into(),
        };
        assert!(err.is_fatal());

        assert!(!not_found(NotFoundReason::TooFewLinks { found: 1 }).is_fatal());

        let err = Error::Decode {
            message_id: "m1".into(),
            source: base64::DecodeError::InvalidByte(0, b'*'),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidConfig {
            message: "bad".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::TokenExchangeFailed {
            reason: "denied".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Authentication);

        assert_eq!(
            not_found(NotFoundReason::NoUsableContent).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(ErrorCategory::MailApi.to_string(), "mail_api");
    }

    #[test]
    fn test_not_found_message() {
        let err = not_found(NotFoundReason::TooFewLinks { found: 1 });
        assert_eq!(
            err.to_string(),
            "no link found for subject 'Reset Password': matching message had 1 link(s), none selected"
        );
    }
}
