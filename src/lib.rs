//! # mail-link
//!
//! Fetch password-reset and email-verification links from a Gmail mailbox.
//!
//! End-to-end test suites that sign up or reset a password need the link the
//! application just emailed. This crate provides an async API for:
//! - Authorizing against Gmail over OAuth, with a cached and refreshed token
//! - Finding the newest email with a given subject among recent messages
//! - Extracting the action link from its HTML body
//!
//! ## Quick Start
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
//!
//! // Wait for the reset email and take its call-to-action link
//! let link = locator.wait_for_link(&TargetSubject::PasswordReset).await?;
//! println!("{link}");
//! # Ok(())
//! # }
//! ```
//!
//! On first use the consent URL is printed to stderr and the authorization
//! code is read from stdin. The resulting token is cached under
//! `~/.credentials/` and refreshed when it expires.
//!
//! ## Choosing the Link
//!
//! By default the second anchor of the email is returned, which is where
//! transactional templates put the action button. Other policies:
//!
//! ```
//! use mail_link::selector::{ClosureSelector, NthLink, UrlPatternSelector};
//!
//! let first = NthLink::first();
//! let on_domain = UrlPatternSelector::domain("example.com");
//! let by_regex = UrlPatternSelector::new(r"/reset\?token=").unwrap();
//! let custom = ClosureSelector::new(
//!     |links| links.iter().find(|l| l.url.contains("verify")),
//!     "verify link",
//! );
//! ```
//!
//! Pass any of them to [`LinkLocator::with_selector`].
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use
//! [`Error::is_retryable`] to tell "the email is not there yet" apart from
//! setup failures:
//!
//! ```
//! use mail_link::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Not there yet, try again: {}", error);
//!     } else {
//!         println!("Giving up ({}): {}", error.category(), error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Public operations emit spans
//! with structured fields; tokens and client secrets are never recorded.
//!
//! ### Span Naming Convention
//!
//! - `LinkLocator::locate` - One lookup over recent messages
//! - `LinkLocator::wait_for_link` - Polling for a link
//! - `Authenticator::obtain` - Credential resolution
//! - `GmailGateway::search` - Message listing
//! - `GmailGateway::fetch` - Message retrieval
//!
//! ### Standard Fields
//!
//! - `subject` - Target subject line
//! - `candidates` - Number of messages inspected
//! - `selector` - Link selector description
//! - `message_id` - Mail service message id
//! - `user` - Mailbox user id

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod auth;
pub mod config;
pub mod credential;
pub mod decode;
pub mod error;
pub mod gateway;
pub mod html;
pub mod selector;

// Internal modules
mod locator;
mod subject;

// Re-exports for ergonomic API
pub use auth::{AuthorizationPrompt, Authenticator, ClientSecret, LinePrompt};
pub use config::{MailLinkConfig, MailLinkConfigBuilder, PollingConfig, TimeoutConfig};
pub use credential::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, ErrorCategory, NotFoundReason, Result};
pub use gateway::{GmailGateway, MailGateway, Message, MessageSummary};
pub use html::ExtractedLink;
pub use locator::LinkLocator;
pub use selector::{LinkSelector, NthLink, UrlPatternSelector};
pub use subject::TargetSubject;
