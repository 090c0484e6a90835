//! Example: Using tracing for observability.
//!
//! This example demonstrates how to enable structured logging using
//! the `tracing` ecosystem. Lookups, authorization and every Gmail API call
//! emit tracing spans and events.
//!
//! # Usage
//!
//! ```bash
//! export MAIL_LINK_CLIENT_SECRET="client_secret.json"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=mail_link=debug
//!
//! cargo run --example with_tracing
//! ```

use mail_link::{LinkLocator, MailLinkConfig, TargetSubject};
use std::env;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> mail_link::Result<()> {
    // Initialize tracing subscriber with environment filter
    // Use RUST_LOG environment variable to control log levels
    // Example: RUST_LOG=mail_link=debug,info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_link=debug")),
        )
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let client_secret =
        env::var("MAIL_LINK_CLIENT_SECRET").unwrap_or_else(|_| "client_secret.json".into());

    tracing::info!(client_secret = %client_secret, "Starting mail-link example");

    let config = MailLinkConfig::builder()
        .client_secret_path(client_secret)
        .build()?;

    tracing::debug!(?config, "Configuration built successfully");

    // Emits spans for the lookup, credential resolution, search and each fetch
    let locator = LinkLocator::from_config(&config)?;

    match locator.locate(&TargetSubject::PasswordReset).await {
        Ok(link) => {
            tracing::info!(link = %link, "Found reset link");
            println!("\nFound link: {link}");
        }
        Err(e) => {
            tracing::warn!(error = %e, category = %e.category(), "No reset link found");
            println!("\nNo link found: {e}");
        }
    }

    tracing::info!("Example completed successfully");

    Ok(())
}
