//! Example: Proper error handling with retries.
//!
//! This example demonstrates how to react to each error category, and how
//! to poll by hand instead of using `wait_for_link`.
//!
//! # Usage
//!
//! ```bash
//! export MAIL_LINK_CLIENT_SECRET="client_secret.json"
//! cargo run --example error_handling
//! ```

use mail_link::{Error, ErrorCategory, LinkLocator, MailLinkConfig, NotFoundReason, TargetSubject};
use std::env;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Locate with backoff while the email has not arrived yet
async fn locate_with_retry(locator: &LinkLocator, subject: &TargetSubject) -> Result<String, Error> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        println!("Lookup attempt {attempt}/{MAX_ATTEMPTS}...");

        match locator.locate(subject).await {
            Ok(link) => return Ok(link),
            Err(e) => {
                println!("  Error: {e}");
                println!("  Category: {}", e.category());
                println!("  Retryable: {}", e.is_retryable());

                if e.is_retryable() && attempt < MAX_ATTEMPTS {
                    println!("  Retrying in {backoff:?}...");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2; // Exponential backoff
                    attempt += 1;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

fn explain(error: &Error) {
    match error.category() {
        ErrorCategory::Configuration => {
            println!("Configuration problem - check the client secret path and options");
        }
        ErrorCategory::Authentication => {
            println!("Authorization failed - delete the token cache and authorize again");
        }
        ErrorCategory::MailApi => {
            println!("Gmail API request failed - check scopes and network");
        }
        ErrorCategory::Decode => {
            println!("A message body could not be decoded");
        }
        ErrorCategory::NotFound => match error {
            Error::LinkNotFound {
                reason: NotFoundReason::TooFewLinks { found },
                ..
            } => println!("The email arrived but had only {found} link(s) - template changed?"),
            _ => println!("The email has not arrived (this is normal right after triggering it)"),
        },
        ErrorCategory::Timeout => println!("Gave up waiting"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let client_secret =
        env::var("MAIL_LINK_CLIENT_SECRET").unwrap_or_else(|_| "client_secret.json".into());

    println!("mail-link - Error Handling Example\n");
    println!("==================================\n");

    // Build configuration
    let config = match MailLinkConfig::builder()
        .client_secret_path(client_secret)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("This error is NOT retryable - fix your configuration");
            std::process::exit(1);
        }
    };

    let locator = match LinkLocator::from_config(&config) {
        Ok(locator) => locator,
        Err(e) => {
            eprintln!("Setup failed: {e}");
            explain(&e);
            std::process::exit(1);
        }
    };

    match locate_with_retry(&locator, &TargetSubject::EmailVerification).await {
        Ok(link) => println!("\nVerification link: {link}"),
        Err(e) => {
            eprintln!("\nLookup failed: {e}");
            explain(&e);
            std::process::exit(if e.is_fatal() { 1 } else { 2 });
        }
    }
}
