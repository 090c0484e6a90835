//! Basic example: Fetch the password-reset link from a Gmail mailbox.
//!
//! This example demonstrates the most common use case - authorizing against
//! Gmail and reading the call-to-action link of the newest "Reset Password"
//! email.
//!
//! # Usage
//!
//! ```bash
//! export MAIL_LINK_CLIENT_SECRET="client_secret.json"
//! cargo run --example reset_link
//! ```
//!
//! Create the client secret as an OAuth "Desktop app" client in the Google
//! Cloud console. On the first run the consent URL is printed; paste the code
//! you get back and the token is cached for later runs.

use mail_link::{LinkLocator, MailLinkConfig, TargetSubject};
use std::env;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> mail_link::Result<()> {
    let client_secret =
        env::var("MAIL_LINK_CLIENT_SECRET").unwrap_or_else(|_| "client_secret.json".into());

    // Token cache defaults to ~/.credentials/mail-link-token.json
    let config = MailLinkConfig::builder()
        .client_secret_path(client_secret)
        .max_wait(Duration::from_secs(60))
        .build()?;

    let locator = LinkLocator::from_config(&config)?;

    println!("Waiting for a \"Reset Password\" email (up to 60s)...");

    let link = locator.wait_for_link(&TargetSubject::PasswordReset).await?;

    println!("Reset link: {link}");

    Ok(())
}
