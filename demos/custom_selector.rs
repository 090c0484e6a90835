//! Example: Choosing which link to return.
//!
//! The default policy returns the second anchor of the email. This example
//! shows the alternatives:
//! - `UrlPatternSelector` for regex or domain based selection
//! - `ClosureSelector` for arbitrary logic
//! - `TargetSubject::Custom` for templates with other subjects
//!
//! # Usage
//!
//! ```bash
//! export MAIL_LINK_CLIENT_SECRET="client_secret.json"
//! export APP_DOMAIN="example.com"
//! cargo run --example custom_selector
//! ```

use mail_link::html::extract_links;
use mail_link::selector::ClosureSelector;
use mail_link::{LinkLocator, LinkSelector, MailLinkConfig, TargetSubject, UrlPatternSelector};
use std::env;

/// Picks the link that carries a token query parameter
fn token_link_selector() -> impl LinkSelector {
    ClosureSelector::new(
        |links| {
            links.iter().find(|link| {
                url::Url::parse(&link.url)
                    .map(|url| url.query_pairs().any(|(key, _)| key == "token"))
                    .unwrap_or(false)
            })
        },
        "link with a token parameter",
    )
}

fn show_offline() {
    let html = r#"
        <a href="https://example.com/"><img src="logo.png"></a>
        <a href="https://app.example.com/confirm?token=abc123">Confirm</a>
        <a href="https://example.com/unsubscribe">Unsubscribe</a>
    "#;
    let links = extract_links(html);

    println!("Extracted {} links:", links.len());
    for link in &links {
        println!("  #{}: {}", link.position, link.url);
    }

    let selectors: Vec<Box<dyn LinkSelector>> = vec![
        Box::new(UrlPatternSelector::domain("app.example.com")),
        Box::new(UrlPatternSelector::new(r"/unsubscribe$").expect("valid regex")),
        Box::new(token_link_selector()),
    ];
    for selector in &selectors {
        let picked = selector.select(&links).map_or("-", |link| link.url.as_str());
        println!("{:>30} -> {}", selector.description(), picked);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> mail_link::Result<()> {
    show_offline();

    let Ok(client_secret) = env::var("MAIL_LINK_CLIENT_SECRET") else {
        println!("\nSet MAIL_LINK_CLIENT_SECRET to query a real mailbox.");
        return Ok(());
    };
    let domain = env::var("APP_DOMAIN").unwrap_or_else(|_| "example.com".into());

    let config = MailLinkConfig::builder()
        .client_secret_path(client_secret)
        .candidates(5)
        .build()?;

    let locator =
        LinkLocator::from_config(&config)?.with_selector(UrlPatternSelector::domain(&domain));

    let subject = TargetSubject::Custom("Confirm your account".into());
    match locator.locate(&subject).await {
        Ok(link) => println!("\nConfirmation link: {link}"),
        Err(e) => println!("\nNo confirmation link: {e}"),
    }

    Ok(())
}
