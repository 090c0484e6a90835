//! Command-line entry point: prints the requested link to stdout.
//!
//! Exit status is 0 on success, 2 when the email or its link is not there
//! (yet), and 1 for every other failure.

use clap::{Parser, ValueEnum};
use mail_link::{Error, LinkLocator, MailLinkConfig, TargetSubject, UrlPatternSelector};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SubjectKind {
    /// "Reset Password" email
    Reset,
    /// "Verify Your Email" email
    Verify,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Which email to read the link from
    #[arg(value_enum, required_unless_present = "subject", conflicts_with = "subject")]
    kind: Option<SubjectKind>,

    /// Look for an email with this exact subject instead
    #[arg(long)]
    subject: Option<String>,

    /// OAuth client secret JSON downloaded from the Google Cloud console
    #[arg(long, env = "MAIL_LINK_CLIENT_SECRET", default_value = "client_secret.json")]
    client_secret: PathBuf,

    /// Token cache file [default: ~/.credentials/mail-link-token.json]
    #[arg(long, env = "MAIL_LINK_TOKEN_CACHE")]
    token_cache: Option<PathBuf>,

    /// Mailbox to read ("me" or an email address)
    #[arg(long, env = "MAIL_LINK_USER", default_value = "me")]
    user: String,

    /// Number of recent messages to inspect
    #[arg(long, default_value_t = 2)]
    candidates: u32,

    /// Keep polling for up to this many seconds until the link shows up
    #[arg(long, value_name = "SECS")]
    wait: Option<u64>,

    /// Seconds between polls when --wait is given
    #[arg(long, value_name = "SECS", default_value_t = 3)]
    poll_interval: u64,

    /// Take the first link whose URL matches this regex instead of the second link
    #[arg(long, value_name = "REGEX")]
    link_pattern: Option<String>,
}

impl Cli {
    fn target(&self) -> TargetSubject {
        match (&self.subject, self.kind) {
            (Some(subject), _) => TargetSubject::Custom(subject.clone()),
            (None, Some(SubjectKind::Verify)) => TargetSubject::EmailVerification,
            (None, Some(SubjectKind::Reset) | None) => TargetSubject::PasswordReset,
        }
    }

    fn config(&self) -> mail_link::Result<MailLinkConfig> {
        let mut builder = MailLinkConfig::builder()
            .client_secret_path(&self.client_secret)
            .user_id(&self.user)
            .candidates(self.candidates)
            .poll_interval(Duration::from_secs(self.poll_interval));

        if let Some(path) = &self.token_cache {
            builder = builder.token_cache_path(path);
        }
        if let Some(secs) = self.wait {
            builder = builder.max_wait(Duration::from_secs(secs));
        }
        builder.build()
    }
}

async fn run(cli: &Cli) -> mail_link::Result<String> {
    let config = cli.config()?;
    let mut locator = LinkLocator::from_config(&config)?;

    if let Some(pattern) = &cli.link_pattern {
        let selector = UrlPatternSelector::new(pattern).map_err(|e| Error::InvalidConfig {
            message: format!("invalid --link-pattern: {e}"),
        })?;
        locator = locator.with_selector(selector);
    }

    let target = cli.target();
    tracing::info!(subject = %target, user = %config.user_id(), "Looking for link");

    if cli.wait.is_some() {
        locator.wait_for_link(&target).await
    } else {
        locator.locate(&target).await
    }
}

fn report(error: &Error) {
    eprintln!("error: {error}");
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_link=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(link) => {
            println!("{link}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(category = %e.category(), fatal = e.is_fatal(), "Lookup failed");
            report(&e);
            match e {
                Error::LinkNotFound { .. } | Error::WaitTimeout { .. } => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
