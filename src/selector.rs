//! Link selection policies.
//!
//! An email usually carries several anchors (logo, call-to-action button,
//! footer links). A [`LinkSelector`] decides which one the caller gets.
//!
//! # Example
//!
//! ```
//! use mail_link::html::extract_links;
//! use mail_link::selector::{LinkSelector, NthLink, UrlPatternSelector};
//!
//! let links = extract_links(
//!     r#"<a href="https://example.com/">Logo</a>
//!        <a href="https://example.com/reset?token=abc">Reset</a>"#,
//! );
//!
//! let cta = NthLink::call_to_action();
//! assert_eq!(cta.select(&links).unwrap().url, "https://example.com/reset?token=abc");
//!
//! let by_pattern = UrlPatternSelector::new(r"token=").unwrap();
//! assert_eq!(by_pattern.select(&links).unwrap().url, "https://example.com/reset?token=abc");
//! ```

use crate::html::ExtractedLink;
use regex::Regex;

/// Picks one link out of the links extracted from a message.
///
/// Implement this trait to define custom selection logic.
///
/// # Example
///
/// ```
/// use mail_link::html::ExtractedLink;
/// use mail_link::selector::LinkSelector;
///
/// struct LastLink;
///
/// impl LinkSelector for LastLink {
///     fn select<'a>(&self, links: &'a [ExtractedLink]) -> Option<&'a ExtractedLink> {
///         links.last()
///     }
///
///     fn description(&self) -> &str {
///         "last link"
///     }
/// }
/// ```
pub trait LinkSelector: Send + Sync {
    /// Returns the chosen link, or `None` if no link qualifies.
    fn select<'a>(&self, links: &'a [ExtractedLink]) -> Option<&'a ExtractedLink>;

    /// Returns a human-readable description of the policy.
    ///
    /// Used in logging and error messages.
    fn description(&self) -> &str;
}

/// Selects the link at a fixed position in document order.
#[derive(Debug, Clone)]
pub struct NthLink {
    index: usize,
    description: String,
}

impl NthLink {
    /// Selects the link at zero-based `index`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            description: format!("link #{index}"),
        }
    }

    /// Selects the first link.
    #[must_use]
    pub fn first() -> Self {
        Self::new(0)
    }

    /// Selects the second link.
    ///
    /// Transactional templates put a logo or header link first, so the
    /// action button is the second anchor. This is the default policy.
    #[must_use]
    pub fn call_to_action() -> Self {
        Self {
            index: 1,
            description: "second link (call to action)".into(),
        }
    }

    /// Returns the zero-based index this selector picks.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Default for NthLink {
    fn default() -> Self {
        Self::call_to_action()
    }
}

impl LinkSelector for NthLink {
    fn select<'a>(&self, links: &'a [ExtractedLink]) -> Option<&'a ExtractedLink> {
        links.get(self.index)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Selects the first link whose URL matches a regex.
#[derive(Debug, Clone)]
pub struct UrlPatternSelector {
    regex: Regex,
    description: String,
}

impl UrlPatternSelector {
    /// Creates a selector for URLs matching `pattern` anywhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(Self {
            description: format!("URL matching {pattern}"),
            regex,
        })
    }

    /// Creates a selector for http(s) URLs on `domain` or one of its subdomains.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern cannot be compiled (should not happen, the domain is escaped).
    ///
    /// # Example
    ///
    /// ```
    /// use mail_link::html::extract_links;
    /// use mail_link::selector::{LinkSelector, UrlPatternSelector};
    ///
    /// let links = extract_links(
    ///     r#"<a href="https://cdn.other.com/x">x</a><a href="https://app.example.com/verify">v</a>"#,
    /// );
    /// let selector = UrlPatternSelector::domain("example.com");
    /// assert_eq!(selector.select(&links).unwrap().url, "https://app.example.com/verify");
    /// ```
    #[must_use]
    pub fn domain(domain: &str) -> Self {
        let pattern = format!(
            r"(?i)^https?://([^/?#@]+\.)?{}(:\d+)?([/?#]|$)",
            regex::escape(domain)
        );
        Self {
            regex: Regex::new(&pattern).expect("valid regex"),
            description: format!("URL on {domain}"),
        }
    }
}

impl LinkSelector for UrlPatternSelector {
    fn select<'a>(&self, links: &'a [ExtractedLink]) -> Option<&'a ExtractedLink> {
        links.iter().find(|link| self.regex.is_match(&link.url))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Selector using a closure for custom selection logic.
///
/// # Example
///
/// ```
/// use mail_link::html::extract_links;
/// use mail_link::selector::{ClosureSelector, LinkSelector};
///
/// let selector = ClosureSelector::new(
///     |links| links.iter().rev().find(|l| l.url.starts_with("https://")),
///     "last https link",
/// );
///
/// let links = extract_links(r#"<a href="https://a/">a</a><a href="https://b/">b</a>"#);
/// assert_eq!(selector.select(&links).unwrap().url, "https://b/");
/// ```
pub struct ClosureSelector<F>
where
    F: for<'a> Fn(&'a [ExtractedLink]) -> Option<&'a ExtractedLink> + Send + Sync,
{
    selector_fn: F,
    description: String,
}

impl<F> ClosureSelector<F>
where
    F: for<'a> Fn(&'a [ExtractedLink]) -> Option<&'a ExtractedLink> + Send + Sync,
{
    /// Creates a new closure-based selector.
    #[must_use]
    pub fn new(selector_fn: F, description: impl Into<String>) -> Self {
        Self {
            selector_fn,
            description: description.into(),
        }
    }
}

impl<F> LinkSelector for ClosureSelector<F>
where
    F: for<'a> Fn(&'a [ExtractedLink]) -> Option<&'a ExtractedLink> + Send + Sync,
{
    fn select<'a>(&self, links: &'a [ExtractedLink]) -> Option<&'a ExtractedLink> {
        (self.selector_fn)(links)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<F> std::fmt::Debug for ClosureSelector<F>
where
    F: for<'a> Fn(&'a [ExtractedLink]) -> Option<&'a ExtractedLink> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureSelector")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
