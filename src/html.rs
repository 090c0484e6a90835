//! HTML tag scanning and anchor extraction.
//!
//! [`Document::tags`] yields the tags of an HTML document lazily, in document
//! order, without building a tree. Link extraction is a filter over that
//! sequence, so it never depends on how the scanner is implemented.
//!
//! The scanner is forgiving: comments, doctypes and the contents of
//! `<script>`/`<style>` are skipped, a stray `<` is treated as text, and a tag
//! that is still open at the end of the input is dropped.
//!
//! # Example
//!
//! ```
//! use mail_link::html::extract_links;
//!
//! let html = r#"<a href="http://x/logo"><img src="logo.png"></a>
//!               <a href="http://x/reset?tok=123&amp;u=7">Reset</a>"#;
//! let links: Vec<_> = extract_links(html).into_iter().map(|l| l.url).collect();
//! assert_eq!(links, ["http://x/logo", "http://x/reset?tok=123&u=7"]);
//! ```

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Whether a tag opens, closes, or opens-and-closes an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `<name ...>`
    Start,
    /// `</name>`
    End,
    /// `<name ... />`
    SelfClosing,
}

/// A single attribute of a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    /// Lower-cased attribute name.
    pub name: String,
    /// Attribute value with character references decoded. Empty for bare attributes.
    pub value: Cow<'a, str>,
}

/// A parsed HTML tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Lower-cased tag name.
    pub name: String,
    /// Tag kind.
    pub kind: TagKind,
    /// Attributes in source order. Always empty for end tags.
    pub attributes: Vec<Attribute<'a>>,
}

impl<'a> Tag<'a> {
    /// Returns the value of the first attribute called `name` (lower-case).
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_ref())
    }

    /// Returns `true` for start and self-closing tags.
    #[must_use]
    pub fn is_opening(&self) -> bool {
        matches!(self.kind, TagKind::Start | TagKind::SelfClosing)
    }
}

/// An HTML document that can be scanned any number of times.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    source: &'a str,
}

impl<'a> Document<'a> {
    /// Wraps an HTML source string. No work is done until [`tags`](Self::tags) is iterated.
    #[must_use]
    pub fn parse(source: &'a str) -> Self {
        Self { source }
    }

    /// Returns a fresh iterator over the document's tags.
    #[must_use]
    pub fn tags(&self) -> Tags<'a> {
        Tags {
            src: self.source,
            pos: 0,
        }
    }
}

/// Lazy iterator over the tags of a [`Document`].
#[derive(Debug, Clone)]
pub struct Tags<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let src = self.src;
        loop {
            let offset = src[self.pos..].find('<')?;
            self.pos += offset;
            let rest = &src[self.pos..];

            if rest.starts_with("<!--") {
                self.pos = match rest[4..].find("-->") {
                    Some(end) => self.pos + 4 + end + 3,
                    None => src.len(),
                };
                continue;
            }

            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.pos = match rest.find('>') {
                    Some(end) => self.pos + end + 1,
                    None => src.len(),
                };
                continue;
            }

            let bytes = rest.as_bytes();
            let is_end = bytes.get(1) == Some(&b'/');
            let name_start = if is_end { 2 } else { 1 };

            if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
                // A '<' that does not open a tag is text.
                self.pos += 1;
                continue;
            }

            match scan_tag(rest, name_start, is_end) {
                Some((tag, consumed)) => {
                    self.pos += consumed;
                    if tag.kind == TagKind::Start && is_raw_text(&tag.name) {
                        self.skip_raw_text(&tag.name);
                    }
                    return Some(tag);
                }
                None => {
                    self.pos = src.len();
                    return None;
                }
            }
        }
    }
}

impl Tags<'_> {
    /// Moves past the body of a raw text element up to its closing tag.
    fn skip_raw_text(&mut self, name: &str) {
        let closing = format!("</{name}");
        let rest = self.src[self.pos..].to_ascii_lowercase();
        self.pos = match rest.find(&closing) {
            Some(end) => self.pos + end,
            None => self.src.len(),
        };
    }
}

fn is_raw_text(name: &str) -> bool {
    matches!(name, "script" | "style")
}

/// Scans one tag starting at `rest[0] == '<'`.
///
/// Returns the tag and the number of bytes consumed, or `None` if the input
/// ends before the tag is closed.
fn scan_tag(rest: &str, name_start: usize, is_end: bool) -> Option<(Tag<'_>, usize)> {
    let bytes = rest.as_bytes();
    let mut i = name_start;
    while i < bytes.len() && !is_name_terminator(bytes[i]) {
        i += 1;
    }
    let name = rest[name_start..i].to_ascii_lowercase();

    if is_end {
        let close = rest[i..].find('>')?;
        let tag = Tag {
            name,
            kind: TagKind::End,
            attributes: Vec::new(),
        };
        return Some((tag, i + close + 1));
    }

    let mut attributes = Vec::new();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i).copied()? {
            b'>' => {
                let tag = Tag {
                    name,
                    kind: TagKind::Start,
                    attributes,
                };
                return Some((tag, i + 1));
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                let tag = Tag {
                    name,
                    kind: TagKind::SelfClosing,
                    attributes,
                };
                return Some((tag, i + 2));
            }
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let attr_start = i;
        while i < bytes.len() && !is_attr_name_terminator(bytes[i]) {
            i += 1;
        }
        if i == attr_start {
            // Lone '=' or similar junk: step over it.
            i += 1;
            continue;
        }
        let attr_name = rest[attr_start..i].to_ascii_lowercase();

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes.get(j) != Some(&b'=') {
            attributes.push(Attribute {
                name: attr_name,
                value: Cow::Borrowed(""),
            });
            continue;
        }

        i = j + 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let raw_value = match bytes.get(i).copied()? {
            quote @ (b'"' | b'\'') => {
                let value_start = i + 1;
                let len = rest[value_start..].find(char::from(quote))?;
                i = value_start + len + 1;
                &rest[value_start..value_start + len]
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                &rest[value_start..i]
            }
        };

        attributes.push(Attribute {
            name: attr_name,
            value: decode_entities(raw_value),
        });
    }
}

fn is_name_terminator(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'/'
}

fn is_attr_name_terminator(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'')
}

static CHAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(\d+)|#[xX]([0-9a-fA-F]+)|(amp|lt|gt|quot|apos|nbsp));")
        .expect("valid regex")
});

/// Decodes the character references that show up in attribute values.
fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    CHAR_REF.replace_all(raw, |caps: &Captures<'_>| {
        let decoded = if let Some(dec) = caps.get(1) {
            dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
        } else if let Some(hex) = caps.get(2) {
            u32::from_str_radix(hex.as_str(), 16)
                .ok()
                .and_then(char::from_u32)
        } else {
            match caps.get(3).map(|m| m.as_str()) {
                Some("amp") => Some('&'),
                Some("lt") => Some('<'),
                Some("gt") => Some('>'),
                Some("quot") => Some('"'),
                Some("apos") => Some('\''),
                Some("nbsp") => Some('\u{a0}'),
                _ => None,
            }
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
}

/// A hyperlink target found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// The `href` value, with character references decoded.
    pub url: String,
    /// Zero-based position among the links of the document.
    pub position: usize,
}

/// Collects the non-empty `href` targets of anchor tags from a tag sequence.
pub fn links_from<'a>(tags: impl IntoIterator<Item = Tag<'a>>) -> Vec<ExtractedLink> {
    tags.into_iter()
        .filter(|tag| tag.is_opening() && tag.name == "a")
        .filter_map(|tag| {
            tag.attribute("href")
                .filter(|href| !href.is_empty())
                .map(str::to_owned)
        })
        .enumerate()
        .map(|(position, url)| ExtractedLink { url, position })
        .collect()
}

/// Extracts anchor links from an HTML document, in document order.
#[must_use]
pub fn extract_links(html: &str) -> Vec<ExtractedLink> {
    links_from(Document::parse(html).tags())
}
