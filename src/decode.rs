//! Decoding of message body payloads.
//!
//! The Gmail API delivers body data as URL-safe base64. Padding is present on
//! some payloads and missing on others, so the engine accepts both.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

const URL_SAFE_ANY_PADDING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes a base64url body payload into text.
///
/// Invalid UTF-8 sequences in the decoded bytes are replaced with U+FFFD.
///
/// # Errors
///
/// Returns the underlying [`base64::DecodeError`] if `data` is not valid base64url.
///
/// # Example
///
/// ```
/// use mail_link::decode::decode_body;
///
/// assert_eq!(decode_body("PGEgaHJlZj0ieCI-").unwrap(), r#"<a href="x">"#);
/// ```
pub fn decode_body(data: &str) -> Result<String, base64::DecodeError> {
    let bytes = URL_SAFE_ANY_PADDING.decode(data.trim())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
