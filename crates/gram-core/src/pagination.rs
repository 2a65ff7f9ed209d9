//! Opaque list cursors.
//!
//! A cursor is the URL-safe base64 encoding of the decimal `seq` of the next
//! item to return. Padding is omitted on output and tolerated on input.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::ServiceError;

/// Items returned per page by list endpoints.
pub const PAGE_SIZE: usize = 50;

pub fn encode_cursor(seq: i64) -> String {
    URL_SAFE_NO_PAD.encode(seq.to_string())
}

pub fn decode_cursor(cursor: &str) -> Result<i64, ServiceError> {
    let invalid = || ServiceError::bad_request("invalid cursor");

    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim().trim_end_matches('='))
        .map_err(|_| invalid())?;
    let text = std::str::from_utf8(&bytes).map_err(|_| invalid())?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse::<i64>().map_err(|_| invalid())
}

/// Decode an optional query-string cursor; empty strings mean "first page".
pub fn parse_optional_cursor(cursor: Option<&str>) -> Result<Option<i64>, ServiceError> {
    match cursor.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => decode_cursor(raw).map(Some),
    }
}
