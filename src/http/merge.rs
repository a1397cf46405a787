//! Shallow JSON metadata merge.

use axum::http::HeaderValue;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure to rewrite a response body.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to parse JSON response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to marshal modified JSON: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Returns true for `application/json` and `text/json` media types,
/// parameters such as `charset` included.
///
/// Matches on the raw header bytes, so non-ASCII parameters do not hide
/// the media type.
pub fn is_json_content_type(value: Option<&HeaderValue>) -> bool {
    let Some(content_type) = value.map(HeaderValue::as_bytes) else {
        return false;
    };
    contains_ignore_ascii_case(content_type, b"application/json")
        || contains_ignore_ascii_case(content_type, b"text/json")
}

fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Overwrite the top-level keys of the JSON object in `body` with
/// `metadata`.
///
/// Nested values are replaced wholesale. Arrays, scalars and `null` at the
/// root are rejected as decode errors.
pub fn merge_metadata(body: &[u8], metadata: &Map<String, Value>) -> Result<Vec<u8>, MergeError> {
    let mut document: Map<String, Value> =
        serde_json::from_slice(body).map_err(MergeError::Decode)?;

    for (key, value) in metadata {
        document.insert(key.clone(), value.clone());
    }

    serde_json::to_vec(&document).map_err(MergeError::Encode)
}
