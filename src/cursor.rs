//! # Cursor Utilities
//!
//! Opaque keyset cursors for paging attribution results. A cursor names the last
//! `(created_at, id)` pair the caller has seen; the next page starts strictly after it.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttributionError;

const MAX_CURSOR_LEN: usize = 512;

/// Position of the last row returned in a page of attribution results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

/// Encode cursor data as an opaque base64 string
pub fn encode_cursor(created_at: &DateTime<Utc>, id: &Uuid) -> String {
    let json = serde_json::json!({
        "created_at": created_at,
        "id": id,
    })
    .to_string();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json.as_bytes())
}

/// Decode cursor data from an opaque base64 string with validation
pub fn decode_cursor(cursor: &str) -> Result<ResultCursor, AttributionError> {
    if cursor.is_empty() {
        return Err(AttributionError::invalid("cursor cannot be empty"));
    }

    if cursor.len() > MAX_CURSOR_LEN {
        return Err(AttributionError::invalid("cursor is too long"));
    }

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| AttributionError::invalid("cursor is not valid base64"))?;

    let cursor_data: ResultCursor = serde_json::from_slice(&decoded)
        .map_err(|_| AttributionError::invalid("cursor contains invalid JSON structure"))?;

    if cursor_data.id.is_nil() {
        return Err(AttributionError::invalid("cursor contains invalid ID"));
    }

    Ok(cursor_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(error: AttributionError) -> String {
        match error {
            AttributionError::InvalidInput(message) => message,
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_cursor_encoding_decoding() {
        let created_at = Utc::now();
        let id = Uuid::new_v4();

        let cursor_str = encode_cursor(&created_at, &id);
        let decoded = decode_cursor(&cursor_str).unwrap();

        assert_eq!(decoded.created_at, created_at);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn test_cursor_is_url_safe() {
        let cursor_str = encode_cursor(&Utc::now(), &Uuid::new_v4());
        assert!(
            cursor_str
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_empty_cursor() {
        let err = decode_cursor("").unwrap_err();
        assert!(message(err).contains("cannot be empty"));
    }

    #[test]
    fn test_cursor_too_long() {
        let err = decode_cursor(&"a".repeat(MAX_CURSOR_LEN + 1)).unwrap_err();
        assert!(message(err).contains("too long"));
    }

    #[test]
    fn test_cursor_invalid_base64() {
        let err = decode_cursor("cursor@#$%").unwrap_err();
        assert!(message(err).contains("not valid base64"));
    }

    #[test]
    fn test_cursor_invalid_json() {
        let not_json = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"invalid json");
        let err = decode_cursor(&not_json).unwrap_err();
        assert!(message(err).contains("invalid JSON structure"));
    }

    #[test]
    fn test_cursor_nil_uuid() {
        let cursor_str = encode_cursor(&Utc::now(), &Uuid::nil());
        let err = decode_cursor(&cursor_str).unwrap_err();
        assert!(message(err).contains("invalid ID"));
    }

    #[test]
    fn test_old_cursor_is_still_valid() {
        let created_at = Utc::now() - chrono::Duration::days(900);
        let cursor_str = encode_cursor(&created_at, &Uuid::new_v4());
        assert!(decode_cursor(&cursor_str).is_ok());
    }
}
