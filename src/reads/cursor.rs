use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MAC_LEN: usize = 32;

/// The decoded contents of an opaque pagination cursor: the sort key of the
/// last item on the previous page, and its URI to break ties deterministically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorPayload {
    pub sort_key: String,
    pub uri: String,
}

/// Encodes `payload` as an opaque, HMAC-authenticated cursor string.
pub fn encode(secret: &str, payload: &CursorPayload) -> String {
    let json = serde_json::to_vec(payload).expect("CursorPayload always serializes");
    let mac = sign(secret, &json);
    let mut bytes = json;
    bytes.extend_from_slice(&mac);
    BASE64URL_NOPAD.encode(&bytes)
}

/// Decodes and verifies a cursor string. Any structural problem — bad
/// base64, truncated payload, or a mismatched HMAC — degrades to `None`
/// (first page) rather than erroring, since cursors are client-supplied and
/// tampering must never crash a read.
pub fn decode(secret: &str, cursor: &str) -> Option<CursorPayload> {
    let bytes = BASE64URL_NOPAD.decode(cursor.as_bytes()).ok()?;
    if bytes.len() <= MAC_LEN {
        return None;
    }
    let (json, mac) = bytes.split_at(bytes.len() - MAC_LEN);
    let expected = sign(secret, json);
    if !constant_time_eq(&expected, mac) {
        return None;
    }
    serde_json::from_slice(json).ok()
}

fn sign(secret: &str, data: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_cursor() {
        let payload = CursorPayload {
            sort_key: "12345".to_string(),
            uri: "at://did:plc:alice/feed.comment/abc".to_string(),
        };
        let cursor = encode("secret", &payload);
        assert_eq!(decode("secret", &cursor), Some(payload));
    }

    #[test]
    fn rejects_tampered_cursor() {
        let payload = CursorPayload {
            sort_key: "12345".to_string(),
            uri: "at://did:plc:alice/feed.comment/abc".to_string(),
        };
        let mut cursor = encode("secret", &payload);
        cursor.push('x');
        assert_eq!(decode("secret", &cursor), None);
    }

    #[test]
    fn rejects_cursor_signed_with_a_different_secret() {
        let payload = CursorPayload {
            sort_key: "1".to_string(),
            uri: "at://did:plc:alice/feed.comment/abc".to_string(),
        };
        let cursor = encode("secret-a", &payload);
        assert_eq!(decode("secret-b", &cursor), None);
    }

    #[test]
    fn garbage_input_decodes_to_none() {
        assert_eq!(decode("secret", "not valid base64!!"), None);
    }
}
