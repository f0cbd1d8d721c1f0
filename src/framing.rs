//! # Framing & ack tokens (C9)
//!
//! Builds the 3-element Forward protocol request
//! `[tag, payload, options]` for a sealed chunk, and the base64 ack
//! token carried in `options["chunk"]` when ack mode is on.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use rmpv::Value;

use crate::error::{Error, Result};

/// Base64-encode a chunk's 16 raw id bytes into the ack token Fluentd
/// expects back in `{"ack": "<token>"}`.
pub fn chunk_id_to_token(chunk_id: [u8; 16]) -> String {
    BASE64.encode(chunk_id)
}

/// Build the wire bytes for one sealed chunk: a MessagePack array of
/// `[tag, payload, options]`. `record_count` fills `options["size"]`;
/// `ack_token`, when set, adds `options["chunk"]` and ack mode is
/// expected of the caller.
pub fn build_forward_request(
    tag: &str,
    payload: Bytes,
    record_count: u64,
    ack_token: Option<&str>,
) -> Result<Vec<u8>> {
    let mut options = vec![(Value::from("size"), Value::from(record_count))];
    if let Some(token) = ack_token {
        options.push((Value::from("chunk"), Value::from(token)));
    }

    let request = Value::Array(vec![
        Value::from(tag),
        Value::Binary(payload.to_vec()),
        Value::Map(options),
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &request).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buf)
}

/// Parse an ack response `{"ack": "<token>"}` and verify it matches
/// `expected`.
pub fn verify_ack_response(bytes: &[u8], expected: &str) -> Result<()> {
    let value = rmpv::decode::read_value(&mut &bytes[..]).map_err(|e| Error::Decode(e.to_string()))?;
    let got = value
        .as_map()
        .and_then(|pairs| pairs.iter().find(|(k, _)| k.as_str() == Some("ack")))
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string)
        .unwrap_or_default();

    if got == expected {
        Ok(())
    } else {
        Err(Error::AckMismatch {
            expected: expected.to_string(),
            got,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_encodes_to_standard_base64() {
        let id = [0u8; 16];
        let token = chunk_id_to_token(id);
        assert_eq!(token, "AAAAAAAAAAAAAAAAAAAAAA==");
    }

    #[test]
    fn request_without_ack_omits_the_chunk_option() {
        let bytes = build_forward_request("app.log", Bytes::from_static(&[1, 2, 3]), 1, None).unwrap();
        let decoded = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        let array = decoded.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array[0].as_str(), Some("app.log"));
        assert_eq!(array[1].as_slice(), Some(&[1u8, 2, 3][..]));

        let options = array[2].as_map().unwrap();
        assert!(options.iter().any(|(k, _)| k.as_str() == Some("size")));
        assert!(!options.iter().any(|(k, _)| k.as_str() == Some("chunk")));
    }

    #[test]
    fn request_with_ack_includes_the_base64_chunk_option() {
        let token = chunk_id_to_token([7u8; 16]);
        let bytes =
            build_forward_request("app.log", Bytes::from_static(&[1]), 1, Some(&token)).unwrap();
        let decoded = rmpv::decode::read_value(&mut &bytes[..]).unwrap();
        let array = decoded.as_array().unwrap();
        let options = array[2].as_map().unwrap();
        let chunk_value = options
            .iter()
            .find(|(k, _)| k.as_str() == Some("chunk"))
            .map(|(_, v)| v.as_str().unwrap());
        assert_eq!(chunk_value, Some(token.as_str()));
    }

    #[test]
    fn verify_ack_response_accepts_a_matching_token_and_rejects_others() {
        let response = Value::Map(vec![(Value::from("ack"), Value::from("abc"))]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &response).unwrap();

        assert!(verify_ack_response(&bytes, "abc").is_ok());
        let err = verify_ack_response(&bytes, "xyz").unwrap_err();
        assert!(matches!(err, Error::AckMismatch { .. }));
    }
}
