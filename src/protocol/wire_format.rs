//! Wire format encoding and decoding.
//!
//! Every message on the socket is a 4-byte ASCII header followed by a
//! UTF-8 JSON payload:
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ Length               │ Payload                  │
//! │ 4 ASCII digits       │ <Length> bytes of JSON   │
//! │ zero-padded decimal  │ (compact, one object)    │
//! └──────────────────────┴──────────────────────────┘
//! ```
//!
//! The header can only represent lengths up to 9999 bytes. Larger payloads
//! cannot be sent on this protocol.

use crate::error::{RemoteError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Largest payload length the 4-digit header can carry.
pub const MAX_PAYLOAD_SIZE: usize = 9999;

/// Encode a payload length as a zero-padded 4-digit ASCII header.
///
/// # Example
///
/// ```
/// use scene_remote::protocol::encode_header;
///
/// assert_eq!(&encode_header(42).unwrap(), b"0042");
/// assert!(encode_header(10_000).is_err());
/// ```
pub fn encode_header(payload_length: usize) -> Result<[u8; HEADER_SIZE]> {
    if payload_length > MAX_PAYLOAD_SIZE {
        return Err(RemoteError::PayloadTooLarge(payload_length));
    }

    let mut buf = [b'0'; HEADER_SIZE];
    let mut remaining = payload_length;
    for slot in buf.iter_mut().rev() {
        *slot = b'0' + (remaining % 10) as u8;
        remaining /= 10;
    }
    Ok(buf)
}

/// Decode a 4-byte ASCII header into the declared payload length.
///
/// Only plain decimal digits are accepted; a sign, whitespace or any other
/// byte is a protocol error.
///
/// # Example
///
/// ```
/// use scene_remote::protocol::decode_header;
///
/// assert_eq!(decode_header(b"0107").unwrap(), 107);
/// assert!(decode_header(b"-001").is_err());
/// ```
pub fn decode_header(buf: &[u8]) -> Result<usize> {
    if buf.len() < HEADER_SIZE {
        return Err(RemoteError::Protocol(format!(
            "Header needs {} bytes, got {}",
            HEADER_SIZE,
            buf.len()
        )));
    }

    let digits = &buf[..HEADER_SIZE];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(RemoteError::Protocol(format!(
            "Malformed length header: {:?}",
            String::from_utf8_lossy(digits)
        )));
    }

    Ok(digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + (d - b'0') as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_zero_padded() {
        assert_eq!(&encode_header(0).unwrap(), b"0000");
        assert_eq!(&encode_header(7).unwrap(), b"0007");
        assert_eq!(&encode_header(512).unwrap(), b"0512");
        assert_eq!(&encode_header(9999).unwrap(), b"9999");
    }

    #[test]
    fn test_header_every_length_is_four_digits() {
        for len in 0..=MAX_PAYLOAD_SIZE {
            let header = encode_header(len).unwrap();
            assert!(header.iter().all(u8::is_ascii_digit));
            assert_eq!(format!("{:04}", len).as_bytes(), &header);
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let result = encode_header(MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(result, Err(RemoteError::PayloadTooLarge(10_000))));
    }

    #[test]
    fn test_decode_valid_headers() {
        assert_eq!(decode_header(b"0000").unwrap(), 0);
        assert_eq!(decode_header(b"0042").unwrap(), 42);
        assert_eq!(decode_header(b"9999").unwrap(), 9999);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode_header(b"0012{\"a\":1}").unwrap(), 12);
    }

    #[test]
    fn test_decode_rejects_non_numeric() {
        assert!(decode_header(b"00a1").is_err());
        assert!(decode_header(b"{\"va").is_err());
        assert!(decode_header(b" 123").is_err());
    }

    #[test]
    fn test_decode_rejects_negative() {
        let result = decode_header(b"-012");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Malformed length header"));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(decode_header(b"001").is_err());
    }
}
