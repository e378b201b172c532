//! Shared little-endian encoding primitives.
//!
//! All wire formats in this workspace are little-endian with length-prefixed
//! UTF-8 strings. Decoders take an advancing `&mut &[u8]` cursor so callers
//! can compose them over a single payload slice.

use bytes::BytesMut;

/// Encoding error with a descriptive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    pub message: String,
}

impl EncodingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::error::Error for EncodingError {}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Encode a UTF-8 string.
///
/// Format: `len: u16` (little-endian) + `len` bytes of UTF-8
pub fn encode_utf8(s: &str, buf: &mut BytesMut) -> Result<(), EncodingError> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(EncodingError::new(format!(
            "string too long for UTF-8 encoding: {} bytes",
            bytes.len()
        )));
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Decode a UTF-8 string.
///
/// Format: `len: u16` (little-endian) + `len` bytes of UTF-8
pub fn decode_utf8(buf: &mut &[u8]) -> Result<String, EncodingError> {
    let len = decode_u16(buf).map_err(|_| EncodingError::new("buffer too short for UTF-8 length"))? as usize;

    if buf.len() < len {
        return Err(EncodingError::new(format!(
            "buffer too short for UTF-8 payload: need {} bytes, have {}",
            len,
            buf.len()
        )));
    }

    let bytes = &buf[..len];
    *buf = &buf[len..];

    String::from_utf8(bytes.to_vec())
        .map_err(|e| EncodingError::new(format!("invalid UTF-8: {}", e)))
}

/// Encode a u16 as 2-byte little-endian.
pub fn encode_u16(value: u16, buf: &mut BytesMut) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Decode a u16 from 2-byte little-endian, advancing the cursor.
pub fn decode_u16(buf: &mut &[u8]) -> Result<u16, EncodingError> {
    if buf.len() < 2 {
        return Err(EncodingError::new("buffer too short for u16"));
    }
    let value = u16::from_le_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(value)
}

/// Encode a u32 as 4-byte little-endian.
pub fn encode_u32(value: u32, buf: &mut BytesMut) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Decode a u32 from 4-byte little-endian, advancing the cursor.
pub fn decode_u32(buf: &mut &[u8]) -> Result<u32, EncodingError> {
    if buf.len() < 4 {
        return Err(EncodingError::new("buffer too short for u32"));
    }
    let value = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(value)
}

/// Encode a u64 as 8-byte little-endian.
pub fn encode_u64(value: u64, buf: &mut BytesMut) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Decode a u64 from 8-byte little-endian, advancing the cursor.
pub fn decode_u64(buf: &mut &[u8]) -> Result<u64, EncodingError> {
    if buf.len() < 8 {
        return Err(EncodingError::new("buffer too short for u64"));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_encode_and_decode_utf8() {
        // given
        let s = "Hello, World!";
        let mut buf = BytesMut::new();

        // when
        encode_utf8(s, &mut buf).unwrap();
        let mut slice = buf.as_ref();
        let decoded = decode_utf8(&mut slice).unwrap();

        // then
        assert_eq!(decoded, s);
        assert!(slice.is_empty());
    }

    #[test]
    fn should_encode_and_decode_utf8_with_unicode() {
        // given
        let s = "Hello, 世界!";
        let mut buf = BytesMut::new();

        // when
        encode_utf8(s, &mut buf).unwrap();
        let mut slice = buf.as_ref();
        let decoded = decode_utf8(&mut slice).unwrap();

        // then
        assert_eq!(decoded, s);
        assert!(slice.is_empty());
    }

    #[test]
    fn should_return_error_for_truncated_utf8() {
        // given
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&10u16.to_le_bytes()); // claim 10 bytes
        buf.extend_from_slice(b"short"); // only 5 bytes

        // when
        let mut slice = buf.as_ref();
        let result = decode_utf8(&mut slice);

        // then
        assert!(result.is_err());
        assert!(result.unwrap_err().message.contains("too short"));
    }

    #[test]
    fn should_reject_string_longer_than_u16() {
        // given
        let s = "x".repeat(u16::MAX as usize + 1);
        let mut buf = BytesMut::new();

        // when
        let result = encode_utf8(&s, &mut buf);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn should_round_trip_fixed_width_integers() {
        // given
        let mut buf = BytesMut::new();

        // when
        encode_u16(0xBEEF, &mut buf);
        encode_u32(0xDEAD_BEEF, &mut buf);
        encode_u64(0x0123_4567_89AB_CDEF, &mut buf);

        // then
        let mut slice = buf.as_ref();
        assert_eq!(decode_u16(&mut slice).unwrap(), 0xBEEF);
        assert_eq!(decode_u32(&mut slice).unwrap(), 0xDEAD_BEEF);
        assert_eq!(decode_u64(&mut slice).unwrap(), 0x0123_4567_89AB_CDEF);
        assert!(slice.is_empty());
    }

    #[test]
    fn should_return_error_for_short_integer_buffers() {
        // given
        let bytes = [0u8; 3];

        // when / then
        let mut slice = &bytes[..1];
        assert!(decode_u16(&mut slice).is_err());
        let mut slice = &bytes[..3];
        assert!(decode_u32(&mut slice).is_err());
        let mut slice = &bytes[..3];
        assert!(decode_u64(&mut slice).is_err());
    }
}
