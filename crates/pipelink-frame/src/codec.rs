use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: payload length (4 bytes, little-endian).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode a payload into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────────┐
/// │ Length      │ Payload          │
/// │ (4B LE u32) │ (Length bytes)   │
/// └─────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = check_length(payload.len(), u32::MAX as usize)?;
    dst.reserve(HEADER_SIZE + len);
    dst.put_u32_le(len as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a payload into a freshly allocated frame of exactly
/// `HEADER_SIZE + payload.len()` bytes.
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Interpret a frame header as the payload length.
pub fn decode_header(header: [u8; HEADER_SIZE]) -> u32 {
    u32::from_le_bytes(header)
}

/// Reject lengths above `max` before anything is allocated for them.
pub fn check_length(len: usize, max: usize) -> Result<usize> {
    if len > max {
        return Err(FrameError::PayloadTooLarge { size: len, max });
    }
    Ok(len)
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = check_length(decode_header(header) as usize, max_payload)?;

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, checked on both send and receive.
    /// Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = b"hello, pipelink!";
        let mut buf = BytesMut::from(encode(payload).unwrap().as_ref());

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(decoded.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_is_little_endian_length() {
        let payload = vec![0x5A; 0x0102];
        let frame = encode(&payload).unwrap();

        assert_eq!(frame.len(), HEADER_SIZE + payload.len());
        assert_eq!(&frame[..HEADER_SIZE], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(
            decode_header([frame[0], frame[1], frame[2], frame[3]]),
            payload.len() as u32
        );
        assert_eq!(&frame[HEADER_SIZE..], payload.as_slice());
    }

    #[test]
    fn test_empty_payload() {
        let frame = encode(b"").unwrap();
        assert_eq!(frame.as_ref(), &[0, 0, 0, 0]);

        let mut buf = BytesMut::from(frame.as_ref());
        let decoded = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert!(decoded.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x05, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max })
                if size == 32 * 1024 * 1024 && max == DEFAULT_MAX_PAYLOAD
        ));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"", &mut buf).unwrap();
        encode_frame(b"third", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f3 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();

        assert_eq!(f1.as_ref(), b"first");
        assert!(f2.is_empty());
        assert_eq!(f3.as_ref(), b"third");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_check_length_boundary() {
        assert_eq!(check_length(16, 16).unwrap(), 16);
        assert!(check_length(17, 16).is_err());
    }
}
