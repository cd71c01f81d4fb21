//! Batch payload compression
//!
//! Raw DEFLATE (no zlib header) at a fast level. A compressed payload is only
//! kept when it saves at least 20%.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{Read, Write};

use super::error::BatchError;
use crate::constants::batch::{COMPRESSION_KEEP_RATIO, COMPRESSION_LEVEL};

/// Encoded batch payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub original_size: usize,
    pub compressed: bool,
}

impl EncodedPayload {
    fn plain(bytes: Vec<u8>) -> Self {
        Self {
            original_size: bytes.len(),
            bytes,
            compressed: false,
        }
    }

    /// Size of the payload as sent
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Deflate `payload` if it is larger than `threshold` and compresses well enough
pub fn encode_payload(payload: Vec<u8>, threshold: usize) -> Result<EncodedPayload, BatchError> {
    if payload.len() <= threshold {
        return Ok(EncodedPayload::plain(payload));
    }

    let deflated = deflate(&payload)?;
    if (deflated.len() as f64) <= payload.len() as f64 * COMPRESSION_KEEP_RATIO {
        Ok(EncodedPayload {
            original_size: payload.len(),
            bytes: deflated,
            compressed: true,
        })
    } else {
        Ok(EncodedPayload::plain(payload))
    }
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>, BatchError> {
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(data.len() / 2),
        Compression::new(COMPRESSION_LEVEL),
    );
    encoder.write_all(data).map_err(BatchError::Compression)?;
    encoder.finish().map_err(BatchError::Compression)
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, BatchError> {
    let mut out = Vec::with_capacity(data.len() * 4);
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(BatchError::Compression)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payload_left_plain() {
        let encoded = encode_payload(b"[1,2,3]".to_vec(), 1024).unwrap();
        assert!(!encoded.compressed);
        assert_eq!(encoded.size(), encoded.original_size);
    }

    #[test]
    fn test_repetitive_payload_compressed() {
        let payload = br#"{"token":"ABC","price":1.0}"#.repeat(200);
        let encoded = encode_payload(payload.clone(), 1024).unwrap();
        assert!(encoded.compressed);
        assert_eq!(encoded.original_size, payload.len());
        assert!(encoded.size() as f64 <= payload.len() as f64 * 0.8);
        assert_eq!(inflate(&encoded.bytes).unwrap(), payload);
    }

    #[test]
    fn test_incompressible_payload_kept_plain() {
        // xorshift noise does not deflate
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let payload: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();

        let encoded = encode_payload(payload.clone(), 1024).unwrap();
        assert!(!encoded.compressed);
        assert_eq!(encoded.bytes, payload);
        assert_eq!(encoded.size(), encoded.original_size);
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        assert!(inflate(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
