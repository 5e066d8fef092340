//! Gzip framing for raw edge log objects
//!
//! Edge objects are uploaded gzip-compressed. Some uploaders append members
//! to an existing object, so decoding reads every gzip member in sequence.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::error::{Result, StorageError};

/// Decompress a gzip object into memory
pub fn decode_gzip(key: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    decoder
        .read_to_end(&mut out)
        .map_err(|source| StorageError::Decode {
            key: key.to_string(),
            source,
        })?;
    Ok(out)
}

/// Compress data as a single gzip member
pub fn encode_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
