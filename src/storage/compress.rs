//! Gzip helpers for retained raw bulletin HTML.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::domain::Result;

pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let original = b"<html><body>Visa Bulletin</body></html>".repeat(64);
        let compressed = gzip_bytes(&original).unwrap();
        assert!(compressed.len() < original.len());
        assert_eq!(gunzip_bytes(&compressed).unwrap(), original);
    }

    #[test]
    fn test_gunzip_rejects_garbage() {
        assert!(gunzip_bytes(b"not gzip at all").is_err());
    }
}
