use std::io::{self, Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};

/// Gzip `text` and base64 encode the result
pub fn compress_text(text: &str) -> io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`compress_text`]
pub fn decompress_text(encoded: &str) -> io::Result<String> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut text = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_multiline_text() {
        let text = "{\"state\":\"up\"}\n{\"state\":\"down\",\"note\":\"ümlaut ✓\"}\n";
        assert_eq!(decompress_text(&compress_text(text).unwrap()).unwrap(), text);
    }

    #[test]
    fn test_output_is_base64_gzip() {
        let encoded = compress_text("hello").unwrap();
        let raw = STANDARD.decode(&encoded).unwrap();
        // gzip magic
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(decompress_text("!!!not base64").unwrap_err().kind(), io::ErrorKind::InvalidData);
        assert!(decompress_text(&STANDARD.encode(b"plain bytes")).is_err());
    }
}
