use super::types::TextExtractor;
use super::ExtractionError;

/// Strict UTF-8 decoding for declared plain-text uploads.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| ExtractionError::Undecodable(e.to_string()))
    }
}

/// Lenient decoding for unrecognized extensions: invalid byte sequences are
/// dropped, never fatal.
pub struct LenientTextExtractor;

impl TextExtractor for LenientTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        Ok(decode_lossy(bytes))
    }
}

pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}
