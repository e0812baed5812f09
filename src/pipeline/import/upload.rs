use super::format::{sanitize_filename, DocumentFormat};

/// A user-supplied document as received from the upload layer.
///
/// Immutable once constructed: the format is derived from the declared
/// filename at ingestion and never re-detected.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    raw_bytes: Vec<u8>,
    declared_filename: String,
    detected_format: DocumentFormat,
}

impl UploadedDocument {
    pub fn new(raw_bytes: Vec<u8>, declared_filename: impl Into<String>) -> Self {
        let declared_filename = declared_filename.into();
        let detected_format = DocumentFormat::from_filename(&declared_filename);
        Self {
            raw_bytes,
            declared_filename,
            detected_format,
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    pub fn declared_filename(&self) -> &str {
        &self.declared_filename
    }

    pub fn detected_format(&self) -> DocumentFormat {
        self.detected_format
    }

    pub fn size_bytes(&self) -> u64 {
        self.raw_bytes.len() as u64
    }

    /// Human-readable label used in citation prompts.
    pub fn source_label(&self, fallback: &str) -> String {
        sanitize_filename(&self.declared_filename).unwrap_or_else(|| fallback.to_string())
    }
}
