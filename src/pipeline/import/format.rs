use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Document formats the normalizer knows how to flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    WordDocument,
    SlideDeck,
    Pdf,
    Csv,
    Tsv,
    Spreadsheet,
    /// Unrecognized extension: decoded leniently as text.
    Unknown,
}

impl DocumentFormat {
    /// Detect the format from the filename extension (case-insensitive).
    ///
    /// Uploads arrive with a declared filename only, so the extension is the
    /// sole signal. Anything unrecognized falls back to lenient text decoding.
    pub fn from_filename(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("txt" | "text" | "md" | "markdown" | "log" | "json") => Self::PlainText,
            Some("docx") => Self::WordDocument,
            Some("pptx") => Self::SlideDeck,
            Some("pdf") => Self::Pdf,
            Some("csv") => Self::Csv,
            Some("tsv") => Self::Tsv,
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Self::Spreadsheet,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::WordDocument => "word_document",
            Self::SlideDeck => "slide_deck",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Spreadsheet => "spreadsheet",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitize a filename: strip path components, limit length.
/// Returns `None` when nothing usable remains.
pub fn sanitize_filename(original: &str) -> Option<String> {
    // Uploads from Windows clients may carry backslash-separated paths.
    let last = original.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(original);

    let clean: String = last
        .chars()
        .filter(|c| *c != '\0' && !c.is_control())
        .take(255)
        .collect();
    let clean = clean.trim();

    if clean.is_empty() || clean == "." || clean == ".." {
        None
    } else {
        Some(clean.to_string())
    }
}
