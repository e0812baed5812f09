use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::pipeline::import::DocumentFormat;

/// Flattened, prompt-ready text of one uploaded document.
///
/// `body` always starts with the source header line and is never empty, even
/// when extraction failed (it then carries the diagnostic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub source_label: String,
    pub body: String,
    pub format: DocumentFormat,
    pub outcome: ExtractionOutcome,
}

impl NormalizedText {
    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Degraded { .. })
    }
}

/// Whether the body holds extracted content or a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Extracted,
    Degraded { diagnostic: String },
}

impl ExtractionOutcome {
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Extracted => None,
            Self::Degraded { diagnostic } => Some(diagnostic),
        }
    }
}

/// Per-page PDF text, in page order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

/// Format-specific text extraction (allows swapping parsers in tests).
pub trait TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}
