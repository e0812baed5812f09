//! Document Normalizer: flattens an uploaded file into prompt-ready text.
//!
//! Every failure inside this module ends up as diagnostic text in the
//! normalized body. `ExtractionError` never escapes `normalize`.

pub mod types;
pub mod sanitize;
pub mod text;
pub mod office;
pub mod pdf;
pub mod table;
pub mod orchestrator;

pub use types::*;
pub use sanitize::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("text is not valid UTF-8: {0}")]
    Undecodable(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("invalid office container: {0}")]
    Container(String),

    #[error("missing document part: {0}")]
    MissingPart(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("CSV parsing failed: {0}")]
    Csv(String),

    #[error("workbook parsing failed: {0}")]
    Spreadsheet(String),

    #[error("parser aborted: {0}")]
    ParserPanicked(String),

    #[error("file is {size} bytes, above the {max} byte upload limit")]
    TooLarge { size: u64, max: u64 },
}
