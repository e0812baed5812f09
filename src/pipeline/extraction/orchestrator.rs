use std::panic::{catch_unwind, AssertUnwindSafe};

use super::office::{DocxExtractor, PptxExtractor};
use super::pdf::PdfTextExtractor;
use super::sanitize::sanitize_extracted_text;
use super::table::{DelimitedExtractor, WorkbookExtractor};
use super::text::{LenientTextExtractor, PlainTextExtractor};
use super::types::{ExtractionOutcome, NormalizedText, TextExtractor};
use super::ExtractionError;
use crate::config::{AnalysisConfig, DEFAULT_DOCUMENT_LABEL};
use crate::pipeline::import::{sanitize_filename, DocumentFormat, UploadedDocument};

/// Unlimited size for the free-standing `normalize` entry point.
const NO_SIZE_LIMIT: u64 = u64::MAX;

/// Header line prefixed to every normalized body.
pub fn source_header(label: &str) -> String {
    format!("--- source: {label} ---")
}

/// Diagnostic for a plain-text upload that is not valid UTF-8.
pub fn undecodable_text_message(label: &str) -> String {
    format!(
        "could not decode {label} as UTF-8 text; please supply a plain-text file (.txt / .csv)"
    )
}

/// Diagnostic for any other extraction failure.
pub fn parse_failure_message(label: &str, reason: &str) -> String {
    format!("format parse failed for {label}: {reason}")
}

/// Normalize raw upload bytes into prompt-ready text. Never fails.
pub fn normalize(raw_bytes: &[u8], filename: &str) -> NormalizedText {
    let label = sanitize_filename(filename).unwrap_or_else(|| DEFAULT_DOCUMENT_LABEL.to_string());
    let format = DocumentFormat::from_filename(filename);
    normalize_bytes(raw_bytes, label, format, NO_SIZE_LIMIT)
}

/// Normalize an uploaded document under the configured size limit and label
/// fallback. Never fails.
pub fn normalize_document(document: &UploadedDocument, config: &AnalysisConfig) -> NormalizedText {
    normalize_bytes(
        document.raw_bytes(),
        document.source_label(&config.default_document_label),
        document.detected_format(),
        config.max_upload_bytes,
    )
}

/// Diagnostic-only text for a document whose extraction never completed
/// (e.g. the worker running it was lost).
pub fn degraded_document(
    document: &UploadedDocument,
    config: &AnalysisConfig,
    reason: &str,
) -> NormalizedText {
    let label = document.source_label(&config.default_document_label);
    let diagnostic = parse_failure_message(&label, reason);
    NormalizedText {
        body: format!("{}\n{diagnostic}", source_header(&label)),
        source_label: label,
        format: document.detected_format(),
        outcome: ExtractionOutcome::Degraded { diagnostic },
    }
}

fn normalize_bytes(
    raw_bytes: &[u8],
    label: String,
    format: DocumentFormat,
    max_bytes: u64,
) -> NormalizedText {
    tracing::info!(
        filename = %label,
        format = format.as_str(),
        size_bytes = raw_bytes.len(),
        "Normalizing uploaded document"
    );

    let (text, outcome) = match extract_text(raw_bytes, format, max_bytes) {
        Ok(text) => (sanitize_extracted_text(&text), ExtractionOutcome::Extracted),
        Err(e) => {
            let diagnostic = match &e {
                ExtractionError::Undecodable(_) => undecodable_text_message(&label),
                other => parse_failure_message(&label, &other.to_string()),
            };
            tracing::warn!(
                filename = %label,
                format = format.as_str(),
                error = %e,
                "Document extraction degraded to diagnostic"
            );
            (
                diagnostic.clone(),
                ExtractionOutcome::Degraded { diagnostic },
            )
        }
    };

    tracing::info!(
        filename = %label,
        text_length = text.len(),
        degraded = matches!(outcome, ExtractionOutcome::Degraded { .. }),
        "Document normalized"
    );

    NormalizedText {
        body: format!("{}\n{text}", source_header(&label)),
        source_label: label,
        format,
        outcome,
    }
}

fn extractor_for(format: DocumentFormat) -> &'static (dyn TextExtractor + Sync) {
    static PLAIN: PlainTextExtractor = PlainTextExtractor;
    static LENIENT: LenientTextExtractor = LenientTextExtractor;
    static DOCX: DocxExtractor = DocxExtractor;
    static PPTX: PptxExtractor = PptxExtractor;
    static PDF: PdfTextExtractor = PdfTextExtractor;
    static CSV: DelimitedExtractor = DelimitedExtractor::CSV;
    static TSV: DelimitedExtractor = DelimitedExtractor::TSV;
    static WORKBOOK: WorkbookExtractor = WorkbookExtractor;

    match format {
        DocumentFormat::PlainText => &PLAIN,
        DocumentFormat::WordDocument => &DOCX,
        DocumentFormat::SlideDeck => &PPTX,
        DocumentFormat::Pdf => &PDF,
        DocumentFormat::Csv => &CSV,
        DocumentFormat::Tsv => &TSV,
        DocumentFormat::Spreadsheet => &WORKBOOK,
        DocumentFormat::Unknown => &LENIENT,
    }
}

fn extract_text(
    raw_bytes: &[u8],
    format: DocumentFormat,
    max_bytes: u64,
) -> Result<String, ExtractionError> {
    let size = raw_bytes.len() as u64;
    if size > max_bytes {
        return Err(ExtractionError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    let extractor = extractor_for(format);

    // Third-party parsers can panic on hostile input; one bad file must not
    // take the request down with it.
    catch_unwind(AssertUnwindSafe(|| extractor.extract(raw_bytes)))
        .unwrap_or_else(|payload| Err(ExtractionError::ParserPanicked(panic_message(&payload))))
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown parser panic".to_string()
    }
}
