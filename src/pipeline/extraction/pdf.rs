use super::types::{PageText, TextExtractor};
use super::ExtractionError;

/// PDF text extractor using the pdf-extract crate.
/// Handles digital PDFs with embedded text layers; scanned pages yield no text.
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let page_texts = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let pages = page_texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText {
                page_number: i + 1,
                text: text.trim().to_string(),
            })
            .collect();

        Ok(pages)
    }
}

impl TextExtractor for PdfTextExtractor {
    /// Pages joined in order; a page without a text layer becomes an empty line.
    fn extract(&self, pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
        let pages = self.extract_pages(pdf_bytes)?;

        let empty = pages.iter().filter(|p| p.text.is_empty()).count();
        if empty > 0 {
            tracing::debug!(
                pages = pages.len(),
                empty_pages = empty,
                "PDF pages without extractable text"
            );
        }

        Ok(pages
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
