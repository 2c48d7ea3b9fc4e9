use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

/// Maps an uploaded PDF's bytes to plain text. Used once at registration or
/// submission time; the extracted text is what the suggestion engine ranks.
pub trait PdfExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            let normalized = normalize_whitespace(&text);
            if !normalized.is_empty() {
                pages.push(normalized);
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(
                "pdf had no readable page text".to_string(),
            ));
        }

        Ok(pages.join("\n\n"))
    }
}

/// Reads a PDF from disk and extracts its text.
pub fn extract_text_from_path(path: &Path) -> Result<String, IngestError> {
    let bytes = std::fs::read(path)?;
    LopdfExtractor.extract_text(&bytes)
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}
