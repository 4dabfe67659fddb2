use async_trait::async_trait;
use lopdf::Document;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ContentExtractor, NO_PDF_TEXT};
use crate::error::ExtractionError;
use crate::models::DocumentLocation;
use crate::source::{SourceFetcher, resolve_bytes};

/// Reads the embedded text layer of a PDF, page by page.
pub struct PdfTextExtractor {
    fetcher: Arc<dyn SourceFetcher>,
}

impl PdfTextExtractor {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ContentExtractor for PdfTextExtractor {
    async fn extract(&self, location: &DocumentLocation) -> Result<String, ExtractionError> {
        info!(source = %location.describe(), "starting PDF text extraction");

        let bytes = resolve_bytes(location, self.fetcher.as_ref()).await?;
        debug!(size = bytes.len(), "PDF bytes resolved");

        let text = tokio::task::spawn_blocking(move || extract_text_from_bytes(&bytes))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    ExtractionError::Cancelled
                } else {
                    ExtractionError::PdfParsing(format!("PDF parser task failed: {e}"))
                }
            })??;

        info!(characters = text.len(), "PDF text extraction finished");
        Ok(text)
    }
}

/// Full document text: pages in order, each trimmed and followed by a blank line.
///
/// A document without any text layer yields [`NO_PDF_TEXT`] instead of an empty string.
pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = extract_pages(bytes)?;

    let mut text = String::new();
    for page in &pages {
        text.push_str(page.trim());
        text.push_str("\n\n");
    }

    let text = text.trim();
    if text.is_empty() {
        warn!(pages = pages.len(), "PDF has no extractable text layer");
        return Ok(NO_PDF_TEXT.to_string());
    }
    Ok(text.to_string())
}

/// Text of every page, in page order, one line per text object.
///
/// Strings are decoded through each font's declared encoding or `ToUnicode` map.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let document =
        Document::load_mem(bytes).map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;
    let pages = document.get_pages();
    debug!(page_count = pages.len(), "PDF loaded");

    pages
        .into_keys()
        .map(|number| {
            let raw = document
                .extract_text(&[number])
                .map_err(|e| ExtractionError::PdfParsing(format!("page {number}: {e}")))?;
            Ok(page_lines(&raw))
        })
        .collect()
}

fn page_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{StaticFetcher, pdf_with_pages, pdf_with_win_ansi_text};
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    #[test]
    fn pages_are_concatenated_in_order_with_blank_lines() {
        let pdf = pdf_with_pages(&[&["Hemoglobin: 12.5 g/dL", "(normal 12.0-15.5)"], &["Page two"]]);
        let text = extract_text_from_bytes(&pdf).unwrap();
        assert_eq!(
            text,
            "Hemoglobin: 12.5 g/dL\n(normal 12.0-15.5)\n\nPage two"
        );
    }

    #[test]
    fn page_count_matches_pages() {
        let pdf = pdf_with_pages(&[&["one"], &["two"], &["three"]]);
        let pages = extract_pages(&pdf).unwrap();
        assert_eq!(pages, vec!["one", "two", "three"]);
    }

    #[test]
    fn pdf_without_text_layer_yields_sentinel() {
        let pdf = pdf_with_pages(&[&[], &[]]);
        assert_eq!(extract_text_from_bytes(&pdf).unwrap(), NO_PDF_TEXT);
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        assert!(matches!(
            extract_text_from_bytes(b"definitely not a pdf"),
            Err(ExtractionError::PdfParsing(_))
        ));
    }

    #[test]
    fn win_ansi_punctuation_is_decoded_through_the_font_encoding() {
        // 0x96 en dash, 0x93/0x94 curly quotes
        let pdf = pdf_with_win_ansi_text(b"Range 12.0\x9615.5 \x93ok\x94");
        assert_eq!(
            extract_text_from_bytes(&pdf).unwrap(),
            "Range 12.0\u{2013}15.5 \u{201C}ok\u{201D}"
        );
    }

    #[test]
    fn blank_lines_inside_a_page_are_dropped() {
        assert_eq!(page_lines("  Glucose 95\n\n \nHbA1c 5.4  \n"), "Glucose 95\nHbA1c 5.4");
    }

    #[tokio::test]
    async fn extractor_reads_inline_and_remote_sources() {
        let pdf = pdf_with_pages(&[&["Cholesterol 180 mg/dL"]]);
        let inline = DocumentLocation::parse(&format!(
            "data:application/pdf;base64,{}",
            STANDARD.encode(&pdf)
        ));

        let fetcher = Arc::new(StaticFetcher::new(pdf.clone()));
        let extractor = PdfTextExtractor::new(fetcher.clone());

        assert_eq!(
            extractor.extract(&inline).await.unwrap(),
            "Cholesterol 180 mg/dL"
        );
        assert_eq!(fetcher.calls(), 0);

        let remote = DocumentLocation::parse("https://blob.example/lipids.pdf");
        assert_eq!(
            extractor.extract(&remote).await.unwrap(),
            "Cholesterol 180 mg/dL"
        );
        assert_eq!(fetcher.calls(), 1);
    }
}
