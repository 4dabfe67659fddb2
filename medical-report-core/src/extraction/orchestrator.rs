use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ContentExtractor;
use crate::error::{Cancelled, ExtractionError};
use crate::models::{Document, ExtractionResult, SourceType};
use crate::store::DocumentStore;

/// Recorded when an extractor succeeds but hands back nothing.
pub const EMPTY_EXTRACTION: &str = "No content could be extracted from this document.";

/// Single owner of the extraction cache: decides between cached text and a fresh extraction,
/// and turns every extraction failure into readable placeholder text.
pub struct ExtractionOrchestrator {
    store: Arc<dyn DocumentStore>,
    pdf: Arc<dyn ContentExtractor>,
    image: Arc<dyn ContentExtractor>,
}

impl ExtractionOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        pdf: Arc<dyn ContentExtractor>,
        image: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self { store, pdf, image }
    }

    /// Returns the document text, extracting it when nothing is cached or a refresh is forced.
    ///
    /// Failures come back as placeholder text, which is cached like any other result so the
    /// same broken source is not retried until the caller forces a refresh. The only error
    /// is [`Cancelled`].
    pub async fn extract(
        &self,
        document: &mut Document,
        force_refresh: bool,
    ) -> Result<ExtractionResult, Cancelled> {
        if !force_refresh {
            if let Some(text) = document.cached_text() {
                debug!(document_id = %document.id, "using cached extraction");
                return Ok(ExtractionResult::cached(text));
            }
        }

        let (extractor, kind) = match &document.source_type {
            SourceType::Pdf => (&self.pdf, "PDF"),
            SourceType::Image => (&self.image, "image"),
            SourceType::Unsupported(label) => {
                warn!(document_id = %document.id, source_type = %label, "unsupported document type");
                return Ok(ExtractionResult::extracted(format!(
                    "Content extraction is not available: unsupported document type: {label}"
                )));
            }
        };

        info!(document_id = %document.id, kind, force_refresh, "extracting document content");
        let text = match extractor.extract(&document.location).await {
            Ok(text) if text.trim().is_empty() => EMPTY_EXTRACTION.to_string(),
            Ok(text) => text,
            Err(ExtractionError::Cancelled) => return Err(Cancelled),
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "extraction failed, caching placeholder");
                format!("Error extracting content from {kind} document: {e}")
            }
        };

        document.extracted_text = Some(text.clone());
        if let Err(e) = self.store.set_extracted_text(document.id, &text).await {
            warn!(document_id = %document.id, error = %e, "failed to persist extracted text");
        }

        Ok(ExtractionResult::extracted(text))
    }
}
