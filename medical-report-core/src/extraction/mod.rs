pub mod image;
pub mod orchestrator;
pub mod pdf;

pub use image::ImageDescriber;
pub use orchestrator::ExtractionOrchestrator;
pub use pdf::PdfTextExtractor;

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::models::DocumentLocation;

/// Returned when a PDF parses but carries no text layer.
pub const NO_PDF_TEXT: &str =
    "No text could be extracted from this PDF. It may be a scanned document or contain only images.";

/// Returned when the vision model answers with nothing.
pub const NO_IMAGE_ANALYSIS: &str = "The AI was unable to analyze this image properly.";

/// Turns one document source into plain text. Errors are left to the orchestrator.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, location: &DocumentLocation) -> Result<String, ExtractionError>;
}
