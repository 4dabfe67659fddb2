use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::sync::Arc;
use tracing::{info, warn};

use super::{ContentExtractor, NO_IMAGE_ANALYSIS};
use crate::error::ExtractionError;
use crate::llm::{CompletionModel, CompletionRequest, ContentPart, ImageSource, Message};
use crate::models::DocumentLocation;
use crate::source::decode_inline;

pub const IMAGE_MAX_OUTPUT_TOKENS: u32 = 2000;
pub const IMAGE_REASONING_BUDGET: u32 = 8000;

pub const IMAGE_ANALYSIS_PROMPT: &str = "Analyze this medical image in detail. Describe:
1. The type of medical image (X-ray, MRI, CT scan, lab report, etc.)
2. The body part or system shown (if applicable)
3. All visible findings, abnormalities, or notable features
4. Any text or numbers visible in the image (lab values, dates, patient information with names redacted)
5. Measurement values or reference ranges if present

Be specific, detailed, and factual. If something is unclear or uncertain, acknowledge the uncertainty.
Format your response in clear paragraphs with appropriate headings.";

/// Produces a textual description of a medical image using a vision-capable model.
pub struct ImageDescriber {
    model: Arc<dyn CompletionModel>,
    model_name: String,
}

impl ImageDescriber {
    pub fn new(model: Arc<dyn CompletionModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    pub fn request(&self, image: ImageSource) -> CompletionRequest {
        CompletionRequest::new(
            self.model_name.clone(),
            vec![Message::user_with_parts(vec![
                ContentPart::Text(IMAGE_ANALYSIS_PROMPT.to_string()),
                ContentPart::Image(image),
            ])],
        )
        .with_max_output_tokens(IMAGE_MAX_OUTPUT_TOKENS)
        .with_reasoning_budget(IMAGE_REASONING_BUDGET)
    }
}

#[async_trait]
impl ContentExtractor for ImageDescriber {
    async fn extract(&self, location: &DocumentLocation) -> Result<String, ExtractionError> {
        info!(source = %location.describe(), model = %self.model_name, "analyzing image");

        let image = image_source(location)?;
        let completion = self.model.complete(self.request(image)).await?;

        let description = completion.text.trim();
        if description.is_empty() {
            warn!("vision model returned an empty description");
            return Ok(NO_IMAGE_ANALYSIS.to_string());
        }

        info!(characters = description.len(), "image analysis finished");
        Ok(description.to_string())
    }
}

/// Inline payloads are passed by value with their media type; remote images by URL.
fn image_source(location: &DocumentLocation) -> Result<ImageSource, ExtractionError> {
    match location {
        DocumentLocation::Inline {
            media_type,
            payload,
        } => {
            let bytes = decode_inline(payload)?;
            let media_type = match media_type.as_deref() {
                Some(declared) if declared.starts_with("image/") => declared.to_string(),
                _ => sniff_media_type(&bytes)?,
            };
            Ok(ImageSource::Base64 {
                media_type,
                data: STANDARD.encode(&bytes),
            })
        }
        DocumentLocation::Remote(url) => Ok(ImageSource::Url(url.clone())),
    }
}

fn sniff_media_type(bytes: &[u8]) -> Result<String, ExtractionError> {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .map_err(|e| ExtractionError::UnrecognizedImage(e.to_string()))
}
