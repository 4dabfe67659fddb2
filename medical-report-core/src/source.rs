use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::DocumentLocation;

/// Retrieves the bytes behind a remote document URL.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExtractionError>;
}

/// Plain HTTP GET, following redirects the way reqwest does by default.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExtractionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractionError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::Fetch(format!(
                "GET returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractionError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Resolves a stored location into raw bytes: inline payloads are decoded, URLs fetched.
pub async fn resolve_bytes(
    location: &DocumentLocation,
    fetcher: &dyn SourceFetcher,
) -> Result<Vec<u8>, ExtractionError> {
    match location {
        DocumentLocation::Inline { payload, .. } => Ok(decode_inline(payload)?),
        DocumentLocation::Remote(url) => {
            debug!(url = %location.describe(), "fetching remote document");
            fetcher.fetch(url).await
        }
    }
}

pub fn decode_inline(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}
