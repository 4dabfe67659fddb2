use thiserror::Error;
use uuid::Uuid;

/// The caller abandoned the operation. Never converted into placeholder text.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation was cancelled")]
pub struct Cancelled;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no API key configured for the model provider")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model completion failed: {0}")]
    Completion(#[from] rig::completion::CompletionError),

    #[error("invalid model request: {0}")]
    InvalidRequest(String),

    #[error("model stream failed: {0}")]
    Stream(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("failed to fetch document source: {0}")]
    Fetch(String),

    #[error("invalid inline payload: {0}")]
    InlinePayload(#[from] base64::DecodeError),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("unrecognized image data: {0}")]
    UnrecognizedImage(String),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("extraction was cancelled")]
    Cancelled,
}

impl From<Cancelled> for ExtractionError {
    fn from(_: Cancelled) -> Self {
        ExtractionError::Cancelled
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("at least one document must be selected")]
    NoDocumentsSelected,

    #[error("no valid documents found")]
    NoValidDocuments,

    #[error("model returned an empty report")]
    EmptyReport,

    #[error("conversation must contain at least one message")]
    EmptyConversation,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid reasoning level '{0}', expected one of: standard, deep, comprehensive")]
pub struct InvalidReasoningLevel(pub String);
