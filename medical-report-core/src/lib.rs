pub mod chat;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatMessage, DocumentChat};
pub use config::{ApiKeyResolver, AppConfig, ConfigError, LogFormat, ModelNames, ModelProvider};
pub use error::{Cancelled, ExtractionError, ModelError, PipelineError, StoreError};
pub use extraction::{ContentExtractor, ExtractionOrchestrator, ImageDescriber, PdfTextExtractor};
pub use llm::{CompletionModel, CompletionStream, ModelFactory, ModelSource, StreamEvent};
pub use models::{
    Document, DocumentLocation, ExtractionOrigin, ExtractionResult, GenerateReport,
    ReasoningLevel, Report, ReportStatus, SourceType,
};
pub use pipeline::{Caller, ReportPipeline};
pub use report::{ReportSections, split_report_sections};
pub use source::{HttpFetcher, SourceFetcher};
pub use store::{DocumentStore, InMemoryStore, PostgresStore, ReportStore};
