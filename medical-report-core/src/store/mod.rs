pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Document, Report};

/// Persistence for uploaded documents and their extraction cache.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;
    /// Overwrites the cached extraction text of one document.
    async fn set_extracted_text(&self, id: Uuid, text: &str) -> Result<(), StoreError>;
    /// Documents for the given ids, in the order given. Unknown ids are skipped.
    async fn list_documents(&self, ids: &[Uuid]) -> Result<Vec<Document>, StoreError>;
}

/// Persistence for generated reports and their document links.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_report(&self, report: &Report) -> Result<(), StoreError>;
    async fn get_report(&self, id: Uuid) -> Result<Option<Report>, StoreError>;
}
