use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{DocumentStore, ReportStore};
use crate::error::StoreError;
use crate::models::{Document, Report};

/// Process-local store used in tests and when no database is configured.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    documents: Arc<DashMap<Uuid, Document>>,
    reports: Arc<DashMap<Uuid, Report>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.get(&id).map(|entry| entry.clone()))
    }

    async fn set_extracted_text(&self, id: Uuid, text: &str) -> Result<(), StoreError> {
        let mut entry = self
            .documents
            .get_mut(&id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        entry.extracted_text = Some(text.to_string());
        Ok(())
    }

    async fn list_documents(&self, ids: &[Uuid]) -> Result<Vec<Document>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.documents.get(id).map(|entry| entry.clone()))
            .collect())
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        self.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.get(&id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracted_text_is_visible_after_write() {
        let store = InMemoryStore::new();
        let document = Document::new("labs.pdf", "pdf", "https://blob.example/labs.pdf");
        store.insert_document(&document).await.unwrap();

        store
            .set_extracted_text(document.id, "Hemoglobin 12.5")
            .await
            .unwrap();

        let stored = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.cached_text(), Some("Hemoglobin 12.5"));
    }

    #[tokio::test]
    async fn writing_text_for_unknown_document_fails() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.set_extracted_text(id, "x").await,
            Err(StoreError::DocumentNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn listing_keeps_order_and_skips_unknown_ids() {
        let store = InMemoryStore::new();
        let first = Document::new("a", "pdf", "https://blob.example/a.pdf");
        let second = Document::new("b", "image", "https://blob.example/b.png");
        store.insert_document(&first).await.unwrap();
        store.insert_document(&second).await.unwrap();

        let listed = store
            .list_documents(&[second.id, Uuid::new_v4(), first.id])
            .await
            .unwrap();
        let names: Vec<&str> = listed.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn reports_round_trip() {
        let store = InMemoryStore::new();
        let report = Report::new("Checkup", "# Report".to_string(), None, vec![]);
        store.save_report(&report).await.unwrap();
        let stored = store.get_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "# Report");
        assert!(store.get_report(Uuid::new_v4()).await.unwrap().is_none());
    }
}
