use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DocumentStore, ReportStore};
use crate::error::StoreError;
use crate::models::{Document, DocumentLocation, Report, ReportStatus, SourceType};

const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        url TEXT NOT NULL,
        content_text TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS reports (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        summary TEXT NOT NULL,
        status TEXT NOT NULL,
        family_member_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS report_documents (
        id UUID PRIMARY KEY,
        report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
        document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        position INTEGER NOT NULL DEFAULT 0
    )"#,
];

/// Postgres-backed document and report store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects and makes sure the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("connected to PostgreSQL document store");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn document_from_row(row: &PgRow) -> Result<Document, StoreError> {
    let type_label: String = row.try_get("type")?;
    let url: String = row.try_get("url")?;
    Ok(Document {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source_type: SourceType::parse(&type_label),
        location: DocumentLocation::parse(&url),
        extracted_text: row.try_get("content_text")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Rows come back from `ANY($1)` in arbitrary order; restore the caller's order.
fn in_requested_order(ids: &[Uuid], documents: Vec<Document>) -> Vec<Document> {
    let mut by_id: HashMap<Uuid, Document> = documents
        .into_iter()
        .map(|document| (document.id, document))
        .collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

fn link_positions(document_ids: &[Uuid]) -> Vec<(i32, Uuid)> {
    (0..).zip(document_ids.iter().copied()).collect()
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (id, name, type, url, content_text, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(document.id)
        .bind(&document.name)
        .bind(document.source_type.label())
        .bind(document.location.to_uri())
        .bind(document.extracted_text.as_deref())
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, type, url, content_text, created_at FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn set_extracted_text(&self, id: Uuid, text: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET content_text = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(text)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DocumentNotFound(id));
        }
        debug!(document_id = %id, "extracted text cached");
        Ok(())
    }

    async fn list_documents(&self, ids: &[Uuid]) -> Result<Vec<Document>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, name, type, url, content_text, created_at FROM documents WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let documents = rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(in_requested_order(ids, documents))
    }
}

#[async_trait]
impl ReportStore for PostgresStore {
    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO reports (id, title, content, summary, status, family_member_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(report.id)
        .bind(&report.title)
        .bind(&report.content)
        .bind(&report.summary)
        .bind(report.status.as_str())
        .bind(report.family_member_id)
        .bind(report.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, document_id) in link_positions(&report.document_ids) {
            sqlx::query(
                "INSERT INTO report_documents (id, report_id, document_id, position) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(report.id)
            .bind(document_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(report_id = %report.id, documents = report.document_ids.len(), "report saved");
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        let Some(row) = sqlx::query(
            "SELECT id, title, content, summary, status, family_member_id, created_at \
             FROM reports WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let document_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT document_id FROM report_documents WHERE report_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let status: String = row.try_get("status")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(Some(Report {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            summary: row.try_get("summary")?,
            status: status.parse().map_err(StoreError::InvalidRecord)?,
            family_member_id: row.try_get("family_member_id")?,
            document_ids,
            created_at,
        }))
    }
}
