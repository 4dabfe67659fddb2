use chrono::{DateTime, Utc};
use medical_report_core::{
    ChatMessage, Document, ExtractionOrigin, ExtractionResult, Report, ReportSections,
    ReportStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RegisterDocumentRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub has_content: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentResponse {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id,
            name: document.name.clone(),
            source_type: document.source_type.to_string(),
            has_content: document.cached_text().is_some(),
            created_at: document.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub content: String,
    pub source: ExtractionOrigin,
}

impl From<ExtractionResult> for ExtractResponse {
    fn from(result: ExtractionResult) -> Self {
        Self {
            content: result.text,
            source: result.origin,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub reasoning: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub document_ids: Vec<Uuid>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub reasoning_level: Option<String>,
    #[serde(default)]
    pub family_member_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct GenerateReportResponse {
    pub report_id: Uuid,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub status: ReportStatus,
    pub family_member_id: Option<Uuid>,
    pub document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub sections: ReportSections,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        let sections = report.sections();
        Self {
            id: report.id,
            title: report.title,
            content: report.content,
            summary: report.summary,
            status: report.status,
            family_member_id: report.family_member_id,
            document_ids: report.document_ids,
            created_at: report.created_at,
            sections,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiKeySettingsRequest {
    #[serde(default)]
    pub api_key: String,
}
