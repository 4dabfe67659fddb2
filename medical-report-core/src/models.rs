use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::InvalidReasoningLevel;
use crate::report::sections::{ReportSections, split_report_sections};

/// Number of characters of report content kept in the stored summary.
pub const SUMMARY_LENGTH: usize = 200;

/// Declared kind of an uploaded document, validated once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    Pdf,
    Image,
    Unsupported(String),
}

impl SourceType {
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        if normalized == "pdf" {
            SourceType::Pdf
        } else if normalized.contains("image") {
            SourceType::Image
        } else {
            SourceType::Unsupported(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Image => "image",
            SourceType::Unsupported(label) => label,
        }
    }
}

impl From<String> for SourceType {
    fn from(label: String) -> Self {
        SourceType::parse(&label)
    }
}

impl From<SourceType> for String {
    fn from(source_type: SourceType) -> Self {
        source_type.label().to_string()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the document bytes live: inline in a `data:` URI or behind a fetchable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentLocation {
    Inline {
        media_type: Option<String>,
        payload: String,
    },
    Remote(String),
}

impl DocumentLocation {
    /// Parses a stored location. Only base64 `data:` URIs are treated as inline.
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("data:") {
            if let Some((header, payload)) = rest.split_once(',') {
                if let Some(media) = header.strip_suffix(";base64") {
                    let media_type = media
                        .split(';')
                        .next()
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string);
                    return DocumentLocation::Inline {
                        media_type,
                        payload: payload.trim().to_string(),
                    };
                }
            }
        }
        DocumentLocation::Remote(raw.to_string())
    }

    /// Inline location holding the given bytes.
    pub fn inline(media_type: Option<&str>, bytes: &[u8]) -> Self {
        DocumentLocation::Inline {
            media_type: media_type.map(str::to_string),
            payload: STANDARD.encode(bytes),
        }
    }

    pub fn to_uri(&self) -> String {
        match self {
            DocumentLocation::Inline {
                media_type,
                payload,
            } => format!(
                "data:{};base64,{}",
                media_type.as_deref().unwrap_or_default(),
                payload
            ),
            DocumentLocation::Remote(url) => url.clone(),
        }
    }

    /// Short form for log lines; inline payloads are never logged.
    pub fn describe(&self) -> String {
        match self {
            DocumentLocation::Inline {
                media_type,
                payload,
            } => format!(
                "inline {} ({} base64 chars)",
                media_type.as_deref().unwrap_or("unknown"),
                payload.len()
            ),
            DocumentLocation::Remote(url) => url.chars().take(80).collect(),
        }
    }
}

impl From<String> for DocumentLocation {
    fn from(raw: String) -> Self {
        DocumentLocation::parse(&raw)
    }
}

impl From<DocumentLocation> for String {
    fn from(location: DocumentLocation) -> Self {
        location.to_uri()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(rename = "url")]
    pub location: DocumentLocation,
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(name: impl Into<String>, source_type: &str, location: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_type: SourceType::parse(source_type),
            location: DocumentLocation::parse(location),
            extracted_text: None,
            created_at: Utc::now(),
        }
    }

    /// The cached extraction result, if one has been recorded.
    pub fn cached_text(&self) -> Option<&str> {
        self.extracted_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionOrigin {
    Cache,
    Extracted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub origin: ExtractionOrigin,
}

impl ExtractionResult {
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: ExtractionOrigin::Cache,
        }
    }

    pub fn extracted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: ExtractionOrigin::Extracted,
        }
    }
}

/// How much internal deliberation the model may spend on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    Standard,
    #[default]
    Deep,
    Comprehensive,
}

impl ReasoningLevel {
    pub fn token_budget(self) -> u32 {
        match self {
            ReasoningLevel::Standard => 4000,
            ReasoningLevel::Deep => 8000,
            ReasoningLevel::Comprehensive => 12000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningLevel::Standard => "standard",
            ReasoningLevel::Deep => "deep",
            ReasoningLevel::Comprehensive => "comprehensive",
        }
    }
}

impl FromStr for ReasoningLevel {
    type Err = InvalidReasoningLevel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "standard" => Ok(ReasoningLevel::Standard),
            "deep" => Ok(ReasoningLevel::Deep),
            "comprehensive" => Ok(ReasoningLevel::Comprehensive),
            other => Err(InvalidReasoningLevel(other.to_string())),
        }
    }
}

impl fmt::Display for ReasoningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Complete,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Complete => "complete",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "complete" => Ok(ReportStatus::Complete),
            other => Err(format!("unknown report status: {other}")),
        }
    }
}

/// A generated report. Immutable once created; section views are derived on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub status: ReportStatus,
    pub family_member_id: Option<Uuid>,
    pub document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(
        title: impl Into<String>,
        content: String,
        family_member_id: Option<Uuid>,
        document_ids: Vec<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            summary: summarize(&content),
            content,
            status: ReportStatus::Complete,
            family_member_id,
            document_ids,
            created_at: Utc::now(),
        }
    }

    pub fn sections(&self) -> ReportSections {
        split_report_sections(&self.content)
    }
}

/// First [`SUMMARY_LENGTH`] characters of the content, with an ellipsis when cut.
pub fn summarize(content: &str) -> String {
    let mut chars = content.chars();
    let mut summary: String = chars.by_ref().take(SUMMARY_LENGTH).collect();
    if chars.next().is_some() {
        summary.push_str("...");
    }
    summary
}

/// Input contract for report generation.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub title: String,
    pub document_ids: Vec<Uuid>,
    pub notes: String,
    pub reasoning_level: ReasoningLevel,
    pub family_member_id: Option<Uuid>,
}
