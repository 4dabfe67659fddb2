use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

use super::sections::{AT_A_GLANCE_HEADING, COMPREHENSIVE_ANALYSIS_HEADING};
use crate::error::Cancelled;
use crate::extraction::ExtractionOrchestrator;
use crate::llm::{CompletionModel, CompletionRequest, Message};
use crate::models::{Document, ReasoningLevel};

/// Cap on visible report output; the reasoning budget is granted on top of it.
pub const REPORT_MAX_OUTPUT_TOKENS: u32 = 4000;

const REPORT_INSTRUCTIONS: &str = r#"Please organize your response using markdown formatting as follows:

# Medical Report Analysis for [Patient Name if available]

## AT-A-GLANCE SUMMARY
A very brief (2-3 sentences maximum) plain-language overview of the most critical information someone needs to know right away.

## COMPREHENSIVE ANALYSIS
One or two paragraphs giving a plain-language overview of the overall picture.

### KEY FINDINGS
An exhaustive breakdown of all significant findings, grouped by category (for example "Blood Work" or "Imaging"), as bullet points in accessible language.

### WHAT THIS MEANS
What the results indicate about the person's health, covering immediate implications and longer-term considerations, and how serious or routine the findings are.

### NEXT STEPS
Follow-up actions and questions for healthcare providers:
- Immediate actions needed (if any)
- Follow-up appointments to consider
- Specific questions to ask doctors
- Lifestyle considerations, if relevant

## DATA SUMMARIES

### TEST RESULTS TABLE
A markdown table of every numerical test result in the documents with the test name, result value, normal range and a simple status such as "Normal", "High" or "Low".

Example:
| Test | Result | Normal Range | Status |
|------|--------|--------------|--------|
| Hemoglobin | 12.5 g/dL | 12.0-15.5 g/dL | Normal |

### MEDICATION INFORMATION
If medications are mentioned, a table with medication name, dosage, purpose and key considerations.

## MEDICAL TERMINOLOGY
A glossary table explaining every medical term used in the documents in simple language.

| Term | Simple Explanation |
|------|-------------------|
| [Medical term] | [Plain language explanation] |

Use conversational, friendly language throughout. Introduce medical terms gently and explain them clearly. Format the report for maximum readability with clear section headings."#;

/// Turns a set of documents plus notes into one structured plain-language report.
pub struct ReportSynthesizer {
    orchestrator: ExtractionOrchestrator,
    model: Arc<dyn CompletionModel>,
    model_name: String,
}

impl ReportSynthesizer {
    pub fn new(
        orchestrator: ExtractionOrchestrator,
        model: Arc<dyn CompletionModel>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            model,
            model_name: model_name.into(),
        }
    }

    /// Produces the report text. A failed model call yields [`fallback_report`] instead of an
    /// error; only cancellation is reported to the caller.
    pub async fn synthesize(
        &self,
        documents: &mut [Document],
        notes: &str,
        level: ReasoningLevel,
    ) -> Result<String, Cancelled> {
        let extractions = join_all(
            documents
                .iter_mut()
                .map(|document| self.orchestrator.extract(document, false)),
        )
        .await;

        let mut blocks = Vec::with_capacity(documents.len());
        for (document, extraction) in documents.iter().zip(extractions) {
            blocks.push((document.name.as_str(), extraction?.text));
        }

        let prompt = build_report_prompt(&blocks, notes);
        let request = CompletionRequest::new(self.model_name.clone(), vec![Message::user(prompt)])
            .with_max_output_tokens(REPORT_MAX_OUTPUT_TOKENS)
            .with_reasoning_budget(level.token_budget());

        info!(
            documents = blocks.len(),
            reasoning_level = %level,
            reasoning_budget = level.token_budget(),
            "requesting report synthesis"
        );

        match self.model.complete(request).await {
            Ok(completion) => Ok(completion.text),
            Err(e) => {
                error!(error = %e, "report synthesis failed, returning fallback report");
                Ok(fallback_report(&e.to_string()))
            }
        }
    }
}

/// One delimited block per document in the given order, then the notes block when present.
pub fn build_report_prompt<T: AsRef<str>>(documents: &[(&str, T)], notes: &str) -> String {
    let combined = documents
        .iter()
        .map(|(name, text)| format!("--- DOCUMENT: {name} ---\n{}\n\n", text.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");

    let notes = notes.trim();
    let context = if notes.is_empty() {
        String::new()
    } else {
        format!("\n--- ADDITIONAL CONTEXT ---\n{notes}\n\n")
    };

    format!(
        "I need you to analyze the following medical documents and create a comprehensive, \
         yet easy-to-understand report for family members. The report should have multiple \
         levels of detail to accommodate different needs.\n\n{combined}{context}\n{REPORT_INSTRUCTIONS}\n"
    )
}

/// Skeleton-conformant report used when the model call fails.
pub fn fallback_report(message: &str) -> String {
    let message = if message.trim().is_empty() {
        "Unknown error"
    } else {
        message
    };
    format!(
        "# Medical Report Analysis\n\n\
         ## {AT_A_GLANCE_HEADING}\n\
         I was unable to fully analyze the medical documents due to technical issues.\n\n\
         ## {COMPREHENSIVE_ANALYSIS_HEADING}\n\n\
         ### KEY FINDINGS\n\
         The system encountered an error while processing your documents.\n\n\
         ### WHAT THIS MEANS\n\
         This is likely a temporary issue with our AI processing system.\n\n\
         ### NEXT STEPS\n\
         Please try again later or contact support if the issue persists.\n\n\
         ## TECHNICAL DETAILS\n\
         Error: {message}\n"
    )
}
