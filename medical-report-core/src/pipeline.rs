//! Entry points used by the transport layer: content extraction, report generation,
//! report retrieval and document chat.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::chat::{ChatMessage, DocumentChat};
use crate::error::PipelineError;
use crate::extraction::{ContentExtractor, ExtractionOrchestrator, ImageDescriber, PdfTextExtractor};
use crate::llm::{CompletionStream, ModelSource};
use crate::models::{Document, ExtractionResult, GenerateReport, Report};
use crate::report::{ReportSections, ReportSynthesizer, split_report_sections};
use crate::source::SourceFetcher;
use crate::store::{DocumentStore, ReportStore};

/// Who is calling: selects the API key used for model calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub api_key: Option<String>,
    pub user_id: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

pub struct ReportPipeline {
    documents: Arc<dyn DocumentStore>,
    reports: Arc<dyn ReportStore>,
    models: Arc<dyn ModelSource>,
    pdf: Arc<dyn ContentExtractor>,
}

impl ReportPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        reports: Arc<dyn ReportStore>,
        models: Arc<dyn ModelSource>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self::from_parts(
            documents,
            reports,
            models,
            Arc::new(PdfTextExtractor::new(fetcher)),
        )
    }

    pub fn from_parts(
        documents: Arc<dyn DocumentStore>,
        reports: Arc<dyn ReportStore>,
        models: Arc<dyn ModelSource>,
        pdf: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            documents,
            reports,
            models,
            pdf,
        }
    }

    /// Extraction components bound to the caller's model credentials.
    fn orchestrator(&self, caller: &Caller) -> ExtractionOrchestrator {
        let model = self
            .models
            .model_for(caller.api_key.as_deref(), caller.user_id.as_deref());
        let image = ImageDescriber::new(model, self.models.names().vision.clone());
        ExtractionOrchestrator::new(self.documents.clone(), self.pdf.clone(), Arc::new(image))
    }

    async fn load_document(&self, id: Uuid) -> Result<Document, PipelineError> {
        self.documents
            .get_document(id)
            .await?
            .ok_or(PipelineError::DocumentNotFound(id))
    }

    pub async fn register_document(&self, document: Document) -> Result<Document, PipelineError> {
        self.documents.insert_document(&document).await?;
        info!(
            document_id = %document.id,
            source_type = %document.source_type,
            "document registered"
        );
        Ok(document)
    }

    #[instrument(skip(self, caller))]
    pub async fn extract_content(
        &self,
        document_id: Uuid,
        force_refresh: bool,
        caller: &Caller,
    ) -> Result<ExtractionResult, PipelineError> {
        let mut document = self.load_document(document_id).await?;
        Ok(self
            .orchestrator(caller)
            .extract(&mut document, force_refresh)
            .await?)
    }

    #[instrument(skip(self, request, caller), fields(documents = request.document_ids.len()))]
    pub async fn generate_report(
        &self,
        request: GenerateReport,
        caller: &Caller,
    ) -> Result<Report, PipelineError> {
        if request.document_ids.is_empty() {
            return Err(PipelineError::NoDocumentsSelected);
        }

        let document_ids = unique_ids(&request.document_ids);
        let mut documents = self.documents.list_documents(&document_ids).await?;
        if documents.is_empty() {
            return Err(PipelineError::NoValidDocuments);
        }
        if documents.len() < document_ids.len() {
            warn!(
                requested = document_ids.len(),
                found = documents.len(),
                "skipping unknown documents"
            );
        }

        let model = self
            .models
            .model_for(caller.api_key.as_deref(), caller.user_id.as_deref());
        let synthesizer = ReportSynthesizer::new(
            self.orchestrator(caller),
            model,
            self.models.names().report.clone(),
        );
        let content = synthesizer
            .synthesize(&mut documents, &request.notes, request.reasoning_level)
            .await?;
        if content.trim().is_empty() {
            return Err(PipelineError::EmptyReport);
        }

        let document_ids = documents.iter().map(|document| document.id).collect();
        let report = Report::new(
            request.title,
            content,
            request.family_member_id,
            document_ids,
        );
        self.reports.save_report(&report).await?;

        info!(report_id = %report.id, reasoning_level = %request.reasoning_level, "report generated");
        Ok(report)
    }

    pub async fn get_report(&self, id: Uuid) -> Result<Report, PipelineError> {
        self.reports
            .get_report(id)
            .await?
            .ok_or(PipelineError::ReportNotFound(id))
    }

    pub fn split_report_sections(&self, content: &str) -> ReportSections {
        split_report_sections(content)
    }

    fn document_chat(&self, caller: &Caller) -> DocumentChat {
        let model = self
            .models
            .model_for(caller.api_key.as_deref(), caller.user_id.as_deref());
        DocumentChat::new(
            self.orchestrator(caller),
            model,
            self.models.names().chat.clone(),
        )
    }

    pub async fn chat(
        &self,
        document_id: Uuid,
        history: Vec<ChatMessage>,
        reasoning: bool,
        caller: &Caller,
    ) -> Result<String, PipelineError> {
        let mut document = self.load_document(document_id).await?;
        self.document_chat(caller)
            .reply(&mut document, history, reasoning)
            .await
    }

    pub async fn chat_stream(
        &self,
        document_id: Uuid,
        history: Vec<ChatMessage>,
        reasoning: bool,
        caller: &Caller,
    ) -> Result<CompletionStream, PipelineError> {
        let mut document = self.load_document(document_id).await?;
        self.document_chat(caller)
            .reply_stream(&mut document, history, reasoning)
            .await
    }
}

/// Ids in first-seen order with repeats removed.
fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelNames;
    use crate::llm::{CompletionModel, Role};
    use crate::models::{ExtractionOrigin, ReasoningLevel, SUMMARY_LENGTH};
    use crate::store::InMemoryStore;
    use crate::testing::{ScriptedModel, StaticFetcher, pdf_with_pages};
    use std::sync::Mutex;

    const MODEL_REPORT: &str = "# Medical Report Analysis

## AT-A-GLANCE SUMMARY
Your blood work looks normal and the chest X-ray shows no acute problems. The fatigue you mention is worth discussing with your doctor.

## COMPREHENSIVE ANALYSIS

### KEY FINDINGS
- **Blood Work**: hemoglobin is within the normal range.
- **Imaging**: chest X-ray without acute findings.

### WHAT THIS MEANS
Nothing in these documents points to anemia.

### NEXT STEPS
- Ask your doctor about other causes of fatigue.

## DATA SUMMARIES

### TEST RESULTS TABLE
| Test | Result | Normal Range | Status |
|------|--------|--------------|--------|
| Hemoglobin | 12.5 g/dL | 12.0-15.5 g/dL | Normal |

## MEDICAL TERMINOLOGY
| Term | Simple Explanation |
|------|-------------------|
| Hemoglobin | The protein in red blood cells that carries oxygen |
";

    /// Hands out one scripted model and remembers which credentials were asked for.
    struct FixedModels {
        model: Arc<ScriptedModel>,
        names: ModelNames,
        lookups: Mutex<Vec<(Option<String>, Option<String>)>>,
    }

    impl FixedModels {
        fn new(model: Arc<ScriptedModel>) -> Self {
            Self {
                model,
                names: ModelNames {
                    report: "report-model".to_string(),
                    vision: "vision-model".to_string(),
                    chat: "chat-model".to_string(),
                },
                lookups: Mutex::new(Vec::new()),
            }
        }
    }

    impl ModelSource for FixedModels {
        fn model_for(
            &self,
            per_call_key: Option<&str>,
            user_id: Option<&str>,
        ) -> Arc<dyn CompletionModel> {
            self.lookups.lock().unwrap().push((
                per_call_key.map(str::to_string),
                user_id.map(str::to_string),
            ));
            self.model.clone()
        }

        fn names(&self) -> &ModelNames {
            &self.names
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        fetcher: Arc<StaticFetcher>,
        model: Arc<ScriptedModel>,
        models: Arc<FixedModels>,
        pipeline: ReportPipeline,
    }

    fn harness(reply: ScriptedModel, pdf_bytes: Vec<u8>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let model = Arc::new(reply);
        let models = Arc::new(FixedModels::new(model.clone()));
        let fetcher = Arc::new(StaticFetcher::new(pdf_bytes));
        let pipeline = ReportPipeline::new(
            store.clone(),
            store.clone(),
            models.clone(),
            fetcher.clone(),
        );
        Harness {
            store,
            fetcher,
            model,
            models,
            pipeline,
        }
    }

    fn request(document_ids: Vec<Uuid>, level: ReasoningLevel) -> GenerateReport {
        GenerateReport {
            title: "Annual checkup".to_string(),
            document_ids,
            notes: "patient reports fatigue".to_string(),
            reasoning_level: level,
            family_member_id: None,
        }
    }

    #[tokio::test]
    async fn end_to_end_report_from_pdf_and_cached_image() {
        let pdf = pdf_with_pages(&[&["Hemoglobin: 12.5 g/dL (normal 12.0-15.5)"]]);
        let h = harness(ScriptedModel::replying(MODEL_REPORT), pdf);

        let labs = h
            .pipeline
            .register_document(Document::new("labs.pdf", "pdf", "https://blob.example/labs.pdf"))
            .await
            .unwrap();
        let mut xray = Document::new("xray.png", "image", "https://blob.example/xray.png");
        xray.extracted_text = Some("Chest X-ray: no acute findings".to_string());
        let xray = h.pipeline.register_document(xray).await.unwrap();

        let report = h
            .pipeline
            .generate_report(request(vec![labs.id, xray.id], ReasoningLevel::Deep), &Caller::anonymous())
            .await
            .unwrap();

        assert!(report
            .content
            .lines()
            .any(|line| line.starts_with('|') && line.contains("Hemoglobin")));
        assert!(report.summary.chars().count() <= SUMMARY_LENGTH + 3);
        assert!(report.content.starts_with(report.summary.trim_end_matches("...")));
        assert_eq!(report.document_ids, vec![labs.id, xray.id]);

        // Only the report call reached the model; the image text came from the cache.
        let requests = h.model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].reasoning_budget, Some(8000));
        let prompt = requests[0].messages[0].text();
        assert!(prompt.contains("--- DOCUMENT: labs.pdf ---\nHemoglobin: 12.5 g/dL (normal 12.0-15.5)"));
        assert!(prompt.contains("--- DOCUMENT: xray.png ---\nChest X-ray: no acute findings"));
        assert!(prompt.contains("--- ADDITIONAL CONTEXT ---\npatient reports fatigue"));

        let cached = h.store.get_document(labs.id).await.unwrap().unwrap();
        assert_eq!(
            cached.cached_text(),
            Some("Hemoglobin: 12.5 g/dL (normal 12.0-15.5)")
        );

        let stored = h.pipeline.get_report(report.id).await.unwrap();
        let sections = stored.sections();
        assert!(sections.at_a_glance.starts_with("Your blood work looks normal"));
        assert!(!sections.detailed.contains("AT-A-GLANCE"));
    }

    #[tokio::test]
    async fn repeated_ids_are_extracted_prompted_and_linked_once() {
        let pdf = pdf_with_pages(&[&["Ferritin 45 ng/mL"]]);
        let h = harness(ScriptedModel::replying(MODEL_REPORT), pdf);
        let labs = h
            .pipeline
            .register_document(Document::new("labs.pdf", "pdf", "https://blob.example/labs.pdf"))
            .await
            .unwrap();
        let mut note = Document::new("note", "image", "https://blob.example/note.jpg");
        note.extracted_text = Some("Blood pressure 120/80".to_string());
        let note = h.pipeline.register_document(note).await.unwrap();

        let report = h
            .pipeline
            .generate_report(
                request(vec![labs.id, note.id, labs.id], ReasoningLevel::Standard),
                &Caller::anonymous(),
            )
            .await
            .unwrap();

        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(report.document_ids, vec![labs.id, note.id]);
        let prompt = h.model.requests()[0].messages[0].text();
        assert_eq!(prompt.matches("--- DOCUMENT: labs.pdf ---").count(), 1);

        let stored = h.pipeline.get_report(report.id).await.unwrap();
        assert_eq!(stored.document_ids, vec![labs.id, note.id]);
    }

    #[test]
    fn unique_ids_keep_first_occurrence_order() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(unique_ids(&[b, a, b, c, a]), vec![b, a, c]);
        assert!(unique_ids(&[]).is_empty());
    }

    #[tokio::test]
    async fn report_generation_validates_document_selection() {
        let h = harness(ScriptedModel::replying(MODEL_REPORT), Vec::new());
        let caller = Caller::anonymous();

        assert!(matches!(
            h.pipeline
                .generate_report(request(vec![], ReasoningLevel::Standard), &caller)
                .await,
            Err(PipelineError::NoDocumentsSelected)
        ));
        assert!(matches!(
            h.pipeline
                .generate_report(request(vec![Uuid::new_v4()], ReasoningLevel::Standard), &caller)
                .await,
            Err(PipelineError::NoValidDocuments)
        ));
        assert!(h.model.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_among_valid_ones_are_skipped() {
        let h = harness(ScriptedModel::replying(MODEL_REPORT), Vec::new());
        let mut note = Document::new("note", "image", "https://blob.example/note.jpg");
        note.extracted_text = Some("Blood pressure 120/80".to_string());
        let note = h.pipeline.register_document(note).await.unwrap();

        let report = h
            .pipeline
            .generate_report(
                request(vec![Uuid::new_v4(), note.id], ReasoningLevel::Standard),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(report.document_ids, vec![note.id]);
        assert_eq!(h.model.requests()[0].reasoning_budget, Some(4000));
    }

    #[tokio::test]
    async fn failed_model_call_still_stores_a_readable_report() {
        let h = harness(ScriptedModel::failing("rate limited"), Vec::new());
        let mut note = Document::new("note", "image", "https://blob.example/note.jpg");
        note.extracted_text = Some("Blood pressure 120/80".to_string());
        let note = h.pipeline.register_document(note).await.unwrap();

        let report = h
            .pipeline
            .generate_report(request(vec![note.id], ReasoningLevel::Comprehensive), &Caller::anonymous())
            .await
            .unwrap();
        let sections = h.pipeline.split_report_sections(&report.content);
        assert!(sections.at_a_glance.contains("unable to fully analyze"));
        assert!(sections.detailed.contains("rate limited"));
    }

    #[tokio::test]
    async fn extract_content_reports_cache_origin_on_second_call() {
        let pdf = pdf_with_pages(&[&["Platelets 250 x10^9/L"]]);
        let h = harness(ScriptedModel::replying("unused"), pdf);
        let labs = h
            .pipeline
            .register_document(Document::new("labs.pdf", "pdf", "https://blob.example/labs.pdf"))
            .await
            .unwrap();
        let caller = Caller::anonymous();

        let first = h.pipeline.extract_content(labs.id, false, &caller).await.unwrap();
        let second = h.pipeline.extract_content(labs.id, false, &caller).await.unwrap();
        let forced = h.pipeline.extract_content(labs.id, true, &caller).await.unwrap();

        assert_eq!(first.origin, ExtractionOrigin::Extracted);
        assert_eq!(second.origin, ExtractionOrigin::Cache);
        assert_eq!(forced.origin, ExtractionOrigin::Extracted);
        assert_eq!(first.text, "Platelets 250 x10^9/L");

        assert!(matches!(
            h.pipeline.extract_content(Uuid::new_v4(), false, &caller).await,
            Err(PipelineError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn caller_credentials_reach_the_model_source() {
        let h = harness(ScriptedModel::replying("Looks fine."), Vec::new());
        let mut note = Document::new("note", "image", "https://blob.example/note.jpg");
        note.extracted_text = Some("Blood pressure 120/80".to_string());
        let note = h.pipeline.register_document(note).await.unwrap();

        let caller = Caller {
            api_key: Some("sk-ant-call".to_string()),
            user_id: Some("user-1".to_string()),
        };
        let history = vec![ChatMessage {
            role: Role::User,
            content: "is this normal?".to_string(),
        }];
        let reply = h.pipeline.chat(note.id, history, false, &caller).await.unwrap();

        assert_eq!(reply, "Looks fine.");
        assert_eq!(h.model.requests()[0].model, "chat-model");
        let lookups = h.models.lookups.lock().unwrap();
        assert!(lookups
            .iter()
            .all(|lookup| lookup == &(Some("sk-ant-call".to_string()), Some("user-1".to_string()))));
    }
}
