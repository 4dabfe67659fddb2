use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::PipelineError;
use crate::extraction::ExtractionOrchestrator;
use crate::llm::{CompletionModel, CompletionRequest, CompletionStream, Message, Role};
use crate::models::Document;

pub const CHAT_REASONING_BUDGET: u32 = 12000;

const GENERIC_SYSTEM_PROMPT: &str =
    "You are a friendly assistant. Do not use emojis in your responses.";

/// One turn of a conversation as exchanged with clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<ChatMessage> for Message {
    fn from(message: ChatMessage) -> Self {
        match message.role {
            Role::User => Message::user(message.content),
            Role::Assistant => Message::assistant(message.content),
        }
    }
}

/// Assistant grounded in the text of a single document.
pub struct DocumentChat {
    orchestrator: ExtractionOrchestrator,
    model: Arc<dyn CompletionModel>,
    model_name: String,
}

impl DocumentChat {
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

    pub fn system_prompt(name: Option<&str>, content: Option<&str>) -> String {
        let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
            return GENERIC_SYSTEM_PROMPT.to_string();
        };
        let label = name
            .filter(|n| !n.is_empty())
            .map(|n| format!(" ({n})"))
            .unwrap_or_default();

        format!(
            "You are a friendly medical document assistant that helps users understand their medical documents.

The following is the content of a medical document{label}:

\"\"\"
{content}
\"\"\"

When answering questions about this document:
1. Provide clear, simple explanations of medical terms
2. Highlight important findings and what they mean
3. Do not make up information that isn't in the document
4. If you're uncertain about something, be honest about it
5. Do not use emojis in your responses
6. Always refer to the specific information in the document
7. If asked about test results, mention the specific values and normal ranges from the document"
        )
    }

    /// Makes sure the document text is available (cache first) and builds the model request.
    pub async fn request(
        &self,
        document: &mut Document,
        history: Vec<ChatMessage>,
        reasoning: bool,
    ) -> Result<CompletionRequest, PipelineError> {
        if history.is_empty() {
            return Err(PipelineError::EmptyConversation);
        }
        let extraction = self.orchestrator.extract(document, false).await?;
        let system = Self::system_prompt(Some(&document.name), Some(&extraction.text));

        let messages = history.into_iter().map(Message::from).collect();
        let mut request =
            CompletionRequest::new(self.model_name.clone(), messages).with_system(system);
        if reasoning {
            request = request.with_reasoning_budget(CHAT_REASONING_BUDGET);
        }
        Ok(request)
    }

    pub async fn reply(
        &self,
        document: &mut Document,
        history: Vec<ChatMessage>,
        reasoning: bool,
    ) -> Result<String, PipelineError> {
        let request = self.request(document, history, reasoning).await?;
        info!(document_id = %document.id, reasoning, "answering document chat");
        Ok(self.model.complete(request).await?.text)
    }

    pub async fn reply_stream(
        &self,
        document: &mut Document,
        history: Vec<ChatMessage>,
        reasoning: bool,
    ) -> Result<CompletionStream, PipelineError> {
        let request = self.request(document, history, reasoning).await?;
        info!(document_id = %document.id, reasoning, "streaming document chat");
        Ok(self.model.stream(request).await?)
    }
}
