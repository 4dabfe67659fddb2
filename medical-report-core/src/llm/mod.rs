//! Client side of the external text-completion service.
//!
//! The pipeline only depends on [`CompletionModel`]; the rig-backed provider
//! client is selected from configuration and receives its API key at construction.

pub mod provider;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{ApiKeyResolver, ModelNames, ModelSettings};
use crate::error::ModelError;

pub use provider::RigModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(ImageSource),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Concatenated text parts, ignoring images.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One call to the model: visible output is capped by `max_output_tokens`, and
/// `reasoning_budget` is an extra allowance for internal deliberation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_output_tokens: u32,
    pub reasoning_budget: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages,
            max_output_tokens: 4000,
            reasoning_budget: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_reasoning_budget(mut self, budget: u32) -> Self {
        self.reasoning_budget = Some(budget);
        self
    }

    /// Total token ceiling; reasoning is counted inside `max_tokens`.
    pub fn total_token_limit(&self) -> u32 {
        self.max_output_tokens + self.reasoning_budget.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
}

/// Incremental events of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ReasoningDelta(String),
    Done,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ModelError>> + Send>>;

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ModelError>;

    /// Streams the completion. Backends without streaming deliver the whole text as one delta.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, ModelError> {
        let completion = self.complete(request).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![
            Ok(StreamEvent::TextDelta(completion.text)),
            Ok(StreamEvent::Done),
        ])))
    }
}

/// Hands out a model client bound to the key that applies to one caller.
pub trait ModelSource: Send + Sync {
    fn model_for(
        &self,
        per_call_key: Option<&str>,
        user_id: Option<&str>,
    ) -> Arc<dyn CompletionModel>;

    fn names(&self) -> &ModelNames;
}

pub struct ModelFactory {
    settings: ModelSettings,
    http: reqwest::Client,
    keys: Arc<ApiKeyResolver>,
}

impl ModelFactory {
    pub fn new(settings: ModelSettings, keys: Arc<ApiKeyResolver>) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            settings,
            http,
            keys,
        })
    }

    /// Shared client for document fetches, bounded by the configured timeout.
    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }
}

impl ModelSource for ModelFactory {
    fn model_for(
        &self,
        per_call_key: Option<&str>,
        user_id: Option<&str>,
    ) -> Arc<dyn CompletionModel> {
        let api_key = self.keys.resolve(per_call_key, user_id);
        Arc::new(RigModel::new(self.settings.provider, api_key.as_deref()))
    }

    fn names(&self) -> &ModelNames {
        &self.settings.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelProvider;
    use futures_util::StreamExt;

    struct Echo;

    #[async_trait]
    impl CompletionModel for Echo {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, ModelError> {
            Ok(Completion {
                text: request.messages[0].text(),
            })
        }
    }

    #[test]
    fn reasoning_budget_is_added_to_output_limit() {
        let request = CompletionRequest::new("m", vec![Message::user("hi")])
            .with_max_output_tokens(2000)
            .with_reasoning_budget(8000);
        assert_eq!(request.total_token_limit(), 10000);

        let plain = CompletionRequest::new("m", vec![Message::user("hi")]);
        assert_eq!(plain.total_token_limit(), 4000);
    }

    #[tokio::test]
    async fn default_stream_yields_single_delta_then_done() {
        let stream = Echo
            .stream(CompletionRequest::new("m", vec![Message::user("hello")]))
            .await
            .unwrap();
        let events: Vec<StreamEvent> = stream.map(|event| event.unwrap()).collect().await;
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("hello".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn factory_binds_resolved_key() {
        let keys = Arc::new(ApiKeyResolver::new(ModelProvider::Anthropic, None));
        let settings = ModelSettings {
            provider: ModelProvider::Anthropic,
            names: ModelNames::uniform("claude"),
            timeout: std::time::Duration::from_secs(5),
        };
        let factory = ModelFactory::new(settings, keys).unwrap();
        assert_eq!(factory.names().chat, "claude");
        // Construction never fails without a key; the call itself reports it.
        let _model = factory.model_for(None, None);
    }
}
