//! Completion backends built on rig's provider clients.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use rig::OneOrMany;
use rig::client::CompletionClient;
use rig::completion::{AssistantContent, CompletionModel as RigCompletionModel};
use rig::message::{ContentFormat, ImageMediaType, Message as RigMessage, UserContent};
use rig::providers::{anthropic, openrouter};
use rig::streaming::StreamedAssistantContent;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{
    Completion, CompletionModel, CompletionRequest, CompletionStream, ContentPart, ImageSource,
    Message, Role, StreamEvent,
};
use crate::config::ModelProvider;
use crate::error::ModelError;

#[derive(Clone)]
enum ProviderClient {
    Anthropic(anthropic::Client),
    OpenRouter(openrouter::Client),
}

impl ProviderClient {
    fn provider(&self) -> ModelProvider {
        match self {
            ProviderClient::Anthropic(_) => ModelProvider::Anthropic,
            ProviderClient::OpenRouter(_) => ModelProvider::OpenRouter,
        }
    }
}

/// A provider client bound to one API key. Without a key every call fails with
/// [`ModelError::MissingApiKey`].
pub struct RigModel {
    client: Option<ProviderClient>,
}

impl RigModel {
    pub fn new(provider: ModelProvider, api_key: Option<&str>) -> Self {
        let client = api_key.map(|key| match provider {
            ModelProvider::Anthropic => ProviderClient::Anthropic(anthropic::Client::new(key)),
            ModelProvider::OpenRouter => ProviderClient::OpenRouter(openrouter::Client::new(key)),
        });
        Self { client }
    }

    fn client(&self) -> Result<&ProviderClient, ModelError> {
        self.client.as_ref().ok_or(ModelError::MissingApiKey)
    }
}

#[async_trait]
impl CompletionModel for RigModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ModelError> {
        let client = self.client()?;
        debug!(
            provider = ?client.provider(),
            model = %request.model,
            max_output_tokens = request.max_output_tokens,
            reasoning_budget = ?request.reasoning_budget,
            "calling completion model"
        );

        let model_name = request.model.clone();
        let text = match client {
            ProviderClient::Anthropic(client) => {
                let model = client.completion_model(&request.model);
                complete_with(model, ModelProvider::Anthropic, request).await?
            }
            ProviderClient::OpenRouter(client) => {
                let model = client.completion_model(&request.model);
                complete_with(model, ModelProvider::OpenRouter, request).await?
            }
        };

        info!(model = %model_name, characters = text.len(), "completion received");
        Ok(Completion { text })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, ModelError> {
        let client = self.client()?;
        debug!(provider = ?client.provider(), model = %request.model, "streaming completion");

        match client {
            ProviderClient::Anthropic(client) => {
                let model = client.completion_model(&request.model);
                stream_with(model, ModelProvider::Anthropic, request).await
            }
            ProviderClient::OpenRouter(client) => {
                let model = client.completion_model(&request.model);
                stream_with(model, ModelProvider::OpenRouter, request).await
            }
        }
    }
}

async fn complete_with<M>(
    model: M,
    provider: ModelProvider,
    request: CompletionRequest,
) -> Result<String, ModelError>
where
    M: RigCompletionModel,
{
    let response = request_builder(&model, provider, request)?.send().await?;

    Ok(response
        .choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(""))
}

async fn stream_with<M>(
    model: M,
    provider: ModelProvider,
    request: CompletionRequest,
) -> Result<CompletionStream, ModelError>
where
    M: RigCompletionModel + 'static,
    M::StreamingResponse: Send + 'static,
{
    let response = request_builder(&model, provider, request)?.stream().await?;

    let chunks = response.map(|item| {
        item.map_err(ModelError::from).map(|content| match content {
            StreamedAssistantContent::Text(text) => StreamChunk::Text(text.text),
            StreamedAssistantContent::Reasoning(reasoning) => {
                let value = serde_json::to_value(&reasoning).unwrap_or_default();
                StreamChunk::Reasoning(reasoning_text(&value))
            }
            StreamedAssistantContent::Final(_) => StreamChunk::Finished,
            _ => StreamChunk::Skipped,
        })
    });
    Ok(stream_events(Box::pin(chunks)))
}

fn request_builder<M>(
    model: &M,
    provider: ModelProvider,
    request: CompletionRequest,
) -> Result<rig::completion::CompletionRequestBuilder<M>, ModelError>
where
    M: RigCompletionModel,
{
    let max_tokens = u64::from(request.total_token_limit());
    let params = request
        .reasoning_budget
        .map(|budget| reasoning_params(provider, budget));

    let mut messages = request
        .messages
        .into_iter()
        .map(to_rig_message)
        .collect::<Result<Vec<_>, _>>()?;
    let prompt = messages
        .pop()
        .ok_or_else(|| ModelError::InvalidRequest("request has no messages".to_string()))?;

    let mut builder = model
        .completion_request(prompt)
        .messages(messages)
        .max_tokens(max_tokens);
    if let Some(system) = request.system {
        builder = builder.preamble(system);
    }
    if let Some(params) = params {
        builder = builder.additional_params(params);
    }
    Ok(builder)
}

/// Provider-specific body fields that grant the reasoning budget.
pub(crate) fn reasoning_params(provider: ModelProvider, budget: u32) -> Value {
    match provider {
        ModelProvider::Anthropic => json!({
            "thinking": { "type": "enabled", "budget_tokens": budget }
        }),
        ModelProvider::OpenRouter => json!({
            "reasoning": { "max_tokens": budget }
        }),
    }
}

fn to_rig_message(message: Message) -> Result<RigMessage, ModelError> {
    match message.role {
        Role::Assistant => Ok(RigMessage::assistant(message.text())),
        Role::User => {
            let content = message
                .parts
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text(text) => UserContent::text(text),
                    ContentPart::Image(ImageSource::Base64 { media_type, data }) => {
                        UserContent::image(
                            data,
                            Some(ContentFormat::Base64),
                            image_media_type(&media_type),
                            None,
                        )
                    }
                    ContentPart::Image(ImageSource::Url(url)) => {
                        UserContent::image(url, Some(ContentFormat::String), None, None)
                    }
                })
                .collect::<Vec<_>>();
            let content = OneOrMany::many(content)
                .map_err(|_| ModelError::InvalidRequest("message has no content".to_string()))?;
            Ok(RigMessage::User { content })
        }
    }
}

pub(crate) fn image_media_type(media_type: &str) -> Option<ImageMediaType> {
    match media_type {
        "image/jpeg" | "image/jpg" => Some(ImageMediaType::JPEG),
        "image/png" => Some(ImageMediaType::PNG),
        "image/gif" => Some(ImageMediaType::GIF),
        "image/webp" => Some(ImageMediaType::WEBP),
        "image/heic" => Some(ImageMediaType::HEIC),
        "image/heif" => Some(ImageMediaType::HEIF),
        _ => None,
    }
}

/// Reasoning text, whether serialized as one string or as a list of parts.
fn reasoning_text(value: &Value) -> String {
    match value.get("reasoning") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamChunk {
    Text(String),
    Reasoning(String),
    Finished,
    Skipped,
}

/// Turns provider chunks into [`StreamEvent`]s. `Done` is only emitted once the
/// provider reports the final response; a body that ends before that is an error.
pub(crate) fn stream_events<S>(chunks: S) -> CompletionStream
where
    S: Stream<Item = Result<StreamChunk, ModelError>> + Send + Unpin + 'static,
{
    Box::pin(stream::unfold(Some(chunks), |state| async move {
        let mut chunks = state?;
        loop {
            let event = match chunks.next().await {
                Some(Ok(StreamChunk::Text(text))) => Ok(StreamEvent::TextDelta(text)),
                Some(Ok(StreamChunk::Reasoning(text))) if !text.is_empty() => {
                    Ok(StreamEvent::ReasoningDelta(text))
                }
                Some(Ok(StreamChunk::Reasoning(_) | StreamChunk::Skipped)) => continue,
                Some(Ok(StreamChunk::Finished)) => return Some((Ok(StreamEvent::Done), None)),
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    return Some((
                        Err(ModelError::Stream("stream ended early".to_string())),
                        None,
                    ));
                }
            };
            return Some((event, Some(chunks)));
        }
    }))
}
