use axum::{
    Router,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{
        Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post, put},
};
use futures_util::{Stream, StreamExt};
use medical_report_core::{
    ApiKeyResolver, AppConfig, Caller, ConfigError, Document, DocumentStore, GenerateReport,
    HttpFetcher, InMemoryStore, ModelFactory, PipelineError, PostgresStore, ReasoningLevel,
    ReportPipeline, ReportStore, StreamEvent,
};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::models::{
    ApiKeySettingsRequest, ChatRequest, DocumentResponse, ExtractRequest, ExtractResponse,
    GenerateReportRequest, GenerateReportResponse, RegisterDocumentRequest, ReportResponse,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

const API_KEY_HEADER: &str = "x-api-key";
const USER_ID_HEADER: &str = "x-user-id";
const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const DEFAULT_REPORT_TITLE: &str = "Medical Report";

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn pipeline_error(e: PipelineError) -> ApiError {
    match e {
        PipelineError::DocumentNotFound(id) => not_found_error("Document not found", &id),
        PipelineError::ReportNotFound(id) => not_found_error("Report not found", &id),
        PipelineError::NoDocumentsSelected
        | PipelineError::NoValidDocuments
        | PipelineError::EmptyConversation => bad_request_error(&e.to_string()),
        PipelineError::EmptyReport => internal_error("Failed to generate report", &e.to_string()),
        PipelineError::Store(_) => {
            error!(error = %e, "storage failure");
            internal_error("Storage error", &e.to_string())
        }
        PipelineError::Model(_) => {
            error!(error = %e, "model call failed");
            internal_error("Model service error", &e.to_string())
        }
        PipelineError::Cancelled(_) => internal_error("Request was cancelled", &e.to_string()),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReportPipeline>,
    pub keys: Arc<ApiKeyResolver>,
}

pub async fn create_app(config: &AppConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;
    Ok(build_router(app_state))
}

async fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let keys = Arc::new(ApiKeyResolver::new(
        config.model.provider,
        config.default_api_key.clone(),
    ));
    if config.default_api_key.is_none() {
        warn!(
            variable = config.model.provider.api_key_var(),
            "no default API key configured; model calls need a per-call or per-user key"
        );
    }

    let models = ModelFactory::new(config.model.clone(), keys.clone())?;
    let fetcher = Arc::new(HttpFetcher::new(models.http_client()));
    let (documents, reports) = create_stores(config.database_url.as_deref()).await;

    let pipeline = ReportPipeline::new(documents, reports, Arc::new(models), fetcher);
    Ok(AppState {
        pipeline: Arc::new(pipeline),
        keys,
    })
}

async fn create_stores(
    database_url: Option<&str>,
) -> (Arc<dyn DocumentStore>, Arc<dyn ReportStore>) {
    if let Some(database_url) = database_url {
        info!("Using PostgreSQL storage");
        match PostgresStore::connect(database_url).await {
            Ok(store) => {
                let store = Arc::new(store);
                return (store.clone(), store);
            }
            Err(e) => {
                error!(
                    "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                    e
                );
            }
        }
    } else {
        info!("Using in-memory storage (set DATABASE_URL to use PostgreSQL)");
    }

    let store = Arc::new(InMemoryStore::new());
    (store.clone(), store)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/documents", post(register_document))
        .route("/documents/{id}/extract", post(extract_document))
        .route("/documents/{id}/chat", post(chat))
        .route("/documents/{id}/chat/stream", post(chat_stream))
        .route("/reports/generate", post(generate_report))
        .route("/reports/{id}", get(get_report))
        .route("/settings/api-key", put(set_api_key))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags each request with a correlation id and runs it inside an `http_request` span.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn caller(headers: &HeaderMap) -> Caller {
    Caller {
        api_key: header_value(headers, API_KEY_HEADER),
        user_id: header_value(headers, USER_ID_HEADER),
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Report Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Text extraction from medical PDFs and images, document chat, and plain-language reports across documents",
        "endpoints": {
            "POST /documents": "Register a document ({name, type, url}; url may be a data URL)",
            "POST /documents/{id}/extract": "Extract or fetch cached document text",
            "POST /documents/{id}/chat": "Ask a question about one document",
            "POST /documents/{id}/chat/stream": "Same as chat, streamed as server-sent events",
            "POST /reports/generate": "Generate a report from several documents",
            "GET /reports/{id}": "Get a report with its at-a-glance and detailed sections",
            "PUT /settings/api-key": "Store or clear the caller's model API key",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn register_document(
    State(state): State<AppState>,
    Json(request): Json<RegisterDocumentRequest>,
) -> ApiResult<DocumentResponse> {
    if request.name.trim().is_empty() {
        return Err(bad_request_error("Document name is required"));
    }
    if request.url.trim().is_empty() {
        return Err(bad_request_error("Document url is required"));
    }

    let document = Document::new(request.name.trim(), &request.source_type, request.url.trim());
    let document = state
        .pipeline
        .register_document(document)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(DocumentResponse::from(&document)))
}

async fn extract_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<ExtractResponse> {
    info!(%document_id, force_refresh = request.force_refresh, "content extraction requested");

    let result = state
        .pipeline
        .extract_content(document_id, request.force_refresh, &caller(&headers))
        .await
        .map_err(pipeline_error)?;
    Ok(Json(ExtractResponse::from(result)))
}

async fn chat(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Value> {
    let reply = state
        .pipeline
        .chat(
            document_id,
            request.messages,
            request.reasoning,
            &caller(&headers),
        )
        .await
        .map_err(pipeline_error)?;
    Ok(Json(json!({ "reply": reply })))
}

async fn chat_stream(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let stream = state
        .pipeline
        .chat_stream(
            document_id,
            request.messages,
            request.reasoning,
            &caller(&headers),
        )
        .await
        .map_err(pipeline_error)?;

    let events = stream.map(|event| {
        Ok(match event {
            Ok(StreamEvent::TextDelta(text)) => Event::default().event("text").data(text),
            Ok(StreamEvent::ReasoningDelta(text)) => {
                Event::default().event("reasoning").data(text)
            }
            Ok(StreamEvent::Done) => Event::default().event("done").data("[DONE]"),
            Err(e) => {
                error!(error = %e, "chat stream failed");
                Event::default()
                    .event("error")
                    .data("An error occurred, please try again!")
            }
        })
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn generate_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateReportRequest>,
) -> ApiResult<GenerateReportResponse> {
    let reasoning_level = match request.reasoning_level.as_deref() {
        None => ReasoningLevel::default(),
        Some(label) => label
            .parse::<ReasoningLevel>()
            .map_err(|e| bad_request_error(&e.to_string()))?,
    };
    let title = request
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| DEFAULT_REPORT_TITLE.to_string());

    info!(
        documents = request.document_ids.len(),
        %reasoning_level,
        "report generation requested"
    );

    let report = state
        .pipeline
        .generate_report(
            GenerateReport {
                title,
                document_ids: request.document_ids,
                notes: request.notes,
                reasoning_level,
                family_member_id: request.family_member_id,
            },
            &caller(&headers),
        )
        .await
        .map_err(pipeline_error)?;

    Ok(Json(GenerateReportResponse {
        report_id: report.id,
        title: report.title,
        summary: report.summary,
    }))
}

async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
) -> ApiResult<ReportResponse> {
    let report = state
        .pipeline
        .get_report(report_id)
        .await
        .map_err(pipeline_error)?;
    Ok(Json(ReportResponse::from(report)))
}

async fn set_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ApiKeySettingsRequest>,
) -> ApiResult<Value> {
    let Some(user_id) = header_value(&headers, USER_ID_HEADER) else {
        return Err(bad_request_error("x-user-id header is required"));
    };

    state
        .keys
        .set_user_key(&user_id, &request.api_key)
        .map_err(|e| match e {
            ConfigError::InvalidApiKey(_) => bad_request_error(&e.to_string()),
            other => internal_error("Failed to store API key", &other.to_string()),
        })?;

    let has_api_key = state.keys.has_user_key(&user_id);
    info!(%user_id, has_api_key, "API key preference updated");
    Ok(Json(json!({ "has_api_key": has_api_key })))
}
