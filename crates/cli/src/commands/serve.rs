//! HTTP server command.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question, as JSON or an NDJSON token stream |
//! | `POST` | `/faqs` | Add or update a FAQ entry; embedding happens in the background |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The updated conversation context travels in the `X-User-Context` response
//! header. Callers that keep no context of their own may send it back in the
//! same request header.
//!
//! Errors use `{ "error": { "code": "bad_request", "message": "..." } }`.

use crate::runtime::Runtime;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Args;
use faqroute_core::{config::AppConfig, AppError, AppResult};
use faqroute_pipeline::{AskRequest, ConversationContext, FaqEntry, FaqStore, Pipeline, Reply};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const CONTEXT_HEADER: &str = "x-user-context";

/// Serve the pipeline over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (overrides server.bind)
    #[arg(long, env = "FAQROUTE_BIND")]
    pub bind: Option<String>,
}

impl ServeCommand {
    /// Execute the serve command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let bind = self
            .bind
            .clone()
            .unwrap_or_else(|| config.server.bind.clone());

        let runtime = Runtime::build(config).await?;
        run_server(&runtime, &bind)
            .await
            .map_err(|e| AppError::Other(format!("Server failed: {}", e)))
    }
}

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    faqs: Arc<FaqStore>,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/faqs", post(handle_faq))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

async fn run_server(runtime: &Runtime, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        pipeline: Arc::clone(&runtime.pipeline),
        faqs: Arc::clone(&runtime.faqs),
    };

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error converted into an HTTP response.
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        if err.is_client_error() {
            ApiError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message: err.to_string(),
            }
        } else {
            ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message: err.to_string(),
            }
        }
    }
}

// ============ POST /ask ============

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    if request.context == ConversationContext::default() {
        if let Some(context) = header_context(&headers) {
            request.context = context;
        }
    }

    let outcome = state.pipeline.ask(request).await?;

    let mut response = match outcome.reply {
        Reply::Complete(answer) => Json(answer).into_response(),
        Reply::Stream(events) => {
            let lines = futures::stream::unfold(events, |mut events| async move {
                let event = events.recv().await?;
                let line = match serde_json::to_string(&event) {
                    Ok(json) => json + "\n",
                    Err(e) => {
                        tracing::error!("Failed to encode stream event: {}", e);
                        String::new()
                    }
                };
                Some((Ok::<_, Infallible>(line), events))
            });
            let mut response = Body::from_stream(lines).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/x-ndjson"),
            );
            response
        }
    };

    if let Some(value) = context_header(&outcome.context) {
        response.headers_mut().insert(CONTEXT_HEADER, value);
    }
    Ok(response)
}

/// Context sent by the caller in `X-User-Context`, if it parses.
fn header_context(headers: &HeaderMap) -> Option<ConversationContext> {
    let raw = headers.get(CONTEXT_HEADER)?;
    match serde_json::from_slice(raw.as_bytes()) {
        Ok(context) => Some(context),
        Err(e) => {
            tracing::warn!("Ignoring malformed {} header: {}", CONTEXT_HEADER, e);
            None
        }
    }
}

fn context_header(context: &ConversationContext) -> Option<HeaderValue> {
    let json = serde_json::to_string(context).ok()?;
    match HeaderValue::from_bytes(json.as_bytes()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Context not representable as a header: {}", e);
            None
        }
    }
}

// ============ POST /faqs ============

async fn handle_faq(
    State(state): State<AppState>,
    Json(entry): Json<FaqEntry>,
) -> Result<(StatusCode, Json<FaqEntry>), ApiError> {
    let entry = state.faqs.upsert(entry).await?;
    tracing::info!("FAQ {} committed", entry.id);
    Ok((StatusCode::ACCEPTED, Json(entry)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
