//! HTTP transport: the SSE endpoint streaming pipeline progress events.
//!
//! The pipeline itself is transport-agnostic; this module only drains the
//! progress channel into `text/event-stream` frames (one `event:` +
//! `data:` pair per event, flushed as produced).

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::events::EventSink;
use crate::core::models::FinalVerdict;
use crate::core::pipeline::VerificationPipeline;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<VerificationPipeline>,
    config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    email: Option<String>,
    stream: Option<String>,
}

/// Builds the application router.
pub fn router(pipeline: Arc<VerificationPipeline>, config: Arc<Config>) -> Router {
    let state = AppState { pipeline, config };
    Router::new()
        .route("/verify", get(verify_handler))
        .route("/healthz", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listener and serves until the process is stopped.
pub async fn serve(config: Config) -> Result<()> {
    let listen_addr = config.listen_addr.clone();
    let pipeline = Arc::new(VerificationPipeline::new(&config).await?);
    let app = router(pipeline, Arc::new(config));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| AppError::Initialization(format!("Cannot bind {}: {}", listen_addr, e)))?;
    tracing::info!("email-sentinel listening on http://{}", listen_addr);

    axum::serve(listener, app).await.map_err(AppError::Io)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn verify_handler(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let email = params.email.unwrap_or_default();

    if params.stream.is_some() {
        stream_verification(state, email).into_response()
    } else {
        blocking_verification(state, email).await.into_response()
    }
}

/// Stream mode: the connection stays open for the whole pipeline run and
/// observes each event as it is produced.
fn stream_verification(
    state: AppState,
    email: String,
) -> impl IntoResponse {
    let (sink, rx) = EventSink::channel();
    let ceiling = state.config.max_execution_time;

    tokio::spawn(async move {
        match tokio::time::timeout(ceiling, state.pipeline.verify(&email, &sink)).await {
            Ok(verdict) => {
                tracing::debug!(target: "sse_task",
                    "Stream verification for <{}> finished (success: {})",
                    email, verdict.success);
            }
            Err(_) => {
                tracing::error!(target: "sse_task",
                    "Verification for <{}> hit the {}s execution ceiling",
                    email, ceiling.as_secs());
                sink.error(
                    "Verification aborted",
                    Some(format!(
                        "Execution time ceiling of {}s reached",
                        ceiling.as_secs()
                    )),
                );
            }
        }
        // sink drops here, ending the stream after the terminal event.
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        Ok::<Event, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.payload().to_string()),
        )
    });

    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

/// Non-stream mode: run the pipeline to completion and answer with the
/// terminal verdict as JSON.
async fn blocking_verification(state: AppState, email: String) -> Json<FinalVerdict> {
    let ceiling = state.config.max_execution_time;
    let verdict = match tokio::time::timeout(
        ceiling,
        state.pipeline.verify(&email, &EventSink::disabled()),
    )
    .await
    {
        Ok(verdict) => verdict,
        Err(_) => FinalVerdict::failure(format!(
            "Verification aborted: execution time ceiling of {}s reached",
            ceiling.as_secs()
        )),
    };
    Json(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    async fn spawn_server() -> String {
        let mut config = Config::default();
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        config.cache_path = std::env::temp_dir()
            .join(format!(
                "email-sentinel-server-test-{}-{}.json",
                std::process::id(),
                n
            ))
            .to_string_lossy()
            .into_owned();

        let pipeline = Arc::new(VerificationPipeline::new(&config).await.unwrap());
        let app = router(pipeline, Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let base = spawn_server().await;
        let body: serde_json::Value = reqwest::get(format!("{}/healthz", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn stream_mode_frames_events_and_ends_with_a_terminal_event() {
        let base = spawn_server().await;
        // An invalid-format address terminates without any network stage.
        let response = reqwest::get(format!(
            "{}/verify?stream=1&email=not-an-address",
            base
        ))
        .await
        .unwrap();

        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let body = response.text().await.unwrap();
        assert!(body.contains("event: step"));
        assert!(body.contains("event: result"));
        assert!(body.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn blocking_mode_returns_the_verdict_as_json() {
        let base = spawn_server().await;
        let verdict: FinalVerdict = reqwest::get(format!("{}/verify?email=nope", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!verdict.success);
        assert_eq!(verdict.message, "Invalid email format");
    }

    #[tokio::test]
    async fn missing_email_in_stream_mode_yields_an_error_event() {
        let base = spawn_server().await;
        let body = reqwest::get(format!("{}/verify?stream=1", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("event: error"));
        assert!(body.contains("Missing email address"));
    }
}
