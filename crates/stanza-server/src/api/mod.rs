//! HTTP API
//!
//! Two routes: `POST /add-posts` accepts a batch of post rows (pre-parsed
//! or as raw CSV text) and `GET /health` reports liveness. A batch is
//! acknowledged with `{"message": "Success"}` once every row has been
//! validated and dispatched; document creation continues in the queue
//! worker after the response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::cms::CmsClient;
use crate::config::{Config, MAX_BODY_BYTES};
use crate::error::{AppError, AppResult};
use crate::ingest::mapper::MapperContext;
use crate::ingest::orchestrator::Orchestrator;
use crate::ingest::queue::{JobQueue, RetryPolicy};
use crate::ingest::report::ReportMailer;
use crate::ingest::rows::{parse_csv, ParseError, RowRecord};
use crate::ingest::upload::ImageUploader;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    default_dataset: String,
}

/// The wired application: routes plus the queue that backs them
pub struct App {
    pub router: Router,
    pub queue: JobQueue,
}

/// Wire the pipeline and build the router
pub fn build_app(config: &Config) -> AppResult<App> {
    let cms = Arc::new(
        CmsClient::new(&config.cms).map_err(|e| AppError::Config(e.to_string()))?,
    );
    let uploader = ImageUploader::new(config.ingest.image_fetch_timeout_secs)
        .map_err(|e| AppError::Config(e.to_string()))?;
    let mailer = ReportMailer::new(config.report.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;

    let queue = JobQueue::start(
        MapperContext::new(cms, uploader),
        RetryPolicy::from_config(&config.ingest),
    );
    let orchestrator = Orchestrator::new(queue.sender(), Arc::new(mailer), &config.ingest);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        default_dataset: config.cms.dataset.clone(),
    };

    Ok(App {
        router: create_router(state),
        queue,
    })
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/add-posts", post(add_posts))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// One batch submission
///
/// Rows arrive either pre-parsed under `data` or as raw CSV text under
/// `csv`; `data` wins when both are present. `dataset` falls back to the
/// configured default.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub data: Option<Vec<RowRecord>>,
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
}

/// Batch submission handler
#[tracing::instrument(skip(state, request))]
async fn add_posts(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let rows = match (request.data, request.csv) {
        (Some(rows), _) if !rows.is_empty() => rows,
        (_, Some(csv)) => parse_csv(&csv).map_err(|e| AppError::Parse(e.to_string()))?,
        _ => return Err(AppError::Parse(ParseError::Empty.to_string())),
    };

    let dataset = request
        .dataset
        .unwrap_or_else(|| state.default_dataset.clone());

    let outcome = state.orchestrator.run_batch(rows, &dataset).await;
    tracing::info!(
        total = outcome.total,
        enqueued = outcome.enqueued,
        failed = outcome.errors.len(),
        dataset = %dataset,
        "Batch accepted"
    );

    Ok(Json(json!({ "message": "Success" })))
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Run the server until a shutdown signal arrives, then drain the queue
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let app = build_app(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {addr}");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the worker finish jobs that were accepted before the signal.
    let drain = tokio::time::timeout(
        Duration::from_secs(config.server.shutdown_timeout_secs),
        app.queue.shutdown(),
    );
    if drain.await.is_err() {
        tracing::warn!("Shutdown timeout elapsed with jobs still pending");
    }

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CmsConfig, IngestConfig, ReportConfig, ServerConfig};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                shutdown_timeout_secs: 1,
            },
            cms: CmsConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                token: None,
                api_version: "2022-03-13".to_string(),
                dataset: "production".to_string(),
            },
            ingest: IngestConfig {
                job_attempts: 1,
                job_backoff_ms: 1,
                row_delay_ms: 0,
                image_fetch_timeout_secs: 1,
            },
            report: ReportConfig {
                api_base_url: "http://127.0.0.1:9".to_string(),
                api_key: None,
                to: Vec::new(),
                from_email: "noreply@example.com".to_string(),
                from_name: "Stanza".to_string(),
            },
        }
    }

    fn json_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/add-posts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_ok() {
        let app = build_app(&test_config()).unwrap();
        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_submission_is_rejected() {
        let app = build_app(&test_config()).unwrap();
        let response = app
            .router
            .oneshot(json_request(json!({ "dataset": "staging" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "CSV text is empty or not properly loaded");
    }

    #[tokio::test]
    async fn test_empty_csv_text_is_rejected() {
        let app = build_app(&test_config()).unwrap();
        let response = app
            .router
            .oneshot(json_request(json!({ "csv": "", "dataset": "staging" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
