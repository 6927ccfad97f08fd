//! HTTP Server for the Excel-Cleaner API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                                   |
//! |--------|-------------------|-----------------------------------------------|
//! | GET    | `/health`         | Health check                                  |
//! | POST   | `/api/upload`     | Upload file (+ optional `spec`) for a full run|
//! | POST   | `/api/profile`    | Upload file, get column profiles only         |
//!
//! Uploads are `.csv`, `.xlsx` or `.xls`; workbooks contribute their first sheet.
//! | GET    | `/api/logs`       | SSE stream for real-time logs                 |
//!
//! Each run executes on the blocking pool with its own cancellation token.
//! The token fires when the request timeout elapses or the client goes away.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{error_response, AnalysisResponse, CsvMetadata, ProfileResponse};
use crate::config::{is_allowed_file, AppConfig, ALLOWED_EXTENSIONS};
use crate::error::{CsvError, PipelineError, ServerError, ServerResult};
use crate::parser::load_upload;
use crate::profile::profile_table;
use crate::report::analyze;
use crate::transform::PipelineSpec;

/// Room for the `spec` field and multipart framing on top of the file limit.
const MULTIPART_OVERHEAD: usize = 256 * 1024;

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
}

/// All routes with CORS and the upload body limit applied.
pub fn router(config: AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let body_limit = config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let state = AppState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_csv))
        .route("/api/profile", post(profile_csv))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    log_success(format!("🚀 Excel-Cleaner server running on http://localhost:{}", port));
    log_info("   POST /api/upload  - Upload CSV/Excel file (+ spec)");
    log_info("   POST /api/profile - Profile CSV/Excel file");
    log_info("   GET  /api/logs    - SSE log stream");
    log_info("   GET  /health      - Health check");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "excel-cleaner",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "profile": "POST /api/profile",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields of an upload form.
struct UploadForm {
    file_name: Option<String>,
    bytes: Vec<u8>,
    spec: Option<String>,
}

async fn read_form(mut multipart: Multipart, limit: usize) -> ServerResult<UploadForm> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut spec = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "spec" => {
                spec = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    if bytes.len() > limit {
        return Err(ServerError::PayloadTooLarge { limit });
    }
    if let Some(name) = file_name.as_deref() {
        if !is_allowed_file(name) {
            return Err(ServerError::BadRequest(format!(
                "'{}' is not an allowed file type (expected .{})",
                name,
                ALLOWED_EXTENSIONS.join(", .")
            )));
        }
    }

    Ok(UploadForm {
        file_name,
        bytes,
        spec: spec.filter(|s| !s.trim().is_empty()),
    })
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge { limit }
    } else {
        ServerError::BadRequest(format!("Multipart error: {}", err.body_text()))
    }
}

/// Upload endpoint: load, clean, calculate, aggregate.
async fn upload_csv(State(state): State<AppState>, multipart: Multipart) -> ServerResult<Json<AnalysisResponse>> {
    let form = read_form(multipart, state.config.max_upload_bytes).await?;
    let spec = match form.spec.as_deref() {
        Some(json) => PipelineSpec::from_json(json)?,
        None => PipelineSpec::default(),
    };

    log_info(format!(
        "📄 NEW UPLOAD: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        form.bytes.len()
    ));

    let preview_rows = state.config.preview_rows;
    let file_name = form.file_name;
    let bytes = form.bytes;
    let response = run_blocking(state.config.request_timeout, move |cancel| {
        let loaded = load_upload(&bytes, file_name.as_deref())?;
        let analysis = analyze(&loaded.table, &spec, &cancel)?;
        Ok(AnalysisResponse::new(CsvMetadata::new(file_name, &loaded), analysis, preview_rows))
    })
    .await?;

    log_success(format!("Job {} finished ({})", response.job_id, response.status));
    Ok(Json(response))
}

/// Profile-only endpoint; honors the `profiler` section of an optional spec.
async fn profile_csv(State(state): State<AppState>, multipart: Multipart) -> ServerResult<Json<ProfileResponse>> {
    let form = read_form(multipart, state.config.max_upload_bytes).await?;
    let options = match form.spec.as_deref() {
        Some(json) => PipelineSpec::from_json(json)?.profiler_options(),
        None => Default::default(),
    };

    let file_name = form.file_name;
    let bytes = form.bytes;
    let response = run_blocking(state.config.request_timeout, move |_| {
        let loaded = load_upload(&bytes, file_name.as_deref())?;
        Ok(ProfileResponse {
            job_id: uuid::Uuid::new_v4().to_string(),
            profiles: profile_table(&loaded.table, &options),
            csv_info: CsvMetadata::new(file_name, &loaded),
        })
    })
    .await?;

    Ok(Json(response))
}

/// Run `job` on the blocking pool under `timeout`.
///
/// On timeout the token is cancelled and the job is awaited so it can report
/// how far it got. Dropping the returned future (client gone) also cancels.
async fn run_blocking<T, F>(timeout: Duration, job: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> ServerResult<T> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let token = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || job(token));

    let joined = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            log_error(format!("⏱️ Request timed out after {}s, cancelling", timeout.as_secs()));
            cancel.cancel();
            handle.await
        }
    };
    guard.disarm();

    joined.map_err(|e| ServerError::Internal(format!("analysis task failed: {}", e)))?
}

/// HTTP status for each error class.
pub fn status_code(error: &ServerError) -> StatusCode {
    match error {
        ServerError::Pipeline(PipelineError::Cancelled { .. }) => StatusCode::REQUEST_TIMEOUT,
        ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Csv(CsvError::IoError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Csv(_) | ServerError::Config(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        log_error(format!("❌ {} ({})", self, status.as_u16()));
        (status, Json(error_response(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ErrorSite};

    #[test]
    fn test_status_codes() {
        let schema = ServerError::Pipeline(PipelineError::unknown_column(ErrorSite::Aggregation(0), "x"));
        assert_eq!(status_code(&schema), StatusCode::UNPROCESSABLE_ENTITY);
        let cancelled = ServerError::Pipeline(PipelineError::Cancelled { completed: 1 });
        assert_eq!(status_code(&cancelled), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status_code(&ServerError::Csv(CsvError::EmptyFile)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_code(&ServerError::Config(ConfigError::Malformed("x".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_code(&ServerError::PayloadTooLarge { limit: 10 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn test_run_blocking_returns_result() {
        let out = run_blocking(Duration::from_secs(5), |_| Ok(41 + 1)).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn test_run_blocking_cancels_on_timeout() {
        let err = run_blocking(Duration::from_millis(20), |cancel: CancellationToken| -> ServerResult<()> {
            let mut completed = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled { completed }.into());
                }
                completed += 1;
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::Pipeline(PipelineError::Cancelled { .. })));
    }
}
