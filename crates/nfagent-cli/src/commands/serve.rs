//! Serve command - HTTP upload endpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use console::style;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use nfagent_core::persist::sanitize_file_stem;
use nfagent_core::{AgentConfig, Mode, Orchestrator, SessionStore, ThreadId};

use super::{build_orchestrator, load_config};

const THREAD_HEADER: &str = "x-thread-id";

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(short, long)]
    bind: Option<String>,
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<AgentConfig>,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    tokio::fs::create_dir_all(&config.storage.upload_dir).await?;

    let state = AppState {
        orchestrator: Arc::new(build_orchestrator(&config)?),
        sessions: Arc::new(SessionStore::with_capacity(config.server.max_sessions)),
        config: Arc::new(config.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!(
        "{} Listening on http://{}",
        style("✓").green(),
        listener.local_addr()?
    );

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/invoices", post(upload_invoice))
        .route("/threads/:id/messages", post(continue_thread))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Fields of an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    data: Option<Vec<u8>>,
    mode: Option<String>,
    thread_id: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                form.data = Some(bytes.to_vec());
            }
            "mode" | "thread_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                if name == "mode" {
                    form.mode = Some(text);
                } else {
                    form.thread_id = Some(text);
                }
            }
            other => warn!("Ignoring unexpected form field '{}'", other),
        }
    }

    Ok(form)
}

async fn upload_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;

    let data = form
        .data
        .ok_or_else(|| ApiError::bad_request("missing 'file' field"))?;
    let mode = match form.mode.as_deref().map(str::trim) {
        None | Some("") => state.config.agent.default_mode,
        Some(raw) => raw.parse::<Mode>().map_err(ApiError::bad_request)?,
    };
    let requested_thread = form
        .thread_id
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            headers
                .get(THREAD_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .map(|t| ThreadId::from(t.trim()));

    let thread_header = match &requested_thread {
        Some(id) => Some(
            HeaderValue::from_str(id.as_str())
                .map_err(|_| ApiError::bad_request("thread id is not a valid header value"))?,
        ),
        None => None,
    };

    let upload_path = upload_path(
        &state.config.storage.upload_dir,
        form.file_name.as_deref().unwrap_or("upload"),
    );
    tokio::fs::write(&upload_path, &data)
        .await
        .map_err(|e| ApiError::internal(format!("failed to store upload: {e}")))?;
    info!("Stored upload at {}", upload_path.display());

    let (thread_id, session) = state.sessions.get_or_create(requested_thread, mode);
    let outcome = {
        let mut session = session.lock().await;
        session.mode = mode;
        state
            .orchestrator
            .process_file(&mut session, &upload_path)
            .await
            .map(|report| (report, session.last_extraction.clone()))
    };

    if let Err(e) = tokio::fs::remove_file(&upload_path).await {
        warn!("Failed to remove upload {}: {}", upload_path.display(), e);
    }

    let (report, extracted) = outcome.map_err(|e| {
        error!(thread = %thread_id, "Agent run failed: {}", e);
        ApiError::internal(format!("agent failed to process the file: {e}"))
    })?;

    let body = match (report.saved, extracted) {
        (Some(saved), _) => Value::Object(saved.record.populated_fields()),
        (None, Some(text)) => {
            info!(thread = %thread_id, "Run finished without saving a record");
            json!({ "extracted_text": text })
        }
        (None, None) => {
            warn!(thread = %thread_id, "Run finished without extracting anything");
            return Err(ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "no data could be extracted from the file".to_string(),
            });
        }
    };

    let thread_header = match thread_header {
        Some(value) => value,
        None => HeaderValue::from_str(thread_id.as_str())
            .map_err(|_| ApiError::internal("generated thread id is not a valid header"))?,
    };

    Ok((
        [(HeaderName::from_static(THREAD_HEADER), thread_header)],
        Json(body),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn continue_thread(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let thread_id = ThreadId::from(id);
    let session = state.sessions.get(&thread_id).ok_or_else(|| ApiError {
        status: StatusCode::NOT_FOUND,
        message: format!("unknown thread '{}'", thread_id),
    })?;

    let mut session = session.lock().await;
    let report = state
        .orchestrator
        .chat(&mut session, &request.message)
        .await
        .map_err(|e| {
            error!(thread = %thread_id, "Agent run failed: {}", e);
            ApiError::internal(e.to_string())
        })?;

    Ok(Json(json!({
        "answer": report.answer,
        "output_path": session.last_output.as_ref().map(|p| p.display().to_string()),
    })))
}

/// Unique, filesystem-safe location for an uploaded file.
fn upload_path(upload_dir: &Path, file_name: &str) -> PathBuf {
    let base = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (base.clone(), None),
    };

    let stem = sanitize_file_stem(&stem);
    let stem = if stem.is_empty() { "upload".to_string() } else { stem };
    let name = match ext.map(|e| sanitize_file_stem(&e)) {
        Some(ext) if !ext.is_empty() => format!("{}_{}.{}", uuid::Uuid::new_v4(), stem, ext),
        _ => format!("{}_{}", uuid::Uuid::new_v4(), stem),
    };
    upload_dir.join(name)
}
