//! HTTP server.
//!
//! Exposes the template store as a JSON API for the editor front end and
//! the agent tools for LLM integrations.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/templates` | Create a chunk, `201` with `{template_id, chunk_id}` |
//! | `GET`    | `/api/templates` | Main chunk of every template |
//! | `GET`    | `/api/templates/search?query=` | Search main chunks |
//! | `GET`    | `/api/templates/{id}` | Template or chunk by id |
//! | `PUT`    | `/api/templates/{id}` | Update the main chunk |
//! | `DELETE` | `/api/templates/{id}` | Delete every chunk of the template |
//! | `GET`    | `/api/templates/{id}/chunks` | Chunks in order |
//! | `POST`   | `/api/templates/{id}/chunks` | Append a chunk, `{content}` |
//! | `DELETE` | `/api/templates/{id}/chunks/{chunk_id}` | Delete one chunk |
//! | `PUT`    | `/api/templates/{id}/chunks/reorder` | Reorder, body is `[chunk_id, ...]` |
//! | `GET`    | `/api/templates/{id}/content` | Chunks joined into one blob |
//! | `PUT`    | `/api/templates/{id}/content` | Re-segment from one blob, `{content}` |
//! | `GET`    | `/tools/list` | Registered agent tools with schemas |
//! | `POST`   | `/tools/{name}` | Call an agent tool |
//!
//! Static segments win over captures: `GET /api/templates/search` always
//! searches, so a template whose id is literally `search` is read through
//! its chunk id or `/chunks`. `DELETE .../chunks/reorder` deletes the chunk
//! whose id is `reorder`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "template not found: cert-001" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `internal` (500),
//! `tool_error` (500).

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use templar_core::{ChunkUpdate, NewChunk, TemplateChunk, TemplateError, TemplateStore};

use crate::config::Config;
use crate::sqlite_store::open_store;
use crate::tools::{validate_params, ToolContext, ToolInfo, ToolRegistry};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<TemplateStore>,
    tools: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(store: Arc<TemplateStore>, tools: ToolRegistry) -> Self {
        Self {
            store,
            tools: Arc::new(tools),
        }
    }
}

/// Open the database, run migrations, and serve until Ctrl-C or SIGTERM.
///
/// The pool is closed after the last in-flight request completes.
pub async fn run_server(config: &Config) -> Result<()> {
    run_server_with_tools(config, ToolRegistry::with_builtins()).await
}

/// Like [`run_server`], serving `tools` instead of only the built-ins.
pub async fn run_server_with_tools(config: &Config, tools: ToolRegistry) -> Result<()> {
    let (pool, store) = open_store(config).await?;
    let store = Arc::new(store);

    for t in tools.tools() {
        info!(tool = t.name(), builtin = t.is_builtin(), "registered tool");
    }

    let app = router(AppState::new(store, tools), config)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "templar server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped, closing database");
    pool.close().await;
    Ok(())
}

/// Build the router with CORS and request tracing applied.
pub fn router(state: AppState, config: &Config) -> Result<Router> {
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/templates", post(create_template).get(list_templates))
        .route("/api/templates/search", get(search_templates))
        .route(
            "/api/templates/{id}",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route(
            "/api/templates/{id}/chunks",
            get(list_chunks).post(add_chunk),
        )
        .route(
            "/api/templates/{id}/chunks/reorder",
            put(reorder_chunks).delete(delete_chunk_named_reorder),
        )
        .route(
            "/api/templates/{id}/chunks/{chunk_id}",
            axum::routing::delete(delete_chunk),
        )
        .route(
            "/api/templates/{id}/content",
            get(get_content).put(replace_content),
        )
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors_layer(config)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    Ok(app)
}

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let origin = if config.allows_any_origin() {
        AllowOrigin::from(Any)
    } else {
        let origins = config
            .server
            .allow_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o.trim())
                    .with_context(|| format!("invalid origin in server.allow_origins: {}", o))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
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

/// Error type that renders as the JSON error body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", message)
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Validation(msg) => bad_request(msg),
            other => {
                error!(error = %other, "template store failure");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Map a tool failure to a status: typed validation errors and known
/// client-error messages become 400, "not found" becomes 404.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    if let Some(template_err) = err.downcast_ref::<TemplateError>() {
        if template_err.is_validation() {
            return bad_request(format!("{}: {}", tool_name, template_err));
        }
    }

    let msg = format!("{:#}", err);
    if msg.contains("not found") {
        not_found(format!("{}: {}", tool_name, msg))
    } else if msg.contains("must not be empty") || msg.contains("invalid") {
        bad_request(format!("{}: {}", tool_name, msg))
    } else {
        error!(tool = tool_name, error = %msg, "tool failed");
        tool_error(format!("{}: {}", tool_name, msg))
    }
}

fn template_not_found(id: &str) -> AppError {
    not_found(format!("template not found: {}", id))
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
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

// ============ /api/templates ============

async fn create_template(
    State(state): State<AppState>,
    payload: Result<Json<NewChunk>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(new) = payload?;
    let chunk = state.store.create(new).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "template_id": chunk.template_id, "chunk_id": chunk.chunk_id })),
    ))
}

async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateChunk>>, AppError> {
    Ok(Json(state.store.list_main_templates().await?))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

async fn search_templates(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<TemplateChunk>>, AppError> {
    Ok(Json(state.store.search(&params.query).await?))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TemplateChunk>, AppError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| template_not_found(&id))
}

async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ChunkUpdate>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(update) = payload?;
    if !state.store.update(&id, update).await? {
        return Err(template_not_found(&id));
    }
    Ok(success())
}

async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_group(&id).await? {
        return Err(template_not_found(&id));
    }
    Ok(success())
}

// ============ /api/templates/{id}/chunks ============

async fn list_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TemplateChunk>>, AppError> {
    Ok(Json(state.store.list_chunks(&id).await?))
}

#[derive(Deserialize)]
struct ContentBody {
    content: String,
}

async fn add_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ContentBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;
    let chunk = state.store.add_chunk(&id, &body.content).await?;
    Ok(Json(json!({ "chunk_id": chunk.chunk_id })))
}

async fn delete_chunk(
    State(state): State<AppState>,
    Path((_id, chunk_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    remove_chunk(&state, &chunk_id).await
}

/// The static `reorder` route shadows a chunk with that id.
async fn delete_chunk_named_reorder(
    State(state): State<AppState>,
    Path(_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    remove_chunk(&state, "reorder").await
}

async fn remove_chunk(state: &AppState, chunk_id: &str) -> Result<Json<Value>, AppError> {
    if !state.store.delete_chunk(chunk_id).await? {
        return Err(not_found(format!("chunk not found: {}", chunk_id)));
    }
    Ok(success())
}

async fn reorder_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(chunk_ids) = payload?;
    if !state.store.reorder(&id, &chunk_ids).await? {
        return Err(not_found(format!("no chunk of {} changed order", id)));
    }
    Ok(success())
}

// ============ /api/templates/{id}/content ============

async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let content = state
        .store
        .assemble(&id)
        .await?
        .ok_or_else(|| template_not_found(&id))?;
    Ok(Json(json!({ "template_id": id, "content": content })))
}

async fn replace_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ContentBody>, JsonRejection>,
) -> Result<Json<Vec<TemplateChunk>>, AppError> {
    let Json(body) = payload?;
    Ok(Json(state.store.replace_content(&id, &body.content).await?))
}

// ============ /tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(params) = payload?;
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.store.clone());
    let result = tool
        .execute(params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> (StatusCode, &'static str) {
        (err.status, err.code)
    }

    #[test]
    fn test_template_error_mapping() {
        let validation = TemplateError::Validation("template_id must not be empty".into());
        assert_eq!(
            status_of(validation.into()),
            (StatusCode::BAD_REQUEST, "bad_request")
        );

        let persistence = TemplateError::Persistence {
            operation: "create",
            cause: anyhow::anyhow!("disk I/O error"),
        };
        assert_eq!(
            status_of(persistence.into()),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        );
    }

    #[test]
    fn test_classify_tool_error() {
        let err = classify_tool_error("get_template", anyhow::anyhow!("template not found: x"));
        assert_eq!(status_of(err), (StatusCode::NOT_FOUND, "not_found"));

        let err = classify_tool_error(
            "save_template",
            anyhow::Error::new(TemplateError::Validation("chunk 0: bad order".into())),
        );
        assert_eq!(status_of(err), (StatusCode::BAD_REQUEST, "bad_request"));

        let err = classify_tool_error("save_template", anyhow::anyhow!("database is locked"));
        assert_eq!(
            status_of(err),
            (StatusCode::INTERNAL_SERVER_ERROR, "tool_error")
        );
    }

    #[test]
    fn test_cors_rejects_bad_origin() {
        let mut config = Config::minimal();
        config.server.allow_origins = vec!["http://ok.example".into()];
        assert!(cors_layer(&config).is_ok());
        config.server.allow_origins = vec!["bad\norigin".into()];
        assert!(cors_layer(&config).is_err());
    }
}
