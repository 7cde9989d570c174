//! HTTP server for the family tree.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/family` | Every person as a normalized node |
//! | `POST` | `/family` | Create, or update when the body has an `id` |
//! | `GET`  | `/family/tree` | `{rootId, nodes}` for the tree layout |
//! | `GET`  | `/family/integrity` | Disagreements between parent fields and edges |
//! | `GET`  | `/family/{id}/views/{view}` | Render a profile view (`?from=` checks the switch) |
//! | `GET`  | `/documents?id=` | The document owned by a person |
//! | `POST` | `/documents` | Store a document record |
//! | `DELETE` | `/documents?id=` | Delete a document by id |
//! | `POST` | `/chat` | Chat action dispatcher |
//! | `POST` | `/llm` | Extract people from profile text, optionally inserting them |
//! | `POST` | `/cloudinary-signature` | Signed upload parameters |
//! | `GET`  | `/tools/list` | Assistant tools with schemas |
//! | `POST` | `/tools/{name}` | Call an assistant tool |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "name: name is required" } }
//! ```
//!
//! | [`FamilyError`] | Status | Code |
//! |-----------------|--------|------|
//! | `Validation` | 400 | `bad_request` |
//! | `NotFound` | 404 | `not_found` |
//! | `Integrity` | 409 | `integrity_error` |
//! | `Parse` | 500 | `invalid_json` (adds `raw`) |
//! | `Upstream` | 502 | `upstream_error` |
//! | anything else | 500 | `internal` |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use family_tree_core::error::FamilyError;
use family_tree_core::import::ImportOutcome;
use family_tree_core::models::{NormalizedNode, UploadedDocument};
use family_tree_core::normalize::IntegrityIssue;
use family_tree_core::service::{DocumentInput, FamilyService, PersonInput};
use family_tree_core::tree::{layout, TreeLayout};
use family_tree_core::views::{DialogState, ProfileView, ViewModel};

use crate::chat::{ChatDispatcher, ChatReply, ChatRequest};
use crate::config::Config;
use crate::db;
use crate::extract::{self, ExtractRequest, ExtractResponse};
use crate::llm::{create_provider, CompletionProvider};
use crate::side_channel::{create_side_channel, SideChannel};
use crate::signature::{sign_now, SignatureRequest, UploadSignature};
use crate::tools::{ToolContext, ToolInfo, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    service: Arc<FamilyService>,
    provider: Arc<dyn CompletionProvider>,
    tools: Arc<ToolRegistry>,
    chat: Arc<ChatDispatcher>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        service: Arc<FamilyService>,
        provider: Arc<dyn CompletionProvider>,
        side_channel: Arc<dyn SideChannel>,
    ) -> Self {
        let deadline = Duration::from_secs(
            config
                .side_channel
                .as_ref()
                .map(|s| s.timeout_secs)
                .unwrap_or(10),
        );
        let chat = ChatDispatcher::new(
            service.clone(),
            provider.clone(),
            side_channel,
            deadline,
        );
        Self {
            config,
            service,
            provider,
            tools: Arc::new(ToolRegistry::with_builtins()),
            chat: Arc::new(chat),
        }
    }

    /// Opens the configured database, completion provider and side channel.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let service = db::open_service(config).await?;
        let provider = create_provider(&config.llm)?;
        let side_channel = create_side_channel(config.side_channel.as_ref());
        Ok(Self::new(
            Arc::new(config.clone()),
            service,
            provider,
            side_channel,
        ))
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.service.clone(), self.provider.clone())
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/family", get(handle_list_family).post(handle_save_family))
        .route("/family/tree", get(handle_tree))
        .route("/family/integrity", get(handle_integrity))
        .route("/family/{id}/views/{view}", get(handle_view))
        .route(
            "/documents",
            get(handle_get_document)
                .post(handle_add_document)
                .delete(handle_delete_document),
        )
        .route("/chat", post(handle_chat))
        .route("/llm", post(handle_llm))
        .route("/cloudinary-signature", post(handle_signature))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves `state` on an already-bound listener until the process ends.
pub async fn serve(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    serve(state, listener).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

/// Error converted into a JSON response. `extra` fields are merged into
/// the top level of the body next to `error`.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    raw: Option<String>,
    extra: serde_json::Map<String, Value>,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            raw: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let detail = ErrorDetail {
            code: self.code,
            message: self.message,
            raw: self.raw,
        };
        let mut body = self.extra;
        body.insert(
            "error".to_string(),
            serde_json::to_value(detail).unwrap_or(Value::Null),
        );
        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        match err.downcast_ref::<FamilyError>() {
            Some(FamilyError::Validation { .. }) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            Some(FamilyError::NotFound(_)) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", message)
            }
            Some(FamilyError::Integrity(_)) => {
                AppError::new(StatusCode::CONFLICT, "integrity_error", message)
            }
            Some(FamilyError::Parse { raw, .. }) => {
                let raw = raw.clone();
                let mut e = AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "invalid_json", message);
                e.raw = Some(raw);
                e
            }
            Some(FamilyError::Upstream(_)) => {
                AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
            None => {
                warn!("request failed: {}", message);
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl From<FamilyError> for AppError {
    fn from(err: FamilyError) -> Self {
        anyhow::Error::from(err).into()
    }
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

// ============ /family ============

async fn handle_list_family(
    State(state): State<AppState>,
) -> Result<Json<Vec<NormalizedNode>>, AppError> {
    let nodes = state.service.tree().await?;
    Ok(Json(nodes.to_vec()))
}

#[derive(Serialize)]
struct SaveResponse {
    message: &'static str,
    id: String,
}

/// `POST /family`. The presence of `id` selects update over create.
async fn handle_save_family(
    State(state): State<AppState>,
    Json(input): Json<PersonInput>,
) -> Result<Json<SaveResponse>, AppError> {
    let outcome = state.service.save(input).await?;
    Ok(Json(SaveResponse {
        message: outcome.action.message(),
        id: outcome.record.id,
    }))
}

async fn handle_tree(State(state): State<AppState>) -> Result<Json<TreeLayout>, AppError> {
    let nodes = state.service.tree().await?;
    Ok(Json(layout(&nodes, state.config.tree.root_id.as_deref())))
}

async fn handle_integrity(
    State(state): State<AppState>,
) -> Result<Json<Vec<IntegrityIssue>>, AppError> {
    Ok(Json(state.service.integrity().await?))
}

#[derive(Deserialize)]
struct ViewQuery {
    from: Option<String>,
}

/// Renders `view` for person `id`. With `?from=<view>` the dialog is
/// opened on `from` first and must allow switching to `view`.
async fn handle_view(
    State(state): State<AppState>,
    Path((id, view)): Path<(String, String)>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ViewModel>, AppError> {
    let target: ProfileView = view.parse()?;
    let nodes = state.service.tree().await?;

    let mut dialog = DialogState::default();
    match query.from.as_deref() {
        Some(from) => {
            dialog.open(&id, from.parse()?);
            dialog.request_view(target)?;
        }
        None => dialog.open(&id, target),
    }

    dialog
        .render(&nodes)?
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "not_found", "dialog is closed"))
}

// ============ /documents ============

#[derive(Deserialize)]
struct IdQuery {
    id: Option<String>,
}

async fn handle_get_document(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<UploadedDocument>, AppError> {
    Ok(Json(state.service.document_for(query.id.as_deref()).await?))
}

async fn handle_add_document(
    State(state): State<AppState>,
    Json(input): Json<DocumentInput>,
) -> Result<Json<UploadedDocument>, AppError> {
    Ok(Json(state.service.add_document(input).await?))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Value>, AppError> {
    let document = state.service.delete_document(query.id.as_deref()).await?;
    Ok(Json(json!({
        "message": "Document deleted",
        "document": document,
    })))
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    Ok(Json(state.chat.handle(request).await?))
}

// ============ POST /llm ============

fn import_body(outcome: &ImportOutcome) -> serde_json::Map<String, Value> {
    let mut body = serde_json::Map::new();
    body.insert("nodes".to_string(), json!(outcome.nodes));
    body.insert("relations".to_string(), json!(outcome.relations));
    body.insert("extractedData".to_string(), json!(outcome.extracted));
    body
}

/// Without `insertToDatabase` the extraction is returned as the model
/// wrote it. With it, the response lists what was inserted; a failed
/// write-through answers 500 with the partial results alongside the error.
async fn handle_llm(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<Value>, AppError> {
    let response = extract::run(
        &state.service,
        state.provider.as_ref(),
        state.config.llm.max_tokens,
        request,
    )
    .await?;

    match response {
        ExtractResponse::Extracted(value) => Ok(Json(value)),
        ExtractResponse::Imported(outcome) => {
            let body = import_body(&outcome);
            match outcome.error {
                None => Ok(Json(Value::Object(body))),
                Some(e) => {
                    let mut err = AppError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "import_failed",
                        format!("{:#}", e),
                    );
                    err.extra = body;
                    Err(err)
                }
            }
        }
    }
}

// ============ POST /cloudinary-signature ============

async fn handle_signature(
    State(state): State<AppState>,
    Json(request): Json<SignatureRequest>,
) -> Result<Json<UploadSignature>, AppError> {
    Ok(Json(sign_now(
        state.config.uploads.as_ref(),
        request.public_id.as_deref(),
    )?))
}

// ============ /tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let result = state
        .tools
        .call(&name, params, &state.tool_context())
        .await?;
    Ok(Json(json!({ "result": result })))
}
