use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::api::{
    APIResponse, CaptureRequest, CaptureResponse, ImportRequest, MessageRequest, QueryParams,
    RenderRequest, RenderResponse, SelectionPayload,
};
use crate::capture::{self, Selection, SelectionPoint};
use crate::dom::{self, Document, NodeId};
use crate::error::HandlerError;
use crate::model::{CreateHighlight, HighlightColor, HighlightRecord, UpdateHighlight};
use crate::page::{MessageReply, PageContext};
use crate::restore;
use crate::store::{ACTIVE_KEY, HighlightStore};

#[derive(Clone)]
pub struct AppState {
    pub store: HighlightStore,
    pub default_color: HighlightColor,
    /// Serializes read-modify-write cycles on the store.
    pub write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: HighlightStore, default_color: HighlightColor) -> Self {
        AppState {
            store,
            default_color,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

type HandlerResult = Result<Response, HandlerError>;

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(APIResponse { data })).into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(APIResponse { data })).into_response()
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(APIResponse { data: "ok" })
}

/// Runs store work on the blocking pool. `HighlightStore` does synchronous
/// file I/O, so handlers never call it on a runtime worker.
async fn blocking<T, F>(work: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> Result<T, HandlerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| HandlerError::StoreError(anyhow::anyhow!("store task failed: {}", e)))?
}

pub async fn list_highlights(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> HandlerResult {
    let highlights = blocking(move || {
        Ok(match params.url.as_deref() {
            Some(url) => state.store.list_by_url(url)?,
            None => state.store.list_all()?,
        })
    })
    .await?;
    Ok(success(highlights))
}

pub async fn create_highlight(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateHighlight>,
) -> HandlerResult {
    payload.validate().map_err(HandlerError::ValidationError)?;
    payload.color = Some(resolve_color(payload.color.as_deref(), state.default_color)?.hex().to_string());
    let record = HighlightRecord::new(payload);

    let _guard = state.write_lock.lock().await;
    let store = state.store.clone();
    let saved = record.clone();
    blocking(move || Ok(store.append(saved)?)).await?;
    info!(id = %record.id, url = %record.url, "highlight created");
    Ok(created(record))
}

pub async fn get_highlight(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let store = state.store.clone();
    let lookup = id.clone();
    match blocking(move || Ok(store.get(&lookup)?)).await? {
        Some(record) => Ok(success(record)),
        None => Err(HandlerError::NotFound(format!("highlight {} not found", id))),
    }
}

pub async fn update_highlight(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut payload): Json<UpdateHighlight>,
) -> HandlerResult {
    payload.validate().map_err(HandlerError::ValidationError)?;
    if let Some(color) = payload.color.take() {
        payload.color = Some(resolve_color(Some(&color), state.default_color)?.hex().to_string());
    }

    let _guard = state.write_lock.lock().await;
    let store = state.store.clone();
    let target = id.clone();
    match blocking(move || Ok(store.update(&target, &payload)?)).await? {
        Some(record) => Ok(success(record)),
        None => Err(HandlerError::NotFound(format!("highlight {} not found", id))),
    }
}

pub async fn delete_highlight(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult {
    let _guard = state.write_lock.lock().await;
    let store = state.store.clone();
    let target = id.clone();
    if blocking(move || Ok(store.remove(&target)?)).await? {
        info!(id = %id, "highlight deleted");
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(HandlerError::NotFound(format!("highlight {} not found", id)))
    }
}

pub async fn import_highlights(
    State(state): State<AppState>,
    Json(payload): Json<ImportRequest>,
) -> HandlerResult {
    let _guard = state.write_lock.lock().await;
    let store = state.store.clone();
    let stats = blocking(move || Ok(store.import(payload.highlights)?)).await?;
    info!(
        created = stats.created,
        updated = stats.updated,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        "highlights imported"
    );
    Ok(success(stats))
}

pub async fn render(State(state): State<AppState>, Json(payload): Json<RenderRequest>) -> HandlerResult {
    let response = blocking(move || {
        let records = state.store.list_by_url(&payload.url)?;
        let mut doc = dom::parse_html(&payload.html);
        let report = restore::restore_all(&mut doc, &records);
        Ok(RenderResponse {
            html: doc.to_html(),
            report,
        })
    })
    .await?;
    Ok(success(response))
}

pub async fn capture_selection(
    State(state): State<AppState>,
    Json(payload): Json<CaptureRequest>,
) -> HandlerResult {
    let color = resolve_color(payload.color.as_deref(), state.default_color)?;

    let _guard = state.write_lock.lock().await;
    let store = state.store.clone();
    let response = blocking(move || {
        let active = store.read_flag(ACTIVE_KEY, true)?;
        let mut doc = dom::parse_html(&payload.html);
        let selection = resolve_selection(&doc, &payload.selection)?;

        let record = capture::capture(&doc, &selection, &payload.url, active, color)?;
        store.append(record.clone())?;
        info!(id = %record.id, url = %record.url, "highlight captured");

        let records = store.list_by_url(&payload.url)?;
        restore::restore_all(&mut doc, &records);
        Ok(CaptureResponse {
            highlight: record,
            html: doc.to_html(),
        })
    })
    .await?;
    Ok(created(response))
}

pub async fn handle_message(
    State(state): State<AppState>,
    Json(payload): Json<MessageRequest>,
) -> HandlerResult {
    let _guard = state.write_lock.lock().await;
    let worker_state = state.clone();
    let (reply, html) = blocking(move || dispatch_message(&worker_state, payload)).await?;
    Ok(success(serde_json::json!({ "reply": reply, "html": html })))
}

/// Runs one message through a page context. The context is not `Send`, so it
/// is built and dropped on the calling thread.
fn dispatch_message(
    state: &AppState,
    payload: MessageRequest,
) -> Result<(MessageReply, Option<String>), HandlerError> {
    let url = payload.url.unwrap_or_default();
    let mut doc = payload
        .html
        .as_deref()
        .map(dom::parse_html)
        .unwrap_or_default();

    let mut page = PageContext::load(&url, state.store.clone(), state.default_color)?;
    let reply = page.handle_message(payload.message, &mut doc)?;
    let html = payload.html.is_some().then(|| doc.to_html());
    Ok((reply, html))
}

fn resolve_color(
    requested: Option<&str>,
    default: HighlightColor,
) -> Result<HighlightColor, HandlerError> {
    match requested {
        None => Ok(default),
        Some(value) => HighlightColor::parse(value).ok_or_else(|| {
            HandlerError::ValidationError(format!("color {} is not in the palette", value))
        }),
    }
}

fn resolve_point(doc: &Document, xpath: &str, child: usize, offset: usize) -> Result<SelectionPoint, HandlerError> {
    let element = crate::address::decode(doc, xpath)
        .ok_or_else(|| HandlerError::ValidationError(format!("selection element {} not found", xpath)))?;
    let node: NodeId = *doc.children(element).get(child).ok_or_else(|| {
        HandlerError::ValidationError(format!("element {} has no child {}", xpath, child))
    })?;
    Ok(SelectionPoint { node, offset })
}

fn resolve_selection(doc: &Document, payload: &SelectionPayload) -> Result<Selection, HandlerError> {
    let anchor = &payload.anchor;
    let focus = &payload.focus;
    Ok(Selection {
        anchor: resolve_point(doc, &anchor.xpath, anchor.child, anchor.offset)?,
        focus: resolve_point(doc, &focus.xpath, focus.child, focus.offset)?,
    })
}
