//! HTTP adapter (spec §6.2) — a thin axum `Router` over the programmatic
//! command surface in `registry`/`queue`/`lifecycle`/`reclamation`. None
//! of the invariants in spec §3/§8 live here; this module only parses
//! requests, resolves an actor, calls the core, and serializes the
//! result or the `CoreError` (which already knows how to become a
//! response, see `error::CoreError::into_response`).
//!
//! Real authentication (token issuance, OAuth profile ingestion) is
//! explicitly out of scope (spec §1) and lives in plumbing this crate
//! does not implement. `ActorHeader` is a placeholder stand-in so the
//! service is runnable end to end; it is documented as such and must
//! not be mistaken for a security boundary.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::ActorId;
use crate::config::Config;
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    Claim, ClaimPrefs, Item, ItemDraft, ItemPatch, ItemStatus, ItemWithQueue, Page,
    QueueSummary, SearchFilters,
};
use crate::{lifecycle, queue, reclamation, registry};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
}

/// Stand-in for resolved caller identity (see module docs). A real
/// deployment replaces this extractor's body, not its callers.
pub struct ActorHeader(pub ActorId);

impl<S> FromRequestParts<S> for ActorHeader
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-Actor-Id header"))?;
        let id = Uuid::parse_str(raw).map_err(|_| (StatusCode::BAD_REQUEST, "invalid X-Actor-Id"))?;
        Ok(ActorHeader(ActorId(id)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/items", post(create_item).get(search_items))
        .route(
            "/items/{id}",
            get(get_item).patch(update_item).delete(soft_delete_item),
        )
        .route("/items/{id}/queue", get(get_item_with_queue))
        .route("/items/{id}/status", post(change_item_status))
        .route("/items/nearby", get(find_nearby))
        .route("/owners/{owner_id}/items", get(list_by_owner))
        .route("/items/{id}/claims", post(enqueue).get(get_queue))
        .route("/items/{id}/claims/next", get(get_next))
        .route("/items/{id}/claims/summary", get(get_queue_summary))
        .route("/claims/{id}/cancel", post(cancel_claim))
        .route("/claims/{id}/contact", post(contact_claim))
        .route("/claims/{id}/skip", post(skip_claim))
        .route("/claims/{id}/select", post(select_claim))
        .route("/claims/{id}/complete", post(complete_claim))
        .route("/claims/{id}/position", post(move_to_position))
        .route("/users/{user_id}/claims", get(list_by_user))
        .route("/listers/{lister_id}/claims", get(list_for_lister))
        .route("/reclamation/run", post(run_reclamation))
        .route("/reclamation/preview", get(preview_reclamation))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

async fn create_item(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Json(draft): Json<ItemDraft>,
) -> Result<Json<Item>, CoreError> {
    let item = registry::create_item(&state.pool, &state.config, actor, draft).await?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<Item>, CoreError> {
    let item = registry::update_item(&state.pool, actor, id, patch).await?;
    Ok(Json(item))
}

async fn soft_delete_item(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
) -> Result<Json<Item>, CoreError> {
    let item = registry::soft_delete(&state.pool, actor, id).await?;
    Ok(Json(item))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Item>, CoreError> {
    let item = registry::get_item(&state.pool, id).await?;
    Ok(Json(item))
}

#[derive(Deserialize)]
struct ViewerQuery {
    viewer: Option<Uuid>,
}

async fn get_item_with_queue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ViewerQuery>,
) -> Result<Json<ItemWithQueue>, CoreError> {
    let item = registry::get_with_queue(&state.pool, id, q.viewer).await?;
    Ok(Json(item))
}

#[derive(Deserialize)]
struct ChangeStatusBody {
    status: ItemStatus,
}

async fn change_item_status(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
    Json(body): Json<ChangeStatusBody>,
) -> Result<Json<Item>, CoreError> {
    let item = registry::change_status(&state.pool, actor, id, body.status).await?;
    Ok(Json(item))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(flatten)]
    filters: SearchFilters,
    page: i64,
    page_size: i64,
}

async fn search_items(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<Item>>, CoreError> {
    let page = Page {
        page: q.page,
        page_size: q.page_size,
    };
    let items = registry::search(&state.pool, &state.config, q.filters, page).await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct NearbyQuery {
    lat: f64,
    lon: f64,
    radius_miles: f64,
    #[serde(flatten)]
    filters: SearchFilters,
    page: i64,
    page_size: i64,
}

async fn find_nearby(
    State(state): State<AppState>,
    Query(q): Query<NearbyQuery>,
) -> Result<Json<Vec<Item>>, CoreError> {
    let page = Page {
        page: q.page,
        page_size: q.page_size,
    };
    let items = registry::find_nearby(
        &state.pool,
        &state.config,
        q.lat,
        q.lon,
        q.radius_miles,
        q.filters,
        page,
    )
    .await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct OwnerItemsQuery {
    status: Option<ItemStatus>,
    page: i64,
    page_size: i64,
}

async fn list_by_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Query(q): Query<OwnerItemsQuery>,
) -> Result<Json<Vec<Item>>, CoreError> {
    let page = Page {
        page: q.page,
        page_size: q.page_size,
    };
    let items =
        registry::list_by_owner(&state.pool, &state.config, owner_id, q.status, page).await?;
    Ok(Json(items))
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

async fn enqueue(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(item_id): Path<Uuid>,
    Json(prefs): Json<ClaimPrefs>,
) -> Result<Json<Claim>, CoreError> {
    let claim = queue::enqueue(&state.pool, &state.config, actor, item_id, prefs).await?;
    Ok(Json(claim))
}

#[derive(Deserialize)]
struct ReasonBody {
    reason: Option<String>,
}

async fn cancel_claim(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Claim>, CoreError> {
    let claim = queue::cancel(&state.pool, actor, id, body.reason).await?;
    Ok(Json(claim))
}

#[derive(Deserialize)]
struct ListerNoteBody {
    lister_note: Option<String>,
}

async fn contact_claim(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
    Json(body): Json<ListerNoteBody>,
) -> Result<Json<Claim>, CoreError> {
    let claim = queue::contact(&state.pool, actor, id, body.lister_note).await?;
    Ok(Json(claim))
}

async fn skip_claim(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Claim>, CoreError> {
    let claim = queue::skip(&state.pool, actor, id, body.reason).await?;
    Ok(Json(claim))
}

async fn select_claim(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
) -> Result<Json<Claim>, CoreError> {
    let claim = lifecycle::select_claim(&state.pool, actor, id).await?;
    Ok(Json(claim))
}

async fn complete_claim(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
) -> Result<Json<Claim>, CoreError> {
    let claim = queue::complete(&state.pool, actor, id).await?;
    Ok(Json(claim))
}

#[derive(Deserialize)]
struct MoveToPositionBody {
    new_pos: i32,
}

async fn move_to_position(
    State(state): State<AppState>,
    ActorHeader(actor): ActorHeader,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveToPositionBody>,
) -> Result<Json<Claim>, CoreError> {
    let claim = queue::move_to_position(&state.pool, actor, id, body.new_pos).await?;
    Ok(Json(claim))
}

#[derive(Deserialize)]
struct GetQueueQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn get_queue(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(q): Query<GetQueueQuery>,
) -> Result<Json<Vec<Claim>>, CoreError> {
    let claims = queue::get_queue(&state.pool, item_id, q.include_inactive).await?;
    Ok(Json(claims))
}

async fn get_next(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Option<Claim>>, CoreError> {
    let claim = queue::get_next(&state.pool, item_id).await?;
    Ok(Json(claim))
}

async fn get_queue_summary(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(q): Query<ViewerQuery>,
) -> Result<Json<QueueSummary>, CoreError> {
    let summary = queue::get_queue_summary(&state.pool, item_id, q.viewer).await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct PageQuery {
    page: i64,
    page_size: i64,
}

async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Claim>>, CoreError> {
    let page = Page {
        page: q.page,
        page_size: q.page_size,
    };
    let claims = queue::list_by_user(&state.pool, &state.config, user_id, page).await?;
    Ok(Json(claims))
}

async fn list_for_lister(
    State(state): State<AppState>,
    Path(lister_id): Path<Uuid>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Claim>>, CoreError> {
    let page = Page {
        page: q.page,
        page_size: q.page_size,
    };
    let claims = queue::list_for_lister(&state.pool, &state.config, lister_id, page).await?;
    Ok(Json(claims))
}

// ---------------------------------------------------------------------------
// Reclamation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReclamationResponse {
    #[serde(flatten)]
    counts: reclamation::ReclaimCounts,
}

async fn run_reclamation(
    State(state): State<AppState>,
) -> Result<Json<ReclamationResponse>, CoreError> {
    let counts = reclamation::run_once(&state.pool, &state.config)
        .await
        .map_err(CoreError::Internal)?;
    Ok(Json(ReclamationResponse { counts }))
}

async fn preview_reclamation(
    State(state): State<AppState>,
) -> Result<Json<ReclamationResponse>, CoreError> {
    let counts = reclamation::preview(&state.pool, &state.config)
        .await
        .map_err(CoreError::Internal)?;
    Ok(Json(ReclamationResponse { counts }))
}
