//! Item Registry (C1) — item entities and their lifecycle.

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::auth::{require_owner, ActorId};
use crate::config::Config;
use crate::db::DbPool;
use crate::error::{CoreError, FieldError};
use crate::lifecycle;
use crate::models::{
    Item, ItemDraft, ItemPatch, ItemStatus, ItemWithQueue, Page, SearchFilters, SortDirection,
    SortKey,
};
use crate::queue;
use crate::validation;

pub async fn create_item(
    pool: &DbPool,
    config: &Config,
    actor: ActorId,
    draft: ItemDraft,
) -> Result<Item, CoreError> {
    let mut errors = Vec::new();
    validation::validate_title(&draft.title, &mut errors);
    validation::validate_description(&draft.description, &mut errors);
    validation::validate_zip(&draft.zip_code, &mut errors);
    validation::validate_lat_lon(draft.lat, draft.lon, &mut errors);
    if !errors.is_empty() {
        return Err(CoreError::InvalidInput(errors));
    }

    if let Some(category_id) = draft.category_id {
        let active: Option<bool> =
            sqlx::query_scalar("SELECT active FROM categories WHERE id = $1")
                .bind(category_id)
                .fetch_optional(pool)
                .await?;
        match active {
            None => return Err(CoreError::NotFound(format!("category {category_id}"))),
            Some(false) => {
                return Err(CoreError::InvalidInput(vec![FieldError::new(
                    "category_id",
                    "category is not active",
                )]))
            }
            Some(true) => {}
        }
    }

    let ttl_days = config.resolve_ttl_days(draft.ttl_days);
    let now = Utc::now();
    let expires_at = now + ChronoDuration::days(ttl_days);

    let item = sqlx::query_as::<_, Item>(
        r#"
        INSERT INTO items (owner_id, category_id, title, description, zip_code, lat, lon,
                            pickup_notes, status, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9)
        RETURNING *
        "#,
    )
    .bind(actor.0)
    .bind(draft.category_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.zip_code)
    .bind(draft.lat)
    .bind(draft.lon)
    .bind(&draft.pickup_notes)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(item)
}

pub async fn update_item(
    pool: &DbPool,
    actor: ActorId,
    item_id: Uuid,
    patch: ItemPatch,
) -> Result<Item, CoreError> {
    let item = get_item(pool, item_id).await?;
    require_owner(actor, &item)?;

    if item.status != ItemStatus::Active {
        return Err(CoreError::InvalidStateTransition(format!(
            "item is {}, only active items accept edits",
            item.status
        )));
    }

    let mut errors = Vec::new();
    if let Some(ref title) = patch.title {
        validation::validate_title(title, &mut errors);
    }
    if let Some(ref description) = patch.description {
        validation::validate_description(description, &mut errors);
    }
    if let Some(ref zip_code) = patch.zip_code {
        validation::validate_zip(zip_code, &mut errors);
    }
    if !errors.is_empty() {
        return Err(CoreError::InvalidInput(errors));
    }

    if patch.category_id.is_some() {
        let active_claims: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims WHERE item_id = $1 AND status IN ('pending', 'contacted')",
        )
        .bind(item_id)
        .fetch_one(pool)
        .await?;
        if active_claims > 0 {
            return Err(CoreError::ConflictWithActiveClaims(
                "category cannot change while claims are active".to_string(),
            ));
        }
    }

    let title = patch.title.unwrap_or(item.title);
    let description = patch.description.unwrap_or(item.description);
    let zip_code = patch.zip_code.unwrap_or(item.zip_code);
    let category_id = patch.category_id.unwrap_or(item.category_id);
    let lat = patch.lat.unwrap_or(item.lat);
    let lon = patch.lon.unwrap_or(item.lon);
    let pickup_notes = patch.pickup_notes.unwrap_or(item.pickup_notes);

    let updated = sqlx::query_as::<_, Item>(
        r#"
        UPDATE items
        SET title = $1, description = $2, zip_code = $3, category_id = $4,
            lat = $5, lon = $6, pickup_notes = $7, updated_at = now()
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(zip_code)
    .bind(category_id)
    .bind(lat)
    .bind(lon)
    .bind(pickup_notes)
    .bind(item_id)
    .fetch_one(pool)
    .await?;

    Ok(updated)
}

pub async fn soft_delete(pool: &DbPool, actor: ActorId, item_id: Uuid) -> Result<Item, CoreError> {
    let item = get_item(pool, item_id).await?;
    require_owner(actor, &item)?;
    lifecycle::soft_delete_item(pool, item_id).await
}

pub async fn get_item(pool: &DbPool, item_id: Uuid) -> Result<Item, CoreError> {
    sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
        .bind(item_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {item_id}")))
}

pub async fn get_with_queue(
    pool: &DbPool,
    item_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<ItemWithQueue, CoreError> {
    let item = get_item(pool, item_id).await?;
    let queue = queue::get_queue_summary(pool, item_id, viewer).await?;

    // Advisory counter; best-effort, outside the critical read path.
    let _ = sqlx::query("UPDATE items SET view_count = view_count + 1 WHERE id = $1")
        .bind(item_id)
        .execute(pool)
        .await;

    Ok(ItemWithQueue { item, queue })
}

fn sort_column(key: SortKey) -> Result<&'static str, CoreError> {
    match key {
        SortKey::CreatedAt => Ok("created_at"),
        SortKey::Title => Ok("title"),
        SortKey::ExpiresAt => Ok("expires_at"),
        SortKey::Distance => Err(CoreError::InvalidInput(vec![FieldError::new(
            "sort_key",
            "distance sort is only valid for FindNearby",
        )])),
    }
}

fn direction_sql(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

pub async fn search(
    pool: &DbPool,
    config: &Config,
    filters: SearchFilters,
    page: Page,
) -> Result<Vec<Item>, CoreError> {
    let column = sort_column(filters.sort_key)?;
    let page = page.clamped(config.search_page_limit_max);
    let direction = direction_sql(filters.sort_direction);

    let sql = format!(
        r#"
        SELECT * FROM items
        WHERE status = 'active' AND expires_at > now()
          AND ($1::uuid IS NULL OR category_id = $1)
          AND ($2::text IS NULL OR zip_code = $2)
          AND ($3::text IS NULL OR to_tsvector('english', title || ' ' || description) @@ plainto_tsquery('english', $3))
        ORDER BY {column} {direction}
        LIMIT $4 OFFSET $5
        "#
    );

    let items = sqlx::query_as::<_, Item>(&sql)
        .bind(filters.category_id)
        .bind(&filters.zip_code)
        .bind(&filters.text)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
    Ok(items)
}

pub async fn find_nearby(
    pool: &DbPool,
    config: &Config,
    lat: f64,
    lon: f64,
    radius_miles: f64,
    filters: SearchFilters,
    page: Page,
) -> Result<Vec<Item>, CoreError> {
    let mut errors = Vec::new();
    validation::validate_lat_lon(Some(lat), Some(lon), &mut errors);
    if !errors.is_empty() {
        return Err(CoreError::InvalidInput(errors));
    }
    let radius_miles = validation::clamp_radius_miles(radius_miles);
    let page = page.clamped(config.search_page_limit_max);

    // Haversine distance in miles, evaluated in SQL rather than via a
    // geospatial extension (spec §6: the GiST index is plumbing; this
    // implementation keeps the formula explicit instead of assuming
    // PostGIS/earthdistance is installed).
    let distance_expr = r#"
        3958.8 * acos(
            LEAST(1.0, GREATEST(-1.0,
                cos(radians($1)) * cos(radians(lat)) * cos(radians(lon) - radians($2))
                + sin(radians($1)) * sin(radians(lat))
            ))
        )
    "#;

    let order_column = match filters.sort_key {
        SortKey::Distance => "distance",
        other => sort_column(other)?,
    };
    let direction = direction_sql(filters.sort_direction);

    let sql = format!(
        r#"
        SELECT *, ({distance_expr}) AS distance FROM items
        WHERE status = 'active' AND expires_at > now()
          AND lat IS NOT NULL AND lon IS NOT NULL
          AND ($3::uuid IS NULL OR category_id = $3)
          AND ($4::text IS NULL OR zip_code = $4)
          AND ({distance_expr}) <= $5
        ORDER BY {order_column} {direction}
        LIMIT $6 OFFSET $7
        "#
    );

    let items = sqlx::query_as::<_, Item>(&sql)
        .bind(lat)
        .bind(lon)
        .bind(filters.category_id)
        .bind(&filters.zip_code)
        .bind(radius_miles)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
    Ok(items)
}

/// `ChangeStatus` — the administrative ACTIVE<->SUSPENDED off-ramp (spec
/// §3). The core has no separate admin role in its data model, so this
/// is gated the same way every other owner mutation is; a real deployment
/// would have its auth/plumbing layer decide who may call it with which
/// actor (see DESIGN.md).
pub async fn change_status(
    pool: &DbPool,
    actor: ActorId,
    item_id: Uuid,
    new_status: ItemStatus,
) -> Result<Item, CoreError> {
    let item = get_item(pool, item_id).await?;
    require_owner(actor, &item)?;

    let allowed = matches!(
        (item.status, new_status),
        (ItemStatus::Active, ItemStatus::Suspended) | (ItemStatus::Suspended, ItemStatus::Active)
    );
    if !allowed {
        return Err(CoreError::InvalidStateTransition(format!(
            "cannot change item from {} to {}",
            item.status, new_status
        )));
    }

    let updated = sqlx::query_as::<_, Item>(
        "UPDATE items SET status = $1, updated_at = now() WHERE id = $2 AND status = $3 RETURNING *",
    )
    .bind(new_status)
    .bind(item_id)
    .bind(item.status)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        CoreError::InvalidStateTransition("item status changed concurrently".to_string())
    })?;
    Ok(updated)
}

pub async fn list_by_owner(
    pool: &DbPool,
    config: &Config,
    owner: Uuid,
    status_filter: Option<ItemStatus>,
    page: Page,
) -> Result<Vec<Item>, CoreError> {
    let page = page.clamped(config.search_page_limit_max);
    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT * FROM items
        WHERE owner_id = $1 AND ($2::item_status IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(owner)
    .bind(status_filter)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok(items)
}
