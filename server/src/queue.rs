//! Claim Queue Engine (C2) — per-item FIFO queue: position assignment,
//! duplicate/self-claim prevention, compaction and reshuffle.
//!
//! Position assignment uses the application-lock strategy from spec
//! §4.2.2(b): a transaction-scoped Postgres advisory lock keyed by the
//! item id serializes all writers touching that item's active set, with
//! the partial unique index on `(item_id, queue_position)` kept as
//! defense in depth. A racing violation is retried with jittered
//! backoff (grounded in the teacher's `federation::queue::backoff_delay`)
//! up to `enqueue_retry_attempts` before surfacing `Conflict`.

use chrono::Utc;
use rand::Rng;
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{require_claim_owner, require_not_owner, require_owner, ActorId};
use crate::config::Config;
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::claim::estimated_wait;
use crate::models::outbox::{self, AggregateType};
use crate::models::{Claim, ClaimPrefs, ClaimStatus, Item, Page, QueueSummary};
use crate::validation;

/// Exponential backoff for enqueue retries: 10ms, 20ms, 40ms, ... capped
/// at 200ms, with up to 50% jitter so concurrent retriers don't lock-step.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 10u64.saturating_mul(1u64 << attempt.min(10));
    let capped_ms = base_ms.min(200);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped_ms / 2);
    Duration::from_millis(capped_ms + jitter_ms)
}

async fn lock_item(tx: &mut Transaction<'_, Postgres>, item_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn load_item_for_update(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
) -> Result<Item, CoreError> {
    sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1 FOR UPDATE")
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {item_id}")))
}

async fn load_claim(pool: &DbPool, claim_id: Uuid) -> Result<Claim, CoreError> {
    sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1")
        .bind(claim_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("claim {claim_id}")))
}

/// Renumber the active set to a dense 1..N sequence, preserving the
/// relative order given in `ordered_claim_ids` (invariant P1). Uses a
/// negative-placeholder phase so the statement-time unique check on
/// `(item_id, queue_position)` never fires a false collision while
/// positions are being shifted.
async fn apply_positions(
    tx: &mut Transaction<'_, Postgres>,
    ordered_claim_ids: &[Uuid],
) -> Result<(), CoreError> {
    for (i, id) in ordered_claim_ids.iter().enumerate() {
        sqlx::query("UPDATE claims SET queue_position = $1 WHERE id = $2")
            .bind(-(i as i32) - 1)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    for (i, id) in ordered_claim_ids.iter().enumerate() {
        sqlx::query("UPDATE claims SET queue_position = $1 WHERE id = $2")
            .bind(i as i32 + 1)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Pure reordering step behind `MoveToPosition` (spec §4.2.3): remove
/// `claim_id` from the active set and reinsert it at `new_pos` (1-based),
/// leaving every other claim's relative order untouched. Split out from
/// `move_to_position` so the reshuffle logic can be checked without a
/// database.
fn reorder_active(active_ids: &[Uuid], claim_id: Uuid, new_pos: i32) -> Vec<Uuid> {
    let mut reordered: Vec<Uuid> = active_ids.iter().copied().filter(|&id| id != claim_id).collect();
    let index = ((new_pos - 1).max(0) as usize).min(reordered.len());
    reordered.insert(index, claim_id);
    reordered
}

async fn active_set_ordered(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
) -> Result<Vec<Claim>, CoreError> {
    let claims = sqlx::query_as::<_, Claim>(
        r#"
        SELECT * FROM claims
        WHERE item_id = $1 AND status IN ('pending', 'contacted')
        ORDER BY queue_position ASC, created_at ASC
        FOR UPDATE
        "#,
    )
    .bind(item_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(claims)
}

/// Compact the active set after a claim leaves it (spec §4.2.3). Must run
/// in the same transaction that moved the claim out of the active set.
async fn compact(tx: &mut Transaction<'_, Postgres>, item_id: Uuid) -> Result<(), CoreError> {
    let remaining = active_set_ordered(tx, item_id).await?;
    let ids: Vec<Uuid> = remaining.iter().map(|c| c.id).collect();
    apply_positions(tx, &ids).await
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

pub async fn enqueue(
    pool: &DbPool,
    config: &Config,
    actor: ActorId,
    item_id: Uuid,
    prefs: ClaimPrefs,
) -> Result<Claim, CoreError> {
    let mut last_err = CoreError::Conflict;
    for attempt in 0..config.enqueue_retry_attempts {
        match enqueue_once(pool, actor, item_id, &prefs).await {
            Ok(claim) => return Ok(claim),
            Err(CoreError::Conflict) => {
                last_err = CoreError::Conflict;
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err)
}

async fn enqueue_once(
    pool: &DbPool,
    actor: ActorId,
    item_id: Uuid,
    prefs: &ClaimPrefs,
) -> Result<Claim, CoreError> {
    let now = Utc::now();
    let mut errors = Vec::new();
    validation::validate_pickup_date(prefs.preferred_pickup_date, now, &mut errors);
    if !errors.is_empty() {
        return Err(CoreError::InvalidInput(errors));
    }

    let mut tx = pool.begin().await?;
    lock_item(&mut tx, item_id).await?;

    let item = load_item_for_update(&mut tx, item_id).await?;
    if !item.is_claimable(now) {
        return Err(CoreError::InvalidStateTransition(
            "item does not accept new claims".to_string(),
        ));
    }
    require_not_owner(actor, &item)?;

    let existing = sqlx::query(
        r#"
        SELECT 1 FROM claims
        WHERE item_id = $1 AND user_id = $2
          AND status NOT IN ('completed', 'cancelled', 'skipped', 'expired')
        "#,
    )
    .bind(item_id)
    .bind(actor.0)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(CoreError::DuplicateClaim);
    }

    let next_position: i32 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(queue_position), 0) + 1 FROM claims
        WHERE item_id = $1 AND status IN ('pending', 'contacted')
        "#,
    )
    .bind(item_id)
    .fetch_one(&mut *tx)
    .await?;

    let claim = sqlx::query_as::<_, Claim>(
        r#"
        INSERT INTO claims (item_id, user_id, queue_position, status, contact_method,
                             preferred_pickup_date, claimer_notes)
        VALUES ($1, $2, $3, 'pending', $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(item_id)
    .bind(actor.0)
    .bind(next_position)
    .bind(prefs.contact_method)
    .bind(prefs.preferred_pickup_date)
    .bind(&prefs.claimer_notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(CoreError::from)?;

    outbox::append(
        &mut tx,
        AggregateType::Claim,
        claim.id,
        "claim.enqueued",
        serde_json::json!({ "item_id": item_id, "user_id": actor.0, "position": claim.queue_position }),
    )
    .await?;

    tx.commit().await?;

    // Advisory counter; best-effort, outside the critical transaction
    // (matches registry::get_with_queue's view_count bump).
    let _ = sqlx::query("UPDATE items SET claim_count = claim_count + 1 WHERE id = $1")
        .bind(item_id)
        .execute(pool)
        .await;

    Ok(claim)
}

// ---------------------------------------------------------------------------
// Cancel / Contact / Skip
// ---------------------------------------------------------------------------

pub async fn cancel(
    pool: &DbPool,
    actor: ActorId,
    claim_id: Uuid,
    reason: Option<String>,
) -> Result<Claim, CoreError> {
    let existing = load_claim(pool, claim_id).await?;
    require_claim_owner(actor, existing.user_id)?;

    let mut tx = pool.begin().await?;
    lock_item(&mut tx, existing.item_id).await?;
    let claim = transition_out_of_active(
        &mut tx,
        claim_id,
        ClaimStatus::Cancelled,
        "cancelled_at",
        reason,
    )
    .await?;
    compact(&mut tx, claim.item_id).await?;
    outbox::append(
        &mut tx,
        AggregateType::Claim,
        claim.id,
        "claim.cancelled",
        serde_json::json!({ "item_id": claim.item_id }),
    )
    .await?;
    tx.commit().await?;
    Ok(claim)
}

pub async fn contact(
    pool: &DbPool,
    actor: ActorId,
    claim_id: Uuid,
    lister_note: Option<String>,
) -> Result<Claim, CoreError> {
    let existing = load_claim(pool, claim_id).await?;
    let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
        .bind(existing.item_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {}", existing.item_id)))?;
    require_owner(actor, &item)?;

    if !matches!(existing.status, ClaimStatus::Pending | ClaimStatus::Contacted) {
        return Err(CoreError::InvalidStateTransition(format!(
            "claim is {}, expected pending or contacted",
            existing.status
        )));
    }

    let mut tx = pool.begin().await?;
    let claim = sqlx::query_as::<_, Claim>(
        r#"
        UPDATE claims
        SET status = 'contacted',
            contacted_at = COALESCE(contacted_at, now()),
            lister_notes = COALESCE($2, lister_notes)
        WHERE id = $1 AND status IN ('pending', 'contacted')
        RETURNING *
        "#,
    )
    .bind(claim_id)
    .bind(lister_note)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        CoreError::InvalidStateTransition("claim left the active set concurrently".to_string())
    })?;

    outbox::append(
        &mut tx,
        AggregateType::Claim,
        claim.id,
        "claim.contacted",
        serde_json::json!({ "item_id": claim.item_id }),
    )
    .await?;

    tx.commit().await?;
    Ok(claim)
}

pub async fn skip(
    pool: &DbPool,
    actor: ActorId,
    claim_id: Uuid,
    reason: Option<String>,
) -> Result<Claim, CoreError> {
    let existing = load_claim(pool, claim_id).await?;
    let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
        .bind(existing.item_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {}", existing.item_id)))?;
    require_owner(actor, &item)?;

    let mut tx = pool.begin().await?;
    lock_item(&mut tx, existing.item_id).await?;
    let claim =
        transition_out_of_active(&mut tx, claim_id, ClaimStatus::Skipped, "skipped_at", reason)
            .await?;
    compact(&mut tx, claim.item_id).await?;
    outbox::append(
        &mut tx,
        AggregateType::Claim,
        claim.id,
        "claim.skipped",
        serde_json::json!({ "item_id": claim.item_id }),
    )
    .await?;
    tx.commit().await?;
    Ok(claim)
}

/// Shared body for Cancel/Skip: validate the claim is active, flip it to
/// the given terminal status, stamp the matching timestamp exactly once
/// (invariant P5).
async fn transition_out_of_active(
    tx: &mut Transaction<'_, Postgres>,
    claim_id: Uuid,
    to: ClaimStatus,
    timestamp_column: &str,
    reason: Option<String>,
) -> Result<Claim, CoreError> {
    let current = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1 FOR UPDATE")
        .bind(claim_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("claim {claim_id}")))?;

    if !current.status.is_active() {
        return Err(CoreError::InvalidStateTransition(format!(
            "claim is {}, expected pending or contacted",
            current.status
        )));
    }

    let sql = format!(
        "UPDATE claims SET status = $1, {timestamp_column} = now(), terminal_reason = COALESCE($2, terminal_reason) \
         WHERE id = $3 RETURNING *"
    );
    let claim = sqlx::query_as::<_, Claim>(&sql)
        .bind(to)
        .bind(reason)
        .bind(claim_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(claim)
}

/// Used by the reclamation loop (C4) to expire one stale active claim and
/// compact its item's queue in the same transaction. Not part of the
/// public command surface — the loop decides *which* claims are stale
/// (spec §4.4.2); this only performs the transition.
pub(crate) async fn expire_stale_claim(pool: &DbPool, claim_id: Uuid, item_id: Uuid) -> Result<(), CoreError> {
    let mut tx = pool.begin().await?;
    lock_item(&mut tx, item_id).await?;
    let claim = transition_out_of_active(
        &mut tx,
        claim_id,
        ClaimStatus::Expired,
        "expired_at",
        Some("inactivity".to_string()),
    )
    .await?;
    compact(&mut tx, claim.item_id).await?;
    outbox::append(
        &mut tx,
        AggregateType::Claim,
        claim.id,
        "claim.expired",
        serde_json::json!({ "item_id": claim.item_id, "reason": "inactivity" }),
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// MoveToPosition
// ---------------------------------------------------------------------------

pub async fn move_to_position(
    pool: &DbPool,
    actor: ActorId,
    claim_id: Uuid,
    new_pos: i32,
) -> Result<Claim, CoreError> {
    let existing = load_claim(pool, claim_id).await?;
    let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
        .bind(existing.item_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {}", existing.item_id)))?;
    require_owner(actor, &item)?;

    let mut tx = pool.begin().await?;
    lock_item(&mut tx, existing.item_id).await?;

    let active = active_set_ordered(&mut tx, existing.item_id).await?;
    if !active.iter().any(|c| c.id == claim_id) {
        return Err(CoreError::InvalidStateTransition(
            "claim is not in the active set".to_string(),
        ));
    }
    let size = active.len() as i32;
    if new_pos < 1 || new_pos > size {
        return Err(CoreError::InvalidInput(vec![crate::error::FieldError::new(
            "new_pos",
            format!("must be between 1 and {size}"),
        )]));
    }

    let active_ids: Vec<Uuid> = active.iter().map(|c| c.id).collect();
    let reordered = reorder_active(&active_ids, claim_id, new_pos);

    apply_positions(&mut tx, &reordered).await?;
    tx.commit().await?;

    load_claim(pool, claim_id).await
}

// ---------------------------------------------------------------------------
// Complete
// ---------------------------------------------------------------------------

pub async fn complete(pool: &DbPool, actor: ActorId, claim_id: Uuid) -> Result<Claim, CoreError> {
    let existing = load_claim(pool, claim_id).await?;
    require_claim_owner(actor, existing.user_id)?;

    if existing.status != ClaimStatus::Selected {
        return Err(CoreError::InvalidStateTransition(format!(
            "claim is {}, expected selected",
            existing.status
        )));
    }

    let mut tx = pool.begin().await?;
    let claim = sqlx::query_as::<_, Claim>(
        r#"
        UPDATE claims SET status = 'completed', completed_at = now()
        WHERE id = $1 AND status = 'selected'
        RETURNING *
        "#,
    )
    .bind(claim_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        CoreError::InvalidStateTransition("claim is no longer selected".to_string())
    })?;

    outbox::append(
        &mut tx,
        AggregateType::Claim,
        claim.id,
        "claim.completed",
        serde_json::json!({ "item_id": claim.item_id }),
    )
    .await?;

    tx.commit().await?;
    Ok(claim)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// `ListByUser` — every claim a given user has made, most recent first.
pub async fn list_by_user(
    pool: &DbPool,
    config: &Config,
    user_id: Uuid,
    page: Page,
) -> Result<Vec<Claim>, CoreError> {
    let page = page.clamped(config.search_page_limit_max);
    let claims = sqlx::query_as::<_, Claim>(
        r#"
        SELECT * FROM claims WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok(claims)
}

/// `ListForLister` — every claim made on any item the given user owns.
pub async fn list_for_lister(
    pool: &DbPool,
    config: &Config,
    lister_id: Uuid,
    page: Page,
) -> Result<Vec<Claim>, CoreError> {
    let page = page.clamped(config.search_page_limit_max);
    let claims = sqlx::query_as::<_, Claim>(
        r#"
        SELECT claims.* FROM claims
        JOIN items ON items.id = claims.item_id
        WHERE items.owner_id = $1
        ORDER BY claims.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(lister_id)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok(claims)
}

pub async fn get_queue(
    pool: &DbPool,
    item_id: Uuid,
    include_inactive: bool,
) -> Result<Vec<Claim>, CoreError> {
    let claims = if include_inactive {
        sqlx::query_as::<_, Claim>(
            "SELECT * FROM claims WHERE item_id = $1 ORDER BY queue_position ASC, created_at ASC",
        )
        .bind(item_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Claim>(
            r#"
            SELECT * FROM claims
            WHERE item_id = $1 AND status IN ('pending', 'contacted')
            ORDER BY queue_position ASC, created_at ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(pool)
        .await?
    };
    Ok(claims)
}

pub async fn get_next(pool: &DbPool, item_id: Uuid) -> Result<Option<Claim>, CoreError> {
    let claim = sqlx::query_as::<_, Claim>(
        r#"
        SELECT * FROM claims
        WHERE item_id = $1 AND status IN ('pending', 'contacted')
        ORDER BY queue_position ASC, created_at ASC
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(claim)
}

pub async fn get_queue_summary(
    pool: &DbPool,
    item_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<QueueSummary, CoreError> {
    let total_claims: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims WHERE item_id = $1")
        .bind(item_id)
        .fetch_one(pool)
        .await?;
    let active_claims: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims WHERE item_id = $1 AND status IN ('pending', 'contacted')",
    )
    .bind(item_id)
    .fetch_one(pool)
    .await?;

    let viewer_position: Option<i32> = match viewer {
        Some(user_id) => {
            let row = sqlx::query(
                r#"
                SELECT queue_position FROM claims
                WHERE item_id = $1 AND user_id = $2 AND status IN ('pending', 'contacted')
                "#,
            )
            .bind(item_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
            row.map(|r| r.get::<i32, _>("queue_position"))
        }
        None => None,
    };

    Ok(QueueSummary {
        total_claims,
        active_claims,
        viewer_position,
        estimated_wait: viewer_position.map(estimated_wait),
    })
}
