//! Lifecycle Coordinator (C3) — the three transitions that cross the
//! item/claim boundary atomically (spec §4.3):
//!
//! 1. `select_claim`  — claim -> SELECTED, item -> CLAIMED, siblings -> EXPIRED.
//! 2. `soft_delete_item` — item -> DELETED, every non-terminal claim -> EXPIRED.
//! 3. `expire_item` — identical cascade, item -> EXPIRED, different reason.
//!
//! Each is all-or-nothing: an observer sees either the pre-transition
//! state or the fully cascaded post-transition state, never a partial one.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::auth::{require_owner, ActorId};
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::outbox::{self, AggregateType};
use crate::models::{Claim, ClaimStatus, Item, ItemStatus};

async fn lock_item(tx: &mut Transaction<'_, Postgres>, item_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Expire every non-terminal claim on an item in one statement, recording
/// the same reason on each (invariant P5: stamped exactly once).
async fn expire_siblings(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    reason: &str,
    exclude_claim_id: Option<Uuid>,
) -> Result<Vec<Claim>, CoreError> {
    let rows = sqlx::query_as::<_, Claim>(
        r#"
        UPDATE claims
        SET status = 'expired', expired_at = now(), terminal_reason = $2
        WHERE item_id = $1
          AND status IN ('pending', 'contacted')
          AND ($3::uuid IS NULL OR id <> $3)
        RETURNING *
        "#,
    )
    .bind(item_id)
    .bind(reason)
    .bind(exclude_claim_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// 1. SelectClaim
// ---------------------------------------------------------------------------

pub async fn select_claim(pool: &DbPool, actor: ActorId, claim_id: Uuid) -> Result<Claim, CoreError> {
    let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1")
        .bind(claim_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("claim {claim_id}")))?;

    let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
        .bind(claim.item_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {}", claim.item_id)))?;
    require_owner(actor, &item)?;

    if !matches!(claim.status, ClaimStatus::Pending | ClaimStatus::Contacted) {
        return Err(CoreError::InvalidStateTransition(format!(
            "claim is {}, expected pending or contacted",
            claim.status
        )));
    }

    let mut tx = pool.begin().await?;
    lock_item(&mut tx, item.id).await?;

    let selected = sqlx::query_as::<_, Claim>(
        r#"
        UPDATE claims SET status = 'selected', selected_at = now()
        WHERE id = $1 AND status IN ('pending', 'contacted')
        RETURNING *
        "#,
    )
    .bind(claim_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        CoreError::InvalidStateTransition("claim left the active set concurrently".to_string())
    })?;

    expire_siblings(&mut tx, item.id, "another claim was selected", Some(claim_id)).await?;

    sqlx::query(
        "UPDATE items SET status = 'claimed', claimed_at = now(), updated_at = now() WHERE id = $1",
    )
    .bind(item.id)
    .execute(&mut *tx)
    .await?;

    outbox::append(
        &mut tx,
        AggregateType::Claim,
        selected.id,
        "claim.selected",
        serde_json::json!({ "item_id": item.id }),
    )
    .await?;
    outbox::append(
        &mut tx,
        AggregateType::Item,
        item.id,
        "item.claimed",
        serde_json::json!({ "claim_id": selected.id }),
    )
    .await?;

    tx.commit().await?;
    Ok(selected)
}

// ---------------------------------------------------------------------------
// 2 & 3. SoftDeleteItem / ExpireItem — same cascade, different terminus.
// ---------------------------------------------------------------------------

async fn close_item(
    pool: &DbPool,
    item_id: Uuid,
    to: ItemStatus,
    stamp_column: &str,
    claim_reason: &str,
) -> Result<Item, CoreError> {
    let mut tx = pool.begin().await?;
    lock_item(&mut tx, item_id).await?;

    expire_siblings(&mut tx, item_id, claim_reason, None).await?;

    let sql = format!(
        "UPDATE items SET status = $1, {stamp_column} = now(), updated_at = now() \
         WHERE id = $2 RETURNING *"
    );
    let item = sqlx::query_as::<_, Item>(&sql)
        .bind(to)
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("item {item_id}")))?;

    outbox::append(
        &mut tx,
        AggregateType::Item,
        item_id,
        if to == ItemStatus::Deleted {
            "item.deleted"
        } else {
            "item.expired"
        },
        serde_json::json!({}),
    )
    .await?;

    tx.commit().await?;
    Ok(item)
}

/// Called from `registry::soft_delete` once ownership has been checked.
pub async fn soft_delete_item(pool: &DbPool, item_id: Uuid) -> Result<Item, CoreError> {
    close_item(pool, item_id, ItemStatus::Deleted, "expired_at", "item removed").await
}

/// Called from the reclamation loop (C4) for items past `expires_at`.
pub async fn expire_item(pool: &DbPool, item_id: Uuid) -> Result<Item, CoreError> {
    close_item(pool, item_id, ItemStatus::Expired, "expired_at", "item expired").await
}
