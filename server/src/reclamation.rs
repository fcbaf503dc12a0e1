//! Reclamation Loop (C4) — periodic scan that expires stale items/claims
//! and advances queues (spec §4.4). Grounded in the teacher's
//! `jobs::run_key_package_cleanup_worker` shape: a `tokio::time::interval`
//! loop that ticks, logs counts via `tracing`, and never lets one failed
//! pass kill the worker.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::Row;
use tokio::time::interval;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::db::DbPool;
use crate::lifecycle;
use crate::queue;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct ReclaimCounts {
    pub items_expired: u64,
    pub claims_expired: u64,
    pub items_archived: u64,
}

/// `RunOnce` — one full pass: expire overdue items (delegating to C3),
/// expire stale active claims (compacting each affected item), archive
/// old terminal items. Idempotent: running it twice back to back is a
/// no-op the second time (invariant P7).
pub async fn run_once(pool: &DbPool, config: &Config) -> anyhow::Result<ReclaimCounts> {
    let mut counts = ReclaimCounts::default();

    let expired_item_ids: Vec<Uuid> = sqlx::query(
        "SELECT id FROM items WHERE status = 'active' AND expires_at < now()",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.get("id"))
    .collect();

    for item_id in expired_item_ids {
        match lifecycle::expire_item(pool, item_id).await {
            Ok(_) => counts.items_expired += 1,
            Err(e) => error!(%item_id, error = %e, "failed to expire item"),
        }
    }

    let staleness = ChronoDuration::hours(config.claim_staleness_hours);
    let cutoff = Utc::now() - staleness;
    let stale: Vec<(Uuid, Uuid)> = sqlx::query(
        r#"
        SELECT id, item_id FROM claims
        WHERE status IN ('pending', 'contacted') AND created_at < $1
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| (row.get("id"), row.get("item_id")))
    .collect();

    for (claim_id, item_id) in stale {
        match queue::expire_stale_claim(pool, claim_id, item_id).await {
            Ok(()) => counts.claims_expired += 1,
            Err(e) => error!(%claim_id, error = %e, "failed to expire stale claim"),
        }
    }

    let archive_cutoff = Utc::now() - ChronoDuration::days(config.archive_age_days);
    let archive_candidates: Vec<Uuid> = sqlx::query(
        r#"
        SELECT id FROM items
        WHERE status IN ('claimed', 'expired')
          AND updated_at < $1
          AND NOT EXISTS (
              SELECT 1 FROM outbox
              WHERE aggregate_id = items.id AND event_type = 'item.archived'
          )
        "#,
    )
    .bind(archive_cutoff)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.get("id"))
    .collect();

    for item_id in archive_candidates {
        match archive_item(pool, item_id).await {
            Ok(()) => counts.items_archived += 1,
            Err(e) => error!(%item_id, error = %e, "failed to archive item"),
        }
    }

    Ok(counts)
}

/// Mark one terminal item as archived: bump `updated_at` and append the
/// `item.archived` outbox marker in the same transaction, so a failed
/// insert never leaves the item updated-but-unmarked (which would make
/// the next pass re-count it, breaking idempotency).
async fn archive_item(pool: &DbPool, item_id: Uuid) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE items SET updated_at = now() WHERE id = $1")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO outbox (aggregate_type, aggregate_id, event_type, payload) \
         VALUES ('item', $1, 'item.archived', '{}'::jsonb)",
    )
    .bind(item_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// `Preview` — same scan, no writes. Used by operators to see what a run
/// would do before triggering it.
pub async fn preview(pool: &DbPool, config: &Config) -> anyhow::Result<ReclaimCounts> {
    let mut counts = ReclaimCounts::default();

    let items_expired: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE status = 'active' AND expires_at < now()")
            .fetch_one(pool)
            .await?;
    counts.items_expired = items_expired as u64;

    let cutoff = Utc::now() - ChronoDuration::hours(config.claim_staleness_hours);
    let claims_expired: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims WHERE status IN ('pending', 'contacted') AND created_at < $1",
    )
    .bind(cutoff)
    .fetch_one(pool)
    .await?;
    counts.claims_expired = claims_expired as u64;

    let archive_cutoff = Utc::now() - ChronoDuration::days(config.archive_age_days);
    let items_archived: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM items
        WHERE status IN ('claimed', 'expired') AND updated_at < $1
          AND NOT EXISTS (
              SELECT 1 FROM outbox
              WHERE aggregate_id = items.id AND event_type = 'item.archived'
          )
        "#,
    )
    .bind(archive_cutoff)
    .fetch_one(pool)
    .await?;
    counts.items_archived = items_archived as u64;

    Ok(counts)
}

/// Background worker: ticks on `config.reclamation_interval`, runs a
/// pass, logs the counts. Errors are logged and the loop continues.
pub async fn run_worker(pool: DbPool, config: Config) {
    let mut ticker = interval(config.reclamation_interval);
    info!(
        interval_secs = config.reclamation_interval.as_secs(),
        "starting reclamation loop"
    );

    loop {
        ticker.tick().await;
        info!("reclamation pass starting");
        match run_once(&pool, &config).await {
            Ok(counts) => info!(
                items_expired = counts.items_expired,
                claims_expired = counts.claims_expired,
                items_archived = counts.items_archived,
                "reclamation pass complete"
            ),
            Err(e) => error!(error = %e, "reclamation pass failed"),
        }
    }
}

