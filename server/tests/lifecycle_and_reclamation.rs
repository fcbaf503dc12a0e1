//! Lifecycle Coordinator cascades (C3) and reclamation idempotency (P7),
//! run against a live Postgres. See `queue_scenarios.rs` for the
//! `setup_test_db`/`cleanup_test_data` pattern this file repeats,
//! matching the teacher's practice of a self-contained setup per test
//! file rather than a shared fixture crate.

use std::time::Duration;

use giveaway_server::auth::ActorId;
use giveaway_server::config::Config;
use giveaway_server::db::{self, DbPool};
use giveaway_server::models::{ClaimPrefs, ClaimStatus, ContactMethod, ItemDraft, ItemStatus};
use giveaway_server::{queue, reclamation, registry};
use uuid::Uuid;

async fn setup_test_db() -> (DbPool, Config) {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/giveaway_test".to_string());

    let config = Config {
        database_url,
        max_connections: 20,
        min_connections: 2,
        acquire_timeout: Duration::from_secs(10),
        idle_timeout: Duration::from_secs(60),
        default_item_ttl_days: 14,
        max_item_ttl_days: 90,
        claim_staleness_hours: 48,
        reclamation_interval: Duration::from_secs(3600),
        enqueue_retry_attempts: 3,
        search_page_limit_max: 100,
        archive_age_days: 90,
    };

    let pool = db::init_db(&config).await.expect("failed to init test db");
    (pool, config)
}

async fn cleanup_test_data(pool: &DbPool) {
    sqlx::query("TRUNCATE TABLE outbox, claims, items CASCADE")
        .execute(pool)
        .await
        .expect("failed to truncate tables");
}

async fn create_test_item(pool: &DbPool, config: &Config, owner: ActorId) -> Uuid {
    let draft = ItemDraft {
        title: "a free desk, solid wood".to_string(),
        description: "heavy but sturdy, curb pickup available".to_string(),
        zip_code: "10001".to_string(),
        category_id: None,
        lat: None,
        lon: None,
        pickup_notes: None,
        ttl_days: None,
    };
    registry::create_item(pool, config, owner, draft)
        .await
        .expect("failed to create test item")
        .id
}

fn prefs() -> ClaimPrefs {
    ClaimPrefs {
        contact_method: ContactMethod::Phone,
        preferred_pickup_date: None,
        claimer_notes: None,
    }
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn soft_delete_cascades_active_claims_to_expired() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;

    let claimers: Vec<ActorId> = (0..3).map(|_| ActorId(Uuid::new_v4())).collect();
    for claimer in &claimers {
        queue::enqueue(&pool, &config, *claimer, item_id, prefs())
            .await
            .expect("enqueue should succeed");
    }

    let deleted = registry::soft_delete(&pool, owner, item_id)
        .await
        .expect("soft delete should succeed");
    assert_eq!(deleted.status, ItemStatus::Deleted);
    assert!(deleted.expired_at.is_some());

    let all_claims = queue::get_queue(&pool, item_id, true)
        .await
        .expect("get_queue failed");
    assert_eq!(all_claims.len(), 3);
    assert!(all_claims
        .iter()
        .all(|c| c.status == ClaimStatus::Expired));
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn expire_item_cascades_like_soft_delete_with_different_reason() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;
    let claimer = ActorId(Uuid::new_v4());
    queue::enqueue(&pool, &config, claimer, item_id, prefs())
        .await
        .expect("enqueue should succeed");

    let expired = giveaway_server::lifecycle::expire_item(&pool, item_id)
        .await
        .expect("expire_item should succeed");
    assert_eq!(expired.status, ItemStatus::Expired);

    let claims = queue::get_queue(&pool, item_id, true).await.unwrap();
    assert_eq!(claims[0].status, ClaimStatus::Expired);
    assert_eq!(claims[0].terminal_reason.as_deref(), Some("item expired"));
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn reclaim_is_idempotent() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;

    // Force the item past its own expiry so the first pass has work to do.
    sqlx::query("UPDATE items SET expires_at = now() - interval '1 hour' WHERE id = $1")
        .bind(item_id)
        .execute(&pool)
        .await
        .expect("failed to expire item for test");

    let first = reclamation::run_once(&pool, &config)
        .await
        .expect("first reclaim pass should succeed");
    assert_eq!(first.items_expired, 1);

    let second = reclamation::run_once(&pool, &config)
        .await
        .expect("second reclaim pass should succeed");
    assert_eq!(second.items_expired, 0);
    assert_eq!(second.claims_expired, 0);

    let item = registry::get_item(&pool, item_id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Expired);
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn preview_matches_run_once_counts_without_mutating() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;
    sqlx::query("UPDATE items SET expires_at = now() - interval '1 hour' WHERE id = $1")
        .bind(item_id)
        .execute(&pool)
        .await
        .expect("failed to expire item for test");

    let preview = reclamation::preview(&pool, &config)
        .await
        .expect("preview should succeed");
    assert_eq!(preview.items_expired, 1);

    // Preview performs no writes: the item is still active in storage.
    let item = registry::get_item(&pool, item_id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Active);

    let run = reclamation::run_once(&pool, &config)
        .await
        .expect("run_once should succeed");
    assert_eq!(run.items_expired, preview.items_expired);
}
