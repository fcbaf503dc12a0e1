//! End-to-end scenarios S1-S6 from the spec's testable-properties suite,
//! run against a live Postgres. Grounded in the teacher's `db_tests.rs`
//! style: a `setup_test_db`/`cleanup_test_data` pair plus one `#[tokio::test]`
//! per scenario, calling the library's async command functions directly.

use std::time::Duration;

use giveaway_server::auth::ActorId;
use giveaway_server::config::Config;
use giveaway_server::db::{self, DbPool};
use giveaway_server::models::{ClaimPrefs, ClaimStatus, ContactMethod, ItemDraft, ItemStatus};
use giveaway_server::{error::CoreError, queue, registry};
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
        title: "a free couch, good condition".to_string(),
        description: "blue sectional, pickup only, must bring help".to_string(),
        zip_code: "94107".to_string(),
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
        contact_method: ContactMethod::Email,
        preferred_pickup_date: None,
        claimer_notes: None,
    }
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn s1_fifo_under_burst() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;

    let users: Vec<ActorId> = (0..10).map(|_| ActorId(Uuid::new_v4())).collect();
    let mut handles = Vec::new();
    for user in users.clone() {
        let pool = pool.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            queue::enqueue(&pool, &config, user, item_id, prefs())
                .await
                .expect("enqueue should succeed")
        }));
    }
    let mut claims = Vec::new();
    for h in handles {
        claims.push(h.await.unwrap());
    }

    let queue_rows = queue::get_queue(&pool, item_id, false)
        .await
        .expect("get_queue failed");
    assert_eq!(queue_rows.len(), 10);

    let mut positions: Vec<i32> = queue_rows.iter().map(|c| c.queue_position).collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=10).collect::<Vec<_>>());

    let distinct_users: std::collections::HashSet<Uuid> =
        queue_rows.iter().map(|c| c.user_id).collect();
    assert_eq!(distinct_users.len(), 10);
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn s2_mid_queue_cancellation_compacts() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;

    let users: Vec<ActorId> = (0..10).map(|_| ActorId(Uuid::new_v4())).collect();
    let mut claim_ids = Vec::new();
    for user in &users {
        let claim = queue::enqueue(&pool, &config, *user, item_id, prefs())
            .await
            .expect("enqueue should succeed");
        claim_ids.push(claim.id);
    }

    // Cancel the claims currently at position 3 (U3) and position 7 (U7).
    queue::cancel(&pool, users[2], claim_ids[2], None)
        .await
        .expect("cancel at position 3 should succeed");
    queue::cancel(&pool, users[6], claim_ids[6], None)
        .await
        .expect("cancel at position 7 should succeed");

    let remaining = queue::get_queue(&pool, item_id, false)
        .await
        .expect("get_queue failed");
    assert_eq!(remaining.len(), 8);

    let mut positions: Vec<i32> = remaining.iter().map(|c| c.queue_position).collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=8).collect::<Vec<_>>());

    let expected_order: Vec<Uuid> = [0usize, 1, 3, 4, 5, 7, 8, 9]
        .iter()
        .map(|&i| users[i].0)
        .collect();
    let mut by_position = remaining;
    by_position.sort_by_key(|c| c.queue_position);
    let actual_order: Vec<Uuid> = by_position.iter().map(|c| c.user_id).collect();
    assert_eq!(actual_order, expected_order);
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn s3_selection_closes_the_item() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;

    let claimer = ActorId(Uuid::new_v4());
    let other = ActorId(Uuid::new_v4());
    let claim = queue::enqueue(&pool, &config, claimer, item_id, prefs())
        .await
        .expect("enqueue should succeed");
    queue::enqueue(&pool, &config, other, item_id, prefs())
        .await
        .expect("second enqueue should succeed");

    let selected =
        giveaway_server::lifecycle::select_claim(&pool, owner, claim.id)
            .await
            .expect("select should succeed");
    assert_eq!(selected.status, ClaimStatus::Selected);

    let item = registry::get_item(&pool, item_id).await.expect("get_item failed");
    assert_eq!(item.status, ItemStatus::Claimed);

    let active = queue::get_queue(&pool, item_id, false)
        .await
        .expect("get_queue failed");
    assert!(active.is_empty());

    let err = queue::enqueue(&pool, &config, ActorId(Uuid::new_v4()), item_id, prefs())
        .await
        .expect_err("enqueue on a claimed item must fail");
    assert!(matches!(err, CoreError::InvalidStateTransition(_)));
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn s4_duplicate_claim_rejected() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;
    let user = ActorId(Uuid::new_v4());

    queue::enqueue(&pool, &config, user, item_id, prefs())
        .await
        .expect("first enqueue should succeed");

    let err = queue::enqueue(&pool, &config, user, item_id, prefs())
        .await
        .expect_err("duplicate enqueue must fail");
    assert!(matches!(err, CoreError::DuplicateClaim));

    let queue_rows = queue::get_queue(&pool, item_id, false).await.unwrap();
    assert_eq!(queue_rows.len(), 1);
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn s5_self_claim_rejected() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;

    let err = queue::enqueue(&pool, &config, owner, item_id, prefs())
        .await
        .expect_err("self-claim must fail");
    assert!(matches!(err, CoreError::SelfClaimForbidden));

    let queue_rows = queue::get_queue(&pool, item_id, false).await.unwrap();
    assert!(queue_rows.is_empty());
}

#[tokio::test]
#[ignore] // requires a live Postgres at TEST_DATABASE_URL; run with --ignored
async fn s6_stale_expiration_advances_the_queue() {
    let (pool, config) = setup_test_db().await;
    cleanup_test_data(&pool).await;

    let owner = ActorId(Uuid::new_v4());
    let item_id = create_test_item(&pool, &config, owner).await;
    let user_a = ActorId(Uuid::new_v4());
    let user_b = ActorId(Uuid::new_v4());

    let claim_a = queue::enqueue(&pool, &config, user_a, item_id, prefs())
        .await
        .expect("enqueue A should succeed");
    queue::enqueue(&pool, &config, user_b, item_id, prefs())
        .await
        .expect("enqueue B should succeed");

    // Backdate A's created_at to 49h ago so it is past the 48h staleness
    // threshold; B stays fresh at ~now.
    sqlx::query("UPDATE claims SET created_at = now() - interval '49 hours' WHERE id = $1")
        .bind(claim_a.id)
        .execute(&pool)
        .await
        .expect("failed to backdate claim");

    let counts = giveaway_server::reclamation::run_once(&pool, &config)
        .await
        .expect("reclaim should succeed");
    assert_eq!(counts.claims_expired, 1);

    let a_after = queue::get_queue(&pool, item_id, true)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.id == claim_a.id)
        .expect("claim A should still exist");
    assert_eq!(a_after.status, ClaimStatus::Expired);

    let next = queue::get_next(&pool, item_id)
        .await
        .expect("get_next failed")
        .expect("queue should not be empty");
    assert_eq!(next.user_id, user_b.0);
    assert_eq!(next.queue_position, 1);
}
