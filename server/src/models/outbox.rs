//! Outbox row appended alongside every lifecycle transition that the
//! source system used to fire an event-emitter notification for (§9).
//! A separate delivery worker is plumbing and out of scope here; the core
//! only guarantees the append happens in the same transaction as the
//! state change it describes.

use serde::Serialize;
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateType {
    Item,
    Claim,
}

impl AggregateType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Claim => "claim",
        }
    }
}

pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_type: AggregateType,
    aggregate_id: Uuid,
    event_type: &str,
    payload: impl Serialize,
) -> Result<(), sqlx::Error> {
    let payload: Value = serde_json::to_value(payload).unwrap_or(Value::Null);
    sqlx::query(
        r#"
        INSERT INTO outbox (aggregate_type, aggregate_id, event_type, payload)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(aggregate_type.as_str())
    .bind(aggregate_id)
    .bind(event_type)
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
