//! Category entity. Hierarchical, not on the hot path (§3: "described only
//! because items reference it").

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub name: String,
    pub active: bool,
    pub sort_order: i32,
}
