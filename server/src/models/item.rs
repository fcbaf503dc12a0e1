//! Item entity: the thing being given away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of an item.
///
/// DRAFT -> ACTIVE -> (CLAIMED | EXPIRED | DELETED). SUSPENDED is an
/// administrative off-ramp reversible to ACTIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "item_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Draft,
    Active,
    Claimed,
    Expired,
    Deleted,
    Suspended,
}

impl ItemStatus {
    pub fn accepts_claims(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
            Self::Deleted => "deleted",
            Self::Suspended => "suspended",
        };
        write!(f, "{s}")
    }
}

/// Database row for an item.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub zip_code: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub pickup_notes: Option<String>,
    pub status: ItemStatus,
    pub view_count: i64,
    pub claim_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status.accepts_claims() && self.expires_at > now
    }
}

/// Caller-supplied fields for `CreateItem`.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    pub description: String,
    pub zip_code: String,
    pub category_id: Option<Uuid>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub pickup_notes: Option<String>,
    pub ttl_days: Option<i64>,
}

/// Partial update accepted by `UpdateItem`. `None` leaves a field unchanged;
/// `category_id: Some(None)` clears the category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub zip_code: Option<String>,
    pub category_id: Option<Option<Uuid>>,
    pub lat: Option<Option<f64>>,
    pub lon: Option<Option<f64>>,
    pub pickup_notes: Option<Option<String>>,
}

/// Whitelisted sort keys for `Search`/`FindNearby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CreatedAt,
    Title,
    ExpiresAt,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFilters {
    pub category_id: Option<Uuid>,
    pub zip_code: Option<String>,
    pub text: Option<String>,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    pub fn clamped(self, max_page_size: i64) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Returned by `GetWithQueue`.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub total_claims: i64,
    pub active_claims: i64,
    pub viewer_position: Option<i32>,
    pub estimated_wait: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemWithQueue {
    pub item: Item,
    pub queue: QueueSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus, expires_at: DateTime<Utc>) -> Item {
        Item {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            category_id: None,
            title: "a free couch".to_string(),
            description: "gently used, pickup only".to_string(),
            zip_code: "94107".to_string(),
            lat: None,
            lon: None,
            pickup_notes: None,
            status,
            view_count: 0,
            claim_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            expires_at,
            claimed_at: None,
            expired_at: None,
        }
    }

    #[test]
    fn claimable_requires_active_status_and_unexpired_ttl() {
        let now = Utc::now();
        assert!(item(ItemStatus::Active, now + chrono::Duration::days(1)).is_claimable(now));
        assert!(!item(ItemStatus::Active, now - chrono::Duration::days(1)).is_claimable(now));
        assert!(!item(ItemStatus::Draft, now + chrono::Duration::days(1)).is_claimable(now));
        assert!(!item(ItemStatus::Suspended, now + chrono::Duration::days(1)).is_claimable(now));
    }

    #[test]
    fn has_location_requires_both_coordinates() {
        let mut i = item(ItemStatus::Active, Utc::now());
        assert!(!i.has_location());
        i.lat = Some(37.7);
        assert!(!i.has_location());
        i.lon = Some(-122.4);
        assert!(i.has_location());
    }

    #[test]
    fn page_clamps_size_and_computes_offset() {
        let page = Page {
            page: 0,
            page_size: 1000,
        }
        .clamped(100);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        assert_eq!(page.offset(), 0);

        let page = Page {
            page: 3,
            page_size: 20,
        }
        .clamped(100);
        assert_eq!(page.offset(), 40);
    }
}
