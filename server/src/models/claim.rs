//! Claim entity: a user's intent to receive an item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// `PENDING -> (CONTACTED ->)? (SELECTED -> COMPLETED) | CANCELLED | SKIPPED | EXPIRED`.
///
/// COMPLETED/CANCELLED/SKIPPED/EXPIRED are terminal (invariant P5): once
/// reached, status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "claim_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Contacted,
    Selected,
    Completed,
    Cancelled,
    Skipped,
    Expired,
}

impl ClaimStatus {
    /// Claims in the active set occupy a queue position (invariant P1).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Contacted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Skipped | Self::Expired
        )
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Contacted => "contacted",
            Self::Selected => "selected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "contact_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Email,
    Phone,
    Both,
}

/// Database row for a claim.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub item_id: Uuid,
    pub user_id: Uuid,
    pub queue_position: i32,
    pub status: ClaimStatus,
    pub contact_method: ContactMethod,
    pub preferred_pickup_date: Option<DateTime<Utc>>,
    pub claimer_notes: Option<String>,
    pub lister_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub contacted_at: Option<DateTime<Utc>>,
    pub selected_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub terminal_reason: Option<String>,
}

/// Caller-supplied preferences for `Enqueue`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimPrefs {
    pub contact_method: ContactMethod,
    pub preferred_pickup_date: Option<DateTime<Utc>>,
    pub claimer_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub claim: Claim,
}

/// `estimated_wait` is a count of claims strictly ahead, never a duration.
pub fn estimated_wait(position: i32) -> i32 {
    (position - 1).max(0)
}
