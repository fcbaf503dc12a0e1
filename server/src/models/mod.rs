//! Database models mapping rows to domain types.

pub mod category;
pub mod claim;
pub mod item;
pub mod outbox;

pub use category::Category;
pub use claim::{Claim, ClaimPrefs, ClaimStatus, ContactMethod};
pub use item::{
    Item, ItemDraft, ItemPatch, ItemStatus, ItemWithQueue, Page, QueueSummary, SearchFilters,
    SortDirection, SortKey,
};
