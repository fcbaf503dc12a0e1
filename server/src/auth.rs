//! Authorization helpers that gate state transitions (spec §4/§7's
//! `Forbidden`). Token issuance, OAuth profile ingestion and signature
//! verification are external plumbing (spec §1) — this module only
//! answers "is this actor allowed to do this", given an already-resolved
//! identity.

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::Item;

/// An already-authenticated caller. Constructing one is the plumbing
/// layer's job (session lookup, JWT verification, ...); the core only
/// ever receives the resolved id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub Uuid);

impl From<Uuid> for ActorId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Invariant P3 / spec §7 `SelfClaimForbidden`: an owner may not hold a
/// claim on their own item.
pub fn require_not_owner(actor: ActorId, item: &Item) -> Result<(), CoreError> {
    if item.owner_id == actor.0 {
        return Err(CoreError::SelfClaimForbidden);
    }
    Ok(())
}

/// Most C1/C2 mutations require the caller to be the item's owner.
pub fn require_owner(actor: ActorId, item: &Item) -> Result<(), CoreError> {
    if item.owner_id != actor.0 {
        return Err(CoreError::Forbidden(
            "actor is not the item's owner".to_string(),
        ));
    }
    Ok(())
}

/// `Cancel`/`Complete` require the caller to be the claim's own user.
pub fn require_claim_owner(actor: ActorId, claim_user_id: Uuid) -> Result<(), CoreError> {
    if claim_user_id != actor.0 {
        return Err(CoreError::Forbidden(
            "actor is not the claim's owner".to_string(),
        ));
    }
    Ok(())
}
