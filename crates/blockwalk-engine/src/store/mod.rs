//! Pluggable storage for house claims.
//!
//! The [`ClaimStore`] trait is the authoritative state of claims and
//! the **single writer** of claim status; every other component reads
//! claim state or requests mutations through this API, never around
//! it.
//!
//! ## Design Principles
//!
//! - **Per-address CAS**: Granting a claim is a conditional insert
//!   keyed by the address - the "no active claim exists" check and the
//!   insert are one indivisible step relative to other attempts on the
//!   same address. No global serialization is required or implied.
//! - **Races are results, not errors**: Conflicts, ownership
//!   mismatches, and expiry races are typed outcomes. A client racing
//!   the expiry sweep is an expected condition.
//! - **Testability**: In-memory implementation for tests and
//!   single-node deployments; a database-backed implementation can
//!   slot in behind the same trait.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use blockwalk_core::{CanvasserId, ClaimId, Coordinates, SessionId};

use crate::claim::{HouseClaim, VisitOutcome};
use crate::error::Result;

/// One address in a claim request, with its denormalized coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRequest {
    /// The street address to lease.
    pub address: String,
    /// Coordinates of the address.
    pub location: Coordinates,
}

/// Structured denial for an address already under an active claim.
///
/// Carries enough for "claimed by X until HH:MM" feedback rather than
/// a generic error.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimConflict {
    /// The session holding the existing claim.
    pub holder_session: SessionId,
    /// The canvasser behind that session.
    pub holder_canvasser: CanvasserId,
    /// When the existing lease lapses.
    pub expires_at: DateTime<Utc>,
}

/// Per-address outcome of a claim request.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The lease was granted.
    Granted(HouseClaim),
    /// Another session holds an active claim on this address.
    Conflict(ClaimConflict),
}

impl ClaimOutcome {
    /// Returns true if the lease was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// Returns the granted claim, if any.
    #[must_use]
    pub const fn granted(&self) -> Option<&HouseClaim> {
        match self {
            Self::Granted(claim) => Some(claim),
            Self::Conflict(_) => None,
        }
    }
}

/// Result of one claim request, keyed by the requested address.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressClaimResult {
    /// The address that was requested.
    pub address: String,
    /// What happened for that address.
    pub outcome: ClaimOutcome,
}

/// Result of an owner-initiated claim operation (arrive, complete,
/// release).
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOpResult {
    /// The operation was applied; the updated claim is returned.
    Applied(HouseClaim),
    /// The claim was already in the requested state (client retry);
    /// nothing changed.
    NoOp(HouseClaim),
    /// No such claim, or the claim is no longer operable - a claim
    /// that expired under its owner reports NotFound, and the client
    /// must re-claim.
    NotFound,
    /// The caller's session does not own this claim. State was not
    /// mutated.
    Forbidden {
        /// The session that actually owns the claim.
        owner: SessionId,
    },
}

impl ClaimOpResult {
    /// Returns true if the claim ended up in the requested state.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Applied(_) | Self::NoOp(_))
    }

    /// Returns the claim if the operation succeeded.
    #[must_use]
    pub const fn claim(&self) -> Option<&HouseClaim> {
        match self {
            Self::Applied(claim) | Self::NoOp(claim) => Some(claim),
            Self::NotFound | Self::Forbidden { .. } => None,
        }
    }
}

/// Result of an expiry-sweep expiration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpireResult {
    /// The claim was expired; returned for event publication.
    Expired(HouseClaim),
    /// The claim was already resolved (visited, released, or expired
    /// by an earlier sweep) - nothing to do.
    AlreadyResolved,
}

/// Authoritative store of house claims.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from
/// request handlers and the expiry sweep.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Requests leases on a batch of addresses for one session.
    ///
    /// Atomic **per address**: concurrent requests for the same
    /// address yield exactly one `Granted` and structured `Conflict`s
    /// for the rest. A lapsed (past-expiry but not yet swept) claim
    /// does not block a new grant; the old claim is expired as part of
    /// the takeover.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails; no lease is granted on a
    /// failed path (fail closed).
    async fn claim(
        &self,
        session_id: SessionId,
        canvasser_id: &CanvasserId,
        requests: Vec<ClaimRequest>,
        ttl: Duration,
    ) -> Result<Vec<AddressClaimResult>>;

    /// Transitions Claimed -> Visiting for the owning session.
    ///
    /// Arriving at a house the session is already visiting is a
    /// no-op success (client retry).
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn arrive(&self, claim_id: ClaimId, session_id: SessionId) -> Result<ClaimOpResult>;

    /// Transitions Visiting -> Visited with the visit results.
    ///
    /// Completing an already-Visited claim is a no-op success.
    /// Completing a claim the sweep has expired is `NotFound` - the
    /// client must re-claim.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn complete(
        &self,
        claim_id: ClaimId,
        session_id: SessionId,
        outcome: VisitOutcome,
    ) -> Result<ClaimOpResult>;

    /// Transitions Claimed/Visiting -> Released for the owning session.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn release(&self, claim_id: ClaimId, session_id: SessionId) -> Result<ClaimOpResult>;

    /// Transitions Claimed/Visiting -> Expired, bypassing the owner
    /// check. Called only by the expiry scheduler; expiry is not
    /// owner-initiated.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn expire(&self, claim_id: ClaimId) -> Result<ExpireResult>;

    /// Releases every Claimed/Visiting claim owned by a session as one
    /// batch, returning the released claims. Used by the session-end
    /// cascade and disconnect handling.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn release_all_for_session(&self, session_id: SessionId) -> Result<Vec<HouseClaim>>;

    /// Returns the IDs of active claims whose lease lapsed at or
    /// before `now`. A read-only scan; it holds no lock that blocks
    /// concurrent claims.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn lapsed(&self, now: DateTime<Utc>) -> Result<Vec<ClaimId>>;

    /// Returns the set of addresses under an active, unexpired claim
    /// at `now`. Used by the geo index to exclude unavailable houses.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn active_addresses(&self, now: DateTime<Utc>) -> Result<HashSet<String>>;

    /// Returns the Claimed/Visiting claims owned by a session.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn active_claims_for_session(&self, session_id: SessionId) -> Result<Vec<HouseClaim>>;

    /// Looks up a single claim by ID.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    async fn get(&self, claim_id: ClaimId) -> Result<Option<HouseClaim>>;
}

/// Normalizes an address into the key used for the active-claim index.
///
/// Case and surrounding whitespace do not distinguish doorsteps.
#[must_use]
pub fn address_key(address: &str) -> String {
    address.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_key_normalizes() {
        assert_eq!(address_key("  100 Main St "), "100 main st");
        assert_eq!(address_key("100 MAIN ST"), address_key("100 main st"));
        assert_ne!(address_key("100 Main St"), address_key("102 Main St"));
    }

    #[test]
    fn claim_outcome_accessors() {
        let conflict = ClaimOutcome::Conflict(ClaimConflict {
            holder_session: SessionId::generate(),
            holder_canvasser: CanvasserId::new("vol-1"),
            expires_at: Utc::now(),
        });
        assert!(!conflict.is_granted());
        assert!(conflict.granted().is_none());
    }

    #[test]
    fn claim_op_result_success() {
        assert!(!ClaimOpResult::NotFound.is_success());
        assert!(!ClaimOpResult::Forbidden {
            owner: SessionId::generate()
        }
        .is_success());
    }
}
