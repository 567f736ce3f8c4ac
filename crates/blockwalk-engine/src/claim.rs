//! House claims and their status state machine.
//!
//! A [`HouseClaim`] is a time-bounded lease on one street address held
//! by one walk session. The invariant the whole engine is built
//! around: **at most one claim with status Claimed or Visiting exists
//! per address at any instant**. The claim store enforces that
//! invariant; this module defines the entity and the only function
//! allowed to change its status, [`HouseClaim::apply`].
//!
//! ## Lifecycle
//!
//! ```text
//! Claimed ──arrive──> Visiting ──complete──> Visited   (terminal)
//!    │                   │
//!    ├──release──────────┴──> Released                 (terminal)
//!    └──expire───────────────> Expired                 (terminal)
//! ```
//!
//! Any other transition is rejected with a typed result, never a
//! panic or an error: a client racing against expiry is an expected
//! condition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use blockwalk_core::{CanvasserId, ClaimId, Coordinates, SessionId};

/// Default lease duration for a new claim.
pub const DEFAULT_CLAIM_TTL_MINUTES: u32 = 30;

/// Status of a house claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClaimStatus {
    /// Reserved by a canvasser, not yet at the door.
    Claimed,
    /// The canvasser has arrived and is at the house.
    Visiting,
    /// Visit finished successfully. Terminal.
    Visited,
    /// Lease lapsed without a visit. Terminal.
    Expired,
    /// Given back by the canvasser or their ending session. Terminal.
    Released,
}

impl ClaimStatus {
    /// Returns true if the claim still excludes other canvassers.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Claimed | Self::Visiting)
    }

    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Returns the lowercase wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Visiting => "visiting",
            Self::Visited => "visited",
            Self::Expired => "expired",
            Self::Released => "released",
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result data recorded when a visit completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitOutcome {
    /// Number of voters spoken with at the door.
    pub voters_contacted: u32,
    /// Number of voters who were home.
    pub voters_home: u32,
    /// Identifiers of contact records created by the external
    /// contact-recording subsystem. The engine stores only the
    /// references, never the records.
    pub contact_ids: Vec<String>,
}

/// A requested status change, applied through [`HouseClaim::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimTransition {
    /// Claimed -> Visiting.
    Arrive,
    /// Visiting -> Visited, carrying the visit results.
    Complete(VisitOutcome),
    /// Claimed/Visiting -> Released.
    Release,
    /// Claimed/Visiting -> Expired.
    Expire,
}

impl ClaimTransition {
    /// Returns the short name of the transition, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Arrive => "arrive",
            Self::Complete(_) => "complete",
            Self::Release => "release",
            Self::Expire => "expire",
        }
    }
}

/// Outcome of applying a transition to a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// The transition was applied and the status changed.
    Applied,
    /// The claim was already in the requested state; nothing changed.
    ///
    /// Arriving at a house the session is already visiting, or
    /// completing an already-Visited claim, is a retry and succeeds
    /// without mutating anything.
    NoOp,
    /// The transition is not valid from the current status.
    Invalid {
        /// The status the claim was in when the transition was attempted.
        from: ClaimStatus,
    },
}

impl StatusChange {
    /// Returns true if the claim is in the requested state after the
    /// call, whether or not this call changed it.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Applied | Self::NoOp)
    }
}

/// A lease on one address for one walk session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseClaim {
    /// Unique claim identifier.
    pub id: ClaimId,
    /// The session holding the lease.
    pub session_id: SessionId,
    /// The canvasser behind the session, denormalized for conflict
    /// feedback ("claimed by X until HH:MM").
    pub canvasser_id: CanvasserId,
    /// Street address, denormalized from the address catalog.
    pub address: String,
    /// Coordinates of the address.
    pub location: Coordinates,
    /// When the lease was granted.
    pub claimed_at: DateTime<Utc>,
    /// When the lease lapses if unresolved.
    pub expires_at: DateTime<Utc>,
    /// Current status.
    pub status: ClaimStatus,
    /// When the canvasser arrived at the door, if they did.
    pub visited_at: Option<DateTime<Utc>>,
    /// Visit results, present once the claim is Visited.
    pub outcome: Option<VisitOutcome>,
}

impl HouseClaim {
    /// Creates a freshly granted claim.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        canvasser_id: CanvasserId,
        address: impl Into<String>,
        location: Coordinates,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ClaimId::generate(),
            session_id,
            canvasser_id,
            address: address.into(),
            location,
            claimed_at: now,
            expires_at: now + ttl,
            status: ClaimStatus::Claimed,
            visited_at: None,
            outcome: None,
        }
    }

    /// Returns true if the lease is active but past its expiry.
    ///
    /// A lapsed claim no longer excludes other canvassers even before
    /// the expiry sweep marks it Expired.
    #[must_use]
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.expires_at <= now
    }

    /// Returns true if this claim excludes other canvassers at `now`.
    #[must_use]
    pub fn excludes_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.expires_at > now
    }

    /// Applies a status transition. This is the single place allowed
    /// to change [`HouseClaim::status`].
    pub fn apply(&mut self, transition: ClaimTransition, now: DateTime<Utc>) -> StatusChange {
        match (self.status, transition) {
            (ClaimStatus::Claimed, ClaimTransition::Arrive) => {
                self.status = ClaimStatus::Visiting;
                self.visited_at = Some(now);
                StatusChange::Applied
            }
            (ClaimStatus::Visiting, ClaimTransition::Arrive) => StatusChange::NoOp,
            (ClaimStatus::Visiting, ClaimTransition::Complete(outcome)) => {
                self.status = ClaimStatus::Visited;
                self.outcome = Some(outcome);
                StatusChange::Applied
            }
            (ClaimStatus::Visited, ClaimTransition::Complete(_)) => StatusChange::NoOp,
            (ClaimStatus::Claimed | ClaimStatus::Visiting, ClaimTransition::Release) => {
                self.status = ClaimStatus::Released;
                StatusChange::Applied
            }
            (ClaimStatus::Claimed | ClaimStatus::Visiting, ClaimTransition::Expire) => {
                self.status = ClaimStatus::Expired;
                StatusChange::Applied
            }
            (from, _) => StatusChange::Invalid { from },
        }
    }
}
