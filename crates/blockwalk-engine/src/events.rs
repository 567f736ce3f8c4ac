//! Domain events fanned out to subscribed canvassers.
//!
//! State-mutating operations emit a [`WalkEvent`] *after* the mutation
//! commits; the coordination bus forwards events to subscribers on a
//! best-effort basis. Correctness never depends on delivery - a missed
//! event is self-healing via the next available-houses or
//! active-canvassers poll.
//!
//! Event identifiers are ULIDs, so they sort chronologically when
//! compared as strings and need no separate sequence field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use blockwalk_core::{CanvasserId, ClaimId, Coordinates, SessionId};

/// Envelope carrying one coordination event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkEvent {
    /// Unique event identifier (ULID).
    pub id: String,
    /// Event timestamp.
    pub time: DateTime<Utc>,
    /// Event payload.
    #[serde(flatten)]
    pub data: WalkEventData,
}

impl WalkEvent {
    /// Wraps a payload in a new envelope stamped with the current time.
    #[must_use]
    pub fn new(data: WalkEventData) -> Self {
        Self {
            id: Ulid::new().to_string(),
            time: Utc::now(),
            data,
        }
    }

    /// Returns the coordinates this event is about, when it has any.
    ///
    /// The bus uses this for working-area scoping: events with a
    /// location are delivered only to subscribers whose working area
    /// covers it, events without one go to every subscriber.
    #[must_use]
    pub fn location(&self) -> Option<Coordinates> {
        match &self.data {
            WalkEventData::HouseClaimed { location, .. }
            | WalkEventData::HouseReleased { location, .. }
            | WalkEventData::HouseExpired { location, .. }
            | WalkEventData::HouseCompleted { location, .. }
            | WalkEventData::CanvasserJoined { location, .. }
            | WalkEventData::CanvasserMoved { location, .. }
            | WalkEventData::SessionStarted { location, .. } => Some(*location),
            WalkEventData::CanvasserLeft { .. } | WalkEventData::SessionEnded { .. } => None,
        }
    }
}

/// Typed payload of a coordination event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WalkEventData {
    /// An address was claimed; it is unavailable until released,
    /// completed, or expired.
    #[serde(rename_all = "camelCase")]
    HouseClaimed {
        /// The granted claim.
        claim_id: ClaimId,
        /// The claimed address.
        address: String,
        /// Coordinates of the address.
        location: Coordinates,
        /// The canvasser holding the claim.
        canvasser_id: CanvasserId,
        /// Display name of the holder, for "claimed by X" UI.
        canvasser_name: String,
        /// When the lease lapses.
        expires_at: DateTime<Utc>,
    },
    /// A claim was given back; the address is claimable again.
    #[serde(rename_all = "camelCase")]
    HouseReleased {
        /// The released claim.
        claim_id: ClaimId,
        /// The address now available.
        address: String,
        /// Coordinates of the address.
        location: Coordinates,
    },
    /// A lease lapsed and was reclaimed by the expiry sweep; the
    /// address is claimable again. Release-equivalent for observers.
    #[serde(rename_all = "camelCase")]
    HouseExpired {
        /// The expired claim.
        claim_id: ClaimId,
        /// The address now available.
        address: String,
        /// Coordinates of the address.
        location: Coordinates,
    },
    /// A visit finished; the claim is resolved and the address leaves
    /// the active-claim set.
    #[serde(rename_all = "camelCase")]
    HouseCompleted {
        /// The completed claim.
        claim_id: ClaimId,
        /// The visited address.
        address: String,
        /// Coordinates of the address.
        location: Coordinates,
        /// The canvasser who completed the visit.
        canvasser_id: CanvasserId,
        /// Display name of the canvasser.
        canvasser_name: String,
    },
    /// A canvasser subscribed to the coordination bus.
    #[serde(rename_all = "camelCase")]
    CanvasserJoined {
        /// The joining canvasser.
        canvasser_id: CanvasserId,
        /// Display name.
        name: String,
        /// Where they joined from.
        location: Coordinates,
    },
    /// A canvasser unsubscribed or disconnected.
    #[serde(rename_all = "camelCase")]
    CanvasserLeft {
        /// The departing canvasser.
        canvasser_id: CanvasserId,
        /// Display name.
        name: String,
    },
    /// A canvasser reported a new location.
    #[serde(rename_all = "camelCase")]
    CanvasserMoved {
        /// The moving canvasser.
        canvasser_id: CanvasserId,
        /// Display name.
        name: String,
        /// The new location.
        location: Coordinates,
    },
    /// A walk session started.
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        /// The new session.
        session_id: SessionId,
        /// The canvasser walking it.
        canvasser_id: CanvasserId,
        /// Where the session started.
        location: Coordinates,
    },
    /// A walk session ended; all its outstanding claims were released
    /// as one batch, listed here so observers see a single consistent
    /// event instead of N individual releases.
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        /// The ended session.
        session_id: SessionId,
        /// The canvasser who walked it.
        canvasser_id: CanvasserId,
        /// Final count of houses visited.
        houses_visited: u32,
        /// Final count of voters contacted.
        voters_contacted: u32,
        /// Addresses freed by the batch release.
        released_addresses: Vec<String>,
    },
}
