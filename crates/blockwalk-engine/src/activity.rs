//! Append-only walk activity log.
//!
//! Every notable moment in a session - start, arrivals, departures,
//! releases, contacts, end - is recorded as a [`WalkActivity`] with a
//! timestamp and coordinates. Entries are never mutated after insert
//! and never deleted while their session exists; they exist for audit
//! and timeline reconstruction, not for recomputing counters (those
//! are folded incrementally by the tracker).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blockwalk_core::{ActivityId, ClaimId, Coordinates, SessionId};

/// The kind of activity being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalkActivityType {
    /// The session started.
    SessionStarted,
    /// A route was generated for the session.
    RouteGenerated,
    /// Houses were claimed.
    HouseClaimed,
    /// A claim was given back.
    HouseReleased,
    /// The canvasser arrived at a claimed house.
    ArrivedAtHouse,
    /// The canvasser finished a visit and departed.
    DepartedHouse,
    /// Voters were contacted outside the arrive/complete flow.
    ContactMade,
    /// The session ended.
    SessionEnded,
}

impl WalkActivityType {
    /// Whether entries of this type locate the canvasser themselves.
    /// Claim bookkeeping entries carry the referenced house's
    /// coordinates instead.
    #[must_use]
    pub const fn reports_position(self) -> bool {
        !matches!(self, Self::HouseClaimed | Self::HouseReleased)
    }
}

/// One immutable entry in a session's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkActivity {
    /// Unique activity identifier.
    pub id: ActivityId,
    /// The session this entry belongs to.
    pub session_id: SessionId,
    /// What happened.
    pub activity_type: WalkActivityType,
    /// Where it happened.
    pub location: Coordinates,
    /// The claim involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<ClaimId>,
    /// Free-form payload with activity-specific detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl WalkActivity {
    /// Creates a new activity entry.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        activity_type: WalkActivityType,
        location: Coordinates,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            session_id,
            activity_type,
            location,
            claim_id: None,
            data: None,
            timestamp,
        }
    }

    /// Attaches the claim this activity refers to.
    #[must_use]
    pub fn with_claim(mut self, claim_id: ClaimId) -> Self {
        self.claim_id = Some(claim_id);
        self
    }

    /// Attaches a free-form payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_attaches_claim_and_data() {
        let session_id = SessionId::generate();
        let claim_id = ClaimId::generate();
        let location = Coordinates::new(33.4, -86.8).unwrap();

        let activity = WalkActivity::new(
            session_id,
            WalkActivityType::DepartedHouse,
            location,
            Utc::now(),
        )
        .with_claim(claim_id)
        .with_data(json!({ "votersContacted": 2, "votersHome": 1 }));

        assert_eq!(activity.session_id, session_id);
        assert_eq!(activity.claim_id, Some(claim_id));
        assert_eq!(activity.data.unwrap()["votersContacted"], 2);
    }

    #[test]
    fn serializes_camel_case_and_skips_empty_fields() {
        let activity = WalkActivity::new(
            SessionId::generate(),
            WalkActivityType::SessionStarted,
            Coordinates::new(33.4, -86.8).unwrap(),
            Utc::now(),
        );
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["activityType"], "sessionStarted");
        assert!(json.get("claimId").is_none());
        assert!(json.get("data").is_none());
    }
}
