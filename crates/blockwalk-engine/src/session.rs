//! Walk sessions and their running statistics.
//!
//! A [`WalkSession`] is one canvasser's continuous period of
//! door-to-door work. The tracker enforces that at most one session
//! per canvasser is Active; this module only defines the entity and
//! its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blockwalk_core::{CanvasserId, Coordinates, SessionId};

/// Status of a walk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// The canvasser is out walking (or was, and never explicitly
    /// ended the session - a disconnect leaves the session Active).
    Active,
    /// Explicitly ended. Terminal.
    Completed,
}

/// Counters aggregated incrementally as activity is recorded.
///
/// Counters are folded in at write time, never recomputed by scanning
/// the activity log, so reading the current session stays cheap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Houses with a completed visit.
    pub houses_visited: u32,
    /// Voters spoken with across all visits.
    pub voters_contacted: u32,
    /// Distance walked, summed over successive reported locations.
    pub total_distance_meters: f64,
    /// Whole minutes between start and end; zero until ended.
    pub duration_minutes: i64,
}

/// One canvasser's walk session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// The canvasser walking this session.
    pub canvasser_id: CanvasserId,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: SessionStatus,
    /// Where the canvasser started.
    pub start_location: Coordinates,
    /// Running statistics.
    pub stats: SessionStats,
}

impl WalkSession {
    /// Creates a new Active session starting at the given location.
    #[must_use]
    pub fn new(canvasser_id: CanvasserId, start_location: Coordinates, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            canvasser_id,
            started_at: now,
            ended_at: None,
            status: SessionStatus::Active,
            start_location,
            stats: SessionStats::default(),
        }
    }

    /// Returns true if the session is Active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }

    /// Transitions the session to Completed and finalizes its
    /// duration. Returns false if the session was already Completed.
    pub fn end(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.ended_at = Some(now);
        self.stats.duration_minutes = (now - self.started_at).num_minutes();
        true
    }
}
