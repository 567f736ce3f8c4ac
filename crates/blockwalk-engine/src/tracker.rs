//! Session tracking and the activity log.
//!
//! [`SessionTracker`] owns the session table and each session's
//! append-only activity log. It enforces the one-Active-session-per-
//! canvasser rule and folds statistics (visits, contacts, distance)
//! into the session incrementally as activity is recorded, so reading
//! a session never scans its log.
//!
//! Ending a session cascades: the session is marked Completed first,
//! then every outstanding claim it holds is released through the claim
//! store as one batch. The session mutation and the cascade are two
//! steps; a crash between them leaves claims to the expiry sweep.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use blockwalk_core::{haversine_meters, CanvasserId, Coordinates, SessionId};

use crate::activity::{WalkActivity, WalkActivityType};
use crate::claim::{HouseClaim, VisitOutcome};
use crate::error::{Error, Result};
use crate::session::WalkSession;
use crate::store::ClaimStore;

/// Outcome of a start-session request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// A new session was started.
    Started(WalkSession),
    /// The canvasser already has an Active session; it is returned
    /// unchanged and no new session was created.
    AlreadyActive(WalkSession),
}

impl StartOutcome {
    /// Returns the session, whether new or pre-existing.
    #[must_use]
    pub const fn session(&self) -> &WalkSession {
        match self {
            Self::Started(session) | Self::AlreadyActive(session) => session,
        }
    }
}

/// A session that was just ended, with the claims freed by the
/// cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct EndedSession {
    /// The session in its final Completed state.
    pub session: WalkSession,
    /// Claims released by the end-of-session cascade.
    pub released: Vec<HouseClaim>,
}

/// Outcome of an end-session request.
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    /// The session was ended and its claims released.
    Ended(EndedSession),
    /// The session was already Completed (client retry); nothing
    /// changed.
    AlreadyEnded(WalkSession),
}

#[derive(Default)]
struct TrackerState {
    sessions: HashMap<SessionId, WalkSession>,
    active_by_canvasser: HashMap<CanvasserId, SessionId>,
    activities: HashMap<SessionId, Vec<WalkActivity>>,
    last_location: HashMap<SessionId, Coordinates>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("session tracker lock poisoned")
}

/// Tracks walk sessions and their activity logs.
pub struct SessionTracker {
    state: RwLock<TrackerState>,
    claims: Arc<dyn ClaimStore>,
}

impl SessionTracker {
    /// Creates a tracker over the given claim store.
    #[must_use]
    pub fn new(claims: Arc<dyn ClaimStore>) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            claims,
        }
    }

    /// Starts a session for a canvasser, or returns their existing
    /// Active session.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn start_session(
        &self,
        canvasser_id: CanvasserId,
        location: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome> {
        let mut state = self.state.write().map_err(poison_err)?;

        if let Some(existing_id) = state.active_by_canvasser.get(&canvasser_id) {
            if let Some(existing) = state.sessions.get(existing_id) {
                return Ok(StartOutcome::AlreadyActive(existing.clone()));
            }
        }

        let session = WalkSession::new(canvasser_id.clone(), location, now);
        let session_id = session.id;
        state.active_by_canvasser.insert(canvasser_id, session_id);
        state.sessions.insert(session_id, session.clone());
        state.last_location.insert(session_id, location);
        state.activities.insert(
            session_id,
            vec![WalkActivity::new(
                session_id,
                WalkActivityType::SessionStarted,
                location,
                now,
            )],
        );
        drop(state);

        info!(session_id = %session_id, "walk session started");
        Ok(StartOutcome::Started(session))
    }

    /// Ends a session at the caller-reported position and releases
    /// every claim it still holds. The final leg to `location` is
    /// folded into the walked distance before the stats freeze.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session, or an
    /// error on storage failure.
    pub async fn end_session(
        &self,
        session_id: SessionId,
        location: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<EndOutcome> {
        // Mark the session Completed under the lock, then run the
        // claim cascade without holding it. The std lock must never be
        // held across an await.
        let session = {
            let mut state = self.state.write().map_err(poison_err)?;
            let current = state
                .sessions
                .get(&session_id)
                .ok_or(Error::SessionNotFound { session_id })?;
            if !current.is_active() {
                return Ok(EndOutcome::AlreadyEnded(current.clone()));
            }
            Self::track_movement(&mut state, session_id, location);
            let session = state
                .sessions
                .get_mut(&session_id)
                .ok_or(Error::SessionNotFound { session_id })?;
            session.end(now);
            let snapshot = session.clone();
            state.active_by_canvasser.remove(&snapshot.canvasser_id);
            snapshot
        };

        let released = self.claims.release_all_for_session(session_id).await?;

        {
            let mut state = self.state.write().map_err(poison_err)?;
            state.activities.entry(session_id).or_default().push(
                WalkActivity::new(session_id, WalkActivityType::SessionEnded, location, now)
                    .with_data(json!({
                        "housesVisited": session.stats.houses_visited,
                        "votersContacted": session.stats.voters_contacted,
                        "releasedClaims": released.len(),
                    })),
            );
        }

        info!(
            session_id = %session_id,
            released = released.len(),
            "walk session ended"
        );
        Ok(EndOutcome::Ended(EndedSession { session, released }))
    }

    /// Records a completed visit at the caller-reported position:
    /// increments the visit counters and appends a departure entry,
    /// atomically with respect to other readers of the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session.
    pub fn record_visit(
        &self,
        session_id: SessionId,
        claim: &HouseClaim,
        outcome: &VisitOutcome,
        location: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<WalkSession> {
        let mut state = self.state.write().map_err(poison_err)?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(Error::SessionNotFound { session_id })?;
        session.stats.houses_visited += 1;
        session.stats.voters_contacted += outcome.voters_contacted;

        Self::track_movement(&mut state, session_id, location);
        let snapshot = state.sessions[&session_id].clone();
        state.activities.entry(session_id).or_default().push(
            WalkActivity::new(session_id, WalkActivityType::DepartedHouse, location, now)
                .with_claim(claim.id)
                .with_data(json!({
                    "address": claim.address,
                    "votersContacted": outcome.voters_contacted,
                    "votersHome": outcome.voters_home,
                })),
        );
        drop(state);
        Ok(snapshot)
    }

    /// Records voters contacted outside the arrive/complete flow
    /// (for example a sidewalk conversation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session.
    pub fn record_contacts(
        &self,
        session_id: SessionId,
        location: Coordinates,
        voters_contacted: u32,
        contact_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<WalkSession> {
        let mut state = self.state.write().map_err(poison_err)?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(Error::SessionNotFound { session_id })?;
        session.stats.voters_contacted += voters_contacted;

        Self::track_movement(&mut state, session_id, location);
        let snapshot = state.sessions[&session_id].clone();
        state.activities.entry(session_id).or_default().push(
            WalkActivity::new(session_id, WalkActivityType::ContactMade, location, now)
                .with_data(json!({
                    "votersContacted": voters_contacted,
                    "contactIds": contact_ids,
                })),
        );
        drop(state);
        Ok(snapshot)
    }

    /// Appends an activity entry. Entries that locate the canvasser
    /// fold their movement into the session's walked distance; claim
    /// bookkeeping entries carry house coordinates and do not move the
    /// track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session.
    pub fn record_activity(&self, activity: WalkActivity) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let session_id = activity.session_id;
        if !state.sessions.contains_key(&session_id) {
            return Err(Error::SessionNotFound { session_id });
        }
        if activity.activity_type.reports_position() {
            Self::track_movement(&mut state, session_id, activity.location);
        }
        state.activities.entry(session_id).or_default().push(activity);
        drop(state);
        Ok(())
    }

    /// Adds the leg from the session's last known location to
    /// `location` into its walked distance.
    fn track_movement(state: &mut TrackerState, session_id: SessionId, location: Coordinates) {
        if let Some(previous) = state.last_location.insert(session_id, location) {
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.stats.total_distance_meters += haversine_meters(previous, location);
            }
        }
    }

    /// Returns a canvasser's Active session, if they have one.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn current_session(&self, canvasser_id: &CanvasserId) -> Result<Option<WalkSession>> {
        let state = self.state.read().map_err(poison_err)?;
        let session = state
            .active_by_canvasser
            .get(canvasser_id)
            .and_then(|id| state.sessions.get(id))
            .cloned();
        drop(state);
        Ok(session)
    }

    /// Looks up a session by ID, Active or Completed.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn get_session(&self, session_id: SessionId) -> Result<Option<WalkSession>> {
        let state = self.state.read().map_err(poison_err)?;
        let session = state.sessions.get(&session_id).cloned();
        drop(state);
        Ok(session)
    }

    /// Returns every Active session.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn active_sessions(&self) -> Result<Vec<WalkSession>> {
        let state = self.state.read().map_err(poison_err)?;
        let sessions = state
            .sessions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        drop(state);
        Ok(sessions)
    }

    /// Returns a session's activity log in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn activities(&self, session_id: SessionId) -> Result<Vec<WalkActivity>> {
        let state = self.state.read().map_err(poison_err)?;
        let entries = state.activities.get(&session_id).cloned().unwrap_or_default();
        drop(state);
        Ok(entries)
    }
}
