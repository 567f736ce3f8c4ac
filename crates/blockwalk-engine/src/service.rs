//! The coordination service facade.
//!
//! [`WalkService`] wires the session tracker, claim store, address
//! catalog, geo index, and coordination bus into the operation surface
//! clients call. Every state-mutating operation follows the same
//! shape: mutate the authoritative store first, then record activity
//! and publish events from the committed result. Event publication is
//! best-effort; a failed announcement is logged and the operation
//! still succeeds.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use blockwalk_core::{CanvasserId, ClaimId, ConnectionId, Coordinates};

use crate::activity::{WalkActivity, WalkActivityType};
use crate::bus::{CoordinationBus, NearbyCanvasser, DEFAULT_WORKING_RADIUS_KM};
use crate::catalog::AddressCatalog;
use crate::claim::{HouseClaim, VisitOutcome, DEFAULT_CLAIM_TTL_MINUTES};
use crate::error::Result;
use crate::events::{WalkEvent, WalkEventData};
use crate::geoindex::{AvailableHouse, GeoIndex, DEFAULT_QUERY_LIMIT, DEFAULT_QUERY_RADIUS_KM};
use crate::metrics::{outcomes, WalkMetrics};
use crate::route::{self, OptimizedRoute, RouteTarget};
use crate::session::WalkSession;
use crate::store::{AddressClaimResult, ClaimOpResult, ClaimRequest, ClaimStore};
use crate::tracker::{EndOutcome, SessionTracker, StartOutcome};

/// The authenticated canvasser behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Externally issued canvasser identifier.
    pub id: CanvasserId,
    /// Display name shown to other canvassers.
    pub display_name: String,
}

impl Principal {
    /// Creates a principal.
    pub fn new(id: impl Into<CanvasserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Outcome of an operation that requires an Active session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand<T> {
    /// The operation ran against the caller's Active session.
    Ok(T),
    /// The caller has no Active session; nothing happened.
    NoActiveSession,
}

impl<T> SessionCommand<T> {
    /// Returns the inner value, if the command ran.
    pub fn into_ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::NoActiveSession => None,
        }
    }
}

/// A session with its outstanding claims, as returned to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// The session.
    pub session: WalkSession,
    /// Claims the session currently holds (Claimed or Visiting).
    pub active_claims: Vec<HouseClaim>,
}

/// The coordination engine's operation surface.
pub struct WalkService {
    tracker: Arc<SessionTracker>,
    claims: Arc<dyn ClaimStore>,
    catalog: Arc<dyn AddressCatalog>,
    index: GeoIndex,
    bus: Arc<CoordinationBus>,
    metrics: WalkMetrics,
}

impl WalkService {
    /// Wires the service from its collaborators.
    #[must_use]
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        catalog: Arc<dyn AddressCatalog>,
        bus: Arc<CoordinationBus>,
        metrics: WalkMetrics,
    ) -> Self {
        Self {
            tracker: Arc::new(SessionTracker::new(Arc::clone(&claims))),
            index: GeoIndex::new(Arc::clone(&catalog), Arc::clone(&claims)),
            claims,
            catalog,
            bus,
            metrics,
        }
    }

    /// Returns the session tracker, for callers that need direct log
    /// access.
    #[must_use]
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Starts a walk session, or returns the caller's existing Active
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal), fields(canvasser_id = %principal.id))]
    pub async fn start_session(
        &self,
        principal: &Principal,
        location: Coordinates,
    ) -> Result<StartOutcome> {
        let outcome = self
            .tracker
            .start_session(principal.id.clone(), location, Utc::now())?;

        if let StartOutcome::Started(session) = &outcome {
            self.announce(&WalkEvent::new(WalkEventData::SessionStarted {
                session_id: session.id,
                canvasser_id: principal.id.clone(),
                location,
            }));
            self.refresh_session_gauge();
        }
        Ok(outcome)
    }

    /// Ends the caller's Active session at their reported position,
    /// releasing every claim it still holds and announcing the batch
    /// as one event.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal), fields(canvasser_id = %principal.id))]
    pub async fn end_session(
        &self,
        principal: &Principal,
        location: Coordinates,
    ) -> Result<SessionCommand<WalkSession>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };

        let outcome = self
            .tracker
            .end_session(session.id, location, Utc::now())
            .await?;
        let ended = match outcome {
            EndOutcome::Ended(ended) => ended,
            EndOutcome::AlreadyEnded(_) => return Ok(SessionCommand::NoActiveSession),
        };

        self.announce(&WalkEvent::new(WalkEventData::SessionEnded {
            session_id: ended.session.id,
            canvasser_id: principal.id.clone(),
            houses_visited: ended.session.stats.houses_visited,
            voters_contacted: ended.session.stats.voters_contacted,
            released_addresses: ended.released.iter().map(|c| c.address.clone()).collect(),
        }));
        self.refresh_session_gauge();
        Ok(SessionCommand::Ok(ended.session))
    }

    /// Returns claimable houses near `center`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self))]
    pub async fn available_houses(
        &self,
        center: Coordinates,
        radius_km: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<AvailableHouse>> {
        self.index
            .query(
                center,
                radius_km.unwrap_or(DEFAULT_QUERY_RADIUS_KM),
                limit.unwrap_or(DEFAULT_QUERY_LIMIT),
            )
            .await
    }

    /// Orders the given addresses into a walking route from `start`.
    ///
    /// Addresses unknown to the catalog are skipped. Requires an
    /// Active session; the generated route is logged to it.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal, addresses), fields(canvasser_id = %principal.id))]
    pub async fn optimize_route(
        &self,
        principal: &Principal,
        start: Coordinates,
        addresses: Vec<String>,
    ) -> Result<SessionCommand<OptimizedRoute>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };

        let found = self.catalog.lookup(&addresses).await?;
        let targets = found
            .into_iter()
            .map(|a| RouteTarget {
                voter_count: a.voter_count(),
                address: a.line,
                location: a.location,
            })
            .collect();
        let route = route::optimize(start, targets);

        self.tracker.record_activity(
            WalkActivity::new(session.id, WalkActivityType::RouteGenerated, start, Utc::now())
                .with_data(serde_json::json!({
                    "stops": route.stops.len(),
                    "totalDistanceMeters": route.total_distance_meters,
                })),
        )?;
        Ok(SessionCommand::Ok(route))
    }

    /// Requests leases on a batch of addresses for the caller's Active
    /// session.
    ///
    /// Each address resolves independently: granted claims are
    /// announced to nearby canvassers, conflicts report who holds the
    /// address and until when. Addresses unknown to the catalog are
    /// omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure; no lease is granted on a
    /// failed path.
    #[instrument(skip(self, principal, addresses), fields(canvasser_id = %principal.id))]
    pub async fn claim_houses(
        &self,
        principal: &Principal,
        addresses: Vec<String>,
        ttl_minutes: Option<u32>,
    ) -> Result<SessionCommand<Vec<AddressClaimResult>>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };

        let found = self.catalog.lookup(&addresses).await?;
        let requests: Vec<ClaimRequest> = found
            .into_iter()
            .map(|a| ClaimRequest {
                address: a.line,
                location: a.location,
            })
            .collect();

        let ttl = Duration::minutes(i64::from(
            ttl_minutes.unwrap_or(DEFAULT_CLAIM_TTL_MINUTES),
        ));
        let results = self
            .claims
            .claim(session.id, &principal.id, requests, ttl)
            .await?;

        for result in &results {
            match result.outcome.granted() {
                Some(claim) => {
                    self.metrics.record_claim(outcomes::GRANTED);
                    self.tracker.record_activity(
                        WalkActivity::new(
                            session.id,
                            WalkActivityType::HouseClaimed,
                            claim.location,
                            Utc::now(),
                        )
                        .with_claim(claim.id),
                    )?;
                    self.announce(&WalkEvent::new(WalkEventData::HouseClaimed {
                        claim_id: claim.id,
                        address: claim.address.clone(),
                        location: claim.location,
                        canvasser_id: principal.id.clone(),
                        canvasser_name: principal.display_name.clone(),
                        expires_at: claim.expires_at,
                    }));
                }
                None => self.metrics.record_claim(outcomes::CONFLICT),
            }
        }
        Ok(SessionCommand::Ok(results))
    }

    /// Marks arrival at a claimed house, logging the caller-reported
    /// position.
    ///
    /// Idempotent: arriving at a house the session is already visiting
    /// succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal), fields(canvasser_id = %principal.id, claim_id = %claim_id))]
    pub async fn arrive(
        &self,
        principal: &Principal,
        claim_id: ClaimId,
        location: Coordinates,
    ) -> Result<SessionCommand<ClaimOpResult>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };

        let result = self.claims.arrive(claim_id, session.id).await?;
        self.metrics.record_claim_op("arrive", op_label(&result));

        if let ClaimOpResult::Applied(claim) = &result {
            self.tracker.record_activity(
                WalkActivity::new(
                    session.id,
                    WalkActivityType::ArrivedAtHouse,
                    location,
                    Utc::now(),
                )
                .with_claim(claim.id),
            )?;
        }
        Ok(SessionCommand::Ok(result))
    }

    /// Completes a visit at the caller-reported position, recording
    /// its results against the session.
    ///
    /// On a fresh completion the session counters are updated and the
    /// completion is announced; an idempotent retry does neither.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal, outcome), fields(canvasser_id = %principal.id, claim_id = %claim_id))]
    pub async fn complete_visit(
        &self,
        principal: &Principal,
        claim_id: ClaimId,
        location: Coordinates,
        outcome: VisitOutcome,
    ) -> Result<SessionCommand<ClaimOpResult>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };

        let result = self
            .claims
            .complete(claim_id, session.id, outcome.clone())
            .await?;
        self.metrics.record_claim_op("complete", op_label(&result));

        if let ClaimOpResult::Applied(claim) = &result {
            self.tracker
                .record_visit(session.id, claim, &outcome, location, Utc::now())?;
            self.announce(&WalkEvent::new(WalkEventData::HouseCompleted {
                claim_id: claim.id,
                address: claim.address.clone(),
                location: claim.location,
                canvasser_id: principal.id.clone(),
                canvasser_name: principal.display_name.clone(),
            }));
        }
        Ok(SessionCommand::Ok(result))
    }

    /// Gives a claim back, making the address available again.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal), fields(canvasser_id = %principal.id, claim_id = %claim_id))]
    pub async fn release(
        &self,
        principal: &Principal,
        claim_id: ClaimId,
    ) -> Result<SessionCommand<ClaimOpResult>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };

        let result = self.claims.release(claim_id, session.id).await?;
        self.metrics.record_claim_op("release", op_label(&result));

        if let ClaimOpResult::Applied(claim) = &result {
            self.tracker.record_activity(
                WalkActivity::new(
                    session.id,
                    WalkActivityType::HouseReleased,
                    claim.location,
                    Utc::now(),
                )
                .with_claim(claim.id),
            )?;
            self.announce(&WalkEvent::new(WalkEventData::HouseReleased {
                claim_id: claim.id,
                address: claim.address.clone(),
                location: claim.location,
            }));
        }
        Ok(SessionCommand::Ok(result))
    }

    /// Records voters contacted outside the arrive/complete flow.
    ///
    /// `contact_ids` reference records owned by the external
    /// contact-recording subsystem; only the references are logged.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal, contact_ids), fields(canvasser_id = %principal.id))]
    pub async fn record_contacts(
        &self,
        principal: &Principal,
        location: Coordinates,
        voters_contacted: u32,
        contact_ids: &[String],
    ) -> Result<SessionCommand<WalkSession>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(SessionCommand::NoActiveSession);
        };
        let updated = self.tracker.record_contacts(
            session.id,
            location,
            voters_contacted,
            contact_ids,
            Utc::now(),
        )?;
        Ok(SessionCommand::Ok(updated))
    }

    /// Returns the caller's Active session with its outstanding
    /// claims.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal), fields(canvasser_id = %principal.id))]
    pub async fn current_session(&self, principal: &Principal) -> Result<Option<SessionSnapshot>> {
        let Some(session) = self.tracker.current_session(&principal.id)? else {
            return Ok(None);
        };
        let active_claims = self.claims.active_claims_for_session(session.id).await?;
        Ok(Some(SessionSnapshot {
            session,
            active_claims,
        }))
    }

    /// Subscribes the caller to coordination events around `location`.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, principal), fields(canvasser_id = %principal.id))]
    pub fn join_area(
        &self,
        principal: &Principal,
        location: Coordinates,
        radius_km: Option<f64>,
    ) -> Result<(ConnectionId, mpsc::Receiver<WalkEvent>)> {
        let joined = self.bus.join(
            principal.id.clone(),
            principal.display_name.clone(),
            location,
            radius_km.unwrap_or(DEFAULT_WORKING_RADIUS_KM),
        )?;
        self.metrics.set_bus_subscribers(self.bus.subscriber_count()?);
        Ok(joined)
    }

    /// Reports a new location for a live connection.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self))]
    pub fn update_location(
        &self,
        connection_id: ConnectionId,
        location: Coordinates,
    ) -> Result<()> {
        self.bus.update_location(connection_id, location)
    }

    /// Handles a dropped connection: unsubscribes it and force-
    /// releases every claim the canvasser's session holds, announcing
    /// each freed address. The session itself stays Active so the
    /// canvasser can resume on reconnect.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self))]
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        let Some(canvasser_id) = self.bus.leave(connection_id)? else {
            return Ok(());
        };
        self.metrics.set_bus_subscribers(self.bus.subscriber_count()?);

        let Some(session) = self.tracker.current_session(&canvasser_id)? else {
            return Ok(());
        };
        let released = self.claims.release_all_for_session(session.id).await?;
        for claim in &released {
            self.announce(&WalkEvent::new(WalkEventData::HouseReleased {
                claim_id: claim.id,
                address: claim.address.clone(),
                location: claim.location,
            }));
        }
        if !released.is_empty() {
            warn!(
                canvasser_id = %canvasser_id,
                released = released.len(),
                "disconnect released outstanding claims"
            );
        }
        Ok(())
    }

    /// Returns subscribed canvassers near `center`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self))]
    pub fn active_canvassers(
        &self,
        center: Coordinates,
        radius_km: Option<f64>,
    ) -> Result<Vec<NearbyCanvasser>> {
        self.bus
            .active_canvassers(center, radius_km.unwrap_or(DEFAULT_WORKING_RADIUS_KM))
    }

    /// Publishes best-effort; a failed announcement never fails the
    /// operation that produced it.
    fn announce(&self, event: &WalkEvent) {
        match self.bus.publish(event) {
            Ok(delivered) => self.metrics.record_events_delivered(delivered),
            Err(err) => warn!(event_id = %event.id, error = %err, "failed to publish event"),
        }
    }

    fn refresh_session_gauge(&self) {
        match self.tracker.active_sessions() {
            Ok(sessions) => self.metrics.set_active_sessions(sessions.len()),
            Err(err) => warn!(error = %err, "failed to read active sessions"),
        }
    }
}

/// Maps an operation result to its metrics label.
fn op_label(result: &ClaimOpResult) -> &'static str {
    match result {
        ClaimOpResult::Applied(_) => outcomes::APPLIED,
        ClaimOpResult::NoOp(_) => outcomes::NOOP,
        ClaimOpResult::NotFound => outcomes::NOT_FOUND,
        ClaimOpResult::Forbidden { .. } => outcomes::FORBIDDEN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Address, InMemoryAddressCatalog, ResidentVoter};
    use crate::store::memory::InMemoryClaimStore;
    use crate::store::ClaimOutcome;

    fn here() -> Coordinates {
        Coordinates::new(33.4054, -86.8114).unwrap()
    }

    fn service_with_street() -> WalkService {
        let catalog = Arc::new(InMemoryAddressCatalog::new());
        catalog
            .insert_all([
                address("100 Main St", 33.4054, -86.8114),
                address("102 Main St", 33.4058, -86.8114),
                address("104 Main St", 33.4062, -86.8114),
            ])
            .unwrap();
        WalkService::new(
            Arc::new(InMemoryClaimStore::new()),
            catalog,
            Arc::new(CoordinationBus::new()),
            WalkMetrics::new(),
        )
    }

    fn address(line: &str, lat: f64, lon: f64) -> Address {
        Address {
            line: line.into(),
            location: Coordinates::new(lat, lon).unwrap(),
            voters: vec![ResidentVoter {
                voter_id: format!("v-{line}"),
                name: "Resident".into(),
            }],
        }
    }

    fn ada() -> Principal {
        Principal::new("vol-ada", "Ada")
    }

    fn grace() -> Principal {
        Principal::new("vol-grace", "Grace")
    }

    async fn start(service: &WalkService, who: &Principal) {
        service.start_session(who, here()).await.unwrap();
    }

    async fn claim_one(service: &WalkService, who: &Principal, addr: &str) -> HouseClaim {
        let results = service
            .claim_houses(who, vec![addr.to_string()], None)
            .await
            .unwrap()
            .into_ok()
            .unwrap();
        results[0].outcome.granted().unwrap().clone()
    }

    #[tokio::test]
    async fn operations_require_an_active_session() -> Result<()> {
        let service = service_with_street();
        let result = service
            .claim_houses(&ada(), vec!["100 Main St".into()], None)
            .await?;
        assert_eq!(result, SessionCommand::NoActiveSession);
        Ok(())
    }

    #[tokio::test]
    async fn claimed_house_disappears_from_availability() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;

        assert_eq!(service.available_houses(here(), None, None).await?.len(), 3);
        claim_one(&service, &ada(), "102 Main St").await;

        let available = service.available_houses(here(), None, None).await?;
        let addresses: Vec<&str> = available.iter().map(|h| h.address.as_str()).collect();
        assert_eq!(addresses, vec!["100 Main St", "104 Main St"]);
        Ok(())
    }

    #[tokio::test]
    async fn conflicting_claim_names_the_holder() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        start(&service, &grace()).await;
        claim_one(&service, &ada(), "100 Main St").await;

        let results = service
            .claim_houses(&grace(), vec!["100 Main St".into()], None)
            .await?
            .into_ok()
            .unwrap();
        let ClaimOutcome::Conflict(conflict) = &results[0].outcome else {
            panic!("expected a conflict");
        };
        assert_eq!(conflict.holder_canvasser, ada().id);
        Ok(())
    }

    #[tokio::test]
    async fn release_then_reclaim_by_another_session() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        start(&service, &grace()).await;

        let claim = claim_one(&service, &ada(), "100 Main St").await;
        let released = service.release(&ada(), claim.id).await?.into_ok().unwrap();
        assert!(matches!(released, ClaimOpResult::Applied(_)));

        let retry = claim_one(&service, &grace(), "100 Main St").await;
        assert_ne!(retry.id, claim.id);
        Ok(())
    }

    #[tokio::test]
    async fn full_visit_updates_session_counters() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        let claim = claim_one(&service, &ada(), "100 Main St").await;

        service.arrive(&ada(), claim.id, here()).await?;
        let outcome = VisitOutcome {
            voters_contacted: 2,
            voters_home: 1,
            contact_ids: vec![],
        };
        let result = service
            .complete_visit(&ada(), claim.id, here(), outcome)
            .await?
            .into_ok()
            .unwrap();
        assert!(matches!(result, ClaimOpResult::Applied(_)));

        let snapshot = service.current_session(&ada()).await?.unwrap();
        assert_eq!(snapshot.session.stats.houses_visited, 1);
        assert_eq!(snapshot.session.stats.voters_contacted, 2);
        assert!(snapshot.active_claims.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn arrival_logs_the_reported_position() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        let claim = claim_one(&service, &ada(), "104 Main St").await;

        // Reported from the curb, not the house's catalog point.
        let curb = Coordinates::new(33.4063, -86.8116).unwrap();
        service.arrive(&ada(), claim.id, curb).await?;

        let session = service.current_session(&ada()).await?.unwrap().session;
        let log = service.tracker().activities(session.id)?;
        let arrived = log
            .iter()
            .find(|a| a.activity_type == WalkActivityType::ArrivedAtHouse)
            .unwrap();
        assert_eq!(arrived.location, curb);
        assert_ne!(arrived.location, claim.location);
        Ok(())
    }

    #[tokio::test]
    async fn completing_twice_counts_once() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        let claim = claim_one(&service, &ada(), "100 Main St").await;
        service.arrive(&ada(), claim.id, here()).await?;

        let outcome = VisitOutcome {
            voters_contacted: 2,
            voters_home: 1,
            contact_ids: vec![],
        };
        service
            .complete_visit(&ada(), claim.id, here(), outcome.clone())
            .await?;
        let retry = service
            .complete_visit(&ada(), claim.id, here(), outcome)
            .await?
            .into_ok()
            .unwrap();
        assert!(matches!(retry, ClaimOpResult::NoOp(_)));

        let snapshot = service.current_session(&ada()).await?.unwrap();
        assert_eq!(snapshot.session.stats.houses_visited, 1);
        Ok(())
    }

    #[tokio::test]
    async fn ending_a_session_releases_and_frees_houses() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        claim_one(&service, &ada(), "100 Main St").await;
        claim_one(&service, &ada(), "102 Main St").await;

        let ended = service.end_session(&ada(), here()).await?.into_ok().unwrap();
        assert!(!ended.is_active());

        assert_eq!(service.available_houses(here(), None, None).await?.len(), 3);
        assert!(service.current_session(&ada()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn disconnect_frees_claims_but_keeps_the_session() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        let (connection, _rx) = service.join_area(&ada(), here(), None)?;
        claim_one(&service, &ada(), "100 Main St").await;

        service.handle_disconnect(connection).await?;

        assert_eq!(service.available_houses(here(), None, None).await?.len(), 3);
        let snapshot = service.current_session(&ada()).await?.unwrap();
        assert!(snapshot.session.is_active());
        assert!(snapshot.active_claims.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn claim_announcement_reaches_nearby_subscribers() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;
        start(&service, &grace()).await;
        let (_connection, mut rx) = service.join_area(&grace(), here(), None)?;

        claim_one(&service, &ada(), "100 Main St").await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.data,
            WalkEventData::HouseClaimed { ref canvasser_name, .. } if canvasser_name == "Ada"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn route_skips_unknown_addresses() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;

        let route = service
            .optimize_route(
                &ada(),
                here(),
                vec![
                    "104 Main St".into(),
                    "999 Nowhere Ln".into(),
                    "100 Main St".into(),
                ],
            )
            .await?
            .into_ok()
            .unwrap();
        assert_eq!(route.stops.len(), 2);
        assert_eq!(route.stops[0].address, "100 Main St");
        Ok(())
    }

    #[tokio::test]
    async fn contacts_outside_a_visit_still_count() -> Result<()> {
        let service = service_with_street();
        start(&service, &ada()).await;

        let updated = service
            .record_contacts(&ada(), here(), 3, &["c-1".into()])
            .await?
            .into_ok()
            .unwrap();
        assert_eq!(updated.stats.voters_contacted, 3);
        assert_eq!(updated.stats.houses_visited, 0);
        Ok(())
    }
}
