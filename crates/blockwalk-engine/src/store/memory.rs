//! In-memory claim store.
//!
//! This module provides [`InMemoryClaimStore`], the reference
//! implementation of the [`ClaimStore`] trait, suitable for tests and
//! single-node deployments.
//!
//! ## Mutual exclusion
//!
//! An index of active claims keyed by normalized address makes the
//! grant a conditional insert: the index entry either exists (conflict
//! or lapsed-lease takeover) or is inserted together with the new
//! claim, all under one short critical section that performs no I/O.
//!
//! ## Limitations
//!
//! - **Single-process only**: Claims are not visible across process
//!   boundaries.
//! - **No persistence**: All state is lost when the process exits.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use blockwalk_core::{CanvasserId, ClaimId, SessionId};

use super::{
    address_key, AddressClaimResult, ClaimConflict, ClaimOpResult, ClaimOutcome, ClaimRequest,
    ClaimStore, ExpireResult,
};
use crate::claim::{ClaimTransition, HouseClaim, StatusChange, VisitOutcome};
use crate::error::{Error, Result};

/// Internal store state protected by a single lock.
#[derive(Debug, Default)]
struct StoreState {
    /// Every claim ever granted, by ID.
    claims: HashMap<ClaimId, HouseClaim>,
    /// The at-most-one active claim per address, by normalized address.
    active_by_address: HashMap<String, ClaimId>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("claim store lock poisoned")
}

/// In-memory claim store.
///
/// Thread-safe via `RwLock`; reads (sweep scans, geo-index joins)
/// never block each other.
#[derive(Debug, Default)]
pub struct InMemoryClaimStore {
    state: RwLock<StoreState>,
}

impl InMemoryClaimStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of claims ever granted (all statuses).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.claims.len())
    }

    /// Returns true if no claims have been granted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Applies an owner-checked transition to one claim.
    ///
    /// Shared by `arrive`, `complete`, and `release`: look up, check
    /// ownership, check the claim is still operable, then let the
    /// claim's own state machine decide.
    fn apply_owned(
        &self,
        claim_id: ClaimId,
        session_id: SessionId,
        transition: ClaimTransition,
    ) -> Result<ClaimOpResult> {
        let mut state = self.state.write().map_err(poison_err)?;
        let now = Utc::now();

        let Some(claim) = state.claims.get_mut(&claim_id) else {
            drop(state);
            return Ok(ClaimOpResult::NotFound);
        };

        if claim.session_id != session_id {
            let owner = claim.session_id;
            drop(state);
            return Ok(ClaimOpResult::Forbidden { owner });
        }

        let result = match claim.apply(transition, now) {
            StatusChange::Applied => {
                let updated = claim.clone();
                if updated.status.is_terminal() {
                    state.active_by_address.remove(&address_key(&updated.address));
                }
                ClaimOpResult::Applied(updated)
            }
            StatusChange::NoOp => ClaimOpResult::NoOp(claim.clone()),
            // Expired/Released/Visited claims are no longer operable by
            // their former owner; an expiry race resolves to NotFound
            // and the client must re-claim. An out-of-order request
            // (complete before arrive) lands here too.
            StatusChange::Invalid { .. } => ClaimOpResult::NotFound,
        };
        drop(state);
        Ok(result)
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn claim(
        &self,
        session_id: SessionId,
        canvasser_id: &CanvasserId,
        requests: Vec<ClaimRequest>,
        ttl: Duration,
    ) -> Result<Vec<AddressClaimResult>> {
        let mut state = self.state.write().map_err(poison_err)?;
        let now = Utc::now();
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let key = address_key(&request.address);

            // Conditional insert: the holder check and the insert are
            // indivisible under the write lock.
            if let Some(&holder_id) = state.active_by_address.get(&key) {
                let holder = state
                    .claims
                    .get(&holder_id)
                    .ok_or_else(|| Error::storage("active index points at missing claim"))?;

                if holder.excludes_at(now) {
                    results.push(AddressClaimResult {
                        address: request.address,
                        outcome: ClaimOutcome::Conflict(ClaimConflict {
                            holder_session: holder.session_id,
                            holder_canvasser: holder.canvasser_id.clone(),
                            expires_at: holder.expires_at,
                        }),
                    });
                    continue;
                }

                // Lapsed lease: expire it as part of the takeover so the
                // old holder sees NotFound rather than a claim that
                // silently changed hands.
                if let Some(lapsed) = state.claims.get_mut(&holder_id) {
                    lapsed.apply(ClaimTransition::Expire, now);
                }
                state.active_by_address.remove(&key);
            }

            let claim = HouseClaim::new(
                session_id,
                canvasser_id.clone(),
                request.address.clone(),
                request.location,
                ttl,
                now,
            );
            state.active_by_address.insert(key, claim.id);
            state.claims.insert(claim.id, claim.clone());
            results.push(AddressClaimResult {
                address: request.address,
                outcome: ClaimOutcome::Granted(claim),
            });
        }
        drop(state);
        Ok(results)
    }

    async fn arrive(&self, claim_id: ClaimId, session_id: SessionId) -> Result<ClaimOpResult> {
        self.apply_owned(claim_id, session_id, ClaimTransition::Arrive)
    }

    async fn complete(
        &self,
        claim_id: ClaimId,
        session_id: SessionId,
        outcome: VisitOutcome,
    ) -> Result<ClaimOpResult> {
        self.apply_owned(claim_id, session_id, ClaimTransition::Complete(outcome))
    }

    async fn release(&self, claim_id: ClaimId, session_id: SessionId) -> Result<ClaimOpResult> {
        self.apply_owned(claim_id, session_id, ClaimTransition::Release)
    }

    async fn expire(&self, claim_id: ClaimId) -> Result<ExpireResult> {
        let mut state = self.state.write().map_err(poison_err)?;
        let now = Utc::now();

        let Some(claim) = state.claims.get_mut(&claim_id) else {
            drop(state);
            return Ok(ExpireResult::AlreadyResolved);
        };

        let result = match claim.apply(ClaimTransition::Expire, now) {
            StatusChange::Applied => {
                let expired = claim.clone();
                state.active_by_address.remove(&address_key(&expired.address));
                ExpireResult::Expired(expired)
            }
            StatusChange::NoOp | StatusChange::Invalid { .. } => ExpireResult::AlreadyResolved,
        };
        drop(state);
        Ok(result)
    }

    async fn release_all_for_session(&self, session_id: SessionId) -> Result<Vec<HouseClaim>> {
        let mut state = self.state.write().map_err(poison_err)?;
        let now = Utc::now();

        let owned: Vec<ClaimId> = state
            .claims
            .values()
            .filter(|c| c.session_id == session_id && c.status.is_active())
            .map(|c| c.id)
            .collect();

        let mut released = Vec::with_capacity(owned.len());
        for claim_id in owned {
            if let Some(claim) = state.claims.get_mut(&claim_id) {
                if claim.apply(ClaimTransition::Release, now) == StatusChange::Applied {
                    let updated = claim.clone();
                    state.active_by_address.remove(&address_key(&updated.address));
                    released.push(updated);
                }
            }
        }
        drop(state);
        Ok(released)
    }

    async fn lapsed(&self, now: DateTime<Utc>) -> Result<Vec<ClaimId>> {
        let state = self.state.read().map_err(poison_err)?;
        let lapsed = state
            .claims
            .values()
            .filter(|c| c.is_lapsed(now))
            .map(|c| c.id)
            .collect();
        drop(state);
        Ok(lapsed)
    }

    async fn active_addresses(&self, now: DateTime<Utc>) -> Result<HashSet<String>> {
        let state = self.state.read().map_err(poison_err)?;
        let addresses = state
            .active_by_address
            .iter()
            .filter(|(_, claim_id)| {
                state
                    .claims
                    .get(claim_id)
                    .is_some_and(|c| c.excludes_at(now))
            })
            .map(|(key, _)| key.clone())
            .collect();
        drop(state);
        Ok(addresses)
    }

    async fn active_claims_for_session(&self, session_id: SessionId) -> Result<Vec<HouseClaim>> {
        let state = self.state.read().map_err(poison_err)?;
        let claims = state
            .claims
            .values()
            .filter(|c| c.session_id == session_id && c.status.is_active())
            .cloned()
            .collect();
        drop(state);
        Ok(claims)
    }

    async fn get(&self, claim_id: ClaimId) -> Result<Option<HouseClaim>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.claims.get(&claim_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimStatus;
    use blockwalk_core::Coordinates;

    fn request(address: &str) -> ClaimRequest {
        ClaimRequest {
            address: address.into(),
            location: Coordinates::new(33.4054, -86.8114).unwrap(),
        }
    }

    fn ttl() -> Duration {
        Duration::minutes(30)
    }

    async fn grant_one(
        store: &InMemoryClaimStore,
        session_id: SessionId,
        canvasser: &str,
        address: &str,
    ) -> HouseClaim {
        let results = store
            .claim(
                session_id,
                &CanvasserId::new(canvasser),
                vec![request(address)],
                ttl(),
            )
            .await
            .unwrap();
        match &results[0].outcome {
            ClaimOutcome::Granted(claim) => claim.clone(),
            ClaimOutcome::Conflict(_) => panic!("expected grant for {address}"),
        }
    }

    #[tokio::test]
    async fn grants_unclaimed_address() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();

        let claim = grant_one(&store, session, "vol-1", "100 Main St").await;
        assert_eq!(claim.status, ClaimStatus::Claimed);
        assert_eq!(claim.session_id, session);
        assert_eq!(store.len()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn denies_second_claim_with_holder_info() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session_x = SessionId::generate();
        let session_y = SessionId::generate();

        let claim = grant_one(&store, session_x, "vol-x", "100 Main St").await;

        let results = store
            .claim(
                session_y,
                &CanvasserId::new("vol-y"),
                vec![request("100 Main St")],
                ttl(),
            )
            .await?;
        match &results[0].outcome {
            ClaimOutcome::Conflict(conflict) => {
                assert_eq!(conflict.holder_session, session_x);
                assert_eq!(conflict.holder_canvasser.as_str(), "vol-x");
                assert_eq!(conflict.expires_at, claim.expires_at);
            }
            ClaimOutcome::Granted(_) => panic!("expected conflict"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn address_matching_ignores_case_and_whitespace() -> Result<()> {
        let store = InMemoryClaimStore::new();
        grant_one(&store, SessionId::generate(), "vol-1", "100 Main St").await;

        let results = store
            .claim(
                SessionId::generate(),
                &CanvasserId::new("vol-2"),
                vec![request("  100 MAIN ST ")],
                ttl(),
            )
            .await?;
        assert!(!results[0].outcome.is_granted());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() -> Result<()> {
        use std::sync::Arc;

        let store = Arc::new(InMemoryClaimStore::new());
        let n = 16;

        let mut handles = Vec::new();
        for i in 0..n {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let session = SessionId::generate();
                let canvasser = CanvasserId::new(format!("vol-{i}"));
                store
                    .claim(session, &canvasser, vec![request("100 Main St")], ttl())
                    .await
            }));
        }

        let mut grants = 0;
        let mut conflicts = 0;
        for handle in handles {
            let results = handle.await.expect("task panicked")?;
            match results[0].outcome {
                ClaimOutcome::Granted(_) => grants += 1,
                ClaimOutcome::Conflict(_) => conflicts += 1,
            }
        }
        assert_eq!(grants, 1);
        assert_eq!(conflicts, n - 1);
        Ok(())
    }

    #[tokio::test]
    async fn batch_reports_per_address_results() -> Result<()> {
        let store = InMemoryClaimStore::new();
        grant_one(&store, SessionId::generate(), "vol-1", "102 Main St").await;

        let results = store
            .claim(
                SessionId::generate(),
                &CanvasserId::new("vol-2"),
                vec![request("100 Main St"), request("102 Main St"), request("104 Main St")],
                ttl(),
            )
            .await?;
        assert_eq!(results.len(), 3);
        assert!(results[0].outcome.is_granted());
        assert!(!results[1].outcome.is_granted());
        assert!(results[2].outcome.is_granted());
        Ok(())
    }

    #[tokio::test]
    async fn lapsed_lease_can_be_taken_over() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let old_session = SessionId::generate();

        // TTL of zero: lapsed immediately, though not yet swept.
        let results = store
            .claim(
                old_session,
                &CanvasserId::new("vol-old"),
                vec![request("100 Main St")],
                Duration::zero(),
            )
            .await?;
        let old_claim = results[0].outcome.granted().unwrap().clone();

        let new_session = SessionId::generate();
        let results = store
            .claim(
                new_session,
                &CanvasserId::new("vol-new"),
                vec![request("100 Main St")],
                ttl(),
            )
            .await?;
        assert!(results[0].outcome.is_granted());

        // The lapsed claim was expired by the takeover.
        let old_claim = store.get(old_claim.id).await?.unwrap();
        assert_eq!(old_claim.status, ClaimStatus::Expired);
        Ok(())
    }

    #[tokio::test]
    async fn arrive_complete_release_enforce_ownership() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let owner = SessionId::generate();
        let stranger = SessionId::generate();
        let claim = grant_one(&store, owner, "vol-1", "100 Main St").await;

        for result in [
            store.arrive(claim.id, stranger).await?,
            store
                .complete(claim.id, stranger, VisitOutcome::default())
                .await?,
            store.release(claim.id, stranger).await?,
        ] {
            assert_eq!(result, ClaimOpResult::Forbidden { owner });
        }

        // Nothing mutated.
        let current = store.get(claim.id).await?.unwrap();
        assert_eq!(current.status, ClaimStatus::Claimed);
        Ok(())
    }

    #[tokio::test]
    async fn lifecycle_arrive_then_complete() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();
        let claim = grant_one(&store, session, "vol-1", "100 Main St").await;

        let arrived = store.arrive(claim.id, session).await?;
        assert!(matches!(arrived, ClaimOpResult::Applied(ref c) if c.status == ClaimStatus::Visiting));

        let outcome = VisitOutcome {
            voters_contacted: 2,
            voters_home: 2,
            contact_ids: vec!["c-1".into()],
        };
        let completed = store.complete(claim.id, session, outcome).await?;
        assert!(
            matches!(completed, ClaimOpResult::Applied(ref c) if c.status == ClaimStatus::Visited)
        );

        // Retry is a no-op success.
        let retry = store
            .complete(claim.id, session, VisitOutcome::default())
            .await?;
        assert!(matches!(retry, ClaimOpResult::NoOp(_)));
        Ok(())
    }

    #[tokio::test]
    async fn complete_before_arrive_is_rejected() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();
        let claim = grant_one(&store, session, "vol-1", "100 Main St").await;

        let result = store
            .complete(claim.id, session, VisitOutcome::default())
            .await?;
        assert_eq!(result, ClaimOpResult::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn complete_after_expiry_is_not_found() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();
        let claim = grant_one(&store, session, "vol-1", "100 Main St").await;

        assert!(matches!(
            store.expire(claim.id).await?,
            ExpireResult::Expired(_)
        ));

        let result = store
            .complete(claim.id, session, VisitOutcome::default())
            .await?;
        assert_eq!(result, ClaimOpResult::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn expire_is_idempotent() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let claim = grant_one(&store, SessionId::generate(), "vol-1", "100 Main St").await;

        assert!(matches!(
            store.expire(claim.id).await?,
            ExpireResult::Expired(_)
        ));
        assert_eq!(store.expire(claim.id).await?, ExpireResult::AlreadyResolved);
        Ok(())
    }

    #[tokio::test]
    async fn released_address_is_claimable_again() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session_x = SessionId::generate();
        let claim = grant_one(&store, session_x, "vol-x", "100 Main St").await;

        let released = store.release(claim.id, session_x).await?;
        assert!(released.is_success());

        let results = store
            .claim(
                SessionId::generate(),
                &CanvasserId::new("vol-y"),
                vec![request("100 Main St")],
                ttl(),
            )
            .await?;
        assert!(results[0].outcome.is_granted());
        Ok(())
    }

    #[tokio::test]
    async fn release_all_for_session_cascades() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();
        let other = SessionId::generate();

        let a = grant_one(&store, session, "vol-1", "100 Main St").await;
        let b = grant_one(&store, session, "vol-1", "102 Main St").await;
        let c = grant_one(&store, session, "vol-1", "104 Main St").await;
        grant_one(&store, other, "vol-2", "200 Oak St").await;

        // One claim mid-visit; cascade covers Visiting too.
        store.arrive(b.id, session).await?;

        let released = store.release_all_for_session(session).await?;
        assert_eq!(released.len(), 3);
        for claim_id in [a.id, b.id, c.id] {
            let claim = store.get(claim_id).await?.unwrap();
            assert_eq!(claim.status, ClaimStatus::Released);
        }
        assert!(store.active_claims_for_session(session).await?.is_empty());

        // The other session is untouched.
        assert_eq!(store.active_claims_for_session(other).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn lapsed_scan_finds_only_overdue_active_claims() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();

        let overdue = store
            .claim(
                session,
                &CanvasserId::new("vol-1"),
                vec![request("100 Main St")],
                Duration::zero(),
            )
            .await?[0]
            .outcome
            .granted()
            .unwrap()
            .clone();
        grant_one(&store, session, "vol-1", "102 Main St").await;

        let lapsed = store.lapsed(Utc::now()).await?;
        assert_eq!(lapsed, vec![overdue.id]);
        Ok(())
    }

    #[tokio::test]
    async fn active_addresses_excludes_lapsed_and_terminal() -> Result<()> {
        let store = InMemoryClaimStore::new();
        let session = SessionId::generate();

        grant_one(&store, session, "vol-1", "100 Main St").await;
        let released = grant_one(&store, session, "vol-1", "102 Main St").await;
        store.release(released.id, session).await?;
        store
            .claim(
                session,
                &CanvasserId::new("vol-1"),
                vec![request("104 Main St")],
                Duration::zero(),
            )
            .await?;

        let active = store.active_addresses(Utc::now()).await?;
        assert_eq!(active.len(), 1);
        assert!(active.contains(&address_key("100 Main St")));
        Ok(())
    }
}
