//! Expiry sweep behavior against the full service surface.

#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use blockwalk_core::Coordinates;
use blockwalk_engine::bus::CoordinationBus;
use blockwalk_engine::catalog::{Address, InMemoryAddressCatalog, ResidentVoter};
use blockwalk_engine::claim::VisitOutcome;
use blockwalk_engine::error::Result;
use blockwalk_engine::events::WalkEventData;
use blockwalk_engine::expiry::ExpiryScheduler;
use blockwalk_engine::metrics::WalkMetrics;
use blockwalk_engine::service::{Principal, WalkService};
use blockwalk_engine::store::memory::InMemoryClaimStore;
use blockwalk_engine::store::{ClaimOpResult, ClaimStore};

fn here() -> Coordinates {
    Coordinates::new(33.4054, -86.8114).expect("valid coordinates")
}

struct Fixture {
    service: Arc<WalkService>,
    claims: Arc<InMemoryClaimStore>,
    bus: Arc<CoordinationBus>,
}

fn fixture() -> Fixture {
    let catalog = Arc::new(InMemoryAddressCatalog::new());
    catalog
        .insert_all([Address {
            line: "100 Main St".into(),
            location: here(),
            voters: vec![ResidentVoter {
                voter_id: "v-1".into(),
                name: "Resident".into(),
            }],
        }])
        .expect("catalog load");
    let claims = Arc::new(InMemoryClaimStore::new());
    let bus = Arc::new(CoordinationBus::new());
    let service = Arc::new(WalkService::new(
        Arc::clone(&claims) as Arc<dyn ClaimStore>,
        catalog,
        Arc::clone(&bus),
        WalkMetrics::new(),
    ));
    Fixture {
        service,
        claims,
        bus,
    }
}

fn sweeper(fixture: &Fixture, interval: Duration) -> ExpiryScheduler {
    ExpiryScheduler::new(
        Arc::clone(&fixture.claims) as Arc<dyn ClaimStore>,
        Arc::clone(&fixture.bus),
        WalkMetrics::new(),
        interval,
    )
}

/// A claim abandoned past its TTL is reclaimed, announced, and the
/// address becomes claimable by someone else.
#[tokio::test]
async fn abandoned_claim_is_reclaimed_and_reclaimable() -> Result<()> {
    let fx = fixture();
    let ada = Principal::new("vol-ada", "Ada");
    let grace = Principal::new("vol-grace", "Grace");
    fx.service.start_session(&ada, here()).await?;
    fx.service.start_session(&grace, here()).await?;
    let (_conn, mut rx) = fx.service.join_area(&grace, here(), None)?;

    // TTL of zero: the lease lapses the instant it is granted.
    let results = fx
        .service
        .claim_houses(&ada, vec!["100 Main St".into()], Some(0))
        .await?
        .into_ok()
        .expect("active session");
    assert!(results[0].outcome.is_granted());

    let reclaimed = sweeper(&fx, Duration::from_secs(60)).sweep_once().await?;
    assert_eq!(reclaimed, 1);

    // Grace hears about it (the claim announcement arrives first).
    let mut saw_expiry = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event.data, WalkEventData::HouseExpired { .. }) {
            saw_expiry = true;
        }
    }
    assert!(saw_expiry);

    // And can claim the address herself.
    let retry = fx
        .service
        .claim_houses(&grace, vec!["100 Main St".into()], None)
        .await?
        .into_ok()
        .expect("active session");
    assert!(retry[0].outcome.is_granted());
    Ok(())
}

/// Completing a claim the sweep already expired reports NotFound; the
/// client must re-claim.
#[tokio::test]
async fn completion_loses_the_expiry_race() -> Result<()> {
    let fx = fixture();
    let ada = Principal::new("vol-ada", "Ada");
    fx.service.start_session(&ada, here()).await?;

    let results = fx
        .service
        .claim_houses(&ada, vec!["100 Main St".into()], Some(0))
        .await?
        .into_ok()
        .expect("active session");
    let claim = results[0].outcome.granted().expect("granted").clone();

    fx.service.arrive(&ada, claim.id, here()).await?;
    sweeper(&fx, Duration::from_secs(60)).sweep_once().await?;

    let late = fx
        .service
        .complete_visit(
            &ada,
            claim.id,
            here(),
            VisitOutcome {
                voters_contacted: 1,
                voters_home: 1,
                contact_ids: vec![],
            },
        )
        .await?
        .into_ok()
        .expect("active session");
    assert_eq!(late, ClaimOpResult::NotFound);

    // The lost visit never touched the session counters.
    let snapshot = fx
        .service
        .current_session(&ada)
        .await?
        .expect("session exists");
    assert_eq!(snapshot.session.stats.houses_visited, 0);
    Ok(())
}

/// The spawned loop reclaims on its own without any explicit sweep
/// call.
#[tokio::test(start_paused = true)]
async fn background_loop_reclaims_unattended() -> Result<()> {
    let fx = fixture();
    let ada = Principal::new("vol-ada", "Ada");
    fx.service.start_session(&ada, here()).await?;
    fx.service
        .claim_houses(&ada, vec!["100 Main St".into()], Some(0))
        .await?;

    let handle = sweeper(&fx, Duration::from_millis(50)).spawn();
    tokio::time::sleep(Duration::from_millis(120)).await;
    handle.shutdown().await;

    let available = fx.service.available_houses(here(), None, None).await?;
    assert_eq!(available.len(), 1);
    Ok(())
}
