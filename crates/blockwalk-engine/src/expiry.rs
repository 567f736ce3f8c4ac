//! Background reclamation of lapsed leases.
//!
//! The [`ExpiryScheduler`] periodically sweeps the claim store for
//! claims whose lease has lapsed, expires each one, and publishes a
//! `houseExpired` event so nearby canvassers see the address become
//! available again.
//!
//! The sweep races claim owners by design: an owner completing a visit
//! in the same instant wins or loses per claim at the store, and the
//! loser observes a typed outcome rather than an error. Sweep failures
//! are logged and the loop continues; a missed sweep only delays
//! reclamation by one interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::CoordinationBus;
use crate::error::Result;
use crate::events::{WalkEvent, WalkEventData};
use crate::metrics::WalkMetrics;
use crate::store::{ClaimStore, ExpireResult};

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to a running expiry scheduler.
pub struct ExpiryHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ExpiryHandle {
    /// Signals the scheduler to stop and waits for the loop to exit.
    pub async fn shutdown(self) {
        // Receiver dropped means the loop already exited.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            error!(error = %err, "expiry scheduler task panicked");
        }
    }
}

/// Periodic sweeper that expires lapsed claims.
pub struct ExpiryScheduler {
    claims: Arc<dyn ClaimStore>,
    bus: Arc<CoordinationBus>,
    metrics: WalkMetrics,
    interval: Duration,
}

impl ExpiryScheduler {
    /// Creates a scheduler sweeping at the given interval.
    #[must_use]
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        bus: Arc<CoordinationBus>,
        metrics: WalkMetrics,
        interval: Duration,
    ) -> Self {
        Self {
            claims,
            bus,
            metrics,
            interval,
        }
    }

    /// Spawns the sweep loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> ExpiryHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so a freshly
            // started scheduler does not sweep before anything can
            // have lapsed.
            ticker.tick().await;
            info!(interval_secs = self.interval.as_secs_f64(), "expiry scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep_once().await {
                            warn!(error = %err, "expiry sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("expiry scheduler stopping");
                        break;
                    }
                }
            }
        });
        ExpiryHandle {
            shutdown: shutdown_tx,
            join,
        }
    }

    /// Runs one sweep: expires every lapsed claim and announces each
    /// expiry. Returns the number of claims reclaimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lapsed-claim scan fails; per-claim
    /// expiry failures are logged and skipped.
    pub async fn sweep_once(&self) -> Result<usize> {
        let started = Instant::now();
        let lapsed = self.claims.lapsed(Utc::now()).await?;
        let mut expired = 0;

        for claim_id in lapsed {
            match self.claims.expire(claim_id).await {
                Ok(ExpireResult::Expired(claim)) => {
                    expired += 1;
                    debug!(claim_id = %claim.id, address = %claim.address, "claim expired");
                    let event = WalkEvent::new(WalkEventData::HouseExpired {
                        claim_id: claim.id,
                        address: claim.address,
                        location: claim.location,
                    });
                    if let Err(err) = self.bus.publish(&event) {
                        warn!(error = %err, "failed to announce expiry");
                    }
                }
                // The owner resolved the claim between the scan and
                // the expire; their transition stands.
                Ok(ExpireResult::AlreadyResolved) => {}
                Err(err) => {
                    warn!(claim_id = %claim_id, error = %err, "failed to expire claim");
                }
            }
        }

        self.metrics.record_sweep(expired, started.elapsed());
        if expired > 0 {
            info!(expired, "expiry sweep reclaimed lapsed claims");
        }
        Ok(expired)
    }
}
