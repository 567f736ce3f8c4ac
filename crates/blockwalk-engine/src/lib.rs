//! # blockwalk-engine
//!
//! Coordination engine for door-to-door canvassing teams.
//!
//! This crate implements the canvassing coordination domain, providing:
//!
//! - **House Claims**: Time-bounded exclusive leases on addresses so two
//!   canvassers never knock the same door
//! - **Walk Sessions**: Per-canvasser session tracking with an
//!   append-only activity log and incremental statistics
//! - **Route Optimization**: Greedy nearest-neighbor walk ordering with
//!   distance and duration estimates
//! - **Real-Time Coordination**: Best-effort event fan-out scoped to
//!   each canvasser's working area
//!
//! ## Core Concepts
//!
//! - **Claim**: A lease on one address, granted per-address-atomically
//!   and expiring automatically if the holder goes silent
//! - **Session**: One canvasser's continuous period of walking; at most
//!   one Active session per canvasser
//! - **Working area**: The radius around a subscriber inside which
//!   located events are delivered to them
//!
//! ## Guarantees
//!
//! - **Mutual exclusion**: At most one active claim per address, under
//!   any interleaving of concurrent requests
//! - **Self-healing**: Lapsed leases are reclaimed by a background
//!   sweep; missed events are recovered by polling
//! - **Races are results**: Conflicts, ownership mismatches, and expiry
//!   races surface as typed outcomes, not errors
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blockwalk_core::Coordinates;
//! use blockwalk_engine::bus::CoordinationBus;
//! use blockwalk_engine::catalog::InMemoryAddressCatalog;
//! use blockwalk_engine::error::Result;
//! use blockwalk_engine::metrics::WalkMetrics;
//! use blockwalk_engine::service::{Principal, WalkService};
//! use blockwalk_engine::store::memory::InMemoryClaimStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let service = WalkService::new(
//!     Arc::new(InMemoryClaimStore::new()),
//!     Arc::new(InMemoryAddressCatalog::new()),
//!     Arc::new(CoordinationBus::new()),
//!     WalkMetrics::new(),
//! );
//!
//! let ada = Principal::new("vol-ada", "Ada");
//! let start = Coordinates::new(33.4054, -86.8114)?;
//! service.start_session(&ada, start).await?;
//! let houses = service.available_houses(start, None, None).await?;
//! println!("{} houses nearby", houses.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod activity;
pub mod bus;
pub mod catalog;
pub mod claim;
pub mod error;
pub mod events;
pub mod expiry;
pub mod geoindex;
pub mod metrics;
pub mod route;
pub mod service;
pub mod session;
pub mod store;
pub mod tracker;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::activity::{WalkActivity, WalkActivityType};
    pub use crate::bus::{CoordinationBus, NearbyCanvasser};
    pub use crate::catalog::{Address, AddressCatalog, InMemoryAddressCatalog, ResidentVoter};
    pub use crate::claim::{ClaimStatus, HouseClaim, VisitOutcome};
    pub use crate::error::{Error, Result};
    pub use crate::events::{WalkEvent, WalkEventData};
    pub use crate::expiry::{ExpiryHandle, ExpiryScheduler};
    pub use crate::geoindex::{AvailableHouse, GeoIndex};
    pub use crate::metrics::WalkMetrics;
    pub use crate::route::{optimize, OptimizedRoute, RouteStop, RouteTarget};
    pub use crate::service::{Principal, SessionCommand, SessionSnapshot, WalkService};
    pub use crate::session::{SessionStats, SessionStatus, WalkSession};
    pub use crate::store::memory::InMemoryClaimStore;
    pub use crate::store::{
        AddressClaimResult, ClaimConflict, ClaimOpResult, ClaimOutcome, ClaimRequest, ClaimStore,
        ExpireResult,
    };
    pub use crate::tracker::{EndOutcome, SessionTracker, StartOutcome};
}
