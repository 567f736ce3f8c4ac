//! # blockwalk-core
//!
//! Core primitives for the blockwalk canvassing coordinator.
//!
//! This crate provides the foundational types shared across blockwalk
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for sessions, claims, and
//!   activity records
//! - **Geometry**: Coordinates and haversine great-circle distance
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `blockwalk-core` is the only crate allowed to define shared
//! primitives. The engine crate builds on these types but never
//! redefines them.
//!
//! ## Example
//!
//! ```rust
//! use blockwalk_core::prelude::*;
//!
//! let canvasser = CanvasserId::new("vol-42");
//! let session_id = SessionId::generate();
//! let home = Coordinates::new(33.4054, -86.8114).unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod geo;
pub mod id;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use blockwalk_core::prelude::*;
///
/// let id = ClaimId::generate();
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::geo::{haversine_km, haversine_meters, Coordinates};
    pub use crate::id::{ActivityId, CanvasserId, ClaimId, ConnectionId, SessionId};
}

pub use error::{Error, Result};
pub use geo::{haversine_km, haversine_meters, Coordinates};
pub use id::{ActivityId, CanvasserId, ClaimId, ConnectionId, SessionId};
