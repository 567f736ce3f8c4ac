//! Error types and result aliases for blockwalk.
//!
//! This module defines the shared error types used across blockwalk
//! components. Errors are structured for programmatic handling and
//! include context for debugging.

/// The result type used throughout blockwalk-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Coordinates outside the valid latitude/longitude range.
    #[error("invalid coordinates: {message}")]
    InvalidCoordinates {
        /// Description of what made the coordinates invalid.
        message: String,
    },
}
