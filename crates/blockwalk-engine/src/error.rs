//! Error types for the coordination engine.
//!
//! Expected coordination races (an address already claimed, a caller
//! that does not own a claim, a claim that expired underneath its
//! owner) are **not** errors: they are typed operation results defined
//! next to the operations that produce them. This enum covers the
//! genuinely exceptional paths, storage failures above all.

use blockwalk_core::SessionId;

/// The result type used throughout blockwalk-engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in coordination operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A session referenced by internal state was not found.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The session ID that was not found.
        session_id: SessionId,
    },

    /// A storage operation failed.
    ///
    /// Claim operations fail closed on storage errors: no claim is
    /// granted on a path that returned this variant.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// An error from blockwalk-core.
    #[error("core error: {0}")]
    Core(#[from] blockwalk_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
