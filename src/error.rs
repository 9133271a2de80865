//! Error types for preference sync, entity caches and page-state storage
//!
//! This module defines the error types used throughout the prefsync library.
//! All public functions return [`Result<T, Error>`] for consistent error handling.

/// Errors that can occur while talking to preference services, entity
/// controllers or the local string store
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The preference service rejected a read or a write
    #[error("Preference bridge error: {0}")]
    Bridge(String),

    /// The construction-time snapshot fetch failed
    #[error("Initial preference fetch failed: {0}")]
    Seed(String),

    /// A remote entity controller call failed
    #[error("Remote controller error: {0}")]
    Remote(String),

    /// No cached entity with this id
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    /// Storage keys are used as file names and must stay simple
    #[error("Invalid storage key: {0}")]
    InvalidStorageKey(String),

    /// Stored page state has the wrong shape
    #[error("Invalid stored state: {0}")]
    InvalidState(String),

    /// Invalid glob pattern in query
    #[error("Invalid glob pattern: {0}")]
    InvalidGlobPattern(String),

    /// No page registered under this name
    #[error("Unknown page '{0}'")]
    UnknownPage(String),

    /// A background worker exited before answering
    #[error("Background task stopped: {0}")]
    TaskStopped(String),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for convenience
///
/// All public functions in the prefsync library return this type alias for
/// consistent error handling.
///
/// # Example
///
/// ```rust
/// use prefsync::{query_preferences, PrefSnapshot, Result};
///
/// fn count_network_prefs(snapshot: &PrefSnapshot) -> Result<usize> {
///     let network = query_preferences(snapshot, &["network.*"])?;
///     Ok(network.len())
/// }
/// # assert_eq!(count_network_prefs(&PrefSnapshot::new()).unwrap(), 0);
/// ```
pub type Result<T> = std::result::Result<T, Error>;
