//! Crate-wide error taxonomy.
//!
//! Mirrors the kind-not-type taxonomy of the alarm core this crate
//! implements: init failures abort construction, OS-timer/wake-lock/clock
//! failures are logged and degrade gracefully rather than propagating, and
//! misuse is an assertion, not a `Result`. See [`AlarmError`] variants for
//! the mapping.

use thiserror::Error;

/// Errors surfaced by the public API.
///
/// Only [`AlarmError::Init`] and [`AlarmError::Misuse`] are ever returned to
/// a caller. `OsTimer`, `WakeLock`, and `Clock` failures are logged at their
/// call site and the scheduler continues in the documented degraded mode;
/// the variants exist so internal helpers have a uniform `Result` to work
/// with and so tests can assert on the failure kind.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("failed to initialize alarm scheduler: {reason}")]
    Init { reason: String },

    #[error("OS timer operation failed: {reason}")]
    OsTimer { reason: String },

    #[error("wake lock operation failed for {id}: {reason}")]
    WakeLock { id: String, reason: String },

    #[error("monotonic clock query failed: {reason}")]
    Clock { reason: String },

    #[error("misuse of alarm API: {reason}")]
    Misuse { reason: String },
}

pub type Result<T> = std::result::Result<T, AlarmError>;
