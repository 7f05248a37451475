//! Error taxonomy for the trace engine
//!
//! Control-path errors are returned synchronously through the dispatcher and
//! surfaced verbatim to the caller. Recording-path conditions (`LogStoreFull`,
//! stale-target skips) are recoverable: the recorder counts and logs them but
//! never raises them into the observed program.

use thiserror::Error;

/// Errors for registry, codec, dispatcher, and log store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("'{0}' is already registered")]
    AlreadyExists(String),

    #[error("'{0}' is not registered")]
    NotFound(String),

    #[error("target table is full ({0} slots)")]
    CapacityExceeded(usize),

    #[error("failed to install probe for '{name}': {reason}")]
    ProbeInstallFailed { name: String, reason: String },

    #[error("log store is full")]
    LogStoreFull,

    #[error("unknown control command code {0}")]
    InvalidCommand(u32),

    #[error("malformed control payload: {0}")]
    PayloadTransferFailed(String),

    #[error("control channel is already open")]
    SessionBusy,
}

pub type Result<T> = std::result::Result<T, TraceError>;
