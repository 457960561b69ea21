//! Error types shared by the collaborator seam, the decoders and the tasks.

use thiserror::Error;

use crate::core::bluetooth::ObjectId;
use crate::core::telemetry::DecodeError;

/// Top-level error type used across the library.
#[derive(Debug, Error)]
pub enum GatherError {
    /// The bluest backend reported a transport-level failure.
    #[error("bluetooth error: {0}")]
    Bluest(#[from] bluest::Error),

    /// A transport failure from a stack that is not bluest.
    #[error("{0}")]
    Transport(String),

    /// The stack has no live handle for this object id.
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    /// No Bluetooth adapter could be opened.
    #[error("no bluetooth adapter available")]
    AdapterUnavailable,

    /// Discovery was started while a discovery session is already running.
    #[error("discovery already in progress")]
    DiscoveryActive,

    /// Discovery was stopped while no discovery session is running.
    #[error("no discovery in progress")]
    DiscoveryInactive,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatherError>;
