//! Server error types

use thiserror::Error;

use crate::audio::AudioError;
use crate::effect::CatalogError;
use crate::engine::{ChainError, ProcessError};

/// Errors reported to clients in the `error` field of a reply
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("set-stream error: {0}")]
    SetStream(String),

    #[error("no {0} stream selected")]
    NoStream(&'static str),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("device error: {0}")]
    Devices(#[from] AudioError),

    #[error("all {0} client slots are taken")]
    ClientsFull(usize),

    #[error("failed to start listener for {name}: {reason}")]
    Listen { name: String, reason: String },

    #[error("failed to send to {name}: {reason}")]
    Send { name: String, reason: String },
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
