//! Engine error types

use thiserror::Error;

use crate::types::EffectId;

/// Errors raised by effect chain mutations and lookups
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("ports incompatible: {0}")]
    PortsIncompatible(String),

    #[error("unknown effect {0}")]
    UnknownEffect(EffectId),

    #[error("effect {effect} has no parameter {param}")]
    UnknownParam { effect: EffectId, param: String },

    #[error("position {position} out of range for a chain of {len} effect(s)")]
    PositionOutOfRange { position: i64, len: usize },

    #[error("the {0} node cannot be removed")]
    Sentinel(EffectId),
}

/// Errors raised while starting the processing thread
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("no input stream selected")]
    NoInputStream,

    #[error("no output stream selected")]
    NoOutputStream,

    #[error("failed to spawn processing thread: {0}")]
    SpawnFailed(String),

    #[error("processing failed to start: {0}")]
    StartFailed(String),

    #[error("invalid buffer size {0}")]
    InvalidBufferSize(usize),
}

pub type ChainResult<T> = Result<T, ChainError>;
pub type ProcessResult<T> = Result<T, ProcessError>;
