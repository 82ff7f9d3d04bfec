//! Plugin hosting error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or instantiating plugins
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin binary not found at {0}")]
    MissingBinary(PathBuf),

    #[error("failed to load plugin library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    #[error("{0} does not export ladspa_descriptor")]
    MissingEntry(PathBuf),

    #[error("no plugin labelled {label} in {path}")]
    LabelNotFound { path: PathBuf, label: String },

    #[error("plugin {0} failed to instantiate")]
    InstantiateFailed(String),

    #[error("invalid plugin descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;
