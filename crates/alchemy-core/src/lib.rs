//! Alchemy Core - real-time audio effects server library

pub mod audio;
pub mod config;
pub mod types;
pub mod effect;
pub mod ladspa;
pub mod engine;
pub mod server;
mod sync;

pub use types::*;
