//! Processing engine: the effect chain and the thread that drives it

mod chain;
mod error;
mod graph;
mod process;
pub mod rt;

pub use chain::{ChainEntry, EffectChain, SharedEffect};
pub use error::{ChainError, ChainResult, ProcessError, ProcessResult};
pub use graph::ProcessingGraph;
pub use process::{ProcessSettings, ProcessingState, ProcessingThread};
