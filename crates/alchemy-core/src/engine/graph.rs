//! Interface between the processing thread and what it processes

use crate::audio::{InputHandle, OutputHandle};
use crate::types::Sample;

/// A graph of effects driven once per buffer by the processing thread
///
/// The thread only knows this trait: it pulls the selected streams before a
/// run, brackets the run with `activate`/`deactivate`, and calls `traverse`
/// once per callback.
pub trait ProcessingGraph: Send + Sync {
    /// Stream the graph reads from
    fn input_stream(&self) -> Option<InputHandle>;

    /// Stream the graph writes to
    fn output_stream(&self) -> Option<OutputHandle>;

    fn activate(&self);

    fn deactivate(&self);

    /// Process `frames` frames of `input` into `output`
    ///
    /// `input` and `output` hold one vector per stream channel.
    fn traverse(&self, frames: usize, input: &[Vec<Sample>], output: &mut [Vec<Sample>]);
}
