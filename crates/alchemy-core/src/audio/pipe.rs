//! Blocking read → process → write loop between two streams
//!
//! ```text
//! ┌──────────────┐ read  ┌──────────────┐ decode ┌────────────────────┐
//! │ Readable     │──────►│ input buffer │───────►│ on_samples_ready() │
//! └──────────────┘       └──────────────┘        └─────────┬──────────┘
//!                                                          │ encode
//! ┌──────────────┐ write ┌───────────────┐                 │
//! │ Writable     │◄──────│ output buffer │◄────────────────┘
//! └──────────────┘       └───────────────┘
//! ```
//!
//! The loop polls [`PipeCallback::should_stop`] once per buffer, so a stop
//! request takes effect within one buffer period.

use super::buffer::AudioBuffer;
use super::error::AudioResult;
use super::stream::{Readable, Stream, Writable};
use crate::types::Sample;

/// Receiver of decoded samples, driven by [`Connectable::connect`]
pub trait PipeCallback {
    /// Process one buffer. `output` must be fully written; it is encoded
    /// and handed to the playback stream right after this returns.
    fn on_samples_ready(&mut self, frames: usize, input: &[Vec<Sample>], output: &mut [Vec<Sample>]);

    /// Polled before every read; returning `true` ends the loop cleanly
    fn should_stop(&mut self) -> bool;
}

/// Something that can run a blocking stream loop
pub trait Connectable {
    /// Connect `input` to `output` through `callback` until the callback
    /// asks to stop (`Ok`) or a stream fails (`Err`).
    fn connect(
        &mut self,
        input: &mut dyn Readable,
        output: &mut dyn Writable,
        callback: &mut dyn PipeCallback,
    ) -> AudioResult<()>;
}

/// Connects one capture stream to one playback stream
pub struct AudioPipe {
    frames: usize,
    sample_rate: u32,
}

impl AudioPipe {
    /// Create a pipe processing `frames` frames per buffer at `sample_rate`
    pub fn new(frames: usize, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Sample rate applied by the last connect (requested rate before that)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open_and_run(
        &mut self,
        input: &mut dyn Readable,
        output: &mut dyn Writable,
        callback: &mut dyn PipeCallback,
    ) -> AudioResult<()> {
        let requested = self.sample_rate;
        let applied = input.set_sample_rate(requested);
        if applied != requested {
            log::warn!(
                "[PIPE] Sample rate requested {} Hz on {}, applied {} Hz",
                requested,
                input.name(),
                applied
            );
        }
        let applied_out = output.set_sample_rate(applied);
        if applied_out != applied {
            log::warn!(
                "[PIPE] Sample rate requested {} Hz on {}, applied {} Hz",
                applied,
                output.name(),
                applied_out
            );
        }
        self.sample_rate = applied;

        negotiate_channels(input);
        negotiate_channels(output);

        input.open()?;
        output.open()?;

        let mut input_buffer = AudioBuffer::allocated(input.buffer_spec(self.frames))?;
        let mut output_buffer = AudioBuffer::allocated(output.buffer_spec(self.frames))?;

        log::info!(
            "[PIPE] Connected {}/{} ({} ch) -> {}/{} ({} ch), {} frames @ {} Hz",
            input.device_name(),
            input.name(),
            input_buffer.channels(),
            output.device_name(),
            output.name(),
            output_buffer.channels(),
            self.frames,
            self.sample_rate
        );

        while !callback.should_stop() {
            Self::step(input, output, callback, &mut input_buffer, &mut output_buffer)?;
        }
        Ok(())
    }

    fn step(
        input: &mut dyn Readable,
        output: &mut dyn Writable,
        callback: &mut dyn PipeCallback,
        input_buffer: &mut AudioBuffer,
        output_buffer: &mut AudioBuffer,
    ) -> AudioResult<()> {
        let read = input.read(input_buffer)?;
        input_buffer.decode()?;
        let frames = read.min(input_buffer.frames());
        callback.on_samples_ready(frames, input_buffer.planar(), output_buffer.planar_mut());
        // A short read leaves the rest of the period silent
        for channel in output_buffer.planar_mut() {
            let end = channel.len();
            channel[frames.min(end)..].fill(0.0);
        }
        output_buffer.encode()?;
        output.write(output_buffer)?;
        Ok(())
    }
}

impl Connectable for AudioPipe {
    /// Sample rate and channel count are negotiated before the streams are
    /// opened. Both streams are closed again when the loop ends, whether it
    /// ended cleanly or with an error.
    fn connect(
        &mut self,
        input: &mut dyn Readable,
        output: &mut dyn Writable,
        callback: &mut dyn PipeCallback,
    ) -> AudioResult<()> {
        let result = self.open_and_run(input, output, callback);
        input.close();
        output.close();
        result
    }
}

fn negotiate_channels<S: Stream + ?Sized>(stream: &mut S) {
    let requested = stream.channel_count();
    let applied = stream.set_channel_count(requested);
    if applied != requested {
        log::warn!(
            "[PIPE] Channel count requested {} on {}, applied {}",
            requested,
            stream.name(),
            applied
        );
    }
}
