//! Driver stream traits
//!
//! A driver exposes capture and playback streams through three capability
//! traits: [`Stream`] for configuration, [`Readable`] for capture and
//! [`Writable`] for playback. Streams are owned by their device and handed
//! out as shared handles so the processing thread can hold a stream's lock
//! for the whole duration of a run.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::buffer::{AudioBuffer, BufferSpec};
use super::error::AudioResult;
use crate::types::{Direction, StreamId};

/// Description of a stream for device listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub name: String,
    #[serde(skip)]
    pub direction: Direction,
    #[serde(skip)]
    pub channels: u16,
}

/// Common stream configuration
pub trait Stream: Send {
    /// Stream id, unique within its device and direction
    fn id(&self) -> StreamId;

    /// Human readable stream name
    fn name(&self) -> &str;

    /// Short name of the owning device
    fn device_name(&self) -> &str;

    fn direction(&self) -> Direction;

    /// Open the stream for I/O; a no-op if already open
    fn open(&mut self) -> AudioResult<()>;

    /// Close the stream; a no-op if already closed
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn sample_rate(&self) -> u32;

    /// Request a sample rate, returning the rate actually applied
    fn set_sample_rate(&mut self, rate: u32) -> u32;

    fn channel_count(&self) -> u16;

    /// Request a channel count, returning the count actually applied
    fn set_channel_count(&mut self, channels: u16) -> u16;

    /// Raw buffer layout this stream reads or writes for `frames` frames
    fn buffer_spec(&self, frames: usize) -> BufferSpec;

    fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id(),
            name: self.name().to_string(),
            direction: self.direction(),
            channels: self.channel_count(),
        }
    }
}

/// Capture side of a driver
pub trait Readable: Stream {
    /// Block until one buffer of samples is available and fill `buffer`'s
    /// raw planes. Returns the number of frames read.
    fn read(&mut self, buffer: &mut AudioBuffer) -> AudioResult<usize>;
}

/// Playback side of a driver
pub trait Writable: Stream {
    /// Block until `buffer`'s raw planes have been handed to the device.
    /// Returns the number of frames written.
    fn write(&mut self, buffer: &AudioBuffer) -> AudioResult<usize>;
}

/// Shared handle to a capture stream
pub type InputHandle = Arc<Mutex<dyn Readable>>;

/// Shared handle to a playback stream
pub type OutputHandle = Arc<Mutex<dyn Writable>>;
