//! Audio driver layer
//!
//! Drivers expose devices, devices expose capture and playback streams, and
//! an [`AudioPipe`] connects one capture stream to one playback stream
//! through a [`PipeCallback`]:
//!
//! - **cpal** (feature `cpal-backend`): hardware devices from every cpal host
//! - **virtual**: paced in-memory devices for headless runs and tests
//!
//! # Example Usage
//!
//! ```ignore
//! use alchemy_core::audio::{AudioPipe, Connectable, DeviceManager};
//!
//! let mut devices = DeviceManager::from_config(&config.drivers);
//! devices.acquire()?;
//! let input = devices.input_stream("virtual", 1)?;
//! let output = devices.output_stream("virtual", 0)?;
//!
//! let mut pipe = AudioPipe::new(256, 48000);
//! pipe.connect(&mut *input.lock()?, &mut *output.lock()?, &mut callback)?;
//! ```

mod buffer;
mod device;
mod error;
mod pipe;
mod stream;
pub mod virtual_device;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;

pub use buffer::{AudioBuffer, BufferSpec, SampleFormat, SampleOrg};
pub use device::{Device, DeviceInfo, DeviceManager, Driver};
pub use error::{AudioError, AudioResult};
pub use pipe::{AudioPipe, Connectable, PipeCallback};
pub use stream::{InputHandle, OutputHandle, Readable, Stream, StreamInfo, Writable};
pub use virtual_device::{Signal, VirtualDevice, VirtualDriver, VirtualInput, VirtualOutput};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalDriver;
