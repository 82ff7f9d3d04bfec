//! In-memory virtual audio device
//!
//! Provides capture streams that synthesize a signal and playback streams
//! that discard (or capture) what they receive. Capture is paced to real
//! time so the processing thread behaves as it would against hardware.
//! Used for headless operation and throughout the test suite.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::buffer::{AudioBuffer, BufferSpec, SampleFormat, SampleOrg};
use super::device::{Device, Driver};
use super::error::{AudioError, AudioResult};
use super::stream::{InputHandle, OutputHandle, Readable, Stream, StreamInfo, Writable};
use crate::sync::lock;
use crate::types::{Direction, Sample, StreamId, DEFAULT_SAMPLE_RATE};

/// Maximum channel count a virtual stream accepts
const MAX_VIRTUAL_CHANNELS: u16 = 8;

/// Captured playback samples, one `Vec` per channel
pub type CaptureBuffer = Arc<Mutex<Vec<Vec<Sample>>>>;

/// Signal produced by a virtual capture stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Silence,
    /// A constant DC value
    Constant(f32),
    /// A sine wave
    Sine { frequency: f32, amplitude: f32 },
}

/// Sleeps so successive buffers are delivered at the stream's rate
#[derive(Debug, Clone)]
struct Pacer {
    next: Option<Instant>,
}

impl Pacer {
    fn new() -> Self {
        Self { next: None }
    }

    fn reset(&mut self) {
        self.next = None;
    }

    fn wait(&mut self, frames: usize, sample_rate: u32) {
        let period = Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64);
        let now = Instant::now();
        let deadline = self.next.unwrap_or(now) + period;
        if deadline > now {
            std::thread::sleep(deadline - now);
            self.next = Some(deadline);
        } else {
            // Fell behind (debugger, loaded machine); resynchronize
            self.next = Some(now);
        }
    }
}

/// Virtual capture stream
pub struct VirtualInput {
    id: StreamId,
    name: String,
    device_name: String,
    channels: u16,
    sample_rate: u32,
    fixed_rate: Option<u32>,
    format: SampleFormat,
    organization: SampleOrg,
    signal: Signal,
    phase: f64,
    paced: bool,
    pacer: Pacer,
    fail_after: Option<usize>,
    reads: Arc<AtomicUsize>,
    open: bool,
    scratch: Vec<Sample>,
}

impl VirtualInput {
    pub fn new(id: StreamId, name: impl Into<String>, channels: u16) -> Self {
        Self {
            id,
            name: name.into(),
            device_name: "virtual".to_string(),
            channels: channels.clamp(1, MAX_VIRTUAL_CHANNELS),
            sample_rate: DEFAULT_SAMPLE_RATE,
            fixed_rate: None,
            format: SampleFormat::F32,
            organization: SampleOrg::NonInterleaved,
            signal: Signal::Silence,
            phase: 0.0,
            paced: true,
            pacer: Pacer::new(),
            fail_after: None,
            reads: Arc::new(AtomicUsize::new(0)),
            open: false,
            scratch: Vec::new(),
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Deliver raw samples in the given layout instead of planar floats
    pub fn with_format(mut self, format: SampleFormat, organization: SampleOrg) -> Self {
        self.format = format;
        self.organization = organization;
        self
    }

    /// Refuse any other sample rate than `rate`
    pub fn with_fixed_rate(mut self, rate: u32) -> Self {
        self.fixed_rate = Some(rate);
        self.sample_rate = rate;
        self
    }

    /// Deliver buffers as fast as they are requested
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Fail every read after `reads` successful ones
    pub fn fail_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Counter of successful reads, shared with the caller
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }

    fn next_sample(&mut self) -> Sample {
        match self.signal {
            Signal::Silence => 0.0,
            Signal::Constant(value) => value,
            Signal::Sine {
                frequency,
                amplitude,
            } => {
                let value = (self.phase * std::f64::consts::TAU).sin() as f32 * amplitude;
                self.phase = (self.phase + frequency as f64 / self.sample_rate as f64).fract();
                value
            }
        }
    }
}

impl Stream for VirtualInput {
    fn id(&self) -> StreamId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn direction(&self) -> Direction {
        Direction::Input
    }

    fn open(&mut self) -> AudioResult<()> {
        self.open = true;
        self.pacer.reset();
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, rate: u32) -> u32 {
        self.sample_rate = self.fixed_rate.unwrap_or(rate);
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn set_channel_count(&mut self, channels: u16) -> u16 {
        self.channels = channels.clamp(1, MAX_VIRTUAL_CHANNELS);
        self.channels
    }

    fn buffer_spec(&self, frames: usize) -> BufferSpec {
        BufferSpec::new(self.organization, self.channels, self.format, frames)
    }
}

impl Readable for VirtualInput {
    fn read(&mut self, buffer: &mut AudioBuffer) -> AudioResult<usize> {
        if !self.open {
            return Err(AudioError::StreamClosed(self.name.clone()));
        }
        let reads = self.reads.load(Ordering::Relaxed);
        if self.fail_after.is_some_and(|limit| reads >= limit) {
            return Err(AudioError::Io(format!("{}: injected read failure", self.name)));
        }

        let frames = buffer.frames();
        let channels = buffer.channels();
        self.scratch.resize(frames * channels, 0.0);
        for frame in 0..frames {
            let value = self.next_sample();
            for ch in 0..channels {
                self.scratch[frame * channels + ch] = value;
            }
        }
        buffer.load_interleaved(&self.scratch)?;

        if self.paced {
            self.pacer.wait(frames, self.sample_rate);
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(frames)
    }
}

/// Virtual playback stream
pub struct VirtualOutput {
    id: StreamId,
    name: String,
    device_name: String,
    channels: u16,
    sample_rate: u32,
    open: bool,
    capture: Option<CaptureBuffer>,
    capture_limit: usize,
    writes: Arc<AtomicUsize>,
    scratch: Vec<Sample>,
}

impl VirtualOutput {
    pub fn new(id: StreamId, name: impl Into<String>, channels: u16) -> Self {
        Self {
            id,
            name: name.into(),
            device_name: "virtual".to_string(),
            channels: channels.clamp(1, MAX_VIRTUAL_CHANNELS),
            sample_rate: DEFAULT_SAMPLE_RATE,
            open: false,
            capture: None,
            capture_limit: 0,
            writes: Arc::new(AtomicUsize::new(0)),
            scratch: Vec::new(),
        }
    }

    /// Keep up to `limit` frames of everything written
    pub fn with_capture(mut self, limit: usize) -> Self {
        self.capture = Some(Arc::new(Mutex::new(vec![Vec::new(); self.channels as usize])));
        self.capture_limit = limit;
        self
    }

    pub fn capture(&self) -> Option<CaptureBuffer> {
        self.capture.clone()
    }

    /// Counter of completed writes, shared with the caller
    pub fn write_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.writes)
    }
}

impl Stream for VirtualOutput {
    fn id(&self) -> StreamId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn direction(&self) -> Direction {
        Direction::Output
    }

    fn open(&mut self) -> AudioResult<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, rate: u32) -> u32 {
        self.sample_rate = rate;
        rate
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn set_channel_count(&mut self, channels: u16) -> u16 {
        self.channels = channels.clamp(1, MAX_VIRTUAL_CHANNELS);
        self.channels
    }

    fn buffer_spec(&self, frames: usize) -> BufferSpec {
        BufferSpec::new(SampleOrg::Interleaved, self.channels, SampleFormat::F32, frames)
    }
}

impl Writable for VirtualOutput {
    fn write(&mut self, buffer: &AudioBuffer) -> AudioResult<usize> {
        if !self.open {
            return Err(AudioError::StreamClosed(self.name.clone()));
        }
        let frames = buffer.frames();
        let channels = buffer.channels();

        if let Some(capture) = &self.capture {
            self.scratch.resize(frames * channels, 0.0);
            buffer.store_interleaved(&mut self.scratch)?;
            let mut captured = lock(capture);
            captured.resize(channels, Vec::new());
            for (ch, out) in captured.iter_mut().enumerate() {
                let room = self.capture_limit.saturating_sub(out.len());
                out.extend(
                    self.scratch
                        .iter()
                        .skip(ch)
                        .step_by(channels)
                        .take(frames.min(room)),
                );
            }
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(frames)
    }
}

/// A virtual device: a set of capture and playback streams
#[derive(Clone)]
pub struct VirtualDevice {
    name: String,
    full_name: String,
    inputs: Vec<(StreamInfo, Arc<Mutex<VirtualInput>>)>,
    outputs: Vec<(StreamInfo, Arc<Mutex<VirtualOutput>>)>,
}

impl VirtualDevice {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// The device registered by default: silence and a 440 Hz tone on the
    /// capture side, a stereo null sink on the playback side
    pub fn standard() -> Self {
        Self::new("virtual", "Virtual loopback device")
            .with_input(VirtualInput::new(0, "silence", 1))
            .with_input(VirtualInput::new(1, "sine 440 Hz", 1).with_signal(Signal::Sine {
                frequency: 440.0,
                amplitude: 0.5,
            }))
            .with_output(VirtualOutput::new(0, "null", 2))
    }

    pub fn with_input(mut self, mut stream: VirtualInput) -> Self {
        stream.device_name = self.name.clone();
        self.inputs.push((stream.info(), Arc::new(Mutex::new(stream))));
        self
    }

    pub fn with_output(mut self, mut stream: VirtualOutput) -> Self {
        stream.device_name = self.name.clone();
        self.outputs.push((stream.info(), Arc::new(Mutex::new(stream))));
        self
    }
}

impl Device for VirtualDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn input_streams(&self) -> Vec<StreamInfo> {
        self.inputs.iter().map(|(info, _)| info.clone()).collect()
    }

    fn output_streams(&self) -> Vec<StreamInfo> {
        self.outputs.iter().map(|(info, _)| info.clone()).collect()
    }

    fn input_stream(&self, id: StreamId) -> Option<InputHandle> {
        self.inputs
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, stream)| Arc::clone(stream) as InputHandle)
    }

    fn output_stream(&self, id: StreamId) -> Option<OutputHandle> {
        self.outputs
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, stream)| Arc::clone(stream) as OutputHandle)
    }

    fn close_all(&self) {
        for (_, stream) in &self.inputs {
            lock(stream).close();
        }
        for (_, stream) in &self.outputs {
            lock(stream).close();
        }
    }
}

/// Driver that always reports the same set of virtual devices
pub struct VirtualDriver {
    devices: Vec<VirtualDevice>,
}

impl VirtualDriver {
    pub fn new(devices: Vec<VirtualDevice>) -> Self {
        Self { devices }
    }
}

impl Default for VirtualDriver {
    fn default() -> Self {
        Self::new(vec![VirtualDevice::standard()])
    }
}

impl Driver for VirtualDriver {
    fn name(&self) -> &str {
        "virtual"
    }

    fn detect(&mut self) -> AudioResult<Vec<Box<dyn Device>>> {
        Ok(self
            .devices
            .iter()
            .cloned()
            .map(|device| Box::new(device) as Box<dyn Device>)
            .collect())
    }
}
