//! CPAL driver
//!
//! Enumerates devices from every available cpal host and exposes each
//! device's default capture and playback endpoints as blocking streams.
//!
//! ```text
//! ┌───────────────────┐ push  ┌──────────────┐  pop  ┌──────────────────┐
//! │ cpal input thread │──────►│ rtrb (f32)   │──────►│ CpalInput::read  │
//! └───────────────────┘       └──────────────┘       └──────────────────┘
//! ┌───────────────────┐ push  ┌──────────────┐  pop  ┌──────────────────┐
//! │ CpalOutput::write │──────►│ rtrb (f32)   │──────►│ cpal out thread  │
//! └───────────────────┘       └──────────────┘       └──────────────────┘
//! ```
//!
//! The cpal callbacks never block: capture drops samples when the ring is
//! full, playback emits silence when it is empty. Blocking happens on the
//! processing thread's side, which gives the pipe its pacing.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{HostId, SampleRate, StreamConfig};

use super::buffer::{AudioBuffer, BufferSpec, SampleFormat, SampleOrg};
use super::device::{Device, Driver};
use super::error::{AudioError, AudioResult};
use super::stream::{InputHandle, OutputHandle, Readable, Stream, StreamInfo, Writable};
use crate::sync::lock;
use crate::types::{Direction, Sample, StreamId};

/// How long a read or write may wait on the device before failing
const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval while waiting on the ring buffer
const POLL_INTERVAL: Duration = Duration::from_micros(250);

/// Ring buffer length in seconds of audio
const RING_SECONDS: f32 = 0.25;

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Keeps a playing cpal stream alive
///
/// cpal streams are `!Send` on some hosts; the guard is only ever touched
/// from behind the owning stream's mutex and dropped there.
struct StreamGuard(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamGuard {}

/// Pick the rate to apply: `rate` if any config supports it at `channels`,
/// otherwise the device default
fn supported_rate<I>(mut configs: I, channels: u16, rate: u32, fallback: u32) -> u32
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    let supported = configs.any(|config| {
        config.channels() == channels
            && rate >= config.min_sample_rate().0
            && rate <= config.max_sample_rate().0
    });
    if supported {
        rate
    } else {
        fallback
    }
}

fn ring_capacity(sample_rate: u32, channels: u16) -> usize {
    ((sample_rate as f32 * RING_SECONDS) as usize).max(4096) * channels as usize
}

/// Default capture endpoint of a cpal device
pub struct CpalInput {
    device: cpal::Device,
    name: String,
    device_name: String,
    sample_rate: u32,
    default_rate: u32,
    channels: u16,
    active: Option<(StreamGuard, rtrb::Consumer<Sample>)>,
    scratch: Vec<Sample>,
}

impl CpalInput {
    fn new(device: cpal::Device, device_name: String, config: cpal::SupportedStreamConfig) -> Self {
        Self {
            device,
            name: "capture".to_string(),
            device_name,
            sample_rate: config.sample_rate().0,
            default_rate: config.sample_rate().0,
            channels: config.channels(),
            active: None,
            scratch: Vec::new(),
        }
    }
}

impl Stream for CpalInput {
    fn id(&self) -> StreamId {
        0
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
        if self.active.is_some() {
            return Ok(());
        }
        let config = StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let (mut producer, consumer) =
            rtrb::RingBuffer::<Sample>::new(ring_capacity(self.sample_rate, self.channels));
        let device_name = self.device_name.clone();

        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    for sample in data {
                        if producer.push(*sample).is_err() {
                            // Ring full: the processing thread is behind
                            break;
                        }
                    }
                },
                move |err| {
                    log::error!("Capture stream error on {}: {}", device_name, err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!(
            "Capture opened on {}: {} channels, {}Hz",
            self.device_name,
            self.channels,
            self.sample_rate
        );
        self.active = Some((StreamGuard(stream), consumer));
        Ok(())
    }

    fn close(&mut self) {
        if self.active.take().is_some() {
            log::info!("Capture closed on {}", self.device_name);
        }
    }

    fn is_open(&self) -> bool {
        self.active.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, rate: u32) -> u32 {
        self.sample_rate = match self.device.supported_input_configs() {
            Ok(configs) => supported_rate(configs, self.channels, rate, self.default_rate),
            Err(_) => self.default_rate,
        };
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn set_channel_count(&mut self, channels: u16) -> u16 {
        let supported = self
            .device
            .supported_input_configs()
            .map(|mut configs| configs.any(|c| c.channels() == channels))
            .unwrap_or(false);
        if supported {
            self.channels = channels;
        }
        self.channels
    }

    fn buffer_spec(&self, frames: usize) -> BufferSpec {
        BufferSpec::new(SampleOrg::Interleaved, self.channels, SampleFormat::F32, frames)
    }
}

impl Readable for CpalInput {
    fn read(&mut self, buffer: &mut AudioBuffer) -> AudioResult<usize> {
        let Some((_, consumer)) = self.active.as_mut() else {
            return Err(AudioError::StreamClosed(self.device_name.clone()));
        };
        let needed = buffer.frames() * buffer.channels();
        let started = Instant::now();
        while consumer.slots() < needed {
            if started.elapsed() > IO_TIMEOUT {
                return Err(AudioError::Io(format!(
                    "{}: no capture data for {:?}",
                    self.device_name, IO_TIMEOUT
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        self.scratch.resize(needed, 0.0);
        for slot in self.scratch.iter_mut() {
            *slot = consumer.pop().unwrap_or(0.0);
        }
        buffer.load_interleaved(&self.scratch)?;
        Ok(buffer.frames())
    }
}

/// Default playback endpoint of a cpal device
pub struct CpalOutput {
    device: cpal::Device,
    name: String,
    device_name: String,
    sample_rate: u32,
    default_rate: u32,
    channels: u16,
    active: Option<(StreamGuard, rtrb::Producer<Sample>)>,
    scratch: Vec<Sample>,
}

impl CpalOutput {
    fn new(device: cpal::Device, device_name: String, config: cpal::SupportedStreamConfig) -> Self {
        Self {
            device,
            name: "playback".to_string(),
            device_name,
            sample_rate: config.sample_rate().0,
            default_rate: config.sample_rate().0,
            channels: config.channels(),
            active: None,
            scratch: Vec::new(),
        }
    }
}

impl Stream for CpalOutput {
    fn id(&self) -> StreamId {
        0
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
        if self.active.is_some() {
            return Ok(());
        }
        let config = StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let (producer, mut consumer) =
            rtrb::RingBuffer::<Sample>::new(ring_capacity(self.sample_rate, self.channels));
        let device_name = self.device_name.clone();

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        // Underrun plays silence
                        *sample = consumer.pop().unwrap_or(0.0);
                    }
                },
                move |err| {
                    log::error!("Playback stream error on {}: {}", device_name, err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!(
            "Playback opened on {}: {} channels, {}Hz",
            self.device_name,
            self.channels,
            self.sample_rate
        );
        self.active = Some((StreamGuard(stream), producer));
        Ok(())
    }

    fn close(&mut self) {
        if self.active.take().is_some() {
            log::info!("Playback closed on {}", self.device_name);
        }
    }

    fn is_open(&self) -> bool {
        self.active.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, rate: u32) -> u32 {
        self.sample_rate = match self.device.supported_output_configs() {
            Ok(configs) => supported_rate(configs, self.channels, rate, self.default_rate),
            Err(_) => self.default_rate,
        };
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn set_channel_count(&mut self, channels: u16) -> u16 {
        let supported = self
            .device
            .supported_output_configs()
            .map(|mut configs| configs.any(|c| c.channels() == channels))
            .unwrap_or(false);
        if supported {
            self.channels = channels;
        }
        self.channels
    }

    fn buffer_spec(&self, frames: usize) -> BufferSpec {
        BufferSpec::new(SampleOrg::Interleaved, self.channels, SampleFormat::F32, frames)
    }
}

impl Writable for CpalOutput {
    fn write(&mut self, buffer: &AudioBuffer) -> AudioResult<usize> {
        let Some((_, producer)) = self.active.as_mut() else {
            return Err(AudioError::StreamClosed(self.device_name.clone()));
        };
        let needed = buffer.frames() * buffer.channels();
        self.scratch.resize(needed, 0.0);
        buffer.store_interleaved(&mut self.scratch)?;

        let started = Instant::now();
        while producer.slots() < needed {
            if started.elapsed() > IO_TIMEOUT {
                return Err(AudioError::Io(format!(
                    "{}: playback stalled for {:?}",
                    self.device_name, IO_TIMEOUT
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        for sample in &self.scratch {
            if producer.push(*sample).is_err() {
                break;
            }
        }
        Ok(buffer.frames())
    }
}

/// A cpal device with at most one capture and one playback stream
pub struct CpalDevice {
    name: String,
    full_name: String,
    input: Option<(StreamInfo, Arc<Mutex<CpalInput>>)>,
    output: Option<(StreamInfo, Arc<Mutex<CpalOutput>>)>,
}

impl Device for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn input_streams(&self) -> Vec<StreamInfo> {
        self.input.iter().map(|(info, _)| info.clone()).collect()
    }

    fn output_streams(&self) -> Vec<StreamInfo> {
        self.output.iter().map(|(info, _)| info.clone()).collect()
    }

    fn input_stream(&self, id: StreamId) -> Option<InputHandle> {
        self.input
            .as_ref()
            .filter(|(info, _)| info.id == id)
            .map(|(_, stream)| Arc::clone(stream) as InputHandle)
    }

    fn output_stream(&self, id: StreamId) -> Option<OutputHandle> {
        self.output
            .as_ref()
            .filter(|(info, _)| info.id == id)
            .map(|(_, stream)| Arc::clone(stream) as OutputHandle)
    }

    fn close_all(&self) {
        if let Some((_, stream)) = &self.input {
            lock(stream).close();
        }
        if let Some((_, stream)) = &self.output {
            lock(stream).close();
        }
    }
}

/// Driver enumerating every available cpal host
#[derive(Default)]
pub struct CpalDriver;

impl CpalDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for CpalDriver {
    fn name(&self) -> &str {
        "cpal"
    }

    fn detect(&mut self) -> AudioResult<Vec<Box<dyn Device>>> {
        let mut devices: Vec<Box<dyn Device>> = Vec::new();

        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(h) => h,
                Err(e) => {
                    log::debug!("Could not initialize host {:?}: {}", host_id, e);
                    continue;
                }
            };
            let host_label = host_name(host_id);

            let devices_iter = match host.devices() {
                Ok(d) => d,
                Err(e) => {
                    log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                    continue;
                }
            };

            for (index, device) in devices_iter.enumerate() {
                let full_name = match device.name() {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                let name = format!("{}:{}", host_label.to_lowercase(), index);

                let input = device.default_input_config().ok().map(|config| {
                    let stream = CpalInput::new(device.clone(), name.clone(), config);
                    (stream.info(), Arc::new(Mutex::new(stream)))
                });
                let output = device.default_output_config().ok().map(|config| {
                    let stream = CpalOutput::new(device.clone(), name.clone(), config);
                    (stream.info(), Arc::new(Mutex::new(stream)))
                });
                if input.is_none() && output.is_none() {
                    continue;
                }

                devices.push(Box::new(CpalDevice {
                    name,
                    full_name: format!("[{}] {}", host_label, full_name),
                    input,
                    output,
                }));
            }
        }

        if devices.is_empty() {
            return Err(AudioError::NoDevices);
        }
        Ok(devices)
    }
}
