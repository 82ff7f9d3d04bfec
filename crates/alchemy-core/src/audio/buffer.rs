//! Sample buffers exchanged with audio drivers
//!
//! Drivers read and write raw bytes in whatever layout the hardware speaks.
//! The processing graph only ever sees planar `f32`. An [`AudioBuffer`]
//! keeps both representations: the driver negotiates a [`BufferSpec`],
//! fills the raw planes, and the pipe calls [`AudioBuffer::decode`] /
//! [`AudioBuffer::encode`] to move between them.
//!
//! Integer conversions:
//! - signed, width `w`: `f = 2·i / 2^w`, `i = f · 2^w / 2`
//! - unsigned, width `w`: `f = -1 + 2·u / (2^w - 1)`, `u = (f + 1)(2^w - 1) / 2`

use serde::{Deserialize, Serialize};

use super::error::{AudioError, AudioResult};
use crate::types::{Sample, MAX_BUFFER_SIZE};

/// Raw sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    S16Le,
    S16Be,
    /// Packed 24-bit (3 bytes per sample)
    S24Le,
    S24Be,
    S32Le,
    S32Be,
    /// Native-endian 32-bit float
    F32,
    /// Native-endian 64-bit float
    F64,
}

impl SampleFormat {
    /// Native-endian signed 16-bit
    pub const S16: SampleFormat = if cfg!(target_endian = "big") {
        SampleFormat::S16Be
    } else {
        SampleFormat::S16Le
    };

    /// Native-endian packed signed 24-bit
    pub const S24: SampleFormat = if cfg!(target_endian = "big") {
        SampleFormat::S24Be
    } else {
        SampleFormat::S24Le
    };

    /// Native-endian signed 32-bit
    pub const S32: SampleFormat = if cfg!(target_endian = "big") {
        SampleFormat::S32Be
    } else {
        SampleFormat::S32Le
    };

    /// Size of one sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
            SampleFormat::S24Le | SampleFormat::S24Be => 3,
            SampleFormat::S32Le | SampleFormat::S32Be | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

/// Sample organization in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrg {
    /// One plane, frames of `channels` samples
    Interleaved,
    /// One plane per channel
    NonInterleaved,
}

/// Layout requested from (and accepted by) a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpec {
    pub organization: SampleOrg,
    pub channels: u16,
    pub format: SampleFormat,
    pub frames: usize,
}

impl BufferSpec {
    pub fn new(organization: SampleOrg, channels: u16, format: SampleFormat, frames: usize) -> Self {
        Self {
            organization,
            channels,
            format,
            frames,
        }
    }

    /// Planar float layout, which needs no conversion beyond a copy
    pub fn float_planar(channels: u16, frames: usize) -> Self {
        Self::new(SampleOrg::NonInterleaved, channels, SampleFormat::F32, frames)
    }

    fn validate(&self) -> AudioResult<()> {
        if self.channels == 0 {
            return Err(AudioError::BufferError("zero channels requested".into()));
        }
        if self.frames == 0 || self.frames > MAX_BUFFER_SIZE {
            return Err(AudioError::BufferError(format!(
                "buffer size {} outside 1..={}",
                self.frames, MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }
}

/// A driver-facing sample buffer with a planar float mirror
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    spec: BufferSpec,
    allocated: bool,
    /// One plane when interleaved, one per channel otherwise
    raw: Vec<Vec<u8>>,
    planar: Vec<Vec<Sample>>,
}

impl AudioBuffer {
    /// Create an unallocated buffer with the given requested layout
    pub fn new(spec: BufferSpec) -> Self {
        Self {
            spec,
            allocated: false,
            raw: Vec::new(),
            planar: Vec::new(),
        }
    }

    /// Create and allocate in one step
    pub fn allocated(spec: BufferSpec) -> AudioResult<Self> {
        let mut buffer = Self::new(spec);
        buffer.alloc()?;
        Ok(buffer)
    }

    /// The current layout
    pub fn spec(&self) -> BufferSpec {
        self.spec
    }

    /// Replace the requested layout; the buffer must be allocated again
    pub fn request(&mut self, spec: BufferSpec) {
        if spec != self.spec {
            self.spec = spec;
            self.allocated = false;
        }
    }

    /// Allocate storage for the current layout
    pub fn alloc(&mut self) -> AudioResult<()> {
        self.spec.validate()?;
        let channels = self.spec.channels as usize;
        let frames = self.spec.frames;
        let bps = self.spec.format.bytes_per_sample();

        self.raw = match self.spec.organization {
            SampleOrg::Interleaved => vec![vec![0u8; frames * channels * bps]],
            SampleOrg::NonInterleaved => vec![vec![0u8; frames * bps]; channels],
        };
        self.planar = vec![vec![0.0; frames]; channels];
        self.allocated = true;
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Zero both representations
    pub fn clear(&mut self) {
        // 0x80 is silence for unsigned samples
        let silence = if self.spec.format == SampleFormat::U8 { 0x80 } else { 0 };
        for plane in &mut self.raw {
            plane.fill(silence);
        }
        for channel in &mut self.planar {
            channel.fill(0.0);
        }
    }

    pub fn frames(&self) -> usize {
        self.spec.frames
    }

    pub fn channels(&self) -> usize {
        self.spec.channels as usize
    }

    pub fn format(&self) -> SampleFormat {
        self.spec.format
    }

    pub fn organization(&self) -> SampleOrg {
        self.spec.organization
    }

    /// Raw byte planes as delivered by or handed to the driver
    pub fn raw_planes(&self) -> &[Vec<u8>] {
        &self.raw
    }

    pub fn raw_planes_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.raw
    }

    /// Planar float samples (one `Vec` per channel)
    pub fn planar(&self) -> &[Vec<Sample>] {
        &self.planar
    }

    pub fn planar_mut(&mut self) -> &mut [Vec<Sample>] {
        &mut self.planar
    }

    /// Convert raw samples into the planar float mirror
    pub fn decode(&mut self) -> AudioResult<()> {
        self.ensure_allocated()?;
        let format = self.spec.format;
        let bps = format.bytes_per_sample();
        let channels = self.channels();

        match self.spec.organization {
            SampleOrg::Interleaved => {
                let plane = &self.raw[0];
                for (frame, chunk) in plane.chunks_exact(bps * channels).enumerate() {
                    for (ch, bytes) in chunk.chunks_exact(bps).enumerate() {
                        self.planar[ch][frame] = decode_sample(format, bytes);
                    }
                }
            }
            SampleOrg::NonInterleaved => {
                for (plane, out) in self.raw.iter().zip(self.planar.iter_mut()) {
                    for (sample, bytes) in out.iter_mut().zip(plane.chunks_exact(bps)) {
                        *sample = decode_sample(format, bytes);
                    }
                }
            }
        }
        Ok(())
    }

    /// Convert the planar float mirror back into raw samples
    pub fn encode(&mut self) -> AudioResult<()> {
        self.ensure_allocated()?;
        let format = self.spec.format;
        let bps = format.bytes_per_sample();
        let channels = self.channels();

        match self.spec.organization {
            SampleOrg::Interleaved => {
                let plane = &mut self.raw[0];
                for (frame, chunk) in plane.chunks_exact_mut(bps * channels).enumerate() {
                    for (ch, bytes) in chunk.chunks_exact_mut(bps).enumerate() {
                        encode_sample(format, self.planar[ch][frame], bytes);
                    }
                }
            }
            SampleOrg::NonInterleaved => {
                for (plane, input) in self.raw.iter_mut().zip(self.planar.iter()) {
                    for (bytes, sample) in plane.chunks_exact_mut(bps).zip(input.iter()) {
                        encode_sample(format, *sample, bytes);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fill the raw planes from interleaved floats (driver side)
    ///
    /// Missing samples are treated as silence.
    pub fn load_interleaved(&mut self, samples: &[Sample]) -> AudioResult<()> {
        self.ensure_allocated()?;
        let format = self.spec.format;
        let bps = format.bytes_per_sample();
        let channels = self.channels();

        for frame in 0..self.spec.frames {
            for ch in 0..channels {
                let value = samples.get(frame * channels + ch).copied().unwrap_or(0.0);
                let offset = self.raw_offset(frame, ch, bps);
                let plane = self.plane_index(ch);
                encode_sample(format, value, &mut self.raw[plane][offset..offset + bps]);
            }
        }
        Ok(())
    }

    /// Copy the raw planes out as interleaved floats (driver side)
    pub fn store_interleaved(&self, out: &mut [Sample]) -> AudioResult<()> {
        self.ensure_allocated()?;
        let format = self.spec.format;
        let bps = format.bytes_per_sample();
        let channels = self.channels();

        for frame in 0..self.spec.frames {
            for ch in 0..channels {
                let Some(slot) = out.get_mut(frame * channels + ch) else {
                    return Ok(());
                };
                let offset = self.raw_offset(frame, ch, bps);
                let plane = &self.raw[self.plane_index(ch)];
                *slot = decode_sample(format, &plane[offset..offset + bps]);
            }
        }
        Ok(())
    }

    fn ensure_allocated(&self) -> AudioResult<()> {
        if self.allocated {
            Ok(())
        } else {
            Err(AudioError::BufferError("buffer used before allocation".into()))
        }
    }

    fn plane_index(&self, ch: usize) -> usize {
        match self.spec.organization {
            SampleOrg::Interleaved => 0,
            SampleOrg::NonInterleaved => ch,
        }
    }

    fn raw_offset(&self, frame: usize, ch: usize, bps: usize) -> usize {
        match self.spec.organization {
            SampleOrg::Interleaved => (frame * self.channels() + ch) * bps,
            SampleOrg::NonInterleaved => frame * bps,
        }
    }
}

fn signed_to_float(value: i64, width: u32) -> Sample {
    (2.0 * value as f64 / (1u64 << width) as f64) as Sample
}

fn float_to_signed(value: Sample, width: u32) -> i64 {
    let half = (1u64 << width) as f64 / 2.0;
    (value as f64 * half).clamp(-half, half - 1.0) as i64
}

fn unsigned_to_float(value: u64, width: u32) -> Sample {
    let max = ((1u64 << width) - 1) as f64;
    (-1.0 + 2.0 * value as f64 / max) as Sample
}

fn float_to_unsigned(value: Sample, width: u32) -> u64 {
    let max = ((1u64 << width) - 1) as f64;
    ((value as f64 + 1.0) * max / 2.0).clamp(0.0, max) as u64
}

/// Decode one sample; `bytes` holds exactly `bytes_per_sample` bytes
fn decode_sample(format: SampleFormat, b: &[u8]) -> Sample {
    match format {
        SampleFormat::U8 => unsigned_to_float(b[0] as u64, 8),
        SampleFormat::S16Le => signed_to_float(i16::from_le_bytes([b[0], b[1]]) as i64, 16),
        SampleFormat::S16Be => signed_to_float(i16::from_be_bytes([b[0], b[1]]) as i64, 16),
        SampleFormat::S24Le => {
            let v = (b[0] as i32) | ((b[1] as i32) << 8) | (((b[2] as i8) as i32) << 16);
            signed_to_float(v as i64, 24)
        }
        SampleFormat::S24Be => {
            let v = (b[2] as i32) | ((b[1] as i32) << 8) | (((b[0] as i8) as i32) << 16);
            signed_to_float(v as i64, 24)
        }
        SampleFormat::S32Le => {
            signed_to_float(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64, 32)
        }
        SampleFormat::S32Be => {
            signed_to_float(i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64, 32)
        }
        SampleFormat::F32 => f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
        SampleFormat::F64 => {
            f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as Sample
        }
    }
}

/// Encode one sample into `out` (exactly `bytes_per_sample` bytes)
fn encode_sample(format: SampleFormat, value: Sample, out: &mut [u8]) {
    match format {
        SampleFormat::U8 => out[0] = float_to_unsigned(value, 8) as u8,
        SampleFormat::S16Le => out.copy_from_slice(&(float_to_signed(value, 16) as i16).to_le_bytes()),
        SampleFormat::S16Be => out.copy_from_slice(&(float_to_signed(value, 16) as i16).to_be_bytes()),
        SampleFormat::S24Le => {
            let v = float_to_signed(value, 24) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        SampleFormat::S24Be => {
            let v = float_to_signed(value, 24) as i32;
            out.copy_from_slice(&v.to_be_bytes()[1..]);
        }
        SampleFormat::S32Le => out.copy_from_slice(&(float_to_signed(value, 32) as i32).to_le_bytes()),
        SampleFormat::S32Be => out.copy_from_slice(&(float_to_signed(value, 32) as i32).to_be_bytes()),
        SampleFormat::F32 => out.copy_from_slice(&value.to_ne_bytes()),
        SampleFormat::F64 => out.copy_from_slice(&(value as f64).to_ne_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_validates_layout() {
        let mut buffer = AudioBuffer::new(BufferSpec::float_planar(0, 64));
        assert!(buffer.alloc().is_err());

        buffer.request(BufferSpec::float_planar(2, MAX_BUFFER_SIZE + 1));
        assert!(buffer.alloc().is_err());

        buffer.request(BufferSpec::float_planar(2, 64));
        buffer.alloc().unwrap();
        assert_eq!(buffer.planar().len(), 2);
        assert_eq!(buffer.raw_planes().len(), 2);
        assert_eq!(buffer.raw_planes()[0].len(), 64 * 4);
    }

    #[test]
    fn test_decode_before_alloc_fails() {
        let mut buffer = AudioBuffer::new(BufferSpec::float_planar(1, 16));
        assert!(matches!(buffer.decode(), Err(AudioError::BufferError(_))));
    }

    #[test]
    fn test_s16_conversion_formulas() {
        let spec = BufferSpec::new(SampleOrg::Interleaved, 1, SampleFormat::S16Le, 4);
        let mut buffer = AudioBuffer::allocated(spec).unwrap();
        let values: [i16; 4] = [16384, -16384, i16::MIN, 0];
        for (i, v) in values.iter().enumerate() {
            buffer.raw_planes_mut()[0][i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        buffer.decode().unwrap();
        assert_eq!(buffer.planar()[0], vec![0.5, -0.5, -1.0, 0.0]);

        buffer.planar_mut()[0].copy_from_slice(&[0.25, 1.0, -1.0, 2.0]);
        buffer.encode().unwrap();
        let raw = &buffer.raw_planes()[0];
        let read = |i: usize| i16::from_le_bytes([raw[i * 2], raw[i * 2 + 1]]);
        assert_eq!(read(0), 8192);
        assert_eq!(read(1), i16::MAX); // clamped
        assert_eq!(read(2), i16::MIN);
        assert_eq!(read(3), i16::MAX);
    }

    #[test]
    fn test_s24_big_endian_sign_extension() {
        let spec = BufferSpec::new(SampleOrg::NonInterleaved, 1, SampleFormat::S24Be, 1);
        let mut buffer = AudioBuffer::allocated(spec).unwrap();
        // -2^22 in 24-bit two's complement = 0xC00000
        buffer.raw_planes_mut()[0].copy_from_slice(&[0xC0, 0x00, 0x00]);
        buffer.decode().unwrap();
        assert_eq!(buffer.planar()[0][0], -0.5);

        buffer.planar_mut()[0][0] = 0.5;
        buffer.encode().unwrap();
        assert_eq!(buffer.raw_planes()[0], vec![0x40, 0x00, 0x00]);
    }

    #[test]
    fn test_unsigned_conversion_formulas() {
        let spec = BufferSpec::new(SampleOrg::Interleaved, 1, SampleFormat::U8, 3);
        let mut buffer = AudioBuffer::allocated(spec).unwrap();
        buffer.raw_planes_mut()[0].copy_from_slice(&[0, 255, 51]);
        buffer.decode().unwrap();
        let planar = &buffer.planar()[0];
        assert_eq!(planar[0], -1.0);
        assert_eq!(planar[1], 1.0);
        assert!((planar[2] - (-0.6)).abs() < 1e-6);

        buffer.planar_mut()[0].copy_from_slice(&[-1.0, 1.0, 0.0]);
        buffer.encode().unwrap();
        assert_eq!(buffer.raw_planes()[0], vec![0, 255, 127]);
    }

    #[test]
    fn test_interleaved_roundtrip_keeps_channel_order() {
        let spec = BufferSpec::new(SampleOrg::Interleaved, 2, SampleFormat::F32, 3);
        let mut buffer = AudioBuffer::allocated(spec).unwrap();
        buffer
            .load_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3])
            .unwrap();
        buffer.decode().unwrap();
        assert_eq!(buffer.planar()[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(buffer.planar()[1], vec![-0.1, -0.2, -0.3]);

        let mut out = [0.0; 6];
        buffer.store_interleaved(&mut out).unwrap();
        assert_eq!(out, [0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn test_clear_unsigned_is_midpoint() {
        let spec = BufferSpec::new(SampleOrg::Interleaved, 1, SampleFormat::U8, 2);
        let mut buffer = AudioBuffer::allocated(spec).unwrap();
        buffer.clear();
        assert_eq!(buffer.raw_planes()[0], vec![0x80, 0x80]);
    }
}
