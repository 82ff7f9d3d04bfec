//! Delay effect
//!
//! A per-channel echo with:
//! - Delay time (ms)
//! - Feedback control
//! - Dry/wet mix

use crate::effect::{delegate_to_base, Effect, EffectBase, EffectInfo, Param, ProcessContext};
use crate::types::Direction;

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f32 = 2.0;

const TIME: u32 = 0;
const FEEDBACK: u32 = 1;
const MIX: u32 = 2;

/// Single-channel delay line
struct DelayLine {
    buffer: Vec<f32>,
    /// Write position
    write_pos: usize,
}

impl DelayLine {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            write_pos: 0,
        }
    }

    /// Process one sample through the delay with feedback, returning the
    /// delayed sample
    #[inline]
    fn process(&mut self, input: f32, delay_samples: usize, feedback: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.clamp(1, len - 1);
        let read_pos = (self.write_pos + len - delay) % len;
        let delayed = self.buffer[read_pos];

        self.buffer[self.write_pos] = input + delayed * feedback;
        self.write_pos = (self.write_pos + 1) % len;
        delayed
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Echo effect with one delay line per channel
///
/// Parameters:
/// - time: Delay time in ms (10-2000ms)
/// - feedback: Amount of signal fed back (0-95%)
/// - mix: Dry/wet balance (0 = dry, 1 = wet)
pub struct DelayEffect {
    base: EffectBase,
    lines: Vec<DelayLine>,
}

impl DelayEffect {
    /// Create a new delay effect
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        let info = EffectInfo::new("Delay", "ambient", sample_rate)
            .with_ports(Direction::Input, "In", channels)
            .with_ports(Direction::Output, "Out", channels)
            .with_param(Param::new("time", 350.0).with_range(10.0, 2000.0).with_unit("ms"))
            .with_param(Param::new("feedback", 0.4).with_range(0.0, 0.95))
            .with_param(Param::new("mix", 0.3).with_range(0.0, 1.0));

        let length = (sample_rate as f32 * MAX_DELAY_SECONDS) as usize + 1;
        Self {
            base: EffectBase::new(info),
            lines: (0..channels).map(|_| DelayLine::new(length)).collect(),
        }
    }

    fn delay_samples(&self) -> usize {
        (self.base.value(TIME) * self.base.info().sample_rate as f32 / 1000.0).round() as usize
    }
}

delegate_to_base!(DelayEffect);

impl Effect for DelayEffect {
    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let delay = self.delay_samples();
        let feedback = self.base.value(FEEDBACK);
        let mix = self.base.value(MIX);
        let dry = 1.0 - mix;
        let frames = ctx.frames;

        for ((line, out), input) in self.lines.iter_mut().zip(ctx.outputs.iter_mut()).zip(ctx.inputs) {
            for (o, i) in out[..frames].iter_mut().zip(&input[..frames]) {
                let delayed = line.process(*i, delay, feedback);
                *o = *i * dry + delayed * mix;
            }
        }
    }

    fn deactivate(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }
}
