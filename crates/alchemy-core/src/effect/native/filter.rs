//! Tone filter - state-variable low/high/band pass

use serde::{Deserialize, Serialize};

use crate::effect::{
    delegate_to_base, Effect, EffectBase, EffectInfo, Param, ParamKind, ProcessContext,
};
use crate::types::Direction;

const CUTOFF: u32 = 0;
const RESONANCE: u32 = 1;
const MODE: u32 = 2;

/// Which SVF output the filter emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    LowPass = 0,
    HighPass = 1,
    BandPass = 2,
}

impl FilterMode {
    fn from_value(value: f32) -> Self {
        match value.round() as i32 {
            1 => FilterMode::HighPass,
            2 => FilterMode::BandPass,
            _ => FilterMode::LowPass,
        }
    }
}

/// Two-pole (12dB/octave) state-variable filter coefficients
#[derive(Debug, Clone, Copy, Default)]
struct SvfCoefficients {
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl SvfCoefficients {
    fn new(cutoff: f32, q: f32, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff = cutoff.clamp(20.0, nyquist * 0.99);
        let q = q.clamp(0.1, 10.0);

        let g = (std::f32::consts::PI * cutoff / sample_rate as f32).tan();
        let k = 1.0 / q;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        Self { k, a1, a2, a3 }
    }
}

/// Integrator state of one channel
#[derive(Debug, Clone, Copy, Default)]
struct SvfState {
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfState {
    /// Process one sample and return (lowpass, highpass, bandpass)
    #[inline]
    fn process(&mut self, c: &SvfCoefficients, input: f32) -> (f32, f32, f32) {
        let v3 = input - self.ic2eq;
        let v1 = c.a1 * self.ic1eq + c.a2 * v3;
        let v2 = self.ic2eq + c.a2 * self.ic1eq + c.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        let low = v2;
        let band = v1;
        let high = input - c.k * band - low;
        (low, high, band)
    }
}

/// Tone filter
///
/// Parameters:
/// - cutoff: Cutoff frequency in Hz (logarithmic)
/// - resonance: Filter resonance (Q)
/// - mode: 0 = low pass, 1 = high pass, 2 = band pass
pub struct FilterEffect {
    base: EffectBase,
    states: Vec<SvfState>,
    coefficients: SvfCoefficients,
    /// (cutoff, q) the coefficients were computed for
    tuned: (f32, f32),
}

impl FilterEffect {
    /// Create a new filter effect
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        let info = EffectInfo::new("Tone Filter", "other", sample_rate)
            .with_ports(Direction::Input, "In", channels)
            .with_ports(Direction::Output, "Out", channels)
            .with_param(
                Param::new("cutoff", 2000.0)
                    .with_range(20.0, 20000.0)
                    .logarithmic()
                    .with_unit("Hz"),
            )
            .with_param(Param::new("resonance", 0.707).with_range(0.5, 10.0).with_unit("Q"))
            .with_param(
                Param::new("mode", 0.0)
                    .with_range(0.0, 2.0)
                    .with_kind(ParamKind::Integer),
            );

        Self {
            base: EffectBase::new(info),
            states: vec![SvfState::default(); channels],
            coefficients: SvfCoefficients::new(2000.0, 0.707, sample_rate),
            tuned: (2000.0, 0.707),
        }
    }

    pub fn mode(&self) -> FilterMode {
        FilterMode::from_value(self.base.value(MODE))
    }

    fn retune(&mut self) {
        let target = (self.base.value(CUTOFF), self.base.value(RESONANCE));
        if target != self.tuned {
            self.coefficients = SvfCoefficients::new(target.0, target.1, self.base.info().sample_rate);
            self.tuned = target;
        }
    }
}

delegate_to_base!(FilterEffect);

impl Effect for FilterEffect {
    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        self.retune();
        let mode = self.mode();
        let coefficients = self.coefficients;
        let frames = ctx.frames;

        for ((state, out), input) in self.states.iter_mut().zip(ctx.outputs.iter_mut()).zip(ctx.inputs) {
            for (o, i) in out[..frames].iter_mut().zip(&input[..frames]) {
                let (low, high, band) = state.process(&coefficients, *i);
                *o = match mode {
                    FilterMode::LowPass => low,
                    FilterMode::HighPass => high,
                    FilterMode::BandPass => band,
                };
            }
        }
    }

    fn deactivate(&mut self) {
        self.states.fill(SvfState::default());
    }
}
