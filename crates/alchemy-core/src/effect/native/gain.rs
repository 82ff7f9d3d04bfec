//! Gain effect - Simple volume control

use crate::effect::{delegate_to_base, Effect, EffectBase, EffectInfo, Param, ProcessContext};
use crate::types::Direction;

/// A simple gain (volume) effect
///
/// Parameters:
/// - gain: Volume multiplier (0.0 = silence, 1.0 = unity, 4.0 = +12dB)
pub struct GainEffect {
    base: EffectBase,
}

impl GainEffect {
    /// Create a new gain effect
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        let info = EffectInfo::new("Gain", "utility", sample_rate)
            .with_ports(Direction::Input, "In", channels)
            .with_ports(Direction::Output, "Out", channels)
            .with_param(
                Param::new("gain", 1.0)
                    .with_range(0.0, 4.0)
                    .with_unit("×"),
            );

        Self {
            base: EffectBase::new(info),
        }
    }

    /// Get the current gain value
    fn gain(&self) -> f32 {
        self.base.value(0)
    }
}

delegate_to_base!(GainEffect);

impl Effect for GainEffect {
    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let gain = self.gain();
        let frames = ctx.frames;
        for (out, input) in ctx.outputs.iter_mut().zip(ctx.inputs) {
            for (o, i) in out[..frames].iter_mut().zip(&input[..frames]) {
                *o = *i * gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Parameterized;

    #[test]
    fn test_gain_default_is_unity() {
        let mut effect = GainEffect::new(1, 48000);
        let inputs = vec![vec![1.0, 0.5, -0.25]];
        let mut outputs = vec![vec![0.0; 3]];
        effect.process(&mut ProcessContext {
            frames: 3,
            inputs: &inputs,
            outputs: &mut outputs,
        });
        assert_eq!(outputs, inputs);
    }

    #[test]
    fn test_gain_half() {
        let mut effect = GainEffect::new(2, 48000);
        effect.set_param(0, 0.5);

        let inputs = vec![vec![1.0, 1.0], vec![-1.0, 0.0]];
        let mut outputs = vec![vec![0.0; 2]; 2];
        effect.process(&mut ProcessContext {
            frames: 2,
            inputs: &inputs,
            outputs: &mut outputs,
        });
        assert_eq!(outputs, vec![vec![0.5, 0.5], vec![-0.5, 0.0]]);
    }
}
