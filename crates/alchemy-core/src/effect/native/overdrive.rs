//! Overdrive effect - tanh soft clipper

use crate::effect::{delegate_to_base, Effect, EffectBase, EffectInfo, Param, ProcessContext};
use crate::types::Direction;

const DRIVE: u32 = 0;
const LEVEL: u32 = 1;

/// Soft-clipping overdrive
///
/// `out = level * tanh(drive * in) / tanh(drive)`, so a full-scale input
/// stays at full scale before `level` regardless of drive.
///
/// Parameters:
/// - drive: Pre-gain into the clipper (1-50, logarithmic)
/// - level: Output level (0-1)
pub struct OverdriveEffect {
    base: EffectBase,
}

impl OverdriveEffect {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        let info = EffectInfo::new("Overdrive", "distortion", sample_rate)
            .with_ports(Direction::Input, "In", channels)
            .with_ports(Direction::Output, "Out", channels)
            .with_param(Param::new("drive", 5.0).with_range(1.0, 50.0).logarithmic())
            .with_param(Param::new("level", 0.5).with_range(0.0, 1.0));

        Self {
            base: EffectBase::new(info),
        }
    }
}

delegate_to_base!(OverdriveEffect);

impl Effect for OverdriveEffect {
    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let drive = self.base.value(DRIVE);
        let level = self.base.value(LEVEL);
        let norm = level / drive.tanh();
        let frames = ctx.frames;

        for (out, input) in ctx.outputs.iter_mut().zip(ctx.inputs) {
            for (o, i) in out[..frames].iter_mut().zip(&input[..frames]) {
                *o = (drive * *i).tanh() * norm;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Parameterized;

    #[test]
    fn test_output_is_bounded_by_level() {
        let mut effect = OverdriveEffect::new(1, 48000);
        effect.set_param(DRIVE, 50.0);
        effect.set_param(LEVEL, 0.8);

        let input = vec![vec![-4.0, -1.0, 0.0, 0.01, 1.0, 4.0]];
        let mut output = vec![vec![0.0; 6]];
        effect.process(&mut ProcessContext {
            frames: 6,
            inputs: &input,
            outputs: &mut output,
        });

        assert!(output[0].iter().all(|s| s.abs() <= 0.8 + 1e-6));
        assert!((output[0][4] - 0.8).abs() < 1e-4);
        assert_eq!(output[0][2], 0.0);
        // Small signals are amplified by the drive
        assert!(output[0][3] > 0.01);
    }
}
