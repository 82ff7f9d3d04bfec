//! Channel-adapting mixer
//!
//! Maps N input channels onto M output channels with a single `volume`
//! parameter:
//! - N == M: `out[j] = vol * in[j]`
//! - N >  M: `out[j] = vol * (in[j] + in[j+1]) / 2` (downmix)
//! - N <  M: `out[j] = vol * in[0]` (upmix by broadcast)
//!
//! The chain's Input and Output sentinels are mixers. For them the channel
//! counts come from the buffers handed to `process` (i.e. the stream's
//! actual channel count), not from the declared ports.

use super::{delegate_to_base, Effect, EffectBase, EffectInfo, Param, ProcessContext};
use crate::types::{Direction, Sample};

/// Parameter id of the volume
pub const VOLUME: u32 = 0;

/// Volume-scaled channel mixer
pub struct MixerEffect {
    base: EffectBase,
}

impl MixerEffect {
    /// Create a mixer declaring `inputs` input and `outputs` output ports
    pub fn new(name: &str, inputs: usize, outputs: usize, sample_rate: u32) -> Self {
        let info = EffectInfo::new(name, "utility", sample_rate)
            .with_ports(Direction::Input, "In", inputs)
            .with_ports(Direction::Output, "Out", outputs)
            .with_param(Param::new("volume", 1.0).with_range(0.0, 4.0));
        Self {
            base: EffectBase::new(info),
        }
    }

    /// Mix `inputs` into `outputs` over `frames` frames
    pub fn mix(volume: Sample, frames: usize, inputs: &[Vec<Sample>], outputs: &mut [Vec<Sample>]) {
        let n_in = inputs.len();
        let n_out = outputs.len();

        if n_in == 0 {
            for out in outputs.iter_mut() {
                out[..frames].fill(0.0);
            }
            return;
        }

        for (j, out) in outputs.iter_mut().enumerate() {
            let out = &mut out[..frames];
            if n_in == n_out {
                for (o, i) in out.iter_mut().zip(&inputs[j][..frames]) {
                    *o = volume * *i;
                }
            } else if n_in > n_out {
                let a = &inputs[j][..frames];
                let b = &inputs[(j + 1).min(n_in - 1)][..frames];
                for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
                    *o = volume * (*x + *y) / 2.0;
                }
            } else {
                for (o, i) in out.iter_mut().zip(&inputs[0][..frames]) {
                    *o = volume * *i;
                }
            }
        }
    }

    pub fn volume(&self) -> Sample {
        self.base.value(VOLUME)
    }
}

delegate_to_base!(MixerEffect);

impl Effect for MixerEffect {
    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        Self::mix(self.volume(), ctx.frames, ctx.inputs, ctx.outputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{Parameterized, Portable};

    fn run(mixer: &mut MixerEffect, inputs: Vec<Vec<Sample>>, outputs: usize) -> Vec<Vec<Sample>> {
        let frames = inputs[0].len();
        let mut out = vec![vec![9.0; frames]; outputs];
        mixer.process(&mut ProcessContext {
            frames,
            inputs: &inputs,
            outputs: &mut out,
        });
        out
    }

    #[test]
    fn test_unity_is_identity() {
        let mut mixer = MixerEffect::new("mix", 2, 2, 48000);
        let out = run(&mut mixer, vec![vec![0.1, 0.2], vec![-0.3, 0.4]], 2);
        assert_eq!(out, vec![vec![0.1, 0.2], vec![-0.3, 0.4]]);
    }

    #[test]
    fn test_downmix_averages_pairs() {
        let mut mixer = MixerEffect::new("mix", 2, 1, 48000);
        mixer.set_param(VOLUME, 2.0);
        let out = run(&mut mixer, vec![vec![1.0, 0.5], vec![0.0, -0.5]], 1);
        assert_eq!(out, vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn test_upmix_broadcasts_first_channel() {
        let mut mixer = MixerEffect::new("mix", 1, 3, 48000);
        mixer.set_param(VOLUME, 0.5);
        let out = run(&mut mixer, vec![vec![1.0, -1.0]], 3);
        for channel in out {
            assert_eq!(channel, vec![0.5, -0.5]);
        }
    }

    #[test]
    fn test_counts_come_from_buffers() {
        // Declared 1→1 but handed 2→1: downmix formula applies
        let mut mixer = MixerEffect::new("mix", 1, 1, 48000);
        assert_eq!(mixer.input_count(), 1);
        let out = run(&mut mixer, vec![vec![0.2], vec![0.4]], 1);
        assert!((out[0][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_no_inputs_is_silence() {
        let mut out = vec![vec![1.0; 4]; 2];
        MixerEffect::mix(1.0, 4, &[], &mut out);
        assert!(out.iter().flatten().all(|s| *s == 0.0));
    }

    #[test]
    fn test_only_frames_are_written() {
        let inputs = vec![vec![1.0; 4]];
        let mut out = vec![vec![9.0; 4]];
        MixerEffect::mix(1.0, 2, &inputs, &mut out);
        assert_eq!(out[0], vec![1.0, 1.0, 9.0, 9.0]);
    }
}
