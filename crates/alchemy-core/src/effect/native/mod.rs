//! Native Rust effects
//!
//! These effects are implemented directly in Rust and process any number
//! of channels (N in, N out).

mod delay;
mod filter;
mod gain;
mod overdrive;

pub use delay::DelayEffect;
pub use filter::{FilterEffect, FilterMode};
pub use gain::GainEffect;
pub use overdrive::OverdriveEffect;

use super::Effect;

/// Identifiers accepted by [`create`]
pub const NATIVE_EFFECTS: &[&str] = &["gain", "delay", "filter", "overdrive"];

/// Instantiate a native effect by identifier
pub fn create(id: &str, channels: usize, sample_rate: u32) -> Option<Box<dyn Effect>> {
    let effect: Box<dyn Effect> = match id {
        "gain" => Box::new(GainEffect::new(channels, sample_rate)),
        "delay" => Box::new(DelayEffect::new(channels, sample_rate)),
        "filter" => Box::new(FilterEffect::new(channels, sample_rate)),
        "overdrive" => Box::new(OverdriveEffect::new(channels, sample_rate)),
        _ => return None,
    };
    Some(effect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Portable;

    #[test]
    fn test_create_every_native_effect() {
        for id in NATIVE_EFFECTS {
            let effect = create(id, 2, 48000).unwrap();
            assert_eq!(effect.input_count(), 2, "{}", id);
            assert_eq!(effect.output_count(), 2, "{}", id);
            assert_eq!(effect.sample_rate(), 48000);
        }
        assert!(create("reverb", 1, 48000).is_none());
    }
}
