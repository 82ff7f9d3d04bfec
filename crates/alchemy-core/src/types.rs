//! Common types for Alchemy
//!
//! Identifiers and constants shared by the processing engine and the
//! control server.

use serde::{Deserialize, Serialize};

/// Default sample rate used when a stream does not dictate one
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default processing buffer size in frames
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Largest buffer size the processing thread accepts
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Number of client slots the server keeps
pub const CLIENTS_MAX: usize = 5;

/// Maximum number of channels the Output sentinel accepts from the last effect
pub const MAX_OUTPUT_MIX_CHANNELS: usize = 2;

/// Audio sample type used inside the processing graph
pub type Sample = f32;

/// Identifier of a client connection (0 = server)
pub type ChannelId = u32;

/// Identifier of a stream inside its device
pub type StreamId = u32;

/// Stable identifier of an effect inside a chain
///
/// Interior effects are numbered from 1 upward in insertion order and keep
/// their id until removed. The two sentinels use reserved ids: Input is
/// always `0` and Output is always `u32::MAX` (4294967295 on the wire),
/// whatever the chain length, so an Output id never shifts when effects
/// are added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(pub u32);

impl EffectId {
    /// The Input sentinel (wraps the capture stream)
    pub const INPUT: EffectId = EffectId(0);
    /// The Output sentinel (wraps the playback stream)
    pub const OUTPUT: EffectId = EffectId(u32::MAX);

    /// Whether this id names one of the two sentinels
    pub fn is_sentinel(self) -> bool {
        self == Self::INPUT || self == Self::OUTPUT
    }
}

impl std::fmt::Display for EffectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::INPUT => write!(f, "input"),
            Self::OUTPUT => write!(f, "output"),
            EffectId(id) => write!(f, "#{}", id),
        }
    }
}

/// Direction of a stream or port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ids() {
        assert!(EffectId::INPUT.is_sentinel());
        assert!(EffectId::OUTPUT.is_sentinel());
        assert!(!EffectId(1).is_sentinel());
        assert_eq!(EffectId(7).to_string(), "#7");
        assert_eq!(EffectId::OUTPUT.to_string(), "output");
        assert_eq!(EffectId::INPUT.0, 0);
        assert_eq!(EffectId::OUTPUT.0, 4294967295);
    }

    #[test]
    fn test_direction_serializes_uppercase() {
        let json = serde_json::to_string(&Direction::Output).unwrap();
        assert_eq!(json, "\"OUTPUT\"");
        let dir: Direction = serde_json::from_str("\"INPUT\"").unwrap();
        assert_eq!(dir, Direction::Input);
    }
}
