//! LADSPA C ABI
//!
//! Layout of `ladspa.h` (version 1.1) plus the port-hint helpers needed to
//! turn control ports into parameters.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_ulong};

use crate::effect::ParamKind;

pub type LadspaData = f32;
pub type LadspaHandle = *mut c_void;
pub type LadspaPortDescriptor = c_int;

/// `ladspa_descriptor(index)`, the only symbol a LADSPA library exports
pub type LadspaDescriptorFn = unsafe extern "C" fn(index: c_ulong) -> *const LadspaDescriptor;

pub const PORT_INPUT: c_int = 0x1;
pub const PORT_OUTPUT: c_int = 0x2;
pub const PORT_CONTROL: c_int = 0x4;
pub const PORT_AUDIO: c_int = 0x8;

pub const HINT_BOUNDED_BELOW: c_int = 0x1;
pub const HINT_BOUNDED_ABOVE: c_int = 0x2;
pub const HINT_TOGGLED: c_int = 0x4;
pub const HINT_SAMPLE_RATE: c_int = 0x8;
pub const HINT_LOGARITHMIC: c_int = 0x10;
pub const HINT_INTEGER: c_int = 0x20;

pub const HINT_DEFAULT_MASK: c_int = 0x3C0;
pub const HINT_DEFAULT_NONE: c_int = 0x0;
pub const HINT_DEFAULT_MINIMUM: c_int = 0x40;
pub const HINT_DEFAULT_LOW: c_int = 0x80;
pub const HINT_DEFAULT_MIDDLE: c_int = 0xC0;
pub const HINT_DEFAULT_HIGH: c_int = 0x100;
pub const HINT_DEFAULT_MAXIMUM: c_int = 0x140;
pub const HINT_DEFAULT_0: c_int = 0x200;
pub const HINT_DEFAULT_1: c_int = 0x240;
pub const HINT_DEFAULT_100: c_int = 0x280;
pub const HINT_DEFAULT_440: c_int = 0x2C0;

/// Bounds used when a port is not bounded on one side
const UNBOUNDED: f64 = 1.0e6;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LadspaPortRangeHint {
    pub hint_descriptor: c_int,
    pub lower_bound: LadspaData,
    pub upper_bound: LadspaData,
}

#[repr(C)]
pub struct LadspaDescriptor {
    pub unique_id: c_ulong,
    pub label: *const c_char,
    pub properties: c_int,
    pub name: *const c_char,
    pub maker: *const c_char,
    pub copyright: *const c_char,
    pub port_count: c_ulong,
    pub port_descriptors: *const LadspaPortDescriptor,
    pub port_names: *const *const c_char,
    pub port_range_hints: *const LadspaPortRangeHint,
    pub implementation_data: *mut c_void,
    pub instantiate:
        Option<unsafe extern "C" fn(descriptor: *const LadspaDescriptor, sample_rate: c_ulong) -> LadspaHandle>,
    pub connect_port:
        Option<unsafe extern "C" fn(instance: LadspaHandle, port: c_ulong, data: *mut LadspaData)>,
    pub activate: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
    pub run: Option<unsafe extern "C" fn(instance: LadspaHandle, sample_count: c_ulong)>,
    pub run_adding: Option<unsafe extern "C" fn(instance: LadspaHandle, sample_count: c_ulong)>,
    pub set_run_adding_gain: Option<unsafe extern "C" fn(instance: LadspaHandle, gain: LadspaData)>,
    pub deactivate: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
    pub cleanup: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
}

/// Parameter shape derived from a control port's range hint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub kind: ParamKind,
    pub logarithmic: bool,
}

/// Interpolate between the bounds, geometrically for logarithmic ports
fn blend(min: f64, max: f64, weight_max: f64, logarithmic: bool) -> f64 {
    if logarithmic && min > 0.0 && max > 0.0 {
        (min.ln() * (1.0 - weight_max) + max.ln() * weight_max).exp()
    } else {
        min * (1.0 - weight_max) + max * weight_max
    }
}

impl ControlRange {
    /// Derive range, kind, and default from a port hint
    pub fn from_hint(hint: &LadspaPortRangeHint, sample_rate: u32) -> Self {
        let d = hint.hint_descriptor;
        let has = |flag: c_int| d & flag != 0;
        let scale = if has(HINT_SAMPLE_RATE) {
            sample_rate as f64
        } else {
            1.0
        };

        let kind = if has(HINT_INTEGER) {
            ParamKind::Integer
        } else if has(HINT_TOGGLED) {
            ParamKind::Toggle
        } else if has(HINT_SAMPLE_RATE) {
            ParamKind::SampleRate
        } else {
            ParamKind::Continuous
        };
        let logarithmic = has(HINT_LOGARITHMIC);

        let (mut min, mut max) = if kind == ParamKind::Toggle {
            (0.0, 1.0)
        } else {
            (
                if has(HINT_BOUNDED_BELOW) {
                    hint.lower_bound as f64 * scale
                } else {
                    -UNBOUNDED
                },
                if has(HINT_BOUNDED_ABOVE) {
                    hint.upper_bound as f64 * scale
                } else {
                    UNBOUNDED
                },
            )
        };
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }

        let default = match d & HINT_DEFAULT_MASK {
            HINT_DEFAULT_MINIMUM => min,
            HINT_DEFAULT_LOW => blend(min, max, 0.25, logarithmic),
            HINT_DEFAULT_MIDDLE => blend(min, max, 0.5, logarithmic),
            HINT_DEFAULT_HIGH => blend(min, max, 0.75, logarithmic),
            HINT_DEFAULT_MAXIMUM => max,
            HINT_DEFAULT_0 => 0.0,
            HINT_DEFAULT_1 => 1.0,
            HINT_DEFAULT_100 => 100.0,
            HINT_DEFAULT_440 => 440.0,
            _ => {
                if has(HINT_BOUNDED_BELOW) {
                    min
                } else if has(HINT_BOUNDED_ABOVE) {
                    max.min(0.0)
                } else {
                    0.0
                }
            }
        };

        let default = match kind {
            ParamKind::Integer => default.round(),
            _ => default,
        };

        Self {
            min,
            max,
            default: default.clamp(min, max),
            kind,
            logarithmic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(d: c_int, lo: f32, hi: f32) -> LadspaPortRangeHint {
        LadspaPortRangeHint {
            hint_descriptor: d,
            lower_bound: lo,
            upper_bound: hi,
        }
    }

    const BOUNDED: c_int = HINT_BOUNDED_BELOW | HINT_BOUNDED_ABOVE;

    #[test]
    fn test_default_positions() {
        let low = ControlRange::from_hint(&hint(BOUNDED | HINT_DEFAULT_LOW, 0.0, 4.0), 48000);
        assert_eq!(low.default, 1.0);
        let mid = ControlRange::from_hint(&hint(BOUNDED | HINT_DEFAULT_MIDDLE, 0.0, 4.0), 48000);
        assert_eq!(mid.default, 2.0);
        let high = ControlRange::from_hint(&hint(BOUNDED | HINT_DEFAULT_HIGH, 0.0, 4.0), 48000);
        assert_eq!(high.default, 3.0);
        let max = ControlRange::from_hint(&hint(BOUNDED | HINT_DEFAULT_MAXIMUM, 0.0, 4.0), 48000);
        assert_eq!(max.default, 4.0);
        let fixed = ControlRange::from_hint(&hint(BOUNDED | HINT_DEFAULT_440, 20.0, 1000.0), 48000);
        assert_eq!(fixed.default, 440.0);
    }

    #[test]
    fn test_logarithmic_middle_is_geometric() {
        let range = ControlRange::from_hint(
            &hint(BOUNDED | HINT_LOGARITHMIC | HINT_DEFAULT_MIDDLE, 10.0, 1000.0),
            48000,
        );
        assert!(range.logarithmic);
        assert!((range.default - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_rate_bounds_are_scaled() {
        let range = ControlRange::from_hint(
            &hint(BOUNDED | HINT_SAMPLE_RATE | HINT_DEFAULT_MAXIMUM, 0.0, 0.5),
            48000,
        );
        assert_eq!(range.kind, ParamKind::SampleRate);
        assert_eq!(range.max, 24000.0);
        assert_eq!(range.default, 24000.0);
    }

    #[test]
    fn test_kind_precedence() {
        let both = ControlRange::from_hint(&hint(HINT_INTEGER | HINT_TOGGLED, 0.0, 0.0), 48000);
        assert_eq!(both.kind, ParamKind::Integer);
        let toggle = ControlRange::from_hint(&hint(HINT_TOGGLED | HINT_DEFAULT_1, 0.0, 0.0), 48000);
        assert_eq!(toggle.kind, ParamKind::Toggle);
        assert_eq!((toggle.min, toggle.max, toggle.default), (0.0, 1.0, 1.0));
    }

    #[test]
    fn test_unbounded_default_is_zero() {
        let range = ControlRange::from_hint(&hint(HINT_DEFAULT_NONE, 0.0, 0.0), 48000);
        assert_eq!(range.default, 0.0);
        assert!(range.min < -1000.0 && range.max > 1000.0);
    }
}
