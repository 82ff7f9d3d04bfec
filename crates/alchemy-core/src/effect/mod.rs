//! Effect system - traits, ports, and parameters
//!
//! This module provides a unified effect interface for all effect types:
//! - Native Rust effects ([`native`])
//! - The channel-adapting [`mixer::MixerEffect`] (also used as chain sentinels)
//! - LADSPA plugins ([`crate::ladspa`])
//!
//! Every effect is described by an [`EffectInfo`]: an ordered list of
//! [`Port`]s and an ordered list of [`Param`]s. Effects keep that description
//! in an [`EffectBase`] and get [`Portable`] and [`Parameterized`] by
//! delegating to it.

pub mod catalog;
pub mod mixer;
pub mod native;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, Sample};

pub use catalog::{CatalogEntry, CatalogError, CatalogResult, EffectCatalog, EffectCategory, PluginType};
pub use mixer::MixerEffect;

/// Identifier of a parameter inside its effect (insertion order)
pub type ParamId = u32;

/// An audio port of an effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
}

impl Port {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Output,
        }
    }
}

/// How a parameter's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Whole numbers only
    Integer,
    /// Off (min) or on (max)
    Toggle,
    Continuous,
    /// Continuous, with bounds scaled by the sample rate
    SampleRate,
}

/// A parameter and its current value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub id: ParamId,
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub logarithmic: bool,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

impl Param {
    /// Create a continuous 0..1 parameter with the given default
    pub fn new(name: impl Into<String>, default: f64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            value: default,
            min: 0.0,
            max: 1.0,
            default,
            logarithmic: false,
            kind: ParamKind::Continuous,
            unit: String::new(),
        }
    }

    /// Set the value range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self.value = self.coerce(self.default);
        self
    }

    pub fn with_kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self.value = self.coerce(self.default);
        self
    }

    pub fn logarithmic(mut self) -> Self {
        self.logarithmic = true;
        self
    }

    /// Set the unit label
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Clamp to range and apply the kind's quantization
    pub fn coerce(&self, value: f64) -> f64 {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        let value = if value.is_nan() { self.default } else { value };
        let value = value.clamp(lo, hi);
        match self.kind {
            ParamKind::Integer => value.round().clamp(lo.ceil(), hi.floor().max(lo.ceil())),
            ParamKind::Toggle => {
                if value >= (lo + hi) / 2.0 {
                    hi
                } else {
                    lo
                }
            }
            ParamKind::Continuous | ParamKind::SampleRate => value,
        }
    }
}

/// Parameter address in a control message: numeric id or name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamRef {
    Id(ParamId),
    Name(String),
}

impl std::fmt::Display for ParamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamRef::Id(id) => write!(f, "{}", id),
            ParamRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Static description of an effect
#[derive(Debug, Clone)]
pub struct EffectInfo {
    /// Effect name for display
    pub name: String,
    /// Effect category (e.g., "distortion", "ambient", "utility")
    pub category: String,
    pub sample_rate: u32,
    pub ports: Vec<Port>,
    pub params: Vec<Param>,
}

impl EffectInfo {
    pub fn new(name: impl Into<String>, category: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            sample_rate,
            ports: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Add `count` ports named `{prefix} 1..=count`
    pub fn with_ports(mut self, direction: Direction, prefix: &str, count: usize) -> Self {
        for i in 1..=count {
            self.ports.push(Port {
                name: format!("{} {}", prefix, i),
                direction,
            });
        }
        self
    }

    /// Add a parameter; its id is its insertion index
    pub fn with_param(mut self, mut param: Param) -> Self {
        param.id = self.params.len() as ParamId;
        self.params.push(param);
        self
    }
}

/// Buffers handed to [`Effect::process`]
///
/// Each channel vector holds at least `frames` samples. There is one input
/// vector per input port and one output vector per output port, in port
/// order.
pub struct ProcessContext<'a> {
    pub frames: usize,
    pub inputs: &'a [Vec<Sample>],
    pub outputs: &'a mut [Vec<Sample>],
}

/// Access to an effect's ports
pub trait Portable {
    fn ports(&self) -> &[Port];

    fn input_count(&self) -> usize {
        self.ports()
            .iter()
            .filter(|p| p.direction == Direction::Input)
            .count()
    }

    fn output_count(&self) -> usize {
        self.ports()
            .iter()
            .filter(|p| p.direction == Direction::Output)
            .count()
    }
}

/// Access to an effect's parameters
pub trait Parameterized {
    fn params(&self) -> &[Param];

    /// Set a parameter, returning the value actually applied
    fn set_param(&mut self, id: ParamId, value: f64) -> Option<f64>;

    fn param(&self, id: ParamId) -> Option<&Param> {
        self.params().iter().find(|p| p.id == id)
    }

    fn param_value(&self, id: ParamId) -> Option<f64> {
        self.param(id).map(|p| p.value)
    }

    /// Resolve an id or name to a parameter id
    fn resolve_param(&self, param: &ParamRef) -> Option<ParamId> {
        match param {
            ParamRef::Id(id) => self.param(*id).map(|p| p.id),
            ParamRef::Name(name) => self
                .params()
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .map(|p| p.id),
        }
    }
}

/// The core effect trait - implemented by all audio effects
pub trait Effect: Portable + Parameterized + Send {
    fn info(&self) -> &EffectInfo;

    /// Process `ctx.frames` frames from every input into every output
    ///
    /// Runs on the processing thread: must not block, allocate, or lock.
    fn process(&mut self, ctx: &mut ProcessContext<'_>);

    /// Called once before a run of `process` calls
    fn activate(&mut self) {}

    /// Called once after a run of `process` calls
    fn deactivate(&mut self) {}

    fn name(&self) -> &str {
        &self.info().name
    }

    fn sample_rate(&self) -> u32 {
        self.info().sample_rate
    }
}

/// Base implementation helper for effects
///
/// Holds the effect description and current parameter values.
#[derive(Debug, Clone)]
pub struct EffectBase {
    info: EffectInfo,
}

impl EffectBase {
    pub fn new(info: EffectInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &EffectInfo {
        &self.info
    }

    /// Current value of a parameter as `f32`, 0.0 if unknown
    pub fn value(&self, id: ParamId) -> f32 {
        self.info
            .params
            .get(id as usize)
            .map(|p| p.value as f32)
            .unwrap_or(0.0)
    }

    /// Overwrite a value without coercion (plugin-written output controls)
    pub fn store_raw(&mut self, id: ParamId, value: f64) {
        if let Some(param) = self.info.params.get_mut(id as usize) {
            param.value = value;
        }
    }
}

impl Portable for EffectBase {
    fn ports(&self) -> &[Port] {
        &self.info.ports
    }
}

impl Parameterized for EffectBase {
    fn params(&self) -> &[Param] {
        &self.info.params
    }

    fn set_param(&mut self, id: ParamId, value: f64) -> Option<f64> {
        let param = self.info.params.get_mut(id as usize)?;
        param.value = param.coerce(value);
        Some(param.value)
    }

    fn param(&self, id: ParamId) -> Option<&Param> {
        self.info.params.get(id as usize)
    }
}

/// Implement [`Portable`] and [`Parameterized`] for an effect type by
/// delegating to its `base: EffectBase` field
macro_rules! delegate_to_base {
    ($ty:ty) => {
        impl $crate::effect::Portable for $ty {
            fn ports(&self) -> &[$crate::effect::Port] {
                $crate::effect::Portable::ports(&self.base)
            }
        }

        impl $crate::effect::Parameterized for $ty {
            fn params(&self) -> &[$crate::effect::Param] {
                $crate::effect::Parameterized::params(&self.base)
            }

            fn set_param(&mut self, id: $crate::effect::ParamId, value: f64) -> Option<f64> {
                $crate::effect::Parameterized::set_param(&mut self.base, id, value)
            }

            fn param(&self, id: $crate::effect::ParamId) -> Option<&$crate::effect::Param> {
                $crate::effect::Parameterized::param(&self.base, id)
            }
        }
    };
}

pub(crate) use delegate_to_base;
