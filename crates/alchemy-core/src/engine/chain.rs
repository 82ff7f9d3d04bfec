//! Effect chain
//!
//! An ordered pipeline of effects between two mixer sentinels:
//!
//! ```text
//! input stream ─► [Input] ─► effect 1 ─► … ─► effect n ─► [Output] ─► output stream
//! ```
//!
//! The Input sentinel adapts the capture stream to the chain width
//! (`input_channels`), the Output sentinel adapts the last effect to the
//! playback stream. Every interior effect takes exactly as many inputs as its
//! predecessor produces. Output accepts at most
//! [`MAX_OUTPUT_MIX_CHANNELS`] inputs.
//!
//! # Locking
//!
//! - The chain lock (`state`) is held for a whole traversal and for every
//!   topology change, so the two never interleave.
//! - Each effect has its own mutex, held by traversal only around that
//!   effect's `process`.
//! - Parameter access goes through the registry (a short lock, released
//!   before the effect mutex is taken) and never touches the chain lock, so
//!   a parameter change on one effect can land while another is processing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::error::{ChainError, ChainResult};
use super::graph::ProcessingGraph;
use crate::audio::{InputHandle, OutputHandle};
use crate::effect::{Effect, MixerEffect, Param, ParamRef, Parameterized, Portable, ProcessContext};
use crate::sync::lock;
use crate::types::{EffectId, Sample, MAX_BUFFER_SIZE, MAX_OUTPUT_MIX_CHANNELS};

/// An effect shared between the chain and parameter access
pub type SharedEffect = Arc<Mutex<Box<dyn Effect>>>;

/// Description of one chain node for `GET_CHAIN` replies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainEntry {
    pub id: EffectId,
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
    pub params: Vec<Param>,
}

struct Node {
    id: EffectId,
    name: String,
    inputs: usize,
    outputs: usize,
    effect: SharedEffect,
}

struct ChainState {
    nodes: Vec<Node>,
    bypassed: bool,
    active: bool,
    next_id: u32,
    /// Ping-pong buses, each `MAX_BUFFER_SIZE` frames per channel
    buses: [Vec<Vec<Sample>>; 2],
}

impl ChainState {
    /// Channels available after the node at `index - 1` (the Input at 0)
    fn width_before(&self, index: usize, input_channels: usize) -> (usize, &str) {
        match index.checked_sub(1).and_then(|i| self.nodes.get(i)) {
            Some(node) => (node.outputs, &node.name),
            None => (input_channels, "input"),
        }
    }

    fn ensure_bus_width(&mut self, width: usize) {
        for bus in &mut self.buses {
            while bus.len() < width {
                bus.push(vec![0.0; MAX_BUFFER_SIZE]);
            }
        }
    }
}

#[derive(Default)]
struct Streams {
    input: Option<InputHandle>,
    output: Option<OutputHandle>,
}

/// Ordered effect pipeline with Input and Output mixer sentinels
pub struct EffectChain {
    sample_rate: u32,
    input_channels: usize,
    input: SharedEffect,
    output: SharedEffect,
    state: Mutex<ChainState>,
    registry: Mutex<HashMap<EffectId, SharedEffect>>,
    streams: Mutex<Streams>,
}

/// Outputs the Output sentinel will accept from its predecessor
fn output_accepts(channels: usize) -> bool {
    (1..=MAX_OUTPUT_MIX_CHANNELS).contains(&channels)
}

fn shared(effect: Box<dyn Effect>) -> SharedEffect {
    Arc::new(Mutex::new(effect))
}

fn run_node(effect: &SharedEffect, frames: usize, inputs: &[Vec<Sample>], outputs: &mut [Vec<Sample>]) {
    let mut effect = lock(effect);
    effect.process(&mut ProcessContext {
        frames,
        inputs,
        outputs,
    });
}

impl EffectChain {
    /// Create an empty chain `input_channels` wide (1 or 2)
    pub fn new(sample_rate: u32, input_channels: usize) -> Self {
        let width = input_channels.clamp(1, MAX_OUTPUT_MIX_CHANNELS);
        if width != input_channels {
            log::warn!(
                "[CHAIN] Chain width requested {} channel(s), applied {}",
                input_channels,
                width
            );
        }

        let input = shared(Box::new(MixerEffect::new("input", width, width, sample_rate)));
        let output = shared(Box::new(MixerEffect::new(
            "output",
            MAX_OUTPUT_MIX_CHANNELS,
            MAX_OUTPUT_MIX_CHANNELS,
            sample_rate,
        )));

        let mut registry = HashMap::new();
        registry.insert(EffectId::INPUT, input.clone());
        registry.insert(EffectId::OUTPUT, output.clone());

        let mut state = ChainState {
            nodes: Vec::new(),
            bypassed: false,
            active: false,
            next_id: 1,
            buses: [Vec::new(), Vec::new()],
        };
        state.ensure_bus_width(MAX_OUTPUT_MIX_CHANNELS);

        Self {
            sample_rate,
            input_channels: width,
            input,
            output,
            state: Mutex::new(state),
            registry: Mutex::new(registry),
            streams: Mutex::new(Streams::default()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count between the Input sentinel and the first effect
    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    /// Channels an effect inserted at `position` would receive
    ///
    /// Out-of-range positions report the chain's tail.
    pub fn channels_at(&self, position: i64) -> usize {
        let state = lock(&self.state);
        let index = usize::try_from(position)
            .ok()
            .filter(|p| *p <= state.nodes.len())
            .unwrap_or(state.nodes.len());
        state.width_before(index, self.input_channels).0
    }

    /// Insert `effect` at `position`
    ///
    /// `-1` appends, `0` inserts at the head and `n` inserts before the
    /// current `n`th effect. The effect's ports must match both neighbours;
    /// on any error the chain is left untouched.
    pub fn add_effect(&self, mut effect: Box<dyn Effect>, position: i64) -> ChainResult<EffectId> {
        let inputs = effect.input_count();
        let outputs = effect.output_count();
        let name = effect.name().to_string();

        let mut state = lock(&self.state);
        let len = state.nodes.len();
        let index = match position {
            -1 => len,
            p if p >= 0 && (p as usize) <= len => p as usize,
            p => return Err(ChainError::PositionOutOfRange { position: p, len }),
        };

        let (available, predecessor) = state.width_before(index, self.input_channels);
        if inputs != available {
            return Err(ChainError::PortsIncompatible(format!(
                "{} takes {} input(s) but {} provides {}",
                name, inputs, predecessor, available
            )));
        }
        match state.nodes.get(index) {
            Some(next) if next.inputs != outputs => {
                return Err(ChainError::PortsIncompatible(format!(
                    "{} provides {} output(s) but {} takes {}",
                    name, outputs, next.name, next.inputs
                )));
            }
            None if !output_accepts(outputs) => {
                return Err(ChainError::PortsIncompatible(format!(
                    "{} provides {} output(s) but output takes 1 to {}",
                    name, outputs, MAX_OUTPUT_MIX_CHANNELS
                )));
            }
            _ => {}
        }

        let id = EffectId(state.next_id);
        state.next_id += 1;
        if state.active {
            effect.activate();
        }
        state.ensure_bus_width(inputs.max(outputs));

        let effect = shared(effect);
        lock(&self.registry).insert(id, effect.clone());
        state.nodes.insert(
            index,
            Node {
                id,
                name: name.clone(),
                inputs,
                outputs,
                effect,
            },
        );

        log::info!("[CHAIN] Added {} as {} at position {}", name, id, index);
        Ok(id)
    }

    /// Remove the effect `id`
    ///
    /// Rejected when the effects around it would not fit together.
    pub fn remove_effect(&self, id: EffectId) -> ChainResult<()> {
        if id.is_sentinel() {
            return Err(ChainError::Sentinel(id));
        }

        let mut state = lock(&self.state);
        let index = state
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(ChainError::UnknownEffect(id))?;

        let (available, predecessor) = state.width_before(index, self.input_channels);
        let fits = match state.nodes.get(index + 1) {
            Some(next) => next.inputs == available,
            None => output_accepts(available),
        };
        if !fits {
            let successor = state
                .nodes
                .get(index + 1)
                .map_or("output", |n| n.name.as_str());
            return Err(ChainError::PortsIncompatible(format!(
                "removing {} would connect {} ({} channel(s)) to {}",
                id, predecessor, available, successor
            )));
        }

        let node = state.nodes.remove(index);
        let was_active = state.active;
        drop(state);

        lock(&self.registry).remove(&id);
        if was_active {
            lock(&node.effect).deactivate();
        }
        log::info!("[CHAIN] Removed {} ({})", node.name, id);
        Ok(())
    }

    /// Toggle bypass, returning the new state
    pub fn bypass(&self) -> bool {
        let mut state = lock(&self.state);
        state.bypassed = !state.bypassed;
        log::info!("[CHAIN] Bypass {}", if state.bypassed { "on" } else { "off" });
        state.bypassed
    }

    pub fn is_bypassed(&self) -> bool {
        lock(&self.state).bypassed
    }

    /// Number of interior effects
    pub fn len(&self) -> usize {
        lock(&self.state).nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interior effect ids in processing order
    pub fn ids(&self) -> Vec<EffectId> {
        lock(&self.state).nodes.iter().map(|n| n.id).collect()
    }

    /// Look up any node, sentinels included
    pub fn effect(&self, id: EffectId) -> ChainResult<SharedEffect> {
        lock(&self.registry)
            .get(&id)
            .cloned()
            .ok_or(ChainError::UnknownEffect(id))
    }

    /// Set a parameter, returning the value actually applied
    pub fn set_effect_param(&self, id: EffectId, param: &ParamRef, value: f64) -> ChainResult<f64> {
        let result = self.effect(id).and_then(|effect| {
            let mut effect = lock(&effect);
            effect
                .resolve_param(param)
                .and_then(|pid| effect.set_param(pid, value))
                .ok_or_else(|| ChainError::UnknownParam {
                    effect: id,
                    param: param.to_string(),
                })
        });
        if let Err(e) = &result {
            log::warn!("[CHAIN] set {} {} = {}: {}", id, param, value, e);
        }
        result
    }

    /// Read a parameter
    pub fn get_effect_param(&self, id: EffectId, param: &ParamRef) -> ChainResult<f64> {
        let result = self.effect(id).and_then(|effect| {
            let effect = lock(&effect);
            effect
                .resolve_param(param)
                .and_then(|pid| effect.param_value(pid))
                .ok_or_else(|| ChainError::UnknownParam {
                    effect: id,
                    param: param.to_string(),
                })
        });
        if let Err(e) = &result {
            log::warn!("[CHAIN] get {} {}: {}", id, param, e);
        }
        result
    }

    /// Describe every node, Input first and Output last
    pub fn entries(&self) -> Vec<ChainEntry> {
        let describe = |id: EffectId, effect: &SharedEffect| {
            let effect = lock(effect);
            ChainEntry {
                id,
                name: effect.name().to_string(),
                inputs: effect.input_count(),
                outputs: effect.output_count(),
                params: effect.params().to_vec(),
            }
        };

        let state = lock(&self.state);
        let mut entries = vec![describe(EffectId::INPUT, &self.input)];
        entries.extend(state.nodes.iter().map(|n| describe(n.id, &n.effect)));
        entries.push(describe(EffectId::OUTPUT, &self.output));
        entries
    }

    pub fn set_input_stream(&self, stream: InputHandle) {
        lock(&self.streams).input = Some(stream);
    }

    pub fn set_output_stream(&self, stream: OutputHandle) {
        lock(&self.streams).output = Some(stream);
    }
}

impl ProcessingGraph for EffectChain {
    fn input_stream(&self) -> Option<InputHandle> {
        lock(&self.streams).input.clone()
    }

    fn output_stream(&self) -> Option<OutputHandle> {
        lock(&self.streams).output.clone()
    }

    fn activate(&self) {
        let mut state = lock(&self.state);
        if state.active {
            return;
        }
        for node in &state.nodes {
            lock(&node.effect).activate();
        }
        state.active = true;
        log::debug!("[CHAIN] Activated {} effect(s)", state.nodes.len());
    }

    fn deactivate(&self) {
        let mut state = lock(&self.state);
        if !state.active {
            return;
        }
        for node in &state.nodes {
            lock(&node.effect).deactivate();
        }
        state.active = false;
        log::debug!("[CHAIN] Deactivated {} effect(s)", state.nodes.len());
    }

    fn traverse(&self, frames: usize, input: &[Vec<Sample>], output: &mut [Vec<Sample>]) {
        let frames = frames.min(MAX_BUFFER_SIZE);
        let mut state = lock(&self.state);

        if state.bypassed {
            run_node(&self.output, frames, input, output);
            return;
        }

        let ChainState { nodes, buses, .. } = &mut *state;
        let [front, back] = buses;
        let (mut src, mut dst) = (front, back);

        run_node(&self.input, frames, input, &mut src[..self.input_channels]);
        let mut width = self.input_channels;
        for node in nodes.iter() {
            run_node(&node.effect, frames, &src[..node.inputs], &mut dst[..node.outputs]);
            std::mem::swap(&mut src, &mut dst);
            width = node.outputs;
        }
        run_node(&self.output, frames, &src[..width], output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{delegate_to_base, EffectBase, EffectInfo};
    use crate::types::Direction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Trace = Arc<Mutex<Vec<String>>>;

    /// Records its name on every process call; `out[j] = gain * in[min(j, last)]`
    struct Tracer {
        base: EffectBase,
        trace: Trace,
        activations: Arc<AtomicUsize>,
    }

    impl Tracer {
        fn new(name: &str, inputs: usize, outputs: usize, extra_params: usize, trace: &Trace) -> Self {
            let mut info = EffectInfo::new(name, "test", 48000)
                .with_ports(Direction::Input, "In", inputs)
                .with_ports(Direction::Output, "Out", outputs)
                .with_param(Param::new("gain", 1.0).with_range(0.0, 100.0));
            for i in 0..extra_params {
                info = info.with_param(Param::new(format!("p{}", i + 1), 0.5));
            }
            Self {
                base: EffectBase::new(info),
                trace: trace.clone(),
                activations: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn gain(mut self, gain: f64) -> Self {
            self.base.set_param(0, gain);
            self
        }
    }

    delegate_to_base!(Tracer);

    impl Effect for Tracer {
        fn info(&self) -> &EffectInfo {
            self.base.info()
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) {
            self.trace.lock().unwrap().push(self.base.info().name.clone());
            let gain = self.base.value(0);
            let last = ctx.inputs.len() - 1;
            for (j, out) in ctx.outputs.iter_mut().enumerate() {
                let input = &ctx.inputs[j.min(last)];
                for i in 0..ctx.frames {
                    out[i] = input[i] * gain;
                }
            }
        }

        fn activate(&mut self) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn trace() -> Trace {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn run(chain: &EffectChain, value: Sample) -> Vec<Vec<Sample>> {
        let input = vec![vec![value; 4]];
        let mut output = vec![vec![0.0; 4]; 2];
        chain.traverse(4, &input, &mut output);
        output
    }

    #[test]
    fn test_positions() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        let a = chain.add_effect(Box::new(Tracer::new("a", 1, 1, 0, &t)), -1).unwrap();
        let b = chain.add_effect(Box::new(Tracer::new("b", 1, 1, 0, &t)), 0).unwrap();
        let c = chain.add_effect(Box::new(Tracer::new("c", 1, 1, 0, &t)), 1).unwrap();
        assert_eq!(chain.ids(), vec![b, c, a]);
        assert_eq!(chain.channels_at(-1), 1);

        let err = chain
            .add_effect(Box::new(Tracer::new("d", 1, 1, 0, &t)), 4)
            .unwrap_err();
        assert_eq!(err, ChainError::PositionOutOfRange { position: 4, len: 3 });
        assert!(chain.add_effect(Box::new(Tracer::new("e", 1, 1, 0, &t)), -2).is_err());
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_incompatible_add_leaves_chain_unchanged() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        chain.add_effect(Box::new(Tracer::new("mono", 1, 1, 0, &t)), -1).unwrap();
        chain.add_effect(Box::new(Tracer::new("split", 1, 2, 0, &t)), -1).unwrap();
        let before = chain.ids();
        assert_eq!(chain.channels_at(1), 1);
        assert_eq!(chain.channels_at(-1), 2);

        for position in [-1, 0, 1, 2] {
            let result = chain.add_effect(Box::new(Tracer::new("stereo", 2, 2, 0, &t)), position);
            if position == -1 || position == 2 {
                // After "split" a 2→2 effect fits
                let id = result.unwrap();
                chain.remove_effect(id).unwrap();
            } else {
                assert!(matches!(result, Err(ChainError::PortsIncompatible(_))));
            }
            assert_eq!(chain.ids(), before);
        }

        let wide = chain.add_effect(Box::new(Tracer::new("wide", 2, 3, 0, &t)), -1);
        assert!(matches!(wide, Err(ChainError::PortsIncompatible(_))));
        assert_eq!(chain.ids(), before);
    }

    #[test]
    fn test_traversal_order_and_data_flow() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        for (name, gain) in [("a", 2.0), ("b", 3.0), ("c", 5.0)] {
            chain
                .add_effect(Box::new(Tracer::new(name, 1, 1, 0, &t).gain(gain)), -1)
                .unwrap();
        }
        // Traced stand-ins for the sentinels, sharing their registry slots
        *chain.input.lock().unwrap() = Box::new(Tracer::new("input", 1, 1, 0, &t).gain(0.5));
        *chain.output.lock().unwrap() = Box::new(Tracer::new("output", 2, 2, 0, &t));

        let out = run(&chain, 1.0);

        assert_eq!(*t.lock().unwrap(), vec!["input", "a", "b", "c", "output"]);
        // input (×0.5) → a → b → c → output upmixed to both channels
        assert_eq!(out, vec![vec![15.0; 4], vec![15.0; 4]]);

        t.lock().unwrap().clear();
        chain.bypass();
        run(&chain, 1.0);
        assert_eq!(*t.lock().unwrap(), vec!["output"]);
    }

    #[test]
    fn test_sentinel_volumes_apply() {
        let chain = EffectChain::new(48000, 1);
        chain
            .set_effect_param(EffectId::INPUT, &ParamRef::Name("volume".into()), 0.5)
            .unwrap();
        chain
            .set_effect_param(EffectId::OUTPUT, &ParamRef::Name("volume".into()), 3.0)
            .unwrap();
        assert_eq!(run(&chain, 1.0), vec![vec![1.5; 4], vec![1.5; 4]]);
    }

    #[test]
    fn test_bypass_toggling() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        chain.add_effect(Box::new(Tracer::new("a", 1, 1, 0, &t).gain(4.0)), -1).unwrap();
        chain.add_effect(Box::new(Tracer::new("b", 1, 1, 0, &t).gain(4.0)), -1).unwrap();

        let processed = run(&chain, 0.5);
        assert_eq!(processed[0], vec![8.0; 4]);

        assert!(chain.bypass());
        let bypassed = run(&chain, 0.5);
        assert_eq!(bypassed, vec![vec![0.5; 4], vec![0.5; 4]]);
        t.lock().unwrap().clear();

        assert!(!chain.bypass());
        assert!(chain.bypass());
        assert_eq!(run(&chain, 0.5), bypassed);
        assert!(t.lock().unwrap().is_empty());

        assert!(!chain.bypass());
        assert_eq!(run(&chain, 0.5), processed);
    }

    #[test]
    fn test_param_ids_survive_removal() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        let e1 = chain.add_effect(Box::new(Tracer::new("e1", 1, 1, 1, &t)), -1).unwrap();
        let e2 = chain.add_effect(Box::new(Tracer::new("e2", 1, 1, 0, &t)), -1).unwrap();
        let e2_params: Vec<_> = chain.effect(e2).unwrap().lock().unwrap().params().to_vec();
        assert_eq!(lock(&chain.effect(e1).unwrap()).params().len(), 2);

        chain.remove_effect(e1).unwrap();

        assert_eq!(chain.ids(), vec![e2]);
        let after: Vec<_> = chain.effect(e2).unwrap().lock().unwrap().params().to_vec();
        assert_eq!(after, e2_params);
        assert_eq!(chain.set_effect_param(e2, &ParamRef::Id(0), 7.0), Ok(7.0));
        assert_eq!(chain.get_effect_param(e2, &ParamRef::Name("gain".into())), Ok(7.0));

        // Ids are never reused
        let e3 = chain.add_effect(Box::new(Tracer::new("e3", 1, 1, 0, &t)), -1).unwrap();
        assert!(e3 != e1 && e3 != e2);
    }

    #[test]
    fn test_remove_rejects_incompatible_neighbours() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        let split = chain.add_effect(Box::new(Tracer::new("split", 1, 2, 0, &t)), -1).unwrap();
        let merge = chain.add_effect(Box::new(Tracer::new("merge", 2, 1, 0, &t)), -1).unwrap();

        assert!(matches!(chain.remove_effect(split), Err(ChainError::PortsIncompatible(_))));
        assert_eq!(chain.ids(), vec![split, merge]);

        // Removing the tail leaves split (2 out) feeding Output, which is fine
        chain.remove_effect(merge).unwrap();
        assert_eq!(chain.remove_effect(merge), Err(ChainError::UnknownEffect(merge)));
        assert_eq!(
            chain.remove_effect(EffectId::OUTPUT),
            Err(ChainError::Sentinel(EffectId::OUTPUT))
        );
    }

    #[test]
    fn test_unknown_lookups() {
        let chain = EffectChain::new(48000, 1);
        assert_eq!(
            chain.get_effect_param(EffectId(42), &ParamRef::Id(0)),
            Err(ChainError::UnknownEffect(EffectId(42)))
        );
        assert!(matches!(
            chain.set_effect_param(EffectId::OUTPUT, &ParamRef::Name("nope".into()), 1.0),
            Err(ChainError::UnknownParam { .. })
        ));
        assert_eq!(chain.get_effect_param(EffectId::OUTPUT, &ParamRef::Id(0)), Ok(1.0));
    }

    #[test]
    fn test_activation_brackets_effects() {
        let t = trace();
        let chain = EffectChain::new(48000, 1);
        let first = Tracer::new("first", 1, 1, 0, &t);
        let first_count = first.activations.clone();
        chain.add_effect(Box::new(first), -1).unwrap();

        chain.activate();
        chain.activate();
        assert_eq!(first_count.load(Ordering::SeqCst), 1);

        let late = Tracer::new("late", 1, 1, 0, &t);
        let late_count = late.activations.clone();
        chain.add_effect(Box::new(late), -1).unwrap();
        assert_eq!(late_count.load(Ordering::SeqCst), 1);

        chain.deactivate();
        chain.activate();
        assert_eq!(first_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_param_access_does_not_wait_for_chain_lock() {
        let t = trace();
        let chain = Arc::new(EffectChain::new(48000, 1));
        let id = chain.add_effect(Box::new(Tracer::new("a", 1, 1, 0, &t)), -1).unwrap();

        // Simulate a traversal in progress
        let guard = chain.state.lock().unwrap();
        let (tx, rx) = crossbeam::channel::bounded(1);
        let worker = {
            let chain = chain.clone();
            std::thread::spawn(move || {
                tx.send(chain.set_effect_param(id, &ParamRef::Id(0), 3.0)).unwrap();
            })
        };
        let applied = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        drop(guard);
        worker.join().unwrap();
        assert_eq!(applied, Ok(3.0));
    }

    #[test]
    fn test_stereo_chain_width() {
        let t = trace();
        let chain = EffectChain::new(48000, 2);
        assert_eq!(chain.input_channels(), 2);
        assert!(chain.add_effect(Box::new(Tracer::new("mono", 1, 1, 0, &t)), -1).is_err());
        chain.add_effect(Box::new(Tracer::new("stereo", 2, 2, 0, &t).gain(2.0)), -1).unwrap();

        // Mono stream upmixed by Input, doubled, passed through by Output
        assert_eq!(run(&chain, 0.25), vec![vec![0.5; 4], vec![0.5; 4]]);
        assert_eq!(chain.entries().len(), 3);
        assert_eq!(chain.entries()[1].name, "stereo");
    }
}
