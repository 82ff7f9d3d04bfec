//! Processing thread
//!
//! Runs the blocking stream loop of an [`AudioPipe`] on a dedicated thread
//! and drives a [`ProcessingGraph`] once per buffer.
//!
//! ```text
//!            start_processing()                 stop_processing()
//! STOPPED ───────────────────────► RUNNING ───────────────────────► STOPPED
//!    ▲                                │
//!    └──── stream error (logged) ─────┘
//! ```
//!
//! The observed state is written only by the processing thread. The
//! requested state is written by the controller and polled by the thread
//! before every buffer. `start_processing` returns once two buffers went
//! through the graph, or with an error if that does not happen in time.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use super::error::{ProcessError, ProcessResult};
use super::graph::ProcessingGraph;
use super::rt;
use crate::audio::{AudioPipe, Connectable, InputHandle, OutputHandle, PipeCallback};
use crate::sync::lock;
use crate::types::{Sample, MAX_BUFFER_SIZE};

/// Callbacks that must complete before a start is reported successful
const STABLE_CALLBACKS: u32 = 2;

/// Observed or requested processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    Stopped,
    Running,
}

/// Settings applied at the next start
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSettings {
    pub frames: usize,
    pub sample_rate: u32,
    pub start_timeout: Duration,
    /// `SCHED_FIFO` priority, `None` to keep normal scheduling
    pub realtime_priority: Option<i32>,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            frames: crate::types::DEFAULT_BUFFER_SIZE,
            sample_rate: crate::types::DEFAULT_SAMPLE_RATE,
            start_timeout: Duration::from_millis(2000),
            realtime_priority: None,
        }
    }
}

struct StateInner {
    observed: ProcessingState,
    requested: ProcessingState,
    callbacks: u32,
    /// Set when a run ended on its own
    failure: Option<String>,
    finished: bool,
}

struct Shared {
    state: Mutex<StateInner>,
    changed: Condvar,
    graph: Arc<dyn ProcessingGraph>,
}

/// Owns the processing thread and its state machine
pub struct ProcessingThread {
    shared: Arc<Shared>,
    settings: Mutex<ProcessSettings>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessingThread {
    pub fn new(graph: Arc<dyn ProcessingGraph>, settings: ProcessSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StateInner {
                    observed: ProcessingState::Stopped,
                    requested: ProcessingState::Stopped,
                    callbacks: 0,
                    failure: None,
                    finished: true,
                }),
                changed: Condvar::new(),
                graph,
            }),
            settings: Mutex::new(settings),
            handle: Mutex::new(None),
        }
    }

    /// Observed state
    pub fn state(&self) -> ProcessingState {
        lock(&self.shared.state).observed
    }

    pub fn settings(&self) -> ProcessSettings {
        lock(&self.settings).clone()
    }

    /// Change the buffer length used from the next start on
    pub fn set_buffer_size(&self, frames: usize) -> ProcessResult<()> {
        if !(1..=MAX_BUFFER_SIZE).contains(&frames) {
            return Err(ProcessError::InvalidBufferSize(frames));
        }
        lock(&self.settings).frames = frames;
        log::info!("[DSP] Buffer size set to {} frames", frames);
        Ok(())
    }

    /// Start processing and wait until it is stable
    ///
    /// Starting while running is a no-op.
    pub fn start_processing(&self) -> ProcessResult<()> {
        if self.state() == ProcessingState::Running && self.thread_alive() {
            return Ok(());
        }
        // A previous run may have died on its own; reap it first
        self.join_thread();

        let graph = &self.shared.graph;
        let input = graph.input_stream().ok_or(ProcessError::NoInputStream)?;
        let output = graph.output_stream().ok_or(ProcessError::NoOutputStream)?;
        let settings = self.settings();

        {
            let mut state = lock(&self.shared.state);
            state.requested = ProcessingState::Running;
            state.callbacks = 0;
            state.failure = None;
            state.finished = false;
        }

        let shared = self.shared.clone();
        let thread_settings = settings.clone();
        let handle = std::thread::Builder::new()
            .name("alchemy-dsp".to_string())
            .spawn(move || run(shared, input, output, thread_settings))
            .map_err(|e| {
                let mut state = lock(&self.shared.state);
                state.requested = ProcessingState::Stopped;
                state.finished = true;
                ProcessError::SpawnFailed(e.to_string())
            })?;
        *lock(&self.handle) = Some(handle);

        let state = lock(&self.shared.state);
        let (state, timeout) = self
            .shared
            .changed
            .wait_timeout_while(state, settings.start_timeout, |s| {
                s.callbacks < STABLE_CALLBACKS && s.failure.is_none() && !s.finished
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if state.observed == ProcessingState::Running && state.callbacks >= STABLE_CALLBACKS {
            log::info!("[DSP] Processing started");
            return Ok(());
        }

        let reason = match (&state.failure, timeout.timed_out()) {
            (Some(failure), _) => failure.clone(),
            (None, true) => format!("no audio within {} ms", settings.start_timeout.as_millis()),
            (None, false) => "processing ended during start".to_string(),
        };
        drop(state);

        log::error!("[DSP] Start failed: {}", reason);
        self.stop_processing();
        Err(ProcessError::StartFailed(reason))
    }

    /// Ask the thread to stop and join it; idempotent
    pub fn stop_processing(&self) {
        lock(&self.shared.state).requested = ProcessingState::Stopped;
        if self.join_thread() {
            log::info!("[DSP] Processing stopped");
        }
    }

    fn thread_alive(&self) -> bool {
        lock(&self.handle).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Join the thread if there is one; the state lock is never held here
    fn join_thread(&self) -> bool {
        let handle = lock(&self.handle).take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("[DSP] Processing thread panicked");
                    let mut state = lock(&self.shared.state);
                    state.observed = ProcessingState::Stopped;
                    state.finished = true;
                }
                true
            }
            None => false,
        }
    }
}

impl Drop for ProcessingThread {
    fn drop(&mut self) {
        self.stop_processing();
    }
}

/// Thread body
fn run(shared: Arc<Shared>, input: InputHandle, output: OutputHandle, settings: ProcessSettings) {
    rt::try_promote_current_thread(settings.realtime_priority);
    shared.graph.activate();

    let mut pipe = AudioPipe::new(settings.frames, settings.sample_rate);
    let mut callback = Callback { shared: &*shared };
    let result = {
        let mut input = lock(&input);
        let mut output = lock(&output);
        pipe.connect(&mut *input, &mut *output, &mut callback)
    };

    shared.graph.deactivate();

    let mut state = lock(&shared.state);
    state.observed = ProcessingState::Stopped;
    state.callbacks = 0;
    state.finished = true;
    let unexpected = match &result {
        Err(e) => Some(e.to_string()),
        Ok(()) if state.requested != ProcessingState::Stopped => Some("stream loop ended".to_string()),
        Ok(()) => None,
    };
    if let Some(reason) = unexpected {
        log::error!("[DSP] Processing stopped unexpectedly: {}", reason);
        state.failure = Some(reason);
        state.requested = ProcessingState::Stopped;
    }
    shared.changed.notify_all();
}

/// Bridges the stream loop to the graph
struct Callback<'a> {
    shared: &'a Shared,
}

impl PipeCallback for Callback<'_> {
    fn on_samples_ready(&mut self, frames: usize, input: &[Vec<Sample>], output: &mut [Vec<Sample>]) {
        let running = {
            let mut state = lock(&self.shared.state);
            if state.requested == ProcessingState::Running {
                state.observed = ProcessingState::Running;
                state.callbacks = state.callbacks.saturating_add(1);
                if state.callbacks == STABLE_CALLBACKS {
                    self.shared.changed.notify_all();
                }
                true
            } else {
                false
            }
        };

        if running {
            self.shared.graph.traverse(frames, input, output);
        } else {
            for channel in output.iter_mut() {
                channel.fill(0.0);
            }
        }
    }

    fn should_stop(&mut self) -> bool {
        let mut state = lock(&self.shared.state);
        if state.requested == ProcessingState::Running {
            false
        } else {
            state.callbacks = 0;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Signal, VirtualInput, VirtualOutput};
    use crate::effect::ParamRef;
    use crate::engine::EffectChain;
    use crate::types::EffectId;
    use std::sync::atomic::Ordering;

    fn settings() -> ProcessSettings {
        ProcessSettings {
            frames: 64,
            sample_rate: 48000,
            start_timeout: Duration::from_secs(2),
            realtime_priority: None,
        }
    }

    fn chain_with(input: VirtualInput, output: VirtualOutput) -> Arc<EffectChain> {
        let chain = Arc::new(EffectChain::new(48000, 1));
        chain.set_input_stream(Arc::new(Mutex::new(input)));
        chain.set_output_stream(Arc::new(Mutex::new(output)));
        chain
    }

    #[test]
    fn test_start_and_stop() {
        let output = VirtualOutput::new(0, "out", 2).with_capture(64);
        let capture = output.capture().unwrap();
        let chain = chain_with(
            VirtualInput::new(0, "in", 1).with_signal(Signal::Constant(0.25)),
            output,
        );
        chain
            .set_effect_param(EffectId::OUTPUT, &ParamRef::Id(0), 2.0)
            .unwrap();
        let process = ProcessingThread::new(chain, settings());
        assert_eq!(process.state(), ProcessingState::Stopped);

        process.start_processing().unwrap();
        assert_eq!(process.state(), ProcessingState::Running);
        // Starting again is a no-op
        process.start_processing().unwrap();

        process.stop_processing();
        assert_eq!(process.state(), ProcessingState::Stopped);
        process.stop_processing();
        assert_eq!(process.state(), ProcessingState::Stopped);

        let captured = capture.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert!(captured[0].iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let chain = Arc::new(EffectChain::new(48000, 1));
        let process = ProcessingThread::new(chain, settings());
        process.stop_processing();
        assert_eq!(process.state(), ProcessingState::Stopped);
    }

    #[test]
    fn test_missing_streams() {
        let chain = Arc::new(EffectChain::new(48000, 1));
        let process = ProcessingThread::new(chain.clone(), settings());
        assert_eq!(process.start_processing(), Err(ProcessError::NoInputStream));

        chain.set_input_stream(Arc::new(Mutex::new(VirtualInput::new(0, "in", 1))));
        assert_eq!(process.start_processing(), Err(ProcessError::NoOutputStream));
    }

    #[test]
    fn test_startup_failure_is_reported() {
        let chain = chain_with(
            VirtualInput::new(0, "in", 1).fail_after(1),
            VirtualOutput::new(0, "out", 2),
        );
        let process = ProcessingThread::new(chain, settings());
        let result = process.start_processing();
        assert!(matches!(result, Err(ProcessError::StartFailed(_))));
        assert_eq!(process.state(), ProcessingState::Stopped);
    }

    #[test]
    fn test_mid_run_failure_stops_quietly() {
        let input = VirtualInput::new(0, "in", 1).fail_after(20);
        let reads = input.read_counter();
        let chain = chain_with(input, VirtualOutput::new(0, "out", 2));
        let process = ProcessingThread::new(chain, settings());

        process.start_processing().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while process.state() == ProcessingState::Running && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(process.state(), ProcessingState::Stopped);
        assert_eq!(reads.load(Ordering::Relaxed), 20);

        // The dead run is reaped; a restart hits the same stream failure
        assert!(process.start_processing().is_err());
    }

    #[test]
    fn test_buffer_size_validation() {
        let chain = Arc::new(EffectChain::new(48000, 1));
        let process = ProcessingThread::new(chain, settings());
        assert!(process.set_buffer_size(0).is_err());
        assert!(process.set_buffer_size(MAX_BUFFER_SIZE + 1).is_err());
        process.set_buffer_size(128).unwrap();
        assert_eq!(process.settings().frames, 128);
    }
}
