//! Control server
//!
//! [`DspServer`] owns the audio devices, the effect chain and the
//! processing thread, and serves up to [`CLIENTS_MAX`] clients:
//!
//! ```text
//! connector ──listener thread──► ControlQueue ──control loop──► instruct()
//!     ▲                                                              │
//!     └──────────────────────── broadcast_message ◄──────────────────┘
//! ```
//!
//! Each client gets a listener thread that blocks on its connector and
//! queues whatever arrives. The control loop ([`DspServer::start_listening`])
//! runs on the caller's thread and handles one message at a time. Listening
//! and processing are independent: the loop may exit while audio keeps
//! running, and audio may stop while clients stay connected.

mod connector;
mod error;
mod message;
mod queue;
mod stream_connector;
pub mod wire;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::audio::{DeviceInfo, DeviceManager};
use crate::config::{ServerConfig, StreamSelection};
use crate::effect::EffectCatalog;
use crate::engine::{EffectChain, ProcessSettings, ProcessingGraph, ProcessingState, ProcessingThread};
use crate::sync::lock;
use crate::types::{ChannelId, Direction, EffectId, StreamId, CLIENTS_MAX};

pub use connector::{ChannelClient, ChannelConnector, ClientConnector};
pub use error::{ServerError, ServerResult};
pub use message::{InboundMessage, MessageType, OutboundMessage, Payload, Request};
pub use queue::ControlQueue;
pub use stream_connector::StreamConnector;

/// One occupied client slot
struct ClientSlot {
    connector: Arc<dyn ClientConnector>,
    /// Cleared before the connector is shut down, so the listener can tell
    /// a requested stop from a client that went away
    watching: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Selection {
    input: Option<StreamSelection>,
    output: Option<StreamSelection>,
}

/// The audio effects server
pub struct DspServer {
    config: ServerConfig,
    devices: Mutex<DeviceManager>,
    catalog: EffectCatalog,
    chain: Arc<EffectChain>,
    process: ProcessingThread,
    queue: Arc<ControlQueue<InboundMessage>>,
    /// Slot `i` holds channel `i + 1`
    clients: Mutex<Vec<Option<ClientSlot>>>,
    selection: Mutex<Selection>,
    exit: AtomicBool,
    /// Number of times a listening session was ended
    sessions_ended: AtomicUsize,
    shut_down: AtomicBool,
}

impl DspServer {
    /// Create a server over already acquired devices
    pub fn new(config: ServerConfig, devices: DeviceManager, catalog: EffectCatalog) -> Self {
        let chain = Arc::new(EffectChain::new(config.sample_rate, config.input_channels));
        let graph: Arc<dyn ProcessingGraph> = chain.clone();
        let process = ProcessingThread::new(graph, config.process_settings());

        log::info!(
            "[SERVER] {} Hz, {} frames, {} channel(s), {} catalog effect(s)",
            config.sample_rate,
            config.buffer_size,
            chain.input_channels(),
            catalog.entries().len()
        );

        Self {
            config,
            devices: Mutex::new(devices),
            catalog,
            chain,
            process,
            queue: Arc::new(ControlQueue::new()),
            clients: Mutex::new((0..CLIENTS_MAX).map(|_| None).collect()),
            selection: Mutex::new(Selection::default()),
            exit: AtomicBool::new(false),
            sessions_ended: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn catalog(&self) -> &EffectCatalog {
        &self.catalog
    }

    // ─────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────

    /// Start audio processing; returns once audio flows
    pub fn start(&self) -> ServerResult<()> {
        self.process.start_processing()?;
        Ok(())
    }

    pub fn stop(&self) {
        self.process.stop_processing();
    }

    pub fn state(&self) -> ProcessingState {
        self.process.state()
    }

    pub fn process_settings(&self) -> ProcessSettings {
        self.process.settings()
    }

    /// Change the buffer length; applied at the next start
    pub fn set_buffer_size(&self, frames: usize) -> ServerResult<()> {
        self.process.set_buffer_size(frames)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Devices and streams
    // ─────────────────────────────────────────────────────────────

    /// Describe every device, re-running detection first if asked
    pub fn device_list(&self, redetect: bool) -> ServerResult<Vec<DeviceInfo>> {
        let mut devices = lock(&self.devices);
        if redetect {
            devices.refresh()?;
        }
        Ok(devices.device_list())
    }

    pub fn set_input_stream(&self, device: &str, stream: StreamId) -> ServerResult<()> {
        self.set_stream(Direction::Input, device, stream)
    }

    pub fn set_output_stream(&self, device: &str, stream: StreamId) -> ServerResult<()> {
        self.set_stream(Direction::Output, device, stream)
    }

    /// Route the chain's Input or Output sentinel to a device stream
    ///
    /// A running chain keeps the streams it started with until the next
    /// start.
    pub fn set_stream(&self, direction: Direction, device: &str, stream: StreamId) -> ServerResult<()> {
        {
            let devices = lock(&self.devices);
            match direction {
                Direction::Input => {
                    let handle = devices
                        .input_stream(device, stream)
                        .map_err(|e| ServerError::SetStream(e.to_string()))?;
                    self.chain.set_input_stream(handle);
                }
                Direction::Output => {
                    let handle = devices
                        .output_stream(device, stream)
                        .map_err(|e| ServerError::SetStream(e.to_string()))?;
                    self.chain.set_output_stream(handle);
                }
            }
        }

        let selected = StreamSelection {
            device: device.to_string(),
            stream,
        };
        let mut selection = lock(&self.selection);
        match direction {
            Direction::Input => selection.input = Some(selected),
            Direction::Output => selection.output = Some(selected),
        }
        drop(selection);

        log::info!("[SERVER] {} stream set to {}:{}", direction.name(), device, stream);
        if self.state() == ProcessingState::Running {
            log::info!("[SERVER] Stream change applies at the next start");
        }
        Ok(())
    }

    /// Currently selected stream for `direction`
    pub fn stream(&self, direction: Direction) -> Option<StreamSelection> {
        let selection = lock(&self.selection);
        match direction {
            Direction::Input => selection.input.clone(),
            Direction::Output => selection.output.clone(),
        }
    }

    /// Select the streams named in the config, logging failures
    pub fn apply_default_streams(&self) {
        let defaults = [
            (Direction::Input, self.config.input.clone()),
            (Direction::Output, self.config.output.clone()),
        ];
        for (direction, selection) in defaults {
            if let Some(selection) = selection {
                if let Err(e) = self.set_stream(direction, &selection.device, selection.stream) {
                    log::warn!("[SERVER] Default {} stream unavailable: {}", direction.name(), e);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Effects
    // ─────────────────────────────────────────────────────────────

    /// Instantiate catalog effect `effect` and insert it at `position`
    pub fn add_effect(&self, effect: &str, position: i64) -> ServerResult<EffectId> {
        let channels = self.chain.channels_at(position);
        let instance = self.catalog.create_effect(
            effect,
            channels,
            self.chain.sample_rate(),
            &self.config.ladspa_path,
        )?;
        let id = self.chain.add_effect(instance, position)?;
        log::info!("[SERVER] Added {} as effect {}", effect, id);
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────
    // Clients
    // ─────────────────────────────────────────────────────────────

    /// Register a client and start listening to it
    ///
    /// The client is told its channel id with `SEND_CLIENT_ID`.
    pub fn listen_on(&self, connector: Arc<dyn ClientConnector>) -> ServerResult<ChannelId> {
        let channel_id = {
            let mut clients = lock(&self.clients);
            let Some(index) = clients.iter().position(Option::is_none) else {
                let error = ServerError::ClientsFull(CLIENTS_MAX);
                log::error!("[SERVER] Rejected {}: {}", connector.name(), error);
                return Err(error);
            };
            let channel_id = index as ChannelId + 1;

            let watching = Arc::new(AtomicBool::new(true));
            let listener = spawn_listener(channel_id, connector.clone(), watching.clone(), self.queue.clone())
                .map_err(|e| {
                    let error = ServerError::Listen {
                        name: connector.name().to_string(),
                        reason: e.to_string(),
                    };
                    log::error!("[SERVER] {}", error);
                    error
                })?;

            clients[index] = Some(ClientSlot {
                connector: connector.clone(),
                watching,
                listener: Some(listener),
            });
            channel_id
        };

        log::info!("[SERVER] Client {} connected on channel {}", connector.name(), channel_id);
        if let Err(e) = connector.send(&OutboundMessage::client_id(channel_id)) {
            log::warn!("[SERVER] {}", e);
        }
        Ok(channel_id)
    }

    /// Forget the client on `channel_id` and stop its listener
    ///
    /// When the last client leaves, the control loop is told to exit.
    pub fn client_out(&self, channel_id: ChannelId) {
        let (slot, remaining) = {
            let mut clients = lock(&self.clients);
            let slot = (channel_id as usize)
                .checked_sub(1)
                .and_then(|index| clients.get_mut(index))
                .and_then(Option::take);
            (slot, clients.iter().filter(|c| c.is_some()).count())
        };

        let Some(slot) = slot else {
            log::debug!("[SERVER] Channel {} is not connected", channel_id);
            return;
        };

        log::info!("[SERVER] Client {} left channel {}", slot.connector.name(), channel_id);
        release_slot(slot);

        if remaining == 0 {
            self.stop_listening();
        }
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).iter().filter(|c| c.is_some()).count()
    }

    /// Queue a message for the control loop
    pub fn process_message(&self, message: InboundMessage) {
        if !self.queue.push_back(message) {
            log::debug!("[SERVER] Queue disabled, message dropped");
        }
    }

    /// Send `message` to every connected client
    pub fn broadcast_message(&self, message: &OutboundMessage) {
        let connectors: Vec<Arc<dyn ClientConnector>> = lock(&self.clients)
            .iter()
            .flatten()
            .map(|slot| slot.connector.clone())
            .collect();
        for connector in connectors {
            if let Err(e) = connector.send(message) {
                log::warn!("[SERVER] {}", e);
            }
        }
    }

    /// Run the control loop on the calling thread until told to exit
    ///
    /// An exit requested before the loop starts ends it right away.
    pub fn start_listening(&self) {
        self.queue.clear_interrupts();
        log::info!("[SERVER] Listening");

        while !self.exit.load(Ordering::SeqCst) {
            match self.queue.pop_front() {
                Some(message) => {
                    let reply = message.instruct(self);
                    self.broadcast_message(&reply);
                }
                None if !self.queue.is_enabled() => break,
                None => {}
            }
        }
        // The exit request is consumed; the next session starts fresh
        self.exit.store(false, Ordering::SeqCst);
        log::info!("[SERVER] Stopped listening");
    }

    /// End the control loop; only the first call per session has an effect
    ///
    /// Audio processing is left running; see [`shutdown`](Self::shutdown).
    pub fn stop_listening(&self) {
        if self.exit.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sessions_ended.fetch_add(1, Ordering::SeqCst);
        self.queue.interrupt();
        log::info!("[SERVER] Exit requested");
    }

    /// Stop everything and release the devices; idempotent
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("[SERVER] Shutting down");
        self.stop_listening();
        self.process.stop_processing();

        let slots: Vec<ClientSlot> = lock(&self.clients).iter_mut().filter_map(Option::take).collect();
        for slot in slots {
            release_slot(slot);
        }

        self.queue.disable();
        lock(&self.devices).release();
    }
}

impl Drop for DspServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stop watching a client, unblock its listener and reap it
fn release_slot(mut slot: ClientSlot) {
    slot.watching.store(false, Ordering::SeqCst);
    slot.connector.shutdown();
    if let Some(listener) = slot.listener.take() {
        // A listener cannot join itself
        if listener.thread().id() != std::thread::current().id() && listener.join().is_err() {
            log::error!("[SERVER] Listener for {} panicked", slot.connector.name());
        }
    }
}

fn spawn_listener(
    channel_id: ChannelId,
    connector: Arc<dyn ClientConnector>,
    watching: Arc<AtomicBool>,
    queue: Arc<ControlQueue<InboundMessage>>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("alchemy-client-{}", channel_id))
        .spawn(move || {
            while watching.load(Ordering::SeqCst) {
                match connector.read() {
                    Some(request) => {
                        queue.push_back(InboundMessage::new(channel_id, request));
                    }
                    None => {
                        // The client went away on its own
                        if watching.load(Ordering::SeqCst) {
                            log::debug!("[SERVER] Channel {} closed", channel_id);
                            queue.push_back(InboundMessage::new(channel_id, Request::ClientOut));
                        }
                        break;
                    }
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VirtualDriver;
    use crate::config::DriverConfig;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn server() -> DspServer {
        let config = ServerConfig {
            realtime_priority: None,
            start_timeout_ms: 2000,
            ladspa_path: Vec::new(),
            drivers: DriverConfig {
                cpal: false,
                virtual_device: true,
            },
            ..ServerConfig::default()
        };
        let mut devices = DeviceManager::new().with_driver(Box::new(VirtualDriver::default()));
        devices.acquire().unwrap();
        DspServer::new(config, devices, EffectCatalog::builtin())
    }

    /// Next reply that is not a client id announcement
    fn next_ack(client: &ChannelClient) -> OutboundMessage {
        loop {
            let message = client.recv_timeout(TIMEOUT).expect("reply");
            if message.kind == MessageType::Ack {
                return message;
            }
        }
    }

    #[test]
    fn test_client_lifecycle() {
        let server = server();
        let mut clients = Vec::new();
        for i in 0..CLIENTS_MAX {
            let (connector, client) = ChannelConnector::pair(format!("client{}", i));
            let channel = server.listen_on(Arc::new(connector)).unwrap();
            assert_eq!(channel, i as ChannelId + 1);
            let hello = client.recv_timeout(TIMEOUT).unwrap();
            assert_eq!(hello.kind, MessageType::SendClientId);
            assert_eq!(hello.payload, Some(Payload::NewClient { new_client: channel }));
            clients.push(client);
        }

        let (extra, _extra_client) = ChannelConnector::pair("extra");
        assert!(matches!(
            server.listen_on(Arc::new(extra)),
            Err(ServerError::ClientsFull(CLIENTS_MAX))
        ));
        assert_eq!(server.client_count(), CLIENTS_MAX);

        for channel in 1..CLIENTS_MAX as ChannelId {
            server.client_out(channel);
            assert_eq!(server.sessions_ended.load(Ordering::SeqCst), 0);
        }
        server.client_out(CLIENTS_MAX as ChannelId);
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.sessions_ended.load(Ordering::SeqCst), 1);

        // Unknown channels and repeated exits change nothing
        server.client_out(3);
        server.stop_listening();
        assert_eq!(server.sessions_ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let server = server();
        let (a, _client_a) = ChannelConnector::pair("a");
        let (b, _client_b) = ChannelConnector::pair("b");
        assert_eq!(server.listen_on(Arc::new(a)).unwrap(), 1);
        assert_eq!(server.listen_on(Arc::new(b)).unwrap(), 2);

        server.client_out(1);
        let (c, _client_c) = ChannelConnector::pair("c");
        assert_eq!(server.listen_on(Arc::new(c)).unwrap(), 1);
    }

    #[test]
    fn test_dropped_client_is_synthesized_out() {
        let server = server();
        let (connector, client) = ChannelConnector::pair("gone");
        server.listen_on(Arc::new(connector)).unwrap();
        drop(client);

        // The listener queues CLIENT_OUT; handling it ends the session
        server.start_listening();
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.sessions_ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_before_listening_is_kept() {
        let server = server();
        server.stop_listening();
        // Returns at once instead of blocking on the empty queue
        server.start_listening();
        assert_eq!(server.sessions_ended.load(Ordering::SeqCst), 1);

        // The next session runs until it is told to exit again
        let (connector, client) = ChannelConnector::pair("late");
        server.listen_on(Arc::new(connector)).unwrap();
        std::thread::scope(|scope| {
            scope.spawn(|| server.start_listening());
            client.send(Request::GetState);
            assert_eq!(next_ack(&client).ack_for, Some(MessageType::GetState));
            client.send(Request::Exit);
            assert_eq!(next_ack(&client).ack_for, Some(MessageType::Exit));
        });
        assert_eq!(server.sessions_ended.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_control_session() {
        let server = server();
        let (connector, client) = ChannelConnector::pair("test");
        let channel = server.listen_on(Arc::new(connector)).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| server.start_listening());

            client.send(Request::Start);
            let reply = next_ack(&client);
            assert_eq!(reply.ack_for, Some(MessageType::Start));
            assert_eq!(reply.channel_id, channel);
            assert!(reply.error.as_deref().unwrap_or_default().contains("no input stream"));

            client.send(Request::SetStream {
                device_id: "virtual".into(),
                stream_id: 1,
                direction: Direction::Input,
            });
            assert!(!next_ack(&client).is_error());
            client.send(Request::SetStream {
                device_id: "virtual".into(),
                stream_id: 0,
                direction: Direction::Output,
            });
            assert!(!next_ack(&client).is_error());
            client.send(Request::SetStream {
                device_id: "nope".into(),
                stream_id: 0,
                direction: Direction::Output,
            });
            assert!(next_ack(&client).error.unwrap().starts_with("set-stream error"));

            client.send(Request::Start);
            let reply = next_ack(&client);
            assert!(!reply.is_error(), "{:?}", reply.error);

            client.send(Request::AddEffect {
                effect: "gain".into(),
                position: -1,
            });
            let reply = next_ack(&client);
            assert_eq!(reply.payload, Some(Payload::Added { effect_id: EffectId(1) }));

            client.send(Request::GetState);
            match next_ack(&client).payload {
                Some(Payload::State { state, bypassed, .. }) => {
                    assert_eq!(state, ProcessingState::Running);
                    assert!(!bypassed);
                }
                other => panic!("unexpected payload {:?}", other),
            }

            client.send(Request::GetEffectParam {
                effect_id: EffectId(9),
                param: crate::effect::ParamRef::Id(0),
            });
            let reply = next_ack(&client);
            assert!(reply.is_error());
            assert!(matches!(reply.payload, Some(Payload::ParamValue { value, .. }) if value == 0.0));

            client.send(Request::Stop);
            assert!(!next_ack(&client).is_error());

            client.send(Request::Exit);
            assert_eq!(next_ack(&client).ack_for, Some(MessageType::Exit));
        });

        assert_eq!(server.state(), ProcessingState::Stopped);
        assert_eq!(server.stream(Direction::Input).unwrap().stream, 1);
        server.shutdown();
        server.shutdown();
    }
}
