//! Control protocol
//!
//! Clients send requests tagged by `type`:
//!
//! ```json
//! {"type": "SET_STREAM", "device_id": "virtual", "stream_id": 1, "direction": "INPUT"}
//! ```
//!
//! Every request gets exactly one reply, broadcast to all clients:
//!
//! ```json
//! {"type": "ACK", "ack_for": "SET_STREAM", "channel_id": 1}
//! ```
//!
//! A reply without `error` means success. Replies may carry a payload
//! (device list, chain, parameter value) flattened into the same object.

use serde::{Deserialize, Serialize};

use super::error::ServerError;
use super::DspServer;
use crate::audio::DeviceInfo;
use crate::effect::{CatalogEntry, ParamRef};
use crate::engine::{ChainEntry, ProcessingState};
use crate::types::{ChannelId, Direction, EffectId, StreamId};

/// Every message type on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Start,
    Stop,
    Exit,
    GetDeviceList,
    SetStream,
    GetStream,
    GetState,
    ClientOut,
    SetBufferSize,
    GetEffectDatabase,
    AddEffect,
    RemoveEffect,
    SetEffectParam,
    GetEffectParam,
    Bypass,
    GetChain,
    Ack,
    SendClientId,
}

fn append() -> i64 {
    -1
}

/// A client request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Start,
    Stop,
    /// End the control loop; audio processing keeps its current state
    Exit,
    GetDeviceList {
        #[serde(default)]
        redetect: bool,
    },
    SetStream {
        device_id: String,
        stream_id: StreamId,
        direction: Direction,
    },
    GetStream {
        direction: Direction,
    },
    GetState,
    ClientOut,
    SetBufferSize {
        buffer_size: usize,
    },
    GetEffectDatabase,
    AddEffect {
        effect: String,
        #[serde(default = "append")]
        position: i64,
    },
    RemoveEffect {
        effect_id: EffectId,
    },
    SetEffectParam {
        effect_id: EffectId,
        param: ParamRef,
        value: f64,
    },
    GetEffectParam {
        effect_id: EffectId,
        param: ParamRef,
    },
    Bypass,
    GetChain,
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Start => MessageType::Start,
            Request::Stop => MessageType::Stop,
            Request::Exit => MessageType::Exit,
            Request::GetDeviceList { .. } => MessageType::GetDeviceList,
            Request::SetStream { .. } => MessageType::SetStream,
            Request::GetStream { .. } => MessageType::GetStream,
            Request::GetState => MessageType::GetState,
            Request::ClientOut => MessageType::ClientOut,
            Request::SetBufferSize { .. } => MessageType::SetBufferSize,
            Request::GetEffectDatabase => MessageType::GetEffectDatabase,
            Request::AddEffect { .. } => MessageType::AddEffect,
            Request::RemoveEffect { .. } => MessageType::RemoveEffect,
            Request::SetEffectParam { .. } => MessageType::SetEffectParam,
            Request::GetEffectParam { .. } => MessageType::GetEffectParam,
            Request::Bypass => MessageType::Bypass,
            Request::GetChain => MessageType::GetChain,
        }
    }
}

/// Reply contents beyond the acknowledgement itself
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    NewClient {
        new_client: ChannelId,
    },
    Devices {
        devices: Vec<DeviceInfo>,
    },
    Stream {
        device_id: String,
        stream_id: StreamId,
        direction: Direction,
    },
    State {
        state: ProcessingState,
        bypassed: bool,
        buffer_size: usize,
        sample_rate: u32,
    },
    BufferSize {
        buffer_size: usize,
    },
    Effects {
        effects: Vec<CatalogEntry>,
    },
    Added {
        effect_id: EffectId,
    },
    ParamValue {
        effect_id: EffectId,
        param: ParamRef,
        value: f64,
    },
    Bypassed {
        bypassed: bool,
    },
    Chain {
        chain: Vec<ChainEntry>,
    },
}

/// A message sent from the server to its clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_for: Option<MessageType>,
    /// Channel the message answers (or is addressed to)
    pub channel_id: ChannelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Option<Payload>,
}

impl OutboundMessage {
    /// Acknowledge a request of type `ack_for` from `channel_id`
    pub fn ack(ack_for: MessageType, channel_id: ChannelId) -> Self {
        Self {
            kind: MessageType::Ack,
            ack_for: Some(ack_for),
            channel_id,
            error: None,
            payload: None,
        }
    }

    /// Tell a freshly registered client its channel id
    pub fn client_id(channel_id: ChannelId) -> Self {
        Self {
            kind: MessageType::SendClientId,
            ack_for: None,
            channel_id,
            error: None,
            payload: Some(Payload::NewClient {
                new_client: channel_id,
            }),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A request together with the channel it arrived on
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel_id: ChannelId,
    pub request: Request,
}

impl InboundMessage {
    pub fn new(channel_id: ChannelId, request: Request) -> Self {
        Self {
            channel_id,
            request,
        }
    }

    /// Carry out the request on `server` and build the reply
    pub fn instruct(self, server: &DspServer) -> OutboundMessage {
        let kind = self.request.message_type();
        let reply = OutboundMessage::ack(kind, self.channel_id);
        log::debug!("[SERVER] {:?} from channel {}", kind, self.channel_id);

        let result: Result<Option<Payload>, ServerError> = match self.request {
            Request::Start => server.start().map(|_| None),
            Request::Stop => {
                server.stop();
                Ok(None)
            }
            Request::Exit => {
                server.stop_listening();
                Ok(None)
            }
            Request::GetDeviceList { redetect } => server
                .device_list(redetect)
                .map(|devices| Some(Payload::Devices { devices })),
            Request::SetStream {
                device_id,
                stream_id,
                direction,
            } => server
                .set_stream(direction, &device_id, stream_id)
                .map(|_| None),
            Request::GetStream { direction } => server
                .stream(direction)
                .map(|selection| {
                    Some(Payload::Stream {
                        device_id: selection.device,
                        stream_id: selection.stream,
                        direction,
                    })
                })
                .ok_or(ServerError::NoStream(direction.name())),
            Request::GetState => {
                let settings = server.process_settings();
                Ok(Some(Payload::State {
                    state: server.state(),
                    bypassed: server.chain().is_bypassed(),
                    buffer_size: settings.frames,
                    sample_rate: settings.sample_rate,
                }))
            }
            Request::ClientOut => {
                server.client_out(self.channel_id);
                Ok(None)
            }
            Request::SetBufferSize { buffer_size } => server
                .set_buffer_size(buffer_size)
                .map(|_| Some(Payload::BufferSize { buffer_size })),
            Request::GetEffectDatabase => Ok(Some(Payload::Effects {
                effects: server.catalog().entries().to_vec(),
            })),
            Request::AddEffect { effect, position } => server
                .add_effect(&effect, position)
                .map(|effect_id| Some(Payload::Added { effect_id })),
            Request::RemoveEffect { effect_id } => server
                .chain()
                .remove_effect(effect_id)
                .map(|_| None)
                .map_err(ServerError::from),
            Request::SetEffectParam {
                effect_id,
                param,
                value,
            } => server
                .chain()
                .set_effect_param(effect_id, &param, value)
                .map(|value| {
                    Some(Payload::ParamValue {
                        effect_id,
                        param,
                        value,
                    })
                })
                .map_err(ServerError::from),
            Request::GetEffectParam { effect_id, param } => {
                // Unknown effects and params read as 0.0, flagged with an error
                let (value, error) = match server.chain().get_effect_param(effect_id, &param) {
                    Ok(value) => (value, None),
                    Err(e) => (0.0, Some(e)),
                };
                let reply = reply.with_payload(Payload::ParamValue {
                    effect_id,
                    param,
                    value,
                });
                return match error {
                    Some(e) => reply.with_error(e),
                    None => reply,
                };
            }
            Request::Bypass => Ok(Some(Payload::Bypassed {
                bypassed: server.chain().bypass(),
            })),
            Request::GetChain => Ok(Some(Payload::Chain {
                chain: server.chain().entries(),
            })),
        };

        match result {
            Ok(Some(payload)) => reply.with_payload(payload),
            Ok(None) => reply,
            Err(e) => {
                log::warn!("[SERVER] {:?} from channel {} failed: {}", kind, self.channel_id, e);
                reply.with_error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_decoding() {
        let start: Request = serde_json::from_str(r#"{"type":"START","channel_id":3}"#).unwrap();
        assert_eq!(start, Request::Start);

        let set: Request = serde_json::from_str(
            r#"{"type":"SET_STREAM","device_id":"virtual","stream_id":1,"direction":"INPUT"}"#,
        )
        .unwrap();
        assert_eq!(
            set,
            Request::SetStream {
                device_id: "virtual".into(),
                stream_id: 1,
                direction: Direction::Input
            }
        );

        let add: Request = serde_json::from_str(r#"{"type":"ADD_EFFECT","effect":"gain"}"#).unwrap();
        assert_eq!(
            add,
            Request::AddEffect {
                effect: "gain".into(),
                position: -1
            }
        );

        let param: Request = serde_json::from_str(
            r#"{"type":"SET_EFFECT_PARAM","effect_id":2,"param":"gain","value":0.5}"#,
        )
        .unwrap();
        assert_eq!(param.message_type(), MessageType::SetEffectParam);

        assert!(serde_json::from_str::<Request>(r#"{"type":"REBOOT"}"#).is_err());
    }

    #[test]
    fn test_ack_shape() {
        let ok = OutboundMessage::ack(MessageType::Start, 2);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ACK", "ack_for": "START", "channel_id": 2}));

        let failed = OutboundMessage::ack(MessageType::SetStream, 1).with_error("set-stream error: nope");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "set-stream error: nope");
    }

    #[test]
    fn test_payload_is_flattened() {
        let reply = OutboundMessage::ack(MessageType::Bypass, 1).with_payload(Payload::Bypassed { bypassed: true });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["bypassed"], true);
        assert_eq!(json["ack_for"], "BYPASS");

        let hello = serde_json::to_value(OutboundMessage::client_id(4)).unwrap();
        assert_eq!(
            hello,
            serde_json::json!({"type": "SEND_CLIENT_ID", "channel_id": 4, "new_client": 4})
        );
    }
}
