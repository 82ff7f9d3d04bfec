//! Interactive terminal client
//!
//! Reads one command per line from stdin and prints replies in a short
//! human readable form. Type `help` for the command list.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use crossbeam::channel::{self, Receiver, Sender};

use alchemy_core::effect::ParamRef;
use alchemy_core::server::{ClientConnector, OutboundMessage, Request, ServerError, ServerResult};
use alchemy_core::{Direction, EffectId};

const HELP: &str = "\
commands:
  start | stop | exit | quit
  state | chain | effects | bypass
  devicelist [redetect]
  input <device> <stream>     select the capture stream
  output <device> <stream>    select the playback stream
  buffer <frames>
  add <effect> [position]
  remove <effect-id>
  set <effect-id> <param> <value>
  get <effect-id> <param>
  (effect-id: number, 'input' or 'output'; param: index or name)";

/// Connector driven by a human at the terminal
pub struct TerminalConnector {
    requests: Receiver<Request>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

impl TerminalConnector {
    pub fn new() -> ServerResult<Self> {
        let (request_tx, request_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);

        std::thread::Builder::new()
            .name("alchemy-terminal".to_string())
            .spawn(move || read_commands(request_tx))
            .map_err(|e| ServerError::Listen {
                name: "terminal".to_string(),
                reason: e.to_string(),
            })?;

        println!("Type 'help' for a list of commands.");
        Ok(Self {
            requests: request_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        })
    }
}

fn read_commands(requests: Sender<Request>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("[TERMINAL] Read error: {}", e);
                return;
            }
        };
        match parse_command(&line) {
            Ok(Some(request)) => {
                if requests.send(request).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(message) => println!("{}", message),
        }
    }
}

fn parse_effect_id(word: &str) -> Result<EffectId, String> {
    match word {
        "input" => Ok(EffectId::INPUT),
        "output" => Ok(EffectId::OUTPUT),
        _ => word
            .parse()
            .map(EffectId)
            .map_err(|_| format!("not an effect id: {}", word)),
    }
}

fn parse_param(word: &str) -> ParamRef {
    match word.parse() {
        Ok(id) => ParamRef::Id(id),
        Err(_) => ParamRef::Name(word.to_string()),
    }
}

fn parse_number<T: std::str::FromStr>(word: &str, what: &str) -> Result<T, String> {
    word.parse().map_err(|_| format!("invalid {}: {}", what, word))
}

/// Turn a command line into a request
///
/// `Ok(None)` for blank lines and `help`; `Err` carries the text to show.
pub fn parse_command(line: &str) -> Result<Option<Request>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else {
        return Ok(None);
    };

    let request = match (command, args) {
        ("help", _) => return Err(HELP.to_string()),
        ("start", []) => Request::Start,
        ("stop", []) => Request::Stop,
        ("exit", []) => Request::Exit,
        ("quit", []) => Request::ClientOut,
        ("state", []) => Request::GetState,
        ("chain", []) => Request::GetChain,
        ("effects", []) => Request::GetEffectDatabase,
        ("bypass", []) => Request::Bypass,
        ("devicelist", []) => Request::GetDeviceList { redetect: false },
        ("devicelist", ["redetect"]) => Request::GetDeviceList { redetect: true },
        ("input" | "output", [device, stream]) => Request::SetStream {
            device_id: device.to_string(),
            stream_id: parse_number(stream, "stream id")?,
            direction: if command == "input" {
                Direction::Input
            } else {
                Direction::Output
            },
        },
        ("buffer", [frames]) => Request::SetBufferSize {
            buffer_size: parse_number(frames, "buffer size")?,
        },
        ("add", [effect]) => Request::AddEffect {
            effect: effect.to_string(),
            position: -1,
        },
        ("add", [effect, position]) => Request::AddEffect {
            effect: effect.to_string(),
            position: parse_number(position, "position")?,
        },
        ("remove", [effect]) => Request::RemoveEffect {
            effect_id: parse_effect_id(effect)?,
        },
        ("set", [effect, param, value]) => Request::SetEffectParam {
            effect_id: parse_effect_id(effect)?,
            param: parse_param(param),
            value: parse_number(value, "value")?,
        },
        ("get", [effect, param]) => Request::GetEffectParam {
            effect_id: parse_effect_id(effect)?,
            param: parse_param(param),
        },
        _ => return Err(format!("unknown command '{}', try 'help'", line.trim())),
    };
    Ok(Some(request))
}

/// One line per reply, payload as compact JSON
pub fn render(message: &OutboundMessage) -> String {
    let kind = match message.ack_for {
        Some(kind) => format!("{:?}", kind),
        None => format!("{:?}", message.kind),
    };
    if let Some(error) = &message.error {
        return format!("[{}] {}: error: {}", message.channel_id, kind, error);
    }
    match &message.payload {
        Some(payload) => match serde_json::to_string(payload) {
            Ok(json) => format!("[{}] {}: {}", message.channel_id, kind, json),
            Err(e) => format!("[{}] {}: <unprintable: {}>", message.channel_id, kind, e),
        },
        None => format!("[{}] {}: ok", message.channel_id, kind),
    }
}

impl ClientConnector for TerminalConnector {
    fn name(&self) -> &str {
        "terminal"
    }

    fn send(&self, message: &OutboundMessage) -> ServerResult<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", render(message))
            .and_then(|_| stdout.flush())
            .map_err(|e| ServerError::Send {
                name: "terminal".to_string(),
                reason: e.to_string(),
            })
    }

    fn read(&self) -> Option<Request> {
        crossbeam::select! {
            recv(self.requests) -> request => request.ok(),
            recv(self.shutdown_rx) -> _ => None,
        }
    }

    fn shutdown(&self) {
        if let Ok(mut sender) = self.shutdown_tx.lock() {
            sender.take();
        }
    }
}
