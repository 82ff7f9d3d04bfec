//! Connector over a byte stream pair
//!
//! Frames are JSON documents separated by the configured delimiter. A
//! background pump thread reads frames from the reader and hands decoded
//! requests to [`ClientConnector::read`]; the pump never touches the server.

use std::io::{BufReader, Read, Write};
use std::sync::Mutex;

use crossbeam::channel::{self, Receiver, Sender};

use super::connector::ClientConnector;
use super::error::{ServerError, ServerResult};
use super::message::{OutboundMessage, Request};
use super::wire;
use crate::sync::lock;

/// A client speaking delimited JSON over a `Read`/`Write` pair (e.g. stdio)
pub struct StreamConnector {
    name: String,
    delimiter: u8,
    writer: Mutex<Box<dyn Write + Send>>,
    requests: Receiver<Request>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

impl StreamConnector {
    pub fn new(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        delimiter: u8,
    ) -> ServerResult<Self> {
        let name = name.into();
        let (request_tx, request_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);

        let pump_name = name.clone();
        std::thread::Builder::new()
            .name(format!("alchemy-read-{}", name))
            .spawn(move || pump(pump_name, reader, delimiter, request_tx))
            .map_err(|e| ServerError::Listen {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            delimiter,
            writer: Mutex::new(Box::new(writer)),
            requests: request_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        })
    }
}

/// Read frames until EOF, an I/O error, or the connector going away
fn pump(name: String, reader: impl Read, delimiter: u8, requests: Sender<Request>) {
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();
    loop {
        match wire::read_frame(&mut reader, delimiter, &mut frame) {
            Ok(true) => {}
            Ok(false) => {
                log::info!("[CONNECTOR] {} closed its stream", name);
                return;
            }
            Err(e) => {
                log::warn!("[CONNECTOR] {} read error: {}", name, e);
                return;
            }
        }
        if wire::is_blank(&frame) {
            continue;
        }
        match wire::decode_request(&frame) {
            Ok(request) => {
                if requests.send(request).is_err() {
                    return;
                }
            }
            Err(e) => log::warn!(
                "[CONNECTOR] {} sent an invalid message ({}): {}",
                name,
                e,
                String::from_utf8_lossy(&frame)
            ),
        }
    }
}

impl ClientConnector for StreamConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: &OutboundMessage) -> ServerResult<()> {
        let send_error = |reason: String| ServerError::Send {
            name: self.name.clone(),
            reason,
        };
        let payload = wire::encode_message(message).map_err(|e| send_error(e.to_string()))?;
        let mut writer = lock(&self.writer);
        wire::write_frame(&mut *writer, &payload, self.delimiter).map_err(|e| send_error(e.to_string()))
    }

    fn read(&self) -> Option<Request> {
        crossbeam::select! {
            recv(self.requests) -> request => request.ok(),
            recv(self.shutdown_rx) -> _ => None,
        }
    }

    fn shutdown(&self) {
        lock(&self.shutdown_tx).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::message::MessageType;
    use std::io::Cursor;
    use std::sync::Arc;

    /// Writer whose bytes stay inspectable after being boxed
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reads_valid_frames_and_skips_garbage() {
        let input = b"{\"type\":\"GET_STATE\"}\n\nnot json\n{\"type\":\"BYPASS\"}\n".to_vec();
        let connector = StreamConnector::new("stdio", Cursor::new(input), SharedSink::default(), b'\n').unwrap();

        assert_eq!(connector.read(), Some(Request::GetState));
        assert_eq!(connector.read(), Some(Request::Bypass));
        // End of input
        assert_eq!(connector.read(), None);
    }

    #[test]
    fn test_send_writes_delimited_json() {
        let sink = SharedSink::default();
        let connector = StreamConnector::new("stdio", Cursor::new(Vec::new()), sink.clone(), b';').unwrap();
        connector.send(&OutboundMessage::ack(MessageType::Start, 1)).unwrap();

        let written = sink.0.lock().unwrap().clone();
        assert_eq!(written.last(), Some(&b';'));
        let json: serde_json::Value = serde_json::from_slice(&written[..written.len() - 1]).unwrap();
        assert_eq!(json["ack_for"], "START");
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_unblocks_read() {
        // A reader that never produces data
        let (_keep, blocked) = std::os::unix::net::UnixStream::pair().unwrap();
        let connector = Arc::new(StreamConnector::new("sock", blocked, SharedSink::default(), b'\n').unwrap());
        let reader = {
            let connector = connector.clone();
            std::thread::spawn(move || connector.read())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        connector.shutdown();
        assert_eq!(reader.join().unwrap(), None);
    }
}
