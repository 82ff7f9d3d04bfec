//! Client connectors
//!
//! A connector is the server's end of one client transport. The server
//! runs a listener thread per connector that blocks in [`ClientConnector::read`]
//! and queues whatever arrives; replies go out through
//! [`ClientConnector::send`].

use std::sync::Mutex;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::error::{ServerError, ServerResult};
use super::message::{OutboundMessage, Request};
use crate::sync::lock;

/// Server side of a client transport
pub trait ClientConnector: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a message to the client
    fn send(&self, message: &OutboundMessage) -> ServerResult<()>;

    /// Block until the next request; `None` once the client is gone or the
    /// connector was shut down
    fn read(&self) -> Option<Request>;

    /// Release the transport and unblock a pending `read`
    fn shutdown(&self);
}

/// In-process connector over crossbeam channels
pub struct ChannelConnector {
    name: String,
    requests: Receiver<Request>,
    replies: Sender<OutboundMessage>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

/// Client end of a [`ChannelConnector`]
pub struct ChannelClient {
    requests: Sender<Request>,
    replies: Receiver<OutboundMessage>,
}

impl ChannelConnector {
    /// Create a connected connector/client pair
    pub fn pair(name: impl Into<String>) -> (Self, ChannelClient) {
        let (request_tx, request_rx) = channel::unbounded();
        let (reply_tx, reply_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        let connector = Self {
            name: name.into(),
            requests: request_rx,
            replies: reply_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        };
        let client = ChannelClient {
            requests: request_tx,
            replies: reply_rx,
        };
        (connector, client)
    }
}

impl ClientConnector for ChannelConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: &OutboundMessage) -> ServerResult<()> {
        self.replies.send(message.clone()).map_err(|_| ServerError::Send {
            name: self.name.clone(),
            reason: "client dropped".to_string(),
        })
    }

    fn read(&self) -> Option<Request> {
        crossbeam::select! {
            recv(self.requests) -> request => request.ok(),
            recv(self.shutdown_rx) -> _ => None,
        }
    }

    fn shutdown(&self) {
        // Dropping the sender disconnects `shutdown_rx`, waking `read`
        lock(&self.shutdown_tx).take();
    }
}

impl ChannelClient {
    /// Send a request; `false` if the connector is gone
    pub fn send(&self, request: Request) -> bool {
        self.requests.send(request).is_ok()
    }

    /// Wait for the next message from the server
    pub fn recv_timeout(&self, timeout: Duration) -> Option<OutboundMessage> {
        match self.replies.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::message::MessageType;
    use std::sync::Arc;

    #[test]
    fn test_requests_and_replies_flow() {
        let (connector, client) = ChannelConnector::pair("test");
        assert!(client.send(Request::GetState));
        assert_eq!(connector.read(), Some(Request::GetState));

        connector.send(&OutboundMessage::ack(MessageType::GetState, 1)).unwrap();
        let reply = client.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(reply.ack_for, Some(MessageType::GetState));
    }

    #[test]
    fn test_dropped_client_reads_none() {
        let (connector, client) = ChannelConnector::pair("test");
        drop(client);
        assert_eq!(connector.read(), None);
        assert!(connector.send(&OutboundMessage::client_id(1)).is_err());
    }

    #[test]
    fn test_shutdown_unblocks_read() {
        let (connector, _client) = ChannelConnector::pair("test");
        let connector = Arc::new(connector);
        let reader = {
            let connector = connector.clone();
            std::thread::spawn(move || connector.read())
        };
        std::thread::sleep(Duration::from_millis(20));
        connector.shutdown();
        assert_eq!(reader.join().unwrap(), None);
    }
}
