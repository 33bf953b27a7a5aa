//! Outbound event dispatch
//!
//! Every event for a session goes through one [`EventSink`]. The connection
//! owns the receiving end and is the only writer to the socket, so events
//! reach the client in emission order.

use tokio::sync::mpsc;

use parley_core::ServerEvent;

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiver the connection drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue an event. Returns false once the connection has gone away.
    pub fn emit(&self, event: ServerEvent) -> bool {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(event = kind, "Dropping event for closed connection");
                false
            }
        }
    }
}
