//! In-process transport.
//!
//! [`MemoryConnector`] hands the client a [`MemoryTransport`] and keeps the matching
//! [`MemoryPeer`], which plays the remote end: it opens and closes the connection,
//! injects inbound frames and errors, and observes every frame the client sends.
//!
//! ```rust
//! use fenix_pipeline_sdk::feed::{Client, Config, SubscriptionKind};
//! use fenix_pipeline_sdk::ws::memory::MemoryConnector;
//!
//! # #[tokio::main]
//! # async fn main() -> fenix_pipeline_sdk::Result<()> {
//! let connector = MemoryConnector::new();
//! let client = Client::with_connector("K", Config::default(), connector.clone());
//! client.connect()?;
//!
//! let peer = connector.last_peer().expect("connect creates a peer");
//! client.subscribe(SubscriptionKind::AllTrades, None)?;
//! peer.open();
//!
//! let sent = peer.recv_sent().await.expect("queued request is replayed on open");
//! assert_eq!(sent, r#"{"request":"subscribe","channel":"trades/all"}"#);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use url::Url;

use super::error::WsError;
use super::traits::{Connector, EventSink, ReadyState, SharedReadyState, Transport, TransportEvent};
use crate::Result;
use crate::error::Error;

/// Connector whose transports live in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    peers: Arc<Mutex<Vec<Arc<MemoryPeer>>>>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote ends of every transport created so far, oldest first.
    #[must_use]
    pub fn peers(&self) -> Vec<Arc<MemoryPeer>> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remote end of the most recently created transport.
    #[must_use]
    pub fn last_peer(&self) -> Option<Arc<MemoryPeer>> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    fn connect(&self, uri: &Url, events: EventSink) -> Result<MemoryTransport> {
        let state = SharedReadyState::new(ReadyState::Connecting);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let peer = Arc::new(MemoryPeer {
            uri: uri.clone(),
            state: state.clone(),
            events: events.clone(),
            sent_rx: AsyncMutex::new(sent_rx),
        });
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer);

        Ok(MemoryTransport {
            state,
            sent_tx,
            events,
        })
    }
}

/// Client side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    state: SharedReadyState,
    sent_tx: mpsc::UnboundedSender<String>,
    events: EventSink,
}

impl Transport for MemoryTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.state.get().can_send() {
            return Err(WsError::ConnectionClosed.into());
        }
        self.sent_tx
            .send(text)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    fn close(&self) {
        if self.state.transition(ReadyState::Open, ReadyState::Closed) {
            self.events.emit(TransportEvent::Close);
        }
    }
}

/// Remote end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    uri: Url,
    state: SharedReadyState,
    events: EventSink,
    sent_rx: AsyncMutex<mpsc::UnboundedReceiver<String>>,
}

impl MemoryPeer {
    /// URI the client connected with, including its query parameters.
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    /// Accept the connection. Has no effect unless the transport is connecting.
    pub fn open(&self) {
        if self.state.transition(ReadyState::Connecting, ReadyState::Open) {
            self.events.emit(TransportEvent::Open);
        }
    }

    /// Deliver an inbound text frame.
    pub fn deliver(&self, text: &str) {
        self.events.emit(TransportEvent::Message(text.to_owned()));
    }

    /// Report a transport error. The connection state is left untouched.
    pub fn fail(&self, error: Error) {
        self.events.emit(TransportEvent::Error(error));
    }

    /// Enter the closing phase without finishing the close.
    pub fn begin_closing(&self) {
        if self.state.get() != ReadyState::Closed {
            self.state.set(ReadyState::Closing);
        }
    }

    /// Close the connection from the remote side. Closing twice emits a single close.
    pub fn close(&self) {
        if self.state.swap(ReadyState::Closed) != ReadyState::Closed {
            self.events.emit(TransportEvent::Close);
        }
    }

    /// Next frame sent by the client, waiting for one if none is buffered.
    ///
    /// Returns `None` once the client dropped the transport and every frame was read.
    pub async fn recv_sent(&self) -> Option<String> {
        self.sent_rx.lock().await.recv().await
    }

    /// Next buffered frame sent by the client, without waiting.
    #[must_use]
    pub fn try_recv_sent(&self) -> Option<String> {
        self.sent_rx.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(connector: &MemoryConnector) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (sink, rx) = EventSink::channel();
        let uri = Url::parse("ws://localhost:8765").unwrap();
        (connector.connect(&uri, sink).unwrap(), rx)
    }

    #[test]
    fn peer_open_emits_single_open_event() {
        let connector = MemoryConnector::new();
        let (transport, mut rx) = connect(&connector);
        let peer = connector.last_peer().unwrap();

        assert_eq!(transport.ready_state(), ReadyState::Connecting);
        peer.open();
        peer.open();

        assert_eq!(transport.ready_state(), ReadyState::Open);
        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Open)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sent_frames_reach_peer() {
        let connector = MemoryConnector::new();
        let (transport, _rx) = connect(&connector);
        let peer = connector.last_peer().unwrap();
        peer.open();

        transport.send("hello".to_owned()).unwrap();

        assert_eq!(peer.try_recv_sent().as_deref(), Some("hello"));
        assert!(peer.try_recv_sent().is_none());
    }

    #[test]
    fn send_after_close_fails() {
        let connector = MemoryConnector::new();
        let (transport, mut rx) = connect(&connector);
        let peer = connector.last_peer().unwrap();
        peer.open();

        transport.close();

        assert_eq!(peer.ready_state(), ReadyState::Closed);
        assert!(transport.send("late".to_owned()).is_err());
        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Open)));
        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Close)));
    }

    #[test]
    fn close_while_connecting_is_ignored() {
        let connector = MemoryConnector::new();
        let (transport, mut rx) = connect(&connector);

        transport.close();

        assert_eq!(transport.ready_state(), ReadyState::Connecting);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn peer_close_is_reported_once() {
        let connector = MemoryConnector::new();
        let (_transport, mut rx) = connect(&connector);
        let peer = connector.last_peer().unwrap();

        peer.close();
        peer.close();

        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Close)));
        assert!(rx.try_recv().is_err());
    }
}
