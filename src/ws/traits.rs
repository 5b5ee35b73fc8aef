//! Transport capability traits.
//!
//! The channel client never talks to a socket directly. It asks a [`Connector`]
//! for a [`Transport`] and receives the transport's lifecycle signals as
//! [`TransportEvent`]s pushed into an [`EventSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use url::Url;

use crate::Result;
use crate::error::Error;

/// Connection phase of a transport, ordinally encoded.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    /// Whether a transport in this state may still be handed outbound requests.
    #[must_use]
    pub const fn can_send(self) -> bool {
        (self as u8) <= (Self::Open as u8)
    }

    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Ready state shared between a transport handle and its I/O side.
#[derive(Debug, Clone)]
pub struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    #[must_use]
    pub fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    #[must_use]
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Stores `state`, returning the previous one.
    pub fn swap(&self, state: ReadyState) -> ReadyState {
        ReadyState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }

    /// Moves to `next` only if the current state is `current`.
    pub fn transition(&self, current: ReadyState, next: ReadyState) -> bool {
        self.0
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Lifecycle signal emitted by a transport.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Close,
    Error(Error),
    /// Text payload of an inbound frame
    Message(String),
}

/// Where a transport delivers its [`TransportEvent`]s.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event. Events sent after the client stopped listening are discarded.
    pub fn emit(&self, event: TransportEvent) {
        _ = self.tx.send(event);
    }
}

/// Socket-like handle owned by the client.
///
/// Implementations must not block in [`Transport::send`] or [`Transport::close`] and must not
/// call back into the client from them; the client invokes both while holding its state lock.
pub trait Transport: Send + Sync + 'static {
    /// Current connection phase.
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame for the remote end.
    fn send(&self, text: String) -> Result<()>;

    /// Begin closing. A [`TransportEvent::Close`] follows once the transport is closed.
    fn close(&self);
}

/// Creates transports for a connection URI.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Start connecting to `uri`, delivering lifecycle events into `events`.
    ///
    /// Must return without waiting for the connection to open.
    fn connect(&self, uri: &Url, events: EventSink) -> Result<Self::Transport>;
}
