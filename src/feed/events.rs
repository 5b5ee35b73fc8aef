//! Client-level events and their listeners.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Error;

/// Event emitted by the channel client.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The transport opened
    Connect,
    /// The transport closed; the client accepts a new `connect`
    Close,
    /// Transport error, or an inbound frame that could not be decoded
    Error(Arc<Error>),
    /// Decoded inbound frame
    Message(Value),
}

type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Listeners<A> {
    handlers: RwLock<Vec<Listener<A>>>,
}

impl<A> Listeners<A> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, handler: Listener<A>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Calls every listener in registration order. Listeners may register more listeners;
    /// those run from the next event on.
    fn fire(&self, arg: &A) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in &handlers {
            handler(arg);
        }
    }
}

/// One registration and firing path per event, plus a broadcast of every event.
pub(crate) struct EventDispatcher {
    connect: Listeners<()>,
    close: Listeners<()>,
    error: Listeners<Error>,
    message: Listeners<Value>,
    broadcast_tx: broadcast::Sender<ClientEvent>,
}

impl EventDispatcher {
    pub(crate) fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            connect: Listeners::new(),
            close: Listeners::new(),
            error: Listeners::new(),
            message: Listeners::new(),
            broadcast_tx,
        }
    }

    pub(crate) fn on_connect<F: Fn() + Send + Sync + 'static>(&self, handler: F) {
        self.connect.add(Arc::new(move |&(): &()| handler()));
    }

    pub(crate) fn on_close<F: Fn() + Send + Sync + 'static>(&self, handler: F) {
        self.close.add(Arc::new(move |&(): &()| handler()));
    }

    pub(crate) fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, handler: F) {
        self.error.add(Arc::new(handler));
    }

    pub(crate) fn on_message<F: Fn(&Value) + Send + Sync + 'static>(&self, handler: F) {
        self.message.add(Arc::new(handler));
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.broadcast_tx.subscribe()
    }

    pub(crate) fn emit_connect(&self) {
        self.connect.fire(&());
        _ = self.broadcast_tx.send(ClientEvent::Connect);
    }

    pub(crate) fn emit_close(&self) {
        self.close.fire(&());
        _ = self.broadcast_tx.send(ClientEvent::Close);
    }

    pub(crate) fn emit_error(&self, error: Error) {
        self.error.fire(&error);
        _ = self.broadcast_tx.send(ClientEvent::Error(Arc::new(error)));
    }

    pub(crate) fn emit_message(&self, frame: Value) {
        self.message.fire(&frame);
        _ = self.broadcast_tx.send(ClientEvent::Message(frame));
    }
}
