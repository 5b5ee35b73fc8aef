use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_stream::try_stream;
use futures::Stream;
use futures::StreamExt as _;
use secrecy::{ExposeSecret as _, SecretString};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

use super::config::Config;
use super::events::{ClientEvent, EventDispatcher};
use super::subscription::{Subscription, SubscriptionKind, channel_name};
use super::types::request::ChannelRequest;
use super::types::response::parse_frame;
use crate::error::{Error, Kind};
use crate::ws::{Connector, EventSink, ReadyState, Transport, TransportEvent, WsConnector, WsError};
use crate::{API_VERSION, Result};

/// Channel client for the Fenix trade pipeline.
///
/// Wraps one transport at a time. Subscribe and unsubscribe calls made while the transport is
/// still connecting are queued and replayed, in call order, once it opens. Inbound frames are
/// decoded and surfaced as `message` events; decoding failures and transport errors surface as
/// `error` events and never end the connection.
///
/// All methods return immediately. Must be used from within a Tokio runtime.
///
/// # Examples
///
/// ```rust, no_run
/// use fenix_pipeline_sdk::feed::{Client, SubscriptionKind};
/// use futures::StreamExt as _;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::new("my-api-key");
///     let mut messages = Box::pin(client.messages());
///
///     client.connect()?;
///     client.subscribe(SubscriptionKind::TradesByMarket, Some("btc-usdt"))?;
///
///     while let Some(frame) = messages.next().await {
///         println!("Frame: {}", frame?);
///     }
///
///     Ok(())
/// }
/// ```
pub struct Client<C: Connector = WsConnector> {
    inner: Arc<ClientInner<C>>,
}

impl<C: Connector> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ClientInner<C: Connector> {
    /// Access key forwarded as the `auth-token` query parameter
    api_key: SecretString,
    /// Base URI used by the next `connect`
    uri: RwLock<String>,
    /// Creates a transport per connection
    connector: C,
    /// Current transport, absent until `connect` and after the transport closes
    connection: Mutex<Option<Connection<C::Transport>>>,
    events: EventDispatcher,
    next_connection_id: AtomicU64,
}

struct Connection<T> {
    id: u64,
    transport: T,
    /// Whether the open signal has been handled; until then requests are queued
    opened: bool,
    pending: VecDeque<ChannelRequest>,
}

impl Client<WsConnector> {
    /// Create a client for the default endpoint. Does not connect.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self::with_connector(api_key, Config::default(), WsConnector)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client that opens its transports through `connector`. Does not connect.
    #[must_use]
    pub fn with_connector(api_key: &str, config: Config, connector: C) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                api_key: SecretString::from(api_key),
                uri: RwLock::new(config.uri),
                connector,
                connection: Mutex::new(None),
                events: EventDispatcher::new(config.event_capacity),
                next_connection_id: AtomicU64::new(0),
            }),
        }
    }

    /// Base URI used by the next [`connect`](Self::connect).
    #[must_use]
    pub fn uri(&self) -> String {
        self.inner
            .uri
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the base URI. Takes effect on the next [`connect`](Self::connect).
    pub fn set_uri(&self, uri: &str) {
        *self.inner.uri.write().unwrap_or_else(PoisonError::into_inner) = uri.to_owned();
    }

    /// Open a transport. Does nothing if one already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URI is invalid, no Tokio runtime is running, or the
    /// connector refuses to create a transport.
    pub fn connect(&self) -> Result<()> {
        self.open_connection(None::<fn()>)
    }

    /// Like [`connect`](Self::connect), registering `on_connect` as a `connect` listener first.
    ///
    /// The listener is only registered when a new transport is created.
    pub fn connect_with<F: Fn() + Send + Sync + 'static>(&self, on_connect: F) -> Result<()> {
        self.open_connection(Some(on_connect))
    }

    fn open_connection<F: Fn() + Send + Sync + 'static>(&self, on_connect: Option<F>) -> Result<()> {
        let mut connection = self.inner.lock_connection();
        if connection.is_some() {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|e| Error::with_source(Kind::Internal, e))?;

        let base = self.uri();
        #[cfg(feature = "tracing")]
        tracing::debug!(uri = %base, "connecting");
        let uri = connection_uri(&base, &self.inner.api_key)?;

        let (sink, mut event_rx) = EventSink::channel();
        let transport = self.inner.connector.connect(&uri, sink)?;

        if let Some(handler) = on_connect {
            self.inner.events.on_connect(handler);
        }

        let id = self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
        *connection = Some(Connection {
            id,
            transport,
            opened: false,
            pending: VecDeque::new(),
        });
        drop(connection);

        let inner = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if !inner.handle_event(id, event) {
                    break;
                }
            }
        });

        Ok(())
    }

    /// Close the transport if it is open; otherwise do nothing.
    pub fn close(&self) {
        let connection = self.inner.lock_connection();
        if let Some(connection) = connection.as_ref()
            && connection.transport.ready_state() == ReadyState::Open
        {
            connection.transport.close();
        }
    }

    /// Subscribe to the channel for `kind`, qualified by `name`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the channel name is invalid (see
    /// [`channel_name`]), if [`connect`](Self::connect) was not called (`not yet connected`),
    /// or if the transport is closing or closed (`no longer connected`).
    pub fn subscribe(&self, kind: SubscriptionKind, name: Option<&str>) -> Result<()> {
        let channel = channel_name(kind, name)?;
        self.send(ChannelRequest::subscribe(channel))
    }

    /// Unsubscribe from the channel for `kind`, qualified by `name`.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, kind: SubscriptionKind, name: Option<&str>) -> Result<()> {
        let channel = channel_name(kind, name)?;
        self.send(ChannelRequest::unsubscribe(channel))
    }

    /// Subscribe to a pre-validated [`Subscription`].
    pub fn subscribe_to(&self, subscription: &Subscription) -> Result<()> {
        self.send(ChannelRequest::subscribe(subscription.channel().to_owned()))
    }

    /// Unsubscribe from a pre-validated [`Subscription`].
    pub fn unsubscribe_from(&self, subscription: &Subscription) -> Result<()> {
        self.send(ChannelRequest::unsubscribe(
            subscription.channel().to_owned(),
        ))
    }

    fn send(&self, request: ChannelRequest) -> Result<()> {
        let mut connection = self.inner.lock_connection();
        let Some(connection) = connection.as_mut() else {
            return Err(Error::validation("not yet connected"));
        };

        if !connection.transport.ready_state().can_send() {
            return Err(Error::validation("no longer connected"));
        }

        if connection.opened {
            send_now(&connection.transport, &request)
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                request = %request.request,
                channel = %request.channel,
                "Transport not open yet, deferring request"
            );
            connection.pending.push_back(request);
            Ok(())
        }
    }

    /// Register a listener for `connect` events.
    pub fn on_connect<F: Fn() + Send + Sync + 'static>(&self, handler: F) {
        self.inner.events.on_connect(handler);
    }

    /// Register a listener for `close` events.
    pub fn on_close<F: Fn() + Send + Sync + 'static>(&self, handler: F) {
        self.inner.events.on_close(handler);
    }

    /// Register a listener for `error` events.
    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, handler: F) {
        self.inner.events.on_error(handler);
    }

    /// Register a listener for `message` events.
    pub fn on_message<F: Fn(&Value) + Send + Sync + 'static>(&self, handler: F) {
        self.inner.events.on_message(handler);
    }

    /// Stream of every client event emitted from now on.
    ///
    /// The stream ends with [`WsError::Lagged`] if it falls more than
    /// [`Config::event_capacity`] events behind.
    pub fn events(&self) -> impl Stream<Item = Result<ClientEvent>> + use<C> {
        let mut rx = self.inner.events.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Event stream lagged, missed {n} events");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Stream of decoded inbound frames emitted from now on.
    pub fn messages(&self) -> impl Stream<Item = Result<Value>> + use<C> {
        self.events().filter_map(|event| async move {
            match event {
                Ok(ClientEvent::Message(frame)) => Some(Ok(frame)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
    }

    /// Ready state of the current transport, `None` when there is none.
    #[must_use]
    pub fn ready_state(&self) -> Option<ReadyState> {
        self.inner
            .lock_connection()
            .as_ref()
            .map(|connection| connection.transport.ready_state())
    }

    /// Whether a transport exists and is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.ready_state() == Some(ReadyState::Open)
    }

    /// Number of requests waiting for the transport to open.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock_connection()
            .as_ref()
            .map_or(0, |connection| connection.pending.len())
    }
}

impl<C: Connector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("uri", &self.uri())
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ClientInner<C> {
    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection<C::Transport>>> {
        // The guarded state is updated in single assignments, so a poisoned lock is still consistent.
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one transport event. Returns `false` once the connection is finished.
    fn handle_event(&self, id: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Open => {
                self.flush_pending(id);
                self.events.emit_connect();
                true
            }
            TransportEvent::Close => {
                self.events.emit_close();
                self.clear_connection(id);
                false
            }
            TransportEvent::Error(error) => {
                self.events.emit_error(error);
                true
            }
            TransportEvent::Message(text) => {
                self.receive(&text);
                true
            }
        }
    }

    /// Mark the connection open and send everything queued while it was connecting.
    ///
    /// Runs under the connection lock so later requests cannot overtake queued ones.
    fn flush_pending(&self, id: u64) {
        let mut guard = self.lock_connection();
        let Some(connection) = guard.as_mut().filter(|c| c.id == id) else {
            return;
        };

        connection.opened = true;
        let mut failures = Vec::new();
        while let Some(request) = connection.pending.pop_front() {
            if let Err(e) = send_now(&connection.transport, &request) {
                failures.push(e);
            }
        }
        drop(guard);

        for error in failures {
            self.events.emit_error(error);
        }
    }

    fn clear_connection(&self, id: u64) {
        let Some(connection) = self.lock_connection().take_if(|c| c.id == id) else {
            return;
        };

        #[cfg(not(feature = "tracing"))]
        let _ = connection;
        #[cfg(feature = "tracing")]
        if !connection.pending.is_empty() {
            tracing::warn!(
                count = connection.pending.len(),
                "Transport closed before opening, dropping deferred requests"
            );
        }
    }

    fn receive(&self, text: &str) {
        match parse_frame(text) {
            Ok(frame) => self.events.emit_message(frame),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "Failed to decode inbound frame");
                self.events.emit_error(e);
            }
        }
    }
}

fn send_now<T: Transport>(transport: &T, request: &ChannelRequest) -> Result<()> {
    let message = serde_json::to_string(request)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(%message, "sending message");
    transport.send(message)
}

/// Appends the API version and access key to `base`.
fn connection_uri(base: &str, api_key: &SecretString) -> Result<Url> {
    let mut uri = Url::parse(base)?;
    uri.query_pairs_mut()
        .append_pair("api-version", API_VERSION)
        .append_pair("auth-token", api_key.expose_secret());
    Ok(uri)
}
