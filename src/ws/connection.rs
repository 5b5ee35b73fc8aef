#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

//! WebSocket transport backed by `tokio-tungstenite`.

use futures::{SinkExt as _, StreamExt as _};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use url::Url;

use super::error::WsError;
use super::traits::{Connector, EventSink, ReadyState, SharedReadyState, Transport, TransportEvent};
use crate::Result;
use crate::error::{Error, Kind};

#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

/// Opens real WebSocket connections. Requires a Tokio runtime.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn connect(&self, uri: &Url, events: EventSink) -> Result<WsTransport> {
        let handle = Handle::try_current().map_err(|e| Error::with_source(Kind::Internal, e))?;

        let state = SharedReadyState::new(ReadyState::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let endpoint = uri.to_string();
        let task_state = state.clone();
        handle.spawn(async move {
            connection_task(endpoint, task_state, command_rx, events).await;
        });

        Ok(WsTransport { state, command_tx })
    }
}

/// Handle to a socket driven by a background task.
///
/// Dropping the handle closes the socket.
#[derive(Debug)]
pub struct WsTransport {
    state: SharedReadyState,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.state.get().can_send() {
            return Err(WsError::ConnectionClosed.into());
        }
        self.command_tx
            .send(Command::Send(text))
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    fn close(&self) {
        if self.state.transition(ReadyState::Open, ReadyState::Closing) {
            _ = self.command_tx.send(Command::Close);
        }
    }
}

/// Connects, then pumps frames both ways until either side closes.
async fn connection_task(
    endpoint: String,
    state: SharedReadyState,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    events: EventSink,
) {
    let ws_stream = match connect_async(&endpoint).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Unable to connect");
            state.set(ReadyState::Closed);
            events.emit(TransportEvent::Error(e.into()));
            events.emit(TransportEvent::Close);
            return;
        }
    };

    state.set(ReadyState::Open);
    events.emit(TransportEvent::Open);

    let (mut write, mut read) = ws_stream.split();
    let mut accepting = true;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(%text, "Received WebSocket text message");
                        events.emit(TransportEvent::Message(text.to_string()));
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => events.emit(TransportEvent::Message(text)),
                        Err(e) => events.emit(TransportEvent::Error(
                            WsError::InvalidMessage(format!("binary frame is not UTF-8: {e}")).into(),
                        )),
                    },
                    Some(Ok(Message::Close(_))) => {
                        // tungstenite answers the close handshake; the stream ends afterwards
                        state.set(ReadyState::Closing);
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are handled by tungstenite.
                    }
                    Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed))
                    | None => break,
                    Some(Err(e)) => {
                        events.emit(TransportEvent::Error(e.into()));
                        break;
                    }
                }
            }

            command = command_rx.recv(), if accepting => {
                match command {
                    Some(Command::Send(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            events.emit(TransportEvent::Error(e.into()));
                        }
                    }
                    Some(Command::Close) | None => {
                        accepting = false;
                        state.set(ReadyState::Closing);
                        _ = write.send(Message::Close(None)).await;
                    }
                }
            }
        }
    }

    state.set(ReadyState::Closed);
    events.emit(TransportEvent::Close);
}
