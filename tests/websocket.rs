#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::time::Duration;

use fenix_pipeline_sdk::error::Kind;
use fenix_pipeline_sdk::feed::{Client, ClientEvent, SubscriptionKind, Trade};
use fenix_pipeline_sdk::types::dec;
use fenix_pipeline_sdk::ws::{ReadyState, WsError};
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

#[derive(Clone, Debug)]
enum ServerCommand {
    Text(String),
    Close,
}

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Commands for ALL connected clients
    command_tx: broadcast::Sender<ServerCommand>,
    /// Request URI of every accepted handshake
    handshake_rx: mpsc::UnboundedReceiver<String>,
    /// Text frames received from clients
    request_rx: mpsc::UnboundedReceiver<String>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<ServerCommand>(100);
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel::<String>();
        let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();

        let broadcast_tx = command_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let uri_tx = handshake_tx.clone();
                let callback = move |request: &Request,
                                     response: Response|
                      -> Result<Response, ErrorResponse> {
                    drop(uri_tx.send(request.uri().to_string()));
                    Ok(response)
                };
                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let req_tx = request_tx.clone();
                let mut command_rx = broadcast_tx.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(req_tx.send(text.to_string()));
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            command = command_rx.recv() => {
                                let message = match command {
                                    Ok(ServerCommand::Text(text)) => Message::Text(text.into()),
                                    Ok(ServerCommand::Close) => Message::Close(None),
                                    Err(_) => break,
                                };
                                if write.send(message).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            handshake_rx,
            request_rx,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a text frame to all connected clients.
    fn send(&self, message: &str) {
        drop(self.command_tx.send(ServerCommand::Text(message.to_owned())));
    }

    /// Start the close handshake with all connected clients.
    fn close_all(&self) {
        drop(self.command_tx.send(ServerCommand::Close));
    }

    async fn recv_handshake(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.handshake_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next request sent by a client.
    async fn recv_request(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.request_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn next_event<S>(events: &mut S) -> ClientEvent
where
    S: futures_util::Stream<Item = fenix_pipeline_sdk::Result<ClientEvent>> + Unpin,
{
    timeout(Duration::from_secs(5), events.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
        .unwrap()
}

fn client_for(server: &MockWsServer) -> Client {
    let client = Client::new("K");
    client.set_uri(&server.ws_url());
    client
}

#[tokio::test]
async fn handshake_carries_version_and_key() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);
    let mut events = Box::pin(client.events());

    client.connect().unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connect));

    assert_eq!(
        server.recv_handshake().await.as_deref(),
        Some("/?api-version=beta&auth-token=K")
    );
}

#[tokio::test]
async fn deferred_subscribe_is_sent_once_open() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);
    let mut events = Box::pin(client.events());

    client.connect().unwrap();
    client.subscribe(SubscriptionKind::AllTrades, None).unwrap();
    client
        .subscribe(SubscriptionKind::TradesByMarket, Some("btc-usdt"))
        .unwrap();

    assert!(matches!(next_event(&mut events).await, ClientEvent::Connect));
    assert_eq!(
        server.recv_request().await.as_deref(),
        Some(r#"{"request":"subscribe","channel":"trades/all"}"#)
    );
    assert_eq!(
        server.recv_request().await.as_deref(),
        Some(r#"{"request":"subscribe","channel":"trades/market/btc-usdt"}"#)
    );

    client
        .unsubscribe(SubscriptionKind::TradesByMarket, Some("btc-usdt"))
        .unwrap();
    assert_eq!(
        server.recv_request().await.as_deref(),
        Some(r#"{"request":"unsubscribe","channel":"trades/market/btc-usdt"}"#)
    );
}

#[tokio::test]
async fn trade_frames_are_decoded() {
    let server = MockWsServer::start().await;
    let client = client_for(&server);
    let mut events = Box::pin(client.events());
    let mut messages = Box::pin(client.messages());

    client.connect().unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connect));

    let payload = json!({
        "timestamp": 1_546_300_800.5,
        "exchange": "binance",
        "market": "btc-usdt",
        "euid": "42",
        "price": "3650.5",
        "quantity": "0.1",
        "direction": "sell"
    });
    server.send(&json!({"type": "data", "message": {"data": payload.to_string()}}).to_string());

    let frame = timeout(Duration::from_secs(5), messages.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame["message"]["data"], payload);

    let trade = Trade::from_frame(&frame).unwrap();
    assert_eq!(trade.key(), "binance:btc-usdt:42");
    assert_eq!(trade.price, dec!(3650.5));
    assert_eq!(trade.direction, "sell");
}

#[tokio::test]
async fn server_close_ends_connection_and_reconnect_succeeds() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);
    let mut events = Box::pin(client.events());

    client.connect().unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connect));

    server.close_all();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Close));
    assert_eq!(client.ready_state(), None);

    let err = client.subscribe(SubscriptionKind::AllTrades, None).unwrap_err();
    assert_eq!(err.validation_reason(), Some("not yet connected"));

    client.connect().unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connect));
    assert_eq!(client.ready_state(), Some(ReadyState::Open));

    client.subscribe(SubscriptionKind::AllTrades, None).unwrap();
    assert_eq!(
        server.recv_request().await.as_deref(),
        Some(r#"{"request":"subscribe","channel":"trades/all"}"#)
    );
}

#[tokio::test]
async fn client_close_completes_handshake() {
    let server = MockWsServer::start().await;
    let client = client_for(&server);
    let mut events = Box::pin(client.events());

    client.connect().unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connect));

    client.close();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Close));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn unreachable_server_reports_error_then_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new("K");
    client.set_uri(&format!("ws://{addr}"));
    let mut events = Box::pin(client.events());

    client.connect().unwrap();
    client.subscribe(SubscriptionKind::AllTrades, None).unwrap();

    let ClientEvent::Error(error) = next_event(&mut events).await else {
        panic!("expected an error event");
    };
    assert_eq!(error.kind(), Kind::WebSocket);
    assert!(matches!(
        error.downcast_ref::<WsError>(),
        Some(WsError::Connection(_))
    ));
    assert!(matches!(next_event(&mut events).await, ClientEvent::Close));
    assert_eq!(client.pending_count(), 0);
}
