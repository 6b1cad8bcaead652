#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flate2::Compression as Level;
use flate2::write::{DeflateEncoder, GzEncoder};
use futures::Stream;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use ws_streaming_client::Event;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Mock WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Frames pushed to ALL connected clients
    outbound: broadcast::Sender<Message>,
    /// Frames received from clients
    inbound: mpsc::UnboundedReceiver<Message>,
    /// Drops every connection without a close frame
    disconnect: broadcast::Sender<()>,
    /// Connections accepted so far
    accepted: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock server that answers pings.
    pub async fn start() -> Self {
        Self::spawn(true).await
    }

    /// Start a mock server that never reads from its connections, so client
    /// pings go unanswered.
    pub async fn silent() -> Self {
        Self::spawn(false).await
    }

    async fn spawn(read_enabled: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (outbound, _) = broadcast::channel::<Message>(100);
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<Message>();
        let (disconnect, _) = broadcast::channel::<()>(4);
        let accepted = Arc::new(AtomicUsize::new(0));

        let outbound_tx = outbound.clone();
        let disconnect_tx = disconnect.clone();
        let accepted_count = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let inbound_tx = inbound_tx.clone();
                let mut outbound_rx = outbound_tx.subscribe();
                let mut disconnect_rx = disconnect_tx.subscribe();
                accepted_count.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next(), if read_enabled => {
                                match msg {
                                    Some(Ok(Message::Close(frame))) => {
                                        drop(inbound_tx.send(Message::Close(frame)));
                                        break;
                                    }
                                    Some(Ok(message)) => drop(inbound_tx.send(message)),
                                    _ => break,
                                }
                            }
                            msg = outbound_rx.recv() => {
                                match msg {
                                    Ok(message) => {
                                        if write.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            _ = disconnect_rx.recv() => break,
                        }
                    }
                });
            }
        });

        Self {
            addr,
            outbound,
            inbound,
            disconnect,
            accepted,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn send_text(&self, text: &str) {
        drop(self.outbound.send(Message::Text(text.into())));
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        drop(self.outbound.send(Message::Binary(bytes.into())));
    }

    pub fn send_ping(&self, payload: &[u8]) {
        drop(self.outbound.send(Message::Ping(payload.to_vec().into())));
    }

    pub fn send_close(&self, code: u16) {
        drop(self.outbound.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        }))));
    }

    /// Drop every open connection without a close handshake.
    pub fn disconnect_all(&self) {
        drop(self.disconnect.send(()));
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait until `count` connections were accepted and are ready to receive.
    pub async fn wait_for_connections(&self, count: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.accepted() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Next frame received from a client.
    pub async fn recv(&mut self) -> Option<Message> {
        timeout(RECV_TIMEOUT, self.inbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next text frame received from a client, skipping control frames.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.recv_text_within(RECV_TIMEOUT).await
    }

    pub async fn recv_text_within(&mut self, within: Duration) -> Option<String> {
        timeout(within, async {
            while let Some(message) = self.inbound.recv().await {
                if let Message::Text(text) = message {
                    return Some(text.to_string());
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Payload of the next pong received from a client.
    pub async fn recv_pong(&mut self) -> Option<Vec<u8>> {
        timeout(RECV_TIMEOUT, async {
            while let Some(message) = self.inbound.recv().await {
                if let Message::Pong(payload) = message {
                    return Some(payload.to_vec());
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Code of the next close frame received from a client.
    pub async fn recv_close(&mut self) -> Option<u16> {
        timeout(RECV_TIMEOUT, async {
            while let Some(message) = self.inbound.recv().await {
                if let Message::Close(frame) = message {
                    return Some(frame.map_or(1005, |f| u16::from(f.code)));
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}

/// Next event from a [`ChannelHandler`](ws_streaming_client::ChannelHandler) stream.
pub async fn next_event<S: Stream<Item = Event> + Unpin>(events: &mut S) -> Event {
    timeout(RECV_TIMEOUT, events.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// Whether another event arrives within `within`.
pub async fn no_event_within<S: Stream<Item = Event> + Unpin>(events: &mut S, within: Duration) -> bool {
    timeout(within, events.next()).await.is_err()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Level::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Level::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}
