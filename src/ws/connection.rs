#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::WsError;
use crate::Result;
use crate::codec::{ABNORMAL_CLOSURE, Frame, NORMAL_CLOSURE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of a single transport connection. Only ever moves forward.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// One open WebSocket connection.
///
/// Reading and writing are split so that the receive loop and the liveness
/// monitor can use the connection concurrently. [`Connection::receive`] is the
/// only place inbound data is read; it also answers pings with a pong carrying
/// the same payload, so liveness traffic never bypasses the client.
pub struct Connection {
    url: String,
    verbose: bool,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    state: watch::Sender<ConnectionState>,
    /// Set by the first `close` call (local) or by an inbound close frame
    closing: AtomicBool,
    close_code: AtomicU16,
    /// Cancelled on local close to unblock a pending `receive`
    shutdown: CancellationToken,
}

impl Connection {
    /// Open a connection to `url`.
    ///
    /// Fails with a validation error for malformed URLs and with a network
    /// error when the handshake fails.
    pub async fn connect(url: &str, verbose: bool) -> Result<Self> {
        Url::parse(url)?;

        let (state, _) = watch::channel(ConnectionState::Connecting);

        verbose!(verbose, %url, "connecting");

        let (ws_stream, _) = connect_async(url).await.map_err(WsError::Connection)?;
        let (sink, stream) = ws_stream.split();

        state.send_replace(ConnectionState::Open);

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "WebSocket connection open");

        Ok(Self {
            url: url.to_owned(),
            verbose,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            state,
            closing: AtomicBool::new(false),
            close_code: AtomicU16::new(NORMAL_CLOSURE),
            shutdown: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// True once closing has started; no further sends are attempted.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() >= ConnectionState::Closing
    }

    /// Send a text frame.
    pub async fn send(&self, text: String) -> Result<()> {
        verbose!(self.verbose, url = %self.url, %text, "sending");

        self.send_frame(Message::Text(text.into())).await
    }

    /// Send a transport-level ping.
    pub async fn ping(&self, payload: Vec<u8>) -> Result<()> {
        verbose!(self.verbose, url = %self.url, "ping");

        self.send_frame(Message::Ping(payload.into())).await
    }

    async fn send_frame(&self, message: Message) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(WsError::NotOpen { state }.into());
        }

        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| {
            self.advance(ConnectionState::Closed);
            WsError::Connection(e).into()
        })
    }

    /// Wait for the next frame.
    ///
    /// Returns [`Frame::Close`] when the remote closes, when the transport
    /// ends without a close frame (code 1006), or when [`Connection::close`]
    /// is called locally (the code passed to `close`). Transport failures are
    /// network errors; raw frames are protocol errors and leave the connection
    /// usable.
    pub async fn receive(&self) -> Result<Frame> {
        let mut stream = self.stream.lock().await;

        let next = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                return Ok(Frame::Close {
                    code: self.close_code.load(Ordering::Acquire),
                    reason: String::new(),
                });
            }
            next = stream.next() => next,
        };
        drop(stream);

        match next {
            Some(Ok(Message::Text(text))) => Ok(Frame::Text(text.to_string())),
            Some(Ok(Message::Binary(bytes))) => Ok(Frame::Binary(bytes.to_vec())),
            Some(Ok(Message::Ping(payload))) => {
                verbose!(self.verbose, url = %self.url, "ping received, sending pong");
                let payload = payload.to_vec();
                self.pong(payload.clone()).await?;
                Ok(Frame::Ping(payload))
            }
            Some(Ok(Message::Pong(payload))) => {
                verbose!(self.verbose, url = %self.url, "pong");
                Ok(Frame::Pong(payload.to_vec()))
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or_else(
                    || (NORMAL_CLOSURE, String::new()),
                    |f| (u16::from(f.code), f.reason.to_string()),
                );
                self.closing.store(true, Ordering::Release);
                self.advance(ConnectionState::Closing);
                // Flushes the close reply tungstenite queued for us
                _ = self.sink.lock().await.close().await;
                self.advance(ConnectionState::Closed);

                verbose!(self.verbose, url = %self.url, code, %reason, "close");
                Ok(Frame::Close { code, reason })
            }
            Some(Ok(Message::Frame(frame))) => Err(WsError::UnexpectedFrame(format!(
                "raw {:?} frame outside a message",
                frame.header().opcode
            ))
            .into()),
            Some(Err(e)) => {
                self.advance(ConnectionState::Closed);
                Err(WsError::Connection(e).into())
            }
            None => {
                self.advance(ConnectionState::Closed);
                Ok(Frame::Close {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                })
            }
        }
    }

    /// Close the connection with `code`.
    ///
    /// Only the first call does anything; later or concurrent calls return
    /// immediately. A pending [`Connection::receive`] is woken up with a
    /// [`Frame::Close`] carrying `code`.
    pub async fn close(&self, code: u16) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        verbose!(self.verbose, url = %self.url, code, "closing");

        self.close_code.store(code, Ordering::Release);
        self.advance(ConnectionState::Closing);
        self.shutdown.cancel();

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: String::new().into(),
        };
        let result = {
            let mut sink = self.sink.lock().await;
            match sink.send(Message::Close(Some(frame))).await {
                Ok(()) => sink.close().await,
                Err(e) => Err(e),
            }
        };
        self.advance(ConnectionState::Closed);

        match result {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(WsError::Connection(e).into()),
        }
    }

    async fn pong(&self, payload: Vec<u8>) -> Result<()> {
        // Replaces the reply tungstenite queues on its own, so exactly one
        // pong goes out per ping.
        match self.send_frame(Message::Pong(payload.into())).await {
            Err(e) if self.is_closed() => {
                #[cfg(feature = "tracing")]
                tracing::trace!(error = %e, "Skipping pong on closing connection");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                Ok(())
            }
            other => other,
        }
    }

    fn advance(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
    }
}
