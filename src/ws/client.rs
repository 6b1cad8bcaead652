#![expect(
    clippy::module_name_repetitions,
    reason = "ClientState reads better than State at call sites"
)]

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use dashmap::{DashMap, Entry};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use super::config::Config;
use super::connection::Connection;
use super::error::WsError;
use super::liveness::{LivenessMonitor, PongRecorder, pong_channel};
use super::traits::MessageHandler;
use crate::Result;
use crate::codec::{ABNORMAL_CLOSURE, ControlEvent, DecodedMessage, Frame, FrameCodec, Outgoing};
use crate::error::Error;

/// Client state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting before the next connection attempt
    Reconnecting {
        /// Consecutive failed attempts so far
        attempt: u32,
    },
}

impl ClientState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

struct Waiter {
    token: u64,
    reply: oneshot::Sender<Result<Value>>,
}

/// Everyone waiting on one id or message hash.
struct PendingRequest {
    created_at: Instant,
    /// Message-hash waiters share an entry; request ids are exclusive
    shared: bool,
    waiters: Vec<Waiter>,
}

impl PendingRequest {
    /// Hand `value` to every waiter. Gives it back when nobody was listening.
    fn resolve(self, value: Value) -> std::result::Result<(), Value> {
        let mut waiters = self.waiters;
        let Some(last) = waiters.pop() else {
            return Err(value);
        };

        let mut delivered = false;
        for waiter in waiters {
            delivered |= waiter.reply.send(Ok(value.clone())).is_ok();
        }

        match last.reply.send(Ok(value)) {
            Err(Ok(value)) if !delivered => Err(value),
            _ => Ok(()),
        }
    }

    /// Fail every waiter. Returns whether anyone received the error.
    fn reject(self, error: Error) -> bool {
        let mut waiters = self.waiters;
        let Some(last) = waiters.pop() else {
            return false;
        };

        let mut delivered = false;
        for waiter in waiters {
            delivered |= waiter.reply.send(Err(error.detached())).is_ok();
        }
        last.reply.send(Err(error)).is_ok() || delivered
    }
}

type PendingMap = DashMap<String, PendingRequest>;

/// Information about a request waiting for its reply.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub id: String,
    pub created_at: Instant,
}

/// Reply to a correlated request or message hash.
///
/// Resolves with the matching payload, or with a
/// [`Kind::Closed`](crate::error::Kind::Closed) error when the connection is
/// torn down first. Dropping an unresolved reply withdraws it, so the id can
/// be used again.
#[must_use = "a pending reply does nothing unless awaited"]
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    token: u64,
    url: String,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Weak<PendingMap>,
}

impl PendingReply {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = Pin::new(&mut self.rx).poll(cx);
        match polled {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without an answer
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::connection_closed(&self.url))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        let Some(pending) = self.pending.upgrade() else {
            return;
        };

        // Only our own waiter goes; the id may already belong to a newer one
        let emptied = pending.get_mut(&self.id).is_some_and(|mut entry| {
            entry.waiters.retain(|waiter| waiter.token != self.token);
            entry.waiters.is_empty()
        });
        if emptied {
            pending.remove_if(&self.id, |_, entry| entry.waiters.is_empty());
        }
    }
}

/// Handle returned by [`Client::begin_connect`].
#[must_use = "call `wait` to learn whether the connection opened"]
#[derive(Debug)]
pub struct ConnectHandle {
    url: String,
    state_rx: watch::Receiver<ClientState>,
    outcome: Option<oneshot::Receiver<Result<()>>>,
}

impl ConnectHandle {
    /// Suspend until the connection is open or the attempt failed.
    ///
    /// A handle that started the connection reports the outcome of the first
    /// attempt. A handle obtained while a connection was already being
    /// maintained waits until the client is connected or gives up.
    pub async fn wait(self) -> Result<()> {
        let Self {
            url,
            mut state_rx,
            outcome,
        } = self;

        if let Some(outcome) = outcome {
            return outcome
                .await
                .unwrap_or_else(|_| Err(Error::connection_closed(&url)));
        }

        let state = state_rx
            .wait_for(|state| {
                matches!(
                    state,
                    ClientState::Connected { .. } | ClientState::Disconnected
                )
            })
            .await
            .map(|state| *state)
            .map_err(|_| Error::connection_closed(&url))?;

        if state.is_connected() {
            Ok(())
        } else {
            Err(Error::connection_closed(&url))
        }
    }
}

/// Streaming client for one endpoint.
///
/// Owns at most one [`Connection`] at a time together with its
/// [`LivenessMonitor`]. A background supervisor task connects, runs the receive
/// loop, tears both down on close or failure, and reconnects according to the
/// configured [`ReconnectConfig`](super::config::ReconnectConfig).
///
/// Inbound payloads either resolve a pending request (see [`Client::request`]
/// and [`Client::future`]) or go to the [`MessageHandler`], strictly in arrival
/// order.
///
/// # Example
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use serde_json::json;
/// use ws_streaming_client::ws::config::Config;
/// use ws_streaming_client::ws::{ChannelHandler, Client, Event};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (handler, events) = ChannelHandler::new(256);
///     let client = Client::new("wss://stream.example.com/ws", Config::default(), handler)?;
///
///     client.connect().await?;
///     client
///         .send(json!({"op": "subscribe", "args": ["ticker.BTCUSDT"]}))
///         .await?;
///
///     let mut events = Box::pin(events);
///     while let Some(event) = events.next().await {
///         if let Event::Message(message) = event {
///             println!("{message}");
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    id: Uuid,
    url: String,
    config: Config,
    codec: FrameCodec,
    handler: Arc<dyn MessageHandler>,
    state_tx: watch::Sender<ClientState>,
    /// The open connection, if any
    connection: RwLock<Option<Arc<Connection>>>,
    pending: Arc<PendingMap>,
    next_token: AtomicU64,
    /// Subscribe messages keyed by subscribe hash, re-sent after reconnecting
    subscriptions: Mutex<HashMap<String, Outgoing>>,
    shutdown: CancellationToken,
    supervisor: StdMutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client for `url`. Nothing is connected until
    /// [`Client::begin_connect`], [`Client::connect`] or [`Client::watch`].
    pub fn new<H: MessageHandler>(url: &str, config: Config, handler: H) -> Result<Self> {
        Url::parse(url)?;

        let (state_tx, _) = watch::channel(ClientState::Disconnected);
        let codec = FrameCodec::new(config.compression, config.verbose);

        Ok(Self {
            inner: Arc::new(ClientInner {
                id: Uuid::new_v4(),
                url: url.to_owned(),
                config,
                codec,
                handler: Arc::new(handler),
                state_tx,
                connection: RwLock::new(None),
                pending: Arc::new(DashMap::new()),
                next_token: AtomicU64::new(0),
                subscriptions: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                supervisor: StdMutex::new(None),
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the current client state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to client state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ClientState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether the client was closed or gave up reconnecting.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        if self.inner.shutdown.is_cancelled() {
            return true;
        }

        // The supervisor publishes `Disconnected` only when it stops for good
        let supervisor = self.supervisor();
        supervisor.is_some() && matches!(self.state(), ClientState::Disconnected)
    }

    /// Start connecting in the background and return immediately.
    ///
    /// Calling this while the client is already connecting or connected does
    /// not open a second connection.
    pub fn begin_connect(&self) -> ConnectHandle {
        let url = self.inner.url.clone();
        let state_rx = self.inner.state_tx.subscribe();

        if self.inner.shutdown.is_cancelled() {
            let (tx, rx) = oneshot::channel();
            _ = tx.send(Err(Error::connection_closed(&url)));
            return ConnectHandle {
                url,
                state_rx,
                outcome: Some(rx),
            };
        }

        let mut supervisor = self.supervisor();
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            return ConnectHandle {
                url,
                state_rx,
                outcome: None,
            };
        }

        let (tx, rx) = oneshot::channel();
        self.inner.state_tx.send_replace(ClientState::Connecting);
        *supervisor = Some(tokio::spawn(self.clone().supervise(tx)));

        ConnectHandle {
            url,
            state_rx,
            outcome: Some(rx),
        }
    }

    /// Connect and wait until the connection is open.
    pub async fn connect(&self) -> Result<()> {
        self.begin_connect().wait().await
    }

    /// Send a message on the open connection.
    pub async fn send<M: Into<Outgoing>>(&self, message: M) -> Result<()> {
        let connection = self
            .current_connection()
            .ok_or_else(|| Error::connection_closed(&self.inner.url))?;

        connection
            .send(self.inner.codec.encode(&message.into()))
            .await
    }

    /// Register a pending reply for `id` without sending anything.
    ///
    /// The reply resolves when an inbound payload carries `id` (according to
    /// the configured [`Correlator`](super::Correlator)), when
    /// [`Client::resolve`] or [`Client::reject`] is called for it, or with a
    /// closed error on teardown. Only one reply may wait per id; use
    /// [`Client::watch`] for message hashes with several consumers.
    pub fn future<S: Into<String>>(&self, id: S) -> Result<PendingReply> {
        self.register(id.into(), false)
    }

    fn register(&self, id: String, shared: bool) -> Result<PendingReply> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::connection_closed(&self.inner.url));
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter { token, reply: tx };

        match self.inner.pending.entry(id.clone()) {
            Entry::Occupied(mut entry) if shared && entry.get().shared => {
                entry.get_mut().waiters.push(waiter);
            }
            Entry::Occupied(_) => return Err(WsError::DuplicateRequest(id).into()),
            Entry::Vacant(entry) => {
                entry.insert(PendingRequest {
                    created_at: Instant::now(),
                    shared,
                    waiters: vec![waiter],
                });
            }
        }

        Ok(PendingReply {
            id,
            token,
            url: self.inner.url.clone(),
            rx,
            pending: Arc::downgrade(&self.inner.pending),
        })
    }

    /// Send `message` and wait for the payload correlated with `id`.
    ///
    /// Gives up after the configured `request_timeout`. The id is free again
    /// once this returns or is cancelled.
    pub async fn request<S: Into<String>, M: Into<Outgoing>>(
        &self,
        id: S,
        message: M,
    ) -> Result<Value> {
        let id = id.into();
        let reply = self.future(id.clone())?;

        self.send(message).await?;

        let Some(after) = self.inner.config.request_timeout else {
            return reply.await;
        };

        timeout(after, reply)
            .await
            .unwrap_or_else(|_| Err(WsError::RequestTimeout { id, after }.into()))
    }

    /// Resolve the pending reply for `id`. Returns `false` if nothing was waiting.
    pub fn resolve(&self, id: &str, value: Value) -> bool {
        self.inner
            .pending
            .remove(id)
            .is_some_and(|(_, pending)| pending.resolve(value).is_ok())
    }

    /// Fail the pending reply for `id`. Returns `false` if nothing was waiting.
    pub fn reject(&self, id: &str, error: Error) -> bool {
        self.inner
            .pending
            .remove(id)
            .is_some_and(|(_, pending)| pending.reject(error))
    }

    /// Number of ids and message hashes still waited on.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Ids and creation times of the replies still waiting.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<PendingInfo> {
        self.inner
            .pending
            .iter()
            .map(|entry| PendingInfo {
                id: entry.key().clone(),
                created_at: entry.value().created_at,
            })
            .collect()
    }

    /// Wait for the payload tagged `message_hash`, subscribing first if needed.
    ///
    /// Concurrent watchers of the same hash share it: one [`Client::resolve`]
    /// completes all of them. Starts the connection if it is not running.
    /// `message` is sent at most
    /// once per `subscribe_hash`; it is kept and sent again after every
    /// reconnect until [`Client::unwatch`] removes it.
    pub async fn watch<S: Into<String>, M: Into<Outgoing>>(
        &self,
        message_hash: S,
        subscribe_hash: &str,
        message: Option<M>,
    ) -> Result<PendingReply> {
        let reply = self.register(message_hash.into(), true)?;
        drop(self.begin_connect());

        if let Some(message) = message {
            let message = message.into();
            let mut subscriptions = self.inner.subscriptions.lock().await;

            if !subscriptions.contains_key(subscribe_hash) {
                // The supervisor marks the client connected while holding this
                // lock, after re-sending stored subscriptions.
                if self.state().is_connected()
                    && let Err(e) = self.send(message.clone()).await
                {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, subscribe_hash, "Subscribe deferred until reconnect");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                subscriptions.insert(subscribe_hash.to_owned(), message);
            }
        }

        Ok(reply)
    }

    /// Forget a subscription so it is not re-sent after reconnecting, and
    /// send `message` (typically an unsubscribe request) if given.
    pub async fn unwatch<M: Into<Outgoing>>(
        &self,
        subscribe_hash: &str,
        message: Option<M>,
    ) -> Result<bool> {
        let removed = self
            .inner
            .subscriptions
            .lock()
            .await
            .remove(subscribe_hash)
            .is_some();

        if removed && let Some(message) = message {
            self.send(message).await?;
        }

        Ok(removed)
    }

    /// Number of stored subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().await.len()
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Safe to call several times and concurrently. Every pending reply fails
    /// with a closed error and [`MessageHandler::on_close`] runs once for the
    /// open connection. Returns once the client is disconnected, except when
    /// called from inside a handler callback, where waiting would deadlock the
    /// receive loop.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();

        let supervisor_id = self.supervisor().as_ref().map(JoinHandle::id);
        let inside_supervisor = supervisor_id.is_some() && supervisor_id == tokio::task::try_id();

        if !inside_supervisor {
            let mut state_rx = self.inner.state_tx.subscribe();
            _ = state_rx
                .wait_for(|state| matches!(state, ClientState::Disconnected))
                .await;
        }

        self.reject_pending();
    }

    fn supervisor(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        // A poisoned lock still holds a valid JoinHandle
        self.inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current_connection(&self) -> Option<Arc<Connection>> {
        self.inner
            .connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, connection: &Arc<Connection>) {
        *self
            .inner
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(connection));
    }

    fn uninstall(&self, connection: &Arc<Connection>) {
        let mut slot = self
            .inner
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, connection)) {
            *slot = None;
        }
    }

    /// Connection loop with automatic reconnection.
    async fn supervise(self, waiter: oneshot::Sender<Result<()>>) {
        let inner = &self.inner;
        let mut waiter = Some(waiter);
        let mut attempt = 0_u32;
        let mut backoff: ExponentialBackoff = inner.config.reconnect.clone().into();

        loop {
            _ = inner.state_tx.send_replace(ClientState::Connecting);

            let connected = tokio::select! {
                () = inner.shutdown.cancelled() => break,
                result = timeout(
                    inner.config.connection_timeout,
                    Connection::connect(&inner.url, inner.config.verbose),
                ) => result.unwrap_or_else(|_| {
                    Err(WsError::ConnectTimeout {
                        url: inner.url.clone(),
                        after: inner.config.connection_timeout,
                    }
                    .into())
                }),
            };

            match connected {
                Ok(connection) => {
                    attempt = 0;
                    backoff.reset();

                    let connection = Arc::new(connection);
                    self.install(&connection);
                    self.resubscribe(&connection).await;
                    if let Some(tx) = waiter.take() {
                        _ = tx.send(Ok(()));
                    }

                    let code = self.run_session(&connection).await;
                    self.teardown(&connection, code).await;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(url = %inner.url, attempt, error = %e, "Unable to connect");
                    self.report_connect_failure(&mut waiter, e).await;
                }
            }

            if inner.shutdown.is_cancelled() {
                break;
            }

            // Check if we should stop reconnecting
            if let Some(max) = inner.config.reconnect.max_attempts
                && attempt >= max
            {
                break;
            }

            _ = inner
                .state_tx
                .send_replace(ClientState::Reconnecting { attempt });

            if let Some(duration) = backoff.next_backoff() {
                tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    () = sleep(duration) => {}
                }
            }
        }

        self.reject_pending();
        _ = inner.state_tx.send_replace(ClientState::Disconnected);
    }

    async fn report_connect_failure(
        &self,
        waiter: &mut Option<oneshot::Sender<Result<()>>>,
        error: Error,
    ) {
        // The caller awaiting the first attempt gets the error; otherwise the handler does
        let unclaimed = match waiter.take() {
            Some(tx) => tx.send(Err(error)).err().and_then(Result::err),
            None => Some(error),
        };

        if let Some(error) = unclaimed {
            self.inner.handler.on_error(error).await;
        }
    }

    /// Re-send stored subscriptions, then mark the client connected.
    async fn resubscribe(&self, connection: &Connection) {
        let subscriptions = self.inner.subscriptions.lock().await;

        if !subscriptions.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(count = subscriptions.len(), "Re-sending subscriptions");
        }

        for message in subscriptions.values() {
            if let Err(e) = connection.send(self.inner.codec.encode(message)).await {
                // The receive loop reports the underlying transport failure
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Failed to re-send subscription");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                break;
            }
        }

        _ = self.inner.state_tx.send_replace(ClientState::Connected {
            since: Instant::now(),
        });
    }

    /// Run the receive loop and liveness monitor until the connection ends.
    /// Returns the close code.
    async fn run_session(&self, connection: &Arc<Connection>) -> u16 {
        let inner = &self.inner;
        let (recorder, last_pong) = pong_channel();
        let monitor = LivenessMonitor::new(Arc::clone(connection), &inner.config, last_pong);
        let mut monitor = tokio::spawn(monitor.run());
        let mut monitor_running = true;
        let mut close_requested = false;

        let code = loop {
            tokio::select! {
                () = inner.shutdown.cancelled(), if !close_requested => {
                    close_requested = true;
                    self.close_connection(connection).await;
                }
                outcome = &mut monitor, if monitor_running => {
                    monitor_running = false;
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => {
                            inner.handler.on_error(error).await;
                            self.close_connection(connection).await;
                        }
                        Err(join_error) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!(error = %join_error, "Liveness monitor failed");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &join_error;
                            self.close_connection(connection).await;
                        }
                    }
                }
                frame = connection.receive() => match frame {
                    Ok(frame) => {
                        if let Some(code) = self.dispatch(frame, &recorder).await {
                            break code;
                        }
                    }
                    Err(error) if error.is_fatal() => {
                        inner.handler.on_error(error).await;
                        break ABNORMAL_CLOSURE;
                    }
                    Err(error) => inner.handler.on_error(error).await,
                },
            }
        };

        monitor.abort();
        code
    }

    /// Handle one frame fully. Returns the close code when the frame ends the
    /// connection.
    async fn dispatch(&self, frame: Frame, recorder: &PongRecorder) -> Option<u16> {
        match self.inner.codec.decode(frame) {
            DecodedMessage::Payload(value) => {
                self.route(value, recorder).await;
                None
            }
            DecodedMessage::Control(ControlEvent::Pong(_)) => {
                recorder.record(Instant::now());
                None
            }
            // Already answered by the connection
            DecodedMessage::Control(ControlEvent::Ping(_)) => None,
            DecodedMessage::Control(ControlEvent::Close { code, .. }) => Some(code),
            DecodedMessage::Error(error) => {
                self.inner.handler.on_error(error).await;
                None
            }
        }
    }

    async fn route(&self, value: Value, recorder: &PongRecorder) {
        let inner = &self.inner;

        if let Some(strategy) = &inner.config.ping
            && strategy.is_pong(&value)
        {
            recorder.record(Instant::now());
            return;
        }

        let correlated = inner
            .config
            .correlation
            .request_id(&value)
            .and_then(|id| inner.pending.remove(&id));
        let value = match correlated {
            Some((_, pending)) => match pending.resolve(value) {
                Ok(()) => return,
                // Nobody is waiting any more
                Err(value) => value,
            },
            None => value,
        };

        inner.handler.on_message(self, value).await;
    }

    async fn close_connection(&self, connection: &Connection) {
        if let Err(e) = connection.close(self.inner.config.close_code).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Error while closing connection");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    async fn teardown(&self, connection: &Arc<Connection>, code: u16) {
        self.uninstall(connection);
        self.close_connection(connection).await;
        self.reject_pending();

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.inner.url, code, "Connection torn down");

        self.inner.handler.on_close(code).await;
    }

    fn reject_pending(&self) {
        let ids: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for id in ids {
            if let Some((_, pending)) = self.inner.pending.remove(&id) {
                pending.reject(Error::connection_closed(&self.inner.url));
            }
        }
    }
}
