//! Ping/pong keep-alive.
//!
//! The receive loop owns the [`PongRecorder`] and is the only writer of the
//! last-pong timestamp; the [`LivenessMonitor`] only reads it through a
//! [`LastPong`]. Both ends share a `watch` cell, so a pong recorded before a
//! check is always visible to that check.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};

use super::config::Config;
use super::connection::{Connection, ConnectionState};
use super::error::WsError;
use super::traits::PingStrategy;
use crate::Result;
use crate::codec::FrameCodec;

/// Create the single-writer pong cell shared by the receive loop and the monitor.
#[must_use]
pub fn pong_channel() -> (PongRecorder, LastPong) {
    let (tx, rx) = watch::channel(None);
    (PongRecorder(tx), LastPong(rx))
}

/// Write side of the last-pong timestamp. Not `Clone`.
#[derive(Debug)]
pub struct PongRecorder(watch::Sender<Option<Instant>>);

impl PongRecorder {
    /// Record a pong received at `at`. Older timestamps are ignored so the
    /// stored value never goes backwards.
    pub fn record(&self, at: Instant) {
        self.0.send_if_modified(|last| match last {
            Some(previous) if *previous >= at => false,
            _ => {
                *last = Some(at);
                true
            }
        });
    }
}

/// Read side of the last-pong timestamp.
#[derive(Debug, Clone)]
pub struct LastPong(watch::Receiver<Option<Instant>>);

impl LastPong {
    /// When the last pong arrived, `None` until the first one.
    #[must_use]
    pub fn get(&self) -> Option<Instant> {
        *self.0.borrow()
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

/// Periodically pings the remote and declares the connection dead when no pong
/// arrived within `keep_alive * max_missed_pongs`.
pub struct LivenessMonitor {
    connection: Arc<Connection>,
    keep_alive: Duration,
    timeout: Duration,
    ping: Option<Arc<dyn PingStrategy>>,
    codec: FrameCodec,
    last_pong: LastPong,
    state: watch::Sender<MonitorState>,
}

impl LivenessMonitor {
    #[must_use]
    pub fn new(connection: Arc<Connection>, config: &Config, last_pong: LastPong) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);

        Self {
            connection,
            keep_alive: config.keep_alive,
            timeout: config.liveness_timeout(),
            ping: config.ping.clone(),
            codec: FrameCodec::new(config.compression, config.verbose),
            last_pong,
            state,
        }
    }

    /// Observe the monitor moving from idle to running to stopped.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Run until the connection starts closing (`Ok`) or liveness fails.
    ///
    /// Returns a [`Kind::Timeout`](crate::error::Kind::Timeout) error once
    /// when no pong arrived in time, or a network error when a ping could not
    /// be sent on a connection that is still open. The monitor never closes
    /// the connection itself; that is the client's call.
    ///
    /// Silence is only checked on ticks and must exceed the timeout, so the
    /// failure lands up to one `keep_alive` late. With `keep_alive` at 1 s
    /// and `max_missed_pongs` at 2, a dead peer is detected between 2000 ms
    /// and 3000 ms after the last pong.
    pub async fn run(self) -> Result<()> {
        self.state.send_replace(MonitorState::Running);
        let result = self.tick_loop().await;
        self.state.send_replace(MonitorState::Stopped);
        result
    }

    async fn tick_loop(&self) -> Result<()> {
        if self.keep_alive.is_zero() {
            // Keep-alive disabled; idle until the connection goes away
            let mut state_rx = self.connection.state_receiver();
            _ = state_rx
                .wait_for(|state| *state >= ConnectionState::Closing)
                .await;
            return Ok(());
        }

        let mut ticker = interval(self.keep_alive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state_rx = self.connection.state_receiver();
        // Without a pong yet, the first tick counts as one
        let started = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = state_rx.wait_for(|state| *state >= ConnectionState::Closing) => {
                    return Ok(());
                }
            }

            if self.connection.is_closed() {
                return Ok(());
            }

            let now = Instant::now();
            let last = self.last_pong.get().unwrap_or(started);
            let elapsed = now.saturating_duration_since(last);

            if elapsed > self.timeout {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    url = %self.connection.url(),
                    ?elapsed,
                    "Heartbeat timeout: no pong received within {:?}",
                    self.timeout
                );
                return Err(WsError::HeartbeatTimeout {
                    url: self.connection.url().to_owned(),
                    after: self.timeout,
                }
                .into());
            }

            let sent = match &self.ping {
                Some(strategy) => {
                    let payload = self.codec.encode(&strategy.ping());
                    self.connection.send(payload).await
                }
                None => self.connection.ping(Vec::new()).await,
            };

            if let Err(e) = sent {
                if self.connection.is_closed() {
                    return Ok(());
                }
                return Err(e);
            }
        }
    }
}
