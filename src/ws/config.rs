#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;

use super::traits::{Correlator, FieldCorrelator, PingStrategy};
use crate::codec::{Compression, NORMAL_CLOSURE};

const DEFAULT_KEEP_ALIVE_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_MAX_MISSED_PONGS: u32 = 2;
const DEFAULT_CONNECTION_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for WebSocket client behavior.
///
/// ```
/// use std::time::Duration;
///
/// use ws_streaming_client::codec::Compression;
/// use ws_streaming_client::ws::config::Config;
///
/// let config = Config::builder()
///     .keep_alive(Duration::from_secs(10))
///     .max_missed_pongs(3)
///     .compression(Compression::from_flags(true, false))
///     .build();
///
/// assert_eq!(config.liveness_timeout(), Duration::from_secs(30));
/// ```
#[non_exhaustive]
#[derive(Clone, Builder)]
pub struct Config {
    /// Log every frame, ping, pong and close at debug level
    #[builder(default)]
    pub verbose: bool,
    /// Interval between pings. Zero disables the liveness monitor.
    #[builder(default = DEFAULT_KEEP_ALIVE_DURATION)]
    pub keep_alive: Duration,
    /// Number of keep-alive intervals without a pong before the connection is declared dead
    #[builder(default = DEFAULT_MAX_MISSED_PONGS)]
    pub max_missed_pongs: u32,
    /// Decompression applied to binary frames
    #[builder(default)]
    pub compression: Compression,
    /// Application-level ping payload. Transport pings are sent when absent.
    pub ping: Option<Arc<dyn PingStrategy>>,
    /// Upper bound on the opening handshake
    #[builder(default = DEFAULT_CONNECTION_TIMEOUT_DURATION)]
    pub connection_timeout: Duration,
    /// How long [`Client::request`](super::Client::request) waits for its reply.
    /// `None` waits until the connection is torn down.
    pub request_timeout: Option<Duration>,
    /// Extracts request ids from inbound payloads
    #[builder(default = Arc::new(FieldCorrelator::default()))]
    pub correlation: Arc<dyn Correlator>,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Close code sent when the client closes the connection
    #[builder(default = NORMAL_CLOSURE)]
    pub close_code: u16,
}

impl Config {
    /// Time without a pong after which the connection is considered dead.
    #[must_use]
    pub fn liveness_timeout(&self) -> Duration {
        self.keep_alive.saturating_mul(self.max_missed_pongs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("verbose", &self.verbose)
            .field("keep_alive", &self.keep_alive)
            .field("max_missed_pongs", &self.max_missed_pongs)
            .field("compression", &self.compression)
            .field("ping", &self.ping.is_some())
            .field("connection_timeout", &self.connection_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("reconnect", &self.reconnect)
            .field("close_code", &self.close_code)
            .finish_non_exhaustive()
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries, `Some(0)` disables reconnection.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl ReconnectConfig {
    /// Never reconnect; the first disconnect is terminal.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self.max_attempts, Some(0))
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}
