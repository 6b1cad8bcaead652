//! WebSocket streaming infrastructure.
//!
//! # Architecture
//!
//! - [`Connection`](connection::Connection): one transport connection, split
//!   into a send half and a receive half
//! - [`LivenessMonitor`](liveness::LivenessMonitor): ping/pong keep-alive for a
//!   single connection
//! - [`Client`]: owns the connection and monitor, routes inbound payloads to
//!   pending requests or to a [`MessageHandler`], and reconnects on failure
//! - [`ChannelHandler`]: a [`MessageHandler`] exposing events as a `Stream`
//!
//! # Example
//!
//! ```ignore
//! let (handler, events) = ChannelHandler::new(256);
//! let client = Client::new(url, Config::default(), handler)?;
//!
//! let reply = client
//!     .watch("ticker:BTC/USDT", "ticker:BTC/USDT", Some(subscribe_message))
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod liveness;
pub mod traits;

pub use client::{Client, ClientState, ConnectHandle, PendingReply};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use handler::{ChannelHandler, Event};
pub use traits::*;
