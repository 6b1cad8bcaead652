#![cfg_attr(doc, doc = include_str!("../README.md"))]

/// Per-frame diagnostics: `debug` when the connection is verbose, `trace`
/// otherwise.
macro_rules! verbose {
    ($verbose:expr, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            if $verbose {
                tracing::debug!($($arg)+);
            } else {
                tracing::trace!($($arg)+);
            }
        }
        #[cfg(not(feature = "tracing"))]
        {
            _ = $verbose;
        }
    };
}

pub mod codec;
pub mod error;
pub mod registry;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub use codec::{Compression, Outgoing};
pub use registry::Registry;
pub use ws::{ChannelHandler, Client, Event, MessageHandler};
