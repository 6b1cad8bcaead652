//! Extension points used by the client: consumer callbacks, ping payloads and
//! reply correlation.

use async_trait::async_trait;
use serde_json::Value;

use super::client::Client;
use crate::codec::Outgoing;
use crate::error::Error;

/// Consumer of a client's inbound traffic.
///
/// Callbacks run on the client's receive loop, one at a time and in arrival
/// order. The next frame is not read until the current callback returns, so a
/// slow handler throttles the connection.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// #[async_trait]
/// impl MessageHandler for Printer {
///     async fn on_message(&self, _client: &Client, message: Value) {
///         println!("{message}");
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// An application payload that did not resolve a pending request.
    async fn on_message(&self, client: &Client, message: Value);

    /// Every error the client cannot hand to a waiting caller ends up here,
    /// fatal or not. Use [`Error::is_fatal`] to tell them apart.
    async fn on_error(&self, error: Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%error, "Unhandled WebSocket error");
        #[cfg(not(feature = "tracing"))]
        let _: Error = error;
    }

    /// Called once per connection after it has been torn down.
    async fn on_close(&self, code: u16) {
        let _ = code;
    }
}

/// Produces the application-level heartbeat some endpoints require instead of
/// transport pings.
pub trait PingStrategy: Send + Sync + 'static {
    fn ping(&self) -> Outgoing;

    /// Whether an inbound payload is the endpoint's heartbeat reply. Matching
    /// payloads count as a pong and are not forwarded to the handler.
    fn is_pong(&self, payload: &Value) -> bool {
        let _ = payload;
        false
    }
}

impl<F> PingStrategy for F
where
    F: Fn() -> Outgoing + Send + Sync + 'static,
{
    fn ping(&self) -> Outgoing {
        self()
    }
}

/// Text heartbeat: sends a fixed message and treats a fixed reply as a pong.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct TextHeartbeat {
    pub ping: String,
    pub pong: String,
}

impl TextHeartbeat {
    #[must_use]
    pub fn new<P: Into<String>, Q: Into<String>>(ping: P, pong: Q) -> Self {
        Self {
            ping: ping.into(),
            pong: pong.into(),
        }
    }
}

impl PingStrategy for TextHeartbeat {
    fn ping(&self) -> Outgoing {
        Outgoing::Text(self.ping.clone())
    }

    fn is_pong(&self, payload: &Value) -> bool {
        payload.as_str() == Some(self.pong.as_str())
    }
}

/// Extracts the request id a payload replies to, if any.
pub trait Correlator: Send + Sync + 'static {
    fn request_id(&self, payload: &Value) -> Option<String>;
}

impl<F> Correlator for F
where
    F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
{
    fn request_id(&self, payload: &Value) -> Option<String> {
        self(payload)
    }
}

/// Reads the request id from a top-level field of an object payload. String
/// and integer ids are both accepted; integers are matched by their decimal
/// form.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct FieldCorrelator {
    pub field: String,
}

impl FieldCorrelator {
    #[must_use]
    pub fn new<S: Into<String>>(field: S) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Default for FieldCorrelator {
    fn default() -> Self {
        Self::new("id")
    }
}

impl Correlator for FieldCorrelator {
    fn request_id(&self, payload: &Value) -> Option<String> {
        match payload.get(&self.field)? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}
