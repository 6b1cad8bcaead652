#![expect(
    clippy::module_name_repetitions,
    reason = "ChannelHandler names the handler kind it implements"
)]

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use super::client::Client;
use super::traits::MessageHandler;
use crate::error::Error;

/// Everything a [`ChannelHandler`] forwards, in the order the client saw it.
#[non_exhaustive]
#[derive(Debug)]
pub enum Event {
    Message(Value),
    Error(Error),
    /// A connection was torn down with this close code
    Close(u16),
}

/// [`MessageHandler`] that turns callbacks into a stream of [`Event`]s.
///
/// The channel is bounded: when the consumer falls behind, the receive loop
/// waits for room instead of dropping messages. Once the stream is dropped,
/// further events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::Sender<Event>,
}

impl ChannelHandler {
    /// Create a handler and the stream it feeds.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, impl Stream<Item = Event> + Send + 'static) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));

        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        (Self { tx }, stream)
    }

    async fn forward(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!("Event stream dropped, discarding event");
        }
    }
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn on_message(&self, _client: &Client, message: Value) {
        self.forward(Event::Message(message)).await;
    }

    async fn on_error(&self, error: Error) {
        self.forward(Event::Error(error)).await;
    }

    async fn on_close(&self, code: u16) {
        self.forward(Event::Close(code)).await;
    }
}
