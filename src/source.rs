//! In-process subscription source for demos and tests.
//!
//! Any `Stream<Item = Result<ReceivedMessage, E>>` works as a pipeline
//! source; this module provides a channel-backed one.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use snafu::{Location, Snafu};
use tokio::sync::mpsc;

use crate::message::ReceivedMessage;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("subscription failed: {message}"))]
    Subscription {
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Creates a connected publisher/subscription pair.
///
/// The subscription completes when every publisher clone has been dropped.
pub fn memory() -> (MemoryPublisher, MemorySubscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryPublisher { tx }, MemorySubscription { rx })
}

/// Publishes messages into a [`MemorySubscription`].
#[derive(Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Result<ReceivedMessage, Error>>,
}

impl MemoryPublisher {
    /// Returns false once the subscription side is gone.
    pub fn publish(&self, message: ReceivedMessage) -> bool {
        self.tx.send(Ok(message)).is_ok()
    }

    /// Injects a terminal subscription failure.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx
            .send(Err(SubscriptionSnafu {
                message: message.into(),
            }
            .build()))
            .is_ok()
    }
}

/// Channel-backed subscription stream.
pub struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<Result<ReceivedMessage, Error>>,
}

impl Stream for MemorySubscription {
    type Item = Result<ReceivedMessage, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
