use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A message delivered by an external subscription.
///
/// `ack_token` is the opaque token the subscription expects back to confirm
/// delivery. Redelivery of unacknowledged messages is the subscription's
/// responsibility, not this crate's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub id: String,
    pub payload: Bytes,
    pub ack_token: String,
}

/// A group of ack tokens flushed together to the acknowledgement sink.
///
/// Batches are disjoint: every observed token appears in exactly one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckBatch {
    pub tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AckBatch {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
