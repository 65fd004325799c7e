//! In-memory sinks for demos and tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use snafu::{Location, Snafu};

use crate::{
    message::{AckBatch, ReceivedMessage},
    sink::{AckSink, ProcessSink},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("acknowledge batch rejected"))]
    Rejected {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Records every acknowledged batch; can be told to reject batches.
#[derive(Clone, Default)]
pub struct MemoryAckSink {
    batches: Arc<Mutex<Vec<AckBatch>>>,
    reject: Arc<AtomicBool>,
}

impl MemoryAckSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every batch is rejected with [`Error::Rejected`].
    pub fn reject_batches(&self, reject: bool) {
        self.reject.store(reject, Ordering::Release);
    }

    /// Batches acknowledged so far, in acknowledgement order.
    pub fn batches(&self) -> Vec<AckBatch> {
        self.batches.lock().clone()
    }

    /// All acknowledged tokens, flattened in acknowledgement order.
    pub fn tokens(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flat_map(|batch| batch.tokens.clone())
            .collect()
    }
}

impl AckSink for MemoryAckSink {
    type Error = Error;

    async fn acknowledge(&self, batch: AckBatch) -> Result<(), Self::Error> {
        if self.reject.load(Ordering::Acquire) {
            return RejectedSnafu.fail();
        }
        self.batches.lock().push(batch);
        Ok(())
    }
}

/// Records every processed message, in processing order.
#[derive(Clone, Default)]
pub struct RecordingProcessSink {
    messages: Arc<Mutex<Vec<ReceivedMessage>>>,
}

impl RecordingProcessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ReceivedMessage> {
        self.messages.lock().clone()
    }
}

impl ProcessSink for RecordingProcessSink {
    type Error = std::convert::Infallible;

    async fn process(&mut self, message: ReceivedMessage) -> Result<(), Self::Error> {
        self.messages.lock().push(message);
        Ok(())
    }
}
