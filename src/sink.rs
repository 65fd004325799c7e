use std::future::Future;

use crate::message::{AckBatch, ReceivedMessage};

pub mod mem;

/// External acknowledgement endpoint.
///
/// A failed batch is not retried by the pipeline; the subscription's
/// timeout-based redelivery is the recovery path for its tokens.
pub trait AckSink: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn acknowledge(&self, batch: AckBatch)
        -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// User processing logic, the second consumer of the fan-out.
///
/// Errors here are outside the acknowledgement contract: they are logged and
/// do not stop the pipeline.
pub trait ProcessSink: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn process(
        &mut self,
        message: ReceivedMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Drops every message. The default processing sink, for ack-only wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessSink;

impl ProcessSink for NoopProcessSink {
    type Error = std::convert::Infallible;

    async fn process(&mut self, _message: ReceivedMessage) -> Result<(), Self::Error> {
        Ok(())
    }
}
