use std::num::NonZeroUsize;

use futures::{pin_mut, Stream, StreamExt};
use snafu::{IntoError, ResultExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    batch::GroupedWithin,
    config::BatchPolicy,
    message::{AckBatch, ReceivedMessage},
    sink::{AckSink, NoopProcessSink, ProcessSink},
    utils::defer,
    AcknowledgeSnafu, PipelineTaskSnafu, SubscriptionSnafu,
};

const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Wires a subscription stream to an acknowledgement sink with batched
/// at-least-once acknowledgement, optionally fanning every message out to a
/// processing sink.
///
/// The default processing sink is [`NoopProcessSink`], which gives the
/// ack-only wiring.
pub struct PipelineBuilder<St, A, P> {
    source: St,
    ack_sink: A,
    process_sink: P,
    policy: BatchPolicy,
    queue_size: usize,
}

impl<St, E, A> PipelineBuilder<St, A, NoopProcessSink>
where
    St: Stream<Item = Result<ReceivedMessage, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    A: AckSink,
{
    pub fn new(source: St, ack_sink: A, policy: BatchPolicy) -> Self {
        Self {
            source,
            ack_sink,
            process_sink: NoopProcessSink,
            policy,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl<St, A, P> PipelineBuilder<St, A, P> {
    /// Replaces the processing sink, the second consumer of the fan-out.
    pub fn process_sink<Q>(self, process_sink: Q) -> PipelineBuilder<St, A, Q> {
        PipelineBuilder {
            source: self.source,
            ack_sink: self.ack_sink,
            process_sink,
            policy: self.policy,
            queue_size: self.queue_size,
        }
    }

    /// Capacity of each fan-out queue. A full queue backpressures the
    /// subscription stream instead of buffering without bound.
    pub fn queue_size(mut self, queue_size: NonZeroUsize) -> Self {
        self.queue_size = queue_size.get();
        self
    }
}

impl<St, E, A, P> PipelineBuilder<St, A, P>
where
    St: Stream<Item = Result<ReceivedMessage, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    A: AckSink,
    P: ProcessSink,
{
    /// Spawns the pipeline tasks and returns a handle to them.
    pub fn spawn(self) -> PipelineHandle {
        let token = CancellationToken::new();
        let join = tokio::spawn(run(
            self.source,
            self.ack_sink,
            self.process_sink,
            self.policy,
            self.queue_size,
            token.clone(),
        ));
        PipelineHandle { token, join }
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<Result<(), crate::Error>>,
}

impl PipelineHandle {
    /// Stops the pipeline. Buffered-but-unflushed tokens are discarded; the
    /// subscription's redelivery covers them.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the pipeline to finish. Resolves once the subscription
    /// stream has ended and the pending partial batch has been flushed.
    pub async fn join(self) -> Result<(), crate::Error> {
        self.join.await.context(PipelineTaskSnafu)?
    }

    /// Cancels and waits.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(self) -> Result<(), crate::Error> {
        self.cancel();
        self.join().await
    }
}

async fn run<St, E, A, P>(
    source: St,
    ack_sink: A,
    process_sink: P,
    policy: BatchPolicy,
    queue_size: usize,
    token: CancellationToken,
) -> Result<(), crate::Error>
where
    St: Stream<Item = Result<ReceivedMessage, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    A: AckSink,
    P: ProcessSink,
{
    let (ack_tx, ack_rx) = mpsc::channel(queue_size);
    let (process_tx, process_rx) = mpsc::channel(queue_size);

    // the acknowledger cancels this child token when it exits, so an ack
    // sink failure also stops a pump that is idle on the subscription
    let source_token = token.child_token();
    let acknowledger = tokio::spawn(run_acknowledger(
        ack_rx,
        ack_sink,
        policy,
        token.clone(),
        source_token.clone(),
    ));
    let processor = tokio::spawn(run_processor(process_rx, process_sink, token.clone()));

    // dropping the senders on return lets both consumers drain and finish
    let pump_res = pump(source, ack_tx, process_tx, source_token).await;

    let ack_res = acknowledger.await.context(PipelineTaskSnafu)?;
    processor.await.context(PipelineTaskSnafu)?;

    pump_res.and(ack_res)
}

async fn pump<St, E>(
    source: St,
    ack_tx: mpsc::Sender<String>,
    process_tx: mpsc::Sender<ReceivedMessage>,
    token: CancellationToken,
) -> Result<(), crate::Error>
where
    St: Stream<Item = Result<ReceivedMessage, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    pin_mut!(source);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            next = source.next() => match next {
                Some(Ok(message)) => {
                    // both consumers see every message; a closed queue means
                    // its task already exited and carries the cause
                    if ack_tx.send(message.ack_token.clone()).await.is_err() {
                        return Ok(());
                    }
                    if process_tx.send(message).await.is_err() {
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(SubscriptionSnafu.into_error(Box::new(e))),
                None => return Ok(()),
            },
        }
    }
}

async fn run_acknowledger<A>(
    ack_rx: mpsc::Receiver<String>,
    ack_sink: A,
    policy: BatchPolicy,
    token: CancellationToken,
    source_token: CancellationToken,
) -> Result<(), crate::Error>
where
    A: AckSink,
{
    let _guard = defer(move || source_token.cancel());
    let batches = GroupedWithin::new(ReceiverStream::new(ack_rx), policy);
    pin_mut!(batches);
    loop {
        let tokens = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            group = batches.next() => match group {
                Some(tokens) => tokens,
                None => return Ok(()),
            },
        };
        let batch = AckBatch::new(tokens);
        let size = batch.len();
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            res = ack_sink.acknowledge(batch) => {
                res.map_err(|e| AcknowledgeSnafu.into_error(Box::new(e)))?;
                debug!(size, "acknowledged batch");
            }
        }
    }
}

async fn run_processor<P>(
    mut process_rx: mpsc::Receiver<ReceivedMessage>,
    mut process_sink: P,
    token: CancellationToken,
) where
    P: ProcessSink,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            message = process_rx.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = process_sink.process(message) => if let Err(e) = res {
                error!("process message error: {e:?}");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bytes::Bytes;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        sink::mem::{MemoryAckSink, RecordingProcessSink},
        source,
    };

    fn message(i: usize) -> ReceivedMessage {
        ReceivedMessage {
            id: format!("msg-{i}"),
            payload: Bytes::from(format!("payload-{i}")),
            ack_token: format!("tok-{i}"),
        }
    }

    fn policy(size: usize) -> BatchPolicy {
        BatchPolicy::new(size, Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn fans_out_and_acknowledges_every_message() {
        let (publisher, subscription) = source::memory();
        let ack_sink = MemoryAckSink::new();
        let process_sink = RecordingProcessSink::new();

        let handle = PipelineBuilder::new(subscription, ack_sink.clone(), policy(2))
            .process_sink(process_sink.clone())
            .spawn();

        let messages: Vec<_> = (0..5).map(message).collect();
        for message in &messages {
            assert!(publisher.publish(message.clone()));
        }
        drop(publisher);
        handle.join().await.unwrap();

        assert_eq!(process_sink.messages(), messages);
        let sizes: Vec<usize> = ack_sink.batches().iter().map(AckBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let expected: Vec<String> = messages.iter().map(|m| m.ack_token.clone()).collect();
        assert_eq!(ack_sink.tokens(), expected);
    }

    #[tokio::test]
    async fn ack_sink_failure_fails_the_pipeline() {
        let (publisher, subscription) = source::memory();
        let ack_sink = MemoryAckSink::new();
        ack_sink.reject_batches(true);

        let handle = PipelineBuilder::new(subscription, ack_sink.clone(), policy(1)).spawn();
        assert!(publisher.publish(message(0)));

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, crate::Error::Acknowledge { .. }));
        assert!(ack_sink.batches().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_flushes_partial_batch_first() {
        let (publisher, subscription) = source::memory();
        let ack_sink = MemoryAckSink::new();

        let handle = PipelineBuilder::new(subscription, ack_sink.clone(), policy(10)).spawn();
        assert!(publisher.publish(message(0)));
        assert!(publisher.publish(message(1)));
        assert!(publisher.fail("subscription torn down"));

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, crate::Error::Subscription { .. }));
        assert_eq!(
            ack_sink.tokens(),
            vec!["tok-0".to_string(), "tok-1".to_string()]
        );
        assert_eq!(ack_sink.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_discards_unflushed_tokens() {
        let (publisher, subscription) = source::memory();
        let ack_sink = MemoryAckSink::new();

        let handle = PipelineBuilder::new(
            subscription,
            ack_sink.clone(),
            BatchPolicy::new(100, Duration::from_secs(3600)).unwrap(),
        )
        .spawn();
        assert!(publisher.publish(message(0)));
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.shutdown().await.unwrap();
        assert!(ack_sink.batches().is_empty());
    }

    #[tokio::test]
    async fn acknowledgement_is_independent_of_a_stalled_processor() {
        struct StalledSink(Arc<Notify>);

        impl ProcessSink for StalledSink {
            type Error = std::convert::Infallible;

            async fn process(&mut self, _message: ReceivedMessage) -> Result<(), Self::Error> {
                self.0.notified().await;
                Ok(())
            }
        }

        let (publisher, subscription) = source::memory();
        let ack_sink = MemoryAckSink::new();
        let gate = Arc::new(Notify::new());

        let handle = PipelineBuilder::new(subscription, ack_sink.clone(), policy(1))
            .process_sink(StalledSink(gate.clone()))
            .queue_size(NonZeroUsize::new(8).unwrap())
            .spawn();

        for i in 0..3 {
            assert!(publisher.publish(message(i)));
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while ack_sink.batches().len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("acknowledgements blocked by the processing sink");

        handle.shutdown().await.unwrap();
    }
}
