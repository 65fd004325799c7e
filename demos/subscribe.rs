use std::time::Duration;

use ackflow::{
    config::BatchPolicy,
    message::ReceivedMessage,
    pipeline::PipelineBuilder,
    sink::mem::{MemoryAckSink, RecordingProcessSink},
    source,
};
use bytes::Bytes;
use tracing::info;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ackflow::Error> {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .init();

    let (publisher, subscription) = source::memory();
    let ack_sink = MemoryAckSink::new();
    let process_sink = RecordingProcessSink::new();

    let policy = BatchPolicy::new(10, Duration::from_secs(1))?;
    let handle = PipelineBuilder::new(subscription, ack_sink.clone(), policy)
        .process_sink(process_sink.clone())
        .spawn();

    for i in 0..25 {
        publisher.publish(ReceivedMessage {
            id: format!("msg-{i}"),
            payload: Bytes::from(format!("hello {i}")),
            ack_token: format!("tok-{i}"),
        });
    }
    drop(publisher);

    handle.join().await?;

    for batch in ack_sink.batches() {
        info!(size = batch.len(), created_at = %batch.created_at, "acknowledged");
    }
    info!(processed = process_sink.messages().len(), "done");

    Ok(())
}
