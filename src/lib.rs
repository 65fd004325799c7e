#![forbid(unsafe_code)]

use std::time::Duration;

use snafu::{Location, Snafu};

pub mod batch;
pub mod config;
pub mod message;
pub mod pipeline;
pub mod sink;
pub mod source;
mod utils;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("max batch size must be positive"))]
    InvalidBatchSize {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("invalid max batch delay: {delay:?}"))]
    InvalidBatchDelay {
        delay: Duration,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("subscription stream error"))]
    Subscription {
        #[snafu(source)]
        error: Box<dyn std::error::Error + Send + Sync + 'static>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("acknowledge batch error"))]
    Acknowledge {
        #[snafu(source)]
        error: Box<dyn std::error::Error + Send + Sync + 'static>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pipeline task panicked"))]
    PipelineTask {
        #[snafu(source)]
        error: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },
}
