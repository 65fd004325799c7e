use std::time::Duration;

use crate::{InvalidBatchDelaySnafu, InvalidBatchSizeSnafu};

/// Size/time window policy for grouping ack tokens into batches.
///
/// A batch is flushed when it holds `max_batch_size` tokens or when
/// `max_batch_delay` has elapsed since its first token arrived, whichever
/// happens first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    max_batch_size: usize,
    max_batch_delay: Duration,
}

impl BatchPolicy {
    /// Rejects a zero size or a zero delay before any message is processed.
    pub fn new(max_batch_size: usize, max_batch_delay: Duration) -> Result<Self, crate::Error> {
        if max_batch_size == 0 {
            return InvalidBatchSizeSnafu.fail();
        }
        if max_batch_delay.is_zero() {
            return InvalidBatchDelaySnafu {
                delay: max_batch_delay,
            }
            .fail();
        }
        Ok(Self {
            max_batch_size,
            max_batch_delay,
        })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn max_batch_delay(&self) -> Duration {
        self.max_batch_delay
    }
}
