use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use pin_project::pin_project;
use tokio::time::Sleep;

use crate::config::BatchPolicy;

/// Groups stream elements into `Vec`s by count and time window.
///
/// A group is emitted when the buffer reaches `max_batch_size`, or when
/// `max_batch_delay` has elapsed since the first unflushed element arrived,
/// whichever happens first. This is a tumbling window: each element belongs
/// to exactly one group. The timer is armed only while the buffer is
/// non-empty, so an idle window emits nothing. When the upstream ends, a
/// pending partial group is flushed before the adapter completes.
#[pin_project]
pub struct GroupedWithin<S>
where
    S: Stream,
{
    #[pin]
    stream: S,
    #[pin]
    deadline: Option<Sleep>,
    buf: Vec<S::Item>,
    policy: BatchPolicy,
    done: bool,
}

impl<S> GroupedWithin<S>
where
    S: Stream,
{
    pub fn new(stream: S, policy: BatchPolicy) -> Self {
        Self {
            stream,
            deadline: None,
            buf: Vec::with_capacity(policy.max_batch_size()),
            policy,
            done: false,
        }
    }
}

impl<S> Stream for GroupedWithin<S>
where
    S: Stream,
{
    type Item = Vec<S::Item>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if this.buf.is_empty() {
                        this.deadline
                            .set(Some(tokio::time::sleep(this.policy.max_batch_delay())));
                    }
                    this.buf.push(item);
                    if this.buf.len() >= this.policy.max_batch_size() {
                        this.deadline.set(None);
                        let group = std::mem::replace(
                            this.buf,
                            Vec::with_capacity(this.policy.max_batch_size()),
                        );
                        return Poll::Ready(Some(group));
                    }
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    this.deadline.set(None);
                    if this.buf.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(std::mem::take(this.buf)));
                }
                Poll::Pending => {
                    let Some(deadline) = this.deadline.as_mut().as_pin_mut() else {
                        return Poll::Pending;
                    };
                    match deadline.poll(cx) {
                        Poll::Ready(()) => {
                            this.deadline.set(None);
                            let group = std::mem::replace(
                                this.buf,
                                Vec::with_capacity(this.policy.max_batch_size()),
                            );
                            return Poll::Ready(Some(group));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}
