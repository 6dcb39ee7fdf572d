//! Wrapper which converts CPU-intensive iterators to async streams.
//!
//! Page extraction reads rasterized files from disk on each `next()` call,
//! and we don't want that happening on the async executor's threads.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{FutureExt as _, Stream};

use super::BoxedFuture;
use crate::prelude::*;

/// Between polls we either hold the iterator, or a future that will give it
/// back along with the next item.
enum State<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    Iter(I),
    Waiting(BoxedFuture<(Option<Result<T>>, I)>),
}

/// A [`Stream`] wrapping a blocking iterator.
pub struct BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    state: Option<State<I, T>>,
}

impl<I, T> BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    /// Create a new [`BlockingIterStream`] from an iterator.
    pub fn new(iter: I) -> Self {
        Self {
            state: Some(State::Iter(iter)),
        }
    }
}

impl<I, T> Stream for BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    type Item = I::Item;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        // Extract our state. We _must_ put it back before we return.
        let this = self.as_mut().get_mut();
        let state = this
            .state
            .take()
            .expect("should always have state on entry to poll_next");

        let mut future = match state {
            State::Iter(mut iter) => {
                // Run `iter.next()` on the blocking thread pool. This takes
                // ownership of the iterator; the future hands it back.
                spawn_blocking_propagating_panics(move || {
                    let next = iter.next();
                    (next, iter)
                })
                .boxed()
            }
            State::Waiting(future) => future,
        };

        match Pin::new(&mut future).poll(cx) {
            Poll::Ready((next, iter)) => {
                this.state = Some(State::Iter(iter));
                Poll::Ready(next)
            }
            Poll::Pending => {
                this.state = Some(State::Waiting(future));
                Poll::Pending
            }
        }
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}
