//! Attaching an external `size_hint` to a stream.
//!
//! We count input records up front so progress bars can show a total, but
//! the underlying line/CSV streams don't know about that count. This wrapper
//! carries it, decrementing as items are consumed.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;

/// A [`Stream`] with an externally supplied size hint.
pub struct SizeHintStream<S> {
    stream: S,
    size_hint: (usize, Option<usize>),
}

impl<S> Stream for SizeHintStream<S>
where
    S: Stream + Send + Unpin + 'static,
    S::Item: Send + Unpin + 'static,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.stream).poll_next(cx) {
            Poll::Ready(Some(value)) => {
                let (lower, upper) = this.size_hint;
                this.size_hint =
                    (lower.saturating_sub(1), upper.map(|x| x.saturating_sub(1)));
                Poll::Ready(Some(value))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.size_hint
    }
}

/// Extension method adding `with_size_hint` to [`Stream`].
pub trait WithSizeHintExt: Stream {
    /// Wrap the stream in a [`SizeHintStream`] with the given size hint.
    fn with_size_hint(self, size_hint: (usize, Option<usize>)) -> SizeHintStream<Self>
    where
        Self: Sized,
    {
        SizeHintStream {
            stream: self,
            size_hint,
        }
    }
}

impl<S> WithSizeHintExt for S where S: Stream {}
