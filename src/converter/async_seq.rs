//! Asynchronous element sources.
//!
//! An [`AsyncSequence`] wraps a [`Stream`] of elements that may not be
//! available yet. Writing one polls the stream once per element from inside
//! the ordinary synchronous write loop: when the stream is pending, the
//! frame keeps the stream and the write returns `Ok(false)` with
//! [`WriteStack::is_pending_async`] set. The next call polls the same stream
//! again, so no fetch is ever issued twice.
//!
//! The opening `[` is written only once the first element (or the end of
//! the stream) is available, so a source that fails before producing
//! anything leaves the output untouched.

use super::collection::{end_array, start_array};
use crate::descriptor::{downcast_ref, Boxed, TypeDescriptor};
use crate::engine::write_value;
use crate::stack::{ObjectState, PathSegment, WriteStack};
use crate::writer::TokenWriter;
use crate::{Error, Result};
use futures_lite::stream::{self, Stream, StreamExt};
use log::{debug, trace};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

/// A type-erased element stream held by a write frame.
pub(crate) type ErasedStream = Pin<Box<dyn Stream<Item = Result<Boxed>>>>;

type ElementStream<T> = Pin<Box<dyn Stream<Item = Result<T>>>>;

/// A sequence of `T` produced asynchronously, written as a JSON array.
///
/// The sequence is consumed by the first write. Reading an array into an
/// `AsyncSequence` buffers the elements and replays them as a ready stream.
///
/// ```rust
/// use frameconv::AsyncSequence;
///
/// let sequence: AsyncSequence<u32> = vec![1, 2, 3].into_iter().collect();
/// assert_eq!(frameconv::to_string(&sequence).unwrap(), "[1,2,3]");
/// assert!(sequence.is_consumed());
/// ```
pub struct AsyncSequence<T> {
    stream: RefCell<Option<ElementStream<T>>>,
}

impl<T: 'static> AsyncSequence<T> {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T>> + 'static,
    {
        AsyncSequence {
            stream: RefCell::new(Some(Box::pin(stream))),
        }
    }

    /// Takes the element stream; empty once the sequence was consumed.
    pub fn into_stream(self) -> ElementStream<T> {
        self.stream
            .into_inner()
            .unwrap_or_else(|| Box::pin(stream::empty()))
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.stream.borrow().is_none()
    }

    pub(crate) fn take_stream(&self) -> Option<ErasedStream> {
        let stream = self.stream.borrow_mut().take()?;
        Some(Box::pin(
            stream.map(|item| item.map(|value| Box::new(value) as Boxed)),
        ))
    }
}

impl<T: 'static> FromIterator<T> for AsyncSequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<Result<T>> = iter.into_iter().map(Ok).collect();
        AsyncSequence::new(stream::iter(items))
    }
}

impl<T> fmt::Debug for AsyncSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSequence")
            .field("consumed", &self.stream.borrow().is_none())
            .finish()
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// Cancels a resumable write that waits on an asynchronous element.
///
/// Cancelling wakes the pending task; its next write call fails with
/// [`Error::Cancelled`] and drops the element stream.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelState>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let wakers = std::mem::take(
            &mut *self
                .inner
                .wakers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!("cancellation requested, waking {} task(s)", wakers.len());
        for waker in wakers {
            waker.wake();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn register(&self, waker: &Waker) {
        let mut wakers = self
            .inner
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !wakers.iter().any(|known| known.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// Extracts the stream of an [`AsyncSequence`] behind `dyn Any`.
pub(crate) struct AsyncSource {
    take: fn(&dyn Any) -> Result<Option<ErasedStream>>,
}

fn take_erased<T: 'static>(value: &dyn Any) -> Result<Option<ErasedStream>> {
    Ok(downcast_ref::<AsyncSequence<T>>(value)?.take_stream())
}

impl AsyncSource {
    pub fn of<T: 'static>() -> Self {
        AsyncSource {
            take: take_erased::<T>,
        }
    }
}

/// Writes the elements of an asynchronous sequence as they become ready.
pub(crate) fn write_async<'v>(
    element: &Arc<TypeDescriptor>,
    source: &AsyncSource,
    value: &'v dyn Any,
    writer: &mut TokenWriter,
    stack: &mut WriteStack<'v>,
) -> Result<bool> {
    if stack.current().object_state == ObjectState::None {
        let stream = (source.take)(value)?
            .ok_or_else(|| Error::custom("asynchronous sequence was already consumed"))?;
        let frame = stack.current();
        frame.stream = Some(stream);
        frame.object_state = ObjectState::ReadingMembers;
    }

    let waker = stack
        .waker
        .clone()
        .unwrap_or_else(|| Waker::from(Arc::new(NoopWake)));
    let mut cx = Context::from_waker(&waker);

    loop {
        if stack
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Err(Error::Cancelled);
        }
        let mut source = stack
            .current()
            .stream
            .take()
            .ok_or_else(|| Error::custom("asynchronous sequence frame lost its stream"))?;
        match source.as_mut().poll_next(&mut cx) {
            Poll::Pending => {
                if !stack.supports_continuation {
                    return Err(Error::custom(
                        "asynchronous element is not ready and the write cannot suspend",
                    ));
                }
                let frame = stack.current();
                frame.stream = Some(source);
                let index = frame.index;
                stack.pending_async = true;
                if let Some(token) = &stack.cancellation {
                    token.register(&waker);
                }
                trace!("asynchronous element {} pending", index);
                return Ok(false);
            }
            Poll::Ready(Some(item)) => {
                let item = item?;
                let frame = stack.current();
                frame.stream = Some(source);
                start_array(writer, frame)?;
                frame.segment = Some(PathSegment::Index(frame.index));
                write_detached(element, &*item, writer, stack)?;
                let preserving = stack.options.preserves_references();
                let frame = stack.current();
                if preserving {
                    frame.retained.push(item);
                }
                frame.segment = None;
                frame.index += 1;
                if stack.should_suspend(writer) {
                    return Ok(false);
                }
            }
            Poll::Ready(None) => {
                let frame = stack.current();
                start_array(writer, frame)?;
                end_array(writer, frame)?;
                return Ok(true);
            }
        }
    }
}

/// Writes one element whole on a stack of its own; the element is owned by
/// this call, not by the borrowed value graph. Reference ids stay shared
/// with the outer write.
fn write_detached(
    element: &Arc<TypeDescriptor>,
    item: &dyn Any,
    writer: &mut TokenWriter,
    stack: &mut WriteStack<'_>,
) -> Result<()> {
    let mut detached = WriteStack::new(stack.options.clone());
    std::mem::swap(&mut detached.references, &mut stack.references);
    let result = write_value(element, item, writer, &mut detached, None);
    std::mem::swap(&mut detached.references, &mut stack.references);
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future;

    #[test]
    fn test_sequence_is_consumed_once() {
        let sequence: AsyncSequence<u8> = vec![1, 2].into_iter().collect();
        assert!(!sequence.is_consumed());
        assert!(sequence.take_stream().is_some());
        assert!(sequence.is_consumed());
        assert!(sequence.take_stream().is_none());
    }

    #[test]
    fn test_into_stream_yields_elements() {
        let sequence: AsyncSequence<u8> = vec![4, 5].into_iter().collect();
        let items: Vec<u8> = future::block_on(
            sequence
                .into_stream()
                .map(|item| item.unwrap())
                .collect::<Vec<_>>(),
        );
        assert_eq!(items, vec![4, 5]);
    }

    #[test]
    fn test_cancel_wakes_registered_tasks() {
        struct Flag(AtomicBool);
        impl Wake for Flag {
            fn wake(self: Arc<Self>) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let waker = Waker::from(flag.clone());
        let token = CancellationToken::new();
        token.register(&waker);
        token.register(&waker);
        token.cancel();
        assert!(token.is_cancelled());
        assert!(flag.0.load(Ordering::SeqCst));
    }
}
