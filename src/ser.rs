//! Writing drivers.
//!
//! - **Whole documents**: [`to_vec_with_options`] runs [`try_write`] once
//!   on a non-resumable stack
//! - **Step-wise output**: [`StreamSerializer`] suspends whenever the
//!   output buffer reaches the flush threshold or an
//!   [`AsyncSequence`](crate::AsyncSequence) element is not ready, and
//!   resumes on the next call
//! - **Sinks**: [`to_writer_with_options`] drains a [`StreamSerializer`]
//!   into a [`std::io::Write`], [`to_async_writer`] into an
//!   [`AsyncWrite`] with optional cancellation
//!
//! ## Usage
//!
//! ```rust
//! use frameconv::ser::StreamSerializer;
//! use frameconv::ConvertOptions;
//!
//! let values = vec![1u32, 2, 3];
//! let options = ConvertOptions::new().with_flush_threshold(2);
//! let mut serializer = StreamSerializer::new(&values, options).unwrap();
//! let mut output = Vec::new();
//! while !serializer.write_step().unwrap() {
//!     output.extend(serializer.take_output());
//! }
//! output.extend(serializer.take_output());
//! assert_eq!(output, b"[1,2,3]");
//! ```

use crate::converter::CancellationToken;
use crate::descriptor::{Describe, TypeDescriptor};
use crate::engine::try_write;
use crate::options::ConvertOptions;
use crate::stack::WriteStack;
use crate::writer::TokenWriter;
use crate::{Error, Result};
use futures_lite::future;
use futures_lite::io::{AsyncWrite, AsyncWriteExt};
use log::debug;
use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Writes `value` as one document.
///
/// The write runs to completion; an asynchronous element that is not ready
/// yet is an error here. Use [`to_writer_with_options`] or
/// [`to_async_writer`] for sources that may wait.
///
/// # Errors
///
/// Returns an error if the value cannot be written.
pub fn to_vec_with_options<T: Describe>(value: &T, options: &ConvertOptions) -> Result<Vec<u8>> {
    let descriptor = options.registry.get::<T>()?;
    let mut writer = TokenWriter::new(options.flush_threshold);
    let mut stack = WriteStack::new(options.clone());
    if !try_write(&descriptor, value, &mut writer, &mut stack)? {
        return Err(Error::custom("write stopped before the value was complete"));
    }
    Ok(writer.take_output())
}

/// Writes `value` into `sink`, draining the output every time it reaches
/// the flush threshold. Pending asynchronous elements block the calling
/// thread.
///
/// # Errors
///
/// Returns an error if the value cannot be written or the sink fails.
pub fn to_writer_with_options<W, T>(mut sink: W, value: &T, options: &ConvertOptions) -> Result<()>
where
    W: io::Write,
    T: Describe,
{
    let mut serializer = StreamSerializer::new(value, options.clone())?;
    loop {
        let done = future::block_on(future::poll_fn(|cx| serializer.poll_write(cx)))?;
        sink.write_all(&serializer.take_output())?;
        if done {
            break;
        }
    }
    sink.flush()?;
    Ok(())
}

/// Writes `value` into an asynchronous sink.
///
/// The task is parked while an element of an
/// [`AsyncSequence`](crate::AsyncSequence) is pending. Cancelling
/// `cancellation` wakes it, fails the write with [`Error::Cancelled`] and
/// drops the element source; bytes already written stay in `sink`.
///
/// ```rust
/// use frameconv::ser::to_async_writer;
/// use frameconv::{AsyncSequence, ConvertOptions};
///
/// let sequence: AsyncSequence<String> = vec!["a".to_string(), "b".to_string()]
///     .into_iter()
///     .collect();
/// let mut sink = Vec::new();
/// futures_lite::future::block_on(to_async_writer(
///     &mut sink,
///     &sequence,
///     &ConvertOptions::default(),
///     None,
/// ))
/// .unwrap();
/// assert_eq!(sink, br#"["a","b"]"#);
/// ```
///
/// # Errors
///
/// Returns an error if the value cannot be written, the sink fails, or the
/// write was cancelled.
pub async fn to_async_writer<W, T>(
    sink: &mut W,
    value: &T,
    options: &ConvertOptions,
    cancellation: Option<CancellationToken>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Describe,
{
    let mut serializer = StreamSerializer::new(value, options.clone())?;
    if let Some(token) = cancellation {
        serializer = serializer.with_cancellation(token);
    }
    loop {
        let done = future::poll_fn(|cx| serializer.poll_write(cx)).await?;
        let chunk = serializer.take_output();
        if !chunk.is_empty() {
            sink.write_all(&chunk).await?;
        }
        if done {
            break;
        }
    }
    sink.flush().await?;
    Ok(())
}

/// Resumable writer of one value borrowed for `'v`.
pub struct StreamSerializer<'v> {
    descriptor: Arc<TypeDescriptor>,
    value: &'v dyn Any,
    writer: TokenWriter,
    stack: WriteStack<'v>,
    done: bool,
}

impl<'v> StreamSerializer<'v> {
    /// # Errors
    ///
    /// Returns an error if `T` cannot be described.
    pub fn new<T: Describe>(value: &'v T, options: ConvertOptions) -> Result<Self> {
        let descriptor = options.registry.get::<T>()?;
        Ok(StreamSerializer {
            descriptor,
            value,
            writer: TokenWriter::new(options.flush_threshold),
            stack: WriteStack::resumable(options),
            done: false,
        })
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.stack = self.stack.with_cancellation(token);
        self
    }

    /// Writes until the output should be drained, an asynchronous element
    /// is pending, or the value is complete. Returns `true` when complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written; the serializer is
    /// then reset and must not be resumed.
    pub fn write_step(&mut self) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        self.done = try_write(&self.descriptor, self.value, &mut self.writer, &mut self.stack)?;
        Ok(self.done)
    }

    /// Polling form of [`write_step`](Self::write_step).
    ///
    /// Returns `Poll::Pending` only when an asynchronous element is pending
    /// and no output is waiting to be drained; the element source holds the
    /// waker of `cx`.
    pub fn poll_write(&mut self, cx: &mut Context<'_>) -> Poll<Result<bool>> {
        self.stack.set_waker(Some(cx.waker().clone()));
        match self.write_step() {
            Err(err) => Poll::Ready(Err(err)),
            Ok(true) => Poll::Ready(Ok(true)),
            Ok(false) if self.stack.is_pending_async() && self.writer.pending_bytes() == 0 => {
                debug!("write parked on a pending asynchronous element");
                Poll::Pending
            }
            Ok(false) => Poll::Ready(Ok(false)),
        }
    }

    /// Takes the bytes produced so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.writer.take_output()
    }

    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.writer.pending_bytes()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn is_pending_async(&self) -> bool {
        self.stack.is_pending_async()
    }
}

impl fmt::Debug for StreamSerializer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSerializer")
            .field("type", &self.descriptor.name())
            .field("stack", &self.stack)
            .field("pending_bytes", &self.writer.pending_bytes())
            .field("done", &self.done)
            .finish()
    }
}
