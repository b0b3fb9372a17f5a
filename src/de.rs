//! Reading drivers.
//!
//! This module drives [`try_read`] over whole documents and over input that
//! arrives in pieces.
//!
//! ## Overview
//!
//! - **Whole documents**: [`from_slice_with_options`] reads a fully
//!   buffered document in a single pass on the fast path
//! - **Chunked input**: [`StreamDeserializer`] accepts chunks of any size,
//!   including one byte at a time, and keeps only the unconsumed tail
//! - **Readers**: [`from_reader_with_options`] feeds a [`std::io::Read`]
//!   into a [`StreamDeserializer`] in `buffer_size` chunks
//!
//! ## Usage
//!
//! ```rust
//! use frameconv::de::StreamDeserializer;
//! use frameconv::ConvertOptions;
//!
//! let mut stream = StreamDeserializer::<Vec<u32>>::new(ConvertOptions::default()).unwrap();
//! assert!(!stream.feed(b"[1, 2").unwrap());
//! assert!(stream.feed(b", 3]").unwrap());
//! assert_eq!(stream.finish().unwrap(), vec![1, 2, 3]);
//! ```

use crate::descriptor::{unbox, Describe, TypeDescriptor};
use crate::engine::try_read;
use crate::options::ConvertOptions;
use crate::pool::BufferPool;
use crate::reader::{ReaderState, TokenReader};
use crate::stack::ReadStack;
use crate::{Error, Result};
use log::debug;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

/// Reads one `T` from a fully buffered document.
///
/// # Errors
///
/// Returns an error if the input is malformed, ends early, carries trailing
/// data, or cannot be bound to `T`.
pub fn from_slice_with_options<T: Describe>(input: &[u8], options: &ConvertOptions) -> Result<T> {
    let descriptor = options.registry.get::<T>()?;
    let mut stack = ReadStack::new(options.clone());
    let mut reader = TokenReader::new(input, true);
    let value = try_read(&descriptor, &mut reader, &mut stack)?
        .ok_or_else(|| Error::unexpected_end("input ended before the value was complete"))?;
    reader.read()?;
    unbox::<T>(value)
}

/// Reads one `T` from `reader` in chunks of `options.buffer_size` bytes.
///
/// # Errors
///
/// Returns an error if reading fails or the document is invalid.
pub fn from_reader_with_options<R, T>(mut reader: R, options: &ConvertOptions) -> Result<T>
where
    R: io::Read,
    T: Describe,
{
    let mut stream = StreamDeserializer::<T>::new(options.clone())?;
    let mut chunk = vec![0; options.buffer_size];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return stream.finish(),
            Ok(read) => {
                stream.feed(&chunk[..read])?;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
}

/// Incremental reader of one `T` from chunks of input.
///
/// Each call to [`feed`](Self::feed) resumes the conversion where the
/// previous chunk left it; bytes that did not form a whole token are kept
/// and retried with the next chunk.
pub struct StreamDeserializer<T> {
    descriptor: Arc<TypeDescriptor>,
    stack: ReadStack,
    state: Option<ReaderState>,
    pending: Vec<u8>,
    result: Option<T>,
}

impl<T: Describe> StreamDeserializer<T> {
    /// # Errors
    ///
    /// Returns an error if `T` cannot be described.
    pub fn new(options: ConvertOptions) -> Result<Self> {
        let descriptor = options.registry.get::<T>()?;
        Ok(StreamDeserializer {
            descriptor,
            stack: ReadStack::new(options),
            state: None,
            pending: Vec::new(),
            result: None,
        })
    }

    /// Uses `pool` for constructor scratch buffers instead of the
    /// per-thread pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` cannot be described.
    pub fn with_pool(options: ConvertOptions, pool: Rc<dyn BufferPool>) -> Result<Self> {
        let descriptor = options.registry.get::<T>()?;
        Ok(StreamDeserializer {
            descriptor,
            stack: ReadStack::with_pool(options, pool),
            state: None,
            pending: Vec::new(),
            result: None,
        })
    }

    /// Adds a chunk of input. Returns `true` once the root value is
    /// complete; later chunks may only contain whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the input seen so far is invalid.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<bool> {
        self.pending.extend_from_slice(chunk);
        self.step(false)
    }

    /// Number of buffered bytes not consumed yet.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Signals the end of input and returns the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is incomplete or invalid.
    pub fn finish(mut self) -> Result<T> {
        self.step(true)?;
        self.result
            .take()
            .ok_or_else(|| Error::unexpected_end("input ended before the value was complete"))
    }

    fn step(&mut self, is_final: bool) -> Result<bool> {
        let state = self.state.take().unwrap_or_else(ReaderState::new);
        let mut reader = TokenReader::with_state(&self.pending, is_final, state);
        if self.result.is_none() {
            if let Some(value) = try_read(&self.descriptor, &mut reader, &mut self.stack)? {
                self.result = Some(unbox::<T>(value)?);
            }
        }
        if self.result.is_some() {
            reader.read()?;
        }
        let consumed = reader.bytes_consumed();
        self.state = Some(reader.into_state());
        self.pending.drain(..consumed);
        debug!(
            "fed {} byte(s), {} kept for the next chunk",
            consumed,
            self.pending.len()
        );
        Ok(self.result.is_some())
    }
}

impl<T> fmt::Debug for StreamDeserializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDeserializer")
            .field("type", &self.descriptor.name())
            .field("stack", &self.stack)
            .field("buffered", &self.pending.len())
            .field("complete", &self.result.is_some())
            .finish()
    }
}
