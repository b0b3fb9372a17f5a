//! Read and write stacks.
//!
//! A stack is a vector of plain frames indexed by `depth`. Converters never
//! recurse on the native call stack across suspension points: when a
//! conversion suspends, every frame stays in place with its phase recorded,
//! `depth` is reset to zero, and the next call walks back down the same
//! frames (`depth < frames.len()` means "resuming").

use crate::converter::{CancellationToken, ErasedStream};
use crate::descriptor::{Boxed, TypeDescriptor};
use crate::metadata::MetadataFlags;
use crate::options::{ConvertOptions, NumberHandling};
use crate::pool::{ArgumentSlots, ArrayPool, BufferPool, BufferedProperty, Rented};
use crate::reference::{ReferenceResolver, ReferenceTracker};
use crate::writer::TokenWriter;
use crate::{Error, Result};
use log::trace;
use std::any::Any;
use std::fmt::{self, Write as _};
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;

/// One step of an element path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PathSegment {
    Property(String),
    Index(usize),
}

/// Phase of a composite frame. Phases only move forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ObjectState {
    #[default]
    None,
    ReadMetadata,
    Polymorphic,
    CreatedObject,
    ReadingMembers,
    EndToken,
    EndTokenValidation,
}

/// Phase of the member (or dictionary entry) in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum PropertyState {
    #[default]
    None,
    ReadName,
    ReadValue,
}

/// Where the value of an input member goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum MemberTarget {
    Property(usize),
    Parameter(usize),
    Extension(String),
    Skip,
}

/// Bit per property, set as members are observed.
#[derive(Clone, Debug, Default)]
pub(crate) struct SeenMembers(Vec<u64>);

impl SeenMembers {
    pub fn with_len(len: usize) -> Self {
        SeenMembers(vec![0; (len + 63) / 64])
    }

    pub fn insert(&mut self, index: usize) {
        if let Some(word) = self.0.get_mut(index / 64) {
            *word |= 1 << (index % 64);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0
            .get(index / 64)
            .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }
}

/// State of one nesting level while reading.
pub(crate) struct ReadFrame {
    pub descriptor: Arc<TypeDescriptor>,
    pub number_handling: Option<NumberHandling>,
    pub object_state: ObjectState,
    pub property_state: PropertyState,
    pub return_value: Option<Boxed>,
    pub segment: Option<PathSegment>,
    pub member: Option<MemberTarget>,
    pub args: Option<ArgumentSlots>,
    pub buffered: Option<Rented<BufferedProperty>>,
    pub dictionary_key: Option<Boxed>,
    pub index: usize,
    pub metadata: MetadataFlags,
    pub reference_id: Option<String>,
    pub ref_id: Option<String>,
    pub discriminator: Option<String>,
    pub polymorphic: Option<usize>,
    pub pending_name: Option<String>,
    pub object_ended: bool,
    pub wrapped: bool,
    pub seen: SeenMembers,
}

impl ReadFrame {
    fn new(descriptor: Arc<TypeDescriptor>, number_handling: Option<NumberHandling>) -> Self {
        ReadFrame {
            descriptor,
            number_handling,
            object_state: ObjectState::None,
            property_state: PropertyState::None,
            return_value: None,
            segment: None,
            member: None,
            args: None,
            buffered: None,
            dictionary_key: None,
            index: 0,
            metadata: MetadataFlags::default(),
            reference_id: None,
            ref_id: None,
            discriminator: None,
            polymorphic: None,
            pending_name: None,
            object_ended: false,
            wrapped: false,
            seen: SeenMembers::default(),
        }
    }
}

fn format_path<'a>(segments: impl Iterator<Item = &'a PathSegment>) -> String {
    let mut path = String::from("$");
    for segment in segments {
        match segment {
            PathSegment::Index(index) => {
                let _ = write!(path, "[{}]", index);
            }
            PathSegment::Property(name) => {
                let plain = name
                    .chars()
                    .next()
                    .is_some_and(|first| first.is_alphabetic() || first == '_')
                    && name.chars().all(|ch| ch.is_alphanumeric() || ch == '_');
                if plain {
                    let _ = write!(path, ".{}", name);
                } else {
                    let _ = write!(path, "['{}']", name.replace('\'', "\\'"));
                }
            }
        }
    }
    path
}

/// Continuation state of a read.
///
/// A stack is bound to one document at a time. After a call returns
/// `Ok(None)` the same stack must be passed again together with a reader
/// that continues the document.
pub struct ReadStack {
    pub(crate) frames: Vec<ReadFrame>,
    pub(crate) depth: usize,
    pub(crate) options: ConvertOptions,
    pub(crate) supports_continuation: Option<bool>,
    pub(crate) root_token_read: bool,
    pub(crate) resolver: ReferenceResolver,
    pub(crate) pool: Rc<dyn BufferPool>,
}

impl ReadStack {
    #[must_use]
    pub fn new(options: ConvertOptions) -> Self {
        Self::with_pool(options, ArrayPool::shared())
    }

    /// Creates a stack renting scratch buffers from `pool`.
    #[must_use]
    pub fn with_pool(options: ConvertOptions, pool: Rc<dyn BufferPool>) -> Self {
        ReadStack {
            frames: Vec::new(),
            depth: 0,
            options,
            supports_continuation: None,
            root_token_read: false,
            resolver: ReferenceResolver::default(),
            pool,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Number of frames kept for resumption.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_resuming(&self) -> bool {
        self.depth < self.frames.len()
    }

    /// Enters a frame for `descriptor`, re-entering the suspended one if
    /// resuming.
    pub(crate) fn push(
        &mut self,
        descriptor: &Arc<TypeDescriptor>,
        number_handling: Option<NumberHandling>,
    ) -> Result<()> {
        if self.is_resuming() {
            self.depth += 1;
            trace!("resume {} at depth {}", descriptor.name(), self.depth);
            return Ok(());
        }
        if self.depth >= self.options.max_depth {
            return Err(Error::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        self.frames
            .push(ReadFrame::new(descriptor.clone(), number_handling));
        self.depth += 1;
        trace!("push {} at depth {}", descriptor.name(), self.depth);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<ReadFrame> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::custom("read stack underflow"))?;
        self.depth = self.frames.len();
        trace!("pop {} at depth {}", frame.descriptor.name(), self.depth + 1);
        Ok(frame)
    }

    pub(crate) fn current(&mut self) -> &mut ReadFrame {
        let index = self.depth - 1;
        &mut self.frames[index]
    }

    pub(crate) fn parent(&self) -> Option<&ReadFrame> {
        self.depth.checked_sub(1).and_then(|index| self.frames.get(index))
    }

    /// Returns `true` if composite values of `descriptor` may be read with
    /// the single-pass loops.
    pub(crate) fn use_fast_path(&self, descriptor: &TypeDescriptor) -> bool {
        self.supports_continuation == Some(false)
            && crate::metadata::allowed(descriptor, &self.options).is_empty()
    }

    /// Path of the element currently being read, e.g. `$.items[2].name`.
    #[must_use]
    pub fn path(&self) -> String {
        format_path(
            self.frames[..self.depth.min(self.frames.len())]
                .iter()
                .filter_map(|frame| frame.segment.as_ref()),
        )
    }

    /// Drops all frames, returning any rented buffers to the pool.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.depth = 0;
        self.supports_continuation = None;
        self.root_token_read = false;
        self.resolver.clear();
    }
}

impl fmt::Debug for ReadStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStack")
            .field("frames", &self.frames.len())
            .field("depth", &self.depth)
            .field("path", &self.path())
            .finish()
    }
}

/// State of one nesting level while writing.
pub(crate) struct WriteFrame<'v> {
    pub descriptor: Arc<TypeDescriptor>,
    pub number_handling: Option<NumberHandling>,
    pub object_state: ObjectState,
    pub property_state: PropertyState,
    pub property_index: usize,
    pub segment: Option<PathSegment>,
    pub elements: Option<Box<dyn Iterator<Item = &'v dyn Any> + 'v>>,
    pub current: Option<&'v dyn Any>,
    pub entries: Option<Box<dyn Iterator<Item = (&'v dyn Any, &'v dyn Any)> + 'v>>,
    pub current_entry: Option<(&'v dyn Any, &'v dyn Any)>,
    pub index: usize,
    pub reference_id: Option<String>,
    pub discriminator: Option<String>,
    pub polymorphic: Option<usize>,
    pub stream: Option<ErasedStream>,
    /// Asynchronous elements written while references are tracked; they
    /// stay alive so a freed address is never mistaken for a written one.
    pub retained: Vec<Boxed>,
    pub array_started: bool,
}

impl<'v> WriteFrame<'v> {
    fn new(descriptor: Arc<TypeDescriptor>, number_handling: Option<NumberHandling>) -> Self {
        WriteFrame {
            descriptor,
            number_handling,
            object_state: ObjectState::None,
            property_state: PropertyState::None,
            property_index: 0,
            segment: None,
            elements: None,
            current: None,
            entries: None,
            current_entry: None,
            index: 0,
            reference_id: None,
            discriminator: None,
            polymorphic: None,
            stream: None,
            retained: Vec::new(),
            array_started: false,
        }
    }
}

/// Continuation state of a write over a value borrowed for `'v`.
pub struct WriteStack<'v> {
    pub(crate) frames: Vec<WriteFrame<'v>>,
    pub(crate) depth: usize,
    pub(crate) options: ConvertOptions,
    pub(crate) supports_continuation: bool,
    pub(crate) started: bool,
    pub(crate) references: ReferenceTracker,
    pub(crate) waker: Option<Waker>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) pending_async: bool,
}

impl<'v> WriteStack<'v> {
    /// Creates a stack that runs every write to completion.
    #[must_use]
    pub fn new(options: ConvertOptions) -> Self {
        WriteStack {
            frames: Vec::new(),
            depth: 0,
            options,
            supports_continuation: false,
            started: false,
            references: ReferenceTracker::default(),
            waker: None,
            cancellation: None,
            pending_async: false,
        }
    }

    /// Creates a stack that suspends whenever the writer asks for a flush
    /// or an [`AsyncSequence`](crate::AsyncSequence) element is not ready yet.
    #[must_use]
    pub fn resumable(options: ConvertOptions) -> Self {
        WriteStack {
            supports_continuation: true,
            ..Self::new(options)
        }
    }

    /// Aborts pending asynchronous element fetches once `token` is
    /// cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Waker handed to pending asynchronous element sources.
    pub fn set_waker(&mut self, waker: Option<Waker>) {
        self.waker = waker;
    }

    /// Returns `true` if the last suspension waits on an asynchronous
    /// element rather than on output space.
    #[must_use]
    pub fn is_pending_async(&self) -> bool {
        self.pending_async
    }

    pub(crate) fn is_resuming(&self) -> bool {
        self.depth < self.frames.len()
    }

    pub(crate) fn push(
        &mut self,
        descriptor: &Arc<TypeDescriptor>,
        number_handling: Option<NumberHandling>,
    ) -> Result<()> {
        if self.is_resuming() {
            self.depth += 1;
            trace!("resume {} at depth {}", descriptor.name(), self.depth);
            return Ok(());
        }
        if self.depth >= self.options.max_depth {
            return Err(Error::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        self.frames
            .push(WriteFrame::new(descriptor.clone(), number_handling));
        self.depth += 1;
        trace!("push {} at depth {}", descriptor.name(), self.depth);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::custom("write stack underflow"))?;
        self.depth = self.frames.len();
        trace!("pop {} at depth {}", frame.descriptor.name(), self.depth + 1);
        Ok(())
    }

    pub(crate) fn current(&mut self) -> &mut WriteFrame<'v> {
        let index = self.depth - 1;
        &mut self.frames[index]
    }

    pub(crate) fn should_suspend(&self, writer: &TokenWriter) -> bool {
        self.supports_continuation && writer.should_flush()
    }

    #[must_use]
    pub fn path(&self) -> String {
        format_path(
            self.frames[..self.depth.min(self.frames.len())]
                .iter()
                .filter_map(|frame| frame.segment.as_ref()),
        )
    }

    /// Drops all frames; suspended element iterators and asynchronous
    /// sources are dropped with them.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.depth = 0;
        self.started = false;
        self.pending_async = false;
        self.references.clear();
    }
}

impl fmt::Debug for WriteStack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteStack")
            .field("frames", &self.frames.len())
            .field("depth", &self.depth)
            .field("resumable", &self.supports_continuation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Registry;

    fn descriptor() -> Arc<TypeDescriptor> {
        Registry::new().get::<Vec<u8>>().unwrap()
    }

    #[test]
    fn test_push_resumes_existing_frames() {
        let desc = descriptor();
        let mut stack = ReadStack::new(ConvertOptions::default());
        stack.push(&desc, None).unwrap();
        stack.current().index = 3;
        stack.push(&desc, None).unwrap();
        stack.depth = 0;
        assert!(stack.is_resuming());
        stack.push(&desc, None).unwrap();
        assert_eq!(stack.current().index, 3);
        assert_eq!(stack.frame_count(), 2);
    }

    #[test]
    fn test_depth_guard() {
        let desc = descriptor();
        let mut stack = ReadStack::new(ConvertOptions::new().with_max_depth(2));
        stack.push(&desc, None).unwrap();
        stack.push(&desc, None).unwrap();
        let err = stack.push(&desc, None).unwrap_err();
        assert!(err.is_capacity());
    }

    #[test]
    fn test_path_formatting() {
        let desc = descriptor();
        let mut stack = WriteStack::new(ConvertOptions::default());
        stack.push(&desc, None).unwrap();
        stack.current().segment = Some(PathSegment::Property("items".to_string()));
        stack.push(&desc, None).unwrap();
        stack.current().segment = Some(PathSegment::Index(2));
        stack.push(&desc, None).unwrap();
        stack.current().segment = Some(PathSegment::Property("first name".to_string()));
        assert_eq!(stack.path(), "$.items[2]['first name']");
        stack.reset();
        assert_eq!(stack.path(), "$");
    }

    #[test]
    fn test_seen_members() {
        let mut seen = SeenMembers::with_len(70);
        seen.insert(0);
        seen.insert(65);
        assert!(seen.contains(65));
        assert!(!seen.contains(64));
        assert!(!SeenMembers::default().contains(0));
    }
}
