//! Pooled scratch buffers for constructor binding.
//!
//! Parameterized construction needs three kinds of scratch space: argument
//! slots for constructors with many parameters, the list of property
//! positions found ahead of construction (fast path), and the list of
//! eagerly converted property values (resumable path). All three are rented
//! from a [`BufferPool`] owned by the read stack and returned through
//! [`Rented`]'s `Drop`, so every exit path (completion, error, a dropped
//! stack) hands the buffer back cleared.
//!
//! ```rust
//! use frameconv::pool::{ArrayPool, BufferPool};
//!
//! let pool = ArrayPool::new();
//! let slots = pool.rent_slots(8);
//! assert!(slots.is_empty());
//! pool.return_slots(slots);
//! assert_eq!(pool.retained(), 1);
//! ```

use crate::descriptor::Boxed;
use crate::reader::Checkpoint;
use crate::stack::MemberTarget;
use log::debug;
use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Constructors with at most this many parameters keep their arguments
/// inline in the frame.
pub const INLINE_ARITY: usize = 4;

/// Buffers kept per kind by [`ArrayPool`].
const MAX_RETAINED: usize = 16;

/// A member seen before its object existed, recorded by position.
pub struct FoundProperty {
    pub(crate) target: MemberTarget,
    pub(crate) name: String,
    pub(crate) checkpoint: Checkpoint,
}

impl fmt::Debug for FoundProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FoundProperty")
            .field("name", &self.name)
            .field("position", &self.checkpoint.position())
            .finish()
    }
}

/// A member value converted before its object existed.
pub struct BufferedProperty {
    pub(crate) target: MemberTarget,
    pub(crate) value: Boxed,
}

impl fmt::Debug for BufferedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedProperty")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// A source of reusable scratch vectors.
///
/// `rent_*` must return empty vectors; `return_*` receives vectors that were
/// already cleared.
pub trait BufferPool {
    fn rent_slots(&self, capacity: usize) -> Vec<Option<Boxed>>;
    fn return_slots(&self, slots: Vec<Option<Boxed>>);
    fn rent_found(&self) -> Vec<FoundProperty>;
    fn return_found(&self, found: Vec<FoundProperty>);
    fn rent_buffered(&self) -> Vec<BufferedProperty>;
    fn return_buffered(&self, buffered: Vec<BufferedProperty>);
}

/// Element types that can be rented from a [`BufferPool`].
pub(crate) trait Poolable: Sized {
    const KIND: &'static str;

    fn rent(pool: &dyn BufferPool, capacity: usize) -> Vec<Self>;
    fn give_back(pool: &dyn BufferPool, buffer: Vec<Self>);
}

impl Poolable for Option<Boxed> {
    const KIND: &'static str = "argument";

    fn rent(pool: &dyn BufferPool, capacity: usize) -> Vec<Self> {
        pool.rent_slots(capacity)
    }

    fn give_back(pool: &dyn BufferPool, buffer: Vec<Self>) {
        pool.return_slots(buffer);
    }
}

impl Poolable for FoundProperty {
    const KIND: &'static str = "found-property";

    fn rent(pool: &dyn BufferPool, _capacity: usize) -> Vec<Self> {
        pool.rent_found()
    }

    fn give_back(pool: &dyn BufferPool, buffer: Vec<Self>) {
        pool.return_found(buffer);
    }
}

impl Poolable for BufferedProperty {
    const KIND: &'static str = "buffered-property";

    fn rent(pool: &dyn BufferPool, _capacity: usize) -> Vec<Self> {
        pool.rent_buffered()
    }

    fn give_back(pool: &dyn BufferPool, buffer: Vec<Self>) {
        pool.return_buffered(buffer);
    }
}

/// A rented vector, cleared and returned to its pool on drop.
pub(crate) struct Rented<T: Poolable> {
    buffer: Vec<T>,
    pool: Rc<dyn BufferPool>,
}

impl<T: Poolable> Rented<T> {
    pub fn new(pool: &Rc<dyn BufferPool>, capacity: usize) -> Self {
        let mut buffer = T::rent(&**pool, capacity);
        buffer.clear();
        debug!("rented {} buffer (capacity {})", T::KIND, buffer.capacity());
        Rented {
            buffer,
            pool: pool.clone(),
        }
    }
}

impl<T: Poolable> Deref for Rented<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.buffer
    }
}

impl<T: Poolable> DerefMut for Rented<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.buffer
    }
}

impl<T: Poolable> Drop for Rented<T> {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        debug!("returned {} buffer", T::KIND);
        T::give_back(&*self.pool, buffer);
    }
}

/// Positional constructor arguments of one frame.
pub(crate) enum ArgumentSlots {
    Inline([Option<Boxed>; INLINE_ARITY], usize),
    Pooled(Rented<Option<Boxed>>),
}

impl ArgumentSlots {
    pub fn new(arity: usize, pool: &Rc<dyn BufferPool>) -> Self {
        if arity <= INLINE_ARITY {
            ArgumentSlots::Inline(Default::default(), arity)
        } else {
            let mut slots = Rented::new(pool, arity);
            slots.resize_with(arity, || None);
            ArgumentSlots::Pooled(slots)
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Option<Boxed>] {
        match self {
            ArgumentSlots::Inline(slots, arity) => &mut slots[..*arity],
            ArgumentSlots::Pooled(slots) => slots,
        }
    }

    pub fn set(&mut self, position: usize, value: Boxed) {
        if let Some(slot) = self.as_mut_slice().get_mut(position) {
            *slot = Some(value);
        }
    }
}

/// The default pool: a small per-thread cache of vectors.
#[derive(Default)]
pub struct ArrayPool {
    slots: RefCell<Vec<Vec<Option<Boxed>>>>,
    found: RefCell<Vec<Vec<FoundProperty>>>,
    buffered: RefCell<Vec<Vec<BufferedProperty>>>,
}

impl ArrayPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool shared by read stacks on this thread.
    #[must_use]
    pub fn shared() -> Rc<dyn BufferPool> {
        thread_local! {
            static POOL: Rc<ArrayPool> = Rc::new(ArrayPool::new());
        }
        POOL.with(|pool| pool.clone() as Rc<dyn BufferPool>)
    }

    /// Number of vectors currently cached.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.slots.borrow().len() + self.found.borrow().len() + self.buffered.borrow().len()
    }
}

impl fmt::Debug for ArrayPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayPool")
            .field("retained", &self.retained())
            .finish()
    }
}

fn take_cached<T>(cache: &RefCell<Vec<Vec<T>>>, capacity: usize) -> Vec<T> {
    cache
        .borrow_mut()
        .pop()
        .unwrap_or_else(|| Vec::with_capacity(capacity))
}

fn cache<T>(cache: &RefCell<Vec<Vec<T>>>, mut buffer: Vec<T>) {
    buffer.clear();
    let mut cached = cache.borrow_mut();
    if cached.len() < MAX_RETAINED {
        cached.push(buffer);
    }
}

impl BufferPool for ArrayPool {
    fn rent_slots(&self, capacity: usize) -> Vec<Option<Boxed>> {
        let mut slots = take_cached(&self.slots, capacity);
        slots.reserve(capacity);
        slots
    }

    fn return_slots(&self, slots: Vec<Option<Boxed>>) {
        cache(&self.slots, slots);
    }

    fn rent_found(&self) -> Vec<FoundProperty> {
        take_cached(&self.found, 8)
    }

    fn return_found(&self, found: Vec<FoundProperty>) {
        cache(&self.found, found);
    }

    fn rent_buffered(&self) -> Vec<BufferedProperty> {
        take_cached(&self.buffered, 8)
    }

    fn return_buffered(&self, buffered: Vec<BufferedProperty>) {
        cache(&self.buffered, buffered);
    }
}
