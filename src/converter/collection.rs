//! Collection converter: arrays of one element type.
//!
//! Concrete collections plug in through [`CollectionShape`]; the converter
//! erases the shape to plain function pointers so one resumable loop serves
//! every backend. A preserved collection is wrapped as
//! `{"$id": "1", "$values": [...]}`.

use super::async_seq::{write_async, AsyncSource};
use super::{AsyncSequence, ReadOutcome};
use crate::descriptor::{downcast_mut, downcast_ref, short_type_name, unbox, Boxed, Describe, TypeDescriptor, TypeRef};
use crate::engine::{begin_value, next_token, read_complete, read_value, resolve_reference, write_value};
use crate::metadata::{self, MetadataFlags};
use crate::reader::{TokenReader, TokenType};
use crate::stack::{ObjectState, PathSegment, PropertyState, ReadStack, WriteFrame, WriteStack};
use crate::writer::TokenWriter;
use crate::{Error, Result};
use log::trace;
use std::any::Any;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A collection type the engine can fill element by element.
///
/// `Builder` is the in-progress collection. Types that cannot grow in place
/// build into a temporary buffer and convert it in `finish`.
///
/// ```rust
/// use frameconv::{CollectionShape, Describe, Registry, Result, TypeDescriptor};
///
/// #[derive(Debug, PartialEq)]
/// struct Stack(Vec<u8>);
///
/// impl CollectionShape for Stack {
///     type Element = u8;
///     type Builder = Vec<u8>;
///
///     fn create(capacity: usize) -> Vec<u8> {
///         Vec::with_capacity(capacity)
///     }
///
///     fn add(builder: &mut Vec<u8>, element: u8) -> Result<()> {
///         builder.insert(0, element);
///         Ok(())
///     }
///
///     fn finish(builder: Vec<u8>) -> Result<Self> {
///         Ok(Stack(builder))
///     }
///
///     fn elements(&self) -> Box<dyn Iterator<Item = &u8> + '_> {
///         Box::new(self.0.iter())
///     }
/// }
///
/// impl Describe for Stack {
///     fn describe(_: &Registry) -> Result<TypeDescriptor> {
///         Ok(TypeDescriptor::enumerable::<Stack>())
///     }
/// }
///
/// let stack: Stack = frameconv::from_str("[1, 2, 3]").unwrap();
/// assert_eq!(stack, Stack(vec![3, 2, 1]));
/// ```
pub trait CollectionShape: Sized + 'static {
    type Element: 'static;
    type Builder: 'static;

    /// Set when `finish` converts a temporary buffer into the final type.
    const CONVERTIBLE: bool = false;

    fn create(capacity: usize) -> Self::Builder;

    fn add(builder: &mut Self::Builder, element: Self::Element) -> Result<()>;

    fn finish(builder: Self::Builder) -> Result<Self>;

    /// Read-only builders are rejected before the first element is added.
    fn is_read_only(_builder: &Self::Builder) -> bool {
        false
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &Self::Element> + '_>;
}

type ElementIter<'a> = Box<dyn Iterator<Item = &'a dyn Any> + 'a>;

/// Converter for [`CollectionShape`] types and [`AsyncSequence`].
pub struct CollectionConverter {
    type_name: String,
    element: TypeRef,
    create: fn(usize) -> Boxed,
    add: fn(&mut dyn Any, Boxed) -> Result<()>,
    finish: fn(Boxed) -> Result<Boxed>,
    is_read_only: fn(&dyn Any) -> bool,
    elements: for<'a> fn(&'a dyn Any) -> Result<ElementIter<'a>>,
    convertible: bool,
    async_source: Option<AsyncSource>,
}

impl fmt::Debug for CollectionConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConverter")
            .field("type_name", &self.type_name)
            .field("element", &self.element)
            .field("async", &self.async_source.is_some())
            .finish()
    }
}

fn create_erased<C: CollectionShape>(capacity: usize) -> Boxed {
    Box::new(C::create(capacity))
}

fn add_erased<C: CollectionShape>(builder: &mut dyn Any, element: Boxed) -> Result<()> {
    C::add(downcast_mut::<C::Builder>(builder)?, unbox::<C::Element>(element)?)
}

fn finish_erased<C: CollectionShape>(builder: Boxed) -> Result<Boxed> {
    Ok(Box::new(C::finish(unbox::<C::Builder>(builder)?)?))
}

fn read_only_erased<C: CollectionShape>(builder: &dyn Any) -> bool {
    builder.downcast_ref::<C::Builder>().is_some_and(C::is_read_only)
}

fn elements_erased<C: CollectionShape>(value: &dyn Any) -> Result<ElementIter<'_>> {
    let collection = downcast_ref::<C>(value)?;
    Ok(Box::new(collection.elements().map(|element| element as &dyn Any)))
}

fn create_buffer<T: 'static>(capacity: usize) -> Boxed {
    Box::new(Vec::<T>::with_capacity(capacity))
}

fn push_buffer<T: 'static>(builder: &mut dyn Any, element: Boxed) -> Result<()> {
    downcast_mut::<Vec<T>>(builder)?.push(unbox::<T>(element)?);
    Ok(())
}

fn finish_sequence<T: 'static>(builder: Boxed) -> Result<Boxed> {
    let elements = unbox::<Vec<T>>(builder)?;
    Ok(Box::new(elements.into_iter().collect::<AsyncSequence<T>>()))
}

fn no_elements(_: &dyn Any) -> Result<ElementIter<'_>> {
    Err(Error::configuration(
        "asynchronous sequences are written from their stream",
    ))
}

impl CollectionConverter {
    #[must_use]
    pub fn of<C>() -> Self
    where
        C: CollectionShape,
        C::Element: Describe,
    {
        CollectionConverter {
            type_name: short_type_name::<C>(),
            element: TypeRef::of::<C::Element>(),
            create: create_erased::<C>,
            add: add_erased::<C>,
            finish: finish_erased::<C>,
            is_read_only: read_only_erased::<C>,
            elements: elements_erased::<C>,
            convertible: C::CONVERTIBLE,
            async_source: None,
        }
    }

    /// Reads an array into a buffered [`AsyncSequence`] and writes one from
    /// its stream.
    #[must_use]
    pub fn async_sequence<T: Describe>() -> Self {
        CollectionConverter {
            type_name: short_type_name::<AsyncSequence<T>>(),
            element: TypeRef::of::<T>(),
            create: create_buffer::<T>,
            add: push_buffer::<T>,
            finish: finish_sequence::<T>,
            is_read_only: |_| false,
            elements: no_elements,
            convertible: true,
            async_source: Some(AsyncSource::of::<T>()),
        }
    }

    fn create_checked(&self) -> Result<Boxed> {
        let builder = (self.create)(0);
        if (self.is_read_only)(&*builder) {
            return Err(Error::ReadOnlyCollection(self.type_name.clone()));
        }
        Ok(builder)
    }

    fn finish(&self, builder: Boxed) -> Result<Boxed> {
        if self.convertible {
            trace!("converting buffer into {}", self.type_name);
        }
        (self.finish)(builder)
    }

    pub(crate) fn read(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        let element = self.element.get(&stack.options.registry)?;
        if stack.current().object_state == ObjectState::None && stack.use_fast_path(descriptor) {
            return self.read_fast(&element, reader, stack);
        }
        let allowed = metadata::allowed(descriptor, &stack.options);

        if stack.current().object_state == ObjectState::None {
            let frame = stack.current();
            frame.object_state = match reader.token_type() {
                TokenType::StartArray => ObjectState::CreatedObject,
                TokenType::StartObject if !allowed.is_empty() => ObjectState::ReadMetadata,
                other => return Err(Error::unexpected_token("'['", other)),
            };
        }

        if stack.current().object_state == ObjectState::ReadMetadata {
            let frame = stack.current();
            if !metadata::read_metadata(reader, frame, allowed)? {
                return Ok(None);
            }
            if let Some(id) = frame.ref_id.clone() {
                return resolve_reference(descriptor, stack, &id).map(Some);
            }
            if !frame.metadata.contains(MetadataFlags::VALUES) {
                return Err(Error::unexpected_metadata(
                    metadata::VALUES,
                    "a preserved collection must carry its elements in '$values'",
                ));
            }
            frame.wrapped = true;
            frame.object_state = ObjectState::CreatedObject;
        }

        if stack.current().object_state == ObjectState::CreatedObject {
            let builder = self.create_checked()?;
            let frame = stack.current();
            frame.return_value = Some(builder);
            frame.object_state = ObjectState::ReadingMembers;
        }

        while stack.current().object_state == ObjectState::ReadingMembers {
            let frame = stack.current();
            if frame.property_state == PropertyState::None {
                if !begin_value(reader, &element)? {
                    return Ok(None);
                }
                if reader.token_type() == TokenType::EndArray {
                    frame.object_state = ObjectState::EndToken;
                    break;
                }
                frame.segment = Some(PathSegment::Index(frame.index));
                frame.property_state = PropertyState::ReadValue;
            }
            let handling = frame.number_handling;
            let Some(value) = read_value(&element, reader, stack, handling)? else {
                return Ok(None);
            };
            let frame = stack.current();
            let builder = frame
                .return_value
                .as_deref_mut()
                .ok_or_else(|| Error::custom("collection frame lost its builder"))?;
            (self.add)(builder, value)?;
            frame.index += 1;
            frame.segment = None;
            frame.property_state = PropertyState::None;
        }

        let frame = stack.current();
        if frame.wrapped {
            frame.object_state = ObjectState::EndTokenValidation;
            if !reader.read()? {
                return Ok(None);
            }
            if reader.token_type() != TokenType::EndObject {
                return Err(Error::unexpected_metadata(
                    metadata::VALUES,
                    "no properties may follow the values of a preserved collection",
                ));
            }
            frame.wrapped = false;
        }
        let builder = frame
            .return_value
            .take()
            .ok_or_else(|| Error::custom("collection frame lost its builder"))?;
        self.finish(builder).map(|value| Some(ReadOutcome::Value(value)))
    }

    fn read_fast(
        &self,
        element: &Arc<TypeDescriptor>,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        if reader.token_type() != TokenType::StartArray {
            return Err(Error::unexpected_token("'['", reader.token_type()));
        }
        let handling = stack.current().number_handling;
        let mut builder = self.create_checked()?;
        let mut index = 0;
        while next_token(reader)? != TokenType::EndArray {
            stack.current().segment = Some(PathSegment::Index(index));
            let value = read_complete(element, reader, stack, handling)?;
            (self.add)(&mut *builder, value)?;
            index += 1;
        }
        stack.current().segment = None;
        self.finish(builder).map(|value| Some(ReadOutcome::Value(value)))
    }

    pub(crate) fn write<'v>(
        &self,
        _descriptor: &Arc<TypeDescriptor>,
        value: &'v dyn Any,
        writer: &mut TokenWriter,
        stack: &mut WriteStack<'v>,
    ) -> Result<bool> {
        let element = self.element.get(&stack.options.registry)?;
        if let Some(source) = &self.async_source {
            return write_async(&element, source, value, writer, stack);
        }

        if stack.current().object_state == ObjectState::None {
            let elements = (self.elements)(value)?;
            let frame = stack.current();
            frame.elements = Some(elements);
            start_array(writer, frame)?;
            frame.object_state = ObjectState::ReadingMembers;
        }

        loop {
            let frame = stack.current();
            let item = match frame.current {
                Some(item) => item,
                None => match frame.elements.as_mut().and_then(|elements| elements.next()) {
                    Some(item) => {
                        frame.current = Some(item);
                        frame.segment = Some(PathSegment::Index(frame.index));
                        item
                    }
                    None => break,
                },
            };
            let handling = frame.number_handling;
            if !write_value(&element, item, writer, stack, handling)? {
                return Ok(false);
            }
            let frame = stack.current();
            frame.current = None;
            frame.segment = None;
            frame.index += 1;
            if stack.should_suspend(writer) {
                return Ok(false);
            }
        }

        end_array(writer, stack.current())?;
        Ok(true)
    }
}

/// Writes `[`, preceded by the `$id`/`$values` envelope of a preserved
/// collection.
pub(super) fn start_array(writer: &mut TokenWriter, frame: &mut WriteFrame<'_>) -> Result<()> {
    if frame.array_started {
        return Ok(());
    }
    if let Some(id) = &frame.reference_id {
        writer.write_start_object()?;
        metadata::write_id(writer, id)?;
        writer.write_property_name(metadata::VALUES)?;
    }
    writer.write_start_array()?;
    frame.array_started = true;
    Ok(())
}

pub(super) fn end_array(writer: &mut TokenWriter, frame: &mut WriteFrame<'_>) -> Result<()> {
    writer.write_end_array()?;
    if frame.reference_id.is_some() {
        writer.write_end_object()?;
    }
    Ok(())
}

impl<T: 'static> CollectionShape for Vec<T> {
    type Element = T;
    type Builder = Vec<T>;

    fn create(capacity: usize) -> Vec<T> {
        Vec::with_capacity(capacity)
    }

    fn add(builder: &mut Vec<T>, element: T) -> Result<()> {
        builder.push(element);
        Ok(())
    }

    fn finish(builder: Vec<T>) -> Result<Self> {
        Ok(builder)
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.iter())
    }
}

impl<T: 'static> CollectionShape for VecDeque<T> {
    type Element = T;
    type Builder = VecDeque<T>;

    fn create(capacity: usize) -> VecDeque<T> {
        VecDeque::with_capacity(capacity)
    }

    fn add(builder: &mut VecDeque<T>, element: T) -> Result<()> {
        builder.push_back(element);
        Ok(())
    }

    fn finish(builder: VecDeque<T>) -> Result<Self> {
        Ok(builder)
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.iter())
    }
}

impl<T: 'static> CollectionShape for Box<[T]> {
    type Element = T;
    type Builder = Vec<T>;

    const CONVERTIBLE: bool = true;

    fn create(capacity: usize) -> Vec<T> {
        Vec::with_capacity(capacity)
    }

    fn add(builder: &mut Vec<T>, element: T) -> Result<()> {
        builder.push(element);
        Ok(())
    }

    fn finish(builder: Vec<T>) -> Result<Self> {
        Ok(builder.into_boxed_slice())
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.iter())
    }
}

impl<T: Eq + Hash + 'static> CollectionShape for HashSet<T> {
    type Element = T;
    type Builder = HashSet<T>;

    fn create(capacity: usize) -> HashSet<T> {
        HashSet::with_capacity(capacity)
    }

    fn add(builder: &mut HashSet<T>, element: T) -> Result<()> {
        builder.insert(element);
        Ok(())
    }

    fn finish(builder: HashSet<T>) -> Result<Self> {
        Ok(builder)
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.iter())
    }
}

impl<T: Ord + 'static> CollectionShape for BTreeSet<T> {
    type Element = T;
    type Builder = BTreeSet<T>;

    fn create(_capacity: usize) -> BTreeSet<T> {
        BTreeSet::new()
    }

    fn add(builder: &mut BTreeSet<T>, element: T) -> Result<()> {
        builder.insert(element);
        Ok(())
    }

    fn finish(builder: BTreeSet<T>) -> Result<Self> {
        Ok(builder)
    }

    fn elements(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.iter())
    }
}
