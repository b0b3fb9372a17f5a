//! Entry points of the conversion engine and the dispatch between
//! descriptors, stacks and converters.
//!
//! [`try_read`] and [`try_write`] are re-entrant: `Ok(None)` / `Ok(false)`
//! means the call ran out of input (or output space) and must be repeated
//! with the same stack once the caller has fed more bytes (or drained the
//! writer). Errors are terminal; the stack is reset and the error is
//! annotated with the path of the failing element.
//!
//! ```rust
//! use frameconv::reader::TokenReader;
//! use frameconv::{try_read, ConvertOptions, ReadStack};
//!
//! let options = ConvertOptions::default();
//! let descriptor = options.registry.get::<Vec<u32>>().unwrap();
//! let mut stack = ReadStack::new(options);
//!
//! let mut reader = TokenReader::new(b"[1, 2", false);
//! assert!(try_read(&descriptor, &mut reader, &mut stack).unwrap().is_none());
//! let consumed = reader.bytes_consumed();
//! let state = reader.into_state();
//!
//! let rest = [&b"[1, 2"[consumed..], b", 3]"].concat();
//! let mut reader = TokenReader::with_state(&rest, true, state);
//! let value = try_read(&descriptor, &mut reader, &mut stack).unwrap().unwrap();
//! assert_eq!(*value.downcast::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
//! ```

use crate::converter::{Converter, ReadOutcome, ValueContext};
use crate::descriptor::{Boxed, TypeDescriptor};
use crate::metadata;
use crate::options::NumberHandling;
use crate::reader::{TokenReader, TokenType};
use crate::stack::{ObjectState, PathSegment, ReadStack, WriteStack};
use crate::writer::TokenWriter;
use crate::{Error, Result};
use log::{debug, trace};
use std::any::Any;
use std::sync::Arc;

/// Reads one value of `descriptor`.
///
/// The first call decides whether the conversion may suspend: it may if the
/// reader's buffer is not the final block. Returns `Ok(None)` when more
/// input is needed; the unconsumed tail of the buffer
/// (`buffer[reader.bytes_consumed()..]`) must be passed again, followed by
/// new data, in a reader built from [`TokenReader::into_state`].
///
/// # Errors
///
/// Returns an error annotated with the element path, line and byte offset
/// if the input is malformed or cannot be bound to `descriptor`.
pub fn try_read(
    descriptor: &Arc<TypeDescriptor>,
    reader: &mut TokenReader<'_>,
    stack: &mut ReadStack,
) -> Result<Option<Boxed>> {
    if stack.supports_continuation.is_none() {
        stack.supports_continuation = Some(!reader.is_final_block());
    }
    stack.depth = 0;
    match read_root(descriptor, reader, stack) {
        Ok(Some(value)) => {
            stack.reset();
            Ok(Some(value))
        }
        Ok(None) => {
            stack.depth = 0;
            debug!(
                "read of {} suspended with {} frame(s) at byte {}",
                descriptor.name(),
                stack.frames.len(),
                reader.offset()
            );
            Ok(None)
        }
        Err(err) => {
            let path = stack.path();
            stack.reset();
            Err(err.annotate(path, Some(reader.line()), Some(reader.offset())))
        }
    }
}

fn read_root(
    descriptor: &Arc<TypeDescriptor>,
    reader: &mut TokenReader<'_>,
    stack: &mut ReadStack,
) -> Result<Option<Boxed>> {
    if !stack.root_token_read {
        if !begin_value(reader, descriptor)? {
            return Ok(None);
        }
        stack.root_token_read = true;
    }
    read_value(descriptor, reader, stack, None)
}

/// Reads the first token of a value of `descriptor`.
///
/// Leaf converters that read a whole subtree get it fully buffered or not
/// at all.
pub(crate) fn begin_value(reader: &mut TokenReader<'_>, descriptor: &TypeDescriptor) -> Result<bool> {
    if !descriptor.requires_read_ahead() {
        return reader.read();
    }
    let checkpoint = reader.checkpoint();
    if !reader.read()? {
        return Ok(false);
    }
    if !reader.has_complete_value()? {
        reader.restore(checkpoint);
        return Ok(false);
    }
    Ok(true)
}

/// Reads a token the fast path knows is buffered.
pub(crate) fn next_token(reader: &mut TokenReader<'_>) -> Result<TokenType> {
    if reader.read()? {
        Ok(reader.token_type())
    } else {
        Err(Error::unexpected_end("more input was required"))
    }
}

/// Skips the value of the current property on the fast path.
pub(crate) fn skip_value(reader: &mut TokenReader<'_>) -> Result<()> {
    if reader.try_skip()? {
        Ok(())
    } else {
        Err(Error::unexpected_end("more input was required"))
    }
}

/// Reads a value the fast path knows is buffered.
pub(crate) fn read_complete(
    descriptor: &Arc<TypeDescriptor>,
    reader: &mut TokenReader<'_>,
    stack: &mut ReadStack,
    number_handling: Option<NumberHandling>,
) -> Result<Boxed> {
    read_value(descriptor, reader, stack, number_handling)?
        .ok_or_else(|| Error::unexpected_end("more input was required"))
}

/// Reads the value starting at the current token, or resumes the suspended
/// frame for it.
pub(crate) fn read_value(
    descriptor: &Arc<TypeDescriptor>,
    reader: &mut TokenReader<'_>,
    stack: &mut ReadStack,
    number_handling: Option<NumberHandling>,
) -> Result<Option<Boxed>> {
    if !stack.is_resuming() && reader.token_type() == TokenType::Null {
        if let Some(nullable) = descriptor.nullable {
            return Ok(Some((nullable.none)()));
        }
        if !descriptor.accepts_null() {
            return Err(null_error(descriptor, stack));
        }
    }

    let value = match &descriptor.converter {
        Converter::Value(converter) => {
            let ctx = ValueContext {
                number_handling: number_handling.unwrap_or(stack.options.number_handling),
                max_depth: stack.options.max_depth,
            };
            converter.read(reader, &ctx)?
        }
        converter => {
            stack.push(descriptor, number_handling)?;
            trace!("read {} with {:?} converter", descriptor.name(), converter);
            let outcome = match converter {
                Converter::Object(object) => object.read(descriptor, reader, stack)?,
                Converter::Enumerable(collection) => collection.read(descriptor, reader, stack)?,
                Converter::Dictionary(dictionary) => dictionary.read(descriptor, reader, stack)?,
                Converter::Value(_) => {
                    return Err(Error::configuration("leaf converter dispatched as composite"))
                }
            };
            let Some(outcome) = outcome else {
                return Ok(None);
            };
            let frame = stack.pop()?;
            match (outcome, descriptor.shared) {
                (ReadOutcome::Value(value), Some(shared)) => {
                    let (value, target) = (shared.wrap)(value)?;
                    if let Some(id) = frame.reference_id {
                        stack.resolver.add(id, target)?;
                    }
                    value
                }
                (ReadOutcome::Value(value), None) => value,
                (ReadOutcome::Reference(target), Some(shared)) => (shared.from_shared)(target)?,
                (ReadOutcome::Reference(_), None) => {
                    return Err(not_referenceable(descriptor));
                }
            }
        }
    };

    match descriptor.nullable {
        Some(nullable) => Ok(Some((nullable.wrap)(value)?)),
        None => Ok(Some(value)),
    }
}

fn null_error(descriptor: &TypeDescriptor, stack: &ReadStack) -> Error {
    match stack.parent() {
        Some(frame) => {
            let member = match &frame.segment {
                Some(PathSegment::Property(name)) => match &frame.descriptor.converter {
                    Converter::Object(object) => object.declared_name(name).to_string(),
                    _ => name.clone(),
                },
                Some(PathSegment::Index(index)) => format!("[{}]", index),
                None => "$".to_string(),
            };
            Error::null_for_non_nullable(&member, frame.descriptor.name())
        }
        None => Error::null_for_non_nullable("$", descriptor.name()),
    }
}

fn not_referenceable(descriptor: &TypeDescriptor) -> Error {
    Error::unexpected_metadata(
        metadata::REF,
        &format!("type '{}' does not preserve references", descriptor.name()),
    )
}

/// Resolves the `$ref` read into the current frame.
pub(crate) fn resolve_reference(
    descriptor: &TypeDescriptor,
    stack: &ReadStack,
    id: &str,
) -> Result<ReadOutcome> {
    if !descriptor.is_shared() {
        return Err(not_referenceable(descriptor));
    }
    Ok(ReadOutcome::Reference(stack.resolver.resolve(id)?))
}

/// Progress of the base frame handed to a derived type's frame.
pub(crate) struct ReadSeed {
    pub pending_name: Option<String>,
    pub object_ended: bool,
}

/// Reads the members of a `$type`-selected derived object whose metadata
/// was already consumed by the base frame.
pub(crate) fn read_derived(
    descriptor: &Arc<TypeDescriptor>,
    reader: &mut TokenReader<'_>,
    stack: &mut ReadStack,
    seed: ReadSeed,
) -> Result<Option<Boxed>> {
    let Converter::Object(object) = &descriptor.converter else {
        return Err(Error::configuration(format!(
            "derived type '{}' must be an object type",
            descriptor.name()
        )));
    };
    let fresh = !stack.is_resuming();
    stack.push(descriptor, None)?;
    if fresh {
        let frame = stack.current();
        frame.object_state = ObjectState::CreatedObject;
        frame.pending_name = seed.pending_name;
        frame.object_ended = seed.object_ended;
    }
    match object.read(descriptor, reader, stack)? {
        None => Ok(None),
        Some(ReadOutcome::Value(value)) => {
            stack.pop()?;
            Ok(Some(value))
        }
        Some(ReadOutcome::Reference(_)) => Err(not_referenceable(descriptor)),
    }
}

/// Writes one value of `descriptor`.
///
/// With a [`WriteStack::resumable`] stack the call returns `Ok(false)`
/// whenever the writer asks for a flush or an asynchronous element is not
/// ready; drain the writer and call again with the same value and stack.
///
/// # Errors
///
/// Returns an error annotated with the element path if the value cannot be
/// written, or [`Error::Cancelled`] once the stack's cancellation token
/// fires.
pub fn try_write<'v>(
    descriptor: &Arc<TypeDescriptor>,
    value: &'v dyn Any,
    writer: &mut TokenWriter,
    stack: &mut WriteStack<'v>,
) -> Result<bool> {
    stack.pending_async = false;
    if stack
        .cancellation
        .as_ref()
        .is_some_and(|token| token.is_cancelled())
    {
        stack.reset();
        return Err(Error::Cancelled);
    }
    if !stack.started {
        if (*value).type_id() != TypeDescriptor::type_id(descriptor) {
            return Err(Error::type_mismatch(descriptor.name(), "a value of another type"));
        }
        stack.started = true;
    }
    stack.depth = 0;
    match write_value(descriptor, value, writer, stack, None) {
        Ok(true) => {
            stack.reset();
            Ok(true)
        }
        Ok(false) => {
            stack.depth = 0;
            debug!(
                "write of {} suspended with {} frame(s), {} byte(s) pending",
                descriptor.name(),
                stack.frames.len(),
                writer.pending_bytes()
            );
            Ok(false)
        }
        Err(err) => {
            let path = stack.path();
            stack.reset();
            Err(err.annotate(path, None, None))
        }
    }
}

/// Writes `value`, or resumes the suspended frame for it.
pub(crate) fn write_value<'v>(
    descriptor: &Arc<TypeDescriptor>,
    value: &'v dyn Any,
    writer: &mut TokenWriter,
    stack: &mut WriteStack<'v>,
    number_handling: Option<NumberHandling>,
) -> Result<bool> {
    let resuming = stack.is_resuming();
    let mut value = value;
    if let Some(nullable) = descriptor.nullable {
        match (nullable.unwrap)(value)? {
            Some(inner) => value = inner,
            None => {
                writer.write_null()?;
                return Ok(true);
            }
        }
    }
    let mut reference_id = None;
    if let Some(shared) = descriptor.shared {
        let (address, inner) = (shared.unwrap)(value)?;
        value = inner;
        if !resuming && stack.options.preserves_references() {
            let (id, written) = stack.references.get_or_register(address);
            if written {
                metadata::write_ref(writer, &id)?;
                return Ok(true);
            }
            reference_id = Some(id);
        }
    }

    if let Converter::Value(converter) = &descriptor.converter {
        let ctx = ValueContext {
            number_handling: number_handling.unwrap_or(stack.options.number_handling),
            max_depth: stack.options.max_depth,
        };
        converter.write(value, writer, &ctx)?;
        return Ok(true);
    }

    stack.push(descriptor, number_handling)?;
    if reference_id.is_some() {
        stack.current().reference_id = reference_id;
    }
    let done = dispatch_write(descriptor, value, writer, stack)?;
    if done {
        stack.pop()?;
    }
    Ok(done)
}

fn dispatch_write<'v>(
    descriptor: &Arc<TypeDescriptor>,
    value: &'v dyn Any,
    writer: &mut TokenWriter,
    stack: &mut WriteStack<'v>,
) -> Result<bool> {
    trace!("write {} with {:?} converter", descriptor.name(), descriptor.converter);
    match &descriptor.converter {
        Converter::Object(object) => object.write(descriptor, value, writer, stack),
        Converter::Enumerable(collection) => collection.write(descriptor, value, writer, stack),
        Converter::Dictionary(dictionary) => dictionary.write(descriptor, value, writer, stack),
        Converter::Value(_) => Err(Error::configuration("leaf converter dispatched as composite")),
    }
}

/// Envelope of the base frame handed to a derived type's frame.
pub(crate) struct WriteSeed {
    pub discriminator: String,
    pub reference_id: Option<String>,
}

/// Writes a derived object in place of its base, prefixed with `$type`.
pub(crate) fn write_derived<'v>(
    descriptor: &Arc<TypeDescriptor>,
    value: &'v dyn Any,
    writer: &mut TokenWriter,
    stack: &mut WriteStack<'v>,
    seed: WriteSeed,
) -> Result<bool> {
    let Converter::Object(object) = &descriptor.converter else {
        return Err(Error::configuration(format!(
            "derived type '{}' must be an object type",
            descriptor.name()
        )));
    };
    let fresh = !stack.is_resuming();
    stack.push(descriptor, None)?;
    if fresh {
        let frame = stack.current();
        frame.discriminator = Some(seed.discriminator);
        frame.reference_id = seed.reference_id;
    }
    let done = object.write_members(descriptor, value, writer, stack)?;
    if done {
        stack.pop()?;
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConvertOptions, Registry};

    #[test]
    fn test_leaf_root_waits_for_number_end() {
        let registry = Arc::new(Registry::new());
        let options = ConvertOptions::new().with_registry(registry.clone());
        let descriptor = registry.get::<u64>().unwrap();
        let mut stack = ReadStack::new(options);

        let mut reader = TokenReader::new(b"12", false);
        assert!(try_read(&descriptor, &mut reader, &mut stack).unwrap().is_none());
        let state = reader.into_state();
        let mut reader = TokenReader::with_state(b"123", true, state);
        let value = try_read(&descriptor, &mut reader, &mut stack).unwrap().unwrap();
        assert_eq!(*value.downcast::<u64>().unwrap(), 123);
    }

    #[test]
    fn test_null_for_leaf_names_root() {
        let registry = Registry::new();
        let descriptor = registry.get::<i32>().unwrap();
        let mut stack = ReadStack::new(ConvertOptions::default());
        let mut reader = TokenReader::new(b"null", true);
        let err = try_read(&descriptor, &mut reader, &mut stack).unwrap_err();
        assert!(matches!(err.inner(), Error::NullForNonNullable { member, .. } if member == "$"));
        assert_eq!(stack.frame_count(), 0);
    }

    #[test]
    fn test_write_rejects_other_type() {
        let registry = Registry::new();
        let descriptor = registry.get::<i32>().unwrap();
        let value = 1u8;
        let mut stack = WriteStack::new(ConvertOptions::default());
        let mut writer = TokenWriter::new(64);
        assert!(try_write(&descriptor, &value, &mut writer, &mut stack).is_err());
    }
}
