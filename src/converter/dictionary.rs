//! Dictionary converter: JSON objects whose keys are converted values.
//!
//! Keys go through the key type's leaf converter
//! ([`ValueConverter::read_property_name`] and
//! [`ValueConverter::write_property_name`]); `String` keys are used as-is.
//! A repeated key replaces the earlier entry.

use super::{Converter, ReadOutcome, ValueContext, ValueConverter};
use crate::descriptor::{
    downcast_mut, downcast_ref, short_type_name, unbox, Boxed, Describe, Registry, TypeDescriptor,
    TypeRef,
};
use crate::engine::{begin_value, next_token, read_complete, read_value, resolve_reference, write_value};
use crate::metadata;
use crate::reader::{TokenReader, TokenType};
use crate::stack::{ObjectState, PathSegment, PropertyState, ReadStack, WriteStack};
use crate::writer::TokenWriter;
use crate::{Error, Result};
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A map type the engine can fill entry by entry.
pub trait DictionaryShape: Sized + 'static {
    type Key: 'static;
    type Value: 'static;
    type Builder: 'static;

    fn create(capacity: usize) -> Self::Builder;

    /// Adds an entry; an existing key is replaced.
    fn insert(builder: &mut Self::Builder, key: Self::Key, value: Self::Value) -> Result<()>;

    fn finish(builder: Self::Builder) -> Result<Self>;

    fn is_read_only(_builder: &Self::Builder) -> bool {
        false
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&Self::Key, &Self::Value)> + '_>;
}

type EntryIter<'a> = Box<dyn Iterator<Item = (&'a dyn Any, &'a dyn Any)> + 'a>;

/// Converter for [`DictionaryShape`] types.
pub struct DictionaryConverter {
    type_name: String,
    key: TypeRef,
    value: TypeRef,
    string_keys: bool,
    create: fn(usize) -> Boxed,
    insert: fn(&mut dyn Any, Boxed, Boxed) -> Result<()>,
    finish: fn(Boxed) -> Result<Boxed>,
    is_read_only: fn(&dyn Any) -> bool,
    entries: for<'a> fn(&'a dyn Any) -> Result<EntryIter<'a>>,
}

impl fmt::Debug for DictionaryConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionaryConverter")
            .field("type_name", &self.type_name)
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

fn create_erased<D: DictionaryShape>(capacity: usize) -> Boxed {
    Box::new(D::create(capacity))
}

fn insert_erased<D: DictionaryShape>(builder: &mut dyn Any, key: Boxed, value: Boxed) -> Result<()> {
    D::insert(
        downcast_mut::<D::Builder>(builder)?,
        unbox::<D::Key>(key)?,
        unbox::<D::Value>(value)?,
    )
}

fn finish_erased<D: DictionaryShape>(builder: Boxed) -> Result<Boxed> {
    Ok(Box::new(D::finish(unbox::<D::Builder>(builder)?)?))
}

fn read_only_erased<D: DictionaryShape>(builder: &dyn Any) -> bool {
    builder.downcast_ref::<D::Builder>().is_some_and(D::is_read_only)
}

fn entries_erased<D: DictionaryShape>(value: &dyn Any) -> Result<EntryIter<'_>> {
    let dictionary = downcast_ref::<D>(value)?;
    Ok(Box::new(
        dictionary
            .entries()
            .map(|(key, value)| (key as &dyn Any, value as &dyn Any)),
    ))
}

impl DictionaryConverter {
    #[must_use]
    pub fn of<D>() -> Self
    where
        D: DictionaryShape,
        D::Key: Describe,
        D::Value: Describe,
    {
        DictionaryConverter {
            type_name: short_type_name::<D>(),
            key: TypeRef::of::<D::Key>(),
            value: TypeRef::of::<D::Value>(),
            string_keys: TypeId::of::<D::Key>() == TypeId::of::<String>(),
            create: create_erased::<D>,
            insert: insert_erased::<D>,
            finish: finish_erased::<D>,
            is_read_only: read_only_erased::<D>,
            entries: entries_erased::<D>,
        }
    }

    fn key_converter(&self, registry: &Registry) -> Result<Arc<dyn ValueConverter>> {
        let key = self.key.get(registry)?;
        match key.converter() {
            Converter::Value(converter) => Ok(converter.clone()),
            _ => Err(Error::configuration(format!(
                "dictionary key type '{}' must be a leaf type",
                key.name()
            ))),
        }
    }

    fn parse_key(&self, name: &str, converter: &dyn ValueConverter, ctx: &ValueContext) -> Result<Boxed> {
        if self.string_keys {
            return Ok(Box::new(name.to_string()));
        }
        converter.read_property_name(name, ctx)
    }

    fn format_key(&self, key: &dyn Any, converter: &dyn ValueConverter, ctx: &ValueContext) -> Result<String> {
        if self.string_keys {
            return downcast_ref::<String>(key).cloned();
        }
        converter.write_property_name(key, ctx)
    }

    fn create_checked(&self) -> Result<Boxed> {
        let builder = (self.create)(0);
        if (self.is_read_only)(&*builder) {
            return Err(Error::ReadOnlyCollection(self.type_name.clone()));
        }
        Ok(builder)
    }

    pub(crate) fn read(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        let registry = stack.options.registry.clone();
        let key_converter = self.key_converter(&registry)?;
        let value_type = self.value.get(&registry)?;
        let ctx = ValueContext {
            number_handling: stack.options.number_handling,
            max_depth: stack.options.max_depth,
        };

        if stack.current().object_state == ObjectState::None && stack.use_fast_path(descriptor) {
            return self.read_fast(&*key_converter, &value_type, &ctx, reader, stack);
        }
        let allowed = metadata::allowed(descriptor, &stack.options);

        if stack.current().object_state == ObjectState::None {
            if reader.token_type() != TokenType::StartObject {
                return Err(Error::unexpected_token("'{'", reader.token_type()));
            }
            stack.current().object_state = if allowed.is_empty() {
                ObjectState::CreatedObject
            } else {
                ObjectState::ReadMetadata
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
                let name = match frame.pending_name.take() {
                    Some(name) => name,
                    None if frame.object_ended => {
                        frame.object_state = ObjectState::EndToken;
                        break;
                    }
                    None => {
                        if !reader.read()? {
                            return Ok(None);
                        }
                        match reader.token_type() {
                            TokenType::EndObject => {
                                frame.object_state = ObjectState::EndToken;
                                break;
                            }
                            TokenType::PropertyName => reader.get_str()?.into_owned(),
                            other => return Err(Error::unexpected_token("property name", other)),
                        }
                    }
                };
                if metadata::is_reserved(&name, allowed) {
                    return Err(Error::unexpected_metadata(
                        &name,
                        "metadata properties must precede all other properties",
                    ));
                }
                frame.dictionary_key = Some(self.parse_key(&name, &*key_converter, &ctx)?);
                frame.segment = Some(PathSegment::Property(name));
                frame.property_state = PropertyState::ReadName;
            }
            if frame.property_state == PropertyState::ReadName {
                if !begin_value(reader, &value_type)? {
                    return Ok(None);
                }
                frame.property_state = PropertyState::ReadValue;
            }
            let handling = frame.number_handling;
            let Some(value) = read_value(&value_type, reader, stack, handling)? else {
                return Ok(None);
            };
            let frame = stack.current();
            let key = frame
                .dictionary_key
                .take()
                .ok_or_else(|| Error::custom("dictionary frame lost its key"))?;
            let builder = frame
                .return_value
                .as_deref_mut()
                .ok_or_else(|| Error::custom("dictionary frame lost its builder"))?;
            (self.insert)(builder, key, value)?;
            frame.segment = None;
            frame.property_state = PropertyState::None;
        }

        let builder = stack
            .current()
            .return_value
            .take()
            .ok_or_else(|| Error::custom("dictionary frame lost its builder"))?;
        (self.finish)(builder).map(|value| Some(ReadOutcome::Value(value)))
    }

    fn read_fast(
        &self,
        key_converter: &dyn ValueConverter,
        value_type: &Arc<TypeDescriptor>,
        ctx: &ValueContext,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        if reader.token_type() != TokenType::StartObject {
            return Err(Error::unexpected_token("'{'", reader.token_type()));
        }
        let handling = stack.current().number_handling;
        let mut builder = self.create_checked()?;
        loop {
            match next_token(reader)? {
                TokenType::EndObject => break,
                TokenType::PropertyName => {}
                other => return Err(Error::unexpected_token("property name", other)),
            }
            let name = reader.get_str()?;
            let key = self.parse_key(&name, key_converter, ctx)?;
            stack.current().segment = Some(PathSegment::Property(name.into_owned()));
            next_token(reader)?;
            let value = read_complete(value_type, reader, stack, handling)?;
            (self.insert)(&mut *builder, key, value)?;
        }
        stack.current().segment = None;
        (self.finish)(builder).map(|value| Some(ReadOutcome::Value(value)))
    }

    pub(crate) fn write<'v>(
        &self,
        _descriptor: &Arc<TypeDescriptor>,
        value: &'v dyn Any,
        writer: &mut TokenWriter,
        stack: &mut WriteStack<'v>,
    ) -> Result<bool> {
        let registry = stack.options.registry.clone();
        let key_converter = self.key_converter(&registry)?;
        let value_type = self.value.get(&registry)?;
        let ctx = ValueContext {
            number_handling: stack.options.number_handling,
            max_depth: stack.options.max_depth,
        };

        if stack.current().object_state == ObjectState::None {
            let entries = (self.entries)(value)?;
            writer.write_start_object()?;
            let frame = stack.current();
            if let Some(id) = &frame.reference_id {
                metadata::write_id(writer, id)?;
            }
            frame.entries = Some(entries);
            frame.object_state = ObjectState::ReadingMembers;
        }

        loop {
            let frame = stack.current();
            let (key, entry) = match frame.current_entry {
                Some(current) => current,
                None => match frame.entries.as_mut().and_then(|entries| entries.next()) {
                    Some(current) => {
                        frame.current_entry = Some(current);
                        current
                    }
                    None => break,
                },
            };
            if frame.property_state == PropertyState::None {
                let name = self.format_key(key, &*key_converter, &ctx)?;
                writer.write_property_name(&name)?;
                frame.segment = Some(PathSegment::Property(name));
                frame.property_state = PropertyState::ReadValue;
            }
            let handling = frame.number_handling;
            if !write_value(&value_type, entry, writer, stack, handling)? {
                return Ok(false);
            }
            let frame = stack.current();
            frame.current_entry = None;
            frame.segment = None;
            frame.property_state = PropertyState::None;
            if stack.should_suspend(writer) {
                return Ok(false);
            }
        }

        writer.write_end_object()?;
        Ok(true)
    }
}

impl<K: Eq + Hash + 'static, V: 'static> DictionaryShape for HashMap<K, V> {
    type Key = K;
    type Value = V;
    type Builder = HashMap<K, V>;

    fn create(capacity: usize) -> HashMap<K, V> {
        HashMap::with_capacity(capacity)
    }

    fn insert(builder: &mut HashMap<K, V>, key: K, value: V) -> Result<()> {
        builder.insert(key, value);
        Ok(())
    }

    fn finish(builder: HashMap<K, V>) -> Result<Self> {
        Ok(builder)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(self.iter())
    }
}

impl<K: Ord + 'static, V: 'static> DictionaryShape for BTreeMap<K, V> {
    type Key = K;
    type Value = V;
    type Builder = BTreeMap<K, V>;

    fn create(_capacity: usize) -> BTreeMap<K, V> {
        BTreeMap::new()
    }

    fn insert(builder: &mut BTreeMap<K, V>, key: K, value: V) -> Result<()> {
        builder.insert(key, value);
        Ok(())
    }

    fn finish(builder: BTreeMap<K, V>) -> Result<Self> {
        Ok(builder)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(self.iter())
    }
}

impl<K: Eq + Hash + 'static, V: 'static> DictionaryShape for IndexMap<K, V> {
    type Key = K;
    type Value = V;
    type Builder = IndexMap<K, V>;

    fn create(capacity: usize) -> IndexMap<K, V> {
        IndexMap::with_capacity(capacity)
    }

    fn insert(builder: &mut IndexMap<K, V>, key: K, value: V) -> Result<()> {
        builder.insert(key, value);
        Ok(())
    }

    fn finish(builder: IndexMap<K, V>) -> Result<Self> {
        Ok(builder)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_last_wins() {
        let map: IndexMap<String, u8> = crate::from_str(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap();
        assert_eq!(map.get("a"), Some(&3));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_numeric_keys_round_trip() {
        let mut map = BTreeMap::new();
        map.insert(2u32, true);
        map.insert(10u32, false);
        let text = crate::to_string(&map).unwrap();
        assert_eq!(text, r#"{"2":true,"10":false}"#);
        let back: BTreeMap<u32, bool> = crate::from_str(&text).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_composite_key_is_rejected() {
        let err = crate::from_str::<HashMap<Vec<u8>, u8>>(r#"{"a": 1}"#).unwrap_err();
        assert!(matches!(err.inner(), Error::Configuration(_)));
    }
}
