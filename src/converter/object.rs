//! Object converter: named properties, extension data, `$type` dispatch.
//!
//! Reading has two loops. The fast loop runs when the whole document is
//! buffered and no metadata is honored; it reads member after member
//! without recording progress. The resumable loop records its phase in the
//! frame after every step so it can stop at any token boundary and pick up
//! again on the next call.
//!
//! Objects with a parameterized constructor are handled in
//! [`parameterized`](super::parameterized).

use super::ReadOutcome;
use crate::descriptor::{
    unbox, Arguments, Boxed, DerivedType, ExtensionData, Hooks, ParameterDescriptor, PropertyDescriptor,
    Registry, TypeDescriptor, TypeRef,
};
use crate::engine::{
    begin_value, next_token, read_complete, read_derived, read_value, resolve_reference,
    skip_value, write_derived, write_value, ReadSeed, WriteSeed,
};
use crate::metadata::{self, MetadataFlags};
use crate::options::{ConvertOptions, NumberHandling, UnmappedMemberHandling};
use crate::pool::{ArgumentSlots, BufferPool, BufferedProperty, Rented};
use crate::reader::{TokenReader, TokenType};
use crate::stack::{
    MemberTarget, ObjectState, PathSegment, PropertyState, ReadFrame, ReadStack, SeenMembers,
    WriteStack,
};
use crate::writer::TokenWriter;
use crate::{Error, Result, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) type Factory = Box<dyn Fn() -> Boxed + Send + Sync>;
pub(crate) type Constructor = Box<dyn Fn(&mut Arguments<'_>) -> Result<Boxed> + Send + Sync>;

/// Name to property index, optionally ignoring case.
pub(crate) struct PropertyLookup {
    exact: HashMap<String, usize>,
    folded: Option<HashMap<String, usize>>,
}

impl PropertyLookup {
    pub fn new(case_insensitive: bool) -> Self {
        PropertyLookup {
            exact: HashMap::new(),
            folded: case_insensitive.then(HashMap::new),
        }
    }

    /// Returns `false` if `name` collides with a property already added.
    pub fn insert(&mut self, name: &str, index: usize) -> bool {
        if self.exact.contains_key(name) {
            return false;
        }
        if let Some(folded) = &mut self.folded {
            if folded.insert(name.to_lowercase(), index).is_some() {
                return false;
            }
        }
        self.exact.insert(name.to_string(), index);
        true
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        if let Some(index) = self.exact.get(name) {
            return Some(*index);
        }
        self.folded.as_ref()?.get(&name.to_lowercase()).copied()
    }
}

/// Converter for types described with [`ObjectBuilder`](crate::ObjectBuilder).
pub struct ObjectConverter {
    pub(crate) type_name: String,
    pub(crate) factory: Option<Factory>,
    pub(crate) properties: Vec<PropertyDescriptor>,
    pub(crate) parameters: Vec<ParameterDescriptor>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) extension: Option<ExtensionData>,
    pub(crate) hooks: Hooks,
    pub(crate) derived: Vec<DerivedType>,
    pub(crate) lookup: PropertyLookup,
    pub(crate) value_type: TypeRef,
}

impl fmt::Debug for ObjectConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectConverter")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .field("parameters", &self.parameters)
            .field("derived", &self.derived.len())
            .finish_non_exhaustive()
    }
}

impl ObjectConverter {
    /// Decides where the value of the input member `name` goes.
    pub(crate) fn resolve_member(
        &self,
        name: &str,
        allowed: MetadataFlags,
        options: &ConvertOptions,
    ) -> Result<MemberTarget> {
        if metadata::is_reserved(name, allowed) {
            return Err(Error::unexpected_metadata(
                name,
                "metadata properties must precede all other properties",
            ));
        }
        if let Some(index) = self.lookup.find(name) {
            let property = &self.properties[index];
            return Ok(match property.parameter {
                Some(position) if self.constructor.is_some() => MemberTarget::Parameter(position),
                _ if property.is_read_only() => MemberTarget::Skip,
                _ => MemberTarget::Property(index),
            });
        }
        if self.extension.is_some() {
            return Ok(MemberTarget::Extension(name.to_string()));
        }
        match options.unmapped_member_handling {
            UnmappedMemberHandling::Skip => Ok(MemberTarget::Skip),
            UnmappedMemberHandling::Disallow => Err(Error::UnknownProperty {
                name: name.to_string(),
                type_name: self.type_name.clone(),
            }),
        }
    }

    /// Declared name of the property the input member `name` binds to.
    pub(crate) fn declared_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.lookup
            .find(name)
            .map_or(name, |index| self.properties[index].name.as_str())
    }

    /// Descriptor and number handling of the value read for `target`.
    pub(crate) fn member_type(
        &self,
        target: &MemberTarget,
        registry: &Registry,
    ) -> Result<Option<(Arc<TypeDescriptor>, Option<NumberHandling>)>> {
        Ok(match target {
            MemberTarget::Property(index) => {
                let property = &self.properties[*index];
                Some((property.ty.get(registry)?, property.number_handling))
            }
            MemberTarget::Parameter(position) => {
                let parameter = &self.parameters[*position];
                let handling = self.properties[parameter.property].number_handling;
                Some((parameter.ty.get(registry)?, handling))
            }
            MemberTarget::Extension(_) => Some((self.value_type.get(registry)?, None)),
            MemberTarget::Skip => None,
        })
    }

    /// Stores a converted member value on a created object.
    pub(crate) fn assign(&self, object: &mut dyn Any, target: MemberTarget, value: Boxed) -> Result<()> {
        match target {
            MemberTarget::Property(index) => self.properties[index].access.set(object, value),
            MemberTarget::Extension(name) => {
                let Some(extension) = &self.extension else {
                    return Err(Error::configuration("no extension data member"));
                };
                let value = unbox::<Value>(value)?;
                extension.access.map_mut(object)?.insert(name, value);
                Ok(())
            }
            MemberTarget::Parameter(_) | MemberTarget::Skip => Ok(()),
        }
    }

    pub(crate) fn check_required(&self, seen: &SeenMembers) -> Result<()> {
        let missing: Vec<String> = self
            .properties
            .iter()
            .enumerate()
            .filter(|(index, property)| property.required && !seen.contains(*index))
            .map(|(_, property)| property.name.clone())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing_required(&self.type_name, missing))
        }
    }

    fn abstract_error(&self) -> Error {
        Error::unexpected_metadata(
            metadata::TYPE,
            &format!("required to create abstract type '{}'", self.type_name),
        )
    }

    pub(crate) fn read(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        if stack.current().object_state == ObjectState::None && stack.use_fast_path(descriptor) {
            return if self.constructor.is_some() {
                self.read_fast_parameterized(reader, stack)
            } else {
                self.read_fast(reader, stack)
            };
        }
        self.read_resumable(descriptor, reader, stack)
    }

    fn read_fast(&self, reader: &mut TokenReader<'_>, stack: &mut ReadStack) -> Result<Option<ReadOutcome>> {
        if reader.token_type() != TokenType::StartObject {
            return Err(Error::unexpected_token("'{'", reader.token_type()));
        }
        let factory = self.factory.as_ref().ok_or_else(|| self.abstract_error())?;
        let registry = stack.options.registry.clone();
        let mut object = factory();
        self.hooks.deserializing(&mut *object)?;
        let mut seen = SeenMembers::with_len(self.properties.len());

        loop {
            match next_token(reader)? {
                TokenType::EndObject => break,
                TokenType::PropertyName => {}
                other => return Err(Error::unexpected_token("property name", other)),
            }
            let name = reader.get_str()?.into_owned();
            let target = self.resolve_member(&name, MetadataFlags::default(), &stack.options)?;
            let Some((member, handling)) = self.member_type(&target, &registry)? else {
                skip_value(reader)?;
                continue;
            };
            stack.current().segment = Some(PathSegment::Property(name));
            next_token(reader)?;
            let value = read_complete(&member, reader, stack, handling)?;
            if let MemberTarget::Property(index) = target {
                seen.insert(index);
            }
            self.assign(&mut *object, target, value)?;
        }

        stack.current().segment = None;
        self.check_required(&seen)?;
        self.hooks.deserialized(&mut *object)?;
        Ok(Some(ReadOutcome::Value(object)))
    }

    fn read_resumable(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        let registry = stack.options.registry.clone();
        let pool = stack.pool.clone();
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
            frame.object_state = match &frame.discriminator {
                Some(discriminator) => {
                    let index = self
                        .derived
                        .iter()
                        .position(|derived| &derived.discriminator == discriminator)
                        .ok_or_else(|| Error::UnknownDiscriminator {
                            discriminator: discriminator.clone(),
                            type_name: self.type_name.clone(),
                        })?;
                    frame.polymorphic = Some(index);
                    ObjectState::Polymorphic
                }
                None => ObjectState::CreatedObject,
            };
        }

        if stack.current().object_state == ObjectState::Polymorphic {
            let frame = stack.current();
            let index = frame
                .polymorphic
                .ok_or_else(|| Error::custom("polymorphic frame without a derived type"))?;
            let seed = ReadSeed {
                pending_name: frame.pending_name.take(),
                object_ended: frame.object_ended,
            };
            let derived = &self.derived[index];
            let child = derived.ty.get(&registry)?;
            let Some(value) = read_derived(&child, reader, stack, seed)? else {
                return Ok(None);
            };
            return Ok(Some(ReadOutcome::Value(derived.access.upcast(value)?)));
        }

        if stack.current().object_state == ObjectState::CreatedObject {
            let frame = stack.current();
            if self.constructor.is_some() {
                frame.args = Some(ArgumentSlots::new(self.parameters.len(), &pool));
            } else {
                let factory = self.factory.as_ref().ok_or_else(|| self.abstract_error())?;
                let mut object = factory();
                self.hooks.deserializing(&mut *object)?;
                frame.return_value = Some(object);
            }
            frame.seen = SeenMembers::with_len(self.properties.len());
            frame.object_state = ObjectState::ReadingMembers;
        }

        while stack.current().object_state == ObjectState::ReadingMembers {
            if stack.current().property_state == PropertyState::None {
                let frame = stack.current();
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
                let target = self.resolve_member(&name, allowed, &stack.options)?;
                let frame = stack.current();
                frame.segment = Some(PathSegment::Property(name));
                frame.member = Some(target);
                frame.property_state = PropertyState::ReadName;
            }

            let target = stack.current().member.clone().unwrap_or(MemberTarget::Skip);
            let Some((member, handling)) = self.member_type(&target, &registry)? else {
                if !reader.try_skip()? {
                    return Ok(None);
                }
                finish_member(stack.current());
                continue;
            };

            if stack.current().property_state == PropertyState::ReadName {
                if !begin_value(reader, &member)? {
                    return Ok(None);
                }
                stack.current().property_state = PropertyState::ReadValue;
            }

            let Some(value) = read_value(&member, reader, stack, handling)? else {
                return Ok(None);
            };
            let frame = stack.current();
            self.apply_member(frame, &pool, target, value)?;
            finish_member(frame);
        }

        let frame = stack.current();
        frame.segment = None;
        if frame.args.is_some() {
            return self.finish_constructed(frame, &registry).map(|value| Some(ReadOutcome::Value(value)));
        }
        self.check_required(&frame.seen)?;
        let mut object = frame
            .return_value
            .take()
            .ok_or_else(|| Error::custom("object frame lost its value"))?;
        self.hooks.deserialized(&mut *object)?;
        Ok(Some(ReadOutcome::Value(object)))
    }

    /// Routes a converted member: straight onto the object, or into the
    /// argument slots and the buffered list while the object does not exist.
    fn apply_member(
        &self,
        frame: &mut ReadFrame,
        pool: &Rc<dyn BufferPool>,
        target: MemberTarget,
        value: Boxed,
    ) -> Result<()> {
        match &target {
            MemberTarget::Property(index) => frame.seen.insert(*index),
            MemberTarget::Parameter(position) => {
                frame.seen.insert(self.parameters[*position].property);
            }
            _ => {}
        }
        if let Some(args) = frame.args.as_mut() {
            match target {
                MemberTarget::Parameter(position) => args.set(position, value),
                target => frame
                    .buffered
                    .get_or_insert_with(|| Rented::new(pool, 4))
                    .push(BufferedProperty { target, value }),
            }
            return Ok(());
        }
        let object = frame
            .return_value
            .as_deref_mut()
            .ok_or_else(|| Error::custom("object frame lost its value"))?;
        self.assign(object, target, value)
    }

    pub(crate) fn write<'v>(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        value: &'v dyn Any,
        writer: &mut TokenWriter,
        stack: &mut WriteStack<'v>,
    ) -> Result<bool> {
        let frame = stack.current();
        if frame.object_state == ObjectState::None {
            if let Some(index) = self
                .derived
                .iter()
                .position(|derived| derived.access.downcast(value).is_some())
            {
                frame.polymorphic = Some(index);
                frame.object_state = ObjectState::Polymorphic;
            }
        }
        let Some(index) = frame.polymorphic else {
            return self.write_members(descriptor, value, writer, stack);
        };
        let derived = &self.derived[index];
        let inner = derived
            .access
            .downcast(value)
            .ok_or_else(|| Error::custom("derived value changed while writing"))?;
        let seed = WriteSeed {
            discriminator: derived.discriminator.clone(),
            reference_id: frame.reference_id.take(),
        };
        let child = derived.ty.get(&stack.options.registry)?;
        write_derived(&child, inner, writer, stack, seed)
    }

    /// Writes `{`, the envelope metadata, every property and the extension
    /// entries, suspending between members when the writer is full.
    pub(crate) fn write_members<'v>(
        &self,
        _descriptor: &Arc<TypeDescriptor>,
        value: &'v dyn Any,
        writer: &mut TokenWriter,
        stack: &mut WriteStack<'v>,
    ) -> Result<bool> {
        let registry = stack.options.registry.clone();
        if stack.current().object_state < ObjectState::ReadingMembers {
            self.hooks.serializing(value)?;
            writer.write_start_object()?;
            let frame = stack.current();
            if let Some(id) = &frame.reference_id {
                metadata::write_id(writer, id)?;
            }
            if let Some(discriminator) = &frame.discriminator {
                metadata::write_type(writer, discriminator)?;
            }
            frame.object_state = ObjectState::ReadingMembers;
            frame.property_index = 0;
        }

        let extension = match &self.extension {
            Some(extension) => Some(extension.access.map(value)?),
            None => None,
        };
        let total = self.properties.len() + extension.map_or(0, |map| map.len());

        loop {
            let index = stack.current().property_index;
            if index >= total {
                break;
            }
            let (name, member, field, handling): (&str, _, &'v dyn Any, _) =
                match self.properties.get(index) {
                    Some(property) => (
                        &property.name,
                        property.ty.get(&registry)?,
                        property.access.get(value)?,
                        property.number_handling,
                    ),
                    None => {
                        let (key, entry) = extension
                            .and_then(|map| map.get_index(index - self.properties.len()))
                            .ok_or_else(|| Error::custom("extension data changed while writing"))?;
                        (key.as_str(), self.value_type.get(&registry)?, entry as &dyn Any, None)
                    }
                };

            let frame = stack.current();
            if frame.property_state == PropertyState::None {
                writer.write_property_name(name)?;
                frame.segment = Some(PathSegment::Property(name.to_string()));
                frame.property_state = PropertyState::ReadValue;
            }
            if !write_value(&member, field, writer, stack, handling)? {
                return Ok(false);
            }
            let frame = stack.current();
            frame.property_state = PropertyState::None;
            frame.segment = None;
            frame.property_index += 1;
            if stack.should_suspend(writer) {
                return Ok(false);
            }
        }

        writer.write_end_object()?;
        self.hooks.serialized(value)?;
        Ok(true)
    }
}

fn finish_member(frame: &mut ReadFrame) {
    frame.property_state = PropertyState::None;
    frame.member = None;
    frame.segment = None;
}
