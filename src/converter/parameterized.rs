//! Objects built by a parameterized constructor.
//!
//! The object does not exist until every member has been seen, so members
//! are held back until construction:
//!
//! - constructor arguments are converted eagerly into positional slots,
//!   inline in the frame for small arities and rented from the pool
//!   otherwise
//! - on the fast path, other members are recorded by position and skipped,
//!   then converted after construction from a forked reader
//! - on the resumable path, other members are converted immediately and
//!   buffered, then assigned after construction
//!
//! Missing arguments fall back to declared defaults, then to `None` for
//! optional parameter types; anything else is reported by name before the
//! constructor runs.

use super::{ObjectConverter, ReadOutcome};
use crate::descriptor::{Arguments, Boxed, Registry};
use crate::engine::{next_token, read_complete, skip_value};
use crate::metadata::MetadataFlags;
use crate::pool::{ArgumentSlots, FoundProperty, Rented};
use crate::reader::{TokenReader, TokenType};
use crate::stack::{MemberTarget, PathSegment, ReadFrame, ReadStack, SeenMembers};
use crate::{Error, Result};
use log::trace;

impl ObjectConverter {
    /// Fills defaults, checks required members and runs the constructor.
    pub(crate) fn construct(
        &self,
        slots: &mut [Option<Boxed>],
        seen: &SeenMembers,
        registry: &Registry,
    ) -> Result<Boxed> {
        let mut missing = Vec::new();
        for (position, parameter) in self.parameters.iter().enumerate() {
            let Some(slot) = slots.get_mut(position) else {
                return Err(Error::configuration(format!(
                    "no argument slot for parameter '{}'",
                    parameter.name
                )));
            };
            if slot.is_some() {
                continue;
            }
            if let Some(default) = &parameter.default {
                *slot = Some(default());
                continue;
            }
            if let Some(nullable) = parameter.ty.get(registry)?.nullable {
                *slot = Some((nullable.none)());
                continue;
            }
            missing.push(self.properties[parameter.property].name.clone());
        }
        for (index, property) in self.properties.iter().enumerate() {
            if property.required && !seen.contains(index) && !missing.contains(&property.name) {
                missing.push(property.name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(Error::missing_required(&self.type_name, missing));
        }

        let constructor = self
            .constructor
            .as_ref()
            .ok_or_else(|| Error::configuration(format!("type '{}' has no constructor", self.type_name)))?;
        trace!("constructing {} from {} argument(s)", self.type_name, slots.len());
        let mut arguments = Arguments::new(slots, &self.parameters);
        constructor(&mut arguments)
    }

    /// Completes a resumable frame: constructs the object and assigns the
    /// buffered members.
    pub(crate) fn finish_constructed(&self, frame: &mut ReadFrame, registry: &Registry) -> Result<Boxed> {
        let mut args = frame
            .args
            .take()
            .ok_or_else(|| Error::custom("constructor frame lost its arguments"))?;
        let buffered = frame.buffered.take();
        let mut object = self.construct(args.as_mut_slice(), &frame.seen, registry)?;
        drop(args);

        self.hooks.deserializing(&mut *object)?;
        if let Some(mut buffered) = buffered {
            for property in buffered.drain(..) {
                self.assign(&mut *object, property.target, property.value)?;
            }
        }
        self.hooks.deserialized(&mut *object)?;
        Ok(object)
    }

    /// Single-pass read of a fully buffered object with a constructor.
    pub(crate) fn read_fast_parameterized(
        &self,
        reader: &mut TokenReader<'_>,
        stack: &mut ReadStack,
    ) -> Result<Option<ReadOutcome>> {
        if reader.token_type() != TokenType::StartObject {
            return Err(Error::unexpected_token("'{'", reader.token_type()));
        }
        let registry = stack.options.registry.clone();
        let pool = stack.pool.clone();
        let mut args = ArgumentSlots::new(self.parameters.len(), &pool);
        let mut found: Option<Rented<FoundProperty>> = None;
        let mut seen = SeenMembers::with_len(self.properties.len());

        loop {
            match next_token(reader)? {
                TokenType::EndObject => break,
                TokenType::PropertyName => {}
                other => return Err(Error::unexpected_token("property name", other)),
            }
            let name = reader.get_str()?.into_owned();
            match self.resolve_member(&name, MetadataFlags::default(), &stack.options)? {
                MemberTarget::Skip => skip_value(reader)?,
                MemberTarget::Parameter(position) => {
                    let parameter = &self.parameters[position];
                    let member = parameter.ty.get(&registry)?;
                    let handling = self.properties[parameter.property].number_handling;
                    stack.current().segment = Some(PathSegment::Property(name));
                    next_token(reader)?;
                    let value = read_complete(&member, reader, stack, handling)?;
                    args.set(position, value);
                    seen.insert(parameter.property);
                }
                target => {
                    if let MemberTarget::Property(index) = target {
                        seen.insert(index);
                    }
                    found
                        .get_or_insert_with(|| Rented::new(&pool, 8))
                        .push(FoundProperty {
                            target,
                            name,
                            checkpoint: reader.checkpoint(),
                        });
                    skip_value(reader)?;
                }
            }
        }
        stack.current().segment = None;

        let mut object = self.construct(args.as_mut_slice(), &seen, &registry)?;
        drop(args);
        self.hooks.deserializing(&mut *object)?;

        if let Some(mut found) = found {
            for property in found.drain(..) {
                let Some((member, handling)) = self.member_type(&property.target, &registry)? else {
                    continue;
                };
                stack.current().segment = Some(PathSegment::Property(property.name));
                let mut replay = reader.fork(&property.checkpoint);
                next_token(&mut replay)?;
                let value = read_complete(&member, &mut replay, stack, handling)?;
                self.assign(&mut *object, property.target, value)?;
            }
            stack.current().segment = None;
        }

        self.hooks.deserialized(&mut *object)?;
        Ok(Some(ReadOutcome::Value(object)))
    }
}
