//! The `$id` / `$ref` / `$type` / `$values` metadata protocol.
//!
//! Metadata keys must be the leading keys of an object. `$ref` must be the
//! only key of its object; `$values` carries the elements of a preserved
//! collection:
//!
//! ```text
//! {"$id": "1", "$values": [1, 2, 3]}
//! {"$ref": "1"}
//! {"$type": "circle", "Radius": 2.0}
//! ```

use crate::descriptor::{Kind, TypeDescriptor};
use crate::options::ConvertOptions;
use crate::reader::{TokenReader, TokenType};
use crate::stack::ReadFrame;
use crate::writer::TokenWriter;
use crate::{Error, Result};

pub(crate) const ID: &str = "$id";
pub(crate) const REF: &str = "$ref";
pub(crate) const TYPE: &str = "$type";
pub(crate) const VALUES: &str = "$values";

/// Set of metadata keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MetadataFlags(u8);

impl MetadataFlags {
    pub const ID: MetadataFlags = MetadataFlags(1);
    pub const REF: MetadataFlags = MetadataFlags(1 << 1);
    pub const TYPE: MetadataFlags = MetadataFlags(1 << 2);
    pub const VALUES: MetadataFlags = MetadataFlags(1 << 3);

    pub fn contains(self, other: MetadataFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: MetadataFlags) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The flag for a metadata key name, if it is one.
    pub fn from_name(name: &str) -> Option<MetadataFlags> {
        match name {
            ID => Some(Self::ID),
            REF => Some(Self::REF),
            TYPE => Some(Self::TYPE),
            VALUES => Some(Self::VALUES),
            _ => None,
        }
    }
}

impl std::ops::BitOr for MetadataFlags {
    type Output = MetadataFlags;

    fn bitor(self, rhs: MetadataFlags) -> MetadataFlags {
        MetadataFlags(self.0 | rhs.0)
    }
}

/// Metadata keys honored for values of `descriptor`.
pub(crate) fn allowed(descriptor: &TypeDescriptor, options: &ConvertOptions) -> MetadataFlags {
    let mut flags = MetadataFlags::default();
    let kind = descriptor.kind();
    if options.preserves_references() && kind != Kind::None {
        flags.insert(MetadataFlags::ID | MetadataFlags::REF);
        if kind == Kind::Enumerable {
            flags.insert(MetadataFlags::VALUES);
        }
    }
    if let crate::converter::Converter::Object(object) = descriptor.converter() {
        if !object.derived.is_empty() {
            flags.insert(MetadataFlags::TYPE);
        }
    }
    flags
}

/// Returns `true` if `name` is a metadata key honored under `allowed`.
pub(crate) fn is_reserved(name: &str, allowed: MetadataFlags) -> bool {
    MetadataFlags::from_name(name).is_some_and(|flag| allowed.contains(flag))
}

/// Reads the leading metadata keys of the object whose `{` (or last
/// metadata value) is the current token.
///
/// A key and its value are consumed together; if the value is not buffered
/// yet the reader is moved back before the key and `Ok(false)` is returned.
/// The first ordinary key is left in `frame.pending_name`; `}` sets
/// `frame.object_ended`. After `$values` the reader is on its `[`.
pub(crate) fn read_metadata(
    reader: &mut TokenReader<'_>,
    frame: &mut ReadFrame,
    allowed: MetadataFlags,
) -> Result<bool> {
    loop {
        let checkpoint = reader.checkpoint();
        if !reader.read()? {
            return Ok(false);
        }
        match reader.token_type() {
            TokenType::EndObject => {
                frame.object_ended = true;
                return Ok(true);
            }
            TokenType::PropertyName => {}
            other => return Err(Error::unexpected_token("property name", other)),
        }
        let name = reader.get_str()?;
        let flag = match MetadataFlags::from_name(&name) {
            Some(flag) if allowed.contains(flag) => flag,
            _ => {
                if frame.metadata.contains(MetadataFlags::REF) {
                    return Err(Error::unexpected_metadata(
                        REF,
                        "no other properties may follow a reference",
                    ));
                }
                frame.pending_name = Some(name.into_owned());
                return Ok(true);
            }
        };
        let name = name.into_owned();
        if frame.metadata.contains(flag) {
            return Err(Error::unexpected_metadata(&name, "duplicate metadata property"));
        }
        let follows_ref = frame.metadata.contains(MetadataFlags::REF);
        if follows_ref || (flag == MetadataFlags::REF && !frame.metadata.is_empty()) {
            return Err(Error::unexpected_metadata(
                REF,
                "a reference cannot be combined with other properties",
            ));
        }
        if !reader.read()? {
            reader.restore(checkpoint);
            return Ok(false);
        }
        frame.metadata.insert(flag);
        if flag == MetadataFlags::VALUES {
            if reader.token_type() != TokenType::StartArray {
                return Err(Error::unexpected_metadata(&name, "expected an array of values"));
            }
            return Ok(true);
        }
        if reader.token_type() != TokenType::String {
            return Err(Error::unexpected_metadata(&name, "value must be a string"));
        }
        let value = reader.get_str()?.into_owned();
        match flag {
            MetadataFlags::ID => frame.reference_id = Some(value),
            MetadataFlags::REF => frame.ref_id = Some(value),
            _ => frame.discriminator = Some(value),
        }
    }
}

pub(crate) fn write_id(writer: &mut TokenWriter, id: &str) -> Result<()> {
    writer.write_property_name(ID)?;
    writer.write_string(id)
}

pub(crate) fn write_type(writer: &mut TokenWriter, discriminator: &str) -> Result<()> {
    writer.write_property_name(TYPE)?;
    writer.write_string(discriminator)
}

/// Writes `{"$ref": id}` in place of a value already written.
pub(crate) fn write_ref(writer: &mut TokenWriter, id: &str) -> Result<()> {
    writer.write_start_object()?;
    writer.write_property_name(REF)?;
    writer.write_string(id)?;
    writer.write_end_object()
}
