//! Conversion strategies.
//!
//! Every descriptor carries exactly one [`Converter`]. The set of shapes is
//! closed:
//!
//! - [`Converter::Value`]: a leaf converted from one token (or a subtree it
//!   reads on its own, such as [`Value`](crate::Value))
//! - [`Converter::Object`]: named properties, optional constructor binding,
//!   extension data and polymorphic dispatch
//! - [`Converter::Enumerable`]: arrays, including asynchronous sources
//! - [`Converter::Dictionary`]: objects whose keys are converted values
//!
//! Composite converters run as resumable state machines over the read and
//! write stacks; leaf converters are plain functions of one token.

mod async_seq;
mod collection;
mod dictionary;
mod object;
mod parameterized;
mod value;

pub use async_seq::{AsyncSequence, CancellationToken};
pub use collection::{CollectionConverter, CollectionShape};
pub use dictionary::{DictionaryConverter, DictionaryShape};
pub use object::ObjectConverter;
pub use value::{Scalar, ScalarConverter, UnitEnumConverter, ValueTreeConverter};

pub(crate) use async_seq::ErasedStream;
pub(crate) use object::{Constructor, Factory, PropertyLookup};

use crate::descriptor::Boxed;
use crate::options::NumberHandling;
use crate::reader::TokenReader;
use crate::writer::TokenWriter;
use crate::{Error, Result};
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// The strategy a descriptor converts with.
#[derive(Clone)]
pub enum Converter {
    Value(Arc<dyn ValueConverter>),
    Object(Arc<ObjectConverter>),
    Enumerable(Arc<CollectionConverter>),
    Dictionary(Arc<DictionaryConverter>),
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Converter::Value(_) => "Value",
            Converter::Object(_) => "Object",
            Converter::Enumerable(_) => "Enumerable",
            Converter::Dictionary(_) => "Dictionary",
        };
        f.write_str(name)
    }
}

/// Result of a composite converter that completed its level.
pub(crate) enum ReadOutcome {
    /// A newly built value.
    Value(Boxed),
    /// A previously registered value selected by `$ref`.
    Reference(Rc<dyn Any>),
}

/// Settings visible to leaf converters.
#[derive(Clone, Copy, Debug)]
pub struct ValueContext {
    pub number_handling: NumberHandling,
    pub max_depth: usize,
}

/// A converter for leaf values.
///
/// `read` is called with the reader positioned on the value's first token
/// and must leave it on the value's last token. Converters that consume a
/// whole subtree return `true` from `requires_read_ahead`; the engine then
/// guarantees the subtree is fully buffered before calling `read`.
pub trait ValueConverter: Send + Sync {
    fn read(&self, reader: &mut TokenReader<'_>, ctx: &ValueContext) -> Result<Boxed>;

    fn write(&self, value: &dyn Any, writer: &mut TokenWriter, ctx: &ValueContext) -> Result<()>;

    /// Parses a dictionary key.
    fn read_property_name(&self, _name: &str, _ctx: &ValueContext) -> Result<Boxed> {
        Err(Error::configuration(
            "type cannot be used as a dictionary key",
        ))
    }

    /// Formats a dictionary key.
    fn write_property_name(&self, _value: &dyn Any, _ctx: &ValueContext) -> Result<String> {
        Err(Error::configuration(
            "type cannot be used as a dictionary key",
        ))
    }

    /// Returns `true` if `null` is a regular input for this converter.
    fn handles_null(&self) -> bool {
        false
    }

    fn requires_read_ahead(&self) -> bool {
        false
    }
}
