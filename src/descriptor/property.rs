//! Member descriptors of object types.
//!
//! Accessors are stored behind small object-safe traits so the engine can
//! read and assign members of any native type through `dyn Any`.

use super::{downcast_mut, downcast_ref, unbox, Boxed, TypeRef};
use crate::options::NumberHandling;
use crate::{Result, ValueMap};
use std::any::Any;
use std::fmt;

pub(crate) trait Accessor: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn Any) -> Result<&'a dyn Any>;
    fn set(&self, owner: &mut dyn Any, value: Boxed) -> Result<()>;
    fn can_set(&self) -> bool;
}

pub(crate) struct FieldAccessor<T, P> {
    pub get: fn(&T) -> &P,
    pub set: Option<fn(&mut T, P)>,
}

impl<T: 'static, P: 'static> Accessor for FieldAccessor<T, P> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Result<&'a dyn Any> {
        let owner = downcast_ref::<T>(owner)?;
        Ok((self.get)(owner) as &dyn Any)
    }

    fn set(&self, owner: &mut dyn Any, value: Boxed) -> Result<()> {
        let Some(set) = self.set else {
            return Err(crate::Error::configuration("property is read-only"));
        };
        let owner = downcast_mut::<T>(owner)?;
        set(owner, unbox::<P>(value)?);
        Ok(())
    }

    fn can_set(&self) -> bool {
        self.set.is_some()
    }
}

/// A named member of an object type.
pub struct PropertyDescriptor {
    pub(crate) name: String,
    pub(crate) ty: TypeRef,
    pub(crate) access: Box<dyn Accessor>,
    pub(crate) required: bool,
    pub(crate) number_handling: Option<NumberHandling>,
    pub(crate) parameter: Option<usize>,
}

impl PropertyDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_name(&self) -> String {
        self.ty.type_name()
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        !self.access.can_set()
    }

    /// Position of the constructor parameter this property binds to.
    #[must_use]
    pub fn parameter(&self) -> Option<usize> {
        self.parameter
    }

    #[must_use]
    pub fn number_handling(&self) -> Option<NumberHandling> {
        self.number_handling
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("required", &self.required)
            .field("parameter", &self.parameter)
            .finish()
    }
}

/// A positional constructor argument.
pub struct ParameterDescriptor {
    pub(crate) name: String,
    pub(crate) position: usize,
    pub(crate) ty: TypeRef,
    pub(crate) default: Option<Box<dyn Fn() -> Boxed + Send + Sync>>,
    pub(crate) property: usize,
}

impl ParameterDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Index of the property this parameter is bound to.
    #[must_use]
    pub fn property(&self) -> usize {
        self.property
    }
}

impl fmt::Debug for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDescriptor")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("type", &self.ty)
            .finish()
    }
}

pub(crate) trait ExtensionAccess: Send + Sync {
    fn map<'a>(&self, owner: &'a dyn Any) -> Result<&'a ValueMap>;
    fn map_mut<'a>(&self, owner: &'a mut dyn Any) -> Result<&'a mut ValueMap>;
}

pub(crate) struct ExtensionFields<T> {
    pub get: fn(&T) -> &ValueMap,
    pub get_mut: fn(&mut T) -> &mut ValueMap,
}

impl<T: 'static> ExtensionAccess for ExtensionFields<T> {
    fn map<'a>(&self, owner: &'a dyn Any) -> Result<&'a ValueMap> {
        Ok((self.get)(downcast_ref::<T>(owner)?))
    }

    fn map_mut<'a>(&self, owner: &'a mut dyn Any) -> Result<&'a mut ValueMap> {
        Ok((self.get_mut)(downcast_mut::<T>(owner)?))
    }
}

/// Catch-all member receiving keys that match no declared property.
pub(crate) struct ExtensionData {
    pub name: String,
    pub access: Box<dyn ExtensionAccess>,
}

pub(crate) trait DerivedAccess: Send + Sync {
    fn upcast(&self, value: Boxed) -> Result<Boxed>;
    fn downcast<'a>(&self, value: &'a dyn Any) -> Option<&'a dyn Any>;
}

pub(crate) struct DerivedFns<T, D> {
    pub upcast: fn(D) -> T,
    pub downcast: fn(&T) -> Option<&D>,
}

impl<T: 'static, D: 'static> DerivedAccess for DerivedFns<T, D> {
    fn upcast(&self, value: Boxed) -> Result<Boxed> {
        Ok(Box::new((self.upcast)(unbox::<D>(value)?)))
    }

    fn downcast<'a>(&self, value: &'a dyn Any) -> Option<&'a dyn Any> {
        let base = value.downcast_ref::<T>()?;
        (self.downcast)(base).map(|derived| derived as &dyn Any)
    }
}

/// A concrete type selected by a `$type` discriminator.
pub(crate) struct DerivedType {
    pub discriminator: String,
    pub ty: TypeRef,
    pub access: Box<dyn DerivedAccess>,
}

type ReadHook = Box<dyn Fn(&mut dyn Any) -> Result<()> + Send + Sync>;
type WriteHook = Box<dyn Fn(&dyn Any) -> Result<()> + Send + Sync>;

/// Lifecycle callbacks of an object type.
#[derive(Default)]
pub(crate) struct Hooks {
    pub on_deserializing: Option<ReadHook>,
    pub on_deserialized: Option<ReadHook>,
    pub on_serializing: Option<WriteHook>,
    pub on_serialized: Option<WriteHook>,
}

impl Hooks {
    pub fn deserializing(&self, object: &mut dyn Any) -> Result<()> {
        self.on_deserializing.as_ref().map_or(Ok(()), |hook| hook(object))
    }

    pub fn deserialized(&self, object: &mut dyn Any) -> Result<()> {
        self.on_deserialized.as_ref().map_or(Ok(()), |hook| hook(object))
    }

    pub fn serializing(&self, object: &dyn Any) -> Result<()> {
        self.on_serializing.as_ref().map_or(Ok(()), |hook| hook(object))
    }

    pub fn serialized(&self, object: &dyn Any) -> Result<()> {
        self.on_serialized.as_ref().map_or(Ok(()), |hook| hook(object))
    }
}
