//! Type descriptors: the metadata the engine converts against.
//!
//! A [`TypeDescriptor`] names a native type, its [`Kind`], and the
//! [`Converter`] strategy that reads and writes it. Object descriptors carry
//! their properties, constructor parameters, extension-data handle and
//! lifecycle hooks; collection descriptors carry their element (and key)
//! descriptors.
//!
//! Descriptors are created by [`Describe`] implementations or by
//! [`ObjectBuilder`], cached in a [`Registry`], and immutable once
//! retrieved for a conversion.
//!
//! Member types are referenced lazily through [`TypeRef`] so recursive types
//! can describe themselves without building an infinite tree.

mod builder;
mod describe;
mod property;
mod registry;

pub use builder::{Arguments, ObjectBuilder};
pub use describe::short_type_name;
pub use property::{ParameterDescriptor, PropertyDescriptor};
pub use registry::{Describe, Registry};

pub(crate) use property::{DerivedType, ExtensionData, Hooks};

use crate::converter::{
    AsyncSequence, CollectionConverter, CollectionShape, Converter, DictionaryConverter,
    DictionaryShape, ObjectConverter, Scalar, ScalarConverter, UnitEnumConverter, ValueConverter,
};
use crate::{Error, Result};
use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A type-erased native value owned by the engine.
pub type Boxed = Box<dyn Any>;

/// The shape a descriptor's converter handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// A leaf value converted from one token (or one self-contained subtree).
    None,
    Object,
    Enumerable,
    Dictionary,
}

/// Adapts `Option<T>` around an inner descriptor.
#[derive(Clone, Copy)]
pub(crate) struct NullableShim {
    pub none: fn() -> Boxed,
    pub wrap: fn(Boxed) -> Result<Boxed>,
    pub unwrap: for<'a> fn(&'a dyn Any) -> Result<Option<&'a dyn Any>>,
}

/// Adapts `Rc<T>` around an inner descriptor; the identity of the `Rc` is
/// what reference preservation tracks.
#[derive(Clone, Copy)]
pub(crate) struct SharedShim {
    pub wrap: fn(Boxed) -> Result<(Boxed, Rc<dyn Any>)>,
    pub from_shared: fn(Rc<dyn Any>) -> Result<Boxed>,
    pub unwrap: for<'a> fn(&'a dyn Any) -> Result<(usize, &'a dyn Any)>,
}

/// Metadata for one native type.
pub struct TypeDescriptor {
    type_id: TypeId,
    name: String,
    pub(crate) converter: Converter,
    pub(crate) nullable: Option<NullableShim>,
    pub(crate) shared: Option<SharedShim>,
    configured: AtomicBool,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("nullable", &self.nullable.is_some())
            .field("shared", &self.shared.is_some())
            .finish()
    }
}

impl TypeDescriptor {
    pub(crate) fn new<T: 'static>(name: impl Into<String>, converter: Converter) -> Self {
        TypeDescriptor {
            type_id: TypeId::of::<T>(),
            name: name.into(),
            converter,
            nullable: None,
            shared: None,
            configured: AtomicBool::new(false),
        }
    }

    /// Describes a leaf type through a custom [`ValueConverter`].
    pub fn value<T: 'static>(name: impl Into<String>, converter: Arc<dyn ValueConverter>) -> Self {
        Self::new::<T>(name, Converter::Value(converter))
    }

    /// Describes a leaf type through its [`Scalar`] implementation.
    #[must_use]
    pub fn scalar<T: Scalar>() -> Self {
        Self::new::<T>(T::NAME, Converter::Value(Arc::new(ScalarConverter::<T>::new())))
    }

    /// Describes a unit enum written as one of the given names.
    ///
    /// ```rust
    /// use frameconv::TypeDescriptor;
    ///
    /// #[derive(Clone, Copy, PartialEq, Debug)]
    /// enum Color { Red, Green }
    ///
    /// let descriptor = TypeDescriptor::unit_enum("Color", &[("red", Color::Red), ("green", Color::Green)]);
    /// assert_eq!(descriptor.name(), "Color");
    /// ```
    pub fn unit_enum<E>(name: &str, variants: &'static [(&'static str, E)]) -> Self
    where
        E: Copy + PartialEq + Send + Sync + 'static,
    {
        Self::new::<E>(
            name,
            Converter::Value(Arc::new(UnitEnumConverter::new(name, variants))),
        )
    }

    /// Describes a collection through its [`CollectionShape`].
    #[must_use]
    pub fn enumerable<C>() -> Self
    where
        C: CollectionShape,
        C::Element: Describe,
    {
        Self::new::<C>(
            short_type_name::<C>(),
            Converter::Enumerable(Arc::new(CollectionConverter::of::<C>())),
        )
    }

    /// Describes a dictionary through its [`DictionaryShape`].
    #[must_use]
    pub fn dictionary<D>() -> Self
    where
        D: DictionaryShape,
        D::Key: Describe,
        D::Value: Describe,
    {
        Self::new::<D>(
            short_type_name::<D>(),
            Converter::Dictionary(Arc::new(DictionaryConverter::of::<D>())),
        )
    }

    /// Describes an asynchronous element source written as an array.
    #[must_use]
    pub fn async_sequence<T: Describe>() -> Self {
        Self::new::<AsyncSequence<T>>(
            format!("AsyncSequence<{}>", short_type_name::<T>()),
            Converter::Enumerable(Arc::new(CollectionConverter::async_sequence::<T>())),
        )
    }

    pub(crate) fn object<T: 'static>(name: &str, converter: ObjectConverter) -> Self {
        Self::new::<T>(name, Converter::Object(Arc::new(converter)))
    }

    /// Describes `Option<T>` on top of the descriptor for `T`.
    pub fn optional<T: 'static>(inner: &TypeDescriptor) -> Result<Self> {
        if inner.type_id != TypeId::of::<T>() {
            return Err(Error::configuration(format!(
                "descriptor '{}' does not describe the inner type of Option",
                inner.name
            )));
        }
        if inner.nullable.is_some() {
            return Err(Error::configuration(format!(
                "descriptor '{}' is already nullable",
                inner.name
            )));
        }
        Ok(TypeDescriptor {
            type_id: TypeId::of::<Option<T>>(),
            name: format!("Option<{}>", inner.name),
            converter: inner.converter.clone(),
            nullable: Some(NullableShim {
                none: none_of::<T>,
                wrap: wrap_some::<T>,
                unwrap: unwrap_option::<T>,
            }),
            shared: inner.shared,
            configured: AtomicBool::new(false),
        })
    }

    /// Describes `Rc<T>` on top of the descriptor for `T`.
    ///
    /// Shared descriptors take part in reference preservation.
    pub fn shared<T: 'static>(inner: &TypeDescriptor) -> Result<Self> {
        if inner.type_id != TypeId::of::<T>() {
            return Err(Error::configuration(format!(
                "descriptor '{}' does not describe the inner type of Rc",
                inner.name
            )));
        }
        if inner.nullable.is_some() || inner.shared.is_some() {
            return Err(Error::configuration(format!(
                "descriptor '{}' cannot be shared",
                inner.name
            )));
        }
        if inner.kind() == Kind::None {
            return Err(Error::configuration(format!(
                "leaf type '{}' cannot carry reference metadata",
                inner.name
            )));
        }
        Ok(TypeDescriptor {
            type_id: TypeId::of::<Rc<T>>(),
            name: format!("Rc<{}>", inner.name),
            converter: inner.converter.clone(),
            nullable: None,
            shared: Some(SharedShim {
                wrap: wrap_rc::<T>,
                from_shared: rc_from_shared::<T>,
                unwrap: unwrap_rc::<T>,
            }),
            configured: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match &self.converter {
            Converter::Value(_) => Kind::None,
            Converter::Object(_) => Kind::Object,
            Converter::Enumerable(_) => Kind::Enumerable,
            Converter::Dictionary(_) => Kind::Dictionary,
        }
    }

    #[must_use]
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Declared properties of an object descriptor, in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        match &self.converter {
            Converter::Object(object) => &object.properties,
            _ => &[],
        }
    }

    /// Constructor parameters of an object descriptor, by position.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        match &self.converter {
            Converter::Object(object) => &object.parameters,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable.is_some()
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    /// Returns `true` once the descriptor has been handed out for a
    /// conversion.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    pub(crate) fn mark_configured(&self) {
        self.configured.store(true, Ordering::Release);
    }

    /// Returns `true` if a `null` token can be converted by this descriptor.
    pub(crate) fn accepts_null(&self) -> bool {
        self.nullable.is_some()
            || matches!(&self.converter, Converter::Value(c) if c.handles_null())
    }

    /// Leaf converters that consume a whole subtree need it fully buffered.
    pub(crate) fn requires_read_ahead(&self) -> bool {
        matches!(&self.converter, Converter::Value(c) if c.requires_read_ahead())
    }
}

/// Moves a boxed value out as `T`.
pub(crate) fn unbox<T: 'static>(value: Boxed) -> Result<T> {
    value
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| Error::type_mismatch(&short_type_name::<T>(), "a value of another type"))
}

pub(crate) fn downcast_ref<T: 'static>(value: &dyn Any) -> Result<&T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| Error::type_mismatch(&short_type_name::<T>(), "a value of another type"))
}

pub(crate) fn downcast_mut<T: 'static>(value: &mut dyn Any) -> Result<&mut T> {
    value
        .downcast_mut::<T>()
        .ok_or_else(|| Error::type_mismatch(&short_type_name::<T>(), "a value of another type"))
}

fn none_of<T: 'static>() -> Boxed {
    Box::new(None::<T>)
}

fn wrap_some<T: 'static>(value: Boxed) -> Result<Boxed> {
    Ok(Box::new(Some(unbox::<T>(value)?)))
}

fn unwrap_option<T: 'static>(value: &dyn Any) -> Result<Option<&dyn Any>> {
    let option = downcast_ref::<Option<T>>(value)?;
    Ok(option.as_ref().map(|v| v as &dyn Any))
}

fn wrap_rc<T: 'static>(value: Boxed) -> Result<(Boxed, Rc<dyn Any>)> {
    let rc = Rc::new(unbox::<T>(value)?);
    let erased: Rc<dyn Any> = rc.clone();
    Ok((Box::new(rc), erased))
}

fn rc_from_shared<T: 'static>(value: Rc<dyn Any>) -> Result<Boxed> {
    let rc = value.downcast::<T>().map_err(|_| {
        Error::type_mismatch(
            &short_type_name::<T>(),
            "a reference to a value of another type",
        )
    })?;
    Ok(Box::new(rc))
}

fn unwrap_rc<T: 'static>(value: &dyn Any) -> Result<(usize, &dyn Any)> {
    let rc = downcast_ref::<Rc<T>>(value)?;
    let address = Rc::as_ptr(rc) as *const () as usize;
    Ok((address, &**rc as &dyn Any))
}

/// A lazily resolved reference to a member's descriptor.
///
/// Nothing is cached here: every lookup goes through the registry of the
/// conversion, so recursive types never hold their own descriptors alive
/// and one `TypeRef` serves any number of registries.
pub struct TypeRef {
    resolve: fn(&Registry) -> Result<Arc<TypeDescriptor>>,
    name: fn() -> String,
}

impl TypeRef {
    /// References the registry's descriptor for `T`.
    #[must_use]
    pub fn of<T: Describe>() -> Self {
        TypeRef {
            resolve: |registry| registry.get::<T>(),
            name: short_type_name::<T>,
        }
    }

    /// Resolves the descriptor in `registry`.
    pub fn get(&self, registry: &Registry) -> Result<Arc<TypeDescriptor>> {
        (self.resolve)(registry)
    }

    #[must_use]
    pub fn type_name(&self) -> String {
        (self.name)()
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.type_name())
    }
}
