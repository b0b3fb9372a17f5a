//! Fluent construction of object descriptors.
//!
//! ```rust
//! use frameconv::{Describe, ObjectBuilder, Registry, Result, TypeDescriptor};
//!
//! #[derive(Debug, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl Describe for Point {
//!     fn describe(_: &Registry) -> Result<TypeDescriptor> {
//!         ObjectBuilder::<Point>::new("Point")
//!             .read_only::<i32>("X", |p| &p.x)
//!             .read_only::<i32>("Y", |p| &p.y)
//!             .parameter::<i32>("x")
//!             .parameter::<i32>("y")
//!             .constructor(|args| Ok(Point { x: args.take(0)?, y: args.take(1)? }))
//!             .build()
//!     }
//! }
//!
//! let point: Point = frameconv::from_str(r#"{"Y": 2, "X": 1}"#).unwrap();
//! assert_eq!(point, Point { x: 1, y: 2 });
//! ```

use super::property::{
    DerivedFns, DerivedType, ExtensionData, ExtensionFields, FieldAccessor, Hooks,
};
use super::{
    downcast_mut, downcast_ref, Boxed, Describe, ParameterDescriptor, PropertyDescriptor,
    TypeDescriptor, TypeRef,
};
use crate::converter::{Constructor, Factory, ObjectConverter, PropertyLookup};
use crate::options::NumberHandling;
use crate::{Error, Result, Value, ValueMap};
use std::any::Any;
use std::collections::HashSet;
use std::marker::PhantomData;

/// Positional constructor arguments handed to a constructor function.
///
/// Every slot is filled before the constructor runs: values read from the
/// input, declared defaults, or `None` for optional parameters.
pub struct Arguments<'a> {
    slots: &'a mut [Option<Boxed>],
    parameters: &'a [ParameterDescriptor],
}

impl<'a> Arguments<'a> {
    pub(crate) fn new(slots: &'a mut [Option<Boxed>], parameters: &'a [ParameterDescriptor]) -> Self {
        Arguments { slots, parameters }
    }

    /// Moves the argument at `position` out as `A`.
    pub fn take<A: 'static>(&mut self, position: usize) -> Result<A> {
        let name = self
            .parameters
            .get(position)
            .map_or("?", |parameter| parameter.name.as_str());
        let slot = self.slots.get_mut(position).ok_or_else(|| {
            Error::configuration(format!("no constructor parameter at position {}", position))
        })?;
        let value = slot
            .take()
            .ok_or_else(|| Error::custom(format!("argument '{}' was already taken", name)))?;
        value
            .downcast::<A>()
            .map(|value| *value)
            .map_err(|_| Error::type_mismatch(&super::short_type_name::<A>(), format!("argument '{}'", name)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Builds the descriptor of an object type `T`.
///
/// Modifiers such as [`required`](Self::required) apply to the property
/// declared last. Binding errors are reported by [`build`](Self::build).
pub struct ObjectBuilder<T> {
    name: String,
    factory: Option<Factory>,
    properties: Vec<PropertyDescriptor>,
    parameters: Vec<ParameterDescriptor>,
    constructor: Option<Constructor>,
    extension: Option<ExtensionData>,
    hooks: Hooks,
    derived: Vec<DerivedType>,
    case_insensitive: bool,
    errors: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ObjectBuilder<T> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ObjectBuilder {
            name: name.into(),
            factory: None,
            properties: Vec::new(),
            parameters: Vec::new(),
            constructor: None,
            extension: None,
            hooks: Hooks::default(),
            derived: Vec::new(),
            case_insensitive: false,
            errors: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Creates instances with `T::default()`.
    #[must_use]
    pub fn with_default(self) -> Self
    where
        T: Default,
    {
        self.factory(T::default)
    }

    /// Creates instances with a parameterless factory.
    #[must_use]
    pub fn factory(mut self, factory: fn() -> T) -> Self {
        self.factory = Some(Box::new(move || Box::new(factory()) as Boxed));
        self
    }

    /// Declares a readable and assignable property.
    #[must_use]
    pub fn property<P: Describe>(
        self,
        name: impl Into<String>,
        get: fn(&T) -> &P,
        set: fn(&mut T, P),
    ) -> Self {
        self.push_property::<P>(name.into(), get, Some(set))
    }

    /// Declares a property that is written but never assigned after
    /// construction. Constructor-bound properties are usually read-only.
    #[must_use]
    pub fn read_only<P: Describe>(self, name: impl Into<String>, get: fn(&T) -> &P) -> Self {
        self.push_property::<P>(name.into(), get, None)
    }

    fn push_property<P: Describe>(
        mut self,
        name: String,
        get: fn(&T) -> &P,
        set: Option<fn(&mut T, P)>,
    ) -> Self {
        self.properties.push(PropertyDescriptor {
            name,
            ty: TypeRef::of::<P>(),
            access: Box::new(FieldAccessor { get, set }),
            required: false,
            number_handling: None,
            parameter: None,
        });
        self
    }

    /// Marks the last declared property as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        match self.properties.last_mut() {
            Some(property) => property.required = true,
            None => self.errors.push("required() called before any property".to_string()),
        }
        self
    }

    /// Overrides number handling for the last declared property.
    #[must_use]
    pub fn number_handling(mut self, handling: NumberHandling) -> Self {
        match self.properties.last_mut() {
            Some(property) => property.number_handling = Some(handling),
            None => self
                .errors
                .push("number_handling() called before any property".to_string()),
        }
        self
    }

    /// Declares the next positional constructor parameter.
    ///
    /// The parameter binds to the property whose name matches ignoring case.
    /// A missing argument is an error unless the parameter type is an
    /// `Option`.
    #[must_use]
    pub fn parameter<P: Describe>(mut self, name: impl Into<String>) -> Self {
        let position = self.parameters.len();
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            position,
            ty: TypeRef::of::<P>(),
            default: None,
            property: usize::MAX,
        });
        self
    }

    /// Declares a constructor parameter used with `default()` when absent.
    #[must_use]
    pub fn parameter_with_default<P: Describe>(
        mut self,
        name: impl Into<String>,
        default: fn() -> P,
    ) -> Self {
        let position = self.parameters.len();
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            position,
            ty: TypeRef::of::<P>(),
            default: Some(Box::new(move || Box::new(default()) as Boxed)),
            property: usize::MAX,
        });
        self
    }

    /// Sets the parameterized constructor.
    #[must_use]
    pub fn constructor(mut self, constructor: fn(&mut Arguments<'_>) -> Result<T>) -> Self {
        self.constructor = Some(Box::new(move |arguments: &mut Arguments<'_>| {
            constructor(arguments).map(|value| Box::new(value) as Boxed)
        }));
        self
    }

    /// Collects unmapped keys into a [`ValueMap`] member.
    ///
    /// Collected entries are written back after the declared properties.
    #[must_use]
    pub fn extension_data(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> &ValueMap,
        get_mut: fn(&mut T) -> &mut ValueMap,
    ) -> Self {
        self.extension = Some(ExtensionData {
            name: name.into(),
            access: Box::new(ExtensionFields { get, get_mut }),
        });
        self
    }

    #[must_use]
    pub fn on_deserializing(mut self, hook: fn(&mut T) -> Result<()>) -> Self {
        self.hooks.on_deserializing = Some(Box::new(move |object: &mut dyn Any| {
            hook(downcast_mut::<T>(object)?)
        }));
        self
    }

    #[must_use]
    pub fn on_deserialized(mut self, hook: fn(&mut T) -> Result<()>) -> Self {
        self.hooks.on_deserialized = Some(Box::new(move |object: &mut dyn Any| {
            hook(downcast_mut::<T>(object)?)
        }));
        self
    }

    #[must_use]
    pub fn on_serializing(mut self, hook: fn(&T) -> Result<()>) -> Self {
        self.hooks.on_serializing = Some(Box::new(move |object: &dyn Any| {
            hook(downcast_ref::<T>(object)?)
        }));
        self
    }

    #[must_use]
    pub fn on_serialized(mut self, hook: fn(&T) -> Result<()>) -> Self {
        self.hooks.on_serialized = Some(Box::new(move |object: &dyn Any| {
            hook(downcast_ref::<T>(object)?)
        }));
        self
    }

    /// Registers a concrete type selected by the `$type` discriminator.
    ///
    /// `upcast` turns the concrete value into `T`; `downcast` recognizes it
    /// again when writing.
    #[must_use]
    pub fn derived<D: Describe>(
        mut self,
        discriminator: impl Into<String>,
        upcast: fn(D) -> T,
        downcast: fn(&T) -> Option<&D>,
    ) -> Self {
        self.derived.push(DerivedType {
            discriminator: discriminator.into(),
            ty: TypeRef::of::<D>(),
            access: Box::new(DerivedFns { upcast, downcast }),
        });
        self
    }

    /// Matches input keys against property names ignoring case.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Validates the declarations and produces the descriptor.
    ///
    /// Duplicate names, unbound or ambiguously bound constructor parameters
    /// and inconsistent factories are configuration errors.
    pub fn build(mut self) -> Result<TypeDescriptor> {
        if let Some(error) = self.errors.first() {
            return Err(self.error(error));
        }

        let mut lookup = PropertyLookup::new(self.case_insensitive);
        for (index, property) in self.properties.iter().enumerate() {
            if !lookup.insert(&property.name, index) {
                return Err(self.error(&format!("duplicate property '{}'", property.name)));
            }
        }
        if let Some(extension) = &self.extension {
            if lookup.find(&extension.name).is_some() {
                return Err(self.error(&format!(
                    "extension data member '{}' collides with a property",
                    extension.name
                )));
            }
        }

        for position in 0..self.parameters.len() {
            let name = self.parameters[position].name.to_lowercase();
            let matches: Vec<usize> = self
                .properties
                .iter()
                .enumerate()
                .filter(|(_, property)| property.name.to_lowercase() == name)
                .map(|(index, _)| index)
                .collect();
            let index = match matches.as_slice() {
                [index] => *index,
                [] => {
                    return Err(self.error(&format!(
                        "constructor parameter '{}' does not match any property",
                        self.parameters[position].name
                    )));
                }
                _ => {
                    return Err(self.error(&format!(
                        "constructor parameter '{}' matches more than one property",
                        self.parameters[position].name
                    )));
                }
            };
            if let Some(other) = self.properties[index].parameter {
                return Err(self.error(&format!(
                    "constructor parameters '{}' and '{}' both bind to property '{}'",
                    self.parameters[other].name,
                    self.parameters[position].name,
                    self.properties[index].name
                )));
            }
            self.properties[index].parameter = Some(position);
            self.parameters[position].property = index;
        }

        match (&self.constructor, &self.factory) {
            (None, _) if !self.parameters.is_empty() => {
                return Err(self.error("constructor parameters declared without a constructor"));
            }
            (Some(_), Some(_)) => {
                return Err(self.error("both a factory and a constructor were declared"));
            }
            _ => {}
        }

        let mut discriminators = HashSet::new();
        for derived in &self.derived {
            if !discriminators.insert(derived.discriminator.as_str()) {
                return Err(self.error(&format!(
                    "duplicate type discriminator '{}'",
                    derived.discriminator
                )));
            }
        }

        let converter = ObjectConverter {
            type_name: self.name.clone(),
            factory: self.factory,
            properties: self.properties,
            parameters: self.parameters,
            constructor: self.constructor,
            extension: self.extension,
            hooks: self.hooks,
            derived: self.derived,
            lookup,
            value_type: TypeRef::of::<Value>(),
        };
        Ok(TypeDescriptor::object::<T>(&self.name, converter))
    }

    fn error(&self, msg: &str) -> Error {
        Error::configuration(format!("type '{}': {}", self.name, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Pair {
        left: i32,
        right: i32,
    }

    #[test]
    fn test_parameters_bind_ignoring_case() {
        let descriptor = ObjectBuilder::<Pair>::new("Pair")
            .read_only::<i32>("Left", |p| &p.left)
            .read_only::<i32>("Right", |p| &p.right)
            .parameter::<i32>("right")
            .parameter::<i32>("left")
            .constructor(|args| {
                let right = args.take(0)?;
                Ok(Pair { left: args.take(1)?, right })
            })
            .build()
            .unwrap();
        assert_eq!(descriptor.properties()[0].parameter(), Some(1));
        assert_eq!(descriptor.parameters()[0].property(), 1);
    }

    #[test]
    fn test_required_and_defaulted_members_are_reported() {
        let descriptor = ObjectBuilder::<Pair>::new("Pair")
            .read_only::<i32>("left", |p| &p.left)
            .property::<i32>("right", |p| &p.right, |p, v| p.right = v)
            .required()
            .parameter_with_default::<i32>("left", || 0)
            .constructor(|args| Ok(Pair { left: args.take(0)?, right: 0 }))
            .build()
            .unwrap();
        assert!(!descriptor.properties()[0].is_required());
        assert!(descriptor.properties()[1].is_required());
        assert!(descriptor.parameters()[0].has_default());
    }

    #[test]
    fn test_ambiguous_binding_fails_at_build() {
        let err = ObjectBuilder::<Pair>::new("Pair")
            .property::<i32>("value", |p| &p.left, |p, v| p.left = v)
            .property::<i32>("Value", |p| &p.right, |p, v| p.right = v)
            .case_insensitive()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = ObjectBuilder::<Pair>::new("Pair")
            .read_only::<i32>("value", |p| &p.left)
            .read_only::<i32>("Value", |p| &p.right)
            .parameter::<i32>("VALUE")
            .constructor(|args| Ok(Pair { left: args.take(0)?, right: 0 }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("more than one property"));
    }

    #[test]
    fn test_unbound_parameter_fails_at_build() {
        let err = ObjectBuilder::<Pair>::new("Pair")
            .read_only::<i32>("left", |p| &p.left)
            .parameter::<i32>("middle")
            .constructor(|args| Ok(Pair { left: args.take(0)?, right: 0 }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("middle"));
    }

    #[test]
    fn test_duplicate_property_and_factory_conflicts() {
        assert!(ObjectBuilder::<Pair>::new("Pair")
            .with_default()
            .property::<i32>("a", |p| &p.left, |p, v| p.left = v)
            .property::<i32>("a", |p| &p.right, |p, v| p.right = v)
            .build()
            .is_err());
        assert!(ObjectBuilder::<Pair>::new("Pair")
            .with_default()
            .read_only::<i32>("a", |p| &p.left)
            .parameter::<i32>("a")
            .constructor(|args| Ok(Pair { left: args.take(0)?, right: 0 }))
            .build()
            .is_err());
        assert!(ObjectBuilder::<Pair>::new("Pair").required().build().is_err());
    }
}
