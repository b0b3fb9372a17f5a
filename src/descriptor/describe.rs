//! `Describe` implementations for standard and ecosystem types.

use super::{Describe, Registry, TypeDescriptor};
use crate::converter::{AsyncSequence, ValueTreeConverter};
use crate::{Result, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Type name without module paths, e.g. `Vec<i32>` for `alloc::vec::Vec<i32>`.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> String {
    fn flush(out: &mut String, path: &str) {
        out.push_str(path.rsplit("::").next().unwrap_or(path));
    }

    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut path = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            path.push(ch);
        } else {
            flush(&mut out, &path);
            path.clear();
            out.push(ch);
        }
    }
    flush(&mut out, &path);
    out
}

macro_rules! describe_scalars {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe(_: &Registry) -> Result<TypeDescriptor> {
                    Ok(TypeDescriptor::scalar::<$ty>())
                }
            }
        )*
    };
}

describe_scalars!(
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    char,
    String,
    Uuid,
    DateTime<Utc>,
    BigInt,
);

impl Describe for Value {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::value::<Value>(
            "Value",
            Arc::new(ValueTreeConverter),
        ))
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe(registry: &Registry) -> Result<TypeDescriptor> {
        let inner = registry.get::<T>()?;
        TypeDescriptor::optional::<T>(&inner)
    }
}

impl<T: Describe> Describe for Rc<T> {
    fn describe(registry: &Registry) -> Result<TypeDescriptor> {
        let inner = registry.get::<T>()?;
        TypeDescriptor::shared::<T>(&inner)
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::enumerable::<Vec<T>>())
    }
}

impl<T: Describe> Describe for VecDeque<T> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::enumerable::<VecDeque<T>>())
    }
}

impl<T: Describe> Describe for Box<[T]> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::enumerable::<Box<[T]>>())
    }
}

impl<T: Describe + Eq + Hash> Describe for HashSet<T> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::enumerable::<HashSet<T>>())
    }
}

impl<T: Describe + Ord> Describe for BTreeSet<T> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::enumerable::<BTreeSet<T>>())
    }
}

impl<T: Describe> Describe for AsyncSequence<T> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::async_sequence::<T>())
    }
}

impl<K: Describe + Eq + Hash, V: Describe> Describe for HashMap<K, V> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::dictionary::<HashMap<K, V>>())
    }
}

impl<K: Describe + Ord, V: Describe> Describe for BTreeMap<K, V> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::dictionary::<BTreeMap<K, V>>())
    }
}

impl<K: Describe + Eq + Hash, V: Describe> Describe for IndexMap<K, V> {
    fn describe(_: &Registry) -> Result<TypeDescriptor> {
        Ok(TypeDescriptor::dictionary::<IndexMap<K, V>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kind;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Vec<i32>>(), "Vec<i32>");
        assert_eq!(
            short_type_name::<HashMap<String, Option<u8>>>(),
            "HashMap<String, Option<u8>>"
        );
    }

    #[test]
    fn test_wrappers_reuse_inner_converter() {
        let registry = Registry::new();
        let optional = registry.get::<Option<Vec<u8>>>().unwrap();
        assert!(optional.is_nullable());
        assert_eq!(optional.kind(), Kind::Enumerable);
        assert!(registry.get::<Rc<u8>>().is_err());
        assert!(registry.get::<Rc<Vec<u8>>>().unwrap().is_shared());
    }
}
