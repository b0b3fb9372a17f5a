//! # frameconv
//!
//! A resumable, metadata-driven JSON conversion engine.
//!
//! ## What is it?
//!
//! `frameconv` binds JSON text to native Rust types through runtime
//! [`TypeDescriptor`]s instead of generated code. Every conversion runs on an
//! explicit stack of frames, so a read can stop at any token boundary when
//! the input runs out and continue when more bytes arrive, and a write can
//! stop whenever its output buffer should be drained or an asynchronous
//! element is not ready yet.
//!
//! ## Key Features
//!
//! - **Resumable**: [`try_read`] and [`try_write`] return "not finished"
//!   instead of blocking; the state lives in [`ReadStack`]/[`WriteStack`]
//! - **Fast path**: fully buffered documents are converted in one pass
//!   without frame bookkeeping
//! - **Constructors**: objects with parameterized constructors, defaults,
//!   required members and extension data
//! - **Metadata**: `$id`/`$ref` reference preservation, `$type`
//!   polymorphism and `$values` collection wrappers
//! - **Async sequences**: [`AsyncSequence`] elements are written as they
//!   become available, with cancellation
//! - **Located errors**: failures carry the JSON path plus line and byte
//!   offset of the failing element
//!
//! ## Quick Start
//!
//! ### Describing a type
//!
//! ```rust
//! use frameconv::{from_str, to_string, Describe, ObjectBuilder, Registry, Result, TypeDescriptor};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct User {
//!     id: u32,
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! impl Describe for User {
//!     fn describe(_: &Registry) -> Result<TypeDescriptor> {
//!         ObjectBuilder::<User>::new("User")
//!             .with_default()
//!             .property::<u32>("id", |u| &u.id, |u, v| u.id = v)
//!             .required()
//!             .property::<String>("name", |u| &u.name, |u, v| u.name = v)
//!             .property::<Vec<String>>("tags", |u| &u.tags, |u, v| u.tags = v)
//!             .build()
//!     }
//! }
//!
//! let user: User = from_str(r#"{"id": 7, "name": "Ada", "tags": ["admin"]}"#).unwrap();
//! assert_eq!(user.tags, vec!["admin".to_string()]);
//! assert_eq!(to_string(&user).unwrap(), r#"{"id":7,"name":"Ada","tags":["admin"]}"#);
//! ```
//!
//! ### Streaming input
//!
//! ```rust
//! use frameconv::reader::TokenReader;
//! use frameconv::{try_read, ConvertOptions, ReadStack};
//!
//! let options = ConvertOptions::default();
//! let descriptor = options.registry.get::<Vec<i64>>().unwrap();
//! let mut stack = ReadStack::new(options);
//!
//! let input = b"[1, 2, 3]";
//! let mut reader = TokenReader::new(&input[..5], false);
//! assert!(try_read(&descriptor, &mut reader, &mut stack).unwrap().is_none());
//! let consumed = reader.bytes_consumed();
//! let state = reader.into_state();
//!
//! // Unconsumed bytes are handed back with the rest of the input.
//! let mut reader = TokenReader::with_state(&input[consumed..], true, state);
//! let value = try_read(&descriptor, &mut reader, &mut stack).unwrap().unwrap();
//! assert_eq!(*value.downcast::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
//! ```
//!
//! The [`de::StreamDeserializer`] and [`ser::StreamSerializer`] drivers wrap
//! this loop, including the carry-over of partial tokens.
//!
//! ### Dynamic values with `value!`
//!
//! ```rust
//! use frameconv::{value, Value};
//!
//! let data = value!({
//!     "name": "Alice",
//!     "tags": ["rust", "json"]
//! });
//!
//! if let Value::Object(obj) = data {
//!     assert_eq!(obj.get("name").and_then(|v| v.as_str()), Some("Alice"));
//! }
//! ```
//!
//! ## Safety Guarantees
//!
//! - No `unsafe` code blocks
//! - Nesting is bounded by [`ConvertOptions::max_depth`]
//! - Pooled scratch buffers are returned on every exit path

pub mod converter;
pub mod de;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod macros;
pub mod map;
mod metadata;
pub mod options;
pub mod pool;
pub mod reader;
mod reference;
pub mod ser;
pub mod stack;
pub mod value;
pub mod writer;

pub use converter::{
    AsyncSequence, CancellationToken, CollectionShape, Converter, DictionaryShape, Scalar,
    ValueConverter,
};
pub use de::{from_reader_with_options, from_slice_with_options, StreamDeserializer};
pub use descriptor::{
    Arguments, Describe, Kind, ObjectBuilder, Registry, TypeDescriptor, TypeRef,
};
pub use engine::{try_read, try_write};
pub use error::{Error, Result};
pub use map::ValueMap;
pub use options::{ConvertOptions, NumberHandling, ReferenceHandling, UnmappedMemberHandling};
pub use ser::{to_async_writer, to_vec_with_options, to_writer_with_options, StreamSerializer};
pub use stack::{ReadStack, WriteStack};
pub use value::{Number, Value};

use std::io;

/// Writes any `T: Describe` as a JSON string.
///
/// # Examples
///
/// ```rust
/// use frameconv::to_string;
/// use std::collections::BTreeMap;
///
/// let mut scores = BTreeMap::new();
/// scores.insert("b".to_string(), 2u8);
/// scores.insert("a".to_string(), 1u8);
/// assert_eq!(to_string(&scores).unwrap(), r#"{"a":1,"b":2}"#);
/// ```
///
/// # Errors
///
/// Returns an error if the value cannot be written.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn to_string<T: Describe>(value: &T) -> Result<String> {
    to_string_with_options(value, &ConvertOptions::default())
}

/// Writes any `T: Describe` as a JSON string with custom options.
///
/// # Examples
///
/// ```rust
/// use frameconv::{to_string_with_options, ConvertOptions, NumberHandling};
///
/// let options = ConvertOptions::new().with_number_handling(NumberHandling::WriteAsString);
/// assert_eq!(to_string_with_options(&vec![1u8, 2], &options).unwrap(), r#"["1","2"]"#);
/// ```
///
/// # Errors
///
/// Returns an error if the value cannot be written.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn to_string_with_options<T: Describe>(value: &T, options: &ConvertOptions) -> Result<String> {
    let bytes = to_vec_with_options(value, options)?;
    String::from_utf8(bytes).map_err(|e| Error::custom(e.to_string()))
}

/// Writes any `T: Describe` as JSON bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be written.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn to_vec<T: Describe>(value: &T) -> Result<Vec<u8>> {
    to_vec_with_options(value, &ConvertOptions::default())
}

/// Writes any `T: Describe` into an I/O sink.
///
/// # Examples
///
/// ```rust
/// use frameconv::to_writer;
///
/// let mut buffer = Vec::new();
/// to_writer(&mut buffer, &vec![Some(1u8), None]).unwrap();
/// assert_eq!(buffer, b"[1,null]");
/// ```
///
/// # Errors
///
/// Returns an error if the value cannot be written or the sink fails.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn to_writer<W, T>(writer: W, value: &T) -> Result<()>
where
    W: io::Write,
    T: Describe,
{
    to_writer_with_options(writer, value, &ConvertOptions::default())
}

/// Converts any `T: Describe` into a [`Value`] tree.
///
/// # Examples
///
/// ```rust
/// use frameconv::{to_value, Value};
///
/// let value = to_value(&vec![true]).unwrap();
/// assert_eq!(value, Value::Array(vec![Value::Bool(true)]));
/// ```
///
/// # Errors
///
/// Returns an error if the value cannot be written.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn to_value<T: Describe>(value: &T) -> Result<Value> {
    from_slice(&to_vec(value)?)
}

/// Binds a [`Value`] tree to any `T: Describe`.
///
/// # Errors
///
/// Returns an error if the tree cannot be bound to `T`.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn from_value<T: Describe>(value: &Value) -> Result<T> {
    from_slice(&to_vec(value)?)
}

/// Reads an instance of type `T` from a string of JSON text.
///
/// # Examples
///
/// ```rust
/// use frameconv::from_str;
/// use std::collections::HashMap;
///
/// let map: HashMap<String, Vec<u8>> = from_str(r#"{"a": [1, 2]}"#).unwrap();
/// assert_eq!(map["a"], vec![1, 2]);
/// ```
///
/// # Errors
///
/// Returns an error if the input is not valid JSON or cannot be bound to
/// `T`. Error messages include the element path, line and byte offset.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn from_str<T: Describe>(s: &str) -> Result<T> {
    from_slice(s.as_bytes())
}

/// Reads an instance of type `T` from bytes of JSON text.
///
/// # Errors
///
/// Returns an error if the bytes are not valid UTF-8 JSON or cannot be bound
/// to `T`.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn from_slice<T: Describe>(v: &[u8]) -> Result<T> {
    from_slice_with_options(v, &ConvertOptions::default())
}

/// Reads an instance of type `T` from an I/O stream, chunk by chunk.
///
/// # Examples
///
/// ```rust
/// use frameconv::from_reader;
/// use std::io::Cursor;
///
/// let values: Vec<String> = from_reader(Cursor::new(br#"["x", "y"]"#)).unwrap();
/// assert_eq!(values, vec!["x".to_string(), "y".to_string()]);
/// ```
///
/// # Errors
///
/// Returns an error if reading fails, the input is not valid JSON, or the
/// data cannot be bound to `T`.
#[must_use = "this returns the result of the operation, errors must be handled"]
pub fn from_reader<R, T>(reader: R) -> Result<T>
where
    R: io::Read,
    T: Describe,
{
    from_reader_with_options(reader, &ConvertOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl Describe for Point {
        fn describe(_: &Registry) -> Result<TypeDescriptor> {
            ObjectBuilder::<Point>::new("Point")
                .read_only::<i32>("X", |p| &p.x)
                .read_only::<i32>("Y", |p| &p.y)
                .parameter::<i32>("x")
                .parameter::<i32>("y")
                .constructor(|args| Ok(Point { x: args.take(0)?, y: args.take(1)? }))
                .build()
        }
    }

    #[test]
    fn test_write_read_point() {
        let point = Point { x: 1, y: 2 };
        let json = to_string(&point).unwrap();
        assert_eq!(json, r#"{"X":1,"Y":2}"#);
        let point_back: Point = from_str(&json).unwrap();
        assert_eq!(point, point_back);
    }

    #[test]
    fn test_to_value() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), 1i64);
        let value = to_value(&map).unwrap();

        match value {
            Value::Object(obj) => {
                assert_eq!(obj.get("x"), Some(&Value::Number(Number::Integer(1))));
            }
            _ => panic!("Expected object"),
        }
    }

    #[test]
    fn test_from_value() {
        let value = value!({ "Y": 4, "X": 3 });
        let point: Point = from_value(&value).unwrap();
        assert_eq!(point, Point { x: 3, y: 4 });
    }

    #[test]
    fn test_arrays() {
        let numbers = vec![1, 2, 3, 4, 5];
        let json = to_string(&numbers).unwrap();
        let numbers_back: Vec<i32> = from_str(&json).unwrap();
        assert_eq!(numbers, numbers_back);
    }

    #[test]
    fn test_reader_and_writer() {
        let mut buffer = Vec::new();
        to_writer(&mut buffer, &Point { x: -5, y: 0 }).unwrap();
        let point: Point = from_reader(&buffer[..]).unwrap();
        assert_eq!(point, Point { x: -5, y: 0 });
    }
}
