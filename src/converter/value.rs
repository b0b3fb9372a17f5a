//! Leaf converters.
//!
//! Scalars implement the small [`Scalar`] trait and are adapted to
//! [`ValueConverter`] by [`ScalarConverter`]. Dynamic [`Value`] trees and
//! unit enums have dedicated converters.

use super::{ValueContext, ValueConverter};
use crate::descriptor::{downcast_ref, Boxed};
use crate::options::NumberHandling;
use crate::reader::{TokenReader, TokenType};
use crate::writer::TokenWriter;
use crate::{Error, Number, Result, Value, ValueMap};
use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint::BigInt;
use std::any::Any;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// A native type converted from a single token.
pub trait Scalar: Sized + 'static {
    const NAME: &'static str;

    fn read_token(reader: &TokenReader<'_>, handling: NumberHandling) -> Result<Self>;

    fn write_token(&self, writer: &mut TokenWriter, handling: NumberHandling) -> Result<()>;

    /// Parses the scalar from a dictionary key.
    fn from_key(_text: &str) -> Result<Self> {
        Err(Error::configuration(format!(
            "{} cannot be used as a dictionary key",
            Self::NAME
        )))
    }

    /// Formats the scalar as a dictionary key.
    fn to_key(&self) -> Result<String> {
        Err(Error::configuration(format!(
            "{} cannot be used as a dictionary key",
            Self::NAME
        )))
    }
}

/// Adapts a [`Scalar`] to [`ValueConverter`].
pub struct ScalarConverter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScalarConverter<T> {
    #[must_use]
    pub fn new() -> Self {
        ScalarConverter {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ScalarConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> ValueConverter for ScalarConverter<T> {
    fn read(&self, reader: &mut TokenReader<'_>, ctx: &ValueContext) -> Result<Boxed> {
        Ok(Box::new(T::read_token(reader, ctx.number_handling)?))
    }

    fn write(&self, value: &dyn Any, writer: &mut TokenWriter, ctx: &ValueContext) -> Result<()> {
        downcast_ref::<T>(value)?.write_token(writer, ctx.number_handling)
    }

    fn read_property_name(&self, name: &str, _ctx: &ValueContext) -> Result<Boxed> {
        Ok(Box::new(T::from_key(name)?))
    }

    fn write_property_name(&self, value: &dyn Any, _ctx: &ValueContext) -> Result<String> {
        downcast_ref::<T>(value)?.to_key()
    }
}

fn numeric_text<'a>(
    reader: &TokenReader<'a>,
    handling: NumberHandling,
    name: &str,
) -> Result<Cow<'a, str>> {
    match reader.token_type() {
        TokenType::Number => Ok(Cow::Borrowed(reader.number_text()?)),
        TokenType::String if handling.allows_reading_from_string() => reader.get_str(),
        other => Err(Error::unexpected_token(name, other)),
    }
}

fn parse_text<T: FromStr>(text: &str, name: &str) -> Result<T> {
    text.parse::<T>()
        .map_err(|_| Error::type_mismatch(name, format!("'{}'", text)))
}

fn string_token<'a>(reader: &TokenReader<'a>, name: &str) -> Result<Cow<'a, str>> {
    match reader.token_type() {
        TokenType::String => reader.get_str(),
        other => Err(Error::unexpected_token(name, other)),
    }
}

macro_rules! integer_scalars {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const NAME: &'static str = stringify!($ty);

                fn read_token(reader: &TokenReader<'_>, handling: NumberHandling) -> Result<Self> {
                    let text = numeric_text(reader, handling, Self::NAME)?;
                    parse_text(&text, Self::NAME)
                }

                fn write_token(&self, writer: &mut TokenWriter, handling: NumberHandling) -> Result<()> {
                    if handling.writes_as_string() {
                        writer.write_string(&self.to_string())
                    } else {
                        writer.write_number_text(&self.to_string())
                    }
                }

                fn from_key(text: &str) -> Result<Self> {
                    parse_text(text, Self::NAME)
                }

                fn to_key(&self) -> Result<String> {
                    Ok(self.to_string())
                }
            }
        )*
    };
}

integer_scalars!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! float_scalars {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const NAME: &'static str = stringify!($ty);

                fn read_token(reader: &TokenReader<'_>, handling: NumberHandling) -> Result<Self> {
                    let text = numeric_text(reader, handling, Self::NAME)?;
                    parse_text(&text, Self::NAME)
                }

                fn write_token(&self, writer: &mut TokenWriter, handling: NumberHandling) -> Result<()> {
                    if handling.writes_as_string() {
                        writer.write_string(&self.to_string())
                    } else if self.is_finite() {
                        writer.write_number_text(&self.to_string())
                    } else {
                        Err(Error::custom(format!("{} is not a valid JSON number", self)))
                    }
                }
            }
        )*
    };
}

float_scalars!(f32, f64);

impl Scalar for bool {
    const NAME: &'static str = "bool";

    fn read_token(reader: &TokenReader<'_>, _handling: NumberHandling) -> Result<Self> {
        reader.get_bool()
    }

    fn write_token(&self, writer: &mut TokenWriter, _handling: NumberHandling) -> Result<()> {
        writer.write_bool(*self)
    }

    fn from_key(text: &str) -> Result<Self> {
        parse_text(text, Self::NAME)
    }

    fn to_key(&self) -> Result<String> {
        Ok(self.to_string())
    }
}

impl Scalar for char {
    const NAME: &'static str = "char";

    fn read_token(reader: &TokenReader<'_>, _handling: NumberHandling) -> Result<Self> {
        Self::from_key(&string_token(reader, Self::NAME)?)
    }

    fn write_token(&self, writer: &mut TokenWriter, _handling: NumberHandling) -> Result<()> {
        let mut buf = [0u8; 4];
        writer.write_string(self.encode_utf8(&mut buf))
    }

    fn from_key(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Ok(ch),
            _ => Err(Error::type_mismatch("char", format!("'{}'", text))),
        }
    }

    fn to_key(&self) -> Result<String> {
        Ok(self.to_string())
    }
}

impl Scalar for String {
    const NAME: &'static str = "String";

    fn read_token(reader: &TokenReader<'_>, _handling: NumberHandling) -> Result<Self> {
        Ok(string_token(reader, Self::NAME)?.into_owned())
    }

    fn write_token(&self, writer: &mut TokenWriter, _handling: NumberHandling) -> Result<()> {
        writer.write_string(self)
    }

    fn from_key(text: &str) -> Result<Self> {
        Ok(text.to_string())
    }

    fn to_key(&self) -> Result<String> {
        Ok(self.clone())
    }
}

impl Scalar for Uuid {
    const NAME: &'static str = "Uuid";

    fn read_token(reader: &TokenReader<'_>, _handling: NumberHandling) -> Result<Self> {
        Self::from_key(&string_token(reader, Self::NAME)?)
    }

    fn write_token(&self, writer: &mut TokenWriter, _handling: NumberHandling) -> Result<()> {
        writer.write_string(&self.to_string())
    }

    fn from_key(text: &str) -> Result<Self> {
        Uuid::parse_str(text).map_err(|_| Error::type_mismatch("Uuid", format!("'{}'", text)))
    }

    fn to_key(&self) -> Result<String> {
        Ok(self.to_string())
    }
}

impl Scalar for DateTime<Utc> {
    const NAME: &'static str = "DateTime";

    fn read_token(reader: &TokenReader<'_>, _handling: NumberHandling) -> Result<Self> {
        Self::from_key(&string_token(reader, Self::NAME)?)
    }

    fn write_token(&self, writer: &mut TokenWriter, _handling: NumberHandling) -> Result<()> {
        writer.write_string(&self.to_key()?)
    }

    fn from_key(text: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(text)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|_| Error::type_mismatch("RFC 3339 date-time", format!("'{}'", text)))
    }

    fn to_key(&self) -> Result<String> {
        Ok(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Scalar for BigInt {
    const NAME: &'static str = "BigInt";

    fn read_token(reader: &TokenReader<'_>, handling: NumberHandling) -> Result<Self> {
        let text = numeric_text(reader, handling, Self::NAME)?;
        parse_text(&text, Self::NAME)
    }

    fn write_token(&self, writer: &mut TokenWriter, handling: NumberHandling) -> Result<()> {
        if handling.writes_as_string() {
            writer.write_string(&self.to_string())
        } else {
            writer.write_number_text(&self.to_string())
        }
    }

    fn from_key(text: &str) -> Result<Self> {
        parse_text(text, Self::NAME)
    }

    fn to_key(&self) -> Result<String> {
        Ok(self.to_string())
    }
}

/// Converts arbitrary subtrees to and from [`Value`].
pub struct ValueTreeConverter;

enum OpenNode {
    Array(Vec<Value>),
    Object(ValueMap, Option<String>),
}

enum OpenIter<'v> {
    Array(std::slice::Iter<'v, Value>),
    Object(indexmap::map::Iter<'v, String, Value>),
}

impl ValueTreeConverter {
    fn read_tree(reader: &mut TokenReader<'_>, max_depth: usize) -> Result<Value> {
        let mut open: Vec<OpenNode> = Vec::new();
        loop {
            let completed = match reader.token_type() {
                TokenType::StartObject => {
                    open.push(OpenNode::Object(ValueMap::new(), None));
                    None
                }
                TokenType::StartArray => {
                    open.push(OpenNode::Array(Vec::new()));
                    None
                }
                TokenType::PropertyName => {
                    let name = reader.get_str()?.into_owned();
                    if let Some(OpenNode::Object(_, key)) = open.last_mut() {
                        *key = Some(name);
                    }
                    None
                }
                TokenType::EndObject | TokenType::EndArray => match open.pop() {
                    Some(OpenNode::Object(map, _)) => Some(Value::Object(map)),
                    Some(OpenNode::Array(items)) => Some(Value::Array(items)),
                    None => return Err(Error::unexpected_token("value", reader.token_type())),
                },
                TokenType::Null => Some(Value::Null),
                TokenType::True => Some(Value::Bool(true)),
                TokenType::False => Some(Value::Bool(false)),
                TokenType::Number => Some(Value::Number(reader.number_text()?.parse::<Number>()?)),
                TokenType::String => Some(Value::String(reader.get_str()?.into_owned())),
                TokenType::None => return Err(Error::unexpected_token("value", TokenType::None)),
            };
            if reader.current_depth() > max_depth {
                return Err(Error::DepthExceeded { max: max_depth });
            }
            if let Some(value) = completed {
                match open.last_mut() {
                    None => return Ok(value),
                    Some(OpenNode::Array(items)) => items.push(value),
                    Some(OpenNode::Object(map, key)) => {
                        let key = key
                            .take()
                            .ok_or_else(|| Error::unexpected_token("property name", "value"))?;
                        map.insert(key, value);
                    }
                }
            }
            if !reader.read()? {
                return Err(Error::unexpected_end("value was not fully buffered"));
            }
        }
    }

    fn write_tree(value: &Value, writer: &mut TokenWriter, max_depth: usize) -> Result<()> {
        let mut open: Vec<OpenIter<'_>> = Vec::new();
        let mut next = Some(value);
        loop {
            if let Some(value) = next.take() {
                match value {
                    Value::Array(items) => {
                        writer.write_start_array()?;
                        open.push(OpenIter::Array(items.iter()));
                    }
                    Value::Object(map) => {
                        writer.write_start_object()?;
                        open.push(OpenIter::Object(map.iter()));
                    }
                    leaf => Self::write_leaf(leaf, writer)?,
                }
                if writer.depth() > max_depth {
                    return Err(Error::DepthExceeded { max: max_depth });
                }
            }
            let Some(top) = open.last_mut() else {
                return Ok(());
            };
            match top {
                OpenIter::Array(items) => match items.next() {
                    Some(item) => next = Some(item),
                    None => {
                        open.pop();
                        writer.write_end_array()?;
                    }
                },
                OpenIter::Object(members) => match members.next() {
                    Some((key, item)) => {
                        writer.write_property_name(key)?;
                        next = Some(item);
                    }
                    None => {
                        open.pop();
                        writer.write_end_object()?;
                    }
                },
            }
        }
    }

    fn write_leaf(value: &Value, writer: &mut TokenWriter) -> Result<()> {
        match value {
            Value::Null => writer.write_null(),
            Value::Bool(b) => writer.write_bool(*b),
            Value::Number(Number::Integer(i)) => writer.write_i64(*i),
            Value::Number(Number::Float(f)) => writer.write_f64(*f),
            Value::Number(Number::Big(b)) => writer.write_number_text(&b.to_string()),
            Value::String(s) => writer.write_string(s),
            Value::Array(_) | Value::Object(_) => {
                Err(Error::configuration("container written as a leaf"))
            }
        }
    }
}

impl ValueConverter for ValueTreeConverter {
    fn read(&self, reader: &mut TokenReader<'_>, ctx: &ValueContext) -> Result<Boxed> {
        Ok(Box::new(Self::read_tree(reader, ctx.max_depth)?))
    }

    fn write(&self, value: &dyn Any, writer: &mut TokenWriter, ctx: &ValueContext) -> Result<()> {
        Self::write_tree(downcast_ref::<Value>(value)?, writer, ctx.max_depth)
    }

    fn handles_null(&self) -> bool {
        true
    }

    fn requires_read_ahead(&self) -> bool {
        true
    }
}

/// Converts a fieldless enum to and from its variant names.
pub struct UnitEnumConverter<E: 'static> {
    type_name: String,
    variants: &'static [(&'static str, E)],
}

impl<E: Copy + PartialEq + 'static> UnitEnumConverter<E> {
    #[must_use]
    pub fn new(type_name: &str, variants: &'static [(&'static str, E)]) -> Self {
        UnitEnumConverter {
            type_name: type_name.to_string(),
            variants,
        }
    }

    fn parse(&self, text: &str) -> Result<E> {
        self.variants
            .iter()
            .find(|(name, _)| *name == text)
            .map(|(_, variant)| *variant)
            .ok_or_else(|| Error::type_mismatch(&self.type_name, format!("'{}'", text)))
    }

    fn format(&self, value: &dyn Any) -> Result<&'static str> {
        let value = downcast_ref::<E>(value)?;
        self.variants
            .iter()
            .find(|(_, variant)| variant == value)
            .map(|(name, _)| *name)
            .ok_or_else(|| {
                Error::configuration(format!("variant of '{}' has no name", self.type_name))
            })
    }
}

impl<E: Copy + PartialEq + Send + Sync + 'static> ValueConverter for UnitEnumConverter<E> {
    fn read(&self, reader: &mut TokenReader<'_>, _ctx: &ValueContext) -> Result<Boxed> {
        let text = string_token(reader, &self.type_name)?;
        Ok(Box::new(self.parse(&text)?))
    }

    fn write(&self, value: &dyn Any, writer: &mut TokenWriter, _ctx: &ValueContext) -> Result<()> {
        writer.write_string(self.format(value)?)
    }

    fn read_property_name(&self, name: &str, _ctx: &ValueContext) -> Result<Boxed> {
        Ok(Box::new(self.parse(name)?))
    }

    fn write_property_name(&self, value: &dyn Any, _ctx: &ValueContext) -> Result<String> {
        self.format(value).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(number_handling: NumberHandling) -> ValueContext {
        ValueContext {
            number_handling,
            max_depth: 8,
        }
    }

    fn read_one<T: Scalar>(input: &str, handling: NumberHandling) -> Result<T> {
        let mut reader = TokenReader::new(input.as_bytes(), true);
        assert!(reader.read().unwrap());
        T::read_token(&reader, handling)
    }

    #[test]
    fn test_numbers_from_strings_need_opt_in() {
        assert_eq!(read_one::<i32>("42", NumberHandling::Strict).unwrap(), 42);
        assert!(read_one::<i32>(r#""42""#, NumberHandling::Strict).is_err());
        assert_eq!(
            read_one::<i32>(r#""42""#, NumberHandling::AllowReadingFromString).unwrap(),
            42
        );
        assert!(read_one::<u8>("300", NumberHandling::Strict).is_err());
        assert!(read_one::<i64>("1.5", NumberHandling::Strict).is_err());
    }

    #[test]
    fn test_write_as_string() {
        let mut writer = TokenWriter::new(64);
        7u16.write_token(&mut writer, NumberHandling::WriteAsString)
            .unwrap();
        assert_eq!(writer.output(), br#""7""#);
    }

    #[test]
    fn test_keys_round_trip() {
        let id = Uuid::from_u128(0x1234);
        assert_eq!(Uuid::from_key(&id.to_key().unwrap()).unwrap(), id);
        assert_eq!(i16::from_key("-3").unwrap(), -3);
        assert!(f64::from_key("1.0").is_err());
        let date = DateTime::<Utc>::from_key("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(date.to_key().unwrap(), "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_value_tree_reads_subtree() {
        let mut reader = TokenReader::new(br#"{"a": [1, {"b": null}], "c": "x"}"#, true);
        assert!(reader.read().unwrap());
        let value = ValueTreeConverter
            .read(&mut reader, &ctx(NumberHandling::Strict))
            .unwrap();
        let value = value.downcast::<Value>().unwrap();
        assert_eq!(value.to_string(), r#"{"a":[1,{"b":null}],"c":"x"}"#);
        assert_eq!(reader.token_type(), TokenType::EndObject);
    }

    #[test]
    fn test_value_tree_depth_limit() {
        let mut reader = TokenReader::new(b"[[[[1]]]]", true);
        assert!(reader.read().unwrap());
        let err = ValueTreeConverter
            .read(
                &mut reader,
                &ValueContext {
                    number_handling: NumberHandling::Strict,
                    max_depth: 3,
                },
            )
            .unwrap_err();
        assert!(err.is_capacity());
    }

    #[test]
    fn test_value_tree_write_depth_limit() {
        let mut tree = Value::from(1);
        for _ in 0..4 {
            tree = Value::Array(vec![tree]);
        }
        let limited = ValueContext {
            number_handling: NumberHandling::Strict,
            max_depth: 3,
        };
        let mut writer = TokenWriter::new(1024);
        let err = ValueTreeConverter.write(&tree, &mut writer, &limited).unwrap_err();
        assert!(err.is_capacity());

        let mut writer = TokenWriter::new(1024);
        ValueTreeConverter
            .write(&tree, &mut writer, &ctx(NumberHandling::Strict))
            .unwrap();
        assert_eq!(writer.take_output(), b"[[[[1]]]]");
    }

    #[test]
    fn test_unit_enum_names() {
        #[derive(Clone, Copy, PartialEq, Debug)]
        enum Level {
            Low,
            High,
        }
        static LEVELS: [(&str, Level); 2] = [("low", Level::Low), ("high", Level::High)];
        let converter = UnitEnumConverter::new("Level", &LEVELS);
        let key = converter
            .read_property_name("high", &ctx(NumberHandling::Strict))
            .unwrap();
        assert_eq!(*key.downcast::<Level>().unwrap(), Level::High);
        assert!(converter
            .read_property_name("mid", &ctx(NumberHandling::Strict))
            .is_err());
    }
}
