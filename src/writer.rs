//! Token emitter producing compact JSON text.
//!
//! [`TokenWriter`] buffers its output in memory. Converters ask
//! [`TokenWriter::should_flush`] after each unit of work; when it reports
//! `true` the engine suspends and the caller drains the buffer with
//! [`TokenWriter::take_output`] before resuming.
//!
//! ```rust
//! use frameconv::writer::TokenWriter;
//!
//! let mut writer = TokenWriter::new(1024);
//! writer.write_start_object().unwrap();
//! writer.write_property_name("a").unwrap();
//! writer.write_i64(1).unwrap();
//! writer.write_property_name("b").unwrap();
//! writer.write_string("x\"y").unwrap();
//! writer.write_end_object().unwrap();
//! assert_eq!(writer.output(), br#"{"a":1,"b":"x\"y"}"#);
//! ```

use crate::{Error, Result};
use std::fmt::Write as _;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Object,
    Array,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    scope: Scope,
    has_items: bool,
    after_name: bool,
}

/// A buffered JSON emitter.
#[derive(Debug)]
pub struct TokenWriter {
    output: Vec<u8>,
    scopes: Vec<Frame>,
    flush_threshold: usize,
    root_written: bool,
    bytes_flushed: usize,
}

impl TokenWriter {
    /// Creates a writer that requests a flush once `flush_threshold` bytes
    /// are pending.
    #[must_use]
    pub fn new(flush_threshold: usize) -> Self {
        TokenWriter {
            output: Vec::with_capacity(flush_threshold.min(256)),
            scopes: Vec::new(),
            flush_threshold: flush_threshold.max(1),
            root_written: false,
            bytes_flushed: 0,
        }
    }

    /// Pending output not yet drained.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drains the pending output.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.bytes_flushed += self.output.len();
        std::mem::take(&mut self.output)
    }

    /// Returns `true` when the pending output should be drained.
    #[must_use]
    pub fn should_flush(&self) -> bool {
        self.output.len() >= self.flush_threshold
    }

    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.output.len()
    }

    /// Total bytes written so far, drained or not.
    #[must_use]
    pub fn bytes_committed(&self) -> usize {
        self.bytes_flushed + self.output.len()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn before_value(&mut self) -> Result<()> {
        match self.scopes.last_mut() {
            None => {
                if self.root_written {
                    return Err(Error::custom("a root value was already written"));
                }
                Ok(())
            }
            Some(frame) => match frame.scope {
                Scope::Object => {
                    if !frame.after_name {
                        return Err(Error::custom("property name expected before value"));
                    }
                    frame.after_name = false;
                    Ok(())
                }
                Scope::Array => {
                    if frame.has_items {
                        self.output.push(b',');
                    }
                    frame.has_items = true;
                    Ok(())
                }
            },
        }
    }

    fn after_value(&mut self) {
        if self.scopes.is_empty() {
            self.root_written = true;
        }
    }

    pub fn write_start_object(&mut self) -> Result<()> {
        self.before_value()?;
        self.output.push(b'{');
        self.scopes.push(Frame {
            scope: Scope::Object,
            has_items: false,
            after_name: false,
        });
        Ok(())
    }

    pub fn write_end_object(&mut self) -> Result<()> {
        self.end_scope(Scope::Object)?;
        self.output.push(b'}');
        self.after_value();
        Ok(())
    }

    pub fn write_start_array(&mut self) -> Result<()> {
        self.before_value()?;
        self.output.push(b'[');
        self.scopes.push(Frame {
            scope: Scope::Array,
            has_items: false,
            after_name: false,
        });
        Ok(())
    }

    pub fn write_end_array(&mut self) -> Result<()> {
        self.end_scope(Scope::Array)?;
        self.output.push(b']');
        self.after_value();
        Ok(())
    }

    fn end_scope(&mut self, scope: Scope) -> Result<()> {
        match self.scopes.pop() {
            Some(frame) if frame.scope == scope && !frame.after_name => Ok(()),
            _ => Err(Error::custom("mismatched end token")),
        }
    }

    pub fn write_property_name(&mut self, name: &str) -> Result<()> {
        let Some(frame) = self.scopes.last_mut() else {
            return Err(Error::custom("property name outside of an object"));
        };
        if frame.scope != Scope::Object || frame.after_name {
            return Err(Error::custom("property name not allowed here"));
        }
        if frame.has_items {
            self.output.push(b',');
        }
        frame.has_items = true;
        frame.after_name = true;
        write_escaped(&mut self.output, name);
        self.output.push(b':');
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.before_value()?;
        write_escaped(&mut self.output, value);
        self.after_value();
        Ok(())
    }

    /// Writes pre-validated number text.
    pub fn write_number_text(&mut self, text: &str) -> Result<()> {
        self.before_value()?;
        self.output.extend_from_slice(text.as_bytes());
        self.after_value();
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_number_text(&value.to_string())
    }

    /// Writes a float. Non-finite values have no JSON representation.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::custom(format!(
                "{} is not a valid JSON number",
                value
            )));
        }
        let mut text = String::new();
        let _ = write!(text, "{}", value);
        self.write_number_text(&text)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.before_value()?;
        self.output
            .extend_from_slice(if value { b"true" } else { b"false" });
        self.after_value();
        Ok(())
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.before_value()?;
        self.output.extend_from_slice(b"null");
        self.after_value();
        Ok(())
    }
}

fn write_escaped(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{0008}' => out.extend_from_slice(b"\\b"),
            '\u{000C}' => out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_commas() {
        let mut writer = TokenWriter::new(64);
        writer.write_start_array().unwrap();
        writer.write_i64(1).unwrap();
        writer.write_start_object().unwrap();
        writer.write_property_name("k").unwrap();
        writer.write_null().unwrap();
        writer.write_end_object().unwrap();
        writer.write_bool(false).unwrap();
        writer.write_end_array().unwrap();
        assert_eq!(writer.output(), br#"[1,{"k":null},false]"#);
    }

    #[test]
    fn test_should_flush_and_take_output() {
        let mut writer = TokenWriter::new(4);
        writer.write_start_array().unwrap();
        assert!(!writer.should_flush());
        writer.write_string("abcd").unwrap();
        assert!(writer.should_flush());
        let first = writer.take_output();
        assert_eq!(first, br#"["abcd""#);
        writer.write_i64(2).unwrap();
        writer.write_end_array().unwrap();
        assert_eq!(writer.output(), b",2]");
        assert_eq!(writer.bytes_committed(), 10);
    }

    #[test]
    fn test_misuse_is_rejected() {
        let mut writer = TokenWriter::new(64);
        writer.write_start_object().unwrap();
        assert!(writer.write_i64(1).is_err());
        assert!(writer.write_end_array().is_err());
    }

    #[test]
    fn test_control_characters_escaped() {
        let mut writer = TokenWriter::new(64);
        writer.write_string("a\u{1}b").unwrap();
        assert_eq!(writer.output(), b"\"a\\u0001b\"");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut writer = TokenWriter::new(64);
        assert!(writer.write_f64(f64::NAN).is_err());
    }
}
