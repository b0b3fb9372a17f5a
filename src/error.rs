//! Error types for the conversion engine.
//!
//! Every failure that crosses the engine boundary is an [`Error`]. The variants
//! follow the engine's taxonomy:
//!
//! - **Structural**: the token cursor produced something other than what the
//!   current frame required ([`Error::UnexpectedToken`], [`Error::Syntax`])
//! - **Binding**: missing required members, ambiguous constructor binding,
//!   reference bookkeeping failures, `null` for non-nullable targets
//! - **Capacity**: the configured maximum depth was exceeded
//!
//! Running out of buffered input is *not* an error. The engine reports it by
//! returning `Ok(None)` / `Ok(false)` and the caller feeds more data.
//!
//! ## Paths
//!
//! Errors raised inside a conversion are wrapped once, at the outer boundary,
//! into [`Error::Annotated`] carrying the path of the failing element
//! (`$.items[2].name`) and, on the read side, the line and byte offset.
//!
//! ```rust
//! use frameconv::Error;
//!
//! let err = Error::missing_required("Point", vec!["X".to_string()]);
//! assert!(err.is_binding());
//! assert!(err.to_string().contains("X"));
//! ```

use std::fmt;
use thiserror::Error;

/// Represents every failure the engine can surface to a caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The token cursor rejected the input text.
    #[error("Syntax error at line {line}, column {column} (byte {offset}): {msg}")]
    Syntax {
        line: usize,
        column: usize,
        offset: usize,
        msg: String,
    },

    /// A specific token was required but another one was read.
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    /// Input ended while a value was still open.
    #[error("Unexpected end of input: {0}")]
    UnexpectedEnd(String),

    /// Required properties or constructor parameters were not present.
    #[error("Type '{type_name}' is missing required members: {}", .names.join(", "))]
    MissingRequired {
        type_name: String,
        names: Vec<String>,
    },

    /// A `null` token was read for a member that cannot hold null.
    #[error("Member '{member}' on type '{type_name}' cannot be null")]
    NullForNonNullable { member: String, type_name: String },

    /// A reference id was registered twice.
    #[error("Reference id '{0}' was already defined")]
    DuplicateReferenceId(String),

    /// A `$ref` pointed to an id that was never registered.
    #[error("Reference '{0}' was not found")]
    ReferenceNotFound(String),

    /// A metadata property was duplicated, misplaced or not allowed here.
    #[error("Invalid metadata property '{name}': {reason}")]
    UnexpectedMetadata { name: String, reason: String },

    /// An input key did not map to any property and the policy disallows it.
    #[error("Property '{name}' could not be mapped to any member of type '{type_name}'")]
    UnknownProperty { name: String, type_name: String },

    /// A `$type` discriminator did not match any registered derived type.
    #[error("Type discriminator '{discriminator}' is not known for base type '{type_name}'")]
    UnknownDiscriminator {
        discriminator: String,
        type_name: String,
    },

    /// A value could not be represented as the target type.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// The configured maximum nesting depth was exceeded.
    #[error("Maximum depth of {max} exceeded")]
    DepthExceeded { max: usize },

    /// A descriptor was built or used inconsistently.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An element was added to a collection that reported itself read-only.
    #[error("Collection of type '{0}' is read-only")]
    ReadOnlyCollection(String),

    /// A write was cancelled while an asynchronous element fetch was pending.
    #[error("Operation was cancelled")]
    Cancelled,

    /// IO error while reading from or writing to a stream.
    #[error("IO error: {0}")]
    Io(String),

    /// Custom error.
    #[error("Error: {0}")]
    Custom(String),

    /// An error annotated with the location of the failing element.
    #[error("{source} Path: {path}{}", location_suffix(.line, .offset))]
    Annotated {
        path: String,
        line: Option<usize>,
        offset: Option<usize>,
        source: Box<Error>,
    },
}

fn location_suffix(line: &Option<usize>, offset: &Option<usize>) -> String {
    match (line, offset) {
        (Some(line), Some(offset)) => format!(" | Line: {} | Byte: {}", line, offset),
        (Some(line), None) => format!(" | Line: {}", line),
        (None, Some(offset)) => format!(" | Byte: {}", offset),
        (None, None) => String::new(),
    }
}

impl Error {
    /// Creates a syntax error at the given position.
    ///
    /// ```rust
    /// use frameconv::Error;
    ///
    /// let err = Error::syntax(3, 7, 41, "invalid literal");
    /// assert!(err.to_string().contains("line 3"));
    /// ```
    pub fn syntax(line: usize, column: usize, offset: usize, msg: &str) -> Self {
        Error::Syntax {
            line,
            column,
            offset,
            msg: msg.to_string(),
        }
    }

    /// Creates a structural error for an unexpected token.
    pub fn unexpected_token(expected: &str, found: impl fmt::Display) -> Self {
        Error::UnexpectedToken {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn unexpected_end(msg: &str) -> Self {
        Error::UnexpectedEnd(msg.to_string())
    }

    /// Creates a binding error listing every missing member.
    pub fn missing_required(type_name: &str, names: Vec<String>) -> Self {
        Error::MissingRequired {
            type_name: type_name.to_string(),
            names,
        }
    }

    pub fn null_for_non_nullable(member: &str, type_name: &str) -> Self {
        Error::NullForNonNullable {
            member: member.to_string(),
            type_name: type_name.to_string(),
        }
    }

    pub fn unexpected_metadata(name: &str, reason: &str) -> Self {
        Error::UnexpectedMetadata {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn type_mismatch(expected: &str, found: impl fmt::Display) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn configuration(msg: impl fmt::Display) -> Self {
        Error::Configuration(msg.to_string())
    }

    /// Creates a custom error with a display message.
    ///
    /// ```rust
    /// use frameconv::Error;
    ///
    /// let err = Error::custom("something went wrong");
    /// assert!(err.to_string().contains("something went wrong"));
    /// ```
    pub fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }

    pub fn io(msg: &str) -> Self {
        Error::Io(msg.to_string())
    }

    /// Wraps this error with location information.
    ///
    /// Already annotated errors are returned unchanged so the innermost
    /// location wins.
    pub fn annotate(self, path: String, line: Option<usize>, offset: Option<usize>) -> Self {
        match self {
            annotated @ Error::Annotated { .. } => annotated,
            other => Error::Annotated {
                path,
                line,
                offset,
                source: Box::new(other),
            },
        }
    }

    /// Returns the underlying error, looking through annotations.
    #[must_use]
    pub fn inner(&self) -> &Error {
        match self {
            Error::Annotated { source, .. } => source.inner(),
            other => other,
        }
    }

    /// Returns the element path when the error was annotated.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Annotated { path, .. } => Some(path),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_syntax(&self) -> bool {
        matches!(
            self.inner(),
            Error::Syntax { .. } | Error::UnexpectedToken { .. } | Error::UnexpectedEnd(_)
        )
    }

    #[must_use]
    pub fn is_binding(&self) -> bool {
        matches!(
            self.inner(),
            Error::MissingRequired { .. }
                | Error::NullForNonNullable { .. }
                | Error::DuplicateReferenceId(_)
                | Error::ReferenceNotFound(_)
                | Error::UnexpectedMetadata { .. }
                | Error::UnknownProperty { .. }
                | Error::UnknownDiscriminator { .. }
        )
    }

    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self.inner(), Error::DepthExceeded { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
