//! Configuration options for conversions.
//!
//! - [`ConvertOptions`]: limits, policies and the descriptor registry
//! - [`ReferenceHandling`]: whether `$id`/`$ref` metadata is produced and honored
//! - [`UnmappedMemberHandling`]: what happens to keys that match no property
//! - [`NumberHandling`]: whether numbers may be read from / written as strings
//!
//! ## Examples
//!
//! ```rust
//! use frameconv::{ConvertOptions, ReferenceHandling, UnmappedMemberHandling};
//!
//! let options = ConvertOptions::new()
//!     .with_max_depth(16)
//!     .with_reference_handling(ReferenceHandling::Preserve)
//!     .with_unmapped_member_handling(UnmappedMemberHandling::Disallow);
//! assert_eq!(options.max_depth, 16);
//! ```

use crate::descriptor::Registry;
use std::sync::Arc;

/// Default maximum nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default number of buffered output bytes before a flush is requested.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 16 * 1024;

/// Default size of the read buffer used by streaming drivers.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Reference preservation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReferenceHandling {
    /// No reference metadata is written; `$id`/`$ref` keys in input are read
    /// as ordinary property names.
    #[default]
    Ignore,
    /// Shared values are written once with `$id` and afterwards as `$ref`.
    Preserve,
}

/// Policy for object keys that match no declared property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnmappedMemberHandling {
    /// Skip the value.
    #[default]
    Skip,
    /// Fail with [`Error::UnknownProperty`](crate::Error::UnknownProperty).
    Disallow,
}

/// Number handling policy for numeric leaf converters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NumberHandling {
    /// Numbers must be number tokens.
    #[default]
    Strict,
    /// Numbers may also be read from string tokens like `"42"`.
    AllowReadingFromString,
    /// Numbers are written as strings; reading accepts both forms.
    WriteAsString,
}

impl NumberHandling {
    #[must_use]
    pub const fn allows_reading_from_string(self) -> bool {
        matches!(
            self,
            NumberHandling::AllowReadingFromString | NumberHandling::WriteAsString
        )
    }

    #[must_use]
    pub const fn writes_as_string(self) -> bool {
        matches!(self, NumberHandling::WriteAsString)
    }
}

/// Options shared by every conversion.
///
/// The registry decides which descriptors are used; two options values that
/// share a registry share their configured descriptors.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub max_depth: usize,
    pub reference_handling: ReferenceHandling,
    pub unmapped_member_handling: UnmappedMemberHandling,
    pub number_handling: NumberHandling,
    pub flush_threshold: usize,
    pub buffer_size: usize,
    pub registry: Arc<Registry>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            reference_handling: ReferenceHandling::default(),
            unmapped_member_handling: UnmappedMemberHandling::default(),
            number_handling: NumberHandling::default(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            buffer_size: DEFAULT_BUFFER_SIZE,
            registry: Registry::global(),
        }
    }
}

impl ConvertOptions {
    /// Creates default options backed by the process-wide registry.
    ///
    /// ```rust
    /// use frameconv::ConvertOptions;
    ///
    /// let options = ConvertOptions::new();
    /// assert_eq!(options.max_depth, 64);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth. Exceeding it is a fatal error.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_reference_handling(mut self, handling: ReferenceHandling) -> Self {
        self.reference_handling = handling;
        self
    }

    #[must_use]
    pub fn with_unmapped_member_handling(mut self, handling: UnmappedMemberHandling) -> Self {
        self.unmapped_member_handling = handling;
        self
    }

    #[must_use]
    pub fn with_number_handling(mut self, handling: NumberHandling) -> Self {
        self.number_handling = handling;
        self
    }

    /// Sets how many output bytes may accumulate before the writer asks to
    /// be drained.
    ///
    /// ```rust
    /// use frameconv::ConvertOptions;
    ///
    /// let options = ConvertOptions::new().with_flush_threshold(1);
    /// assert_eq!(options.flush_threshold, 1);
    /// ```
    #[must_use]
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Uses a private registry instead of the process-wide one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn preserves_references(&self) -> bool {
        self.reference_handling == ReferenceHandling::Preserve
    }
}
