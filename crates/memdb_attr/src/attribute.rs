//! Attribute identity and metadata.
//!
//! An attribute is a named per-row data field with a registered byte size,
//! default value and flags. [`AttributeId`]s are handed out by the
//! [`AttributeRegistry`](crate::AttributeRegistry) once, monotonically, and
//! are never reused while the registry lives — which is what lets the id
//! double as a bit position in a [`Signature`](crate::Signature).

use serde::{Deserialize, Serialize};

/// A unique identifier for a registered attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

impl AttributeId {
    /// The invalid attribute sentinel.
    pub const INVALID: AttributeId = AttributeId(u32::MAX);

    /// Create an attribute id from a raw `u32`.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is a valid (non-sentinel) id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Returns the id as a `usize` index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for AttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AttributeId({})", self.0)
    }
}

/// Bitmask of behavioural flags attached to an attribute at registration.
///
/// The store keeps and returns flags verbatim; interpreting them belongs to
/// the layers above (serialisation filters, editor visibility and so on).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeFlags(pub u32);

impl AttributeFlags {
    /// No flags set.
    pub const NONE: AttributeFlags = AttributeFlags(0);

    /// Returns `true` if every flag in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: AttributeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AttributeFlags {
    type Output = AttributeFlags;

    fn bitor(self, rhs: AttributeFlags) -> AttributeFlags {
        AttributeFlags(self.0 | rhs.0)
    }
}

/// Metadata for one registered attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub(crate) name: String,
    pub(crate) type_size: usize,
    pub(crate) default_value: Box<[u8]>,
    pub(crate) flags: AttributeFlags,
}

impl Attribute {
    /// The name the attribute was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte size of one value. Zero for tag attributes with no storage.
    #[must_use]
    pub fn type_size(&self) -> usize {
        self.type_size
    }

    /// Returns `true` if the attribute is a pure query tag (no storage).
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.type_size == 0
    }

    /// The byte pattern new rows are filled with. Length equals
    /// [`type_size`](Attribute::type_size).
    #[must_use]
    pub fn default_value(&self) -> &[u8] {
        &self.default_value
    }

    /// The flags supplied at registration.
    #[must_use]
    pub fn flags(&self) -> AttributeFlags {
        self.flags
    }
}
