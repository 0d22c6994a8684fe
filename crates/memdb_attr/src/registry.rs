//! The attribute registry — name ↔ id mapping plus per-id metadata.
//!
//! There is deliberately no process-wide instance. A registry is built
//! explicitly at startup (or per test fixture), frozen into an
//! `Arc<AttributeRegistry>`, and handed to every database that resolves
//! attributes against it. Registration is `&mut self`, so the type system
//! already rules out concurrent registration.

use std::collections::HashMap;

use crate::attribute::{Attribute, AttributeFlags, AttributeId};

/// Registry of every attribute known to the store.
///
/// Ids are assigned in registration order and never reused while the
/// registry lives.
#[derive(Debug, Default)]
pub struct AttributeRegistry {
    attributes: Vec<Attribute>,
    ids_by_name: HashMap<String, AttributeId>,
}

impl AttributeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new attribute under `name` and return its id.
    ///
    /// `type_size == 0` registers a pure query tag with no storage. When
    /// `default` is `None` the stored default is zero-filled.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered, or if a supplied default does
    /// not match `type_size`. Both are content errors with no recovery path;
    /// they are expected to be caught before ship.
    pub fn register(
        &mut self,
        name: &str,
        type_size: usize,
        default: Option<&[u8]>,
        flags: AttributeFlags,
    ) -> AttributeId {
        assert!(
            !self.ids_by_name.contains_key(name),
            "attribute '{name}' is already registered"
        );

        let default_value: Box<[u8]> = match default {
            Some(bytes) => {
                assert_eq!(
                    bytes.len(),
                    type_size,
                    "default value for '{name}' is {} bytes, expected {type_size}",
                    bytes.len()
                );
                bytes.into()
            }
            None => vec![0u8; type_size].into_boxed_slice(),
        };

        let id = AttributeId::from_raw(self.attributes.len() as u32);
        self.attributes.push(Attribute {
            name: name.to_string(),
            type_size,
            default_value,
            flags,
        });
        self.ids_by_name.insert(name.to_string(), id);
        id
    }

    /// Register a plain-old-data attribute with a typed default.
    pub fn register_pod<T: bytemuck::Pod>(
        &mut self,
        name: &str,
        default: T,
        flags: AttributeFlags,
    ) -> AttributeId {
        self.register(
            name,
            std::mem::size_of::<T>(),
            Some(bytemuck::bytes_of(&default)),
            flags,
        )
    }

    /// Register a zero-size tag attribute, usable in signatures and filters
    /// but carrying no per-row data.
    pub fn register_tag(&mut self, name: &str, flags: AttributeFlags) -> AttributeId {
        self.register(name, 0, None, flags)
    }

    /// Look up an attribute id by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<AttributeId> {
        self.ids_by_name.get(name).copied()
    }

    /// Checked metadata access.
    #[must_use]
    pub fn get(&self, id: AttributeId) -> Option<&Attribute> {
        self.attributes.get(id.index())
    }

    /// Metadata for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this registry.
    #[must_use]
    pub fn attribute(&self, id: AttributeId) -> &Attribute {
        &self.attributes[id.index()]
    }

    /// Byte size of one value of `id`.
    #[must_use]
    pub fn type_size(&self, id: AttributeId) -> usize {
        self.attribute(id).type_size
    }

    /// Flags registered for `id`.
    #[must_use]
    pub fn flags(&self, id: AttributeId) -> AttributeFlags {
        self.attribute(id).flags
    }

    /// Default byte pattern for `id`.
    #[must_use]
    pub fn default_value(&self, id: AttributeId) -> &[u8] {
        &self.attribute(id).default_value
    }

    /// Number of registered attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate `(id, attribute)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (AttributeId, &Attribute)> {
        self.attributes
            .iter()
            .enumerate()
            .map(|(i, attr)| (AttributeId::from_raw(i as u32), attr))
    }
}
