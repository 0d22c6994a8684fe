//! # memdb_attr
//!
//! Attribute identity for the in-memory column store — the "what can a row
//! hold" half of the database.
//!
//! This crate provides:
//!
//! - [`AttributeId`] — lightweight `u32` attribute identifiers.
//! - [`AttributeRegistry`] — explicitly owned name ↔ id registry with per-id
//!   size, default value and flags.
//! - [`Signature`] — packed bit-vector fingerprint of an attribute set.
//! - [`FilterSet`] — precomputed inclusive/exclusive query descriptor.

pub mod attribute;
pub mod filter;
pub mod registry;
pub mod signature;

pub use attribute::{Attribute, AttributeFlags, AttributeId};
pub use filter::FilterSet;
pub use registry::AttributeRegistry;
pub use signature::{Signature, SignatureIter};
