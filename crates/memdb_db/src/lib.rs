//! # memdb_db
//!
//! The stateful half of the in-memory column store: archetypal tables of
//! packed columns, the database that owns them, and query result datasets.
//!
//! This crate provides:
//!
//! - [`Table`] — columnar row storage for one attribute signature, with a
//!   free-row list and a doubling growth step.
//! - [`Database`] — the fixed-ceiling table arena; row allocation,
//!   migration, duplication, defragmentation and query dispatch.
//! - [`Dataset`] — per-table query views, revalidatable across frames.
//!
//! Everything is single-threaded and synchronous; callers that share a
//! database across threads supply their own mutual exclusion.

pub mod database;
pub mod dataset;
pub mod table;

pub use database::{
    BatchMigration, Database, DatabaseError, Defragmentation, Migration, TableId, MAX_TABLES,
};
pub use dataset::{Dataset, TableView};
pub use table::{Column, RowMove, Table, INITIAL_CAPACITY};
