//! The database — owns every table and performs the stateful row and column
//! operations behind generation-checked handles.
//!
//! All work here is direct CPU work on one thread: bit comparisons, byte
//! copies, index arithmetic. There are no locks and no suspension points;
//! callers needing concurrency supply their own mutual exclusion. Any row
//! index or column borrow obtained from a query or accessor is invalidated
//! the instant a structural operation (allocate, deallocate, add column,
//! migrate, defragment) runs against the same table.

use std::sync::Arc;

use memdb_attr::{AttributeId, AttributeRegistry, FilterSet, Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::dataset::{Dataset, TableView};
use crate::table::{RowMove, Table};

/// Hard ceiling on the number of tables one database may hold.
///
/// The slot arena never grows past it, which keeps handles and slot
/// addresses stable for the database's lifetime.
pub const MAX_TABLES: usize = 512;

/// Generation-checked handle to a table.
///
/// Handles from a foreign or outlived database fail validation instead of
/// aliasing another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    index: u16,
    generation: u16,
}

impl TableId {
    /// The invalid table sentinel.
    pub const INVALID: TableId = TableId {
        index: u16::MAX,
        generation: u16::MAX,
    };

    /// Slot index within the owning database.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableId({}:{})", self.index, self.generation)
    }
}

/// Errors surfaced at the database boundary.
///
/// Misuse that the unchecked [`Table`] fast path would punish with a panic
/// is reported as a typed error here, for callers (editors, script hosts)
/// that cannot be trusted with raw indices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// The handle does not address a live table in this database.
    #[error("stale or invalid table handle {0}")]
    InvalidTable(TableId),
    /// The row index lies past the table's row count.
    #[error("row {row} out of range for table '{table}' ({num_rows} rows)")]
    RowOutOfRange {
        table: String,
        row: usize,
        num_rows: usize,
    },
    /// The column index lies past the table's column count.
    #[error("column {column} out of range for table '{table}'")]
    ColumnOutOfRange { table: String, column: usize },
    /// The attribute has no column in the table.
    #[error("attribute {attribute} not present in table '{table}'")]
    MissingAttribute {
        table: String,
        attribute: AttributeId,
    },
    /// A typed access used a type whose size differs from the attribute's.
    #[error("value size {got} does not match attribute size {expected}")]
    SizeMismatch { expected: usize, got: usize },
    /// A row blob does not match the table's current schema.
    #[error("row blob is {got} bytes, rows of table '{table}' serialise to {expected}")]
    BlobSizeMismatch {
        table: String,
        expected: usize,
        got: usize,
    },
    /// Source and destination of a migration are the same table.
    #[error("cannot migrate a row within its own table")]
    SameTable,
}

/// Result of migrating one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// The row allocated in the destination table.
    pub new_row: usize,
    /// Relocation performed in the source table when the freed slot was
    /// compacted immediately; `None` in deferred mode, or when the freed
    /// row was already last.
    pub source_move: Option<RowMove>,
}

/// Result of migrating a batch of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMigration {
    /// Destination rows, 1:1 with the input order.
    pub new_rows: Vec<usize>,
    /// Source-table relocations, in the order they were performed.
    pub moves: Vec<RowMove>,
}

/// Result of compacting a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defragmentation {
    /// Number of freed slots reclaimed.
    pub reclaimed: usize,
    /// Relocations performed. Apply them in order to patch external
    /// row-index caches.
    pub moves: Vec<RowMove>,
}

#[derive(Debug, Clone)]
struct TableSlot {
    table: Table,
    generation: u16,
}

/// The in-memory column store: a fixed-ceiling arena of tables addressed by
/// generation-checked [`TableId`]s, resolving attributes against a shared
/// frozen [`AttributeRegistry`].
///
/// Tables are never individually destroyed — the table count only grows for
/// the database's lifetime. [`clean`](Database::clean) and
/// [`reset`](Database::reset) drop rows, not tables.
#[derive(Debug)]
pub struct Database {
    registry: Arc<AttributeRegistry>,
    slots: Vec<TableSlot>,
}

impl Database {
    /// Create an empty database over a frozen attribute registry.
    #[must_use]
    pub fn new(registry: Arc<AttributeRegistry>) -> Self {
        Self {
            registry,
            // Reserving the ceiling up front means the slot arena never
            // reallocates while tables are live.
            slots: Vec::with_capacity(MAX_TABLES),
        }
    }

    /// The registry this database resolves attributes against.
    #[must_use]
    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    /// Number of tables created so far.
    #[must_use]
    pub fn num_tables(&self) -> usize {
        self.slots.len()
    }

    /// Create a table holding the given attributes.
    ///
    /// Duplicate ids in `attributes` collapse to one column, with a warning.
    ///
    /// # Panics
    ///
    /// Panics when the [`MAX_TABLES`] ceiling is exceeded, or when an
    /// attribute id was not produced by this database's registry.
    pub fn create_table(&mut self, name: &str, attributes: &[AttributeId]) -> TableId {
        assert!(
            self.slots.len() < MAX_TABLES,
            "table ceiling of {MAX_TABLES} reached"
        );
        let index = self.slots.len();
        let mut table = Table::new(name);
        for &attribute in attributes {
            table.add_column(attribute, self.registry.attribute(attribute), true);
        }
        self.slots.push(TableSlot {
            table,
            generation: 0,
        });
        let id = TableId {
            index: index as u16,
            generation: 0,
        };
        debug!(table = name, columns = attributes.len(), %id, "created table");
        id
    }

    /// Returns `true` if `id` addresses a live table in this database.
    #[must_use]
    pub fn is_valid(&self, id: TableId) -> bool {
        self.slots
            .get(id.index())
            .map_or(false, |slot| slot.generation == id.generation)
    }

    fn slot(&self, id: TableId) -> Result<&TableSlot, DatabaseError> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .ok_or(DatabaseError::InvalidTable(id))
    }

    fn slot_mut(&mut self, id: TableId) -> Result<&mut TableSlot, DatabaseError> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .ok_or(DatabaseError::InvalidTable(id))
    }

    /// Borrow a table for reads.
    pub fn table(&self, id: TableId) -> Result<&Table, DatabaseError> {
        Ok(&self.slot(id)?.table)
    }

    /// Borrow a table for writes. Structural changes made through the borrow
    /// follow the same invalidation contract as the database-level
    /// operations.
    pub fn table_mut(&mut self, id: TableId) -> Result<&mut Table, DatabaseError> {
        Ok(&mut self.slot_mut(id)?.table)
    }

    fn check_row(table: &Table, row: usize) -> Result<(), DatabaseError> {
        if row >= table.num_rows() {
            return Err(DatabaseError::RowOutOfRange {
                table: table.name().to_string(),
                row,
                num_rows: table.num_rows(),
            });
        }
        Ok(())
    }

    fn check_column(table: &Table, column: usize) -> Result<(), DatabaseError> {
        if column >= table.num_columns() {
            return Err(DatabaseError::ColumnOutOfRange {
                table: table.name().to_string(),
                column,
            });
        }
        Ok(())
    }

    /// Number of rows in `table`, including freed-but-uncompacted rows.
    pub fn num_rows(&self, table: TableId) -> Result<usize, DatabaseError> {
        Ok(self.table(table)?.num_rows())
    }

    /// Allocate a row with every column at its registered default.
    ///
    /// Freed rows are reused, most recently freed first, before the table
    /// grows.
    pub fn allocate_row(&mut self, table: TableId) -> Result<usize, DatabaseError> {
        Ok(self.slot_mut(table)?.table.allocate_row())
    }

    /// Mark a row free. Its data stays stale in place until the row is
    /// reused or the table is defragmented; row count is unaffected.
    pub fn deallocate_row(&mut self, table: TableId, row: usize) -> Result<(), DatabaseError> {
        let table = &mut self.slot_mut(table)?.table;
        Self::check_row(table, row)?;
        table.free_row(row);
        Ok(())
    }

    /// Reset every column of `row` to its registered default.
    pub fn set_to_default(&mut self, table: TableId, row: usize) -> Result<(), DatabaseError> {
        let table = &mut self.slot_mut(table)?.table;
        Self::check_row(table, row)?;
        table.set_to_default(row);
        Ok(())
    }

    /// Append a column to an existing table, default-filled across all of
    /// its rows. `update_signature` controls whether the attribute becomes
    /// visible to queries; a hidden column is reachable by index only.
    pub fn add_column(
        &mut self,
        table: TableId,
        attribute: AttributeId,
        update_signature: bool,
    ) -> Result<usize, DatabaseError> {
        let registry = Arc::clone(&self.registry);
        let desc = registry.attribute(attribute);
        Ok(self
            .slot_mut(table)?
            .table
            .add_column(attribute, desc, update_signature))
    }

    /// Column index of `attribute` in `table`.
    pub fn column_index(
        &self,
        table: TableId,
        attribute: AttributeId,
    ) -> Result<usize, DatabaseError> {
        let table = self.table(table)?;
        table
            .column_index(attribute)
            .ok_or_else(|| DatabaseError::MissingAttribute {
                table: table.name().to_string(),
                attribute,
            })
    }

    /// Raw bytes of one value. Empty for tag columns.
    pub fn row_bytes(
        &self,
        table: TableId,
        column: usize,
        row: usize,
    ) -> Result<&[u8], DatabaseError> {
        let table = self.table(table)?;
        Self::check_row(table, row)?;
        Self::check_column(table, column)?;
        Ok(table.column(column).row_bytes(row))
    }

    /// Mutable raw bytes of one value. Empty for tag columns.
    pub fn row_bytes_mut(
        &mut self,
        table: TableId,
        column: usize,
        row: usize,
    ) -> Result<&mut [u8], DatabaseError> {
        let table = &mut self.slot_mut(table)?.table;
        Self::check_row(table, row)?;
        Self::check_column(table, column)?;
        Ok(table.column_mut(column).row_bytes_mut(row))
    }

    /// Read one value as `T`.
    pub fn get_value<T: bytemuck::Pod>(
        &self,
        table: TableId,
        attribute: AttributeId,
        row: usize,
    ) -> Result<T, DatabaseError> {
        let column = self.column_index(table, attribute)?;
        let bytes = self.row_bytes(table, column, row)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return Err(DatabaseError::SizeMismatch {
                expected: bytes.len(),
                got: std::mem::size_of::<T>(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Overwrite one value with `value`.
    pub fn set_value<T: bytemuck::Pod>(
        &mut self,
        table: TableId,
        attribute: AttributeId,
        row: usize,
        value: T,
    ) -> Result<(), DatabaseError> {
        let column = self.column_index(table, attribute)?;
        let bytes = self.row_bytes_mut(table, column, row)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return Err(DatabaseError::SizeMismatch {
                expected: bytes.len(),
                got: std::mem::size_of::<T>(),
            });
        }
        bytes.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Borrow two distinct tables mutably.
    fn two_tables_mut(
        &mut self,
        a: TableId,
        b: TableId,
    ) -> Result<(&mut Table, &mut Table), DatabaseError> {
        if a.index() == b.index() {
            return Err(DatabaseError::SameTable);
        }
        self.slot(a)?;
        self.slot(b)?;
        let (ai, bi) = (a.index(), b.index());
        if ai < bi {
            let (left, right) = self.slots.split_at_mut(bi);
            Ok((&mut left[ai].table, &mut right[0].table))
        } else {
            let (left, right) = self.slots.split_at_mut(ai);
            Ok((&mut right[0].table, &mut left[bi].table))
        }
    }

    /// Move one row into another table.
    ///
    /// Attributes present in both signatures keep their values,
    /// destination-only columns take their registered defaults, source-only
    /// columns are dropped. The freed source slot is compacted immediately
    /// by erase-swap; apply the returned [`Migration::source_move`] to any
    /// external row cache.
    pub fn migrate_row(
        &mut self,
        src: TableId,
        src_row: usize,
        dst: TableId,
    ) -> Result<Migration, DatabaseError> {
        let (src_table, dst_table) = self.two_tables_mut(src, dst)?;
        Self::check_row(src_table, src_row)?;
        let new_row = dst_table.allocate_row();
        dst_table.copy_row_from(src_table, src_row, new_row);
        let source_move = src_table.erase_swap(src_row);
        Ok(Migration {
            new_row,
            source_move,
        })
    }

    /// Like [`migrate_row`](Database::migrate_row), but the source row is
    /// only marked free; the stale slot is reclaimed by a later allocation
    /// or defragmentation, and no source relocation happens.
    pub fn migrate_row_deferred(
        &mut self,
        src: TableId,
        src_row: usize,
        dst: TableId,
    ) -> Result<Migration, DatabaseError> {
        let (src_table, dst_table) = self.two_tables_mut(src, dst)?;
        Self::check_row(src_table, src_row)?;
        let new_row = dst_table.allocate_row();
        dst_table.copy_row_from(src_table, src_row, new_row);
        src_table.free_row(src_row);
        Ok(Migration {
            new_row,
            source_move: None,
        })
    }

    /// Copy one row into another table (or the same table), leaving the
    /// source row intact. Copy semantics match
    /// [`migrate_row`](Database::migrate_row).
    pub fn duplicate_row(
        &mut self,
        src: TableId,
        src_row: usize,
        dst: TableId,
    ) -> Result<usize, DatabaseError> {
        if src.index() == dst.index() {
            let table = &mut self.slot_mut(src)?.table;
            Self::check_row(table, src_row)?;
            return Ok(table.duplicate_row_within(src_row));
        }
        let (src_table, dst_table) = self.two_tables_mut(src, dst)?;
        Self::check_row(src_table, src_row)?;
        let new_row = dst_table.allocate_row();
        dst_table.copy_row_from(src_table, src_row, new_row);
        Ok(new_row)
    }

    /// Migrate several rows at once.
    ///
    /// Destination rows come back 1:1 with the input order. All rows are
    /// copied before any source compaction runs; the compactions then happen
    /// in input order. A row index that an earlier entry's compaction
    /// relocated must not appear later in the same batch.
    pub fn migrate_rows(
        &mut self,
        src: TableId,
        src_rows: &[usize],
        dst: TableId,
    ) -> Result<BatchMigration, DatabaseError> {
        let (src_table, dst_table) = self.two_tables_mut(src, dst)?;
        for &row in src_rows {
            Self::check_row(src_table, row)?;
        }
        let mut new_rows = Vec::with_capacity(src_rows.len());
        for &row in src_rows {
            let new_row = dst_table.allocate_row();
            dst_table.copy_row_from(src_table, row, new_row);
            new_rows.push(new_row);
        }
        let mut moves = Vec::new();
        for &row in src_rows {
            if let Some(relocation) = src_table.erase_swap(row) {
                moves.push(relocation);
            }
        }
        Ok(BatchMigration { new_rows, moves })
    }

    /// Batch variant of [`migrate_row_deferred`](Database::migrate_row_deferred):
    /// source rows are marked free instead of compacted.
    pub fn migrate_rows_deferred(
        &mut self,
        src: TableId,
        src_rows: &[usize],
        dst: TableId,
    ) -> Result<BatchMigration, DatabaseError> {
        let (src_table, dst_table) = self.two_tables_mut(src, dst)?;
        for &row in src_rows {
            Self::check_row(src_table, row)?;
        }
        let mut new_rows = Vec::with_capacity(src_rows.len());
        for &row in src_rows {
            let new_row = dst_table.allocate_row();
            dst_table.copy_row_from(src_table, row, new_row);
            new_rows.push(new_row);
        }
        for &row in src_rows {
            src_table.free_row(row);
        }
        Ok(BatchMigration {
            new_rows,
            moves: Vec::new(),
        })
    }

    /// Duplicate several rows at once; destination rows come back 1:1 with
    /// the input order and the sources stay intact.
    pub fn duplicate_rows(
        &mut self,
        src: TableId,
        src_rows: &[usize],
        dst: TableId,
    ) -> Result<Vec<usize>, DatabaseError> {
        let (src_table, dst_table) = self.two_tables_mut(src, dst)?;
        for &row in src_rows {
            Self::check_row(src_table, row)?;
        }
        let mut new_rows = Vec::with_capacity(src_rows.len());
        for &row in src_rows {
            let new_row = dst_table.allocate_row();
            dst_table.copy_row_from(src_table, row, new_row);
            new_rows.push(new_row);
        }
        Ok(new_rows)
    }

    /// Migrate a row into a table owned by another database.
    ///
    /// # Panics
    ///
    /// Panics if the two databases do not share one attribute registry —
    /// attribute ids are only meaningful within their registry.
    pub fn migrate_row_into(
        &mut self,
        src: TableId,
        src_row: usize,
        dst_db: &mut Database,
        dst: TableId,
    ) -> Result<Migration, DatabaseError> {
        assert!(
            Arc::ptr_eq(&self.registry, &dst_db.registry),
            "databases must share one attribute registry"
        );
        let src_table = &mut self.slot_mut(src)?.table;
        let dst_table = &mut dst_db.slot_mut(dst)?.table;
        Self::check_row(src_table, src_row)?;
        let new_row = dst_table.allocate_row();
        dst_table.copy_row_from(src_table, src_row, new_row);
        let source_move = src_table.erase_swap(src_row);
        Ok(Migration {
            new_row,
            source_move,
        })
    }

    /// Duplicate a row into a table owned by another database, leaving the
    /// source intact.
    ///
    /// # Panics
    ///
    /// Panics if the two databases do not share one attribute registry.
    pub fn duplicate_row_into(
        &self,
        src: TableId,
        src_row: usize,
        dst_db: &mut Database,
        dst: TableId,
    ) -> Result<usize, DatabaseError> {
        assert!(
            Arc::ptr_eq(&self.registry, &dst_db.registry),
            "databases must share one attribute registry"
        );
        let src_table = &self.slot(src)?.table;
        let dst_table = &mut dst_db.slot_mut(dst)?.table;
        Self::check_row(src_table, src_row)?;
        let new_row = dst_table.allocate_row();
        dst_table.copy_row_from(src_table, src_row, new_row);
        Ok(new_row)
    }

    /// Compact pending free slots of one table.
    ///
    /// Invoked explicitly rather than on every deallocation so the cost is
    /// amortised over many frees. Relocations are returned in the order
    /// they were performed.
    pub fn defragment(&mut self, table: TableId) -> Result<Defragmentation, DatabaseError> {
        let table = &mut self.slot_mut(table)?.table;
        let (reclaimed, moves) = table.defragment();
        trace!(
            table = table.name(),
            reclaimed,
            moves = moves.len(),
            "defragmented"
        );
        Ok(Defragmentation { reclaimed, moves })
    }

    /// Drop all rows of one table without releasing buffers.
    pub fn clean(&mut self, table: TableId) -> Result<(), DatabaseError> {
        self.slot_mut(table)?.table.clean();
        Ok(())
    }

    /// Drop all rows of every table without releasing buffers.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.table.clean();
        }
    }

    /// Run a filter over every table.
    ///
    /// A table matches when its signature is a superset of the inclusive
    /// mask and shares no bit with the exclusive mask. Each view resolves
    /// its column indices in the filter's attribute order. An empty
    /// inclusive set matches nothing.
    #[must_use]
    pub fn query(&self, filter: &FilterSet) -> Dataset {
        let mut views = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let signature = slot.table.signature();
            if !signature.contains_all(filter.inclusive()) {
                continue;
            }
            if !filter.exclusive().is_empty() && signature.intersects(filter.exclusive()) {
                continue;
            }
            let columns = filter
                .attributes()
                .iter()
                .map(|&attribute| {
                    slot.table
                        .column_index(attribute)
                        .expect("matched table must hold every inclusive attribute")
                })
                .collect();
            views.push(TableView {
                table: TableId {
                    index: index as u16,
                    generation: slot.generation,
                },
                num_rows: slot.table.num_rows(),
                columns,
            });
        }
        Dataset::new(views)
    }

    /// Lighter query variant: just the ids of the matching tables.
    #[must_use]
    pub fn query_tables(&self, inclusive: &Signature, exclusive: &Signature) -> Vec<TableId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                let signature = slot.table.signature();
                signature.contains_all(inclusive)
                    && !(!exclusive.is_empty() && signature.intersects(exclusive))
            })
            .map(|(index, slot)| TableId {
                index: index as u16,
                generation: slot.generation,
            })
            .collect()
    }

    /// Pack one row into a schema-coupled byte blob: column bytes in column
    /// order, sized by registered type sizes, no header.
    pub fn serialize_row(&self, table: TableId, row: usize) -> Result<Vec<u8>, DatabaseError> {
        let table = self.table(table)?;
        Self::check_row(table, row)?;
        Ok(table.serialize_row(row))
    }

    /// Unpack a blob produced by [`serialize_row`](Database::serialize_row)
    /// against the same schema.
    pub fn deserialize_row(
        &mut self,
        blob: &[u8],
        table: TableId,
        row: usize,
    ) -> Result<(), DatabaseError> {
        let table = &mut self.slot_mut(table)?.table;
        Self::check_row(table, row)?;
        if blob.len() != table.row_blob_size() {
            return Err(DatabaseError::BlobSizeMismatch {
                table: table.name().to_string(),
                expected: table.row_blob_size(),
                got: blob.len(),
            });
        }
        table.deserialize_row(blob, row);
        Ok(())
    }
}

impl Clone for Database {
    /// Full structural copy: every table, signature and row buffer is
    /// duplicated. The attribute registry is shared, not cloned.
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            slots: self.slots.clone(),
        }
    }
}
