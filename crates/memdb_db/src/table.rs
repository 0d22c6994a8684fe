//! Tables — passive columnar storage for one attribute signature.
//!
//! A table is a named set of rows whose columns correspond 1:1 to the set
//! bits of its [`Signature`]. Data is stored column-wise: one packed buffer
//! per attribute, all sharing the table's capacity and row count.
//!
//! `Table` is the unchecked fast path. Its methods index directly and panic
//! on misuse; [`Database`](crate::Database) wraps every operation behind
//! generation-checked handles and typed errors for callers that cannot be
//! trusted with raw indices.

use std::collections::HashMap;

use memdb_attr::{Attribute, AttributeId, Signature};
use tracing::warn;

/// Initial row capacity of a fresh table.
pub const INITIAL_CAPACITY: usize = 128;

/// A relocation performed by compaction: the value previously at row `from`
/// now lives at row `to`.
///
/// Callers keeping external row-index caches (entity → row maps and the
/// like) apply these records, in order, to stay in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMove {
    /// The old index of the relocated row.
    pub from: usize,
    /// The index the row was moved to.
    pub to: usize,
}

/// Storage for one column, dispatched by kind through a single indirection.
#[derive(Debug, Clone)]
enum ColumnData {
    /// Packed plain-old-data elements, element size bytes each.
    Plain(Vec<u8>),
    /// A tag attribute: present in the signature, stores nothing.
    Tag,
}

/// One column of a table: the attribute it stores plus its packed buffer.
///
/// Element size and default bytes are copied out of the registry when the
/// column is created, so row operations never consult the registry again.
#[derive(Debug, Clone)]
pub struct Column {
    attribute: AttributeId,
    elem_size: usize,
    default: Box<[u8]>,
    data: ColumnData,
}

impl Column {
    fn new(attribute: AttributeId, desc: &Attribute, capacity: usize) -> Self {
        let elem_size = desc.type_size();
        let data = if elem_size == 0 {
            ColumnData::Tag
        } else {
            ColumnData::Plain(vec![0u8; elem_size * capacity])
        };
        Self {
            attribute,
            elem_size,
            default: desc.default_value().into(),
            data,
        }
    }

    /// The attribute stored in this column.
    #[must_use]
    pub fn attribute(&self) -> AttributeId {
        self.attribute
    }

    /// Size in bytes of one element; zero for tag columns.
    #[must_use]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Returns `true` if this column carries no storage.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        matches!(self.data, ColumnData::Tag)
    }

    fn grow(&mut self, capacity: usize) {
        if let ColumnData::Plain(buf) = &mut self.data {
            buf.resize(self.elem_size * capacity, 0);
        }
    }

    fn write_default(&mut self, row: usize) {
        if let ColumnData::Plain(buf) = &mut self.data {
            let start = row * self.elem_size;
            buf[start..start + self.elem_size].copy_from_slice(&self.default);
        }
    }

    /// Copy the value at `from` over the value at `to` within this column.
    fn copy_row(&mut self, from: usize, to: usize) {
        if let ColumnData::Plain(buf) = &mut self.data {
            let src = from * self.elem_size;
            buf.copy_within(src..src + self.elem_size, to * self.elem_size);
        }
    }

    fn copy_row_from(&mut self, src: &Column, src_row: usize, dst_row: usize) {
        debug_assert_eq!(self.elem_size, src.elem_size);
        if let (ColumnData::Plain(dst_buf), ColumnData::Plain(src_buf)) =
            (&mut self.data, &src.data)
        {
            let from = src_row * self.elem_size;
            dst_buf[dst_row * self.elem_size..(dst_row + 1) * self.elem_size]
                .copy_from_slice(&src_buf[from..from + self.elem_size]);
        }
    }

    /// Raw bytes of the value at `row`. Empty for tag columns.
    #[must_use]
    pub fn row_bytes(&self, row: usize) -> &[u8] {
        match &self.data {
            ColumnData::Plain(buf) => &buf[row * self.elem_size..(row + 1) * self.elem_size],
            ColumnData::Tag => &[],
        }
    }

    /// Mutable raw bytes of the value at `row`. Empty for tag columns.
    pub fn row_bytes_mut(&mut self, row: usize) -> &mut [u8] {
        match &mut self.data {
            ColumnData::Plain(buf) => &mut buf[row * self.elem_size..(row + 1) * self.elem_size],
            ColumnData::Tag => &mut [],
        }
    }

    /// The packed bytes of the first `rows` elements.
    #[must_use]
    pub fn bytes(&self, rows: usize) -> &[u8] {
        match &self.data {
            ColumnData::Plain(buf) => &buf[..rows * self.elem_size],
            ColumnData::Tag => &[],
        }
    }

    /// Read the value at `row` as `T`.
    ///
    /// # Panics
    ///
    /// Panics if `size_of::<T>()` differs from the column's element size.
    #[must_use]
    pub fn read<T: bytemuck::Pod>(&self, row: usize) -> T {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.elem_size,
            "type size does not match column element size"
        );
        bytemuck::pod_read_unaligned(self.row_bytes(row))
    }

    /// Overwrite the value at `row` with `value`.
    ///
    /// # Panics
    ///
    /// Panics if `size_of::<T>()` differs from the column's element size.
    pub fn write<T: bytemuck::Pod>(&mut self, row: usize, value: T) {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.elem_size,
            "type size does not match column element size"
        );
        self.row_bytes_mut(row)
            .copy_from_slice(bytemuck::bytes_of(&value));
    }
}

/// A named set of rows sharing one exact attribute signature, stored
/// column-wise with a free-row list and a doubling growth step.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    signature: Signature,
    attributes: Vec<AttributeId>,
    columns: Vec<Column>,
    column_map: HashMap<AttributeId, usize>,
    num_rows: usize,
    capacity: usize,
    grow_step: usize,
    free_rows: Vec<usize>,
}

impl Table {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: Signature::empty(),
            attributes: Vec::new(),
            columns: Vec::new(),
            column_map: HashMap::new(),
            num_rows: 0,
            capacity: INITIAL_CAPACITY,
            grow_step: INITIAL_CAPACITY,
            free_rows: Vec::new(),
        }
    }

    /// The name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table's schema fingerprint.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Attributes in column order.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeId] {
        &self.attributes
    }

    /// Total rows, including rows freed but not yet compacted. Only
    /// defragmentation and erase-swap compaction shrink this.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Allocated row capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if `attribute` is part of this table's signature.
    #[must_use]
    pub fn has_attribute(&self, attribute: AttributeId) -> bool {
        self.signature.contains(attribute)
    }

    /// The column index storing `attribute`, if present.
    #[must_use]
    pub fn column_index(&self, attribute: AttributeId) -> Option<usize> {
        self.column_map.get(&attribute).copied()
    }

    /// The attribute stored at `column`.
    #[must_use]
    pub fn attribute_id(&self, column: usize) -> AttributeId {
        self.attributes[column]
    }

    /// Borrow a column for reads.
    #[must_use]
    pub fn column(&self, column: usize) -> &Column {
        &self.columns[column]
    }

    /// Borrow a column for writes.
    pub fn column_mut(&mut self, column: usize) -> &mut Column {
        &mut self.columns[column]
    }

    /// Append a column for `attribute`, default-filled across existing rows.
    ///
    /// Re-adding a present attribute is a logic error; it warns and returns
    /// the existing column index. When `update_signature` is false the
    /// column is reachable by index but invisible to signature queries.
    pub(crate) fn add_column(
        &mut self,
        attribute: AttributeId,
        desc: &Attribute,
        update_signature: bool,
    ) -> usize {
        if let Some(existing) = self.column_index(attribute) {
            warn!(
                table = %self.name,
                %attribute,
                "adding a column twice keeps the original"
            );
            return existing;
        }

        let column = self.attributes.len();
        self.attributes.push(attribute);
        self.column_map.insert(attribute, column);
        if update_signature {
            self.signature.insert(attribute);
        }

        let mut col = Column::new(attribute, desc, self.capacity);
        for row in 0..self.num_rows {
            col.write_default(row);
        }
        self.columns.push(col);
        column
    }

    /// Pop a freed index (most recently freed first) or append a fresh row,
    /// growing the buffers when capacity is exhausted. Every column of the
    /// returned row holds its registered default.
    pub(crate) fn allocate_row(&mut self) -> usize {
        let row = match self.free_rows.pop() {
            Some(row) => row,
            None => {
                let row = self.num_rows;
                if row == self.capacity {
                    self.grow();
                }
                self.num_rows += 1;
                row
            }
        };
        self.set_to_default(row);
        row
    }

    /// Mark `row` free for reuse. The data is left stale in place until the
    /// row is reallocated or the table is defragmented.
    pub(crate) fn free_row(&mut self, row: usize) {
        assert!(
            row < self.num_rows,
            "row {row} out of range in table '{}'",
            self.name
        );
        self.free_rows.push(row);
    }

    /// Reset every column of `row` to its registered default.
    pub(crate) fn set_to_default(&mut self, row: usize) {
        assert!(
            row < self.num_rows,
            "row {row} out of range in table '{}'",
            self.name
        );
        for col in &mut self.columns {
            col.write_default(row);
        }
    }

    /// The growth step doubles each time, bounding the number of
    /// reallocations at the cost of some overallocation.
    fn grow(&mut self) {
        self.capacity += self.grow_step;
        self.grow_step *= 2;
        for col in &mut self.columns {
            col.grow(self.capacity);
        }
    }

    /// Swap the last row into `row` and shrink by one. Returns the
    /// relocation performed, or `None` when the erased row was already last.
    pub(crate) fn erase_swap(&mut self, row: usize) -> Option<RowMove> {
        assert!(
            row < self.num_rows,
            "row {row} out of range in table '{}'",
            self.name
        );
        let last = self.num_rows - 1;
        let moved = if row != last {
            for col in &mut self.columns {
                col.copy_row(last, row);
            }
            Some(RowMove { from: last, to: row })
        } else {
            None
        };
        self.num_rows = last;
        moved
    }

    /// Copy the attributes present in both tables from `src_row` of `src`
    /// into `dst_row` of `self`. Columns absent from `src` keep whatever
    /// `dst_row` already holds (its defaults, for a freshly allocated row).
    pub(crate) fn copy_row_from(&mut self, src: &Table, src_row: usize, dst_row: usize) {
        for dst_col in &mut self.columns {
            if let Some(src_index) = src.column_map.get(&dst_col.attribute).copied() {
                dst_col.copy_row_from(&src.columns[src_index], src_row, dst_row);
            }
        }
    }

    /// Allocate a new row holding a copy of `src_row`'s every column.
    pub(crate) fn duplicate_row_within(&mut self, src_row: usize) -> usize {
        let new_row = self.allocate_row();
        for col in &mut self.columns {
            col.copy_row(src_row, new_row);
        }
        new_row
    }

    /// Compact pending free slots by erase-swapping live tail rows into
    /// them.
    ///
    /// Free indices are processed largest-first so a swap can never move a
    /// row that a later step still has to erase; entries at or past the
    /// shrunken row count were already swapped away and are skipped.
    ///
    /// Returns the number of reclaimed rows and the relocations performed,
    /// in order.
    pub(crate) fn defragment(&mut self) -> (usize, Vec<RowMove>) {
        self.free_rows.sort_unstable();
        let mut moves = Vec::new();
        let mut reclaimed = 0;
        while let Some(row) = self.free_rows.pop() {
            if row >= self.num_rows {
                continue;
            }
            if let Some(relocation) = self.erase_swap(row) {
                moves.push(relocation);
            }
            reclaimed += 1;
        }
        (reclaimed, moves)
    }

    /// Drop every row without releasing buffers.
    pub(crate) fn clean(&mut self) {
        self.num_rows = 0;
        self.free_rows.clear();
    }

    /// Total byte size of one serialised row.
    #[must_use]
    pub fn row_blob_size(&self) -> usize {
        self.columns.iter().map(Column::elem_size).sum()
    }

    /// Pack one row into a contiguous blob: each column's bytes in column
    /// order, sized by the attribute's registered type size. No header, no
    /// attribute ids, no versioning — the blob is only meaningful against
    /// this exact schema.
    #[must_use]
    pub(crate) fn serialize_row(&self, row: usize) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.row_blob_size());
        for col in &self.columns {
            blob.extend_from_slice(col.row_bytes(row));
        }
        blob
    }

    /// Unpack a blob produced by [`serialize_row`](Table::serialize_row)
    /// against the same schema.
    pub(crate) fn deserialize_row(&mut self, blob: &[u8], row: usize) {
        assert_eq!(
            blob.len(),
            self.row_blob_size(),
            "row blob does not match the schema of table '{}'",
            self.name
        );
        let mut offset = 0;
        for col in &mut self.columns {
            let size = col.elem_size();
            col.row_bytes_mut(row)
                .copy_from_slice(&blob[offset..offset + size]);
            offset += size;
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_free(&self) -> usize {
        self.free_rows.len()
    }
}

#[cfg(test)]
mod tests {
    use memdb_attr::{AttributeFlags, AttributeRegistry};

    use super::*;

    struct Fixture {
        registry: AttributeRegistry,
        position: AttributeId,
        velocity: AttributeId,
        frozen: AttributeId,
    }

    fn fixture() -> Fixture {
        let mut registry = AttributeRegistry::new();
        let position = registry.register_pod("Position", [0.0f32; 3], AttributeFlags::NONE);
        let velocity = registry.register_pod("Velocity", [1.0f32, 0.0, 0.0], AttributeFlags::NONE);
        let frozen = registry.register_tag("Frozen", AttributeFlags::NONE);
        Fixture {
            registry,
            position,
            velocity,
            frozen,
        }
    }

    fn make_table(fx: &Fixture) -> Table {
        let mut table = Table::new("particles");
        table.add_column(fx.position, fx.registry.attribute(fx.position), true);
        table.add_column(fx.velocity, fx.registry.attribute(fx.velocity), true);
        table
    }

    #[test]
    fn test_columns_track_signature() {
        let fx = fixture();
        let mut table = make_table(&fx);
        assert!(table.has_attribute(fx.position));
        assert!(!table.has_attribute(fx.frozen));
        assert_eq!(table.column_index(fx.velocity), Some(1));
        assert_eq!(table.attribute_id(0), fx.position);

        table.add_column(fx.frozen, fx.registry.attribute(fx.frozen), true);
        assert!(table.has_attribute(fx.frozen));
        assert!(table.column(2).is_tag());
    }

    #[test]
    fn test_add_column_twice_keeps_original() {
        let fx = fixture();
        let mut table = make_table(&fx);
        let again = table.add_column(fx.position, fx.registry.attribute(fx.position), true);
        assert_eq!(again, 0);
        assert_eq!(table.num_columns(), 2);
    }

    #[test]
    fn test_hidden_column_is_invisible_to_signature() {
        let fx = fixture();
        let mut table = make_table(&fx);
        let column = table.add_column(fx.frozen, fx.registry.attribute(fx.frozen), false);
        assert!(!table.has_attribute(fx.frozen));
        assert_eq!(table.column_index(fx.frozen), Some(column));
    }

    #[test]
    fn test_allocated_rows_hold_defaults() {
        let fx = fixture();
        let mut table = make_table(&fx);
        let row = table.allocate_row();
        assert_eq!(table.column(0).read::<[f32; 3]>(row), [0.0; 3]);
        assert_eq!(table.column(1).read::<[f32; 3]>(row), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_add_column_default_fills_existing_rows() {
        let fx = fixture();
        let mut table = Table::new("grow");
        table.add_column(fx.position, fx.registry.attribute(fx.position), true);
        for _ in 0..3 {
            table.allocate_row();
        }
        table.add_column(fx.velocity, fx.registry.attribute(fx.velocity), true);
        for row in 0..3 {
            assert_eq!(table.column(1).read::<[f32; 3]>(row), [1.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_growth_step_doubles() {
        let fx = fixture();
        let mut table = make_table(&fx);
        assert_eq!(table.capacity(), 128);
        for _ in 0..129 {
            table.allocate_row();
        }
        assert_eq!(table.capacity(), 256);
        for _ in 129..257 {
            table.allocate_row();
        }
        assert_eq!(table.capacity(), 512);
        assert_eq!(table.num_rows(), 257);
    }

    #[test]
    fn test_growth_preserves_values() {
        let fx = fixture();
        let mut table = make_table(&fx);
        for i in 0..128 {
            let row = table.allocate_row();
            table.column_mut(0).write(row, [i as f32, 0.0, 0.0]);
        }
        table.allocate_row();
        assert_eq!(table.column(0).read::<[f32; 3]>(77), [77.0, 0.0, 0.0]);
    }

    #[test]
    fn test_free_rows_are_reused_lifo() {
        let fx = fixture();
        let mut table = make_table(&fx);
        for _ in 0..10 {
            table.allocate_row();
        }
        table.free_row(2);
        table.free_row(5);
        table.free_row(7);

        assert_eq!(table.allocate_row(), 7);
        assert_eq!(table.allocate_row(), 5);
        assert_eq!(table.allocate_row(), 2);
        assert_eq!(table.num_rows(), 10);

        // Free list drained; the next allocation appends.
        assert_eq!(table.allocate_row(), 10);
    }

    #[test]
    fn test_reused_row_is_reset_to_defaults() {
        let fx = fixture();
        let mut table = make_table(&fx);
        let row = table.allocate_row();
        table.column_mut(0).write(row, [9.0f32, 9.0, 9.0]);
        table.free_row(row);
        let again = table.allocate_row();
        assert_eq!(again, row);
        assert_eq!(table.column(0).read::<[f32; 3]>(again), [0.0; 3]);
    }

    #[test]
    fn test_defragment_compacts_and_reports_moves() {
        let fx = fixture();
        let mut table = make_table(&fx);
        for i in 0..10 {
            let row = table.allocate_row();
            table.column_mut(0).write(row, [i as f32, 0.0, 0.0]);
        }
        table.free_row(2);
        table.free_row(5);
        table.free_row(7);

        let (reclaimed, moves) = table.defragment();
        assert_eq!(reclaimed, 3);
        assert_eq!(table.num_rows(), 7);
        assert_eq!(
            moves,
            vec![
                RowMove { from: 9, to: 7 },
                RowMove { from: 8, to: 5 },
                RowMove { from: 7, to: 2 },
            ]
        );

        // Only originally-live values remain in [0, num_rows).
        let mut survivors: Vec<f32> = (0..table.num_rows())
            .map(|row| table.column(0).read::<[f32; 3]>(row)[0])
            .collect();
        survivors.sort_by(f32::total_cmp);
        assert_eq!(survivors, vec![0.0, 1.0, 3.0, 4.0, 6.0, 8.0, 9.0]);
    }

    #[test]
    fn test_defragment_skips_already_swapped_entries() {
        let fx = fixture();
        let mut table = make_table(&fx);
        for _ in 0..3 {
            table.allocate_row();
        }
        // Free the tail row, then compact another slot: the tail row is
        // swapped down, leaving its free-list entry pointing past the end.
        table.free_row(2);
        table.erase_swap(0);
        assert_eq!(table.num_rows(), 2);

        let (reclaimed, moves) = table.defragment();
        assert_eq!(reclaimed, 0);
        assert!(moves.is_empty());
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.pending_free(), 0);
    }

    #[test]
    fn test_clean_drops_rows_but_keeps_buffers() {
        let fx = fixture();
        let mut table = make_table(&fx);
        for _ in 0..200 {
            table.allocate_row();
        }
        let capacity = table.capacity();
        table.clean();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.capacity(), capacity);
    }

    #[test]
    fn test_row_blob_roundtrip() {
        let fx = fixture();
        let mut table = make_table(&fx);
        table.add_column(fx.frozen, fx.registry.attribute(fx.frozen), true);
        let row = table.allocate_row();
        table.column_mut(0).write(row, [1.0f32, 2.0, 3.0]);
        table.column_mut(1).write(row, [4.0f32, 5.0, 6.0]);

        let blob = table.serialize_row(row);
        assert_eq!(blob.len(), table.row_blob_size());
        assert_eq!(blob.len(), 24);

        let other = table.allocate_row();
        table.deserialize_row(&blob, other);
        assert_eq!(table.column(0).read::<[f32; 3]>(other), [1.0, 2.0, 3.0]);
        assert_eq!(table.column(1).read::<[f32; 3]>(other), [4.0, 5.0, 6.0]);
    }
}
