//! Query results: per-table views over live rows and filtered columns.

use crate::database::{Database, DatabaseError, TableId};
use crate::table::Column;

/// One matched table: its handle, the row count captured at query time, and
/// the column indices resolved in filter-attribute order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    /// Handle of the matched table.
    pub table: TableId,
    /// Row count at query (or last validation) time.
    pub num_rows: usize,
    /// Column indices, one per inclusive filter attribute, in filter order.
    pub columns: Vec<usize>,
}

impl TableView {
    /// Borrow the `i`-th filtered column of this view.
    pub fn column<'db>(&self, db: &'db Database, i: usize) -> Result<&'db Column, DatabaseError> {
        let table = db.table(self.table)?;
        let column = *self
            .columns
            .get(i)
            .ok_or_else(|| DatabaseError::ColumnOutOfRange {
                table: table.name().to_string(),
                column: i,
            })?;
        Ok(table.column(column))
    }

    /// Packed bytes of the `i`-th filtered column, covering this view's
    /// rows. Empty for tag columns.
    ///
    /// A view is only as fresh as its last query or
    /// [`validate`](Dataset::validate); reading through a view after a
    /// structural change to the table may panic on a shrunken buffer.
    pub fn column_bytes<'db>(&self, db: &'db Database, i: usize) -> Result<&'db [u8], DatabaseError> {
        Ok(self.column(db, i)?.bytes(self.num_rows))
    }
}

/// The result of [`Database::query`]: one view per matched table.
///
/// A dataset may be cached across frames while tables churn underneath it;
/// call [`validate`](Dataset::validate) before reuse to drop views whose
/// table has gone away and refresh the row counts of the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    views: Vec<TableView>,
}

impl Dataset {
    pub(crate) fn new(views: Vec<TableView>) -> Self {
        Self { views }
    }

    /// The matched views.
    #[must_use]
    pub fn views(&self) -> &[TableView] {
        &self.views
    }

    /// Number of matched tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns `true` if no table matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Iterate the matched views.
    pub fn iter(&self) -> std::slice::Iter<'_, TableView> {
        self.views.iter()
    }

    /// Re-check every view against `db`: views whose table handle no longer
    /// validates are dropped, surviving views get their row count refreshed.
    pub fn validate(&mut self, db: &Database) {
        self.views.retain_mut(|view| match db.num_rows(view.table) {
            Ok(num_rows) => {
                view.num_rows = num_rows;
                true
            }
            Err(_) => false,
        });
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a TableView;
    type IntoIter = std::slice::Iter<'a, TableView>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.iter()
    }
}
