//! Physical and logical tiles.
//!
//! A [`PhysicalTile`] owns a dense row-major grid of values. A
//! [`LogicalTile`] owns nothing but shared handles to its base tiles, a
//! schema routing each of its columns to one base tile's column, and a
//! validity bitmap over its own (cartesian) row space. Reading a cell from a
//! logical tile forwards the read down the chain until a physical tile
//! answers it.

use std::fmt;
use std::sync::Arc;

use latetile_error::{Result, TileError};
use latetile_types::{ColumnDescriptor, Schema, TileSlot, TileValue, ValidityBitmap};
use smallvec::SmallVec;
use tracing::trace;

use crate::addressing::RowSpace;

/// Shared, immutable handle to a tile.
pub type TileRef = Arc<Tile>;

/// A unit of tabular data: materialized or composed.
#[derive(Debug, Clone)]
pub enum Tile {
    Physical(PhysicalTile),
    Logical(LogicalTile),
}

impl Tile {
    /// Total addressable rows, valid or not.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Physical(tile) => tile.row_count(),
            Self::Logical(tile) => tile.row_count(),
        }
    }

    /// Total addressable columns; always equal to `schema().len()`.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema().len()
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        match self {
            Self::Physical(tile) => tile.schema(),
            Self::Logical(tile) => tile.schema(),
        }
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityBitmap {
        match self {
            Self::Physical(tile) => tile.validity(),
            Self::Logical(tile) => tile.validity(),
        }
    }

    /// Whether row `row` exists.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` when `row >= row_count()`.
    pub fn is_row_valid(&self, row: usize) -> Result<bool> {
        TileError::check_row(row, self.row_count())?;
        Ok(self.validity().is_valid(row))
    }

    /// Value at `(row, column)`; `None` for invalid rows and NULL cells.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` / `ColumnOutOfRange` for indices past the
    /// tile bounds.
    pub fn get_cell(&self, row: usize, column: usize) -> Result<Option<&TileValue>> {
        match self {
            Self::Physical(tile) => tile.get_cell(row, column),
            Self::Logical(tile) => tile.get_cell(row, column),
        }
    }

    /// Indices of valid rows, ascending.
    pub fn valid_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.validity().iter_valid()
    }

    #[must_use]
    pub fn valid_row_count(&self) -> usize {
        self.validity().count_valid()
    }

    /// Copy every valid row into a fresh physical tile.
    ///
    /// Absent cells become `TileValue::Null`; the result has no invalid rows.
    ///
    /// # Errors
    ///
    /// Propagates cell-resolution errors, which only occur for malformed
    /// tiles.
    pub fn materialize(&self) -> Result<PhysicalTile> {
        let column_count = self.column_count();
        let mut rows = Vec::with_capacity(self.valid_row_count());
        for row in self.valid_rows() {
            let mut values = Vec::with_capacity(column_count);
            for column in 0..column_count {
                values.push(self.get_cell(row, column)?.cloned().unwrap_or(TileValue::Null));
            }
            rows.push(values);
        }
        PhysicalTile::with_columns(column_count, rows)
    }

    #[must_use]
    pub const fn as_physical(&self) -> Option<&PhysicalTile> {
        match self {
            Self::Physical(tile) => Some(tile),
            Self::Logical(_) => None,
        }
    }

    #[must_use]
    pub const fn as_logical(&self) -> Option<&LogicalTile> {
        match self {
            Self::Logical(tile) => Some(tile),
            Self::Physical(_) => None,
        }
    }

    /// Wrap in a shared handle.
    #[must_use]
    pub fn into_ref(self) -> TileRef {
        Arc::new(self)
    }
}

impl From<PhysicalTile> for Tile {
    fn from(tile: PhysicalTile) -> Self {
        Self::Physical(tile)
    }
}

impl From<LogicalTile> for Tile {
    fn from(tile: LogicalTile) -> Self {
        Self::Logical(tile)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Physical(_) => "physical",
            Self::Logical(_) => "logical",
        };
        writeln!(
            f,
            "{kind} tile: rows={} valid={} columns={}",
            self.row_count(),
            self.valid_row_count(),
            self.column_count()
        )?;
        for row in self.valid_rows() {
            for column in 0..self.column_count() {
                if column > 0 {
                    f.write_str(" ")?;
                }
                match self.get_cell(row, column).map_err(|_| fmt::Error)? {
                    Some(value) => write!(f, "{value}")?,
                    None => f.write_str("NULL")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Physical Tile ──────────────────────────────────────────────────────────

/// Dense, immutable grid of materialized values.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalTile {
    /// Row-major cells, `row_count * column_count` long.
    values: Vec<TileValue>,
    row_count: usize,
    schema: Schema,
    validity: ValidityBitmap,
}

impl PhysicalTile {
    /// Build from rows, taking the width from the first row.
    ///
    /// An empty `rows` yields a tile with no rows and no columns; use
    /// [`with_columns`](Self::with_columns) to fix the width explicitly.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` when rows differ in width.
    pub fn from_rows(rows: Vec<Vec<TileValue>>) -> Result<Self> {
        let column_count = rows.first().map_or(0, Vec::len);
        Self::with_columns(column_count, rows)
    }

    /// Build from rows of exactly `column_count` values each.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` when a row has a different width.
    pub fn with_columns(column_count: usize, rows: Vec<Vec<TileValue>>) -> Result<Self> {
        let row_count = rows.len();
        let mut values = Vec::with_capacity(row_count.saturating_mul(column_count));
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != column_count {
                return Err(TileError::malformed(format!(
                    "row {row_idx} has {} values, expected {column_count}",
                    row.len()
                )));
            }
            values.extend(row);
        }
        Ok(Self {
            values,
            row_count,
            schema: Schema::self_referencing(column_count),
            validity: ValidityBitmap::all_valid(row_count),
        })
    }

    /// Replace the per-row validity.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` when the bitmap length differs from the row
    /// count.
    pub fn with_validity(mut self, validity: ValidityBitmap) -> Result<Self> {
        if validity.len() != self.row_count {
            return Err(TileError::malformed(format!(
                "validity covers {} rows, tile has {}",
                validity.len(),
                self.row_count
            )));
        }
        self.validity = validity;
        Ok(self)
    }

    /// Mark the listed rows invalid.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` for a row past the tile.
    pub fn with_invalid_rows(mut self, rows: &[usize]) -> Result<Self> {
        for &row in rows {
            self.validity = self.validity.with_row(row, false)?;
        }
        Ok(self)
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn validity(&self) -> &ValidityBitmap {
        &self.validity
    }

    /// Stored value at `(row, column)`, ignoring row validity.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` / `ColumnOutOfRange` past the grid.
    pub fn value(&self, row: usize, column: usize) -> Result<&TileValue> {
        TileError::check_row(row, self.row_count)?;
        TileError::check_column(column, self.column_count())?;
        Ok(&self.values[row * self.column_count() + column])
    }

    /// Value at `(row, column)`; `None` for invalid rows and NULL cells.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` / `ColumnOutOfRange` past the grid.
    pub fn get_cell(&self, row: usize, column: usize) -> Result<Option<&TileValue>> {
        let value = self.value(row, column)?;
        if !self.validity.is_valid(row) || value.is_null() {
            return Ok(None);
        }
        Ok(Some(value))
    }
}

// ── Logical Tile ───────────────────────────────────────────────────────────

/// Composition of shared base tiles; owns routing and validity only.
#[derive(Debug, Clone)]
pub struct LogicalTile {
    base_tiles: Vec<TileRef>,
    schema: Schema,
    validity: ValidityBitmap,
    row_space: RowSpace,
}

impl LogicalTile {
    /// Assemble a logical tile, checking every structural invariant.
    ///
    /// - no base tile appears twice (by identity);
    /// - every descriptor routes to an existing base slot and column;
    /// - the bitmap covers exactly the product of the base row counts.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` (or `RowSpaceOverflow`) on any violation.
    pub fn from_parts(
        base_tiles: Vec<TileRef>,
        schema: Schema,
        validity: ValidityBitmap,
    ) -> Result<Self> {
        for (slot, tile) in base_tiles.iter().enumerate() {
            if let Some(first) = base_tiles[..slot]
                .iter()
                .position(|earlier| Arc::ptr_eq(earlier, tile))
            {
                return Err(TileError::malformed(format!(
                    "base tile appears in slots {first} and {slot}"
                )));
            }
        }

        for (column, descriptor) in schema.iter().enumerate() {
            let TileSlot::Base(slot) = descriptor.slot else {
                return Err(TileError::malformed(format!(
                    "column {column} of a logical tile routes to itself"
                )));
            };
            let base = base_tiles.get(slot).ok_or_else(|| {
                TileError::malformed(format!(
                    "column {column} routes to slot {slot}, only {} base tiles",
                    base_tiles.len()
                ))
            })?;
            if descriptor.column >= base.column_count() {
                return Err(TileError::malformed(format!(
                    "column {column} routes to column {} of slot {slot}, which has {} columns",
                    descriptor.column,
                    base.column_count()
                )));
            }
        }

        let row_counts: SmallVec<[usize; 4]> = base_tiles.iter().map(|t| t.row_count()).collect();
        let row_space = RowSpace::new(&row_counts)?;
        if validity.len() != row_space.total_rows() {
            return Err(TileError::malformed(format!(
                "validity covers {} rows, base tiles {:?} span {}",
                validity.len(),
                row_space.radices(),
                row_space.total_rows()
            )));
        }

        Ok(Self {
            base_tiles,
            schema,
            validity,
            row_space,
        })
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_space.total_rows()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn validity(&self) -> &ValidityBitmap {
        &self.validity
    }

    #[must_use]
    pub fn base_tiles(&self) -> &[TileRef] {
        &self.base_tiles
    }

    #[must_use]
    pub const fn row_space(&self) -> &RowSpace {
        &self.row_space
    }

    #[must_use]
    pub fn valid_row_count(&self) -> usize {
        self.validity.count_valid()
    }

    /// Row of base slot `slot` addressed by virtual row `row`.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` / `SlotOutOfRange`.
    pub fn base_row(&self, row: usize, slot: usize) -> Result<usize> {
        self.row_space.derive_row(row, slot)
    }

    /// Descriptor of column `column` resolved to the base tile it names.
    ///
    /// # Errors
    ///
    /// Returns `ColumnOutOfRange` past the schema.
    pub fn resolve_column(&self, column: usize) -> Result<(usize, &TileRef, ColumnDescriptor)> {
        let descriptor = self.schema.get(column)?;
        let TileSlot::Base(slot) = descriptor.slot else {
            return Err(TileError::malformed(format!(
                "column {column} of a logical tile routes to itself"
            )));
        };
        Ok((slot, &self.base_tiles[slot], descriptor))
    }

    /// Value at `(row, column)`, forwarded to the owning base tile.
    ///
    /// Invalid rows answer `None` without touching any base tile.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` / `ColumnOutOfRange` past the tile bounds.
    pub fn get_cell(&self, row: usize, column: usize) -> Result<Option<&TileValue>> {
        TileError::check_row(row, self.row_count())?;
        let (slot, base, descriptor) = self.resolve_column(column)?;
        if !self.validity.is_valid(row) {
            return Ok(None);
        }
        let base_row = self.row_space.coordinate(row, slot);
        trace!(
            row,
            column,
            slot,
            base_row,
            base_column = descriptor.column,
            "forwarding cell read to base tile"
        );
        base.get_cell(base_row, descriptor.column)
    }

    /// Borrowed view of one row.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` when `row >= row_count()`.
    pub fn row(&self, row: usize) -> Result<RowRef<'_>> {
        TileError::check_row(row, self.row_count())?;
        Ok(RowRef::new(self, row))
    }

    /// Copy of this tile with a different validity bitmap.
    pub(crate) fn with_validity(&self, validity: ValidityBitmap) -> Result<Self> {
        Self::from_parts(self.base_tiles.clone(), self.schema.clone(), validity)
    }
}

/// One row of a logical tile, readable column by column.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    tile: &'a LogicalTile,
    row: usize,
}

impl<'a> RowRef<'a> {
    pub(crate) const fn new(tile: &'a LogicalTile, row: usize) -> Self {
        Self { tile, row }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.tile.column_count()
    }

    /// Cell in column `column` of this row.
    ///
    /// # Errors
    ///
    /// Returns `ColumnOutOfRange` past the schema.
    pub fn get(&self, column: usize) -> Result<Option<&'a TileValue>> {
        self.tile.get_cell(self.row, column)
    }
}
