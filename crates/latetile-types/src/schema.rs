//! Column routing: descriptors and the ordered schema built from them.

use std::fmt;

use latetile_error::{Result, TileError};

/// Which tile owns the data behind a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TileSlot {
    /// The tile itself (physical tiles only).
    Own,
    /// Index into a logical tile's base-tile list.
    Base(usize),
}

impl fmt::Display for TileSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Own => f.write_str("self"),
            Self::Base(idx) => write!(f, "base#{idx}"),
        }
    }
}

/// Routing entry for one output column: `(base tile, column in that tile)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ColumnDescriptor {
    pub slot: TileSlot,
    pub column: usize,
}

impl ColumnDescriptor {
    /// Descriptor for a physical tile's own column.
    #[must_use]
    pub const fn own(column: usize) -> Self {
        Self {
            slot: TileSlot::Own,
            column,
        }
    }

    /// Descriptor routing to column `column` of base slot `slot`.
    #[must_use]
    pub const fn base(slot: usize, column: usize) -> Self {
        Self {
            slot: TileSlot::Base(slot),
            column,
        }
    }
}

/// Ordered column descriptors; position is output column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
}

impl Schema {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Self-referencing schema of a physical tile with `column_count` columns.
    #[must_use]
    pub fn self_referencing(column_count: usize) -> Self {
        (0..column_count).map(ColumnDescriptor::own).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Descriptor of output column `column`.
    ///
    /// # Errors
    ///
    /// Returns `ColumnOutOfRange` when `column >= len()`.
    pub fn get(&self, column: usize) -> Result<ColumnDescriptor> {
        self.columns
            .get(column)
            .copied()
            .ok_or(TileError::ColumnOutOfRange {
                column,
                column_count: self.columns.len(),
            })
    }

    pub fn push(&mut self, descriptor: ColumnDescriptor) {
        self.columns.push(descriptor);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.columns.reserve(additional);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDescriptor> {
        self.columns.iter()
    }
}

impl FromIterator<ColumnDescriptor> for Schema {
    fn from_iter<I: IntoIterator<Item = ColumnDescriptor>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<ColumnDescriptor>> for Schema {
    fn from(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a ColumnDescriptor;
    type IntoIter = std::slice::Iter<'a, ColumnDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
