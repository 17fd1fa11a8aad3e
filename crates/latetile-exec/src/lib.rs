//! Late-materialization tile engine.
//!
//! Joins never copy values. A join of two tiles yields a [`LogicalTile`]
//! whose columns route to base tiles and whose rows are addressed through
//! a mixed-radix decomposition of the cartesian row space; cell reads walk
//! the routing chain down to a [`PhysicalTile`] on demand.

pub mod addressing;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod join;
pub mod tile;

pub use addressing::{RowCoords, RowSpace, derived_row};
pub use compose::{OperandSlots, TileComposer};
pub use config::{DEFAULT_PARALLEL_THRESHOLD, DEFAULT_ROWS_PER_MORSEL, JoinConfig};
pub use dispatch::{RowMorsel, partition_row_morsels, populate_validity};
pub use join::{JoinOperator, JoinPredicate, join};
pub use latetile_error::{ErrorCode, Result, TileError};
pub use latetile_types::{
    ColumnDescriptor, Schema, TileSlot, TileValue, ValidityBitmap, ValidityBitmapBuilder,
};
pub use tile::{LogicalTile, PhysicalTile, RowRef, Tile, TileRef};
