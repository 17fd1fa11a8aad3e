//! Core type definitions for the latetile engine: cell values, column
//! routing descriptors and per-row validity bitmaps.

pub mod bitmap;
pub mod schema;
pub mod value;

pub use bitmap::{ValidityBitmap, ValidityBitmapBuilder};
pub use schema::{ColumnDescriptor, Schema, TileSlot};
pub use value::TileValue;
