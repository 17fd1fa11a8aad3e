//! Schema composition for tiles under construction.
//!
//! [`TileComposer`] folds input tiles into a growing base-tile list and
//! schema. Base tiles are compared by identity (`Arc::ptr_eq`), never by
//! content: two physical tiles holding equal data are still two tiles, while
//! one physical tile reached through two operands occupies a single slot.

use std::sync::Arc;

use latetile_error::{Result, TileError};
use latetile_types::{ColumnDescriptor, Schema, TileSlot};
use smallvec::SmallVec;
use tracing::debug;

use crate::tile::{Tile, TileRef};

/// Slots in the composed base list that an absorbed tile's row space maps to.
///
/// For a physical tile this is its own slot. For a logical tile it has one
/// entry per slot of that tile's row space, in the same order.
pub type OperandSlots = SmallVec<[usize; 4]>;

/// Builder state of a logical tile: deduplicated base list plus schema.
#[derive(Debug, Clone, Default)]
pub struct TileComposer {
    base_tiles: Vec<TileRef>,
    schema: Schema,
}

impl TileComposer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `tile`'s columns, in order, routed to their owning base tiles.
    ///
    /// A logical tile contributes its own base tiles rather than itself, so
    /// composed tiles stay one level deep over whatever their inputs were
    /// built from. All of its base tiles are interned, including ones no
    /// column routes to, because each of them still multiplies its row space.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` when a logical tile routes a column to itself.
    pub fn absorb(&mut self, tile: &TileRef) -> Result<OperandSlots> {
        match tile.as_ref() {
            Tile::Physical(physical) => {
                let slot = self.intern(tile);
                self.schema.reserve(physical.column_count());
                for column in 0..physical.column_count() {
                    self.schema.push(ColumnDescriptor::base(slot, column));
                }
                Ok(SmallVec::from_elem(slot, 1))
            }
            Tile::Logical(logical) => {
                let remap: OperandSlots = logical
                    .base_tiles()
                    .iter()
                    .map(|base| self.intern(base))
                    .collect();
                for (column, descriptor) in logical.schema().iter().enumerate() {
                    let TileSlot::Base(old_slot) = descriptor.slot else {
                        return Err(TileError::malformed(format!(
                            "column {column} of a logical tile routes to itself"
                        )));
                    };
                    self.schema
                        .push(ColumnDescriptor::base(remap[old_slot], descriptor.column));
                }
                Ok(remap)
            }
        }
    }

    #[must_use]
    pub fn base_tiles(&self) -> &[TileRef] {
        &self.base_tiles
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Consume the builder, yielding `(base_tiles, schema)`.
    #[must_use]
    pub fn finish(self) -> (Vec<TileRef>, Schema) {
        (self.base_tiles, self.schema)
    }

    fn intern(&mut self, tile: &TileRef) -> usize {
        if let Some(slot) = self
            .base_tiles
            .iter()
            .position(|existing| Arc::ptr_eq(existing, tile))
        {
            debug!(slot, "base tile already present; reusing slot");
            return slot;
        }
        self.base_tiles.push(Arc::clone(tile));
        self.base_tiles.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use latetile_types::{TileValue, ValidityBitmap};

    use super::*;
    use crate::tile::{LogicalTile, PhysicalTile};

    fn physical(rows: usize, columns: usize) -> TileRef {
        let grid = (0..rows)
            .map(|r| {
                (0..columns)
                    .map(|c| TileValue::Integer((r * 10 + c) as i64))
                    .collect()
            })
            .collect();
        Tile::from(PhysicalTile::from_rows(grid).unwrap()).into_ref()
    }

    #[test]
    fn absorbing_physical_tiles_appends_one_slot_each() {
        let a = physical(2, 2);
        let b = physical(3, 1);
        let mut composer = TileComposer::new();
        assert_eq!(composer.absorb(&a).unwrap().as_slice(), &[0]);
        assert_eq!(composer.absorb(&b).unwrap().as_slice(), &[1]);
        let (bases, schema) = composer.finish();
        assert_eq!(bases.len(), 2);
        assert_eq!(
            schema.as_slice(),
            &[
                ColumnDescriptor::base(0, 0),
                ColumnDescriptor::base(0, 1),
                ColumnDescriptor::base(1, 0),
            ]
        );
    }

    #[test]
    fn identical_content_is_not_deduplicated() {
        let a = physical(2, 1);
        let twin = physical(2, 1);
        let mut composer = TileComposer::new();
        composer.absorb(&a).unwrap();
        composer.absorb(&twin).unwrap();
        assert_eq!(composer.base_tiles().len(), 2);
    }

    #[test]
    fn same_tile_twice_shares_a_slot() {
        let a = physical(2, 2);
        let mut composer = TileComposer::new();
        composer.absorb(&a).unwrap();
        composer.absorb(&a).unwrap();
        assert_eq!(composer.base_tiles().len(), 1);
        assert_eq!(composer.schema().len(), 4);
        assert!(
            composer
                .schema()
                .iter()
                .all(|d| d.slot == TileSlot::Base(0))
        );
    }

    #[test]
    fn logical_tiles_are_flattened_and_renumbered() {
        let a = physical(2, 1);
        let b = physical(3, 2);
        let logical = Tile::from(
            LogicalTile::from_parts(
                vec![Arc::clone(&b), Arc::clone(&a)],
                Schema::from(vec![
                    ColumnDescriptor::base(1, 0),
                    ColumnDescriptor::base(0, 1),
                ]),
                ValidityBitmap::all_valid(6),
            )
            .unwrap(),
        )
        .into_ref();

        let mut composer = TileComposer::new();
        composer.absorb(&a).unwrap();
        let slots = composer.absorb(&logical).unwrap();
        // `b` is new (slot 1); `a` is already slot 0.
        assert_eq!(slots.as_slice(), &[1, 0]);
        let (bases, schema) = composer.finish();
        assert_eq!(bases.len(), 2);
        assert!(Arc::ptr_eq(&bases[0], &a));
        assert!(Arc::ptr_eq(&bases[1], &b));
        assert_eq!(
            schema.as_slice(),
            &[
                ColumnDescriptor::base(0, 0),
                ColumnDescriptor::base(0, 0),
                ColumnDescriptor::base(1, 1),
            ]
        );
    }

    #[test]
    fn unreferenced_bases_still_join_the_row_space() {
        let a = physical(2, 1);
        let b = physical(3, 1);
        let logical = Tile::from(
            LogicalTile::from_parts(
                vec![Arc::clone(&a), Arc::clone(&b)],
                Schema::from(vec![ColumnDescriptor::base(0, 0)]),
                ValidityBitmap::all_valid(6),
            )
            .unwrap(),
        )
        .into_ref();
        let mut composer = TileComposer::new();
        composer.absorb(&logical).unwrap();
        assert_eq!(composer.base_tiles().len(), 2);
        assert_eq!(composer.schema().len(), 1);
    }
}
