//! Join operator: cartesian composition of two tiles into a logical tile.
//!
//! The result owns no values. Its schema is every column of `left` followed
//! by every column of `right`, routed through a deduplicated base-tile list,
//! and its validity bitmap marks the virtual rows whose base rows all exist.
//! An optional row predicate can then invalidate further rows; that is the
//! hook a predicate-evaluating join stage plugs into.

use std::fmt;
use std::sync::Arc;

use latetile_error::Result;
use smallvec::SmallVec;
use tracing::{debug_span, info};

use crate::addressing::RowSpace;
use crate::compose::{OperandSlots, TileComposer};
use crate::config::JoinConfig;
use crate::dispatch::populate_validity;
use crate::tile::{LogicalTile, RowRef, Tile, TileRef};

/// Row filter applied to structurally valid join output rows.
pub type JoinPredicate = Arc<dyn Fn(&RowRef<'_>) -> bool + Send + Sync + 'static>;

/// Configured join operator.
#[derive(Clone, Default)]
pub struct JoinOperator {
    config: JoinConfig,
    predicate: Option<JoinPredicate>,
}

impl fmt::Debug for JoinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinOperator")
            .field("config", &self.config)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl JoinOperator {
    /// Create an operator with explicit config.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the config fails validation.
    pub fn new(config: JoinConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            predicate: None,
        })
    }

    /// Invalidate output rows for which `predicate` returns false.
    #[must_use]
    pub fn with_predicate(mut self, predicate: JoinPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Combine `left` and `right` into a new logical tile.
    ///
    /// Row `r` of the result pairs base row `derived(r, s)` of every base
    /// slot `s`; it is valid iff each of those base rows is valid, each
    /// logical operand's own bitmap admits the pairing, and the predicate (if
    /// any) accepts it.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` / `RowSpaceOverflow` for inputs whose row
    /// spaces cannot be composed, and `WorkerPanicked` if a validity worker
    /// panics.
    pub fn join(&self, left: &TileRef, right: &TileRef) -> Result<LogicalTile> {
        let _span = debug_span!(
            "tile_join",
            left_columns = left.column_count(),
            right_columns = right.column_count(),
            predicate = self.predicate.is_some(),
        )
        .entered();

        let mut composer = TileComposer::new();
        let left_slots = composer.absorb(left)?;
        let right_slots = composer.absorb(right)?;
        let (base_tiles, schema) = composer.finish();

        let row_counts: SmallVec<[usize; 4]> = base_tiles.iter().map(|t| t.row_count()).collect();
        let row_space = RowSpace::new(&row_counts)?;
        let total_rows = row_space.total_rows();

        let validity = {
            let probe = ValidityProbe::new(&row_space, &base_tiles, [
                (left, left_slots),
                (right, right_slots),
            ]);
            populate_validity(total_rows, &self.config, |row| probe.is_valid(row))?
        };

        let mut tile = LogicalTile::from_parts(base_tiles, schema, validity)?;
        if let Some(predicate) = &self.predicate {
            let filtered = (0..tile.row_count())
                .map(|row| tile.validity().is_valid(row) && predicate(&RowRef::new(&tile, row)))
                .collect();
            tile = tile.with_validity(filtered)?;
        }

        info!(
            base_tiles = tile.base_tiles().len(),
            columns = tile.column_count(),
            rows = total_rows,
            valid_rows = tile.valid_row_count(),
            parallel = self.config.is_parallel_for(total_rows),
            "join produced logical tile"
        );
        Ok(tile)
    }
}

/// Join `left` and `right` with the default configuration.
///
/// # Errors
///
/// See [`JoinOperator::join`].
pub fn join(left: &TileRef, right: &TileRef) -> Result<LogicalTile> {
    JoinOperator::default().join(left, right)
}

/// Existence test for one virtual row of a join under construction.
struct ValidityProbe<'a> {
    row_space: &'a RowSpace,
    base_tiles: &'a [TileRef],
    /// Logical operands whose bitmaps may reject rows their bases accept.
    filtered_operands: SmallVec<[(&'a LogicalTile, OperandSlots); 2]>,
}

impl<'a> ValidityProbe<'a> {
    fn new(
        row_space: &'a RowSpace,
        base_tiles: &'a [TileRef],
        operands: [(&'a TileRef, OperandSlots); 2],
    ) -> Self {
        let filtered_operands = operands
            .into_iter()
            .filter_map(|(tile, slots)| match tile.as_ref() {
                Tile::Logical(logical) if !logical.validity().all_set() => Some((logical, slots)),
                _ => None,
            })
            .collect();
        Self {
            row_space,
            base_tiles,
            filtered_operands,
        }
    }

    fn is_valid(&self, row: usize) -> bool {
        let bases_valid = self
            .base_tiles
            .iter()
            .enumerate()
            .all(|(slot, base)| base.validity().is_valid(self.row_space.coordinate(row, slot)));
        bases_valid
            && self.filtered_operands.iter().all(|(operand, slots)| {
                let operand_row = operand
                    .row_space()
                    .compose_with(|slot| self.row_space.coordinate(row, slots[slot]));
                operand.validity().is_valid(operand_row)
            })
    }
}

#[cfg(test)]
mod tests {
    use latetile_types::{ColumnDescriptor, TileSlot, TileValue};

    use super::*;
    use crate::tile::PhysicalTile;

    fn ints(rows: &[&[i64]]) -> TileRef {
        Tile::from(
            PhysicalTile::from_rows(
                rows.iter()
                    .map(|r| r.iter().copied().map(TileValue::Integer).collect())
                    .collect(),
            )
            .expect("physical tile"),
        )
        .into_ref()
    }

    fn int(tile: &LogicalTile, row: usize, column: usize) -> Option<i64> {
        tile.get_cell(row, column)
            .unwrap()
            .and_then(TileValue::as_integer)
    }

    #[test]
    fn join_two_physical_tiles() {
        let p1 = ints(&[&[100, 200], &[300, 400]]);
        let p2 = ints(&[&[7], &[8], &[9]]);
        let joined = join(&p1, &p2).unwrap();
        assert_eq!(joined.row_count(), 6);
        assert_eq!(joined.column_count(), 3);
        assert_eq!(int(&joined, 4, 2), Some(8));
        assert_eq!(int(&joined, 4, 0), Some(300));
        assert_eq!(int(&joined, 4, 1), Some(400));
        assert_eq!(joined.valid_row_count(), 6);
    }

    #[test]
    fn column_order_is_left_then_right() {
        let p1 = ints(&[&[1, 2]]);
        let p2 = ints(&[&[3]]);
        let joined = join(&p2, &p1).unwrap();
        assert_eq!(
            joined.schema().as_slice(),
            &[
                ColumnDescriptor::base(0, 0),
                ColumnDescriptor::base(1, 0),
                ColumnDescriptor::base(1, 1),
            ]
        );
    }

    #[test]
    fn invalid_base_row_invalidates_dependent_rows() {
        let p1 = ints(&[&[100, 200], &[300, 400]]);
        let p2 = Tile::from(
            PhysicalTile::from_rows(vec![
                vec![TileValue::Integer(7)],
                vec![TileValue::Integer(8)],
                vec![TileValue::Integer(9)],
            ])
            .unwrap()
            .with_invalid_rows(&[2])
            .unwrap(),
        )
        .into_ref();
        let joined = join(&p1, &p2).unwrap();
        for row in 0..joined.row_count() {
            let expect_valid = row % 3 != 2;
            assert_eq!(joined.validity().is_valid(row), expect_valid, "row {row}");
            if !expect_valid {
                for column in 0..joined.column_count() {
                    assert_eq!(joined.get_cell(row, column).unwrap(), None);
                }
            }
        }
    }

    #[test]
    fn rejoining_a_base_tile_deduplicates_it() {
        let p1 = ints(&[&[100, 200], &[300, 400]]);
        let p2 = ints(&[&[7], &[8], &[9]]);
        let inner = Tile::from(join(&p1, &p2).unwrap()).into_ref();
        let outer = join(&inner, &p1).unwrap();
        assert_eq!(outer.base_tiles().len(), 2);
        assert_eq!(outer.row_count(), 6);
        assert_eq!(outer.column_count(), 5);
        assert!(
            outer
                .schema()
                .iter()
                .all(|d| matches!(d.slot, TileSlot::Base(0 | 1)))
        );
        // The re-added P1 columns read the same P1 row as the original ones.
        for row in 0..outer.row_count() {
            assert_eq!(int(&outer, row, 0), int(&outer, row, 3));
            assert_eq!(int(&outer, row, 1), int(&outer, row, 4));
        }
    }

    #[test]
    fn three_way_join_addresses_every_combination() {
        let a = ints(&[&[1], &[2]]);
        let b = ints(&[&[10], &[20], &[30]]);
        let c = ints(&[&[100], &[200]]);
        let ab = Tile::from(join(&a, &b).unwrap()).into_ref();
        let abc = join(&ab, &c).unwrap();
        assert_eq!(abc.row_count(), 12);
        let mut sums: Vec<i64> = (0..abc.row_count())
            .map(|row| (0..3).filter_map(|col| int(&abc, row, col)).sum())
            .collect();
        sums.sort_unstable();
        let mut expected: Vec<i64> = [1_i64, 2]
            .into_iter()
            .flat_map(|x| {
                [10_i64, 20, 30]
                    .into_iter()
                    .flat_map(move |y| [100_i64, 200].map(move |z| x + y + z))
            })
            .collect();
        expected.sort_unstable();
        assert_eq!(sums, expected);
        // Last base varies fastest.
        assert_eq!(int(&abc, 1, 2), Some(200));
        assert_eq!(int(&abc, 2, 1), Some(20));
    }

    #[test]
    fn predicate_invalidates_rows() {
        let p1 = ints(&[&[1], &[2], &[3]]);
        let p2 = ints(&[&[2], &[3]]);
        let operator = JoinOperator::new(JoinConfig::serial())
            .unwrap()
            .with_predicate(Arc::new(|row: &RowRef<'_>| {
                row.get(0).ok().flatten() == row.get(1).ok().flatten()
            }));
        let joined = operator.join(&p1, &p2).unwrap();
        assert_eq!(joined.row_count(), 6);
        assert_eq!(joined.valid_row_count(), 2);
        let matches: Vec<Option<i64>> = joined
            .validity()
            .iter_valid()
            .map(|row| int(&joined, row, 0))
            .collect();
        assert_eq!(matches, vec![Some(2), Some(3)]);
    }

    #[test]
    fn filtered_operand_survives_flattening() {
        let p1 = ints(&[&[1], &[2], &[3]]);
        let p2 = ints(&[&[2], &[3]]);
        let p3 = ints(&[&[50], &[60]]);
        let filtered = JoinOperator::new(JoinConfig::serial())
            .unwrap()
            .with_predicate(Arc::new(|row: &RowRef<'_>| {
                row.get(0).ok().flatten() == row.get(1).ok().flatten()
            }))
            .join(&p1, &p2)
            .unwrap();
        let filtered = Tile::from(filtered).into_ref();
        let joined = join(&filtered, &p3).unwrap();
        assert_eq!(joined.row_count(), 12);
        assert_eq!(joined.valid_row_count(), 4);
        for row in joined.validity().iter_valid() {
            assert_eq!(int(&joined, row, 0), int(&joined, row, 1));
        }
    }

    #[test]
    fn parallel_join_matches_serial() {
        let left_rows: Vec<Vec<TileValue>> = (0..40).map(|i| vec![TileValue::Integer(i)]).collect();
        let right_rows: Vec<Vec<TileValue>> = (0..30).map(|i| vec![TileValue::Integer(i)]).collect();
        let left = Tile::from(
            PhysicalTile::from_rows(left_rows)
                .unwrap()
                .with_invalid_rows(&[3, 17])
                .unwrap(),
        )
        .into_ref();
        let right = Tile::from(
            PhysicalTile::from_rows(right_rows)
                .unwrap()
                .with_invalid_rows(&[0, 29])
                .unwrap(),
        )
        .into_ref();
        let serial = JoinOperator::new(JoinConfig::serial())
            .unwrap()
            .join(&left, &right)
            .unwrap();
        let parallel = JoinOperator::new(JoinConfig {
            parallel_threshold: 1,
            worker_threads: 3,
            rows_per_morsel: 40,
        })
        .unwrap()
        .join(&left, &right)
        .unwrap();
        assert_eq!(serial.validity(), parallel.validity());
        assert_eq!(serial.valid_row_count(), 38 * 28);
    }

    #[test]
    fn empty_operand_yields_empty_tile() {
        let p1 = ints(&[&[1]]);
        let empty = Tile::from(PhysicalTile::with_columns(2, Vec::new()).unwrap()).into_ref();
        let joined = join(&p1, &empty).unwrap();
        assert_eq!(joined.row_count(), 0);
        assert_eq!(joined.column_count(), 3);
    }

    #[test]
    fn unroundable_morsel_size_is_an_error_not_a_panic() {
        let config = JoinConfig {
            parallel_threshold: 0,
            worker_threads: 2,
            rows_per_morsel: usize::MAX,
        };
        let err = JoinOperator::new(config).unwrap_err();
        assert!(err.to_string().starts_with("invalid join config"));

        let p1 = ints(&[&[1], &[2], &[3]]);
        let p2 = ints(&[&[4], &[5], &[6]]);
        let bitmap_err = populate_validity(9, &config, |_| true).unwrap_err();
        assert_eq!(bitmap_err.error_code(), latetile_error::ErrorCode::Misuse);
        assert_eq!(join(&p1, &p2).unwrap().row_count(), 9);
    }

    #[test]
    fn invalid_config_rejected() {
        let err = JoinOperator::new(JoinConfig {
            worker_threads: 0,
            ..JoinConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid join config"));
    }
}
