//! Mixed-radix row addressing over a cartesian product of base tiles.
//!
//! A logical tile's row space is the product of its base tiles' row counts,
//! laid out row-major in base-list order: slot 0 varies slowest and the last
//! slot varies fastest. For row counts `n_0 .. n_{k-1}`:
//!
//! ```text
//! suffix(t)  = n_{t+1} * ... * n_{k-1}        (empty product = 1)
//! modulus(t) = n_t * suffix(t)
//! derived(r, t) = (r mod modulus(t)) div suffix(t)
//! ```
//!
//! Every slot's coordinate is computed from `r` directly. There is no running
//! remainder carried from one slot to the next.

use latetile_error::{Result, TileError};
use smallvec::SmallVec;

/// Per-slot row coordinates for one virtual row.
pub type RowCoords = SmallVec<[usize; 4]>;

/// Row space of a logical tile: the radices plus precomputed suffix products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSpace {
    radices: SmallVec<[usize; 4]>,
    suffix: SmallVec<[usize; 4]>,
    total: usize,
}

impl RowSpace {
    /// Build the row space for base tiles with the given row counts.
    ///
    /// # Errors
    ///
    /// Returns `RowSpaceOverflow` when the product does not fit in `usize`.
    pub fn new(row_counts: &[usize]) -> Result<Self> {
        let mut suffix: SmallVec<[usize; 4]> = SmallVec::from_elem(1, row_counts.len());
        let mut acc = 1_usize;
        for (slot, &count) in row_counts.iter().enumerate().rev() {
            suffix[slot] = acc;
            acc = acc
                .checked_mul(count)
                .ok_or_else(|| TileError::RowSpaceOverflow {
                    row_counts: row_counts.to_vec(),
                })?;
        }
        Ok(Self {
            radices: SmallVec::from_slice(row_counts),
            suffix,
            total: acc,
        })
    }

    /// Number of virtual rows (product of all radices).
    #[must_use]
    pub const fn total_rows(&self) -> usize {
        self.total
    }

    /// Number of base slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.radices.len()
    }

    /// Row counts in slot order.
    #[must_use]
    pub fn radices(&self) -> &[usize] {
        &self.radices
    }

    /// Product of the radices after `slot`.
    ///
    /// # Errors
    ///
    /// Returns `SlotOutOfRange` when `slot >= slot_count()`.
    pub fn suffix_product(&self, slot: usize) -> Result<usize> {
        self.check_slot(slot)?;
        Ok(self.suffix[slot])
    }

    /// Product of the radices from `slot` onward.
    ///
    /// # Errors
    ///
    /// Returns `SlotOutOfRange` when `slot >= slot_count()`.
    pub fn prefix_modulus(&self, slot: usize) -> Result<usize> {
        self.check_slot(slot)?;
        Ok(self.modulus(slot))
    }

    /// Row index in base slot `slot` addressed by virtual row `row`.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` when `row >= total_rows()` and
    /// `SlotOutOfRange` when `slot >= slot_count()`.
    pub fn derive_row(&self, row: usize, slot: usize) -> Result<usize> {
        TileError::check_row(row, self.total)?;
        self.check_slot(slot)?;
        Ok(self.coordinate(row, slot))
    }

    /// All per-slot coordinates of virtual row `row`.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` when `row >= total_rows()`.
    pub fn coordinates(&self, row: usize) -> Result<RowCoords> {
        TileError::check_row(row, self.total)?;
        Ok((0..self.radices.len())
            .map(|slot| self.coordinate(row, slot))
            .collect())
    }

    /// Inverse of [`coordinates`](Self::coordinates).
    ///
    /// # Errors
    ///
    /// Returns `SlotOutOfRange` when `coords` has the wrong arity and
    /// `RowOutOfRange` when a coordinate exceeds its radix.
    pub fn row_of(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.radices.len() {
            return Err(TileError::SlotOutOfRange {
                slot: coords.len(),
                slot_count: self.radices.len(),
            });
        }
        for (&coord, &radix) in coords.iter().zip(&self.radices) {
            TileError::check_row(coord, radix)?;
        }
        Ok(self.compose_with(|slot| coords[slot]))
    }

    /// Coordinate of `row` in `slot`; callers guarantee both are in range.
    #[inline]
    pub(crate) fn coordinate(&self, row: usize, slot: usize) -> usize {
        debug_assert!(row < self.total && slot < self.radices.len());
        (row % self.modulus(slot)) / self.suffix[slot]
    }

    /// Flat row from per-slot coordinates supplied by `coord`; callers
    /// guarantee every coordinate is below its radix.
    #[inline]
    pub(crate) fn compose_with(&self, coord: impl Fn(usize) -> usize) -> usize {
        self.suffix
            .iter()
            .enumerate()
            .map(|(slot, &weight)| coord(slot) * weight)
            .sum()
    }

    #[inline]
    fn modulus(&self, slot: usize) -> usize {
        if slot == 0 {
            self.total
        } else {
            self.suffix[slot - 1]
        }
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot < self.radices.len() {
            Ok(())
        } else {
            Err(TileError::SlotOutOfRange {
                slot,
                slot_count: self.radices.len(),
            })
        }
    }
}

/// Row index to use in `row_counts[slot]` for virtual row `row`.
///
/// Standalone form of [`RowSpace::derive_row`] that recomputes the products
/// from scratch.
///
/// # Errors
///
/// Same as [`RowSpace::new`] and [`RowSpace::derive_row`].
pub fn derived_row(row_counts: &[usize], row: usize, slot: usize) -> Result<usize> {
    RowSpace::new(row_counts)?.derive_row(row, slot)
}
