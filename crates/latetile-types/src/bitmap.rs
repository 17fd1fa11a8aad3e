use std::sync::Arc;

use latetile_error::{Result, TileError};

/// Packed per-row validity bitmap (1 bit per row, 1 means the row exists).
///
/// Bits past `len` in the final byte are always zero, so population counts
/// over the packed bytes are exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityBitmap {
    bytes: Arc<[u8]>,
    len: usize,
}

impl ValidityBitmap {
    /// Create an all-valid bitmap.
    #[must_use]
    pub fn all_valid(len: usize) -> Self {
        let mut bytes = vec![0xFF_u8; len.div_ceil(8)];
        clear_tail(&mut bytes, len);
        Self {
            bytes: Arc::from(bytes),
            len,
        }
    }

    /// Create from one flag per row.
    #[must_use]
    pub fn from_bools(flags: &[bool]) -> Self {
        flags.iter().copied().collect()
    }

    /// Create from raw bitmap bytes.
    ///
    /// # Errors
    ///
    /// Returns `MalformedTile` when `bytes` holds fewer than `len` bits.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, len: usize) -> Result<Self> {
        let mut bytes = bytes.into();
        let expected = len.div_ceil(8);
        if bytes.len() < expected {
            return Err(TileError::malformed(format!(
                "validity bitmap too short: expected at least {expected} bytes, got {}",
                bytes.len()
            )));
        }
        bytes.truncate(expected);
        clear_tail(&mut bytes, len);
        Ok(Self {
            bytes: Arc::from(bytes),
            len,
        })
    }

    /// Number of rows represented.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the bitmap has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Packed bytes backing the bitmap.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true when the row exists. Rows past `len` are never valid.
    #[must_use]
    pub fn is_valid(&self, row_idx: usize) -> bool {
        if row_idx >= self.len {
            return false;
        }
        let byte = self.bytes[row_idx / 8];
        let bit = row_idx % 8;
        ((byte >> bit) & 1) == 1
    }

    /// Number of valid rows.
    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// True when every row is valid.
    #[must_use]
    pub fn all_set(&self) -> bool {
        self.count_valid() == self.len
    }

    /// Iterate over the indices of valid rows, ascending.
    pub fn iter_valid(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&row| self.is_valid(row))
    }

    /// Copy with one row's bit replaced.
    ///
    /// # Errors
    ///
    /// Returns `RowOutOfRange` when `row_idx >= len`.
    pub fn with_row(&self, row_idx: usize, valid: bool) -> Result<Self> {
        TileError::check_row(row_idx, self.len)?;
        let mut bytes = self.bytes.to_vec();
        let mask = 1_u8 << (row_idx % 8);
        if valid {
            bytes[row_idx / 8] |= mask;
        } else {
            bytes[row_idx / 8] &= !mask;
        }
        Ok(Self {
            bytes: Arc::from(bytes),
            len: self.len,
        })
    }
}

impl FromIterator<bool> for ValidityBitmap {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut builder = ValidityBitmapBuilder::with_capacity(iter.size_hint().0);
        for flag in iter {
            builder.push(flag);
        }
        builder.finish()
    }
}

/// Append-only builder for [`ValidityBitmap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityBitmapBuilder {
    bytes: Vec<u8>,
    len: usize,
}

impl ValidityBitmapBuilder {
    #[must_use]
    pub fn with_capacity(len: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(len.div_ceil(8)),
            len: 0,
        }
    }

    pub fn push(&mut self, is_valid: bool) {
        let row_idx = self.len;
        if row_idx % 8 == 0 {
            self.bytes.push(0);
        }
        if is_valid {
            self.bytes[row_idx / 8] |= 1_u8 << (row_idx % 8);
        }
        self.len += 1;
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn finish(self) -> ValidityBitmap {
        ValidityBitmap {
            bytes: Arc::from(self.bytes),
            len: self.len,
        }
    }
}

fn clear_tail(bytes: &mut [u8], len: usize) {
    let tail_bits = len % 8;
    if tail_bits != 0 {
        if let Some(last) = bytes.last_mut() {
            *last &= (1_u8 << tail_bits) - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn all_valid_masks_tail_bits() {
        let bitmap = ValidityBitmap::all_valid(11);
        assert_eq!(bitmap.len(), 11);
        assert_eq!(bitmap.count_valid(), 11);
        assert_eq!(bitmap.as_bytes(), &[0xFF, 0b0000_0111]);
        assert!(bitmap.is_valid(10));
        assert!(!bitmap.is_valid(11));
        assert!(bitmap.all_set());
    }

    #[test]
    fn empty_bitmap() {
        let bitmap = ValidityBitmap::all_valid(0);
        assert!(bitmap.is_empty());
        assert!(bitmap.all_set());
        assert!(!bitmap.is_valid(0));
    }

    #[test]
    fn from_bools_and_iter_valid() {
        let bitmap = ValidityBitmap::from_bools(&[true, false, true, true, false]);
        assert_eq!(bitmap.iter_valid().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(bitmap.count_valid(), 3);
        assert!(!bitmap.all_set());
    }

    #[test]
    fn from_bytes_rejects_short_buffers() {
        let err = ValidityBitmap::from_bytes(vec![0xFF], 9).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn from_bytes_clears_stray_tail_bits() {
        let bitmap = ValidityBitmap::from_bytes(vec![0xFF, 0xFF, 0xFF], 10).unwrap();
        assert_eq!(bitmap.as_bytes().len(), 2);
        assert_eq!(bitmap.count_valid(), 10);
    }

    #[test]
    fn with_row_flips_a_single_bit() {
        let bitmap = ValidityBitmap::all_valid(4);
        let flipped = bitmap.with_row(2, false).unwrap();
        assert_eq!(flipped.iter_valid().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(flipped.with_row(2, true).unwrap(), bitmap);
        assert!(bitmap.with_row(4, false).unwrap_err().is_out_of_range());
    }

    proptest! {
        #[test]
        fn prop_builder_matches_flags(flags in proptest::collection::vec(any::<bool>(), 0..200)) {
            let bitmap = ValidityBitmap::from_bools(&flags);
            prop_assert_eq!(bitmap.len(), flags.len());
            for (row, &flag) in flags.iter().enumerate() {
                prop_assert_eq!(bitmap.is_valid(row), flag);
            }
            prop_assert_eq!(bitmap.count_valid(), flags.iter().filter(|&&f| f).count());
        }
    }
}
