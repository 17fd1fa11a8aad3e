use std::thread;

use latetile_error::{Result, TileError};
use serde::{Deserialize, Serialize};

/// Virtual rows below which validity is computed on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1 << 16;

/// Virtual rows per work unit handed to a validity worker.
pub const DEFAULT_ROWS_PER_MORSEL: usize = 8192;

/// Join execution settings.
///
/// None of these change what a join produces; they only decide how the
/// validity scan over the cartesian row space is split up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Minimum virtual row count before workers are spawned.
    pub parallel_threshold: usize,
    /// Worker threads for the parallel scan (1 disables it).
    pub worker_threads: usize,
    /// Rows per morsel; rounded up to whole bitmap bytes.
    pub rows_per_morsel: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map_or(2, std::num::NonZeroUsize::get)
            .saturating_sub(1)
            .max(1);
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            worker_threads: workers,
            rows_per_morsel: DEFAULT_ROWS_PER_MORSEL,
        }
    }
}

impl JoinConfig {
    /// Single-threaded configuration.
    #[must_use]
    pub fn serial() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    /// Reject settings that cannot drive a scan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when `worker_threads` or `rows_per_morsel`
    /// is zero, or when `rows_per_morsel` cannot be rounded up to whole
    /// bitmap bytes.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(TileError::invalid_config(
                "worker_threads must be greater than zero",
            ));
        }
        if self.rows_per_morsel == 0 {
            return Err(TileError::invalid_config(
                "rows_per_morsel must be greater than zero",
            ));
        }
        if self.rows_per_morsel.checked_next_multiple_of(8).is_none() {
            return Err(TileError::invalid_config(format!(
                "rows_per_morsel {} overflows when rounded to a multiple of 8",
                self.rows_per_morsel
            )));
        }
        Ok(())
    }

    /// Morsel size rounded up to a multiple of 8 rows, so every morsel
    /// starts on a bitmap byte boundary.
    #[must_use]
    pub fn morsel_rows(&self) -> usize {
        self.rows_per_morsel
            .max(1)
            .checked_next_multiple_of(8)
            .unwrap_or(usize::MAX & !7)
    }

    /// Whether a scan over `total_rows` virtual rows should use workers.
    #[must_use]
    pub fn is_parallel_for(&self, total_rows: usize) -> bool {
        self.worker_threads > 1 && total_rows >= self.parallel_threshold
    }
}
