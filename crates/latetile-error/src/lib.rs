use thiserror::Error;

/// Primary error type for tile construction, addressing and joins.
///
/// Absent cell values are not errors; they surface as `Ok(None)` from the
/// cell accessors. Everything here is either a caller contract violation
/// (`*OutOfRange`) or a broken invariant in an upstream component
/// (`MalformedTile`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    // === Addressing Errors ===
    /// Row index beyond the tile's row count.
    #[error("row {row} out of range (tile has {row_count} rows)")]
    RowOutOfRange { row: usize, row_count: usize },

    /// Column index beyond the tile's column count.
    #[error("column {column} out of range (tile has {column_count} columns)")]
    ColumnOutOfRange { column: usize, column_count: usize },

    /// Base-tile slot beyond the row space's radix count.
    #[error("base slot {slot} out of range (row space has {slot_count} slots)")]
    SlotOutOfRange { slot: usize, slot_count: usize },

    // === Invariant Errors ===
    /// A tile violates a structural invariant.
    #[error("malformed tile: {detail}")]
    MalformedTile { detail: String },

    /// The cartesian product of base-tile row counts does not fit in `usize`.
    #[error("row space overflow: product of base row counts {row_counts:?} exceeds usize")]
    RowSpaceOverflow { row_counts: Vec<usize> },

    // === Execution Errors ===
    /// Join configuration rejected before execution.
    #[error("invalid join config: {detail}")]
    InvalidConfig { detail: String },

    /// A validity worker thread panicked.
    #[error("validity worker {worker_id} panicked")]
    WorkerPanicked { worker_id: usize },
}

/// Coarse classification of [`TileError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// An index outside valid bounds.
    OutOfRange,
    /// A broken tile invariant.
    Malformed,
    /// Library used incorrectly (bad configuration).
    Misuse,
    /// Internal execution failure.
    Internal,
}

impl TileError {
    /// Map this error to its classification.
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::RowOutOfRange { .. }
            | Self::ColumnOutOfRange { .. }
            | Self::SlotOutOfRange { .. } => ErrorCode::OutOfRange,
            Self::MalformedTile { .. } | Self::RowSpaceOverflow { .. } => ErrorCode::Malformed,
            Self::InvalidConfig { .. } => ErrorCode::Misuse,
            Self::WorkerPanicked { .. } => ErrorCode::Internal,
        }
    }

    /// Whether this is an out-of-range access by the caller.
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self.error_code(), ErrorCode::OutOfRange)
    }

    /// Whether this reports a broken tile invariant.
    pub const fn is_malformed(&self) -> bool {
        matches!(self.error_code(), ErrorCode::Malformed)
    }

    /// Create a malformed-tile error.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedTile {
            detail: detail.into(),
        }
    }

    /// Create an invalid-config error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Check `row < row_count`.
    pub const fn check_row(row: usize, row_count: usize) -> Result<()> {
        if row < row_count {
            Ok(())
        } else {
            Err(Self::RowOutOfRange { row, row_count })
        }
    }

    /// Check `column < column_count`.
    pub const fn check_column(column: usize, column_count: usize) -> Result<()> {
        if column < column_count {
            Ok(())
        } else {
            Err(Self::ColumnOutOfRange {
                column,
                column_count,
            })
        }
    }
}

/// Result type alias using `TileError`.
pub type Result<T> = std::result::Result<T, TileError>;
