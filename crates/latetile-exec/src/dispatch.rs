//! Morsel-driven validity population.
//!
//! The virtual row space is cut into byte-aligned row ranges (morsels) that
//! workers pull from crossbeam-deque FIFOs, stealing from peers when their
//! own queue drains. Each morsel yields the packed bitmap bytes for its
//! range, and the chunks are stitched back together in morsel order.

use std::thread;

use crossbeam_deque::{Steal, Stealer, Worker};
use latetile_error::{Result, TileError};
use latetile_types::ValidityBitmap;
use tracing::debug;

use crate::config::JoinConfig;

/// Contiguous virtual-row range `[start, end)` assigned to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMorsel {
    pub morsel_id: usize,
    pub start: usize,
    pub end: usize,
}

impl RowMorsel {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition `[0, total_rows)` into morsels of `rows_per_morsel` rows.
///
/// # Errors
///
/// Returns `InvalidConfig` unless `rows_per_morsel` is a positive multiple
/// of 8.
pub fn partition_row_morsels(total_rows: usize, rows_per_morsel: usize) -> Result<Vec<RowMorsel>> {
    if rows_per_morsel == 0 || rows_per_morsel % 8 != 0 {
        return Err(TileError::invalid_config(format!(
            "rows_per_morsel must be a positive multiple of 8, got {rows_per_morsel}"
        )));
    }
    Ok((0..total_rows)
        .step_by(rows_per_morsel)
        .enumerate()
        .map(|(morsel_id, start)| RowMorsel {
            morsel_id,
            start,
            end: start.saturating_add(rows_per_morsel).min(total_rows),
        })
        .collect())
}

/// Evaluate `probe` for every virtual row and pack the answers.
///
/// Runs on the calling thread unless `config` asks for workers at this
/// size. The result does not depend on the path taken.
///
/// # Errors
///
/// Returns `InvalidConfig` for an unusable config and `WorkerPanicked` when
/// a worker thread panics.
pub fn populate_validity<F>(total_rows: usize, config: &JoinConfig, probe: F) -> Result<ValidityBitmap>
where
    F: Fn(usize) -> bool + Sync,
{
    config.validate()?;
    if !config.is_parallel_for(total_rows) {
        return Ok((0..total_rows).map(&probe).collect());
    }

    let morsels = partition_row_morsels(total_rows, config.morsel_rows())?;
    let worker_count = config.worker_threads.min(morsels.len()).max(1);
    debug!(
        total_rows,
        morsels = morsels.len(),
        workers = worker_count,
        "populating validity in parallel"
    );

    let workers: Vec<Worker<RowMorsel>> = (0..worker_count).map(|_| Worker::new_fifo()).collect();
    let stealers: Vec<Stealer<RowMorsel>> = workers.iter().map(Worker::stealer).collect();
    for morsel in &morsels {
        workers[morsel.morsel_id % worker_count].push(*morsel);
    }

    let probe = &probe;
    let stealers = &stealers;
    let per_worker: Vec<Vec<(usize, Vec<u8>)>> = thread::scope(|scope| {
        let handles: Vec<_> = workers
            .into_iter()
            .enumerate()
            .map(|(worker_id, local)| {
                scope.spawn(move || {
                    let mut completed = Vec::new();
                    while let Some(morsel) = pop_or_steal(&local, worker_id, stealers) {
                        completed.push((morsel.morsel_id, fill_morsel(morsel, probe)));
                    }
                    completed
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(worker_id, handle)| {
                handle
                    .join()
                    .map_err(|_| TileError::WorkerPanicked { worker_id })
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut chunks: Vec<(usize, Vec<u8>)> = per_worker.into_iter().flatten().collect();
    chunks.sort_unstable_by_key(|(morsel_id, _)| *morsel_id);
    let mut bytes = Vec::with_capacity(total_rows.div_ceil(8));
    for (_, chunk) in chunks {
        bytes.extend(chunk);
    }
    ValidityBitmap::from_bytes(bytes, total_rows)
}

fn fill_morsel<F>(morsel: RowMorsel, probe: &F) -> Vec<u8>
where
    F: Fn(usize) -> bool,
{
    let mut bytes = vec![0_u8; morsel.len().div_ceil(8)];
    for (offset, row) in (morsel.start..morsel.end).enumerate() {
        if probe(row) {
            bytes[offset / 8] |= 1_u8 << (offset % 8);
        }
    }
    bytes
}

fn pop_or_steal<T>(local: &Worker<T>, worker_id: usize, stealers: &[Stealer<T>]) -> Option<T> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    steal_from_peers(worker_id, stealers)
}

fn steal_from_peers<T>(worker_id: usize, stealers: &[Stealer<T>]) -> Option<T> {
    let peer_count = stealers.len();
    if peer_count <= 1 {
        return None;
    }

    for offset in 1..peer_count {
        let peer = (worker_id + offset) % peer_count;
        loop {
            match stealers[peer].steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => (),
            }
        }
    }
    None
}
