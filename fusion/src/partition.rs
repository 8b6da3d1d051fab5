//! Deterministic work partitioning.
//!
//! Views are processed in contiguous batches to cap memory. Work inside a batch
//! is dealt out in strides: item `i` belongs to worker `i % workers`. The
//! assignment depends only on the index and the worker count, so results do not
//! depend on scheduling.

use std::ops::Range;

/// Contiguous ranges of at most `size` items covering `0..len`.
///
/// # Panics
///
/// Panics if `size` is 0.
pub fn batches(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    assert!(size > 0, "batch size must be > 0");
    (0..len)
        .step_by(size)
        .map(move |start| start..(start + size).min(len))
}

/// Worker that owns item `index`.
#[inline]
pub fn stride_owner(index: usize, workers: usize) -> usize {
    index % workers
}

/// Deals `items` out to `workers` shares, keeping each item's original index.
///
/// Items are moved, so mutable slices can be handed to rayon tasks without
/// any locking. Shares may be empty when there are more workers than items.
///
/// # Panics
///
/// Panics if `workers` is 0.
pub fn stride_shares<T>(items: impl IntoIterator<Item = T>, workers: usize) -> Vec<Vec<(usize, T)>> {
    assert!(workers > 0, "worker count must be > 0");
    let mut shares: Vec<Vec<(usize, T)>> = (0..workers).map(|_| Vec::new()).collect();
    for (index, item) in items.into_iter().enumerate() {
        shares[stride_owner(index, workers)].push((index, item));
    }
    shares
}
