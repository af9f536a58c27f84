//! # Parallel-For
//!
//! Split `0..n` into chunks, post all but the last chunk to the pool and run
//! the last chunk on the calling thread.
//!
//! Because the caller always does a share of the work, a pool with zero
//! threads degrades to a single synchronous pass with no special casing.
//! Results come back in chunk order, so the caller's own chunk is always the
//! last element of the returned vector.
//!
//! ```rust
//! use symdex_core::pool::{parallel_for_each, ThreadPool};
//!
//! let pool = ThreadPool::new(3);
//! let sums = parallel_for_each(&pool, 10, 1, |_chunk, range| range.sum::<usize>());
//! assert_eq!(sums.iter().sum::<usize>(), 45);
//! ```

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use super::thread_pool::{panic_message, TaskHandle, ThreadPool};
use crate::error::{IndexError, IndexResult};

/// Split `0..n` by element count.
///
/// The number of dispatched chunks is at most the pool's thread count and is
/// reduced so that every chunk holds at least `min_per_thread` elements.
/// The callback receives the chunk index and its element range.
pub fn parallel_for_each<R, F>(pool: &ThreadPool, n: usize, min_per_thread: usize, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize, Range<usize>) -> R + Send + Sync + 'static,
{
    let ranges = split_by_count(pool.thread_count(), n, min_per_thread);
    run_chunks(pool, ranges, f)
}

/// Split `0..n` so that each chunk carries about the same total cost.
///
/// `cost(i)` is the weight of element `i` (for example the byte length of a
/// compilation unit). Chunk count follows the pool size, reduced so that a
/// chunk averages at least `min_per_thread` elements; the caller's chunk is
/// the trailing remainder.
pub fn parallel_for_each_by_cost<R, F, C>(pool: &ThreadPool, n: usize, min_per_thread: usize, cost: C, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize, Range<usize>) -> R + Send + Sync + 'static,
    C: Fn(usize) -> usize,
{
    let costs: Vec<usize> = (0..n).map(&cost).collect();
    let ranges = split_by_cost(pool.thread_count(), &costs, min_per_thread);
    run_chunks(pool, ranges, f)
}

fn run_chunks<R, F>(pool: &ThreadPool, ranges: Vec<Range<usize>>, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize, Range<usize>) -> R + Send + Sync + 'static,
{
    let outcomes = try_run_chunks(pool, ranges, f);
    // Every chunk has finished; the first failure is re-raised on the caller.
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(value) => results.push(value),
            Err(err) => panic!("{err}"),
        }
    }
    results
}

/// Post every chunk but the last, run the last one here and join them all.
fn try_run_chunks<R, F>(pool: &ThreadPool, mut ranges: Vec<Range<usize>>, f: F) -> Vec<IndexResult<R>>
where
    R: Send + 'static,
    F: Fn(usize, Range<usize>) -> R + Send + Sync + 'static,
{
    // split_* always yields at least the caller's chunk
    let own = ranges.pop().unwrap_or(0..0);
    let own_index = ranges.len();
    debug!("parallel_for: {} dispatched chunks + caller chunk {:?}", ranges.len(), own);

    let f = Arc::new(f);
    let handles: Vec<TaskHandle<R>> = ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| {
            let f = Arc::clone(&f);
            pool.post_task(move || f(index, range))
        })
        .collect();

    let own_result = panic::catch_unwind(AssertUnwindSafe(|| f(own_index, own)))
        .map_err(|payload| IndexError::TaskPanicked(panic_message(payload.as_ref())));

    let mut results: Vec<IndexResult<R>> = handles.into_iter().map(TaskHandle::join).collect();
    results.push(own_result);
    results
}

/// Like [`parallel_for_each_by_cost`] but returns each chunk's outcome
/// instead of re-raising a chunk panic on the caller.
pub fn try_parallel_for_each_by_cost<R, F, C>(
    pool: &ThreadPool,
    n: usize,
    min_per_thread: usize,
    cost: C,
    f: F,
) -> Vec<IndexResult<R>>
where
    R: Send + 'static,
    F: Fn(usize, Range<usize>) -> R + Send + Sync + 'static,
    C: Fn(usize) -> usize,
{
    let costs: Vec<usize> = (0..n).map(&cost).collect();
    let ranges = split_by_cost(pool.thread_count(), &costs, min_per_thread);
    try_run_chunks(pool, ranges, f)
}

/// Chunk boundaries by count. The last range belongs to the caller.
pub(crate) fn split_by_count(threads: usize, n: usize, min_per_thread: usize) -> Vec<Range<usize>>
{
    let min_per_thread = min_per_thread.max(1);
    let mut workers = threads;
    if workers > 0 && n / (workers + 1) < min_per_thread {
        workers = (n / min_per_thread).max(1) - 1;
    }

    let per_chunk = n / (workers + 1);
    let left_over = n % (workers + 1);

    let mut ranges = Vec::with_capacity(workers + 1);
    let mut start = 0;
    for i in 0..workers {
        let len = per_chunk + usize::from(i < left_over);
        ranges.push(start..start + len);
        start += len;
    }
    ranges.push(start..n);
    ranges
}

/// Chunk boundaries by cost. The last range belongs to the caller.
pub(crate) fn split_by_cost(threads: usize, costs: &[usize], min_per_thread: usize) -> Vec<Range<usize>>
{
    let n = costs.len();
    let total: usize = costs.iter().sum();
    let chunks = (threads + 1).min((n / min_per_thread.max(1)).max(1));
    let target = total.div_ceil(chunks).max(1);

    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    let mut acc = 0;
    for (i, cost) in costs.iter().enumerate() {
        acc += cost;
        // Keep one chunk in reserve for the caller.
        if acc >= target && ranges.len() + 1 < chunks {
            ranges.push(start..i + 1);
            start = i + 1;
            acc = 0;
        }
    }
    ranges.push(start..n);
    ranges
}
