//! # Index Workers
//!
//! A worker performs one complete scan and hands the catalog a list of task
//! outcomes. The catalog's driver takes care of everything after that
//! (parent resolution, finalize, state transitions, caching).
//!
//! [`ScanningWorker`] is the from-scratch scanner: it splits the units of a
//! [`UnitSource`] over the thread pool by cost, one shard per chunk. Its
//! output may be cached. The symbol-table ingestion worker lives in
//! `source::symtab`.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::parent_map::ParentMap;
use super::shard::Shard;
use crate::config::IndexConfig;
use crate::error::{Diagnostic, IndexError, IndexResult};
use crate::pool::{panic_message, try_parallel_for_each_by_cost, ThreadPool};
use crate::source::{Recorder, UnitSource};

/// Everything one scan task produced.
///
/// Built by [`Recorder::finish`]. A task that hit errors still returns the
/// shard it built; the errors travel alongside it.
#[derive(Debug)]
pub struct TaskOutcome
{
    pub(crate) shard: Shard,
    pub(crate) parents: ParentMap,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) errors: Vec<IndexError>,
}

impl TaskOutcome
{
    pub fn shard(&self) -> &Shard
    {
        &self.shard
    }

    pub fn diagnostics(&self) -> &[Diagnostic]
    {
        &self.diagnostics
    }

    pub fn errors(&self) -> &[IndexError]
    {
        &self.errors
    }
}

/// Strategy that scans some debug-information source.
pub trait IndexWorker: Send
{
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Run the whole scan.
    ///
    /// Each element is one task's outcome, or the error that prevented the
    /// task from producing one. Must not return before every task has
    /// finished.
    fn do_reading(&mut self, pool: &Arc<ThreadPool>, config: &IndexConfig) -> Vec<IndexResult<TaskOutcome>>;

    /// Called once the scan is complete, before the shards are finalized.
    fn print_stats(&self, _shards: &[Shard]) {}

    /// Whether the result may be written to the index cache.
    fn cache_eligible(&self) -> bool
    {
        true
    }
}

/// From-scratch scanner over a [`UnitSource`].
pub struct ScanningWorker<S>
{
    source: Arc<S>,
    units: usize,
}

impl<S: UnitSource> ScanningWorker<S>
{
    pub fn new(source: S) -> Self
    {
        Self::from_shared(Arc::new(source))
    }

    pub fn from_shared(source: Arc<S>) -> Self
    {
        Self { source, units: 0 }
    }
}

impl<S: UnitSource> IndexWorker for ScanningWorker<S>
{
    fn name(&self) -> &'static str
    {
        "scanning"
    }

    fn do_reading(&mut self, pool: &Arc<ThreadPool>, config: &IndexConfig) -> Vec<IndexResult<TaskOutcome>>
    {
        self.units = self.source.unit_count();
        debug!("Scanning {} units", self.units);

        let source = Arc::clone(&self.source);
        try_parallel_for_each_by_cost(
            pool,
            self.units,
            config.min_units_per_thread,
            |index| self.source.unit_cost(index),
            move |chunk, units| scan_units(source.as_ref(), chunk, units),
        )
    }

    fn print_stats(&self, shards: &[Shard])
    {
        let entries: usize = shards.iter().map(Shard::len).sum();
        info!(
            "Scanned {} units into {} shards, {entries} entries",
            self.units,
            shards.len()
        );
        for shard in shards {
            debug!(
                "Shard {}: {} units, {} entries, {} address ranges",
                shard.index(),
                shard.units().len(),
                shard.len(),
                shard.addresses().len()
            );
        }
    }
}

/// Body of one scan task.
///
/// A unit that fails (error or panic) is recorded and skipped; the task goes
/// on with its remaining units and still returns its shard.
pub(crate) fn scan_units<S>(source: &S, chunk: usize, units: Range<usize>) -> TaskOutcome
where
    S: UnitSource + ?Sized,
{
    let mut recorder = Recorder::new(chunk as u32);
    for index in units {
        let scanned = panic::catch_unwind(AssertUnwindSafe(|| source.scan_unit(index, &mut recorder)));
        let failure = match scanned {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(payload) => IndexError::TaskPanicked(format!("unit {index}: {}", panic_message(payload.as_ref()))),
        };
        warn!("Unit {index} could not be indexed: {failure}");
        recorder.fail(failure);
    }
    recorder.finish()
}
