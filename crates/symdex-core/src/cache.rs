//! # Index Cache
//!
//! Persistence seam for finalized catalogs.
//!
//! The catalog's driver calls [`IndexCache::store`] once, between
//! `Finalized` and `CacheDone`, and only for catalogs produced by a
//! from-scratch scan. How (and whether) the data is persisted is up to the
//! implementation; problems worth reporting without failing the write go into
//! `diagnostics`.
//!
//! [`SnapshotCache`] keeps the last stored catalog in memory as a flat list
//! of qualified names. It is what the command-line tool and the tests use.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Diagnostic, IndexResult};
use crate::index::Catalog;
use crate::types::{EntryTag, Language};

/// Sink for finalized catalogs.
pub trait IndexCache: Send + Sync
{
    /// Persist `catalog`.
    ///
    /// ## Errors
    ///
    /// Implementation specific; a failed write is logged by the driver and
    /// does not affect the catalog.
    fn store(&self, catalog: &Catalog, diagnostics: &mut Vec<Diagnostic>) -> IndexResult<()>;
}

/// One entry of a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry
{
    pub full_name: String,
    pub tag: EntryTag,
    pub language: Language,
    pub unit_offset: u64,
}

/// Keeps the most recently stored catalog as a flat name list.
#[derive(Debug, Default)]
pub struct SnapshotCache
{
    snapshot: Mutex<Option<Arc<[CachedEntry]>>>,
    stores: AtomicUsize,
}

impl SnapshotCache
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// The last stored snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<[CachedEntry]>>
    {
        self.snapshot.lock().clone()
    }

    /// How many times `store` has run.
    pub fn store_count(&self) -> usize
    {
        self.stores.load(Ordering::Acquire)
    }
}

impl IndexCache for SnapshotCache
{
    fn store(&self, catalog: &Catalog, diagnostics: &mut Vec<Diagnostic>) -> IndexResult<()>
    {
        let entries: Vec<CachedEntry> = catalog
            .entries()
            .map(|entry| CachedEntry {
                full_name: catalog.full_name(entry),
                tag: entry.tag(),
                language: entry.language(),
                unit_offset: entry.unit().offset,
            })
            .collect();

        let unresolved = catalog.stats().unresolved_parents;
        if unresolved > 0 {
            diagnostics.push(Diagnostic {
                unit_offset: 0,
                entry_offset: None,
                message: format!("{unresolved} entries stored without their enclosing scope"),
            });
        }

        debug!("Stored snapshot of {} entries", entries.len());
        *self.snapshot.lock() = Some(entries.into());
        self.stores.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
