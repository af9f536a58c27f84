//! # Catalog
//!
//! The finished index: a fixed list of finalized shards plus the lifecycle
//! state that readers wait on.
//!
//! ## Lifecycle
//!
//! ```text
//! Initial --start_reading--> (background scan)
//!         --all tasks done--> MainAvailable   address map + entry point usable
//!         --finalize shards--> Finalized      name search usable
//!         --cache write-----> CacheDone
//! ```
//!
//! Transitions only move forward and are made only by the driver running the
//! catalog's [`IndexWorker`]. Readers block in [`Catalog::wait`] (directly or
//! through `find`, `lookup` and `get_main`).
//!
//! ## Errors
//!
//! Task failures never escape a background thread. They are collected, every
//! shard that did complete is merged, and only then is the first failure
//! published. `wait` reports it as `IndexError::Background` once the waited
//! for state is reached; the catalog stays fully searchable.
//!
//! ```rust
//! use symdex_core::index::{Catalog, CatalogState};
//! use symdex_core::source::SymbolTableWorker;
//! use symdex_core::{IndexConfig, IndexContext};
//!
//! let context = IndexContext::new(IndexConfig::synchronous());
//! let catalog = Catalog::new(&context);
//! catalog.start_reading(Box::new(SymbolTableWorker::from_symbols(Vec::new()))).unwrap();
//! catalog.wait(CatalogState::CacheDone, false).unwrap();
//! assert!(catalog.find("anything", false).is_empty());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::address_map::AddressMap;
use super::compare::{compare, split_qualified, MatchMode};
use super::entry::{Entry, EntryFlags, EntryRef, UnitInfo};
use super::parent_map::ParentMapAggregate;
use super::shard::Shard;
use super::worker::{IndexWorker, TaskOutcome};
use crate::cache::IndexCache;
use crate::config::{IndexConfig, IndexContext, QuitFlag};
use crate::error::{Diagnostic, IndexError, IndexResult};
use crate::pool::ThreadPool;
use crate::types::Address;

/// Longest parent chain `full_name` follows.
const MAX_SCOPE_DEPTH: usize = 32;

/// Lifecycle state of a catalog. Ordered; states only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogState
{
    Initial,
    /// Every scan task finished; address lookup and `get_main` answer.
    MainAvailable,
    /// Every shard finalized; name search answers.
    Finalized,
    /// The cache collaborator (if any) has run.
    CacheDone,
}

impl fmt::Display for CatalogState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            CatalogState::Initial => "initial",
            CatalogState::MainAvailable => "main-available",
            CatalogState::Finalized => "finalized",
            CatalogState::CacheDone => "cache-done",
        };
        write!(f, "{label}")
    }
}

/// Counts describing a populated catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats
{
    pub shards: usize,
    pub units: usize,
    pub entries: usize,
    pub unresolved_parents: usize,
    pub diagnostics: usize,
}

/// What readers can use before finalize: published at `MainAvailable`.
struct Preliminary
{
    addresses: Vec<Arc<AddressMap>>,
    main: Option<Entry>,
}

/// A searchable index of named entries. See the module documentation.
pub struct Catalog
{
    config: IndexConfig,
    pool: Arc<ThreadPool>,
    quit: QuitFlag,
    cache: Option<Arc<dyn IndexCache>>,

    state: Mutex<CatalogState>,
    state_changed: Condvar,
    started: AtomicBool,
    driver: OnceCell<ThreadId>,
    cache_eligible: AtomicBool,

    preliminary: OnceCell<Preliminary>,
    shards: OnceCell<Vec<Shard>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    failure: OnceCell<Arc<IndexError>>,
}

impl fmt::Debug for Catalog
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Catalog")
            .field("state", &self.state())
            .field("shards", &self.shards.get().map(Vec::len))
            .field("failed", &self.failure.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Catalog
{
    /// An empty catalog using the context's pool, configuration and quit flag.
    pub fn new(context: &IndexContext) -> Arc<Self>
    {
        Self::build(context, None)
    }

    /// Like [`Catalog::new`], writing the finalized catalog to `cache`.
    pub fn with_cache(context: &IndexContext, cache: Arc<dyn IndexCache>) -> Arc<Self>
    {
        Self::build(context, Some(cache))
    }

    fn build(context: &IndexContext, cache: Option<Arc<dyn IndexCache>>) -> Arc<Self>
    {
        Arc::new(Self {
            config: context.config().clone(),
            pool: Arc::clone(context.pool()),
            quit: context.quit_flag().clone(),
            cache,
            state: Mutex::new(CatalogState::Initial),
            state_changed: Condvar::new(),
            started: AtomicBool::new(false),
            driver: OnceCell::new(),
            cache_eligible: AtomicBool::new(false),
            preliminary: OnceCell::new(),
            shards: OnceCell::new(),
            diagnostics: Mutex::new(Vec::new()),
            failure: OnceCell::new(),
        })
    }

    /// Start indexing with `worker`.
    ///
    /// With a zero-thread pool the whole lifecycle runs here and the catalog
    /// is `CacheDone` on return. Otherwise a dedicated driver thread runs the
    /// worker; it is never a pool thread, so it cannot starve the tasks it
    /// waits for.
    ///
    /// ## Errors
    ///
    /// `IndexError::AlreadyStarted` on a second call, `IndexError::Io` if the
    /// driver thread cannot be spawned.
    pub fn start_reading(self: &Arc<Self>, worker: Box<dyn IndexWorker>) -> IndexResult<()>
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(IndexError::AlreadyStarted);
        }

        if self.pool.thread_count() == 0 {
            self.run_worker(worker);
            return Ok(());
        }

        let catalog = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("symdex-indexer".to_string())
            .spawn(move || catalog.run_worker(worker));
        if let Err(err) = spawned {
            self.started.store(false, Ordering::SeqCst);
            return Err(IndexError::Io(err));
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CatalogState
    {
        *self.state.lock()
    }

    /// Block until the catalog reaches `desired`.
    ///
    /// With `allow_quit` the wait polls (every `wait_poll_interval`) so that
    /// a raised [`QuitFlag`] is noticed; the flag is consumed and the wait
    /// returns `IndexError::Interrupted`. Indexing itself keeps going.
    ///
    /// A catalog that was never started stays `Initial`, so waiting on it
    /// blocks until some thread calls `start_reading`.
    ///
    /// ## Errors
    ///
    /// `IndexError::Background` with the first captured task failure when
    /// `desired` is `Finalized` or later; failures are published together
    /// with the finalized shards, so a wait for `MainAvailable` never reports
    /// them. `IndexError::Interrupted` as described above.
    ///
    /// ## Panics
    ///
    /// If called from the catalog's own driver thread for a state that has not
    /// been reached yet: the driver would wait on itself forever.
    pub fn wait(&self, desired: CatalogState, allow_quit: bool) -> IndexResult<()>
    {
        {
            let mut state = self.state.lock();
            if *state < desired {
                assert!(
                    self.driver.get() != Some(&thread::current().id()),
                    "catalog driver waiting for {desired} while in state {}",
                    *state
                );
            }
            while *state < desired {
                if allow_quit {
                    if self.quit.take() {
                        debug!("Wait for {desired} interrupted in state {}", *state);
                        return Err(IndexError::Interrupted);
                    }
                    let _ = self.state_changed.wait_for(&mut state, self.config.wait_poll_interval);
                } else {
                    self.state_changed.wait(&mut state);
                }
            }
        }

        match self.failure.get() {
            Some(err) if desired >= CatalogState::Finalized => Err(IndexError::Background(Arc::clone(err))),
            _ => Ok(()),
        }
    }

    /// The quit flag observed by interruptible waits.
    pub fn quit_flag(&self) -> &QuitFlag
    {
        &self.quit
    }

    /// Entries named `name`, grouped by shard.
    ///
    /// Blocks until `Finalized`. Matching is case-insensitive; an exact query
    /// `"name"` also returns `"name<...>"`, and with `completing` every entry
    /// whose name starts with `name` is returned.
    ///
    /// Qualified queries (`"A::B::c"`, `"pkg.proc"`) search for the last
    /// component and keep the entries whose nearest scopes match the other
    /// components, plus any entry whose own name matches the whole query
    /// (linkage names). Within a shard results are in sort order; shards are
    /// concatenated in shard order and not merged.
    pub fn find(&self, name: &str, completing: bool) -> Vec<&Entry>
    {
        if let Err(err) = self.wait(CatalogState::Finalized, false) {
            debug!("Searching partially indexed catalog: {err}");
        }
        let mode = if completing {
            MatchMode::Complete
        } else {
            MatchMode::Match
        };

        let components = split_qualified(name);
        let mut results: Vec<&Entry> = Vec::new();
        for shard in self.shards() {
            match components.split_last() {
                Some((leaf, scopes)) if !scopes.is_empty() => {
                    let first = results.len();
                    results.extend(shard.find(leaf, mode).filter(|entry| self.scopes_match(entry, scopes)));
                    for entry in shard.find(name, mode) {
                        if !results[first..].iter().any(|found| found.id() == entry.id()) {
                            results.push(entry);
                        }
                    }
                }
                Some((leaf, _)) => results.extend(shard.find(leaf, mode)),
                None => {}
            }
        }
        results
    }

    /// Whether the scopes enclosing `entry` end with `scopes`.
    fn scopes_match(&self, entry: &Entry, scopes: &[&str]) -> bool
    {
        let mut current = entry.parent().entry();
        for scope in scopes.iter().rev() {
            let Some(parent) = current.and_then(|id| self.entry(id)) else {
                return false;
            };
            if compare(parent.name(), scope, MatchMode::Match) != std::cmp::Ordering::Equal {
                return false;
            }
            current = parent.parent().entry();
        }
        true
    }

    /// The unit whose address ranges contain `address`.
    ///
    /// Blocks until `MainAvailable`. Shards are asked in order; the first
    /// claim wins.
    pub fn lookup(&self, address: Address) -> Option<Arc<UnitInfo>>
    {
        // Failures are only reported from Finalized on.
        let _ = self.wait(CatalogState::MainAvailable, false);
        let preliminary = self.preliminary.get()?;
        preliminary
            .addresses
            .iter()
            .find_map(|map| map.find(address))
            .map(Arc::clone)
    }

    /// The program's entry point.
    ///
    /// Blocks until `MainAvailable`. The first shard candidate that was
    /// explicitly declared wins, skipping languages whose names need
    /// canonicalization; without one, the first candidate found by name.
    /// Once the catalog is finalized the returned entry carries its
    /// canonical name and resolved parent.
    pub fn get_main(&self) -> Option<Entry>
    {
        // Failures are only reported from Finalized on.
        let _ = self.wait(CatalogState::MainAvailable, false);
        let main = self.preliminary.get()?.main.as_ref()?;
        if self.shards.get().is_some() {
            if let Some(finalized) = self.entry(main.id()) {
                return Some(finalized.clone());
            }
        }
        Some(main.clone())
    }

    /// Scope-qualified name of `entry`.
    ///
    /// Linkage names and top-level entries are their own full name.
    /// Otherwise the parent chain is joined with the entry's language
    /// separator.
    pub fn full_name(&self, entry: &Entry) -> String
    {
        if entry.flags().contains(EntryFlags::IS_LINKAGE) || entry.parent().entry().is_none() {
            return entry.name().to_string();
        }

        let mut components = vec![entry.name()];
        let mut current = entry.parent().entry();
        while let Some(parent) = current.and_then(|id| self.entry(id)) {
            if components.len() > MAX_SCOPE_DEPTH {
                warn!("Scope chain of {} deeper than {MAX_SCOPE_DEPTH}, truncated", entry.id());
                break;
            }
            components.push(parent.name());
            current = parent.parent().entry();
        }
        components.reverse();
        components.join(entry.language().scope_separator())
    }

    /// Entry behind a handle, once shards are populated.
    pub fn entry(&self, id: EntryRef) -> Option<&Entry>
    {
        let shards = self.shards.get()?;
        let position = shards.binary_search_by_key(&id.shard, Shard::index).ok()?;
        shards[position].entry(id.slot)
    }

    /// Finalized shards, in shard order. Empty before `Finalized`.
    pub fn shards(&self) -> &[Shard]
    {
        self.shards.get().map_or(&[][..], Vec::as_slice)
    }

    /// Every entry, shard by shard in sort order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry>
    {
        self.shards().iter().flat_map(Shard::entries)
    }

    /// Diagnostics recorded while scanning and writing the cache.
    pub fn diagnostics(&self) -> Vec<Diagnostic>
    {
        self.diagnostics.lock().clone()
    }

    pub fn stats(&self) -> CatalogStats
    {
        let shards = self.shards();
        CatalogStats {
            shards: shards.len(),
            units: shards.iter().map(|shard| shard.units().len()).sum(),
            entries: shards.iter().map(Shard::len).sum(),
            unresolved_parents: shards.iter().map(Shard::unresolved_parents).sum(),
            diagnostics: self.diagnostics.lock().len(),
        }
    }

    /// Hand the finalized catalog to `cache`.
    ///
    /// ## Errors
    ///
    /// `IndexError::CacheIneligible` if the catalog was not built by a
    /// from-scratch scan, `IndexError::InvalidArgument` before `Finalized`,
    /// and whatever the cache reports.
    pub fn write_to_cache(&self, cache: &dyn IndexCache, diagnostics: &mut Vec<Diagnostic>) -> IndexResult<()>
    {
        if !self.cache_eligible.load(Ordering::SeqCst) {
            return Err(IndexError::CacheIneligible);
        }
        if self.state() < CatalogState::Finalized {
            return Err(IndexError::InvalidArgument(format!(
                "cache write requested in state {}",
                self.state()
            )));
        }
        cache.store(self, diagnostics)
    }

    fn advance(&self, next: CatalogState)
    {
        let mut state = self.state.lock();
        assert!(next > *state, "catalog state cannot move from {} to {next}", *state);
        *state = next;
        self.state_changed.notify_all();
        drop(state);
        info!("Catalog state: {next}");
    }

    /// Drive `worker` through the whole lifecycle.
    fn run_worker(&self, mut worker: Box<dyn IndexWorker>)
    {
        let _ = self.driver.set(thread::current().id());
        let started = Instant::now();
        info!(
            "Indexing with {} worker, {} pool threads",
            worker.name(),
            self.pool.thread_count()
        );
        self.cache_eligible.store(worker.cache_eligible(), Ordering::SeqCst);

        let results = worker.do_reading(&self.pool, &self.config);

        let mut shards = Vec::with_capacity(results.len());
        let mut parents = ParentMapAggregate::new();
        let mut diagnostics = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(TaskOutcome {
                    shard,
                    parents: map,
                    diagnostics: task_diagnostics,
                    errors: task_errors,
                }) => {
                    shards.push(shard);
                    parents.add(map);
                    diagnostics.extend(task_diagnostics);
                    errors.extend(task_errors);
                }
                Err(err) => errors.push(err),
            }
        }
        shards.sort_by_key(Shard::index);

        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }
        self.diagnostics.lock().extend(diagnostics);

        self.set_main_available(&shards);
        worker.print_stats(&shards);

        self.set_contents(shards, parents, errors);
        info!(
            "Indexed {} entries in {} shards in {:.2?}",
            self.stats().entries,
            self.shards().len(),
            started.elapsed()
        );

        if let Some(cache) = &self.cache {
            if worker.cache_eligible() && self.failure.get().is_none() {
                let mut sink = Vec::new();
                if let Err(err) = self.write_to_cache(cache.as_ref(), &mut sink) {
                    warn!("Index cache write failed: {err}");
                }
                self.diagnostics.lock().extend(sink);
            } else {
                debug!("Skipping index cache write for {} worker", worker.name());
            }
        }
        self.advance(CatalogState::CacheDone);
    }

    fn set_main_available(&self, shards: &[Shard])
    {
        let preliminary = Preliminary {
            addresses: shards.iter().map(|shard| Arc::clone(shard.addresses())).collect(),
            main: select_main(shards),
        };
        if let Some(main) = &preliminary.main {
            debug!("Entry point candidate: {} ({})", main.raw_name(), main.language());
        }
        let fresh = self.preliminary.set(preliminary).is_ok();
        assert!(fresh, "catalog main information published twice");
        self.advance(CatalogState::MainAvailable);
    }

    /// Finalize `shards`, install them and publish the first failure.
    ///
    /// Every shard but the last is finalized on the pool; the driver takes
    /// the last one itself, the same split parallel-for uses.
    fn set_contents(&self, mut shards: Vec<Shard>, parents: ParentMapAggregate, mut errors: Vec<IndexError>)
    {
        let parents = Arc::new(parents);
        let own = shards.pop();
        let handles: Vec<_> = shards
            .into_iter()
            .map(|mut shard| {
                let parents = Arc::clone(&parents);
                self.pool.post_task(move || {
                    shard.finalize(&parents);
                    shard
                })
            })
            .collect();

        let own = own.map(|mut shard| {
            shard.finalize(&parents);
            shard
        });

        let mut finalized = Vec::with_capacity(handles.len() + 1);
        for handle in handles {
            match handle.join() {
                Ok(shard) => finalized.push(shard),
                Err(err) => {
                    warn!("Shard finalize failed: {err}");
                    errors.push(err);
                }
            }
        }
        finalized.extend(own);

        let installed = self.shards.set(finalized).is_ok();
        assert!(installed, "catalog contents set twice");

        let mut errors = errors.into_iter();
        if let Some(first) = errors.next() {
            warn!("Indexing failed: {first}");
            for other in errors {
                warn!("Additional indexing failure: {other}");
            }
            let _ = self.failure.set(Arc::new(first));
        }
        self.advance(CatalogState::Finalized);
    }
}

/// Pick the entry point among the shards' candidates.
///
/// Shards are in unit order, so the first explicit candidate is the first
/// one the scan met regardless of how units were split into tasks.
fn select_main(shards: &[Shard]) -> Option<Entry>
{
    shards
        .iter()
        .find_map(Shard::explicit_main)
        .or_else(|| shards.iter().find_map(Shard::named_main))
        .cloned()
}
