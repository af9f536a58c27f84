//! # Configuration
//!
//! Tuning knobs for the indexer and the context object that owns the
//! thread pool.
//!
//! ## Environment Variables
//!
//! - `SYMDEX_THREADS`: number of pool worker threads (`0` = fully synchronous)
//! - `SYMDEX_MIN_UNITS_PER_THREAD`: minimum units handed to one dispatched chunk

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{IndexError, IndexResult};
use crate::pool::ThreadPool;

/// Indexer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig
{
    /// Worker threads in the pool. Zero runs everything on the caller.
    pub worker_threads: usize,
    /// Smallest number of units worth dispatching to a separate thread.
    pub min_units_per_thread: usize,
    /// Poll period of an interruptible `Catalog::wait`.
    pub wait_poll_interval: Duration,
}

impl Default for IndexConfig
{
    fn default() -> Self
    {
        Self {
            worker_threads: thread::available_parallelism().map(usize::from).unwrap_or(1),
            min_units_per_thread: 1,
            wait_poll_interval: Duration::from_millis(15),
        }
    }
}

impl IndexConfig
{
    /// A configuration with no worker threads.
    ///
    /// Every task runs on the caller, in order. Useful for tests and for
    /// comparing against threaded runs.
    #[must_use]
    pub fn synchronous() -> Self
    {
        Self {
            worker_threads: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self
    {
        self.worker_threads = threads;
        self
    }

    /// Defaults overlaid with the `SYMDEX_*` environment variables.
    ///
    /// ## Errors
    ///
    /// Returns `IndexError::InvalidConfig` if a variable is set to something
    /// other than a non-negative integer.
    pub fn from_env() -> IndexResult<Self>
    {
        let mut config = Self::default();
        if let Some(threads) = read_env_usize("SYMDEX_THREADS")? {
            config.worker_threads = threads;
        }
        if let Some(min) = read_env_usize("SYMDEX_MIN_UNITS_PER_THREAD")? {
            config.min_units_per_thread = min.max(1);
        }
        Ok(config)
    }
}

fn read_env_usize(key: &'static str) -> IndexResult<Option<usize>>
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| IndexError::InvalidConfig { key, value }),
        Err(_) => Ok(None),
    }
}

/// Cancellation signal observed by interruptible waits.
///
/// Cloning shares the flag. Raising it never stops indexing work; it only
/// makes a `wait(.., allow_quit = true)` return `IndexError::Interrupted`.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag
{
    pub fn raise(&self)
    {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool
    {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool
    {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Owner of the resources shared by catalogs: the pool and the quit flag.
///
/// Pass it (or clones of its parts) to every `Catalog`. It must outlive the
/// catalogs built from it only in the sense that the pool is reference
/// counted; the last holder to drop it joins the worker threads.
#[derive(Clone)]
pub struct IndexContext
{
    config: IndexConfig,
    pool: Arc<ThreadPool>,
    quit: QuitFlag,
}

impl IndexContext
{
    #[must_use]
    pub fn new(config: IndexConfig) -> Self
    {
        let pool = Arc::new(ThreadPool::new(config.worker_threads));
        Self {
            config,
            pool,
            quit: QuitFlag::default(),
        }
    }

    pub fn config(&self) -> &IndexConfig
    {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ThreadPool>
    {
        &self.pool
    }

    pub fn quit_flag(&self) -> &QuitFlag
    {
        &self.quit
    }
}
