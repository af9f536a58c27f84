//! # Error Types
//!
//! General error handling for the indexing engine.
//!
//! Error types derive their `Error` impls and messages with `thiserror`.
//!
//! Not every problem is an error. A malformed record inside an otherwise
//! readable unit is reported as a [`Diagnostic`] and the scan moves on; only
//! failures that stop a whole unit (or a whole task) become an [`IndexError`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for indexing operations
///
/// ## Error Categories
///
/// 1. **Input errors**: InvalidArgument, InvalidConfig, Object, Io
/// 2. **Decoding errors**: Dwarf (a unit could not be walked)
/// 3. **Task errors**: TaskPanicked (caught at a task boundary)
/// 4. **Lifecycle errors**: AlreadyStarted, Interrupted, Background
/// 5. **Persistence errors**: CacheIneligible, Cache
#[derive(Error, Debug)]
pub enum IndexError
{
    /// Invalid argument passed to an engine function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration value could not be parsed
    ///
    /// Raised by `IndexConfig::from_env` when one of the `SYMDEX_*`
    /// variables holds something that is not a non-negative integer.
    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfig
    {
        /// Name of the setting (usually the environment variable)
        key: &'static str,
        /// The rejected value
        value: String,
    },

    /// The DWARF reader failed in a way that stops the current unit
    ///
    /// The string describes what the reader was doing, in the same manner as
    /// "reading .debug_info unit header" or "traversing DIE tree".
    #[error("{context}: {source}")]
    Dwarf
    {
        /// What the reader was doing
        context: String,
        /// Underlying gimli error
        #[source]
        source: gimli::Error,
    },

    /// The object file could not be parsed
    #[error("Failed to parse object file: {0}")]
    Object(String),

    /// A task posted to the thread pool panicked
    ///
    /// The panic is caught at the task boundary so it never unwinds through a
    /// pool thread. The payload message is kept when it is a string.
    #[error("Indexing task panicked: {0}")]
    TaskPanicked(String),

    /// A failure captured in a background task, surfaced to a waiter
    ///
    /// `Catalog::wait` returns this after every shard that did complete has
    /// been merged. The first captured error is shared between all waiters.
    #[error("Background indexing failed: {0}")]
    Background(#[source] Arc<IndexError>),

    /// An interruptible wait observed the quit flag
    ///
    /// The indexing work itself keeps running; only the wait was abandoned.
    #[error("Wait interrupted")]
    Interrupted,

    /// `start_reading` was called on a catalog that already has a worker
    #[error("Catalog reading already started")]
    AlreadyStarted,

    /// The catalog was produced by a worker whose output must not be cached
    #[error("Catalog is not eligible for the index cache")]
    CacheIneligible,

    /// The persistence collaborator failed
    #[error("Index cache write failed: {0}")]
    Cache(String),

    /// I/O error (reading object files, writing caches)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, IndexError>`
///
/// ```rust
/// use symdex_core::error::IndexResult;
/// fn foo() -> IndexResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Map a gimli DWARF error to an `IndexError` with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> IndexError
{
    IndexError::Dwarf {
        context: context.to_string(),
        source: err,
    }
}

/// A recoverable problem found while scanning one record.
///
/// Diagnostics never abort a scan. They are collected per task, merged into
/// the catalog and logged at `warn` level when the catalog is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic
{
    /// Section offset of the unit being scanned
    pub unit_offset: u64,
    /// Section offset of the offending record, when known
    pub entry_offset: Option<u64>,
    /// Human readable description
    pub message: String,
}

impl fmt::Display for Diagnostic
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.entry_offset {
            Some(offset) => write!(f, "unit 0x{:x}, entry 0x{offset:x}: {}", self.unit_offset, self.message),
            None => write!(f, "unit 0x{:x}: {}", self.unit_offset, self.message),
        }
    }
}
