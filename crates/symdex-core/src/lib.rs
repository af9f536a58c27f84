//! # symdex-core
//!
//! Concurrent name index over program debug information.
//!
//! The indexer scans the compilation units of a binary in parallel, one shard
//! per task, and publishes the result in stages so that cheap questions can
//! be answered before the expensive ones:
//!
//! - address to unit lookup and the program entry point, as soon as every
//!   scan task has finished
//! - name search, once each shard has resolved its cross-unit parents,
//!   canonicalized its names and sorted itself
//!
//! ## Layout
//!
//! - [`pool`]: the worker pool and the parallel-for splitting helpers
//! - [`source`]: unit decoders (`gimli` for DWARF, `object` for symbol tables)
//! - [`index`]: shards, parent maps and the [`Catalog`]
//! - [`cache`]: the persistence seam invoked after finalize
//!
//! ## Example
//!
//! ```rust,no_run
//! use symdex_core::index::{Catalog, ScanningWorker};
//! use symdex_core::source::DwarfSource;
//! use symdex_core::{IndexConfig, IndexContext};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let context = IndexContext::new(IndexConfig::from_env()?);
//!     let catalog = Catalog::new(&context);
//!     catalog.start_reading(Box::new(ScanningWorker::new(DwarfSource::open("./target/debug/app")?)))?;
//!
//!     for entry in catalog.find("main", false) {
//!         println!("{} ({})", catalog.full_name(entry), entry.tag());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod pool;
pub mod source;
pub mod types;

pub use cache::{IndexCache, SnapshotCache};
pub use config::{IndexConfig, IndexContext, QuitFlag};
// Re-export commonly used types
pub use error::{Diagnostic, IndexError, IndexResult};
pub use index::{Catalog, CatalogState, Entry, EntryRef};
pub use types::{Address, EntryTag, Language};
