//! # Index
//!
//! Shards of named entries, the parent maps that connect them, and the
//! [`Catalog`] that owns the finished result.
//!
//! Scan tasks each fill one [`Shard`] and one [`ParentMap`]. When all of them
//! are done the maps are combined into a [`ParentMapAggregate`], every shard
//! is finalized against it (deferred parents resolved, names canonicalized,
//! entries sorted) and the catalog becomes searchable.

mod address_map;
pub(crate) mod canonical;
mod catalog;
mod compare;
mod entry;
mod parent_map;
mod shard;
mod worker;

pub use address_map::AddressMap;
pub use catalog::{Catalog, CatalogState, CatalogStats};
pub use compare::{compare, MatchMode};
pub use entry::{Entry, EntryFlags, EntryRef, ParentKey, ParentLink, UnitInfo};
pub use parent_map::{ParentMap, ParentMapAggregate};
pub use shard::Shard;
pub use worker::{IndexWorker, ScanningWorker, TaskOutcome};
