//! # Parent Map
//!
//! Deferred parent resolution.
//!
//! While scanning, a task registers the half-open key interval covered by
//! each scope it indexed (for DWARF: the section offsets of the scope's
//! children). A child whose enclosing scope was not known at scan time keeps
//! a [`ParentKey`] instead; after every task has finished, `finalize` looks
//! that key up in the [`ParentMapAggregate`] built from all tasks' maps.

use std::collections::BTreeMap;

use super::entry::{EntryRef, ParentKey};

/// Non-overlapping interval map from key ranges to scope entries.
#[derive(Debug, Default, Clone)]
pub struct ParentMap
{
    // start -> (end, scope)
    intervals: BTreeMap<ParentKey, (u64, EntryRef)>,
}

impl ParentMap
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Register `[start, end)` as belonging to `parent`.
    ///
    /// ## Panics
    ///
    /// If the interval is empty, spans both storages, or overlaps an
    /// interval registered before.
    pub fn add_entry(&mut self, start: ParentKey, end: ParentKey, parent: EntryRef)
    {
        assert_eq!(
            start.alternate, end.alternate,
            "parent interval {start}..{end} crosses storages"
        );
        assert!(start.offset < end.offset, "empty parent interval {start}..{end}");

        if let Some((prev_start, (prev_end, prev_parent))) = self.intervals.range(..=start).next_back() {
            assert!(
                prev_start.alternate != start.alternate || *prev_end <= start.offset,
                "parent interval {start}..{end} for {parent} overlaps {prev_start}..0x{prev_end:x} for {prev_parent}"
            );
        }
        if let Some((next_start, (_, next_parent))) = self.intervals.range(start..end).next() {
            panic!("parent interval {start}..{end} for {parent} overlaps interval at {next_start} for {next_parent}");
        }

        self.intervals.insert(start, (end.offset, parent));
    }

    /// The scope whose interval contains `key`.
    pub fn find(&self, key: ParentKey) -> Option<EntryRef>
    {
        let (start, (end, parent)) = self.intervals.range(..=key).next_back()?;
        (start.alternate == key.alternate && key.offset < *end).then_some(*parent)
    }

    pub fn len(&self) -> usize
    {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.intervals.is_empty()
    }
}

/// The parent maps of every scan task, queried in task order.
///
/// Assembled only after all tasks have finished and never mutated
/// afterwards, so it can be shared freely between finalizing shards.
#[derive(Debug, Default, Clone)]
pub struct ParentMapAggregate
{
    maps: Vec<ParentMap>,
}

impl ParentMapAggregate
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn add(&mut self, map: ParentMap)
    {
        if !map.is_empty() {
            self.maps.push(map);
        }
    }

    /// First hit over all maps, or `None` if no task registered the key.
    pub fn find(&self, key: ParentKey) -> Option<EntryRef>
    {
        self.maps.iter().find_map(|map| map.find(key))
    }

    pub fn map_count(&self) -> usize
    {
        self.maps.len()
    }
}

impl FromIterator<ParentMap> for ParentMapAggregate
{
    fn from_iter<I: IntoIterator<Item = ParentMap>>(iter: I) -> Self
    {
        let mut aggregate = Self::new();
        for map in iter {
            aggregate.add(map);
        }
        aggregate
    }
}
