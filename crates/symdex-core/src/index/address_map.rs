//! Address range to unit map.

use std::sync::Arc;

use super::entry::UnitInfo;
use crate::types::{Address, AddressRange};

/// Map from code address ranges to the unit that owns them.
///
/// Ranges are collected in any order while scanning and made
/// non-overlapping by [`AddressMap::seal`]: where two ranges overlap, the
/// one recorded first keeps the overlapping addresses.
#[derive(Debug, Default, Clone)]
pub struct AddressMap
{
    ranges: Vec<(AddressRange, Arc<UnitInfo>)>,
    sealed: bool,
}

impl AddressMap
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub(crate) fn insert(&mut self, range: AddressRange, unit: Arc<UnitInfo>)
    {
        debug_assert!(!self.sealed, "insert into a sealed address map");
        if !range.is_empty() {
            self.ranges.push((range, unit));
        }
    }

    /// Sort and clip the ranges so lookups can binary search.
    pub(crate) fn seal(&mut self)
    {
        if self.sealed {
            return;
        }
        // Stable: among equal starts, the earlier recording stays first.
        self.ranges.sort_by_key(|(range, _)| range.start);

        let mut clipped: Vec<(AddressRange, Arc<UnitInfo>)> = Vec::with_capacity(self.ranges.len());
        let mut covered_to = 0u64;
        for (mut range, unit) in self.ranges.drain(..) {
            if !clipped.is_empty() {
                if range.end.value() <= covered_to {
                    continue;
                }
                if range.start.value() < covered_to {
                    range.start = Address::new(covered_to);
                }
            }
            covered_to = range.end.value();
            clipped.push((range, unit));
        }
        self.ranges = clipped;
        self.sealed = true;
    }

    /// Unit owning `address`, if any.
    pub fn find(&self, address: Address) -> Option<&Arc<UnitInfo>>
    {
        debug_assert!(self.sealed, "lookup in an unsealed address map");
        let index = self.ranges.partition_point(|(range, _)| range.start <= address);
        let (range, unit) = self.ranges.get(index.checked_sub(1)?)?;
        range.contains(address).then_some(unit)
    }

    pub fn len(&self) -> usize
    {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> impl Iterator<Item = (AddressRange, &Arc<UnitInfo>)>
    {
        self.ranges.iter().map(|(range, unit)| (*range, unit))
    }
}
