//! Scripted unit source shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use symdex_core::index::{Catalog, CatalogState, EntryFlags, ParentKey, ParentLink, ScanningWorker};
use symdex_core::source::{Recorder, UnitSource};
use symdex_core::types::{AddressRange, EntryTag, Language};
use symdex_core::{IndexConfig, IndexContext, IndexError, IndexResult};

/// Where a scripted record's parent comes from.
#[derive(Debug, Clone, Copy)]
pub enum Parent
{
    Root,
    /// A record of the same unit, by offset.
    Local(u64),
    /// A key resolved through the parent maps at finalize.
    Deferred(u64),
}

#[derive(Debug, Clone)]
struct Record
{
    offset: u64,
    tag: EntryTag,
    flags: EntryFlags,
    name: String,
    parent: Parent,
}

/// One synthetic compilation unit.
#[derive(Debug, Clone)]
pub struct ScriptedUnit
{
    offset: u64,
    language: Language,
    name: Option<String>,
    records: Vec<Record>,
    scopes: Vec<(u64, u64, u64)>,
    ranges: Vec<(u64, u64)>,
    complaints: Vec<String>,
    failure: Option<String>,
    panics: bool,
}

impl ScriptedUnit
{
    pub fn new(offset: u64, language: Language) -> Self
    {
        Self {
            offset,
            language,
            name: None,
            records: Vec::new(),
            scopes: Vec::new(),
            ranges: Vec::new(),
            complaints: Vec::new(),
            failure: None,
            panics: false,
        }
    }

    pub fn named(mut self, name: &str) -> Self
    {
        self.name = Some(name.to_string());
        self
    }

    /// A top-level record.
    pub fn entry(self, offset: u64, tag: EntryTag, name: &str) -> Self
    {
        self.entry_with(offset, tag, EntryFlags::empty(), name, Parent::Root)
    }

    pub fn entry_with(mut self, offset: u64, tag: EntryTag, flags: EntryFlags, name: &str, parent: Parent) -> Self
    {
        self.records.push(Record {
            offset,
            tag,
            flags,
            name: name.to_string(),
            parent,
        });
        self
    }

    /// Keys in `[start, end)` belong to the record at `scope`.
    pub fn scope(mut self, start: u64, end: u64, scope: u64) -> Self
    {
        self.scopes.push((start, end, scope));
        self
    }

    pub fn range(mut self, start: u64, end: u64) -> Self
    {
        self.ranges.push((start, end));
        self
    }

    pub fn complaint(mut self, message: &str) -> Self
    {
        self.complaints.push(message.to_string());
        self
    }

    /// Fail after recording everything else.
    pub fn failing(mut self, message: &str) -> Self
    {
        self.failure = Some(message.to_string());
        self
    }

    pub fn panicking(mut self) -> Self
    {
        self.panics = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSource
{
    units: Vec<ScriptedUnit>,
}

impl ScriptedSource
{
    pub fn new(units: Vec<ScriptedUnit>) -> Self
    {
        Self { units }
    }
}

impl UnitSource for ScriptedSource
{
    fn unit_count(&self) -> usize
    {
        self.units.len()
    }

    fn unit_cost(&self, index: usize) -> usize
    {
        self.units[index].records.len().max(1)
    }

    fn scan_unit(&self, index: usize, recorder: &mut Recorder) -> IndexResult<()>
    {
        let unit = &self.units[index];
        if unit.panics {
            panic!("scripted unit {index} exploded");
        }
        recorder.start_unit(index as u32, unit.offset, unit.language, unit.name.as_deref());

        let mut local = HashMap::new();
        for record in &unit.records {
            let parent = match record.parent {
                Parent::Root => ParentLink::Root,
                Parent::Local(offset) => ParentLink::Resolved(local[&offset]),
                Parent::Deferred(key) => ParentLink::Deferred(ParentKey::new(key)),
            };
            let id = recorder.record(
                record.offset,
                record.tag,
                record.flags,
                unit.language,
                &record.name,
                parent,
            )?;
            local.insert(record.offset, id);
        }
        for &(start, end, scope) in &unit.scopes {
            recorder.register_scope(ParentKey::new(start), ParentKey::new(end), local[&scope]);
        }
        for &(start, end) in &unit.ranges {
            recorder.add_address_range(AddressRange::new(start, end))?;
        }
        for message in &unit.complaints {
            recorder.complain(None, message.clone());
        }
        match &unit.failure {
            Some(message) => Err(IndexError::InvalidArgument(message.clone())),
            None => Ok(()),
        }
    }
}

pub fn context(threads: usize) -> IndexContext
{
    IndexContext::new(IndexConfig::synchronous().with_threads(threads))
}

/// Index `units` and wait for the whole lifecycle.
pub fn index(threads: usize, units: Vec<ScriptedUnit>) -> (Arc<Catalog>, IndexResult<()>)
{
    let context = context(threads);
    let catalog = Catalog::new(&context);
    catalog
        .start_reading(Box::new(ScanningWorker::new(ScriptedSource::new(units))))
        .unwrap();
    let waited = catalog.wait(CatalogState::CacheDone, false);
    (catalog, waited)
}
