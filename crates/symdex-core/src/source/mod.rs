//! # Unit Sources
//!
//! The boundary between byte-level decoding and the index.
//!
//! A [`UnitSource`] knows how to enumerate and decode compilation units. It
//! never builds index structures itself: while scanning a unit it reports
//! what it finds through a [`Recorder`], which owns the task's shard, parent
//! map and string table.
//!
//! - [`DwarfSource`]: DWARF `.debug_info` read with `gimli`
//! - [`SymbolTableWorker`]: linker symbol tables read with `object`

mod dwarf;
mod symtab;

use std::collections::HashSet;
use std::sync::Arc;

pub use dwarf::DwarfSource;
pub use symtab::{SymbolRecord, SymbolTableWorker};

use crate::error::{Diagnostic, IndexError, IndexResult};
use crate::index::{AddressMap, EntryFlags, EntryRef, ParentKey, ParentLink, ParentMap, Shard, TaskOutcome, UnitInfo};
use crate::types::{AddressRange, EntryTag, Language};

/// A collection of independently scannable units.
///
/// Shared between scan tasks, so decoding state that is not thread safe
/// must be created per call.
pub trait UnitSource: Send + Sync + 'static
{
    fn unit_count(&self) -> usize;

    /// Relative cost of scanning unit `index`, used to balance tasks.
    fn unit_cost(&self, _index: usize) -> usize
    {
        1
    }

    /// Decode unit `index`, reporting its contents to `recorder`.
    ///
    /// Problems confined to one record should be reported with
    /// [`Recorder::complain`] and skipped. An error return abandons the rest
    /// of the unit; entries recorded before it are kept.
    fn scan_unit(&self, index: usize, recorder: &mut Recorder) -> IndexResult<()>;
}

/// Per-task string interner.
///
/// Equal spellings share one allocation, so raw names can be deduplicated
/// by pointer during finalize.
#[derive(Debug, Default)]
pub struct StringTable
{
    strings: HashSet<Arc<str>>,
}

impl StringTable
{
    pub fn intern(&mut self, value: &str) -> Arc<str>
    {
        if let Some(existing) = self.strings.get(value) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(value);
        self.strings.insert(Arc::clone(&interned));
        interned
    }

    pub fn len(&self) -> usize
    {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.strings.is_empty()
    }
}

/// Sink for the records of one scan task.
#[derive(Debug)]
pub struct Recorder
{
    shard: Shard,
    parents: ParentMap,
    addresses: AddressMap,
    strings: StringTable,
    diagnostics: Vec<Diagnostic>,
    errors: Vec<IndexError>,
    unit: Option<Arc<UnitInfo>>,
}

impl Recorder
{
    /// A recorder filling shard number `shard`.
    pub fn new(shard: u32) -> Self
    {
        Self {
            shard: Shard::new(shard),
            parents: ParentMap::new(),
            addresses: AddressMap::new(),
            strings: StringTable::default(),
            diagnostics: Vec::new(),
            errors: Vec::new(),
            unit: None,
        }
    }

    /// Begin a new unit; subsequent records belong to it.
    pub fn start_unit(&mut self, index: u32, offset: u64, language: Language, name: Option<&str>) -> Arc<UnitInfo>
    {
        let unit = Arc::new(UnitInfo {
            index,
            offset,
            language,
            name: name.map(|name| self.strings.intern(name)),
        });
        self.shard.add_unit(Arc::clone(&unit));
        self.unit = Some(Arc::clone(&unit));
        unit
    }

    /// The unit being scanned.
    pub fn unit(&self) -> Option<&Arc<UnitInfo>>
    {
        self.unit.as_ref()
    }

    fn current_unit(&self) -> IndexResult<Arc<UnitInfo>>
    {
        self.unit
            .clone()
            .ok_or_else(|| IndexError::InvalidArgument("record outside of a unit".to_string()))
    }

    /// Record one named entity.
    ///
    /// `parent` is `Root`, an already recorded scope, or a `Deferred` key to
    /// be resolved after all tasks finish.
    ///
    /// ## Errors
    ///
    /// `IndexError::InvalidArgument` if no unit was started.
    pub fn record(
        &mut self,
        offset: u64,
        tag: EntryTag,
        flags: EntryFlags,
        language: Language,
        name: &str,
        parent: ParentLink,
    ) -> IndexResult<EntryRef>
    {
        let unit = self.current_unit()?;
        let name = self.strings.intern(name);
        Ok(self.shard.add(&unit, offset, tag, flags, language, name, parent))
    }

    /// Declare that keys in `[start, end)` belong to `scope`.
    pub fn register_scope(&mut self, start: ParentKey, end: ParentKey, scope: EntryRef)
    {
        self.parents.add_entry(start, end, scope);
    }

    /// Scope registered by this task for `key`.
    pub fn lookup_scope(&self, key: ParentKey) -> Option<EntryRef>
    {
        self.parents.find(key)
    }

    /// Attribute an address range to the current unit.
    ///
    /// ## Errors
    ///
    /// `IndexError::InvalidArgument` if no unit was started.
    pub fn add_address_range(&mut self, range: AddressRange) -> IndexResult<()>
    {
        let unit = self.current_unit()?;
        self.addresses.insert(range, unit);
        Ok(())
    }

    /// Report a recoverable problem with one record.
    pub fn complain(&mut self, entry_offset: Option<u64>, message: impl Into<String>)
    {
        let unit_offset = self.unit.as_ref().map_or(0, |unit| unit.offset);
        self.diagnostics.push(Diagnostic {
            unit_offset,
            entry_offset,
            message: message.into(),
        });
    }

    /// Intern a string without recording anything.
    pub fn intern(&mut self, value: &str) -> Arc<str>
    {
        self.strings.intern(value)
    }

    /// Record a failure that abandoned a unit.
    pub fn fail(&mut self, error: IndexError)
    {
        self.errors.push(error);
    }

    /// Entries recorded so far.
    pub fn len(&self) -> usize
    {
        self.shard.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.shard.is_empty()
    }

    /// Seal the task's output.
    pub fn finish(mut self) -> TaskOutcome
    {
        self.shard.set_addresses(self.addresses);
        TaskOutcome {
            shard: self.shard,
            parents: self.parents,
            diagnostics: self.diagnostics,
            errors: self.errors,
        }
    }
}
