//! Index entries and the handles that refer to them.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use once_cell::sync::OnceCell;

use crate::types::{EntryTag, Language};

/// Stable handle of an entry: owning shard plus arena slot.
///
/// Arena slots never move, so a handle stays valid after the shard has been
/// sorted. Handles from one catalog are meaningless in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryRef
{
    pub shard: u32,
    pub slot: u32,
}

impl EntryRef
{
    pub const fn new(shard: u32, slot: u32) -> Self
    {
        Self { shard, slot }
    }
}

impl fmt::Display for EntryRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}:{}", self.shard, self.slot)
    }
}

bitflags! {
    /// Per-entry flags recorded by the scanner.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u8 {
        /// The record explicitly declares itself the program entry point.
        const IS_MAIN = 1 << 0;
        /// Not visible outside its unit.
        const IS_STATIC = 1 << 1;
        /// The name is a linkage name and already fully qualified.
        const IS_LINKAGE = 1 << 2;
        /// A type declaration rather than a definition.
        const IS_TYPE_DECLARATION = 1 << 3;
        /// The parent was not known while scanning and is resolved by finalize.
        const IS_PARENT_DEFERRED = 1 << 4;
        /// Created by finalize rather than recorded by a scanner.
        const IS_SYNTHESIZED = 1 << 5;
    }
}

/// Key into a parent map: a section offset plus the alternate-storage bit.
///
/// Keys from the supplementary (alternate) file order after every key of
/// the main file, so intervals from the two never interleave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParentKey
{
    pub alternate: bool,
    pub offset: u64,
}

impl ParentKey
{
    pub const fn new(offset: u64) -> Self
    {
        Self {
            alternate: false,
            offset,
        }
    }

    pub const fn alternate(offset: u64) -> Self
    {
        Self {
            alternate: true,
            offset,
        }
    }
}

impl fmt::Display for ParentKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.alternate {
            write!(f, "alt:0x{:x}", self.offset)
        } else {
            write!(f, "0x{:x}", self.offset)
        }
    }
}

/// Parent of an entry.
///
/// `Deferred` only exists between scanning and finalize. Finalize turns it
/// into `Resolved` when some scan task registered a scope covering the key,
/// or `Unresolved` when none did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink
{
    /// Top-level entry.
    Root,
    Resolved(EntryRef),
    Deferred(ParentKey),
    Unresolved(ParentKey),
}

impl ParentLink
{
    pub fn entry(self) -> Option<EntryRef>
    {
        match self {
            ParentLink::Resolved(parent) => Some(parent),
            _ => None,
        }
    }
}

/// The compilation unit (or name table) an entry was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo
{
    /// Position of the unit in its source.
    pub index: u32,
    /// Section offset of the unit header.
    pub offset: u64,
    pub language: Language,
    /// `DW_AT_name` of the unit, usually the primary source file.
    pub name: Option<Arc<str>>,
}

/// One named record.
///
/// Entries live in their shard's arena. The raw name is a shared handle into
/// the scan task's string table and is never copied. The canonical name is
/// filled in exactly once, by `Shard::finalize`.
#[derive(Debug, Clone)]
pub struct Entry
{
    pub(crate) id: EntryRef,
    pub(crate) offset: u64,
    pub(crate) tag: EntryTag,
    pub(crate) flags: EntryFlags,
    pub(crate) language: Language,
    pub(crate) name: Arc<str>,
    pub(crate) canonical: OnceCell<Arc<str>>,
    pub(crate) unit: Arc<UnitInfo>,
    pub(crate) parent: ParentLink,
}

impl Entry
{
    pub fn id(&self) -> EntryRef
    {
        self.id
    }

    /// Section offset of the record.
    pub fn offset(&self) -> u64
    {
        self.offset
    }

    pub fn tag(&self) -> EntryTag
    {
        self.tag
    }

    pub fn flags(&self) -> EntryFlags
    {
        self.flags
    }

    pub fn language(&self) -> Language
    {
        self.language
    }

    /// Name as it was recorded.
    pub fn raw_name(&self) -> &str
    {
        &self.name
    }

    pub(crate) fn raw_name_handle(&self) -> &Arc<str>
    {
        &self.name
    }

    /// Canonical name, once the owning shard has been finalized.
    pub fn canonical_name(&self) -> Option<&str>
    {
        self.canonical.get().map(AsRef::as_ref)
    }

    /// Canonical name if known, raw name otherwise.
    pub fn name(&self) -> &str
    {
        self.canonical_name().unwrap_or(&self.name)
    }

    pub fn unit(&self) -> &Arc<UnitInfo>
    {
        &self.unit
    }

    pub fn parent(&self) -> ParentLink
    {
        self.parent
    }

    pub fn is_main(&self) -> bool
    {
        self.flags.contains(EntryFlags::IS_MAIN)
    }

    pub(crate) fn set_canonical(&self, canonical: Arc<str>)
    {
        let accepted = self.canonical.set(canonical).is_ok();
        assert!(accepted, "canonical name of entry {} set twice", self.id);
    }

    /// Replace a deferred parent with its resolution.
    pub(crate) fn resolve_parent(&mut self, link: ParentLink)
    {
        let ParentLink::Deferred(_) = self.parent else {
            panic!("entry {} parent already resolved ({:?})", self.id, self.parent);
        };
        assert!(
            !matches!(link, ParentLink::Deferred(_)),
            "entry {} resolved to another deferred parent",
            self.id
        );
        self.parent = link;
    }

    /// Attach a scope to a top-level entry (used for decoded dotted names).
    pub(crate) fn adopt_parent(&mut self, parent: EntryRef)
    {
        assert!(
            self.parent == ParentLink::Root,
            "entry {} already has a parent ({:?})",
            self.id,
            self.parent
        );
        self.parent = ParentLink::Resolved(parent);
    }
}
