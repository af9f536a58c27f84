//! # Shard
//!
//! The output of one scan task.
//!
//! A shard owns an arena of [`Entry`] values, the units they came from and
//! an address map. During scanning it is written by exactly one task. After
//! every task has finished, [`Shard::finalize`] resolves deferred parents,
//! assigns canonical names and sorts the entries; from then on the shard is
//! immutable and searched by binary search.
//!
//! ## Main candidate
//!
//! A shard remembers two candidates for the program entry point, each the
//! first of its kind in recording order:
//!
//! 1. the first entry flagged `IS_MAIN` (an explicit declaration) whose
//!    language does not require canonicalization;
//! 2. the first top-level function named `main` whose language spells its
//!    entry point that way.
//!
//! Both slots are filled independently, so the catalog's choice does not
//! depend on how units were grouped into tasks.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::address_map::AddressMap;
use super::canonical;
use super::compare::{compare, MatchMode};
use super::entry::{Entry, EntryFlags, EntryRef, ParentLink, UnitInfo};
use super::parent_map::ParentMapAggregate;
use crate::types::{EntryTag, Language};

/// Entries produced by one scan task. See the module documentation.
#[derive(Debug)]
pub struct Shard
{
    index: u32,
    /// Arena. Slots never move; `order` holds the sorted view.
    entries: Vec<Entry>,
    order: Vec<u32>,
    units: Vec<Arc<UnitInfo>>,
    addresses: Arc<AddressMap>,
    explicit_main: Option<u32>,
    named_main: Option<u32>,
    unresolved_parents: usize,
    finalized: bool,
}

impl Shard
{
    pub(crate) fn new(index: u32) -> Self
    {
        Self {
            index,
            entries: Vec::new(),
            order: Vec::new(),
            units: Vec::new(),
            addresses: Arc::new(AddressMap::new()),
            explicit_main: None,
            named_main: None,
            unresolved_parents: 0,
            finalized: false,
        }
    }

    pub fn index(&self) -> u32
    {
        self.index
    }

    pub(crate) fn add_unit(&mut self, unit: Arc<UnitInfo>)
    {
        self.units.push(unit);
    }

    /// Allocate a new entry in the arena.
    ///
    /// A `Deferred` parent sets `IS_PARENT_DEFERRED`; the two always agree.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add(
        &mut self,
        unit: &Arc<UnitInfo>,
        offset: u64,
        tag: EntryTag,
        mut flags: EntryFlags,
        language: Language,
        name: Arc<str>,
        parent: ParentLink,
    ) -> EntryRef
    {
        assert!(!self.finalized, "add to finalized shard {}", self.index);
        assert!(
            !matches!(parent, ParentLink::Unresolved(_)),
            "entries are recorded with a resolved or deferred parent"
        );
        flags.set(EntryFlags::IS_PARENT_DEFERRED, matches!(parent, ParentLink::Deferred(_)));

        let slot = self.next_slot();
        let id = EntryRef::new(self.index, slot);
        self.entries.push(Entry {
            id,
            offset,
            tag,
            flags,
            language,
            name,
            canonical: OnceCell::new(),
            unit: Arc::clone(unit),
            parent,
        });

        if flags.contains(EntryFlags::IS_MAIN) {
            if self.explicit_main.is_none() && !language.requires_canonicalization() {
                self.explicit_main = Some(slot);
            }
        } else if self.named_main.is_none()
            && tag == EntryTag::Function
            && parent == ParentLink::Root
            && language.may_use_plain_main_name()
            && &*self.entries[slot as usize].name == "main"
        {
            self.named_main = Some(slot);
        }

        id
    }

    fn next_slot(&self) -> u32
    {
        u32::try_from(self.entries.len()).unwrap_or_else(|_| panic!("shard {} arena overflow", self.index))
    }

    pub(crate) fn set_addresses(&mut self, mut addresses: AddressMap)
    {
        addresses.seal();
        self.addresses = Arc::new(addresses);
    }

    pub fn addresses(&self) -> &Arc<AddressMap>
    {
        &self.addresses
    }

    pub fn units(&self) -> &[Arc<UnitInfo>]
    {
        &self.units
    }

    /// First explicitly declared entry point usable before finalize.
    pub fn explicit_main(&self) -> Option<&Entry>
    {
        self.explicit_main.map(|slot| &self.entries[slot as usize])
    }

    /// First top-level function recognized as `main` by name.
    pub fn named_main(&self) -> Option<&Entry>
    {
        self.named_main.map(|slot| &self.entries[slot as usize])
    }

    /// Entry in arena slot `slot`.
    pub fn entry(&self, slot: u32) -> Option<&Entry>
    {
        self.entries.get(slot as usize)
    }

    /// Entries in sorted order once finalized, in recording order before.
    pub fn entries(&self) -> impl Iterator<Item = &Entry>
    {
        let (sorted, recorded): (&[u32], &[Entry]) = if self.finalized {
            (&self.order, &[])
        } else {
            (&[], &self.entries)
        };
        sorted.iter().map(|&slot| &self.entries[slot as usize]).chain(recorded)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn is_finalized(&self) -> bool
    {
        self.finalized
    }

    /// Entries whose parent key matched no registered scope.
    pub fn unresolved_parents(&self) -> usize
    {
        self.unresolved_parents
    }

    /// The contiguous run of sorted entries equal to `name` under `mode`.
    ///
    /// ## Panics
    ///
    /// If the shard has not been finalized.
    pub fn find(&self, name: &str, mode: MatchMode) -> impl Iterator<Item = &Entry>
    {
        assert!(self.finalized, "search in unfinalized shard {}", self.index);
        let key = |slot: &u32| compare(self.entries[*slot as usize].name(), name, mode);
        let lower = self.order.partition_point(|slot| key(slot) == Ordering::Less);
        let upper = lower + self.order[lower..].partition_point(|slot| key(slot) == Ordering::Equal);
        self.order[lower..upper].iter().map(|&slot| &self.entries[slot as usize])
    }

    /// Resolve deferred parents, assign canonical names and sort.
    ///
    /// Must run after every scan task has finished, since a deferred parent
    /// may live in any shard.
    ///
    /// ## Panics
    ///
    /// If called twice.
    pub(crate) fn finalize(&mut self, parents: &ParentMapAggregate)
    {
        assert!(!self.finalized, "shard {} finalized twice", self.index);

        // Keyed by the address of the interned raw name.
        let mut seen_names: HashMap<usize, Arc<str>> = HashMap::new();
        let mut gnat_scopes: HashMap<Arc<str>, u32> = HashMap::new();

        let recorded = self.entries.len();
        for slot in 0..recorded {
            if let ParentLink::Deferred(key) = self.entries[slot].parent {
                let link = match parents.find(key) {
                    Some(parent) => ParentLink::Resolved(parent),
                    None => {
                        self.unresolved_parents += 1;
                        ParentLink::Unresolved(key)
                    }
                };
                self.entries[slot].resolve_parent(link);
            }

            let entry = &self.entries[slot];
            let raw = Arc::clone(entry.raw_name_handle());
            if entry.flags.contains(EntryFlags::IS_LINKAGE) {
                entry.set_canonical(raw);
            } else if entry.language.uses_dotted_encoding() {
                self.name_dotted_entry(slot, raw, &mut gnat_scopes);
            } else if entry.language.requires_canonicalization() {
                let canonical = seen_names
                    .entry(Arc::as_ptr(&raw).cast::<u8>() as usize)
                    .or_insert_with(|| canonical::canonicalize_c_family(&raw).map_or_else(|| Arc::clone(&raw), Arc::from));
                entry.set_canonical(Arc::clone(canonical));
            } else {
                entry.set_canonical(raw);
            }
        }

        let entries = &self.entries;
        self.order = (0..self.next_slot()).collect();
        self.order.sort_by(|&a, &b| {
            compare(entries[a as usize].name(), entries[b as usize].name(), MatchMode::Sort)
        });
        self.finalized = true;

        debug!(
            "Finalized shard {}: {} entries ({} synthesized), {} unresolved parents, {} distinct C-family names",
            self.index,
            self.entries.len(),
            self.entries.len() - recorded,
            self.unresolved_parents,
            seen_names.len()
        );
    }

    /// Decode a GNAT-encoded name and hang the entry under synthesized
    /// namespaces for its leading components.
    ///
    /// Namespaces are deduplicated by component name against the most
    /// recently synthesized namespace of that name, and only while it
    /// belongs to the same unit. Two packages in one unit with a child of
    /// the same name share that child's namespace; this approximation is
    /// accepted. Entries that already sit inside a recorded scope keep it
    /// and only get their leaf name.
    fn name_dotted_entry(&mut self, slot: usize, raw: Arc<str>, gnat_scopes: &mut HashMap<Arc<str>, u32>)
    {
        let Some(decoded) = canonical::decode_gnat(&raw) else {
            self.entries[slot].set_canonical(raw);
            return;
        };
        let mut components: Vec<&str> = decoded.split('.').collect();
        let leaf = Arc::<str>::from(components.pop().unwrap_or(decoded.as_str()));

        if components.is_empty() || self.entries[slot].parent != ParentLink::Root {
            self.entries[slot].set_canonical(leaf);
            return;
        }

        let unit = Arc::clone(&self.entries[slot].unit);
        let offset = self.entries[slot].offset;
        let mut parent = ParentLink::Root;
        for component in components {
            let reusable = gnat_scopes
                .get(component)
                .copied()
                .filter(|&scope| Arc::ptr_eq(&self.entries[scope as usize].unit, &unit));
            let scope = match reusable {
                Some(scope) => scope,
                None => {
                    let scope = self.synthesize_namespace(&unit, offset, component, parent);
                    gnat_scopes.insert(Arc::from(component), scope);
                    scope
                }
            };
            parent = ParentLink::Resolved(EntryRef::new(self.index, scope));
        }

        if let ParentLink::Resolved(scope) = parent {
            self.entries[slot].adopt_parent(scope);
        }
        self.entries[slot].set_canonical(leaf);
    }

    fn synthesize_namespace(&mut self, unit: &Arc<UnitInfo>, offset: u64, name: &str, parent: ParentLink) -> u32
    {
        let slot = self.next_slot();
        let name: Arc<str> = Arc::from(name);
        let entry = Entry {
            id: EntryRef::new(self.index, slot),
            offset,
            tag: EntryTag::Namespace,
            flags: EntryFlags::IS_SYNTHESIZED,
            language: Language::Ada,
            name: Arc::clone(&name),
            canonical: OnceCell::new(),
            unit: Arc::clone(unit),
            parent,
        };
        entry.set_canonical(name);
        self.entries.push(entry);
        slot
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::index::entry::ParentKey;
    use crate::index::parent_map::ParentMap;

    fn unit(language: Language) -> Arc<UnitInfo>
    {
        Arc::new(UnitInfo {
            index: 0,
            offset: 0,
            language,
            name: None,
        })
    }

    fn add(shard: &mut Shard, unit: &Arc<UnitInfo>, name: &str, tag: EntryTag, flags: EntryFlags) -> EntryRef
    {
        shard.add(unit, 0, tag, flags, unit.language, Arc::from(name), ParentLink::Root)
    }

    #[test]
    fn test_explicit_and_named_main_tracked_separately()
    {
        let cu = unit(Language::Rust);
        let mut shard = Shard::new(0);
        add(&mut shard, &cu, "main", EntryTag::Function, EntryFlags::empty());
        let explicit = add(&mut shard, &cu, "start", EntryTag::Function, EntryFlags::IS_MAIN);
        add(&mut shard, &cu, "other", EntryTag::Function, EntryFlags::IS_MAIN);

        assert_eq!(shard.explicit_main().map(Entry::id), Some(explicit));
        assert_eq!(shard.named_main().map(Entry::raw_name), Some("main"));
    }

    #[test]
    fn test_canonicalizing_explicit_main_keeps_slot_open()
    {
        let cpp = unit(Language::Cpp);
        let go = unit(Language::Go);
        let mut shard = Shard::new(0);
        add(&mut shard, &cpp, "cpp_entry", EntryTag::Function, EntryFlags::IS_MAIN);
        let main = add(&mut shard, &go, "main", EntryTag::Function, EntryFlags::empty());
        let go_entry = add(&mut shard, &go, "go_entry", EntryTag::Function, EntryFlags::IS_MAIN);

        assert_eq!(shard.explicit_main().map(Entry::id), Some(go_entry));
        assert_eq!(shard.named_main().map(Entry::id), Some(main));
    }

    #[test]
    fn test_plain_main_ignored_for_fortran()
    {
        let cu = unit(Language::Fortran);
        let mut shard = Shard::new(0);
        add(&mut shard, &cu, "main", EntryTag::Function, EntryFlags::empty());
        assert!(shard.named_main().is_none());
        assert!(shard.explicit_main().is_none());
    }

    #[test]
    fn test_c_family_names_share_canonical_string()
    {
        let cu = unit(Language::Cpp);
        let raw: Arc<str> = Arc::from("f(int,int)");
        let mut shard = Shard::new(0);
        let function = EntryTag::Function;
        let a = shard.add(&cu, 1, function, EntryFlags::empty(), Language::Cpp, Arc::clone(&raw), ParentLink::Root);
        let b = shard.add(&cu, 2, function, EntryFlags::empty(), Language::Cpp, raw, ParentLink::Root);
        shard.finalize(&ParentMapAggregate::new());

        let first = shard.entry(a.slot).and_then(|e| e.canonical.get()).expect("canonical");
        let second = shard.entry(b.slot).and_then(|e| e.canonical.get()).expect("canonical");
        assert_eq!(&**first, "f(int, int)");
        assert!(Arc::ptr_eq(first, second));
    }

    #[test]
    fn test_gnat_names_synthesize_namespaces()
    {
        let cu = unit(Language::Ada);
        let mut shard = Shard::new(0);
        let first = add(&mut shard, &cu, "pkg__child__proc", EntryTag::Function, EntryFlags::empty());
        let second = add(&mut shard, &cu, "pkg__child__other", EntryTag::Function, EntryFlags::empty());
        shard.finalize(&ParentMapAggregate::new());

        // pkg and pkg.child, shared by both procedures
        assert_eq!(shard.len(), 4);
        let first = shard.entry(first.slot).expect("entry");
        let second = shard.entry(second.slot).expect("entry");
        assert_eq!(first.name(), "proc");
        assert_eq!(first.parent(), second.parent());

        let child = shard.entry(first.parent().entry().expect("scope").slot).expect("child");
        assert_eq!(child.name(), "child");
        assert_eq!(child.tag(), EntryTag::Namespace);
        assert!(child.flags().contains(EntryFlags::IS_SYNTHESIZED));
        let pkg = shard.entry(child.parent().entry().expect("scope").slot).expect("pkg");
        assert_eq!(pkg.name(), "pkg");
        assert_eq!(pkg.parent(), ParentLink::Root);
    }

    #[test]
    fn test_deferred_parent_resolution()
    {
        let cu = unit(Language::Rust);
        let mut shard = Shard::new(0);
        let scope = add(&mut shard, &cu, "scope", EntryTag::Structure, EntryFlags::empty());
        let deferred = |key| ParentLink::Deferred(ParentKey::new(key));
        let function = EntryTag::Function;
        let known = shard.add(&cu, 5, function, EntryFlags::empty(), Language::Rust, Arc::from("known"), deferred(0x15));
        let lost = shard.add(&cu, 6, function, EntryFlags::empty(), Language::Rust, Arc::from("lost"), deferred(0x99));

        let mut map = ParentMap::new();
        map.add_entry(ParentKey::new(0x10), ParentKey::new(0x20), scope);
        let aggregate: ParentMapAggregate = std::iter::once(map).collect();
        shard.finalize(&aggregate);

        assert_eq!(shard.entry(known.slot).map(Entry::parent), Some(ParentLink::Resolved(scope)));
        assert_eq!(shard.entry(lost.slot).map(Entry::parent), Some(ParentLink::Unresolved(ParentKey::new(0x99))));
        assert!(shard.entry(known.slot).is_some_and(|e| e.flags().contains(EntryFlags::IS_PARENT_DEFERRED)));
        assert_eq!(shard.unresolved_parents(), 1);
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_finalize_twice_panics()
    {
        let cu = unit(Language::C);
        let mut shard = Shard::new(3);
        add(&mut shard, &cu, "x", EntryTag::Variable, EntryFlags::empty());
        let parents = ParentMapAggregate::new();
        shard.finalize(&parents);
        shard.finalize(&parents);
    }

    #[test]
    #[should_panic(expected = "already resolved")]
    fn test_resolving_parent_twice_panics()
    {
        let cu = unit(Language::Cpp);
        let mut shard = Shard::new(0);
        let deferred = ParentLink::Deferred(ParentKey::new(0x40));
        let id = shard.add(&cu, 1, EntryTag::Function, EntryFlags::empty(), Language::Cpp, Arc::from("f"), deferred);
        shard.finalize(&ParentMapAggregate::new());

        let entry = &mut shard.entries[id.slot as usize];
        assert_eq!(entry.parent(), ParentLink::Unresolved(ParentKey::new(0x40)));
        entry.resolve_parent(ParentLink::Root);
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn test_canonical_name_set_twice_panics()
    {
        let cu = unit(Language::C);
        let mut shard = Shard::new(0);
        let id = add(&mut shard, &cu, "f", EntryTag::Function, EntryFlags::empty());
        shard.finalize(&ParentMapAggregate::new());

        shard.entries[id.slot as usize].set_canonical(Arc::from("g"));
    }

    #[test]
    fn test_find_template_and_prefix()
    {
        let cu = unit(Language::Rust);
        let mut shard = Shard::new(0);
        for name in ["vec", "Vec<u8>", "vector", "vec<T>", "other"] {
            add(&mut shard, &cu, name, EntryTag::Structure, EntryFlags::empty());
        }
        shard.finalize(&ParentMapAggregate::new());

        let exact: Vec<&str> = shard.find("vec", MatchMode::Match).map(Entry::name).collect();
        assert_eq!(exact.len(), 3);
        assert!(!exact.contains(&"vector"));

        let completed = shard.find("ve", MatchMode::Complete).count();
        assert_eq!(completed, 4);
        assert_eq!(shard.find("missing", MatchMode::Match).count(), 0);
    }
}
