//! DWARF `.debug_info` scanning.
//!
//! Sections are loaded once from the object file and shared (as `Arc<[u8]>`)
//! between tasks. Every `scan_unit` call builds its own `gimli::Dwarf` over
//! those bytes, so tasks never share decoder state.
//!
//! ## What gets recorded
//!
//! Named functions, variables, constants, types, enumerators, namespaces and
//! modules outside function bodies. Non-defining declarations of functions
//! and variables are skipped (their definitions are recorded), type
//! declarations are kept and flagged.
//!
//! ## Scope intervals
//!
//! A scope owns the section offsets of its children. Nested scopes punch
//! holes into their parent's range, so each scope registers one interval per
//! gap between nested scopes and the parent map never sees an overlap.

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, Reader as _, DebugInfoOffset, DebuggingInformationEntry, Dwarf, EndianArcSlice, RunTimeEndian,
    SectionId, Unit, UnitOffset,
};
use object::{Object, ObjectSection};
use tracing::debug;

use super::{Recorder, UnitSource};
use crate::error::{map_dwarf_error, IndexError, IndexResult};
use crate::index::{canonical, EntryFlags, EntryRef, ParentKey, ParentLink};
use crate::types::{AddressRange, EntryTag, Language};

type Reader = EndianArcSlice<RunTimeEndian>;
type Die<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, Reader>;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
];

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> IndexResult<Option<Arc<[u8]>>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| IndexError::Object(format!("failed to read {name}: {err}")))?;
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }

    Ok(None)
}

#[derive(Debug, Clone, Copy)]
struct UnitSpan
{
    offset: usize,
    length: usize,
}

impl UnitSpan
{
    fn contains(&self, offset: usize) -> bool
    {
        offset >= self.offset && offset - self.offset < self.length
    }
}

/// DWARF sections of one object file.
#[derive(Debug)]
pub struct DwarfSource
{
    endian: RunTimeEndian,
    sections: HashMap<&'static str, Arc<[u8]>>,
    units: Vec<UnitSpan>,
}

impl DwarfSource
{
    /// Read the DWARF sections of the object file at `path`.
    ///
    /// ## Errors
    ///
    /// I/O errors, `IndexError::Object` for unparseable files and
    /// `IndexError::Dwarf` when the unit headers cannot be enumerated.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        debug!("Loading DWARF from {} ({} bytes)", path.display(), bytes.len());
        Self::parse(&bytes)
    }

    /// Like [`DwarfSource::open`] for an object file already in memory.
    pub fn parse(data: &[u8]) -> IndexResult<Self>
    {
        let file = object::File::parse(data).map_err(|err| IndexError::Object(err.to_string()))?;
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            if let Some(data) = load_section_bytes(&file, aliases)? {
                sections.insert(*canonical, data);
            }
        }
        Self::from_loaded(endian, sections)
    }

    /// Build a source from raw section contents.
    pub fn from_sections<I>(endian: RunTimeEndian, sections: I) -> IndexResult<Self>
    where
        I: IntoIterator<Item = (SectionId, Vec<u8>)>,
    {
        let sections = sections
            .into_iter()
            .map(|(id, data)| (id.name(), Arc::<[u8]>::from(data)))
            .collect();
        Self::from_loaded(endian, sections)
    }

    fn from_loaded(endian: RunTimeEndian, sections: HashMap<&'static str, Arc<[u8]>>) -> IndexResult<Self>
    {
        let mut source = Self {
            endian,
            sections,
            units: Vec::new(),
        };

        let dwarf = source.load()?;
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            if let Some(offset) = header.offset().as_debug_info_offset() {
                source.units.push(UnitSpan {
                    offset: offset.0,
                    length: header.length_including_self(),
                });
            }
        }
        debug!("Found {} compilation units", source.units.len());
        Ok(source)
    }

    pub fn has_debug_info(&self) -> bool
    {
        !self.units.is_empty()
    }

    fn load(&self) -> IndexResult<Dwarf<Reader>>
    {
        Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
            .map_err(|err| map_dwarf_error("loading DWARF sections", err))
    }

    fn section_reader(&self, id: SectionId) -> Reader
    {
        let data = self
            .sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }
}

impl UnitSource for DwarfSource
{
    fn unit_count(&self) -> usize
    {
        self.units.len()
    }

    fn unit_cost(&self, index: usize) -> usize
    {
        self.units.get(index).map_or(1, |span| span.length)
    }

    fn scan_unit(&self, index: usize, recorder: &mut Recorder) -> IndexResult<()>
    {
        let span = *self
            .units
            .get(index)
            .ok_or_else(|| IndexError::InvalidArgument(format!("no compilation unit {index}")))?;
        let dwarf = self.load()?;
        let header = dwarf
            .debug_info
            .header_from_offset(DebugInfoOffset(span.offset))
            .map_err(|err| map_dwarf_error("reading unit header", err))?;
        let unit = dwarf
            .unit(header)
            .map_err(|err| map_dwarf_error("parsing compilation unit", err))?;

        let scanner = UnitScanner {
            dwarf: &dwarf,
            unit: &unit,
            span,
            units: &self.units,
            foreign: HashMap::new(),
            recorder,
            language: Language::Unknown,
            frames: Vec::new(),
        };
        scanner.run(index)
    }
}

/// Where `DW_AT_specification` / `DW_AT_abstract_origin` point.
#[derive(Debug, Clone, Copy)]
enum Origin
{
    Section(usize),
    Supplementary(usize),
}

#[derive(Debug, Default)]
struct Attributes
{
    name: Option<String>,
    linkage_name: Option<String>,
    external: Option<bool>,
    declaration: bool,
    main_subprogram: bool,
    enum_class: bool,
    origin: Option<Origin>,
}

#[derive(Debug)]
enum FrameKind
{
    /// A recorded scope; `gap_start` opens the range of offsets it still owns.
    Scope
    {
        entry: EntryRef,
        gap_start: u64,
    },
    /// A function body; nothing below it is indexed.
    Skip,
    /// An unindexed DIE whose children belong to the enclosing scope.
    Transparent,
}

#[derive(Debug)]
struct Frame
{
    depth: isize,
    kind: FrameKind,
}

struct UnitScanner<'a>
{
    dwarf: &'a Dwarf<Reader>,
    unit: &'a Unit<Reader>,
    span: UnitSpan,
    units: &'a [UnitSpan],
    /// Other units opened to read the targets of cross-unit references.
    foreign: HashMap<usize, Unit<Reader>>,
    recorder: &'a mut Recorder,
    language: Language,
    frames: Vec<Frame>,
}

impl UnitScanner<'_>
{
    fn run(mut self, index: usize) -> IndexResult<()>
    {
        let unit = self.unit;
        let mut cursor = unit.entries();
        let mut depth: isize = 0;
        let mut root = true;

        while let Some((delta, die)) = cursor
            .next_dfs()
            .map_err(|err| map_dwarf_error("traversing DIE tree", err))?
        {
            depth += delta;
            let offset = self.section_offset(die.offset());
            self.close_frames(depth, offset);

            if root {
                self.start_unit(index, die)?;
                root = false;
                continue;
            }
            if self.frames.iter().any(|frame| matches!(frame.kind, FrameKind::Skip)) {
                continue;
            }
            self.index_die(depth, offset, die)?;
        }

        let end = (self.span.offset + self.span.length) as u64;
        self.close_frames(0, end);
        Ok(())
    }

    fn section_offset(&self, offset: UnitOffset) -> u64
    {
        (self.span.offset + offset.0) as u64
    }

    fn start_unit(&mut self, index: usize, root: &Die<'_, '_>) -> IndexResult<()>
    {
        let attributes = match read_attributes(self.dwarf, self.unit, root) {
            Ok(attributes) => attributes,
            Err(err) => {
                self.recorder.complain(Some(self.span.offset as u64), err.to_string());
                Attributes::default()
            }
        };
        self.language = match root.attr_value(constants::DW_AT_language) {
            Ok(Some(AttributeValue::Language(lang))) => Language::from_dwarf(lang),
            _ => Language::Unknown,
        };
        self.recorder.start_unit(
            index as u32,
            self.span.offset as u64,
            self.language,
            attributes.name.as_deref(),
        );

        match self.dwarf.unit_ranges(self.unit) {
            Ok(mut ranges) => loop {
                match ranges.next() {
                    Ok(Some(range)) => self.recorder.add_address_range(AddressRange::new(range.begin, range.end))?,
                    Ok(None) => break,
                    Err(err) => {
                        self.recorder.complain(None, format!("unit address ranges: {err}"));
                        break;
                    }
                }
            },
            Err(err) => self.recorder.complain(None, format!("unit address ranges: {err}")),
        }
        Ok(())
    }

    fn index_die(&mut self, depth: isize, offset: u64, die: &Die<'_, '_>) -> IndexResult<()>
    {
        let Some(tag) = indexed_tag(die.tag()) else {
            self.push_passive(depth, die, FrameKind::Transparent);
            return Ok(());
        };

        let mut attributes = match read_attributes(self.dwarf, self.unit, die) {
            Ok(attributes) => attributes,
            Err(err) => {
                self.recorder.complain(Some(offset), err.to_string());
                self.push_passive(depth, die, FrameKind::Skip);
                return Ok(());
            }
        };
        if let Some(origin) = attributes.origin {
            if let Err(err) = self.merge_origin(origin, &mut attributes) {
                self.recorder.complain(Some(offset), format!("reading referenced DIE: {err}"));
            }
        }

        let is_code_or_data = matches!(tag, EntryTag::Function | EntryTag::Variable);
        if attributes.declaration && is_code_or_data {
            self.push_passive(depth, die, FrameKind::Skip);
            return Ok(());
        }

        let mut flags = EntryFlags::empty();
        let name = match (attributes.name.take(), attributes.linkage_name.take()) {
            (Some(name), _) => name,
            (None, Some(linkage)) => {
                flags |= EntryFlags::IS_LINKAGE;
                canonical::demangle(&linkage).unwrap_or(linkage)
            }
            (None, None) if tag == EntryTag::Namespace && self.language == Language::Cpp => {
                "(anonymous namespace)".to_string()
            }
            (None, None) => {
                let kind = if tag == EntryTag::Function {
                    FrameKind::Skip
                } else {
                    FrameKind::Transparent
                };
                self.push_passive(depth, die, kind);
                return Ok(());
            }
        };

        if is_code_or_data && attributes.external != Some(true) {
            flags |= EntryFlags::IS_STATIC;
        }
        if attributes.declaration && tag.is_type() {
            flags |= EntryFlags::IS_TYPE_DECLARATION;
        }
        if attributes.main_subprogram {
            flags |= EntryFlags::IS_MAIN;
        }

        let parent = match attributes.origin {
            Some(origin) => self.origin_parent(origin, offset),
            None => self.enclosing_scope().map_or(ParentLink::Root, ParentLink::Resolved),
        };
        let id = self.recorder.record(offset, tag, flags, self.language, &name, parent)?;

        if !die.has_children() {
            return Ok(());
        }
        match tag {
            EntryTag::Function => self.frames.push(Frame {
                depth,
                kind: FrameKind::Skip,
            }),
            EntryTag::Enumeration if !attributes.enum_class => self.frames.push(Frame {
                depth,
                kind: FrameKind::Transparent,
            }),
            tag if tag.is_scope() => self.open_scope(depth, offset, id),
            _ => self.frames.push(Frame {
                depth,
                kind: FrameKind::Transparent,
            }),
        }
        Ok(())
    }

    fn push_passive(&mut self, depth: isize, die: &Die<'_, '_>, kind: FrameKind)
    {
        if die.has_children() {
            self.frames.push(Frame { depth, kind });
        }
    }

    fn enclosing_scope(&self) -> Option<EntryRef>
    {
        self.frames.iter().rev().find_map(|frame| match frame.kind {
            FrameKind::Scope { entry, .. } => Some(entry),
            _ => None,
        })
    }

    fn innermost_gap(&mut self) -> Option<(&mut u64, EntryRef)>
    {
        self.frames.iter_mut().rev().find_map(|frame| match &mut frame.kind {
            FrameKind::Scope { entry, gap_start } => Some((gap_start, *entry)),
            _ => None,
        })
    }

    fn open_scope(&mut self, depth: isize, offset: u64, entry: EntryRef)
    {
        // The new scope's own DIE still belongs to the enclosing scope.
        let split = offset + 1;
        if let Some((gap_start, outer)) = self.innermost_gap() {
            let start = std::mem::replace(gap_start, split);
            if start < split {
                self.recorder
                    .register_scope(ParentKey::new(start), ParentKey::new(split), outer);
            }
        }
        self.frames.push(Frame {
            depth,
            kind: FrameKind::Scope {
                entry,
                gap_start: split,
            },
        });
    }

    /// Close every frame at or below `depth`; `offset` is where they end.
    fn close_frames(&mut self, depth: isize, offset: u64)
    {
        while self.frames.last().is_some_and(|frame| frame.depth >= depth) {
            let Some(frame) = self.frames.pop() else {
                break;
            };
            if let FrameKind::Scope { entry, gap_start } = frame.kind {
                if gap_start < offset {
                    self.recorder
                        .register_scope(ParentKey::new(gap_start), ParentKey::new(offset), entry);
                }
                if let Some((outer_gap, _)) = self.innermost_gap() {
                    *outer_gap = offset;
                }
            }
        }
    }

    /// Parent of a DIE defined elsewhere: the scope containing its declaration.
    fn origin_parent(&self, origin: Origin, offset: u64) -> ParentLink
    {
        let target = match origin {
            Origin::Supplementary(target) => return ParentLink::Deferred(ParentKey::alternate(target as u64)),
            Origin::Section(target) => target,
        };
        let key = ParentKey::new(target as u64);
        if let Some(scope) = self.recorder.lookup_scope(key) {
            return ParentLink::Resolved(scope);
        }
        if !self.span.contains(target) || key.offset >= offset {
            return ParentLink::Deferred(key);
        }

        // Earlier in this unit: either inside a scope that is still open, or
        // at the top level.
        self.frames
            .iter()
            .rev()
            .find_map(|frame| match frame.kind {
                FrameKind::Scope { entry, gap_start } if key.offset >= gap_start => Some(entry),
                _ => None,
            })
            .map_or(ParentLink::Root, ParentLink::Resolved)
    }

    /// Fill attributes the referencing DIE leaves out from its target.
    fn merge_origin(&mut self, origin: Origin, attributes: &mut Attributes) -> IndexResult<()>
    {
        let Origin::Section(target) = origin else {
            return Ok(());
        };
        let referenced = if self.span.contains(target) {
            let die = self
                .unit
                .entry(UnitOffset(target - self.span.offset))
                .map_err(|err| map_dwarf_error("resolving DIE reference", err))?;
            read_attributes(self.dwarf, self.unit, &die)?
        } else {
            let Some(base) = self.foreign_base(target) else {
                return Ok(());
            };
            let dwarf = self.dwarf;
            let unit = self.foreign_unit(base)?;
            let die = unit
                .entry(UnitOffset(target - base))
                .map_err(|err| map_dwarf_error("resolving cross-unit DIE reference", err))?;
            read_attributes(dwarf, unit, &die)?
        };

        if attributes.name.is_none() {
            attributes.name = referenced.name;
        }
        if attributes.linkage_name.is_none() {
            attributes.linkage_name = referenced.linkage_name;
        }
        if attributes.external.is_none() {
            attributes.external = referenced.external;
        }
        attributes.main_subprogram |= referenced.main_subprogram;
        Ok(())
    }

    fn foreign_base(&self, target: usize) -> Option<usize>
    {
        let position = self.units.partition_point(|span| span.offset <= target);
        let span = self.units.get(position.checked_sub(1)?)?;
        span.contains(target).then_some(span.offset)
    }

    /// The unit starting at `base`, parsed on first use.
    fn foreign_unit(&mut self, base: usize) -> IndexResult<&Unit<Reader>>
    {
        let unit = match self.foreign.entry(base) {
            Entry::Occupied(cached) => cached.into_mut(),
            Entry::Vacant(slot) => {
                let header = self
                    .dwarf
                    .debug_info
                    .header_from_offset(DebugInfoOffset(base))
                    .map_err(|err| map_dwarf_error("reading referenced unit header", err))?;
                let unit = self
                    .dwarf
                    .unit(header)
                    .map_err(|err| map_dwarf_error("parsing referenced unit", err))?;
                slot.insert(unit)
            }
        };
        Ok(unit)
    }
}

fn indexed_tag(tag: gimli::DwTag) -> Option<EntryTag>
{
    match tag {
        constants::DW_TAG_subprogram
        | constants::DW_TAG_variable
        | constants::DW_TAG_constant
        | constants::DW_TAG_structure_type
        | constants::DW_TAG_class_type
        | constants::DW_TAG_union_type
        | constants::DW_TAG_enumeration_type
        | constants::DW_TAG_enumerator
        | constants::DW_TAG_typedef
        | constants::DW_TAG_base_type
        | constants::DW_TAG_namespace
        | constants::DW_TAG_module
        | constants::DW_TAG_interface_type => Some(EntryTag::from_dwarf(tag)),
        _ => None,
    }
}

fn read_attributes(dwarf: &Dwarf<Reader>, unit: &Unit<Reader>, die: &Die<'_, '_>) -> IndexResult<Attributes>
{
    let mut attributes = Attributes::default();
    let mut attrs = die.attrs();
    while let Some(attr) = attrs
        .next()
        .map_err(|err| map_dwarf_error("reading DIE attributes", err))?
    {
        match attr.name() {
            constants::DW_AT_name => attributes.name = Some(attr_to_string(dwarf, unit, attr.value())?),
            constants::DW_AT_linkage_name | constants::DW_AT_MIPS_linkage_name => {
                attributes.linkage_name = Some(attr_to_string(dwarf, unit, attr.value())?);
            }
            constants::DW_AT_external => attributes.external = Some(is_set(attr.value())),
            constants::DW_AT_declaration => attributes.declaration = is_set(attr.value()),
            constants::DW_AT_main_subprogram => attributes.main_subprogram = is_set(attr.value()),
            constants::DW_AT_enum_class => attributes.enum_class = is_set(attr.value()),
            constants::DW_AT_specification | constants::DW_AT_abstract_origin => {
                attributes.origin = match attr.value() {
                    AttributeValue::UnitRef(offset) => offset
                        .to_debug_info_offset(&unit.header)
                        .map(|offset| Origin::Section(offset.0)),
                    AttributeValue::DebugInfoRef(offset) => Some(Origin::Section(offset.0)),
                    AttributeValue::DebugInfoRefSup(offset) => Some(Origin::Supplementary(offset.0)),
                    _ => None,
                };
            }
            _ => {}
        }
    }
    Ok(attributes)
}

fn is_set(value: AttributeValue<Reader>) -> bool
{
    matches!(value, AttributeValue::Flag(true))
}

fn attr_to_string(dwarf: &Dwarf<Reader>, unit: &Unit<Reader>, value: AttributeValue<Reader>) -> IndexResult<String>
{
    let reader = dwarf
        .attr_string(unit, value)
        .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
    let owned = match reader.to_string() {
        Ok(cow) => cow.into_owned(),
        Err(_) => reader
            .to_string_lossy()
            .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
            .into_owned(),
    };
    Ok(owned)
}
