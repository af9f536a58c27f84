//! Semantic tags of indexed entries.

use std::fmt;

use gimli::constants;

/// What kind of program entity an entry names.
///
/// Tags the indexer has no special handling for are kept as `Other` with
/// their raw DWARF value; such entries are still indexed and named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryTag
{
    Function,
    Variable,
    Constant,
    Structure,
    Class,
    Union,
    Enumeration,
    Enumerator,
    Typedef,
    BaseType,
    Namespace,
    Module,
    Other(u16),
}

impl EntryTag
{
    pub fn from_dwarf(tag: gimli::DwTag) -> Self
    {
        match tag {
            constants::DW_TAG_subprogram => EntryTag::Function,
            constants::DW_TAG_variable => EntryTag::Variable,
            constants::DW_TAG_constant => EntryTag::Constant,
            constants::DW_TAG_structure_type => EntryTag::Structure,
            constants::DW_TAG_class_type => EntryTag::Class,
            constants::DW_TAG_union_type => EntryTag::Union,
            constants::DW_TAG_enumeration_type => EntryTag::Enumeration,
            constants::DW_TAG_enumerator => EntryTag::Enumerator,
            constants::DW_TAG_typedef => EntryTag::Typedef,
            constants::DW_TAG_base_type => EntryTag::BaseType,
            constants::DW_TAG_namespace => EntryTag::Namespace,
            constants::DW_TAG_module => EntryTag::Module,
            other => EntryTag::Other(other.0),
        }
    }

    /// Whether entries with this tag can enclose other named entries.
    pub fn is_scope(self) -> bool
    {
        matches!(
            self,
            EntryTag::Structure
                | EntryTag::Class
                | EntryTag::Union
                | EntryTag::Enumeration
                | EntryTag::Namespace
                | EntryTag::Module
        )
    }

    pub fn is_type(self) -> bool
    {
        matches!(
            self,
            EntryTag::Structure
                | EntryTag::Class
                | EntryTag::Union
                | EntryTag::Enumeration
                | EntryTag::Typedef
                | EntryTag::BaseType
        )
    }
}

impl fmt::Display for EntryTag
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            EntryTag::Function => write!(f, "function"),
            EntryTag::Variable => write!(f, "variable"),
            EntryTag::Constant => write!(f, "constant"),
            EntryTag::Structure => write!(f, "struct"),
            EntryTag::Class => write!(f, "class"),
            EntryTag::Union => write!(f, "union"),
            EntryTag::Enumeration => write!(f, "enum"),
            EntryTag::Enumerator => write!(f, "enumerator"),
            EntryTag::Typedef => write!(f, "typedef"),
            EntryTag::BaseType => write!(f, "base type"),
            EntryTag::Namespace => write!(f, "namespace"),
            EntryTag::Module => write!(f, "module"),
            EntryTag::Other(raw) => write!(f, "tag 0x{raw:x}"),
        }
    }
}
