//! Source language classification and per-language naming policy.

use std::fmt;

use gimli::constants;

/// Programming language associated with an entry.
///
/// Most of the indexer is language agnostic. The few places where languages
/// differ (scope separators, canonicalization, how `main` is spelled) are
/// answered by the policy methods on this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language
{
    /// Unknown or unsupported language.
    #[default]
    Unknown,
    C,
    Cpp,
    Rust,
    /// Ada. Names are GNAT-encoded and decoded into dotted components.
    Ada,
    Go,
    D,
    Fortran,
    /// Names taken from a linker symbol table, with no debug-info language.
    Minimal,
}

impl Language
{
    /// Classify a DWARF `DW_AT_language` code.
    pub fn from_dwarf(lang: gimli::DwLang) -> Self
    {
        match lang {
            constants::DW_LANG_C89 | constants::DW_LANG_C | constants::DW_LANG_C99 | constants::DW_LANG_C11 => Language::C,
            constants::DW_LANG_C_plus_plus
            | constants::DW_LANG_C_plus_plus_03
            | constants::DW_LANG_C_plus_plus_11
            | constants::DW_LANG_C_plus_plus_14 => Language::Cpp,
            constants::DW_LANG_Rust => Language::Rust,
            constants::DW_LANG_Ada83 | constants::DW_LANG_Ada95 => Language::Ada,
            constants::DW_LANG_Go => Language::Go,
            constants::DW_LANG_D => Language::D,
            constants::DW_LANG_Fortran77
            | constants::DW_LANG_Fortran90
            | constants::DW_LANG_Fortran95
            | constants::DW_LANG_Fortran03
            | constants::DW_LANG_Fortran08 => Language::Fortran,
            _ => Language::Unknown,
        }
    }

    /// Separator placed between scope components in a qualified name.
    pub fn scope_separator(self) -> &'static str
    {
        match self {
            Language::Ada | Language::Go | Language::D => ".",
            _ => "::",
        }
    }

    /// Whether raw names must be rewritten before they can be compared.
    ///
    /// Entries in these languages are also passed over by
    /// `Catalog::get_main` when they carry an explicit main marker, because
    /// their names are not trustworthy until finalize has run.
    pub fn requires_canonicalization(self) -> bool
    {
        matches!(self, Language::C | Language::Cpp | Language::Ada)
    }

    /// Whether raw names encode their scope with dotted (`__`) components.
    pub fn uses_dotted_encoding(self) -> bool
    {
        self == Language::Ada
    }

    /// Whether a top-level function literally named `main` is the program entry.
    pub fn may_use_plain_main_name(self) -> bool
    {
        !matches!(self, Language::Ada | Language::Fortran)
    }
}

impl fmt::Display for Language
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Language::Unknown => "unknown",
            Language::C => "c",
            Language::Cpp => "c++",
            Language::Rust => "rust",
            Language::Ada => "ada",
            Language::Go => "go",
            Language::D => "d",
            Language::Fortran => "fortran",
            Language::Minimal => "minimal",
        };
        write!(f, "{label}")
    }
}
