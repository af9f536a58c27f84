//! Name comparison used for sorting and searching shards.
//!
//! Comparison is ASCII case-insensitive. The `<` that opens a template or
//! generic argument list sorts before every other character except the end
//! of the string, which lets `"name"` find `"name<int>"`.

use std::cmp::Ordering;

use smallvec::SmallVec;

/// How [`compare`] treats a search key that runs out first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode
{
    /// Plain total order used to sort a shard.
    Sort,
    /// Exact lookup: `"name"` also matches `"name<...>"`.
    Match,
    /// Completion: the key matches any name it is a prefix of.
    Complete,
}

const END: u8 = 0;
const TEMPLATE_OPEN: u8 = 1;

#[inline]
fn munge(c: Option<&u8>) -> u8
{
    match c {
        None => END,
        Some(b'<') => TEMPLATE_OPEN,
        Some(c) => c.to_ascii_lowercase(),
    }
}

/// Three-way compare of a catalog name `a` against `b`.
///
/// In `Match` and `Complete` mode `b` is the search key.
///
/// ```rust
/// use std::cmp::Ordering;
/// use symdex_core::index::{compare, MatchMode};
///
/// assert_eq!(compare("name<>", "name", MatchMode::Match), Ordering::Equal);
/// assert_eq!(compare("name", "name<>", MatchMode::Match), Ordering::Less);
/// assert_eq!(compare("abcd", "", MatchMode::Complete), Ordering::Equal);
/// ```
pub fn compare(a: &str, b: &str, mode: MatchMode) -> Ordering
{
    let a = a.as_bytes();
    let b = b.as_bytes();

    let mut i = 0;
    while i < a.len() && i < b.len() && munge(a.get(i)) == munge(b.get(i)) {
        i += 1;
    }

    let c1 = munge(a.get(i));
    let c2 = munge(b.get(i));
    if c1 == c2 {
        return Ordering::Equal;
    }

    if c2 == END && (mode == MatchMode::Complete || (mode == MatchMode::Match && c1 == TEMPLATE_OPEN)) {
        return Ordering::Equal;
    }

    c1.cmp(&c2)
}

/// Split a possibly qualified name into its scope components.
///
/// Splits at top-level `::` and `.` only; separators inside template
/// argument lists or parameter lists are left alone. A leading `::` is
/// dropped.
pub(crate) fn split_qualified(name: &str) -> SmallVec<[&str; 4]>
{
    let name = name.strip_prefix("::").unwrap_or(name);
    let bytes = name.as_bytes();
    let mut parts = SmallVec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'(' | b'[' => depth += 1,
            b'>' | b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                parts.push(&name[start..i]);
                i += 2;
                start = i;
                continue;
            }
            b'.' if depth == 0 => {
                parts.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&name[start..]);
    parts
}
