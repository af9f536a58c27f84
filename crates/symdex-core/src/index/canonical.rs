//! Name canonicalization.
//!
//! Three transformations feed the canonical names of a finalized shard:
//!
//! - **C and C++**: whitespace normalization, so that `foo(int, char *)` and
//!   `foo(int,char*)` sort and match as the same name.
//! - **Ada**: GNAT-encoded names (`pkg__sub__proc`) are decoded into dotted
//!   form; the shard then splits them into synthesized namespaces.
//! - **Mangled linkage names**: Rust symbols (v0 `_R...` and legacy `_ZN...E`)
//!   are demangled with `rustc_demangle`, dropping the hash suffix.
//!
//! Each function returns `None` when the input is already canonical, so the
//! caller can keep sharing the original string.

use rustc_demangle::try_demangle;

use crate::types::Language;

/// Demangle a Rust linkage name, without the legacy hash suffix.
///
/// Names that are not Rust-mangled come back as `None`; `_Z` names that
/// rustc-demangle rejects are Itanium C++ names and are kept verbatim.
pub(crate) fn demangle(raw: &str) -> Option<String>
{
    let demangled = try_demangle(raw).ok()?;
    Some(format!("{demangled:#}"))
}

/// Best-effort language of a symbol from its mangling.
pub(crate) fn mangling_language(raw: &str) -> Language
{
    if raw.starts_with("_R") || (raw.starts_with("_ZN") && try_demangle(raw).is_ok()) {
        Language::Rust
    } else if raw.starts_with("_Z") {
        Language::Cpp
    } else {
        Language::Minimal
    }
}

fn is_ident_byte(c: u8) -> bool
{
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

/// Normalize whitespace in a C or C++ name.
///
/// Whitespace is dropped except for a single space between two identifier
/// characters (`unsigned int`) and a single space after a top-level or
/// nested comma (`map<int, char>`).
pub(crate) fn canonicalize_c_family(name: &str) -> Option<String>
{
    let bytes = name.trim().as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut pending_space = false;

    for &c in bytes {
        if c.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            if let Some(&last) = out.last() {
                if is_ident_byte(last) && is_ident_byte(c) {
                    out.push(b' ');
                }
            }
            pending_space = false;
        }
        out.push(c);
        if c == b',' {
            out.push(b' ');
            pending_space = false;
        }
    }
    // A trailing comma would have left a dangling space.
    if out.last() == Some(&b' ') {
        out.pop();
    }

    // Only ASCII bytes were inserted or removed, so this cannot fail.
    let canonical = String::from_utf8(out).ok()?;
    (canonical != name).then_some(canonical)
}

/// Decode a GNAT-encoded Ada name into its dotted form.
///
/// `pkg__child__proc` becomes `pkg.child.proc`. Compiler suffixes
/// (`___XVE`, `__2`, `.3`, `$1`) and the `_ada_` library-level prefix are
/// stripped. Names spelled verbatim as `<name>` are returned unchanged, as
/// are names carrying no encoding at all.
pub(crate) fn decode_gnat(name: &str) -> Option<String>
{
    if name.starts_with('<') || !name.contains("__") {
        return None;
    }

    let mut decoded = name.strip_prefix("_ada_").unwrap_or(name);
    if let Some(pos) = decoded.find("___") {
        decoded = &decoded[..pos];
    }
    decoded = strip_numeric_suffix(decoded);

    let decoded = decoded.replace("__", ".");
    if decoded.is_empty() || decoded.starts_with('.') || decoded.ends_with('.') {
        return None;
    }
    (decoded != name).then_some(decoded)
}

/// Strip one trailing `__N`, `.N` or `$N` disambiguation suffix.
fn strip_numeric_suffix(name: &str) -> &str
{
    let digits = name.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return name;
    }
    let head = &name[..name.len() - digits];
    head.strip_suffix("__")
        .or_else(|| head.strip_suffix('.'))
        .or_else(|| head.strip_suffix('$'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
}
