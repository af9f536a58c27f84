//! # Types
//!
//! Small value types shared by the index, the unit sources and the front end.

pub mod address;
pub mod language;
pub mod tag;

// Re-export all public types
pub use address::{Address, AddressRange};
pub use language::Language;
pub use tag::EntryTag;
