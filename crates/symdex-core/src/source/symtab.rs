//! Symbol-table ingestion.
//!
//! Linker symbol tables are a prebuilt, flat name table: no scopes, no
//! deferred parents, one pseudo-unit. The whole table is ingested by a
//! single pool task into a single shard. Because the result is derived from
//! a foreign table rather than scanned debug info, it is never cached.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use object::{Object, ObjectSymbol, SymbolKind};
use tracing::{debug, info};

use super::Recorder;
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::index::{canonical, EntryFlags, IndexWorker, ParentLink, Shard, TaskOutcome};
use crate::pool::ThreadPool;
use crate::types::{AddressRange, EntryTag, Language};

/// One defined symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord
{
    /// Name as stored in the table (possibly mangled).
    pub name: String,
    pub address: u64,
    pub size: u64,
    /// Code (`true`) or data.
    pub is_function: bool,
    pub is_global: bool,
}

impl SymbolRecord
{
    pub fn function(name: impl Into<String>, address: u64, size: u64) -> Self
    {
        Self {
            name: name.into(),
            address,
            size,
            is_function: true,
            is_global: true,
        }
    }

    pub fn data(name: impl Into<String>, address: u64, size: u64) -> Self
    {
        Self {
            name: name.into(),
            address,
            size,
            is_function: false,
            is_global: true,
        }
    }
}

/// Worker that indexes a symbol table instead of DWARF.
#[derive(Debug)]
pub struct SymbolTableWorker
{
    label: Option<String>,
    symbols: Arc<[SymbolRecord]>,
}

impl SymbolTableWorker
{
    pub fn from_symbols(symbols: Vec<SymbolRecord>) -> Self
    {
        Self {
            label: None,
            symbols: symbols.into(),
        }
    }

    /// Read the symbol table of the object file at `path`.
    ///
    /// ## Errors
    ///
    /// I/O errors and `IndexError::Object` for unparseable files.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let mut worker = Self::parse(&bytes)?;
        worker.label = Some(path.display().to_string());
        Ok(worker)
    }

    /// Read the symbol table of an object file already in memory.
    ///
    /// Falls back to the dynamic symbol table for stripped files.
    pub fn parse(data: &[u8]) -> IndexResult<Self>
    {
        let file = object::File::parse(data).map_err(|err| IndexError::Object(err.to_string()))?;
        let mut symbols = collect_symbols(file.symbols());
        if symbols.is_empty() {
            symbols = collect_symbols(file.dynamic_symbols());
        }
        debug!("Read {} defined symbols", symbols.len());
        Ok(Self::from_symbols(symbols))
    }

    pub fn symbols(&self) -> &[SymbolRecord]
    {
        &self.symbols
    }
}

fn collect_symbols<'data, S>(symbols: impl Iterator<Item = S>) -> Vec<SymbolRecord>
where
    S: ObjectSymbol<'data>,
{
    symbols
        .filter(|symbol| symbol.is_definition())
        .filter_map(|symbol| {
            let is_function = match symbol.kind() {
                SymbolKind::Text => true,
                SymbolKind::Data => false,
                _ => return None,
            };
            let name = symbol.name().ok().filter(|name| !name.is_empty())?;
            Some(SymbolRecord {
                name: name.to_string(),
                address: symbol.address(),
                size: symbol.size(),
                is_function,
                is_global: symbol.is_global(),
            })
        })
        .collect()
}

fn ingest(label: Option<&str>, symbols: &[SymbolRecord]) -> IndexResult<TaskOutcome>
{
    let mut recorder = Recorder::new(0);
    recorder.start_unit(0, 0, Language::Minimal, label);

    for symbol in symbols {
        let language = canonical::mangling_language(&symbol.name);
        let demangled = canonical::demangle(&symbol.name);
        let name = demangled.as_deref().unwrap_or(&symbol.name);

        let mut flags = EntryFlags::IS_LINKAGE;
        if !symbol.is_global {
            flags |= EntryFlags::IS_STATIC;
        }
        let tag = if symbol.is_function {
            EntryTag::Function
        } else {
            EntryTag::Variable
        };
        recorder.record(symbol.address, tag, flags, language, name, ParentLink::Root)?;

        if symbol.is_function && symbol.size > 0 {
            recorder.add_address_range(AddressRange::new(
                symbol.address,
                symbol.address.saturating_add(symbol.size),
            ))?;
        }
    }
    Ok(recorder.finish())
}

impl IndexWorker for SymbolTableWorker
{
    fn name(&self) -> &'static str
    {
        "symbol-table"
    }

    fn do_reading(&mut self, pool: &Arc<ThreadPool>, _config: &IndexConfig) -> Vec<IndexResult<TaskOutcome>>
    {
        let label = self.label.clone();
        let symbols = Arc::clone(&self.symbols);
        let task = pool.post_task(move || ingest(label.as_deref(), &symbols));
        vec![task.join().and_then(|outcome| outcome)]
    }

    fn print_stats(&self, shards: &[Shard])
    {
        let entries: usize = shards.iter().map(Shard::len).sum();
        info!("Ingested {} symbols as {entries} entries", self.symbols.len());
    }

    fn cache_eligible(&self) -> bool
    {
        false
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_ingest_demangles_and_flags_linkage()
    {
        let symbols = vec![
            SymbolRecord::function("main", 0x1000, 0x20),
            SymbolRecord::function("_ZN4core3fmt5write17h0123456789abcdefE", 0x1100, 0x40),
            SymbolRecord::data("counter", 0x4000, 8),
        ];
        let outcome = ingest(Some("a.out"), &symbols).unwrap();
        let shard = outcome.shard();

        assert_eq!(shard.len(), 3);
        assert!(shard.entries().all(|entry| entry.flags().contains(EntryFlags::IS_LINKAGE)));

        let write = shard.entries().find(|entry| entry.raw_name() == "core::fmt::write").unwrap();
        assert_eq!(write.language(), Language::Rust);
        let counter = shard.entries().find(|entry| entry.raw_name() == "counter").unwrap();
        assert_eq!(counter.tag(), EntryTag::Variable);

        // Data symbols carry no code ranges.
        assert_eq!(shard.addresses().len(), 2);
        assert_eq!(shard.named_main().unwrap().raw_name(), "main");
        assert!(shard.explicit_main().is_none());
    }

    #[test]
    fn test_local_symbols_are_static()
    {
        let mut local = SymbolRecord::function("helper", 0x2000, 4);
        local.is_global = false;
        let outcome = ingest(None, &[local]).unwrap();
        let entry = outcome.shard().entries().next().unwrap();
        assert!(entry.flags().contains(EntryFlags::IS_STATIC));
        assert_eq!(entry.unit().language, Language::Minimal);
    }

    #[test]
    fn test_worker_is_not_cache_eligible()
    {
        let worker = SymbolTableWorker::from_symbols(Vec::new());
        assert!(!worker.cache_eligible());
        assert_eq!(worker.name(), "symbol-table");
    }
}
