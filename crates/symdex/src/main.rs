use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use symdex_core::index::{Catalog, CatalogState, IndexWorker, ScanningWorker};
use symdex_core::source::{DwarfSource, SymbolTableWorker};
use symdex_core::types::Address;
use symdex_core::{IndexConfig, IndexContext, IndexError, IndexResult};
use symdex_utils::{info, init_logging, init_logging_with_level, warn, LogFormat, LogLevel, LoggingGuard};

/// Exit status for a wait cut short by Ctrl-C.
const INTERRUPTED_EXIT: i32 = 130;

/// Index the debug information of a binary and query it.
#[derive(Parser, Debug)]
#[command(name = "symdex")]
#[command(version)]
#[command(about = "Index the debug information of a binary and query it", long_about = None)]
struct Cli
{
    /// Worker threads (0 indexes on the calling thread). Overrides SYMDEX_THREADS.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Index the symbol table instead of DWARF
    #[arg(long, global = true, default_value_t = false)]
    symtab: bool,

    /// Log level (error, warn, info, debug, trace). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Object file to index
    binary: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Find entries by name ("name", "Scope::name" or "pkg.name")
    Find
    {
        name: String,
        /// Treat the name as a prefix
        #[arg(long, default_value_t = false)]
        complete: bool,
    },
    /// Show the compilation unit covering an address (hex format: 0x1000 or decimal)
    Lookup
    {
        address: Address,
    },
    /// Show the program entry point
    Main,
    /// Show index statistics
    Stats,
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match init_cli_logging(cli.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    match run(cli) {
        Ok(()) => {}
        Err(IndexError::Interrupted) => {
            eprintln!("Interrupted");
            process::exit(INTERRUPTED_EXIT);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn init_cli_logging(level: Option<LogLevel>) -> Result<LoggingGuard, symdex_utils::LoggingError>
{
    match level {
        Some(level) => {
            let format = std::env::var("SYMDEX_LOG_FORMAT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(LogFormat::Pretty);
            init_logging_with_level(level, format)
        }
        None => init_logging(),
    }
}

fn run(cli: Cli) -> IndexResult<()>
{
    let mut config = IndexConfig::from_env()?;
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }
    let context = IndexContext::new(config);

    let quit = context.quit_flag().clone();
    if let Err(e) = ctrlc::set_handler(move || quit.raise()) {
        warn!("Ctrl-C handler not installed: {e}");
    }

    let catalog = Catalog::new(&context);
    catalog.start_reading(open_worker(&cli.binary, cli.symtab)?)?;

    match cli.command {
        Commands::Find { name, complete } => {
            wait(&catalog, CatalogState::Finalized)?;
            let found = catalog.find(&name, complete);
            if found.is_empty() {
                println!("No entries match {name:?}");
            }
            for entry in found {
                let unit = entry.unit();
                println!(
                    "{}\t{}\t{}\tunit 0x{:x}{}",
                    catalog.full_name(entry),
                    entry.tag(),
                    entry.language(),
                    unit.offset,
                    unit.name.as_deref().map(|name| format!(" ({name})")).unwrap_or_default()
                );
            }
        }
        Commands::Lookup { address } => {
            wait(&catalog, CatalogState::MainAvailable)?;
            match catalog.lookup(address) {
                Some(unit) => println!(
                    "{address}: unit 0x{:x} {} ({})",
                    unit.offset,
                    unit.name.as_deref().unwrap_or("<unnamed>"),
                    unit.language
                ),
                None => println!("{address}: not covered by any unit"),
            }
        }
        Commands::Main => {
            wait(&catalog, CatalogState::MainAvailable)?;
            match catalog.get_main() {
                Some(main) => println!(
                    "{} ({}, {})",
                    main.name(),
                    main.language(),
                    if main.is_main() { "declared" } else { "by name" }
                ),
                None => println!("No entry point found"),
            }
        }
        Commands::Stats => {
            wait(&catalog, CatalogState::CacheDone)?;
            let stats = catalog.stats();
            println!("Shards:             {}", stats.shards);
            println!("Units:              {}", stats.units);
            println!("Entries:            {}", stats.entries);
            println!("Unresolved parents: {}", stats.unresolved_parents);
            println!("Diagnostics:        {}", stats.diagnostics);
        }
    }
    Ok(())
}

/// DWARF scanner, or the symbol table when asked for or when there is no DWARF.
fn open_worker(binary: &Path, symtab: bool) -> IndexResult<Box<dyn IndexWorker>>
{
    if !symtab {
        let source = DwarfSource::open(binary)?;
        if source.has_debug_info() {
            return Ok(Box::new(ScanningWorker::new(source)));
        }
        info!("{} has no DWARF units, using its symbol table", binary.display());
    }
    Ok(Box::new(SymbolTableWorker::open(binary)?))
}

/// Interruptible wait. Background failures are reported but the partial
/// index is still queried.
fn wait(catalog: &Catalog, state: CatalogState) -> IndexResult<()>
{
    match catalog.wait(state, true) {
        Err(IndexError::Background(err)) => {
            warn!("Index is incomplete: {err}");
            Ok(())
        }
        other => other,
    }
}
