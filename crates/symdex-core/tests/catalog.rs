//! Catalog lifecycle, queries and error propagation over scripted units.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{context, index, Parent, ScriptedSource, ScriptedUnit};
use symdex_core::index::{Catalog, CatalogState, Entry, EntryFlags, ParentLink, ScanningWorker};
use symdex_core::source::{SymbolRecord, SymbolTableWorker};
use symdex_core::types::{Address, EntryTag, Language};
use symdex_core::{IndexCache, IndexError, SnapshotCache};

/// Unit A defines `Widget::method` before unit B declares `Widget`; unit C
/// has an unrelated free function `widget`.
fn widget_units() -> Vec<ScriptedUnit>
{
    vec![
        ScriptedUnit::new(0x100, Language::Cpp).named("a.cc").entry_with(
            0x110,
            EntryTag::Function,
            EntryFlags::empty(),
            "method",
            Parent::Deferred(0x220),
        ),
        ScriptedUnit::new(0x200, Language::Cpp)
            .named("b.cc")
            .entry(0x210, EntryTag::Class, "Widget")
            .scope(0x211, 0x280, 0x210),
        ScriptedUnit::new(0x300, Language::Cpp)
            .named("c.cc")
            .entry(0x310, EntryTag::Function, "widget"),
    ]
}

fn summarize(catalog: &Catalog, entries: &[&Entry]) -> Vec<(String, String, u64)>
{
    let mut summary: Vec<_> = entries
        .iter()
        .map(|entry| (catalog.full_name(entry), entry.tag().to_string(), entry.unit().offset))
        .collect();
    summary.sort();
    summary
}

#[test]
fn test_widget_method_resolves_across_units()
{
    for threads in [0, 3] {
        let (catalog, waited) = index(threads, widget_units());
        waited.unwrap();
        assert_eq!(catalog.state(), CatalogState::CacheDone);

        let found = catalog.find("Widget::method", false);
        assert_eq!(found.len(), 1, "threads = {threads}");
        let method = found[0];
        let widget = catalog.entry(method.parent().entry().expect("resolved parent")).unwrap();
        assert_eq!(widget.name(), "Widget");
        assert_eq!(widget.tag(), EntryTag::Class);
        assert_eq!(widget.unit().offset, 0x200);
        assert_eq!(catalog.full_name(method), "Widget::method");

        // Case-insensitive: the class matches too, the function is separate.
        let widgets = catalog.find("widget", false);
        let functions: Vec<_> = widgets.iter().filter(|e| e.tag() == EntryTag::Function).collect();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].unit().offset, 0x300);
        assert_eq!(functions[0].parent(), ParentLink::Root);
        assert_ne!(functions[0].id(), widget.id());
    }
}

#[test]
fn test_full_name_and_linkage_leaf()
{
    let unit = ScriptedUnit::new(0x10, Language::Rust)
        .entry(0x11, EntryTag::Module, "A")
        .entry_with(0x12, EntryTag::Module, EntryFlags::empty(), "B", Parent::Local(0x11))
        .entry_with(0x13, EntryTag::Function, EntryFlags::empty(), "C", Parent::Local(0x12))
        .entry_with(0x14, EntryTag::Function, EntryFlags::IS_LINKAGE, "A::B::linked", Parent::Local(0x12));
    let (catalog, waited) = index(0, vec![unit]);
    waited.unwrap();

    let c = catalog.find("C", false);
    assert_eq!(c.len(), 1);
    assert_eq!(catalog.full_name(c[0]), "A::B::C");
    assert_eq!(catalog.find("B::C", false).len(), 1);
    assert!(catalog.find("X::C", false).is_empty());

    let linked = catalog.find("A::B::linked", false);
    assert_eq!(linked.len(), 1);
    assert_eq!(catalog.full_name(linked[0]), "A::B::linked");
}

#[test]
fn test_find_matches_templates_and_prefixes()
{
    let unit = ScriptedUnit::new(0, Language::Rust)
        .entry(1, EntryTag::Structure, "Vec<u8>")
        .entry(2, EntryTag::Structure, "Vec<u32>")
        .entry(3, EntryTag::Function, "vector_len")
        .entry(4, EntryTag::Function, "other");
    let (catalog, waited) = index(0, vec![unit]);
    waited.unwrap();

    assert_eq!(catalog.find("vec", false).len(), 2);
    assert_eq!(catalog.find("vec", true).len(), 3);
    assert_eq!(catalog.find("Vec<u8>", false).len(), 1);
    assert!(catalog.find("missing", true).is_empty());
}

#[test]
fn test_finalized_shards_are_sorted_and_named()
{
    let units = (0..6u64)
        .map(|i| {
            ScriptedUnit::new(i * 0x100, Language::Cpp)
                .entry(i * 0x100 + 1, EntryTag::Function, &format!("zeta_{i}"))
                .entry(i * 0x100 + 2, EntryTag::Function, "f(int,  int)")
                .entry(i * 0x100 + 3, EntryTag::Typedef, "Alpha")
        })
        .collect();
    let (catalog, waited) = index(2, units);
    waited.unwrap();

    for shard in catalog.shards() {
        assert!(shard.is_finalized());
        let names: Vec<&str> = shard.entries().map(|entry| entry.canonical_name().expect("canonical")).collect();
        for pair in names.windows(2) {
            assert_ne!(
                symdex_core::index::compare(pair[0], pair[1], symdex_core::index::MatchMode::Sort),
                std::cmp::Ordering::Greater
            );
        }
    }
    assert_eq!(catalog.find("f(int, int)", false).len(), 6);
}

fn determinism_units() -> Vec<ScriptedUnit>
{
    let mut units: Vec<ScriptedUnit> = (0..12u64)
        .map(|i| {
            let base = 0x1000 * (i + 1);
            ScriptedUnit::new(base, Language::Cpp)
                .entry(base + 1, EntryTag::Namespace, &format!("ns{}", i % 3))
                .scope(base + 2, base + 0x100, base + 1)
                .entry_with(
                    base + 0x200,
                    EntryTag::Function,
                    EntryFlags::empty(),
                    "run",
                    Parent::Deferred(0x1000 * ((i + 1) % 12 + 1) + 0x10),
                )
                .entry(base + 0x300, EntryTag::Variable, &format!("global_{i}"))
                .range(base * 0x10, base * 0x10 + 0x800)
        })
        .collect();
    units.push(ScriptedUnit::new(0x20000, Language::C).entry(0x20001, EntryTag::Function, "main"));
    units
}

#[test]
fn test_results_do_not_depend_on_thread_count()
{
    let (serial, waited) = index(0, determinism_units());
    waited.unwrap();
    let (parallel, waited) = index(4, determinism_units());
    waited.unwrap();
    assert!(parallel.shards().len() > 1);

    for (name, completing) in [("run", false), ("ns1::run", false), ("global", true), ("NS", true), ("main", false)] {
        assert_eq!(
            summarize(&serial, &serial.find(name, completing)),
            summarize(&parallel, &parallel.find(name, completing)),
            "query {name:?}"
        );
    }
    assert_eq!(serial.find("run", false).len(), 12);
    assert_eq!(serial.find("ns1::run", false).len(), 4);

    let main_serial = serial.get_main().unwrap();
    let main_parallel = parallel.get_main().unwrap();
    assert_eq!(main_serial.name(), "main");
    assert_eq!(main_serial.unit().offset, main_parallel.unit().offset);

    let address = Address::new(0x3000 * 0x10 + 0x10);
    assert_eq!(
        serial.lookup(address).map(|unit| unit.offset),
        parallel.lookup(address).map(|unit| unit.offset)
    );
    assert_eq!(serial.stats().entries, parallel.stats().entries);
}

#[test]
fn test_unmatched_deferred_parent_stays_unresolved()
{
    let unit = ScriptedUnit::new(0, Language::Rust).entry_with(
        0x10,
        EntryTag::Function,
        EntryFlags::empty(),
        "orphan",
        Parent::Deferred(0xdead),
    );
    let (catalog, waited) = index(0, vec![unit]);
    waited.unwrap();

    let orphan = catalog.find("orphan", false)[0];
    assert!(matches!(orphan.parent(), ParentLink::Unresolved(key) if key.offset == 0xdead));
    assert_eq!(catalog.full_name(orphan), "orphan");
    assert_eq!(catalog.stats().unresolved_parents, 1);
}

#[test]
fn test_ada_names_are_decoded()
{
    let unit = ScriptedUnit::new(0, Language::Ada)
        .entry(1, EntryTag::Function, "pkg__child__proc")
        .entry(2, EntryTag::Function, "pkg__child__proc__2");
    let (catalog, waited) = index(0, vec![unit]);
    waited.unwrap();

    let procs = catalog.find("pkg.child.proc", false);
    assert_eq!(procs.len(), 2);
    assert!(procs.iter().all(|entry| catalog.full_name(entry) == "pkg.child.proc"));

    let packages = catalog.find("pkg", false);
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].tag(), EntryTag::Namespace);
    assert!(packages[0].flags().contains(EntryFlags::IS_SYNTHESIZED));
}

#[test]
fn test_main_selection_prefers_explicit_declaration()
{
    // One unit per shard.
    let units = vec![
        ScriptedUnit::new(0x100, Language::C).entry(0x101, EntryTag::Function, "main"),
        ScriptedUnit::new(0x200, Language::Rust).entry_with(
            0x201,
            EntryTag::Function,
            EntryFlags::IS_MAIN,
            "app_entry",
            Parent::Root,
        ),
    ];
    let (catalog, waited) = index(1, units);
    waited.unwrap();
    assert_eq!(catalog.shards().len(), 2);

    let main = catalog.get_main().unwrap();
    assert_eq!(main.name(), "app_entry");
    assert!(main.is_main());
}

fn mixed_main_units() -> Vec<ScriptedUnit>
{
    vec![
        ScriptedUnit::new(0x100, Language::Cpp).entry_with(
            0x101,
            EntryTag::Function,
            EntryFlags::IS_MAIN,
            "cpp_entry",
            Parent::Root,
        ),
        ScriptedUnit::new(0x200, Language::Go).entry(0x201, EntryTag::Function, "main"),
    ]
}

#[test]
fn test_main_selection_skips_explicit_c_family()
{
    // 0 threads puts both units in one shard, 1 thread gives each its own.
    for threads in [0, 1] {
        let (catalog, waited) = index(threads, mixed_main_units());
        waited.unwrap();

        let main = catalog.get_main();
        let main = main.as_ref().map(|main| (main.name(), main.language()));
        assert_eq!(main, Some(("main", Language::Go)), "threads = {threads}");
    }
}

#[test]
fn test_lookup_first_claim_wins()
{
    let units = vec![
        ScriptedUnit::new(0x100, Language::C).range(0x1000, 0x2000),
        ScriptedUnit::new(0x200, Language::C).range(0x1800, 0x3000),
    ];
    let (catalog, waited) = index(1, units);
    waited.unwrap();

    assert_eq!(catalog.lookup(Address::new(0x1900)).unwrap().offset, 0x100);
    assert_eq!(catalog.lookup(Address::new(0x2500)).unwrap().offset, 0x200);
    assert!(catalog.lookup(Address::new(0x3000)).is_none());
    assert!(catalog.lookup(Address::new(0x10)).is_none());
}

#[test]
fn test_failed_unit_does_not_discard_other_shards()
{
    let units = vec![
        ScriptedUnit::new(0x100, Language::Rust).entry(0x101, EntryTag::Function, "alpha"),
        ScriptedUnit::new(0x200, Language::Rust)
            .entry(0x201, EntryTag::Function, "beta")
            .failing("truncated unit"),
        ScriptedUnit::new(0x300, Language::Rust).entry(0x301, EntryTag::Function, "gamma"),
    ];
    let (catalog, waited) = index(2, units);

    match waited {
        Err(IndexError::Background(inner)) => {
            assert!(matches!(&*inner, IndexError::InvalidArgument(message) if message == "truncated unit"));
        }
        other => panic!("expected a background failure, got {other:?}"),
    }
    assert_eq!(catalog.state(), CatalogState::CacheDone);
    for name in ["alpha", "beta", "gamma"] {
        assert_eq!(catalog.find(name, false).len(), 1, "{name}");
    }
    // Every later wait from Finalized on reports the same failure.
    assert!(matches!(
        catalog.wait(CatalogState::Finalized, false),
        Err(IndexError::Background(_))
    ));
}

#[test]
fn test_failure_surfaces_with_finalized_shards()
{
    let units = vec![
        ScriptedUnit::new(0x100, Language::Rust).entry(0x101, EntryTag::Function, "main"),
        ScriptedUnit::new(0x200, Language::Rust).failing("truncated unit"),
    ];
    for threads in [0, 2] {
        let (catalog, waited) = index(threads, units.clone());
        assert!(waited.is_err(), "threads = {threads}");

        // The answer does not depend on when the wait returned.
        catalog.wait(CatalogState::MainAvailable, false).unwrap();
        assert_eq!(catalog.get_main().unwrap().name(), "main");
        assert!(matches!(
            catalog.wait(CatalogState::Finalized, false),
            Err(IndexError::Background(_))
        ));
    }
}

#[test]
fn test_panicking_unit_is_captured()
{
    let units = vec![
        ScriptedUnit::new(0x100, Language::C).panicking(),
        ScriptedUnit::new(0x200, Language::C).entry(0x201, EntryTag::Function, "survivor"),
    ];
    let (catalog, waited) = index(0, units);

    match waited {
        Err(IndexError::Background(inner)) => assert!(matches!(&*inner, IndexError::TaskPanicked(_))),
        other => panic!("expected a captured panic, got {other:?}"),
    }
    assert_eq!(catalog.find("survivor", false).len(), 1);
}

#[test]
fn test_diagnostics_are_collected()
{
    let units = vec![ScriptedUnit::new(0x40, Language::C)
        .entry(0x41, EntryTag::Variable, "x")
        .complaint("unknown form 0x99")];
    let (catalog, waited) = index(0, units);
    waited.unwrap();

    let diagnostics = catalog.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].unit_offset, 0x40);
    assert!(diagnostics[0].message.contains("unknown form"));
    assert_eq!(catalog.stats().diagnostics, 1);
}

#[test]
fn test_interruptible_wait_returns_on_quit()
{
    let context = context(1);
    let catalog = Catalog::new(&context);
    // Never started: the state stays Initial.
    let quit = catalog.quit_flag().clone();
    let raiser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        quit.raise();
    });

    assert!(matches!(
        catalog.wait(CatalogState::Finalized, true),
        Err(IndexError::Interrupted)
    ));
    raiser.join().unwrap();
    assert!(!catalog.quit_flag().is_raised());
    assert_eq!(catalog.state(), CatalogState::Initial);
}

#[test]
fn test_start_reading_twice_is_rejected()
{
    let context = context(0);
    let catalog = Catalog::new(&context);
    catalog
        .start_reading(Box::new(ScanningWorker::new(ScriptedSource::default())))
        .unwrap();
    assert_eq!(catalog.state(), CatalogState::CacheDone);

    let again = catalog.start_reading(Box::new(ScanningWorker::new(ScriptedSource::default())));
    assert!(matches!(again, Err(IndexError::AlreadyStarted)));
}

#[test]
fn test_scanning_worker_output_is_cached()
{
    let cache = Arc::new(SnapshotCache::new());
    let shared: Arc<dyn IndexCache> = cache.clone();
    let catalog = Catalog::with_cache(&context(2), shared);
    catalog
        .start_reading(Box::new(ScanningWorker::new(ScriptedSource::new(widget_units()))))
        .unwrap();
    catalog.wait(CatalogState::CacheDone, false).unwrap();

    assert_eq!(cache.store_count(), 1);
    let snapshot = cache.snapshot().unwrap();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().any(|entry| entry.full_name == "Widget::method"));

    // Stores from several threads are all counted.
    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| catalog.write_to_cache(cache.as_ref(), &mut Vec::new()).unwrap());
        }
    });
    assert_eq!(cache.store_count(), 5);
}

#[test]
fn test_symbol_table_output_is_not_cached()
{
    let cache = Arc::new(SnapshotCache::new());
    let shared: Arc<dyn IndexCache> = cache.clone();
    let catalog = Catalog::with_cache(&context(1), shared);
    let worker = SymbolTableWorker::from_symbols(vec![
        SymbolRecord::function("main", 0x1000, 0x10),
        SymbolRecord::function("helper", 0x1010, 0x10),
    ]);
    catalog.start_reading(Box::new(worker)).unwrap();
    catalog.wait(CatalogState::CacheDone, false).unwrap();

    assert_eq!(cache.store_count(), 0);
    let mut diagnostics = Vec::new();
    assert!(matches!(
        catalog.write_to_cache(cache.as_ref(), &mut diagnostics),
        Err(IndexError::CacheIneligible)
    ));

    assert_eq!(catalog.find("helper", false).len(), 1);
    assert_eq!(catalog.lookup(Address::new(0x1015)).unwrap().language, Language::Minimal);
    assert_eq!(catalog.get_main().unwrap().name(), "main");
}
