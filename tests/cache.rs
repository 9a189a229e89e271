use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use factab::{DiscreteDomain, DomainIndexer, FactorTable, TableCache};

fn indexer(sizes: &[usize]) -> Arc<DomainIndexer> {
    let domains = sizes.iter().map(|&n| DiscreteDomain::range(n)).collect();
    Arc::new(DomainIndexer::new(domains).unwrap())
}

#[test]
fn one_table_per_domain_set() {
    let cache = TableCache::new();
    let ix = indexer(&[2, 3]);

    let a = cache.get_or_create(&ix, FactorTable::new);
    let b = cache.get_or_create(&ix, FactorTable::new);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);

    let other = indexer(&[3, 2]);
    let c = cache.get_or_create(&other, FactorTable::new);
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 2);
}

#[test]
fn equal_indexers_share_an_entry() {
    let cache = TableCache::new();
    // separate allocations with equal domains hash to the same key
    let a = cache.get_or_create(&indexer(&[2, 2]), FactorTable::new);
    let b = cache.get_or_create(&indexer(&[2, 2]), FactorTable::new);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);
}

#[test]
fn get_and_remove() {
    let cache = TableCache::new();
    let ix = indexer(&[2]);
    assert!(cache.get(&ix).is_none());

    let a = cache.get_or_create(&ix, FactorTable::new);
    let got = cache.get(&ix).unwrap();
    assert!(Arc::ptr_eq(&a, &got));

    let removed = cache.remove(&ix).unwrap();
    assert!(Arc::ptr_eq(&a, &removed));
    assert!(cache.get(&ix).is_none());
    assert!(cache.is_empty());
}

#[test]
fn clear_drops_everything() {
    let cache = TableCache::new();
    cache.get_or_create(&indexer(&[2]), FactorTable::new);
    cache.get_or_create(&indexer(&[3]), FactorTable::new);
    assert_eq!(cache.len(), 2);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn concurrent_creation_runs_the_builder_once() {
    let cache = Arc::new(TableCache::new());
    let ix = indexer(&[4, 4]);
    let builds = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let ix = Arc::clone(&ix);
            let builds = Arc::clone(&builds);
            std::thread::spawn(move || {
                cache.get_or_create(&ix, |ix| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    FactorTable::new(ix)
                })
            })
        })
        .collect();

    let tables: Vec<Arc<FactorTable>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    for t in &tables[1..] {
        assert!(Arc::ptr_eq(&tables[0], t));
    }
}
