//! Concurrent interning of one factor table per domain set.

use std::sync::Arc;

use dashmap::DashMap;

use crate::domains::DomainIndexer;
use crate::table::FactorTable;

/// Shared owner of factor tables, keyed by their domain indexer.
///
/// `get_or_create` guarantees that concurrent callers asking for the
/// same domain set observe exactly one table: at most one builder
/// closure runs per key, and every caller gets a handle to the same
/// `Arc`. Published tables are shared immutably; mutate a private
/// `FactorTable::clone` instead.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: DashMap<Arc<DomainIndexer>, Arc<FactorTable>>,
}

impl TableCache {
    pub fn new() -> Self {
        TableCache {
            tables: DashMap::new(),
        }
    }

    /// Returns the table for `indexer`, building it with `init` if it
    /// is not cached yet.
    pub fn get_or_create(
        &self,
        indexer: &Arc<DomainIndexer>,
        init: impl FnOnce(Arc<DomainIndexer>) -> FactorTable,
    ) -> Arc<FactorTable> {
        if let Some(t) = self.tables.get(indexer) {
            return t.value().clone();
        }
        // entry() holds the shard lock, so a racing creator blocks
        // here instead of building a second table
        self.tables
            .entry(Arc::clone(indexer))
            .or_insert_with(|| Arc::new(init(Arc::clone(indexer))))
            .value()
            .clone()
    }

    pub fn get(&self, indexer: &Arc<DomainIndexer>) -> Option<Arc<FactorTable>> {
        self.tables.get(indexer).map(|t| t.value().clone())
    }

    /// Drops the cached table for `indexer`, if any.
    pub fn remove(&self, indexer: &Arc<DomainIndexer>) -> Option<Arc<FactorTable>> {
        self.tables.remove(indexer).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&self) {
        self.tables.clear();
    }
}
