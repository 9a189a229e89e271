//! Cell entries and streaming iteration.

use std::sync::Arc;

use crate::domains::{DomainIndexer, Element};

use super::storage::{CellStorage, Storage};
use super::FactorTable;

/// A snapshot of one table cell.
#[derive(Debug, Clone)]
pub struct FactorTableEntry {
    indexer: Arc<DomainIndexer>,
    sparse_index: Option<usize>,
    joint_index: Option<usize>,
    indices: Box<[usize]>,
    energy: f64,
    weight: f64,
}

impl FactorTableEntry {
    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Position in the explicit cell list at the time of the visit,
    /// when the table kept one.
    pub fn sparse_index(&self) -> Option<usize> {
        self.sparse_index
    }

    /// Flat joint index, when joint indexing applies.
    pub fn joint_index(&self) -> Option<usize> {
        self.joint_index
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn elements(&self) -> Vec<Element> {
        self.indexer.elements_from_indices(&self.indices)
    }
}

/// Streaming cursor over the non-zero cells of a table in joint
/// order.
///
/// The cursor does not borrow the table: each [`SparseCursor::advance`]
/// call takes the table again, so cells may be mutated between steps.
/// When the table's version has changed since the last step, the
/// cursor re-derives its position from the last visited cell, so
/// inserted and removed cells before the cursor never cause skips or
/// repeats of later cells.
#[derive(Debug, Clone, Default)]
pub struct SparseCursor {
    version: u64,
    started: bool,
    done: bool,
    slot: usize,
    joint: Option<usize>,
    indices: Vec<usize>,
    sparse_index: Option<usize>,
    energy: f64,
    weight: f64,
}

impl SparseCursor {
    pub fn new() -> Self {
        SparseCursor::default()
    }

    /// Moves to the next non-zero cell; returns false when exhausted.
    pub fn advance(&mut self, table: &FactorTable) -> bool {
        if self.done {
            return false;
        }
        if table.repr.has_sparse() {
            self.advance_explicit(table)
        } else {
            self.advance_dense(table)
        }
    }

    fn advance_explicit(&mut self, table: &FactorTable) -> bool {
        let len = table.storage.stored_len(&table.repr);
        let mut next = if !self.started {
            0
        } else if self.version == table.version() {
            self.slot + 1
        } else {
            // the table changed shape under us: locate the slot the
            // last visited cell holds (or would hold) now
            match &table.storage {
                Storage::Indexed(s) => match self.joint {
                    Some(joint) => match s.slot_of_joint(joint) {
                        Ok(slot) => slot + 1,
                        Err(pos) => pos,
                    },
                    None => 0,
                },
                Storage::Hashed(s) => match s.slot_of_indices(&self.indices) {
                    Ok(slot) => slot + 1,
                    Err(pos) => pos,
                },
            }
        };
        while next < len {
            let weight = table.storage.slot_weight(&table.repr, next);
            if weight != 0.0 {
                self.slot = next;
                self.sparse_index = Some(next);
                self.weight = weight;
                self.energy = table.storage.slot_energy(&table.repr, next);
                self.indices.resize(table.indexer.num_dimensions(), 0);
                table
                    .storage
                    .slot_indices(&table.indexer, &table.repr, next, &mut self.indices);
                self.joint = table.storage.slot_joint(&table.indexer, &table.repr, next);
                self.version = table.version();
                self.started = true;
                return true;
            }
            next += 1;
        }
        self.done = true;
        false
    }

    fn advance_dense(&mut self, table: &FactorTable) -> bool {
        // dense-only tables have no explicit cell list; walk the joint
        // space directly, which is immune to storage reshapes
        let cardinality = table.indexer.cardinality();
        let mut next = match (self.started, self.joint) {
            (false, _) | (true, None) => 0,
            (true, Some(joint)) => joint + 1,
        };
        while next < cardinality {
            let weight = table.weight_for_joint_index(next);
            if weight != 0.0 {
                self.joint = Some(next);
                self.sparse_index = None;
                self.weight = weight;
                self.energy = table.energy_for_joint_index(next);
                self.indices = table.indexer.indices_vec_from_joint(next);
                self.version = table.version();
                self.started = true;
                return true;
            }
            next += 1;
        }
        self.done = true;
        false
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn joint_index(&self) -> Option<usize> {
        self.joint
    }

    pub fn sparse_index(&self) -> Option<usize> {
        self.sparse_index
    }

    pub fn entry(&self, table: &FactorTable) -> FactorTableEntry {
        FactorTableEntry {
            indexer: Arc::clone(&table.indexer),
            sparse_index: self.sparse_index,
            joint_index: self.joint,
            indices: self.indices.clone().into_boxed_slice(),
            energy: self.energy,
            weight: self.weight,
        }
    }
}

/// Streaming cursor over every cell of the joint space, including
/// zero-weight ones, in joint order. Like [`SparseCursor`] it holds no
/// borrow of the table.
#[derive(Debug, Clone, Default)]
pub struct FullCursor {
    started: bool,
    done: bool,
    indices: Vec<usize>,
    joint: Option<usize>,
    energy: f64,
    weight: f64,
}

impl FullCursor {
    pub fn new() -> Self {
        FullCursor::default()
    }

    pub fn advance(&mut self, table: &FactorTable) -> bool {
        if self.done {
            return false;
        }
        if !self.started {
            self.indices = vec![0; table.indexer.num_dimensions()];
            self.started = true;
        } else if !table.indexer.next_indices(&mut self.indices) {
            self.done = true;
            return false;
        }
        self.joint = if table.indexer.supports_joint_indexing() {
            Some(table.indexer.joint_from_indices(&self.indices))
        } else {
            None
        };
        self.weight = table.weight_for_indices(&self.indices);
        self.energy = table.energy_for_indices(&self.indices);
        true
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn joint_index(&self) -> Option<usize> {
        self.joint
    }

    pub fn entry(&self, table: &FactorTable) -> FactorTableEntry {
        FactorTableEntry {
            indexer: Arc::clone(&table.indexer),
            sparse_index: None,
            joint_index: self.joint,
            indices: self.indices.clone().into_boxed_slice(),
            energy: self.energy,
            weight: self.weight,
        }
    }
}

/// Borrowing iterator over the non-zero cells.
pub struct SparseEntries<'a> {
    table: &'a FactorTable,
    cursor: SparseCursor,
}

impl Iterator for SparseEntries<'_> {
    type Item = FactorTableEntry;

    fn next(&mut self) -> Option<FactorTableEntry> {
        if self.cursor.advance(self.table) {
            Some(self.cursor.entry(self.table))
        } else {
            None
        }
    }
}

/// Borrowing iterator over every cell of the joint space.
pub struct FullEntries<'a> {
    table: &'a FactorTable,
    cursor: FullCursor,
}

impl Iterator for FullEntries<'_> {
    type Item = FactorTableEntry;

    fn next(&mut self) -> Option<FactorTableEntry> {
        if self.cursor.advance(self.table) {
            Some(self.cursor.entry(self.table))
        } else {
            None
        }
    }
}

impl FactorTable {
    /// Iterates the non-zero cells in joint order.
    pub fn iter(&self) -> SparseEntries<'_> {
        SparseEntries {
            table: self,
            cursor: SparseCursor::new(),
        }
    }

    /// Iterates every cell of the joint space, including zeros.
    pub fn full_iter(&self) -> FullEntries<'_> {
        FullEntries {
            table: self,
            cursor: FullCursor::new(),
        }
    }
}

impl<'a> IntoIterator for &'a FactorTable {
    type Item = FactorTableEntry;
    type IntoIter = SparseEntries<'a>;

    fn into_iter(self) -> SparseEntries<'a> {
        self.iter()
    }
}
