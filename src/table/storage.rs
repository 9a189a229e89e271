//! Cell storage strategies.
//!
//! [`IndexedStorage`] addresses cells by flat joint index and can hold
//! dense arrays; [`HashedStorage`] addresses cells by index tuple and
//! is always sparse. The [`CellStorage`] contract exposes the stored
//! (explicit) cells uniformly for iteration and normalization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domains::DomainIndexer;
use crate::repr::Representation;
use crate::utils::{energy_to_weight, weight_to_energy};

/// Slot-wise view of the explicitly stored cells.
///
/// A slot is a position in the sorted explicit cell list: the sparse
/// slot for sparse representations, the input index for deterministic
/// tables, the key position for hashed storage. Dense-only storage
/// keeps no slots.
pub(crate) trait CellStorage {
    fn stored_len(&self, repr: &Representation) -> usize;
    fn slot_weight(&self, repr: &Representation, slot: usize) -> f64;
    fn slot_energy(&self, repr: &Representation, slot: usize) -> f64;
    /// Multiplies the slot's weight by `factor`, updating every live
    /// value array.
    fn scale_slot(&mut self, repr: &Representation, slot: usize, factor: f64);
    fn slot_indices(
        &self,
        indexer: &DomainIndexer,
        repr: &Representation,
        slot: usize,
        out: &mut [usize],
    );
    /// Joint index of the slot, when joint indexing applies.
    fn slot_joint(&self, indexer: &DomainIndexer, repr: &Representation, slot: usize)
        -> Option<usize>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Storage {
    Indexed(IndexedStorage),
    Hashed(HashedStorage),
}

impl CellStorage for Storage {
    fn stored_len(&self, repr: &Representation) -> usize {
        match self {
            Storage::Indexed(s) => s.stored_len(repr),
            Storage::Hashed(s) => s.stored_len(repr),
        }
    }

    fn slot_weight(&self, repr: &Representation, slot: usize) -> f64 {
        match self {
            Storage::Indexed(s) => s.slot_weight(repr, slot),
            Storage::Hashed(s) => s.slot_weight(repr, slot),
        }
    }

    fn slot_energy(&self, repr: &Representation, slot: usize) -> f64 {
        match self {
            Storage::Indexed(s) => s.slot_energy(repr, slot),
            Storage::Hashed(s) => s.slot_energy(repr, slot),
        }
    }

    fn scale_slot(&mut self, repr: &Representation, slot: usize, factor: f64) {
        match self {
            Storage::Indexed(s) => s.scale_slot(repr, slot, factor),
            Storage::Hashed(s) => s.scale_slot(repr, slot, factor),
        }
    }

    fn slot_indices(
        &self,
        indexer: &DomainIndexer,
        repr: &Representation,
        slot: usize,
        out: &mut [usize],
    ) {
        match self {
            Storage::Indexed(s) => s.slot_indices(indexer, repr, slot, out),
            Storage::Hashed(s) => s.slot_indices(indexer, repr, slot, out),
        }
    }

    fn slot_joint(
        &self,
        indexer: &DomainIndexer,
        repr: &Representation,
        slot: usize,
    ) -> Option<usize> {
        match self {
            Storage::Indexed(s) => s.slot_joint(indexer, repr, slot),
            Storage::Hashed(s) => s.slot_joint(indexer, repr, slot),
        }
    }
}

/// Joint-indexed storage: any mix of dense arrays over the whole joint
/// space and sparse arrays positioned by `sparse_to_joint`.
///
/// `sparse_to_joint` is sorted ascending. It is left empty in two
/// states: when no sparse view exists, and when the sparse view covers
/// every joint index (then slot == joint index). For the deterministic
/// representation it instead maps input index → joint index of the
/// unit-weight cell, which is still ascending under canonical order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct IndexedStorage {
    pub(crate) dense_energies: Vec<f64>,
    pub(crate) dense_weights: Vec<f64>,
    pub(crate) sparse_energies: Vec<f64>,
    pub(crate) sparse_weights: Vec<f64>,
    pub(crate) sparse_to_joint: Vec<usize>,
    /// Materialized index tuples, one per slot, only with
    /// `Representation::sparse_indices`.
    pub(crate) sparse_tuples: Vec<Box<[usize]>>,
}

impl IndexedStorage {
    pub(crate) fn sparse_value_len(&self) -> usize {
        self.sparse_weights.len().max(self.sparse_energies.len())
    }

    /// Slot holding `joint`, or the insertion point if absent.
    pub(crate) fn slot_of_joint(&self, joint: usize) -> std::result::Result<usize, usize> {
        if self.sparse_to_joint.is_empty() {
            let len = self.sparse_value_len();
            if joint < len {
                Ok(joint)
            } else {
                Err(len)
            }
        } else {
            self.sparse_to_joint.binary_search(&joint)
        }
    }

    pub(crate) fn joint_of_slot(&self, slot: usize) -> usize {
        if self.sparse_to_joint.is_empty() {
            slot
        } else {
            self.sparse_to_joint[slot]
        }
    }

    /// Inserts a new sparse cell at `slot`, shifting later slots.
    pub(crate) fn insert_slot(
        &mut self,
        repr: &Representation,
        indexer: &DomainIndexer,
        slot: usize,
        joint: usize,
        energy: f64,
        weight: f64,
    ) {
        self.sparse_to_joint.insert(slot, joint);
        if repr.sparse_energy {
            self.sparse_energies.insert(slot, energy);
        }
        if repr.sparse_weight {
            self.sparse_weights.insert(slot, weight);
        }
        if repr.sparse_indices {
            self.sparse_tuples
                .insert(slot, indexer.indices_vec_from_joint(joint).into_boxed_slice());
        }
    }

    pub(crate) fn clear_values(&mut self) {
        self.dense_energies = Vec::new();
        self.dense_weights = Vec::new();
        self.sparse_energies = Vec::new();
        self.sparse_weights = Vec::new();
        self.sparse_to_joint = Vec::new();
        self.sparse_tuples = Vec::new();
    }
}

impl CellStorage for IndexedStorage {
    fn stored_len(&self, repr: &Representation) -> usize {
        if repr.deterministic {
            self.sparse_to_joint.len()
        } else if repr.has_sparse_values() {
            self.sparse_value_len()
        } else {
            0
        }
    }

    fn slot_weight(&self, repr: &Representation, slot: usize) -> f64 {
        if repr.deterministic {
            1.0
        } else if repr.sparse_weight {
            self.sparse_weights[slot]
        } else {
            energy_to_weight(self.sparse_energies[slot])
        }
    }

    fn slot_energy(&self, repr: &Representation, slot: usize) -> f64 {
        if repr.deterministic {
            0.0
        } else if repr.sparse_energy {
            self.sparse_energies[slot]
        } else {
            weight_to_energy(self.sparse_weights[slot])
        }
    }

    fn scale_slot(&mut self, repr: &Representation, slot: usize, factor: f64) {
        debug_assert!(!repr.deterministic);
        let shift = -factor.ln();
        let joint = self.joint_of_slot(slot);
        if repr.sparse_weight {
            self.sparse_weights[slot] *= factor;
        }
        if repr.sparse_energy && self.sparse_energies[slot].is_finite() {
            self.sparse_energies[slot] += shift;
        }
        if repr.dense_weight {
            self.dense_weights[joint] *= factor;
        }
        if repr.dense_energy && self.dense_energies[joint].is_finite() {
            self.dense_energies[joint] += shift;
        }
    }

    fn slot_indices(
        &self,
        indexer: &DomainIndexer,
        repr: &Representation,
        slot: usize,
        out: &mut [usize],
    ) {
        if repr.sparse_indices && !self.sparse_tuples.is_empty() {
            out.copy_from_slice(&self.sparse_tuples[slot]);
        } else {
            indexer.indices_from_joint(self.joint_of_slot(slot), out);
        }
    }

    fn slot_joint(
        &self,
        _indexer: &DomainIndexer,
        _repr: &Representation,
        slot: usize,
    ) -> Option<usize> {
        Some(self.joint_of_slot(slot))
    }
}

/// Tuple-keyed storage for domain sets whose joint cardinality cannot
/// be flat-indexed. Keys are kept sorted (lexicographic tuple order is
/// joint order) with a hash lookup from key to slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct HashedStorage {
    pub(crate) keys: Vec<Box<[usize]>>,
    pub(crate) energies: Vec<f64>,
    pub(crate) weights: Vec<f64>,
    pub(crate) lookup: HashMap<Box<[usize]>, usize>,
}

impl HashedStorage {
    pub(crate) fn find(&self, indices: &[usize]) -> Option<usize> {
        self.lookup.get(indices).copied()
    }

    /// Slot holding `indices`, or the insertion point if absent.
    pub(crate) fn slot_of_indices(&self, indices: &[usize]) -> std::result::Result<usize, usize> {
        match self.find(indices) {
            Some(slot) => Ok(slot),
            None => Err(self
                .keys
                .binary_search_by(|k| k.as_ref().cmp(indices))
                .unwrap_err()),
        }
    }

    pub(crate) fn insert_slot(
        &mut self,
        repr: &Representation,
        slot: usize,
        indices: &[usize],
        energy: f64,
        weight: f64,
    ) {
        let key: Box<[usize]> = indices.into();
        self.keys.insert(slot, key.clone());
        if repr.sparse_energy {
            self.energies.insert(slot, energy);
        }
        if repr.sparse_weight {
            self.weights.insert(slot, weight);
        }
        self.lookup.insert(key, slot);
        for (i, k) in self.keys.iter().enumerate().skip(slot + 1) {
            self.lookup.insert(k.clone(), i);
        }
    }

    pub(crate) fn rebuild_lookup(&mut self) {
        self.lookup = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
    }
}

impl CellStorage for HashedStorage {
    fn stored_len(&self, _repr: &Representation) -> usize {
        self.keys.len()
    }

    fn slot_weight(&self, repr: &Representation, slot: usize) -> f64 {
        if repr.sparse_weight {
            self.weights[slot]
        } else {
            energy_to_weight(self.energies[slot])
        }
    }

    fn slot_energy(&self, repr: &Representation, slot: usize) -> f64 {
        if repr.sparse_energy {
            self.energies[slot]
        } else {
            weight_to_energy(self.weights[slot])
        }
    }

    fn scale_slot(&mut self, repr: &Representation, slot: usize, factor: f64) {
        let shift = -factor.ln();
        if repr.sparse_weight {
            self.weights[slot] *= factor;
        }
        if repr.sparse_energy && self.energies[slot].is_finite() {
            self.energies[slot] += shift;
        }
    }

    fn slot_indices(
        &self,
        _indexer: &DomainIndexer,
        _repr: &Representation,
        slot: usize,
        out: &mut [usize],
    ) {
        out.copy_from_slice(&self.keys[slot]);
    }

    fn slot_joint(
        &self,
        indexer: &DomainIndexer,
        _repr: &Representation,
        slot: usize,
    ) -> Option<usize> {
        if indexer.supports_joint_indexing() {
            Some(indexer.joint_from_indices(&self.keys[slot]))
        } else {
            None
        }
    }
}
