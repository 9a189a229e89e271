//! Factor tables: values over a joint discrete domain.

mod convert;
mod entry;
mod normalize;
mod reindex;
mod storage;

pub use entry::{FactorTableEntry, FullCursor, FullEntries, SparseCursor, SparseEntries};

use std::sync::Arc;

use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domains::{DomainIndexer, Element};
use crate::repr::Representation;
use crate::utils::{canon_energy, energy_to_weight, weight_to_energy};
use crate::{FactabError, Result};

use storage::{CellStorage, HashedStorage, IndexedStorage, Storage};

/// Memoized predicate results, valid only for the stamped version.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct PredicateMemo {
    version: u64,
    normalized: Option<bool>,
    conditional: Option<bool>,
    deterministic: Option<bool>,
}

/// A table of non-negative weights (equivalently energies,
/// `weight = exp(-energy)`) over the joint assignments of a
/// [`DomainIndexer`].
///
/// Cells can be read and written through four addressing paths: flat
/// joint index, index tuple, element-label tuple, and sparse index
/// (position in the sorted list of explicitly stored cells). The
/// stored [`Representation`] can be changed at any time without
/// altering the encoded function.
///
/// Tables over domain sets whose joint cardinality does not fit a
/// `usize` are stored hashed by index tuple; those reject the dense
/// and deterministic representations and the joint-index path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorTable {
    indexer: Arc<DomainIndexer>,
    repr: Representation,
    storage: Storage,
    non_zero_weights: usize,
    /// Bumped on every value mutation; read by cursors to re-sync and
    /// by the predicate memo.
    version: u64,
    memo: PredicateMemo,
}

impl FactorTable {
    /// Empty table (all weights zero) in the sparse-energy
    /// representation. Storage is hashed automatically when the joint
    /// cardinality overflows `usize`.
    pub fn new(indexer: Arc<DomainIndexer>) -> Self {
        let storage = if indexer.supports_joint_indexing() {
            Storage::Indexed(IndexedStorage::default())
        } else {
            Storage::Hashed(HashedStorage::default())
        };
        FactorTable {
            indexer,
            repr: Representation::SPARSE_ENERGY,
            storage,
            non_zero_weights: 0,
            version: 0,
            memo: PredicateMemo::default(),
        }
    }

    /// Empty table forced onto hashed storage, for joint spaces that
    /// technically fit a `usize` but are too large to ever hold dense.
    pub fn new_hashed(indexer: Arc<DomainIndexer>) -> Self {
        FactorTable {
            indexer,
            repr: Representation::SPARSE_ENERGY,
            storage: Storage::Hashed(HashedStorage::default()),
            non_zero_weights: 0,
            version: 0,
            memo: PredicateMemo::default(),
        }
    }

    /// Dense-weight table populated from `weights` in joint-index
    /// order.
    pub fn new_dense_weights(indexer: Arc<DomainIndexer>, weights: &[f64]) -> Result<Self> {
        let mut t = Self::new(indexer);
        t.set_weights_dense(weights)?;
        Ok(t)
    }

    /// Dense-energy table populated from `energies` in joint-index
    /// order.
    pub fn new_dense_energies(indexer: Arc<DomainIndexer>, energies: &[f64]) -> Result<Self> {
        let mut t = Self::new(indexer);
        t.set_energies_dense(energies)?;
        Ok(t)
    }

    /// Sparse-weight table over the given cells.
    pub fn new_sparse_weights(
        indexer: Arc<DomainIndexer>,
        joint_indices: &[usize],
        weights: &[f64],
    ) -> Result<Self> {
        let mut t = Self::new(indexer);
        t.set_weights_sparse(joint_indices, weights)?;
        Ok(t)
    }

    /// Sparse-energy table over the given cells.
    pub fn new_sparse_energies(
        indexer: Arc<DomainIndexer>,
        joint_indices: &[usize],
        energies: &[f64],
    ) -> Result<Self> {
        let mut t = Self::new(indexer);
        t.set_energies_sparse(joint_indices, energies)?;
        Ok(t)
    }

    pub fn indexer(&self) -> &Arc<DomainIndexer> {
        &self.indexer
    }

    pub fn representation(&self) -> Representation {
        self.repr
    }

    pub fn is_directed(&self) -> bool {
        self.indexer.is_directed()
    }

    /// Whether the joint-index access path and dense representations
    /// are available.
    pub fn supports_joint_indexing(&self) -> bool {
        matches!(self.storage, Storage::Indexed(_))
    }

    /// Size of the full joint space. Panics on hashed tables whose
    /// cardinality overflows.
    pub fn joint_size(&self) -> usize {
        self.indexer.cardinality()
    }

    /// Number of explicitly stored cells. For dense-only tables this
    /// is the number of non-zero weights (what an on-demand sparse
    /// view would hold).
    pub fn sparse_size(&self) -> usize {
        match &self.storage {
            Storage::Indexed(s) => {
                if self.repr.deterministic {
                    s.sparse_to_joint.len()
                } else if self.repr.has_sparse_values() {
                    s.sparse_value_len()
                } else {
                    self.non_zero_weights
                }
            }
            Storage::Hashed(s) => s.keys.len(),
        }
    }

    pub fn non_zero_weights(&self) -> usize {
        self.non_zero_weights
    }

    /// Fraction of the joint space carrying non-zero weight. Panics on
    /// hashed tables whose cardinality overflows.
    pub fn density(&self) -> f64 {
        self.non_zero_weights as f64 / self.indexer.cardinality() as f64
    }

    /// Whether every joint assignment carries non-zero weight.
    pub fn has_maximum_density(&self) -> bool {
        self.indexer.supports_joint_indexing()
            && self.non_zero_weights == self.indexer.cardinality()
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn memo_get(&self, read: impl Fn(&PredicateMemo) -> Option<bool>) -> Option<bool> {
        if self.memo.version == self.version {
            read(&self.memo)
        } else {
            None
        }
    }

    fn memo_set(&mut self, write: impl FnOnce(&mut PredicateMemo)) {
        if self.memo.version != self.version {
            self.memo = PredicateMemo {
                version: self.version,
                normalized: None,
                conditional: None,
                deterministic: None,
            };
        }
        write(&mut self.memo);
    }

    fn assert_valid_indices(&self, indices: &[usize]) {
        if let Err(e) = self.indexer.validate_indices(indices) {
            panic!("{e}");
        }
    }

    fn update_non_zero(&mut self, was_zero: bool, is_zero: bool) {
        match (was_zero, is_zero) {
            (true, false) => self.non_zero_weights += 1,
            (false, true) => self.non_zero_weights -= 1,
            _ => {}
        }
    }

    // ----- reads ---------------------------------------------------

    pub fn weight_for_joint_index(&self, joint: usize) -> f64 {
        match &self.storage {
            Storage::Indexed(s) => {
                assert!(joint < self.indexer.cardinality(), "joint index out of range");
                indexed_weight(s, &self.repr, joint)
            }
            Storage::Hashed(s) => {
                let indices = self.indexer.indices_vec_from_joint(joint);
                match s.find(&indices) {
                    Some(slot) => s.slot_weight(&self.repr, slot),
                    None => 0.0,
                }
            }
        }
    }

    pub fn energy_for_joint_index(&self, joint: usize) -> f64 {
        match &self.storage {
            Storage::Indexed(s) => {
                assert!(joint < self.indexer.cardinality(), "joint index out of range");
                indexed_energy(s, &self.repr, joint)
            }
            Storage::Hashed(s) => {
                let indices = self.indexer.indices_vec_from_joint(joint);
                match s.find(&indices) {
                    Some(slot) => s.slot_energy(&self.repr, slot),
                    None => f64::INFINITY,
                }
            }
        }
    }

    pub fn weight_for_indices(&self, indices: &[usize]) -> f64 {
        match &self.storage {
            Storage::Indexed(_) => self.weight_for_joint_index(self.indexer.joint_from_indices(indices)),
            Storage::Hashed(s) => {
                self.assert_valid_indices(indices);
                match s.find(indices) {
                    Some(slot) => s.slot_weight(&self.repr, slot),
                    None => 0.0,
                }
            }
        }
    }

    pub fn energy_for_indices(&self, indices: &[usize]) -> f64 {
        match &self.storage {
            Storage::Indexed(_) => self.energy_for_joint_index(self.indexer.joint_from_indices(indices)),
            Storage::Hashed(s) => {
                self.assert_valid_indices(indices);
                match s.find(indices) {
                    Some(slot) => s.slot_energy(&self.repr, slot),
                    None => f64::INFINITY,
                }
            }
        }
    }

    pub fn weight_for_elements(&self, elements: &[Element]) -> Result<f64> {
        let mut indices = vec![0; self.indexer.num_dimensions()];
        self.indexer.indices_from_elements(elements, &mut indices)?;
        Ok(self.weight_for_indices(&indices))
    }

    pub fn energy_for_elements(&self, elements: &[Element]) -> Result<f64> {
        let mut indices = vec![0; self.indexer.num_dimensions()];
        self.indexer.indices_from_elements(elements, &mut indices)?;
        Ok(self.energy_for_indices(&indices))
    }

    // ----- sparse-index path ---------------------------------------

    /// Adds the requested sparse array(s) to the representation if the
    /// table currently has no explicit cell list to index into.
    fn ensure_sparse(&mut self, want_energy: bool, want_weight: bool) {
        if self.repr.deterministic {
            return;
        }
        let mut r = self.repr;
        if want_energy {
            r.sparse_energy = true;
        }
        if want_weight {
            r.sparse_weight = true;
        }
        if !r.has_sparse_values() {
            r.sparse_weight = true;
        }
        if r != self.repr {
            self.set_representation(r)
                .expect("adding a sparse view is always valid");
        }
    }

    pub fn weight_for_sparse_index(&mut self, sparse_index: usize) -> f64 {
        self.ensure_sparse(false, true);
        assert!(sparse_index < self.sparse_size(), "sparse index out of range");
        self.storage.slot_weight(&self.repr, sparse_index)
    }

    pub fn energy_for_sparse_index(&mut self, sparse_index: usize) -> f64 {
        self.ensure_sparse(true, false);
        assert!(sparse_index < self.sparse_size(), "sparse index out of range");
        self.storage.slot_energy(&self.repr, sparse_index)
    }

    pub fn indices_for_sparse_index(&mut self, sparse_index: usize) -> Vec<usize> {
        self.ensure_sparse(false, false);
        assert!(sparse_index < self.sparse_size(), "sparse index out of range");
        let mut out = vec![0; self.indexer.num_dimensions()];
        self.storage
            .slot_indices(&self.indexer, &self.repr, sparse_index, &mut out);
        out
    }

    pub fn elements_for_sparse_index(&mut self, sparse_index: usize) -> Vec<Element> {
        let indices = self.indices_for_sparse_index(sparse_index);
        self.indexer.elements_from_indices(&indices)
    }

    /// Joint index of the cell at `sparse_index`. Panics when joint
    /// indexing is unsupported.
    pub fn joint_index_from_sparse_index(&mut self, sparse_index: usize) -> usize {
        self.ensure_sparse(false, false);
        assert!(sparse_index < self.sparse_size(), "sparse index out of range");
        match self.storage.slot_joint(&self.indexer, &self.repr, sparse_index) {
            Some(joint) => joint,
            None => panic!("joint indexing unsupported"),
        }
    }

    pub fn sparse_index_from_joint_index(&mut self, joint: usize) -> Option<usize> {
        self.ensure_sparse(false, false);
        match &self.storage {
            Storage::Indexed(s) => s.slot_of_joint(joint).ok(),
            Storage::Hashed(s) => {
                let indices = self.indexer.indices_vec_from_joint(joint);
                s.find(&indices)
            }
        }
    }

    pub fn sparse_index_from_indices(&mut self, indices: &[usize]) -> Option<usize> {
        self.assert_valid_indices(indices);
        self.ensure_sparse(false, false);
        match &self.storage {
            Storage::Indexed(s) => s.slot_of_joint(self.indexer.joint_from_indices(indices)).ok(),
            Storage::Hashed(s) => s.find(indices),
        }
    }

    // ----- writes --------------------------------------------------

    /// Abandons the deterministic encoding for an equivalent explicit
    /// sparse form, preserving slot positions.
    fn leave_deterministic(&mut self) {
        let target = if self.repr.sparse_indices {
            Representation::ALL_SPARSE_WITH_INDICES
        } else {
            Representation::ALL_SPARSE
        };
        self.expand_deterministic(target);
    }

    pub fn set_weight_for_joint_index(&mut self, joint: usize, weight: f64) {
        if matches!(self.storage, Storage::Hashed(_)) {
            let indices = self.indexer.indices_vec_from_joint(joint);
            self.set_weight_for_indices(&indices, weight);
            return;
        }
        assert!(joint < self.indexer.cardinality(), "joint index out of range");
        let prev = self.weight_for_joint_index(joint);
        if prev == weight {
            return;
        }
        if self.repr.deterministic {
            self.leave_deterministic();
        }
        let energy = if self.repr.has_energy() {
            weight_to_energy(weight)
        } else {
            0.0
        };
        self.write_indexed_cell(joint, energy, weight);
        self.update_non_zero(prev == 0.0, weight == 0.0);
        self.touch();
    }

    pub fn set_energy_for_joint_index(&mut self, joint: usize, energy: f64) {
        if matches!(self.storage, Storage::Hashed(_)) {
            let indices = self.indexer.indices_vec_from_joint(joint);
            self.set_energy_for_indices(&indices, energy);
            return;
        }
        assert!(joint < self.indexer.cardinality(), "joint index out of range");
        let energy = canon_energy(energy);
        let prev = self.energy_for_joint_index(joint);
        if prev == energy {
            return;
        }
        if self.repr.deterministic {
            self.leave_deterministic();
        }
        let weight = energy_to_weight(energy);
        let was_zero = energy_to_weight(prev) == 0.0;
        self.write_indexed_cell(joint, energy, weight);
        self.update_non_zero(was_zero, weight == 0.0);
        self.touch();
    }

    pub fn set_weight_for_indices(&mut self, indices: &[usize], weight: f64) {
        if matches!(self.storage, Storage::Indexed(_)) {
            let joint = self.indexer.joint_from_indices(indices);
            self.set_weight_for_joint_index(joint, weight);
            return;
        }
        self.assert_valid_indices(indices);
        let prev = self.hashed_weight(indices);
        if prev == weight {
            return;
        }
        let energy = if self.repr.has_energy() {
            weight_to_energy(weight)
        } else {
            0.0
        };
        self.write_hashed_cell(indices, energy, weight);
        self.update_non_zero(prev == 0.0, weight == 0.0);
        self.touch();
    }

    pub fn set_energy_for_indices(&mut self, indices: &[usize], energy: f64) {
        if matches!(self.storage, Storage::Indexed(_)) {
            let joint = self.indexer.joint_from_indices(indices);
            self.set_energy_for_joint_index(joint, energy);
            return;
        }
        self.assert_valid_indices(indices);
        let energy = canon_energy(energy);
        let prev = self.hashed_energy(indices);
        if prev == energy {
            return;
        }
        let weight = energy_to_weight(energy);
        let was_zero = energy_to_weight(prev) == 0.0;
        self.write_hashed_cell(indices, energy, weight);
        self.update_non_zero(was_zero, weight == 0.0);
        self.touch();
    }

    pub fn set_weight_for_elements(&mut self, elements: &[Element], weight: f64) -> Result<()> {
        let mut indices = vec![0; self.indexer.num_dimensions()];
        self.indexer.indices_from_elements(elements, &mut indices)?;
        self.set_weight_for_indices(&indices, weight);
        Ok(())
    }

    pub fn set_energy_for_elements(&mut self, elements: &[Element], energy: f64) -> Result<()> {
        let mut indices = vec![0; self.indexer.num_dimensions()];
        self.indexer.indices_from_elements(elements, &mut indices)?;
        self.set_energy_for_indices(&indices, energy);
        Ok(())
    }

    pub fn set_weight_for_sparse_index(&mut self, sparse_index: usize, weight: f64) {
        if self.repr.deterministic {
            assert!(sparse_index < self.sparse_size(), "sparse index out of range");
            // mapped cells hold unit weight
            if weight == 1.0 {
                return;
            }
            self.leave_deterministic();
        }
        self.ensure_sparse(false, true);
        assert!(sparse_index < self.sparse_size(), "sparse index out of range");
        let prev = self.storage.slot_weight(&self.repr, sparse_index);
        if prev == weight {
            return;
        }
        let energy = if self.repr.has_energy() {
            weight_to_energy(weight)
        } else {
            0.0
        };
        self.write_slot(sparse_index, energy, weight);
        self.update_non_zero(prev == 0.0, weight == 0.0);
        self.touch();
    }

    pub fn set_energy_for_sparse_index(&mut self, sparse_index: usize, energy: f64) {
        let energy = canon_energy(energy);
        if self.repr.deterministic {
            assert!(sparse_index < self.sparse_size(), "sparse index out of range");
            // mapped cells hold zero energy
            if energy == 0.0 {
                return;
            }
            self.leave_deterministic();
        }
        self.ensure_sparse(true, false);
        assert!(sparse_index < self.sparse_size(), "sparse index out of range");
        let prev = self.storage.slot_energy(&self.repr, sparse_index);
        if prev == energy {
            return;
        }
        let weight = energy_to_weight(energy);
        let was_zero = energy_to_weight(prev) == 0.0;
        self.write_slot(sparse_index, energy, weight);
        self.update_non_zero(was_zero, weight == 0.0);
        self.touch();
    }

    fn write_indexed_cell(&mut self, joint: usize, energy: f64, weight: f64) {
        let repr = self.repr;
        let indexer = Arc::clone(&self.indexer);
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        if repr.has_sparse_values() {
            match s.slot_of_joint(joint) {
                Ok(slot) => {
                    if repr.sparse_energy {
                        s.sparse_energies[slot] = energy;
                    }
                    if repr.sparse_weight {
                        s.sparse_weights[slot] = weight;
                    }
                }
                Err(slot) => s.insert_slot(&repr, &indexer, slot, joint, energy, weight),
            }
        }
        if repr.dense_energy {
            s.dense_energies[joint] = energy;
        }
        if repr.dense_weight {
            s.dense_weights[joint] = weight;
        }
    }

    fn hashed_weight(&self, indices: &[usize]) -> f64 {
        let Storage::Hashed(s) = &self.storage else {
            unreachable!()
        };
        match s.find(indices) {
            Some(slot) => s.slot_weight(&self.repr, slot),
            None => 0.0,
        }
    }

    fn hashed_energy(&self, indices: &[usize]) -> f64 {
        let Storage::Hashed(s) = &self.storage else {
            unreachable!()
        };
        match s.find(indices) {
            Some(slot) => s.slot_energy(&self.repr, slot),
            None => f64::INFINITY,
        }
    }

    fn write_hashed_cell(&mut self, indices: &[usize], energy: f64, weight: f64) {
        let repr = self.repr;
        let Storage::Hashed(s) = &mut self.storage else {
            unreachable!()
        };
        match s.slot_of_indices(indices) {
            Ok(slot) => {
                if repr.sparse_energy {
                    s.energies[slot] = energy;
                }
                if repr.sparse_weight {
                    s.weights[slot] = weight;
                }
            }
            Err(slot) => s.insert_slot(&repr, slot, indices, energy, weight),
        }
    }

    /// Writes an existing slot through every live value array.
    fn write_slot(&mut self, slot: usize, energy: f64, weight: f64) {
        let repr = self.repr;
        match &mut self.storage {
            Storage::Indexed(s) => {
                let joint = s.joint_of_slot(slot);
                if repr.sparse_energy {
                    s.sparse_energies[slot] = energy;
                }
                if repr.sparse_weight {
                    s.sparse_weights[slot] = weight;
                }
                if repr.dense_energy {
                    s.dense_energies[joint] = energy;
                }
                if repr.dense_weight {
                    s.dense_weights[joint] = weight;
                }
            }
            Storage::Hashed(s) => {
                if repr.sparse_energy {
                    s.energies[slot] = energy;
                }
                if repr.sparse_weight {
                    s.weights[slot] = weight;
                }
            }
        }
    }

    // ----- bulk writes ---------------------------------------------

    /// Replaces all values with a dense weight array in joint-index
    /// order; the representation becomes dense-weight.
    pub fn set_weights_dense(&mut self, weights: &[f64]) -> Result<()> {
        self.set_dense_values(weights, false)
    }

    /// Replaces all values with a dense energy array in joint-index
    /// order; the representation becomes dense-energy.
    pub fn set_energies_dense(&mut self, energies: &[f64]) -> Result<()> {
        self.set_dense_values(energies, true)
    }

    fn set_dense_values(&mut self, values: &[f64], as_energy: bool) -> Result<()> {
        if matches!(self.storage, Storage::Hashed(_)) {
            return Err(FactabError::JointIndexingUnsupported);
        }
        let expected = self.indexer.cardinality();
        if values.len() != expected {
            return Err(FactabError::DenseLength {
                got: values.len(),
                expected,
            });
        }
        let non_zero;
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        s.clear_values();
        if as_energy {
            non_zero = values.iter().filter(|e| energy_to_weight(**e) != 0.0).count();
            s.dense_energies = values.iter().map(|&e| canon_energy(e)).collect();
            self.repr = Representation::DENSE_ENERGY;
        } else {
            non_zero = values.iter().filter(|w| **w != 0.0).count();
            s.dense_weights = values.to_vec();
            self.repr = Representation::DENSE_WEIGHT;
        }
        self.non_zero_weights = non_zero;
        self.touch();
        Ok(())
    }

    /// Replaces all values with the given sparse cells, keyed by joint
    /// index in any order; the representation becomes sparse-weight.
    /// Duplicate and out-of-range joint indices are rejected.
    pub fn set_weights_sparse(&mut self, joint_indices: &[usize], weights: &[f64]) -> Result<()> {
        self.set_sparse_values_joint(joint_indices, weights, false)
    }

    /// Sparse-energy counterpart of [`Self::set_weights_sparse`].
    pub fn set_energies_sparse(&mut self, joint_indices: &[usize], energies: &[f64]) -> Result<()> {
        self.set_sparse_values_joint(joint_indices, energies, true)
    }

    fn set_sparse_values_joint(
        &mut self,
        joints: &[usize],
        values: &[f64],
        as_energy: bool,
    ) -> Result<()> {
        if joints.len() != values.len() {
            return Err(FactabError::LengthMismatch(joints.len(), values.len()));
        }
        if matches!(self.storage, Storage::Hashed(_)) {
            if !self.indexer.supports_joint_indexing() {
                return Err(FactabError::JointIndexingUnsupported);
            }
            let cardinality = self.indexer.cardinality();
            for &j in joints {
                if j >= cardinality {
                    return Err(FactabError::JointIndexOutOfRange {
                        index: j,
                        cardinality,
                    });
                }
            }
            let tuples: Vec<Vec<usize>> = joints
                .iter()
                .map(|&j| self.indexer.indices_vec_from_joint(j))
                .collect();
            return self.set_sparse_values_tuples(&tuples, values, as_energy);
        }
        let cardinality = self.indexer.cardinality();
        let mut pairs: Vec<(usize, f64)> =
            joints.iter().copied().zip(values.iter().copied()).collect();
        pairs.sort_unstable_by_key(|p| p.0);
        for (i, &(j, _)) in pairs.iter().enumerate() {
            if j >= cardinality {
                return Err(FactabError::JointIndexOutOfRange {
                    index: j,
                    cardinality,
                });
            }
            if i > 0 && pairs[i - 1].0 == j {
                return Err(FactabError::DuplicateJointIndex(j));
            }
        }
        let non_zero = if as_energy {
            pairs.iter().filter(|p| energy_to_weight(p.1) != 0.0).count()
        } else {
            pairs.iter().filter(|p| p.1 != 0.0).count()
        };
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        s.clear_values();
        s.sparse_to_joint = pairs.iter().map(|p| p.0).collect();
        let vals: Vec<f64> = if as_energy {
            pairs.iter().map(|p| canon_energy(p.1)).collect()
        } else {
            pairs.iter().map(|p| p.1).collect()
        };
        if as_energy {
            s.sparse_energies = vals;
            self.repr = Representation::SPARSE_ENERGY;
        } else {
            s.sparse_weights = vals;
            self.repr = Representation::SPARSE_WEIGHT;
        }
        self.non_zero_weights = non_zero;
        self.touch();
        Ok(())
    }

    /// Replaces all values with the given sparse cells keyed by index
    /// tuple, in any order. Works on both storage kinds.
    pub fn set_weights_sparse_from_indices(
        &mut self,
        indices: &[Vec<usize>],
        weights: &[f64],
    ) -> Result<()> {
        self.set_sparse_values_tuples(indices, weights, false)
    }

    /// Sparse-energy counterpart of
    /// [`Self::set_weights_sparse_from_indices`].
    pub fn set_energies_sparse_from_indices(
        &mut self,
        indices: &[Vec<usize>],
        energies: &[f64],
    ) -> Result<()> {
        self.set_sparse_values_tuples(indices, energies, true)
    }

    fn set_sparse_values_tuples(
        &mut self,
        tuples: &[Vec<usize>],
        values: &[f64],
        as_energy: bool,
    ) -> Result<()> {
        if tuples.len() != values.len() {
            return Err(FactabError::LengthMismatch(tuples.len(), values.len()));
        }
        for t in tuples {
            self.indexer.validate_indices(t)?;
        }
        if matches!(self.storage, Storage::Indexed(_)) {
            let joints: Vec<usize> = tuples
                .iter()
                .map(|t| self.indexer.joint_from_indices(t))
                .collect();
            return self.set_sparse_values_joint(&joints, values, as_energy);
        }
        let mut pairs: Vec<(Box<[usize]>, f64)> = tuples
            .iter()
            .map(|t| t.clone().into_boxed_slice())
            .zip(values.iter().copied())
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for i in 1..pairs.len() {
            if pairs[i - 1].0 == pairs[i].0 {
                return Err(FactabError::DuplicateIndices);
            }
        }
        let non_zero = if as_energy {
            pairs.iter().filter(|p| energy_to_weight(p.1) != 0.0).count()
        } else {
            pairs.iter().filter(|p| p.1 != 0.0).count()
        };
        let Storage::Hashed(s) = &mut self.storage else {
            unreachable!()
        };
        s.keys = pairs.iter().map(|p| p.0.clone()).collect();
        let vals: Vec<f64> = if as_energy {
            pairs.iter().map(|p| canon_energy(p.1)).collect()
        } else {
            pairs.iter().map(|p| p.1).collect()
        };
        if as_energy {
            s.energies = vals;
            s.weights = Vec::new();
            self.repr = Representation::SPARSE_ENERGY;
        } else {
            s.weights = vals;
            s.energies = Vec::new();
            self.repr = Representation::SPARSE_WEIGHT;
        }
        s.rebuild_lookup();
        self.non_zero_weights = non_zero;
        self.touch();
        Ok(())
    }

    /// Overwrites the weights of the explicitly stored cells in slot
    /// order. The array length must equal the sparse size.
    pub fn replace_weights_sparse(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.sparse_size() {
            return Err(FactabError::LengthMismatch(weights.len(), self.sparse_size()));
        }
        for (slot, &w) in weights.iter().enumerate() {
            self.set_weight_for_sparse_index(slot, w);
        }
        Ok(())
    }

    /// Energy counterpart of [`Self::replace_weights_sparse`].
    pub fn replace_energies_sparse(&mut self, energies: &[f64]) -> Result<()> {
        if energies.len() != self.sparse_size() {
            return Err(FactabError::LengthMismatch(energies.len(), self.sparse_size()));
        }
        for (slot, &e) in energies.iter().enumerate() {
            self.set_energy_for_sparse_index(slot, e);
        }
        Ok(())
    }

    /// Installs a deterministic input→output map: `outputs[i]` is the
    /// joint output index receiving unit weight for input `i`. The
    /// table must be directed in canonical order on indexed storage.
    pub fn set_deterministic_output_indices(&mut self, outputs: &[usize]) -> Result<()> {
        if !self.indexer.is_directed() {
            return Err(FactabError::NotDirected);
        }
        if !self.indexer.has_canonical_order() {
            return Err(FactabError::NonCanonicalOrder);
        }
        if matches!(self.storage, Storage::Hashed(_)) {
            return Err(FactabError::RepresentationUnsupported);
        }
        let input_card = self.indexer.input_cardinality();
        let output_card = self.indexer.output_cardinality();
        if outputs.len() != input_card {
            return Err(FactabError::LengthMismatch(outputs.len(), input_card));
        }
        for &o in outputs {
            if o >= output_card {
                return Err(FactabError::OutputIndexOutOfRange {
                    index: o,
                    cardinality: output_card,
                });
            }
        }
        let map: Vec<usize> = outputs
            .iter()
            .enumerate()
            .map(|(i, &o)| i * output_card + o)
            .collect();
        let keep_tuples = self.repr.sparse_indices;
        let tuples: Vec<Box<[usize]>> = if keep_tuples {
            map.iter()
                .map(|&j| self.indexer.indices_vec_from_joint(j).into_boxed_slice())
                .collect()
        } else {
            Vec::new()
        };
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        s.clear_values();
        s.sparse_to_joint = map;
        s.sparse_tuples = tuples;
        self.repr = if keep_tuples {
            Representation::DETERMINISTIC_WITH_INDICES
        } else {
            Representation::DETERMINISTIC
        };
        self.non_zero_weights = input_card;
        self.touch();
        self.memo = PredicateMemo {
            version: self.version,
            normalized: Some(true),
            conditional: Some(true),
            deterministic: Some(true),
        };
        Ok(())
    }

    // ----- maintenance ---------------------------------------------

    /// Drops zero-weight cells from the sparse view; returns how many
    /// were removed. Dense-only and deterministic tables are
    /// unaffected.
    pub fn compact(&mut self) -> usize {
        let repr = self.repr;
        let removed = match &mut self.storage {
            Storage::Indexed(s) => {
                if repr.deterministic || !repr.has_sparse_values() {
                    return 0;
                }
                let len = s.sparse_value_len();
                let keep: Vec<usize> = (0..len)
                    .filter(|&slot| {
                        let w = if repr.sparse_weight {
                            s.sparse_weights[slot]
                        } else {
                            energy_to_weight(s.sparse_energies[slot])
                        };
                        w != 0.0
                    })
                    .collect();
                let removed = len - keep.len();
                if removed > 0 {
                    let new_map: Vec<usize> = keep.iter().map(|&i| s.joint_of_slot(i)).collect();
                    if repr.sparse_energy {
                        s.sparse_energies = gather(&s.sparse_energies, &keep);
                    }
                    if repr.sparse_weight {
                        s.sparse_weights = gather(&s.sparse_weights, &keep);
                    }
                    if repr.sparse_indices {
                        s.sparse_tuples = keep.iter().map(|&i| s.sparse_tuples[i].clone()).collect();
                    }
                    s.sparse_to_joint = new_map;
                }
                removed
            }
            Storage::Hashed(s) => {
                let len = s.keys.len();
                let keep: Vec<usize> = (0..len)
                    .filter(|&slot| {
                        let w = if repr.sparse_weight {
                            s.weights[slot]
                        } else {
                            energy_to_weight(s.energies[slot])
                        };
                        w != 0.0
                    })
                    .collect();
                let removed = len - keep.len();
                if removed > 0 {
                    s.keys = keep.iter().map(|&i| s.keys[i].clone()).collect();
                    if repr.sparse_energy {
                        s.energies = gather(&s.energies, &keep);
                    }
                    if repr.sparse_weight {
                        s.weights = gather(&s.weights, &keep);
                    }
                    s.rebuild_lookup();
                }
                removed
            }
        };
        if removed > 0 {
            self.touch();
        }
        removed
    }

    // ----- slices and helpers --------------------------------------

    /// Weights along `dimension` with the other indices fixed as in
    /// `indices` (the entry at `dimension` is ignored).
    pub fn weight_slice(&self, dimension: usize, indices: &[usize]) -> Array1<f64> {
        assert!(dimension < self.indexer.num_dimensions(), "dimension out of range");
        let mut idx = indices.to_vec();
        idx[dimension] = 0;
        self.assert_valid_indices(&idx);
        let n = self.indexer.dimension_size(dimension);
        let mut out = Array1::zeros(n);
        for k in 0..n {
            idx[dimension] = k;
            out[k] = self.weight_for_indices(&idx);
        }
        out
    }

    /// Energy counterpart of [`Self::weight_slice`].
    pub fn energy_slice(&self, dimension: usize, indices: &[usize]) -> Array1<f64> {
        assert!(dimension < self.indexer.num_dimensions(), "dimension out of range");
        let mut idx = indices.to_vec();
        idx[dimension] = 0;
        self.assert_valid_indices(&idx);
        let n = self.indexer.dimension_size(dimension);
        let mut out = Array1::zeros(n);
        for k in 0..n {
            idx[dimension] = k;
            out[k] = self.energy_for_indices(&idx);
        }
        out
    }

    /// Assigns every cell of a dense table, or every explicit cell of
    /// a sparse one, a fresh weight drawn uniformly from `(0, 1]`.
    pub fn randomize_weights<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.repr.deterministic {
            self.leave_deterministic();
        }
        if self.repr.has_dense() {
            for joint in 0..self.indexer.cardinality() {
                self.set_weight_for_joint_index(joint, 1.0 - rng.gen::<f64>());
            }
        } else {
            for slot in 0..self.sparse_size() {
                self.set_weight_for_sparse_index(slot, 1.0 - rng.gen::<f64>());
            }
        }
    }

    // ----- deterministic evaluation --------------------------------

    /// Joint output index selected by the deterministic map for
    /// `input_index`. The table must hold the deterministic
    /// representation.
    pub fn deterministic_output_index(&self, input_index: usize) -> Result<usize> {
        if !self.repr.deterministic {
            return Err(FactabError::NotDeterministic);
        }
        let Storage::Indexed(s) = &self.storage else {
            return Err(FactabError::NotDeterministic);
        };
        let output_card = self.indexer.output_cardinality();
        Ok(s.sparse_to_joint[input_index] - input_index * output_card)
    }

    /// Fills the output positions of `indices` from its input
    /// positions using the deterministic map.
    pub fn eval_deterministic(&self, indices: &mut [usize]) -> Result<()> {
        let input = self.indexer.input_index_from_indices(indices);
        let output = self.deterministic_output_index(input)?;
        let joint = self.indexer.joint_from_input_output(input, output);
        self.indexer.indices_from_joint(joint, indices);
        Ok(())
    }
}

fn gather(src: &[f64], keep: &[usize]) -> Vec<f64> {
    keep.iter().map(|&i| src[i]).collect()
}

fn indexed_weight(s: &IndexedStorage, repr: &Representation, joint: usize) -> f64 {
    if repr.deterministic {
        return match s.sparse_to_joint.binary_search(&joint) {
            Ok(_) => 1.0,
            Err(_) => 0.0,
        };
    }
    if repr.dense_weight {
        return s.dense_weights[joint];
    }
    if repr.sparse_weight {
        return match s.slot_of_joint(joint) {
            Ok(slot) => s.sparse_weights[slot],
            Err(_) => 0.0,
        };
    }
    if repr.dense_energy {
        return energy_to_weight(s.dense_energies[joint]);
    }
    match s.slot_of_joint(joint) {
        Ok(slot) => energy_to_weight(s.sparse_energies[slot]),
        Err(_) => 0.0,
    }
}

fn indexed_energy(s: &IndexedStorage, repr: &Representation, joint: usize) -> f64 {
    if repr.deterministic {
        return match s.sparse_to_joint.binary_search(&joint) {
            Ok(_) => 0.0,
            Err(_) => f64::INFINITY,
        };
    }
    if repr.dense_energy {
        return s.dense_energies[joint];
    }
    if repr.sparse_energy {
        return match s.slot_of_joint(joint) {
            Ok(slot) => s.sparse_energies[slot],
            Err(_) => f64::INFINITY,
        };
    }
    if repr.dense_weight {
        return weight_to_energy(s.dense_weights[joint]);
    }
    match s.slot_of_joint(joint) {
        Ok(slot) => weight_to_energy(s.sparse_weights[slot]),
        Err(_) => f64::INFINITY,
    }
}
