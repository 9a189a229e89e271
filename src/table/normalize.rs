//! Normalization and the memoized table predicates.

use std::sync::Arc;

use crate::repr::Representation;
use crate::utils::{energy_to_weight, fuzzy_eq};
use crate::{FactabError, Result};

use super::storage::{CellStorage, Storage};
use super::{indexed_weight, FactorTable};

/// Tolerance for treating totals as already normalized and for the
/// equal-weight test of the deterministic predicate.
pub(super) const FUZZY_TOL: f64 = 1e-12;

impl FactorTable {
    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        match &self.storage {
            Storage::Indexed(s) => {
                if self.repr.deterministic {
                    s.sparse_to_joint.len() as f64
                } else if self.repr.dense_weight {
                    s.dense_weights.iter().sum()
                } else if self.repr.sparse_weight {
                    s.sparse_weights.iter().sum()
                } else if self.repr.dense_energy {
                    s.dense_energies.iter().map(|&e| energy_to_weight(e)).sum()
                } else {
                    s.sparse_energies.iter().map(|&e| energy_to_weight(e)).sum()
                }
            }
            Storage::Hashed(s) => {
                if self.repr.sparse_weight {
                    s.weights.iter().sum()
                } else {
                    s.energies.iter().map(|&e| energy_to_weight(e)).sum()
                }
            }
        }
    }

    /// Weight totals per joint input assignment.
    fn input_totals(&self) -> Result<Vec<f64>> {
        if !self.indexer.supports_input_indexing() {
            return Err(FactabError::JointIndexingUnsupported);
        }
        let mut totals = vec![0.0; self.indexer.input_cardinality()];
        match &self.storage {
            Storage::Indexed(s) => {
                if self.repr.deterministic || self.repr.has_sparse_values() {
                    for slot in 0..s.stored_len(&self.repr) {
                        let w = s.slot_weight(&self.repr, slot);
                        if w != 0.0 {
                            totals[self.indexer.input_index_from_joint(s.joint_of_slot(slot))] += w;
                        }
                    }
                } else {
                    for joint in 0..self.indexer.cardinality() {
                        let w = indexed_weight(s, &self.repr, joint);
                        if w != 0.0 {
                            totals[self.indexer.input_index_from_joint(joint)] += w;
                        }
                    }
                }
            }
            Storage::Hashed(s) => {
                for (slot, key) in s.keys.iter().enumerate() {
                    let w = s.slot_weight(&self.repr, slot);
                    if w != 0.0 {
                        totals[self.indexer.input_index_from_indices(key)] += w;
                    }
                }
            }
        }
        Ok(totals)
    }

    /// Scales all weights by a single factor (energies shift by
    /// `-ln(factor)`).
    fn scale_all(&mut self, factor: f64) {
        let shift = -factor.ln();
        match &mut self.storage {
            Storage::Indexed(s) => {
                for w in &mut s.dense_weights {
                    *w *= factor;
                }
                for w in &mut s.sparse_weights {
                    *w *= factor;
                }
                for e in &mut s.dense_energies {
                    if e.is_finite() {
                        *e += shift;
                    }
                }
                for e in &mut s.sparse_energies {
                    if e.is_finite() {
                        *e += shift;
                    }
                }
            }
            Storage::Hashed(s) => {
                for w in &mut s.weights {
                    *w *= factor;
                }
                for e in &mut s.energies {
                    if e.is_finite() {
                        *e += shift;
                    }
                }
            }
        }
    }

    fn scale_per_input(&mut self, totals: &[f64]) {
        let repr = self.repr;
        let indexer = Arc::clone(&self.indexer);
        match &mut self.storage {
            Storage::Indexed(s) => {
                if repr.has_sparse_values() {
                    // dense cells outside the sparse view are zero and
                    // unaffected by scaling
                    for slot in 0..s.stored_len(&repr) {
                        let input = indexer.input_index_from_joint(s.joint_of_slot(slot));
                        s.scale_slot(&repr, slot, 1.0 / totals[input]);
                    }
                } else {
                    for joint in 0..indexer.cardinality() {
                        let factor = 1.0 / totals[indexer.input_index_from_joint(joint)];
                        if repr.dense_weight {
                            s.dense_weights[joint] *= factor;
                        }
                        if repr.dense_energy {
                            let e = &mut s.dense_energies[joint];
                            if e.is_finite() {
                                *e += -factor.ln();
                            }
                        }
                    }
                }
            }
            Storage::Hashed(s) => {
                for slot in 0..s.keys.len() {
                    let input = indexer.input_index_from_indices(&s.keys[slot]);
                    s.scale_slot(&repr, slot, 1.0 / totals[input]);
                }
            }
        }
    }

    /// Scales an undirected table so its weights sum to one. Totals
    /// already within `1e-12` of one are left untouched. Fails on
    /// directed tables and on an all-zero table.
    pub fn normalize(&mut self) -> Result<()> {
        if self.indexer.is_directed() {
            return Err(FactabError::NotUndirected);
        }
        let total = self.total_weight();
        if fuzzy_eq(total, 1.0, FUZZY_TOL) {
            self.memo_set(|m| m.normalized = Some(true));
            return Ok(());
        }
        if total == 0.0 {
            return Err(FactabError::ZeroTotalWeight);
        }
        self.scale_all(1.0 / total);
        self.touch();
        self.memo_set(|m| m.normalized = Some(true));
        Ok(())
    }

    /// Scales a directed table so the weights of each joint input
    /// assignment sum to one. Fails if any input's weights are all
    /// zero, leaving the table unchanged.
    pub fn normalize_conditional(&mut self) -> Result<()> {
        if !self.indexer.is_directed() {
            return Err(FactabError::NotDirected);
        }
        if self.repr.deterministic {
            // exactly one unit-weight cell per input
            self.memo_set(|m| {
                m.conditional = Some(true);
                m.normalized = Some(true);
            });
            return Ok(());
        }
        let totals = self.input_totals()?;
        for (input, &t) in totals.iter().enumerate() {
            if t == 0.0 {
                return Err(FactabError::ZeroWeightForInput { input_index: input });
            }
        }
        if totals.iter().all(|&t| fuzzy_eq(t, 1.0, FUZZY_TOL)) {
            self.memo_set(|m| {
                m.conditional = Some(true);
                m.normalized = Some(true);
            });
            return Ok(());
        }
        self.scale_per_input(&totals);
        self.touch();
        self.memo_set(|m| {
            m.conditional = Some(true);
            m.normalized = Some(true);
        });
        Ok(())
    }

    /// Whether the weights sum to one: in total for undirected tables,
    /// per joint input assignment for directed ones. Memoized until
    /// the next mutation.
    pub fn is_normalized(&mut self) -> bool {
        if let Some(v) = self.memo_get(|m| m.normalized) {
            return v;
        }
        let v = if self.indexer.is_directed() {
            match self.input_totals() {
                Ok(totals) => totals.iter().all(|&t| fuzzy_eq(t, 1.0, FUZZY_TOL)),
                Err(_) => false,
            }
        } else {
            fuzzy_eq(self.total_weight(), 1.0, FUZZY_TOL)
        };
        self.memo_set(|m| m.normalized = Some(v));
        v
    }

    /// Errors unless the table is a conditional distribution of its
    /// outputs given its inputs.
    pub fn assert_conditional(&mut self) -> Result<()> {
        if !self.indexer.is_directed() {
            return Err(FactabError::NotDirected);
        }
        if self.is_conditional() {
            Ok(())
        } else {
            Err(FactabError::NotConditional)
        }
    }

    /// Whether the table is directed and every joint input assignment
    /// carries the same positive total weight (conditional up to a
    /// constant). Memoized until the next mutation.
    pub fn is_conditional(&mut self) -> bool {
        if let Some(v) = self.memo_get(|m| m.conditional) {
            return v;
        }
        let v = if !self.indexer.is_directed() {
            false
        } else if self.repr.deterministic {
            true
        } else {
            match self.input_totals() {
                Ok(totals) => {
                    let first = totals[0];
                    first != 0.0 && totals.iter().all(|&t| fuzzy_eq(t, first, FUZZY_TOL))
                }
                Err(_) => false,
            }
        };
        self.memo_set(|m| m.conditional = Some(v));
        v
    }

    /// Whether the table is directed with exactly one non-zero cell
    /// per joint input assignment, all of equal weight.
    ///
    /// A positive answer on an indexed table in canonical order
    /// collapses the storage to the deterministic map (dropping any
    /// value arrays and rescaling the constant to one). Memoized until
    /// the next mutation.
    pub fn is_deterministic_directed(&mut self) -> bool {
        if self.repr.deterministic {
            return true;
        }
        if let Some(v) = self.memo_get(|m| m.deterministic) {
            return v;
        }
        let v = self.check_deterministic_directed();
        if v && self.indexer.has_canonical_order() && matches!(self.storage, Storage::Indexed(_)) {
            self.collapse_deterministic();
        }
        // without the collapse the shared weight may differ from one,
        // so the table need not be normalized
        let collapsed = self.repr.deterministic;
        self.memo_set(|m| {
            m.deterministic = Some(v);
            if v {
                m.conditional = Some(true);
                if collapsed {
                    m.normalized = Some(true);
                }
            }
        });
        v
    }

    fn check_deterministic_directed(&self) -> bool {
        if !self.indexer.is_directed() || !self.indexer.supports_input_indexing() {
            return false;
        }
        let input_card = self.indexer.input_cardinality();
        if self.non_zero_weights != input_card {
            return false;
        }
        let mut seen = vec![false; input_card];
        let mut first: Option<f64> = None;
        let mut visit = |input: usize, w: f64| -> bool {
            if seen[input] {
                return false;
            }
            seen[input] = true;
            match first {
                None => {
                    first = Some(w);
                    true
                }
                Some(f) => fuzzy_eq(w, f, FUZZY_TOL),
            }
        };
        match &self.storage {
            Storage::Indexed(s) => {
                if self.repr.has_sparse_values() {
                    for slot in 0..s.stored_len(&self.repr) {
                        let w = s.slot_weight(&self.repr, slot);
                        if w != 0.0
                            && !visit(self.indexer.input_index_from_joint(s.joint_of_slot(slot)), w)
                        {
                            return false;
                        }
                    }
                } else {
                    for joint in 0..self.indexer.cardinality() {
                        let w = indexed_weight(s, &self.repr, joint);
                        if w != 0.0 && !visit(self.indexer.input_index_from_joint(joint), w) {
                            return false;
                        }
                    }
                }
            }
            Storage::Hashed(s) => {
                for (slot, key) in s.keys.iter().enumerate() {
                    let w = s.slot_weight(&self.repr, slot);
                    if w != 0.0 && !visit(self.indexer.input_index_from_indices(key), w) {
                        return false;
                    }
                }
            }
        }
        seen.iter().all(|&b| b)
    }

    /// Rewrites the storage as the bare input→output map. Only called
    /// when the deterministic predicate holds in canonical order, so
    /// the live cells appear in ascending input order.
    fn collapse_deterministic(&mut self) {
        let repr = self.repr;
        let keep_tuples = repr.sparse_indices;
        let indexer = Arc::clone(&self.indexer);
        let non_zero = self.non_zero_weights;
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        let mut map = Vec::with_capacity(non_zero);
        let mut unit = 1.0;
        if repr.has_sparse_values() {
            for slot in 0..s.stored_len(&repr) {
                let w = s.slot_weight(&repr, slot);
                if w != 0.0 {
                    unit = w;
                    map.push(s.joint_of_slot(slot));
                }
            }
        } else {
            for joint in 0..indexer.cardinality() {
                let w = indexed_weight(s, &repr, joint);
                if w != 0.0 {
                    unit = w;
                    map.push(joint);
                }
            }
        }
        let tuples: Vec<Box<[usize]>> = if keep_tuples {
            map.iter()
                .map(|&j| indexer.indices_vec_from_joint(j).into_boxed_slice())
                .collect()
        } else {
            Vec::new()
        };
        s.clear_values();
        s.sparse_to_joint = map;
        s.sparse_tuples = tuples;
        self.repr = if keep_tuples {
            Representation::DETERMINISTIC_WITH_INDICES
        } else {
            Representation::DETERMINISTIC
        };
        // observable values change when the shared constant was not
        // exactly one
        if unit != 1.0 {
            self.touch();
        }
    }
}
