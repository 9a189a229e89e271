//! Representation conversion.
//!
//! Conversions never change the function a table encodes: every cell
//! keeps its weight (equivalently its energy) exactly. When a dense
//! array is converted to a sparse view covering every joint index, or
//! vice versa, the buffer is moved instead of copied whenever the
//! source array is dropped by the same conversion.

use std::sync::Arc;

use crate::repr::Representation;
use crate::utils::{energy_to_weight, weight_to_energy};
use crate::{FactabError, Result};

use super::storage::Storage;
use super::{FactorTable, PredicateMemo};

impl FactorTable {
    /// Switches the table to `target` without changing any cell value.
    ///
    /// Converting to the deterministic representation requires
    /// [`Self::is_deterministic_directed`] to hold. Hashed tables only
    /// accept sparse targets.
    pub fn set_representation(&mut self, target: Representation) -> Result<()> {
        target.validate()?;
        if target == self.repr {
            return Ok(());
        }
        if matches!(self.storage, Storage::Hashed(_)) {
            self.set_representation_hashed(target)?;
        } else if target.deterministic {
            if !self.is_deterministic_directed() {
                return Err(FactabError::NotDeterministic);
            }
            if !self.repr.deterministic {
                // the predicate holds but the map encoding needs the
                // inputs up front
                return Err(FactabError::NonCanonicalOrder);
            }
            // the predicate collapsed storage down to the map; only
            // the tuples flag may still differ
            let tuples = if target.sparse_indices {
                self.deterministic_tuples()
            } else {
                Vec::new()
            };
            let Storage::Indexed(s) = &mut self.storage else {
                unreachable!()
            };
            s.sparse_tuples = tuples;
            self.repr = target;
        } else if self.repr.deterministic {
            self.expand_deterministic(target);
        } else {
            self.convert_indexed(target);
        }
        // cursors key their position re-sync off the version, so a
        // storage reshape must bump it; the memoized predicates are
        // unaffected by a value-preserving conversion
        let memo = self.memo;
        self.touch();
        self.memo = PredicateMemo {
            version: self.version,
            normalized: memo.normalized,
            conditional: memo.conditional,
            deterministic: memo.deterministic,
        };
        Ok(())
    }

    fn deterministic_tuples(&self) -> Vec<Box<[usize]>> {
        let Storage::Indexed(s) = &self.storage else {
            unreachable!()
        };
        if !s.sparse_tuples.is_empty() {
            s.sparse_tuples.clone()
        } else {
            s.sparse_to_joint
                .iter()
                .map(|&j| self.indexer.indices_vec_from_joint(j).into_boxed_slice())
                .collect()
        }
    }

    /// Synthesizes the requested explicit arrays from the
    /// deterministic map (unit weight per mapped cell, zero weight
    /// elsewhere). Slot positions are preserved.
    pub(super) fn expand_deterministic(&mut self, target: Representation) {
        debug_assert!(self.repr.deterministic && !target.deterministic);
        let joint_size = self.indexer.cardinality();
        let tuples = if target.sparse_indices {
            self.deterministic_tuples()
        } else {
            Vec::new()
        };
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        let n = s.sparse_to_joint.len();
        if target.sparse_energy {
            s.sparse_energies = vec![0.0; n];
        }
        if target.sparse_weight {
            s.sparse_weights = vec![1.0; n];
        }
        if target.dense_energy {
            // absent cells are impossible, not merely unset
            let mut d = vec![f64::INFINITY; joint_size];
            for &j in &s.sparse_to_joint {
                d[j] = 0.0;
            }
            s.dense_energies = d;
        }
        if target.dense_weight {
            let mut d = vec![0.0; joint_size];
            for &j in &s.sparse_to_joint {
                d[j] = 1.0;
            }
            s.dense_weights = d;
        }
        s.sparse_tuples = tuples;
        if !target.has_sparse_values() {
            s.sparse_to_joint = Vec::new();
        }
        self.repr = target;
    }

    fn set_representation_hashed(&mut self, target: Representation) -> Result<()> {
        if target.deterministic || target.has_dense() {
            return Err(FactabError::RepresentationUnsupported);
        }
        let have = self.repr;
        let Storage::Hashed(s) = &mut self.storage else {
            unreachable!()
        };
        if target.sparse_energy && !have.sparse_energy {
            s.energies = s.weights.iter().map(|&w| weight_to_energy(w)).collect();
        }
        if target.sparse_weight && !have.sparse_weight {
            s.weights = s.energies.iter().map(|&e| energy_to_weight(e)).collect();
        }
        if !target.sparse_energy {
            s.energies = Vec::new();
        }
        if !target.sparse_weight {
            s.weights = Vec::new();
        }
        // keys double as the sparse index tuples, so the tuples flag
        // needs no extra storage here
        self.repr = target;
        Ok(())
    }

    /// General conversion between explicit indexed representations.
    fn convert_indexed(&mut self, target: Representation) {
        let joint_size = self.indexer.cardinality();
        let non_zero = self.non_zero_weights;
        let indexer = Arc::clone(&self.indexer);
        let Storage::Indexed(s) = &mut self.storage else {
            unreachable!()
        };
        let mut have = self.repr;

        // 1. sparse value arrays
        let need_se = target.sparse_energy && !have.sparse_energy;
        let need_sw = target.sparse_weight && !have.sparse_weight;
        if (need_se || need_sw) && !have.has_sparse_values() {
            if non_zero == joint_size {
                // every cell is live: slot == joint index, reuse the
                // dense buffers
                s.sparse_to_joint = Vec::new();
                if need_se && !have.dense_energy {
                    s.sparse_energies = s.dense_weights.iter().map(|&w| weight_to_energy(w)).collect();
                    have.sparse_energy = true;
                }
                if need_sw && !have.dense_weight {
                    s.sparse_weights = s.dense_energies.iter().map(|&e| energy_to_weight(e)).collect();
                    have.sparse_weight = true;
                }
                if need_se && have.dense_energy {
                    if target.dense_energy {
                        s.sparse_energies = s.dense_energies.clone();
                    } else {
                        s.sparse_energies = std::mem::take(&mut s.dense_energies);
                        have.dense_energy = false;
                    }
                    have.sparse_energy = true;
                }
                if need_sw && have.dense_weight {
                    if target.dense_weight {
                        s.sparse_weights = s.dense_weights.clone();
                    } else {
                        s.sparse_weights = std::mem::take(&mut s.dense_weights);
                        have.dense_weight = false;
                    }
                    have.sparse_weight = true;
                }
            } else {
                // gather the live cells in ascending joint order
                let map: Vec<usize> = if have.dense_weight {
                    (0..joint_size).filter(|&j| s.dense_weights[j] != 0.0).collect()
                } else {
                    (0..joint_size)
                        .filter(|&j| energy_to_weight(s.dense_energies[j]) != 0.0)
                        .collect()
                };
                if need_se {
                    s.sparse_energies = map
                        .iter()
                        .map(|&j| {
                            if have.dense_energy {
                                s.dense_energies[j]
                            } else {
                                weight_to_energy(s.dense_weights[j])
                            }
                        })
                        .collect();
                    have.sparse_energy = true;
                }
                if need_sw {
                    s.sparse_weights = map
                        .iter()
                        .map(|&j| {
                            if have.dense_weight {
                                s.dense_weights[j]
                            } else {
                                energy_to_weight(s.dense_energies[j])
                            }
                        })
                        .collect();
                    have.sparse_weight = true;
                }
                s.sparse_to_joint = map;
            }
        } else if need_se {
            s.sparse_energies = s.sparse_weights.iter().map(|&w| weight_to_energy(w)).collect();
            have.sparse_energy = true;
        } else if need_sw {
            s.sparse_weights = s.sparse_energies.iter().map(|&e| energy_to_weight(e)).collect();
            have.sparse_weight = true;
        }

        // 2. dense arrays
        if target.dense_energy && !have.dense_energy {
            if have.dense_weight {
                s.dense_energies = s.dense_weights.iter().map(|&w| weight_to_energy(w)).collect();
            } else if s.sparse_to_joint.is_empty() && s.sparse_value_len() == joint_size {
                if have.sparse_energy {
                    if target.sparse_energy {
                        s.dense_energies = s.sparse_energies.clone();
                    } else {
                        s.dense_energies = std::mem::take(&mut s.sparse_energies);
                        have.sparse_energy = false;
                    }
                } else {
                    s.dense_energies = s.sparse_weights.iter().map(|&w| weight_to_energy(w)).collect();
                }
            } else {
                let mut d = vec![f64::INFINITY; joint_size];
                for (slot, &j) in s.sparse_to_joint.iter().enumerate() {
                    d[j] = if have.sparse_energy {
                        s.sparse_energies[slot]
                    } else {
                        weight_to_energy(s.sparse_weights[slot])
                    };
                }
                s.dense_energies = d;
            }
            have.dense_energy = true;
        }
        if target.dense_weight && !have.dense_weight {
            if have.dense_energy {
                s.dense_weights = s.dense_energies.iter().map(|&e| energy_to_weight(e)).collect();
            } else if s.sparse_to_joint.is_empty() && s.sparse_value_len() == joint_size {
                if have.sparse_weight {
                    if target.sparse_weight {
                        s.dense_weights = s.sparse_weights.clone();
                    } else {
                        s.dense_weights = std::mem::take(&mut s.sparse_weights);
                        have.sparse_weight = false;
                    }
                } else {
                    s.dense_weights = s.sparse_energies.iter().map(|&e| energy_to_weight(e)).collect();
                }
            } else {
                let mut d = vec![0.0; joint_size];
                for (slot, &j) in s.sparse_to_joint.iter().enumerate() {
                    d[j] = if have.sparse_weight {
                        s.sparse_weights[slot]
                    } else {
                        energy_to_weight(s.sparse_energies[slot])
                    };
                }
                s.dense_weights = d;
            }
            have.dense_weight = true;
        }

        // 3. materialized tuples
        if target.sparse_indices && !have.sparse_indices {
            s.sparse_tuples = if s.sparse_to_joint.is_empty() {
                (0..s.sparse_value_len())
                    .map(|j| indexer.indices_vec_from_joint(j).into_boxed_slice())
                    .collect()
            } else {
                s.sparse_to_joint
                    .iter()
                    .map(|&j| indexer.indices_vec_from_joint(j).into_boxed_slice())
                    .collect()
            };
        }

        // 4. drop what the target does not keep
        if !target.dense_energy {
            s.dense_energies = Vec::new();
        }
        if !target.dense_weight {
            s.dense_weights = Vec::new();
        }
        if !target.sparse_energy {
            s.sparse_energies = Vec::new();
        }
        if !target.sparse_weight {
            s.sparse_weights = Vec::new();
        }
        if !target.sparse_indices {
            s.sparse_tuples = Vec::new();
        }
        if !target.has_sparse_values() {
            s.sparse_to_joint = Vec::new();
        }
        self.repr = target;
    }
}
