//! Structural re-indexing: pure operations producing a new table over
//! a related domain list.

use std::collections::BTreeSet;
use std::sync::Arc;

use itertools::Itertools;

use crate::domains::{DiscreteDomain, DomainIndexer};
use crate::repr::Representation;
use crate::{FactabError, Result};

use super::storage::{CellStorage, Storage};
use super::{indexed_weight, FactorTable};

/// Which single value array a source table is read through.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Form {
    DenseWeight,
    DenseEnergy,
    SparseWeight,
    SparseEnergy,
}

impl Form {
    fn is_energy(self) -> bool {
        matches!(self, Form::DenseEnergy | Form::SparseEnergy)
    }

    fn is_dense(self) -> bool {
        matches!(self, Form::DenseWeight | Form::DenseEnergy)
    }
}

impl FactorTable {
    fn primary_form(&self) -> Form {
        let r = self.repr;
        if r.deterministic || r.sparse_weight {
            Form::SparseWeight
        } else if r.sparse_energy {
            Form::SparseEnergy
        } else if r.dense_weight {
            Form::DenseWeight
        } else {
            Form::DenseEnergy
        }
    }

    /// Non-zero cells as (index tuple, value) with values read as
    /// weights or energies per `form`.
    fn live_cells(&self, form: Form) -> Vec<(Vec<usize>, f64)> {
        let as_energy = form.is_energy();
        let mut out = Vec::new();
        match &self.storage {
            Storage::Indexed(s) if !self.repr.has_sparse() => {
                for joint in 0..self.indexer.cardinality() {
                    if indexed_weight(s, &self.repr, joint) != 0.0 {
                        let v = if as_energy {
                            super::indexed_energy(s, &self.repr, joint)
                        } else {
                            indexed_weight(s, &self.repr, joint)
                        };
                        out.push((self.indexer.indices_vec_from_joint(joint), v));
                    }
                }
            }
            _ => {
                let mut idx = vec![0; self.indexer.num_dimensions()];
                for slot in 0..self.storage.stored_len(&self.repr) {
                    if self.storage.slot_weight(&self.repr, slot) == 0.0 {
                        continue;
                    }
                    let v = if as_energy {
                        self.storage.slot_energy(&self.repr, slot)
                    } else {
                        self.storage.slot_weight(&self.repr, slot)
                    };
                    self.storage
                        .slot_indices(&self.indexer, &self.repr, slot, &mut idx);
                    out.push((idx.clone(), v));
                }
            }
        }
        out
    }

    fn build_from_sparse(
        indexer: Arc<DomainIndexer>,
        mut cells: Vec<(Vec<usize>, f64)>,
        as_energy: bool,
    ) -> Result<FactorTable> {
        cells.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let keys: Vec<Vec<usize>> = cells.iter().map(|c| c.0.clone()).collect();
        let values: Vec<f64> = cells.iter().map(|c| c.1).collect();
        let mut t = FactorTable::new(indexer);
        if as_energy {
            t.set_energies_sparse_from_indices(&keys, &values)?;
        } else {
            t.set_weights_sparse_from_indices(&keys, &values)?;
        }
        Ok(t)
    }

    fn build_from_dense(
        indexer: Arc<DomainIndexer>,
        values: Vec<f64>,
        as_energy: bool,
    ) -> Result<FactorTable> {
        let mut t = FactorTable::new(indexer);
        if as_energy {
            t.set_energies_dense(&values)?;
        } else {
            t.set_weights_dense(&values)?;
        }
        Ok(t)
    }

    /// Carries the source representation over to a freshly built
    /// table. A deterministic source stays deterministic only when the
    /// result still satisfies the predicate; a dense representation is
    /// kept only when the result supports joint indexing.
    fn finish(&self, mut t: FactorTable) -> Result<FactorTable> {
        if self.repr.deterministic {
            if t.is_directed() && t.is_deterministic_directed() {
                let target = if self.repr.sparse_indices {
                    Representation::DETERMINISTIC_WITH_INDICES
                } else {
                    Representation::DETERMINISTIC
                };
                // the map encoding needs the inputs up front; keep the
                // sparse form otherwise
                match t.set_representation(target) {
                    Ok(()) | Err(FactabError::NonCanonicalOrder) => {}
                    Err(e) => return Err(e),
                }
            }
        } else {
            match t.set_representation(self.repr) {
                Ok(()) | Err(FactabError::RepresentationUnsupported) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(t)
    }

    fn same_partition_indexer(&self, domains: Vec<DiscreteDomain>) -> Result<DomainIndexer> {
        match self.indexer.input_dimensions() {
            None => DomainIndexer::new(domains),
            Some(inp) => DomainIndexer::new_directed(domains, inp),
        }
    }

    /// Extends the table with extra dimensions: each original cell's
    /// value is replicated across all assignments of the added
    /// domains. On a directed table the added dimensions become
    /// outputs.
    pub fn add_domains(&self, added: &[DiscreteDomain]) -> Result<FactorTable> {
        if added.is_empty() {
            return Err(FactabError::EmptyDomain);
        }
        let mut domains = self.indexer.domains().to_vec();
        domains.extend(added.iter().cloned());
        let indexer = Arc::new(self.same_partition_indexer(domains)?);
        let form = self.primary_form();
        if form.is_dense() && indexer.supports_joint_indexing() {
            let Storage::Indexed(s) = &self.storage else {
                unreachable!()
            };
            let src = if form == Form::DenseWeight {
                &s.dense_weights
            } else {
                &s.dense_energies
            };
            let added_card: usize = added.iter().map(|d| d.size()).product();
            let mut dense = Vec::with_capacity(src.len() * added_card);
            for &v in src {
                // appended dimensions vary fastest, so replication is
                // a contiguous block
                dense.extend(std::iter::repeat(v).take(added_card));
            }
            let t = Self::build_from_dense(indexer, dense, form.is_energy())?;
            return self.finish(t);
        }
        let cells = self.live_cells(form);
        let mut out = Vec::new();
        for (key, v) in &cells {
            for combo in added.iter().map(|d| 0..d.size()).multi_cartesian_product() {
                let mut k = key.clone();
                k.extend(combo);
                out.push((k, *v));
            }
        }
        let t = Self::build_from_sparse(indexer, out, form.is_energy())?;
        self.finish(t)
    }

    /// Reorders the dimensions: `permutation[i]` is the new position
    /// of dimension `i`. Cell values follow their domain tuple; the
    /// input/output partition follows the permutation.
    pub fn permute_dimensions(&self, permutation: &[usize]) -> Result<FactorTable> {
        let n = self.indexer.num_dimensions();
        if permutation.len() != n {
            return Err(FactabError::InvalidPermutation);
        }
        let mut seen = vec![false; n];
        for &p in permutation {
            if p >= n || seen[p] {
                return Err(FactabError::InvalidPermutation);
            }
            seen[p] = true;
        }
        let mut domains = vec![DiscreteDomain::Range(1); n];
        for (i, &p) in permutation.iter().enumerate() {
            domains[p] = self.indexer.domain(i).clone();
        }
        let indexer = Arc::new(match self.indexer.input_dimensions() {
            None => DomainIndexer::new(domains)?,
            Some(inp) => {
                let mapped: Vec<usize> = inp.iter().map(|&d| permutation[d]).collect();
                DomainIndexer::new_directed(domains, &mapped)?
            }
        });
        let form = self.primary_form();
        if form.is_dense() {
            let Storage::Indexed(s) = &self.storage else {
                unreachable!()
            };
            let src = if form == Form::DenseWeight {
                &s.dense_weights
            } else {
                &s.dense_energies
            };
            let mut dense = vec![0.0; src.len()];
            let mut idx = vec![0; n];
            let mut pidx = vec![0; n];
            for (joint, &v) in src.iter().enumerate() {
                self.indexer.indices_from_joint(joint, &mut idx);
                for (i, &p) in permutation.iter().enumerate() {
                    pidx[p] = idx[i];
                }
                dense[indexer.joint_from_indices(&pidx)] = v;
            }
            let t = Self::build_from_dense(indexer, dense, form.is_energy())?;
            return self.finish(t);
        }
        let cells = self.live_cells(form);
        let mut out = Vec::with_capacity(cells.len());
        for (key, v) in &cells {
            let mut k = vec![0; n];
            for (i, &p) in permutation.iter().enumerate() {
                k[p] = key[i];
            }
            out.push((k, *v));
        }
        let t = Self::build_from_sparse(indexer, out, form.is_energy())?;
        self.finish(t)
    }

    /// Merges the given dimensions (at least two, in the order listed)
    /// into one trailing index domain whose size is the product of
    /// theirs. On a directed table the merged dimensions must all be
    /// inputs or all be outputs.
    pub fn join_dimensions(&self, dims: &[usize]) -> Result<FactorTable> {
        let n = self.indexer.num_dimensions();
        if dims.len() < 2 || dims.len() > n {
            return Err(FactabError::InvalidPermutation);
        }
        for (i, &d) in dims.iter().enumerate() {
            if d >= n || dims[..i].contains(&d) {
                return Err(FactabError::InvalidPermutation);
            }
        }
        if let Some(inp) = self.indexer.input_dimensions() {
            let inputs = dims.iter().filter(|d| inp.contains(d)).count();
            if inputs != 0 && inputs != dims.len() {
                return Err(FactabError::JoinAcrossPartition);
            }
        }
        let joined_size = dims
            .iter()
            .try_fold(1usize, |a, &d| a.checked_mul(self.indexer.dimension_size(d)))
            .ok_or(FactabError::JointIndexingUnsupported)?;

        // move the joined dimensions to the end in the order given;
        // the trailing block then folds into one digit without moving
        // any cell
        let keep = n - dims.len();
        let mut perm = vec![usize::MAX; n];
        let mut front = 0;
        for d in 0..n {
            if !dims.contains(&d) {
                perm[d] = front;
                front += 1;
            }
        }
        for (k, &d) in dims.iter().enumerate() {
            perm[d] = keep + k;
        }
        let permuted = self.permute_dimensions(&perm)?;

        let mut domains: Vec<DiscreteDomain> = permuted.indexer.domains()[..keep].to_vec();
        domains.push(DiscreteDomain::range(joined_size));
        let indexer = match permuted.indexer.input_dimensions() {
            None => DomainIndexer::new(domains)?,
            Some(inp) => {
                let mapped: BTreeSet<usize> = inp.iter().map(|&d| d.min(keep)).collect();
                let mapped: Vec<usize> = mapped.into_iter().collect();
                DomainIndexer::new_directed(domains, &mapped)?
            }
        };
        Ok(permuted.fold_trailing(Arc::new(indexer), keep))
    }

    /// Reinterprets the trailing dimensions as a single one. Joint
    /// indices are unchanged, so only stored tuples need rewriting.
    fn fold_trailing(mut self, indexer: Arc<DomainIndexer>, keep: usize) -> FactorTable {
        let old = Arc::clone(&self.indexer);
        let n = old.num_dimensions();
        let fold = |key: &[usize]| -> Box<[usize]> {
            let mut out: Vec<usize> = key[..keep].to_vec();
            let mut digit = 0;
            for d in keep..n {
                digit = digit * old.dimension_size(d) + key[d];
            }
            out.push(digit);
            out.into_boxed_slice()
        };
        match &mut self.storage {
            Storage::Indexed(s) => {
                if !s.sparse_tuples.is_empty() {
                    s.sparse_tuples = s.sparse_tuples.iter().map(|t| fold(t)).collect();
                }
            }
            Storage::Hashed(s) => {
                s.keys = s.keys.iter().map(|k| fold(k)).collect();
                s.rebuild_lookup();
            }
        }
        self.indexer = indexer;
        self.touch();
        self
    }

    /// Fixes some dimensions to given indices and drops them,
    /// producing the table over the remaining dimensions whose cells
    /// are the matching slice of this one. Fixed input dimensions
    /// leave the partition; a table whose inputs are all fixed comes
    /// out undirected.
    pub fn condition_on(&self, fixed: &[Option<usize>]) -> Result<FactorTable> {
        let n = self.indexer.num_dimensions();
        if fixed.len() != n {
            return Err(FactabError::LengthMismatch(fixed.len(), n));
        }
        for (d, f) in fixed.iter().enumerate() {
            if let Some(i) = f {
                if *i >= self.indexer.dimension_size(d) {
                    return Err(FactabError::IndexOutOfRange {
                        dimension: d,
                        index: *i,
                        size: self.indexer.dimension_size(d),
                    });
                }
            }
        }
        let kept: Vec<usize> = (0..n).filter(|d| fixed[*d].is_none()).collect();
        if kept.is_empty() {
            return Err(FactabError::AllDimensionsFixed);
        }
        let domains: Vec<DiscreteDomain> = kept.iter().map(|&d| self.indexer.domain(d).clone()).collect();
        let indexer = Arc::new(match self.indexer.input_dimensions() {
            None => DomainIndexer::new(domains)?,
            Some(inp) => {
                let mapped: Vec<usize> = kept
                    .iter()
                    .enumerate()
                    .filter(|(_, d)| inp.contains(d))
                    .map(|(pos, _)| pos)
                    .collect();
                if mapped.is_empty() || mapped.len() == kept.len() {
                    DomainIndexer::new(domains)?
                } else {
                    DomainIndexer::new_directed(domains, &mapped)?
                }
            }
        });
        let form = self.primary_form();
        if form.is_dense() {
            let Storage::Indexed(s) = &self.storage else {
                unreachable!()
            };
            let src = if form == Form::DenseWeight {
                &s.dense_weights
            } else {
                &s.dense_energies
            };
            let mut full = vec![0; n];
            for (d, f) in fixed.iter().enumerate() {
                if let Some(i) = f {
                    full[d] = *i;
                }
            }
            let new_card = indexer.cardinality();
            let mut dense = Vec::with_capacity(new_card);
            let mut kidx = vec![0; kept.len()];
            for joint in 0..new_card {
                indexer.indices_from_joint(joint, &mut kidx);
                for (pos, &d) in kept.iter().enumerate() {
                    full[d] = kidx[pos];
                }
                dense.push(src[self.indexer.joint_from_indices(&full)]);
            }
            let t = Self::build_from_dense(indexer, dense, form.is_energy())?;
            return self.finish(t);
        }
        let cells = self.live_cells(form);
        let mut out = Vec::new();
        for (key, v) in &cells {
            let matches = fixed
                .iter()
                .enumerate()
                .all(|(d, f)| f.map_or(true, |i| key[d] == i));
            if matches {
                out.push((kept.iter().map(|&d| key[d]).collect(), *v));
            }
        }
        let t = Self::build_from_sparse(indexer, out, form.is_energy())?;
        self.finish(t)
    }

    /// Re-partitions the same domain list (or removes the partition
    /// with `None`), keeping every cell value. A deterministic source
    /// expands to sparse energies first, since its map encoding is
    /// tied to the old partition.
    pub fn with_direction(&self, input_dims: Option<&[usize]>) -> Result<FactorTable> {
        let domains = self.indexer.domains().to_vec();
        let indexer = Arc::new(match input_dims {
            Some(dims) => DomainIndexer::new_directed(domains, dims)?,
            None => DomainIndexer::new(domains)?,
        });
        let mut t = self.clone();
        if t.repr.deterministic {
            let target = if t.repr.sparse_indices {
                Representation::SPARSE_ENERGY_WITH_INDICES
            } else {
                Representation::SPARSE_ENERGY
            };
            t.expand_deterministic(target);
        }
        t.indexer = indexer;
        t.touch();
        Ok(t)
    }

    /// Directs the table along `input_dims` and normalizes each input
    /// block.
    pub fn make_conditional(&self, input_dims: &[usize]) -> Result<FactorTable> {
        let mut t = self.with_direction(Some(input_dims))?;
        t.normalize_conditional()?;
        Ok(t)
    }
}
