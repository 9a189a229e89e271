//! Which value arrays a factor table keeps.

use serde::{Deserialize, Serialize};

use crate::{FactabError, Result};

/// Set of storage flags for a [`crate::FactorTable`].
///
/// Dense arrays cover the whole joint space; sparse arrays cover only
/// the explicitly listed cells, positioned by a sorted
/// sparse-to-joint map. `sparse_indices` additionally materializes the
/// per-cell index tuples. `deterministic` stores a directed table as a
/// bare input→output map with implicit unit weights, and excludes all
/// value arrays.
///
/// A valid representation is either `deterministic` (with optional
/// `sparse_indices`) or carries at least one value array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    pub dense_energy: bool,
    pub dense_weight: bool,
    pub sparse_energy: bool,
    pub sparse_weight: bool,
    pub sparse_indices: bool,
    pub deterministic: bool,
}

impl Representation {
    const fn flags(de: bool, dw: bool, se: bool, sw: bool, si: bool, det: bool) -> Self {
        Representation {
            dense_energy: de,
            dense_weight: dw,
            sparse_energy: se,
            sparse_weight: sw,
            sparse_indices: si,
            deterministic: det,
        }
    }

    pub const DENSE_ENERGY: Self = Self::flags(true, false, false, false, false, false);
    pub const DENSE_WEIGHT: Self = Self::flags(false, true, false, false, false, false);
    pub const ALL_DENSE: Self = Self::flags(true, true, false, false, false, false);
    pub const SPARSE_ENERGY: Self = Self::flags(false, false, true, false, false, false);
    pub const SPARSE_WEIGHT: Self = Self::flags(false, false, false, true, false, false);
    pub const ALL_SPARSE: Self = Self::flags(false, false, true, true, false, false);
    pub const ALL_VALUES: Self = Self::flags(true, true, true, true, false, false);
    pub const SPARSE_ENERGY_WITH_INDICES: Self = Self::flags(false, false, true, false, true, false);
    pub const SPARSE_WEIGHT_WITH_INDICES: Self = Self::flags(false, false, false, true, true, false);
    pub const ALL_SPARSE_WITH_INDICES: Self = Self::flags(false, false, true, true, true, false);
    pub const DETERMINISTIC: Self = Self::flags(false, false, false, false, false, true);
    pub const DETERMINISTIC_WITH_INDICES: Self = Self::flags(false, false, false, false, true, true);

    pub fn has_dense(&self) -> bool {
        self.dense_energy || self.dense_weight
    }

    pub fn has_sparse_values(&self) -> bool {
        self.sparse_energy || self.sparse_weight
    }

    /// Whether the table enumerates its cells explicitly (any sparse
    /// array or the deterministic map).
    pub fn has_sparse(&self) -> bool {
        self.has_sparse_values() || self.sparse_indices || self.deterministic
    }

    pub fn has_energy(&self) -> bool {
        self.dense_energy || self.sparse_energy
    }

    pub fn has_weight(&self) -> bool {
        self.dense_weight || self.sparse_weight
    }

    fn has_values(&self) -> bool {
        self.has_dense() || self.has_sparse_values()
    }

    pub fn validate(&self) -> Result<()> {
        if self.deterministic {
            if self.has_values() {
                return Err(FactabError::InvalidRepresentation(
                    "deterministic excludes value arrays",
                ));
            }
        } else if !self.has_values() {
            return Err(FactabError::InvalidRepresentation(
                "at least one value array is required",
            ));
        } else if self.sparse_indices && !self.has_sparse_values() {
            return Err(FactabError::InvalidRepresentation(
                "sparse indices require a sparse value array",
            ));
        }
        Ok(())
    }
}
