//! Factor tables over finite discrete domains.
//!
//! A factor table maps every joint assignment of a set of discrete
//! variables to a non-negative weight, stored either as weights or as
//! energies (`weight = exp(-energy)`, so weight `0.0` and energy
//! `f64::INFINITY` denote the same impossible cell). Tables can hold
//! their values densely over the whole joint space, sparsely over the
//! explicitly listed cells, or as a deterministic input→output map, and
//! can be converted between these representations without changing the
//! function they encode.
//!
//! Entry points:
//! - [`DiscreteDomain`] / [`DomainIndexer`]: the joint index space.
//! - [`FactorTable`]: values, mutation, normalization, re-indexing.
//! - [`Representation`]: which value arrays a table keeps.
//! - [`TableCache`]: concurrent one-table-per-domain-set interning.

pub mod cache;
pub mod domains;
pub mod repr;
pub mod table;
pub mod utils;

pub use cache::TableCache;
pub use domains::{DiscreteDomain, DomainIndexer, Element};
pub use repr::Representation;
pub use table::{FactorTable, FactorTableEntry, FullCursor, FullEntries, SparseCursor, SparseEntries};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactabError {
    #[error("arrays have different lengths ({0} and {1})")]
    LengthMismatch(usize, usize),
    #[error("dense value array has length {got}, expected {expected}")]
    DenseLength { got: usize, expected: usize },
    #[error("joint index {index} out of range for cardinality {cardinality}")]
    JointIndexOutOfRange { index: usize, cardinality: usize },
    #[error("duplicate entry for joint index {0}")]
    DuplicateJointIndex(usize),
    #[error("duplicate entry for one index tuple")]
    DuplicateIndices,
    #[error("index {index} out of range for dimension {dimension} of size {size}")]
    IndexOutOfRange {
        dimension: usize,
        index: usize,
        size: usize,
    },
    #[error("output index {index} out of range for output cardinality {cardinality}")]
    OutputIndexOutOfRange { index: usize, cardinality: usize },
    #[error("value {0} is not an element of the domain")]
    ElementNotInDomain(Element),
    #[error("domain elements must be distinct")]
    DuplicateElement,
    #[error("domain must not be empty")]
    EmptyDomain,
    #[error("invalid input dimension set")]
    InvalidPartition,
    #[error("input dimensions must precede output dimensions")]
    NonCanonicalOrder,
    #[error("invalid representation: {0}")]
    InvalidRepresentation(&'static str),
    #[error("representation is not supported by this table's storage")]
    RepresentationUnsupported,
    #[error("joint indexing is not supported for this domain set")]
    JointIndexingUnsupported,
    #[error("table is not a deterministic directed function")]
    NotDeterministic,
    #[error("weights are not normalized per input assignment")]
    NotConditional,
    #[error("operation requires a directed table")]
    NotDirected,
    #[error("operation requires an undirected table")]
    NotUndirected,
    #[error("total weight is zero, table cannot be normalized")]
    ZeroTotalWeight,
    #[error("weights for input index {input_index} sum to zero, table cannot be normalized")]
    ZeroWeightForInput { input_index: usize },
    #[error("invalid dimension permutation")]
    InvalidPermutation,
    #[error("joined dimensions must lie on one side of the input/output partition")]
    JoinAcrossPartition,
    #[error("conditioning must leave at least one free dimension")]
    AllDimensionsFixed,
}

pub type Result<T> = std::result::Result<T, FactabError>;
