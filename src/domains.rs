//! Discrete domains and the joint index space over a list of them.

use serde::{Deserialize, Serialize};

use crate::{FactabError, Result};

/// Label attached to a domain member on the elements access path.
pub type Element = i64;

/// A finite discrete variable domain.
///
/// `Range(n)` is the plain index domain `0..n`; `Elements` carries
/// distinct labels whose position in the list is the domain index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscreteDomain {
    Range(usize),
    Elements(Box<[Element]>),
}

impl DiscreteDomain {
    /// Index domain `0..size`. Panics if `size` is zero.
    pub fn range(size: usize) -> Self {
        assert!(size > 0, "domain must not be empty");
        DiscreteDomain::Range(size)
    }

    /// Labelled domain. The labels must be distinct and non-empty.
    pub fn from_elements(elements: Vec<Element>) -> Result<Self> {
        if elements.is_empty() {
            return Err(FactabError::EmptyDomain);
        }
        for (i, e) in elements.iter().enumerate() {
            if elements[..i].contains(e) {
                return Err(FactabError::DuplicateElement);
            }
        }
        Ok(DiscreteDomain::Elements(elements.into_boxed_slice()))
    }

    pub fn size(&self) -> usize {
        match self {
            DiscreteDomain::Range(n) => *n,
            DiscreteDomain::Elements(e) => e.len(),
        }
    }

    /// Label of the member at `index`. Panics if out of range.
    pub fn element(&self, index: usize) -> Element {
        match self {
            DiscreteDomain::Range(n) => {
                assert!(index < *n, "index {} out of range for domain of size {}", index, n);
                index as Element
            }
            DiscreteDomain::Elements(e) => e[index],
        }
    }

    /// Domain index of `element`.
    pub fn index_of(&self, element: Element) -> Result<usize> {
        match self {
            DiscreteDomain::Range(n) => {
                if element >= 0 && (element as usize) < *n {
                    Ok(element as usize)
                } else {
                    Err(FactabError::ElementNotInDomain(element))
                }
            }
            DiscreteDomain::Elements(e) => e
                .iter()
                .position(|x| *x == element)
                .ok_or(FactabError::ElementNotInDomain(element)),
        }
    }
}

/// Maps between index tuples and flat joint indices for an ordered list
/// of domains, with an optional directed input/output partition.
///
/// The joint index is row-major: the last dimension varies fastest.
/// Direction is metadata over the same layout, so re-partitioning a
/// domain list never changes any cell's joint index. When the input
/// dimensions form a prefix of the list (canonical order) the joint
/// index factors as `input_index * output_cardinality + output_index`.
///
/// Joint cardinalities that overflow `usize` are supported: the indexer
/// still answers per-dimension questions, but flat joint indexing is
/// unavailable (see [`DomainIndexer::supports_joint_indexing`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainIndexer {
    domains: Box<[DiscreteDomain]>,
    /// Row-major strides; empty when the cardinality overflows.
    strides: Box<[usize]>,
    cardinality: Option<usize>,
    /// Sorted input dimension positions; `None` for undirected.
    input_dims: Option<Box<[usize]>>,
    /// Sorted complement of `input_dims` (all dimensions if undirected).
    output_dims: Box<[usize]>,
    /// Mixed-radix strides over the input (resp. output) dimensions in
    /// their sorted order; empty when the partition cardinality
    /// overflows or the table is undirected.
    input_strides: Box<[usize]>,
    output_strides: Box<[usize]>,
    input_cardinality: Option<usize>,
    output_cardinality: Option<usize>,
    canonical: bool,
}

fn radix_strides(sizes: &[usize]) -> (Option<usize>, Box<[usize]>) {
    let mut strides = vec![0usize; sizes.len()];
    let mut prod: Option<usize> = Some(1);
    for (i, &size) in sizes.iter().enumerate().rev() {
        match prod {
            Some(p) => {
                strides[i] = p;
                prod = p.checked_mul(size);
            }
            None => return (None, Box::default()),
        }
    }
    match prod {
        Some(p) => (Some(p), strides.into_boxed_slice()),
        None => (None, Box::default()),
    }
}

impl DomainIndexer {
    /// Undirected indexer over `domains`.
    pub fn new(domains: Vec<DiscreteDomain>) -> Result<Self> {
        Self::build(domains, None)
    }

    /// Directed indexer with the given input dimension positions. The
    /// set must be a non-empty proper subset of the dimensions.
    pub fn new_directed(domains: Vec<DiscreteDomain>, input_dims: &[usize]) -> Result<Self> {
        let mut dims = input_dims.to_vec();
        dims.sort_unstable();
        if dims.is_empty() || dims.len() >= domains.len() {
            return Err(FactabError::InvalidPartition);
        }
        for (i, &d) in dims.iter().enumerate() {
            if d >= domains.len() || (i > 0 && dims[i - 1] == d) {
                return Err(FactabError::InvalidPartition);
            }
        }
        Self::build(domains, Some(dims))
    }

    fn build(domains: Vec<DiscreteDomain>, input_dims: Option<Vec<usize>>) -> Result<Self> {
        if domains.is_empty() {
            return Err(FactabError::EmptyDomain);
        }
        let sizes: Vec<usize> = domains.iter().map(|d| d.size()).collect();
        let (cardinality, strides) = radix_strides(&sizes);

        let output_dims: Vec<usize> = match &input_dims {
            None => (0..domains.len()).collect(),
            Some(inp) => (0..domains.len()).filter(|d| !inp.contains(d)).collect(),
        };
        let canonical = match &input_dims {
            None => true,
            Some(inp) => inp.iter().enumerate().all(|(i, &d)| i == d),
        };
        let (input_cardinality, input_strides) = match &input_dims {
            None => (Some(1), Box::default()),
            Some(inp) => {
                let in_sizes: Vec<usize> = inp.iter().map(|&d| sizes[d]).collect();
                radix_strides(&in_sizes)
            }
        };
        let (output_cardinality, output_strides) = if input_dims.is_none() {
            (cardinality, Box::default())
        } else {
            let out_sizes: Vec<usize> = output_dims.iter().map(|&d| sizes[d]).collect();
            radix_strides(&out_sizes)
        };

        Ok(DomainIndexer {
            domains: domains.into_boxed_slice(),
            strides,
            cardinality,
            input_dims: input_dims.map(Vec::into_boxed_slice),
            output_dims: output_dims.into_boxed_slice(),
            input_strides,
            output_strides,
            input_cardinality,
            output_cardinality,
            canonical,
        })
    }

    pub fn num_dimensions(&self) -> usize {
        self.domains.len()
    }

    pub fn domain(&self, dimension: usize) -> &DiscreteDomain {
        &self.domains[dimension]
    }

    pub fn domains(&self) -> &[DiscreteDomain] {
        &self.domains
    }

    pub fn dimension_size(&self, dimension: usize) -> usize {
        self.domains[dimension].size()
    }

    /// Whether the joint cardinality fits in `usize`, enabling the
    /// joint-index access path and dense storage.
    pub fn supports_joint_indexing(&self) -> bool {
        self.cardinality.is_some()
    }

    /// Total number of joint assignments. Panics when joint indexing is
    /// unsupported; see [`Self::supports_joint_indexing`].
    pub fn cardinality(&self) -> usize {
        match self.cardinality {
            Some(c) => c,
            None => panic!("joint cardinality exceeds usize"),
        }
    }

    /// Row-major stride of `dimension` in the joint index. Panics when
    /// joint indexing is unsupported.
    pub fn stride(&self, dimension: usize) -> usize {
        assert!(self.supports_joint_indexing(), "joint indexing unsupported");
        self.strides[dimension]
    }

    pub fn is_directed(&self) -> bool {
        self.input_dims.is_some()
    }

    /// Sorted input dimension positions, or `None` if undirected.
    pub fn input_dimensions(&self) -> Option<&[usize]> {
        self.input_dims.as_deref()
    }

    /// Sorted dimensions outside the input set (all of them if
    /// undirected).
    pub fn output_dimensions(&self) -> &[usize] {
        &self.output_dims
    }

    /// True when the input dimensions form a prefix of the dimension
    /// list, so outputs occupy a contiguous fastest-varying block.
    pub fn has_canonical_order(&self) -> bool {
        self.canonical
    }

    /// Number of joint input assignments (`1` if undirected). Panics on
    /// overflow.
    pub fn input_cardinality(&self) -> usize {
        match self.input_cardinality {
            Some(c) => c,
            None => panic!("input cardinality exceeds usize"),
        }
    }

    /// Number of joint output assignments (the full cardinality if
    /// undirected). Panics on overflow.
    pub fn output_cardinality(&self) -> usize {
        match self.output_cardinality {
            Some(c) => c,
            None => panic!("output cardinality exceeds usize"),
        }
    }

    pub(crate) fn supports_input_indexing(&self) -> bool {
        self.input_cardinality.is_some() && self.output_cardinality.is_some()
    }

    /// Flat joint index of an index tuple. Panics on a tuple of the
    /// wrong arity or with an out-of-range index.
    pub fn joint_from_indices(&self, indices: &[usize]) -> usize {
        assert!(self.supports_joint_indexing(), "joint indexing unsupported");
        assert_eq!(indices.len(), self.domains.len(), "wrong index tuple arity");
        let mut joint = 0;
        for (d, &i) in indices.iter().enumerate() {
            assert!(
                i < self.domains[d].size(),
                "index {} out of range for dimension {} of size {}",
                i,
                d,
                self.domains[d].size()
            );
            joint += i * self.strides[d];
        }
        joint
    }

    /// Decomposes a joint index into `indices` (one slot per
    /// dimension).
    pub fn indices_from_joint(&self, joint: usize, indices: &mut [usize]) {
        assert!(joint < self.cardinality(), "joint index out of range");
        assert_eq!(indices.len(), self.domains.len(), "wrong index tuple arity");
        for (d, slot) in indices.iter_mut().enumerate() {
            *slot = (joint / self.strides[d]) % self.domains[d].size();
        }
    }

    pub fn indices_vec_from_joint(&self, joint: usize) -> Vec<usize> {
        let mut indices = vec![0; self.domains.len()];
        self.indices_from_joint(joint, &mut indices);
        indices
    }

    /// Checked variant of [`Self::joint_from_indices`] for bulk input.
    pub fn validate_indices(&self, indices: &[usize]) -> Result<()> {
        if indices.len() != self.domains.len() {
            return Err(FactabError::LengthMismatch(indices.len(), self.domains.len()));
        }
        for (d, &i) in indices.iter().enumerate() {
            if i >= self.domains[d].size() {
                return Err(FactabError::IndexOutOfRange {
                    dimension: d,
                    index: i,
                    size: self.domains[d].size(),
                });
            }
        }
        Ok(())
    }

    /// Maps element labels to domain indices.
    pub fn indices_from_elements(&self, elements: &[Element], indices: &mut [usize]) -> Result<()> {
        if elements.len() != self.domains.len() {
            return Err(FactabError::LengthMismatch(elements.len(), self.domains.len()));
        }
        for (d, (&e, slot)) in elements.iter().zip(indices.iter_mut()).enumerate() {
            *slot = self.domains[d].index_of(e)?;
        }
        Ok(())
    }

    pub fn elements_from_indices(&self, indices: &[usize]) -> Vec<Element> {
        assert_eq!(indices.len(), self.domains.len(), "wrong index tuple arity");
        indices
            .iter()
            .enumerate()
            .map(|(d, &i)| self.domains[d].element(i))
            .collect()
    }

    pub fn joint_from_elements(&self, elements: &[Element]) -> Result<usize> {
        let mut indices = vec![0; self.domains.len()];
        self.indices_from_elements(elements, &mut indices)?;
        Ok(self.joint_from_indices(&indices))
    }

    pub fn elements_from_joint(&self, joint: usize) -> Vec<Element> {
        self.elements_from_indices(&self.indices_vec_from_joint(joint))
    }

    /// Joint input assignment index of a cell (`0` if undirected).
    pub fn input_index_from_joint(&self, joint: usize) -> usize {
        match &self.input_dims {
            None => 0,
            Some(_) if self.canonical => joint / self.output_cardinality(),
            Some(inp) => {
                let mut index = 0;
                for (i, &d) in inp.iter().enumerate() {
                    let digit = (joint / self.strides[d]) % self.domains[d].size();
                    index += digit * self.input_strides[i];
                }
                index
            }
        }
    }

    /// Joint output assignment index of a cell.
    pub fn output_index_from_joint(&self, joint: usize) -> usize {
        match &self.input_dims {
            None => joint,
            Some(_) if self.canonical => joint % self.output_cardinality(),
            Some(_) => {
                let mut index = 0;
                for (i, &d) in self.output_dims.iter().enumerate() {
                    let digit = (joint / self.strides[d]) % self.domains[d].size();
                    index += digit * self.output_strides[i];
                }
                index
            }
        }
    }

    pub fn input_index_from_indices(&self, indices: &[usize]) -> usize {
        match &self.input_dims {
            None => 0,
            Some(inp) => {
                let mut index = 0;
                for (i, &d) in inp.iter().enumerate() {
                    index += indices[d] * self.input_strides[i];
                }
                index
            }
        }
    }

    /// Recomposes a joint index from an input/output index pair. Only
    /// meaningful in canonical order.
    pub fn joint_from_input_output(&self, input: usize, output: usize) -> usize {
        assert!(self.canonical, "canonical domain order required");
        input * self.output_cardinality() + output
    }

    /// Advances `indices` to the next tuple in joint order; returns
    /// false after the last tuple. Works without joint indexing.
    pub fn next_indices(&self, indices: &mut [usize]) -> bool {
        for d in (0..indices.len()).rev() {
            indices[d] += 1;
            if indices[d] < self.domains[d].size() {
                return true;
            }
            indices[d] = 0;
        }
        false
    }
}
