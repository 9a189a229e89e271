use std::sync::Arc;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use factab::{DiscreteDomain, DomainIndexer, FactabError, FactorTable, SparseCursor};

fn indexer(sizes: &[usize]) -> Arc<DomainIndexer> {
    let domains = sizes.iter().map(|&n| DiscreteDomain::range(n)).collect();
    Arc::new(DomainIndexer::new(domains).unwrap())
}

fn directed(sizes: &[usize], inputs: &[usize]) -> Arc<DomainIndexer> {
    let domains = sizes.iter().map(|&n| DiscreteDomain::range(n)).collect();
    Arc::new(DomainIndexer::new_directed(domains, inputs).unwrap())
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

#[test]
fn dense_energy_lookup() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new(ix.clone());
    t.set_energies_dense(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

    assert_eq!(ix.joint_from_indices(&[1, 2]), 5);
    assert_close(t.weight_for_indices(&[1, 2]), (-5.0f64).exp());
    assert_close(t.energy_for_joint_index(5), 5.0);
    assert_eq!(t.non_zero_weights(), 6);

    t.normalize().unwrap();
    assert_close(t.total_weight(), 1.0);
    // relative weights survive normalization
    assert_close(
        t.weight_for_joint_index(5) / t.weight_for_joint_index(0),
        (-5.0f64).exp(),
    );
    assert!(t.is_normalized());
}

#[test]
fn deterministic_map() {
    let ix = directed(&[2, 2], &[0]);
    let mut t = FactorTable::new(ix);
    t.set_deterministic_output_indices(&[1, 0]).unwrap();

    assert!(t.representation().deterministic);
    assert_eq!(t.sparse_size(), 2);
    assert_eq!(t.non_zero_weights(), 2);
    assert_close(t.weight_for_indices(&[0, 1]), 1.0);
    assert_close(t.weight_for_indices(&[0, 0]), 0.0);
    assert_close(t.weight_for_indices(&[1, 0]), 1.0);
    assert_eq!(t.energy_for_indices(&[1, 1]), f64::INFINITY);

    assert_eq!(t.deterministic_output_index(0).unwrap(), 1);
    assert_eq!(t.deterministic_output_index(1).unwrap(), 0);
    let mut idx = [1, 0];
    t.eval_deterministic(&mut idx).unwrap();
    assert_eq!(idx, [1, 0]);
    let mut idx = [0, 0];
    t.eval_deterministic(&mut idx).unwrap();
    assert_eq!(idx, [0, 1]);

    assert!(t.is_deterministic_directed());
    assert!(t.is_conditional());
}

#[test]
fn sparse_bulk_weights() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[0, 3], &[0.5, 0.5]).unwrap();

    assert_eq!(t.sparse_size(), 2);
    assert_eq!(t.non_zero_weights(), 2);
    assert_close(t.weight_for_joint_index(0), 0.5);
    assert_close(t.weight_for_joint_index(1), 0.0);
    assert_close(t.weight_for_joint_index(3), 0.5);
    assert_close(t.energy_for_sparse_index(0), -(0.5f64.ln()));
    assert_eq!(t.joint_index_from_sparse_index(1), 3);
}

#[test]
fn sparse_bulk_rejects_bad_input() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    assert_eq!(
        t.set_weights_sparse(&[1, 1], &[0.5, 0.5]),
        Err(FactabError::DuplicateJointIndex(1))
    );
    assert_eq!(
        t.set_weights_sparse(&[4], &[0.5]),
        Err(FactabError::JointIndexOutOfRange {
            index: 4,
            cardinality: 4
        })
    );
    assert_eq!(
        t.set_weights_sparse(&[0, 1], &[0.5]),
        Err(FactabError::LengthMismatch(2, 1))
    );
    assert_eq!(
        t.set_weights_dense(&[1.0; 3]),
        Err(FactabError::DenseLength {
            got: 3,
            expected: 4
        })
    );
}

#[test]
fn bulk_setter_accepts_unsorted_input() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[3, 0, 2], &[0.3, 0.1, 0.2]).unwrap();
    // cells come back in ascending joint order
    assert_eq!(t.joint_index_from_sparse_index(0), 0);
    assert_eq!(t.joint_index_from_sparse_index(1), 2);
    assert_eq!(t.joint_index_from_sparse_index(2), 3);
    assert_close(t.weight_for_sparse_index(0), 0.1);
    assert_close(t.weight_for_sparse_index(2), 0.3);
}

#[test]
fn setter_inserts_into_sparse_view() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[0, 3], &[0.5, 0.5]).unwrap();

    t.set_weight_for_joint_index(2, 0.25);
    assert_eq!(t.sparse_size(), 3);
    assert_eq!(t.non_zero_weights(), 3);
    assert_eq!(t.joint_index_from_sparse_index(1), 2);
    assert_close(t.weight_for_sparse_index(1), 0.25);
}

#[test]
fn zeroing_and_compact() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[0, 3], &[0.5, 0.5]).unwrap();

    t.set_weight_for_joint_index(3, 0.0);
    // the slot stays, only the live count drops
    assert_eq!(t.sparse_size(), 2);
    assert_eq!(t.non_zero_weights(), 1);

    assert_eq!(t.compact(), 1);
    assert_eq!(t.sparse_size(), 1);
    assert_eq!(t.non_zero_weights(), 1);
    assert_close(t.weight_for_joint_index(0), 0.5);
    assert_eq!(t.compact(), 0);
}

#[test]
fn nan_energy_is_impossible_cell() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[0.1, 0.2, 0.3, 0.4]).unwrap();
    assert_eq!(t.non_zero_weights(), 4);

    t.set_energy_for_joint_index(1, f64::NAN);
    assert_eq!(t.weight_for_joint_index(1), 0.0);
    assert_eq!(t.non_zero_weights(), 3);
}

#[test]
fn elements_access_path() {
    let domains = vec![
        DiscreteDomain::from_elements(vec![10, 20]).unwrap(),
        DiscreteDomain::from_elements(vec![-1, 0, 1]).unwrap(),
    ];
    let ix = Arc::new(DomainIndexer::new(domains).unwrap());
    let mut t = FactorTable::new(ix);
    t.set_weight_for_elements(&[20, -1], 0.7).unwrap();

    assert_close(t.weight_for_indices(&[1, 0]), 0.7);
    assert_close(t.weight_for_elements(&[20, -1]).unwrap(), 0.7);
    assert_eq!(
        t.weight_for_elements(&[20, 5]),
        Err(FactabError::ElementNotInDomain(5))
    );
    let mut u = t.clone();
    assert_eq!(u.elements_for_sparse_index(0), vec![20, -1]);
}

#[test]
fn weight_slice_reads_through() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

    let s = t.weight_slice(1, &[1, 0]);
    assert_eq!(s.as_slice().unwrap(), &[3.0, 4.0, 5.0]);
    let s = t.weight_slice(0, &[0, 2]);
    assert_eq!(s.as_slice().unwrap(), &[2.0, 5.0]);
}

#[test]
fn randomize_then_normalize() {
    let mut rng = Xoshiro256StarStar::seed_from_u64(42);
    let ix = indexer(&[3, 4]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[0.0; 12]).unwrap();
    t.randomize_weights(&mut rng);

    assert_eq!(t.non_zero_weights(), 12);
    t.normalize().unwrap();
    assert_close(t.total_weight(), 1.0);
    assert!(t.is_normalized());
}

#[test]
fn normalize_rejects_directed_and_empty() {
    let mut t = FactorTable::new(directed(&[2, 2], &[0]));
    assert_eq!(t.normalize(), Err(FactabError::NotUndirected));

    let mut t = FactorTable::new(indexer(&[2, 2]));
    assert_eq!(t.normalize(), Err(FactabError::ZeroTotalWeight));
    assert_eq!(t.normalize_conditional(), Err(FactabError::NotDirected));
}

#[test]
fn normalize_conditional_blocks() {
    let ix = directed(&[2, 3], &[0]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[1.0, 1.0, 2.0, 3.0, 0.0, 1.0]).unwrap();
    t.normalize_conditional().unwrap();

    for input in 0..2 {
        let mut block = 0.0;
        for output in 0..3 {
            block += t.weight_for_indices(&[input, output]);
        }
        assert_close(block, 1.0);
    }
    assert_close(t.weight_for_indices(&[0, 2]), 0.5);
    assert_close(t.weight_for_indices(&[1, 0]), 0.75);
    assert!(t.is_conditional());
    assert!(t.is_normalized());
}

#[test]
fn normalize_conditional_zero_block_fails() {
    let ix = directed(&[2, 2], &[0]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[1.0, 1.0, 0.0, 0.0]).unwrap();
    assert_eq!(
        t.normalize_conditional(),
        Err(FactabError::ZeroWeightForInput { input_index: 1 })
    );
    // failed normalization leaves the table untouched
    assert_close(t.weight_for_joint_index(0), 1.0);
    assert!(!t.is_conditional());
}

#[test]
fn predicates_track_mutation() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[0.25; 4]).unwrap();
    t.normalize().unwrap();
    assert!(t.is_normalized());

    t.set_weight_for_joint_index(0, 0.5);
    assert!(!t.is_normalized());
}

#[test]
fn deterministic_collapse_rescales() {
    let ix = directed(&[2, 2], &[0]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[1, 2], &[0.5, 0.5]).unwrap();

    assert!(t.is_deterministic_directed());
    assert!(t.representation().deterministic);
    assert_close(t.weight_for_joint_index(1), 1.0);
    assert_eq!(t.deterministic_output_index(0).unwrap(), 1);
    assert_eq!(t.deterministic_output_index(1).unwrap(), 0);
}

#[test]
fn unequal_weights_are_not_deterministic() {
    let ix = directed(&[2, 2], &[0]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[1, 2], &[0.5, 0.25]).unwrap();
    assert!(!t.is_deterministic_directed());
    assert!(!t.representation().deterministic);

    let mut t2 = FactorTable::new(directed(&[2, 2], &[0]));
    t2.set_weights_sparse(&[0, 1], &[0.5, 0.5]).unwrap();
    // both cells share input 0
    assert!(!t2.is_deterministic_directed());
}

#[test]
fn density_counts_live_cells() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[0, 3], &[0.5, 0.0]).unwrap();
    assert_close(t.density(), 0.25);
}

#[test]
fn iter_visits_non_zero_cells_in_order() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[1, 4, 5], &[0.1, 0.0, 0.3]).unwrap();

    let cells: Vec<(usize, f64)> = t
        .iter()
        .map(|e| (e.joint_index().unwrap(), e.weight()))
        .collect();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].0, 1);
    assert_eq!(cells[1].0, 5);
    assert_close(cells[1].1, 0.3);

    let full: Vec<f64> = t.full_iter().map(|e| e.weight()).collect();
    assert_eq!(full.len(), 6);
    assert_close(full.iter().sum::<f64>(), 0.4);
}

#[test]
fn iter_works_on_dense_only_tables() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[0.0, 0.5, 0.0, 0.25]).unwrap();

    let joints: Vec<usize> = t.iter().map(|e| e.joint_index().unwrap()).collect();
    assert_eq!(joints, vec![1, 3]);
}

#[test]
fn cursor_survives_insert_before_position() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[2, 5], &[0.2, 0.5]).unwrap();

    let mut cur = SparseCursor::new();
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(2));

    // insert a cell before the cursor; it must not be revisited and
    // later cells must not be skipped
    t.set_weight_for_joint_index(0, 0.1);
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(5));
    assert!(!cur.advance(&t));
}

#[test]
fn cursor_sees_insert_after_position() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[1, 5], &[0.2, 0.5]).unwrap();

    let mut cur = SparseCursor::new();
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(1));

    t.set_weight_for_joint_index(3, 0.3);
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(3));
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(5));
    assert!(!cur.advance(&t));
}

#[test]
fn cursor_survives_removal_of_current_cell() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[1, 3, 5], &[0.2, 0.3, 0.5]).unwrap();

    let mut cur = SparseCursor::new();
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(1));

    t.set_weight_for_joint_index(1, 0.0);
    t.compact();
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(3));
    assert!(cur.advance(&t));
    assert_eq!(cur.joint_index(), Some(5));
    assert!(!cur.advance(&t));
}

#[test]
fn hashed_table_basics() {
    let ix = indexer(&[2, 3]);
    let mut t = FactorTable::new_hashed(ix);
    assert!(!t.supports_joint_indexing());

    t.set_weights_sparse_from_indices(&[vec![1, 2], vec![0, 1]], &[0.6, 0.4])
        .unwrap();
    assert_eq!(t.sparse_size(), 2);
    assert_eq!(t.non_zero_weights(), 2);
    assert_close(t.weight_for_indices(&[1, 2]), 0.6);
    assert_close(t.weight_for_indices(&[1, 1]), 0.0);
    // keys sort in joint order
    assert_eq!(t.indices_for_sparse_index(0), vec![0, 1]);
    assert_eq!(t.indices_for_sparse_index(1), vec![1, 2]);

    assert_eq!(
        t.set_weights_dense(&[0.0; 6]),
        Err(FactabError::JointIndexingUnsupported)
    );

    t.set_weight_for_indices(&[0, 0], 0.5);
    assert_eq!(t.sparse_size(), 3);
    assert_eq!(t.indices_for_sparse_index(0), vec![0, 0]);

    t.normalize().unwrap();
    assert_close(t.total_weight(), 1.0);
}

#[test]
fn hashed_table_iterates_and_compacts() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new_hashed(ix);
    t.set_weights_sparse_from_indices(&[vec![0, 0], vec![1, 1]], &[0.5, 0.5])
        .unwrap();

    t.set_weight_for_indices(&[1, 1], 0.0);
    assert_eq!(t.non_zero_weights(), 1);
    let seen: Vec<Vec<usize>> = t.iter().map(|e| e.indices().to_vec()).collect();
    assert_eq!(seen, vec![vec![0, 0]]);

    assert_eq!(t.compact(), 1);
    assert_eq!(t.sparse_size(), 1);
}

#[test]
fn hashed_directed_normalizes_per_input() {
    let ix = directed(&[2, 2], &[0]);
    let mut t = FactorTable::new_hashed(ix);
    t.set_weights_sparse_from_indices(
        &[vec![0, 0], vec![0, 1], vec![1, 0]],
        &[1.0, 3.0, 2.0],
    )
    .unwrap();
    t.normalize_conditional().unwrap();

    assert_close(t.weight_for_indices(&[0, 0]), 0.25);
    assert_close(t.weight_for_indices(&[0, 1]), 0.75);
    assert_close(t.weight_for_indices(&[1, 0]), 1.0);
    assert!(t.is_conditional());

    assert_eq!(
        t.set_deterministic_output_indices(&[0, 0]),
        Err(FactabError::RepresentationUnsupported)
    );
}

#[test]
fn convenience_constructors() {
    let t = FactorTable::new_dense_weights(indexer(&[2, 2]), &[0.1, 0.2, 0.3, 0.4]).unwrap();
    assert_close(t.weight_for_joint_index(2), 0.3);
    assert!(t.has_maximum_density());

    let t = FactorTable::new_dense_energies(indexer(&[2, 2]), &[0.0; 4]).unwrap();
    assert_close(t.weight_for_joint_index(0), 1.0);

    let t = FactorTable::new_sparse_weights(indexer(&[2, 2]), &[0, 3], &[0.5, 0.5]).unwrap();
    assert_eq!(t.sparse_size(), 2);
    assert!(!t.has_maximum_density());

    let t = FactorTable::new_sparse_energies(indexer(&[2, 2]), &[1], &[2.0]).unwrap();
    assert_close(t.weight_for_joint_index(1), (-2.0f64).exp());
}

#[test]
fn replace_sparse_values_in_slot_order() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_sparse(&[0, 2, 3], &[0.1, 0.2, 0.3]).unwrap();

    t.replace_weights_sparse(&[0.3, 0.0, 0.1]).unwrap();
    assert_close(t.weight_for_joint_index(0), 0.3);
    assert_close(t.weight_for_joint_index(2), 0.0);
    assert_close(t.weight_for_joint_index(3), 0.1);
    assert_eq!(t.sparse_size(), 3);
    assert_eq!(t.non_zero_weights(), 2);

    assert_eq!(
        t.replace_weights_sparse(&[1.0]),
        Err(FactabError::LengthMismatch(1, 3))
    );
    assert_eq!(
        t.replace_energies_sparse(&[1.0, 2.0]),
        Err(FactabError::LengthMismatch(2, 3))
    );

    t.replace_energies_sparse(&[0.0, 0.0, f64::INFINITY]).unwrap();
    assert_close(t.weight_for_joint_index(0), 1.0);
    assert_eq!(t.weight_for_joint_index(3), 0.0);
    assert_eq!(t.non_zero_weights(), 2);
}

#[test]
fn assert_conditional_reports_state() {
    let mut t = FactorTable::new(indexer(&[2, 2]));
    t.set_weights_dense(&[0.25; 4]).unwrap();
    assert_eq!(t.assert_conditional(), Err(FactabError::NotDirected));

    let mut t = FactorTable::new(directed(&[2, 2], &[0]));
    t.set_weights_dense(&[0.2, 0.8, 0.3, 0.3]).unwrap();
    assert_eq!(t.assert_conditional(), Err(FactabError::NotConditional));
    t.normalize_conditional().unwrap();
    assert_eq!(t.assert_conditional(), Ok(()));
}

#[test]
fn indexer_strides_are_row_major() {
    let ix = indexer(&[2, 3, 4]);
    assert_eq!(ix.stride(0), 12);
    assert_eq!(ix.stride(1), 4);
    assert_eq!(ix.stride(2), 1);
    assert_eq!(ix.joint_from_indices(&[1, 2, 3]), 23);
}

#[test]
fn oversized_joint_space_falls_back_to_hashed() {
    let big = 1usize << 40;
    let ix = indexer(&[big, big]);
    assert!(!ix.supports_joint_indexing());

    let mut t = FactorTable::new(ix);
    assert!(!t.supports_joint_indexing());
    t.set_weight_for_indices(&[big - 1, 7], 0.5);
    t.set_weight_for_indices(&[3, 123_456], 0.5);
    assert_eq!(t.sparse_size(), 2);
    assert_close(t.weight_for_indices(&[big - 1, 7]), 0.5);
    assert_close(t.weight_for_indices(&[0, 0]), 0.0);

    let keys: Vec<Vec<usize>> = t.iter().map(|e| e.indices().to_vec()).collect();
    assert_eq!(keys, vec![vec![3, 123_456], vec![big - 1, 7]]);

    t.normalize().unwrap();
    assert_close(t.total_weight(), 1.0);
}

#[test]
fn unchanged_write_keeps_deterministic_encoding() {
    let ix = directed(&[2, 2], &[0]);
    let mut t = FactorTable::new(ix);
    t.set_deterministic_output_indices(&[1, 0]).unwrap();

    // writing the value a cell already holds is a complete no-op
    t.set_weight_for_joint_index(1, 1.0);
    t.set_weight_for_joint_index(0, 0.0);
    t.set_energy_for_joint_index(2, 0.0);
    t.set_energy_for_joint_index(3, f64::INFINITY);
    t.set_weight_for_sparse_index(0, 1.0);
    t.set_energy_for_sparse_index(1, 0.0);
    assert!(t.representation().deterministic);
    assert_eq!(t.non_zero_weights(), 2);

    // a genuine change still escapes the map
    t.set_weight_for_joint_index(0, 0.5);
    assert!(!t.representation().deterministic);
    assert_close(t.weight_for_joint_index(0), 0.5);
    assert_close(t.weight_for_joint_index(1), 1.0);
}

#[test]
fn nan_energy_reads_back_infinite() {
    let ix = indexer(&[2, 2]);
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[0.1, 0.2, 0.3, 0.4]).unwrap();

    t.set_energy_for_joint_index(1, f64::NAN);
    assert_eq!(t.energy_for_joint_index(1), f64::INFINITY);
    assert_eq!(t.weight_for_joint_index(1), 0.0);

    let mut t = FactorTable::new(indexer(&[2, 2]));
    t.set_energies_dense(&[0.0, f64::NAN, 1.0, 2.0]).unwrap();
    assert_eq!(t.energy_for_joint_index(1), f64::INFINITY);
    assert_eq!(t.non_zero_weights(), 3);

    let mut t = FactorTable::new(indexer(&[2, 2]));
    t.set_energies_sparse(&[0, 3], &[f64::NAN, 1.0]).unwrap();
    assert_eq!(t.energy_for_joint_index(0), f64::INFINITY);
    assert_eq!(t.non_zero_weights(), 1);
}

#[test]
fn normalize_conditional_gathers_non_prefix_inputs() {
    let ix = directed(&[2, 3], &[1]);
    assert!(!ix.has_canonical_order());
    let mut t = FactorTable::new(ix);
    t.set_weights_dense(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    t.normalize_conditional().unwrap();

    // inputs run along the second dimension
    for input in 0..3 {
        let mut block = 0.0;
        for output in 0..2 {
            block += t.weight_for_indices(&[output, input]);
        }
        assert_close(block, 1.0);
    }
    assert_close(t.weight_for_indices(&[0, 0]), 0.2);
    assert_close(t.weight_for_indices(&[1, 2]), 6.0 / 9.0);
    assert!(t.is_conditional());
    assert!(t.is_normalized());
}

#[test]
fn non_prefix_input_predicates_and_scaling() {
    let ix = directed(&[2, 2], &[1]);
    let mut t = FactorTable::new(ix);
    // joints 1 -> [0,1] (input 1), 2 -> [1,0] (input 0)
    t.set_weights_sparse(&[1, 2], &[0.5, 0.5]).unwrap();

    assert!(t.is_deterministic_directed());
    // the map encoding needs the inputs up front, so no collapse
    assert!(!t.representation().deterministic);
    assert!(t.is_conditional());
    assert!(!t.is_normalized());

    t.normalize_conditional().unwrap();
    assert_close(t.weight_for_joint_index(1), 1.0);
    assert_close(t.weight_for_joint_index(2), 1.0);
    assert!(t.is_normalized());
}
