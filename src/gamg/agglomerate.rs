use std::collections::BTreeMap;
use std::sync::Arc;

use crate::addressing::LduAddressing;
use crate::matrix::LduMatrix;
use crate::VSMALL;

/// Pairwise weighted-graph agglomeration: visits cells in order and pairs
/// each unmatched cell with the unmatched neighbour it is most strongly
/// coupled to, where coupling strength is the face weight normalized by the
/// neighbour's strongest connection. Cells left without an unmatched
/// neighbour join their strongest already-matched neighbour, up to
/// `max_group_size`, or become singleton groups.
///
/// Returns the fine-cell to coarse-group restriction map and the group count.
pub fn pairwise(
    addr: &LduAddressing,
    weights: &[f64],
    max_group_size: usize,
) -> (Vec<usize>, usize) {
    assert_eq!(weights.len(), addr.n_faces());
    let n = addr.n_cells();
    let mut restrict = vec![usize::MAX; n];
    let mut group_sizes: Vec<usize> = Vec::new();

    let mut strongest = vec![0.0f64; n];
    for face in 0..addr.n_faces() {
        let w = weights[face];
        let l = addr.lower_addr()[face];
        let u = addr.upper_addr()[face];
        strongest[l] = strongest[l].max(w);
        strongest[u] = strongest[u].max(w);
    }

    let neighbours = |cell: usize| {
        addr.owner_faces(cell)
            .map(move |face| (face, addr.upper_addr()[face]))
            .chain(
                addr.neighbour_faces(cell)
                    .iter()
                    .map(move |&face| (face, addr.lower_addr()[face])),
            )
    };

    for cell in 0..n {
        if restrict[cell] != usize::MAX {
            continue;
        }
        let mut best: Option<(f64, usize)> = None;
        for (face, other) in neighbours(cell) {
            // zero-weight faces carry no coupling to merge on
            if restrict[other] != usize::MAX || weights[face] <= 0.0 {
                continue;
            }
            let score = weights[face] / strongest[other].max(VSMALL);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, other));
            }
        }
        if let Some((_, mate)) = best {
            restrict[cell] = group_sizes.len();
            restrict[mate] = group_sizes.len();
            group_sizes.push(2);
        }
    }

    for cell in 0..n {
        if restrict[cell] != usize::MAX {
            continue;
        }
        let mut best: Option<(f64, usize)> = None;
        for (face, other) in neighbours(cell) {
            let group = restrict[other];
            if group == usize::MAX
                || group_sizes[group] >= max_group_size
                || weights[face] <= 0.0
            {
                continue;
            }
            if best.map_or(true, |(s, _)| weights[face] > s) {
                best = Some((weights[face], group));
            }
        }
        match best {
            Some((_, group)) => {
                restrict[cell] = group;
                group_sizes[group] += 1;
            }
            None => {
                restrict[cell] = group_sizes.len();
                group_sizes.push(1);
            }
        }
    }

    (restrict, group_sizes.len())
}

/// Face weights driving the agglomeration: off-diagonal coefficient
/// magnitude, averaged over both orientations for asymmetric matrices.
pub fn face_weights(matrix: &LduMatrix) -> Vec<f64> {
    let upper = matrix.upper();
    let lower = matrix.lower();
    upper
        .iter()
        .zip(lower.iter())
        .map(|(u, l)| 0.5 * (u.abs() + l.abs()))
        .collect()
}

/// Builds the coarse matrix by summation (Galerkin-style with injection
/// transfer operators): group diagonals accumulate the fine diagonals plus
/// any intra-group off-diagonals; inter-group faces are deduplicated into
/// upper-triangular order with their coefficients summed. When a fine face's
/// orientation flips relative to the coarse owner/neighbour ordering, its
/// upper coefficient lands in the coarse lower array and vice versa.
pub fn agglomerate_matrix(fine: &LduMatrix, restrict: &[usize], n_coarse: usize) -> LduMatrix {
    assert_eq!(restrict.len(), fine.n_cells());

    let mut diag = vec![0.0f64; n_coarse];
    for (cell, &group) in restrict.iter().enumerate() {
        diag[group] += fine.diag()[cell];
    }

    let addr = fine.addressing();
    let upper = fine.upper();
    let lower = fine.lower();
    let mut faces: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();

    for face in 0..addr.n_faces() {
        let cl = restrict[addr.lower_addr()[face]];
        let cu = restrict[addr.upper_addr()[face]];
        if cl == cu {
            diag[cl] += upper[face] + lower[face];
        } else {
            let (key, up, lo) = if cl < cu {
                ((cl, cu), upper[face], lower[face])
            } else {
                ((cu, cl), lower[face], upper[face])
            };
            let entry = faces.entry(key).or_insert((0.0, 0.0));
            entry.0 += up;
            entry.1 += lo;
        }
    }

    let mut lower_addr = Vec::with_capacity(faces.len());
    let mut upper_addr = Vec::with_capacity(faces.len());
    let mut coarse_upper = Vec::with_capacity(faces.len());
    let mut coarse_lower = Vec::with_capacity(faces.len());
    for ((l, u), (up, lo)) in faces {
        lower_addr.push(l);
        upper_addr.push(u);
        coarse_upper.push(up);
        coarse_lower.push(lo);
    }

    let coarse_addr = Arc::new(LduAddressing::new(n_coarse, lower_addr, upper_addr));
    let lower = if fine.is_symmetric() {
        None
    } else {
        Some(coarse_lower)
    };
    LduMatrix::from_coeffs(coarse_addr, diag, coarse_upper, lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::poisson_3d;

    #[test]
    fn pairwise_reduces_and_covers_all_cells() {
        let matrix = poisson_3d(4, 4, 4);
        let weights = face_weights(&matrix);
        let (restrict, n_coarse) = pairwise(matrix.addressing(), &weights, 4);
        assert!(n_coarse < 64);
        assert!(n_coarse >= 16); // pairs plus bounded joins cannot over-coarsen
        assert!(restrict.iter().all(|&g| g < n_coarse));
        // every group non-empty
        let mut counts = vec![0usize; n_coarse];
        for &g in &restrict {
            counts[g] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0 && c <= 4));
    }

    #[test]
    fn zero_weight_faces_do_not_pair_cells() {
        // faces exist but carry no coupling: every cell must stay a
        // singleton so the hierarchy build can detect the stall
        let matrix = poisson_3d(2, 2, 2);
        let weights = vec![0.0; matrix.n_faces()];
        let (restrict, n_coarse) = pairwise(matrix.addressing(), &weights, 4);
        assert_eq!(n_coarse, 8);
        assert_eq!(restrict, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn disconnected_cells_become_singletons() {
        let addr = LduAddressing::new(4, vec![], vec![]);
        let (restrict, n_coarse) = pairwise(&addr, &[], 4);
        assert_eq!(n_coarse, 4);
        assert_eq!(restrict, vec![0, 1, 2, 3]);
    }

    // Coarse row sums must equal the fine row sums accumulated per group:
    // summation restriction preserves A * 1 exactly.
    #[test]
    fn coarse_matrix_preserves_row_sums() {
        let matrix = poisson_3d(3, 3, 3);
        let weights = face_weights(&matrix);
        let (restrict, n_coarse) = pairwise(matrix.addressing(), &weights, 4);
        let coarse = agglomerate_matrix(&matrix, &restrict, n_coarse);

        let mut fine_sums = vec![0.0; 27];
        matrix.sum_a(&mut fine_sums);
        let mut expected = vec![0.0; n_coarse];
        for (cell, &g) in restrict.iter().enumerate() {
            expected[g] += fine_sums[cell];
        }
        let mut coarse_sums = vec![0.0; n_coarse];
        coarse.sum_a(&mut coarse_sums);
        for (a, b) in coarse_sums.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn symmetric_fine_matrix_gives_symmetric_coarse_matrix() {
        let matrix = poisson_3d(3, 3, 1);
        let weights = face_weights(&matrix);
        let (restrict, n_coarse) = pairwise(matrix.addressing(), &weights, 4);
        let coarse = agglomerate_matrix(&matrix, &restrict, n_coarse);
        assert!(coarse.is_symmetric());
        assert!(coarse.n_cells() < 9);
    }

    #[test]
    fn asymmetric_orientation_flip_routes_coefficients() {
        // 3-cell chain with distinct upper/lower, agglomerating the two ends
        // into separate groups and the middle with the last cell.
        let addr = Arc::new(LduAddressing::new(3, vec![0, 1], vec![1, 2]));
        let mut fine = LduMatrix::asymmetric(addr);
        fine.diag_mut().copy_from_slice(&[4.0, 4.0, 4.0]);
        fine.upper_mut().copy_from_slice(&[-1.0, -2.0]);
        fine.lower_mut().copy_from_slice(&[-3.0, -4.0]);

        // groups: cell 0 -> 1, cells 1,2 -> 0 (flips the surviving face)
        let coarse = agglomerate_matrix(&fine, &[1, 0, 0], 2);
        assert!(!coarse.is_symmetric());
        assert_eq!(coarse.n_faces(), 1);
        // intra-group face (1,2): -2 and -4 absorbed into group 0 diagonal
        assert_eq!(coarse.diag()[0], 4.0 + 4.0 - 2.0 - 4.0);
        assert_eq!(coarse.diag()[1], 4.0);
        // fine face (0,1) has coarse owner 0 in group 1, neighbour in group 0:
        // orientation flips, so fine upper becomes coarse lower
        assert_eq!(coarse.upper()[0], -3.0);
        assert_eq!(coarse.lower()[0], -1.0);
    }
}
