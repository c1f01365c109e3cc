//! Rectangular linear-assignment solver
//!
//! Greedy assignment after row/column reduction. Not optimal for adversarial
//! cost matrices, but the tracker only ever produces small ones (at most
//! `max_tracks` x detections) and every returned pair is re-checked against
//! the IoU threshold by the caller, so a mis-assignment is dropped rather
//! than propagated.

use ndarray::{Array2, Axis};

/// Solve the assignment problem on a non-negative cost matrix.
///
/// Returns two equal-length index vectors naming matched `(row, col)` pairs.
/// No column is assigned twice; rows whose only remaining candidates are
/// infinite-cost are skipped. An empty matrix yields empty vectors.
#[must_use]
pub fn solve(cost_matrix: &Array2<f32>) -> (Vec<usize>, Vec<usize>) {
    if cost_matrix.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let (n_rows, n_cols) = cost_matrix.dim();
    let transposed = n_rows > n_cols;
    let mut cost = if transposed {
        cost_matrix.t().to_owned()
    } else {
        cost_matrix.clone()
    };
    let (n_rows, n_cols) = cost.dim();

    // Row reduction, then column reduction
    for mut row in cost.axis_iter_mut(Axis(0)) {
        let min = row.iter().copied().fold(f32::INFINITY, f32::min);
        if min.is_finite() {
            row.mapv_inplace(|v| v - min);
        }
    }
    for mut col in cost.axis_iter_mut(Axis(1)) {
        let min = col.iter().copied().fold(f32::INFINITY, f32::min);
        if min.is_finite() {
            col.mapv_inplace(|v| v - min);
        }
    }

    // Greedy: each row takes the cheapest still-unassigned column
    let mut row_ind = Vec::with_capacity(n_rows.min(n_cols));
    let mut col_ind = Vec::with_capacity(n_rows.min(n_cols));
    let mut assigned = vec![false; n_cols];

    for row in 0..n_rows {
        let mut best_col = None;
        let mut best_cost = f32::INFINITY;
        for col in 0..n_cols {
            if assigned[col] {
                continue;
            }
            let c = cost[[row, col]];
            if c < best_cost {
                best_cost = c;
                best_col = Some(col);
            }
        }
        if let Some(col) = best_col {
            row_ind.push(row);
            col_ind.push(col);
            assigned[col] = true;
        }
    }

    if transposed {
        (col_ind, row_ind)
    } else {
        (row_ind, col_ind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_empty_matrix() {
        let cost = Array2::<f32>::zeros((0, 0));
        let (rows, cols) = solve(&cost);
        assert!(rows.is_empty());
        assert!(cols.is_empty());
    }

    #[test]
    fn test_identity_preference() {
        let cost = array![[0.0, 1.0], [1.0, 0.0]];
        let (rows, cols) = solve(&cost);
        assert_eq!(rows, vec![0, 1]);
        assert_eq!(cols, vec![0, 1]);
    }

    #[test]
    fn test_no_column_double_assigned() {
        let cost = array![[0.1, 0.2, 0.3], [0.1, 0.2, 0.3], [0.1, 0.2, 0.3]];
        let (rows, cols) = solve(&cost);
        assert_eq!(rows.len(), 3);
        let mut seen = cols.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), cols.len());
    }

    #[test]
    fn test_wide_matrix() {
        // 2 rows, 3 columns: both rows get a distinct column
        let cost = array![[0.9, 0.1, 0.5], [0.2, 0.1, 0.9]];
        let (rows, cols) = solve(&cost);
        assert_eq!(rows.len(), 2);
        assert_ne!(cols[0], cols[1]);
        // Row 0's cheapest reduced column is 1
        assert_eq!(cols[rows.iter().position(|&r| r == 0).unwrap()], 1);
    }

    #[test]
    fn test_tall_matrix_transposes() {
        // 3 rows, 2 columns: only 2 pairs possible
        let cost = array![[0.1, 0.9], [0.9, 0.1], [0.5, 0.5]];
        let (rows, cols) = solve(&cost);
        assert_eq!(rows.len(), 2);
        assert_eq!(cols.len(), 2);
        for &r in &rows {
            assert!(r < 3);
        }
        for &c in &cols {
            assert!(c < 2);
        }
    }

    #[test]
    fn test_infinite_cost_rows_skipped() {
        let cost = array![[f32::INFINITY, f32::INFINITY], [0.0, 1.0]];
        let (rows, cols) = solve(&cost);
        assert_eq!(rows, vec![1]);
        assert_eq!(cols, vec![0]);
    }
}
