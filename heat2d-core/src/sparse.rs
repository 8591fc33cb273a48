//! Sparse matrix operations.
//!
//! The global system is accumulated as (row, col, value) triplets and
//! converted to CSR once assembly is complete.

use crate::error::{Error, Result};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Add a value at (row, col). Duplicates are summed during conversion.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");

        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Append the triplets of one element contribution.
    pub fn extend(&mut self, triplets: &[(usize, usize, f64)]) {
        for &(row, col, value) in triplets {
            self.add(row, col, value);
        }
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Matrix dimensions.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(self) -> Result<CsrMatrix> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.rows,
            self.cols,
            self.values,
        )
        .map_err(|e| Error::Assembly(format!("invalid triplet data: {e}")))?;

        // Duplicates are summed by the conversion
        Ok(CsrMatrix::from(&coo))
    }
}

/// Largest relative asymmetry `|a_ij - a_ji| / max(|a_ij|, |a_ji|, 1)`.
pub fn max_asymmetry(matrix: &CsrMatrix) -> f64 {
    let transpose = matrix.transpose();
    let mut worst: f64 = 0.0;
    for (row, col, &value) in matrix.triplet_iter() {
        let mirrored = transpose
            .get_entry(row, col)
            .map(|e| e.into_value())
            .unwrap_or(0.0);
        let scale = value.abs().max(mirrored.abs()).max(1.0);
        worst = worst.max((value - mirrored).abs() / scale);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triplet_to_csr() {
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 1, 2.0);
        triplet.add(2, 2, 3.0);
        triplet.add(0, 1, 0.5);
        triplet.add(1, 0, 0.5);

        let csr = triplet.to_csr().unwrap();
        assert_eq!(csr.nrows(), 3);
        assert_eq!(csr.ncols(), 3);
        assert_eq!(csr.nnz(), 5);
        assert!(max_asymmetry(&csr) < 1e-15);
    }

    #[test]
    fn test_duplicate_summation() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 0, 2.0); // Duplicate - should sum
        triplet.extend(&[(0, 0, 3.0), (1, 1, 0.0)]);
        assert_eq!(triplet.nnz(), 3);

        let csr = triplet.to_csr().unwrap();
        let dense = nalgebra::DMatrix::from(&csr);
        assert!((dense[(0, 0)] - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_asymmetry_detected() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 1.0);
        let csr = triplet.to_csr().unwrap();
        assert!((max_asymmetry(&csr) - 0.5).abs() < 1e-12);
    }
}
