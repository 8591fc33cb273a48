//! Linear system solvers.
//!
//! Provides direct solvers for the assembled system `K u = f`.
//!
//! # Solver Backends
//!
//! - [`FaerCholeskySolver`]: Sparse Cholesky factorization using the faer library.
//!   Stiffness matrices of the heat equation with at least one Dirichlet
//!   marker are symmetric positive definite.
//! - [`DenseLUSolver`]: nalgebra dense LU, for small systems and cross-checks.

use crate::error::{Error, Result};
use crate::sparse::CsrMatrix;
use faer::linalg::cholesky::llt::factor::LltError;
use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use serde::{Deserialize, Serialize};

/// Linear solver interface.
pub trait Solver: Send + Sync {
    /// Solve the linear system Ax = b.
    ///
    /// # Arguments
    ///
    /// * `matrix` - System matrix (K)
    /// * `rhs` - Right-hand side vector (f)
    ///
    /// # Returns
    ///
    /// Solution vector (u)
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Factorization used by [`select_solver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    /// Sparse Cholesky (faer).
    #[default]
    Cholesky,
    /// Dense LU (nalgebra).
    DenseLu,
}

/// Solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Factorization to use.
    pub backend: SolverBackend,
    /// Assembly threads (0 = Rayon default).
    pub num_threads: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Cholesky,
            num_threads: 8,
        }
    }
}

/// Common checks before factorizing.
fn check_system(matrix: &CsrMatrix, rhs: &[f64]) -> Result<usize> {
    let n = matrix.nrows();
    if n == 0 {
        return Err(Error::Solver("empty system".into()));
    }

    if n != matrix.ncols() {
        return Err(Error::Solver("Matrix must be square".into()));
    }

    if n != rhs.len() {
        return Err(Error::Solver(format!(
            "RHS size mismatch: {} rows, {} entries",
            n,
            rhs.len()
        )));
    }
    Ok(n)
}

/// Reject solutions with NaN or infinite entries.
fn check_finite(solution: Vec<f64>) -> Result<Vec<f64>> {
    match solution.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(Error::SingularMatrix(format!(
            "solution entry {} is not finite",
            i
        ))),
        None => Ok(solution),
    }
}

/// Direct solver using nalgebra dense LU factorization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLUSolver;

impl DenseLUSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for DenseLUSolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        use nalgebra::{DMatrix, DVector};

        check_system(matrix, rhs)?;

        let dense = DMatrix::from(matrix);
        let b = DVector::from_column_slice(rhs);

        let solution = dense
            .lu()
            .solve(&b)
            .ok_or_else(|| Error::SingularMatrix("LU factorization failed".into()))?;

        check_finite(solution.as_slice().to_vec())
    }

    fn name(&self) -> &str {
        "nalgebra dense LU"
    }
}

/// Convert nalgebra-sparse CSR matrix to faer SparseColMat (CSC format).
///
/// Each CSR row is scattered into the CSC columns, which keeps row indices
/// sorted within every column.
fn csr_to_faer_csc(csr: &CsrMatrix) -> SparseColMat<usize, f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();
    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut col_offsets = vec![0usize; ncols + 1];
    for &col in col_indices {
        col_offsets[col + 1] += 1;
    }
    for i in 0..ncols {
        col_offsets[i + 1] += col_offsets[i];
    }

    let nnz = values.len();
    let mut row_indices = vec![0usize; nnz];
    let mut csc_values = vec![0.0f64; nnz];
    let mut next = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            row_indices[next[col]] = row;
            csc_values[next[col]] = values[idx];
            next[col] += 1;
        }
    }

    // SAFETY: offsets are non-decreasing, end at nnz, and rows are sorted and
    // unique per column because the CSR input is.
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, row_indices),
            csc_values,
        )
    }
}

/// Sparse Cholesky solver using the faer library.
///
/// Uses faer's sparse LLᵀ factorization of the lower triangle. A matrix
/// that is not positive definite (e.g. no Dirichlet marker, so constants
/// are in the kernel) fails with [`Error::SingularMatrix`].
///
/// # Example
///
/// ```ignore
/// let solver = FaerCholeskySolver::new();
/// let solution = solver.solve(&stiffness_matrix, &load_vector)?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerCholeskySolver;

impl FaerCholeskySolver {
    /// Create a new sparse Cholesky solver.
    pub fn new() -> Self {
        Self
    }
}

impl Solver for FaerCholeskySolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_system(matrix, rhs)?;

        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower)
            .map_err(|_| Error::Solver("Symbolic Cholesky analysis failed".into()))?;

        let llt = Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower).map_err(
            |e| match e {
                SparseLltError::Generic(err) => {
                    Error::Solver(format!("Sparse Cholesky error: {:?}", err))
                }
                SparseLltError::Numeric(LltError::NonPositivePivot { index }) => {
                    Error::SingularMatrix(format!(
                        "Matrix is not positive definite at pivot {}",
                        index
                    ))
                }
            },
        )?;

        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        llt.solve_in_place(x.as_mut());

        check_finite((0..n).map(|i| x[(i, 0)]).collect())
    }

    fn name(&self) -> &str {
        "faer Sparse Cholesky (LLᵀ)"
    }
}

/// Select solver based on configuration.
pub fn select_solver(config: &SolverConfig) -> Box<dyn Solver> {
    match config.backend {
        SolverBackend::Cholesky => Box::new(FaerCholeskySolver::new()),
        SolverBackend::DenseLu => Box::new(DenseLUSolver::new()),
    }
}

/// Euclidean norm of `A x - b`.
pub fn residual_norm(matrix: &CsrMatrix, x: &[f64], rhs: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (row, b) in rhs.iter().enumerate().take(matrix.nrows()) {
        let lane = matrix.row(row);
        let ax: f64 = lane
            .col_indices()
            .iter()
            .zip(lane.values())
            .map(|(&col, &v)| v * x[col])
            .sum();
        sum += (ax - b).powi(2);
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::TripletMatrix;
    use approx::assert_relative_eq;

    fn spd_2x2() -> CsrMatrix {
        // [4 2; 2 3]
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 4.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 3.0);
        triplet.to_csr().unwrap()
    }

    #[test]
    fn test_dense_lu_simple() {
        // Simple 2x2 system: [2 1; 1 3] * [x; y] = [1; 2]
        // Solution: x = 1/5, y = 3/5
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 0, 1.0);
        triplet.add(1, 1, 3.0);

        let matrix = triplet.to_csr().unwrap();
        let solution = DenseLUSolver::new().solve(&matrix, &[1.0, 2.0]).unwrap();

        assert_relative_eq!(solution[0], 0.2, epsilon = 1e-10);
        assert_relative_eq!(solution[1], 0.6, epsilon = 1e-10);
    }

    #[test]
    fn test_empty_system_is_an_error() {
        let matrix = TripletMatrix::new(0, 0).to_csr().unwrap();
        assert!(matches!(
            DenseLUSolver::new().solve(&matrix, &[]),
            Err(Error::Solver(_))
        ));
        assert!(matches!(
            FaerCholeskySolver::new().solve(&matrix, &[]),
            Err(Error::Solver(_))
        ));
    }

    #[test]
    fn test_faer_cholesky_simple_spd() {
        // Solution: x = 0.25, y = 1.5
        let solution = FaerCholeskySolver::new()
            .solve(&spd_2x2(), &[4.0, 5.0])
            .unwrap();

        assert_relative_eq!(solution[0], 0.25, epsilon = 1e-10);
        assert_relative_eq!(solution[1], 1.5, epsilon = 1e-10);
    }

    #[test]
    fn test_faer_cholesky_3x3_spd() {
        // A = [4 2 0; 2 5 2; 0 2 3], b = [2; 8; 5]
        // Solution: x = [-3/16, 11/8, 3/4]
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 4.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 5.0);
        triplet.add(1, 2, 2.0);
        triplet.add(2, 1, 2.0);
        triplet.add(2, 2, 3.0);

        let matrix = triplet.to_csr().unwrap();
        let rhs = [2.0, 8.0, 5.0];
        let solution = FaerCholeskySolver::new().solve(&matrix, &rhs).unwrap();

        let expected = [-0.1875, 1.375, 0.75];
        for i in 0..3 {
            assert_relative_eq!(solution[i], expected[i], epsilon = 1e-10);
        }
        assert!(residual_norm(&matrix, &solution, &rhs) < 1e-12);
    }

    #[test]
    fn test_faer_cholesky_rhs_mismatch() {
        let result = FaerCholeskySolver::new().solve(&spd_2x2(), &[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(Error::Solver(_))));
    }

    #[test]
    fn test_faer_cholesky_not_positive_definite() {
        // Eigenvalues are 3 and -1
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 1.0);

        let matrix = triplet.to_csr().unwrap();
        let result = FaerCholeskySolver::new().solve(&matrix, &[1.0, 1.0]);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_solver_failure());
    }

    #[test]
    fn test_backends_agree() {
        // Banded SPD matrix like a 1D Laplacian
        let mut triplet = TripletMatrix::new(6, 6);
        for i in 0..6 {
            triplet.add(i, i, 4.0);
        }
        for i in 0..5 {
            triplet.add(i, i + 1, -1.0);
            triplet.add(i + 1, i, -1.0);
        }
        let matrix = triplet.to_csr().unwrap();
        let rhs = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0];

        let sparse = select_solver(&SolverConfig::default())
            .solve(&matrix, &rhs)
            .unwrap();
        let dense = select_solver(&SolverConfig {
            backend: SolverBackend::DenseLu,
            num_threads: 1,
        })
        .solve(&matrix, &rhs)
        .unwrap();

        for (a, b) in sparse.iter().zip(&dense) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_select_solver_default_uses_faer() {
        let solver = select_solver(&SolverConfig::default());
        assert_eq!(solver.name(), "faer Sparse Cholesky (LLᵀ)");
    }
}
