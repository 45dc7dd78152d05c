// src/linalg_backends.rs

use ndarray::{Array2, ArrayView2};
use ndarray_linalg::{Cholesky as NdLinalgCholesky, Diag, SolveTriangular as NdLinalgSolveTriangular, UPLO};
use std::error::Error;

/// Error type returned by backend operations.
pub type BackendError = Box<dyn Error + Send + Sync>;

/// Cholesky factorization of a symmetric positive-definite matrix.
pub trait BackendCholesky {
    /// Returns the lower-triangular factor `L` with `L L^T = matrix`.
    /// Fails when `matrix` is not positive definite.
    fn cholesky_lower(&self, matrix: ArrayView2<f64>) -> Result<Array2<f64>, BackendError>;
}

/// Forward substitution against a lower-triangular matrix.
pub trait BackendTriangularSolve {
    /// Solves `lower * X = rhs` for `X`; `rhs` has one right-hand side per column.
    fn solve_lower_triangular(
        &self,
        lower: ArrayView2<f64>,
        rhs: ArrayView2<f64>,
    ) -> Result<Array2<f64>, BackendError>;
}

/// LAPACK-backed implementation through `ndarray-linalg`.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> BackendError {
    Box::new(e)
}

impl BackendCholesky for NdarrayLinAlgBackend {
    fn cholesky_lower(&self, matrix: ArrayView2<f64>) -> Result<Array2<f64>, BackendError> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err("matrix contains non-finite entries".into());
        }
        matrix.cholesky(UPLO::Lower).map_err(to_dyn_error)
    }
}

impl BackendTriangularSolve for NdarrayLinAlgBackend {
    fn solve_lower_triangular(
        &self,
        lower: ArrayView2<f64>,
        rhs: ArrayView2<f64>,
    ) -> Result<Array2<f64>, BackendError> {
        lower
            .solve_triangular(UPLO::Lower, Diag::NonUnit, &rhs.to_owned())
            .map_err(to_dyn_error)
    }
}

/// `ln det(A)` from the Cholesky factor of `A`: `2 * sum(ln L_ii)`.
pub fn log_det_from_cholesky(lower: ArrayView2<f64>) -> f64 {
    2.0 * lower.diag().iter().map(|v| v.ln()).sum::<f64>()
}
