//! Read-only access to the dense design matrix.
//!
//! Genotype matrices for fine-mapping can run to hundreds of thousands
//! of columns, so the matrix may be stored in single precision to halve
//! the memory footprint. Entries are widened to `f64` inside arithmetic
//! expressions only; no double-precision copy is ever materialized.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Dense n-by-p observation matrix, read-only for the whole fit.
///
/// Rows index observations, columns index candidate variables.
#[derive(Debug, Clone)]
pub enum DesignMatrix {
    /// Full-precision storage.
    Double(DMatrix<f64>),
    /// Reduced-precision storage; widened to `f64` on read.
    Single(DMatrix<f32>),
}

impl DesignMatrix {
    /// Wrap a double-precision matrix.
    pub fn from_f64(x: DMatrix<f64>) -> Self {
        DesignMatrix::Double(x)
    }

    /// Wrap a single-precision matrix.
    pub fn from_f32(x: DMatrix<f32>) -> Self {
        DesignMatrix::Single(x)
    }

    /// Number of observations (rows).
    pub fn nrows(&self) -> usize {
        match self {
            DesignMatrix::Double(x) => x.nrows(),
            DesignMatrix::Single(x) => x.nrows(),
        }
    }

    /// Number of candidate variables (columns).
    pub fn ncols(&self) -> usize {
        match self {
            DesignMatrix::Double(x) => x.ncols(),
            DesignMatrix::Single(x) => x.ncols(),
        }
    }

    /// Inner product `⟨X[:,j], v⟩` with `v` of length n.
    pub fn col_dot(&self, j: usize, v: &DVector<f64>) -> f64 {
        match self {
            DesignMatrix::Double(x) => x.column(j).dot(v),
            DesignMatrix::Single(x) => x
                .column(j)
                .iter()
                .zip(v.iter())
                .map(|(&a, &b)| a as f64 * b)
                .sum(),
        }
    }

    /// Rank-1 update `out += a * X[:,j]` with `out` of length n.
    pub fn axpy_col(&self, j: usize, a: f64, out: &mut DVector<f64>) {
        match self {
            DesignMatrix::Double(x) => {
                for (o, &v) in out.iter_mut().zip(x.column(j).iter()) {
                    *o += a * v;
                }
            }
            DesignMatrix::Single(x) => {
                for (o, &v) in out.iter_mut().zip(x.column(j).iter()) {
                    *o += a * v as f64;
                }
            }
        }
    }

    /// Weighted rank-1 update `out += a * (w ⊙ X[:,j])` with `w` and
    /// `out` of length n.
    pub fn axpy_col_scaled(&self, j: usize, a: f64, w: &DVector<f64>, out: &mut DVector<f64>) {
        match self {
            DesignMatrix::Double(x) => {
                for ((o, &v), &wi) in out.iter_mut().zip(x.column(j).iter()).zip(w.iter()) {
                    *o += a * wi * v;
                }
            }
            DesignMatrix::Single(x) => {
                for ((o, &v), &wi) in out.iter_mut().zip(x.column(j).iter()).zip(w.iter()) {
                    *o += a * wi * v as f64;
                }
            }
        }
    }

    /// Matrix-vector product `X * beta` with `beta` of length p.
    ///
    /// Accumulates column by column (column-major storage order).
    pub fn mul_vec(&self, beta: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.nrows());
        for j in 0..self.ncols() {
            let b = beta[j];
            if b != 0.0 {
                self.axpy_col(j, b, &mut out);
            }
        }
        out
    }

    /// Transposed product `Xᵗ * v`, computed as `(vᵗX)ᵗ` one column at a
    /// time so that `Xᵗ` is never formed; columns reduced in parallel.
    pub fn tr_mul_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let p = self.ncols();
        let out: Vec<f64> = (0..p).into_par_iter().map(|j| self.col_dot(j, v)).collect();
        DVector::from_vec(out)
    }
}
