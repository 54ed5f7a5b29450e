//! Weighted quadratic-form diagonals.
//!
//! Both primitives avoid materializing `XᵗX` (p can be in the hundreds
//! of thousands):
//!
//! ```text
//! diagsq(X, w)[j]  = Σ_i w_i X_ij²     = diag(Xᵗ diag(w) X)
//! diagsqt(X, v)[i] = Σ_j v_j X_ij²     = diag(X diag(v) Xᵗ)
//! ```

use crate::design::DesignMatrix;
use nalgebra::DVector;
use rayon::prelude::*;

/// Diagonal of `Xᵗ diag(w) X` (length p), columns reduced in parallel.
pub fn diagsq(x: &DesignMatrix, w: &DVector<f64>) -> DVector<f64> {
    let p = x.ncols();
    let out: Vec<f64> = (0..p)
        .into_par_iter()
        .map(|j| match x {
            DesignMatrix::Double(m) => m
                .column(j)
                .iter()
                .zip(w.iter())
                .map(|(&a, &wi)| wi * a * a)
                .sum(),
            DesignMatrix::Single(m) => m
                .column(j)
                .iter()
                .zip(w.iter())
                .map(|(&a, &wi)| {
                    let a = a as f64;
                    wi * a * a
                })
                .sum(),
        })
        .collect();
    DVector::from_vec(out)
}

/// Diagonal of `X diag(v) Xᵗ` (length n), accumulated column by column.
pub fn diagsqt(x: &DesignMatrix, v: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(x.nrows());
    for j in 0..x.ncols() {
        let vj = v[j];
        if vj == 0.0 {
            continue;
        }
        match x {
            DesignMatrix::Double(m) => {
                for (o, &a) in out.iter_mut().zip(m.column(j).iter()) {
                    *o += vj * a * a;
                }
            }
            DesignMatrix::Single(m) => {
                for (o, &a) in out.iter_mut().zip(m.column(j).iter()) {
                    let a = a as f64;
                    *o += vj * a * a;
                }
            }
        }
    }
    out
}

/// Total posterior variance of each coefficient under the
/// spike-and-slab mixture:
///
/// ```text
/// betavar[j] = alpha_j s_j + alpha_j (1 - alpha_j) mu_j²
/// ```
///
/// This is larger than the slab variance `s` alone whenever inclusion
/// is uncertain (`0 < alpha < 1`).
pub fn betavar(alpha: &DVector<f64>, mu: &DVector<f64>, s: &DVector<f64>) -> DVector<f64> {
    let p = alpha.len();
    DVector::from_fn(p, |j, _| {
        alpha[j] * s[j] + alpha[j] * (1.0 - alpha[j]) * mu[j] * mu[j]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    #[test]
    fn diagonals_match_dense_reference() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, -1.0, 0.5, 3.0, -2.0]);
        let w = DVector::from_vec(vec![0.5, 1.0, 2.0]);
        let v = DVector::from_vec(vec![1.5, 0.25]);

        let gram = x.transpose() * DMatrix::from_diagonal(&w) * &x;
        let outer = &x * DMatrix::from_diagonal(&v) * x.transpose();

        let design = DesignMatrix::from_f64(x.clone());
        let dsq = diagsq(&design, &w);
        let dsqt = diagsqt(&design, &v);

        for j in 0..2 {
            assert_abs_diff_eq!(dsq[j], gram[(j, j)], epsilon = 1e-12);
        }
        for i in 0..3 {
            assert_abs_diff_eq!(dsqt[i], outer[(i, i)], epsilon = 1e-12);
        }
    }

    #[test]
    fn betavar_degenerate_cases() {
        let mu = DVector::from_vec(vec![2.0, -1.0]);
        let s = DVector::from_vec(vec![0.5, 0.25]);

        // certain inclusion: variance is the slab variance
        let v1 = betavar(&DVector::from_element(2, 1.0), &mu, &s);
        assert_abs_diff_eq!(v1[0], 0.5);
        assert_abs_diff_eq!(v1[1], 0.25);

        // certain exclusion: no variance at all
        let v0 = betavar(&DVector::from_element(2, 0.0), &mu, &s);
        assert_abs_diff_eq!(v0[0], 0.0);
        assert_abs_diff_eq!(v0[1], 0.0);

        // half inclusion picks up the mixture spread
        let vh = betavar(&DVector::from_element(2, 0.5), &mu, &s);
        assert_abs_diff_eq!(vh[0], 0.5 * 0.5 + 0.25 * 4.0, epsilon = 1e-12);
    }
}
