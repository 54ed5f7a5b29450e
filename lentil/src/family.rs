//! Likelihood families for the variational engine.
//!
//! The linear ("normal") and logistic ("binomial") variants share the
//! same coordinate-ascent kernel; everything family-specific is behind
//! [`LikelihoodFamily`]: a statistics bundle consumed by the kernel and
//! the lower bound, the data-fit term of the bound, and (logistic only)
//! the closed-form M-step for the free variational parameters.
//!
//! Each family has its own statistics type so the bundle always matches
//! the family that produced it. The linear family's [`LinearStats`] are
//! the trivial pass-through of `xy = Xᵗy` and the Gram diagonal; the
//! logistic family rebuilds its [`LogisticStats`] from the free
//! parameters `eta` whenever they change, and its cross term regresses
//! against the slope-weighted, intercept-profiled fit rather than `Xr`
//! itself.

use crate::design::DesignMatrix;
use crate::kernel::{FitState, SweepCarry, SweepStats};
use crate::math::{log_sigmoid, slope};
use crate::quadform::{betavar, diagsq, diagsqt};
use anyhow::ensure;
use nalgebra::DVector;

/// Statistics of the Gaussian likelihood: pass-through of the response
/// projections, fixed for the whole fit.
#[derive(Debug, Clone)]
pub struct LinearStats {
    /// `Xᵗy`, length p.
    pub xy: DVector<f64>,
    /// Diagonal of `XᵗX`, length p.
    pub d: DVector<f64>,
    /// Residual variance.
    pub sigma: f64,
}

impl SweepStats for LinearStats {
    fn xy(&self) -> &DVector<f64> {
        &self.xy
    }

    fn gram_diag(&self) -> &DVector<f64> {
        &self.d
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn begin_sweep(&self, _x: &DesignMatrix, _xr: &DVector<f64>) -> SweepCarry {
        SweepCarry::identity()
    }

    fn cross_term(
        &self,
        x: &DesignMatrix,
        j: usize,
        xr: &DVector<f64>,
        _carry: &SweepCarry,
    ) -> f64 {
        x.col_dot(j, xr)
    }

    fn advance(&self, _x: &DesignMatrix, _j: usize, _delta: f64, _carry: &mut SweepCarry) {}
}

/// Statistics of the logistic quadratic bound, derived from the current
/// free parameters `eta` with the intercept profiled out analytically.
#[derive(Debug, Clone)]
pub struct LogisticStats {
    /// `Xᵗ·yhat`, length p.
    pub xy: DVector<f64>,
    /// Profiled Gram diagonal `diagsq(X, slope) - xd²/Σslope`, length p.
    pub d: DVector<f64>,
    /// Slope of the bound tangent at each `eta_i`, length n.
    pub slope: DVector<f64>,
    /// `Σ slope`, strictly positive.
    pub sum_slope: f64,
    /// Effective intercept `Σ(y - 1/2) / Σ slope`.
    pub beta0: f64,
    /// Pseudo-residual `y - 1/2 - beta0·slope`, length n.
    pub yhat: DVector<f64>,
    /// `Xᵗ·slope`, length p.
    pub xd: DVector<f64>,
}

impl SweepStats for LogisticStats {
    fn xy(&self) -> &DVector<f64> {
        &self.xy
    }

    fn gram_diag(&self) -> &DVector<f64> {
        &self.d
    }

    fn sigma(&self) -> f64 {
        1.0
    }

    fn begin_sweep(&self, _x: &DesignMatrix, xr: &DVector<f64>) -> SweepCarry {
        SweepCarry {
            weighted_fit: self.slope.component_mul(xr),
            weighted_sum: self.slope.dot(xr),
        }
    }

    /// `⟨X_j, slope ⊙ Xr⟩ - xd_j·⟨slope, Xr⟩/Σslope`: the row of the
    /// profiled precision matrix `XᵗDX - xd·xdᵗ/Σslope` applied to the
    /// current fit.
    fn cross_term(
        &self,
        x: &DesignMatrix,
        j: usize,
        _xr: &DVector<f64>,
        carry: &SweepCarry,
    ) -> f64 {
        x.col_dot(j, &carry.weighted_fit) - self.xd[j] * carry.weighted_sum / self.sum_slope
    }

    fn advance(&self, x: &DesignMatrix, j: usize, delta: f64, carry: &mut SweepCarry) {
        x.axpy_col_scaled(j, delta, &self.slope, &mut carry.weighted_fit);
        carry.weighted_sum += delta * self.xd[j];
    }
}

/// Capability interface of one likelihood family.
pub trait LikelihoodFamily {
    /// Statistics bundle this family derives for the kernel and the
    /// lower bound.
    type Stats: SweepStats;

    /// Length of the response vector (number of observations).
    fn response_len(&self) -> usize;

    /// Derive the statistics bundle for the current free parameters.
    ///
    /// The linear family ignores `eta`; the logistic family recomputes
    /// its bundle from it (once per outer iteration when free-parameter
    /// optimization is enabled).
    fn compute_stats(&self, x: &DesignMatrix, eta: &DVector<f64>) -> anyhow::Result<Self::Stats>;

    /// Data-fit term of the evidence lower bound at the current state.
    fn data_term(&self, state: &FitState, stats: &Self::Stats) -> f64;

    /// Closed-form M-step for the free parameters, or `None` if the
    /// family has none (linear).
    fn update_free_params(
        &self,
        x: &DesignMatrix,
        state: &FitState,
        stats: &Self::Stats,
    ) -> Option<DVector<f64>>;
}

/// Gaussian likelihood with known residual variance `sigma`.
#[derive(Debug, Clone)]
pub struct LinearFamily {
    y: DVector<f64>,
    sigma: f64,
}

impl LinearFamily {
    /// Create a linear family; `sigma` must be positive and finite.
    pub fn new(y: DVector<f64>, sigma: f64) -> anyhow::Result<Self> {
        ensure!(
            sigma.is_finite() && sigma > 0.0,
            "residual variance must be positive, got {}",
            sigma
        );
        Ok(LinearFamily { y, sigma })
    }
}

impl LikelihoodFamily for LinearFamily {
    type Stats = LinearStats;

    fn response_len(&self) -> usize {
        self.y.len()
    }

    fn compute_stats(&self, x: &DesignMatrix, _eta: &DVector<f64>) -> anyhow::Result<LinearStats> {
        let ones = DVector::from_element(x.nrows(), 1.0);
        Ok(LinearStats {
            xy: x.tr_mul_vec(&self.y),
            d: diagsq(x, &ones),
            sigma: self.sigma,
        })
    }

    fn data_term(&self, state: &FitState, stats: &LinearStats) -> f64 {
        let n = self.y.len() as f64;
        let sigma = self.sigma;
        let resid = &self.y - &state.xr;
        let v = betavar(&state.alpha, &state.mu, &state.s);

        -n / 2.0 * (2.0 * std::f64::consts::PI * sigma).ln()
            - resid.norm_squared() / (2.0 * sigma)
            - stats.d.dot(&v) / (2.0 * sigma)
    }

    fn update_free_params(
        &self,
        _x: &DesignMatrix,
        _state: &FitState,
        _stats: &LinearStats,
    ) -> Option<DVector<f64>> {
        None
    }
}

/// Bernoulli likelihood with logit link, bounded by the quadratic
/// (Jaakkola-Jordan) approximation with free parameters `eta`.
#[derive(Debug, Clone)]
pub struct LogisticFamily {
    y: DVector<f64>,
}

impl LogisticFamily {
    /// Create a logistic family; every response must be 0 or 1.
    pub fn new(y: DVector<f64>) -> anyhow::Result<Self> {
        ensure!(
            y.iter().all(|&v| v == 0.0 || v == 1.0),
            "logistic responses must be binary (0 or 1)"
        );
        Ok(LogisticFamily { y })
    }

    /// `Σ(y - 1/2)`, reused by the data term and the eta M-step.
    fn sum_centered(&self) -> f64 {
        self.y.iter().map(|&v| v - 0.5).sum()
    }
}

impl LikelihoodFamily for LogisticFamily {
    type Stats = LogisticStats;

    fn response_len(&self) -> usize {
        self.y.len()
    }

    /// Sufficient statistics of the profiled quadratic bound.
    ///
    /// The intercept is profiled out analytically, leaving the
    /// pseudo-residual `yhat` and the profiled Gram diagonal
    /// `xdx = diagsq(X, slope) - xd²/Σslope`.
    fn compute_stats(&self, x: &DesignMatrix, eta: &DVector<f64>) -> anyhow::Result<LogisticStats> {
        let d = eta.map(slope);
        let sum_slope = d.sum();
        ensure!(
            sum_slope > 0.0 && sum_slope.is_finite(),
            "degenerate logistic bound: sum of slopes is {}",
            sum_slope
        );

        let beta0 = self.sum_centered() / sum_slope;
        let yhat = DVector::from_fn(self.y.len(), |i, _| self.y[i] - 0.5 - beta0 * d[i]);

        let xy = x.tr_mul_vec(&yhat);
        let xd = x.tr_mul_vec(&d);
        let mut xdx = diagsq(x, &d);
        for j in 0..xdx.len() {
            xdx[j] -= xd[j] * xd[j] / sum_slope;
        }

        Ok(LogisticStats {
            xy,
            d: xdx,
            slope: d,
            sum_slope,
            beta0,
            yhat,
            xd,
        })
    }

    fn data_term(&self, state: &FitState, stats: &LogisticStats) -> f64 {
        let a = 1.0 / stats.sum_slope;
        let sum_yc = self.sum_centered();
        let xr = &state.xr;

        let mut t = 0.0;
        let mut xr_d_norm2 = 0.0;
        let mut d_dot_xr = 0.0;
        for i in 0..state.eta.len() {
            let eta = state.eta[i];
            let di = stats.slope[i];
            t += log_sigmoid(eta) + eta * (di * eta - 1.0) / 2.0;
            xr_d_norm2 += di * xr[i] * xr[i];
            d_dot_xr += di * xr[i];
        }

        let v = betavar(&state.alpha, &state.mu, &state.s);

        t + a.ln() / 2.0 + a * sum_yc * sum_yc / 2.0 + stats.yhat.dot(xr) - xr_d_norm2 / 2.0
            + a * d_dot_xr * d_dot_xr / 2.0
            - stats.d.dot(&v) / 2.0
    }

    /// Closed-form M-step for `eta` (fixed-point update, applied once
    /// per outer iteration).
    ///
    /// `mu0`, `s0` and `w` are the posterior mean, variance and
    /// coefficient covariance of the profiled intercept.
    fn update_free_params(
        &self,
        x: &DesignMatrix,
        state: &FitState,
        stats: &LogisticStats,
    ) -> Option<DVector<f64>> {
        let a = 1.0 / stats.sum_slope;
        let v = betavar(&state.alpha, &state.mu, &state.s);

        let mu0 = a * (self.sum_centered() - stats.slope.dot(&state.xr));
        let s0 = a
            * (1.0
                + a * v
                    .iter()
                    .zip(stats.xd.iter())
                    .map(|(&vj, &xdj)| vj * xdj * xdj)
                    .sum::<f64>());
        let w = DVector::from_fn(v.len(), |j, _| -a * stats.xd[j] * v[j]);

        let xw = x.mul_vec(&w);
        let dsqt = diagsqt(x, &v);

        Some(DVector::from_fn(state.eta.len(), |i, _| {
            let m = mu0 + state.xr[i];
            (m * m + s0 + dsqt[i] + 2.0 * xw[i]).max(0.0).sqrt()
        }))
    }
}
