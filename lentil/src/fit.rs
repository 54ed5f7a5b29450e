//! Outer driver: alternating coordinate sweeps with convergence control.
//!
//! Per iteration the driver snapshots the state, evaluates the lower
//! bound, runs one Gauss-Seidel sweep (forward on odd iterations,
//! reverse on even ones), optionally re-optimizes the logistic free
//! parameters and the slab variance, and re-evaluates the bound. A
//! bound decrease triggers a rollback to the snapshot and a terminal
//! stop; it is a reportable stopping condition, not an error.

use crate::design::DesignMatrix;
use crate::family::{LikelihoodFamily, LinearFamily, LogisticFamily};
use crate::kernel::{coordinate_sweep, refresh_s, FitState, SweepStats};
use crate::lower_bound::lower_bound;
use anyhow::ensure;
use log::{debug, info};
use nalgebra::DVector;

/// Spike-and-slab prior for one hyperparameter setting.
#[derive(Debug, Clone)]
pub struct PriorSpec {
    /// Prior variance of included coefficients (scaled by the residual
    /// variance in the linear family). Must be positive.
    pub sa: f64,
    /// Prior log-odds of inclusion, one per variable.
    pub logodds: DVector<f64>,
}

impl PriorSpec {
    /// Same prior log-odds for every one of `p` variables.
    pub fn uniform(sa: f64, logodds: f64, p: usize) -> Self {
        PriorSpec {
            sa,
            logodds: DVector::from_element(p, logodds),
        }
    }
}

/// Initial variational parameters; `None` fields get defaults
/// (`alpha = 1/2`, `mu = 0`, `eta = 1`).
#[derive(Debug, Clone, Default)]
pub struct FitInit {
    /// Initial inclusion probabilities, length p.
    pub alpha: Option<DVector<f64>>,
    /// Initial conditional posterior means, length p.
    pub mu: Option<DVector<f64>>,
    /// Initial free parameters of the logistic bound, length n.
    pub eta: Option<DVector<f64>>,
}

/// Tolerances, caps, and update toggles for one fit.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Convergence tolerance on `max|Δalpha|` per iteration. Default: 1e-4
    pub tol: f64,
    /// Iteration cap. Default: 10_000
    pub max_iter: usize,
    /// Re-optimize the logistic free parameters each iteration (ignored
    /// by the linear family). Default: true
    pub update_free_params: bool,
    /// MAP re-estimation of the slab variance `sa` each iteration.
    /// Default: false
    pub update_sa: bool,
    /// Prior scale of the slab variance for the MAP update. Default: 1.0
    pub sa0: f64,
    /// Prior pseudo-count for the MAP update. Default: 10.0
    pub n0: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            tol: 1e-4,
            max_iter: 10_000,
            update_free_params: true,
            update_sa: false,
            sa0: 1.0,
            n0: 10.0,
        }
    }
}

/// Terminal state of the driver; none of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max|Δalpha|` fell below the tolerance.
    Converged,
    /// The lower bound decreased; the previous state was restored.
    DecreasingBound,
    /// The iteration cap was reached before the tolerance.
    MaxIterations,
}

/// Per-iteration diagnostics handed to the observer callback.
#[derive(Debug, Clone)]
pub struct IterationInfo {
    /// Outer iteration number, starting at 1.
    pub iter: usize,
    /// Lower bound after this iteration's sweep.
    pub lower_bound: f64,
    /// Largest absolute change in `alpha` over this iteration.
    pub max_delta_alpha: f64,
    /// Number of variables with `alpha > 1/2`.
    pub num_included: usize,
}

/// Result of one fit: the variational parameters at the stopping point.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Posterior inclusion probabilities, length p.
    pub alpha: DVector<f64>,
    /// Conditional posterior means, length p.
    pub mu: DVector<f64>,
    /// Conditional posterior variances, length p.
    pub s: DVector<f64>,
    /// Fitted values `X·(alpha ⊙ mu)`, length n.
    pub xr: DVector<f64>,
    /// Free parameters of the logistic bound, length n.
    pub eta: DVector<f64>,
    /// Slab variance (re-estimated when `update_sa` is on).
    pub sa: f64,
    /// Lower bound at the stopping point.
    pub lower_bound: f64,
    /// Why the driver stopped.
    pub stop: StopReason,
    /// Number of outer iterations performed.
    pub iterations: usize,
}

/// Fit the linear-likelihood variant for one hyperparameter setting.
///
/// `sigma` is the residual variance; the slab variance is `sa·sigma`.
pub fn fit_linear(
    x: &DesignMatrix,
    y: &DVector<f64>,
    sigma: f64,
    prior: &PriorSpec,
    init: FitInit,
    options: &FitOptions,
) -> anyhow::Result<FitOutcome> {
    let family = LinearFamily::new(y.clone(), sigma)?;
    fit(&family, x, prior, init, options)
}

/// Fit the logistic-likelihood variant for one hyperparameter setting.
pub fn fit_logistic(
    x: &DesignMatrix,
    y: &DVector<f64>,
    prior: &PriorSpec,
    init: FitInit,
    options: &FitOptions,
) -> anyhow::Result<FitOutcome> {
    let family = LogisticFamily::new(y.clone())?;
    fit(&family, x, prior, init, options)
}

/// Fit one hyperparameter setting, reporting progress through the
/// default `log::debug!` observer.
pub fn fit<F: LikelihoodFamily>(
    family: &F,
    x: &DesignMatrix,
    prior: &PriorSpec,
    init: FitInit,
    options: &FitOptions,
) -> anyhow::Result<FitOutcome> {
    let out = fit_with_monitor(family, x, prior, init, options, |it: &IterationInfo| {
        debug!(
            "iter {:4}: logw = {:.6}, max|dalpha| = {:.3e}, included = {}",
            it.iter, it.lower_bound, it.max_delta_alpha, it.num_included
        );
    })?;
    info!(
        "stopped after {} iteration(s) ({:?}), logw = {:.6}",
        out.iterations, out.stop, out.lower_bound
    );
    Ok(out)
}

/// Fit one hyperparameter setting with an explicit observer invoked
/// once per outer iteration.
///
/// Deterministic given identical inputs and floating-point environment.
/// Contract violations (shape mismatches, non-positive `sa` or
/// tolerance) are reported before any iteration begins; degenerate
/// statistics (`Σ slope ≤ 0`) fail fast inside the family.
pub fn fit_with_monitor<F, M>(
    family: &F,
    x: &DesignMatrix,
    prior: &PriorSpec,
    init: FitInit,
    options: &FitOptions,
    mut monitor: M,
) -> anyhow::Result<FitOutcome>
where
    F: LikelihoodFamily,
    M: FnMut(&IterationInfo),
{
    let n = x.nrows();
    let p = x.ncols();

    ensure!(
        family.response_len() == n,
        "response length {} does not match {} rows of X",
        family.response_len(),
        n
    );
    ensure!(
        prior.logodds.len() == p,
        "logodds length {} does not match {} columns of X",
        prior.logodds.len(),
        p
    );
    ensure!(
        prior.sa.is_finite() && prior.sa > 0.0,
        "prior slab variance must be positive, got {}",
        prior.sa
    );
    ensure!(options.tol > 0.0, "tolerance must be positive");
    ensure!(options.max_iter >= 1, "iteration cap must be at least 1");

    let alpha = match init.alpha {
        Some(a) => {
            ensure!(a.len() == p, "initial alpha has length {}, expected {}", a.len(), p);
            a
        }
        None => DVector::from_element(p, 0.5),
    };
    let mu = match init.mu {
        Some(m) => {
            ensure!(m.len() == p, "initial mu has length {}, expected {}", m.len(), p);
            m
        }
        None => DVector::zeros(p),
    };
    let eta = match init.eta {
        Some(e) => {
            ensure!(e.len() == n, "initial eta has length {}, expected {}", e.len(), n);
            e
        }
        None => DVector::from_element(n, 1.0),
    };

    let mut stats = family.compute_stats(x, &eta)?;
    let mut sa = prior.sa;

    let xr = x.mul_vec(&alpha.component_mul(&mu));
    let mut s = DVector::zeros(p);
    refresh_s(&stats, sa, &mut s);

    let mut state = FitState {
        alpha,
        mu,
        s,
        xr,
        eta,
    };

    let mut logw = f64::NEG_INFINITY;
    let mut stop = StopReason::MaxIterations;
    let mut iterations = options.max_iter;

    for t in 1..=options.max_iter {
        let snapshot = state.clone();

        let logw0 = lower_bound(family, &state, &stats, &prior.logodds, sa);

        // alternate sweep direction to avoid position-dependent bias
        let order: Vec<usize> = if t % 2 == 1 {
            (0..p).collect()
        } else {
            (0..p).rev().collect()
        };
        coordinate_sweep(x, &stats, sa, &prior.logodds, &order, &mut state);

        // M-step for the logistic free parameters, then refresh the
        // statistics bundle and the conditional variances
        if options.update_free_params {
            if let Some(eta) = family.update_free_params(x, &state, &stats) {
                state.eta = eta;
                stats = family.compute_stats(x, &state.eta)?;
                refresh_s(&stats, sa, &mut state.s);
            }
        }

        let logw_t = lower_bound(family, &state, &stats, &prior.logodds, sa);

        // MAP re-estimation of the slab variance (pseudo-count shrinkage)
        if options.update_sa {
            let sum_alpha = state.alpha.sum();
            let ssq: f64 = (0..p)
                .map(|j| state.alpha[j] * (state.s[j] + state.mu[j] * state.mu[j]))
                .sum::<f64>()
                / stats.sigma();
            sa = (options.sa0 * options.n0 + ssq) / (options.n0 + sum_alpha);
            refresh_s(&stats, sa, &mut state.s);
        }

        let err = (0..p)
            .map(|j| (state.alpha[j] - snapshot.alpha[j]).abs())
            .fold(0.0, f64::max);

        monitor(&IterationInfo {
            iter: t,
            lower_bound: logw_t,
            max_delta_alpha: err,
            num_included: state.alpha.iter().filter(|&&a| a > 0.5).count(),
        });

        if logw_t < logw0 {
            // monotonicity violation: restore the best-known state
            state = snapshot;
            logw = logw0;
            stop = StopReason::DecreasingBound;
            iterations = t;
            break;
        }
        logw = logw_t;

        if err < options.tol {
            stop = StopReason::Converged;
            iterations = t;
            break;
        }
    }

    Ok(FitOutcome {
        alpha: state.alpha,
        mu: state.mu,
        s: state.s,
        xr: state.xr,
        eta: state.eta,
        sa,
        lower_bound: logw,
        stop,
        iterations,
    })
}
