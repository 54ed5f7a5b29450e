//! Evidence lower bound (ELBO) evaluator.
//!
//! `logw = data_term + prior_inclusion_term + kl_term`, evaluated twice
//! per outer iteration (before and after the coordinate sweep) so the
//! driver can detect non-monotonicity. Pure: no state is mutated.
//!
//! The prior-inclusion term and the Gaussian/Bernoulli KL term follow
//! the mean-field decomposition consistent with the sigmoid update of
//! the kernel: the sum of the two is maximized, holding `mu` and `s`
//! fixed at zero effect, at `alpha = sigmoid(logodds)`.

use crate::family::LikelihoodFamily;
use crate::kernel::{FitState, SweepStats};
use crate::math::log_sigmoid;
use nalgebra::DVector;

/// Expected Bernoulli log-prior of the inclusion indicators under the
/// current `alpha`:
///
/// ```text
/// Σ_j (alpha_j - 1)·logodds_j + ln sigmoid(logodds_j)
/// ```
pub fn prior_inclusion_term(alpha: &DVector<f64>, logodds: &DVector<f64>) -> f64 {
    alpha
        .iter()
        .zip(logodds.iter())
        .map(|(&a, &lo)| (a - 1.0) * lo + log_sigmoid(lo))
        .sum()
}

/// Negative KL divergence between the variational spike-and-slab factor
/// and its prior, plus the Bernoulli entropy of `alpha`.
///
/// `slab_var` is the prior variance of included coefficients on the
/// likelihood scale: `sa·sigma` for the linear family, `sa` for the
/// logistic family.
pub fn kl_term(
    alpha: &DVector<f64>,
    mu: &DVector<f64>,
    s: &DVector<f64>,
    slab_var: f64,
) -> f64 {
    let eps = f64::EPSILON;
    let mut gauss = 0.0;
    let mut entropy = 0.0;
    for j in 0..alpha.len() {
        let a = alpha[j];
        gauss += a + a * (s[j] / slab_var).ln() - a * (s[j] + mu[j] * mu[j]) / slab_var;
        entropy -= a * (a + eps).ln() + (1.0 - a) * (1.0 - a + eps).ln();
    }
    gauss / 2.0 + entropy
}

/// Full evidence lower bound at the current state.
pub fn lower_bound<F: LikelihoodFamily>(
    family: &F,
    state: &FitState,
    stats: &F::Stats,
    logodds: &DVector<f64>,
    sa: f64,
) -> f64 {
    family.data_term(state, stats)
        + prior_inclusion_term(&state.alpha, logodds)
        + kl_term(&state.alpha, &state.mu, &state.s, sa * stats.sigma())
}
