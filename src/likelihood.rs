// Per-component log-likelihood decomposition of a Gaussian mixture

use crate::error::{DataError, FitError, LpaResult};
use crate::linalg_backends::{
    log_det_from_cholesky, BackendCholesky, BackendTriangularSolve, NdarrayLinAlgBackend,
};
use crate::mixture::{Covariances, GaussianMixture};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::f64::consts::PI;

/// Responsibility-weighted decomposition of the log-likelihood.
///
/// `per_component` and `total` are separate diagnostics. The soft-assigned
/// column sums are not required to add up to `total`, which is the exact
/// mixture log-likelihood of the data.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentContributions {
    /// `sum_i r_ik * (ln w_k + ln N(x_i | mu_k, S_k))` for each component k.
    pub per_component: Array1<f64>,
    /// `sum_i ln sum_k w_k N(x_i | mu_k, S_k)`.
    pub total: f64,
}

/// Numerically stable `ln(sum(exp(values)))`. Empty input gives `-inf`.
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        // all -inf (or an +inf term): the shift would produce NaN
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// Row-wise log-sum-exp of an (n, k) matrix.
pub fn logsumexp_rows(matrix: ArrayView2<f64>) -> Array1<f64> {
    matrix.map_axis(Axis(1), |row| match row.as_slice() {
        Some(slice) => logsumexp(slice),
        None => logsumexp(&row.to_vec()),
    })
}

pub(crate) fn check_feature_dimension(model: &GaussianMixture, data: ArrayView2<f64>) -> LpaResult<()> {
    if data.ncols() != model.n_features() {
        return Err(DataError::DimensionMismatch {
            expected: model.n_features(),
            found: data.ncols(),
        }
        .into());
    }
    Ok(())
}

/// Log-density of every row of `data` under `N(mean, L L^T)`.
///
/// Uses the Cholesky factor only: `-0.5 * (D ln 2pi + ln det + |L^-1 (x - mu)|^2)`.
fn gaussian_log_density(
    data: ArrayView2<f64>,
    mean: ArrayView1<f64>,
    lower: ArrayView2<f64>,
    component: usize,
) -> Result<Array1<f64>, FitError> {
    let n_features = data.ncols() as f64;
    let centered = &data - &mean;
    let centered_t = centered.t().as_standard_layout().into_owned();
    let whitened = NdarrayLinAlgBackend
        .solve_lower_triangular(lower, centered_t.view())
        .map_err(|_| FitError::SingularCovariance { component })?;
    let mahalanobis = whitened.mapv(|v| v * v).sum_axis(Axis(0));
    let log_det = log_det_from_cholesky(lower);
    let constant = n_features * (2.0 * PI).ln() + log_det;
    Ok(mahalanobis.mapv(|m| -0.5 * (constant + m)))
}

/// `ln w_k + ln N(x_i | mu_k, S_k)` for raw parameters, shape (n_samples, K).
pub(crate) fn weighted_log_prob(
    data: ArrayView2<f64>,
    weights: ArrayView1<f64>,
    means: ArrayView2<f64>,
    covariances: &Covariances,
) -> Result<Array2<f64>, FitError> {
    let n_components = weights.len();
    let n_features = means.ncols();
    let mut log_prob = Array2::<f64>::zeros((data.nrows(), n_components));

    let shared_factor = match covariances {
        Covariances::Tied(cov) => Some(
            NdarrayLinAlgBackend
                .cholesky_lower(cov.view())
                .map_err(|_| FitError::SingularCovariance { component: 0 })?,
        ),
        _ => None,
    };

    for k in 0..n_components {
        let own_factor;
        let lower = match &shared_factor {
            Some(factor) => factor.view(),
            None => {
                let cov = covariances.component(k, n_features);
                own_factor = NdarrayLinAlgBackend
                    .cholesky_lower(cov.view())
                    .map_err(|_| FitError::SingularCovariance { component: k })?;
                own_factor.view()
            }
        };
        let density = gaussian_log_density(data, means.row(k), lower, k)?;
        let log_weight = weights[k].ln();
        log_prob
            .column_mut(k)
            .assign(&density.mapv(|v| v + log_weight));
    }
    Ok(log_prob)
}

/// Per-sample, per-component weighted log-likelihood, shape (n_samples, K).
///
/// Entry (i, k) is `ln w_k + ln N(x_i | mu_k, S_k)`.
///
/// # Errors
/// `DataError::DimensionMismatch` if `data` has the wrong number of columns;
/// `FitError::SingularCovariance` if a covariance is not positive definite.
pub fn component_log_likelihoods(model: &GaussianMixture, data: ArrayView2<f64>) -> LpaResult<Array2<f64>> {
    check_feature_dimension(model, data)?;
    Ok(weighted_log_prob(
        data,
        model.weights().view(),
        model.means().view(),
        model.covariances(),
    )?)
}

/// Exact mixture log-likelihood of every sample (row-wise log-sum-exp).
pub fn total_log_likelihood(model: &GaussianMixture, data: ArrayView2<f64>) -> LpaResult<Array1<f64>> {
    let log_prob = component_log_likelihoods(model, data)?;
    Ok(logsumexp_rows(log_prob.view()))
}

/// Responsibility-weighted contribution of every component plus the grand total.
pub fn component_contributions(
    model: &GaussianMixture,
    data: ArrayView2<f64>,
) -> LpaResult<ComponentContributions> {
    let log_prob = component_log_likelihoods(model, data)?;
    let log_norm = logsumexp_rows(log_prob.view());
    let responsibilities = (&log_prob - &log_norm.view().insert_axis(Axis(1))).mapv(f64::exp);

    // 0 * -inf would poison the column sum with NaN
    let weighted = ndarray::Zip::from(&responsibilities)
        .and(&log_prob)
        .map_collect(|&r, &lp| if r == 0.0 { 0.0 } else { r * lp });

    Ok(ComponentContributions {
        per_component: weighted.sum_axis(Axis(0)),
        total: log_norm.sum(),
    })
}
