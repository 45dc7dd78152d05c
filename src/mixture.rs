// Gaussian mixture model fitted by expectation-maximization

use crate::config::{CovarianceType, ModelConfig};
use crate::error::{DataError, FitError, LpaError, LpaResult};
use crate::kmeans::kmeans;
use crate::likelihood::{check_feature_dimension, logsumexp_rows, weighted_log_prob};
use log::{debug, info, trace};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Tolerance on `sum(weights) == 1` when validating external parameters.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Covariance parameters, stored in the shape their structure needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Covariances {
    /// Shape (K, D, D).
    Full(Array3<f64>),
    /// Shape (D, D), shared by all components.
    Tied(Array2<f64>),
    /// Per-component variances, shape (K, D).
    Diag(Array2<f64>),
    /// One variance per component, shape (K).
    Spherical(Array1<f64>),
}

impl Covariances {
    pub fn covariance_type(&self) -> CovarianceType {
        match self {
            Covariances::Full(_) => CovarianceType::Full,
            Covariances::Tied(_) => CovarianceType::Tied,
            Covariances::Diag(_) => CovarianceType::Diag,
            Covariances::Spherical(_) => CovarianceType::Spherical,
        }
    }

    /// Full (D, D) covariance matrix of component `k`. Callers guarantee `k < K`.
    pub(crate) fn component(&self, k: usize, n_features: usize) -> Array2<f64> {
        match self {
            Covariances::Full(covs) => covs.index_axis(Axis(0), k).to_owned(),
            Covariances::Tied(cov) => cov.clone(),
            Covariances::Diag(vars) => Array2::from_diag(&vars.row(k)),
            Covariances::Spherical(vars) => Array2::eye(n_features) * vars[k],
        }
    }

    fn n_parameters(&self, n_components: usize, n_features: usize) -> usize {
        match self {
            Covariances::Full(_) => n_components * n_features * (n_features + 1) / 2,
            Covariances::Tied(_) => n_features * (n_features + 1) / 2,
            Covariances::Diag(_) => n_components * n_features,
            Covariances::Spherical(_) => n_components,
        }
    }

    fn check_shape(&self, n_components: usize, n_features: usize) -> Result<(), FitError> {
        let (found, expected): (Vec<usize>, Vec<usize>) = match self {
            Covariances::Full(c) => (c.shape().to_vec(), vec![n_components, n_features, n_features]),
            Covariances::Tied(c) => (c.shape().to_vec(), vec![n_features, n_features]),
            Covariances::Diag(c) => (c.shape().to_vec(), vec![n_components, n_features]),
            Covariances::Spherical(c) => (c.shape().to_vec(), vec![n_components]),
        };
        if found != expected {
            return Err(FitError::InvalidParameters(format!(
                "{} covariances have shape {:?}, expected {:?}",
                self.covariance_type(),
                found,
                expected
            )));
        }
        let all_finite = match self {
            Covariances::Full(c) => c.iter().all(|v| v.is_finite()),
            Covariances::Tied(c) | Covariances::Diag(c) => c.iter().all(|v| v.is_finite()),
            Covariances::Spherical(c) => c.iter().all(|v| v.is_finite()),
        };
        if !all_finite {
            return Err(FitError::InvalidParameters(
                "covariances contain non-finite values".into(),
            ));
        }
        Ok(())
    }
}

/// A fitted Gaussian mixture model.
///
/// Instances come from [`GaussianMixture::fit`], [`GaussianMixture::from_parameters`]
/// or [`GaussianMixture::load_model`] and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianMixture {
    /// Mixing weights, shape (K). Positive and summing to one.
    weights: Array1<f64>,
    /// Component means, shape (K, D).
    means: Array2<f64>,
    covariances: Covariances,
    /// Whether EM reached the tolerance. Always true for fitted models.
    converged: bool,
    /// EM iterations used by the best initialization.
    n_iter: usize,
    /// Mean per-sample log-likelihood of the training data under the stored parameters.
    lower_bound: f64,
}

impl GaussianMixture {
    /// Fits a `n_components` mixture to `data` (n_samples x n_features) with EM.
    ///
    /// Initial responsibilities come from k-means seeded with `config.random_state`,
    /// so identical inputs always produce identical models. With `n_init > 1`
    /// the initialization with the highest lower bound is kept.
    ///
    /// # Errors
    /// - `LpaError::Config` for an invalid `config`.
    /// - `DataError` for an empty or non-finite matrix.
    /// - `FitError::InvalidComponentCount` if `n_components` is 0 or exceeds the sample count.
    /// - `FitError::SingularCovariance` if a covariance loses positive definiteness.
    /// - `FitError::NotConverged` if EM does not converge within `max_iter` iterations.
    pub fn fit(data: ArrayView2<f64>, n_components: usize, config: &ModelConfig) -> LpaResult<Self> {
        config.validate()?;
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(DataError::EmptyMatrix {
                n_samples,
                n_features,
            }
            .into());
        }
        if let Some(((row, column), _)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(DataError::NonFinite { row, column }.into());
        }
        if n_components == 0 || n_components > n_samples {
            return Err(FitError::InvalidComponentCount {
                n_components,
                n_samples,
            }
            .into());
        }

        info!(
            "Fitting {} mixture with {} components on {} samples x {} features (seed={}, max_iter={}).",
            config.covariance_type, n_components, n_samples, n_features, config.random_state, config.max_iter
        );
        let start_time = std::time::Instant::now();

        let mut rng = ChaCha8Rng::seed_from_u64(config.random_state);
        let mut best: Option<GaussianMixture> = None;
        for init in 0..config.n_init {
            let candidate = fit_single_init(data, n_components, config, &mut rng)?;
            debug!(
                "init {}: lower bound {:.6} after {} iterations",
                init, candidate.lower_bound, candidate.n_iter
            );
            if best
                .as_ref()
                .map_or(true, |b| candidate.lower_bound > b.lower_bound)
            {
                best = Some(candidate);
            }
        }
        let model = best.ok_or_else(|| LpaError::Config("n_init must be positive".into()))?;

        info!(
            "Fitted {} components in {:?} ({} iterations, lower bound {:.6}).",
            n_components,
            start_time.elapsed(),
            model.n_iter,
            model.lower_bound
        );
        Ok(model)
    }

    /// Builds a model from explicit parameters.
    ///
    /// Shapes, finiteness and the weight simplex are validated here; positive
    /// definiteness of the covariances is checked when densities are evaluated.
    pub fn from_parameters(
        weights: Array1<f64>,
        means: Array2<f64>,
        covariances: Covariances,
    ) -> LpaResult<Self> {
        let model = GaussianMixture {
            weights,
            means,
            covariances,
            converged: true,
            n_iter: 0,
            lower_bound: f64::NAN,
        };
        model.validate_parameters()?;
        Ok(model)
    }

    fn validate_parameters(&self) -> Result<(), FitError> {
        let n_components = self.weights.len();
        if n_components == 0 {
            return Err(FitError::InvalidParameters("model has no components".into()));
        }
        let (mean_rows, n_features) = self.means.dim();
        if mean_rows != n_components || n_features == 0 {
            return Err(FitError::InvalidParameters(format!(
                "means have shape ({}, {}), expected ({}, D) with D > 0",
                mean_rows, n_features, n_components
            )));
        }
        if self.means.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidParameters("means contain non-finite values".into()));
        }
        if self.weights.iter().any(|&w| !(w.is_finite() && w > 0.0 && w <= 1.0)) {
            return Err(FitError::InvalidParameters(
                "weights must lie in (0, 1]".into(),
            ));
        }
        let total = self.weights.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(FitError::InvalidParameters(format!(
                "weights sum to {}, expected 1",
                total
            )));
        }
        self.covariances.check_shape(n_components, n_features)
    }

    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    pub fn covariances(&self) -> &Covariances {
        &self.covariances
    }

    pub fn covariance_type(&self) -> CovarianceType {
        self.covariances.covariance_type()
    }

    /// Full (D, D) covariance of component `k`, whatever the stored structure.
    pub fn component_covariance(&self, k: usize) -> Option<Array2<f64>> {
        (k < self.n_components()).then(|| self.covariances.component(k, self.n_features()))
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Mean per-sample log-likelihood of the training data under the stored
    /// parameters, from the E-step run after convergence.
    /// `NaN` for models built with [`GaussianMixture::from_parameters`].
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Number of free parameters: covariance entries, means, and `K - 1` weights.
    pub fn n_parameters(&self) -> usize {
        let k = self.n_components();
        let d = self.n_features();
        self.covariances.n_parameters(k, d) + k * d + k - 1
    }

    /// Log-likelihood of every sample under the mixture, shape (n_samples).
    pub fn score_samples(&self, data: ArrayView2<f64>) -> LpaResult<Array1<f64>> {
        check_feature_dimension(self, data)?;
        let weighted = weighted_log_prob(data, self.weights.view(), self.means.view(), &self.covariances)?;
        Ok(logsumexp_rows(weighted.view()))
    }

    /// Mean per-sample log-likelihood.
    pub fn score(&self, data: ArrayView2<f64>) -> LpaResult<f64> {
        let per_sample = self.score_samples(data)?;
        per_sample.mean().ok_or_else(|| {
            DataError::EmptyMatrix {
                n_samples: 0,
                n_features: data.ncols(),
            }
            .into()
        })
    }

    /// Akaike information criterion on `data`: `-2 * ln L + 2p`.
    pub fn aic(&self, data: ArrayView2<f64>) -> LpaResult<f64> {
        let n_samples = data.nrows() as f64;
        Ok(-2.0 * self.score(data)? * n_samples + 2.0 * self.n_parameters() as f64)
    }

    /// Bayesian information criterion on `data`: `-2 * ln L + p * ln n`.
    pub fn bic(&self, data: ArrayView2<f64>) -> LpaResult<f64> {
        let n_samples = data.nrows() as f64;
        Ok(-2.0 * self.score(data)? * n_samples + self.n_parameters() as f64 * n_samples.ln())
    }

    /// Posterior responsibilities, shape (n_samples, K); rows sum to one.
    pub fn predict_proba(&self, data: ArrayView2<f64>) -> LpaResult<Array2<f64>> {
        check_feature_dimension(self, data)?;
        let (_, log_resp) = estimate_log_resp(data, self.weights.view(), self.means.view(), &self.covariances)?;
        Ok(log_resp.mapv(f64::exp))
    }

    /// Hard assignment: index of the component with the largest posterior.
    pub fn predict(&self, data: ArrayView2<f64>) -> LpaResult<Array1<usize>> {
        check_feature_dimension(self, data)?;
        let weighted = weighted_log_prob(data, self.weights.view(), self.means.view(), &self.covariances)?;
        Ok(weighted.map_axis(Axis(1), |row| argmax(row)))
    }

    /// Saves the model to a file using bincode.
    ///
    /// # Errors
    /// `LpaError::Io` if the file cannot be created or written,
    /// `LpaError::Serialization` if encoding fails.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> LpaResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| LpaError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| LpaError::Serialization(format!("failed to encode mixture model: {}", e)))?;
        writer.flush().map_err(|e| LpaError::io(path, e))?;
        Ok(())
    }

    /// Loads a model saved with [`GaussianMixture::save_model`] and validates it.
    pub fn load_model<P: AsRef<Path>>(path: P) -> LpaResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LpaError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let model: GaussianMixture =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| LpaError::Serialization(format!("failed to decode mixture model: {}", e)))?;
        model.validate_parameters()?;
        Ok(model)
    }
}

fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (k, &v) in row.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best = k;
        }
    }
    best
}

/// E-step: mean log normalizer (the lower bound) and log responsibilities.
fn estimate_log_resp(
    data: ArrayView2<f64>,
    weights: ArrayView1<f64>,
    means: ArrayView2<f64>,
    covariances: &Covariances,
) -> Result<(f64, Array2<f64>), FitError> {
    let weighted = weighted_log_prob(data, weights, means, covariances)?;
    let log_norm = logsumexp_rows(weighted.view());
    let log_resp = &weighted - &log_norm.view().insert_axis(Axis(1));
    let lower_bound = log_norm.mean().unwrap_or(f64::NEG_INFINITY);
    Ok((lower_bound, log_resp))
}

/// M-step: weights, means and covariances from responsibilities (n_samples, K).
fn estimate_gaussian_parameters(
    data: ArrayView2<f64>,
    resp: ArrayView2<f64>,
    covariance_type: CovarianceType,
    reg_covar: f64,
) -> (Array1<f64>, Array2<f64>, Covariances) {
    let n_features = data.ncols();
    let n_components = resp.ncols();

    // keeps empty components from dividing by zero
    let nk = resp.sum_axis(Axis(0)) + 10.0 * f64::EPSILON;
    let means = resp.t().dot(&data) / &nk.view().insert_axis(Axis(1));

    let weighted_scatter = |k: usize| -> (Array2<f64>, Array2<f64>) {
        let diff = &data - &means.row(k);
        let weighted = &diff * &resp.column(k).insert_axis(Axis(1));
        (diff, weighted)
    };

    let covariances = match covariance_type {
        CovarianceType::Full => {
            let mut covs = Array3::<f64>::zeros((n_components, n_features, n_features));
            for k in 0..n_components {
                let (diff, weighted) = weighted_scatter(k);
                let mut cov = weighted.t().dot(&diff) / nk[k];
                cov.diag_mut().mapv_inplace(|v| v + reg_covar);
                covs.index_axis_mut(Axis(0), k).assign(&cov);
            }
            Covariances::Full(covs)
        }
        CovarianceType::Tied => {
            let mut cov = Array2::<f64>::zeros((n_features, n_features));
            for k in 0..n_components {
                let (diff, weighted) = weighted_scatter(k);
                cov += &weighted.t().dot(&diff);
            }
            cov /= nk.sum();
            cov.diag_mut().mapv_inplace(|v| v + reg_covar);
            Covariances::Tied(cov)
        }
        CovarianceType::Diag | CovarianceType::Spherical => {
            let mut vars = Array2::<f64>::zeros((n_components, n_features));
            for k in 0..n_components {
                let (diff, weighted) = weighted_scatter(k);
                let var_k = (&weighted * &diff).sum_axis(Axis(0)) / nk[k] + reg_covar;
                vars.row_mut(k).assign(&var_k);
            }
            if covariance_type == CovarianceType::Diag {
                Covariances::Diag(vars)
            } else {
                let mean_var = vars
                    .mean_axis(Axis(1))
                    .unwrap_or_else(|| Array1::from_elem(n_components, reg_covar));
                Covariances::Spherical(mean_var)
            }
        }
    };

    let weights = &nk / nk.sum();
    (weights, means, covariances)
}

fn fit_single_init(
    data: ArrayView2<f64>,
    n_components: usize,
    config: &ModelConfig,
    rng: &mut ChaCha8Rng,
) -> LpaResult<GaussianMixture> {
    let n_samples = data.nrows();

    let init = kmeans(data, n_components, rng);
    trace!("k-means initialization inertia: {:.6}", init.inertia);
    let mut resp = Array2::<f64>::zeros((n_samples, n_components));
    for (i, &label) in init.labels.iter().enumerate() {
        resp[[i, label]] = 1.0;
    }

    let (mut weights, mut means, mut covariances) =
        estimate_gaussian_parameters(data, resp.view(), config.covariance_type, config.reg_covar);

    let mut lower_bound = f64::NEG_INFINITY;
    let mut last_change = f64::INFINITY;
    for iter in 1..=config.max_iter {
        let previous = lower_bound;
        let (log_prob_norm, log_resp) =
            estimate_log_resp(data, weights.view(), means.view(), &covariances)?;
        let resp = log_resp.mapv(f64::exp);
        (weights, means, covariances) =
            estimate_gaussian_parameters(data, resp.view(), config.covariance_type, config.reg_covar);
        lower_bound = log_prob_norm;
        last_change = lower_bound - previous;
        trace!("EM iteration {}: lower bound {:.8} (change {:e})", iter, lower_bound, last_change);

        if last_change.abs() < config.tol {
            // final E-step on the stored parameters
            let (final_bound, _) = estimate_log_resp(data, weights.view(), means.view(), &covariances)?;
            return Ok(GaussianMixture {
                weights,
                means,
                covariances,
                converged: true,
                n_iter: iter,
                lower_bound: final_bound,
            });
        }
    }

    Err(FitError::NotConverged {
        n_components,
        max_iter: config.max_iter,
        last_change,
    }
    .into())
}
