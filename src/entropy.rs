// Approximate differential entropy of a Gaussian mixture

use crate::linalg_backends::{log_det_from_cholesky, BackendCholesky, NdarrayLinAlgBackend};
use crate::mixture::GaussianMixture;
use log::warn;
use std::f64::consts::PI;

/// Shannon entropy (natural log) of a discrete distribution. Zero-probability
/// terms contribute nothing.
pub fn categorical_entropy(probabilities: &[f64]) -> f64 {
    -probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f64>()
}

/// `ln det(cov)` through its Cholesky factor, or `-inf` when `cov` is not
/// positive definite.
pub fn log_det_or_neg_inf(cov: ndarray::ArrayView2<f64>) -> f64 {
    match NdarrayLinAlgBackend.cholesky_lower(cov) {
        Ok(lower) => log_det_from_cholesky(lower.view()),
        Err(_) => f64::NEG_INFINITY,
    }
}

/// Approximate differential entropy of a fitted mixture:
///
/// ```text
/// H ~= H(w) + 0.5 * sum_k w_k * (ln det(S_k) + D * (1 + ln 2pi))
/// ```
///
/// The categorical entropy of the weights plus the weighted closed-form
/// entropies of the components. It upper-bounds the true mixture entropy,
/// which has no closed form, and is meant as a relative compactness signal
/// between candidate models.
///
/// A singular component covariance makes the result `-inf`.
pub fn approximate_entropy(model: &GaussianMixture) -> f64 {
    let n_features = model.n_features() as f64;
    let gaussian_constant = n_features * (1.0 + (2.0 * PI).ln());

    let weights = model.weights().to_vec();
    let mixing_entropy = categorical_entropy(&weights);

    let mut component_entropies = 0.0;
    for (k, &weight) in weights.iter().enumerate() {
        let cov = model.covariances().component(k, model.n_features());
        let log_det = log_det_or_neg_inf(cov.view());
        if log_det == f64::NEG_INFINITY {
            warn!("component {} has a singular covariance; entropy is -inf", k);
        }
        component_entropies += weight * (log_det + gaussian_constant);
    }

    mixing_entropy + 0.5 * component_entropies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::Covariances;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, Array3, Axis};

    #[test]
    fn categorical_entropy_basics() {
        assert_abs_diff_eq!(categorical_entropy(&[1.0]), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(categorical_entropy(&[0.5, 0.5]), 2f64.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(categorical_entropy(&[0.25; 4]), 4f64.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(categorical_entropy(&[1.0, 0.0]), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn single_standard_normal_has_closed_form_entropy() {
        let d = 4;
        let model = GaussianMixture::from_parameters(
            array![1.0],
            Array2::zeros((1, d)),
            Covariances::Tied(Array2::eye(d)),
        )
        .unwrap();
        let expected = 0.5 * d as f64 * (1.0 + (2.0 * PI).ln());
        assert_abs_diff_eq!(approximate_entropy(&model), expected, epsilon = 1e-12);
    }

    #[test]
    fn matches_formula_for_two_components() {
        let mut covs = Array3::<f64>::zeros((2, 2, 2));
        covs.index_axis_mut(Axis(0), 0).assign(&array![[2.0, 0.5], [0.5, 1.0]]);
        covs.index_axis_mut(Axis(0), 1).assign(&array![[0.3, 0.0], [0.0, 0.4]]);
        let model = GaussianMixture::from_parameters(
            array![0.4, 0.6],
            array![[0.0, 0.0], [3.0, 3.0]],
            Covariances::Full(covs),
        )
        .unwrap();
        let c = 2.0 * (1.0 + (2.0 * PI).ln());
        let expected = categorical_entropy(&[0.4, 0.6])
            + 0.5 * (0.4 * (1.75f64.ln() + c) + 0.6 * (0.12f64.ln() + c));
        let h = approximate_entropy(&model);
        assert!(h.is_finite());
        assert_abs_diff_eq!(h, expected, epsilon = 1e-12);
    }

    #[test]
    fn singular_covariance_gives_negative_infinity() {
        let mut covs = Array3::<f64>::zeros((2, 2, 2));
        covs.index_axis_mut(Axis(0), 0).assign(&array![[1.0, 0.0], [0.0, 1.0]]);
        covs.index_axis_mut(Axis(0), 1).assign(&array![[1.0, 1.0], [1.0, 1.0]]);
        let model = GaussianMixture::from_parameters(
            array![0.5, 0.5],
            array![[0.0, 0.0], [1.0, 1.0]],
            Covariances::Full(covs),
        )
        .unwrap();
        assert_eq!(approximate_entropy(&model), f64::NEG_INFINITY);

        let zero_variance = GaussianMixture::from_parameters(
            array![1.0],
            array![[0.0, 0.0]],
            Covariances::Diag(array![[1.0, 0.0]]),
        )
        .unwrap();
        assert_eq!(approximate_entropy(&zero_variance), f64::NEG_INFINITY);
    }
}
