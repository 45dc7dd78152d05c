// Column standardization of the raw observation matrix

use crate::error::{DataError, LpaResult};
use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};

/// Standard deviations at or below this fraction of the column's magnitude are
/// treated as zero variance.
const RELATIVE_VARIANCE_FLOOR: f64 = 1e-12;

/// Returns a copy of `raw` where every column has zero mean and unit variance.
///
/// The statistics come from `raw` itself (population standard deviation,
/// `ddof = 0`) and are discarded afterwards.
///
/// # Errors
/// - `DataError::EmptyMatrix` if there are no rows or no columns.
/// - `DataError::TooFewSamples` for a single row.
/// - `DataError::NonFinite` for NaN or infinite inputs.
/// - `DataError::ZeroVariance` for a constant column.
pub fn standardize(raw: ArrayView2<f64>) -> LpaResult<Array2<f64>> {
    let (n_samples, n_features) = raw.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(DataError::EmptyMatrix {
            n_samples,
            n_features,
        }
        .into());
    }
    if n_samples < 2 {
        return Err(DataError::TooFewSamples {
            required: 2,
            found: n_samples,
        }
        .into());
    }
    if let Some(((row, column), _)) = raw.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(DataError::NonFinite { row, column }.into());
    }

    info!(
        "Standardizing observation matrix ({} samples, {} features).",
        n_samples, n_features
    );

    let mut standardized = raw.to_owned();
    for (column, mut feature) in standardized.axis_iter_mut(Axis(1)).enumerate() {
        let mean = feature.sum() / n_samples as f64;
        feature.mapv_inplace(|x| x - mean);
        let std_dev = (feature.dot(&feature) / n_samples as f64).sqrt();
        if std_dev <= RELATIVE_VARIANCE_FLOOR * mean.abs().max(1.0) {
            return Err(DataError::ZeroVariance { column }.into());
        }
        debug!("column {}: mean={:.6}, std={:.6}", column, mean, std_dev);
        feature.mapv_inplace(|x| x / std_dev);
    }

    Ok(standardized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LpaError;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn columns_have_zero_mean_unit_variance() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let raw = Array2::from_shape_fn((250, 4), |(_, j)| {
            rng.gen_range(-1.0..1.0) * (j as f64 + 1.0) * 10.0 + 100.0 * j as f64
        });
        let z = standardize(raw.view()).unwrap();
        assert_eq!(z.dim(), raw.dim());
        for column in z.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(column.var(0.0), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn matches_hand_computed_values() {
        let raw = array![[1.0, 10.0], [3.0, 10.5], [5.0, 12.0]];
        let z = standardize(raw.view()).unwrap();
        let s = (8.0f64 / 3.0).sqrt();
        assert_abs_diff_eq!(z[[0, 0]], -2.0 / s, epsilon = 1e-12);
        assert_abs_diff_eq!(z[[1, 0]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[[2, 0]], 2.0 / s, epsilon = 1e-12);
    }

    #[test]
    fn constant_column_is_rejected() {
        let raw = array![[1.0, 0.1], [2.0, 0.1], [3.0, 0.1]];
        match standardize(raw.view()) {
            Err(LpaError::Data(DataError::ZeroVariance { column })) => assert_eq!(column, 1),
            other => panic!("expected zero-variance error, got {:?}", other),
        }
    }

    #[test]
    fn degenerate_shapes_and_nan_are_rejected() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            standardize(empty.view()),
            Err(LpaError::Data(DataError::EmptyMatrix { .. }))
        ));

        let single = array![[1.0, 2.0]];
        assert!(matches!(
            standardize(single.view()),
            Err(LpaError::Data(DataError::TooFewSamples { .. }))
        ));

        let with_nan = array![[1.0, 2.0], [f64::NAN, 3.0]];
        assert!(matches!(
            standardize(with_nan.view()),
            Err(LpaError::Data(DataError::NonFinite { row: 1, column: 0 }))
        ));
    }
}
