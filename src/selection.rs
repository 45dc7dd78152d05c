// Model-selection sweep over candidate component counts

use crate::config::{ModelConfig, SweepConfig, SweepFailurePolicy};
use crate::entropy::approximate_entropy;
use crate::error::LpaResult;
use crate::likelihood::component_contributions;
use crate::mixture::GaussianMixture;
use log::{info, warn};
use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Statistics of one candidate model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelectionRecord {
    pub n_components: usize,
    pub aic: f64,
    pub bic: f64,
    /// Exact mixture log-likelihood summed over all observations.
    pub log_likelihood: f64,
    /// Approximate differential entropy of the fitted mixture.
    pub entropy: f64,
}

/// Comparison table, one record per successfully fitted K in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSelectionTable {
    pub records: Vec<ModelSelectionRecord>,
    /// Candidates omitted under `SweepFailurePolicy::Skip`.
    pub skipped: Vec<usize>,
}

impl ModelSelectionTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, n_components: usize) -> Option<&ModelSelectionRecord> {
        self.records.iter().find(|r| r.n_components == n_components)
    }

    /// Candidate with the smallest BIC. Only a hint: the final K stays a human decision.
    pub fn lowest_bic(&self) -> Option<&ModelSelectionRecord> {
        self.records
            .iter()
            .filter(|r| r.bic.is_finite())
            .min_by(|a, b| a.bic.total_cmp(&b.bic))
    }

    /// Candidate with the smallest AIC.
    pub fn lowest_aic(&self) -> Option<&ModelSelectionRecord> {
        self.records
            .iter()
            .filter(|r| r.aic.is_finite())
            .min_by(|a, b| a.aic.total_cmp(&b.aic))
    }
}

/// Fits one candidate and collects its statistics.
pub fn evaluate_candidate(
    data: ArrayView2<f64>,
    n_components: usize,
    config: &ModelConfig,
) -> LpaResult<ModelSelectionRecord> {
    let model = GaussianMixture::fit(data, n_components, config)?;
    let contributions = component_contributions(&model, data)?;
    let record = ModelSelectionRecord {
        n_components,
        aic: model.aic(data)?,
        bic: model.bic(data)?,
        log_likelihood: contributions.total,
        entropy: approximate_entropy(&model),
    };
    info!(
        "------ {} latent ------ entropy: {:.6}, log-likelihood: {:.6}, AIC: {:.4}, BIC: {:.4}",
        n_components, record.entropy, record.log_likelihood, record.aic, record.bic
    );
    Ok(record)
}

/// Fits a fresh mixture for every K in `sweep.candidates()` on the same data.
///
/// Records come back in ascending K whether or not the candidates were fitted
/// in parallel. Under `SweepFailurePolicy::Abort` the first failure (in K
/// order) is returned; under `Skip` failed candidates are logged and listed in
/// `skipped` without a record.
pub fn sweep_components(
    data: ArrayView2<f64>,
    sweep: &SweepConfig,
    config: &ModelConfig,
) -> LpaResult<ModelSelectionTable> {
    sweep.validate()?;
    config.validate()?;
    let candidates: Vec<usize> = sweep.candidates().collect();
    info!(
        "Sweeping {} candidate component counts {:?} ({}).",
        candidates.len(),
        sweep.candidates(),
        if sweep.parallel { "parallel" } else { "sequential" }
    );

    let outcomes: Vec<(usize, LpaResult<ModelSelectionRecord>)> = if sweep.parallel {
        candidates
            .par_iter()
            .map(|&k| (k, evaluate_candidate(data, k, config)))
            .collect()
    } else {
        let mut outcomes = Vec::with_capacity(candidates.len());
        for &k in &candidates {
            let outcome = evaluate_candidate(data, k, config);
            let failed = outcome.is_err();
            outcomes.push((k, outcome));
            if failed && sweep.on_fit_failure == SweepFailurePolicy::Abort {
                break;
            }
        }
        outcomes
    };

    let mut table = ModelSelectionTable::default();
    for (k, outcome) in outcomes {
        match outcome {
            Ok(record) => table.records.push(record),
            Err(e) => match sweep.on_fit_failure {
                SweepFailurePolicy::Abort => {
                    warn!("Fit with {} components failed; aborting sweep: {}", k, e);
                    return Err(e);
                }
                SweepFailurePolicy::Skip => {
                    warn!("Fit with {} components failed; omitting it: {}", k, e);
                    table.skipped.push(k);
                }
            },
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FitError, LpaError};
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn blobs(n: usize) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let noise = Normal::new(0.0, 0.5).unwrap();
        Array2::from_shape_fn((n, 2), |(i, _)| {
            let center = if i % 3 == 0 { -3.0 } else if i % 3 == 1 { 0.0 } else { 3.0 };
            center + noise.sample(&mut rng)
        })
    }

    #[test]
    fn records_come_back_in_ascending_order() {
        let data = blobs(90);
        let sweep = SweepConfig {
            min_components: 1,
            max_components: 4,
            ..SweepConfig::default()
        };
        let table = sweep_components(data.view(), &sweep, &ModelConfig::default()).unwrap();
        let ks: Vec<usize> = table.records.iter().map(|r| r.n_components).collect();
        assert_eq!(ks, vec![1, 2, 3, 4]);
        assert!(table.skipped.is_empty());
        for record in &table.records {
            assert!(record.aic.is_finite());
            assert!(record.bic.is_finite());
            assert!(record.log_likelihood.is_finite());
            assert!(record.entropy.is_finite());
        }
        assert!(table.get(3).is_some());
        assert!(table.get(7).is_none());
        assert!(table.lowest_bic().unwrap().n_components >= 2);
    }

    #[test]
    fn abort_policy_propagates_first_failure() {
        let data = blobs(5);
        let sweep = SweepConfig {
            min_components: 6,
            max_components: 8,
            ..SweepConfig::default()
        };
        let err = sweep_components(data.view(), &sweep, &ModelConfig::default()).unwrap_err();
        match err {
            LpaError::Fit(FitError::InvalidComponentCount { n_components, .. }) => {
                assert_eq!(n_components, 6)
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn skip_policy_omits_failed_rows() {
        let data = blobs(5);
        let sweep = SweepConfig {
            min_components: 1,
            max_components: 7,
            on_fit_failure: SweepFailurePolicy::Skip,
            ..SweepConfig::default()
        };
        let config = ModelConfig {
            reg_covar: 1e-3,
            ..ModelConfig::default()
        };
        let table = sweep_components(data.view(), &sweep, &config).unwrap();
        assert!(table.skipped.contains(&6));
        assert!(table.skipped.contains(&7));
        assert!(table.records.iter().all(|r| r.n_components <= 5));
        assert!(table
            .records
            .windows(2)
            .all(|w| w[0].n_components < w[1].n_components));
    }
}
