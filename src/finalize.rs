// Refit at the chosen component count and assign profiles

use crate::config::ModelConfig;
use crate::error::LpaResult;
use crate::mixture::GaussianMixture;
use log::info;
use ndarray::{Array1, ArrayView2};

/// Final model together with the hard profile assignment of every observation.
#[derive(Debug, Clone)]
pub struct FinalizedProfiles {
    pub model: GaussianMixture,
    /// Arg-max posterior component per observation, in input row order.
    pub labels: Array1<usize>,
}

impl FinalizedProfiles {
    pub fn n_components(&self) -> usize {
        self.model.n_components()
    }

    /// Number of observations assigned to each component.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.model.n_components()];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }
}

/// Refits a mixture with `n_components` on the full standardized data and
/// labels every observation with its most probable component.
pub fn finalize(
    data: ArrayView2<f64>,
    n_components: usize,
    config: &ModelConfig,
) -> LpaResult<FinalizedProfiles> {
    let model = GaussianMixture::fit(data, n_components, config)?;
    let labels = model.predict(data)?;
    let profiles = FinalizedProfiles { model, labels };
    info!(
        "Finalized {} profiles; cluster sizes {:?}",
        n_components,
        profiles.cluster_sizes()
    );
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn labeled_blobs() -> (Array2<f64>, Vec<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut truth = Vec::with_capacity(200);
        let data = Array2::from_shape_fn((200, 2), |(i, _)| {
            let center = if i < 100 { -4.0 } else { 4.0 };
            center + noise.sample(&mut rng)
        });
        for i in 0..200 {
            truth.push(usize::from(i >= 100));
        }
        (data, truth)
    }

    #[test]
    fn recovers_two_separated_groups() {
        let (data, truth) = labeled_blobs();
        let profiles = finalize(data.view(), 2, &ModelConfig::default()).unwrap();
        let agree = profiles
            .labels
            .iter()
            .zip(truth.iter())
            .filter(|(a, b)| a == b)
            .count();
        let accuracy = agree.max(200 - agree) as f64 / 200.0;
        assert!(accuracy >= 0.95, "accuracy {}", accuracy);
        assert_eq!(profiles.cluster_sizes().iter().sum::<usize>(), 200);
        assert_eq!(profiles.n_components(), 2);
    }

    #[test]
    fn same_seed_gives_identical_result() {
        let (data, _) = labeled_blobs();
        let config = ModelConfig::default();
        let a = finalize(data.view(), 3, &config).unwrap();
        let b = finalize(data.view(), 3, &config).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.model.weights(), b.model.weights());
        assert_eq!(a.model.means(), b.model.means());
        assert_eq!(a.model.covariances(), b.model.covariances());
    }

    #[test]
    fn labels_stay_in_range() {
        let (data, _) = labeled_blobs();
        let profiles = finalize(data.view(), 4, &ModelConfig::default()).unwrap();
        assert!(profiles.labels.iter().all(|&l| l < 4));
        assert_eq!(profiles.labels.len(), data.nrows());
    }
}
