// End-to-end analysis: load, standardize, sweep, finalize, persist

use crate::config::LpaConfig;
use crate::error::{LpaError, LpaResult};
use crate::finalize::{finalize, FinalizedProfiles};
use crate::io::{load_observations, ArtifactPaths};
use crate::preprocess::standardize;
use crate::selection::{sweep_components, ModelSelectionTable};
use log::info;
use ndarray::{Array2, ArrayView2};

/// Everything an analysis computes. Nothing is written until [`AnalysisOutcome::persist`].
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Standardized observations the models were fitted on.
    pub data: Array2<f64>,
    /// Names of the modeled columns, in column order.
    pub column_names: Vec<String>,
    pub table: ModelSelectionTable,
    pub profiles: FinalizedProfiles,
}

impl AnalysisOutcome {
    /// Writes the comparison table, the finalized model and the labeled dataset
    /// under `output_dir`, overwriting earlier runs.
    pub fn persist<P: AsRef<std::path::Path>>(&self, output_dir: P) -> LpaResult<ArtifactPaths> {
        let paths = ArtifactPaths::new(
            output_dir,
            self.profiles.model.covariance_type(),
            self.profiles.n_components(),
        );
        paths.create_dirs()?;
        paths.save_comparison_table(&self.table)?;
        self.profiles.model.save_model(&paths.model_file)?;
        info!("Saved model to {:?}", paths.model_file);
        let names: Vec<&str> = self.column_names.iter().map(String::as_str).collect();
        paths.save_labeled_dataset(self.data.view(), &names, self.profiles.labels.view())?;
        Ok(paths)
    }
}

/// Runs the sweep and the final fit on an already selected raw matrix.
pub fn analyze_matrix(
    raw: ArrayView2<f64>,
    column_names: Vec<String>,
    config: &LpaConfig,
) -> LpaResult<AnalysisOutcome> {
    let final_components = config.validate()?;
    let data = standardize(raw)?;
    let table = sweep_components(data.view(), &config.sweep, &config.model)?;
    if let Some(best) = table.lowest_bic() {
        info!("Lowest BIC at {} components ({:.4}).", best.n_components, best.bic);
    }
    let profiles = finalize(data.view(), final_components, &config.model)?;
    Ok(AnalysisOutcome {
        data,
        column_names,
        table,
        profiles,
    })
}

/// Loads the configured input and runs the whole analysis in memory.
pub fn run_analysis(config: &LpaConfig) -> LpaResult<AnalysisOutcome> {
    config.validate()?;
    let input = config
        .input
        .as_ref()
        .ok_or_else(|| LpaError::Config("no input table configured".into()))?;
    let raw = load_observations(input, &config.columns)?;
    let names = config.columns.names().into_iter().map(String::from).collect();
    analyze_matrix(raw.view(), names, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnMapping, ColumnSpec};
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn small_config() -> LpaConfig {
        let mut config = LpaConfig::default();
        config.final_components = Some(2);
        config.sweep.max_components = 3;
        config.columns = ColumnMapping(vec![ColumnSpec::new("x", 0), ColumnSpec::new("y", 1)]);
        config
    }

    fn raw() -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let noise = Normal::new(0.0, 1.0).unwrap();
        Array2::from_shape_fn((60, 2), |(i, _)| {
            let offset = if i % 2 == 0 { 10.0 } else { -10.0 };
            offset + noise.sample(&mut rng)
        })
    }

    #[test]
    fn missing_final_components_fails_before_fitting() {
        let mut config = small_config();
        config.final_components = None;
        let err = analyze_matrix(raw().view(), vec!["x".into(), "y".into()], &config).unwrap_err();
        assert!(matches!(err, LpaError::Config(_)));
    }

    #[test]
    fn missing_input_is_a_config_error() {
        let err = run_analysis(&small_config()).unwrap_err();
        assert!(matches!(err, LpaError::Config(_)));
    }

    #[test]
    fn analyzes_in_memory_matrix() {
        let config = small_config();
        let outcome = analyze_matrix(raw().view(), vec!["x".into(), "y".into()], &config).unwrap();
        assert_eq!(outcome.table.len(), 3);
        assert_eq!(outcome.profiles.n_components(), 2);
        assert_eq!(outcome.profiles.labels.len(), 60);
        let column_mean = outcome.data.column(0).mean().unwrap();
        assert!(column_mean.abs() < 1e-10);
    }
}
