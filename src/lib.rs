// Latent profile analysis with Gaussian mixture models

#![doc = include_str!("../README.md")]

pub mod config;
pub mod entropy;
pub mod error;
pub mod finalize;
pub mod io;
mod kmeans;
pub mod likelihood;
pub mod linalg_backends;
pub mod mixture;
pub mod pipeline;
pub mod preprocess;
pub mod selection;

pub use config::{
    ColumnMapping, ColumnSpec, CovarianceType, LpaConfig, ModelConfig, SweepConfig, SweepFailurePolicy,
};
pub use entropy::approximate_entropy;
pub use error::{DataError, FitError, LpaError, LpaResult};
pub use finalize::{finalize, FinalizedProfiles};
pub use likelihood::{
    component_contributions, component_log_likelihoods, total_log_likelihood, ComponentContributions,
};
pub use mixture::{Covariances, GaussianMixture};
pub use pipeline::{analyze_matrix, run_analysis, AnalysisOutcome};
pub use preprocess::standardize;
pub use selection::{sweep_components, ModelSelectionRecord, ModelSelectionTable};
