// Error taxonomy for latent profile analysis

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type LpaResult<T> = Result<T, LpaError>;

/// Top-level error for every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum LpaError {
    /// The observation matrix or the input table is unusable.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// Mixture fitting failed for a candidate model.
    #[error("fit error: {0}")]
    Fit(#[from] FitError),

    /// Reading input or writing an artifact failed.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or missing configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Model (de)serialization failed.
    #[error("model serialization failed: {0}")]
    Serialization(String),
}

impl LpaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LpaError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Problems with the input data or the observation matrix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("observation matrix is empty ({n_samples} samples, {n_features} features)")]
    EmptyMatrix { n_samples: usize, n_features: usize },

    #[error("at least {required} samples are required, got {found}")]
    TooFewSamples { required: usize, found: usize },

    #[error("column {column} has zero variance; standardization is undefined")]
    ZeroVariance { column: usize },

    #[error("non-finite value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("line {line}: cannot parse {token:?} as a number")]
    Parse { line: usize, token: String },

    #[error("line {line}: expected {expected} columns, found {found}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("column {name:?} maps to position {index}, but the table has {available} columns")]
    MissingColumn {
        name: String,
        index: usize,
        available: usize,
    },

    #[error("feature dimension mismatch: model expects {expected}, data has {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Failures of the EM mixture fit.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("cannot fit {n_components} components to {n_samples} samples")]
    InvalidComponentCount {
        n_components: usize,
        n_samples: usize,
    },

    #[error(
        "EM with {n_components} components did not converge within {max_iter} iterations \
         (last lower-bound change {last_change:e})"
    )]
    NotConverged {
        n_components: usize,
        max_iter: usize,
        last_change: f64,
    },

    #[error("covariance of component {component} is not positive definite")]
    SingularCovariance { component: usize },

    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),
}
