// Configuration for fitting, sweeping and the end-to-end run

use crate::error::{LpaError, LpaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Structural constraint on each component's covariance matrix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    /// Each component has its own unconstrained covariance, shape (K, D, D).
    #[default]
    Full,
    /// All components share one covariance, shape (D, D).
    Tied,
    /// Each component has a diagonal covariance, shape (K, D).
    Diag,
    /// Each component has a single variance, shape (K).
    Spherical,
}

impl CovarianceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CovarianceType::Full => "full",
            CovarianceType::Tied => "tied",
            CovarianceType::Diag => "diag",
            CovarianceType::Spherical => "spherical",
        }
    }
}

impl fmt::Display for CovarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CovarianceType {
    type Err = LpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(CovarianceType::Full),
            "tied" => Ok(CovarianceType::Tied),
            "diag" => Ok(CovarianceType::Diag),
            "spherical" => Ok(CovarianceType::Spherical),
            other => Err(LpaError::Config(format!(
                "unknown covariance_type {:?}; expected one of full, diag, tied, spherical",
                other
            ))),
        }
    }
}

/// Parameters of a single mixture fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Seed for k-means initialization. The same seed always yields the same model.
    pub random_state: u64,
    /// Upper bound on EM iterations. Must be positive.
    pub max_iter: usize,
    pub covariance_type: CovarianceType,
    /// Convergence threshold on the change of the mean per-sample log-likelihood.
    pub tol: f64,
    /// Non-negative value added to every covariance diagonal.
    pub reg_covar: f64,
    /// Number of initializations; the one with the best lower bound is kept.
    pub n_init: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            random_state: 459,
            max_iter: 300,
            covariance_type: CovarianceType::Full,
            tol: 1e-3,
            reg_covar: 1e-6,
            n_init: 1,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> LpaResult<()> {
        if self.max_iter == 0 {
            return Err(LpaError::Config("max_iter must be positive".into()));
        }
        if self.n_init == 0 {
            return Err(LpaError::Config("n_init must be positive".into()));
        }
        if !(self.tol.is_finite() && self.tol >= 0.0) {
            return Err(LpaError::Config(format!(
                "tol must be finite and non-negative, got {}",
                self.tol
            )));
        }
        if !(self.reg_covar.is_finite() && self.reg_covar >= 0.0) {
            return Err(LpaError::Config(format!(
                "reg_covar must be finite and non-negative, got {}",
                self.reg_covar
            )));
        }
        Ok(())
    }
}

/// What the sweep does when a candidate fit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepFailurePolicy {
    /// Any failed candidate aborts the whole sweep.
    #[default]
    Abort,
    /// Log the failure and omit the row.
    Skip,
}

/// Candidate component counts and sweep behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub min_components: usize,
    /// Inclusive upper bound.
    pub max_components: usize,
    pub on_fit_failure: SweepFailurePolicy,
    /// Fit candidates concurrently. Output is identical to the sequential sweep.
    pub parallel: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            min_components: 1,
            max_components: 9,
            on_fit_failure: SweepFailurePolicy::Abort,
            parallel: false,
        }
    }
}

impl SweepConfig {
    pub fn candidates(&self) -> RangeInclusive<usize> {
        self.min_components..=self.max_components
    }

    pub fn validate(&self) -> LpaResult<()> {
        if self.min_components == 0 {
            return Err(LpaError::Config("min_components must be at least 1".into()));
        }
        if self.min_components > self.max_components {
            return Err(LpaError::Config(format!(
                "empty sweep range {}..={}",
                self.min_components, self.max_components
            )));
        }
        Ok(())
    }
}

/// One modeled column: zero-based position in the raw table and its semantic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    pub index: usize,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        ColumnSpec {
            name: name.into(),
            index,
        }
    }
}

/// Ordered mapping from raw table positions to feature names.
///
/// The order of the entries is the column order of the observation matrix
/// and of every exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(pub Vec<ColumnSpec>);

impl Default for ColumnMapping {
    /// Four logit-scale rates stored at positions 20, 22, 24 and 26.
    fn default() -> Self {
        ColumnMapping(vec![
            ColumnSpec::new("ns", 20),
            ColumnSpec::new("m", 22),
            ColumnSpec::new("d", 24),
            ColumnSpec::new("e", 26),
        ])
    }
}

impl ColumnMapping {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.0.iter().map(|c| c.index).collect()
    }

    pub fn validate(&self) -> LpaResult<()> {
        if self.is_empty() {
            return Err(LpaError::Config("column mapping is empty".into()));
        }
        for (i, spec) in self.0.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(LpaError::Config(format!("column #{} has an empty name", i)));
            }
            if spec.name == "cluster" {
                return Err(LpaError::Config(
                    "\"cluster\" is reserved for the assignment column".into(),
                ));
            }
            if self.0[..i].iter().any(|other| other.name == spec.name) {
                return Err(LpaError::Config(format!(
                    "duplicate column name {:?}",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// Full configuration of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LpaConfig {
    /// Whitespace-delimited input table without header.
    pub input: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Component count of the finalized model. Chosen by a person after
    /// inspecting the comparison table, so there is no default.
    pub final_components: Option<usize>,
    pub columns: ColumnMapping,
    pub model: ModelConfig,
    pub sweep: SweepConfig,
}

impl Default for LpaConfig {
    fn default() -> Self {
        LpaConfig {
            input: None,
            output_dir: PathBuf::from("results"),
            final_components: None,
            columns: ColumnMapping::default(),
            model: ModelConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl LpaConfig {
    pub fn from_toml_str(text: &str) -> LpaResult<Self> {
        toml::from_str(text).map_err(|e| LpaError::Config(format!("malformed TOML: {}", e)))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> LpaResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| LpaError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Checks every section and returns the required final component count.
    pub fn validate(&self) -> LpaResult<usize> {
        self.model.validate()?;
        self.sweep.validate()?;
        self.columns.validate()?;
        match self.final_components {
            Some(0) => Err(LpaError::Config("final_components must be at least 1".into())),
            Some(k) => Ok(k),
            None => Err(LpaError::Config(
                "final_components is required; choose it from the comparison table".into(),
            )),
        }
    }
}
