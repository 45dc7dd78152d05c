// Command-line entry point for latent profile analysis

use clap::Parser;
use latent_profile::{
    io::COMPARISON_HEADER, run_analysis, CovarianceType, LpaConfig, LpaError, LpaResult, SweepFailurePolicy,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

/// Fit Gaussian mixtures over a range of profile counts, report AIC/BIC,
/// log-likelihood and entropy, then label every observation with the chosen profile.
#[derive(Parser, Debug)]
#[command(name = "lpa", version, about)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Whitespace-delimited input table without header
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory receiving the comparison table, model and labeled dataset
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of profiles of the final model
    #[arg(short = 'k', long)]
    final_components: Option<usize>,

    #[arg(long, value_enum)]
    covariance_type: Option<CovarianceType>,

    #[arg(long)]
    random_state: Option<u64>,

    #[arg(long)]
    max_iter: Option<usize>,

    /// Largest profile count of the sweep
    #[arg(long)]
    max_components: Option<usize>,

    /// Fit sweep candidates in parallel
    #[arg(long)]
    parallel: bool,

    /// Omit candidates whose fit fails instead of aborting
    #[arg(long)]
    skip_failed_fits: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn resolve_config(&self) -> LpaResult<LpaConfig> {
        let mut config = match &self.config {
            Some(path) => LpaConfig::load(path)?,
            None => LpaConfig::default(),
        };
        if let Some(input) = &self.input {
            config.input = Some(input.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(k) = self.final_components {
            config.final_components = Some(k);
        }
        if let Some(covariance_type) = self.covariance_type {
            config.model.covariance_type = covariance_type;
        }
        if let Some(seed) = self.random_state {
            config.model.random_state = seed;
        }
        if let Some(max_iter) = self.max_iter {
            config.model.max_iter = max_iter;
        }
        if let Some(max_components) = self.max_components {
            config.sweep.max_components = max_components;
        }
        if self.parallel {
            config.sweep.parallel = true;
        }
        if self.skip_failed_fits {
            config.sweep.on_fit_failure = SweepFailurePolicy::Skip;
        }
        Ok(config)
    }
}

fn run(cli: &Cli) -> LpaResult<()> {
    let config = cli.resolve_config()?;
    let outcome = run_analysis(&config)?;

    println!("{}", COMPARISON_HEADER);
    for r in &outcome.table.records {
        println!(
            "{:.4},{:.4},{},{:.6},{:.6}",
            r.aic, r.bic, r.n_components, r.log_likelihood, r.entropy
        );
    }
    if !outcome.table.skipped.is_empty() {
        println!("skipped: {:?}", outcome.table.skipped);
    }

    let paths = outcome.persist(&config.output_dir).map_err(|e| {
        eprintln!("{}", persist_failure_hint(&e, &config.output_dir));
        e
    })?;
    println!("comparison table: {}", paths.comparison_table.display());
    println!("model:            {}", paths.model_file.display());
    println!("labeled dataset:  {}", paths.labeled_dataset.display());
    Ok(())
}

/// Tells the user which artifact could not be written and how to redirect the run.
fn persist_failure_hint(error: &LpaError, output_dir: &Path) -> String {
    let failed = match error {
        LpaError::Io { path, .. } => path.display().to_string(),
        _ => output_dir.display().to_string(),
    };
    format!(
        "could not write results to {}; the analysis finished, rerun with --output-dir <DIR> pointing at a writable directory",
        failed
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
