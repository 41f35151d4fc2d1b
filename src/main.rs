use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use suitecheck::config::Settings;
use suitecheck::workflow::Orchestrator;
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "suitecheck",
    about = "Evaluate and improve test suites against a catalog of testing best practices",
    version
)]
#[command(group = ArgGroup::new("mode").required(true))]
struct Args {
    /// Generate a best-practice compliance report
    #[arg(long, group = "mode")]
    check: bool,

    /// Generate an improved version of the test suite plus the report
    #[arg(long, group = "mode")]
    improve: bool,

    /// Path to the test suite file to evaluate
    #[arg(long = "test-set", value_name = "FILE")]
    test_set: PathBuf,

    /// Directory where output files are written
    #[arg(long = "output-dir", value_name = "DIR")]
    output_dir: PathBuf,

    /// Override the configured LLM model
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Repeat the check N times and write a consistency report
    #[arg(long, value_name = "N", conflicts_with = "improve")]
    runs: Option<u32>,

    /// Path to a TOML settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Explicit log filter (overrides --verbose and RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "run failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if !args.test_set.is_file() {
        bail!("test set file not found: {}", args.test_set.display());
    }
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("failed to create output directory: {}", args.output_dir.display())
    })?;

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        settings.model = model;
    }

    eprintln!("suitecheck: evaluating {}", args.test_set.display());
    eprintln!("  model: {}", settings.model);

    let orchestrator = Orchestrator::new(settings)?;
    eprintln!("  practices: {}", orchestrator.catalog().len());

    if args.improve {
        eprintln!("  improving test suite...");
        let outcome = orchestrator.improve(&args.test_set, &args.output_dir).await?;
        eprintln!("  report: {}", outcome.report_path.display());
        if let Some(path) = &outcome.improved_path {
            eprintln!("  improved test suite: {}", path.display());
        }
        if let Some(path) = &outcome.summary_path {
            eprintln!("  summary: {}", path.display());
        }
        eprintln!("  overall compliance: {}", outcome.compliance_score);
    } else if args.check {
        if let Some(runs) = args.runs.filter(|&n| n > 1) {
            eprintln!("  running consistency check ({runs} runs)...");
            let path = orchestrator
                .consistency(&args.test_set, &args.output_dir, runs)
                .await?;
            eprintln!("  consistency report: {}", path.display());
        } else {
            eprintln!("  checking best-practice compliance...");
            let outcome = orchestrator.check(&args.test_set, &args.output_dir).await?;
            eprintln!("  report: {}", outcome.report_path.display());
            eprintln!("  overall compliance: {}", outcome.compliance_score);
        }
    } else {
        bail!("select a mode: --check or --improve");
    }

    eprintln!("Done.");
    Ok(())
}

/// Log filter priority: --log-level, then --verbose, then RUST_LOG, then a
/// quiet default. Diagnostics go to stderr; report artifacts stay clean.
fn init_tracing(args: &Args) {
    let filter = if let Some(spec) = &args.log_level {
        EnvFilter::new(spec.clone())
    } else if args.verbose {
        EnvFilter::new("suitecheck=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("suitecheck=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
