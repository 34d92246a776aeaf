//! Runs the full configuration × data-size sweep against a subject binary.
//!
//! Usage:
//!   sweep --bin ../oram                          # reference matrix
//!   sweep --bin ../oram --output-prefix run1_    # prefixed artifacts
//!   sweep --bin ../oram --config sweep.json      # custom matrix and metrics

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use oram_bench_harness::chart::render_all;
use oram_bench_harness::config::SweepConfig;
use oram_bench_harness::phase::{ensure_single_token, PhaseTimingResolver};
use oram_bench_harness::report::{print_report, write_results};
use oram_bench_harness::session::{resolve_binary, ProcessTransport, SessionRunner};
use oram_bench_harness::sweep::SweepDriver;
use std::fs;
use std::path::{Path, PathBuf};

const RESULTS_FILE: &str = "sweep_results.json";

#[derive(Parser, Debug)]
#[command(name = "sweep", about = "Benchmark sweep over configurations and data sizes")]
struct Cli {
    /// Path to the subject binary.
    #[arg(long = "bin")]
    binary: PathBuf,

    /// Prefix for every produced chart and the default results file.
    #[arg(long, default_value = "")]
    output_prefix: String,

    /// JSON sweep configuration; the reference matrix is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the generated input files.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Where to write the JSON results (default: <prefix>sweep_results.json).
    #[arg(long)]
    results: Option<PathBuf>,

    /// Per-session timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Pin the subject binary to this CPU core.
    #[arg(long)]
    core: Option<usize>,

    /// Seed for the workload generator.
    #[arg(long)]
    seed: Option<u64>,

    /// Keep the generated input files after each cell.
    #[arg(long)]
    keep_inputs: bool,

    /// Skip chart rendering.
    #[arg(long)]
    no_charts: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let binary = resolve_binary(&cli.binary)?;
    ensure_single_token(&cli.workdir).context("--workdir is passed to the subject binary")?;

    let mut config = match &cli.config {
        Some(path) => SweepConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SweepConfig::default(),
    };
    if let Some(timeout) = cli.timeout {
        config.session_timeout_secs = timeout;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.keep_inputs |= cli.keep_inputs;

    let matrix = config.matrix()?;
    let registry = config.registry()?;
    fs::create_dir_all(&cli.workdir)?;

    info!(
        "Sweeping {} configurations x {} data sizes with {}",
        matrix.configurations().len(),
        matrix.data_sizes().len(),
        binary.display()
    );

    let transport = ProcessTransport::new(&binary).with_core(cli.core);
    let runner = SessionRunner::new(transport, config.session_timeout());
    let resolver = PhaseTimingResolver::new(runner, registry, config.bucket_size);
    let mut driver = SweepDriver::new(resolver, &cli.workdir)
        .with_workload(config.workload())
        .with_seed(config.seed)
        .keep_inputs(config.keep_inputs);

    let results = driver.run(&matrix);

    let results_path = cli
        .results
        .unwrap_or_else(|| PathBuf::from(format!("{}{}", cli.output_prefix, RESULTS_FILE)));
    write_results(&results, &results_path)?;
    info!("Saved {}", results_path.display());

    print_report(&results);

    if !cli.no_charts {
        let written = render_all(&results, Path::new("."), &cli.output_prefix)?;
        if written.is_empty() {
            warn!("No cell was measured; no charts written");
        }
    }

    Ok(())
}
