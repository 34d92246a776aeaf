//! Re-prints tables and re-renders charts from a saved results file.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use oram_bench_harness::chart::render_all;
use oram_bench_harness::report::{print_report, read_results};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "report", about = "Report on a saved sweep results file")]
struct Cli {
    /// Results JSON written by `sweep`.
    results: PathBuf,

    /// Prefix for the rendered charts.
    #[arg(long, default_value = "")]
    output_prefix: String,

    /// Directory for the rendered charts.
    #[arg(long, default_value = ".")]
    chart_dir: PathBuf,

    /// Only print tables.
    #[arg(long)]
    no_charts: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let results = read_results(&cli.results).with_context(|| format!("reading {}", cli.results.display()))?;
    print_report(&results);

    if !cli.no_charts {
        render_all(&results, &cli.chart_dir, &cli.output_prefix)?;
    }

    Ok(())
}
