//! Ad-hoc workload file generator.
//!
//! Usage:
//!   filegen storage 1000                       # storage.txt, random values
//!   filegen operation 500 --read-ratio 0.8     # operations.txt

use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;
use oram_bench_harness::workload::{
    generate_operation_file, generate_storage_file, OperationSpec, PositionPolicy, ValuePolicy,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FileKind {
    Storage,
    Operation,
}

#[derive(Parser, Debug)]
#[command(name = "filegen", about = "Generate test files for the subject binary")]
struct Cli {
    /// Type of file to generate.
    #[arg(value_enum)]
    kind: FileKind,

    /// Number of lines to generate.
    n: u64,

    /// Output filename (storage.txt or operations.txt by default).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum value for random numbers.
    #[arg(long, default_value_t = 100_000)]
    max_value: u64,

    /// Maximum position for operations.
    #[arg(long, default_value_t = 10_000)]
    max_position: u64,

    /// Ratio of read operations (0.0-1.0).
    #[arg(long, default_value_t = 0.5)]
    read_ratio: f64,

    /// Seed for reproducible files.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match cli.kind {
        FileKind::Storage => {
            let output = cli.output.unwrap_or_else(|| PathBuf::from("storage.txt"));
            let lines = generate_storage_file(cli.n, &output, ValuePolicy::Random { max_value: cli.max_value }, &mut rng)?;
            info!("Generated storage file '{}' with {} lines", output.display(), lines);
        }
        FileKind::Operation => {
            let output = cli.output.unwrap_or_else(|| PathBuf::from("operations.txt"));
            let spec = OperationSpec {
                read_ratio: cli.read_ratio,
                positions: PositionPolicy::Random { max_position: cli.max_position },
                max_value: cli.max_value,
            };
            let lines = generate_operation_file(cli.n, &output, &spec, &mut rng)?;
            info!("Generated operation file '{}' with {} lines", output.display(), lines);
        }
    }

    Ok(())
}
