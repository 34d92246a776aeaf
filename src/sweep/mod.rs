use crate::error::{FailureKind, HarnessError, Result};
use crate::phase::{CellFiles, PhaseMetrics, PhaseTimingResolver};
use crate::session::SessionTransport;
use crate::workload::{generate_operation_file, generate_storage_file, OperationSpec, PositionPolicy, ValuePolicy};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// One variant of the subject binary: a name plus flags appended to the store command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Configuration {
    pub fn new<I, S>(name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), flags: flags.into_iter().map(Into::into).collect() }
    }
}

/// Immutable, validated declaration of the matrix to sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixDefinition {
    configurations: Vec<Configuration>,
    data_sizes: Vec<u64>,
}

impl MatrixDefinition {
    pub fn new(configurations: Vec<Configuration>, data_sizes: Vec<u64>) -> Result<Self> {
        if configurations.is_empty() {
            return Err(HarnessError::invalid("matrix needs at least one configuration"));
        }
        if data_sizes.is_empty() {
            return Err(HarnessError::invalid("matrix needs at least one data size"));
        }

        let mut names = HashSet::new();
        for configuration in &configurations {
            let name = configuration.name.as_str();
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(HarnessError::invalid(format!("invalid configuration name `{}`", name)));
            }
            if !names.insert(name) {
                return Err(HarnessError::invalid(format!("duplicate configuration `{}`", name)));
            }
        }

        let mut sizes = HashSet::new();
        for &size in &data_sizes {
            if size == 0 {
                return Err(HarnessError::invalid("data sizes must be positive"));
            }
            if !sizes.insert(size) {
                return Err(HarnessError::invalid(format!("duplicate data size {}", size)));
            }
        }

        Ok(Self { configurations, data_sizes })
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn data_sizes(&self) -> &[u64] {
        &self.data_sizes
    }

    pub fn cell_count(&self) -> usize {
        self.configurations.len() * self.data_sizes.len()
    }
}

/// What the sweep recorded for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CellOutcome {
    Measured(PhaseMetrics),
    Failed { kind: FailureKind, message: String },
}

impl CellOutcome {
    pub fn metrics(&self) -> Option<&PhaseMetrics> {
        match self {
            CellOutcome::Measured(metrics) => Some(metrics),
            CellOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub size: u64,
    #[serde(flatten)]
    pub outcome: CellOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationResults {
    pub configuration: Configuration,
    pub cells: Vec<CellRecord>,
}

/// Every cell's outcome, configurations and sizes in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMatrix {
    pub data_sizes: Vec<u64>,
    pub configurations: Vec<ConfigurationResults>,
}

impl ResultMatrix {
    pub fn get(&self, configuration: &str, size: u64) -> Option<&CellOutcome> {
        self.configurations
            .iter()
            .find(|c| c.configuration.name == configuration)?
            .cells
            .iter()
            .find(|cell| cell.size == size)
            .map(|cell| &cell.outcome)
    }

    /// Measured points of one configuration, skipping failed cells.
    pub fn series<F>(&self, configuration: &str, value: F) -> Vec<(u64, f64)>
    where
        F: Fn(&PhaseMetrics) -> f64,
    {
        self.configurations
            .iter()
            .filter(|c| c.configuration.name == configuration)
            .flat_map(|c| c.cells.iter())
            .filter_map(|cell| cell.outcome.metrics().map(|m| (cell.size, value(m))))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, u64, FailureKind)> {
        self.configurations.iter().flat_map(|c| {
            c.cells.iter().filter_map(move |cell| match &cell.outcome {
                CellOutcome::Failed { kind, .. } => Some((c.configuration.name.as_str(), cell.size, *kind)),
                CellOutcome::Measured(_) => None,
            })
        })
    }
}

/// How the per-cell input files are synthesized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadSettings {
    pub store_values: ValuePolicy,
    pub read_ratio: f64,
    pub max_value: u64,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self { store_values: ValuePolicy::Scaled { factor: 10 }, read_ratio: 1.0, max_value: 100_000 }
    }
}

pub struct SweepDriver<T> {
    resolver: PhaseTimingResolver<T>,
    workdir: PathBuf,
    workload: WorkloadSettings,
    keep_inputs: bool,
    rng: StdRng,
}

impl<T: SessionTransport> SweepDriver<T> {
    pub fn new(resolver: PhaseTimingResolver<T>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            workdir: workdir.into(),
            workload: WorkloadSettings::default(),
            keep_inputs: false,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_workload(mut self, workload: WorkloadSettings) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn keep_inputs(mut self, keep: bool) -> Self {
        self.keep_inputs = keep;
        self
    }

    pub fn resolver(&self) -> &PhaseTimingResolver<T> {
        &self.resolver
    }

    /// Attempts every cell in declaration order. A failing cell is logged and
    /// recorded as [`CellOutcome::Failed`]; it never stops the sweep.
    pub fn run(&mut self, matrix: &MatrixDefinition) -> ResultMatrix {
        let mut results = ResultMatrix { data_sizes: matrix.data_sizes().to_vec(), configurations: Vec::new() };
        let total = matrix.cell_count();
        let mut done = 0;

        for configuration in matrix.configurations() {
            info!("=== Config {}, flags={:?} ===", configuration.name, configuration.flags);
            let mut cells = Vec::with_capacity(matrix.data_sizes().len());

            for &size in matrix.data_sizes() {
                done += 1;
                info!("({}/{}) {} with data size {}", done, total, configuration.name, size);

                let outcome = match self.run_cell(configuration, size) {
                    Ok(metrics) => {
                        info!(
                            "store: stash={}, time={:.3}s, capacity={}; operate: stash={}, time={:.3}s",
                            metrics.setup_stash,
                            metrics.setup_duration,
                            metrics.capacity,
                            metrics.operate_stash,
                            metrics.operate_duration
                        );
                        CellOutcome::Measured(metrics)
                    }
                    Err(err) => {
                        error!("cell {} / N={} failed ({}): {}", configuration.name, size, err.kind(), err);
                        if let HarnessError::SessionFailed { output, .. } = &err {
                            error!("last output of {} / N={}:\n{}", configuration.name, size, tail(output, 20));
                        }
                        CellOutcome::Failed { kind: err.kind(), message: err.to_string() }
                    }
                };
                cells.push(CellRecord { size, outcome });
            }

            results.configurations.push(ConfigurationResults { configuration: configuration.clone(), cells });
        }

        results
    }

    fn run_cell(&mut self, configuration: &Configuration, size: u64) -> Result<PhaseMetrics> {
        let files = CellFiles::for_cell(&self.workdir, &configuration.name, size);
        let spec = OperationSpec {
            read_ratio: self.workload.read_ratio,
            positions: PositionPolicy::Sequential,
            max_value: self.workload.max_value,
        };

        let measured = generate_storage_file(size, &files.store, self.workload.store_values, &mut self.rng)
            .and_then(|_| generate_operation_file(size, &files.operations, &spec, &mut self.rng))
            .and_then(|_| self.resolver.measure(&configuration.flags, &files));

        if !self.keep_inputs {
            for path in [&files.store, &files.operations] {
                if let Err(err) = fs::remove_file(path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!("could not remove {}: {}", path.display(), err);
                    }
                }
            }
        }

        measured
    }
}

/// Last `lines` lines of `text`.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
