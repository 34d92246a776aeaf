//! Setup/operate phase isolation by differencing two sessions.
//!
//! The subject binary reports no internal phase timestamps, so the operate
//! cost is estimated as `combined - setup`, where `setup` is a session that
//! only loads seed data and `combined` loads the same data and then replays the
//! operation file. Both raw durations are kept so the noise of two independent
//! launches stays visible next to the derived value.

use crate::error::{HarnessError, Result};
use crate::metrics::{ExtractedMetrics, MetricRegistry, CAPACITY, STASH_SIZE};
use crate::session::{SessionRunner, SessionTransport};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BUCKET_SIZE: usize = 4;

/// Input files owned by one matrix cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellFiles {
    pub store: PathBuf,
    pub operations: PathBuf,
}

impl CellFiles {
    /// Deterministic names for (configuration, size) inside `dir`.
    pub fn for_cell(dir: &Path, configuration: &str, size: u64) -> Self {
        Self {
            store: dir.join(format!("store_{}_{}.txt", size, configuration)),
            operations: dir.join(format!("ops_{}_{}.txt", size, configuration)),
        }
    }
}

/// Fails when `path` would not survive the subject's whitespace tokenizing
/// as a single command argument.
pub fn ensure_single_token(path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return Err(HarnessError::invalid(format!("path `{}` is empty or contains whitespace", text)));
    }
    Ok(())
}

/// Measurements of one (configuration, size) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    /// Stash size reported after setup only.
    pub setup_stash: u64,
    /// Seconds spent in the setup-only session.
    pub setup_duration: f64,
    /// Capacity reported after setup only.
    pub capacity: u64,
    /// Stash size reported by the setup+operate session.
    pub operate_stash: u64,
    /// Seconds spent in the setup+operate session.
    pub combined_duration: f64,
    /// `max(combined_duration - setup_duration, 0)`.
    pub operate_duration: f64,
    #[serde(default)]
    pub setup_metrics: ExtractedMetrics,
    #[serde(default)]
    pub operate_metrics: ExtractedMetrics,
}

/// Operate-only cost, floored at zero when noise makes the combined session
/// look faster than setup alone.
pub fn derive_operate_duration(setup: f64, combined: f64) -> f64 {
    (combined - setup).max(0.0)
}

fn metric(metrics: &ExtractedMetrics, name: &str) -> u64 {
    metrics.get(name).map_or(0, |v| v.as_u64())
}

pub struct PhaseTimingResolver<T> {
    runner: SessionRunner<T>,
    registry: MetricRegistry,
    bucket_size: usize,
}

impl<T: SessionTransport> PhaseTimingResolver<T> {
    pub fn new(runner: SessionRunner<T>, registry: MetricRegistry, bucket_size: usize) -> Self {
        Self { runner, registry, bucket_size }
    }

    pub fn runner(&self) -> &SessionRunner<T> {
        &self.runner
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    fn store_command(&self, files: &CellFiles, flags: &[String]) -> String {
        let mut command = format!("store {} {}", files.store.display(), self.bucket_size);
        for flag in flags {
            command.push(' ');
            command.push_str(flag);
        }
        command
    }

    /// Runs the setup-only session, then the setup+operate session.
    pub fn measure(&mut self, flags: &[String], files: &CellFiles) -> Result<PhaseMetrics> {
        ensure_single_token(&files.store)?;
        ensure_single_token(&files.operations)?;
        let store = self.store_command(files, flags);

        let setup = self.runner.run(&[store.as_str(), "print sizes"])?;
        let setup_metrics = self.registry.extract_all(&setup.output)?;
        debug!("setup session: {:.3}s {:?}", setup.elapsed, setup_metrics);

        let operate = format!("operate {}", files.operations.display());
        let combined = self.runner.run(&[store.as_str(), operate.as_str()])?;
        let operate_metrics = self.registry.extract_all(&combined.output)?;
        debug!("combined session: {:.3}s {:?}", combined.elapsed, operate_metrics);

        Ok(PhaseMetrics {
            setup_stash: metric(&setup_metrics, STASH_SIZE),
            setup_duration: setup.elapsed,
            capacity: metric(&setup_metrics, CAPACITY),
            operate_stash: metric(&operate_metrics, STASH_SIZE),
            combined_duration: combined.elapsed,
            operate_duration: derive_operate_duration(setup.elapsed, combined.elapsed),
            setup_metrics,
            operate_metrics,
        })
    }
}
