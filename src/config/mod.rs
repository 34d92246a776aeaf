use crate::error::Result;
use crate::metrics::{MetricRegistry, MetricRuleSpec};
use crate::phase::DEFAULT_BUCKET_SIZE;
use crate::sweep::{Configuration, MatrixDefinition, WorkloadSettings};
use crate::workload::ValuePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const MAX_SIZE_VALUE: &str = "64";
const R_RATIO: &str = "0.5";

/// Sweep settings as read from a JSON file. Every field has a default, so an
/// empty object `{}` describes the reference matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub configurations: Vec<Configuration>,
    pub data_sizes: Vec<u64>,
    pub bucket_size: usize,
    pub session_timeout_secs: u64,
    /// Seed values are `position * store_value_factor`.
    pub store_value_factor: u64,
    pub operation_read_ratio: f64,
    pub max_value: u64,
    pub seed: Option<u64>,
    pub keep_inputs: bool,
    pub extra_metrics: Vec<MetricRuleSpec>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            configurations: default_configurations(),
            data_sizes: vec![200_000, 1_000_000],
            bucket_size: DEFAULT_BUCKET_SIZE,
            session_timeout_secs: 600,
            store_value_factor: 10,
            operation_read_ratio: 1.0,
            max_value: 100_000,
            seed: None,
            keep_inputs: false,
            extra_metrics: Vec::new(),
        }
    }
}

fn default_configurations() -> Vec<Configuration> {
    vec![
        Configuration::new("no_opt", Vec::<String>::new()),
        Configuration::new("max_size", ["--max-size", MAX_SIZE_VALUE]),
        Configuration::new("ring", ["-rp"]),
        Configuration::new("random_r_plus_ring", ["--r", R_RATIO, "-rp"]),
        Configuration::new("maxsize_plus_ring", ["--max-size", MAX_SIZE_VALUE, "-rp"]),
    ]
}

impl SweepConfig {
    /// Loads a config from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn matrix(&self) -> Result<MatrixDefinition> {
        MatrixDefinition::new(self.configurations.clone(), self.data_sizes.clone())
    }

    /// The standard rules plus every extra rule from the file.
    pub fn registry(&self) -> Result<MetricRegistry> {
        let mut registry = MetricRegistry::standard()?;
        for spec in &self.extra_metrics {
            registry.register(spec.compile()?)?;
        }
        Ok(registry)
    }

    pub fn workload(&self) -> WorkloadSettings {
        WorkloadSettings {
            store_values: ValuePolicy::Scaled { factor: self.store_value_factor },
            read_ratio: self.operation_read_ratio,
            max_value: self.max_value,
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;

    #[test]
    fn empty_object_is_the_reference_matrix() {
        let config: SweepConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SweepConfig::default());

        let matrix = config.matrix().unwrap();
        let names: Vec<&str> = matrix.configurations().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["no_opt", "max_size", "ring", "random_r_plus_ring", "maxsize_plus_ring"]);
        assert_eq!(matrix.data_sizes(), &[200_000, 1_000_000]);
        assert_eq!(matrix.configurations()[3].flags, vec!["--r", "0.5", "-rp"]);
        assert_eq!(config.session_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn partial_file_overrides_fields() {
        let json = r#"{
            "configurations": [{ "name": "ring", "flags": ["-rp"] }, { "name": "plain" }],
            "data_sizes": [1000],
            "bucket_size": 8,
            "extra_metrics": [{ "name": "levels", "pattern": "tree levels: (\\d+)" }]
        }"#;
        let config: SweepConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.bucket_size, 8);
        assert_eq!(config.configurations[1].flags, Vec::<String>::new());
        assert_eq!(config.max_value, 100_000);

        let registry = config.registry().unwrap();
        let metrics = registry.extract_all("Tree levels: 17").unwrap();
        assert_eq!(metrics["levels"], MetricValue::Integer(17));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(&path, r#"{ "data_sizes": [10, 100], "seed": 9 }"#).unwrap();

        let config = SweepConfig::load(&path).unwrap();
        assert_eq!(config.data_sizes, vec![10, 100]);
        assert_eq!(config.seed, Some(9));
        assert!(SweepConfig::load(dir.path().join("missing.json")).is_err());
    }
}
