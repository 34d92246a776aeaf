//! Synthetic input files for the subject binary.
//!
//! Two line-oriented formats are produced:
//! - storage (seed) files: `<position> <value>` for every position in `1..=n`
//! - operation files: `R <position>` or `W <position> <value>` per line

use crate::error::{HarnessError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// How values in a storage file are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValuePolicy {
    /// Uniform in `1..=max_value`.
    Random { max_value: u64 },
    /// `position * factor`.
    Scaled { factor: u64 },
}

/// How positions in an operation file are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionPolicy {
    /// The line index, starting at 1.
    Sequential,
    /// Uniform in `1..=max_position`.
    Random { max_position: u64 },
}

/// Parameters of an operation file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Probability that a line is a read.
    pub read_ratio: f64,
    pub positions: PositionPolicy,
    /// Upper bound for values written by `W` records.
    pub max_value: u64,
}

impl OperationSpec {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.read_ratio) {
            return Err(HarnessError::invalid(format!(
                "read ratio must be within [0.0, 1.0], got {}",
                self.read_ratio
            )));
        }
        if self.max_value == 0 {
            return Err(HarnessError::invalid("max value must be positive"));
        }
        if let PositionPolicy::Random { max_position: 0 } = self.positions {
            return Err(HarnessError::invalid("max position must be positive"));
        }
        Ok(())
    }
}

impl ValuePolicy {
    fn validate(&self) -> Result<()> {
        match *self {
            ValuePolicy::Random { max_value: 0 } => Err(HarnessError::invalid("max value must be positive")),
            ValuePolicy::Scaled { factor: 0 } => Err(HarnessError::invalid("value factor must be positive")),
            _ => Ok(()),
        }
    }

    fn value_for<R: Rng + ?Sized>(&self, position: u64, rng: &mut R) -> u64 {
        match *self {
            ValuePolicy::Random { max_value } => rng.gen_range(1..=max_value),
            ValuePolicy::Scaled { factor } => position.saturating_mul(factor),
        }
    }
}

/// Writes `n` storage lines to `path`, overwriting it. Returns the line count.
pub fn generate_storage_file<P, R>(n: u64, path: P, policy: ValuePolicy, rng: &mut R) -> Result<u64>
where
    P: AsRef<Path>,
    R: Rng + ?Sized,
{
    policy.validate()?;

    let mut writer = BufWriter::new(File::create(path)?);
    for position in 1..=n {
        let value = policy.value_for(position, rng);
        writeln!(writer, "{} {}", position, value)?;
    }
    writer.flush()?;

    Ok(n)
}

/// Writes `n` read/write records to `path`, overwriting it. Each line is a
/// read with probability `spec.read_ratio`. Returns the line count.
pub fn generate_operation_file<P, R>(n: u64, path: P, spec: &OperationSpec, rng: &mut R) -> Result<u64>
where
    P: AsRef<Path>,
    R: Rng + ?Sized,
{
    spec.validate()?;

    let mut writer = BufWriter::new(File::create(path)?);
    for line in 1..=n {
        let position = match spec.positions {
            PositionPolicy::Sequential => line,
            PositionPolicy::Random { max_position } => rng.gen_range(1..=max_position),
        };
        if rng.gen_bool(spec.read_ratio) {
            writeln!(writer, "R {}", position)?;
        } else {
            let value = rng.gen_range(1..=spec.max_value);
            writeln!(writer, "W {} {}", position, value)?;
        }
    }
    writer.flush()?;

    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn storage_file_has_one_line_per_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.txt");
        let mut rng = StdRng::seed_from_u64(7);

        for n in [0u64, 1, 17] {
            let written = generate_storage_file(n, &path, ValuePolicy::Random { max_value: 50 }, &mut rng).unwrap();
            let lines = read_lines(&path);
            assert_eq!(written, n);
            assert_eq!(lines.len() as u64, n);
            for (i, line) in lines.iter().enumerate() {
                let tokens: Vec<u64> = line.split(' ').map(|t| t.parse().unwrap()).collect();
                assert_eq!(tokens.len(), 2);
                assert_eq!(tokens[0], i as u64 + 1);
                assert!((1..=50).contains(&tokens[1]));
            }
        }
    }

    #[test]
    fn scaled_values_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.txt");
        let mut rng = StdRng::seed_from_u64(1);

        generate_storage_file(3, &path, ValuePolicy::Scaled { factor: 10 }, &mut rng).unwrap();
        assert_eq!(read_lines(&path), vec!["1 10", "2 20", "3 30"]);
    }

    #[test]
    fn operation_records_match_their_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.txt");
        let mut rng = StdRng::seed_from_u64(42);
        let spec = OperationSpec {
            read_ratio: 0.5,
            positions: PositionPolicy::Random { max_position: 100 },
            max_value: 1000,
        };

        generate_operation_file(200, &path, &spec, &mut rng).unwrap();
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 200);
        for line in &lines {
            let tokens: Vec<&str> = line.split(' ').collect();
            match tokens[0] {
                "R" => assert_eq!(tokens.len(), 2),
                "W" => {
                    assert_eq!(tokens.len(), 3);
                    let value: u64 = tokens[2].parse().unwrap();
                    assert!((1..=1000).contains(&value));
                }
                other => panic!("unexpected marker {}", other),
            }
            let position: u64 = tokens[1].parse().unwrap();
            assert!((1..=100).contains(&position));
        }
        assert!(lines.iter().any(|l| l.starts_with('R')));
        assert!(lines.iter().any(|l| l.starts_with('W')));
    }

    #[test]
    fn extreme_ratios_produce_a_single_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.txt");
        let mut rng = StdRng::seed_from_u64(3);
        let mut spec = OperationSpec { read_ratio: 0.0, positions: PositionPolicy::Sequential, max_value: 9 };

        generate_operation_file(4, &path, &spec, &mut rng).unwrap();
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.starts_with("W ")));

        spec.read_ratio = 1.0;
        generate_operation_file(4, &path, &spec, &mut rng).unwrap();
        assert_eq!(read_lines(&path), vec!["R 1", "R 2", "R 3", "R 4"]);
    }

    #[test]
    fn out_of_range_ratio_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for ratio in [-0.1, 1.5, f64::NAN] {
            let path = dir.path().join(format!("ops_{}.txt", ratio));
            let spec = OperationSpec { read_ratio: ratio, positions: PositionPolicy::Sequential, max_value: 10 };
            let err = generate_operation_file(4, &path, &spec, &mut rng).unwrap_err();
            assert!(matches!(err, HarnessError::InvalidParameter(_)));
            assert!(!path.exists());
        }
    }

    #[test]
    fn existing_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.txt");
        fs::write(&path, "stale\nstale\nstale\nstale\nstale\n").unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        generate_storage_file(2, &path, ValuePolicy::Scaled { factor: 1 }, &mut rng).unwrap();
        assert_eq!(read_lines(&path), vec!["1 1", "2 2"]);
    }
}
