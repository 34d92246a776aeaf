use crate::error::Result;
use crate::phase::PhaseMetrics;
use crate::sweep::ResultMatrix;
use prettytable::{row, Cell, Row, Table};
use std::fs;
use std::path::Path;

/// A per-cell quantity that gets its own table, ranking and chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    SetupStash,
    SetupTime,
    Capacity,
    OperateStash,
    OperateTime,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::SetupStash,
        Metric::SetupTime,
        Metric::Capacity,
        Metric::OperateStash,
        Metric::OperateTime,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Metric::SetupStash => "Store Phase: Stash vs Data size",
            Metric::SetupTime => "Store Phase: Time vs Data size",
            Metric::Capacity => "Tree Capacity vs Data size",
            Metric::OperateStash => "Operate Phase: Stash vs Data size",
            Metric::OperateTime => "Operate Phase: Time vs Data size",
        }
    }

    pub fn axis_label(&self) -> &'static str {
        match self {
            Metric::SetupStash | Metric::OperateStash => "Max stash size",
            Metric::SetupTime | Metric::OperateTime => "Elapsed time (s)",
            Metric::Capacity => "Tree capacity",
        }
    }

    /// Artifact name without prefix or extension.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Metric::SetupStash => "store_stash_vs_datasize",
            Metric::SetupTime => "store_time_vs_datasize",
            Metric::Capacity => "capacity_vs_datasize",
            Metric::OperateStash => "operate_stash_vs_datasize",
            Metric::OperateTime => "operate_time_vs_datasize",
        }
    }

    pub fn value(&self, metrics: &PhaseMetrics) -> f64 {
        match self {
            Metric::SetupStash => metrics.setup_stash as f64,
            Metric::SetupTime => metrics.setup_duration,
            Metric::Capacity => metrics.capacity as f64,
            Metric::OperateStash => metrics.operate_stash as f64,
            Metric::OperateTime => metrics.operate_duration,
        }
    }

    fn is_time(&self) -> bool {
        matches!(self, Metric::SetupTime | Metric::OperateTime)
    }

    fn format(&self, value: f64) -> String {
        if self.is_time() {
            format!("{:.3}", value)
        } else {
            format!("{:.1}", value)
        }
    }
}

/// Mean of `metric` over each configuration's measured cells, best (lowest)
/// first. Configurations without a single measured cell are left out.
pub fn rank(results: &ResultMatrix, metric: Metric) -> Vec<(String, f64)> {
    let mut ranking: Vec<(String, f64)> = results
        .configurations
        .iter()
        .filter_map(|c| {
            let values = results.series(&c.configuration.name, |m| metric.value(m));
            if values.is_empty() {
                return None;
            }
            let mean = values.iter().map(|&(_, v)| v).sum::<f64>() / values.len() as f64;
            Some((c.configuration.name.clone(), mean))
        })
        .collect();
    ranking.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranking
}

/// Configurations as rows, data sizes as columns. Failed cells print as `-`.
pub fn metric_table(results: &ResultMatrix, metric: Metric) -> Table {
    let mut table = Table::new();

    let mut header = vec![Cell::new("Configuration")];
    header.extend(results.data_sizes.iter().map(|size| Cell::new(&size.to_string())));
    header.push(Cell::new("Mean"));
    table.add_row(Row::new(header));

    let means = rank(results, metric);
    for c in &results.configurations {
        let name = &c.configuration.name;
        let mut row = vec![Cell::new(name)];
        for &size in &results.data_sizes {
            let text = results
                .get(name, size)
                .and_then(|outcome| outcome.metrics())
                .map_or_else(|| "-".to_string(), |m| metric.format(metric.value(m)));
            row.push(Cell::new(&text));
        }
        let mean = means.iter().find(|(n, _)| n == name).map_or_else(|| "-".to_string(), |&(_, v)| metric.format(v));
        row.push(Cell::new(&mean));
        table.add_row(Row::new(row));
    }

    table
}

/// Prints a comparison table and ranking for every metric, then any failures.
pub fn print_report(results: &ResultMatrix) {
    for metric in Metric::ALL {
        println!("\n{} ({})", metric.title(), metric.axis_label());
        metric_table(results, metric).printstd();

        println!("Ranking (best to worst):");
        for (i, (name, mean)) in rank(results, metric).iter().enumerate() {
            println!("{}. {}: {}", i + 1, name, metric.format(*mean));
        }
    }

    let failures: Vec<_> = results.failures().collect();
    if !failures.is_empty() {
        let mut table = Table::new();
        table.add_row(row!["Configuration", "Data size", "Failure"]);
        for (name, size, kind) in failures {
            table.add_row(row![name, size, kind]);
        }
        println!("\nFailed cells (omitted above):");
        table.printstd();
    }
}

/// Writes the whole result matrix as pretty JSON, replacing `path`.
pub fn write_results(results: &ResultMatrix, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_results(path: &Path) -> Result<ResultMatrix> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::sweep::{CellOutcome, CellRecord, Configuration, ConfigurationResults};

    fn measured(stash: u64, time: f64) -> CellOutcome {
        CellOutcome::Measured(PhaseMetrics {
            setup_stash: stash,
            setup_duration: time,
            capacity: 64,
            operate_stash: stash + 1,
            combined_duration: time * 3.0,
            operate_duration: time * 2.0,
            setup_metrics: Default::default(),
            operate_metrics: Default::default(),
        })
    }

    fn sample() -> ResultMatrix {
        let failed = CellOutcome::Failed { kind: FailureKind::SessionTimeout, message: "timeout".into() };
        ResultMatrix {
            data_sizes: vec![10, 100],
            configurations: vec![
                ConfigurationResults {
                    configuration: Configuration::new("slow", Vec::<String>::new()),
                    cells: vec![
                        CellRecord { size: 10, outcome: measured(8, 2.0) },
                        CellRecord { size: 100, outcome: measured(12, 4.0) },
                    ],
                },
                ConfigurationResults {
                    configuration: Configuration::new("fast", ["-rp"]),
                    cells: vec![
                        CellRecord { size: 10, outcome: measured(3, 1.0) },
                        CellRecord { size: 100, outcome: failed.clone() },
                    ],
                },
                ConfigurationResults {
                    configuration: Configuration::new("broken", ["-x"]),
                    cells: vec![
                        CellRecord { size: 10, outcome: failed.clone() },
                        CellRecord { size: 100, outcome: failed },
                    ],
                },
            ],
        }
    }

    #[test]
    fn ranking_ignores_failed_cells() {
        let ranking = rank(&sample(), Metric::SetupStash);
        assert_eq!(ranking, vec![("fast".to_string(), 3.0), ("slow".to_string(), 10.0)]);

        let ranking = rank(&sample(), Metric::OperateTime);
        assert_eq!(ranking[0], ("fast".to_string(), 2.0));
        assert_eq!(ranking[1], ("slow".to_string(), 6.0));
    }

    #[test]
    fn table_marks_failures() {
        let table = metric_table(&sample(), Metric::SetupTime);
        let text = table.to_string();
        assert_eq!(table.len(), 4);
        assert!(text.contains("2.000"));
        assert!(text.contains("broken"));
        assert!(text.contains("| -"));
    }

    #[test]
    fn results_survive_a_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let results = sample();

        write_results(&results, &path).unwrap();
        assert_eq!(read_results(&path).unwrap(), results);
    }

    #[test]
    fn stems_are_distinct() {
        let stems: std::collections::HashSet<_> = Metric::ALL.iter().map(Metric::file_stem).collect();
        assert_eq!(stems.len(), Metric::ALL.len());
    }
}
