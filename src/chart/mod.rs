use crate::error::{HarnessError, Result};
use crate::report::Metric;
use crate::sweep::ResultMatrix;
use log::info;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const CHART_SIZE: (u32, u32) = (900, 600);

fn chart_err<E: std::fmt::Display>(err: E) -> HarnessError {
    HarnessError::Chart(err.to_string())
}

type Series = (String, Vec<(f64, f64)>);

fn collect_series(results: &ResultMatrix, metric: Metric) -> Vec<Series> {
    results
        .configurations
        .iter()
        .map(|c| {
            let name = &c.configuration.name;
            let points: Vec<(f64, f64)> =
                results.series(name, |m| metric.value(m)).into_iter().map(|(x, y)| (x as f64, y)).collect();
            (name.clone(), points)
        })
        .filter(|(_, points)| !points.is_empty())
        .collect()
}

/// Renders `metric` into `path`. Returns `false` when no cell was measured
/// and nothing was drawn.
pub fn render_chart(results: &ResultMatrix, metric: Metric, path: &Path) -> Result<bool> {
    let series = collect_series(results, metric);
    if series.is_empty() {
        return Ok(false);
    }
    let points = series.iter().flat_map(|(_, p)| p.iter());
    let (mut min_x, mut max_x, mut max_y) = (f64::MAX, f64::MIN, 0.0f64);
    for &(x, y) in points {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    if min_x == max_x {
        min_x /= 2.0;
        max_x *= 2.0;
    }
    let max_y = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(metric.title(), ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d((min_x..max_x).log_scale(), 0f64..max_y)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Data size (N)")
        .y_desc(metric.axis_label())
        .draw()
        .map_err(chart_err)?;

    for (i, (name, points)) in series.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.9);
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(chart_err)?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart
            .draw_series(points.iter().map(|&point| Circle::new(point, 4, color.filled())))
            .map_err(chart_err)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;

    Ok(true)
}

/// Renders every metric into `<dir>/<prefix><stem>.svg`.
pub fn render_all(results: &ResultMatrix, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for metric in Metric::ALL {
        let path = dir.join(format!("{}{}.svg", prefix, metric.file_stem()));
        if render_chart(results, metric, &path)? {
            info!("Saved {}", path.display());
            written.push(path);
        }
    }
    Ok(written)
}
