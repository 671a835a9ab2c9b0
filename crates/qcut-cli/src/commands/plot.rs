//! Plot command implementation.
//!
//! Emits one CSV series per pipeline; rendering is left to the caller's
//! plotting tool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use qcut_core::{PlotAxis, PlotMetric, plot_series, series_csv};

use super::common::load_records;

/// Execute the plot command.
pub fn execute(paths: &[PathBuf], metric: &str, x: &str, output: Option<&Path>) -> Result<()> {
    let metric: PlotMetric = metric.parse()?;
    let axis: PlotAxis = x.parse()?;
    let records = load_records(paths)?;
    let points = plot_series(&records, metric, axis);
    let csv = series_csv(&points, axis);

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} Wrote {} point(s) to {}",
                style("OK").green().bold(),
                points.len(),
                path.display()
            );
        }
        None => print!("{csv}"),
    }
    Ok(())
}
