//! Aggregation of metric records into tables and plot series.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use qcut_ir::Topology;
use serde::Serialize;

use crate::error::{CutError, CutResult};
use crate::metrics::{m1_mae, m1_rmse};
use crate::pipeline::Pipeline;
use crate::record::{ConfigurationStatus, MetricRecord};
use crate::source::Kernel;

/// One table row: a pipeline on one kernel and topology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub pipeline: Pipeline,
    pub kernel: Kernel,
    pub topology: Topology,
    pub records: usize,
    pub succeeded: usize,
    pub flagged: usize,
    pub failed: usize,
    /// Mean absolute error against the ideal references.
    pub m1_mae: Option<f64>,
    pub m1_rmse: Option<f64>,
    pub m2_depth_ratio: Option<f64>,
    pub m3_overhead: Option<f64>,
    pub m4_variance: Option<f64>,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Group records by (pipeline, kernel, topology), in that order.
pub fn summarize(records: &[MetricRecord]) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(Pipeline, Kernel, Topology), Vec<&MetricRecord>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.pipeline, r.configuration.kernel, r.configuration.topology))
            .or_default()
            .push(r);
    }

    groups
        .into_iter()
        .map(|((pipeline, kernel, topology), rows)| {
            let count = |s: ConfigurationStatus| rows.iter().filter(|r| r.status == s).count();
            let (ideal, approx): (Vec<f64>, Vec<f64>) = rows
                .iter()
                .filter_map(|r| Some((r.m1.as_ref()?.reference?, r.estimate.as_ref()?.value)))
                .unzip();
            let depth: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.m2.as_ref()?.depth_ratio.value())
                .collect();
            let overhead: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.m3.as_ref()?.overhead.value())
                .collect();
            let variance: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.m4.as_ref()?.variance.value())
                .collect();
            SummaryRow {
                pipeline,
                kernel,
                topology,
                records: rows.len(),
                succeeded: count(ConfigurationStatus::Succeeded),
                flagged: count(ConfigurationStatus::Flagged),
                failed: count(ConfigurationStatus::Failed),
                m1_mae: m1_mae(&ideal, &approx),
                m1_rmse: m1_rmse(&ideal, &approx),
                m2_depth_ratio: mean(&depth),
                m3_overhead: mean(&overhead),
                m4_variance: mean(&variance),
            }
        })
        .collect()
}

/// Metric plotted on the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMetric {
    /// Absolute error.
    M1,
    /// Depth ratio.
    M2,
    /// Call overhead.
    M3,
    /// Variance.
    M4,
}

impl PlotMetric {
    fn of(&self, record: &MetricRecord) -> Option<f64> {
        match self {
            PlotMetric::M1 => record.m1.as_ref()?.abs_error.value(),
            PlotMetric::M2 => record.m2.as_ref()?.depth_ratio.value(),
            PlotMetric::M3 => record.m3.as_ref()?.overhead.value(),
            PlotMetric::M4 => record.m4.as_ref()?.variance.value(),
        }
    }
}

impl FromStr for PlotMetric {
    type Err = CutError;

    fn from_str(s: &str) -> CutResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m1" | "accuracy" => Ok(PlotMetric::M1),
            "m2" | "inflation" => Ok(PlotMetric::M2),
            "m3" | "overhead" => Ok(PlotMetric::M3),
            "m4" | "stability" => Ok(PlotMetric::M4),
            other => Err(CutError::ConfigValidation(format!("unknown metric '{other}'"))),
        }
    }
}

/// Grid axis plotted on the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotAxis {
    NoiseLevel,
    DepthBudget,
    MaxCuts,
    NumQubits,
}

impl PlotAxis {
    fn of(&self, record: &MetricRecord) -> f64 {
        let key = &record.configuration;
        match self {
            PlotAxis::NoiseLevel => key.noise_level,
            PlotAxis::DepthBudget => key.depth_budget,
            PlotAxis::MaxCuts => key.max_cuts as f64,
            PlotAxis::NumQubits => f64::from(key.num_qubits),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlotAxis::NoiseLevel => "noise_level",
            PlotAxis::DepthBudget => "depth_budget",
            PlotAxis::MaxCuts => "max_cuts",
            PlotAxis::NumQubits => "num_qubits",
        }
    }
}

impl fmt::Display for PlotAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlotAxis {
    type Err = CutError;

    fn from_str(s: &str) -> CutResult<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "noise" | "noise_level" => Ok(PlotAxis::NoiseLevel),
            "depth" | "depth_budget" => Ok(PlotAxis::DepthBudget),
            "cuts" | "max_cuts" => Ok(PlotAxis::MaxCuts),
            "qubits" | "num_qubits" => Ok(PlotAxis::NumQubits),
            other => Err(CutError::ConfigValidation(format!("unknown axis '{other}'"))),
        }
    }
}

/// One point of a per-pipeline series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub pipeline: Pipeline,
    pub x: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Mean, min and max of `metric` per pipeline and `axis` value.
///
/// Records without the metric are skipped. Points are ordered by pipeline,
/// then ascending x.
pub fn plot_series(records: &[MetricRecord], metric: PlotMetric, axis: PlotAxis) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<(Pipeline, u64), Vec<f64>> = BTreeMap::new();
    for r in records {
        if let Some(y) = metric.of(r) {
            let x = axis.of(r);
            // Non-negative axis values order correctly by their bit pattern.
            buckets.entry((r.pipeline, x.to_bits())).or_default().push(y);
        }
    }
    buckets
        .into_iter()
        .map(|((pipeline, x), ys)| SeriesPoint {
            pipeline,
            x: f64::from_bits(x),
            mean: ys.iter().sum::<f64>() / ys.len() as f64,
            min: ys.iter().copied().fold(f64::INFINITY, f64::min),
            max: ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            count: ys.len(),
        })
        .collect()
}

/// Render series points as CSV with a header row.
pub fn series_csv(points: &[SeriesPoint], axis: PlotAxis) -> String {
    let mut out = format!("pipeline,{axis},mean,min,max,count\n");
    for p in points {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            p.pipeline, p.x, p.mean, p.min, p.max, p.count
        );
    }
    out
}
