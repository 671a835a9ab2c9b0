//! Result rows and their on-disk formats.
//!
//! Metric records are appended as JSON lines, one per (pipeline,
//! configuration, replicate). Calibration output is a single pretty-printed
//! JSON document holding the committed plans and the per-configuration trial
//! table.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CommittedPlans;
use crate::calibrate::{PlanTag, SamplingPlan};
use crate::config::{ConfigurationKey, RunConfiguration};
use crate::error::{CutError, CutResult};
use crate::estimate::Estimate;
use crate::metrics::{m1_accuracy, m2_inflation, m3_overhead, m4_single, M1, M2, M3, M4};
use crate::pipeline::{Pipeline, PipelineOutput};

/// Outcome class of one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationStatus {
    Succeeded,
    /// Succeeded with under-budget or unstable output.
    Flagged,
    Failed,
}

/// Error carried by a failed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// `CutError::kind()`.
    pub kind: String,
    pub message: String,
}

impl From<&CutError> for RecordError {
    fn from(e: &CutError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub run_id: Uuid,
    pub grid: String,
    pub timestamp: DateTime<Utc>,
    pub pipeline: Pipeline,
    pub configuration: ConfigurationKey,
    pub replicate: u32,
    pub status: ConfigurationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<Estimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m1: Option<M1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m2: Option<M2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m3: Option<M3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m4: Option<M4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cuts: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_tag: Option<PlanTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,
}

impl MetricRecord {
    /// Row for a configuration that produced an estimate.
    pub fn from_output(run_id: Uuid, grid: &str, cfg: &RunConfiguration, output: PipelineOutput) -> Self {
        let est = output.estimate;
        let m1 = m1_accuracy(est.value, output.reference);
        let m2 = m2_inflation(output.original, output.executed);
        let m3 = m3_overhead(
            est.oracle_calls,
            output.baseline_calls,
            output.plan.as_ref().map(|_| est.samples_consumed),
            output.plan.as_ref().map(|p| p.kappa),
        );
        let m4 = m4_single(est.std_error, est.under_budget, est.unstable, est.max_residual);
        let status = if est.is_flagged() {
            ConfigurationStatus::Flagged
        } else {
            ConfigurationStatus::Succeeded
        };
        Self {
            run_id,
            grid: grid.to_string(),
            timestamp: Utc::now(),
            pipeline: cfg.pipeline,
            configuration: cfg.key.clone(),
            replicate: cfg.replicate,
            status,
            estimate: Some(est),
            m1: Some(m1),
            m2: Some(m2),
            m3: Some(m3),
            m4: Some(m4),
            num_cuts: output.num_cuts,
            plan_tag: output.plan.map(|p| p.tag),
            error: None,
        }
    }

    /// Row for a configuration that failed.
    pub fn failed(run_id: Uuid, grid: &str, cfg: &RunConfiguration, error: &CutError) -> Self {
        Self {
            run_id,
            grid: grid.to_string(),
            timestamp: Utc::now(),
            pipeline: cfg.pipeline,
            configuration: cfg.key.clone(),
            replicate: cfg.replicate,
            status: ConfigurationStatus::Failed,
            estimate: None,
            m1: None,
            m2: None,
            m3: None,
            m4: None,
            num_cuts: None,
            plan_tag: None,
            error: Some(error.into()),
        }
    }
}

/// Append-only JSON-lines sink.
pub struct RecordWriter {
    out: BufWriter<File>,
}

impl RecordWriter {
    /// Open `path` for appending, creating parent directories.
    pub fn append(path: impl AsRef<Path>) -> CutResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Write one row.
    pub fn write(&mut self, record: &MetricRecord) -> CutResult<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered rows.
    pub fn flush(&mut self) -> CutResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Read every row of a JSON-lines file, skipping blank lines.
pub fn read_records(path: impl AsRef<Path>) -> CutResult<Vec<MetricRecord>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| CutError::Io(format!("{}:{}: {e}", path.display(), n + 1)))?;
        out.push(record);
    }
    Ok(out)
}

/// One row of the calibration trial table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTrial {
    pub pipeline: Pipeline,
    pub configuration: ConfigurationKey,
    pub replicate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<PlanTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pilot_variance: Option<f64>,
    #[serde(default)]
    pub under_budget: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,
}

impl CalibrationTrial {
    pub fn from_result(cfg: &RunConfiguration, result: &CutResult<SamplingPlan>) -> Self {
        match result {
            Ok(plan) => Self {
                tag: Some(plan.tag.clone()),
                samples: Some(plan.samples),
                pilot_variance: Some(plan.pilot_variance),
                under_budget: plan.under_budget,
                ..Self::empty(cfg)
            },
            Err(e) => Self::failed(cfg, e),
        }
    }

    /// Row for a configuration whose tag or pilot failed.
    pub fn failed(cfg: &RunConfiguration, error: &CutError) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(cfg)
        }
    }

    fn empty(cfg: &RunConfiguration) -> Self {
        Self {
            pipeline: cfg.pipeline,
            configuration: cfg.key.clone(),
            replicate: cfg.replicate,
            tag: None,
            samples: None,
            pilot_variance: None,
            under_budget: false,
            error: None,
        }
    }
}

/// Contents of `calibration.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub grid: String,
    pub plans: Vec<SamplingPlan>,
    pub trials: Vec<CalibrationTrial>,
}

impl CalibrationFile {
    pub fn new(run_id: Uuid, grid: impl Into<String>, plans: &CommittedPlans, trials: Vec<CalibrationTrial>) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            grid: grid.into(),
            plans: plans.iter().cloned().collect(),
            trials,
        }
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> CutResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a calibration file.
    pub fn load(path: impl AsRef<Path>) -> CutResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CutError::CalibrationMissing(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Pin the plans for the main grid.
    pub fn committed(&self) -> CommittedPlans {
        CommittedPlans::from_plans(self.plans.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use qcut_ir::{Circuit, NoiseModel, QubitId, Topology};

    use super::*;
    use crate::engine::{CancelToken, CutJob, EngineSettings, ReconstructionEngine};
    use crate::metrics::{CircuitStats, ExecutedShape};
    use crate::oracle::{ExecutionOracle, FragmentRequest, Observable, OracleResult};
    use crate::source::Kernel;
    use crate::zne::{ZneExecutor, ZneSettings};

    /// Bends quadratically with the noise scale, so a line leaves a residual
    /// of `curvature · √2 / 3` over scales (1, 2, 3).
    struct Curved {
        curvature: f64,
    }

    #[async_trait]
    impl ExecutionOracle for Curved {
        fn name(&self) -> &str {
            "curved"
        }

        async fn execute(&self, request: &FragmentRequest) -> OracleResult<f64> {
            let s = request.noise_scale;
            Ok(0.8 - 0.05 * s + self.curvature * s * s)
        }
    }

    fn cfg() -> RunConfiguration {
        RunConfiguration {
            key: ConfigurationKey {
                kernel: Kernel::Ghz,
                topology: Topology::Line,
                num_qubits: 2,
                depth_budget: 1.0,
                noise_level: 0.01,
                max_cuts: 2,
            },
            pipeline: Pipeline::CuttingWithMitigation,
            replicate: 1,
        }
    }

    async fn mitigated_record(curvature: f64) -> MetricRecord {
        let circuit = Circuit::with_size("pair", 2);
        let job = CutJob::uncut(
            &circuit,
            Observable::z_product([QubitId(0)]),
            NoiseModel::from_level(0.01),
        )
        .unwrap();
        let zne = ZneExecutor::new(Arc::new(Curved { curvature }), ZneSettings::default()).unwrap();
        let engine = ReconstructionEngine::new(EngineSettings::default(), 7, CancelToken::new());
        let summary = engine.estimate(&job, &zne, 4).await.unwrap();

        let cfg = cfg();
        let stats = CircuitStats::of(&circuit);
        let output = PipelineOutput {
            estimate: Estimate::from_summary(cfg.pipeline, cfg.key.clone(), 1, &summary, false),
            reference: Some(0.8),
            original: stats,
            executed: ExecutedShape::FullCircuit(stats),
            baseline_calls: 10,
            plan: None,
            num_cuts: None,
        };
        MetricRecord::from_output(Uuid::nil(), "t", &cfg, output)
    }

    #[tokio::test]
    async fn test_fit_residual_reaches_stability_metric() {
        let record = mitigated_record(0.03).await;
        let expected = 0.03 * 2f64.sqrt() / 3.0;
        let est = record.estimate.as_ref().unwrap();
        assert!((est.max_residual.unwrap() - expected).abs() < 1e-9);

        let m4 = record.m4.as_ref().unwrap();
        assert!((m4.max_residual.unwrap() - expected).abs() < 1e-9);
        assert!(!m4.unstable);
        assert_eq!(record.status, ConfigurationStatus::Succeeded);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("max_residual"));
    }

    #[tokio::test]
    async fn test_poor_fit_flags_the_record() {
        // Residual 0.2·√2/3 ≈ 0.094 exceeds the default 0.05 threshold.
        let record = mitigated_record(0.2).await;
        let m4 = record.m4.as_ref().unwrap();
        assert!(m4.unstable);
        assert!(m4.max_residual.unwrap() > 0.05);
        assert_eq!(record.status, ConfigurationStatus::Flagged);
        assert_eq!(record.estimate.as_ref().unwrap().unstable_draws, 4);
    }

    #[test]
    fn test_failed_record_carries_kind() {
        let record = MetricRecord::failed(
            Uuid::nil(),
            "t",
            &cfg(),
            &CutError::InfeasibleCut("too many cuts".into()),
        );
        assert_eq!(record.status, ConfigurationStatus::Failed);
        assert_eq!(record.error.as_ref().unwrap().kind, "infeasible_cut");
        assert!(record.m4.is_none());
    }
}
