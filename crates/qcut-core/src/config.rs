//! Experiment grid configuration.
//!
//! A grid file is YAML. Axis options (`kernel`, `topology`, `depth_budget`,
//! `noise_level`, `max_cuts`, `pipelines`) take a single value or a list;
//! the grid is their Cartesian product times `replicates`. Unknown keys and
//! out-of-range values fail with [`CutError::ConfigValidation`] before any
//! configuration runs.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use qcut_ir::{NoiseModel, QubitId, Topology};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::basis::CutBasis;
use crate::calibrate::CalibrationSettings;
use crate::cut::CutConstraints;
use crate::engine::EngineSettings;
use crate::error::{CutError, CutResult};
use crate::oracle::Observable;
use crate::pipeline::Pipeline;
use crate::sampling::mix;
use crate::source::Kernel;
use crate::zne::{ZneModel, ZneSettings};

/// Scales accepted outside robustness runs.
pub const MAIN_ZNE_SCALES: [f64; 3] = [1.0, 2.0, 3.0];

/// Cut limits accepted on the main grid.
pub const MAIN_MAX_CUTS: [usize; 2] = [2, 4];

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(v) => vec![v],
        OneOrMany::Many(v) => v,
    })
}

/// Parsed grid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    /// Grid name, copied into records.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(deserialize_with = "one_or_many")]
    pub kernel: Vec<Kernel>,
    #[serde(deserialize_with = "one_or_many")]
    pub topology: Vec<Topology>,
    /// Fragment depth limit as a multiple of the baseline-routed depth.
    #[serde(deserialize_with = "one_or_many")]
    pub depth_budget: Vec<f64>,
    #[serde(deserialize_with = "one_or_many")]
    pub noise_level: Vec<f64>,
    #[serde(default = "default_max_cuts", deserialize_with = "one_or_many")]
    pub max_cuts: Vec<usize>,
    #[serde(default = "default_pipelines", deserialize_with = "one_or_many")]
    pub pipelines: Vec<Pipeline>,

    #[serde(default)]
    pub cut_basis: CutBasis,
    #[serde(default = "default_precision")]
    pub target_precision: f64,
    #[serde(default = "default_pilot")]
    pub pilot_sample_count: u64,
    #[serde(default = "default_ceiling")]
    pub sample_ceiling: u64,

    #[serde(default = "default_scales")]
    pub zne_scale_factors: Vec<f64>,
    #[serde(default)]
    pub zne_model: ZneModel,
    #[serde(default = "default_residual")]
    pub zne_residual_threshold: f64,

    #[serde(default = "default_min_fragment")]
    pub min_fragment_qubits: u32,
    /// Overrides the topology's contiguous span.
    #[serde(default)]
    pub max_fragment_qubits: Option<u32>,

    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_replicates")]
    pub replicates: u32,
    /// Draws in flight per configuration.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Configurations in flight.
    #[serde(default = "default_grid_workers")]
    pub grid_workers: usize,
    /// Oracle calls per routing estimate.
    #[serde(default = "default_baseline_executions")]
    pub baseline_executions: u64,
    /// Candidates tried by enhanced routing.
    #[serde(default = "default_best_of_k")]
    pub best_of_k: usize,
    /// Qubits of the Z-product observable; defaults to the two middle qubits.
    #[serde(default)]
    pub observable: Option<Vec<u32>>,
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_name() -> String {
    "grid".into()
}
fn default_max_cuts() -> Vec<usize> {
    vec![4]
}
fn default_pipelines() -> Vec<Pipeline> {
    Pipeline::ALL.to_vec()
}
fn default_precision() -> f64 {
    CalibrationSettings::default().target_precision
}
fn default_pilot() -> u64 {
    CalibrationSettings::default().pilot_samples
}
fn default_ceiling() -> u64 {
    CalibrationSettings::default().sample_ceiling
}
fn default_scales() -> Vec<f64> {
    MAIN_ZNE_SCALES.to_vec()
}
fn default_residual() -> f64 {
    ZneSettings::default().residual_threshold
}
fn default_min_fragment() -> u32 {
    3
}
fn default_seed() -> u64 {
    EngineSettings::default().seed
}
fn default_replicates() -> u32 {
    1
}
fn default_workers() -> usize {
    EngineSettings::default().workers
}
fn default_grid_workers() -> usize {
    4
}
fn default_baseline_executions() -> u64 {
    1
}
fn default_best_of_k() -> usize {
    5
}

impl GridConfig {
    /// Parse YAML text and validate it.
    pub fn from_yaml(text: &str) -> CutResult<Self> {
        let config: GridConfig = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a grid file.
    pub fn load(path: impl AsRef<Path>) -> CutResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CutError::ConfigValidation(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loading grid config");
        Self::from_yaml(&text)
    }

    /// Whether this grid may leave the locked main-grid settings.
    pub fn is_robustness(&self) -> bool {
        self.tags.iter().any(|t| t == "robustness")
    }

    /// Check every option.
    pub fn validate(&self) -> CutResult<()> {
        fn non_empty<T>(v: &[T], what: &str) -> CutResult<()> {
            if v.is_empty() {
                return Err(CutError::ConfigValidation(format!("{what} must not be empty")));
            }
            Ok(())
        }
        non_empty(&self.kernel, "kernel")?;
        non_empty(&self.topology, "topology")?;
        non_empty(&self.depth_budget, "depth_budget")?;
        non_empty(&self.noise_level, "noise_level")?;
        non_empty(&self.max_cuts, "max_cuts")?;
        non_empty(&self.pipelines, "pipelines")?;

        if let Some(d) = self.depth_budget.iter().find(|d| !(d.is_finite() && **d > 0.0)) {
            return Err(CutError::ConfigValidation(format!(
                "depth_budget must be positive, got {d}"
            )));
        }
        if let Some(p) = self
            .noise_level
            .iter()
            .find(|p| !(p.is_finite() && **p >= 0.0 && **p <= 1.0))
        {
            return Err(CutError::ConfigValidation(format!(
                "noise_level must lie in [0, 1], got {p}"
            )));
        }
        if let Some(c) = self.max_cuts.iter().find(|c| **c == 0) {
            return Err(CutError::ConfigValidation(format!(
                "max_cuts must be positive, got {c}"
            )));
        }
        if !self.is_robustness() {
            if let Some(c) = self.max_cuts.iter().find(|c| !MAIN_MAX_CUTS.contains(c)) {
                return Err(CutError::ConfigValidation(format!(
                    "max_cuts {c} is outside the main grid levels {MAIN_MAX_CUTS:?}; tag the grid 'robustness' to override"
                )));
            }
            if self.zne_scale_factors != MAIN_ZNE_SCALES {
                return Err(CutError::ConfigValidation(format!(
                    "main grid zne_scale_factors are locked to {MAIN_ZNE_SCALES:?}; tag the grid 'robustness' to override"
                )));
            }
        }
        if self.replicates == 0 {
            return Err(CutError::ConfigValidation("replicates must be at least 1".into()));
        }
        if self.workers == 0 || self.grid_workers == 0 {
            return Err(CutError::ConfigValidation(
                "workers and grid_workers must be at least 1".into(),
            ));
        }
        if self.baseline_executions == 0 {
            return Err(CutError::ConfigValidation(
                "baseline_executions must be at least 1".into(),
            ));
        }
        if self.best_of_k == 0 {
            return Err(CutError::ConfigValidation("best_of_k must be at least 1".into()));
        }
        if self.time_budget_secs == Some(0) {
            return Err(CutError::ConfigValidation(
                "time_budget_secs must be positive".into(),
            ));
        }
        if let Some(max) = self.max_fragment_qubits {
            CutConstraints {
                max_fragment_qubits: max,
                min_fragment_qubits: self.min_fragment_qubits,
                max_fragment_depth: None,
                max_cuts: 1,
            }
            .validate()?;
        } else if self.min_fragment_qubits == 0 {
            return Err(CutError::ConfigValidation(
                "min_fragment_qubits must be at least 1".into(),
            ));
        }
        self.calibration().validate()?;
        if self.pipelines.iter().any(|p| p.is_mitigated()) {
            self.zne().validate()?;
        }
        for kernel in &self.kernel {
            let n = kernel.default_qubits();
            for topology in &self.topology {
                topology.coupling_map(n)?;
            }
            if let Some(qs) = &self.observable {
                if qs.is_empty() {
                    return Err(CutError::ConfigValidation("observable must name at least one qubit".into()));
                }
                if let Some(q) = qs.iter().find(|q| **q >= n) {
                    return Err(CutError::ConfigValidation(format!(
                        "observable qubit {q} is outside the {n}-qubit {kernel} register"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Calibration knobs.
    pub fn calibration(&self) -> CalibrationSettings {
        CalibrationSettings {
            target_precision: self.target_precision,
            pilot_samples: self.pilot_sample_count,
            sample_ceiling: self.sample_ceiling,
        }
    }

    /// Extrapolation knobs.
    pub fn zne(&self) -> ZneSettings {
        ZneSettings {
            scales: self.zne_scale_factors.clone(),
            model: self.zne_model,
            residual_threshold: self.zne_residual_threshold,
        }
    }

    /// Engine knobs.
    pub fn engine(&self) -> EngineSettings {
        EngineSettings {
            seed: self.seed,
            workers: self.workers,
        }
    }

    /// Knobs shared by every configuration.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            grid: self.name.clone(),
            engine: self.engine(),
            calibration: self.calibration(),
            zne: self.zne(),
            cut_basis: self.cut_basis,
            min_fragment_qubits: self.min_fragment_qubits,
            max_fragment_qubits: self.max_fragment_qubits,
            baseline_executions: self.baseline_executions,
            best_of_k: self.best_of_k,
            observable: self.observable.clone(),
            time_budget: self.time_budget_secs.map(Duration::from_secs),
        }
    }

    /// Expand the grid, in kernel → topology → depth → noise → cuts →
    /// pipeline → replicate order.
    pub fn expand(&self) -> Vec<RunConfiguration> {
        let mut out = Vec::new();
        for &kernel in &self.kernel {
            let num_qubits = kernel.default_qubits();
            for &topology in &self.topology {
                for &depth_budget in &self.depth_budget {
                    for &noise_level in &self.noise_level {
                        for &max_cuts in &self.max_cuts {
                            let key = ConfigurationKey {
                                kernel,
                                topology,
                                num_qubits,
                                depth_budget,
                                noise_level,
                                max_cuts,
                            };
                            for &pipeline in &self.pipelines {
                                // Routing pipelines ignore the cut limit.
                                if !pipeline.is_cutting() && max_cuts != self.max_cuts[0] {
                                    continue;
                                }
                                if pipeline.is_cutting() && !kernel.is_cuttable() {
                                    continue;
                                }
                                for replicate in 1..=self.replicates {
                                    out.push(RunConfiguration {
                                        key: key.clone(),
                                        pipeline,
                                        replicate,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

/// Knobs shared by every configuration of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub grid: String,
    pub engine: EngineSettings,
    pub calibration: CalibrationSettings,
    pub zne: ZneSettings,
    pub cut_basis: CutBasis,
    pub min_fragment_qubits: u32,
    pub max_fragment_qubits: Option<u32>,
    pub baseline_executions: u64,
    pub best_of_k: usize,
    pub observable: Option<Vec<u32>>,
    pub time_budget: Option<Duration>,
}

impl RunSettings {
    /// Observable on an `n`-qubit register.
    pub fn observable_for(&self, num_qubits: u32) -> Observable {
        match &self.observable {
            Some(qs) => Observable::z_product(qs.iter().map(|q| QubitId(*q))),
            None => {
                let mid = num_qubits / 2;
                Observable::z_product([QubitId(mid.saturating_sub(1)), QubitId(mid)])
            }
        }
    }
}

/// Identity of one grid point, shared by its pipelines and replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationKey {
    pub kernel: Kernel,
    pub topology: Topology,
    pub num_qubits: u32,
    pub depth_budget: f64,
    pub noise_level: f64,
    pub max_cuts: usize,
}

impl ConfigurationKey {
    /// Stable 64-bit id mixed into draw seeds.
    pub fn id(&self) -> u64 {
        mix(&[
            self.kernel as u64,
            self.topology as u64,
            u64::from(self.num_qubits),
            self.depth_budget.to_bits(),
            self.noise_level.to_bits(),
            self.max_cuts as u64,
        ])
    }

    /// Gate noise at this point.
    pub fn noise(&self) -> NoiseModel {
        NoiseModel::from_level(self.noise_level)
    }
}

impl fmt::Display for ConfigurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}/d{}/p{}/c{}",
            self.kernel,
            self.num_qubits,
            self.topology,
            self.depth_budget,
            self.noise_level,
            self.max_cuts
        )
    }
}

/// One unit of grid work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub key: ConfigurationKey,
    pub pipeline: Pipeline,
    /// 1-based replicate number.
    pub replicate: u32,
}

impl RunConfiguration {
    /// Seed id of this replicate: the key id mixed with the replicate.
    pub fn config_id(&self) -> u64 {
        mix(&[self.key.id(), u64::from(self.replicate)])
    }
}

impl fmt::Display for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} r{}", self.pipeline, self.key, self.replicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = r#"
name: main
kernel: [qft, hea]
topology: [line, grid]
depth_budget: 2.0
noise_level: [0.001, 0.005]
max_cuts: [2, 4]
replicates: 2
"#;

    #[test]
    fn test_parse_and_expand() {
        let cfg = GridConfig::from_yaml(MAIN).unwrap();
        assert_eq!(cfg.depth_budget, vec![2.0]);
        assert_eq!(cfg.pipelines, Pipeline::ALL.to_vec());
        let runs = cfg.expand();
        // 2 kernels × 2 topologies × 2 noise levels × (2 routing + 2 cutting × 2 cut levels) × 2 reps
        assert_eq!(runs.len(), 2 * 2 * 2 * (2 + 2 * 2) * 2);
        assert!(runs.iter().all(|r| r.replicate >= 1));
    }

    #[test]
    fn test_grover_runs_routing_only() {
        let text = MAIN.replace("kernel: [qft, hea]", "kernel: [grover]");
        let runs = GridConfig::from_yaml(&text).unwrap().expand();
        // 2 topologies × 2 noise levels × 2 routing pipelines × 2 reps
        assert_eq!(runs.len(), 2 * 2 * 2 * 2);
        assert!(runs.iter().all(|r| !r.pipeline.is_cutting()));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let text = format!("{MAIN}\nshots: 1024\n");
        assert!(matches!(
            GridConfig::from_yaml(&text).unwrap_err(),
            CutError::ConfigValidation(_)
        ));
    }

    #[test]
    fn test_main_grid_locks_scales() {
        let text = format!("{MAIN}\nzne_scale_factors: [1.0, 1.5, 2.0]\n");
        assert!(GridConfig::from_yaml(&text).is_err());
        let text = format!("{MAIN}\nzne_scale_factors: [1.0, 1.5, 2.0]\ntags: [robustness]\n");
        assert!(GridConfig::from_yaml(&text).is_ok());
    }

    #[test]
    fn test_out_of_range_values() {
        for bad in [
            "noise_level: 1.5",
            "depth_budget: 0",
            "max_cuts: 3",
            "target_precision: -0.1",
            "observable: [12]",
        ] {
            let text = MAIN
                .lines()
                .filter(|l| !l.starts_with(bad.split(':').next().unwrap()))
                .chain(std::iter::once(bad))
                .collect::<Vec<_>>()
                .join("\n");
            assert!(GridConfig::from_yaml(&text).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_config_ids_differ() {
        let cfg = GridConfig::from_yaml(MAIN).unwrap();
        let runs = cfg.expand();
        assert_ne!(runs[0].config_id(), runs[1].config_id());
        assert_eq!(runs[0].key.id(), runs[1].key.id());
    }

    #[test]
    fn test_default_observable_straddles_middle() {
        let cfg = GridConfig::from_yaml(MAIN).unwrap();
        let obs = cfg.run_settings().observable_for(10);
        assert_eq!(obs.to_string(), "Z4Z5");
    }
}
