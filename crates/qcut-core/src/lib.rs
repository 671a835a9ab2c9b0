//! qcut reconstruction engine
//!
//! This crate turns a compiled circuit into an unbiased estimate of a
//! Z-product expectation value by cutting two-qubit gates, sampling terms of
//! their quasiprobability decomposition, and recombining fragment results.
//! It also hosts the calibration step that sizes each run, the zero-noise
//! extrapolation wrapper, the four comparison pipelines and the grid runner
//! that drives them.
//!
//! # Core Components
//!
//! - **Cut basis**: [`CutBasis`] and the per-gate [`CutRule`] terms
//! - **Cut selection**: [`select_cuts`] producing a [`CutPlan`] under
//!   [`CutConstraints`]
//! - **Decomposition**: [`Decomposition`] over the cross product of cut terms,
//!   with `kappa` as the sampling overhead
//! - **Engine**: [`ReconstructionEngine`] drawing seeded term assignments and
//!   running fragments through a [`FragmentExecutor`]
//! - **Calibration**: [`calibrate`] and the shared [`SamplingPlanCache`]
//! - **Mitigation**: [`ZneExecutor`] extrapolating each fragment to zero noise
//! - **Pipelines**: [`Pipeline`] T1 to T4 over a [`PipelineContext`]
//! - **Grid**: [`GridRunner`] producing [`MetricRecord`] rows with metrics
//!   M1 to M4
//!
//! # Data Flow
//!
//! ```text
//! Circuit ──► select_cuts ──► CutPlan ──► build_fragments ──► Fragments
//!                                │
//!                                ▼
//!                          Decomposition (κ)
//!                                │
//!            calibrate (pilot) ──┤──► SamplingPlan (N*)
//!                                ▼
//!              ReconstructionEngine::estimate ──► Estimate ──► MetricRecord
//! ```
//!
//! Oracles and circuit sources are traits; the simulator adapter and the
//! compile crate provide the implementations used by the CLI.

pub mod basis;
pub mod cache;
pub mod calibrate;
pub mod config;
pub mod cut;
pub mod decompose;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod fragment;
pub mod grid;
pub mod metrics;
pub mod oracle;
pub mod pipeline;
pub mod record;
pub mod sampling;
pub mod source;
pub mod summary;
pub mod zne;

pub use basis::{BasisTerm, CutBasis, CutRule, LocalOp};
pub use cache::{CommittedPlans, SamplingPlanCache};
pub use calibrate::{CalibrationSettings, PlanTag, SamplingPlan, calibrate, required_samples};
pub use config::{ConfigurationKey, GridConfig, RunConfiguration, RunSettings};
pub use cut::{CutConstraints, CutPlan, select_cuts};
pub use decompose::{Decomposition, TermAssignment};
pub use engine::{
    CancelToken, CutJob, DirectExecutor, DrawSummary, EngineSettings, FragmentExecutor,
    FragmentOutcome, ReconstructionEngine,
};
pub use error::{CutError, CutResult};
pub use estimate::Estimate;
pub use fragment::{Fragment, build_fragments};
pub use grid::{CalibrationReport, GridReport, GridRunner, GridSummary};
pub use metrics::{CircuitStats, ExecutedShape, M1, M2, M3, M4, MetricCell};
pub use oracle::{ExecutionOracle, FragmentRequest, Observable, OracleError, OracleResult, ReferenceOracle};
pub use pipeline::{Pipeline, PipelineContext, PipelineOutput};
pub use record::{CalibrationFile, CalibrationTrial, ConfigurationStatus, MetricRecord, RecordWriter, read_records};
pub use source::{CircuitCompiler, CompiledCircuit, Kernel, KernelSource};
pub use summary::{PlotAxis, PlotMetric, SeriesPoint, SummaryRow, plot_series, series_csv, summarize};
pub use zne::{ZneExecutor, ZneModel, ZneSettings};
