//! Execution pipelines T1–T4.
//!
//! | Id | Variant                    | What runs                                   |
//! |----|----------------------------|---------------------------------------------|
//! | T1 | `BaselineRouting`          | kernel routed once, executed uncut          |
//! | T2 | `EnhancedRouting`          | best of `k` routings, executed uncut        |
//! | T3 | `Cutting`                  | cut, sample with the committed plan         |
//! | T4 | `CuttingWithMitigation`    | as T3, every fragment outcome extrapolated  |
//!
//! Every variant produces an [`Estimate`] through [`Pipeline::run`]. Routing
//! variants never touch the decomposer or calibrator. Cutting variants route
//! each fragment onto a line segment of the device, which the contiguous-span
//! limit guarantees exists.
//!
//! M3 for every variant is normalized by the same figure: the shots an uncut
//! execution of the baseline-routed kernel needs to reach the target
//! precision.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use qcut_ir::{Circuit, CouplingMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CommittedPlans, SamplingPlanCache};
use crate::calibrate::{calibrate, PlanTag, SamplingPlan};
use crate::config::{RunConfiguration, RunSettings};
use crate::cut::CutConstraints;
use crate::engine::{CancelToken, CutJob, DirectExecutor, FragmentExecutor, ReconstructionEngine};
use crate::error::{CutError, CutResult};
use crate::estimate::Estimate;
use crate::metrics::{uncut_shot_cost, CircuitStats, ExecutedShape, FragmentStats};
use crate::oracle::{ExecutionOracle, Observable, ReferenceOracle};
use crate::sampling::mix;
use crate::source::{CircuitCompiler, CompiledCircuit, KernelSource};
use crate::zne::ZneExecutor;

/// Execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pipeline {
    #[serde(rename = "T1")]
    BaselineRouting,
    #[serde(rename = "T2")]
    EnhancedRouting,
    #[serde(rename = "T3")]
    Cutting,
    #[serde(rename = "T4")]
    CuttingWithMitigation,
}

impl Pipeline {
    /// Every pipeline, in id order.
    pub const ALL: [Pipeline; 4] = [
        Pipeline::BaselineRouting,
        Pipeline::EnhancedRouting,
        Pipeline::Cutting,
        Pipeline::CuttingWithMitigation,
    ];

    /// Short id, `T1`–`T4`.
    pub fn id(&self) -> &'static str {
        match self {
            Pipeline::BaselineRouting => "T1",
            Pipeline::EnhancedRouting => "T2",
            Pipeline::Cutting => "T3",
            Pipeline::CuttingWithMitigation => "T4",
        }
    }

    /// Whether the pipeline cuts the circuit.
    pub fn is_cutting(&self) -> bool {
        matches!(self, Pipeline::Cutting | Pipeline::CuttingWithMitigation)
    }

    /// Whether fragment outcomes are extrapolated.
    pub fn is_mitigated(&self) -> bool {
        matches!(self, Pipeline::CuttingWithMitigation)
    }

    /// Routing candidates for this pipeline; cutting pipelines use the
    /// baseline router.
    pub fn best_of_k(&self, enhanced_k: usize) -> usize {
        match self {
            Pipeline::EnhancedRouting => enhanced_k,
            _ => 1,
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Pipeline {
    type Err = CutError;

    fn from_str(s: &str) -> CutResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "T1" => Ok(Pipeline::BaselineRouting),
            "T2" => Ok(Pipeline::EnhancedRouting),
            "T3" => Ok(Pipeline::Cutting),
            "T4" => Ok(Pipeline::CuttingWithMitigation),
            other => Err(CutError::ConfigValidation(format!("unknown pipeline '{other}'"))),
        }
    }
}

/// Collaborators shared by every configuration of a grid.
#[derive(Clone)]
pub struct PipelineContext {
    pub kernels: Arc<dyn KernelSource>,
    pub compiler: Arc<dyn CircuitCompiler>,
    pub oracle: Arc<dyn ExecutionOracle>,
    pub reference: Arc<dyn ReferenceOracle>,
    pub settings: Arc<RunSettings>,
    /// Plans pinned for cutting pipelines; empty while calibrating.
    pub plans: CommittedPlans,
}

/// Everything a pipeline hands to the metrics engine.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub estimate: Estimate,
    /// Ideal expectation of the uncut logical circuit.
    pub reference: Option<f64>,
    /// Uncompiled kernel figures.
    pub original: CircuitStats,
    /// What was executed.
    pub executed: ExecutedShape,
    /// Shots the uncut baseline needs for the target precision.
    pub baseline_calls: u64,
    /// Sampling plan used, for cutting pipelines.
    pub plan: Option<SamplingPlan>,
    /// Cuts in the plan, for cutting pipelines.
    pub num_cuts: Option<usize>,
}

/// Logical circuit, device and uncut baseline of one configuration.
struct Prepared {
    logical: Circuit,
    coupling: CouplingMap,
    observable: Observable,
    reference: Option<f64>,
    baseline: CompiledCircuit,
}

fn prepare(cfg: &RunConfiguration, ctx: &PipelineContext) -> CutResult<Prepared> {
    let key = &cfg.key;
    let logical = ctx.kernels.build(key.kernel, key.num_qubits)?;
    let coupling = key.topology.coupling_map(key.num_qubits)?;
    let observable = ctx.settings.observable_for(key.num_qubits);
    let reference = ctx.reference.ideal_expectation(&logical, &observable);
    let baseline = ctx
        .compiler
        .compile(&logical, &coupling, 1, ctx.settings.engine.seed)?;
    Ok(Prepared {
        logical,
        coupling,
        observable,
        reference,
        baseline,
    })
}

fn mapped(observable: &Observable, compiled: &CompiledCircuit) -> CutResult<Observable> {
    observable.map_through(&compiled.layout).ok_or_else(|| {
        CutError::MalformedCircuit(format!(
            "layout of '{}' does not cover observable {observable}",
            compiled.circuit.name()
        ))
    })
}

/// Cut constraints for `cfg`: fragments no wider than half the register or
/// the device's contiguous span, no deeper than `depth_budget × D_base`.
pub fn cut_constraints(
    cfg: &RunConfiguration,
    settings: &RunSettings,
    baseline_depth: usize,
) -> CutResult<CutConstraints> {
    let key = &cfg.key;
    let span = key.topology.max_contiguous_span(key.num_qubits)?;
    let width = settings
        .max_fragment_qubits
        .unwrap_or(key.num_qubits.div_ceil(2))
        .min(span);
    let depth = (key.depth_budget * baseline_depth as f64).ceil().max(1.0) as usize;
    Ok(CutConstraints {
        max_fragment_qubits: width,
        min_fragment_qubits: settings.min_fragment_qubits,
        max_fragment_depth: Some(depth),
        max_cuts: key.max_cuts,
    })
}

/// Cut the kernel of `cfg` and route every fragment onto a line segment.
fn cut_job(cfg: &RunConfiguration, ctx: &PipelineContext, prepared: &Prepared) -> CutResult<CutJob> {
    let settings = &ctx.settings;
    let constraints = cut_constraints(cfg, settings, prepared.baseline.circuit.depth())?;
    let mut job = CutJob::prepare(
        &prepared.logical,
        &constraints,
        settings.cut_basis,
        &prepared.observable,
        cfg.key.noise(),
    )?;
    for (fragment, observable) in job.fragments.iter_mut().zip(job.observables.iter_mut()) {
        let device = CouplingMap::linear(fragment.span.width);
        let routed = ctx
            .compiler
            .compile(&fragment.circuit, &device, 1, settings.engine.seed)?;
        *observable = mapped(observable, &routed)?;
        fragment.circuit = routed.circuit;
    }
    Ok(job)
}

/// Calibration tag of the cut job of `cfg`.
pub fn configuration_tag(cfg: &RunConfiguration, ctx: &PipelineContext) -> CutResult<PlanTag> {
    let prepared = prepare(cfg, ctx)?;
    let job = cut_job(cfg, ctx, &prepared)?;
    Ok(PlanTag::for_job(&job, ctx.settings.calibration.target_precision))
}

/// Calibrate the cut job of `cfg` through `cache`.
///
/// The pilot draws from the tag's stream, so the committed plan depends on
/// the tag and the configuration it is run for, never on which replicate or
/// task got there first.
#[instrument(skip_all, fields(config = %cfg))]
pub async fn calibrate_configuration(
    cfg: &RunConfiguration,
    ctx: &PipelineContext,
    cache: &SamplingPlanCache,
    cancel: CancelToken,
) -> CutResult<SamplingPlan> {
    let prepared = prepare(cfg, ctx)?;
    let job = cut_job(cfg, ctx, &prepared)?;
    let settings = &ctx.settings;
    let tag = PlanTag::for_job(&job, settings.calibration.target_precision);
    let engine = ReconstructionEngine::new(settings.engine, tag.stream_id(), cancel);
    let direct = DirectExecutor::new(ctx.oracle.clone());
    cache
        .get_or_calibrate(&tag, || {
            calibrate(tag.clone(), &job, &engine, &direct, &settings.calibration)
        })
        .await
}

const BASELINE_STREAM: u64 = 0x6261_7365_6c69_6e65;

/// Shots an uncut execution of the baseline-routed kernel needs for the
/// target precision.
///
/// The per-shot mean comes from one oracle call on the routed circuit,
/// seeded by the configuration key so all pipelines and replicates of a grid
/// point share it. An oracle that refuses the uncut circuit leaves the
/// worst-case mean.
async fn baseline_shots(
    cfg: &RunConfiguration,
    ctx: &PipelineContext,
    prepared: &Prepared,
    cancel: CancelToken,
) -> CutResult<u64> {
    let observable = mapped(&prepared.observable, &prepared.baseline)?;
    let job = CutJob::uncut(&prepared.baseline.circuit, observable, cfg.key.noise())?;
    let engine = ReconstructionEngine::new(
        ctx.settings.engine,
        mix(&[cfg.key.id(), BASELINE_STREAM]),
        cancel,
    );
    let direct = DirectExecutor::new(ctx.oracle.clone());
    let mean = match engine.run_draw(&job, &direct, 0).await {
        Ok(draw) => Some(draw.sign * draw.product),
        Err(e) => {
            warn!(error = %e, "uncut baseline not executable, assuming zero mean");
            None
        }
    };
    Ok(uncut_shot_cost(mean, ctx.settings.calibration.target_precision))
}

impl Pipeline {
    /// Produce the estimate of `cfg`.
    #[instrument(skip_all, fields(pipeline = %self, config = %cfg.key, replicate = cfg.replicate))]
    pub async fn run(
        &self,
        cfg: &RunConfiguration,
        ctx: &PipelineContext,
        cancel: CancelToken,
    ) -> CutResult<PipelineOutput> {
        let prepared = prepare(cfg, ctx)?;
        if self.is_cutting() {
            self.run_cutting(cfg, ctx, prepared, cancel).await
        } else {
            self.run_routing(cfg, ctx, prepared, cancel).await
        }
    }

    async fn run_routing(
        &self,
        cfg: &RunConfiguration,
        ctx: &PipelineContext,
        prepared: Prepared,
        cancel: CancelToken,
    ) -> CutResult<PipelineOutput> {
        let settings = &ctx.settings;
        let k = self.best_of_k(settings.best_of_k);
        let compiled = if k == 1 {
            prepared.baseline.clone()
        } else {
            ctx.compiler
                .compile(&prepared.logical, &prepared.coupling, k, settings.engine.seed)?
        };
        debug!(
            depth = compiled.circuit.depth(),
            twoq = compiled.circuit.num_two_qubit_gates(),
            k,
            "routed"
        );
        let observable = mapped(&prepared.observable, &compiled)?;
        let job = CutJob::uncut(&compiled.circuit, observable, cfg.key.noise())?;
        let baseline_calls = baseline_shots(cfg, ctx, &prepared, cancel.clone()).await?;
        let engine = ReconstructionEngine::new(settings.engine, cfg.config_id(), cancel);
        let direct = DirectExecutor::new(ctx.oracle.clone());
        let summary = engine
            .estimate(&job, &direct, settings.baseline_executions)
            .await?;

        Ok(PipelineOutput {
            estimate: Estimate::from_summary(*self, cfg.key.clone(), cfg.replicate, &summary, false),
            reference: prepared.reference,
            original: CircuitStats::of(&prepared.logical),
            executed: ExecutedShape::FullCircuit(CircuitStats::of(&compiled.circuit)),
            baseline_calls,
            plan: None,
            num_cuts: None,
        })
    }

    async fn run_cutting(
        &self,
        cfg: &RunConfiguration,
        ctx: &PipelineContext,
        prepared: Prepared,
        cancel: CancelToken,
    ) -> CutResult<PipelineOutput> {
        let settings = &ctx.settings;
        let job = cut_job(cfg, ctx, &prepared)?;
        let tag = PlanTag::for_job(&job, settings.calibration.target_precision);
        let plan = ctx.plans.get(&tag)?.clone();
        let baseline_calls = baseline_shots(cfg, ctx, &prepared, cancel.clone()).await?;
        let engine = ReconstructionEngine::new(settings.engine, cfg.config_id(), cancel);
        let direct = DirectExecutor::new(ctx.oracle.clone());

        let zne;
        let executor: &dyn FragmentExecutor = if self.is_mitigated() {
            zne = ZneExecutor::new(ctx.oracle.clone(), settings.zne.clone())?;
            &zne
        } else {
            &direct
        };
        let summary = engine.estimate(&job, executor, plan.samples).await?;
        info!(
            samples = plan.samples,
            calls = summary.oracle_calls,
            mean = summary.stats.mean(),
            "reconstructed"
        );

        Ok(PipelineOutput {
            estimate: Estimate::from_summary(
                *self,
                cfg.key.clone(),
                cfg.replicate,
                &summary,
                plan.under_budget,
            ),
            reference: prepared.reference,
            original: CircuitStats::of(&prepared.logical),
            executed: ExecutedShape::Fragments(FragmentStats::of(&job.representative_fragments()?)),
            baseline_calls,
            num_cuts: Some(job.plan.cuts().len()),
            plan: Some(plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_ids_round_trip() {
        for p in Pipeline::ALL {
            assert_eq!(p.id().parse::<Pipeline>().unwrap(), p);
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.id()));
        }
        assert!("T5".parse::<Pipeline>().is_err());
    }

    #[test]
    fn test_routing_k() {
        assert_eq!(Pipeline::BaselineRouting.best_of_k(5), 1);
        assert_eq!(Pipeline::EnhancedRouting.best_of_k(5), 5);
        assert_eq!(Pipeline::Cutting.best_of_k(5), 1);
        assert!(Pipeline::CuttingWithMitigation.is_mitigated());
        assert!(!Pipeline::EnhancedRouting.is_cutting());
    }
}
