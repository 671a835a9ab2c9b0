//! Execution and reconstruction engine.
//!
//! For draw `i` the engine seeds a generator from `(seed, config id, i)`,
//! samples one basis term per cut, runs every fragment variant through a
//! [`FragmentExecutor`] and folds
//!
//! ```text
//! contribution = sign · γ · Π fragment outcomes        (γ = Σ|c| = √κ)
//! ```
//!
//! into Welford accumulators. The mean of the contributions is an unbiased
//! estimate of the uncut expectation under noiseless fragment execution.
//!
//! Draws run concurrently up to `workers`, but results are consumed in draw
//! order, so the estimate is bit-identical for a fixed seed whatever the
//! completion order. A failing draw is retried once with the same
//! assignment; a second failure voids the whole estimate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::try_join_all;
use futures::stream;
use qcut_ir::{Circuit, NoiseModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::basis::{CutBasis, LocalOp};
use crate::cut::{select_cuts, CutConstraints, CutPlan};
use crate::decompose::{Decomposition, TermAssignment};
use crate::error::{CutError, CutResult};
use crate::fragment::{build_fragments, Fragment};
use crate::oracle::{ExecutionOracle, FragmentRequest, Observable, OracleResult};
use crate::sampling::{call_seed, draw_rng, draw_seed, mix, RunningStats};

/// Cooperative cancellation flag shared by a configuration task and its draws.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of running one fragment variant, possibly at several noise scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentOutcome {
    /// Expectation value handed to reconstruction.
    pub value: f64,
    /// Fit residual, when the value was extrapolated.
    pub residual: Option<f64>,
    /// Whether the extrapolation fit was poor.
    pub unstable: bool,
    /// Oracle calls spent.
    pub calls: u64,
}

/// Turns a fragment request into an outcome.
#[async_trait]
pub trait FragmentExecutor: Send + Sync {
    /// Run one fragment variant.
    async fn run(&self, request: FragmentRequest) -> OracleResult<FragmentOutcome>;

    /// Oracle calls one successful `run` costs.
    fn calls_per_run(&self) -> u64;
}

/// Executor that forwards each request to the oracle once, unscaled.
pub struct DirectExecutor {
    oracle: Arc<dyn ExecutionOracle>,
}

impl DirectExecutor {
    /// Wrap an oracle.
    pub fn new(oracle: Arc<dyn ExecutionOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl FragmentExecutor for DirectExecutor {
    async fn run(&self, request: FragmentRequest) -> OracleResult<FragmentOutcome> {
        let value = self.oracle.execute(&request).await?;
        Ok(FragmentOutcome {
            value,
            residual: None,
            unstable: false,
            calls: 1,
        })
    }

    fn calls_per_run(&self) -> u64 {
        1
    }
}

/// A circuit prepared for cut execution.
#[derive(Debug, Clone)]
pub struct CutJob {
    /// Selected plan.
    pub plan: CutPlan,
    /// Fragment circuits with markers.
    pub fragments: Vec<Fragment>,
    /// Weighted term set.
    pub decomposition: Decomposition,
    /// Observable factor per fragment, in local indices.
    pub observables: Vec<Observable>,
    /// Gate noise of the configuration.
    pub noise: NoiseModel,
}

impl CutJob {
    /// Select cuts, build fragments and decompose.
    #[instrument(skip_all, fields(circuit = circuit.name()))]
    pub fn prepare(
        circuit: &Circuit,
        constraints: &CutConstraints,
        basis: CutBasis,
        observable: &Observable,
        noise: NoiseModel,
    ) -> CutResult<Self> {
        if let Some(q) = observable
            .qubits()
            .iter()
            .find(|q| q.0 >= circuit.num_qubits())
        {
            return Err(CutError::MalformedCircuit(format!(
                "observable {observable} references {q} outside the {}-qubit register",
                circuit.num_qubits()
            )));
        }
        let plan = select_cuts(circuit, constraints)?;
        let fragments = build_fragments(circuit, &plan)?;
        let decomposition = Decomposition::new(&plan, basis);
        let observables = plan
            .spans()
            .iter()
            .map(|s| observable.restrict(s.start, s.width))
            .collect();
        debug!(
            fragments = fragments.len(),
            cuts = plan.cuts().len(),
            kappa = decomposition.kappa(),
            "cut job prepared"
        );
        Ok(Self {
            plan,
            fragments,
            decomposition,
            observables,
            noise,
        })
    }

    /// Whole-circuit job: one fragment, one term of weight 1.
    pub fn uncut(circuit: &Circuit, observable: Observable, noise: NoiseModel) -> CutResult<Self> {
        let plan = CutPlan::whole(circuit.num_qubits());
        let fragments = build_fragments(circuit, &plan)?;
        let decomposition = Decomposition::new(&plan, CutBasis::default());
        Ok(Self {
            plan,
            fragments,
            decomposition,
            observables: vec![observable],
            noise,
        })
    }

    /// Fragment circuits with markers replaced by identity, for structural
    /// metrics.
    pub fn representative_fragments(&self) -> CutResult<Vec<Circuit>> {
        let identity = vec![(LocalOp::Identity, LocalOp::Identity); self.plan.cuts().len()];
        self.fragments
            .iter()
            .map(|f| f.instantiate(&identity))
            .collect()
    }
}

/// Knobs shared by every configuration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Experiment seed.
    pub seed: u64,
    /// Draws in flight at once.
    pub workers: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            seed: 11,
            workers: 8,
        }
    }
}

/// Accumulated result of a batch of draws.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawSummary {
    /// Running moments of the per-draw contributions.
    pub stats: RunningStats,
    /// Oracle calls spent, retries included.
    pub oracle_calls: u64,
    /// Draws with at least one unstable fragment outcome.
    pub unstable_draws: u64,
    /// Largest fit residual seen.
    pub max_residual: Option<f64>,
}

/// One completed draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOutcome {
    /// Draw index.
    pub index: u64,
    /// Chosen terms.
    pub assignment: TermAssignment,
    /// Sign of the term's coefficient.
    pub sign: f64,
    /// Product of fragment outcomes.
    pub product: f64,
    /// Whether any fragment outcome was unstable.
    pub unstable: bool,
    /// Largest fit residual among the fragments.
    pub residual: Option<f64>,
    /// Oracle calls spent, retries included.
    pub calls: u64,
}

/// Runs draws for one configuration.
#[derive(Debug, Clone)]
pub struct ReconstructionEngine {
    settings: EngineSettings,
    config_id: u64,
    cancel: CancelToken,
}

const PILOT_STREAM: u64 = 0x7069_6c6f_7400_0000;

impl ReconstructionEngine {
    /// Engine for configuration `config_id`.
    pub fn new(settings: EngineSettings, config_id: u64, cancel: CancelToken) -> Self {
        Self {
            settings,
            config_id,
            cancel,
        }
    }

    /// Engine drawing from an independent stream for pilot runs.
    pub fn for_pilot(&self) -> Self {
        Self {
            config_id: mix(&[self.config_id, PILOT_STREAM]),
            ..self.clone()
        }
    }

    /// Configuration id mixed into every draw seed.
    pub fn config_id(&self) -> u64 {
        self.config_id
    }

    fn check_cancelled(&self) -> CutResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CutError::Cancelled(format!(
                "configuration {:016x} cancelled",
                self.config_id
            )));
        }
        Ok(())
    }

    /// Run `samples` draws and accumulate `sign · γ · Π outcomes`.
    #[instrument(skip_all, fields(config = self.config_id, samples))]
    pub async fn estimate(
        &self,
        job: &CutJob,
        executor: &dyn FragmentExecutor,
        samples: u64,
    ) -> CutResult<DrawSummary> {
        let gamma = job.decomposition.gamma();
        self.accumulate(job, executor, samples, |d| d.sign * gamma * d.product)
            .await
    }

    /// Run `samples` pilot draws and accumulate the normalized values
    /// `sign · Π outcomes`.
    #[instrument(skip_all, fields(config = self.config_id, samples))]
    pub async fn pilot(
        &self,
        job: &CutJob,
        executor: &dyn FragmentExecutor,
        samples: u64,
    ) -> CutResult<DrawSummary> {
        self.for_pilot()
            .accumulate(job, executor, samples, |d| d.sign * d.product)
            .await
    }

    async fn accumulate<F>(
        &self,
        job: &CutJob,
        executor: &dyn FragmentExecutor,
        samples: u64,
        value: F,
    ) -> CutResult<DrawSummary>
    where
        F: Fn(&DrawOutcome) -> f64,
    {
        self.check_cancelled()?;
        let mut summary = DrawSummary::default();
        let mut draws = stream::iter(0..samples)
            .map(|i| self.run_draw(job, executor, i))
            .buffered(self.settings.workers.max(1));

        while let Some(result) = draws.next().await {
            self.check_cancelled()?;
            let draw = result?;
            summary.stats.push(value(&draw));
            summary.oracle_calls += draw.calls;
            if draw.unstable {
                summary.unstable_draws += 1;
            }
            if let Some(r) = draw.residual {
                summary.max_residual = Some(summary.max_residual.map_or(r, |m| m.max(r)));
            }
        }
        debug!(
            mean = summary.stats.mean(),
            variance = summary.stats.variance(),
            calls = summary.oracle_calls,
            "draws accumulated"
        );
        Ok(summary)
    }

    /// Execute draw `index`, retrying once with the same assignment.
    pub async fn run_draw(
        &self,
        job: &CutJob,
        executor: &dyn FragmentExecutor,
        index: u64,
    ) -> CutResult<DrawOutcome> {
        let seed = self.settings.seed;
        let mut rng = draw_rng(seed, self.config_id, index, 0);
        let (assignment, sign) = job.decomposition.sample(&mut rng);
        let ops = assignment.ops();
        let circuits = job
            .fragments
            .iter()
            .map(|f| f.instantiate(&ops))
            .collect::<CutResult<Vec<_>>>()?;

        let mut spent = 0;
        let outcomes = match self.attempt(job, executor, &circuits, index, 0).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(draw = index, %assignment, error = %e, "draw failed, retrying");
                spent += executor.calls_per_run() * circuits.len() as u64;
                match self.attempt(job, executor, &circuits, index, 1).await {
                    Ok(outcomes) => outcomes,
                    Err(source) => {
                        return Err(CutError::ExecutionFailure {
                            draw_index: index,
                            assignment,
                            source,
                        });
                    }
                }
            }
        };
        spent += outcomes.iter().map(|o| o.calls).sum::<u64>();

        Ok(DrawOutcome {
            index,
            sign,
            product: outcomes.iter().map(|o| o.value).product(),
            unstable: outcomes.iter().any(|o| o.unstable),
            residual: outcomes.iter().filter_map(|o| o.residual).reduce(f64::max),
            calls: spent,
            assignment,
        })
    }

    async fn attempt(
        &self,
        job: &CutJob,
        executor: &dyn FragmentExecutor,
        circuits: &[Circuit],
        index: u64,
        attempt: u32,
    ) -> OracleResult<Vec<FragmentOutcome>> {
        let attempt_seed = draw_seed(self.settings.seed, self.config_id, index, attempt);
        try_join_all(circuits.iter().enumerate().map(|(f, circuit)| {
            executor.run(FragmentRequest {
                fragment: f,
                circuit: circuit.clone(),
                observable: job.observables[f].clone(),
                noise: job.noise,
                noise_scale: 1.0,
                seed: call_seed(attempt_seed, f, 0),
            })
        }))
        .await
    }

    /// Sum every product term exactly: `Σ c · Π fragment outcomes`.
    ///
    /// Cost grows as `basisᶜᵘᵗˢ`; intended for small plans and tests.
    #[instrument(skip_all, fields(config = self.config_id))]
    pub async fn exact_expectation(
        &self,
        job: &CutJob,
        executor: &dyn FragmentExecutor,
    ) -> CutResult<f64> {
        let seed = self.settings.seed;
        let mut terms = stream::iter(job.decomposition.terms().enumerate())
            .map(|(t, term)| async move {
                if term.coefficient == 0.0 {
                    return Ok(0.0);
                }
                let ops = term.assignment.ops();
                let term_seed = draw_seed(seed, self.config_id, t as u64, 0);
                let mut product = term.coefficient;
                for (f, fragment) in job.fragments.iter().enumerate() {
                    let outcome = executor
                        .run(FragmentRequest {
                            fragment: f,
                            circuit: fragment.instantiate(&ops)?,
                            observable: job.observables[f].clone(),
                            noise: job.noise,
                            noise_scale: 1.0,
                            seed: call_seed(term_seed, f, 0),
                        })
                        .await?;
                    product *= outcome.value;
                }
                Ok::<f64, CutError>(product)
            })
            .buffered(self.settings.workers.max(1));

        let mut total = 0.0;
        while let Some(v) = terms.next().await {
            self.check_cancelled()?;
            total += v?;
        }
        Ok(total)
    }
}
