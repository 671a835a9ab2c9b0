//! Grid runner.
//!
//! Configurations run as independent tokio tasks, at most `grid_workers` at
//! a time. A failing configuration is recorded and the grid moves on; the
//! report ends with per-status counts.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CommittedPlans, SamplingPlanCache};
use crate::calibrate::{PlanTag, SamplingPlan};
use crate::config::RunConfiguration;
use crate::engine::CancelToken;
use crate::error::{CutError, CutResult};
use crate::metrics::m4_replicates;
use crate::pipeline::{calibrate_configuration, configuration_tag, PipelineContext, PipelineOutput};
use crate::record::{CalibrationTrial, ConfigurationStatus, MetricRecord, RecordError};

/// Counts at the end of a grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSummary {
    pub total: usize,
    pub succeeded: usize,
    pub flagged: usize,
    pub failed: usize,
    /// Failures that make the command exit non-zero.
    pub fatal: usize,
    /// Failures by error kind.
    pub failures_by_kind: BTreeMap<String, usize>,
}

impl GridSummary {
    fn add(&mut self, status: ConfigurationStatus, error: Option<&RecordError>) {
        self.total += 1;
        match status {
            ConfigurationStatus::Succeeded => self.succeeded += 1,
            ConfigurationStatus::Flagged => self.flagged += 1,
            ConfigurationStatus::Failed => self.failed += 1,
        }
        if let Some(e) = error {
            *self.failures_by_kind.entry(e.kind.clone()).or_default() += 1;
            if matches!(e.kind.as_str(), "execution_failure" | "infeasible_cut") {
                self.fatal += 1;
            }
        }
    }

    /// Whether the run should exit non-zero.
    pub fn has_fatal(&self) -> bool {
        self.fatal > 0
    }
}

/// Result of a main or robustness grid.
#[derive(Debug, Clone)]
pub struct GridReport {
    pub run_id: Uuid,
    /// One record per configuration, in grid order.
    pub records: Vec<MetricRecord>,
    pub summary: GridSummary,
}

/// Result of a calibration pass.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub run_id: Uuid,
    pub plans: CommittedPlans,
    pub trials: Vec<CalibrationTrial>,
    pub summary: GridSummary,
}

/// Runs configurations under a concurrency limit.
pub struct GridRunner {
    ctx: PipelineContext,
    grid_workers: usize,
    run_id: Uuid,
}

type Task<T> = JoinHandle<(usize, CutResult<T>)>;

impl GridRunner {
    pub fn new(ctx: PipelineContext, grid_workers: usize) -> Self {
        Self {
            ctx,
            grid_workers: grid_workers.max(1),
            run_id: Uuid::new_v4(),
        }
    }

    /// Same runner and run id, with `plans` pinned for cutting pipelines.
    pub fn with_plans(mut self, plans: CommittedPlans) -> Self {
        self.ctx.plans = plans;
        self
    }

    /// Id stamped on every record of this runner.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Spawn `work` for every configuration and collect results in grid
    /// order, calling `on_done` as each finishes.
    async fn spawn_all<T, W, Fut, F>(&self, configs: &[RunConfiguration], work: W, mut on_done: F) -> Vec<CutResult<T>>
    where
        T: Send + 'static,
        W: Fn(RunConfiguration, PipelineContext, CancelToken) -> Fut,
        Fut: Future<Output = CutResult<T>> + Send + 'static,
        F: FnMut(&RunConfiguration, &CutResult<T>),
    {
        let semaphore = Arc::new(Semaphore::new(self.grid_workers));
        let budget = self.ctx.settings.time_budget;
        let mut tasks: FuturesUnordered<Task<T>> = FuturesUnordered::new();

        for (index, cfg) in configs.iter().enumerate() {
            let semaphore = semaphore.clone();
            let cancel = CancelToken::new();
            let fut = work(cfg.clone(), self.ctx.clone(), cancel.clone());
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Err(CutError::Cancelled("grid semaphore closed".into())));
                };
                let result = match budget {
                    Some(limit) => match tokio::time::timeout(limit, fut).await {
                        Ok(r) => r,
                        Err(_) => {
                            cancel.cancel();
                            Err(CutError::Cancelled(format!(
                                "time budget of {}s exhausted",
                                limit.as_secs()
                            )))
                        }
                    },
                    None => fut.await,
                };
                (index, result)
            }));
        }

        let mut results: Vec<Option<CutResult<T>>> = configs.iter().map(|_| None).collect();
        let mut pending = configs.len();
        while let Some(joined) = tasks.next().await {
            pending -= 1;
            match joined {
                Ok((index, result)) => {
                    on_done(&configs[index], &result);
                    results[index] = Some(result);
                }
                Err(e) => error!(error = %e, pending, "configuration task aborted"),
            }
        }
        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(CutError::Cancelled("configuration task aborted".into()))))
            .collect()
    }

    /// Run every configuration and fill replicate-level M4.
    pub async fn run<F>(&self, configs: &[RunConfiguration], mut on_done: F) -> GridReport
    where
        F: FnMut(&RunConfiguration, ConfigurationStatus),
    {
        let started = Instant::now();
        info!(configurations = configs.len(), workers = self.grid_workers, run_id = %self.run_id, "grid started");

        let results = self
            .spawn_all(
                configs,
                |cfg, ctx, cancel| async move { cfg.pipeline.run(&cfg, &ctx, cancel).await },
                |cfg, result: &CutResult<PipelineOutput>| {
                    let status = match result {
                        Ok(out) if out.estimate.is_flagged() => ConfigurationStatus::Flagged,
                        Ok(_) => ConfigurationStatus::Succeeded,
                        Err(e) => {
                            warn!(config = %cfg, error = %e, "configuration failed");
                            ConfigurationStatus::Failed
                        }
                    };
                    on_done(cfg, status);
                },
            )
            .await;

        let grid = self.ctx.settings.grid.as_str();
        let mut records: Vec<MetricRecord> = configs
            .iter()
            .zip(results)
            .map(|(cfg, result)| match result {
                Ok(output) => MetricRecord::from_output(self.run_id, grid, cfg, output),
                Err(e) => MetricRecord::failed(self.run_id, grid, cfg, &e),
            })
            .collect();
        fill_replicate_stability(&mut records);

        let mut summary = GridSummary::default();
        for r in &records {
            summary.add(r.status, r.error.as_ref());
        }
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            flagged = summary.flagged,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "grid finished"
        );
        GridReport {
            run_id: self.run_id,
            records,
            summary,
        }
    }

    /// Calibrate every cutting configuration; one pilot per tag.
    ///
    /// Tags are resolved first. The first configuration of each tag in grid
    /// order runs the pilot and every other configuration with that tag
    /// reports the committed plan, so the plans do not depend on task
    /// scheduling.
    pub async fn calibrate<F>(
        &self,
        configs: &[RunConfiguration],
        cache: &SamplingPlanCache,
        mut on_done: F,
    ) -> CalibrationReport
    where
        F: FnMut(&RunConfiguration, ConfigurationStatus),
    {
        let cutting: Vec<RunConfiguration> = configs
            .iter()
            .filter(|c| c.pipeline.is_cutting())
            .cloned()
            .collect();
        info!(configurations = cutting.len(), "calibration started");

        let tags = self
            .spawn_all(
                &cutting,
                |cfg, ctx, _| async move { configuration_tag(&cfg, &ctx) },
                |cfg, result: &CutResult<PlanTag>| {
                    if let Err(e) = result {
                        warn!(config = %cfg, error = %e, "calibration failed");
                        on_done(cfg, ConfigurationStatus::Failed);
                    }
                },
            )
            .await;

        let mut members: BTreeMap<PlanTag, Vec<usize>> = BTreeMap::new();
        for (i, tag) in tags.iter().enumerate() {
            if let Ok(tag) = tag {
                members.entry(tag.clone()).or_default().push(i);
            }
        }
        let mut leaders: Vec<usize> = members.values().map(|m| m[0]).collect();
        leaders.sort_unstable();
        let representatives: Vec<RunConfiguration> =
            leaders.iter().map(|&i| cutting[i].clone()).collect();
        debug!(tags = representatives.len(), "calibration representatives chosen");

        let shared = cache.clone();
        let plans = self
            .spawn_all(
                &representatives,
                move |cfg, ctx, cancel| {
                    let cache = shared.clone();
                    async move { calibrate_configuration(&cfg, &ctx, &cache, cancel).await }
                },
                |cfg, result: &CutResult<SamplingPlan>| {
                    let status = match result {
                        Ok(p) if p.under_budget => ConfigurationStatus::Flagged,
                        Ok(_) => ConfigurationStatus::Succeeded,
                        Err(e) => {
                            warn!(config = %cfg, error = %e, "calibration failed");
                            ConfigurationStatus::Failed
                        }
                    };
                    let Some(Ok(tag)) = cutting.iter().position(|c| c == cfg).map(|i| &tags[i]) else {
                        return;
                    };
                    for &i in &members[tag] {
                        on_done(&cutting[i], status);
                    }
                },
            )
            .await;

        let by_tag: BTreeMap<&PlanTag, &CutResult<SamplingPlan>> = leaders
            .iter()
            .zip(&plans)
            .filter_map(|(&i, plan)| Some((tags[i].as_ref().ok()?, plan)))
            .collect();

        let mut summary = GridSummary::default();
        let trials: Vec<CalibrationTrial> = cutting
            .iter()
            .zip(&tags)
            .map(|(cfg, tag)| {
                let trial = match tag {
                    Ok(tag) => match by_tag.get(tag) {
                        Some(result) => CalibrationTrial::from_result(cfg, result),
                        None => CalibrationTrial::failed(
                            cfg,
                            &CutError::Cancelled("calibration task aborted".into()),
                        ),
                    },
                    Err(e) => CalibrationTrial::failed(cfg, e),
                };
                let status = match (&trial.error, trial.under_budget) {
                    (Some(_), _) => ConfigurationStatus::Failed,
                    (None, true) => ConfigurationStatus::Flagged,
                    (None, false) => ConfigurationStatus::Succeeded,
                };
                summary.add(status, trial.error.as_ref());
                trial
            })
            .collect();
        let plans = cache.snapshot().await;
        info!(plans = plans.len(), failed = summary.failed, "calibration finished");
        CalibrationReport {
            run_id: self.run_id,
            plans,
            trials,
            summary,
        }
    }
}

/// Replace single-run M4 by the spread across replicates wherever a
/// (pipeline, configuration) group has two or more successful replicates.
pub fn fill_replicate_stability(records: &mut [MetricRecord]) {
    let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        if r.estimate.is_some() {
            groups
                .entry((r.pipeline.id().to_string(), r.configuration.to_string()))
                .or_default()
                .push(i);
        }
    }
    for members in groups.values().filter(|m| m.len() >= 2) {
        let estimates: Vec<_> = members
            .iter()
            .filter_map(|&i| records[i].estimate.clone())
            .collect();
        let values: Vec<f64> = estimates.iter().map(|e| e.value).collect();
        let under_budget = estimates.iter().any(|e| e.under_budget);
        let unstable = estimates.iter().any(|e| e.unstable);
        let max_residual = estimates.iter().filter_map(|e| e.max_residual).reduce(f64::max);
        for (&i, est) in members.iter().zip(&estimates) {
            records[i].m4 = Some(m4_replicates(&values, est.std_error, under_budget, unstable, max_residual));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationKey;
    use crate::pipeline::Pipeline;
    use crate::source::Kernel;
    use crate::Estimate;
    use qcut_ir::Topology;

    fn cfg(pipeline: Pipeline, replicate: u32) -> RunConfiguration {
        RunConfiguration {
            key: ConfigurationKey {
                kernel: Kernel::Ghz,
                topology: Topology::Line,
                num_qubits: 10,
                depth_budget: 1.0,
                noise_level: 0.001,
                max_cuts: 2,
            },
            pipeline,
            replicate,
        }
    }

    fn succeeded(pipeline: Pipeline, replicate: u32, value: f64) -> MetricRecord {
        let c = cfg(pipeline, replicate);
        let mut record = MetricRecord::failed(Uuid::nil(), "t", &c, &CutError::Cancelled("x".into()));
        record.status = ConfigurationStatus::Succeeded;
        record.error = None;
        record.estimate = Some(Estimate {
            pipeline,
            configuration: c.key.clone(),
            replicate,
            value,
            variance: 0.01,
            std_error: 0.1,
            ci_low: value - 0.2,
            ci_high: value + 0.2,
            samples_consumed: 10,
            oracle_calls: 20,
            approximate_ci: false,
            under_budget: replicate == 2,
            unstable: false,
            unstable_draws: 0,
            max_residual: (replicate == 1).then_some(0.03),
        });
        record
    }

    #[test]
    fn test_replicate_stability_per_group() {
        let mut records = vec![
            succeeded(Pipeline::Cutting, 1, 0.8),
            succeeded(Pipeline::Cutting, 2, 1.0),
            succeeded(Pipeline::BaselineRouting, 1, 0.5),
            MetricRecord::failed(
                Uuid::nil(),
                "t",
                &cfg(Pipeline::BaselineRouting, 2),
                &CutError::InfeasibleCut("none".into()),
            ),
        ];
        fill_replicate_stability(&mut records);

        for r in &records[..2] {
            let m4 = r.m4.as_ref().unwrap();
            assert_eq!(m4.replicates, 2);
            assert!((m4.variance.value().unwrap() - 0.02).abs() < 1e-12);
            assert!(m4.under_budget);
            assert_eq!(m4.max_residual, Some(0.03));
        }
        // Lone successful replicate keeps whatever it had.
        assert!(records[2].m4.is_none());
        assert!(records[3].m4.is_none());
    }

    #[test]
    fn test_summary_fatal_kinds() {
        let mut summary = GridSummary::default();
        summary.add(ConfigurationStatus::Succeeded, None);
        summary.add(ConfigurationStatus::Flagged, None);
        let missing = RecordError::from(&CutError::CalibrationMissing("tag".into()));
        summary.add(ConfigurationStatus::Failed, Some(&missing));
        assert!(!summary.has_fatal());

        let infeasible = RecordError::from(&CutError::InfeasibleCut("no plan".into()));
        summary.add(ConfigurationStatus::Failed, Some(&infeasible));
        assert!(summary.has_fatal());
        assert_eq!((summary.total, summary.succeeded, summary.flagged, summary.failed), (4, 1, 1, 2));
        assert_eq!(summary.failures_by_kind["calibration_missing"], 1);
        assert_eq!(summary.failures_by_kind["infeasible_cut"], 1);
    }
}
