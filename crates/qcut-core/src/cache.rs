//! Commit-once store of sampling plans.
//!
//! Each tag owns a `OnceCell`: the first caller runs calibration, concurrent
//! callers for the same tag wait on the cell and receive the committed plan.
//! Once the calibration phase ends, [`SamplingPlanCache::snapshot`] freezes
//! the plans into a read-only [`CommittedPlans`] handed to the main grid.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use crate::calibrate::{PlanTag, SamplingPlan};
use crate::error::{CutError, CutResult};

/// Shared, commit-once sampling plan store.
#[derive(Clone, Default)]
pub struct SamplingPlanCache {
    cells: Arc<RwLock<FxHashMap<PlanTag, Arc<OnceCell<SamplingPlan>>>>>,
}

impl SamplingPlanCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, tag: &PlanTag) -> Arc<OnceCell<SamplingPlan>> {
        if let Some(cell) = self.cells.read().await.get(tag) {
            return cell.clone();
        }
        self.cells
            .write()
            .await
            .entry(tag.clone())
            .or_default()
            .clone()
    }

    /// Return the committed plan for `tag`, running `calibrate` if no plan
    /// exists yet. A failed calibration commits nothing.
    pub async fn get_or_calibrate<F, Fut>(&self, tag: &PlanTag, calibrate: F) -> CutResult<SamplingPlan>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CutResult<SamplingPlan>>,
    {
        let cell = self.cell(tag).await;
        cell.get_or_try_init(calibrate).await.cloned()
    }

    /// Commit `plan` under its tag unless one is already committed; returns
    /// whichever plan won.
    pub async fn commit(&self, plan: SamplingPlan) -> SamplingPlan {
        let cell = self.cell(&plan.tag).await;
        let tag = plan.tag.clone();
        let committed = cell.get_or_init(|| async { plan }).await.clone();
        debug!(%tag, samples = committed.samples, "plan committed");
        committed
    }

    /// Committed plan for `tag`, if any.
    pub async fn get(&self, tag: &PlanTag) -> Option<SamplingPlan> {
        self.cells
            .read()
            .await
            .get(tag)
            .and_then(|c| c.get().cloned())
    }

    /// Freeze every committed plan.
    pub async fn snapshot(&self) -> CommittedPlans {
        let cells = self.cells.read().await;
        CommittedPlans::from_plans(cells.values().filter_map(|c| c.get().cloned()))
    }
}

/// Immutable view of committed plans.
#[derive(Debug, Clone, Default)]
pub struct CommittedPlans {
    plans: Arc<BTreeMap<PlanTag, SamplingPlan>>,
}

impl CommittedPlans {
    /// Collect plans; on duplicate tags the first one wins.
    pub fn from_plans(plans: impl IntoIterator<Item = SamplingPlan>) -> Self {
        let mut map = BTreeMap::new();
        for p in plans {
            map.entry(p.tag.clone()).or_insert(p);
        }
        Self {
            plans: Arc::new(map),
        }
    }

    /// Plan for `tag`, or `CalibrationMissing`.
    pub fn get(&self, tag: &PlanTag) -> CutResult<&SamplingPlan> {
        self.plans
            .get(tag)
            .ok_or_else(|| CutError::CalibrationMissing(format!("no committed plan for {tag}")))
    }

    /// Plans in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &SamplingPlan> {
        self.plans.values()
    }

    /// Number of plans.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether no plan is committed.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::CutBasis;
    use qcut_ir::NoiseClass;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tag(fp: u64) -> PlanTag {
        PlanTag {
            fingerprint: fp,
            basis: CutBasis::Rzz,
            basis_size: 6,
            noise_class: NoiseClass::Low,
            precision_ppm: 50_000,
        }
    }

    fn plan(fp: u64, samples: u64) -> SamplingPlan {
        SamplingPlan {
            tag: tag(fp),
            samples,
            target_precision: 0.05,
            projected_std_error: 0.05,
            pilot_variance: 1.0,
            pilot_samples: 100,
            ceiling: 1_000_000,
            under_budget: false,
            kappa: 9.0,
        }
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = SamplingPlanCache::new();
        assert_eq!(cache.commit(plan(1, 10)).await.samples, 10);
        assert_eq!(cache.commit(plan(1, 20)).await.samples, 10);
        assert_eq!(cache.get(&tag(1)).await.unwrap().samples, 10);
    }

    #[tokio::test]
    async fn test_calibration_runs_once_per_tag() {
        let cache = SamplingPlanCache::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_calibrate(&tag(7), || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok(plan(7, 42))
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().samples, 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_calibration_commits_nothing() {
        let cache = SamplingPlanCache::new();
        let err = cache
            .get_or_calibrate(&tag(3), || async {
                Err(CutError::InfeasibleCut("nope".into()))
            })
            .await;
        assert!(err.is_err());
        assert!(cache.get(&tag(3)).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reports_missing() {
        let cache = SamplingPlanCache::new();
        cache.commit(plan(1, 10)).await;
        let frozen = cache.snapshot().await;
        assert_eq!(frozen.len(), 1);
        assert!(frozen.get(&tag(1)).is_ok());
        assert!(matches!(
            frozen.get(&tag(2)).unwrap_err(),
            CutError::CalibrationMissing(_)
        ));
    }
}
