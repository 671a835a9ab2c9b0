//! Sampling budget calibration.
//!
//! A pilot run estimates the variance σ̂² of the normalized draw values
//! `sign · Π outcomes`. The production sample count is the smallest `N`
//! with
//!
//! ```text
//! σ̂² · κ² / N ≤ ε²
//! ```
//!
//! capped at the ceiling. A plan capped before meeting the bound is marked
//! under-budget and still runs.

use std::fmt;

use qcut_ir::NoiseClass;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::basis::CutBasis;
use crate::engine::{CutJob, FragmentExecutor, ReconstructionEngine};
use crate::error::{CutError, CutResult};
use crate::sampling::mix;

/// Key under which a sampling plan is committed and shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanTag {
    /// Cut plan fingerprint.
    pub fingerprint: u64,
    /// Cut basis.
    pub basis: CutBasis,
    /// Terms per cut.
    pub basis_size: usize,
    /// Noise bucket.
    pub noise_class: NoiseClass,
    /// Target precision ε, in parts per million.
    pub precision_ppm: u64,
}

impl PlanTag {
    /// Tag for `job` at precision `eps`.
    pub fn for_job(job: &CutJob, eps: f64) -> Self {
        let basis = job.decomposition.basis();
        Self {
            fingerprint: job.plan.fingerprint(),
            basis,
            basis_size: basis.size(),
            noise_class: job.noise.class(),
            precision_ppm: (eps * 1e6).round() as u64,
        }
    }

    /// Target precision ε.
    pub fn target_precision(&self) -> f64 {
        self.precision_ppm as f64 / 1e6
    }

    /// Draw stream of the tag's pilot. Every configuration sharing the tag
    /// calibrates from the same stream.
    pub fn stream_id(&self) -> u64 {
        mix(&[
            self.fingerprint,
            self.basis as u64,
            self.basis_size as u64,
            self.noise_class as u64,
            self.precision_ppm,
        ])
    }
}

impl fmt::Display for PlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}/{}x{}/{}/eps={}",
            self.fingerprint,
            self.basis,
            self.basis_size,
            self.noise_class,
            self.target_precision()
        )
    }
}

/// Pilot and budget knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Target precision ε on the estimate's standard error.
    pub target_precision: f64,
    /// Pilot draws.
    pub pilot_samples: u64,
    /// Largest production sample count.
    pub sample_ceiling: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            target_precision: 0.05,
            pilot_samples: 200,
            sample_ceiling: 200_000,
        }
    }
}

impl CalibrationSettings {
    /// Check ranges.
    pub fn validate(&self) -> CutResult<()> {
        if !(self.target_precision.is_finite() && self.target_precision > 0.0) {
            return Err(CutError::ConfigValidation(format!(
                "target_precision must be positive, got {}",
                self.target_precision
            )));
        }
        if self.pilot_samples < 2 {
            return Err(CutError::ConfigValidation(format!(
                "pilot_sample_count must be at least 2, got {}",
                self.pilot_samples
            )));
        }
        if self.sample_ceiling == 0 {
            return Err(CutError::ConfigValidation(
                "sample_ceiling must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Committed production budget for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingPlan {
    /// Tag the plan was calibrated for.
    pub tag: PlanTag,
    /// Production sample count N*.
    pub samples: u64,
    /// Target precision ε.
    pub target_precision: f64,
    /// Standard error projected at N*: `√(σ̂²κ²/N*)`.
    pub projected_std_error: f64,
    /// Pilot variance σ̂².
    pub pilot_variance: f64,
    /// Pilot draws spent.
    pub pilot_samples: u64,
    /// Ceiling in force.
    pub ceiling: u64,
    /// Whether the ceiling stopped N* short of the bound.
    pub under_budget: bool,
    /// Sampling overhead of the plan.
    pub kappa: f64,
}

/// Smallest `N ≥ 1` with `variance · κ² / N ≤ ε²`, capped at `ceiling`.
///
/// Returns the count and whether the cap left the bound unmet.
pub fn required_samples(kappa: f64, variance: f64, eps: f64, ceiling: u64) -> (u64, bool) {
    let ceiling = ceiling.max(1);
    let need = variance.max(0.0) * kappa * kappa / (eps * eps);
    if !need.is_finite() {
        return (ceiling, true);
    }
    // Absorb rounding so exact quotients such as 32400.000000000004 stay put.
    let n = (need * (1.0 - 1e-12)).ceil().max(1.0);
    if n > ceiling as f64 {
        (ceiling, true)
    } else {
        (n as u64, false)
    }
}

/// Run the pilot for `job` and derive its sampling plan.
#[instrument(skip_all, fields(tag = %tag))]
pub async fn calibrate(
    tag: PlanTag,
    job: &CutJob,
    engine: &ReconstructionEngine,
    executor: &dyn FragmentExecutor,
    settings: &CalibrationSettings,
) -> CutResult<SamplingPlan> {
    settings.validate()?;
    let pilot = engine.pilot(job, executor, settings.pilot_samples).await?;
    let variance = pilot.stats.variance();
    let kappa = job.decomposition.kappa();
    let (samples, under_budget) =
        required_samples(kappa, variance, settings.target_precision, settings.sample_ceiling);
    let projected_std_error = (variance * kappa * kappa / samples as f64).sqrt();

    if under_budget {
        warn!(
            samples,
            projected_std_error,
            target = settings.target_precision,
            "sample ceiling reached before target precision"
        );
    } else {
        info!(samples, variance, kappa, "calibrated");
    }

    Ok(SamplingPlan {
        tag,
        samples,
        target_precision: settings.target_precision,
        projected_std_error,
        pilot_variance: variance,
        pilot_samples: pilot.stats.count(),
        ceiling: settings.sample_ceiling,
        under_budget,
        kappa,
    })
}
