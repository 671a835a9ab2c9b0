//! Finalized expectation-value estimates.

use serde::{Deserialize, Serialize};

use crate::config::ConfigurationKey;
use crate::engine::DrawSummary;
use crate::pipeline::Pipeline;

/// Point value with spread, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub pipeline: Pipeline,
    pub configuration: ConfigurationKey,
    pub replicate: u32,
    /// Mean of the per-draw contributions.
    pub value: f64,
    /// Sample variance of the per-draw contributions.
    pub variance: f64,
    /// Standard error of `value`.
    pub std_error: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub samples_consumed: u64,
    pub oracle_calls: u64,
    /// The 95% interval was taken below the central-limit sample count.
    pub approximate_ci: bool,
    /// The sampling plan hit its ceiling before the target precision.
    pub under_budget: bool,
    /// At least one extrapolation fit was poor.
    pub unstable: bool,
    pub unstable_draws: u64,
    /// Largest extrapolation fit residual, for mitigated estimates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_residual: Option<f64>,
}

impl Estimate {
    /// Finalize accumulated draws.
    pub fn from_summary(
        pipeline: Pipeline,
        configuration: ConfigurationKey,
        replicate: u32,
        summary: &DrawSummary,
        under_budget: bool,
    ) -> Self {
        let stats = &summary.stats;
        let (ci_low, ci_high) = stats.ci95();
        Self {
            pipeline,
            configuration,
            replicate,
            value: stats.mean(),
            variance: stats.variance(),
            std_error: stats.std_error(),
            ci_low,
            ci_high,
            samples_consumed: stats.count(),
            oracle_calls: summary.oracle_calls,
            approximate_ci: stats.is_approximate(),
            under_budget,
            unstable: summary.unstable_draws > 0,
            unstable_draws: summary.unstable_draws,
            max_residual: summary.max_residual,
        }
    }

    /// Whether any degraded-condition flag is set.
    pub fn is_flagged(&self) -> bool {
        self.under_budget || self.unstable
    }
}
