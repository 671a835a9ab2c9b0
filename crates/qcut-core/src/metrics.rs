//! Metrics M1–M4.
//!
//! - **M1** accuracy against the ideal reference.
//! - **M2** structural inflation of what was executed relative to the
//!   uncompiled kernel. For cutting pipelines the executed unit is the
//!   fragment set.
//! - **M3** realized oracle calls relative to the shots an uncut execution
//!   needs for the same precision.
//! - **M4** spread of the estimate, with upstream flags.
//!
//! A metric that cannot be computed is a [`MetricCell::Unavailable`] cell,
//! never an error.

use qcut_ir::Circuit;
use serde::{Deserialize, Serialize};

/// A metric value or the reason it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCell {
    /// Computed value.
    Value(f64),
    /// Could not be computed.
    Unavailable {
        /// Why.
        reason: String,
    },
}

impl MetricCell {
    /// Missing cell.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        MetricCell::Unavailable {
            reason: reason.into(),
        }
    }

    /// The value, if present.
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricCell::Value(v) => Some(*v),
            MetricCell::Unavailable { .. } => None,
        }
    }

    /// Whether a value is present.
    pub fn is_available(&self) -> bool {
        matches!(self, MetricCell::Value(_))
    }

    fn ratio(num: f64, den: f64, what: &str) -> Self {
        if den == 0.0 {
            Self::unavailable(format!("{what} baseline is zero"))
        } else {
            MetricCell::Value(num / den)
        }
    }
}

/// Size figures of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStats {
    pub num_qubits: u32,
    pub depth: usize,
    pub size: usize,
    pub two_qubit_gates: usize,
}

impl CircuitStats {
    pub fn of(circuit: &Circuit) -> Self {
        Self {
            num_qubits: circuit.num_qubits(),
            depth: circuit.depth(),
            size: circuit.size(),
            two_qubit_gates: circuit.num_two_qubit_gates(),
        }
    }
}

/// Size figures of a fragment set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FragmentStats {
    pub n_fragments: usize,
    pub depth_max: usize,
    pub depth_mean: f64,
    pub size_total: usize,
    pub size_max: usize,
    pub size_mean: f64,
    pub twoq_total: usize,
    pub twoq_max: usize,
    pub twoq_mean: f64,
}

impl FragmentStats {
    /// Summarize `fragments`; all zero when empty.
    pub fn of(fragments: &[Circuit]) -> Self {
        if fragments.is_empty() {
            return Self::default();
        }
        let n = fragments.len();
        let stats: Vec<CircuitStats> = fragments.iter().map(CircuitStats::of).collect();
        let depths = stats.iter().map(|s| s.depth);
        let sizes = stats.iter().map(|s| s.size);
        let twoqs = stats.iter().map(|s| s.two_qubit_gates);
        let size_total: usize = sizes.clone().sum();
        let twoq_total: usize = twoqs.clone().sum();
        Self {
            n_fragments: n,
            depth_max: depths.clone().max().unwrap_or(0),
            depth_mean: depths.sum::<usize>() as f64 / n as f64,
            size_total,
            size_max: sizes.max().unwrap_or(0),
            size_mean: size_total as f64 / n as f64,
            twoq_total,
            twoq_max: twoqs.max().unwrap_or(0),
            twoq_mean: twoq_total as f64 / n as f64,
        }
    }
}

/// What a pipeline actually executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ExecutedShape {
    /// One routed circuit.
    FullCircuit(CircuitStats),
    /// A fragment set.
    Fragments(FragmentStats),
}

impl ExecutedShape {
    /// Critical-path depth of the executed unit.
    pub fn depth(&self) -> usize {
        match self {
            ExecutedShape::FullCircuit(s) => s.depth,
            ExecutedShape::Fragments(f) => f.depth_max,
        }
    }

    /// Two-qubit gates across the executed unit.
    pub fn two_qubit_gates(&self) -> usize {
        match self {
            ExecutedShape::FullCircuit(s) => s.two_qubit_gates,
            ExecutedShape::Fragments(f) => f.twoq_total,
        }
    }
}

/// Accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct M1 {
    /// `|estimate − reference|`.
    pub abs_error: MetricCell,
    /// `|estimate − reference| / |reference|`.
    pub rel_error: MetricCell,
    /// Reference value used.
    pub reference: Option<f64>,
}

/// Compare an estimate against the ideal reference.
pub fn m1_accuracy(estimate: f64, reference: Option<f64>) -> M1 {
    let Some(r) = reference else {
        return M1 {
            abs_error: MetricCell::unavailable("no ideal reference"),
            rel_error: MetricCell::unavailable("no ideal reference"),
            reference: None,
        };
    };
    let abs = (estimate - r).abs();
    let rel = if r.abs() < 1e-12 {
        MetricCell::unavailable("reference is zero")
    } else {
        MetricCell::Value(abs / r.abs())
    };
    M1 {
        abs_error: MetricCell::Value(abs),
        rel_error: rel,
        reference: Some(r),
    }
}

/// Mean absolute error between equal-length non-empty vectors.
pub fn m1_mae(ideal: &[f64], approx: &[f64]) -> Option<f64> {
    if ideal.len() != approx.len() || ideal.is_empty() {
        return None;
    }
    let sum: f64 = ideal.iter().zip(approx).map(|(a, b)| (a - b).abs()).sum();
    Some(sum / ideal.len() as f64)
}

/// Root-mean-square error between equal-length non-empty vectors.
pub fn m1_rmse(ideal: &[f64], approx: &[f64]) -> Option<f64> {
    if ideal.len() != approx.len() || ideal.is_empty() {
        return None;
    }
    let sum: f64 = ideal.iter().zip(approx).map(|(a, b)| (a - b) * (a - b)).sum();
    Some((sum / ideal.len() as f64).sqrt())
}

/// Structural inflation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct M2 {
    /// Executed depth over kernel depth.
    pub depth_ratio: MetricCell,
    /// Executed two-qubit count over kernel two-qubit count.
    pub twoq_ratio: MetricCell,
    /// Uncompiled kernel figures.
    pub original: CircuitStats,
    /// Executed figures.
    pub executed: ExecutedShape,
}

pub fn m2_inflation(original: CircuitStats, executed: ExecutedShape) -> M2 {
    M2 {
        depth_ratio: MetricCell::ratio(executed.depth() as f64, original.depth as f64, "depth"),
        twoq_ratio: MetricCell::ratio(
            executed.two_qubit_gates() as f64,
            original.two_qubit_gates as f64,
            "two-qubit count",
        ),
        original,
        executed,
    }
}

/// Realized cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct M3 {
    /// `oracle_calls / baseline_calls`.
    pub overhead: MetricCell,
    pub oracle_calls: u64,
    pub baseline_calls: u64,
    /// Draws consumed, for cutting pipelines.
    pub samples: Option<u64>,
    /// κ of the plan, for cutting pipelines.
    pub kappa: Option<f64>,
}

/// Single-shot executions the uncut circuit needs for standard error `eps`.
///
/// One shot of a Z-product observable with mean `μ` is a ±1 outcome of
/// variance `1 − μ²`, so the count is `⌈(1 − μ²)/ε²⌉`, at least 1. Without a
/// mean the worst case `μ = 0` applies.
pub fn uncut_shot_cost(mean: Option<f64>, eps: f64) -> u64 {
    let mu = mean.filter(|m| m.is_finite()).unwrap_or(0.0).clamp(-1.0, 1.0);
    let need = (1.0 - mu * mu) / (eps * eps);
    if !need.is_finite() {
        return u64::MAX;
    }
    // Absorb rounding so exact quotients stay put.
    (need * (1.0 - 1e-12)).ceil().max(1.0) as u64
}

pub fn m3_overhead(oracle_calls: u64, baseline_calls: u64, samples: Option<u64>, kappa: Option<f64>) -> M3 {
    M3 {
        overhead: MetricCell::ratio(oracle_calls as f64, baseline_calls as f64, "call"),
        oracle_calls,
        baseline_calls,
        samples,
        kappa,
    }
}

/// Stability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct M4 {
    /// Variance across replicates, or the single-run variance of the mean.
    pub variance: MetricCell,
    /// Replicates the variance was taken over.
    pub replicates: usize,
    pub under_budget: bool,
    pub unstable: bool,
    /// Largest extrapolation fit residual behind the estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_residual: Option<f64>,
}

/// Single-run stability: the squared standard error of one estimate.
pub fn m4_single(std_error: f64, under_budget: bool, unstable: bool, max_residual: Option<f64>) -> M4 {
    M4 {
        variance: if std_error.is_finite() {
            MetricCell::Value(std_error * std_error)
        } else {
            MetricCell::unavailable("standard error is not finite")
        },
        replicates: 1,
        under_budget,
        unstable,
        max_residual,
    }
}

/// Replicate stability: unbiased variance of the replicate values.
///
/// Falls back to [`m4_single`] semantics when fewer than two replicates ran.
pub fn m4_replicates(
    values: &[f64],
    fallback_std_error: f64,
    under_budget: bool,
    unstable: bool,
    max_residual: Option<f64>,
) -> M4 {
    if values.len() < 2 {
        return m4_single(fallback_std_error, under_budget, unstable, max_residual);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    M4 {
        variance: MetricCell::Value(var),
        replicates: values.len(),
        under_budget,
        unstable,
        max_residual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_ir::QubitId;

    #[test]
    fn test_m1_absolute_error() {
        let m = m1_accuracy(0.82, Some(0.80));
        assert!((m.abs_error.value().unwrap() - 0.02).abs() < 1e-12);
        assert!((m.rel_error.value().unwrap() - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_m1_without_reference() {
        let m = m1_accuracy(0.5, None);
        assert!(!m.abs_error.is_available());
        assert_eq!(m.abs_error, MetricCell::unavailable("no ideal reference"));
    }

    #[test]
    fn test_mae_rmse() {
        assert_eq!(m1_mae(&[1.0, 0.0], &[0.5, 0.5]), Some(0.5));
        assert_eq!(m1_rmse(&[1.0, 0.0], &[0.5, 0.5]), Some(0.5));
        assert_eq!(m1_mae(&[], &[]), None);
        assert_eq!(m1_rmse(&[1.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn test_fragment_stats() {
        let mut a = Circuit::with_size("a", 3);
        a.h(QubitId(0)).unwrap();
        a.cx(QubitId(0), QubitId(1)).unwrap();
        let mut b = Circuit::with_size("b", 3);
        b.cx(QubitId(0), QubitId(1)).unwrap();
        b.cx(QubitId(1), QubitId(2)).unwrap();
        b.cx(QubitId(0), QubitId(2)).unwrap();
        let s = FragmentStats::of(&[a, b]);
        assert_eq!(s.n_fragments, 2);
        assert_eq!(s.depth_max, 3);
        assert_eq!(s.depth_mean, 2.5);
        assert_eq!(s.twoq_total, 4);
        assert_eq!(s.twoq_max, 3);
        assert_eq!(s.size_total, 5);
        assert_eq!(FragmentStats::of(&[]), FragmentStats::default());
    }

    #[test]
    fn test_m2_ratios() {
        let original = CircuitStats {
            num_qubits: 4,
            depth: 10,
            size: 20,
            two_qubit_gates: 5,
        };
        let executed = ExecutedShape::FullCircuit(CircuitStats {
            num_qubits: 4,
            depth: 15,
            size: 30,
            two_qubit_gates: 11,
        });
        let m = m2_inflation(original, executed);
        assert_eq!(m.depth_ratio.value(), Some(1.5));
        assert_eq!(m.twoq_ratio.value(), Some(2.2));

        let flat = CircuitStats {
            two_qubit_gates: 0,
            ..original
        };
        let m = m2_inflation(flat, ExecutedShape::Fragments(FragmentStats::default()));
        assert!(!m.twoq_ratio.is_available());
    }

    #[test]
    fn test_m3_and_m4() {
        let m3 = m3_overhead(3600, 400, Some(1800), Some(9.0));
        assert_eq!(m3.overhead.value(), Some(9.0));
        assert!(!m3_overhead(1, 0, None, None).overhead.is_available());

        let m4 = m4_replicates(&[1.0, 2.0, 3.0], 0.0, true, false, None);
        assert_eq!(m4.variance.value(), Some(1.0));
        assert_eq!(m4.replicates, 3);
        assert!(m4.under_budget);

        let single = m4_replicates(&[1.0], 0.1, false, true, Some(0.2));
        assert!((single.variance.value().unwrap() - 0.01).abs() < 1e-15);
        assert!(single.unstable);
        assert_eq!(single.max_residual, Some(0.2));
    }

    #[test]
    fn test_uncut_shot_cost_follows_precision() {
        // 1 − 0.6² = 0.64 per shot.
        assert_eq!(uncut_shot_cost(Some(0.6), 0.1), 64);
        assert_eq!(uncut_shot_cost(Some(0.6), 0.05), 256);
        assert_eq!(uncut_shot_cost(None, 0.1), 100);
        assert_eq!(uncut_shot_cost(Some(1.0), 0.01), 1);
        assert_eq!(uncut_shot_cost(Some(f64::NAN), 0.5), 4);

        let mut previous = 0;
        for eps in [0.4, 0.2, 0.1, 0.05, 0.025] {
            let n = uncut_shot_cost(Some(0.3), eps);
            assert!(n >= previous);
            previous = n;
        }
        // Same realized calls weigh more against a looser baseline.
        let tight = m3_overhead(1000, uncut_shot_cost(Some(0.6), 0.05), None, None);
        let loose = m3_overhead(1000, uncut_shot_cost(Some(0.6), 0.1), None, None);
        assert!((loose.overhead.value().unwrap() / tight.overhead.value().unwrap() - 4.0).abs() < 1e-12);
    }
}
