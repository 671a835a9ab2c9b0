//! Zero-noise extrapolation.
//!
//! A [`ZneExecutor`] runs each fragment request once per scale factor with
//! the request's `noise_scale` set accordingly, fits a polynomial in the
//! scale by least squares and hands the intercept to reconstruction. A fit
//! whose RMS residual exceeds the threshold marks the outcome unstable.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::engine::{FragmentExecutor, FragmentOutcome};
use crate::error::{CutError, CutResult};
use crate::oracle::{ExecutionOracle, FragmentRequest, OracleError, OracleResult};
use crate::sampling::call_seed;

/// Extrapolation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZneModel {
    /// Degree-1 fit.
    #[default]
    Linear,
    /// Degree-2 fit.
    Quadratic,
    /// Polynomial through every point (degree = points − 1).
    Richardson,
}

impl ZneModel {
    /// Polynomial degree used for `points` samples.
    pub fn degree(&self, points: usize) -> usize {
        match self {
            ZneModel::Linear => 1,
            ZneModel::Quadratic => 2,
            ZneModel::Richardson => points.saturating_sub(1),
        }
    }

    /// Name as written in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ZneModel::Linear => "linear",
            ZneModel::Quadratic => "quadratic",
            ZneModel::Richardson => "richardson",
        }
    }
}

impl fmt::Display for ZneModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scale factors, model and stability threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ZneSettings {
    /// Noise scale factors, each ≥ 1.
    pub scales: Vec<f64>,
    /// Fit model.
    pub model: ZneModel,
    /// RMS residual above which an outcome is unstable.
    pub residual_threshold: f64,
}

impl Default for ZneSettings {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 2.0, 3.0],
            model: ZneModel::Linear,
            residual_threshold: 0.05,
        }
    }
}

impl ZneSettings {
    /// Check scales and model order.
    pub fn validate(&self) -> CutResult<()> {
        if self.scales.len() < 2 {
            return Err(CutError::ConfigValidation(format!(
                "zne needs at least two scale factors, got {}",
                self.scales.len()
            )));
        }
        if let Some(s) = self.scales.iter().find(|s| !s.is_finite() || **s < 1.0) {
            return Err(CutError::ConfigValidation(format!(
                "zne scale factors must be finite and >= 1.0, got {s}"
            )));
        }
        for (i, a) in self.scales.iter().enumerate() {
            if self.scales[..i].iter().any(|b| (a - b).abs() < 1e-12) {
                return Err(CutError::ConfigValidation(format!(
                    "zne scale factor {a} is repeated"
                )));
            }
        }
        if self.model.degree(self.scales.len()) >= self.scales.len() {
            return Err(CutError::ConfigValidation(format!(
                "{} model needs more than {} scale factors",
                self.model,
                self.scales.len()
            )));
        }
        if !(self.residual_threshold.is_finite() && self.residual_threshold >= 0.0) {
            return Err(CutError::ConfigValidation(format!(
                "zne residual threshold must be non-negative, got {}",
                self.residual_threshold
            )));
        }
        Ok(())
    }
}

/// Fitted zero-noise value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrapolation {
    /// Value at scale 0.
    pub intercept: f64,
    /// Root-mean-square fit residual.
    pub residual: f64,
}

/// Least-squares polynomial fit of `values` against `scales`, evaluated at 0.
///
/// Returns `None` for mismatched inputs, too few points for the model, or a
/// singular system.
pub fn extrapolate(scales: &[f64], values: &[f64], model: ZneModel) -> Option<Extrapolation> {
    let n = scales.len();
    if n != values.len() || n < 2 {
        return None;
    }
    let degree = model.degree(n);
    if degree >= n {
        return None;
    }
    let cols = degree + 1;
    let vander = Array2::from_shape_fn((n, cols), |(i, j)| scales[i].powi(j as i32));
    let y = Array1::from_vec(values.to_vec());

    // Normal equations: (VᵀV) c = Vᵀy.
    let gram = vander.t().dot(&vander);
    let rhs = vander.t().dot(&y);
    let coeffs = solve(gram, rhs)?;

    let fitted = vander.dot(&coeffs);
    let sq: f64 = fitted
        .iter()
        .zip(values)
        .map(|(f, v)| (f - v) * (f - v))
        .sum();
    Some(Extrapolation {
        intercept: coeffs[0],
        residual: (sq / n as f64).sqrt(),
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

/// Executor that extrapolates every fragment outcome to zero noise.
pub struct ZneExecutor {
    oracle: Arc<dyn ExecutionOracle>,
    settings: ZneSettings,
}

impl ZneExecutor {
    /// Wrap an oracle; `settings` must validate.
    pub fn new(oracle: Arc<dyn ExecutionOracle>, settings: ZneSettings) -> CutResult<Self> {
        settings.validate()?;
        Ok(Self { oracle, settings })
    }

    /// Active settings.
    pub fn settings(&self) -> &ZneSettings {
        &self.settings
    }
}

#[async_trait]
impl FragmentExecutor for ZneExecutor {
    async fn run(&self, request: FragmentRequest) -> OracleResult<FragmentOutcome> {
        let calls = self.settings.scales.iter().enumerate().map(|(i, &scale)| {
            let scaled = FragmentRequest {
                noise_scale: request.noise_scale * scale,
                seed: call_seed(request.seed, request.fragment, i),
                ..request.clone()
            };
            async move { self.oracle.execute(&scaled).await }
        });
        let values = try_join_all(calls).await?;

        let fit = extrapolate(&self.settings.scales, &values, self.settings.model).ok_or_else(
            || OracleError::Execution(format!("zne fit failed for values {values:?}")),
        )?;
        let unstable = fit.residual > self.settings.residual_threshold;
        trace!(
            fragment = request.fragment,
            intercept = fit.intercept,
            residual = fit.residual,
            unstable,
            "extrapolated"
        );
        Ok(FragmentOutcome {
            value: fit.intercept,
            residual: Some(fit.residual),
            unstable,
            calls: self.settings.scales.len() as u64,
        })
    }

    fn calls_per_run(&self) -> u64 {
        self.settings.scales.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_ir::{Circuit, NoiseModel};
    use crate::oracle::Observable;

    #[test]
    fn test_linear_recovers_intercept() {
        let scales = [1.0, 2.0, 3.0];
        let values: Vec<f64> = scales.iter().map(|s| 0.9 - 0.1 * s).collect();
        let fit = extrapolate(&scales, &values, ZneModel::Linear).unwrap();
        assert!((fit.intercept - 0.9).abs() < 1e-12);
        assert!(fit.residual < 1e-12);
    }

    #[test]
    fn test_richardson_interpolates_quadratic() {
        let scales = [1.0, 2.0, 3.0];
        let values: Vec<f64> = scales.iter().map(|s| 1.0 - 0.2 * s + 0.03 * s * s).collect();
        let fit = extrapolate(&scales, &values, ZneModel::Richardson).unwrap();
        assert!((fit.intercept - 1.0).abs() < 1e-10);
        let lin = extrapolate(&scales, &values, ZneModel::Linear).unwrap();
        assert!(lin.residual > 0.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(extrapolate(&[1.0], &[0.5], ZneModel::Linear).is_none());
        assert!(extrapolate(&[1.0, 2.0], &[0.5], ZneModel::Linear).is_none());
        assert!(extrapolate(&[1.0, 2.0], &[0.5, 0.4], ZneModel::Quadratic).is_none());
        assert!(extrapolate(&[2.0, 2.0], &[0.5, 0.4], ZneModel::Linear).is_none());
    }

    #[test]
    fn test_settings_validation() {
        assert!(ZneSettings::default().validate().is_ok());
        let bad_scale = ZneSettings {
            scales: vec![0.5, 1.0],
            ..Default::default()
        };
        assert!(bad_scale.validate().is_err());
        let one_point = ZneSettings {
            scales: vec![1.0],
            ..Default::default()
        };
        assert!(one_point.validate().is_err());
        let quad_two = ZneSettings {
            scales: vec![1.0, 3.0],
            model: ZneModel::Quadratic,
            ..Default::default()
        };
        assert!(quad_two.validate().is_err());
    }

    /// Value decays linearly with the effective two-qubit error rate.
    struct Decaying;

    #[async_trait]
    impl ExecutionOracle for Decaying {
        fn name(&self) -> &str {
            "decaying"
        }

        async fn execute(&self, request: &FragmentRequest) -> OracleResult<f64> {
            Ok(0.8 - request.noise_scale * 0.05)
        }
    }

    #[tokio::test]
    async fn test_executor_extrapolates() {
        let exec = ZneExecutor::new(Arc::new(Decaying), ZneSettings::default()).unwrap();
        let out = exec
            .run(FragmentRequest {
                fragment: 0,
                circuit: Circuit::with_size("empty", 1),
                observable: Observable::identity(),
                noise: NoiseModel::from_level(0.01),
                noise_scale: 1.0,
                seed: 3,
            })
            .await
            .unwrap();
        assert!((out.value - 0.8).abs() < 1e-12);
        assert!(!out.unstable);
        assert_eq!(out.calls, 3);
    }
}
