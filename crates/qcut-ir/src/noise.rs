//! Gate noise parameters handed to execution oracles.
//!
//! Only depolarizing noise is modeled: a level `p` maps to a single-qubit
//! error rate `p1 = p` and a two-qubit rate `p2 = min(0.2, 10p)`, on the
//! assumption that entangling gates are an order of magnitude noisier.
//!
//! Noise *scaling* (for zero-noise extrapolation) multiplies both rates by a
//! factor `λ ≥ 1`, clamped so that no rate exceeds 1.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ceiling on the derived two-qubit depolarizing rate.
pub const MAX_TWO_QUBIT_RATE: f64 = 0.2;

/// Depolarizing noise applied after every gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseModel {
    /// Depolarizing probability after single-qubit gates.
    pub p1: f64,
    /// Depolarizing probability after two-qubit gates.
    pub p2: f64,
}

impl NoiseModel {
    /// Noiseless model.
    pub const IDEAL: NoiseModel = NoiseModel { p1: 0.0, p2: 0.0 };

    /// Derive gate rates from a configured noise level.
    pub fn from_level(level: f64) -> Self {
        let p = level.max(0.0);
        Self {
            p1: p.min(1.0),
            p2: (10.0 * p).min(MAX_TWO_QUBIT_RATE),
        }
    }

    /// Amplify both rates by `factor`, clamped to valid probabilities.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            p1: (self.p1 * factor).clamp(0.0, 1.0),
            p2: (self.p2 * factor).clamp(0.0, 1.0),
        }
    }

    /// Whether this model adds no noise.
    pub fn is_ideal(&self) -> bool {
        self.p1 <= 0.0 && self.p2 <= 0.0
    }

    /// Coarse class used to share calibration across nearby noise levels.
    pub fn class(&self) -> NoiseClass {
        NoiseClass::of_rate(self.p1)
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self::IDEAL
    }
}

impl fmt::Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ideal() {
            write!(f, "ideal")
        } else {
            write!(f, "depolarizing(p1={:.4}, p2={:.4})", self.p1, self.p2)
        }
    }
}

/// Noise-model class: the noise component of a calibration tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseClass {
    /// No gate noise.
    Ideal,
    /// `p ≤ 1e-3`.
    Low,
    /// `1e-3 < p ≤ 5e-3`.
    Medium,
    /// `p > 5e-3`.
    High,
}

impl NoiseClass {
    /// Classify a single-qubit depolarizing rate.
    pub fn of_rate(p: f64) -> Self {
        if p <= 0.0 {
            NoiseClass::Ideal
        } else if p <= 1e-3 {
            NoiseClass::Low
        } else if p <= 5e-3 {
            NoiseClass::Medium
        } else {
            NoiseClass::High
        }
    }

    /// Short label used in file output.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseClass::Ideal => "ideal",
            NoiseClass::Low => "low",
            NoiseClass::Medium => "medium",
            NoiseClass::High => "high",
        }
    }
}

impl fmt::Display for NoiseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_level() {
        let m = NoiseModel::from_level(1e-3);
        assert!((m.p1 - 1e-3).abs() < 1e-15);
        assert!((m.p2 - 1e-2).abs() < 1e-15);

        let heavy = NoiseModel::from_level(0.05);
        assert_eq!(heavy.p2, MAX_TWO_QUBIT_RATE);
    }

    #[test]
    fn test_scaled_clamps() {
        let m = NoiseModel::from_level(0.05).scaled(7.0);
        assert!((m.p1 - 0.35).abs() < 1e-12);
        assert_eq!(m.p2, 1.0);
        assert!(NoiseModel::IDEAL.scaled(3.0).is_ideal());
    }

    #[test]
    fn test_class_buckets() {
        assert_eq!(NoiseModel::IDEAL.class(), NoiseClass::Ideal);
        assert_eq!(NoiseModel::from_level(5e-4).class(), NoiseClass::Low);
        assert_eq!(NoiseModel::from_level(1e-3).class(), NoiseClass::Low);
        assert_eq!(NoiseModel::from_level(2e-3).class(), NoiseClass::Medium);
        assert_eq!(NoiseModel::from_level(1e-2).class(), NoiseClass::High);
        assert_eq!(NoiseClass::Medium.to_string(), "medium");
    }
}
