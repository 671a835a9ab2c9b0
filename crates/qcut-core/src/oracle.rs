//! Execution and reference oracles.
//!
//! The cutting layer never simulates a circuit itself. Every fragment
//! variant is handed to an [`ExecutionOracle`], which returns one scalar:
//! the expectation of a Z-product observable on the fragment's final state.
//! Ideal values for correctness metrics come from a [`ReferenceOracle`].
//!
//! # Contract
//!
//! Implementations:
//! - MUST treat [`InstructionKind::SignedMeasure`](qcut_ir::InstructionKind)
//!   linearly: the reported value for a circuit containing it is
//!   `Tr[O · (P0 ρ P0 − P1 ρ P1)]`, which may be negative.
//! - MUST be deterministic for a fixed [`FragmentRequest::seed`] when the
//!   request is otherwise identical.
//! - SHOULD apply `noise.scaled(noise_scale)` as the gate noise for the call.
//! - MAY fail transiently; the engine retries a failing draw once.

use std::fmt;

use async_trait::async_trait;
use qcut_ir::{Circuit, NoiseModel, QubitId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by an execution oracle.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum OracleError {
    /// The backend failed while executing the request.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The circuit contains an instruction the oracle cannot execute.
    #[error("unsupported instruction '{0}'")]
    Unsupported(String),

    /// The circuit is wider than the oracle accepts.
    #[error("circuit has {qubits} qubits, oracle limit is {max}")]
    TooWide {
        /// Width of the request.
        qubits: u32,
        /// Oracle limit.
        max: u32,
    },

    /// The request itself is inconsistent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for oracle calls.
pub type OracleResult<T> = Result<T, OracleError>;

/// Product of Pauli-Z operators on a set of qubits.
///
/// An empty set is the identity observable, whose expectation is 1 on every
/// normalized state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observable {
    qubits: Vec<QubitId>,
}

impl Observable {
    /// Z product on the given qubits; duplicates cancel pairwise.
    pub fn z_product(qubits: impl IntoIterator<Item = QubitId>) -> Self {
        let mut qs: Vec<QubitId> = qubits.into_iter().collect();
        qs.sort();
        let mut out: Vec<QubitId> = Vec::with_capacity(qs.len());
        for q in qs {
            if out.last() == Some(&q) {
                out.pop();
            } else {
                out.push(q);
            }
        }
        Self { qubits: out }
    }

    /// Identity observable.
    pub fn identity() -> Self {
        Self { qubits: vec![] }
    }

    /// Qubits carrying a Z factor, ascending.
    pub fn qubits(&self) -> &[QubitId] {
        &self.qubits
    }

    /// Whether this is the identity.
    pub fn is_identity(&self) -> bool {
        self.qubits.is_empty()
    }

    /// Relabel qubits through a logical → physical layout.
    ///
    /// Returns `None` when a qubit has no entry in the layout.
    pub fn map_through(&self, layout: &[u32]) -> Option<Self> {
        let mapped: Option<Vec<QubitId>> = self
            .qubits
            .iter()
            .map(|q| layout.get(q.index()).map(|&p| QubitId(p)))
            .collect();
        mapped.map(Self::z_product)
    }

    /// Factor acting on the span `[start, start + width)`, in local indices.
    pub fn restrict(&self, start: u32, width: u32) -> Self {
        Self {
            qubits: self
                .qubits
                .iter()
                .filter(|q| q.0 >= start && q.0 < start + width)
                .map(|q| QubitId(q.0 - start))
                .collect(),
        }
    }

    /// Evaluate the Z product on a computational basis index: ±1.
    #[inline]
    pub fn sign_of(&self, basis_index: usize) -> f64 {
        let parity = self
            .qubits
            .iter()
            .fold(0usize, |acc, q| acc ^ ((basis_index >> q.index()) & 1));
        if parity == 0 { 1.0 } else { -1.0 }
    }

    /// Local Z and nearest-neighbour ZZ observables, Z terms first, capped.
    pub fn local_z_zz(num_qubits: u32, cap: usize) -> Vec<Self> {
        let singles = (0..num_qubits).map(|i| Self::z_product([QubitId(i)]));
        let pairs =
            (0..num_qubits.saturating_sub(1)).map(|i| Self::z_product([QubitId(i), QubitId(i + 1)]));
        singles.chain(pairs).take(cap).collect()
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qubits.is_empty() {
            return write!(f, "I");
        }
        for q in &self.qubits {
            write!(f, "Z{}", q.0)?;
        }
        Ok(())
    }
}

/// One call to the execution oracle.
#[derive(Debug, Clone)]
pub struct FragmentRequest {
    /// Index of the fragment in its plan (0 for uncut circuits).
    pub fragment: usize,
    /// Concrete circuit, with every cut marker already substituted.
    pub circuit: Circuit,
    /// Observable factor on this fragment, in local qubit indices.
    pub observable: Observable,
    /// Base gate noise of the configuration.
    pub noise: NoiseModel,
    /// Noise amplification factor, 1.0 for unmitigated calls.
    pub noise_scale: f64,
    /// Seed for any randomness inside the oracle.
    pub seed: u64,
}

impl FragmentRequest {
    /// Noise the oracle should apply for this call.
    pub fn effective_noise(&self) -> NoiseModel {
        self.noise.scaled(self.noise_scale)
    }
}

/// Gate-level executor for fragment circuits.
#[async_trait]
pub trait ExecutionOracle: Send + Sync {
    /// Human-readable oracle name.
    fn name(&self) -> &str;

    /// Execute one request and return the observable expectation.
    async fn execute(&self, request: &FragmentRequest) -> OracleResult<f64>;
}

/// Source of ideal noiseless expectation values.
pub trait ReferenceOracle: Send + Sync {
    /// Ideal expectation of `observable` on `circuit`, if it can be computed.
    fn ideal_expectation(&self, circuit: &Circuit, observable: &Observable) -> Option<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_product_cancels_duplicates() {
        let obs = Observable::z_product([QubitId(2), QubitId(0), QubitId(2)]);
        assert_eq!(obs.qubits(), &[QubitId(0)]);
        assert_eq!(obs.to_string(), "Z0");
        assert!(Observable::z_product([QubitId(1), QubitId(1)]).is_identity());
    }

    #[test]
    fn test_restrict_and_sign() {
        let obs = Observable::z_product([QubitId(1), QubitId(4)]);
        let right = obs.restrict(3, 3);
        assert_eq!(right.qubits(), &[QubitId(1)]);
        assert_eq!(right.sign_of(0b010), -1.0);
        assert_eq!(right.sign_of(0b001), 1.0);
        assert!(obs.restrict(5, 2).is_identity());
    }

    #[test]
    fn test_map_through_layout() {
        let obs = Observable::z_product([QubitId(0), QubitId(2)]);
        let mapped = obs.map_through(&[3, 1, 0]).unwrap();
        assert_eq!(mapped.qubits(), &[QubitId(0), QubitId(3)]);
        assert!(obs.map_through(&[0]).is_none());
    }

    #[test]
    fn test_local_z_zz_policy() {
        let all = Observable::local_z_zz(4, 20);
        assert_eq!(all.len(), 7);
        assert_eq!(all[4].to_string(), "Z0Z1");
        assert_eq!(Observable::local_z_zz(4, 2).len(), 2);
    }
}
