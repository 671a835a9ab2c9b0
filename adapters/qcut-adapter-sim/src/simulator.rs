//! Oracle implementations backed by the statevector engine.

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::{debug, instrument};

use qcut_core::sampling::mix;
use qcut_core::{
    ExecutionOracle, FragmentRequest, Observable, OracleError, OracleResult, ReferenceOracle,
};
use qcut_ir::{Circuit, InstructionKind, NoiseModel};

use crate::statevector::{Pauli, Statevector};

/// Default width limit.
pub const DEFAULT_MAX_QUBITS: u32 = 20;

/// Default number of noise trajectories per call.
pub const DEFAULT_TRAJECTORIES: usize = 32;

/// Branches whose squared norm falls below this are dropped.
const PRUNE_NORM: f64 = 1e-28;

/// Noisy statevector oracle.
///
/// Depolarizing noise is unravelled into Pauli trajectories: after each
/// gate on `m` qubits, with probability `p1` (one qubit) or `p2` (more), a
/// uniformly chosen non-identity Pauli string hits the gate's qubits. The
/// reported value is the mean over trajectories, each seeded from the
/// request seed. Ideal requests run a single trajectory.
///
/// Signed measurements split the state into a `+` branch (outcome 0) and a
/// `-` branch (outcome 1) that evolve side by side, so their contribution is
/// exact rather than sampled.
#[derive(Debug, Clone)]
pub struct StatevectorOracle {
    max_qubits: u32,
    trajectories: usize,
}

impl StatevectorOracle {
    pub fn new() -> Self {
        Self {
            max_qubits: DEFAULT_MAX_QUBITS,
            trajectories: DEFAULT_TRAJECTORIES,
        }
    }

    /// Limit accepted circuit width.
    pub fn with_max_qubits(mut self, max_qubits: u32) -> Self {
        self.max_qubits = max_qubits;
        self
    }

    /// Set the trajectory count for noisy calls.
    pub fn with_trajectories(mut self, trajectories: usize) -> Self {
        self.trajectories = trajectories.max(1);
        self
    }

    pub fn max_qubits(&self) -> u32 {
        self.max_qubits
    }

    fn check_width(&self, circuit: &Circuit) -> OracleResult<()> {
        if circuit.num_qubits() > self.max_qubits {
            return Err(OracleError::TooWide {
                qubits: circuit.num_qubits(),
                max: self.max_qubits,
            });
        }
        Ok(())
    }
}

impl Default for StatevectorOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionOracle for StatevectorOracle {
    fn name(&self) -> &str {
        "statevector"
    }

    #[instrument(skip_all, fields(fragment = request.fragment, qubits = request.circuit.num_qubits()))]
    async fn execute(&self, request: &FragmentRequest) -> OracleResult<f64> {
        self.check_width(&request.circuit)?;
        let circuit = request.circuit.clone();
        let observable = request.observable.clone();
        let noise = request.effective_noise();
        let trajectories = if noise.is_ideal() { 1 } else { self.trajectories };
        let seed = request.seed;

        tokio::task::spawn_blocking(move || {
            expectation(&circuit, &observable, noise, trajectories, seed)
        })
        .await
        .map_err(|e| OracleError::Execution(format!("simulation task failed: {e}")))?
    }
}

/// Noiseless reference values from the same engine.
#[derive(Debug, Clone)]
pub struct StatevectorReference {
    max_qubits: u32,
}

impl StatevectorReference {
    pub fn new() -> Self {
        Self {
            max_qubits: DEFAULT_MAX_QUBITS,
        }
    }

    pub fn with_max_qubits(max_qubits: u32) -> Self {
        Self { max_qubits }
    }
}

impl Default for StatevectorReference {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceOracle for StatevectorReference {
    fn ideal_expectation(&self, circuit: &Circuit, observable: &Observable) -> Option<f64> {
        if circuit.num_qubits() > self.max_qubits {
            return None;
        }
        expectation(circuit, observable, NoiseModel::IDEAL, 1, 0).ok()
    }
}

/// Mean observable value over `trajectories` noise realizations.
pub fn expectation(
    circuit: &Circuit,
    observable: &Observable,
    noise: NoiseModel,
    trajectories: usize,
    seed: u64,
) -> OracleResult<f64> {
    let n = circuit.num_qubits();
    if let Some(q) = observable.qubits().iter().find(|q| q.0 >= n) {
        return Err(OracleError::InvalidRequest(format!(
            "observable qubit {q} outside {n}-qubit circuit"
        )));
    }

    let start = Instant::now();
    let runs = trajectories.max(1);
    let mut total = 0.0;
    for t in 0..runs {
        let mut rng = SmallRng::seed_from_u64(mix(&[seed, t as u64]));
        total += run_trajectory(circuit, observable, noise, &mut rng)?;
    }
    debug!(
        qubits = n,
        trajectories = runs,
        elapsed_us = start.elapsed().as_micros() as u64,
        "simulation finished"
    );
    Ok(total / runs as f64)
}

fn run_trajectory(
    circuit: &Circuit,
    observable: &Observable,
    noise: NoiseModel,
    rng: &mut SmallRng,
) -> OracleResult<f64> {
    let mut branches = vec![(1.0, Statevector::new(circuit.num_qubits() as usize))];

    for inst in circuit.instructions() {
        let qubits: Vec<usize> = inst.qubits.iter().map(|q| q.index()).collect();
        match &inst.kind {
            InstructionKind::Gate(gate) => {
                for (_, sv) in &mut branches {
                    sv.apply_gate(gate, &qubits);
                }
                if let Some(error) = sample_error(&qubits, noise, rng) {
                    for (_, sv) in &mut branches {
                        for (&q, &p) in qubits.iter().zip(&error) {
                            sv.apply_pauli(p, q);
                        }
                    }
                }
            }
            InstructionKind::SignedMeasure => {
                let q = qubits[0];
                branches = branches
                    .into_iter()
                    .flat_map(|(sign, sv)| {
                        let (zero, one) = sv.split(q);
                        [(sign, zero), (-sign, one)]
                    })
                    .filter(|(_, sv)| sv.norm_sqr() > PRUNE_NORM)
                    .collect();
            }
            InstructionKind::Barrier => {}
            InstructionKind::CutMarker { .. } => {
                return Err(OracleError::Unsupported(inst.name().to_string()));
            }
        }
    }

    Ok(branches
        .iter()
        .map(|(sign, sv)| sign * sv.expectation(observable))
        .sum())
}

/// Draw the Pauli string, if any, that follows a gate on `qubits`.
fn sample_error(qubits: &[usize], noise: NoiseModel, rng: &mut SmallRng) -> Option<Vec<Pauli>> {
    let p = match qubits.len() {
        0 => return None,
        1 => noise.p1,
        _ => noise.p2,
    };
    if p <= 0.0 || !rng.gen_bool(p.min(1.0)) {
        return None;
    }
    // Index into the 4^m - 1 non-identity strings, two bits per qubit.
    let strings = 1usize << (2 * qubits.len());
    let k = rng.gen_range(1..strings);
    Some(
        (0..qubits.len())
            .map(|i| Pauli::ALL[(k >> (2 * i)) & 3])
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_ir::QubitId;

    fn bell() -> Circuit {
        let mut c = Circuit::with_size("bell", 2);
        c.h(QubitId(0)).unwrap();
        c.cx(QubitId(0), QubitId(1)).unwrap();
        c
    }

    fn zz() -> Observable {
        Observable::z_product([QubitId(0), QubitId(1)])
    }

    #[test]
    fn test_ideal_bell() {
        let v = expectation(&bell(), &zz(), NoiseModel::IDEAL, 1, 0).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
        let z0 = Observable::z_product([QubitId(0)]);
        assert!(expectation(&bell(), &z0, NoiseModel::IDEAL, 1, 0).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_signed_measure_is_linear() {
        // Ry(θ)|0⟩ then signed Z measurement: ⟨I⟩ = cos θ.
        let theta = 0.9_f64;
        let mut c = Circuit::with_size("m", 1);
        c.ry(theta, QubitId(0)).unwrap();
        c.signed_measure(QubitId(0)).unwrap();
        let v = expectation(&c, &Observable::identity(), NoiseModel::IDEAL, 1, 0).unwrap();
        assert!((v - theta.cos()).abs() < 1e-12);

        // Measuring again squares the sign away: ⟨Z⟩ after two measurements.
        c.signed_measure(QubitId(0)).unwrap();
        let z = Observable::z_product([QubitId(0)]);
        let v = expectation(&c, &z, NoiseModel::IDEAL, 1, 0).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_noise_shrinks_correlation() {
        let noise = NoiseModel { p1: 0.05, p2: 0.2 };
        let v = expectation(&bell(), &zz(), noise, 2_000, 3).unwrap();
        // 8 of the 15 two-qubit Paulis anticommute with ZZ.
        let expected = 1.0 - 2.0 * 0.2 * 8.0 / 15.0;
        assert!(v < 1.0);
        assert!((v - expected).abs() < 0.08, "got {v}, expected ≈{expected}");
    }

    #[test]
    fn test_trajectories_are_seeded() {
        let noise = NoiseModel { p1: 0.1, p2: 0.2 };
        let a = expectation(&bell(), &zz(), noise, 50, 11).unwrap();
        let b = expectation(&bell(), &zz(), noise, 50, 11).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_markers_rejected() {
        let mut c = Circuit::with_size("marked", 1);
        c.cut_marker(0, qcut_ir::CutSide::A, QubitId(0)).unwrap();
        let err = expectation(&c, &Observable::identity(), NoiseModel::IDEAL, 1, 0).unwrap_err();
        assert!(matches!(err, OracleError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_oracle_width_limit() {
        let oracle = StatevectorOracle::new().with_max_qubits(1);
        let request = FragmentRequest {
            fragment: 0,
            circuit: bell(),
            observable: zz(),
            noise: NoiseModel::IDEAL,
            noise_scale: 1.0,
            seed: 0,
        };
        let err = oracle.execute(&request).await.unwrap_err();
        assert!(matches!(err, OracleError::TooWide { qubits: 2, max: 1 }));
        assert!(StatevectorReference::with_max_qubits(1)
            .ideal_expectation(&bell(), &zz())
            .is_none());
    }
}
