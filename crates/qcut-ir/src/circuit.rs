//! High-level circuit builder API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coupling::CouplingMap;
use crate::error::{IrError, IrResult};
use crate::gate::StandardGate;
use crate::instruction::{CutSide, Instruction, InstructionKind};
use crate::qubit::QubitId;

/// A quantum circuit: an ordered instruction list over a fixed register.
///
/// Builder methods validate operands as they append. Once a circuit has been
/// handed to the cutting layer it is shared behind an `Arc` and only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    /// Name of the circuit.
    name: String,
    /// Size of the qubit register.
    num_qubits: u32,
    /// Instructions in program order.
    instructions: Vec<Instruction>,
}

impl Circuit {
    /// Create a circuit with a given number of qubits.
    pub fn with_size(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            instructions: vec![],
        }
    }

    /// Append an instruction after checking its operands.
    pub fn push(&mut self, instruction: Instruction) -> IrResult<&mut Self> {
        self.validate(&instruction)?;
        self.instructions.push(instruction);
        Ok(self)
    }

    fn validate(&self, instruction: &Instruction) -> IrResult<()> {
        let gate_name = || Some(instruction.name().to_string());

        if let InstructionKind::Gate(g) = &instruction.kind {
            let got = instruction.qubits.len() as u32;
            if g.num_qubits() != got {
                return Err(IrError::QubitCountMismatch {
                    gate_name: g.name().to_string(),
                    expected: g.num_qubits(),
                    got,
                });
            }
        }

        for (i, q) in instruction.qubits.iter().enumerate() {
            if q.0 >= self.num_qubits {
                return Err(IrError::QubitOutOfRange {
                    qubit: *q,
                    num_qubits: self.num_qubits,
                    gate_name: gate_name(),
                });
            }
            if instruction.qubits[..i].contains(q) {
                return Err(IrError::DuplicateQubit {
                    qubit: *q,
                    gate_name: gate_name(),
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Single-qubit gates
    // =========================================================================

    /// Apply Hadamard gate.
    pub fn h(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::H, qubit))
    }

    /// Apply Pauli-X gate.
    pub fn x(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::X, qubit))
    }

    /// Apply Pauli-Y gate.
    pub fn y(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::Y, qubit))
    }

    /// Apply Pauli-Z gate.
    pub fn z(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::Z, qubit))
    }

    /// Apply S gate.
    pub fn s(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::S, qubit))
    }

    /// Apply S-dagger gate.
    pub fn sdg(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::Sdg, qubit))
    }

    /// Apply T gate.
    pub fn t(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::T, qubit))
    }

    /// Apply sqrt(X) gate.
    pub fn sx(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::SX, qubit))
    }

    /// Apply Rx rotation gate.
    pub fn rx(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::Rx(theta), qubit))
    }

    /// Apply Ry rotation gate.
    pub fn ry(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::Ry(theta), qubit))
    }

    /// Apply Rz rotation gate.
    pub fn rz(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::Rz(theta), qubit))
    }

    /// Apply phase gate.
    pub fn p(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(StandardGate::P(theta), qubit))
    }

    /// Apply universal U gate.
    pub fn u(&mut self, theta: f64, phi: f64, lambda: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(
            StandardGate::U(theta, phi, lambda),
            qubit,
        ))
    }

    // =========================================================================
    // Two-qubit gates
    // =========================================================================

    /// Apply CNOT (CX) gate.
    pub fn cx(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::CX, control, target))
    }

    /// Apply CY gate.
    pub fn cy(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::CY, control, target))
    }

    /// Apply CZ gate.
    pub fn cz(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::CZ, control, target))
    }

    /// Apply controlled-Hadamard gate.
    pub fn ch(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::CH, control, target))
    }

    /// Apply SWAP gate.
    pub fn swap(&mut self, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::Swap, q1, q2))
    }

    /// Apply controlled-Rz gate.
    pub fn crz(&mut self, theta: f64, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(
            StandardGate::CRz(theta),
            control,
            target,
        ))
    }

    /// Apply controlled-phase gate.
    pub fn cp(&mut self, theta: f64, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(
            StandardGate::CP(theta),
            control,
            target,
        ))
    }

    /// Apply RXX (XX rotation) gate.
    pub fn rxx(&mut self, theta: f64, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::RXX(theta), q1, q2))
    }

    /// Apply RYY (YY rotation) gate.
    pub fn ryy(&mut self, theta: f64, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::RYY(theta), q1, q2))
    }

    /// Apply RZZ (ZZ rotation) gate.
    pub fn rzz(&mut self, theta: f64, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(StandardGate::RZZ(theta), q1, q2))
    }

    /// Apply Toffoli (CCX) gate.
    pub fn ccx(&mut self, c1: QubitId, c2: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::gate(StandardGate::CCX, [c1, c2, target]))
    }

    // =========================================================================
    // Other operations
    // =========================================================================

    /// Apply any standard gate.
    pub fn gate(
        &mut self,
        gate: StandardGate,
        qubits: impl IntoIterator<Item = QubitId>,
    ) -> IrResult<&mut Self> {
        self.push(Instruction::gate(gate, qubits))
    }

    /// Apply a signed mid-circuit Z measurement.
    pub fn signed_measure(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::signed_measure(qubit))
    }

    /// Insert a cut marker.
    pub fn cut_marker(&mut self, cut: usize, side: CutSide, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::cut_marker(cut, side, qubit))
    }

    /// Apply a barrier to all qubits.
    pub fn barrier_all(&mut self) -> IrResult<&mut Self> {
        let qubits: Vec<_> = (0..self.num_qubits).map(QubitId).collect();
        self.push(Instruction::barrier(qubits))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Instructions in program order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Whether the circuit has no instructions besides barriers.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of operations, barriers excluded.
    pub fn size(&self) -> usize {
        self.instructions.iter().filter(|i| !i.is_barrier()).count()
    }

    /// Number of two-qubit gates.
    pub fn num_two_qubit_gates(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| i.is_two_qubit_gate())
            .count()
    }

    /// Operation histogram keyed by instruction name, barriers excluded.
    pub fn count_ops(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for inst in self.instructions.iter().filter(|i| !i.is_barrier()) {
            *counts.entry(inst.name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Get the circuit depth (longest chain of operations on any qubit).
    ///
    /// Barriers synchronize their qubits without adding a layer.
    pub fn depth(&self) -> usize {
        let mut frontier = vec![0usize; self.num_qubits as usize];
        for inst in &self.instructions {
            let level = inst
                .qubits
                .iter()
                .map(|q| frontier[q.index()])
                .max()
                .unwrap_or(0);
            let next = if inst.is_barrier() { level } else { level + 1 };
            for q in &inst.qubits {
                frontier[q.index()] = next;
            }
        }
        frontier.into_iter().max().unwrap_or(0)
    }

    /// Whether every multi-qubit gate acts on pairwise coupled qubits.
    ///
    /// A circuit wider than the coupling map never satisfies it.
    pub fn satisfies_connectivity(&self, coupling: &CouplingMap) -> bool {
        if self.num_qubits > coupling.num_qubits() {
            return false;
        }
        self.instructions
            .iter()
            .filter(|i| i.is_gate() && i.qubits.len() >= 2)
            .all(|i| {
                i.qubits.iter().enumerate().all(|(k, a)| {
                    i.qubits[k + 1..]
                        .iter()
                        .all(|b| coupling.is_connected(a.0, b.0))
                })
            })
    }
}
