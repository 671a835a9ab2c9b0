//! Circuit instructions combining gates with operands.

use serde::{Deserialize, Serialize};

use crate::gate::StandardGate;
use crate::qubit::QubitId;

/// Which operand of a cut two-qubit gate a fragment holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CutSide {
    /// First operand (control, for controlled gates).
    A,
    /// Second operand.
    B,
}

/// The kind of instruction in a circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// A unitary gate.
    Gate(StandardGate),
    /// Mid-circuit Z measurement whose ±1 outcome multiplies the result.
    ///
    /// This is the non-unitary member of the cut basis. Executors must treat
    /// it linearly: the value reported for a circuit containing it is
    /// `Tr[O · (P0 ρ P0 − P1 ρ P1)]`.
    SignedMeasure,
    /// Placeholder for one side of a two-qubit gate removed by a cut.
    ///
    /// Fragments carry markers until a decomposition term substitutes a
    /// concrete local operation for them.
    CutMarker {
        /// Index of the cut in its plan.
        cut: usize,
        /// Which operand this fragment holds.
        side: CutSide,
    },
    /// Barrier (synchronization point).
    Barrier,
}

/// A complete instruction with operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The kind of instruction.
    pub kind: InstructionKind,
    /// Qubits this instruction operates on.
    pub qubits: Vec<QubitId>,
}

impl Instruction {
    /// Create a gate instruction.
    pub fn gate(gate: StandardGate, qubits: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            kind: InstructionKind::Gate(gate),
            qubits: qubits.into_iter().collect(),
        }
    }

    /// Create a single-qubit gate instruction.
    pub fn single_qubit_gate(gate: StandardGate, qubit: QubitId) -> Self {
        Self::gate(gate, [qubit])
    }

    /// Create a two-qubit gate instruction.
    pub fn two_qubit_gate(gate: StandardGate, q1: QubitId, q2: QubitId) -> Self {
        Self::gate(gate, [q1, q2])
    }

    /// Create a signed mid-circuit measurement.
    pub fn signed_measure(qubit: QubitId) -> Self {
        Self {
            kind: InstructionKind::SignedMeasure,
            qubits: vec![qubit],
        }
    }

    /// Create a cut marker on one qubit.
    pub fn cut_marker(cut: usize, side: CutSide, qubit: QubitId) -> Self {
        Self {
            kind: InstructionKind::CutMarker { cut, side },
            qubits: vec![qubit],
        }
    }

    /// Create a barrier instruction.
    pub fn barrier(qubits: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            kind: InstructionKind::Barrier,
            qubits: qubits.into_iter().collect(),
        }
    }

    /// Check if this is a gate instruction.
    pub fn is_gate(&self) -> bool {
        matches!(self.kind, InstructionKind::Gate(_))
    }

    /// Check if this is a barrier.
    pub fn is_barrier(&self) -> bool {
        matches!(self.kind, InstructionKind::Barrier)
    }

    /// Check if this is a cut marker.
    pub fn is_cut_marker(&self) -> bool {
        matches!(self.kind, InstructionKind::CutMarker { .. })
    }

    /// Gate carried by this instruction, if any.
    pub fn as_gate(&self) -> Option<&StandardGate> {
        match &self.kind {
            InstructionKind::Gate(g) => Some(g),
            _ => None,
        }
    }

    /// Whether this is a gate acting on exactly two qubits.
    pub fn is_two_qubit_gate(&self) -> bool {
        self.is_gate() && self.qubits.len() == 2
    }

    /// Get the name of this instruction.
    pub fn name(&self) -> &str {
        match &self.kind {
            InstructionKind::Gate(g) => g.name(),
            InstructionKind::SignedMeasure => "signed_measure",
            InstructionKind::CutMarker { .. } => "cut",
            InstructionKind::Barrier => "barrier",
        }
    }

    /// Get the number of qubits this instruction operates on.
    pub fn num_qubits(&self) -> usize {
        self.qubits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_instruction() {
        let inst = Instruction::two_qubit_gate(StandardGate::CX, QubitId(0), QubitId(1));
        assert!(inst.is_gate());
        assert!(inst.is_two_qubit_gate());
        assert_eq!(inst.name(), "cx");
        assert_eq!(inst.num_qubits(), 2);
    }

    #[test]
    fn test_marker_instruction() {
        let inst = Instruction::cut_marker(2, CutSide::B, QubitId(5));
        assert!(inst.is_cut_marker());
        assert!(!inst.is_gate());
        assert_eq!(inst.name(), "cut");
        assert!(Instruction::barrier([QubitId(0), QubitId(1)]).is_barrier());
    }
}
