//! Error types for the IR crate.

use crate::qubit::QubitId;
use thiserror::Error;

/// Errors raised while building or inspecting a circuit.
///
/// Every variant describes a malformed circuit; the cutting layer surfaces
/// them as `MalformedCircuit`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// An instruction references a qubit outside the register.
    #[error("Qubit {qubit} out of range for {num_qubits}-qubit circuit{}", format_gate_context(.gate_name))]
    QubitOutOfRange {
        /// The offending qubit.
        qubit: QubitId,
        /// Size of the register.
        num_qubits: u32,
        /// Optional gate name for context.
        gate_name: Option<String>,
    },

    /// Gate requires a different number of qubits.
    #[error("Gate '{gate_name}' requires {expected} qubits, got {got}")]
    QubitCountMismatch {
        /// Name of the gate.
        gate_name: String,
        /// Expected number of qubits.
        expected: u32,
        /// Actual number of qubits provided.
        got: u32,
    },

    /// Duplicate qubit in operation.
    #[error("Duplicate qubit {qubit} in operation{}", format_gate_context(.gate_name))]
    DuplicateQubit {
        /// The duplicate qubit.
        qubit: QubitId,
        /// Optional gate name for context.
        gate_name: Option<String>,
    },

    /// Unknown topology name or unsupported topology size.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),
}

/// Helper function to format optional gate context.
#[allow(clippy::ref_option)]
fn format_gate_context(gate_name: &Option<String>) -> String {
    match gate_name {
        Some(name) => format!(" (gate: {name})"),
        None => String::new(),
    }
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
