//! Error types for the compile crate.

use qcut_core::CutError;
use thiserror::Error;

/// Errors that can occur while building or routing a circuit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Error from the IR crate.
    #[error("IR error: {0}")]
    Ir(#[from] qcut_ir::IrError),

    /// No path joins two physical qubits.
    #[error("Routing failed: qubits {qubit1} and {qubit2} not connected")]
    RoutingFailed { qubit1: u32, qubit2: u32 },

    /// Circuit too large for target.
    #[error("Circuit requires {required} qubits but target only has {available}")]
    CircuitTooLarge { required: u32, available: u32 },

    /// Kernel parameters out of range.
    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),
}

/// Result type for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

impl From<CompileError> for CutError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::RoutingFailed { .. } | CompileError::CircuitTooLarge { .. } => {
                CutError::InfeasibleCut(e.to_string())
            }
            CompileError::InvalidKernel(_) => CutError::ConfigValidation(e.to_string()),
            CompileError::Ir(_) => CutError::MalformedCircuit(e.to_string()),
        }
    }
}
