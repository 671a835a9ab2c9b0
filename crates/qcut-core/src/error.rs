//! Error types for cutting, calibration and reconstruction.

use qcut_ir::IrError;
use thiserror::Error;

use crate::decompose::TermAssignment;
use crate::oracle::OracleError;

/// Result type for cutting-layer operations.
pub type CutResult<T> = Result<T, CutError>;

/// Errors raised by the cutting layer.
///
/// `MalformedCircuit`, `InfeasibleCut` and `ExecutionFailure` are fatal for
/// one configuration only; the grid records them and moves on.
/// `ConfigValidation` is raised before any run starts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CutError {
    /// The input circuit cannot be cut as requested.
    #[error("Malformed circuit: {0}")]
    MalformedCircuit(String),

    /// No cut plan satisfies the fragment constraints.
    #[error("Infeasible cut: {0}")]
    InfeasibleCut(String),

    /// A configuration option is missing, unknown or out of range.
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// A draw failed twice; the estimate for this configuration is void.
    #[error("Execution failed on draw {draw_index} with assignment {assignment}: {source}")]
    ExecutionFailure {
        /// Index of the failing draw.
        draw_index: u64,
        /// Basis term chosen for every cut on that draw.
        assignment: TermAssignment,
        /// Error from the second attempt.
        #[source]
        source: OracleError,
    },

    /// The main grid needs a sampling plan that was never calibrated.
    #[error("No committed sampling plan for tag {0}; run `calibrate` first")]
    CalibrationMissing(String),

    /// The configuration was cancelled or ran out of time.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Oracle failure outside the per-draw retry path.
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Reading or writing result files failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl CutError {
    /// Short machine-readable name used in result records.
    pub fn kind(&self) -> &'static str {
        match self {
            CutError::MalformedCircuit(_) => "malformed_circuit",
            CutError::InfeasibleCut(_) => "infeasible_cut",
            CutError::ConfigValidation(_) => "config_validation",
            CutError::ExecutionFailure { .. } => "execution_failure",
            CutError::CalibrationMissing(_) => "calibration_missing",
            CutError::Cancelled(_) => "cancelled",
            CutError::Oracle(_) => "oracle",
            CutError::Io(_) => "io",
        }
    }

    /// Whether this failure should make the command exit non-zero.
    pub fn is_fatal_for_exit(&self) -> bool {
        matches!(
            self,
            CutError::ExecutionFailure { .. } | CutError::InfeasibleCut(_)
        )
    }
}

impl From<IrError> for CutError {
    fn from(e: IrError) -> Self {
        CutError::MalformedCircuit(e.to_string())
    }
}

impl From<std::io::Error> for CutError {
    fn from(e: std::io::Error) -> Self {
        CutError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CutError {
    fn from(e: serde_json::Error) -> Self {
        CutError::Io(e.to_string())
    }
}

impl From<serde_yaml_ng::Error> for CutError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        CutError::ConfigValidation(e.to_string())
    }
}
