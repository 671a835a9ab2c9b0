//! Producers of logical and routed circuits.
//!
//! Kernel construction and qubit routing live outside this crate; pipelines
//! consume them through [`KernelSource`] and [`CircuitCompiler`].

use std::fmt;
use std::str::FromStr;

use qcut_ir::{Circuit, CouplingMap};
use serde::{Deserialize, Serialize};

use crate::error::{CutError, CutResult};

/// Algorithmic kernels of the experiment grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    /// Quantum Fourier transform, no final swaps.
    Qft,
    /// Hardware-efficient ansatz with brickwork entanglers.
    Hea,
    /// GHZ preparation chain.
    Ghz,
    /// Grover search with Toffoli-ladder oracles.
    Grover,
}

impl Kernel {
    /// Register width used by the grid.
    pub fn default_qubits(&self) -> u32 {
        match self {
            Kernel::Qft => 12,
            Kernel::Hea | Kernel::Ghz | Kernel::Grover => 10,
        }
    }

    /// Whether every multi-qubit gate of the kernel has a cut rule.
    ///
    /// Grover's Toffolis straddle any balanced bipartition, so it only runs
    /// through the routing pipelines.
    pub fn is_cuttable(&self) -> bool {
        !matches!(self, Kernel::Grover)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kernel::Qft => "qft",
            Kernel::Hea => "hea",
            Kernel::Ghz => "ghz",
            Kernel::Grover => "grover",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kernel {
    type Err = CutError;

    fn from_str(s: &str) -> CutResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qft" | "qft12" => Ok(Kernel::Qft),
            "hea" | "hea10" => Ok(Kernel::Hea),
            "ghz" | "ghz10" => Ok(Kernel::Ghz),
            "grover" | "grover10" => Ok(Kernel::Grover),
            other => Err(CutError::ConfigValidation(format!("unknown kernel '{other}'"))),
        }
    }
}

/// Builds the logical circuit of a kernel.
pub trait KernelSource: Send + Sync {
    /// Logical circuit of `kernel` on `num_qubits` qubits.
    fn build(&self, kernel: Kernel, num_qubits: u32) -> CutResult<Circuit>;
}

/// A routed circuit and the layout it ended in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCircuit {
    /// Physical circuit; every two-qubit gate respects the coupling map.
    pub circuit: Circuit,
    /// Final logical → physical qubit map.
    pub layout: Vec<u32>,
}

impl CompiledCircuit {
    /// Identity-layout wrapper for circuits that need no routing.
    pub fn unrouted(circuit: Circuit) -> Self {
        let layout = (0..circuit.num_qubits()).collect();
        Self { circuit, layout }
    }
}

/// Maps a logical circuit onto a device.
pub trait CircuitCompiler: Send + Sync {
    /// Route `circuit` onto `coupling`, keeping the best of `best_of_k`
    /// candidates seeded from `seed`.
    fn compile(
        &self,
        circuit: &Circuit,
        coupling: &CouplingMap,
        best_of_k: usize,
        seed: u64,
    ) -> CutResult<CompiledCircuit>;
}
