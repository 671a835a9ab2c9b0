//! qcut circuit model
//!
//! This crate provides the leaf data structures of the qcut workspace: the
//! compiled [`Circuit`] handed to the cutting layer, the device
//! [`CouplingMap`] it must respect, and the [`NoiseModel`] parameters passed
//! through to execution oracles.
//!
//! # Core Components
//!
//! - **Qubits**: [`QubitId`] addresses a wire of the register
//! - **Gates**: [`StandardGate`] with concrete real parameters and unitary
//!   matrices for one- and two-qubit gates
//! - **Instructions**: [`Instruction`] combining an [`InstructionKind`] with
//!   its operands; besides gates this includes the signed mid-circuit
//!   measurement and cut markers used by the cut basis
//! - **Circuit**: [`Circuit`] builder API with depth, size and connectivity
//!   queries
//! - **Connectivity**: [`CouplingMap`] and the named [`Topology`] shapes
//!
//! # Example: Building a Bell State
//!
//! ```rust
//! use qcut_ir::{Circuit, CouplingMap, QubitId};
//!
//! let mut circuit = Circuit::with_size("bell_state", 2);
//! circuit.h(QubitId(0)).unwrap();
//! circuit.cx(QubitId(0), QubitId(1)).unwrap();
//!
//! assert_eq!(circuit.depth(), 2);
//! assert_eq!(circuit.num_two_qubit_gates(), 1);
//! assert!(circuit.satisfies_connectivity(&CouplingMap::linear(2)));
//! ```

pub mod circuit;
pub mod coupling;
pub mod error;
pub mod gate;
pub mod instruction;
pub mod noise;
pub mod qubit;

pub use circuit::Circuit;
pub use coupling::{CouplingMap, Topology};
pub use error::{IrError, IrResult};
pub use gate::StandardGate;
pub use instruction::{CutSide, Instruction, InstructionKind};
pub use noise::{NoiseClass, NoiseModel};
pub use qubit::QubitId;
