//! qcut circuit producers
//!
//! Builds the logical benchmark kernels and routes circuits onto device
//! coupling maps. Both are exposed through the producer traits of
//! `qcut-core`: [`StandardKernels`] implements
//! [`KernelSource`](qcut_core::KernelSource) and [`SwapRouter`] implements
//! [`CircuitCompiler`](qcut_core::CircuitCompiler).
//!
//! # Example: Routing a GHZ chain
//!
//! ```rust
//! use qcut_compile::{SwapRouter, kernels};
//! use qcut_ir::Topology;
//!
//! let circuit = kernels::ghz(10).unwrap();
//! let device = Topology::Sparse.coupling_map(10).unwrap();
//! let routed = SwapRouter.best_of_k(&circuit, &device, 5, 11).unwrap();
//!
//! assert!(routed.circuit.satisfies_connectivity(&device));
//! ```

pub mod error;
pub mod kernels;
pub mod routing;

pub use error::{CompileError, CompileResult};
pub use kernels::StandardKernels;
pub use routing::{Layout, SwapRouter};
