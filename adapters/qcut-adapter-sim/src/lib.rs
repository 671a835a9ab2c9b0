//! Statevector oracles for qcut.
//!
//! This crate executes fragment circuits on a local statevector simulator
//! and serves as both the [`ExecutionOracle`](qcut_core::ExecutionOracle)
//! and the [`ReferenceOracle`](qcut_core::ReferenceOracle) of a grid run.
//!
//! # Features
//!
//! - **Exact signed measurements**: both outcomes of a signed Z measurement
//!   are carried as weighted branches, so quasiprobability terms are
//!   evaluated without shot noise
//! - **Depolarizing noise**: per-gate Pauli trajectories seeded from the
//!   request, reproducible for a fixed seed
//! - **All standard gates**: dedicated kernels for common gates, the gate
//!   matrix for the rest
//!
//! # Performance
//!
//! | Qubits | Memory | Simulation Speed |
//! |--------|--------|------------------|
//! | 6 | ~1 KB | Instant |
//! | 12 | ~64 KB | Fast |
//! | 20 | ~16 MB | Moderate |
//!
//! Each signed measurement can double the number of live branches, and a
//! noisy call repeats the circuit once per trajectory.
//!
//! # Example
//!
//! ```
//! use qcut_adapter_sim::StatevectorReference;
//! use qcut_core::{Observable, ReferenceOracle};
//! use qcut_ir::{Circuit, QubitId};
//!
//! let mut bell = Circuit::with_size("bell", 2);
//! bell.h(QubitId(0)).unwrap();
//! bell.cx(QubitId(0), QubitId(1)).unwrap();
//!
//! let zz = Observable::z_product([QubitId(0), QubitId(1)]);
//! let value = StatevectorReference::new().ideal_expectation(&bell, &zz).unwrap();
//! assert!((value - 1.0).abs() < 1e-12);
//! ```

mod simulator;
pub mod statevector;

pub use simulator::{
    DEFAULT_MAX_QUBITS, DEFAULT_TRAJECTORIES, StatevectorOracle, StatevectorReference, expectation,
};
pub use statevector::{Pauli, Statevector};
