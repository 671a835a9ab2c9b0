//! Statevector simulation engine.
//!
//! Amplitudes are indexed little-endian: qubit `q` is bit `q` of the index.
//! States are allowed to be unnormalized so that the two halves of a signed
//! measurement can be carried as separate branches.

use num_complex::Complex64;
use std::f64::consts::PI;

use qcut_core::Observable;
use qcut_ir::StandardGate;

/// Pauli operators used for noise insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pauli {
    I,
    X,
    Y,
    Z,
}

impl Pauli {
    /// All four, identity first.
    pub const ALL: [Pauli; 4] = [Pauli::I, Pauli::X, Pauli::Y, Pauli::Z];
}

/// A possibly unnormalized pure state.
#[derive(Debug, Clone, PartialEq)]
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    /// Number of qubits.
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let size = 1 << num_qubits;
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); size];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Self {
            amplitudes,
            num_qubits,
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Squared norm.
    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes.iter().map(Complex64::norm_sqr).sum()
    }

    /// `⟨ψ|O|ψ⟩` for a Z product, without normalizing.
    pub fn expectation(&self, observable: &Observable) -> f64 {
        self.amplitudes
            .iter()
            .enumerate()
            .map(|(i, a)| a.norm_sqr() * observable.sign_of(i))
            .sum()
    }

    /// Split into the `|0⟩` and `|1⟩` components of `qubit`.
    pub fn split(mut self, qubit: usize) -> (Self, Self) {
        let mask = 1 << qubit;
        let mut one = self.clone();
        for (i, (a0, a1)) in self
            .amplitudes
            .iter_mut()
            .zip(one.amplitudes.iter_mut())
            .enumerate()
        {
            if i & mask == 0 {
                *a1 = Complex64::new(0.0, 0.0);
            } else {
                *a0 = Complex64::new(0.0, 0.0);
            }
        }
        (self, one)
    }

    /// Apply a Pauli to one qubit.
    pub fn apply_pauli(&mut self, pauli: Pauli, qubit: usize) {
        match pauli {
            Pauli::I => {}
            Pauli::X => self.apply_x(qubit),
            Pauli::Y => self.apply_y(qubit),
            Pauli::Z => self.apply_z(qubit),
        }
    }

    /// Apply a standard gate to the given qubits.
    ///
    /// Common gates use dedicated kernels; the rest go through their
    /// unitary matrix.
    pub fn apply_gate(&mut self, gate: &StandardGate, qubits: &[usize]) {
        match gate {
            StandardGate::I => {}
            StandardGate::X => self.apply_x(qubits[0]),
            StandardGate::Y => self.apply_y(qubits[0]),
            StandardGate::Z => self.apply_z(qubits[0]),
            StandardGate::H => self.apply_h(qubits[0]),
            StandardGate::S => self.apply_phase(qubits[0], PI / 2.0),
            StandardGate::Sdg => self.apply_phase(qubits[0], -PI / 2.0),
            StandardGate::T => self.apply_phase(qubits[0], PI / 4.0),
            StandardGate::Tdg => self.apply_phase(qubits[0], -PI / 4.0),
            StandardGate::P(t) => self.apply_phase(qubits[0], *t),
            StandardGate::Rz(t) => self.apply_rz(qubits[0], *t),
            StandardGate::CX => self.apply_cx(qubits[0], qubits[1]),
            StandardGate::CZ => self.apply_cz(qubits[0], qubits[1]),
            StandardGate::CP(t) => self.apply_cp(qubits[0], qubits[1], *t),
            StandardGate::RZZ(t) => self.apply_rzz(qubits[0], qubits[1], *t),
            StandardGate::Swap => self.apply_swap(qubits[0], qubits[1]),
            StandardGate::CCX => self.apply_ccx(qubits[0], qubits[1], qubits[2]),
            other => match (other.matrix(), qubits) {
                (Some(m), [q]) => self.apply_matrix_1q(&m, *q),
                (Some(m), [a, b]) => self.apply_matrix_2q(&m, *a, *b),
                _ => {}
            },
        }
    }

    // =========================================================================
    // Single-qubit kernels
    // =========================================================================

    fn apply_x(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    fn apply_y(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        let i_val = Complex64::new(0.0, 1.0);
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let tmp = self.amplitudes[i];
                self.amplitudes[i] = -i_val * self.amplitudes[j];
                self.amplitudes[j] = i_val * tmp;
            }
        }
    }

    fn apply_z(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            if i & mask != 0 {
                *a = -*a;
            }
        }
    }

    fn apply_h(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        let sqrt2_inv = std::f64::consts::FRAC_1_SQRT_2;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = sqrt2_inv * (a + b);
                self.amplitudes[j] = sqrt2_inv * (a - b);
            }
        }
    }

    fn apply_phase(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let phase = Complex64::from_polar(1.0, theta);
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            if i & mask != 0 {
                *a *= phase;
            }
        }
    }

    fn apply_rz(&mut self, qubit: usize, theta: f64) {
        let mask = 1 << qubit;
        let phase_0 = Complex64::from_polar(1.0, -theta / 2.0);
        let phase_1 = Complex64::from_polar(1.0, theta / 2.0);
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            *a *= if i & mask == 0 { phase_0 } else { phase_1 };
        }
    }

    fn apply_matrix_1q(&mut self, m: &[Complex64], qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0] * a + m[1] * b;
                self.amplitudes[j] = m[2] * a + m[3] * b;
            }
        }
    }

    // =========================================================================
    // Multi-qubit kernels
    // =========================================================================

    fn apply_cx(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                self.amplitudes.swap(i, i | tgt_mask);
            }
        }
    }

    fn apply_cz(&mut self, control: usize, target: usize) {
        let both = (1 << control) | (1 << target);
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            if i & both == both {
                *a = -*a;
            }
        }
    }

    fn apply_cp(&mut self, control: usize, target: usize, theta: f64) {
        let both = (1 << control) | (1 << target);
        let phase = Complex64::from_polar(1.0, theta);
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            if i & both == both {
                *a *= phase;
            }
        }
    }

    fn apply_rzz(&mut self, q1: usize, q2: usize, theta: f64) {
        let (m1, m2) = (1 << q1, 1 << q2);
        let same = Complex64::from_polar(1.0, -theta / 2.0);
        let differ = Complex64::from_polar(1.0, theta / 2.0);
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            let parity = ((i & m1) != 0) ^ ((i & m2) != 0);
            *a *= if parity { differ } else { same };
        }
    }

    fn apply_swap(&mut self, q1: usize, q2: usize) {
        let mask1 = 1 << q1;
        let mask2 = 1 << q2;
        for i in 0..self.amplitudes.len() {
            if (i & mask1 != 0) && (i & mask2 == 0) {
                let j = (i & !mask1) | mask2;
                self.amplitudes.swap(i, j);
            }
        }
    }

    /// Generic two-qubit unitary; `q0` is the most significant bit of the
    /// matrix row index.
    fn apply_matrix_2q(&mut self, m: &[Complex64], q0: usize, q1: usize) {
        let (m0, m1) = (1 << q0, 1 << q1);
        for base in 0..self.amplitudes.len() {
            if base & (m0 | m1) != 0 {
                continue;
            }
            let idx = [base, base | m1, base | m0, base | m0 | m1];
            let v = idx.map(|i| self.amplitudes[i]);
            for (r, &i) in idx.iter().enumerate() {
                self.amplitudes[i] = (0..4).map(|c| m[r * 4 + c] * v[c]).sum();
            }
        }
    }

    fn apply_ccx(&mut self, c1: usize, c2: usize, target: usize) {
        let c1_mask = 1 << c1;
        let c2_mask = 1 << c2;
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if (i & c1_mask != 0) && (i & c2_mask != 0) && (i & tgt_mask == 0) {
                self.amplitudes.swap(i, i | tgt_mask);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_ir::QubitId;

    fn approx_eq(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-10
    }

    #[test]
    fn test_bell_state() {
        let mut sv = Statevector::new(2);
        sv.apply_gate(&StandardGate::H, &[0]);
        sv.apply_gate(&StandardGate::CX, &[0, 1]);

        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!(approx_eq(sv.amplitudes[0], Complex64::new(h, 0.0)));
        assert!(approx_eq(sv.amplitudes[3], Complex64::new(h, 0.0)));
        let zz = Observable::z_product([QubitId(0), QubitId(1)]);
        assert!((sv.expectation(&zz) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_generic_path_matches_dedicated_kernels() {
        let gates = [
            (StandardGate::CX, [0usize, 2]),
            (StandardGate::CZ, [1, 0]),
            (StandardGate::CP(0.7), [2, 1]),
            (StandardGate::RZZ(1.3), [0, 1]),
            (StandardGate::Swap, [2, 0]),
        ];
        for (gate, qs) in gates {
            let mut prep = Statevector::new(3);
            for q in 0..3 {
                prep.apply_gate(&StandardGate::H, &[q]);
                prep.apply_gate(&StandardGate::Rz(0.3 * (q + 1) as f64), &[q]);
            }
            let mut fast = prep.clone();
            fast.apply_gate(&gate, &qs);
            let mut slow = prep;
            slow.apply_matrix_2q(&gate.matrix().unwrap(), qs[0], qs[1]);
            for (a, b) in fast.amplitudes.iter().zip(&slow.amplitudes) {
                assert!(approx_eq(*a, *b), "{}", gate.name());
            }
        }
    }

    #[test]
    fn test_split_preserves_norm() {
        let mut sv = Statevector::new(2);
        sv.apply_gate(&StandardGate::Ry(1.1), &[0]);
        sv.apply_gate(&StandardGate::CX, &[0, 1]);
        let (zero, one) = sv.clone().split(0);
        assert!((zero.norm_sqr() + one.norm_sqr() - 1.0).abs() < 1e-12);
        let z0 = Observable::z_product([QubitId(0)]);
        let signed = zero.norm_sqr() - one.norm_sqr();
        assert!((signed - sv.expectation(&z0)).abs() < 1e-12);
    }

    #[test]
    fn test_sx_squares_to_x() {
        let mut sv = Statevector::new(1);
        sv.apply_gate(&StandardGate::SX, &[0]);
        sv.apply_gate(&StandardGate::SX, &[0]);
        assert!(sv.amplitudes[1].norm_sqr() > 1.0 - 1e-12);
    }
}
