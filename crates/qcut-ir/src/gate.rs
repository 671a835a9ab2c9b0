//! Quantum gate types.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

/// Standard gates with known semantics.
///
/// Rotation angles are concrete `f64` values: circuits reaching the cutting
/// layer are already compiled and bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StandardGate {
    // Single-qubit Pauli gates
    /// Identity gate.
    I,
    /// Pauli-X gate.
    X,
    /// Pauli-Y gate.
    Y,
    /// Pauli-Z gate.
    Z,

    // Single-qubit Clifford gates
    /// Hadamard gate.
    H,
    /// S gate (sqrt(Z)).
    S,
    /// S-dagger gate.
    Sdg,
    /// T gate (fourth root of Z).
    T,
    /// T-dagger gate.
    Tdg,
    /// sqrt(X) gate.
    SX,
    /// sqrt(X)-dagger gate.
    SXdg,

    // Single-qubit rotation gates
    /// Rotation around X axis.
    Rx(f64),
    /// Rotation around Y axis.
    Ry(f64),
    /// Rotation around Z axis.
    Rz(f64),
    /// Phase gate.
    P(f64),
    /// Universal single-qubit gate U(θ, φ, λ).
    U(f64, f64, f64),

    // Two-qubit gates
    /// Controlled-X (CNOT) gate.
    CX,
    /// Controlled-Y gate.
    CY,
    /// Controlled-Z gate.
    CZ,
    /// Controlled-Hadamard gate.
    CH,
    /// SWAP gate.
    Swap,
    /// Controlled rotation around Z.
    CRz(f64),
    /// Controlled phase gate.
    CP(f64),
    /// XX rotation gate.
    RXX(f64),
    /// YY rotation gate.
    RYY(f64),
    /// ZZ rotation gate.
    RZZ(f64),

    // Three-qubit gates
    /// Toffoli gate (CCX).
    CCX,
}

impl StandardGate {
    /// Get the name of this gate.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            StandardGate::I => "id",
            StandardGate::X => "x",
            StandardGate::Y => "y",
            StandardGate::Z => "z",
            StandardGate::H => "h",
            StandardGate::S => "s",
            StandardGate::Sdg => "sdg",
            StandardGate::T => "t",
            StandardGate::Tdg => "tdg",
            StandardGate::SX => "sx",
            StandardGate::SXdg => "sxdg",
            StandardGate::Rx(_) => "rx",
            StandardGate::Ry(_) => "ry",
            StandardGate::Rz(_) => "rz",
            StandardGate::P(_) => "p",
            StandardGate::U(_, _, _) => "u",
            StandardGate::CX => "cx",
            StandardGate::CY => "cy",
            StandardGate::CZ => "cz",
            StandardGate::CH => "ch",
            StandardGate::Swap => "swap",
            StandardGate::CRz(_) => "crz",
            StandardGate::CP(_) => "cp",
            StandardGate::RXX(_) => "rxx",
            StandardGate::RYY(_) => "ryy",
            StandardGate::RZZ(_) => "rzz",
            StandardGate::CCX => "ccx",
        }
    }

    /// Get the number of qubits this gate operates on.
    #[inline]
    pub fn num_qubits(&self) -> u32 {
        match self {
            StandardGate::I
            | StandardGate::X
            | StandardGate::Y
            | StandardGate::Z
            | StandardGate::H
            | StandardGate::S
            | StandardGate::Sdg
            | StandardGate::T
            | StandardGate::Tdg
            | StandardGate::SX
            | StandardGate::SXdg
            | StandardGate::Rx(_)
            | StandardGate::Ry(_)
            | StandardGate::Rz(_)
            | StandardGate::P(_)
            | StandardGate::U(_, _, _) => 1,

            StandardGate::CX
            | StandardGate::CY
            | StandardGate::CZ
            | StandardGate::CH
            | StandardGate::Swap
            | StandardGate::CRz(_)
            | StandardGate::CP(_)
            | StandardGate::RXX(_)
            | StandardGate::RYY(_)
            | StandardGate::RZZ(_) => 2,

            StandardGate::CCX => 3,
        }
    }

    /// Get parameters of this gate.
    pub fn parameters(&self) -> Vec<f64> {
        match self {
            StandardGate::Rx(p)
            | StandardGate::Ry(p)
            | StandardGate::Rz(p)
            | StandardGate::P(p)
            | StandardGate::CRz(p)
            | StandardGate::CP(p)
            | StandardGate::RXX(p)
            | StandardGate::RYY(p)
            | StandardGate::RZZ(p) => vec![*p],

            StandardGate::U(a, b, c) => vec![*a, *b, *c],

            _ => vec![],
        }
    }

    /// Unitary matrix of a one- or two-qubit gate, row-major.
    ///
    /// For two-qubit gates the first operand is the most significant bit of
    /// the row index (`|q0 q1⟩`). Returns `None` for three-qubit gates.
    pub fn matrix(&self) -> Option<Vec<Complex64>> {
        let r = |x: f64| Complex64::new(x, 0.0);
        let c = Complex64::new;
        let zero = r(0.0);
        let one = r(1.0);
        let i = c(0.0, 1.0);

        let m = match self {
            StandardGate::I => vec![one, zero, zero, one],
            StandardGate::X => vec![zero, one, one, zero],
            StandardGate::Y => vec![zero, -i, i, zero],
            StandardGate::Z => vec![one, zero, zero, -one],
            StandardGate::H => {
                let h = r(FRAC_1_SQRT_2);
                vec![h, h, h, -h]
            }
            StandardGate::S => vec![one, zero, zero, i],
            StandardGate::Sdg => vec![one, zero, zero, -i],
            StandardGate::T => vec![one, zero, zero, Complex64::from_polar(1.0, PI_4)],
            StandardGate::Tdg => vec![one, zero, zero, Complex64::from_polar(1.0, -PI_4)],
            StandardGate::SX => vec![c(0.5, 0.5), c(0.5, -0.5), c(0.5, -0.5), c(0.5, 0.5)],
            StandardGate::SXdg => vec![c(0.5, -0.5), c(0.5, 0.5), c(0.5, 0.5), c(0.5, -0.5)],
            StandardGate::Rx(t) => {
                let (co, si) = ((t / 2.0).cos(), (t / 2.0).sin());
                vec![r(co), c(0.0, -si), c(0.0, -si), r(co)]
            }
            StandardGate::Ry(t) => {
                let (co, si) = ((t / 2.0).cos(), (t / 2.0).sin());
                vec![r(co), r(-si), r(si), r(co)]
            }
            StandardGate::Rz(t) => vec![
                Complex64::from_polar(1.0, -t / 2.0),
                zero,
                zero,
                Complex64::from_polar(1.0, t / 2.0),
            ],
            StandardGate::P(t) => vec![one, zero, zero, Complex64::from_polar(1.0, *t)],
            StandardGate::U(theta, phi, lambda) => {
                let (co, si) = ((theta / 2.0).cos(), (theta / 2.0).sin());
                vec![
                    r(co),
                    -Complex64::from_polar(si, *lambda),
                    Complex64::from_polar(si, *phi),
                    Complex64::from_polar(co, phi + lambda),
                ]
            }

            StandardGate::CX => controlled(&[zero, one, one, zero]),
            StandardGate::CY => controlled(&[zero, -i, i, zero]),
            StandardGate::CZ => diagonal(&[one, one, one, -one]),
            StandardGate::CH => {
                let h = r(FRAC_1_SQRT_2);
                controlled(&[h, h, h, -h])
            }
            StandardGate::Swap => {
                let mut m = vec![zero; 16];
                m[0] = one;
                m[6] = one;
                m[9] = one;
                m[15] = one;
                m
            }
            StandardGate::CRz(t) => diagonal(&[
                one,
                one,
                Complex64::from_polar(1.0, -t / 2.0),
                Complex64::from_polar(1.0, t / 2.0),
            ]),
            StandardGate::CP(t) => diagonal(&[one, one, one, Complex64::from_polar(1.0, *t)]),
            StandardGate::RXX(t) => {
                let (co, si) = ((t / 2.0).cos(), (t / 2.0).sin());
                let mut m = vec![zero; 16];
                for k in 0..4 {
                    m[k * 4 + k] = r(co);
                    m[k * 4 + (3 - k)] = c(0.0, -si);
                }
                m
            }
            StandardGate::RYY(t) => {
                let (co, si) = ((t / 2.0).cos(), (t / 2.0).sin());
                let mut m = vec![zero; 16];
                for k in 0..4 {
                    m[k * 4 + k] = r(co);
                }
                // YY = |00⟩⟨11|·(-1) + |01⟩⟨10| + |10⟩⟨01| + |11⟩⟨00|·(-1)
                m[3] = c(0.0, si);
                m[6] = c(0.0, -si);
                m[9] = c(0.0, -si);
                m[12] = c(0.0, si);
                m
            }
            StandardGate::RZZ(t) => {
                let lo = Complex64::from_polar(1.0, -t / 2.0);
                let hi = Complex64::from_polar(1.0, t / 2.0);
                diagonal(&[lo, hi, hi, lo])
            }
            StandardGate::CCX => return None,
        };
        Some(m)
    }
}

const PI_4: f64 = std::f64::consts::FRAC_PI_4;

/// 4x4 matrix applying `target` when the first operand is |1⟩.
fn controlled(target: &[Complex64; 4]) -> Vec<Complex64> {
    let mut m = vec![Complex64::new(0.0, 0.0); 16];
    m[0] = Complex64::new(1.0, 0.0);
    m[5] = Complex64::new(1.0, 0.0);
    m[10] = target[0];
    m[11] = target[1];
    m[14] = target[2];
    m[15] = target[3];
    m
}

fn diagonal(d: &[Complex64; 4]) -> Vec<Complex64> {
    let mut m = vec![Complex64::new(0.0, 0.0); 16];
    for (k, v) in d.iter().enumerate() {
        m[k * 4 + k] = *v;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn is_unitary(m: &[Complex64], dim: usize) -> bool {
        for row in 0..dim {
            for col in 0..dim {
                let mut acc = Complex64::new(0.0, 0.0);
                for k in 0..dim {
                    acc += m[row * dim + k] * m[col * dim + k].conj();
                }
                let expected = if row == col { 1.0 } else { 0.0 };
                if (acc - Complex64::new(expected, 0.0)).norm() > 1e-12 {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_standard_gate_properties() {
        assert_eq!(StandardGate::H.num_qubits(), 1);
        assert_eq!(StandardGate::CX.num_qubits(), 2);
        assert_eq!(StandardGate::CCX.num_qubits(), 3);
        assert_eq!(StandardGate::RZZ(0.3).parameters(), vec![0.3]);
        assert!(StandardGate::CZ.parameters().is_empty());
        assert_eq!(StandardGate::CP(PI).name(), "cp");
    }

    #[test]
    fn test_matrices_are_unitary() {
        let one_q = [
            StandardGate::X,
            StandardGate::Y,
            StandardGate::H,
            StandardGate::T,
            StandardGate::SX,
            StandardGate::Rx(0.7),
            StandardGate::Ry(-1.1),
            StandardGate::U(0.4, 1.2, -0.3),
        ];
        for g in one_q {
            assert!(is_unitary(&g.matrix().unwrap(), 2), "{} not unitary", g.name());
        }
        let two_q = [
            StandardGate::CX,
            StandardGate::CY,
            StandardGate::CH,
            StandardGate::Swap,
            StandardGate::CRz(0.9),
            StandardGate::RXX(0.5),
            StandardGate::RYY(1.3),
            StandardGate::RZZ(-0.8),
        ];
        for g in two_q {
            assert!(is_unitary(&g.matrix().unwrap(), 4), "{} not unitary", g.name());
        }
        assert!(StandardGate::CCX.matrix().is_none());
    }
}
