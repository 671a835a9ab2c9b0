//! The quasiprobability basis for cutting two-qubit gates.
//!
//! Every cuttable gate is first rewritten as local unitaries around a
//! `Rzz(θ) = exp(-iθ/2 Z⊗Z)` core:
//!
//! ```text
//! G = (post_a ⊗ post_b) · Rzz(θ) · (pre_a ⊗ pre_b)     (up to global phase)
//! ```
//!
//! The core channel then splits into six products of single-qubit
//! operations, with `c = cos θ/2` and `s = sin θ/2`:
//!
//! ```text
//! Rzz(θ)·Rzz(θ)† = c² [I⊗I] + s² [Z⊗Z]
//!                 + cs ([M⊗S₊] − [M⊗S₋] + [S₊⊗M] − [S₋⊗M])
//! ```
//!
//! where `M` is the signed Z measurement `ρ ↦ P0ρP0 − P1ρP1` and
//! `S± = Rz(±π/2)`. The one-norm of the coefficients is `1 + 2|sin θ|`, so a
//! CZ or CX cut costs κ = 9.

use std::f64::consts::FRAC_PI_2;
use std::fmt;

use num_complex::Complex64;
use qcut_ir::{Instruction, QubitId, StandardGate};
use serde::{Deserialize, Serialize};

/// Supported cut bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CutBasis {
    /// Six-term decomposition around a ZZ-rotation core.
    #[default]
    Rzz,
}

impl CutBasis {
    /// Number of terms one cut expands into.
    pub fn size(&self) -> usize {
        match self {
            CutBasis::Rzz => 6,
        }
    }

    /// Expand a core rotation angle into weighted local operation pairs.
    ///
    /// The order of the returned terms is fixed; sampling and enumeration
    /// both index into it.
    pub fn expand(&self, theta: f64) -> Vec<BasisTerm> {
        match self {
            CutBasis::Rzz => {
                let (s, c) = (theta / 2.0).sin_cos();
                let cs = c * s;
                vec![
                    BasisTerm::new(LocalOp::Identity, LocalOp::Identity, c * c),
                    BasisTerm::new(LocalOp::PauliZ, LocalOp::PauliZ, s * s),
                    BasisTerm::new(LocalOp::MeasureSign, LocalOp::SPlus, cs),
                    BasisTerm::new(LocalOp::MeasureSign, LocalOp::SMinus, -cs),
                    BasisTerm::new(LocalOp::SPlus, LocalOp::MeasureSign, cs),
                    BasisTerm::new(LocalOp::SMinus, LocalOp::MeasureSign, -cs),
                ]
            }
        }
    }

    /// Sampling overhead `(Σ|c|)²` of a single cut with core angle `theta`.
    pub fn kappa(&self, theta: f64) -> f64 {
        let gamma: f64 = self.expand(theta).iter().map(|t| t.coefficient.abs()).sum();
        gamma * gamma
    }
}

impl fmt::Display for CutBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutBasis::Rzz => write!(f, "rzz"),
        }
    }
}

/// Single-qubit operation substituted for a cut marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalOp {
    /// Do nothing.
    Identity,
    /// Pauli Z.
    PauliZ,
    /// Mid-circuit Z measurement weighted by its ±1 outcome.
    MeasureSign,
    /// `Rz(π/2)`.
    SPlus,
    /// `Rz(-π/2)`.
    SMinus,
}

impl LocalOp {
    /// Short label.
    pub fn label(&self) -> &'static str {
        match self {
            LocalOp::Identity => "I",
            LocalOp::PauliZ => "Z",
            LocalOp::MeasureSign => "M",
            LocalOp::SPlus => "S+",
            LocalOp::SMinus => "S-",
        }
    }

    /// Instructions realizing this operation on `qubit`.
    pub fn instructions(&self, qubit: QubitId) -> Vec<Instruction> {
        match self {
            LocalOp::Identity => vec![],
            LocalOp::PauliZ => vec![Instruction::single_qubit_gate(StandardGate::Z, qubit)],
            LocalOp::MeasureSign => vec![Instruction::signed_measure(qubit)],
            LocalOp::SPlus => vec![Instruction::single_qubit_gate(
                StandardGate::Rz(FRAC_PI_2),
                qubit,
            )],
            LocalOp::SMinus => vec![Instruction::single_qubit_gate(
                StandardGate::Rz(-FRAC_PI_2),
                qubit,
            )],
        }
    }

    /// Signed Kraus form: the map is `ρ ↦ Σ w · K ρ K†`.
    fn kraus(&self) -> Vec<(f64, M2)> {
        let zero = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        match self {
            LocalOp::Identity => vec![(1.0, [one, zero, zero, one])],
            LocalOp::PauliZ => vec![(1.0, [one, zero, zero, -one])],
            LocalOp::MeasureSign => vec![
                (1.0, [one, zero, zero, zero]),
                (-1.0, [zero, zero, zero, one]),
            ],
            LocalOp::SPlus => vec![(1.0, rz(FRAC_PI_2))],
            LocalOp::SMinus => vec![(1.0, rz(-FRAC_PI_2))],
        }
    }
}

impl fmt::Display for LocalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One weighted pair of local operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasisTerm {
    /// Operation on the first operand's side.
    pub a: LocalOp,
    /// Operation on the second operand's side.
    pub b: LocalOp,
    /// Signed real coefficient.
    pub coefficient: f64,
}

impl BasisTerm {
    fn new(a: LocalOp, b: LocalOp, coefficient: f64) -> Self {
        Self { a, b, coefficient }
    }
}

/// How a cuttable gate maps onto the `Rzz` core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutRule {
    /// Core rotation angle.
    pub theta: f64,
    /// Gates applied on side A before the core, in order.
    pub pre_a: Vec<StandardGate>,
    /// Gates applied on side B before the core, in order.
    pub pre_b: Vec<StandardGate>,
    /// Gates applied on side A after the core, in order.
    pub post_a: Vec<StandardGate>,
    /// Gates applied on side B after the core, in order.
    pub post_b: Vec<StandardGate>,
}

impl CutRule {
    fn core(theta: f64) -> Self {
        Self {
            theta,
            pre_a: vec![],
            pre_b: vec![],
            post_a: vec![],
            post_b: vec![],
        }
    }

    /// Cut rule for `gate`, or `None` if it cannot be cut.
    pub fn for_gate(gate: &StandardGate) -> Option<Self> {
        use StandardGate as G;
        let rule = match gate {
            G::RZZ(t) => Self::core(*t),
            G::CZ => Self::controlled_phase(std::f64::consts::PI),
            G::CP(l) => Self::controlled_phase(*l),
            G::CRz(l) => {
                let mut r = Self::core(-l / 2.0);
                r.post_b = vec![G::Rz(l / 2.0)];
                r
            }
            G::CX => {
                let mut r = Self::controlled_phase(std::f64::consts::PI);
                r.pre_b.insert(0, G::H);
                r.post_b.push(G::H);
                r
            }
            G::CY => {
                let mut r = Self::controlled_phase(std::f64::consts::PI);
                r.pre_b.splice(0..0, [G::Sdg, G::H]);
                r.post_b.extend([G::H, G::S]);
                r
            }
            G::RXX(t) => {
                let mut r = Self::core(*t);
                r.pre_a = vec![G::H];
                r.pre_b = vec![G::H];
                r.post_a = vec![G::H];
                r.post_b = vec![G::H];
                r
            }
            G::RYY(t) => {
                let mut r = Self::core(*t);
                r.pre_a = vec![G::Sdg, G::H];
                r.pre_b = vec![G::Sdg, G::H];
                r.post_a = vec![G::H, G::S];
                r.post_b = vec![G::H, G::S];
                r
            }
            _ => return None,
        };
        Some(rule)
    }

    /// `CP(λ) = e^{-iλ/4} (Rz(λ/2) ⊗ Rz(λ/2)) · Rzz(-λ/2)`.
    fn controlled_phase(lambda: f64) -> Self {
        let mut r = Self::core(-lambda / 2.0);
        r.post_a = vec![StandardGate::Rz(lambda / 2.0)];
        r.post_b = vec![StandardGate::Rz(lambda / 2.0)];
        r
    }

    /// Largest deviation between the gate's channel and the basis
    /// reconstruction `Post ∘ (Σ c·A⊗B) ∘ Pre`, over all matrix units.
    pub fn reconstruction_error(&self, gate: &StandardGate, terms: &[BasisTerm]) -> f64 {
        let Some(g) = gate.matrix().and_then(|m| to_m4(&m)) else {
            return f64::INFINITY;
        };
        let pre = kron(&sequence(&self.pre_a), &sequence(&self.pre_b));
        let post = kron(&sequence(&self.post_a), &sequence(&self.post_b));

        let mut worst: f64 = 0.0;
        for unit in 0..16 {
            let mut e = [Complex64::new(0.0, 0.0); 16];
            e[unit] = Complex64::new(1.0, 0.0);

            let target = conjugate(&g, &e);
            let inner = conjugate(&pre, &e);
            let mut mixed = [Complex64::new(0.0, 0.0); 16];
            for term in terms {
                for (wa, ka) in term.a.kraus() {
                    for (wb, kb) in term.b.kraus() {
                        let k = kron(&ka, &kb);
                        let part = conjugate(&k, &inner);
                        let w = term.coefficient * wa * wb;
                        for (m, p) in mixed.iter_mut().zip(part.iter()) {
                            *m += *p * w;
                        }
                    }
                }
            }
            let recon = conjugate(&post, &mixed);
            for (t, r) in target.iter().zip(recon.iter()) {
                worst = worst.max((*t - *r).norm());
            }
        }
        worst
    }
}

/// Deviation of the six-term expansion from the `Rzz(θ)` channel, computed
/// elementwise on the Schur multipliers of all sixteen matrix units.
pub fn core_channel_error(theta: f64, terms: &[BasisTerm]) -> f64 {
    let z = |bit: usize| if bit == 0 { 1.0 } else { -1.0 };
    let mut worst: f64 = 0.0;
    for idx in 0..16usize {
        let (za, zb, zc, zd) = (z(idx >> 3 & 1), z(idx >> 2 & 1), z(idx >> 1 & 1), z(idx & 1));
        let target = Complex64::from_polar(1.0, -theta / 2.0 * (za * zb - zc * zd));
        let recon: Complex64 = terms
            .iter()
            .map(|t| schur(t.a, za, zc) * schur(t.b, zb, zd) * t.coefficient)
            .sum();
        worst = worst.max((target - recon).norm());
    }
    worst
}

/// Multiplier a Z-diagonal local op applies to the density-matrix element
/// with row sign `za` and column sign `zc`.
fn schur(op: LocalOp, za: f64, zc: f64) -> Complex64 {
    let same = (1.0 + za * zc) / 2.0;
    let diff = (za - zc) / 2.0;
    match op {
        LocalOp::Identity => Complex64::new(1.0, 0.0),
        LocalOp::PauliZ => Complex64::new(za * zc, 0.0),
        LocalOp::MeasureSign => Complex64::new((za + zc) / 2.0, 0.0),
        LocalOp::SPlus => Complex64::new(same, -diff),
        LocalOp::SMinus => Complex64::new(same, diff),
    }
}

type M2 = [Complex64; 4];
type M4 = [Complex64; 16];

fn rz(theta: f64) -> M2 {
    let zero = Complex64::new(0.0, 0.0);
    [
        Complex64::from_polar(1.0, -theta / 2.0),
        zero,
        zero,
        Complex64::from_polar(1.0, theta / 2.0),
    ]
}

fn to_m2(m: &[Complex64]) -> Option<M2> {
    m.try_into().ok()
}

fn to_m4(m: &[Complex64]) -> Option<M4> {
    m.try_into().ok()
}

/// Product of a gate sequence applied left to right.
fn sequence(gates: &[StandardGate]) -> M2 {
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    let mut acc: M2 = [one, zero, zero, one];
    for g in gates {
        if let Some(m) = g.matrix().and_then(|m| to_m2(&m)) {
            acc = mul2(&m, &acc);
        }
    }
    acc
}

fn mul2(a: &M2, b: &M2) -> M2 {
    let mut out = [Complex64::new(0.0, 0.0); 4];
    for r in 0..2 {
        for c in 0..2 {
            out[r * 2 + c] = a[r * 2] * b[c] + a[r * 2 + 1] * b[2 + c];
        }
    }
    out
}

/// `a ⊗ b` with `a` on the most significant qubit.
fn kron(a: &M2, b: &M2) -> M4 {
    let mut out = [Complex64::new(0.0, 0.0); 16];
    for i1 in 0..2 {
        for i2 in 0..2 {
            for j1 in 0..2 {
                for j2 in 0..2 {
                    out[(i1 * 2 + i2) * 4 + (j1 * 2 + j2)] = a[i1 * 2 + j1] * b[i2 * 2 + j2];
                }
            }
        }
    }
    out
}

/// `U X U†` for 4x4 matrices.
fn conjugate(u: &M4, x: &M4) -> M4 {
    let mut ux = [Complex64::new(0.0, 0.0); 16];
    for r in 0..4 {
        for c in 0..4 {
            ux[r * 4 + c] = (0..4).map(|k| u[r * 4 + k] * x[k * 4 + c]).sum();
        }
    }
    let mut out = [Complex64::new(0.0, 0.0); 16];
    for r in 0..4 {
        for c in 0..4 {
            out[r * 4 + c] = (0..4).map(|k| ux[r * 4 + k] * u[c * 4 + k].conj()).sum();
        }
    }
    out
}
