//! Quasiprobability decomposition of a cut plan.
//!
//! Each cut expands into the terms of the configured [`CutBasis`]. The full
//! term set is the Cartesian product across cuts with product coefficients,
//! so its one-norm is the product of the per-cut one-norms and
//! `κ = (Σ|c|)² = Π κᵢ`.
//!
//! Sampling a product term with probability `|c| / Σ|c|` is the same as
//! sampling each cut independently with its own `|cᵢ| / Σ|cᵢ|`, which is how
//! [`Decomposition::sample`] does it: the product set is never materialized
//! on the sampling path.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::basis::{core_channel_error, BasisTerm, CutBasis, LocalOp};
use crate::cut::CutPlan;

/// Basis term chosen for one cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermChoice {
    /// Index into the cut's basis expansion.
    pub term: usize,
    /// Operation for side A.
    pub a: LocalOp,
    /// Operation for side B.
    pub b: LocalOp,
}

/// One basis term per cut, in cut order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TermAssignment(pub Vec<TermChoice>);

impl TermAssignment {
    /// Per-cut operation pairs, as fragments consume them.
    pub fn ops(&self) -> Vec<(LocalOp, LocalOp)> {
        self.0.iter().map(|c| (c.a, c.b)).collect()
    }

    /// Per-cut term indices.
    pub fn indices(&self) -> Vec<usize> {
        self.0.iter().map(|c| c.term).collect()
    }
}

impl fmt::Display for TermAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "cut{i}:{}⊗{}", c.a, c.b)?;
        }
        write!(f, "]")
    }
}

/// A product term of the full decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    /// Operations for every cut.
    pub assignment: TermAssignment,
    /// Product of the per-cut coefficients.
    pub coefficient: f64,
}

/// Weighted term set for a cut plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    basis: CutBasis,
    thetas: Vec<f64>,
    per_cut: Vec<Vec<BasisTerm>>,
    /// Per-cut one-norms `Σ|cᵢ|`.
    norms: Vec<f64>,
}

impl Decomposition {
    /// Expand every cut of `plan` in `basis`.
    pub fn new(plan: &CutPlan, basis: CutBasis) -> Self {
        let thetas: Vec<f64> = plan.cuts().iter().map(|c| c.rule.theta).collect();
        let per_cut: Vec<Vec<BasisTerm>> = thetas.iter().map(|t| basis.expand(*t)).collect();
        let norms = per_cut
            .iter()
            .map(|terms| terms.iter().map(|t| t.coefficient.abs()).sum())
            .collect();
        Self {
            basis,
            thetas,
            per_cut,
            norms,
        }
    }

    /// Basis used for every cut.
    pub fn basis(&self) -> CutBasis {
        self.basis
    }

    /// Number of cuts.
    pub fn num_cuts(&self) -> usize {
        self.per_cut.len()
    }

    /// Size of the full product term set, saturating.
    pub fn num_terms(&self) -> usize {
        self.per_cut
            .iter()
            .fold(1usize, |acc, t| acc.saturating_mul(t.len()))
    }

    /// Expansion of cut `i`.
    pub fn cut_terms(&self, i: usize) -> &[BasisTerm] {
        &self.per_cut[i]
    }

    /// One-norm of the full term set, `γ = Σ|c| = √κ`.
    pub fn gamma(&self) -> f64 {
        self.norms.iter().product()
    }

    /// Sampling overhead `κ = γ²`.
    pub fn kappa(&self) -> f64 {
        let g = self.gamma();
        g * g
    }

    /// Enumerate the full product term set, last cut varying fastest.
    pub fn terms(&self) -> impl Iterator<Item = Term> + '_ {
        let total = self.num_terms();
        (0..total).map(move |mut flat| {
            let mut choices = vec![
                TermChoice {
                    term: 0,
                    a: LocalOp::Identity,
                    b: LocalOp::Identity,
                };
                self.per_cut.len()
            ];
            let mut coefficient = 1.0;
            for (cut, terms) in self.per_cut.iter().enumerate().rev() {
                let idx = flat % terms.len();
                flat /= terms.len();
                let t = &terms[idx];
                choices[cut] = TermChoice {
                    term: idx,
                    a: t.a,
                    b: t.b,
                };
                coefficient *= t.coefficient;
            }
            Term {
                assignment: TermAssignment(choices),
                coefficient,
            }
        })
    }

    /// Draw one term with probability `|c| / γ`; returns it with the sign
    /// of its coefficient.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (TermAssignment, f64) {
        let mut sign = 1.0;
        let mut choices = Vec::with_capacity(self.per_cut.len());
        for (terms, norm) in self.per_cut.iter().zip(&self.norms) {
            let u: f64 = rng.r#gen::<f64>() * norm;
            let mut acc = 0.0;
            // Fall back to the last non-zero term if rounding leaves u uncovered.
            let mut pick = terms
                .iter()
                .rposition(|t| t.coefficient != 0.0)
                .unwrap_or(0);
            for (idx, t) in terms.iter().enumerate() {
                acc += t.coefficient.abs();
                if t.coefficient != 0.0 && u < acc {
                    pick = idx;
                    break;
                }
            }
            let t = &terms[pick];
            if t.coefficient < 0.0 {
                sign = -sign;
            }
            choices.push(TermChoice {
                term: pick,
                a: t.a,
                b: t.b,
            });
        }
        (TermAssignment(choices), sign)
    }

    /// Largest deviation of any cut's reconstruction from its gate, checked
    /// both on the `Rzz` core and on the full gate channel.
    pub fn reconstruction_error(&self, plan: &CutPlan) -> f64 {
        plan.cuts()
            .iter()
            .zip(&self.per_cut)
            .zip(&self.thetas)
            .map(|((cut, terms), theta)| {
                core_channel_error(*theta, terms).max(cut.rule.reconstruction_error(&cut.gate, terms))
            })
            .fold(0.0, f64::max)
    }
}

/// `(Σ|c|)²` over an arbitrary coefficient list.
pub fn kappa_of(coefficients: impl IntoIterator<Item = f64>) -> f64 {
    let g: f64 = coefficients.into_iter().map(f64::abs).sum();
    g * g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cut::{select_cuts, CutConstraints};
    use qcut_ir::{Circuit, QubitId};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn two_cut_plan() -> CutPlan {
        let mut c = Circuit::with_size("two", 6);
        c.h(QubitId(2)).unwrap();
        c.cz(QubitId(2), QubitId(3)).unwrap();
        c.rzz(0.6, QubitId(2), QubitId(3)).unwrap();
        let constraints = CutConstraints {
            max_fragment_qubits: 3,
            min_fragment_qubits: 3,
            max_fragment_depth: None,
            max_cuts: 4,
        };
        select_cuts(&c, &constraints).unwrap()
    }

    #[test]
    fn test_kappa_is_product() {
        let plan = two_cut_plan();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        assert_eq!(d.num_cuts(), 2);
        assert_eq!(d.num_terms(), 36);
        let expected = 9.0 * CutBasis::Rzz.kappa(0.6);
        assert!((d.kappa() - expected).abs() < 1e-9);
        let enumerated = kappa_of(d.terms().map(|t| t.coefficient));
        assert!((enumerated - d.kappa()).abs() < 1e-9);
    }

    #[test]
    fn test_reconstruction_exact() {
        let plan = two_cut_plan();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        assert!(d.reconstruction_error(&plan) < 1e-12);
    }

    #[test]
    fn test_sampling_frequencies_follow_weights() {
        let plan = two_cut_plan();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut counts = [0usize; 6];
        let draws = 60_000;
        for _ in 0..draws {
            let (a, _) = d.sample(&mut rng);
            counts[a.0[0].term] += 1;
        }
        // CZ core: c² = s² = 1/2, |cs| = 1/2 each; γ = 3.
        for (idx, n) in counts.iter().enumerate() {
            let p = *n as f64 / draws as f64;
            let expected = d.cut_terms(0)[idx].coefficient.abs() / 3.0;
            assert!((p - expected).abs() < 0.01, "term {idx}: {p} vs {expected}");
        }
    }

    #[test]
    fn test_sample_sign_matches_coefficient() {
        let plan = two_cut_plan();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..200 {
            let (a, sign) = d.sample(&mut rng);
            let coeff: f64 = a
                .0
                .iter()
                .enumerate()
                .map(|(cut, c)| d.cut_terms(cut)[c.term].coefficient)
                .product();
            assert_eq!(sign, coeff.signum());
        }
    }

    #[test]
    fn test_trivial_plan_has_one_term() {
        let c = Circuit::with_size("small", 2);
        let plan = select_cuts(&c, &CutConstraints::default()).unwrap();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        let terms: Vec<Term> = d.terms().collect();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].coefficient, 1.0);
        assert_eq!(d.kappa(), 1.0);
    }

    #[test]
    fn test_assignment_display() {
        let a = TermAssignment(vec![TermChoice {
            term: 2,
            a: LocalOp::MeasureSign,
            b: LocalOp::SPlus,
        }]);
        assert_eq!(a.to_string(), "[cut0:M⊗S+]");
        assert_eq!(a.indices(), vec![2]);
    }
}
