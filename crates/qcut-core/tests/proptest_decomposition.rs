//! Property-based tests for decomposition overhead and sample budgets.

use proptest::prelude::*;
use qcut_core::decompose::kappa_of;
use qcut_core::{CutBasis, CutConstraints, Decomposition, required_samples, select_cuts};
use qcut_ir::{Circuit, QubitId};

/// Six qubits, every angle applied as an `Rzz` across the 2|3 boundary.
fn crossing(angles: &[f64]) -> Circuit {
    let mut c = Circuit::with_size("crossing", 6);
    c.h(QubitId(2)).unwrap();
    for &t in angles {
        c.rzz(t, QubitId(2), QubitId(3)).unwrap();
    }
    c
}

fn split_in_half(max_cuts: usize) -> CutConstraints {
    CutConstraints {
        max_fragment_qubits: 3,
        min_fragment_qubits: 3,
        max_fragment_depth: None,
        max_cuts,
    }
}

proptest! {
    #[test]
    fn kappa_is_product_of_cut_overheads(angles in prop::collection::vec(-3.1f64..3.1, 1..=4)) {
        let plan = select_cuts(&crossing(&angles), &split_in_half(4)).unwrap();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        let expected: f64 = angles.iter().map(|&t| CutBasis::Rzz.kappa(t)).product();
        prop_assert_eq!(d.num_cuts(), angles.len());
        prop_assert!((d.kappa() - expected).abs() <= 1e-9 * expected);
        prop_assert!(d.kappa() >= 1.0 - 1e-12);
    }

    #[test]
    fn kappa_ignores_cut_order(angles in prop::collection::vec(-3.1f64..3.1, 2..=4)) {
        let mut reversed = angles.clone();
        reversed.reverse();
        let a = Decomposition::new(&select_cuts(&crossing(&angles), &split_in_half(4)).unwrap(), CutBasis::Rzz);
        let b = Decomposition::new(&select_cuts(&crossing(&reversed), &split_in_half(4)).unwrap(), CutBasis::Rzz);
        prop_assert!((a.kappa() - b.kappa()).abs() <= 1e-9 * a.kappa());
    }

    #[test]
    fn enumerated_terms_match_gamma(angles in prop::collection::vec(-3.1f64..3.1, 1..=3)) {
        let plan = select_cuts(&crossing(&angles), &split_in_half(3)).unwrap();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        let coefficients: Vec<f64> = d.terms().map(|t| t.coefficient).collect();
        prop_assert_eq!(coefficients.len(), 6usize.pow(angles.len() as u32));
        prop_assert!((kappa_of(coefficients.iter().copied()) - d.kappa()).abs() <= 1e-9 * d.kappa());
        // The signed sum is the identity channel's weight on I⊗I: Π(c² + s²) = 1.
        let signed: f64 = coefficients.iter().sum();
        prop_assert!((signed - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reconstruction_is_exact(angles in prop::collection::vec(-3.1f64..3.1, 1..=3)) {
        let plan = select_cuts(&crossing(&angles), &split_in_half(3)).unwrap();
        let d = Decomposition::new(&plan, CutBasis::Rzz);
        prop_assert!(d.reconstruction_error(&plan) < 1e-10);
    }

    #[test]
    fn tighter_precision_never_needs_fewer_samples(
        kappa in 1.0f64..200.0,
        variance in 0.0f64..4.0,
        eps in 0.005f64..0.5,
        shrink in 0.1f64..1.0,
    ) {
        let ceiling = u64::MAX / 2;
        let (loose, _) = required_samples(kappa, variance, eps, ceiling);
        let (tight, _) = required_samples(kappa, variance, eps * shrink, ceiling);
        prop_assert!(tight >= loose);
    }

    #[test]
    fn plan_meets_bound_or_is_flagged(
        kappa in 1.0f64..100.0,
        variance in 0.0f64..4.0,
        eps in 0.01f64..0.5,
        ceiling in 1u64..1_000_000,
    ) {
        let (n, under) = required_samples(kappa, variance, eps, ceiling);
        prop_assert!(n >= 1 && n <= ceiling);
        let projected = variance * kappa * kappa / n as f64;
        if under {
            prop_assert_eq!(n, ceiling);
        } else {
            prop_assert!(projected <= eps * eps * (1.0 + 1e-9));
        }
    }
}

#[test]
fn too_many_crossings_is_infeasible() {
    let err = select_cuts(&crossing(&[0.3, 0.4, 0.5]), &split_in_half(2)).unwrap_err();
    assert_eq!(err.kind(), "infeasible_cut");
}
