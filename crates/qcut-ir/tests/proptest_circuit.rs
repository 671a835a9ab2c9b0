//! Property-based tests for circuit structure queries.

use qcut_ir::{Circuit, CouplingMap, QubitId, Topology};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum GateOp {
    H(u32),
    Rz(f64, u32),
    CX(u32, u32),
    Rzz(f64, u32, u32),
}

impl GateOp {
    fn apply(self, circuit: &mut Circuit) {
        let _ = match self {
            GateOp::H(q) => circuit.h(QubitId(q)),
            GateOp::Rz(t, q) => circuit.rz(t, QubitId(q)),
            GateOp::CX(a, b) => circuit.cx(QubitId(a), QubitId(b)),
            GateOp::Rzz(t, a, b) => circuit.rzz(t, QubitId(a), QubitId(b)),
        };
    }
}

fn arb_gate_op(num_qubits: u32) -> impl Strategy<Value = GateOp> {
    let pair = (0..num_qubits, 1..num_qubits)
        .prop_map(move |(a, off)| (a, (a + off) % num_qubits));
    prop_oneof![
        (0..num_qubits).prop_map(GateOp::H),
        (-3.0f64..3.0, 0..num_qubits).prop_map(|(t, q)| GateOp::Rz(t, q)),
        pair.clone().prop_map(|(a, b)| GateOp::CX(a, b)),
        (-3.0f64..3.0, pair).prop_map(|(t, (a, b))| GateOp::Rzz(t, a, b)),
    ]
}

fn arb_circuit() -> impl Strategy<Value = Circuit> {
    (2_u32..=6).prop_flat_map(|nq| {
        prop::collection::vec(arb_gate_op(nq), 0..=24).prop_map(move |ops| {
            let mut circuit = Circuit::with_size("prop", nq);
            for op in ops {
                op.apply(&mut circuit);
            }
            circuit
        })
    })
}

proptest! {
    #[test]
    fn depth_bounded_by_size(circuit in arb_circuit()) {
        prop_assert!(circuit.depth() <= circuit.size());
        prop_assert!(circuit.num_two_qubit_gates() <= circuit.size());
        if circuit.size() > 0 {
            prop_assert!(circuit.depth() >= 1);
        }
    }

    #[test]
    fn count_ops_sums_to_size(circuit in arb_circuit()) {
        let total: usize = circuit.count_ops().values().sum();
        prop_assert_eq!(total, circuit.size());
    }

    #[test]
    fn full_map_accepts_everything(circuit in arb_circuit()) {
        let full = CouplingMap::full(circuit.num_qubits());
        prop_assert!(circuit.satisfies_connectivity(&full));
    }

    #[test]
    fn serde_preserves_structure(circuit in arb_circuit()) {
        let json = serde_json::to_string(&circuit).unwrap();
        let restored: Circuit = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(restored.depth(), circuit.depth());
        prop_assert_eq!(restored, circuit);
    }

    #[test]
    fn line_paths_are_shortest(n in 2_u32..16, a in 0_u32..16, b in 0_u32..16) {
        let (a, b) = (a % n, b % n);
        let map = Topology::Line.coupling_map(n).unwrap();
        let path = map.shortest_path(a, b).unwrap();
        prop_assert_eq!(path.len() as u32, a.abs_diff(b) + 1);
        for w in path.windows(2) {
            prop_assert!(map.is_connected(w[0], w[1]));
        }
    }
}
