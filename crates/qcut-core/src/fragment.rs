//! Fragment circuits produced by applying a cut plan.
//!
//! Each fragment is a circuit over its own span in local qubit indices.
//! A cut gate leaves its local pre-rotations, a [`CutMarker`] and its local
//! post-rotations on each side; a decomposition term later swaps every
//! marker for a concrete basis operation.
//!
//! [`CutMarker`]: qcut_ir::InstructionKind::CutMarker

use qcut_ir::{Circuit, CutSide, Instruction, InstructionKind, QubitId};

use crate::basis::LocalOp;
use crate::cut::{CutPlan, FragmentSpan};
use crate::error::{CutError, CutResult};

/// One piece of a cut circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Position of the fragment in its plan.
    pub index: usize,
    /// Qubits of the original circuit it holds.
    pub span: FragmentSpan,
    /// Local circuit with cut markers.
    pub circuit: Circuit,
}

impl Fragment {
    /// Substitute every marker with the operation `ops[cut]` chooses for its
    /// side.
    pub fn instantiate(&self, ops: &[(LocalOp, LocalOp)]) -> CutResult<Circuit> {
        let mut out = Circuit::with_size(
            format!("{}[{}]", self.circuit.name(), self.index),
            self.circuit.num_qubits(),
        );
        for inst in self.circuit.instructions() {
            match &inst.kind {
                InstructionKind::CutMarker { cut, side } => {
                    let (a, b) = ops.get(*cut).copied().ok_or_else(|| {
                        CutError::MalformedCircuit(format!(
                            "fragment {} references cut {cut} but only {} were assigned",
                            self.index,
                            ops.len()
                        ))
                    })?;
                    let op = match side {
                        CutSide::A => a,
                        CutSide::B => b,
                    };
                    for sub in op.instructions(inst.qubits[0]) {
                        out.push(sub)?;
                    }
                }
                _ => {
                    out.push(inst.clone())?;
                }
            }
        }
        Ok(out)
    }

    /// Number of cut markers in this fragment.
    pub fn num_markers(&self) -> usize {
        self.circuit
            .instructions()
            .iter()
            .filter(|i| i.is_cut_marker())
            .count()
    }
}

/// Split `circuit` into the fragments of `plan`.
pub fn build_fragments(circuit: &Circuit, plan: &CutPlan) -> CutResult<Vec<Fragment>> {
    if circuit.num_qubits() != plan.num_qubits() {
        return Err(CutError::MalformedCircuit(format!(
            "plan covers {} qubits, circuit has {}",
            plan.num_qubits(),
            circuit.num_qubits()
        )));
    }

    let mut fragments: Vec<Fragment> = plan
        .spans()
        .iter()
        .enumerate()
        .map(|(index, span)| Fragment {
            index,
            span: *span,
            circuit: Circuit::with_size(circuit.name(), span.width),
        })
        .collect();
    let owner = |q: QubitId| -> CutResult<usize> {
        plan.fragment_of(q.0).ok_or_else(|| {
            CutError::MalformedCircuit(format!("qubit {q} is outside every fragment"))
        })
    };

    for (gate_index, inst) in circuit.instructions().iter().enumerate() {
        if let Some(cut) = plan.cut_at(gate_index) {
            let loc = &plan.cuts()[cut];
            let sides = [
                (loc.qubits.0, CutSide::A, &loc.rule.pre_a, &loc.rule.post_a),
                (loc.qubits.1, CutSide::B, &loc.rule.pre_b, &loc.rule.post_b),
            ];
            for (qubit, side, pre, post) in sides {
                let f = owner(QubitId(qubit))?;
                let frag = &mut fragments[f];
                let local = QubitId(qubit - frag.span.start);
                for g in pre {
                    frag.circuit
                        .push(Instruction::single_qubit_gate(g.clone(), local))?;
                }
                frag.circuit.push(Instruction::cut_marker(cut, side, local))?;
                for g in post {
                    frag.circuit
                        .push(Instruction::single_qubit_gate(g.clone(), local))?;
                }
            }
            continue;
        }

        if inst.is_barrier() {
            for frag in fragments.iter_mut() {
                let local: Vec<QubitId> = inst
                    .qubits
                    .iter()
                    .filter(|q| frag.span.contains(q.0))
                    .map(|q| QubitId(q.0 - frag.span.start))
                    .collect();
                if !local.is_empty() {
                    frag.circuit.push(Instruction::barrier(local))?;
                }
            }
            continue;
        }

        let Some(first) = inst.qubits.first() else {
            continue;
        };
        let f = owner(*first)?;
        let frag = &mut fragments[f];
        if let Some(q) = inst.qubits.iter().find(|q| !frag.span.contains(q.0)) {
            return Err(CutError::MalformedCircuit(format!(
                "'{}' at {gate_index} touches {q} outside fragment {f} but was not cut",
                inst.name()
            )));
        }
        let mut local = inst.clone();
        for q in local.qubits.iter_mut() {
            q.0 -= frag.span.start;
        }
        frag.circuit.push(local)?;
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cut::{select_cuts, CutConstraints, fragment_depth};

    fn bell_pair_chain() -> Circuit {
        let mut c = Circuit::with_size("chain", 6);
        c.h(QubitId(0)).unwrap();
        for q in 0..5 {
            c.cx(QubitId(q), QubitId(q + 1)).unwrap();
        }
        c.barrier_all().unwrap();
        c
    }

    fn plan_for(c: &Circuit) -> CutPlan {
        let constraints = CutConstraints {
            max_fragment_qubits: 3,
            min_fragment_qubits: 3,
            max_fragment_depth: None,
            max_cuts: 2,
        };
        select_cuts(c, &constraints).unwrap()
    }

    #[test]
    fn test_fragments_hold_local_gates() {
        let c = bell_pair_chain();
        let plan = plan_for(&c);
        let frags = build_fragments(&c, &plan).unwrap();
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].circuit.num_qubits(), 3);
        assert_eq!(frags[0].num_markers(), 1);
        assert_eq!(frags[1].num_markers(), 1);
        // H, two CX, marker, post Rz on side A
        assert_eq!(frags[0].circuit.size(), 5);
        // pre H, marker, post Rz, post H, two CX on side B
        assert_eq!(frags[1].circuit.size(), 6);
    }

    #[test]
    fn test_fragment_depth_matches_selector() {
        let c = bell_pair_chain();
        let plan = plan_for(&c);
        let frags = build_fragments(&c, &plan).unwrap();
        for f in &frags {
            assert_eq!(f.circuit.depth(), fragment_depth(&c, f.span));
        }
    }

    #[test]
    fn test_instantiate_replaces_markers() {
        let c = bell_pair_chain();
        let plan = plan_for(&c);
        let frags = build_fragments(&c, &plan).unwrap();
        let ops = [(LocalOp::MeasureSign, LocalOp::SPlus)];
        let left = frags[0].instantiate(&ops).unwrap();
        assert!(left.instructions().iter().all(|i| !i.is_cut_marker()));
        assert_eq!(left.count_ops().get("signed_measure"), Some(&1));
        let right = frags[1].instantiate(&ops).unwrap();
        assert_eq!(right.count_ops().get("rz"), Some(&2));
    }

    #[test]
    fn test_instantiate_needs_every_cut() {
        let c = bell_pair_chain();
        let plan = plan_for(&c);
        let frags = build_fragments(&c, &plan).unwrap();
        assert!(matches!(
            frags[0].instantiate(&[]).unwrap_err(),
            CutError::MalformedCircuit(_)
        ));
    }
}
