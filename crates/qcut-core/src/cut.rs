//! Cut selection: partition a circuit's qubits into contiguous fragments.
//!
//! Fragments are placed greedily from qubit 0 upwards. For each fragment,
//! every admissible width is scored by the number of two-qubit gates its
//! right boundary cuts; the cheapest wins, ties going to the boundary whose
//! cut gates appear earliest in the circuit, then to the wider fragment.
//!
//! A width is admissible when
//! - it lies in `[min_fragment_qubits, max_fragment_qubits]`,
//! - the qubits left over are either none or at least `min_fragment_qubits`,
//! - the fragment's depth, counting the local halves of cut gates, stays
//!   within `max_fragment_depth`, and
//! - every gate it splits has a cut rule.

use std::hash::{Hash, Hasher};

use qcut_ir::{Circuit, InstructionKind, StandardGate};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::basis::CutRule;
use crate::error::{CutError, CutResult};

/// Limits a cut plan must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutConstraints {
    /// Widest fragment the device can hold.
    pub max_fragment_qubits: u32,
    /// Narrowest fragment allowed.
    pub min_fragment_qubits: u32,
    /// Deepest fragment allowed, if bounded.
    pub max_fragment_depth: Option<usize>,
    /// Most cuts a plan may contain.
    pub max_cuts: usize,
}

impl Default for CutConstraints {
    fn default() -> Self {
        Self {
            max_fragment_qubits: 6,
            min_fragment_qubits: 3,
            max_fragment_depth: None,
            max_cuts: 4,
        }
    }
}

impl CutConstraints {
    /// Check the constraints are self-consistent.
    pub fn validate(&self) -> CutResult<()> {
        if self.min_fragment_qubits == 0 {
            return Err(CutError::ConfigValidation(
                "min_fragment_qubits must be at least 1".into(),
            ));
        }
        if self.min_fragment_qubits > self.max_fragment_qubits {
            return Err(CutError::ConfigValidation(format!(
                "min_fragment_qubits ({}) exceeds max_fragment_qubits ({})",
                self.min_fragment_qubits, self.max_fragment_qubits
            )));
        }
        if self.max_fragment_depth == Some(0) {
            return Err(CutError::ConfigValidation(
                "max_fragment_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Contiguous qubit range `[start, start + width)` held by one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentSpan {
    /// First qubit.
    pub start: u32,
    /// Number of qubits.
    pub width: u32,
}

impl FragmentSpan {
    /// One past the last qubit.
    pub fn end(&self) -> u32 {
        self.start + self.width
    }

    /// Whether `qubit` lies in this span.
    pub fn contains(&self, qubit: u32) -> bool {
        qubit >= self.start && qubit < self.end()
    }
}

/// A two-qubit gate removed by the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutLocation {
    /// Position of the gate in the circuit's instruction list.
    pub gate_index: usize,
    /// Operands `(a, b)` in gate order.
    pub qubits: (u32, u32),
    /// The gate itself.
    pub gate: StandardGate,
    /// Its rewrite around the basis core.
    pub rule: CutRule,
}

/// Fragments plus the gates cut between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPlan {
    num_qubits: u32,
    spans: Vec<FragmentSpan>,
    cuts: Vec<CutLocation>,
}

impl CutPlan {
    /// Plan keeping all `num_qubits` in one fragment.
    pub fn whole(num_qubits: u32) -> Self {
        Self {
            num_qubits,
            spans: vec![FragmentSpan {
                start: 0,
                width: num_qubits,
            }],
            cuts: vec![],
        }
    }

    /// Fragment spans, left to right.
    pub fn spans(&self) -> &[FragmentSpan] {
        &self.spans
    }

    /// Cut gates in circuit order.
    pub fn cuts(&self) -> &[CutLocation] {
        &self.cuts
    }

    /// Width of the cut circuit.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Whether the plan keeps the circuit whole.
    pub fn is_trivial(&self) -> bool {
        self.cuts.is_empty() && self.spans.len() <= 1
    }

    /// Index of the fragment holding `qubit`.
    pub fn fragment_of(&self, qubit: u32) -> Option<usize> {
        self.spans.iter().position(|s| s.contains(qubit))
    }

    /// Cut index of the gate at `gate_index`, if it was cut.
    pub fn cut_at(&self, gate_index: usize) -> Option<usize> {
        self.cuts
            .binary_search_by_key(&gate_index, |c| c.gate_index)
            .ok()
    }

    /// Stable identity of the plan's structure, used in calibration tags.
    pub fn fingerprint(&self) -> u64 {
        let mut h = FxHasher::default();
        self.num_qubits.hash(&mut h);
        self.spans.hash(&mut h);
        for cut in &self.cuts {
            cut.gate_index.hash(&mut h);
            cut.qubits.hash(&mut h);
            cut.gate.name().hash(&mut h);
            for p in cut.gate.parameters() {
                p.to_bits().hash(&mut h);
            }
        }
        h.finish()
    }
}

/// Choose fragment boundaries and collect the gates they cut.
#[instrument(skip_all, fields(circuit = circuit.name(), qubits = circuit.num_qubits()))]
pub fn select_cuts(circuit: &Circuit, constraints: &CutConstraints) -> CutResult<CutPlan> {
    constraints.validate()?;
    let n = circuit.num_qubits();

    if n <= constraints.max_fragment_qubits {
        check_depth(circuit, FragmentSpan { start: 0, width: n }, constraints)?;
        debug!("circuit fits in one fragment");
        return Ok(CutPlan::whole(n));
    }
    if circuit.is_empty() {
        return Err(CutError::MalformedCircuit(format!(
            "'{}' is empty; nothing to cut into fragments of at most {} qubits",
            circuit.name(),
            constraints.max_fragment_qubits
        )));
    }

    let mut spans = Vec::new();
    let mut start = 0;
    while start < n {
        let span = best_boundary(circuit, start, constraints)?;
        debug!(start = span.start, width = span.width, "placed fragment");
        start = span.end();
        spans.push(span);
    }

    let plan = collect_cuts(circuit, spans)?;
    if plan.cuts.len() > constraints.max_cuts {
        return Err(CutError::InfeasibleCut(format!(
            "plan needs {} cuts, limit is {}",
            plan.cuts.len(),
            constraints.max_cuts
        )));
    }
    info!(
        fragments = plan.spans.len(),
        cuts = plan.cuts.len(),
        "cut plan selected"
    );
    Ok(plan)
}

/// Score key: (cuts, cut gate positions, narrower-is-worse).
type Score = (usize, Vec<usize>, std::cmp::Reverse<u32>);

fn best_boundary(circuit: &Circuit, start: u32, c: &CutConstraints) -> CutResult<FragmentSpan> {
    let n = circuit.num_qubits();
    let mut best: Option<(Score, FragmentSpan)> = None;
    let mut rejected = Vec::new();

    for width in c.min_fragment_qubits..=c.max_fragment_qubits {
        let end = start + width;
        if end > n {
            break;
        }
        let rest = n - end;
        if rest != 0 && rest < c.min_fragment_qubits {
            continue;
        }
        let span = FragmentSpan { start, width };

        if let Err(reason) = check_splittable(circuit, span) {
            rejected.push(format!("[{start},{end}): {reason}"));
            continue;
        }
        if let Err(e) = check_depth(circuit, span, c) {
            rejected.push(format!("[{start},{end}): {e}"));
            continue;
        }

        let cut_gates: Vec<usize> = circuit
            .instructions()
            .iter()
            .enumerate()
            .filter(|(_, inst)| {
                inst.is_two_qubit_gate()
                    && inst.qubits.iter().any(|q| span.contains(q.0))
                    && inst.qubits.iter().any(|q| q.0 >= end)
            })
            .map(|(i, _)| i)
            .collect();
        let score = (cut_gates.len(), cut_gates, std::cmp::Reverse(width));

        if best.as_ref().is_none_or(|(b, _)| score < *b) {
            best = Some((score, span));
        }
    }

    best.map(|(_, span)| span).ok_or_else(|| {
        let detail = if rejected.is_empty() {
            "no width fits the fragment size limits".to_string()
        } else {
            rejected.join("; ")
        };
        CutError::InfeasibleCut(format!("no admissible fragment starting at qubit {start}: {detail}"))
    })
}

/// Every gate leaving `span` must be a two-qubit gate with a cut rule.
fn check_splittable(circuit: &Circuit, span: FragmentSpan) -> Result<(), String> {
    for (idx, inst) in circuit.instructions().iter().enumerate() {
        let InstructionKind::Gate(gate) = &inst.kind else {
            continue;
        };
        let inside = inst.qubits.iter().filter(|q| span.contains(q.0)).count();
        if inside == 0 || inside == inst.qubits.len() {
            continue;
        }
        if inst.qubits.len() > 2 {
            return Err(format!(
                "{}-qubit gate '{}' at {idx} straddles fragments",
                inst.qubits.len(),
                gate.name()
            ));
        }
        if CutRule::for_gate(gate).is_none() {
            return Err(format!("gate '{}' at {idx} has no cut rule", gate.name()));
        }
    }
    Ok(())
}

fn check_depth(circuit: &Circuit, span: FragmentSpan, c: &CutConstraints) -> CutResult<()> {
    if let Some(limit) = c.max_fragment_depth {
        let depth = fragment_depth(circuit, span);
        if depth > limit {
            return Err(CutError::InfeasibleCut(format!(
                "fragment [{}, {}) has depth {depth}, limit is {limit}",
                span.start,
                span.end()
            )));
        }
    }
    Ok(())
}

/// Depth of the fragment circuit `span` would produce.
///
/// A split gate contributes its local pre-rotations, one layer for the
/// substituted basis operation, and its local post-rotations.
pub fn fragment_depth(circuit: &Circuit, span: FragmentSpan) -> usize {
    let mut frontier = vec![0usize; span.width as usize];
    let local = |q: u32| (q - span.start) as usize;

    for inst in circuit.instructions() {
        let inside: Vec<u32> = inst
            .qubits
            .iter()
            .map(|q| q.0)
            .filter(|&q| span.contains(q))
            .collect();
        if inside.is_empty() {
            continue;
        }
        let level = inside.iter().map(|&q| frontier[local(q)]).max().unwrap_or(0);

        let added = match &inst.kind {
            InstructionKind::Barrier => 0,
            InstructionKind::Gate(gate) if inside.len() < inst.qubits.len() => {
                match CutRule::for_gate(gate) {
                    Some(rule) => {
                        let first = inst.qubits.first().is_some_and(|q| span.contains(q.0));
                        let (pre, post) = if first {
                            (rule.pre_a.len(), rule.post_a.len())
                        } else {
                            (rule.pre_b.len(), rule.post_b.len())
                        };
                        pre + 1 + post
                    }
                    None => 1,
                }
            }
            _ => 1,
        };
        for q in inside {
            frontier[local(q)] = level + added;
        }
    }
    frontier.into_iter().max().unwrap_or(0)
}

fn collect_cuts(circuit: &Circuit, spans: Vec<FragmentSpan>) -> CutResult<CutPlan> {
    let mut plan = CutPlan {
        num_qubits: circuit.num_qubits(),
        spans,
        cuts: vec![],
    };
    for (gate_index, inst) in circuit.instructions().iter().enumerate() {
        let InstructionKind::Gate(gate) = &inst.kind else {
            continue;
        };
        let mut owners = inst.qubits.iter().filter_map(|q| plan.fragment_of(q.0));
        let Some(first) = owners.next() else {
            continue;
        };
        if owners.all(|f| f == first) {
            continue;
        }
        let rule = CutRule::for_gate(gate).filter(|_| inst.qubits.len() == 2).ok_or_else(|| {
            CutError::InfeasibleCut(format!(
                "gate '{}' at {gate_index} crosses fragments and cannot be cut",
                gate.name()
            ))
        })?;
        plan.cuts.push(CutLocation {
            gate_index,
            qubits: (inst.qubits[0].0, inst.qubits[1].0),
            gate: gate.clone(),
            rule,
        });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_ir::QubitId;

    fn chain(n: u32) -> Circuit {
        let mut c = Circuit::with_size("chain", n);
        c.h(QubitId(0)).unwrap();
        for q in 0..n - 1 {
            c.cx(QubitId(q), QubitId(q + 1)).unwrap();
        }
        c
    }

    fn constraints(max: u32, min: u32, cuts: usize) -> CutConstraints {
        CutConstraints {
            max_fragment_qubits: max,
            min_fragment_qubits: min,
            max_fragment_depth: None,
            max_cuts: cuts,
        }
    }

    #[test]
    fn test_small_circuit_is_not_cut() {
        let plan = select_cuts(&chain(4), &constraints(6, 3, 2)).unwrap();
        assert!(plan.is_trivial());
        assert_eq!(plan.spans().len(), 1);
    }

    #[test]
    fn test_chain_cut_once() {
        let plan = select_cuts(&chain(6), &constraints(3, 3, 2)).unwrap();
        assert_eq!(plan.spans().len(), 2);
        assert_eq!(plan.cuts().len(), 1);
        let cut = &plan.cuts()[0];
        assert_eq!(cut.qubits, (2, 3));
        assert_eq!(plan.cut_at(cut.gate_index), Some(0));
    }

    #[test]
    fn test_prefers_cheaper_boundary() {
        // Heavy traffic across 2|3, none across 3|4.
        let mut c = Circuit::with_size("skew", 7);
        for _ in 0..3 {
            c.cz(QubitId(2), QubitId(3)).unwrap();
        }
        c.cz(QubitId(4), QubitId(5)).unwrap();
        let plan = select_cuts(&c, &constraints(4, 3, 4)).unwrap();
        assert_eq!(plan.spans()[0], FragmentSpan { start: 0, width: 4 });
        assert_eq!(plan.cuts().len(), 0);
    }

    #[test]
    fn test_tie_broken_by_earliest_gate() {
        let plan = select_cuts(&chain(7), &constraints(4, 3, 4)).unwrap();
        // Both widths cut one gate; the 0..3 boundary cuts gate 3, earlier
        // than gate 4 at the 0..4 boundary.
        assert_eq!(plan.spans()[0].width, 3);
    }

    #[test]
    fn test_full_tie_prefers_wider_fragment() {
        let mut c = Circuit::with_size("islands", 7);
        c.cz(QubitId(0), QubitId(1)).unwrap();
        c.cz(QubitId(5), QubitId(6)).unwrap();
        let plan = select_cuts(&c, &constraints(4, 3, 4)).unwrap();
        assert_eq!(plan.spans()[0].width, 4);
        assert!(plan.cuts().is_empty());
    }

    #[test]
    fn test_too_many_cuts_is_infeasible() {
        let mut c = chain(6);
        c.cx(QubitId(2), QubitId(3)).unwrap();
        c.cx(QubitId(2), QubitId(3)).unwrap();
        let err = select_cuts(&c, &constraints(3, 3, 2)).unwrap_err();
        assert!(matches!(err, CutError::InfeasibleCut(_)));
    }

    #[test]
    fn test_swap_across_boundary_is_infeasible() {
        let mut c = Circuit::with_size("swap", 6);
        c.swap(QubitId(2), QubitId(3)).unwrap();
        let err = select_cuts(&c, &constraints(3, 3, 4)).unwrap_err();
        assert!(matches!(err, CutError::InfeasibleCut(_)));
    }

    #[test]
    fn test_empty_circuit_is_malformed() {
        let c = Circuit::with_size("empty", 8);
        let err = select_cuts(&c, &constraints(4, 3, 2)).unwrap_err();
        assert!(matches!(err, CutError::MalformedCircuit(_)));
    }

    #[test]
    fn test_depth_limit() {
        let mut c = chain(6);
        for _ in 0..5 {
            c.h(QubitId(0)).unwrap();
        }
        let mut tight = constraints(3, 3, 2);
        tight.max_fragment_depth = Some(4);
        assert!(matches!(
            select_cuts(&c, &tight).unwrap_err(),
            CutError::InfeasibleCut(_)
        ));
        tight.max_fragment_depth = Some(20);
        assert!(select_cuts(&c, &tight).is_ok());
    }

    #[test]
    fn test_fingerprint_is_structural() {
        let a = select_cuts(&chain(6), &constraints(3, 3, 2)).unwrap();
        let b = select_cuts(&chain(6), &constraints(3, 3, 2)).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = select_cuts(&chain(7), &constraints(4, 3, 2)).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_invalid_constraints() {
        let err = select_cuts(&chain(6), &constraints(2, 3, 2)).unwrap_err();
        assert!(matches!(err, CutError::ConfigValidation(_)));
    }
}
