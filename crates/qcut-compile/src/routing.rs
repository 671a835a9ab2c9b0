//! SWAP routing onto a coupling map.
//!
//! Instructions are replayed in program order. A two-qubit gate whose
//! operands are not adjacent moves one operand along a shortest path with
//! SWAPs, each expanded into three CX gates, until the pair is coupled.
//! Single-qubit instructions, signed measurements and cut markers follow
//! their logical qubit through the evolving layout. Toffolis are lowered to
//! their six-CX Clifford+T network first and each CX is routed on its own.
//!
//! [`SwapRouter`] compiles `k` candidates: the first starts from the trivial
//! layout and always moves the first operand; the others start from a
//! seeded random placement and pick the moving operand at random. The
//! candidate with the lowest `(depth, two-qubit gates, size)` wins, earlier
//! candidates winning ties.

use qcut_core::sampling::mix;
use qcut_core::{CircuitCompiler, CompiledCircuit, CutResult};
use qcut_ir::{Circuit, CouplingMap, Instruction, QubitId, StandardGate};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument};

use crate::error::{CompileError, CompileResult};

/// Bidirectional logical ↔ physical qubit map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    logical_to_physical: Vec<u32>,
    physical_to_logical: Vec<Option<u32>>,
}

impl Layout {
    /// Logical `i` on physical `i`.
    pub fn trivial(logical: u32, physical: u32) -> Self {
        Self::from_placement((0..logical).collect(), physical)
    }

    /// Logical `i` on physical `placement[i]`.
    pub fn from_placement(placement: Vec<u32>, physical: u32) -> Self {
        let mut physical_to_logical = vec![None; physical as usize];
        for (l, &p) in placement.iter().enumerate() {
            physical_to_logical[p as usize] = Some(l as u32);
        }
        Self {
            logical_to_physical: placement,
            physical_to_logical,
        }
    }

    /// Seeded random placement of `logical` qubits on `physical` slots.
    pub fn random<R: Rng + ?Sized>(logical: u32, physical: u32, rng: &mut R) -> Self {
        let mut slots: Vec<u32> = (0..physical).collect();
        slots.shuffle(rng);
        slots.truncate(logical as usize);
        Self::from_placement(slots, physical)
    }

    /// Physical home of a logical qubit.
    pub fn physical(&self, logical: QubitId) -> u32 {
        self.logical_to_physical[logical.index()]
    }

    /// Exchange the contents of two physical qubits.
    pub fn swap(&mut self, p1: u32, p2: u32) {
        let (a, b) = (p1 as usize, p2 as usize);
        self.physical_to_logical.swap(a, b);
        for p in [p1, p2] {
            if let Some(l) = self.physical_to_logical[p as usize] {
                self.logical_to_physical[l as usize] = p;
            }
        }
    }

    /// Final logical → physical map.
    pub fn into_vec(self) -> Vec<u32> {
        self.logical_to_physical
    }
}

/// Route `circuit` from `layout`, optionally randomizing which operand moves.
pub fn route(
    circuit: &Circuit,
    coupling: &CouplingMap,
    mut layout: Layout,
    mut rng: Option<&mut SmallRng>,
) -> CompileResult<CompiledCircuit> {
    let mut out = Circuit::with_size(circuit.name(), coupling.num_qubits());

    for inst in circuit.instructions() {
        if matches!(inst.as_gate(), Some(StandardGate::CCX)) {
            let [a, b, c] = [inst.qubits[0], inst.qubits[1], inst.qubits[2]];
            for step in toffoli_network(a, b, c) {
                place(&mut out, &step, coupling, &mut layout, rng.as_deref_mut())?;
            }
        } else {
            place(&mut out, inst, coupling, &mut layout, rng.as_deref_mut())?;
        }
    }

    Ok(CompiledCircuit {
        circuit: out,
        layout: layout.into_vec(),
    })
}

fn place(
    out: &mut Circuit,
    inst: &Instruction,
    coupling: &CouplingMap,
    layout: &mut Layout,
    rng: Option<&mut SmallRng>,
) -> CompileResult<()> {
    if inst.is_two_qubit_gate() {
        let (p0, p1) = (layout.physical(inst.qubits[0]), layout.physical(inst.qubits[1]));
        if !coupling.is_connected(p0, p1) {
            let move_first = rng.is_none_or(|r| r.gen_bool(0.5));
            let (from, to) = if move_first { (p0, p1) } else { (p1, p0) };
            let path = coupling
                .shortest_path(from, to)
                .ok_or(CompileError::RoutingFailed {
                    qubit1: from,
                    qubit2: to,
                })?;
            for hop in path.windows(2).take(path.len().saturating_sub(2)) {
                emit_swap(out, hop[0], hop[1])?;
                layout.swap(hop[0], hop[1]);
            }
        }
    }
    out.push(Instruction {
        kind: inst.kind.clone(),
        qubits: inst
            .qubits
            .iter()
            .map(|&q| QubitId(layout.physical(q)))
            .collect(),
    })?;
    Ok(())
}

/// Toffoli on controls `a`, `b` and target `c` as six CX and Clifford+T.
fn toffoli_network(a: QubitId, b: QubitId, c: QubitId) -> [Instruction; 15] {
    let one = Instruction::single_qubit_gate;
    let cx = |x, y| Instruction::two_qubit_gate(StandardGate::CX, x, y);
    [
        one(StandardGate::H, c),
        cx(b, c),
        one(StandardGate::Tdg, c),
        cx(a, c),
        one(StandardGate::T, c),
        cx(b, c),
        one(StandardGate::Tdg, c),
        cx(a, c),
        one(StandardGate::T, b),
        one(StandardGate::T, c),
        one(StandardGate::H, c),
        cx(a, b),
        one(StandardGate::T, a),
        one(StandardGate::Tdg, b),
        cx(a, b),
    ]
}

fn emit_swap(out: &mut Circuit, a: u32, b: u32) -> CompileResult<()> {
    let (qa, qb) = (QubitId(a), QubitId(b));
    out.push(Instruction::two_qubit_gate(StandardGate::CX, qa, qb))?;
    out.push(Instruction::two_qubit_gate(StandardGate::CX, qb, qa))?;
    out.push(Instruction::two_qubit_gate(StandardGate::CX, qa, qb))?;
    Ok(())
}

/// Lexicographic candidate score; lower is better.
pub fn score(circuit: &Circuit) -> (usize, usize, usize) {
    (circuit.depth(), circuit.num_two_qubit_gates(), circuit.size())
}

/// Best-of-k SWAP router.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapRouter;

impl SwapRouter {
    /// Compile `k` candidates and keep the best.
    #[instrument(skip_all, fields(circuit = circuit.name(), k = best_of_k))]
    pub fn best_of_k(
        &self,
        circuit: &Circuit,
        coupling: &CouplingMap,
        best_of_k: usize,
        seed: u64,
    ) -> CompileResult<CompiledCircuit> {
        let (logical, physical) = (circuit.num_qubits(), coupling.num_qubits());
        if logical > physical {
            return Err(CompileError::CircuitTooLarge {
                required: logical,
                available: physical,
            });
        }
        let mut best = route(circuit, coupling, Layout::trivial(logical, physical), None)?;
        let mut best_score = score(&best.circuit);
        for trial in 1..best_of_k.max(1) {
            let mut rng = SmallRng::seed_from_u64(mix(&[seed, trial as u64]));
            let start = Layout::random(logical, physical, &mut rng);
            let candidate = route(circuit, coupling, start, Some(&mut rng))?;
            let s = score(&candidate.circuit);
            debug!(trial, depth = s.0, twoq = s.1, size = s.2, "candidate routed");
            if s < best_score {
                best = candidate;
                best_score = s;
            }
        }
        debug!(depth = best_score.0, twoq = best_score.1, "route selected");
        Ok(best)
    }
}

impl CircuitCompiler for SwapRouter {
    fn compile(
        &self,
        circuit: &Circuit,
        coupling: &CouplingMap,
        best_of_k: usize,
        seed: u64,
    ) -> CutResult<CompiledCircuit> {
        Ok(self.best_of_k(circuit, coupling, best_of_k, seed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcut_ir::CutSide;

    #[test]
    fn test_adjacent_gate_needs_no_swap() {
        let mut c = Circuit::with_size("pair", 2);
        c.h(QubitId(0)).unwrap();
        c.cx(QubitId(0), QubitId(1)).unwrap();
        let out = SwapRouter.best_of_k(&c, &CouplingMap::linear(5), 1, 0).unwrap();
        assert_eq!(out.circuit.size(), 2);
        assert_eq!(out.circuit.num_qubits(), 5);
        assert_eq!(out.layout, vec![0, 1]);
    }

    #[test]
    fn test_distant_gate_gets_swaps() {
        let mut c = Circuit::with_size("far", 3);
        c.cx(QubitId(0), QubitId(2)).unwrap();
        let out = SwapRouter.best_of_k(&c, &CouplingMap::linear(3), 1, 0).unwrap();
        // One SWAP as three CX, then the gate.
        assert_eq!(out.circuit.num_two_qubit_gates(), 4);
        assert!(out.circuit.satisfies_connectivity(&CouplingMap::linear(3)));
        assert_eq!(out.layout, vec![1, 0, 2]);
    }

    #[test]
    fn test_markers_follow_their_qubit() {
        let mut c = Circuit::with_size("marked", 3);
        c.cx(QubitId(0), QubitId(2)).unwrap();
        c.cut_marker(0, CutSide::A, QubitId(0)).unwrap();
        c.signed_measure(QubitId(2)).unwrap();
        let out = SwapRouter.best_of_k(&c, &CouplingMap::linear(3), 1, 0).unwrap();
        let tail: Vec<_> = out.circuit.instructions().iter().rev().take(2).collect();
        assert_eq!(tail[0].qubits, vec![QubitId(out.layout[2])]);
        assert!(tail[1].is_cut_marker());
        assert_eq!(tail[1].qubits, vec![QubitId(out.layout[0])]);
    }

    #[test]
    fn test_toffoli_lowered_on_a_line() {
        let mut c = Circuit::with_size("tof", 3);
        c.ccx(QubitId(0), QubitId(1), QubitId(2)).unwrap();
        let line = CouplingMap::linear(3);
        let out = SwapRouter.best_of_k(&c, &line, 1, 0).unwrap();
        let ops = out.circuit.count_ops();
        assert!(!ops.contains_key("ccx"));
        assert_eq!(ops["t"] + ops["tdg"], 7);
        assert!(ops["cx"] > 6);
        assert!(out.circuit.satisfies_connectivity(&line));

        let full = SwapRouter.best_of_k(&c, &CouplingMap::full(3), 1, 0).unwrap();
        assert_eq!(full.circuit.num_two_qubit_gates(), 6);
        assert_eq!(full.layout, vec![0, 1, 2]);
    }

    #[test]
    fn test_too_wide() {
        let c = Circuit::with_size("wide", 6);
        let err = SwapRouter.best_of_k(&c, &CouplingMap::linear(4), 1, 0).unwrap_err();
        assert!(matches!(err, CompileError::CircuitTooLarge { .. }));
    }

    #[test]
    fn test_layout_swap_tracks_empty_slots() {
        let mut layout = Layout::trivial(2, 4);
        layout.swap(1, 3);
        assert_eq!(layout.physical(QubitId(1)), 3);
        layout.swap(0, 1);
        assert_eq!(layout.physical(QubitId(0)), 1);
        assert_eq!(layout.into_vec(), vec![1, 3]);
    }
}
