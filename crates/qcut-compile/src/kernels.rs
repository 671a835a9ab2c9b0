//! Logical benchmark kernels.

use std::f64::consts::PI;

use qcut_core::{CutResult, Kernel, KernelSource};
use qcut_ir::{Circuit, QubitId};

use crate::error::{CompileError, CompileResult};

/// Entangling layers of the hardware-efficient ansatz.
pub const HEA_LAYERS: usize = 6;

/// Grover iterations per kernel.
pub const GROVER_ITERATIONS: usize = 2;

/// Quantum Fourier transform without the final qubit reversal.
///
/// Qubit `j` receives a Hadamard followed by controlled phases
/// `CP(π / 2^(j-k))` from every lower qubit `k`.
pub fn qft(n: u32) -> CompileResult<Circuit> {
    check_width("qft", n, 2)?;
    let mut c = Circuit::with_size(format!("qft_{n}"), n);
    for j in (0..n).rev() {
        c.h(QubitId(j))?;
        for k in (0..j).rev() {
            let angle = PI / f64::from(1u32 << (j - k).min(31));
            c.cp(angle, QubitId(j), QubitId(k))?;
        }
    }
    Ok(c)
}

/// Hardware-efficient ansatz with fixed angles.
///
/// Layer `l` applies `Rz(0.1(l+1)) · SX · Rz(0.2(l+1))` on every qubit, then
/// CX entanglers on even pairs for even layers and odd pairs for odd layers.
pub fn hea(n: u32, layers: usize) -> CompileResult<Circuit> {
    check_width("hea", n, 2)?;
    let mut c = Circuit::with_size(format!("hea_{n}_l{layers}"), n);
    for l in 0..layers {
        let scale = (l + 1) as f64;
        for q in 0..n {
            c.rz(0.1 * scale, QubitId(q))?;
            c.sx(QubitId(q))?;
            c.rz(0.2 * scale, QubitId(q))?;
        }
        let start = (l % 2) as u32;
        for q in (start..n - 1).step_by(2) {
            c.cx(QubitId(q), QubitId(q + 1))?;
        }
    }
    Ok(c)
}

/// GHZ preparation: Hadamard on qubit 0, then a CX chain.
pub fn ghz(n: u32) -> CompileResult<Circuit> {
    check_width("ghz", n, 2)?;
    let mut c = Circuit::with_size(format!("ghz_{n}"), n);
    c.h(QubitId(0))?;
    for q in 0..n - 1 {
        c.cx(QubitId(q), QubitId(q + 1))?;
    }
    Ok(c)
}

/// Grover search for the all-ones string on the low `m = (n + 3) / 2` qubits.
///
/// Oracle and diffusion each apply a multi-controlled Z built as a Toffoli
/// ladder through the `m - 3` clean ancillas above the search register.
/// Ancillas return to zero; a leftover qubit idles.
pub fn grover(n: u32, iterations: usize) -> CompileResult<Circuit> {
    check_width("grover", n, 3)?;
    let m = (n + 3) / 2;
    let search: Vec<QubitId> = (0..m).map(QubitId).collect();
    let ancillas: Vec<QubitId> = (m..2 * m - 3).map(QubitId).collect();
    let mut c = Circuit::with_size(format!("grover_{n}_i{iterations}"), n);
    for &q in &search {
        c.h(q)?;
    }
    for _ in 0..iterations {
        mcz(&mut c, &search, &ancillas)?;
        for &q in &search {
            c.h(q)?;
            c.x(q)?;
        }
        mcz(&mut c, &search, &ancillas)?;
        for &q in &search {
            c.x(q)?;
            c.h(q)?;
        }
    }
    Ok(c)
}

fn mcz(c: &mut Circuit, qubits: &[QubitId], ancillas: &[QubitId]) -> CompileResult<()> {
    let Some((&target, controls)) = qubits.split_last() else {
        return Ok(());
    };
    c.h(target)?;
    toffoli_ladder(c, controls, ancillas, target)?;
    c.h(target)?;
    Ok(())
}

/// Multi-controlled X with `controls.len() - 2` ancillas, uncomputed after.
fn toffoli_ladder(
    c: &mut Circuit,
    controls: &[QubitId],
    ancillas: &[QubitId],
    target: QubitId,
) -> CompileResult<()> {
    let k = controls.len();
    if k == 2 {
        c.ccx(controls[0], controls[1], target)?;
        return Ok(());
    }
    let chain = &ancillas[..k - 2];
    c.ccx(controls[0], controls[1], chain[0])?;
    for i in 2..k - 1 {
        c.ccx(controls[i], chain[i - 2], chain[i - 1])?;
    }
    c.ccx(controls[k - 1], chain[k - 3], target)?;
    for i in (2..k - 1).rev() {
        c.ccx(controls[i], chain[i - 2], chain[i - 1])?;
    }
    c.ccx(controls[0], controls[1], chain[0])?;
    Ok(())
}

fn check_width(name: &str, n: u32, min: u32) -> CompileResult<()> {
    if n < min {
        return Err(CompileError::InvalidKernel(format!(
            "{name} needs at least {min} qubits, got {n}"
        )));
    }
    Ok(())
}

/// The grid's kernels, built on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardKernels;

impl KernelSource for StandardKernels {
    fn build(&self, kernel: Kernel, num_qubits: u32) -> CutResult<Circuit> {
        let circuit = match kernel {
            Kernel::Qft => qft(num_qubits)?,
            Kernel::Hea => hea(num_qubits, HEA_LAYERS)?,
            Kernel::Ghz => ghz(num_qubits)?,
            Kernel::Grover => grover(num_qubits, GROVER_ITERATIONS)?,
        };
        Ok(circuit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qft_gate_counts() {
        let c = qft(12).unwrap();
        let ops = c.count_ops();
        assert_eq!(ops["h"], 12);
        assert_eq!(ops["cp"], 66);
        assert_eq!(c.num_two_qubit_gates(), 66);
    }

    #[test]
    fn test_hea_brickwork() {
        let c = hea(10, HEA_LAYERS).unwrap();
        // 5 even pairs on layers 0, 2, 4 and 4 odd pairs on layers 1, 3, 5.
        assert_eq!(c.num_two_qubit_gates(), 27);
        assert_eq!(c.count_ops()["sx"], 60);
        assert!(c.instructions().iter().filter(|i| i.is_two_qubit_gate()).all(|i| {
            i.qubits[1].0 == i.qubits[0].0 + 1
        }));
    }

    #[test]
    fn test_ghz_chain() {
        let c = ghz(10).unwrap();
        assert_eq!(c.depth(), 10);
        assert_eq!(c.num_two_qubit_gates(), 9);
    }

    #[test]
    fn test_grover_ladder() {
        let c = grover(10, GROVER_ITERATIONS).unwrap();
        let ops = c.count_ops();
        // Six search qubits: five controls, three ancillas, seven Toffolis per ladder.
        assert_eq!(ops["ccx"], 2 * 2 * 7);
        assert_eq!(c.num_two_qubit_gates(), 0);
        assert!(c.instructions().iter().all(|i| i.qubits.iter().all(|q| q.0 < 9)));

        let small = grover(5, 1).unwrap();
        assert_eq!(small.count_ops()["ccx"], 2 * 3);
        assert_eq!(grover(3, 1).unwrap().count_ops()["ccx"], 2);
        assert!(grover(2, 1).is_err());
    }

    #[test]
    fn test_kernel_source() {
        let c = StandardKernels.build(Kernel::Qft, 4).unwrap();
        assert_eq!(c.num_qubits(), 4);
        assert!(StandardKernels.build(Kernel::Ghz, 1).is_err());
    }
}
