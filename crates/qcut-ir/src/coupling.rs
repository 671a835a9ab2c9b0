//! Device connectivity: coupling maps and the named topologies of the grid.
//!
//! The cutting layer consults a [`CouplingMap`] twice: routing producers use
//! it to legalize two-qubit gates, and the connectivity predicate on
//! [`Circuit`](crate::Circuit) checks that a compiled circuit respects it.
//!
//! Maps are immutable once built. Construction runs one BFS per qubit and
//! stores hop counts plus the first hop towards every target, so routing
//! walks a shortest path without searching.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};

/// Undirected connectivity between the physical qubits of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingMap {
    /// Sorted neighbour list per physical qubit.
    neighbours: Vec<Vec<u32>>,
    /// `hops[a][b]`, `None` when unreachable.
    hops: Vec<Vec<Option<u32>>>,
    /// `toward[a][b]`: the qubit after `a` on a shortest path to `b`.
    toward: Vec<Vec<Option<u32>>>,
}

impl CouplingMap {
    /// Build from an edge list. Self-loops, repeats and pairs outside the
    /// register are dropped.
    pub fn from_edges(num_qubits: u32, edges: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let n = num_qubits as usize;
        let mut neighbours = vec![Vec::new(); n];
        for (a, b) in edges {
            if a != b && a < num_qubits && b < num_qubits {
                neighbours[a as usize].push(b);
                neighbours[b as usize].push(a);
            }
        }
        for list in &mut neighbours {
            list.sort_unstable();
            list.dedup();
        }

        let mut hops = vec![vec![None; n]; n];
        let mut toward = vec![vec![None; n]; n];
        for root in 0..n {
            let dist = &mut hops[root];
            dist[root] = Some(0);
            let mut queue = VecDeque::from([root]);
            while let Some(q) = queue.pop_front() {
                let Some(d) = dist[q] else { continue };
                for &nb in &neighbours[q] {
                    let nb = nb as usize;
                    if dist[nb].is_none() {
                        dist[nb] = Some(d + 1);
                        // Reached from q, so q is nb's first step back to root.
                        toward[nb][root] = Some(q as u32);
                        queue.push_back(nb);
                    }
                }
            }
        }

        Self {
            neighbours,
            hops,
            toward,
        }
    }

    /// 1D chain `0-1-2-…`.
    pub fn linear(n: u32) -> Self {
        Self::from_edges(n, (1..n).map(|i| (i - 1, i)))
    }

    /// Every pair coupled.
    pub fn full(n: u32) -> Self {
        Self::from_edges(n, (0..n).flat_map(|a| (a + 1..n).map(move |b| (a, b))))
    }

    /// `rows × cols` grid, row-major.
    pub fn grid(rows: u32, cols: u32) -> Self {
        let at = move |r: u32, c: u32| r * cols + c;
        let across = (0..rows).flat_map(move |r| (1..cols).map(move |c| (at(r, c - 1), at(r, c))));
        let down = (1..rows).flat_map(move |r| (0..cols).map(move |c| (at(r - 1, c), at(r, c))));
        Self::from_edges(rows * cols, across.chain(down))
    }

    /// Ring plus diametric chords: degree 3 for even `n ≥ 4`.
    ///
    /// Deterministic stand-in for a random 3-regular graph.
    pub fn sparse(n: u32) -> Self {
        let ring = (0..n).filter(|_| n >= 2).map(move |i| (i, (i + 1) % n));
        let chords = (0..n / 2).filter(|_| n >= 4).map(move |i| (i, i + n / 2));
        Self::from_edges(n, ring.chain(chords))
    }

    /// Physical qubits.
    pub fn num_qubits(&self) -> u32 {
        self.neighbours.len() as u32
    }

    /// Coupled pairs, each counted once.
    pub fn num_edges(&self) -> usize {
        self.neighbours.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn is_connected(&self, a: u32, b: u32) -> bool {
        self.neighbours
            .get(a as usize)
            .is_some_and(|list| list.binary_search(&b).is_ok())
    }

    pub fn degree(&self, qubit: u32) -> usize {
        self.neighbours.get(qubit as usize).map_or(0, Vec::len)
    }

    /// Hop count between two qubits.
    pub fn distance(&self, from: u32, to: u32) -> Option<u32> {
        *self.hops.get(from as usize)?.get(to as usize)?
    }

    /// Qubits on a shortest path, both ends included.
    pub fn shortest_path(&self, from: u32, to: u32) -> Option<Vec<u32>> {
        let steps = self.distance(from, to)?;
        let mut path = Vec::with_capacity(steps as usize + 1);
        path.push(from);
        let mut at = from;
        while at != to {
            at = self.toward[at as usize][to as usize]?;
            path.push(at);
        }
        Some(path)
    }
}

/// Named device topologies used by the experiment grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// 1D chain.
    Line,
    /// 2D grid, shape chosen from the qubit count.
    Grid,
    /// Sparse degree-3 connectivity.
    Sparse,
}

impl Topology {
    /// Build the coupling map of this topology for `n` qubits.
    ///
    /// Grid shapes pick the most square factorization (12 → 3x4, 10 → 2x5);
    /// prime sizes have no grid.
    pub fn coupling_map(self, n: u32) -> IrResult<CouplingMap> {
        match self {
            Topology::Line => Ok(CouplingMap::linear(n)),
            Topology::Sparse => Ok(CouplingMap::sparse(n)),
            Topology::Grid => {
                let rows = (2..=n)
                    .take_while(|r| r * r <= n)
                    .filter(|r| n % r == 0)
                    .last()
                    .ok_or_else(|| {
                        IrError::InvalidTopology(format!("no grid shape for {n} qubits"))
                    })?;
                Ok(CouplingMap::grid(rows, n / rows))
            }
        }
    }

    /// Largest contiguous qubit span one fragment may occupy on this topology
    /// for a device of `device_qubits`.
    ///
    /// A line exposes its whole length; a grid is cut row-aligned so a fragment
    /// spans whole rows; the sparse map is limited to half its size so each
    /// fragment stays on one side of the chords.
    pub fn max_contiguous_span(self, device_qubits: u32) -> IrResult<u32> {
        match self {
            Topology::Line => Ok(device_qubits),
            Topology::Sparse => Ok((device_qubits / 2).max(1)),
            Topology::Grid => {
                let map = self.coupling_map(device_qubits)?;
                // Row width is the degree-bounded column count of the first row.
                let cols = (1..device_qubits)
                    .take_while(|&c| map.is_connected(c - 1, c))
                    .count() as u32
                    + 1;
                Ok(cols.max(1))
            }
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topology::Line => "line",
            Topology::Grid => "grid",
            Topology::Sparse => "sparse",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Topology {
    type Err = IrError;

    fn from_str(s: &str) -> IrResult<Self> {
        match s.to_lowercase().as_str() {
            "line" => Ok(Topology::Line),
            "grid" => Ok(Topology::Grid),
            "sparse" => Ok(Topology::Sparse),
            other => Err(IrError::InvalidTopology(format!(
                "unknown topology '{other}', expected one of: line, grid, sparse"
            ))),
        }
    }
}
