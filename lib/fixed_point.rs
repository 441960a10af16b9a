//! A worklist fixpoint driver for forward flow analyses.
//!
//! The driver is intentionally small: the client supplies a [`FlowGraph`]
//! over opaque `u64` program points and a transfer function through
//! [`FixedPointAnalysis`], and gets back the stabilized lattice value at
//! every point. States are any [`Fact`], so a [`Tuple`](crate::tuple::Tuple)
//! or a [`DisjointTuple`](crate::disjoint::DisjointTuple) plugs in directly.
//!
//! A vertex with no computed state yet is passed to the transfer function as
//! `None`, which doubles as the encoding for "not known to be reachable".
//! Convergence is detected with [`Fact::at_least_as_precise`], not equality,
//! so lattices whose joins renormalize representations still terminate.

use crate::fact::Fact;
use crate::{Error, Result};
use log::trace;
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};

/// The control flow of the program fragment under analysis: opaque `u64`
/// vertices and directed edges.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    vertices: BTreeSet<u64>,
    successors: FxHashMap<u64, Vec<u64>>,
    predecessors: FxHashMap<u64, Vec<u64>>,
}

impl FlowGraph {
    pub fn new() -> FlowGraph {
        FlowGraph::default()
    }

    pub fn add_vertex(&mut self, vertex: u64) {
        if self.vertices.insert(vertex) {
            self.successors.insert(vertex, Vec::new());
            self.predecessors.insert(vertex, Vec::new());
        }
    }

    /// Add a directed edge. Both endpoints must already be vertices.
    /// Duplicate edges are ignored.
    pub fn add_edge(&mut self, head: u64, tail: u64) -> Result<()> {
        if !self.vertices.contains(&head) {
            return Err(Error::GraphVertex(head));
        }
        if !self.vertices.contains(&tail) {
            return Err(Error::GraphVertex(tail));
        }
        let successors = self.successors.get_mut(&head).ok_or(Error::GraphVertex(head))?;
        if !successors.contains(&tail) {
            successors.push(tail);
            self.predecessors
                .get_mut(&tail)
                .ok_or(Error::GraphVertex(tail))?
                .push(head);
        }
        Ok(())
    }

    pub fn has_vertex(&self, vertex: u64) -> bool {
        self.vertices.contains(&vertex)
    }

    /// All vertices, in ascending order.
    pub fn vertices(&self) -> impl Iterator<Item = u64> + '_ {
        self.vertices.iter().copied()
    }

    pub fn successors(&self, vertex: u64) -> Result<&[u64]> {
        self.successors
            .get(&vertex)
            .map(Vec::as_slice)
            .ok_or(Error::GraphVertex(vertex))
    }

    pub fn predecessors(&self, vertex: u64) -> Result<&[u64]> {
        self.predecessors
            .get(&vertex)
            .map(Vec::as_slice)
            .ok_or(Error::GraphVertex(vertex))
    }
}

/// A forward flow analysis the driver can run to a fixpoint.
pub trait FixedPointAnalysis<State: Fact> {
    /// Given the joined state flowing into `vertex`, compute the state
    /// flowing out of it.
    ///
    /// `state` is `None` when no predecessor has produced a state yet; entry
    /// vertices see `None` on every visit and must create their own initial
    /// state. The transfer function must be monotone or the iteration may
    /// not terminate.
    fn trans(&self, vertex: u64, state: Option<State>) -> Result<State>;
}

/// Iterate `analysis` over `graph` until every vertex's state stabilizes.
/// Returns the final state at each vertex.
pub fn fixed_point_forward<Analysis, State>(
    analysis: &Analysis,
    graph: &FlowGraph,
) -> Result<FxHashMap<u64, State>>
where
    Analysis: FixedPointAnalysis<State>,
    State: Fact,
{
    let mut states: FxHashMap<u64, State> = FxHashMap::default();
    let mut queue: VecDeque<u64> = graph.vertices().collect();

    while let Some(vertex) = queue.pop_front() {
        // Join the out states of all predecessors processed so far.
        let mut in_state: Option<State> = None;
        for predecessor in graph.predecessors(vertex)? {
            if let Some(state) = states.get(predecessor) {
                in_state = Some(match in_state {
                    Some(in_state) => in_state.join(state)?,
                    None => state.clone(),
                });
            }
        }

        let out_state = analysis.trans(vertex, in_state)?;

        if let Some(previous) = states.get(&vertex) {
            if out_state.at_least_as_precise(previous) {
                // Nothing new flows out of this vertex.
                continue;
            }
        }

        trace!("fixed point: vertex {} state changed, requeueing successors", vertex);

        states.insert(vertex, out_state);
        for successor in graph.successors(vertex)? {
            if !queue.contains(successor) {
                queue.push_back(*successor);
            }
        }
    }

    Ok(states)
}
