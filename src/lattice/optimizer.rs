//! Lattice minimization by equivalent-node merging.
//!
//! Two nodes are forward equivalent when they carry the same word over the
//! same frames and receive edges from the same set of nodes; backward
//! equivalence is the mirror image over leaving edges. Merging equivalent
//! nodes never adds or removes a word path, it only folds duplicated paths
//! together, keeping the maximum of the duplicated edge scores.
//!
//! The passes run to a fixed point: merging two nodes can make their
//! neighbors equivalent in turn.

use tracing::debug;

use crate::lattice::edge::EdgeId;
use crate::lattice::graph::Lattice;
use crate::lattice::node::NodeId;

/// Merges equivalent nodes of a lattice in place.
pub struct LatticeOptimizer<'a> {
    lattice: &'a mut Lattice,
}

impl<'a> LatticeOptimizer<'a> {
    pub fn new(lattice: &'a mut Lattice) -> Self {
        Self { lattice }
    }

    /// Runs the forward and backward merge passes.
    pub fn optimize(&mut self) {
        let before = (self.lattice.num_nodes(), self.lattice.num_edges());
        self.optimize_forward();
        self.optimize_backward();
        debug!(
            nodes_before = before.0,
            edges_before = before.1,
            nodes_after = self.lattice.num_nodes(),
            edges_after = self.lattice.num_edges(),
            "optimized lattice"
        );
    }

    /// Merges forward-equivalent node pairs until none remain.
    pub fn optimize_forward(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for id in self.lattice.node_ids() {
                if self.lattice.has_node(&id) {
                    changed |= self.optimize_node_forward(&id);
                }
            }
        }
    }

    /// Merges backward-equivalent node pairs until none remain.
    pub fn optimize_backward(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for id in self.lattice.node_ids() {
                if self.lattice.has_node(&id) {
                    changed |= self.optimize_node_backward(&id);
                }
            }
        }
    }

    /// Scans the leaving edges of one node pairwise, merging destination
    /// nodes that are forward equivalent. Each merge invalidates the edge
    /// snapshot, so the scan restarts after every change.
    fn optimize_node_forward(&mut self, id: &NodeId) -> bool {
        let mut changed = false;
        let mut again = true;
        while again {
            again = false;
            let leaving = self.lattice.node(id).leaving_edges().to_vec();
            'scan: for (i, &e1) in leaving.iter().enumerate() {
                for &e2 in &leaving[i + 1..] {
                    let to1 = self.lattice.edge(e1).to_node().clone();
                    let to2 = self.lattice.edge(e2).to_node().clone();
                    if to1 == to2 {
                        self.merge_duplicate_edges(e1, e2);
                        changed = true;
                        again = true;
                        break 'scan;
                    }
                    if self.equivalent_nodes_forward(&to1, &to2) {
                        self.merge_nodes_forward(&to1, &to2);
                        changed = true;
                        again = true;
                        break 'scan;
                    }
                }
            }
        }
        changed
    }

    fn optimize_node_backward(&mut self, id: &NodeId) -> bool {
        let mut changed = false;
        let mut again = true;
        while again {
            again = false;
            let entering = self.lattice.node(id).entering_edges().to_vec();
            'scan: for (i, &e1) in entering.iter().enumerate() {
                for &e2 in &entering[i + 1..] {
                    let from1 = self.lattice.edge(e1).from_node().clone();
                    let from2 = self.lattice.edge(e2).from_node().clone();
                    if from1 == from2 {
                        self.merge_duplicate_edges(e1, e2);
                        changed = true;
                        again = true;
                        break 'scan;
                    }
                    if self.equivalent_nodes_backward(&from1, &from2) {
                        self.merge_nodes_backward(&from1, &from2);
                        changed = true;
                        again = true;
                        break 'scan;
                    }
                }
            }
        }
        changed
    }

    fn equivalent_words_and_times(&self, a: &NodeId, b: &NodeId) -> bool {
        let node_a = self.lattice.node(a);
        let node_b = self.lattice.node(b);
        node_a.word().spelling() == node_b.word().spelling()
            && self.lattice.node_begin_time(a) == self.lattice.node_begin_time(b)
            && node_a.end_time() == node_b.end_time()
    }

    fn equivalent_nodes_forward(&self, a: &NodeId, b: &NodeId) -> bool {
        self.equivalent_words_and_times(a, b) && self.lattice.has_equivalent_entering_edges(a, b)
    }

    fn equivalent_nodes_backward(&self, a: &NodeId, b: &NodeId) -> bool {
        self.equivalent_words_and_times(a, b) && self.lattice.has_equivalent_leaving_edges(a, b)
    }

    /// Folds two parallel edges between the same node pair into the first
    /// one, keeping the better score of each kind.
    fn merge_duplicate_edges(&mut self, keep: EdgeId, drop: EdgeId) {
        let (acoustic, lm) = {
            let e = self.lattice.edge(drop);
            (e.acoustic_score(), e.lm_score())
        };
        let edge = self.lattice.edge_mut(keep);
        edge.set_acoustic_score(edge.acoustic_score().max(acoustic));
        edge.set_lm_score(edge.lm_score().max(lm));
        self.lattice.remove_edge(drop);
    }

    /// Merges `other` into `keep`; callers must have established forward
    /// equivalence. `other`'s leaving edges move to `keep` (max-merged where
    /// a parallel edge already exists), the matching entering edges are
    /// max-merged, and `other` is removed.
    fn merge_nodes_forward(&mut self, keep: &NodeId, other: &NodeId) {
        debug!(keep = %keep, other = %other, "merging forward equivalent nodes");
        for e2 in self.lattice.node(other).leaving_edges().to_vec() {
            let (to, acoustic, lm) = {
                let edge = self.lattice.edge(e2);
                (edge.to_node().clone(), edge.acoustic_score(), edge.lm_score())
            };
            match self.lattice.find_edge_between(keep, &to) {
                Some(e1) => {
                    let edge = self.lattice.edge_mut(e1);
                    edge.set_acoustic_score(edge.acoustic_score().max(acoustic));
                    edge.set_lm_score(edge.lm_score().max(lm));
                }
                None => {
                    self.lattice.add_edge(keep, &to, acoustic, lm);
                }
            }
        }
        for e2 in self.lattice.node(other).entering_edges().to_vec() {
            let (from, acoustic, lm) = {
                let edge = self.lattice.edge(e2);
                (edge.from_node().clone(), edge.acoustic_score(), edge.lm_score())
            };
            let e1 = match self.lattice.find_edge_between(&from, keep) {
                Some(e1) => e1,
                None => panic!("forward merge of nodes without equivalent entering edges"),
            };
            let edge = self.lattice.edge_mut(e1);
            edge.set_acoustic_score(edge.acoustic_score().max(acoustic));
            edge.set_lm_score(edge.lm_score().max(lm));
        }
        self.lattice.remove_node_and_edges(other);
    }

    fn merge_nodes_backward(&mut self, keep: &NodeId, other: &NodeId) {
        debug!(keep = %keep, other = %other, "merging backward equivalent nodes");
        for e2 in self.lattice.node(other).entering_edges().to_vec() {
            let (from, acoustic, lm) = {
                let edge = self.lattice.edge(e2);
                (edge.from_node().clone(), edge.acoustic_score(), edge.lm_score())
            };
            match self.lattice.find_edge_between(&from, keep) {
                Some(e1) => {
                    let edge = self.lattice.edge_mut(e1);
                    edge.set_acoustic_score(edge.acoustic_score().max(acoustic));
                    edge.set_lm_score(edge.lm_score().max(lm));
                }
                None => {
                    self.lattice.add_edge(&from, keep, acoustic, lm);
                }
            }
        }
        for e2 in self.lattice.node(other).leaving_edges().to_vec() {
            let (to, acoustic, lm) = {
                let edge = self.lattice.edge(e2);
                (edge.to_node().clone(), edge.acoustic_score(), edge.lm_score())
            };
            let e1 = match self.lattice.find_edge_between(keep, &to) {
                Some(e1) => e1,
                None => panic!("backward merge of nodes without equivalent leaving edges"),
            };
            let edge = self.lattice.edge_mut(e1);
            edge.set_acoustic_score(edge.acoustic_score().max(acoustic));
            edge.set_lm_score(edge.lm_score().max(lm));
        }
        self.lattice.remove_node_and_edges(other);
    }

    /// Removes nodes no path can reach or leave: every node other than the
    /// initial one needs an entering edge, every node other than the terminal
    /// one needs a leaving edge. Runs to a fixed point since each removal can
    /// strand further nodes.
    pub fn remove_hanging_nodes(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for id in self.lattice.node_ids() {
                if !self.lattice.has_node(&id) {
                    continue;
                }
                let is_initial = self.lattice.initial_node() == Some(&id);
                let is_terminal = self.lattice.terminal_node() == Some(&id);
                let node = self.lattice.node(&id);
                let hanging = (!is_initial && node.entering_edges().is_empty())
                    || (!is_terminal && node.leaving_edges().is_empty());
                if hanging {
                    debug!(node = %id, "removing hanging node");
                    self.lattice.remove_node_and_edges(&id);
                    changed = true;
                }
            }
        }
    }
}
