//! Lattice nodes.

use std::fmt;
use std::sync::Arc;

use crate::lattice::edge::EdgeId;
use crate::logmath::LogMath;
use crate::search::graph::Word;

/// Identifier of a lattice node, stable across dump/load round trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The hypothesis that a word was spoken over a span of frames.
///
/// Forward, backward, posterior and Viterbi scores are populated by
/// [`Lattice::compute_node_posteriors`](crate::lattice::Lattice::compute_node_posteriors)
/// and are `LOG_ZERO` before that.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    word: Word,
    /// First frame of the word; -1 when unknown (derived from predecessors).
    begin_time: i32,
    /// Last frame of the word; -1 when unknown.
    end_time: i32,
    entering: Vec<EdgeId>,
    leaving: Vec<EdgeId>,
    forward_score: f64,
    backward_score: f64,
    posterior: f64,
    viterbi_score: f64,
    best_predecessor: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, word: Word, begin_time: i32, end_time: i32) -> Self {
        Self {
            id,
            word,
            begin_time,
            end_time,
            entering: Vec::new(),
            leaving: Vec::new(),
            forward_score: LogMath::LOG_ZERO as f64,
            backward_score: LogMath::LOG_ZERO as f64,
            posterior: LogMath::LOG_ZERO as f64,
            viterbi_score: LogMath::LOG_ZERO as f64,
            best_predecessor: None,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn word(&self) -> &Word {
        &self.word
    }

    /// Stored begin time; -1 when it must be derived from predecessors.
    pub fn raw_begin_time(&self) -> i32 {
        self.begin_time
    }

    pub fn end_time(&self) -> i32 {
        self.end_time
    }

    pub fn entering_edges(&self) -> &[EdgeId] {
        &self.entering
    }

    pub fn leaving_edges(&self) -> &[EdgeId] {
        &self.leaving
    }

    pub fn forward_score(&self) -> f64 {
        self.forward_score
    }

    pub fn backward_score(&self) -> f64 {
        self.backward_score
    }

    pub fn posterior(&self) -> f64 {
        self.posterior
    }

    pub fn viterbi_score(&self) -> f64 {
        self.viterbi_score
    }

    pub fn best_predecessor(&self) -> Option<&NodeId> {
        self.best_predecessor.as_ref()
    }

    pub(crate) fn add_entering_edge(&mut self, edge: EdgeId) {
        self.entering.push(edge);
    }

    pub(crate) fn add_leaving_edge(&mut self, edge: EdgeId) {
        self.leaving.push(edge);
    }

    pub(crate) fn remove_entering_edge(&mut self, edge: EdgeId) {
        self.entering.retain(|&e| e != edge);
    }

    pub(crate) fn remove_leaving_edge(&mut self, edge: EdgeId) {
        self.leaving.retain(|&e| e != edge);
    }

    pub(crate) fn set_forward_score(&mut self, score: f64) {
        self.forward_score = score;
    }

    pub(crate) fn set_backward_score(&mut self, score: f64) {
        self.backward_score = score;
    }

    pub(crate) fn set_posterior(&mut self, posterior: f64) {
        self.posterior = posterior;
    }

    pub(crate) fn set_viterbi_score(&mut self, score: f64) {
        self.viterbi_score = score;
    }

    pub(crate) fn set_best_predecessor(&mut self, predecessor: Option<NodeId>) {
        self.best_predecessor = predecessor;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node({},{}|{})",
            self.word.spelling(),
            self.begin_time,
            self.end_time
        )
    }
}
