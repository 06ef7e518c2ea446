//! Lattice edges.

use std::fmt;

use crate::lattice::node::NodeId;

/// Index of an edge inside its lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

/// A word-to-word transition carrying the collapsed acoustic and language
/// scores of the token run between the two words.
#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    from: NodeId,
    to: NodeId,
    acoustic_score: f64,
    lm_score: f64,
}

impl Edge {
    pub(crate) fn new(
        id: EdgeId,
        from: NodeId,
        to: NodeId,
        acoustic_score: f64,
        lm_score: f64,
    ) -> Self {
        Self {
            id,
            from,
            to,
            acoustic_score,
            lm_score,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn from_node(&self) -> &NodeId {
        &self.from
    }

    pub fn to_node(&self) -> &NodeId {
        &self.to
    }

    pub fn acoustic_score(&self) -> f64 {
        self.acoustic_score
    }

    pub fn lm_score(&self) -> f64 {
        self.lm_score
    }

    pub fn set_acoustic_score(&mut self, score: f64) {
        self.acoustic_score = score;
    }

    pub fn set_lm_score(&mut self, score: f64) {
        self.lm_score = score;
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Edge({} --> {} [{},{}])",
            self.from, self.to, self.acoustic_score, self.lm_score
        )
    }
}
