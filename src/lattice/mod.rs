//! Word lattices built from a completed decode.
//!
//! A lattice is a directed acyclic word graph with a single initial and a
//! single terminal node. It is built from the surviving token tree plus the
//! Viterbi losers recorded during search, can be scored with a
//! forward-backward pass, minimized by equivalent-node merging, and
//! round-tripped through the `.LAT` text format.

mod edge;
mod graph;
mod node;
mod optimizer;

pub use edge::{Edge, EdgeId};
pub use graph::Lattice;
pub use node::{Node, NodeId};
pub use optimizer::LatticeOptimizer;
