//! Time-synchronous Viterbi beam search over a token tree.
//!
//! This module contains the token-passing decoder: tokens and their arena,
//! the per-order active lists and their manager, the alternate-hypothesis
//! bookkeeping that feeds the lattice, and the search manager that drives
//! the score/prune/grow cycle.

pub mod active_list;
pub mod alternates;
pub mod graph;
pub mod list_manager;
pub mod manager;
pub mod pruner;
pub mod result;
pub mod scorer;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use active_list::{ActiveList, ActiveListFactory, PurgePolicy};
pub use alternates::AlternateHypothesisManager;
pub use graph::{SearchGraph, StateArc, StateId, StateInfo, StateKind, Word};
pub use list_manager::ActiveListManager;
pub use manager::{SearchStats, WordPruningSearchManager};
pub use pruner::{Pruner, SimplePruner};
pub use result::DecodeResult;
pub use scorer::{AcousticScorer, ScorerOutcome, SequenceScorer};
pub use token::{Token, TokenArena, TokenId};
