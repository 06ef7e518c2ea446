//! Viterbi losers kept around for lattice alternates.
//!
//! When two paths converge on the same word state in the same frame, only the
//! better one survives as the Viterbi predecessor; the others are recorded
//! here so the lattice can later offer them as alternate word hypotheses.

use std::collections::HashMap;

use crate::search::token::{TokenArena, TokenId};

/// Maps a word token to the predecessors that lost the Viterbi comparison
/// into it.
#[derive(Debug, Default)]
pub struct AlternateHypothesisManager {
    alternates: HashMap<TokenId, Vec<TokenId>>,
    max_edges: usize,
}

impl AlternateHypothesisManager {
    /// `max_edges` bounds the total in-edges per lattice node: the Viterbi
    /// predecessor plus at most `max_edges - 1` alternates survive `purge`.
    pub fn new(max_edges: usize) -> Self {
        Self {
            alternates: HashMap::new(),
            max_edges,
        }
    }

    /// Records `alternate` as a losing predecessor of `token`.
    ///
    /// The alternate must differ from the token's Viterbi predecessor; that
    /// would duplicate an edge.
    pub fn add_alternate_predecessor(
        &mut self,
        arena: &TokenArena,
        token: TokenId,
        alternate: TokenId,
    ) {
        debug_assert!(
            arena[token].predecessor() != Some(alternate),
            "alternate equals the viterbi predecessor"
        );
        self.alternates.entry(token).or_default().push(alternate);
    }

    /// The recorded losing predecessors of `token`, best first after `purge`.
    pub fn alternate_predecessors(&self, token: TokenId) -> Option<&[TokenId]> {
        self.alternates.get(&token).map(Vec::as_slice)
    }

    pub fn has_alternate_predecessors(&self, token: TokenId) -> bool {
        self.alternates.contains_key(&token)
    }

    /// Re-keys alternates from `old` to `new` when a word token is replaced
    /// on the frontier by a better-scoring one for the same state.
    pub fn change_successor(&mut self, new: TokenId, old: TokenId) {
        if let Some(list) = self.alternates.remove(&old) {
            self.alternates.insert(new, list);
        }
    }

    /// Sorts each alternate list by score descending and keeps the best
    /// `max_edges - 1` entries.
    pub fn purge(&mut self, arena: &TokenArena) {
        if self.max_edges == 0 {
            return;
        }
        let keep = self.max_edges - 1;
        for list in self.alternates.values_mut() {
            list.sort_by(|&a, &b| arena[b].score().total_cmp(&arena[a].score()));
            list.truncate(keep);
        }
    }
}
