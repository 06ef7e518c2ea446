//! Active lists: the per-frame search frontier, one list per state order class.
//!
//! An active list is a bag of token ids with a cached best score, an absolute
//! width (hard cap applied at purge time) and a relative width (a non-positive
//! log offset below the best score; tokens outside it are dropped while
//! growing). Adding never prunes; all capacity enforcement happens in `purge`.

use tracing::debug;

use crate::logmath::LogMath;
use crate::search::token::{TokenArena, TokenId};

/// How `purge` thins a list once it is over the absolute width.
#[derive(Debug, Clone, PartialEq)]
pub enum PurgePolicy {
    /// Keep the highest-scoring tokens, nothing else considered.
    Score,
    /// Word-list policy: additionally cap the number of surviving paths per
    /// distinct word and the number of surviving filler words.
    WordDedup {
        max_paths_per_word: usize,
        max_filler_words: usize,
    },
}

/// A bag of tokens for one state order class.
#[derive(Debug)]
pub struct ActiveList {
    tokens: Vec<TokenId>,
    best_score: f32,
    best_token: Option<TokenId>,
    absolute_width: usize,
    relative_width: f32,
    policy: PurgePolicy,
}

impl ActiveList {
    fn new(absolute_width: usize, relative_width: f32, policy: PurgePolicy) -> Self {
        debug_assert!(relative_width <= 0.0, "relative width is a log offset");
        Self {
            tokens: Vec::new(),
            best_score: LogMath::LOG_ZERO,
            best_token: None,
            absolute_width,
            relative_width,
            policy,
        }
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.tokens.iter().copied()
    }

    pub fn token_ids(&self) -> &[TokenId] {
        &self.tokens
    }

    /// Best-scoring token seen so far, tracked incrementally.
    pub fn best_token(&self) -> Option<TokenId> {
        self.best_token
    }

    pub fn best_score(&self) -> f32 {
        self.best_score
    }

    /// Scores below this are outside the relative beam.
    pub fn beam_threshold(&self) -> f32 {
        if self.best_token.is_none() {
            LogMath::LOG_ZERO
        } else {
            self.best_score + self.relative_width
        }
    }

    /// Adds a token without any pruning, recording its slot for O(1) replace.
    pub fn add(&mut self, arena: &mut TokenArena, token: TokenId) {
        let slot = self.tokens.len();
        self.tokens.push(token);
        arena[token].set_location(Some(slot));
        let score = arena[token].score();
        if score > self.best_score {
            self.best_score = score;
            self.best_token = Some(token);
        }
    }

    /// Swaps `new` into the slot `old` occupies. Panics if `old` is not in
    /// this list; that is a routing defect, not a runtime condition.
    pub fn replace(&mut self, arena: &mut TokenArena, old: TokenId, new: TokenId) {
        let slot = arena[old]
            .location()
            .expect("replaced token has no active list slot");
        assert_eq!(self.tokens[slot], old, "token slot out of sync");
        self.tokens[slot] = new;
        arena[old].set_location(None);
        arena[new].set_location(Some(slot));
        let score = arena[new].score();
        if score > self.best_score {
            self.best_score = score;
            self.best_token = Some(new);
        }
    }

    /// Enforces the absolute width (and the word-dedup caps, if configured).
    ///
    /// Sorts by score descending, applies the policy, truncates, and rewrites
    /// the surviving tokens' slot indices. A no-op when the width is zero
    /// (unbounded) or the list fits.
    pub fn purge(mut self, arena: &mut TokenArena) -> Self {
        let needs_dedup = matches!(self.policy, PurgePolicy::WordDedup { .. });
        if !needs_dedup && (self.absolute_width == 0 || self.tokens.len() <= self.absolute_width) {
            return self;
        }

        self.tokens
            .sort_by(|&a, &b| arena[b].score().total_cmp(&arena[a].score()));

        let kept = match self.policy {
            PurgePolicy::Score => {
                if self.absolute_width > 0 {
                    self.tokens.len().min(self.absolute_width)
                } else {
                    self.tokens.len()
                }
            }
            PurgePolicy::WordDedup {
                max_paths_per_word,
                max_filler_words,
            } => {
                let mut survivors = Vec::with_capacity(self.tokens.len());
                let mut word_counts: std::collections::HashMap<String, usize> =
                    std::collections::HashMap::new();
                let mut filler_count = 0usize;
                for &id in &self.tokens {
                    let keep = match arena[id].word() {
                        Some(word) => {
                            if word.is_filler() && filler_count >= max_filler_words {
                                false
                            } else {
                                let count =
                                    word_counts.entry(word.spelling().to_owned()).or_insert(0);
                                if *count >= max_paths_per_word {
                                    false
                                } else {
                                    *count += 1;
                                    if word.is_filler() {
                                        filler_count += 1;
                                    }
                                    true
                                }
                            }
                        }
                        None => true,
                    };
                    if keep {
                        survivors.push(id);
                    } else {
                        arena[id].set_location(None);
                    }
                }
                self.tokens = survivors;
                if self.absolute_width > 0 {
                    self.tokens.len().min(self.absolute_width)
                } else {
                    self.tokens.len()
                }
            }
        };

        if kept < self.tokens.len() {
            debug!(
                before = self.tokens.len(),
                after = kept,
                "purged active list"
            );
            for &id in &self.tokens[kept..] {
                arena[id].set_location(None);
            }
            self.tokens.truncate(kept);
        }

        for (slot, &id) in self.tokens.iter().enumerate() {
            arena[id].set_location(Some(slot));
        }
        self
    }

    /// A fresh empty list with the same beam parameters and policy.
    pub fn new_instance(&self) -> Self {
        Self::new(self.absolute_width, self.relative_width, self.policy.clone())
    }
}

/// Creates active lists for a given state order class.
#[derive(Debug, Clone)]
pub struct ActiveListFactory {
    absolute_width: usize,
    relative_width: f32,
    policy: PurgePolicy,
}

impl ActiveListFactory {
    /// `relative_width` is a non-positive log-domain offset below the best
    /// score; use [`LogMath::linear_to_log`] to derive it from a linear beam.
    pub fn new(absolute_width: usize, relative_width: f32, policy: PurgePolicy) -> Self {
        Self {
            absolute_width,
            relative_width,
            policy,
        }
    }

    pub fn create(&self) -> ActiveList {
        ActiveList::new(self.absolute_width, self.relative_width, self.policy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::graph::{StateId, StateInfo, StateKind, Word};
    use crate::search::token::TokenArena;

    fn add_token(arena: &mut TokenArena, list: &mut ActiveList, score: f32) -> TokenId {
        let info = StateInfo {
            kind: StateKind::Hmm,
            emitting: true,
            order: 0,
        };
        let id = arena.alloc(None, StateId(arena.len() as u64), &info, score, 0.0, 0.0, 0);
        list.add(arena, id);
        id
    }

    fn add_word_token(
        arena: &mut TokenArena,
        list: &mut ActiveList,
        word: Word,
        score: f32,
    ) -> TokenId {
        let info = StateInfo {
            kind: StateKind::Word(word),
            emitting: false,
            order: 0,
        };
        let id = arena.alloc(None, StateId(arena.len() as u64), &info, score, 0.0, 0.0, 0);
        list.add(arena, id);
        id
    }

    #[test]
    fn test_add_tracks_best() {
        let mut arena = TokenArena::new();
        let factory = ActiveListFactory::new(10, -50.0, PurgePolicy::Score);
        let mut list = factory.create();
        add_token(&mut arena, &mut list, -30.0);
        let best = add_token(&mut arena, &mut list, -10.0);
        add_token(&mut arena, &mut list, -20.0);
        assert_eq!(list.best_token(), Some(best));
        assert_eq!(list.best_score(), -10.0);
        assert_eq!(list.beam_threshold(), -60.0);
    }

    #[test]
    fn test_empty_list_threshold_is_log_zero() {
        let factory = ActiveListFactory::new(10, -50.0, PurgePolicy::Score);
        let list = factory.create();
        assert_eq!(list.beam_threshold(), LogMath::LOG_ZERO);
    }

    #[test]
    fn test_replace_is_in_place() {
        let mut arena = TokenArena::new();
        let factory = ActiveListFactory::new(10, -50.0, PurgePolicy::Score);
        let mut list = factory.create();
        let a = add_token(&mut arena, &mut list, -30.0);
        let b = add_token(&mut arena, &mut list, -20.0);

        let info = StateInfo {
            kind: StateKind::Hmm,
            emitting: true,
            order: 0,
        };
        let c = arena.alloc(None, StateId(99), &info, -5.0, 0.0, 0.0, 0);
        list.replace(&mut arena, a, c);

        assert_eq!(list.size(), 2);
        assert!(list.iter().any(|t| t == c));
        assert!(!list.iter().any(|t| t == a));
        assert!(list.iter().any(|t| t == b));
        assert_eq!(arena[a].location(), None);
        assert_eq!(arena[c].location(), Some(0));
        assert_eq!(list.best_token(), Some(c));
    }

    #[test]
    fn test_purge_keeps_best_within_width() {
        let mut arena = TokenArena::new();
        let factory = ActiveListFactory::new(3, -50.0, PurgePolicy::Score);
        let mut list = factory.create();
        for score in [-40.0, -10.0, -30.0, -20.0, -50.0] {
            add_token(&mut arena, &mut list, score);
        }
        let list = list.purge(&mut arena);
        assert_eq!(list.size(), 3);
        let scores: Vec<f32> = list.iter().map(|t| arena[t].score()).collect();
        assert_eq!(scores, vec![-10.0, -20.0, -30.0]);
        // slots rewritten for survivors
        for (slot, id) in list.iter().enumerate() {
            assert_eq!(arena[id].location(), Some(slot));
        }
    }

    #[test]
    fn test_purge_unbounded_is_noop() {
        let mut arena = TokenArena::new();
        let factory = ActiveListFactory::new(0, -50.0, PurgePolicy::Score);
        let mut list = factory.create();
        for score in [-40.0, -10.0, -30.0] {
            add_token(&mut arena, &mut list, score);
        }
        let list = list.purge(&mut arena);
        assert_eq!(list.size(), 3);
    }

    #[test]
    fn test_word_dedup_caps_paths_per_word() {
        let mut arena = TokenArena::new();
        let policy = PurgePolicy::WordDedup {
            max_paths_per_word: 2,
            max_filler_words: 1,
        };
        let factory = ActiveListFactory::new(0, -50.0, policy);
        let mut list = factory.create();
        add_word_token(&mut arena, &mut list, Word::new("cat"), -10.0);
        add_word_token(&mut arena, &mut list, Word::new("cat"), -20.0);
        add_word_token(&mut arena, &mut list, Word::new("cat"), -30.0);
        add_word_token(&mut arena, &mut list, Word::new("dog"), -15.0);
        add_word_token(&mut arena, &mut list, Word::silence(), -12.0);
        add_word_token(&mut arena, &mut list, Word::silence(), -14.0);

        let list = list.purge(&mut arena);
        let spellings: Vec<String> = list
            .iter()
            .map(|t| arena[t].word().unwrap().spelling().to_owned())
            .collect();
        // two best "cat" paths, one filler, "dog" untouched
        assert_eq!(spellings, vec!["cat", "<sil>", "dog", "cat"]);
    }
}
