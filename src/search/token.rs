//! Tokens and the arena that owns them.
//!
//! A token records that the search reached a particular state at a particular
//! frame with a particular score. Tokens form a DAG through predecessor links;
//! the best full hypothesis is read off by walking back from a final token.
//!
//! All tokens of one decode session live in a [`TokenArena`] and refer to each
//! other by [`TokenId`] index. The arena is dropped wholesale when the session
//! ends, so abandoned branches cost nothing to reclaim and predecessor links
//! never dangle while the session is alive.

use std::ops::{Index, IndexMut};

use crate::search::graph::{StateId, StateInfo, StateKind, Word};

/// Index of a token inside its [`TokenArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl TokenId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single point on the search frontier.
///
/// State facts (kind, emitting flag, order) are copied out of the graph when
/// the token is created, so downstream consumers such as the lattice builder
/// work from tokens alone.
#[derive(Debug, Clone)]
pub struct Token {
    predecessor: Option<TokenId>,
    state: StateId,
    kind: StateKind,
    emitting: bool,
    is_final: bool,
    order: u32,
    score: f32,
    acoustic_score: f32,
    insertion_score: f32,
    language_score: f32,
    working_score: f32,
    frame_number: i32,
    /// Slot in the active list currently holding this token, if any.
    /// Maintained by the list so `replace` runs in O(1).
    location: Option<usize>,
}

impl Token {
    pub fn predecessor(&self) -> Option<TokenId> {
        self.predecessor
    }

    pub fn set_predecessor(&mut self, predecessor: Option<TokenId>) {
        self.predecessor = predecessor;
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    /// The word attached to this token's state, if it is a word or final state.
    pub fn word(&self) -> Option<&Word> {
        self.kind.word()
    }

    pub fn is_word(&self) -> bool {
        self.kind.is_word()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Cumulative log score along the Viterbi path into this token.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Acoustic contribution of this token alone (the frame emission score,
    /// or the arc's acoustic component for non-emitting tokens).
    pub fn acoustic_score(&self) -> f32 {
        self.acoustic_score
    }

    pub fn insertion_score(&self) -> f32 {
        self.insertion_score
    }

    pub fn language_score(&self) -> f32 {
        self.language_score
    }

    /// Lookahead score used while growing emitting branches; not part of the
    /// reported hypothesis score.
    pub fn working_score(&self) -> f32 {
        self.working_score
    }

    pub fn set_working_score(&mut self, score: f32) {
        self.working_score = score;
    }

    pub fn frame_number(&self) -> i32 {
        self.frame_number
    }

    pub fn location(&self) -> Option<usize> {
        self.location
    }

    pub fn set_location(&mut self, location: Option<usize>) {
        self.location = location;
    }

    /// Folds a frame emission score into the token. Returns the new total.
    pub fn apply_acoustic_score(&mut self, log_score: f32) -> f32 {
        self.acoustic_score = log_score;
        self.score += log_score;
        self.score
    }
}

/// Owner of every token in one decode session.
#[derive(Debug, Default)]
pub struct TokenArena {
    tokens: Vec<Token>,
}

impl TokenArena {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
        }
    }

    /// Number of tokens allocated so far.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Allocates a token for `state`, copying the state facts out of `info`.
    #[allow(clippy::too_many_arguments)]
    pub fn alloc(
        &mut self,
        predecessor: Option<TokenId>,
        state: StateId,
        info: &StateInfo,
        score: f32,
        insertion_score: f32,
        language_score: f32,
        frame_number: i32,
    ) -> TokenId {
        let id = TokenId(self.tokens.len() as u32);
        self.tokens.push(Token {
            predecessor,
            state,
            kind: info.kind.clone(),
            emitting: info.emitting,
            is_final: matches!(info.kind, StateKind::Final(_)),
            order: info.order,
            score,
            acoustic_score: 0.0,
            insertion_score,
            language_score,
            working_score: score,
            frame_number,
            location: None,
        });
        id
    }

    /// The words along the path into `token`, oldest first.
    pub fn word_path(&self, token: TokenId, want_filler: bool) -> String {
        let mut words = Vec::new();
        let mut current = Some(token);
        while let Some(id) = current {
            let t = &self[id];
            if let Some(word) = t.word() {
                if want_filler || !word.is_filler() {
                    words.push(word.spelling().to_owned());
                }
            }
            current = t.predecessor();
        }
        words.reverse();
        words.join(" ")
    }
}

impl Index<TokenId> for TokenArena {
    type Output = Token;

    fn index(&self, id: TokenId) -> &Token {
        &self.tokens[id.index()]
    }
}

impl IndexMut<TokenId> for TokenArena {
    fn index_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.index()]
    }
}
