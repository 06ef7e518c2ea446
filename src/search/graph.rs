//! Search graph abstraction the decoder explores.
//!
//! The graph is supplied by the caller (it is typically compiled from a language
//! model and lexicon elsewhere) and the decoder only sees it through the
//! [`SearchGraph`] trait: opaque state handles, per-state facts, and outgoing
//! arcs carrying log-domain transition probabilities.

use std::fmt;
use std::sync::Arc;

/// Spelling of the sentence-start word.
pub const SENTENCE_START_SPELLING: &str = "<s>";

/// Spelling of the sentence-end word.
pub const SENTENCE_END_SPELLING: &str = "</s>";

/// Spelling used for the silence filler.
pub const SILENCE_SPELLING: &str = "<sil>";

/// A word in the recognizer vocabulary.
///
/// Cheap to clone; the spelling is reference counted and shared between the
/// search graph, tokens and lattice nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Word {
    spelling: Arc<str>,
    filler: bool,
}

impl Word {
    /// Create a regular (non-filler) word.
    pub fn new(spelling: &str) -> Self {
        Self {
            spelling: Arc::from(spelling),
            filler: false,
        }
    }

    /// Create a filler word (silence, noise markers and the like).
    pub fn filler(spelling: &str) -> Self {
        Self {
            spelling: Arc::from(spelling),
            filler: true,
        }
    }

    /// The `<s>` sentence-start word.
    pub fn sentence_start() -> Self {
        Self::new(SENTENCE_START_SPELLING)
    }

    /// The `</s>` sentence-end word.
    pub fn sentence_end() -> Self {
        Self::new(SENTENCE_END_SPELLING)
    }

    /// The `<sil>` silence filler.
    pub fn silence() -> Self {
        Self::filler(SILENCE_SPELLING)
    }

    pub fn spelling(&self) -> &str {
        &self.spelling
    }

    pub fn is_filler(&self) -> bool {
        self.filler
    }

    pub fn is_sentence_start(&self) -> bool {
        &*self.spelling == SENTENCE_START_SPELLING
    }

    pub fn is_sentence_end(&self) -> bool {
        &*self.spelling == SENTENCE_END_SPELLING
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spelling)
    }
}

/// Opaque handle identifying a search state.
///
/// Used as the key for best-token maps and visited sets; two handles are equal
/// exactly when they name the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// The role a search state plays in the graph.
///
/// A closed set: the decoder dispatches on this instead of downcasting, and
/// word-boundary handling (alternate hypotheses, lattice node creation) keys
/// off the `Word` and `Final` variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StateKind {
    /// A word boundary carrying the word just recognized.
    Word(Word),
    /// An HMM state inside a phone model.
    Hmm,
    /// A phonetic unit boundary.
    Unit,
    /// A branching or epsilon state with no linguistic content.
    Dummy,
    /// A final state; reaching it completes an utterance hypothesis.
    /// Carries the sentence-end word.
    Final(Word),
}

impl StateKind {
    /// True for word-boundary and final states.
    pub fn is_word(&self) -> bool {
        matches!(self, StateKind::Word(_) | StateKind::Final(_))
    }

    /// The word attached to this state, if any.
    pub fn word(&self) -> Option<&Word> {
        match self {
            StateKind::Word(w) | StateKind::Final(w) => Some(w),
            _ => None,
        }
    }
}

/// Per-state facts the decoder needs when a token enters the state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateInfo {
    pub kind: StateKind,
    /// Whether the state consumes an input frame (is scored against data).
    pub emitting: bool,
    /// Topological order class; non-emitting states are expanded in
    /// increasing order within a frame and emitting states come last.
    pub order: u32,
}

/// An outgoing transition from one search state to another.
///
/// All three probability components are log domain; the total transition
/// probability is their sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateArc {
    pub target: StateId,
    pub acoustic_probability: f32,
    pub insertion_probability: f32,
    pub language_probability: f32,
}

impl StateArc {
    /// Total log-domain transition probability.
    pub fn probability(&self) -> f32 {
        self.acoustic_probability + self.insertion_probability + self.language_probability
    }
}

/// The graph of states the search manager explores.
pub trait SearchGraph {
    /// The single entry state of the graph.
    fn initial_state(&self) -> StateId;

    /// Number of distinct state order classes. Active lists are allocated one
    /// per class, so every order returned by `state_info` must be below this.
    fn num_state_order(&self) -> u32;

    /// Facts about a state. Must be stable for the lifetime of a decode.
    fn state_info(&self, state: StateId) -> StateInfo;

    /// Outgoing arcs of a state. Empty for dead ends.
    fn successors(&self, state: StateId) -> &[StateArc];
}
