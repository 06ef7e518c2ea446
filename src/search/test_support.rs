//! In-memory search graph for deterministic decoder tests.

use std::collections::HashMap;

use crate::search::graph::{SearchGraph, StateArc, StateId, StateInfo, StateKind, Word};

/// A hand-built graph with explicit states, orders and arcs.
pub(crate) struct TestGraph {
    states: HashMap<StateId, (StateInfo, Vec<StateArc>)>,
    initial: StateId,
    num_state_order: u32,
}

impl TestGraph {
    pub(crate) fn new(initial: StateId, num_state_order: u32) -> Self {
        Self {
            states: HashMap::new(),
            initial,
            num_state_order,
        }
    }

    pub(crate) fn state(&mut self, id: StateId, kind: StateKind, emitting: bool, order: u32) {
        let info = StateInfo {
            kind,
            emitting,
            order,
        };
        self.states.insert(id, (info, Vec::new()));
    }

    pub(crate) fn word_state(&mut self, id: StateId, spelling: &str) {
        self.state(id, StateKind::Word(Word::new(spelling)), false, 0);
    }

    pub(crate) fn hmm_state(&mut self, id: StateId) {
        self.state(id, StateKind::Hmm, true, self.num_state_order - 1);
    }

    pub(crate) fn final_state(&mut self, id: StateId) {
        self.state(id, StateKind::Final(Word::sentence_end()), false, 0);
    }

    /// Adds an arc with the whole transition probability on the language
    /// component.
    pub(crate) fn arc(&mut self, from: StateId, to: StateId, language_probability: f32) {
        self.arc_full(from, to, 0.0, 0.0, language_probability);
    }

    pub(crate) fn arc_full(
        &mut self,
        from: StateId,
        to: StateId,
        acoustic: f32,
        insertion: f32,
        language: f32,
    ) {
        self.states
            .get_mut(&from)
            .expect("arc from unknown state")
            .1
            .push(StateArc {
                target: to,
                acoustic_probability: acoustic,
                insertion_probability: insertion,
                language_probability: language,
            });
    }
}

impl SearchGraph for TestGraph {
    fn initial_state(&self) -> StateId {
        self.initial
    }

    fn num_state_order(&self) -> u32 {
        self.num_state_order
    }

    fn state_info(&self, state: StateId) -> StateInfo {
        self.states
            .get(&state)
            .expect("unknown state")
            .0
            .clone()
    }

    fn successors(&self, state: StateId) -> &[StateArc] {
        &self.states.get(&state).expect("unknown state").1
    }
}
