//! The time-synchronous breadth-first search manager.
//!
//! Drives the per-frame cycle over the search graph: score the emitting
//! frontier against one frame of input, prune it, then grow surviving tokens
//! through their successor arcs. Non-emitting successors are expanded within
//! the same frame, level by level in state order, so that by the time the next
//! frame is scored only emitting tokens remain on the frontier.
//!
//! Viterbi pruning keeps one best token per search state per frame; losers at
//! word boundaries are handed to the [`AlternateHypothesisManager`] so lattice
//! construction can restore them as alternate paths.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::DecoderConfig;
use crate::error::Result;
use crate::logmath::LogMath;
use crate::search::active_list::ActiveList;
use crate::search::alternates::AlternateHypothesisManager;
use crate::search::graph::{SearchGraph, StateArc, StateId, StateInfo};
use crate::search::list_manager::ActiveListManager;
use crate::search::pruner::Pruner;
use crate::search::result::DecodeResult;
use crate::search::scorer::{AcousticScorer, ScorerOutcome};
use crate::search::token::{TokenArena, TokenId};

/// Frames between decode progress log lines.
const PROGRESS_LOG_INTERVAL: i32 = 100;

/// Counters accumulated over one recognition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub tokens_created: u64,
    pub tokens_scored: u64,
    pub frames_processed: u64,
}

/// Breadth-first token-passing decoder with word pruning.
pub struct WordPruningSearchManager<G, S, P> {
    graph: G,
    scorer: S,
    pruner: P,
    log_math: Arc<LogMath>,

    list_manager: ActiveListManager,
    alternates: AlternateHypothesisManager,
    arena: TokenArena,
    best_token_map: HashMap<StateId, TokenId>,
    result_tokens: Vec<TokenId>,

    current_frame: i32,
    stream_ended: bool,
    stats: SearchStats,

    build_lattice: bool,
    max_lattice_edges: usize,
    grow_skip_interval: u32,
    check_state_order: bool,
    acoustic_lookahead_frames: f32,
    relative_beam_width: f32,
}

impl<G, S, P> WordPruningSearchManager<G, S, P>
where
    G: SearchGraph,
    S: AcousticScorer,
    P: Pruner,
{
    pub fn new(
        graph: G,
        scorer: S,
        pruner: P,
        config: &DecoderConfig,
        log_math: Arc<LogMath>,
    ) -> Self {
        let factories = config.active_list_factories(&log_math);
        let list_manager = ActiveListManager::new(factories, config.check_prior_lists);
        let relative_beam_width = config.log_relative_beam_width(&log_math);
        Self {
            graph,
            scorer,
            pruner,
            log_math,
            list_manager,
            alternates: AlternateHypothesisManager::new(config.max_lattice_edges),
            arena: TokenArena::new(),
            best_token_map: HashMap::new(),
            result_tokens: Vec::new(),
            current_frame: 0,
            stream_ended: false,
            stats: SearchStats::default(),
            build_lattice: config.build_lattice,
            max_lattice_edges: config.max_lattice_edges,
            grow_skip_interval: config.grow_skip_interval,
            check_state_order: config.check_state_order,
            acoustic_lookahead_frames: config.acoustic_lookahead_frames,
            relative_beam_width,
        }
    }

    /// Prepares a fresh session: allocates the active lists, seeds the
    /// frontier with the initial token and runs the first non-emitting
    /// expansion so the emitting list is populated for frame zero.
    pub fn start_recognition(&mut self) -> Result<()> {
        self.arena = TokenArena::new();
        self.alternates = AlternateHypothesisManager::new(self.max_lattice_edges);
        self.best_token_map.clear();
        self.result_tokens.clear();
        self.current_frame = 0;
        self.stream_ended = false;
        self.stats = SearchStats::default();

        self.list_manager
            .set_num_state_order(self.graph.num_state_order())?;

        let initial = self.graph.initial_state();
        let info = self.graph.state_info(initial);
        let first = self.arena.alloc(
            None,
            initial,
            &info,
            LogMath::LOG_ONE,
            0.0,
            0.0,
            self.current_frame,
        );
        self.stats.tokens_created += 1;
        self.best_token_map.insert(initial, first);
        self.list_manager.add(&mut self.arena, first);
        self.grow_non_emitting_branches();
        Ok(())
    }

    /// Decodes up to `n_frames` more frames, halting early on stream end or
    /// an empty beam. The returned result is final when the decode halted.
    pub fn recognize(&mut self, n_frames: usize) -> DecodeResult {
        let mut done = false;
        for _ in 0..n_frames {
            if !self.step_frame() {
                done = true;
                break;
            }
        }
        DecodeResult::new(
            self.list_manager.emitting_list().token_ids().to_vec(),
            self.result_tokens.clone(),
            self.current_frame,
            done,
        )
    }

    /// Finalizes the session: purges the alternate lists down to the lattice
    /// edge bound and logs the session counters.
    pub fn stop_recognition(&mut self) {
        self.alternates.purge(&self.arena);
        info!(
            frames = self.stats.frames_processed,
            tokens_created = self.stats.tokens_created,
            tokens_scored = self.stats.tokens_scored,
            "recognition stopped"
        );
    }

    /// One score/prune/grow step. Returns false when the decode halted.
    fn step_frame(&mut self) -> bool {
        let list = self.list_manager.take_emitting_list();
        match self.scorer.calculate_scores(&mut self.arena, list.token_ids()) {
            ScorerOutcome::StreamEnd => {
                debug!(frame = self.current_frame, "acoustic stream ended");
                self.stream_ended = true;
                self.list_manager.restore_emitting_list(list);
                false
            }
            ScorerOutcome::Empty => {
                debug!(frame = self.current_frame, "beam is empty");
                self.list_manager.restore_emitting_list(list);
                false
            }
            ScorerOutcome::Best(_) => {
                self.stats.tokens_scored += list.size() as u64;
                self.stats.frames_processed += 1;
                let list = self.pruner.prune(&mut self.arena, list);
                self.current_frame += 1;

                let skip_grow = self.grow_skip_interval > 0
                    && (self.current_frame as u32) % self.grow_skip_interval == 0;
                if skip_grow {
                    // carry the pruned frontier into the next frame unexpanded
                    self.list_manager.restore_emitting_list(list);
                } else {
                    self.best_token_map.clear();
                    self.result_tokens.clear();
                    self.grow_emitting_branches(list);
                    self.grow_non_emitting_branches();
                }

                if self.current_frame % PROGRESS_LOG_INTERVAL == 0 {
                    info!(
                        frame = self.current_frame,
                        frontier = self.list_manager.total_token_count(),
                        tokens_created = self.stats.tokens_created,
                        "decode progress"
                    );
                }
                true
            }
        }
    }

    /// Grows the scored emitting frontier, optionally sharpening the beam
    /// with an acoustic lookahead estimate of each token's near future.
    fn grow_emitting_branches(&mut self, mut list: ActiveList) {
        if self.acoustic_lookahead_frames > 0.0 {
            let mut best = LogMath::LOG_ZERO;
            for slot in 0..list.size() {
                let id = list.token_ids()[slot];
                let token = &mut self.arena[id];
                let projected =
                    token.score() + token.acoustic_score() * self.acoustic_lookahead_frames;
                token.set_working_score(projected);
                if projected > best {
                    best = projected;
                }
            }
            let threshold = best + self.relative_beam_width;
            for slot in 0..list.size() {
                let id = list.token_ids()[slot];
                if self.arena[id].working_score() >= threshold {
                    self.collect_successor_tokens(&mut list, id);
                }
            }
        } else {
            self.grow_branches(list);
        }
    }

    /// Drains every populated non-emitting level in state order, pruning and
    /// growing each, until only the emitting list holds tokens.
    fn grow_non_emitting_branches(&mut self) {
        self.list_manager.begin_non_emitting_drain();
        while let Some((order, list)) = self.list_manager.take_next_non_emitting_list() {
            debug!(order, size = list.size(), "growing non-emitting level");
            let list = self.pruner.prune(&mut self.arena, list);
            self.grow_branches(list);
        }
    }

    /// Expands every token in `list` whose score clears the beam threshold.
    fn grow_branches(&mut self, mut list: ActiveList) {
        let threshold = list.beam_threshold();
        for slot in 0..list.size() {
            let id = list.token_ids()[slot];
            if self.arena[id].score() >= threshold {
                self.collect_successor_tokens(&mut list, id);
            }
        }
    }

    /// Expands one token through its successor arcs, applying the Viterbi
    /// comparison per target state.
    fn collect_successor_tokens(&mut self, current: &mut ActiveList, token: TokenId) {
        if self.arena[token].is_final() {
            self.result_tokens.push(token);
            return;
        }
        // a non-emitting state revisited within this token's same-frame
        // ancestry is a grammar loop
        if !self.arena[token].is_emitting() && self.is_visited(token) {
            return;
        }

        let state = self.arena[token].state();
        let token_score = self.arena[token].score();
        let from_order = self.arena[token].order();
        let from_emitting = self.arena[token].is_emitting();
        let arcs: Vec<StateArc> = self.graph.successors(state).to_vec();

        for arc in arcs {
            let next = arc.target;
            let info = self.graph.state_info(next);
            if self.check_state_order {
                self.assert_state_order(state, from_order, from_emitting, next, &info);
            }
            let entry_score = token_score + arc.probability();

            match self.best_token_map.get(&next).copied() {
                None => {
                    let new = self.new_token(token, next, &info, entry_score, &arc);
                    self.best_token_map.insert(next, new);
                    self.list_manager.add(&mut self.arena, new);
                }
                Some(best) if self.arena[best].score() < entry_score => {
                    let old_predecessor = self.arena[best].predecessor();
                    let new = self.new_token(token, next, &info, entry_score, &arc);
                    self.best_token_map.insert(next, new);
                    self.replace_token(current, best, new);
                    if self.build_lattice && info.kind.is_word() {
                        self.alternates.change_successor(new, best);
                        if let Some(loser) = old_predecessor {
                            if loser != token {
                                self.alternates
                                    .add_alternate_predecessor(&self.arena, new, loser);
                            }
                        }
                    }
                }
                Some(best) => {
                    if self.build_lattice
                        && info.kind.is_word()
                        && self.arena[best].predecessor() != Some(token)
                    {
                        self.alternates
                            .add_alternate_predecessor(&self.arena, best, token);
                    }
                }
            }
        }
    }

    fn new_token(
        &mut self,
        predecessor: TokenId,
        state: StateId,
        info: &StateInfo,
        score: f32,
        arc: &StateArc,
    ) -> TokenId {
        self.stats.tokens_created += 1;
        self.arena.alloc(
            Some(predecessor),
            state,
            info,
            score,
            arc.insertion_probability,
            arc.language_probability,
            self.current_frame,
        )
    }

    /// Swaps `new` for `old` in whichever list holds `old`: the list being
    /// grown right now, or one still owned by the manager.
    fn replace_token(&mut self, current: &mut ActiveList, old: TokenId, new: TokenId) {
        let slot = self.arena[old]
            .location()
            .expect("best token is not on any active list");
        if current.token_ids().get(slot) == Some(&old) {
            current.replace(&mut self.arena, old, new);
        } else {
            self.list_manager.replace(&mut self.arena, old, new);
        }
    }

    /// Walks non-emitting same-frame ancestry looking for the token's own
    /// state, which would mean a non-emitting cycle.
    fn is_visited(&self, token: TokenId) -> bool {
        let state = self.arena[token].state();
        let mut current = self.arena[token].predecessor();
        while let Some(pred) = current {
            if self.arena[pred].is_emitting() {
                break;
            }
            if self.arena[pred].state() == state {
                return true;
            }
            current = self.arena[pred].predecessor();
        }
        false
    }

    fn assert_state_order(
        &self,
        from: StateId,
        from_order: u32,
        from_emitting: bool,
        to: StateId,
        to_info: &StateInfo,
    ) {
        // emitting transitions cross a frame boundary, order restarts
        if from_emitting {
            return;
        }
        assert!(
            from_order <= to_info.order,
            "state order violation: {} (order {}) expands to {} (order {})",
            from,
            from_order,
            to,
            to_info.order
        );
    }

    /// True when the last halt was caused by the acoustic stream ending.
    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    pub fn current_frame(&self) -> i32 {
        self.current_frame
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn arena(&self) -> &TokenArena {
        &self.arena
    }

    pub fn alternates(&self) -> &AlternateHypothesisManager {
        &self.alternates
    }

    pub fn log_math(&self) -> &Arc<LogMath> {
        &self.log_math
    }
}
