//! Acoustic scoring interface between the search and the front end.

use std::collections::HashMap;

use crate::logmath::LogMath;
use crate::search::graph::StateId;
use crate::search::token::{TokenArena, TokenId};

/// What a scorer call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerOutcome {
    /// Scores were applied; the named token now has the best score.
    Best(TokenId),
    /// The frontier was empty; nothing was scored.
    Empty,
    /// The input stream is exhausted; no frame was consumed.
    StreamEnd,
}

/// Scores the emitting frontier against one frame of input.
///
/// An implementation folds the frame's emission score into each token via
/// [`Token::apply_acoustic_score`](crate::search::token::Token::apply_acoustic_score)
/// and reports the best-scoring token.
pub trait AcousticScorer {
    fn calculate_scores(&mut self, arena: &mut TokenArena, tokens: &[TokenId]) -> ScorerOutcome;
}

/// A scorer driven by a precomputed table of per-frame, per-state emission
/// scores. States absent from a frame's table score `LOG_ZERO`.
///
/// Useful for deterministic tests and for replaying scores produced offline.
#[derive(Debug, Default)]
pub struct SequenceScorer {
    frames: Vec<HashMap<StateId, f32>>,
    cursor: usize,
}

impl SequenceScorer {
    pub fn new(frames: Vec<HashMap<StateId, f32>>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Builds a scorer from `(state, score)` rows, one row slice per frame.
    pub fn from_rows(rows: &[&[(StateId, f32)]]) -> Self {
        let frames = rows
            .iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        Self::new(frames)
    }

    /// Frames not yet consumed.
    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl AcousticScorer for SequenceScorer {
    fn calculate_scores(&mut self, arena: &mut TokenArena, tokens: &[TokenId]) -> ScorerOutcome {
        // exhaustion is checked first: an empty frontier at the end of the
        // input is a stream end, not an empty beam
        let Some(frame) = self.frames.get(self.cursor) else {
            return ScorerOutcome::StreamEnd;
        };
        if tokens.is_empty() {
            return ScorerOutcome::Empty;
        }
        self.cursor += 1;

        let mut best: Option<(TokenId, f32)> = None;
        for &id in tokens {
            let state = arena[id].state();
            let emission = frame.get(&state).copied().unwrap_or(LogMath::LOG_ZERO);
            let total = arena[id].apply_acoustic_score(emission);
            match best {
                Some((_, best_score)) if best_score >= total => {}
                _ => best = Some((id, total)),
            }
        }
        match best {
            Some((id, _)) => ScorerOutcome::Best(id),
            None => ScorerOutcome::Empty,
        }
    }
}
