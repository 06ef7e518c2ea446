//! The per-utterance decoding result.
//!
//! A result bundles the last emitting frontier, the tokens that reached a
//! final state, the frame count and a finality flag. Token lookups borrow
//! the session's [`TokenArena`]; the result itself only stores ids.

use crate::search::token::{TokenArena, TokenId};

/// Snapshot of a decode at the point it halted.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    active_tokens: Vec<TokenId>,
    result_tokens: Vec<TokenId>,
    frame_number: i32,
    is_final: bool,
}

impl DecodeResult {
    pub fn new(
        active_tokens: Vec<TokenId>,
        result_tokens: Vec<TokenId>,
        frame_number: i32,
        is_final: bool,
    ) -> Self {
        Self {
            active_tokens,
            result_tokens,
            frame_number,
            is_final,
        }
    }

    /// Tokens on the last emitting frontier.
    pub fn active_tokens(&self) -> &[TokenId] {
        &self.active_tokens
    }

    /// Tokens that reached a final search state.
    pub fn result_tokens(&self) -> &[TokenId] {
        &self.result_tokens
    }

    pub fn frame_number(&self) -> i32 {
        self.frame_number
    }

    /// True when the utterance ran to a natural end rather than being cut off
    /// mid-stream.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Best-scoring token that reached a final state, if any.
    pub fn best_final_token(&self, arena: &TokenArena) -> Option<TokenId> {
        best_of(arena, &self.result_tokens)
    }

    /// Best-scoring token on the active frontier.
    pub fn best_active_token(&self, arena: &TokenArena) -> Option<TokenId> {
        best_of(arena, &self.active_tokens)
    }

    /// Best final token if one exists, otherwise the best active token.
    pub fn best_token(&self, arena: &TokenArena) -> Option<TokenId> {
        self.best_final_token(arena)
            .or_else(|| self.best_active_token(arena))
    }

    /// The word path of the best token, fillers excluded.
    pub fn best_word_path(&self, arena: &TokenArena) -> String {
        self.best_token(arena)
            .map(|t| arena.word_path(t, false))
            .unwrap_or_default()
    }

    /// Finds a result or active token whose filler-free word path equals
    /// `text`. Result tokens are searched first.
    pub fn find_token(&self, arena: &TokenArena, text: &str) -> Option<TokenId> {
        self.result_tokens
            .iter()
            .chain(self.active_tokens.iter())
            .copied()
            .find(|&t| arena.word_path(t, false) == text)
    }
}

fn best_of(arena: &TokenArena, tokens: &[TokenId]) -> Option<TokenId> {
    tokens
        .iter()
        .copied()
        .max_by(|&a, &b| arena[a].score().total_cmp(&arena[b].score()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::graph::{StateId, StateInfo, StateKind, Word};

    fn word_token(
        arena: &mut TokenArena,
        pred: Option<TokenId>,
        spelling: &str,
        score: f32,
        is_final: bool,
    ) -> TokenId {
        let word = Word::new(spelling);
        let kind = if is_final {
            StateKind::Final(word)
        } else {
            StateKind::Word(word)
        };
        let info = StateInfo {
            kind,
            emitting: false,
            order: 0,
        };
        arena.alloc(pred, StateId(arena.len() as u64), &info, score, 0.0, 0.0, 0)
    }

    #[test]
    fn test_best_token_prefers_final() {
        let mut arena = TokenArena::new();
        let active = word_token(&mut arena, None, "cat", -1.0, false);
        let fin = word_token(&mut arena, None, "</s>", -9.0, true);
        let result = DecodeResult::new(vec![active], vec![fin], 10, true);
        assert_eq!(result.best_final_token(&arena), Some(fin));
        assert_eq!(result.best_active_token(&arena), Some(active));
        assert_eq!(result.best_token(&arena), Some(fin));
    }

    #[test]
    fn test_best_token_falls_back_to_active() {
        let mut arena = TokenArena::new();
        let a = word_token(&mut arena, None, "cat", -5.0, false);
        let b = word_token(&mut arena, None, "dog", -2.0, false);
        let result = DecodeResult::new(vec![a, b], Vec::new(), 4, false);
        assert_eq!(result.best_token(&arena), Some(b));
        assert!(result.best_final_token(&arena).is_none());
    }

    #[test]
    fn test_find_token_by_word_path() {
        let mut arena = TokenArena::new();
        let start = word_token(&mut arena, None, "<s>", 0.0, false);
        let cat = word_token(&mut arena, Some(start), "cat", -3.0, false);
        let dog = word_token(&mut arena, Some(start), "dog", -4.0, false);
        let result = DecodeResult::new(vec![cat, dog], Vec::new(), 2, false);
        assert_eq!(result.find_token(&arena, "<s> dog"), Some(dog));
        assert!(result.find_token(&arena, "<s> bird").is_none());
    }
}
