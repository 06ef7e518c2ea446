//! Routes tokens to per-order active lists and drains non-emitting levels.
//!
//! One list exists per state order class; the emitting class is the last one.
//! Within a frame the non-emitting lists are consumed exactly once each, in
//! increasing order, each being swapped for a fresh list as it is taken.

use tracing::warn;

use crate::error::{DecoderError, Result};
use crate::search::active_list::{ActiveList, ActiveListFactory};
use crate::search::token::{TokenArena, TokenId};

/// Owns the active lists for one decode session.
#[derive(Debug)]
pub struct ActiveListManager {
    factories: Vec<ActiveListFactory>,
    lists: Vec<ActiveList>,
    /// First non-emitting level not yet drained this frame.
    drain_cursor: usize,
    check_prior_lists: bool,
}

impl ActiveListManager {
    /// `factories` are assigned to order classes low to high; when there are
    /// fewer factories than classes the last factory is reused.
    pub fn new(factories: Vec<ActiveListFactory>, check_prior_lists: bool) -> Self {
        Self {
            factories,
            lists: Vec::new(),
            drain_cursor: 0,
            check_prior_lists,
        }
    }

    /// Allocates one list per state order class. Called once at recognition
    /// start with the graph's order count.
    pub fn set_num_state_order(&mut self, num_state_order: u32) -> Result<()> {
        let n = num_state_order as usize;
        if self.factories.is_empty() {
            return Err(DecoderError::Configuration(
                "no active list factories configured".to_owned(),
            ));
        }
        if self.factories.len() > n {
            return Err(DecoderError::Configuration(format!(
                "more active list factories ({}) than state order classes ({})",
                self.factories.len(),
                n
            )));
        }
        if self.factories.len() < n {
            warn!(
                factories = self.factories.len(),
                orders = n,
                "fewer active list factories than state order classes, reusing the last one"
            );
        }
        let last = self.factories.len() - 1;
        self.lists = (0..n)
            .map(|order| self.factories[order.min(last)].create())
            .collect();
        self.drain_cursor = 0;
        Ok(())
    }

    fn emitting_order(&self) -> usize {
        debug_assert!(!self.lists.is_empty(), "state order count not set");
        self.lists.len() - 1
    }

    /// Routes a token to the list for its order class.
    pub fn add(&mut self, arena: &mut TokenArena, token: TokenId) {
        let order = arena[token].order() as usize;
        assert!(
            order < self.lists.len(),
            "token order {} out of range (have {} order classes)",
            order,
            self.lists.len()
        );
        self.lists[order].add(arena, token);
    }

    /// Swaps `new` for `old` in `old`'s list slot.
    pub fn replace(&mut self, arena: &mut TokenArena, old: TokenId, new: TokenId) {
        let order = arena[old].order() as usize;
        self.lists[order].replace(arena, old, new);
    }

    /// The current emitting list, read-only.
    pub fn emitting_list(&self) -> &ActiveList {
        &self.lists[self.emitting_order()]
    }

    /// Takes ownership of the emitting list, leaving a fresh one behind.
    pub fn take_emitting_list(&mut self) -> ActiveList {
        let order = self.emitting_order();
        let fresh = self.lists[order].new_instance();
        std::mem::replace(&mut self.lists[order], fresh)
    }

    /// Puts an emitting list back, discarding the placeholder.
    ///
    /// Used when a frame's grow step is skipped and the pruned list must
    /// carry over to the next frame.
    pub fn restore_emitting_list(&mut self, list: ActiveList) {
        let order = self.emitting_order();
        self.lists[order] = list;
    }

    /// Resets the per-frame non-emitting drain to the lowest level.
    pub fn begin_non_emitting_drain(&mut self) {
        self.drain_cursor = 0;
    }

    /// Takes the next non-empty non-emitting list, lowest order first,
    /// leaving a fresh list in its place. Returns `None` when every
    /// non-emitting level has been drained.
    ///
    /// A level repopulated at its own order (a non-emitting cycle) is yielded
    /// again; growth must never feed a strictly lower level.
    ///
    /// # Panics
    /// When prior-list checking is enabled, panics if a level below the drain
    /// cursor has been repopulated.
    pub fn take_next_non_emitting_list(&mut self) -> Option<(u32, ActiveList)> {
        if self.check_prior_lists {
            for order in 0..self.drain_cursor {
                assert!(
                    self.lists[order].is_empty(),
                    "state order violation: drained non-emitting level {} was repopulated",
                    order
                );
            }
        }
        let emitting = self.emitting_order();
        for order in self.drain_cursor..emitting {
            if !self.lists[order].is_empty() {
                let fresh = self.lists[order].new_instance();
                let list = std::mem::replace(&mut self.lists[order], fresh);
                self.drain_cursor = order;
                return Some((order as u32, list));
            }
        }
        self.drain_cursor = emitting;
        None
    }

    /// Total tokens across every list, for periodic statistics.
    pub fn total_token_count(&self) -> usize {
        self.lists.iter().map(ActiveList::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::active_list::PurgePolicy;
    use crate::search::graph::{StateId, StateInfo, StateKind};

    fn manager(orders: u32, check: bool) -> ActiveListManager {
        let factory = ActiveListFactory::new(0, -100.0, PurgePolicy::Score);
        let mut m = ActiveListManager::new(vec![factory], check);
        m.set_num_state_order(orders).unwrap();
        m
    }

    fn add_at_order(m: &mut ActiveListManager, arena: &mut TokenArena, order: u32) -> TokenId {
        let info = StateInfo {
            kind: StateKind::Dummy,
            emitting: false,
            order,
        };
        let id = arena.alloc(None, StateId(arena.len() as u64), &info, -1.0, 0.0, 0.0, 0);
        m.add(arena, id);
        id
    }

    #[test]
    fn test_no_factories_is_configuration_error() {
        let mut m = ActiveListManager::new(Vec::new(), false);
        assert!(matches!(
            m.set_num_state_order(3),
            Err(DecoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_too_many_factories_is_configuration_error() {
        let factory = ActiveListFactory::new(0, -100.0, PurgePolicy::Score);
        let mut m = ActiveListManager::new(vec![factory.clone(), factory.clone(), factory], false);
        assert!(matches!(
            m.set_num_state_order(2),
            Err(DecoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_routing_by_order() {
        let mut arena = TokenArena::new();
        let mut m = manager(3, false);
        add_at_order(&mut m, &mut arena, 0);
        add_at_order(&mut m, &mut arena, 2);
        add_at_order(&mut m, &mut arena, 2);
        assert_eq!(m.emitting_list().size(), 2);
        assert_eq!(m.total_token_count(), 3);
    }

    #[test]
    fn test_drain_yields_each_level_once_in_order() {
        let mut arena = TokenArena::new();
        let mut m = manager(4, true);
        add_at_order(&mut m, &mut arena, 2);
        add_at_order(&mut m, &mut arena, 0);
        add_at_order(&mut m, &mut arena, 3); // emitting, not drained

        m.begin_non_emitting_drain();
        let (order, list) = m.take_next_non_emitting_list().unwrap();
        assert_eq!(order, 0);
        assert_eq!(list.size(), 1);
        let (order, list) = m.take_next_non_emitting_list().unwrap();
        assert_eq!(order, 2);
        assert_eq!(list.size(), 1);
        assert!(m.take_next_non_emitting_list().is_none());
        assert_eq!(m.emitting_list().size(), 1);
    }

    #[test]
    fn test_drain_sees_newly_grown_higher_level() {
        let mut arena = TokenArena::new();
        let mut m = manager(4, true);
        add_at_order(&mut m, &mut arena, 0);

        m.begin_non_emitting_drain();
        let (order, _) = m.take_next_non_emitting_list().unwrap();
        assert_eq!(order, 0);
        // growth from level 0 feeds level 1
        add_at_order(&mut m, &mut arena, 1);
        let (order, list) = m.take_next_non_emitting_list().unwrap();
        assert_eq!(order, 1);
        assert_eq!(list.size(), 1);
        assert!(m.take_next_non_emitting_list().is_none());
    }

    #[test]
    #[should_panic(expected = "state order violation")]
    fn test_repopulating_drained_level_panics() {
        let mut arena = TokenArena::new();
        let mut m = manager(4, true);
        add_at_order(&mut m, &mut arena, 1);

        m.begin_non_emitting_drain();
        let _ = m.take_next_non_emitting_list().unwrap();
        // illegal: growth fed a level at or below the drained one
        add_at_order(&mut m, &mut arena, 0);
        let _ = m.take_next_non_emitting_list();
    }

    #[test]
    fn test_take_and_restore_emitting_list() {
        let mut arena = TokenArena::new();
        let mut m = manager(2, false);
        add_at_order(&mut m, &mut arena, 1);
        let taken = m.take_emitting_list();
        assert_eq!(taken.size(), 1);
        assert_eq!(m.emitting_list().size(), 0);
        m.restore_emitting_list(taken);
        assert_eq!(m.emitting_list().size(), 1);
    }
}
