//! Pruning interface applied to the emitting frontier after scoring.

use crate::search::active_list::ActiveList;
use crate::search::token::TokenArena;

/// Thins an active list between scoring and growing.
pub trait Pruner {
    fn prune(&self, arena: &mut TokenArena, list: ActiveList) -> ActiveList;
}

/// The standard pruner: defers entirely to the list's own purge policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplePruner;

impl Pruner for SimplePruner {
    fn prune(&self, arena: &mut TokenArena, list: ActiveList) -> ActiveList {
        list.purge(arena)
    }
}
