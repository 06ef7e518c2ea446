//! The word lattice: construction from a token tree, scoring, and I/O.
//!
//! A lattice compresses the surviving token tree (plus the recorded Viterbi
//! losers) into a directed acyclic word graph. Runs of non-word tokens between
//! two word tokens collapse into a single edge carrying the accumulated
//! acoustic+insertion and language score deltas. There is exactly one initial
//! node (the sentence start) and one terminal node (the sentence end).
//!
//! The `.LAT` text format written by [`Lattice::dump`] round-trips through
//! [`Lattice::load`]; the Graphviz and AiSee dumps are one-way visualization
//! exports.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write as IoWrite};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{DecoderError, Result};
use crate::lattice::edge::{Edge, EdgeId};
use crate::lattice::node::{Node, NodeId};
use crate::logmath::LogMath;
use crate::search::alternates::AlternateHypothesisManager;
use crate::search::graph::{Word, SILENCE_SPELLING};
use crate::search::result::DecodeResult;
use crate::search::token::{TokenArena, TokenId};

fn format_err(line: usize, message: impl Into<String>) -> DecoderError {
    DecoderError::LatticeFormat {
        line,
        message: message.into(),
    }
}

/// A word graph with one initial and one terminal node.
#[derive(Debug)]
pub struct Lattice {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    initial_node: Option<NodeId>,
    terminal_node: Option<NodeId>,
    log_math: Arc<LogMath>,
    next_edge_id: u32,
}

impl Lattice {
    /// An empty lattice.
    pub fn new(log_math: Arc<LogMath>) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            initial_node: None,
            terminal_node: None,
            log_math,
            next_edge_id: 0,
        }
    }

    /// Builds a lattice from a completed decode.
    ///
    /// Walks predecessor chains from every final token (or from the whole
    /// frontier when nothing reached a final state), collapsing non-word runs
    /// into edges and expanding recorded alternate predecessors through the
    /// same logic. A visited set keyed by token id keeps each word token's
    /// incoming paths from being collapsed twice.
    ///
    /// # Panics
    /// Panics if the result is empty, or if a path does not run from the
    /// sentence-start word to the sentence-end word.
    pub fn from_result(
        result: &DecodeResult,
        arena: &TokenArena,
        alternates: &AlternateHypothesisManager,
        log_math: Arc<LogMath>,
    ) -> Self {
        let mut lattice = Self::new(log_math);
        let mut visited = HashSet::new();

        let roots: Vec<TokenId> = if result.best_final_token(arena).is_some() {
            result.result_tokens().to_vec()
        } else {
            result.active_tokens().to_vec()
        };
        let best = result
            .best_token(arena)
            .expect("cannot build a lattice from an empty result");

        for root in roots {
            // rewind to the most recent word token on this path
            let mut current = Some(root);
            while let Some(id) = current {
                if arena[id].is_word() {
                    break;
                }
                current = arena[id].predecessor();
            }
            let Some(word_token) = current else { continue };
            let word = arena[word_token]
                .word()
                .cloned()
                .unwrap_or_else(|| panic!("word token without a word"));
            assert!(
                word.is_sentence_end(),
                "lattice path does not end at the sentence-end word (got '{}')",
                word.spelling()
            );

            if lattice.terminal_node.is_none() {
                let id = lattice.add_node(&best.0.to_string(), word, -1, -1);
                lattice.terminal_node = Some(id);
            }
            lattice.collapse_word_token(arena, alternates, word_token, &mut visited);
        }

        if cfg!(debug_assertions) {
            lattice.check_consistency();
        }
        lattice
    }

    /// The node representing `token`'s word, created on first use. Every
    /// sentence-end token maps to the single terminal node.
    fn node_for_token(&mut self, arena: &TokenArena, token: TokenId) -> NodeId {
        let word = arena[token]
            .word()
            .cloned()
            .unwrap_or_else(|| panic!("lattice node requested for a non-word token"));
        if word.is_sentence_end() {
            return self
                .terminal_node
                .clone()
                .unwrap_or_else(|| panic!("terminal node not yet created"));
        }
        let id = NodeId::new(&token.0.to_string());
        if !self.nodes.contains_key(&id) {
            let end_time = arena[token].frame_number();
            self.nodes
                .insert(id.clone(), Node::new(id.clone(), word, -1, end_time));
        }
        id
    }

    fn collapse_word_token(
        &mut self,
        arena: &TokenArena,
        alternates: &AlternateHypothesisManager,
        token: TokenId,
        visited: &mut HashSet<TokenId>,
    ) {
        if !visited.insert(token) {
            return;
        }
        let node = self.node_for_token(arena, token);
        let acoustic = (arena[token].acoustic_score() + arena[token].insertion_score()) as f64;
        let language = arena[token].language_score() as f64;

        self.collapse_word_path(
            arena,
            alternates,
            &node,
            arena[token].predecessor(),
            acoustic,
            language,
            visited,
        );
        if let Some(losers) = alternates.alternate_predecessors(token) {
            for &loser in losers {
                self.collapse_word_path(
                    arena,
                    alternates,
                    &node,
                    Some(loser),
                    acoustic,
                    language,
                    visited,
                );
            }
        }
    }

    /// Collapses the non-word run ending at `token` into an edge into
    /// `parent`, accumulating score deltas along the way.
    #[allow(clippy::too_many_arguments)]
    fn collapse_word_path(
        &mut self,
        arena: &TokenArena,
        alternates: &AlternateHypothesisManager,
        parent: &NodeId,
        token: Option<TokenId>,
        mut acoustic: f64,
        mut language: f64,
        visited: &mut HashSet<TokenId>,
    ) {
        let Some(mut token) = token else { return };

        if arena[token].is_word() {
            let from = self.node_for_token(arena, token);
            self.add_edge(&from, parent, acoustic, language);
            if arena[token].predecessor().is_some() {
                self.collapse_word_token(arena, alternates, token, visited);
            } else {
                let word = arena[token].word().cloned();
                assert!(
                    word.is_some_and(|w| w.is_sentence_start()),
                    "lattice path does not begin at the sentence-start word"
                );
                self.initial_node = Some(from);
            }
            return;
        }

        // fast-forward through the non-word tokens, stopping when a word
        // predecessor or a token with alternates is reached
        loop {
            acoustic += (arena[token].acoustic_score() + arena[token].insertion_score()) as f64;
            language += arena[token].language_score() as f64;
            let Some(predecessor) = arena[token].predecessor() else {
                return;
            };
            if arena[predecessor].is_word() || alternates.has_alternate_predecessors(token) {
                break;
            }
            token = predecessor;
        }

        self.collapse_word_path(
            arena,
            alternates,
            parent,
            arena[token].predecessor(),
            acoustic,
            language,
            visited,
        );
        if let Some(losers) = alternates.alternate_predecessors(token) {
            for &loser in losers {
                self.collapse_word_path(
                    arena,
                    alternates,
                    parent,
                    Some(loser),
                    acoustic,
                    language,
                    visited,
                );
            }
        }
    }

    pub(crate) fn node(&self, id: &NodeId) -> &Node {
        match self.nodes.get(id) {
            Some(node) => node,
            None => panic!("lattice references unknown node {}", id),
        }
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> &mut Node {
        match self.nodes.get_mut(id) {
            Some(node) => node,
            None => panic!("lattice references unknown node {}", id),
        }
    }

    /// The edge with the given id.
    ///
    /// # Panics
    /// Panics on an unknown id; edge ids never escape the lattice they
    /// belong to.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        match self.edges.get(&id) {
            Some(edge) => edge,
            None => panic!("lattice references unknown edge {:?}", id),
        }
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        match self.edges.get_mut(&id) {
            Some(edge) => edge,
            None => panic!("lattice references unknown edge {:?}", id),
        }
    }

    /// Removes a single edge, detaching it from both endpoint nodes.
    pub(crate) fn remove_edge(&mut self, id: EdgeId) {
        let edge = match self.edges.remove(&id) {
            Some(edge) => edge,
            None => panic!("removing unknown lattice edge {:?}", id),
        };
        let from = edge.from_node().clone();
        let to = edge.to_node().clone();
        self.node_mut(&from).remove_leaving_edge(id);
        self.node_mut(&to).remove_entering_edge(id);
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Snapshot of the node ids, for iterations that mutate the lattice.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn initial_node(&self) -> Option<&NodeId> {
        self.initial_node.as_ref()
    }

    pub fn terminal_node(&self) -> Option<&NodeId> {
        self.terminal_node.as_ref()
    }

    pub fn set_initial_node(&mut self, id: NodeId) {
        assert!(self.has_node(&id), "initial node {} not in lattice", id);
        self.initial_node = Some(id);
    }

    pub fn set_terminal_node(&mut self, id: NodeId) {
        assert!(self.has_node(&id), "terminal node {} not in lattice", id);
        self.terminal_node = Some(id);
    }

    pub fn log_math(&self) -> &Arc<LogMath> {
        &self.log_math
    }

    /// Adds a node with an explicit id. Panics on a duplicate id.
    pub fn add_node(&mut self, id: &str, word: Word, begin_time: i32, end_time: i32) -> NodeId {
        let id = NodeId::new(id);
        assert!(
            !self.nodes.contains_key(&id),
            "duplicate lattice node id {}",
            id
        );
        self.nodes
            .insert(id.clone(), Node::new(id.clone(), word, begin_time, end_time));
        id
    }

    /// Adds an edge and wires it into both endpoint nodes.
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId, acoustic: f64, lm: f64) -> EdgeId {
        let id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;
        self.node_mut(from).add_leaving_edge(id);
        self.node_mut(to).add_entering_edge(id);
        self.edges
            .insert(id, Edge::new(id, from.clone(), to.clone(), acoustic, lm));
        id
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node_and_edges(&mut self, id: &NodeId) {
        let node = match self.nodes.remove(id) {
            Some(node) => node,
            None => panic!("removing unknown lattice node {}", id),
        };
        for &e in node.leaving_edges() {
            let edge = match self.edges.remove(&e) {
                Some(edge) => edge,
                None => panic!("lattice references unknown edge {:?}", e),
            };
            if edge.to_node() != id {
                self.node_mut(&edge.to_node().clone()).remove_entering_edge(e);
            }
        }
        for &e in node.entering_edges() {
            let edge = match self.edges.remove(&e) {
                Some(edge) => edge,
                None => panic!("lattice references unknown edge {:?}", e),
            };
            if edge.from_node() != id {
                self.node_mut(&edge.from_node().clone()).remove_leaving_edge(e);
            }
        }
        if cfg!(debug_assertions) {
            self.check_consistency();
        }
    }

    /// Removes a node, cross connecting its predecessors to its successors.
    ///
    /// Given edges A-->X, B-->X, X-->M, X-->N, removing X leaves
    /// A-->M, A-->N, B-->M, B-->N, each new edge carrying the entering
    /// edge's scores.
    pub fn remove_node_and_cross_connect_edges(&mut self, id: &NodeId) {
        debug!(node = %id, "removing node and cross connecting edges");
        let entering = self.node(id).entering_edges().to_vec();
        let leaving = self.node(id).leaving_edges().to_vec();
        for &ei in &entering {
            for &ej in &leaving {
                let (from, acoustic, lm) = {
                    let e = self.edge(ei);
                    (e.from_node().clone(), e.acoustic_score(), e.lm_score())
                };
                let to = self.edge(ej).to_node().clone();
                self.add_edge(&from, &to, acoustic, lm);
            }
        }
        self.remove_node_and_edges(id);
    }

    fn is_filler_node(&self, id: &NodeId) -> bool {
        let word = self.node(id).word();
        word.is_filler() || word.spelling() == SILENCE_SPELLING
    }

    /// Removes every filler node, cross connecting around it.
    pub fn remove_fillers(&mut self) {
        for id in self.sort_nodes() {
            if self.has_node(&id) && self.is_filler_node(&id) {
                self.remove_node_and_cross_connect_edges(&id);
            }
        }
    }

    /// Topologically sorted node ids, initial node first.
    pub fn sort_nodes(&self) -> Vec<NodeId> {
        let mut sorted = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        if let Some(initial) = &self.initial_node {
            self.sort_helper(initial, &mut sorted, &mut visited);
        }
        sorted.reverse();
        sorted
    }

    fn sort_helper(&self, id: &NodeId, sorted: &mut Vec<NodeId>, visited: &mut HashSet<NodeId>) {
        if !visited.insert(id.clone()) {
            return;
        }
        for &e in self.node(id).leaving_edges() {
            let to = self.edge(e).to_node().clone();
            self.sort_helper(&to, sorted, visited);
        }
        sorted.push(id.clone());
    }

    /// A node's begin frame: the stored value, or the latest end frame of its
    /// predecessors when unknown.
    pub fn node_begin_time(&self, id: &NodeId) -> i32 {
        let node = self.node(id);
        if node.raw_begin_time() >= 0 {
            return node.raw_begin_time();
        }
        let mut begin = 0;
        for &e in node.entering_edges() {
            let from_end = self.node(self.edge(e).from_node()).end_time();
            if from_end > begin {
                begin = from_end;
            }
        }
        begin
    }

    fn edge_score(
        &self,
        edge: &Edge,
        language_model_weight_adjustment: f32,
        use_acoustic_scores_only: bool,
    ) -> f64 {
        if use_acoustic_scores_only {
            edge.acoustic_score()
        } else {
            edge.acoustic_score() + edge.lm_score() * language_model_weight_adjustment as f64
        }
    }

    /// Forward-backward pass over the (acyclic) lattice: fills in forward,
    /// backward and posterior scores for every node, and the Viterbi
    /// best-predecessor links used by [`Lattice::viterbi_path`].
    pub fn compute_node_posteriors(
        &mut self,
        language_model_weight_adjustment: f32,
        use_acoustic_scores_only: bool,
    ) {
        let Some(initial) = self.initial_node.clone() else {
            return;
        };
        let terminal = match self.terminal_node.clone() {
            Some(t) => t,
            None => panic!("lattice has no terminal node"),
        };

        self.node_mut(&initial)
            .set_forward_score(LogMath::LOG_ONE as f64);
        self.node_mut(&initial)
            .set_viterbi_score(LogMath::LOG_ONE as f64);

        let sorted = self.sort_nodes();
        assert_eq!(
            sorted.first(),
            Some(&initial),
            "initial node is not first in topological order"
        );
        assert_eq!(
            sorted.last(),
            Some(&terminal),
            "terminal node is not last in topological order"
        );

        // forward and Viterbi
        for current in &sorted {
            let leaving = self.node(current).leaving_edges().to_vec();
            for e in leaving {
                let (to, score) = {
                    let edge = self.edge(e);
                    (
                        edge.to_node().clone(),
                        self.edge_score(
                            edge,
                            language_model_weight_adjustment,
                            use_acoustic_scores_only,
                        ),
                    )
                };
                let forward = self.node(current).forward_score() + score;
                let combined = self
                    .log_math
                    .add_as_linear(forward as f32, self.node(&to).forward_score() as f32)
                    as f64;
                self.node_mut(&to).set_forward_score(combined);

                let viterbi = self.node(current).viterbi_score() + score;
                let to_node = self.node(&to);
                if to_node.best_predecessor().is_none() || viterbi > to_node.viterbi_score() {
                    let predecessor = current.clone();
                    let to_node = self.node_mut(&to);
                    to_node.set_best_predecessor(Some(predecessor));
                    to_node.set_viterbi_score(viterbi);
                }
            }
        }

        // backward
        self.node_mut(&terminal)
            .set_backward_score(LogMath::LOG_ONE as f64);
        for current in sorted[..sorted.len() - 1].iter().rev() {
            let leaving = self.node(current).leaving_edges().to_vec();
            for e in leaving {
                let (to, score) = {
                    let edge = self.edge(e);
                    (
                        edge.to_node().clone(),
                        self.edge_score(
                            edge,
                            language_model_weight_adjustment,
                            use_acoustic_scores_only,
                        ),
                    )
                };
                let backward = self.node(&to).backward_score() + score;
                let combined = self
                    .log_math
                    .add_as_linear(backward as f32, self.node(current).backward_score() as f32)
                    as f64;
                self.node_mut(current).set_backward_score(combined);
            }
        }

        // posteriors, normalized by the total path mass
        let normalization = self.node(&terminal).forward_score();
        for id in self.node_ids() {
            let node = self.node(&id);
            let posterior = node.forward_score() + node.backward_score() - normalization;
            self.node_mut(&id).set_posterior(posterior);
        }
    }

    /// The maximum-score path from initial to terminal node. Only meaningful
    /// after [`Lattice::compute_node_posteriors`].
    pub fn viterbi_path(&self) -> Vec<NodeId> {
        let (Some(initial), Some(terminal)) = (&self.initial_node, &self.terminal_node) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut current = terminal.clone();
        while current != *initial {
            path.push(current.clone());
            current = match self.node(&current).best_predecessor() {
                Some(p) => p.clone(),
                None => panic!("viterbi link missing; compute_node_posteriors must run first"),
            };
        }
        path.push(initial.clone());
        path.reverse();
        path
    }

    /// Every word-label path from the initial to the terminal node.
    pub fn all_paths(&self) -> Vec<String> {
        match &self.initial_node {
            Some(initial) => self.all_paths_from("", initial),
            None => Vec::new(),
        }
    }

    fn all_paths_from(&self, path: &str, id: &NodeId) -> Vec<String> {
        let word = self.node(id).word().spelling();
        let extended = if path.is_empty() {
            word.to_owned()
        } else {
            format!("{} {}", path, word)
        };
        if Some(id) == self.terminal_node.as_ref() {
            return vec![extended];
        }
        let mut paths = Vec::new();
        for &e in self.node(id).leaving_edges() {
            paths.extend(self.all_paths_from(&extended, self.edge(e).to_node()));
        }
        paths
    }

    /// Verifies node/edge cross references.
    ///
    /// # Panics
    /// Panics on any dangling reference; an inconsistent lattice is a logic
    /// defect, not a recoverable condition.
    pub fn check_consistency(&self) {
        for node in self.nodes.values() {
            for &e in node.entering_edges().iter().chain(node.leaving_edges()) {
                assert!(
                    self.edges.contains_key(&e),
                    "node {} references missing edge {:?}",
                    node.id(),
                    e
                );
            }
        }
        for edge in self.edges.values() {
            assert!(
                self.has_node(edge.from_node()),
                "edge {} has a missing from node",
                edge
            );
            assert!(
                self.has_node(edge.to_node()),
                "edge {} has a missing to node",
                edge
            );
            assert!(
                self.node(edge.to_node()).entering_edges().contains(&edge.id()),
                "edge {} is not entering its to node",
                edge
            );
            assert!(
                self.node(edge.from_node()).leaving_edges().contains(&edge.id()),
                "edge {} is not leaving its from node",
                edge
            );
        }
    }

    /// True when `from` has an edge to `to`.
    pub fn has_edge_between(&self, from: &NodeId, to: &NodeId) -> bool {
        self.find_edge_between(from, to).is_some()
    }

    /// The first edge from `from` to `to`, if any.
    pub fn find_edge_between(&self, from: &NodeId, to: &NodeId) -> Option<EdgeId> {
        self.node(from)
            .leaving_edges()
            .iter()
            .copied()
            .find(|&e| self.edge(e).to_node() == to)
    }

    /// True when both nodes receive edges from exactly the same set of nodes.
    pub fn has_equivalent_entering_edges(&self, a: &NodeId, b: &NodeId) -> bool {
        let node_a = self.node(a);
        let node_b = self.node(b);
        if node_a.entering_edges().len() != node_b.entering_edges().len() {
            return false;
        }
        node_a.entering_edges().iter().all(|&e| {
            let from = self.edge(e).from_node();
            self.has_edge_between(from, b)
        })
    }

    /// True when both nodes send edges to exactly the same set of nodes.
    pub fn has_equivalent_leaving_edges(&self, a: &NodeId, b: &NodeId) -> bool {
        let node_a = self.node(a);
        let node_b = self.node(b);
        if node_a.leaving_edges().len() != node_b.leaving_edges().len() {
            return false;
        }
        node_a.leaving_edges().iter().all(|&e| {
            let to = self.edge(e).to_node();
            self.has_edge_between(b, to)
        })
    }

    fn nodes_label_equivalent(&self, other: &Lattice, n1: &NodeId, n2: &NodeId) -> bool {
        let a = self.node(n1);
        let b = other.node(n2);
        a.word().spelling() == b.word().spelling()
            && a.entering_edges().len() == b.entering_edges().len()
            && a.leaving_edges().len() == b.leaving_edges().len()
            && self.node_begin_time(n1) == other.node_begin_time(n2)
            && a.end_time() == b.end_time()
    }

    /// Structural equivalence: both lattices describe the same node/edge
    /// graph, compared recursively from the initial nodes.
    pub fn is_equivalent(&self, other: &Lattice) -> bool {
        match (&self.initial_node, &other.initial_node) {
            (Some(a), Some(b)) => self.check_nodes_equivalent(other, a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn check_nodes_equivalent(&self, other: &Lattice, n1: &NodeId, n2: &NodeId) -> bool {
        if !self.nodes_label_equivalent(other, n1, n2) {
            return false;
        }
        let mut remaining: Vec<EdgeId> = other.node(n2).leaving_edges().to_vec();
        for &e in self.node(n1).leaving_edges() {
            let to1 = self.edge(e).to_node();
            let matched = remaining.iter().position(|&e2| {
                self.nodes_label_equivalent(other, to1, other.edge(e2).to_node())
            });
            match matched {
                None => return false,
                Some(index) => {
                    let e2 = remaining.swap_remove(index);
                    if !self.check_nodes_equivalent(other, to1, other.edge(e2).to_node()) {
                        return false;
                    }
                }
            }
        }
        remaining.is_empty()
    }

    /// Writes the `.LAT` text form: node and edge records followed by the
    /// initial/terminal/log-base trailers.
    pub fn dump<W: IoWrite>(&self, out: &mut W) -> Result<()> {
        for node in self.nodes.values() {
            writeln!(
                out,
                "node: {} {} p:{}",
                node.id(),
                node.word().spelling(),
                node.posterior()
            )?;
        }
        for edge in self.edges.values() {
            writeln!(
                out,
                "edge: {} {} {} {}",
                edge.from_node(),
                edge.to_node(),
                edge.acoustic_score(),
                edge.lm_score()
            )?;
        }
        let initial = match &self.initial_node {
            Some(id) => id,
            None => panic!("dumping a lattice with no initial node"),
        };
        let terminal = match &self.terminal_node {
            Some(id) => id,
            None => panic!("dumping a lattice with no terminal node"),
        };
        writeln!(out, "initialNode: {}", initial)?;
        writeln!(out, "terminalNode: {}", terminal)?;
        writeln!(out, "logBase: {}", self.log_math.log_base())?;
        Ok(())
    }

    /// Dumps to a `.LAT` file.
    pub fn dump_to_file(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "dumping lattice");
        let mut out = BufWriter::new(File::create(path)?);
        self.dump(&mut out)
    }

    /// Loads a lattice from a `.LAT` file.
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading lattice");
        Self::load_from(BufReader::new(File::open(path)?))
    }

    /// Parses the `.LAT` text form produced by [`Lattice::dump`].
    pub fn load_from<R: BufRead>(reader: R) -> Result<Self> {
        let mut lattice = Self::new(LogMath::default_base());
        let mut initial: Option<(usize, String)> = None;
        let mut terminal: Option<(usize, String)> = None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let mut parts = line.split_whitespace();
            let Some(tag) = parts.next() else { continue };
            match tag {
                "node:" => {
                    let id = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "node record missing id"))?;
                    let spelling = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "node record missing word"))?;
                    if lattice.has_node(&NodeId::new(id)) {
                        return Err(format_err(line_no, format!("duplicate node id '{}'", id)));
                    }
                    let word = if spelling == SILENCE_SPELLING {
                        Word::filler(spelling)
                    } else {
                        Word::new(spelling)
                    };
                    let node_id = lattice.add_node(id, word, -1, -1);
                    if let Some(posterior) = parts.next().and_then(|t| t.strip_prefix("p:")) {
                        let posterior: f64 = posterior.parse().map_err(|_| {
                            format_err(line_no, format!("bad posterior '{}'", posterior))
                        })?;
                        lattice.node_mut(&node_id).set_posterior(posterior);
                    }
                }
                "edge:" => {
                    let from = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "edge record missing from node"))?;
                    let to = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "edge record missing to node"))?;
                    let acoustic: f64 = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "edge record missing acoustic score"))?
                        .parse()
                        .map_err(|_| format_err(line_no, "bad acoustic score"))?;
                    let lm: f64 = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "edge record missing language score"))?
                        .parse()
                        .map_err(|_| format_err(line_no, "bad language score"))?;
                    let from = NodeId::new(from);
                    let to = NodeId::new(to);
                    if !lattice.has_node(&from) || !lattice.has_node(&to) {
                        return Err(format_err(line_no, "edge references an undefined node"));
                    }
                    lattice.add_edge(&from, &to, acoustic, lm);
                }
                "initialNode:" => {
                    let id = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "initialNode record missing id"))?;
                    initial = Some((line_no, id.to_owned()));
                }
                "terminalNode:" => {
                    let id = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "terminalNode record missing id"))?;
                    terminal = Some((line_no, id.to_owned()));
                }
                "logBase:" => {
                    let base: f64 = parts
                        .next()
                        .ok_or_else(|| format_err(line_no, "logBase record missing value"))?
                        .parse()
                        .map_err(|_| format_err(line_no, "bad log base"))?;
                    if base <= 1.0 {
                        return Err(format_err(line_no, "log base must be greater than 1.0"));
                    }
                    lattice.log_math = LogMath::new(base);
                }
                other => {
                    return Err(format_err(
                        line_no,
                        format!("unknown record type '{}'", other),
                    ));
                }
            }
        }

        let (line_no, id) =
            initial.ok_or_else(|| format_err(0, "missing initialNode trailer"))?;
        let id = NodeId::new(&id);
        if !lattice.has_node(&id) {
            return Err(format_err(line_no, "initialNode references undefined node"));
        }
        lattice.initial_node = Some(id);

        let (line_no, id) =
            terminal.ok_or_else(|| format_err(0, "missing terminalNode trailer"))?;
        let id = NodeId::new(&id);
        if !lattice.has_node(&id) {
            return Err(format_err(line_no, "terminalNode references undefined node"));
        }
        lattice.terminal_node = Some(id);

        Ok(lattice)
    }

    fn posterior_label(&self, node: &Node) -> String {
        if node.posterior() <= LogMath::LOG_ZERO as f64 {
            "log zero".to_owned()
        } else {
            node.posterior().to_string()
        }
    }

    /// Graphviz export, visualization only.
    pub fn dump_dot<W: IoWrite>(&self, out: &mut W, title: &str) -> Result<()> {
        writeln!(out, "digraph \"{}\" {{", title)?;
        writeln!(out, "rankdir = LR")?;
        for node in self.nodes.values() {
            writeln!(
                out,
                "\tnode{} [ label=\"{}[{},{} p:{}]\" ]",
                node.id(),
                node.word().spelling(),
                self.node_begin_time(node.id()),
                node.end_time(),
                self.posterior_label(node)
            )?;
        }
        for edge in self.edges.values() {
            writeln!(
                out,
                "\tnode{} -> node{} [ label=\"a:{} l:{}\" ]",
                edge.from_node(),
                edge.to_node(),
                edge.acoustic_score(),
                edge.lm_score()
            )?;
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    /// AiSee export, visualization only.
    pub fn dump_aisee<W: IoWrite>(&self, out: &mut W, title: &str) -> Result<()> {
        writeln!(out, "graph: {{")?;
        writeln!(out, "title: \"{}\"", title)?;
        writeln!(out, "display_edge_labels: yes")?;
        for node in self.nodes.values() {
            writeln!(
                out,
                "node: {{ title: \"{}\" label: \"{}[{},{} p:{}]\" }}",
                node.id(),
                node.word().spelling(),
                self.node_begin_time(node.id()),
                node.end_time(),
                self.posterior_label(node)
            )?;
        }
        for edge in self.edges.values() {
            writeln!(
                out,
                "edge: {{ sourcename: \"{}\" targetname: \"{}\" label: \"a:{} l:{}\" }}",
                edge.from_node(),
                edge.to_node(),
                edge.acoustic_score(),
                edge.lm_score()
            )?;
        }
        writeln!(out, "}}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::graph::{StateId, StateInfo, StateKind, Word};

    /// <s> --> cat --> </s> and <s> --> dog --> </s>
    fn two_path_lattice() -> Lattice {
        let mut lattice = Lattice::new(LogMath::default_base());
        let start = lattice.add_node("0", Word::sentence_start(), 0, 0);
        let cat = lattice.add_node("1", Word::new("cat"), 1, 5);
        let dog = lattice.add_node("2", Word::new("dog"), 1, 5);
        let end = lattice.add_node("3", Word::sentence_end(), 6, 8);
        lattice.add_edge(&start, &cat, -1.0, 0.0);
        lattice.add_edge(&start, &dog, -2.0, 0.0);
        lattice.add_edge(&cat, &end, -1.0, 0.0);
        lattice.add_edge(&dog, &end, -1.0, 0.0);
        lattice.set_initial_node(start);
        lattice.set_terminal_node(end);
        lattice
    }

    #[test]
    fn test_well_formedness() {
        let lattice = two_path_lattice();
        lattice.check_consistency();
        assert!(lattice.initial_node().is_some());
        assert!(lattice.terminal_node().is_some());
        // every non-initial node has an entering edge
        for node in lattice.nodes() {
            if Some(node.id()) != lattice.initial_node() {
                assert!(!node.entering_edges().is_empty(), "{} lacks an entering edge", node.id());
            }
            if Some(node.id()) != lattice.terminal_node() {
                assert!(!node.leaving_edges().is_empty(), "{} lacks a leaving edge", node.id());
            }
        }
    }

    #[test]
    fn test_all_paths() {
        let lattice = two_path_lattice();
        let mut paths = lattice.all_paths();
        paths.sort();
        assert_eq!(paths, vec!["<s> cat </s>", "<s> dog </s>"]);
    }

    #[test]
    fn test_sort_nodes_is_topological() {
        let lattice = two_path_lattice();
        let sorted = lattice.sort_nodes();
        assert_eq!(sorted.len(), 4);
        assert_eq!(Some(&sorted[0]), lattice.initial_node());
        assert_eq!(sorted.last(), lattice.terminal_node());
    }

    #[test]
    fn test_posteriors_and_viterbi_path() {
        let mut lattice = two_path_lattice();
        lattice.compute_node_posteriors(1.0, false);

        let cat = NodeId::new("1");
        let dog = NodeId::new("2");
        // cat carries more probability mass (-2 vs -3 total path score)
        assert!(lattice.get_node(&cat).unwrap().posterior() > lattice.get_node(&dog).unwrap().posterior());
        // single-path posteriors are bounded by log one
        assert!(lattice.get_node(&cat).unwrap().posterior() <= 1e-6);

        let path = lattice.viterbi_path();
        let words: Vec<&str> = path
            .iter()
            .map(|id| lattice.get_node(id).unwrap().word().spelling())
            .collect();
        assert_eq!(words, vec!["<s>", "cat", "</s>"]);
    }

    #[test]
    fn test_linear_lattice_posterior_is_log_one() {
        let mut lattice = Lattice::new(LogMath::default_base());
        let start = lattice.add_node("0", Word::sentence_start(), 0, 0);
        let word = lattice.add_node("1", Word::new("w"), 1, 3);
        let end = lattice.add_node("2", Word::sentence_end(), 4, 5);
        lattice.add_edge(&start, &word, -4.0, -1.0);
        lattice.add_edge(&word, &end, -2.0, -1.0);
        lattice.set_initial_node(start);
        lattice.set_terminal_node(end.clone());
        lattice.compute_node_posteriors(1.0, false);
        for node in lattice.nodes() {
            assert!(node.posterior().abs() < 1e-3, "posterior of {} was {}", node.id(), node.posterior());
        }
        assert!((lattice.get_node(&end).unwrap().forward_score() - (-8.0)).abs() < 1e-3);
    }

    #[test]
    fn test_remove_fillers_cross_connects() {
        let mut lattice = Lattice::new(LogMath::default_base());
        let start = lattice.add_node("0", Word::sentence_start(), 0, 0);
        let sil = lattice.add_node("1", Word::silence(), 1, 2);
        let word = lattice.add_node("2", Word::new("w"), 3, 4);
        let end = lattice.add_node("3", Word::sentence_end(), 5, 6);
        lattice.add_edge(&start, &sil, -1.0, 0.0);
        lattice.add_edge(&sil, &word, -2.0, 0.0);
        lattice.add_edge(&word, &end, -3.0, 0.0);
        lattice.set_initial_node(start.clone());
        lattice.set_terminal_node(end);

        lattice.remove_fillers();

        assert!(!lattice.has_node(&sil));
        assert_eq!(lattice.num_nodes(), 3);
        assert!(lattice.has_edge_between(&start, &word));
        let mut paths = lattice.all_paths();
        paths.sort();
        assert_eq!(paths, vec!["<s> w </s>"]);
    }

    #[test]
    fn test_remove_node_and_edges_detaches_neighbors() {
        let mut lattice = two_path_lattice();
        let dog = NodeId::new("2");
        lattice.remove_node_and_edges(&dog);
        assert_eq!(lattice.num_nodes(), 3);
        assert_eq!(lattice.num_edges(), 2);
        lattice.check_consistency();
        assert_eq!(lattice.all_paths(), vec!["<s> cat </s>"]);
    }

    #[test]
    fn test_lat_round_trip() {
        let lattice = two_path_lattice();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lat");
        lattice.dump_to_file(&path).unwrap();

        let loaded = Lattice::load(&path).unwrap();
        assert_eq!(loaded.num_nodes(), lattice.num_nodes());
        assert_eq!(loaded.num_edges(), lattice.num_edges());
        assert_eq!(loaded.initial_node(), lattice.initial_node());
        assert_eq!(loaded.terminal_node(), lattice.terminal_node());
        assert!((loaded.log_math().log_base() - lattice.log_math().log_base()).abs() < 1e-12);

        let mut paths = loaded.all_paths();
        paths.sort();
        assert_eq!(paths, vec!["<s> cat </s>", "<s> dog </s>"]);
    }

    #[test]
    fn test_load_rejects_unknown_record() {
        let text = "node: 0 <s> p:0\nbogus: 1 2\n";
        let err = Lattice::load_from(text.as_bytes()).unwrap_err();
        match err {
            DecoderError::LatticeFormat { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_duplicate_node_id() {
        let text = "node: 0 <s> p:0\nnode: 0 <s> p:0\n";
        assert!(matches!(
            Lattice::load_from(text.as_bytes()),
            Err(DecoderError::LatticeFormat { line: 2, .. })
        ));
    }

    #[test]
    fn test_load_rejects_edge_to_undefined_node() {
        let text = "node: 0 <s> p:0\nedge: 0 9 -1.0 0.0\n";
        assert!(matches!(
            Lattice::load_from(text.as_bytes()),
            Err(DecoderError::LatticeFormat { line: 2, .. })
        ));
    }

    #[test]
    fn test_is_equivalent_distinguishes_labels() {
        let a = two_path_lattice();
        let b = two_path_lattice();
        assert!(a.is_equivalent(&b));

        let mut c = Lattice::new(LogMath::default_base());
        let start = c.add_node("0", Word::sentence_start(), 0, 0);
        let bird = c.add_node("1", Word::new("bird"), 1, 5);
        let dog = c.add_node("2", Word::new("dog"), 1, 5);
        let end = c.add_node("3", Word::sentence_end(), 6, 8);
        c.add_edge(&start, &bird, -1.0, 0.0);
        c.add_edge(&start, &dog, -2.0, 0.0);
        c.add_edge(&bird, &end, -1.0, 0.0);
        c.add_edge(&dog, &end, -1.0, 0.0);
        c.set_initial_node(start);
        c.set_terminal_node(end);
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_dot_dump_contains_nodes_and_edges() {
        let lattice = two_path_lattice();
        let mut out = Vec::new();
        lattice.dump_dot(&mut out, "test").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph \"test\" {"));
        assert!(text.contains("cat"));
        assert!(text.contains("node0 -> node1") || text.contains("node0 -> node2"));
        assert!(text.trim_end().ends_with('}'));
    }

    fn token(
        arena: &mut TokenArena,
        pred: Option<TokenId>,
        kind: StateKind,
        emitting: bool,
        frame: i32,
    ) -> TokenId {
        let info = StateInfo {
            kind,
            emitting,
            order: 0,
        };
        arena.alloc(pred, StateId(arena.len() as u64), &info, 0.0, 0.0, 0.0, frame)
    }

    #[test]
    fn test_from_result_expands_alternates_into_parallel_edges() {
        let mut arena = TokenArena::new();
        let start = token(&mut arena, None, StateKind::Word(Word::sentence_start()), false, 0);
        let h1 = token(&mut arena, Some(start), StateKind::Hmm, true, 1);
        arena[h1].apply_acoustic_score(-1.0);
        let h2 = token(&mut arena, Some(h1), StateKind::Hmm, true, 2);
        arena[h2].apply_acoustic_score(-2.0);
        let word = token(&mut arena, Some(h2), StateKind::Word(Word::new("x")), false, 2);
        // the loser path into the word, through a worse-scoring HMM run
        let h_loser = token(&mut arena, Some(start), StateKind::Hmm, true, 2);
        arena[h_loser].apply_acoustic_score(-5.0);
        let fin = token(&mut arena, Some(word), StateKind::Final(Word::sentence_end()), false, 3);

        let mut alternates = AlternateHypothesisManager::new(10);
        alternates.add_alternate_predecessor(&arena, word, h_loser);

        let result = DecodeResult::new(Vec::new(), vec![fin], 3, true);
        let lattice = Lattice::from_result(&result, &arena, &alternates, LogMath::default_base());
        lattice.check_consistency();

        assert_eq!(lattice.num_nodes(), 3);
        assert_eq!(lattice.num_edges(), 3);
        assert!(lattice.initial_node().is_some());
        assert!(lattice.terminal_node().is_some());

        let paths = lattice.all_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p == "<s> x </s>"));

        // the viterbi run collapses to -3, the loser run to -5
        let initial = lattice.initial_node().unwrap();
        let word_node = lattice
            .nodes()
            .find(|n| n.word().spelling() == "x")
            .unwrap()
            .id()
            .clone();
        let mut scores: Vec<f64> = lattice
            .get_node(initial)
            .unwrap()
            .leaving_edges()
            .iter()
            .map(|&e| {
                assert_eq!(lattice.edge(e).to_node(), &word_node);
                lattice.edge(e).acoustic_score()
            })
            .collect();
        scores.sort_by(f64::total_cmp);
        assert_eq!(scores, vec![-5.0, -3.0]);
    }

    #[test]
    fn test_begin_time_derived_from_predecessors() {
        let mut lattice = Lattice::new(LogMath::default_base());
        let start = lattice.add_node("0", Word::sentence_start(), 0, 3);
        let word = lattice.add_node("1", Word::new("w"), -1, 7);
        lattice.add_edge(&start, &word, -1.0, 0.0);
        lattice.set_initial_node(start);
        assert_eq!(lattice.node_begin_time(&NodeId::new("1")), 3);
        assert_eq!(lattice.node_begin_time(&NodeId::new("0")), 0);
    }
}
