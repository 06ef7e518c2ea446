//! Benchmarks for the decode hot paths: the full score/prune/grow cycle and
//! active list purging on its own.

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lattice_decoder::config::DecoderConfig;
use lattice_decoder::logmath::LogMath;
use lattice_decoder::search::{
    ActiveListFactory, PurgePolicy, SearchGraph, SequenceScorer, SimplePruner, StateArc, StateId,
    StateInfo, StateKind, TokenArena, Word, WordPruningSearchManager,
};

struct BenchGraph {
    states: HashMap<StateId, (StateInfo, Vec<StateArc>)>,
    initial: StateId,
}

impl BenchGraph {
    /// A lexicon of `words` parallel word paths, each `depth` emitting states
    /// long, looping back from the word boundary so decoding runs for as many
    /// frames as the scorer supplies.
    fn lexicon(words: u64, depth: u64) -> Self {
        let mut states = HashMap::new();
        let start = StateId(0);
        states.insert(
            start,
            (
                StateInfo {
                    kind: StateKind::Word(Word::sentence_start()),
                    emitting: false,
                    order: 0,
                },
                Vec::new(),
            ),
        );
        let mut next_id = 1;
        for w in 0..words {
            let mut previous = start;
            for _ in 0..depth {
                let id = StateId(next_id);
                next_id += 1;
                states.insert(
                    id,
                    (
                        StateInfo {
                            kind: StateKind::Hmm,
                            emitting: true,
                            order: 2,
                        },
                        vec![StateArc {
                            target: id,
                            acoustic_probability: 0.0,
                            insertion_probability: 0.0,
                            language_probability: -0.1,
                        }],
                    ),
                );
                let arc = StateArc {
                    target: id,
                    acoustic_probability: 0.0,
                    insertion_probability: 0.0,
                    language_probability: -0.5,
                };
                if let Some(state) = states.get_mut(&previous) {
                    state.1.push(arc);
                }
                previous = id;
            }
            let word = StateId(next_id);
            next_id += 1;
            states.insert(
                word,
                (
                    StateInfo {
                        kind: StateKind::Word(Word::new(&format!("w{}", w))),
                        emitting: false,
                        order: 0,
                    },
                    vec![StateArc {
                        target: start,
                        acoustic_probability: 0.0,
                        insertion_probability: 0.0,
                        language_probability: -0.2,
                    }],
                ),
            );
            let arc = StateArc {
                target: word,
                acoustic_probability: 0.0,
                insertion_probability: 0.0,
                language_probability: -0.3,
            };
            if let Some(state) = states.get_mut(&previous) {
                state.1.push(arc);
            }
        }
        Self {
            states,
            initial: start,
        }
    }

    fn emitting_states(&self) -> Vec<StateId> {
        self.states
            .iter()
            .filter(|(_, (info, _))| info.emitting)
            .map(|(&id, _)| id)
            .collect()
    }
}

impl SearchGraph for BenchGraph {
    fn initial_state(&self) -> StateId {
        self.initial
    }

    fn num_state_order(&self) -> u32 {
        3
    }

    fn state_info(&self, state: StateId) -> StateInfo {
        self.states[&state].0.clone()
    }

    fn successors(&self, state: StateId) -> &[StateArc] {
        &self.states[&state].1
    }
}

fn flat_scorer(states: &[StateId], frames: usize) -> SequenceScorer {
    let frame: HashMap<StateId, f32> = states.iter().map(|&s| (s, -1.0)).collect();
    SequenceScorer::new(vec![frame; frames])
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &words in &[10u64, 50] {
        group.bench_with_input(
            BenchmarkId::new("lexicon_100_frames", words),
            &words,
            |b, &words| {
                b.iter(|| {
                    let graph = BenchGraph::lexicon(words, 3);
                    let scorer = flat_scorer(&graph.emitting_states(), 100);
                    let config = DecoderConfig {
                        absolute_beam_width: 500,
                        ..DecoderConfig::default()
                    };
                    let log_math = LogMath::new(config.log_base);
                    let mut manager = WordPruningSearchManager::new(
                        graph,
                        scorer,
                        SimplePruner,
                        &config,
                        log_math,
                    );
                    manager.start_recognition().unwrap();
                    let result = manager.recognize(100);
                    manager.stop_recognition();
                    black_box(result)
                });
            },
        );
    }
    group.finish();
}

fn bench_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("active_list_purge");
    for &size in &[1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("score_policy", size), &size, |b, &size| {
            let info = StateInfo {
                kind: StateKind::Hmm,
                emitting: true,
                order: 0,
            };
            b.iter(|| {
                let mut arena = TokenArena::with_capacity(size);
                let factory = ActiveListFactory::new(size / 4, -1_000.0, PurgePolicy::Score);
                let mut list = factory.create();
                for i in 0..size {
                    let id = arena.alloc(
                        None,
                        StateId(i as u64),
                        &info,
                        -((i % 97) as f32),
                        0.0,
                        0.0,
                        0,
                    );
                    list.add(&mut arena, id);
                }
                black_box(list.purge(&mut arena))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_purge);
criterion_main!(benches);
