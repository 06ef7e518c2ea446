//! Large-vocabulary Viterbi beam-search decoding.
//!
//! This crate provides a time-synchronous token-passing decoder over an
//! externally supplied search graph, together with the word lattices the
//! decode produces: lattice construction from the token tree, posterior
//! scoring, equivalent-node minimization and `.LAT` file I/O.

pub mod config;
pub mod error;
pub mod lattice;
pub mod logmath;
pub mod search;

pub use config::DecoderConfig;
pub use error::{DecoderError, Result};
pub use logmath::LogMath;
