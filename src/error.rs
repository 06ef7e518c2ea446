//! Custom error types for the lattice-decoder crate.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.
//!
//! Only recoverable conditions are modeled as errors. Consistency violations inside
//! the search or lattice machinery (a token routed to a missing active list, a lattice
//! edge referencing an unknown node) indicate logic defects and abort via assertions
//! instead of surfacing as `Err` values.

use std::io;
use thiserror::Error;

/// Primary error type for the decoder, covering all recoverable error cases.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// Errors from invalid configuration, detected at allocation time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors from malformed lattice dump files.
    #[error("Lattice format error at line {line}: {message}")]
    LatticeFormat {
        /// One-based line number in the offending file.
        line: usize,
        /// Description of the syntax problem.
        message: String,
    },

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience type alias for Results with DecoderError.
pub type Result<T> = std::result::Result<T, DecoderError>;
