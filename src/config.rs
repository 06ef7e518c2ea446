//! Decoder configuration.
//!
//! This module centralizes the tunable parameters of the search and lattice
//! machinery. Values can be loaded from a TOML file and overridden by
//! environment variables; everything has a workable default for a medium
//! vocabulary task.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::search::active_list::{ActiveListFactory, PurgePolicy};
use crate::error::{DecoderError, Result};
use crate::logmath::{LogMath, DEFAULT_LOG_BASE};

// Default value functions for serde defaults
fn default_log_base() -> f64 {
    DEFAULT_LOG_BASE
}
fn default_absolute_beam_width() -> usize {
    2000
}
fn default_relative_beam_width() -> f64 {
    1e-60
}
fn default_absolute_word_beam_width() -> usize {
    20
}
fn default_relative_word_beam_width() -> f64 {
    1e-30
}
fn default_max_paths_per_word() -> usize {
    10
}
fn default_max_filler_words() -> usize {
    1
}
fn default_build_lattice() -> bool {
    true
}
fn default_max_lattice_edges() -> usize {
    100
}
fn default_check_prior_lists() -> bool {
    true
}

/// Search and lattice parameters loaded from multiple sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Base of the log domain all scores live in.
    #[serde(default = "default_log_base")]
    pub log_base: f64,

    /// Hard cap on tokens per emitting active list; 0 disables the cap.
    #[serde(default = "default_absolute_beam_width")]
    pub absolute_beam_width: usize,

    /// Linear relative beam (0, 1]; tokens scoring below best times this
    /// factor are outside the beam.
    #[serde(default = "default_relative_beam_width")]
    pub relative_beam_width: f64,

    /// Hard cap on tokens in the word active list; 0 disables the cap.
    #[serde(default = "default_absolute_word_beam_width")]
    pub absolute_word_beam_width: usize,

    /// Linear relative beam for the word active list.
    #[serde(default = "default_relative_word_beam_width")]
    pub relative_word_beam_width: f64,

    /// Surviving paths per distinct word after a word-list purge.
    #[serde(default = "default_max_paths_per_word")]
    pub max_paths_per_word: usize,

    /// Surviving filler-word tokens after a word-list purge.
    #[serde(default = "default_max_filler_words")]
    pub max_filler_words: usize,

    /// When nonzero, every Nth frame skips the grow step and carries its
    /// pruned frontier into the next frame.
    #[serde(default)]
    pub grow_skip_interval: u32,

    /// Record Viterbi losers for lattice alternate paths.
    #[serde(default = "default_build_lattice")]
    pub build_lattice: bool,

    /// Bound on in-edges per lattice node (Viterbi edge plus alternates).
    #[serde(default = "default_max_lattice_edges")]
    pub max_lattice_edges: usize,

    /// Frames of acoustic lookahead when growing emitting branches;
    /// 0 disables lookahead.
    #[serde(default)]
    pub acoustic_lookahead_frames: f32,

    /// Verify that expansion never targets a lower state order.
    #[serde(default)]
    pub check_state_order: bool,

    /// Verify that drained non-emitting levels stay empty.
    #[serde(default = "default_check_prior_lists")]
    pub check_prior_lists: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            log_base: default_log_base(),
            absolute_beam_width: default_absolute_beam_width(),
            relative_beam_width: default_relative_beam_width(),
            absolute_word_beam_width: default_absolute_word_beam_width(),
            relative_word_beam_width: default_relative_word_beam_width(),
            max_paths_per_word: default_max_paths_per_word(),
            max_filler_words: default_max_filler_words(),
            grow_skip_interval: 0,
            build_lattice: default_build_lattice(),
            max_lattice_edges: default_max_lattice_edges(),
            acoustic_lookahead_frames: 0.0,
            check_state_order: false,
            check_prior_lists: default_check_prior_lists(),
        }
    }
}

impl DecoderConfig {
    /// Load configuration with precedence:
    /// 1. Environment variables prefixed `LATTICE_DECODER_` (highest priority)
    /// 2. lattice-decoder.toml (if it exists)
    /// 3. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        let config: DecoderConfig = Figment::new()
            .merge(Serialized::defaults(DecoderConfig::default()))
            .merge(Toml::file("lattice-decoder.toml"))
            .merge(Env::prefixed("LATTICE_DECODER_"))
            .extract()
            .map_err(|e| {
                DecoderError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.log_base <= 1.0 {
            return Err(DecoderError::Configuration(
                "LOG_BASE must be greater than 1.0".to_string(),
            ));
        }

        for (name, value) in [
            ("RELATIVE_BEAM_WIDTH", self.relative_beam_width),
            ("RELATIVE_WORD_BEAM_WIDTH", self.relative_word_beam_width),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(DecoderError::Configuration(format!(
                    "{} must be in (0, 1]",
                    name
                )));
            }
        }

        if self.max_lattice_edges == 0 {
            return Err(DecoderError::Configuration(
                "MAX_LATTICE_EDGES must be at least 1".to_string(),
            ));
        }

        if self.acoustic_lookahead_frames < 0.0 {
            return Err(DecoderError::Configuration(
                "ACOUSTIC_LOOKAHEAD_FRAMES cannot be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Factories for the active list manager: a word-dedup list for the
    /// lowest order class and a plain score-ordered list reused for the rest.
    pub fn active_list_factories(&self, log_math: &LogMath) -> Vec<ActiveListFactory> {
        let word_factory = ActiveListFactory::new(
            self.absolute_word_beam_width,
            log_math.linear_to_log(self.relative_word_beam_width),
            PurgePolicy::WordDedup {
                max_paths_per_word: self.max_paths_per_word,
                max_filler_words: self.max_filler_words,
            },
        );
        let standard_factory = ActiveListFactory::new(
            self.absolute_beam_width,
            log_math.linear_to_log(self.relative_beam_width),
            PurgePolicy::Score,
        );
        vec![word_factory, standard_factory]
    }

    /// The relative beam as a non-positive log-domain offset.
    pub fn log_relative_beam_width(&self, log_math: &LogMath) -> f32 {
        log_math.linear_to_log(self.relative_beam_width)
    }

    /// Export configuration to TOML format.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DecoderError::Configuration(format!("Failed to serialize to TOML: {}", e)))
    }
}
