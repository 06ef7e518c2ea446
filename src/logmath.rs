//! Log-domain arithmetic shared by every scoring component.
//!
//! All scores and probabilities in the decoder are kept in a log domain with a
//! configurable base (1.0001 by default, so one log unit is a very small relative
//! change and `f32` scores keep useful precision over long utterances). A `LogMath`
//! value is built once per decode session, is immutable afterwards, and is shared by
//! `Arc` between the search manager, the lattice and any scorer that needs it.
//!
//! Log-domain multiplication is plain addition. Log-domain addition
//! (`add_as_linear`) uses a table of correction terms memoized at construction,
//! falling back to exact math for differences beyond the table range.

use std::sync::Arc;

/// Default logarithm base, chosen so scores stay well within `f32` range.
pub const DEFAULT_LOG_BASE: f64 = 1.0001;

/// Upper bound on the memoized addition table size.
const MAX_ADD_TABLE_SIZE: usize = 150_000;

/// Immutable log-domain arithmetic helper.
#[derive(Debug)]
pub struct LogMath {
    log_base: f64,
    natural_log_base: f64,
    inverse_natural_log_base: f64,
    add_table: Vec<f32>,
}

impl LogMath {
    /// The log-domain value representing linear zero.
    pub const LOG_ZERO: f32 = -f32::MAX;

    /// The log-domain value representing linear one.
    pub const LOG_ONE: f32 = 0.0;

    /// Create a new `LogMath` for the given base, shared by `Arc`.
    ///
    /// # Panics
    /// Panics if `log_base` is not greater than 1.0; that is a construction-time
    /// programming error, not a runtime condition.
    pub fn new(log_base: f64) -> Arc<Self> {
        assert!(log_base > 1.0, "log base must be greater than 1.0");

        let natural_log_base = log_base.ln();
        let inverse_natural_log_base = 1.0 / natural_log_base;

        // Memoize log(1 + base^-d) for integer log-domain differences d. The table
        // ends where the correction term underflows to zero at f32 precision.
        let mut add_table = Vec::new();
        for diff in 0..MAX_ADD_TABLE_SIZE {
            let inner = 1.0 + (-(diff as f64) * natural_log_base).exp();
            let correction = (inner.ln() * inverse_natural_log_base) as f32;
            if correction <= 0.0 {
                break;
            }
            add_table.push(correction);
        }

        Arc::new(Self {
            log_base,
            natural_log_base,
            inverse_natural_log_base,
            add_table,
        })
    }

    /// Create a `LogMath` with the default base.
    pub fn default_base() -> Arc<Self> {
        Self::new(DEFAULT_LOG_BASE)
    }

    /// Returns the logarithm base.
    pub fn log_base(&self) -> f64 {
        self.log_base
    }

    /// Converts a linear-domain value to the log domain.
    pub fn linear_to_log(&self, linear: f64) -> f32 {
        if linear <= 0.0 {
            Self::LOG_ZERO
        } else {
            (linear.ln() * self.inverse_natural_log_base) as f32
        }
    }

    /// Converts a log-domain value back to the linear domain.
    pub fn log_to_linear(&self, log_value: f32) -> f64 {
        if log_value <= Self::LOG_ZERO {
            0.0
        } else {
            (log_value as f64 * self.natural_log_base).exp()
        }
    }

    /// Adds two log-domain values as if they were linear (log-sum).
    ///
    /// Computes `log(base^a + base^b)` using the memoized correction table when the
    /// difference falls inside it, otherwise exact floating-point math.
    pub fn add_as_linear(&self, a: f32, b: f32) -> f32 {
        if a <= Self::LOG_ZERO {
            return b;
        }
        if b <= Self::LOG_ZERO {
            return a;
        }

        let (highest, lowest) = if a >= b { (a, b) } else { (b, a) };
        let diff = highest - lowest;

        let index = diff as usize;
        if diff >= 0.0 && index < self.add_table.len() {
            return highest + self.add_table[index];
        }

        let inner = 1.0 + (-(diff as f64) * self.natural_log_base).exp();
        highest + (inner.ln() * self.inverse_natural_log_base) as f32
    }
}
