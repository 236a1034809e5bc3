use std::fmt::Debug;

use crate::utils::{db_to_linear, linear_to_db};

// -------------------------------------------------------------------------------------------------

/// Parameter scaling for float parameters, applied to convert normalized UI or automation
/// values to the internal values.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub enum ParameterScaling {
    #[default]
    /// Linear scaling: `y = x` (no transformation applied)
    Linear,

    /// Exponential scaling: `y = x^factor`
    /// Factor must be > 0.0.
    ///
    /// Factors between 2.0 - 3.0 are typically used for times and rates, to spread the short
    /// values over a larger part of the normalized range.
    Exponential(f32),

    /// Decibel scaling: maps normalized value to dB range, then converts to linear gain.
    /// Parameters are (min_db, max_db). max_db must be > min_db.
    ///
    /// Allows storing/applying a linear gain value while displaying a dB value with proper
    /// scaling. The internal value range should use `db_to_linear(min_db)..=db_to_linear(max_db)`.
    Decibel(f32, f32),
}

impl ParameterScaling {
    /// Apply scaling to a normalized f32 value.
    pub fn scale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => value.powf(*factor),
            ParameterScaling::Decibel(min_db, max_db) => {
                let db_value = min_db + value * (max_db - min_db);
                let linear_gain = db_to_linear(db_value);
                let (min_linear, max_linear) = (db_to_linear(*min_db), db_to_linear(*max_db));
                (linear_gain - min_linear) / (max_linear - min_linear)
            }
        }
    }

    /// Apply inverse scaling to a normalized f32 value.
    pub fn unscale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => {
                let factor = factor.abs().max(0.001);
                value.powf(1.0 / factor)
            }
            ParameterScaling::Decibel(min_db, max_db) => {
                let (min_linear, max_linear) = (db_to_linear(*min_db), db_to_linear(*max_db));
                let linear_gain = min_linear + value * (max_linear - min_linear);
                let db_value = linear_to_db(linear_gain);
                ((db_value - min_db) / (max_db - min_db)).clamp(0.0, 1.0)
            }
        }
    }

    pub(crate) const fn validate(&self) {
        match self {
            ParameterScaling::Linear => {}
            ParameterScaling::Exponential(factor) => {
                assert!(
                    *factor > 0.0,
                    "Invalid exponential parameter scaling factor (must be > 0)"
                );
            }
            ParameterScaling::Decibel(min_db, max_db) => {
                assert!(
                    *min_db < *max_db,
                    "Invalid decibel parameter scaling range (min_db must be < max_db)"
                );
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
