//! Engine parameter descriptors and a lock-free parameter value store.

use std::{fmt::Debug, ops::RangeInclusive};

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Describes the type of a [`Parameter`] to e.g. select a proper visual representation in a UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    /// A continuous floating-point value.
    Float {
        range: RangeInclusive<f32>,
        default: f32,
    },
    /// A discrete integer value.
    Integer {
        range: RangeInclusive<i32>,
        default: i32,
    },
    /// A choice from a list of strings (an enum).
    Enum {
        values: Vec<String>,
        default_index: usize,
    },
}

// -------------------------------------------------------------------------------------------------

/// Describes a single engine parameter for use in UIs, for automation or for the
/// [`ParameterStore`].
///
/// All values are passed around as *plain* `f32` values: the actual float value, the integer
/// value, or the index of an enum value. Normalized values are plain values mapped to the range
/// `0.0..=1.0`, applying the parameter's scaling.
pub trait Parameter: Debug + Send + Sync {
    /// The unique id of the parameter.
    fn id(&self) -> FourCC;

    /// The name of the parameter.
    fn name(&self) -> &'static str;

    /// The parameter type.
    fn parameter_type(&self) -> ParameterType;

    /// Default plain value of the parameter.
    fn default_plain_value(&self) -> f32;

    /// Clamp (and quantize, for discrete parameters) the given plain value into the
    /// parameter's range.
    fn clamp_plain_value(&self, value: f32) -> f32;

    /// Convert a plain value to a normalized value in range \[0,1\].
    fn normalize_plain_value(&self, value: f32) -> f32;

    /// Convert a normalized value in range \[0,1\] to a plain value.
    fn denormalize_value(&self, normalized: f32) -> f32;

    /// Convert the given plain value to a string value.
    fn plain_value_to_string(&self, value: f32, include_unit: bool) -> String;

    /// Convert the given string value to a plain value.
    /// Returns `None` when conversion failed, else a valid, clamped plain value.
    fn string_to_plain_value(&self, string: &str) -> Option<f32>;
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::FloatParameter;

mod integer;
pub use integer::IntegerParameter;

mod r#enum;
pub use r#enum::EnumParameter;

mod scaling;
pub use scaling::ParameterScaling;

mod store;
pub use store::ParameterStore;
