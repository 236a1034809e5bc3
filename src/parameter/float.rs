use std::{fmt::Debug, ops::RangeInclusive, sync::Arc};

use four_cc::FourCC;

use super::{Parameter, ParameterScaling, ParameterType};

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Clone)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
    scaling: ParameterScaling,
    #[allow(clippy::type_complexity)]
    value_to_string: Option<Arc<dyn Fn(f32) -> String + Send + Sync>>,
    #[allow(clippy::type_complexity)]
    string_to_value: Option<Arc<dyn Fn(&str) -> Option<f32> + Send + Sync>>,
}

impl Debug for FloatParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatParameter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("range", &self.range)
            .field("default", &self.default)
            .field("unit", &self.unit)
            .field("scaling", &self.scaling)
            .field("value_to_string", &self.value_to_string.is_some())
            .field("string_to_value", &self.string_to_value.is_some())
            .finish()
    }
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            *range.start() < *range.end(),
            "Invalid parameter range"
        );
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            unit: "",
            scaling: ParameterScaling::Linear,
            value_to_string: None,
            string_to_value: None,
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Optional scaling, applied when converting normalized values to plain values.
    pub const fn with_scaling(mut self, scaling: ParameterScaling) -> Self {
        scaling.validate();
        self.scaling = scaling;
        self
    }

    /// Optional custom conversion functions to convert a plain value to a string and string
    /// to a plain value.
    ///
    /// Returned strings should not contain a unit, if a unit already was set for this parameter.
    /// If strings cannot be parsed, the callback should return `None`. Returned values will be
    /// clamped automatically.
    pub fn with_display<
        ValueToString: Fn(f32) -> String + Send + Sync + 'static,
        StringToValue: Fn(&str) -> Option<f32> + Send + Sync + 'static,
    >(
        mut self,
        value_to_string: ValueToString,
        string_to_value: StringToValue,
    ) -> Self {
        self.value_to_string = Some(Arc::new(value_to_string));
        self.string_to_value = Some(Arc::new(string_to_value));
        self
    }

    /// Wrap the descriptor into a `dyn Parameter` box.
    pub fn into_box(self) -> Box<dyn Parameter> {
        Box::new(self)
    }

    /// The parameter's unique id.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's value range.
    pub const fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's default value.
    pub const fn default_value(&self) -> f32 {
        self.default
    }

    /// The parameter's unit.
    pub const fn unit(&self) -> &'static str {
        self.unit
    }

    /// The parameter's normalized value scaling.
    pub const fn scaling(&self) -> ParameterScaling {
        self.scaling
    }

    /// Clamp the given plain value to the parameter's range. NaN values are mapped to the
    /// default value.
    pub fn clamp_value(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(*self.range.start(), *self.range.end())
        }
    }

    /// Normalize the given plain value to a 0.0-1.0 range.
    pub fn normalize_value(&self, value: f32) -> f32 {
        let value = self.clamp_value(value);
        let linear = (value - *self.range.start()) / (*self.range.end() - *self.range.start());
        self.scaling.unscale(linear.clamp(0.0, 1.0))
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        let scaled = self.scaling.scale(normalized.clamp(0.0, 1.0));
        self.clamp_value(*self.range.start() + scaled * (*self.range.end() - *self.range.start()))
    }

    /// Convert the given plain value to a string, using a custom conversion function if provided.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        match (&self.value_to_string, include_unit && !self.unit.is_empty()) {
            (Some(f), true) => format!("{} {}", f(value), self.unit),
            (Some(f), false) => f(value),
            (None, true) => format!("{:.2} {}", value, self.unit),
            (None, false) => format!("{:.2}", value),
        }
    }

    /// Convert the given string to a plain value, using a custom conversion function if provided.
    pub fn string_to_value(&self, string: &str) -> Option<f32> {
        let value = match &self.string_to_value {
            Some(f) => f(string.trim()),
            None => string.trim().trim_end_matches(self.unit).trim().parse().ok(),
        }?;
        Some(self.clamp_value(value))
    }
}

impl Parameter for FloatParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Float {
            range: self.range.clone(),
            default: self.default,
        }
    }

    fn default_plain_value(&self) -> f32 {
        self.default
    }

    fn clamp_plain_value(&self, value: f32) -> f32 {
        self.clamp_value(value)
    }

    fn normalize_plain_value(&self, value: f32) -> f32 {
        self.normalize_value(value)
    }

    fn denormalize_value(&self, normalized: f32) -> f32 {
        FloatParameter::denormalize_value(self, normalized)
    }

    fn plain_value_to_string(&self, value: f32, include_unit: bool) -> String {
        self.value_to_string(value, include_unit)
    }

    fn string_to_plain_value(&self, string: &str) -> Option<f32> {
        self.string_to_value(string)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: FloatParameter = FloatParameter::new(FourCC(*b"TRAT"), "Rate", 1.0..=100.0, 10.0)
        .with_scaling(ParameterScaling::Exponential(2.0))
        .with_unit("Hz");

    #[test]
    fn clamping() {
        assert_eq!(RATE.clamp_value(0.0), 1.0);
        assert_eq!(RATE.clamp_value(1000.0), 100.0);
        assert_eq!(RATE.clamp_value(f32::NAN), 10.0);
        assert_eq!(RATE.clamp_value(50.0), 50.0);
    }

    #[test]
    fn normalization() {
        assert_eq!(RATE.denormalize_value(0.0), 1.0);
        assert_eq!(RATE.denormalize_value(1.0), 100.0);
        assert_eq!(RATE.denormalize_value(2.0), 100.0);
        let normalized = RATE.normalize_value(25.0);
        assert!((RATE.denormalize_value(normalized) - 25.0).abs() < 0.01);
        // exponential scaling: the plain midpoint sits above the normalized midpoint
        assert!(RATE.normalize_value(50.5) > 0.5);
    }

    #[test]
    fn strings() {
        assert_eq!(RATE.value_to_string(12.5, true), "12.50 Hz");
        assert_eq!(RATE.value_to_string(12.5, false), "12.50");
        assert_eq!(RATE.string_to_value("20 Hz"), Some(20.0));
        assert_eq!(RATE.string_to_value("2000"), Some(100.0));
        assert_eq!(RATE.string_to_value("fast"), None);

        let percent = FloatParameter::new(FourCC(*b"TPCT"), "Percent", 0.0..=1.0, 0.0)
            .with_display(
                |v| format!("{:.1}%", v * 100.0),
                |s| s.trim_end_matches('%').parse::<f32>().ok().map(|v| v / 100.0),
            );
        assert_eq!(percent.value_to_string(0.5, true), "50.0%");
        assert_eq!(percent.string_to_value("25%"), Some(0.25));
    }
}
