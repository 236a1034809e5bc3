use std::ops::RangeInclusive;

use four_cc::FourCC;

use super::{Parameter, ParameterType};

// -------------------------------------------------------------------------------------------------

/// A discrete (integer) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<i32>,
    default: i32,
    unit: &'static str,
}

impl IntegerParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<i32>,
        default: i32,
    ) -> Self {
        assert!(*range.start() < *range.end(), "Invalid parameter range");
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
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub fn into_box(self) -> Box<dyn Parameter> {
        Box::new(self)
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub const fn range(&self) -> &RangeInclusive<i32> {
        &self.range
    }

    pub const fn default_value(&self) -> i32 {
        self.default
    }

    pub fn clamp_value(&self, value: i32) -> i32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    pub fn normalize_value(&self, value: i32) -> f32 {
        (self.clamp_value(value) as f32 - *self.range.start() as f32)
            / (*self.range.end() as f32 - *self.range.start() as f32)
    }

    pub fn denormalize_value(&self, normalized: f32) -> i32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let value = *self.range.start() as f32
            + normalized * (*self.range.end() as f32 - *self.range.start() as f32);
        value.round() as i32
    }
}

impl Parameter for IntegerParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Integer {
            range: self.range.clone(),
            default: self.default,
        }
    }

    fn default_plain_value(&self) -> f32 {
        self.default as f32
    }

    fn clamp_plain_value(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default as f32;
        }
        // saturating float to int cast
        self.clamp_value(value.round() as i32) as f32
    }

    fn normalize_plain_value(&self, value: f32) -> f32 {
        self.normalize_value(self.clamp_plain_value(value) as i32)
    }

    fn denormalize_value(&self, normalized: f32) -> f32 {
        IntegerParameter::denormalize_value(self, normalized) as f32
    }

    fn plain_value_to_string(&self, value: f32, include_unit: bool) -> String {
        let value = self.clamp_plain_value(value) as i32;
        if include_unit && !self.unit.is_empty() {
            format!("{} {}", value, self.unit)
        } else {
            value.to_string()
        }
    }

    fn string_to_plain_value(&self, string: &str) -> Option<f32> {
        let value = string
            .trim()
            .trim_end_matches(self.unit)
            .trim()
            .parse::<i32>()
            .ok()?;
        Some(self.clamp_value(value) as f32)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let count = IntegerParameter::new(FourCC(*b"TCNT"), "Count", 1..=64, 8);
        assert_eq!(count.clamp_plain_value(0.0), 1.0);
        assert_eq!(count.clamp_plain_value(7.6), 8.0);
        assert_eq!(count.clamp_plain_value(1e9), 64.0);
        assert_eq!(count.denormalize_value(0.0), 1);
        assert_eq!(count.denormalize_value(1.0), 64);
        assert_eq!(count.normalize_value(1), 0.0);
        assert_eq!(count.plain_value_to_string(12.0, true), "12");

        let bend = IntegerParameter::new(FourCC(*b"TBND"), "Bend", 0..=24, 2).with_unit("st");
        assert_eq!(bend.plain_value_to_string(12.0, true), "12 st");
        assert_eq!(bend.string_to_plain_value("7 st"), Some(7.0));
        assert_eq!(bend.string_to_plain_value("48"), Some(24.0));
        assert_eq!(bend.string_to_plain_value("many"), None);
    }
}
