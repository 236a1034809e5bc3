use four_cc::FourCC;

use super::{Parameter, ParameterType};

// -------------------------------------------------------------------------------------------------

/// An enum parameter descriptor. Plain values are indices into the enum's variant names.
///
/// Use strum's `VariantNames` and `FromRepr` derives on the enum to build the descriptor and
/// to convert plain values back to enum values.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameter {
    id: FourCC,
    name: &'static str,
    values: &'static [&'static str],
    default_index: usize,
}

impl EnumParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        values: &'static [&'static str],
        default_index: usize,
    ) -> Self {
        assert!(!values.is_empty(), "Invalid enum parameter values");
        assert!(
            default_index < values.len(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            values,
            default_index,
        }
    }

    pub fn into_box(self) -> Box<dyn Parameter> {
        Box::new(self)
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub const fn values(&self) -> &'static [&'static str] {
        self.values
    }

    pub const fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn clamp_index(&self, index: f32) -> usize {
        if index.is_nan() {
            return self.default_index;
        }
        (index.round().max(0.0) as usize).min(self.values.len() - 1)
    }
}

impl Parameter for EnumParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Enum {
            values: self.values.iter().map(|v| v.to_string()).collect(),
            default_index: self.default_index,
        }
    }

    fn default_plain_value(&self) -> f32 {
        self.default_index as f32
    }

    fn clamp_plain_value(&self, value: f32) -> f32 {
        self.clamp_index(value) as f32
    }

    fn normalize_plain_value(&self, value: f32) -> f32 {
        if self.values.len() <= 1 {
            return 0.0;
        }
        self.clamp_index(value) as f32 / (self.values.len() - 1) as f32
    }

    fn denormalize_value(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        self.clamp_index(normalized * (self.values.len() - 1) as f32) as f32
    }

    fn plain_value_to_string(&self, value: f32, _include_unit: bool) -> String {
        self.values[self.clamp_index(value)].to_string()
    }

    fn string_to_plain_value(&self, string: &str) -> Option<f32> {
        let string = string.trim();
        self.values
            .iter()
            .position(|v| v.eq_ignore_ascii_case(string))
            .map(|index| index as f32)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let shape = EnumParameter::new(FourCC(*b"TSHP"), "Shape", &["Sine", "Saw", "Square"], 1);
        assert_eq!(shape.default_plain_value(), 1.0);
        assert_eq!(shape.clamp_plain_value(-3.0), 0.0);
        assert_eq!(shape.clamp_plain_value(10.0), 2.0);
        assert_eq!(shape.normalize_plain_value(2.0), 1.0);
        assert_eq!(shape.denormalize_value(0.5), 1.0);
        assert_eq!(shape.plain_value_to_string(2.0, true), "Square");
        assert_eq!(shape.string_to_plain_value("saw"), Some(1.0));
        assert_eq!(shape.string_to_plain_value("Noise"), None);
    }
}
