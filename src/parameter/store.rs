use std::sync::atomic::{AtomicU32, Ordering};

use four_cc::FourCC;

use super::Parameter;
use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Lock-free storage for a fixed set of parameter values.
///
/// Values are written from any (non real-time) thread and read from the audio thread without
/// locking: each plain value is stored as the bit pattern of an `f32` in an [`AtomicU32`].
/// All writes get clamped by the parameter's descriptor, so readers only ever see valid values.
#[derive(Debug)]
pub struct ParameterStore {
    parameters: Vec<Box<dyn Parameter>>,
    values: Vec<AtomicU32>,
}

impl ParameterStore {
    /// Create a new store for the given parameter descriptors, initialized with their
    /// default values. Fails when two parameters share the same id.
    pub fn new(parameters: Vec<Box<dyn Parameter>>) -> Result<Self, Error> {
        for (index, parameter) in parameters.iter().enumerate() {
            if parameters[..index].iter().any(|p| p.id() == parameter.id()) {
                return Err(Error::ParameterError(format!(
                    "Duplicate parameter id '{}'",
                    parameter.id()
                )));
            }
        }
        let values = parameters
            .iter()
            .map(|p| AtomicU32::new(p.default_plain_value().to_bits()))
            .collect();
        Ok(Self { parameters, values })
    }

    /// All parameter descriptors, in the order they got registered.
    pub fn parameters(&self) -> &[Box<dyn Parameter>] {
        &self.parameters
    }

    /// Access a single parameter descriptor.
    pub fn parameter(&self, id: FourCC) -> Result<&dyn Parameter, Error> {
        let index = self.index_of(id)?;
        Ok(self.parameters[index].as_ref())
    }

    /// Read the current plain value of the parameter with the given id.
    pub fn value(&self, id: FourCC) -> Result<f32, Error> {
        let index = self.index_of(id)?;
        Ok(self.load(index))
    }

    /// Set a new plain value. Out of range values are clamped. Returns the applied value.
    pub fn set_value(&self, id: FourCC, value: f32) -> Result<f32, Error> {
        let index = self.index_of(id)?;
        let value = self.parameters[index].clamp_plain_value(value);
        self.values[index].store(value.to_bits(), Ordering::Relaxed);
        Ok(value)
    }

    /// Set a new normalized value in range \[0,1\]. Returns the applied plain value.
    pub fn set_normalized_value(&self, id: FourCC, normalized: f32) -> Result<f32, Error> {
        let index = self.index_of(id)?;
        let value = self.parameters[index].denormalize_value(normalized);
        self.values[index].store(value.to_bits(), Ordering::Relaxed);
        Ok(value)
    }

    /// Reset all values to their defaults.
    pub fn reset(&self) {
        for (parameter, value) in self.parameters.iter().zip(&self.values) {
            value.store(parameter.default_plain_value().to_bits(), Ordering::Relaxed);
        }
    }

    /// Real-time safe value read by id, which does not allocate or report errors: unknown ids
    /// resolve to 0.0.
    #[inline]
    pub(crate) fn get(&self, id: FourCC) -> f32 {
        match self.parameters.iter().position(|p| p.id() == id) {
            Some(index) => self.load(index),
            None => {
                debug_assert!(false, "Unknown parameter id");
                0.0
            }
        }
    }

    #[inline]
    fn load(&self, index: usize) -> f32 {
        f32::from_bits(self.values[index].load(Ordering::Relaxed))
    }

    fn index_of(&self, id: FourCC) -> Result<usize, Error> {
        self.parameters
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| Error::ParameterError(format!("Unknown parameter id '{id}'")))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::parameter::{EnumParameter, FloatParameter, IntegerParameter};

    const GAIN: FloatParameter = FloatParameter::new(FourCC(*b"GAIN"), "Gain", 0.0..=2.0, 1.0);
    const SIZE: IntegerParameter = IntegerParameter::new(FourCC(*b"SIZE"), "Size", 1..=16, 4);
    const MODE: EnumParameter = EnumParameter::new(FourCC(*b"MODE"), "Mode", &["A", "B"], 0);

    fn store() -> Result<ParameterStore, Error> {
        ParameterStore::new(vec![GAIN.into_box(), SIZE.into_box(), MODE.into_box()])
    }

    #[test]
    fn defaults_and_clamping() -> Result<(), Error> {
        let store = store()?;
        assert_eq!(store.parameters().len(), 3);
        assert_eq!(store.value(GAIN.id())?, 1.0);
        assert_eq!(store.value(SIZE.id())?, 4.0);
        assert_eq!(store.set_value(GAIN.id(), 5.0)?, 2.0);
        assert_eq!(store.value(GAIN.id())?, 2.0);
        assert_eq!(store.set_value(SIZE.id(), -1.0)?, 1.0);
        assert_eq!(store.set_value(MODE.id(), 1.2)?, 1.0);
        assert_eq!(store.set_normalized_value(GAIN.id(), 0.25)?, 0.5);
        assert_eq!(store.get(GAIN.id()), 0.5);
        store.reset();
        assert_eq!(store.value(GAIN.id())?, 1.0);
        Ok(())
    }

    #[test]
    fn unknown_and_duplicate_ids() {
        let store = store().unwrap();
        assert!(matches!(
            store.value(FourCC(*b"NOPE")),
            Err(Error::ParameterError(_))
        ));
        assert!(store.set_value(FourCC(*b"NOPE"), 1.0).is_err());
        assert!(ParameterStore::new(vec![GAIN.into_box(), GAIN.into_box()]).is_err());
    }

    #[test]
    fn concurrent_writes() {
        let store = Arc::new(store().unwrap());
        let writers = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.set_value(GAIN.id(), i as f32 * 10.0).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for writer in writers {
            writer.join().unwrap();
        }
        let value = store.value(GAIN.id()).unwrap();
        assert!(value == 0.0 || value == 2.0);
    }
}
