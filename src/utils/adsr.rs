//! Linear ADSR note envelope, as applied to a whole voice.

use std::time::Duration;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Current processing stage in an [`AdsrEnvelope`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AdsrStage {
    #[default]
    /// Before attack and after release (zero volume).
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

// -------------------------------------------------------------------------------------------------

/// ADSR envelope parameters that define the envelope shape for an [`AdsrEnvelope`].
///
/// Rates are derived from the time durations and sample rate and are updated whenever one of
/// them changes, so parameters can be shared by many envelopes.
#[derive(Debug, Clone)]
pub struct AdsrParameters {
    sample_rate: u32,
    attack_time: Duration,
    attack_rate: f32,
    decay_time: Duration,
    decay_rate: f32,
    sustain_level: f32,
    release_time: Duration,
    release_rate: f32,
}

impl AdsrParameters {
    const UNINITIALIZED_SAMPLE_RATE: u32 = 66666;

    /// Create new ADSR parameters with the given sustain level and attack, decay, and release
    /// time durations. See [`Self::setup`] for parameter info.
    ///
    /// Note that by default no valid sample rate is set. When using the parameters within an
    /// [`AdsrEnvelope`], make sure you set a valid rate before calling run or process.
    pub fn new(
        attack_time: Duration,
        decay_time: Duration,
        sustain_level: f32,
        release_time: Duration,
    ) -> Result<Self, Error> {
        let mut parameters = Self {
            sample_rate: Self::UNINITIALIZED_SAMPLE_RATE,
            attack_time: Duration::ZERO,
            attack_rate: 0.0,
            decay_time: Duration::ZERO,
            decay_rate: 0.0,
            sustain_level: 1.0,
            release_time: Duration::ZERO,
            release_rate: 0.0,
        };
        parameters.setup(attack_time, decay_time, sustain_level, release_time)?;
        Ok(parameters)
    }

    /// Get currently applied sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Set a new sample rate and recalculate internal rates if needed.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Invalid sample rate: must be > 0".to_string(),
            ));
        }
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.update_rates();
        }
        Ok(())
    }

    /// Get attack time duration.
    pub fn attack_time(&self) -> Duration {
        self.attack_time
    }

    /// Get decay time duration.
    pub fn decay_time(&self) -> Duration {
        self.decay_time
    }

    /// Get the sustain level.
    pub fn sustain_level(&self) -> f32 {
        self.sustain_level
    }

    /// Get release time duration.
    pub fn release_time(&self) -> Duration {
        self.release_time
    }

    /// Set sustain level, attack, decay, and release time durations.
    ///
    /// sustain_level must be in range [0.0, 1.0]. Attack and release times can be zero to
    /// skip the attack phase or to stop immediately on note off.
    pub fn setup(
        &mut self,
        attack_time: Duration,
        decay_time: Duration,
        sustain_level: f32,
        release_time: Duration,
    ) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&sustain_level) {
            return Err(Error::ParameterError(format!(
                "Invalid sustain level: {}. Must be in range [0.0, 1.0]",
                sustain_level
            )));
        }
        self.attack_time = attack_time;
        self.decay_time = decay_time;
        self.sustain_level = sustain_level;
        self.release_time = release_time;
        self.update_rates();
        Ok(())
    }

    fn update_rates(&mut self) {
        let samples = |time: Duration| time.as_secs_f32() * self.sample_rate as f32;

        self.attack_rate = if self.attack_time.is_zero() {
            f32::MAX
        } else {
            1.0 / samples(self.attack_time)
        };
        // decay runs from the attack peak (1.0) down to the sustain level
        self.decay_rate = if self.decay_time.is_zero() {
            f32::MAX
        } else {
            (1.0 - self.sustain_level) / samples(self.decay_time)
        };
        self.release_rate = if self.release_time.is_zero() {
            f32::MAX
        } else {
            1.0 / samples(self.release_time)
        };
    }
}

impl Default for AdsrParameters {
    fn default() -> Self {
        let mut parameters = Self {
            sample_rate: Self::UNINITIALIZED_SAMPLE_RATE,
            attack_time: Duration::from_millis(10),
            attack_rate: 0.0,
            decay_time: Duration::from_millis(100),
            decay_rate: 0.0,
            sustain_level: 1.0,
            release_time: Duration::from_millis(200),
            release_rate: 0.0,
        };
        parameters.update_rates();
        parameters
    }
}

// -------------------------------------------------------------------------------------------------

/// Linear ADSR envelope with externally defined parameter state.
///
/// Parameters are defined in an external struct which must be passed to the run function.
/// The release phase always falls linearly from the level the envelope had at note off, so
/// the output strictly decreases until it drops below [`AdsrEnvelope::SILENCE`].
#[derive(Debug, Default, Clone)]
pub struct AdsrEnvelope {
    stage: AdsrStage,
    release_output: f32,
    output: f32,
}

impl AdsrEnvelope {
    /// Output level at which a releasing envelope is considered silent (-60dB).
    pub const SILENCE: f32 = 0.001;

    /// Create a new ADSR envelope with default state.
    pub fn new() -> Self {
        Self {
            stage: AdsrStage::Idle,
            release_output: 0.0,
            output: 0.0,
        }
    }

    /// Return the envelope's current stage.
    #[inline(always)]
    pub fn stage(&self) -> AdsrStage {
        self.stage
    }

    /// Return the envelope's current (last processed) output value.
    #[inline(always)]
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Returns true when the envelope is in any other stage than Idle.
    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.stage != AdsrStage::Idle
    }

    /// Start the attack stage from zero.
    pub fn note_on(&mut self, parameters: &AdsrParameters) {
        if parameters.attack_rate == f32::MAX {
            // skip attack
            self.output = 1.0;
            self.stage = AdsrStage::Decay;
        } else {
            self.output = 0.0;
            self.stage = AdsrStage::Attack;
        }
    }

    /// Start the release stage from the current output level.
    pub fn note_off(&mut self, parameters: &AdsrParameters) {
        if self.stage == AdsrStage::Idle {
            return;
        }
        if parameters.release_rate != f32::MAX && self.output > Self::SILENCE {
            self.release_output = self.output;
            self.stage = AdsrStage::Release;
        } else {
            self.reset();
        }
    }

    /// Immediately stop the envelope and set state to Idle.
    pub fn reset(&mut self) {
        self.output = 0.0;
        self.release_output = 0.0;
        self.stage = AdsrStage::Idle;
    }

    /// Compute and return one output sample. Returns 0.0 and does nothing at all in the
    /// Idle stage.
    #[inline]
    pub fn run(&mut self, parameters: &AdsrParameters) -> f32 {
        debug_assert!(
            parameters.sample_rate != AdsrParameters::UNINITIALIZED_SAMPLE_RATE,
            "Set a valid sample rate in adsr parameters before processing!"
        );

        match self.stage {
            AdsrStage::Attack => {
                self.output += parameters.attack_rate;
                if self.output >= 1.0 {
                    self.output = 1.0;
                    self.stage = AdsrStage::Decay;
                }
            }

            AdsrStage::Decay => {
                // the sustain level may have changed while decaying: approach it from both sides
                if self.output > parameters.sustain_level {
                    self.output -= parameters.decay_rate;
                    if self.output <= parameters.sustain_level {
                        self.output = parameters.sustain_level;
                        self.stage = AdsrStage::Sustain;
                    }
                } else {
                    self.output = parameters.sustain_level;
                    self.stage = AdsrStage::Sustain;
                }
            }

            AdsrStage::Sustain => {
                // follow sustain changes, waiting for release trigger
                self.output = parameters.sustain_level;
            }

            AdsrStage::Release => {
                self.output -= self.release_output * parameters.release_rate;
                if self.output <= Self::SILENCE {
                    self.output = 0.0;
                    self.release_output = 0.0;
                    self.stage = AdsrStage::Idle;
                }
            }

            AdsrStage::Idle => {
                // nothing to do
            }
        }

        self.output
    }

    /// Process a buffer of samples, writing envelope values to output.
    /// This is more efficient than calling `run()` per sample in idle and sustain stages.
    #[inline]
    pub fn process(&mut self, parameters: &AdsrParameters, output: &mut [f32]) {
        match self.stage {
            AdsrStage::Idle => {
                output.fill(0.0);
            }
            AdsrStage::Sustain => {
                self.output = parameters.sustain_level;
                output.fill(self.output);
            }
            _ => {
                for sample in output.iter_mut() {
                    *sample = self.run(parameters);
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
