use std::f32::consts::FRAC_PI_2;

// -------------------------------------------------------------------------------------------------

/// Shape of the rising and falling ramps of a [`GrainEnvelope`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::FromRepr,
)]
#[repr(u8)]
pub enum GrainWindowMode {
    /// Straight lines from and to zero.
    #[default]
    Linear = 0,
    /// Quarter sine ramps, which keep the summed power of overlapping grains constant.
    #[strum(serialize = "Equal Power")]
    EqualPower = 1,
}

// -------------------------------------------------------------------------------------------------

/// Shape settings of a grain's envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainShape {
    /// Length of the rising and of the falling ramp, relative to the grain's duration
    /// (0.0..=0.5). Ramps are always at least one sample long.
    pub fade: f32,
    /// Ramp shape.
    pub window: GrainWindowMode,
}

impl Default for GrainShape {
    fn default() -> Self {
        Self {
            fade: 0.25,
            window: GrainWindowMode::Linear,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Amplitude envelope of a single grain with a fixed duration: a ramp up from zero to the
/// peak amplitude, a plateau at the peak, and a ramp down that reaches exactly zero on the
/// grain's last sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainEnvelope {
    duration: usize,
    position: usize,
    attack: usize,
    release: usize,
    peak: f32,
    window: GrainWindowMode,
}

impl Default for GrainEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl GrainEnvelope {
    pub const fn new() -> Self {
        Self {
            duration: 0,
            position: 0,
            attack: 0,
            release: 0,
            peak: 0.0,
            window: GrainWindowMode::Linear,
        }
    }

    /// Reset the envelope for a new grain with the given duration in samples.
    pub fn init(&mut self, duration: usize, peak: f32, shape: GrainShape) {
        let fade = if shape.fade.is_nan() {
            0.0
        } else {
            shape.fade.clamp(0.0, 0.5)
        };
        let fade_samples = ((duration as f32 * fade).round() as usize).max(1);
        self.duration = duration;
        self.position = 0;
        self.release = fade_samples.min(duration);
        self.attack = fade_samples.min(duration - self.release);
        self.peak = peak.max(0.0);
        self.window = shape.window;
    }

    #[inline]
    pub fn duration(&self) -> usize {
        self.duration
    }

    #[inline]
    pub fn attack_samples(&self) -> usize {
        self.attack
    }

    #[inline]
    pub fn release_samples(&self) -> usize {
        self.release
    }

    #[inline]
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Returns true when all samples of the envelope got consumed.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.position >= self.duration
    }

    /// Compute the next envelope value and advance. Returns 0.0 when complete.
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.is_complete() {
            return 0.0;
        }
        let position = self.position;
        self.position += 1;

        let release_start = self.duration - self.release;
        let ramp = if position < self.attack {
            position as f32 / self.attack as f32
        } else if position < release_start {
            return self.peak;
        } else {
            (self.duration - 1 - position) as f32 / self.release as f32
        };
        match self.window {
            GrainWindowMode::Linear => self.peak * ramp,
            GrainWindowMode::EqualPower => self.peak * (ramp * FRAC_PI_2).sin(),
        }
    }

    /// Write the next `output.len()` envelope values into the given buffer. Values past the
    /// envelope's end are zero.
    pub fn advance(&mut self, output: &mut [f32]) {
        for value in output.iter_mut() {
            *value = self.next_value();
        }
    }
}

// -------------------------------------------------------------------------------------------------
