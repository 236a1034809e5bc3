//! Common DSP helpers and building blocks.

pub mod adsr;
pub mod buffer;

pub(crate) mod decoder;

// -------------------------------------------------------------------------------------------------

const MINUS_INF_IN_DB: f32 = -200.0f32;

const LIN_TO_DB_FACTOR: f32 = 20.0f32 / std::f32::consts::LN_10;
const DB_TO_LIN_FACTOR: f32 = std::f32::consts::LN_10 / 20.0f32;

/// Center position of a 14-bit MIDI pitch wheel.
pub const PITCH_WHEEL_CENTER: u16 = 8192;
/// Maximum value of a 14-bit MIDI pitch wheel.
pub const PITCH_WHEEL_MAX: u16 = 16383;

// -------------------------------------------------------------------------------------------------

/// Convert a linear gain value to decibels.
pub fn linear_to_db(value: f32) -> f32 {
    if value == 1.0 {
        return 0.0; // avoid rounding errors at exactly 0 dB
    } else if value > 1e-12f32 {
        return value.ln() * LIN_TO_DB_FACTOR;
    }
    MINUS_INF_IN_DB
}

/// Convert a decibel value to a linear gain.
pub fn db_to_linear(value: f32) -> f32 {
    if value == 0.0f32 {
        return 1.0f32; // avoid rounding errors at exactly 0 dB
    } else if value > MINUS_INF_IN_DB {
        return (value * DB_TO_LIN_FACTOR).exp();
    }
    0.0f32
}

// -------------------------------------------------------------------------------------------------

/// Playback speed of a note, relative to the given root note: one octave doubles the speed.
pub fn pitch_ratio_from_note(note: u8, root_note: u8) -> f64 {
    semitones_to_ratio(note as f64 - root_note as f64)
}

/// Convert a (possibly fractional) semitone offset to a playback speed ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Convert a 14-bit MIDI pitch wheel position to a pitch ratio, bending up to
/// `bend_range` semitones in both directions.
pub fn pitch_wheel_ratio(position: u16, bend_range: f32) -> f64 {
    let position = position.min(PITCH_WHEEL_MAX);
    let normalized = if position >= PITCH_WHEEL_CENTER {
        (position - PITCH_WHEEL_CENTER) as f64 / (PITCH_WHEEL_MAX - PITCH_WHEEL_CENTER) as f64
    } else {
        -((PITCH_WHEEL_CENTER - position) as f64 / PITCH_WHEEL_CENTER as f64)
    };
    semitones_to_ratio(normalized * bend_range as f64)
}

// -------------------------------------------------------------------------------------------------

/// Equal power left/right gain factors for the given panning value in range `-1.0..=1.0`.
pub fn panning_factors(panning: f32) -> (f32, f32) {
    debug_assert!((-1.0..=1.0).contains(&panning), "Invalid panning value");
    let angle = (panning.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

// -------------------------------------------------------------------------------------------------
