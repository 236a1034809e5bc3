//! Single grains: short, windowed and pitched slices of a sample asset.

mod envelope;
mod reader;

pub use envelope::{GrainEnvelope, GrainShape, GrainWindowMode};
pub use reader::GrainReader;

use crate::asset::SampleAsset;

// -------------------------------------------------------------------------------------------------

/// A pooled, reusable grain which composes a [`GrainReader`] and a [`GrainEnvelope`].
///
/// A grain is active as long as it has samples remaining. It renders the reader's output,
/// scaled by the envelope, and deactivates itself once its duration elapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Grain {
    reader: GrainReader,
    envelope: GrainEnvelope,
    samples_remaining: usize,
}

impl Grain {
    /// Create a new inactive grain.
    pub const fn new() -> Self {
        Self {
            reader: GrainReader::new(),
            envelope: GrainEnvelope::new(),
            samples_remaining: 0,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.samples_remaining > 0
    }

    #[inline]
    pub fn samples_remaining(&self) -> usize {
        self.samples_remaining
    }

    /// The grain's sample read cursor.
    #[inline]
    pub fn reader(&self) -> &GrainReader {
        &self.reader
    }

    /// Start playing a new grain with the given duration in samples, start frame position in
    /// the source, pitch ratio and envelope peak amplitude.
    ///
    /// Must only be called on inactive grains: deactivate active grains first when reusing them.
    pub fn activate(
        &mut self,
        duration: usize,
        source_position: f64,
        pitch_ratio: f64,
        peak_amplitude: f32,
        shape: GrainShape,
    ) {
        debug_assert!(!self.is_active(), "Grain is already active");
        self.reader.init(source_position, pitch_ratio);
        self.envelope.init(duration, peak_amplitude, shape);
        self.samples_remaining = duration;
    }

    /// Immediately stop the grain.
    pub fn deactivate(&mut self) {
        self.samples_remaining = 0;
    }

    /// Add up to `num_samples` frames of this grain into the given planar output buffers,
    /// starting at `start_sample`. Returns the number of rendered frames, which is
    /// `min(num_samples, samples_remaining)`, or 0 for inactive grains.
    pub fn render_next_block(
        &mut self,
        asset: &SampleAsset,
        left: &mut [f32],
        right: &mut [f32],
        start_sample: usize,
        num_samples: usize,
    ) -> usize {
        if !self.is_active() || num_samples == 0 {
            return 0;
        }
        let count = num_samples.min(self.samples_remaining);
        let range = start_sample..start_sample + count;
        debug_assert!(
            range.end <= left.len() && range.end <= right.len(),
            "Invalid output range"
        );
        for (l, r) in left[range.clone()].iter_mut().zip(right[range].iter_mut()) {
            let (left_sample, right_sample) = self.reader.next_frame(asset);
            let envelope = self.envelope.next_value();
            *l += left_sample * envelope;
            *r += right_sample * envelope;
        }
        self.samples_remaining -= count;
        count
    }
}

// -------------------------------------------------------------------------------------------------
