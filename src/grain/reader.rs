use assume::assume;

use crate::asset::SampleAsset;

// -------------------------------------------------------------------------------------------------

/// Stateful read cursor into a [`SampleAsset`]'s sample data.
///
/// Reads at a fractional frame position which advances by the pitch ratio for every output
/// frame, linearly interpolating between the two nearest stored frames. Once the next position
/// would pass the end of the asset, the reader stops at its last frame and only yields silence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainReader {
    position: f64,
    pitch_ratio: f64,
    finished: bool,
}

impl Default for GrainReader {
    fn default() -> Self {
        Self::new()
    }
}

impl GrainReader {
    pub const fn new() -> Self {
        Self {
            position: 0.0,
            pitch_ratio: 1.0,
            finished: false,
        }
    }

    /// Reset the reader to read from the given frame position with the given pitch ratio.
    pub fn init(&mut self, start_position: f64, pitch_ratio: f64) {
        debug_assert!(pitch_ratio > 0.0, "Invalid pitch ratio");
        self.position = if start_position.is_finite() {
            start_position.max(0.0)
        } else {
            0.0
        };
        self.pitch_ratio = pitch_ratio.max(0.0);
        self.finished = false;
    }

    /// Current fractional frame position.
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    /// Returns true when the reader reached the end of the given asset.
    #[inline]
    pub fn is_finished(&self, asset: &SampleAsset) -> bool {
        self.finished || self.position >= asset.frame_count() as f64
    }

    /// Read the next interpolated stereo frame and advance the read position.
    /// Mono assets yield the same value for both channels.
    #[inline]
    pub fn next_frame(&mut self, asset: &SampleAsset) -> (f32, f32) {
        let len = asset.frame_count();
        if self.finished {
            return (0.0, 0.0);
        }
        if self.position >= len as f64 {
            self.position = (len - 1) as f64;
            self.finished = true;
            return (0.0, 0.0);
        }
        let index = self.position as usize;
        let fraction = (self.position - index as f64) as f32;
        let next_index = (index + 1).min(len - 1);
        let next_position = self.position + self.pitch_ratio;
        if next_position < len as f64 {
            self.position = next_position;
        } else {
            self.finished = true;
        }

        let left = asset.channel(0);
        let right = asset.channel(1);
        assume!(unsafe: index < left.len() && next_index < left.len());
        assume!(unsafe: index < right.len() && next_index < right.len());
        (
            left[index] + (left[next_index] - left[index]) * fraction,
            right[index] + (right[next_index] - right[index]) * fraction,
        )
    }

    /// Read `left.len()` frames into the given planar output buffers, overwriting their content.
    pub fn read(&mut self, asset: &SampleAsset, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len(), "Buffer sizes must match");
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.next_frame(asset);
        }
    }
}

// -------------------------------------------------------------------------------------------------
