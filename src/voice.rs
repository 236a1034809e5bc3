//! A single polyphonic note, made of many overlapping grains.

use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    asset::SampleAsset,
    grain::{Grain, GrainShape},
    utils::{
        adsr::{AdsrEnvelope, AdsrParameters, AdsrStage},
        buffer::{add_stereo_to_interleaved, multiply_buffers},
        panning_factors, pitch_ratio_from_note, semitones_to_ratio,
    },
};

// -------------------------------------------------------------------------------------------------

/// Snapshot of all parameters a [`Voice`] needs for rendering, taken once per render call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParameters {
    /// Grain onsets per second.
    pub grain_rate: f32,
    /// Grain duration in milliseconds.
    pub grain_duration: f32,
    /// Relative grain start position in the asset (0.0..=1.0).
    pub position: f32,
    /// Random grain start position spread, relative to the asset length (0.0..=1.0).
    pub position_spread: f32,
    /// Random grain pitch spread in semitones.
    pub pitch_spread: f32,
    /// Number of grain slots that are used round-robin.
    pub grain_count: usize,
    /// Grain envelope shape.
    pub grain_shape: GrainShape,
    /// Linear output gain.
    pub volume: f32,
    /// Stereo panning (-1.0..=1.0).
    pub panning: f32,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            grain_rate: 10.0,
            grain_duration: 100.0,
            position: 0.0,
            position_spread: 0.0,
            pitch_spread: 0.0,
            grain_count: 8,
            grain_shape: GrainShape::default(),
            volume: 1.0,
            panning: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Playback state of a [`Voice`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    #[default]
    Idle,
    /// Playing a note which has not been released yet.
    Active,
    /// Note got released: the note envelope is fading out.
    Releasing,
}

// -------------------------------------------------------------------------------------------------

/// Renders one note: schedules grain onsets, mixes all active grains and applies the note's
/// ADSR envelope, volume and panning.
///
/// All buffers are allocated in [`Self::prepare`], so rendering never allocates.
pub struct Voice {
    state: VoiceState,
    asset: Option<Arc<SampleAsset>>,
    note: u8,
    channel: u8,
    velocity: f32,
    note_age: u64,
    note_pitch_ratio: f64,
    pitch_wheel_ratio: f64,
    grains: Box<[Grain]>,
    grain_count: usize,
    next_grain_index: usize,
    samples_till_next_onset: f64,
    onset_count: u64,
    envelope: AdsrEnvelope,
    left_buffer: Vec<f32>,
    right_buffer: Vec<f32>,
    envelope_buffer: Vec<f32>,
    sample_rate: u32,
    rng: SmallRng,
}

impl Voice {
    /// Minimum grain rate in Hz. Lower rates get clamped.
    const MIN_GRAIN_RATE: f32 = 0.01;

    /// Create a new idle voice with a pool of `max_grains` grains.
    pub fn new(max_grains: usize, sample_rate: u32, max_block_size: usize) -> Self {
        debug_assert!(max_grains > 0, "Need at least one grain");
        let mut voice = Self {
            state: VoiceState::Idle,
            asset: None,
            note: 0,
            channel: 1,
            velocity: 0.0,
            note_age: 0,
            note_pitch_ratio: 1.0,
            pitch_wheel_ratio: 1.0,
            grains: vec![Grain::new(); max_grains.max(1)].into_boxed_slice(),
            grain_count: 1,
            next_grain_index: 0,
            samples_till_next_onset: 0.0,
            onset_count: 0,
            envelope: AdsrEnvelope::new(),
            left_buffer: Vec::new(),
            right_buffer: Vec::new(),
            envelope_buffer: Vec::new(),
            sample_rate,
            rng: SmallRng::from_os_rng(),
        };
        voice.prepare(sample_rate, max_block_size);
        voice
    }

    /// Apply a new output sample rate and maximum block size. Allocates, so must not be called
    /// in real-time threads. Sounding notes keep playing at their old pitch.
    pub fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        let max_block_size = max_block_size.max(1);
        self.sample_rate = sample_rate;
        if self.left_buffer.len() != max_block_size {
            self.left_buffer = vec![0.0; max_block_size];
            self.right_buffer = vec![0.0; max_block_size];
            self.envelope_buffer = vec![0.0; max_block_size];
        }
    }

    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != VoiceState::Idle
    }

    /// The currently (or last) played MIDI note.
    #[inline]
    pub fn note(&self) -> u8 {
        self.note
    }

    /// The MIDI channel (1..=16) of the currently (or last) played note.
    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Sequence number of the note start: higher values are newer notes.
    #[inline]
    pub fn note_age(&self) -> u64 {
        self.note_age
    }

    /// Total number of grain onsets since the voice got created.
    #[inline]
    pub fn onset_count(&self) -> u64 {
        self.onset_count
    }

    /// Number of currently playing grains.
    pub fn active_grain_count(&self) -> usize {
        self.grains.iter().filter(|g| g.is_active()).count()
    }

    /// Capacity of the grain pool.
    pub fn max_grains(&self) -> usize {
        self.grains.len()
    }

    /// The voice's grain pool, including inactive grains.
    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    #[inline]
    pub fn envelope_stage(&self) -> AdsrStage {
        self.envelope.stage()
    }

    /// Last processed note envelope value.
    #[inline]
    pub fn envelope_output(&self) -> f32 {
        self.envelope.output()
    }

    /// Start playing a new note. The first grain starts with the next render call.
    #[allow(clippy::too_many_arguments)]
    pub fn start_note(
        &mut self,
        asset: &Arc<SampleAsset>,
        note: u8,
        channel: u8,
        velocity: f32,
        pitch_wheel_ratio: f64,
        note_age: u64,
        envelope_parameters: &AdsrParameters,
    ) {
        for grain in self.grains.iter_mut() {
            grain.deactivate();
        }
        self.next_grain_index = 0;
        self.samples_till_next_onset = 0.0;

        self.note = note;
        self.channel = channel;
        self.velocity = velocity.clamp(0.0, 1.0);
        self.note_age = note_age;
        self.note_pitch_ratio = pitch_ratio_from_note(note, asset.root_note())
            * asset.sample_rate() as f64
            / self.sample_rate as f64;
        self.pitch_wheel_ratio = pitch_wheel_ratio;
        if !self
            .asset
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, asset))
        {
            self.asset = Some(Arc::clone(asset));
        }

        self.envelope.note_on(envelope_parameters);
        self.state = VoiceState::Active;
    }

    /// Stop the note: with tail-off, the note envelope's release starts and grains keep
    /// being scheduled until it faded out. Else the voice is stopped immediately.
    pub fn stop_note(&mut self, allow_tail_off: bool, envelope_parameters: &AdsrParameters) {
        if self.state != VoiceState::Active {
            if !allow_tail_off {
                self.clear();
            }
            return;
        }
        if allow_tail_off {
            self.envelope.note_off(envelope_parameters);
            if self.envelope.is_active() {
                self.state = VoiceState::Releasing;
            } else {
                self.clear();
            }
        } else {
            self.clear();
        }
    }

    /// Immediately stop all grains and the note envelope and go idle.
    pub fn clear(&mut self) {
        for grain in self.grains.iter_mut() {
            grain.deactivate();
        }
        self.envelope.reset();
        self.state = VoiceState::Idle;
    }

    /// Release the voice's asset reference. Stops the voice.
    pub(crate) fn release_asset(&mut self) {
        self.clear();
        self.asset = None;
    }

    /// Set a new pitch wheel ratio, which applies to all following grain onsets.
    pub fn set_pitch_wheel_ratio(&mut self, ratio: f64) {
        self.pitch_wheel_ratio = ratio;
    }

    /// Add the voice's output into the given interleaved output buffer. Idle voices do nothing.
    pub fn render_next_block(
        &mut self,
        output: &mut [f32],
        channel_count: usize,
        parameters: &VoiceParameters,
        envelope_parameters: &AdsrParameters,
    ) {
        debug_assert!(channel_count > 0, "Invalid channel count");
        if self.state == VoiceState::Idle || output.is_empty() {
            return;
        }
        let asset = match self.asset.as_ref() {
            Some(asset) => Arc::clone(asset),
            None => {
                self.clear();
                return;
            }
        };

        // apply grain count changes
        let grain_count = parameters.grain_count.clamp(1, self.grains.len());
        if grain_count != self.grain_count {
            for grain in self.grains[grain_count..].iter_mut() {
                grain.deactivate();
            }
            self.grain_count = grain_count;
            self.next_grain_index %= grain_count;
        }

        let (left_pan, right_pan) = panning_factors(parameters.panning.clamp(-1.0, 1.0));
        let gain = self.velocity * parameters.volume;
        let gains = if channel_count == 1 {
            (gain, gain)
        } else {
            (gain * left_pan, gain * right_pan)
        };

        let max_block_size = self.left_buffer.len();
        for chunk in output.chunks_mut(max_block_size * channel_count) {
            let frame_count = chunk.len() / channel_count;
            self.render_grains(&asset, frame_count, parameters);
            self.apply_envelope(frame_count, envelope_parameters);
            add_stereo_to_interleaved(
                &self.left_buffer[..frame_count],
                &self.right_buffer[..frame_count],
                gains,
                chunk,
                channel_count,
            );
            if self.state == VoiceState::Releasing && !self.envelope.is_active() {
                self.clear();
                break;
            }
        }
    }

    /// Schedule grain onsets and render all grains into the temp buffers.
    fn render_grains(
        &mut self,
        asset: &SampleAsset,
        frame_count: usize,
        parameters: &VoiceParameters,
    ) {
        debug_assert!(frame_count <= self.left_buffer.len(), "Invalid block size");
        self.left_buffer[..frame_count].fill(0.0);
        self.right_buffer[..frame_count].fill(0.0);

        let onset_interval = (self.sample_rate as f64
            / parameters.grain_rate.max(Self::MIN_GRAIN_RATE) as f64)
            .max(1.0);

        let mut position = 0;
        while position < frame_count {
            if self.samples_till_next_onset <= 0.0 {
                self.activate_next_grain(asset, parameters);
                self.samples_till_next_onset += onset_interval;
            }
            let segment = (self.samples_till_next_onset.ceil() as usize)
                .max(1)
                .min(frame_count - position);
            for grain in self.grains[..self.grain_count].iter_mut() {
                grain.render_next_block(
                    asset,
                    &mut self.left_buffer,
                    &mut self.right_buffer,
                    position,
                    segment,
                );
            }
            self.samples_till_next_onset -= segment as f64;
            position += segment;
        }
    }

    /// Start a new grain in the next round-robin slot, cutting off the slot's old grain.
    fn activate_next_grain(&mut self, asset: &SampleAsset, parameters: &VoiceParameters) {
        let frame_count = asset.frame_count() as f64;

        let mut source_position = parameters.position.clamp(0.0, 1.0) as f64 * (frame_count - 1.0);
        let position_spread = parameters.position_spread.clamp(0.0, 1.0) as f64;
        if position_spread > 0.0 {
            source_position += (self.rng.random::<f64>() - 0.5) * position_spread * frame_count;
            source_position = source_position.rem_euclid(frame_count);
        }

        let mut pitch_ratio = self.note_pitch_ratio * self.pitch_wheel_ratio;
        let pitch_spread = parameters.pitch_spread.max(0.0) as f64;
        if pitch_spread > 0.0 {
            pitch_ratio *= semitones_to_ratio(self.rng.random_range(-pitch_spread..=pitch_spread));
        }

        let duration = ((parameters.grain_duration.max(0.0) as f64 * self.sample_rate as f64
            / 1000.0)
            .round() as usize)
            .max(1);
        let peak_amplitude = 1.0 / (self.grain_count as f32).sqrt();

        let grain = &mut self.grains[self.next_grain_index];
        grain.deactivate();
        grain.activate(
            duration,
            source_position,
            pitch_ratio,
            peak_amplitude,
            parameters.grain_shape,
        );
        self.next_grain_index = (self.next_grain_index + 1) % self.grain_count;
        self.onset_count += 1;
    }

    /// Apply the note envelope to the rendered grains in the temp buffers.
    fn apply_envelope(&mut self, frame_count: usize, envelope_parameters: &AdsrParameters) {
        let envelope = &mut self.envelope_buffer[..frame_count];
        self.envelope.process(envelope_parameters, envelope);
        multiply_buffers(&mut self.left_buffer[..frame_count], envelope);
        multiply_buffers(&mut self.right_buffer[..frame_count], envelope);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::asset::AssetOptions;

    const SAMPLE_RATE: u32 = 1000;

    fn dc_asset(frames: usize) -> Arc<SampleAsset> {
        Arc::new(
            SampleAsset::new(
                "dc",
                vec![vec![1.0; frames]],
                SAMPLE_RATE,
                AssetOptions::default(),
            )
            .unwrap(),
        )
    }

    fn envelope_parameters(release_ms: u64) -> AdsrParameters {
        let release = Duration::from_millis(release_ms);
        let mut parameters =
            AdsrParameters::new(Duration::ZERO, Duration::ZERO, 1.0, release).unwrap();
        parameters.set_sample_rate(SAMPLE_RATE).unwrap();
        parameters
    }

    #[test]
    fn round_robin_bounds_active_grains() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(10);
        let parameters = VoiceParameters {
            grain_rate: 100.0,       // onset every 10 samples
            grain_duration: 1000.0,  // grains never finish within the test
            grain_count: 4,
            ..Default::default()
        };
        let mut voice = Voice::new(8, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        assert_eq!(voice.state(), VoiceState::Active);

        let mut output = vec![0.0; 10 * 2];
        for block in 1..=10 {
            voice.render_next_block(&mut output, 2, &parameters, &envelope);
            assert_eq!(voice.onset_count(), block);
            assert_eq!(voice.active_grain_count(), (block as usize).min(4));
        }
    }

    #[test]
    fn sample_accurate_onsets() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(10);
        let parameters = VoiceParameters {
            grain_rate: 250.0, // onset every 4 samples
            grain_duration: 1.0,
            grain_count: 4,
            ..Default::default()
        };
        let mut voice = Voice::new(4, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        // several onsets within a single block, none dropped
        let mut output = vec![0.0; 17];
        voice.render_next_block(&mut output, 1, &parameters, &envelope);
        assert_eq!(voice.onset_count(), 5);
        // blocks larger than the prepared block size are rendered in chunks
        let mut output = vec![0.0; 200];
        voice.render_next_block(&mut output, 1, &parameters, &envelope);
        assert_eq!(voice.onset_count(), 5 + 50);
    }

    #[test]
    fn shrinking_grain_count() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(10);
        let mut parameters = VoiceParameters {
            grain_rate: 100.0,
            grain_duration: 1000.0,
            grain_count: 8,
            ..Default::default()
        };
        let mut voice = Voice::new(8, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        let mut output = vec![0.0; 80];
        voice.render_next_block(&mut output, 1, &parameters, &envelope);
        assert_eq!(voice.active_grain_count(), 8);
        parameters.grain_count = 2;
        voice.render_next_block(&mut output[..10], 1, &parameters, &envelope);
        assert!(voice.active_grain_count() <= 2);
    }

    #[test]
    fn stop_without_tail_off() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(100);
        let parameters = VoiceParameters::default();
        let mut voice = Voice::new(8, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        let mut output = vec![0.0; 64];
        voice.render_next_block(&mut output, 1, &parameters, &envelope);
        assert!(output.iter().any(|v| *v != 0.0));

        voice.stop_note(false, &envelope);
        assert_eq!(voice.state(), VoiceState::Idle);
        assert_eq!(voice.active_grain_count(), 0);
        let mut output = vec![0.0; 64];
        voice.render_next_block(&mut output, 1, &parameters, &envelope);
        assert!(output.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn stop_with_tail_off() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(50);
        let parameters = VoiceParameters {
            grain_rate: 100.0,
            ..Default::default()
        };
        let mut voice = Voice::new(8, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        let mut output = vec![0.0; 16];
        voice.render_next_block(&mut output, 1, &parameters, &envelope);

        voice.stop_note(true, &envelope);
        assert_eq!(voice.state(), VoiceState::Releasing);
        let onsets = voice.onset_count();
        let mut last_level = voice.envelope_output();
        let mut blocks = 0;
        while voice.is_active() {
            voice.render_next_block(&mut output, 1, &parameters, &envelope);
            assert!(voice.envelope_output() < last_level);
            last_level = voice.envelope_output();
            blocks += 1;
            assert!(blocks < 100, "voice never stopped");
        }
        // grains kept being scheduled while releasing
        assert!(voice.onset_count() > onsets);
        assert_eq!(voice.state(), VoiceState::Idle);
        assert_eq!(voice.active_grain_count(), 0);
    }

    #[test]
    fn zero_samples_is_noop() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(10);
        let mut voice = Voice::new(8, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        voice.render_next_block(&mut [], 2, &VoiceParameters::default(), &envelope);
        assert_eq!(voice.onset_count(), 0);
        assert_eq!(voice.state(), VoiceState::Active);
    }

    #[test]
    fn grain_start_positions() {
        let asset = dc_asset(1000);
        let frames = asset.frame_count() as f64;
        let envelope = envelope_parameters(10);
        let mut voice = Voice::new(1, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);

        let mut parameters = VoiceParameters {
            position: 0.25,
            ..Default::default()
        };
        voice.activate_next_grain(&asset, &parameters);
        assert_eq!(voice.grains()[0].reader().position(), 0.25 * (frames - 1.0));

        // random offsets stay within the spread window and wrap around the asset
        let distance = |a: f64, b: f64| {
            let d = (a - b).abs();
            d.min(frames - d)
        };
        for (position, spread) in [(0.25, 0.2), (0.0, 0.5), (1.0, 0.5)] {
            parameters.position = position;
            parameters.position_spread = spread;
            let center = position as f64 * (frames - 1.0);
            let window = spread as f64 * frames / 2.0;
            let mut wrapped = false;
            let mut moved = false;
            for _ in 0..1000 {
                voice.activate_next_grain(&asset, &parameters);
                let start = voice.grains()[0].reader().position();
                assert!((0.0..frames).contains(&start), "{start} out of bounds");
                assert!(distance(start, center) <= window + 1e-6);
                wrapped |= (start - center).abs() > frames / 2.0;
                moved |= start != center;
            }
            assert!(moved);
            if position == 0.0 {
                assert!(wrapped);
            }
        }
    }

    #[test]
    fn grain_pitch_randomization() {
        let asset = dc_asset(1000);
        let envelope = envelope_parameters(10);
        let mut voice = Voice::new(1, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);

        let mut parameters = VoiceParameters::default();
        voice.activate_next_grain(&asset, &parameters);
        assert_eq!(voice.grains()[0].reader().pitch_ratio(), 1.0);

        parameters.pitch_spread = 2.0;
        let (min_ratio, max_ratio) = (semitones_to_ratio(-2.0), semitones_to_ratio(2.0));
        let mut ratios = Vec::new();
        for _ in 0..1000 {
            voice.activate_next_grain(&asset, &parameters);
            let ratio = voice.grains()[0].reader().pitch_ratio();
            assert!(
                ratio >= min_ratio - 1e-9 && ratio <= max_ratio + 1e-9,
                "{ratio} out of range"
            );
            ratios.push(ratio);
        }
        assert!(ratios.iter().any(|r| *r < 0.99));
        assert!(ratios.iter().any(|r| *r > 1.01));

        // the pitch wheel scales following grains
        parameters.pitch_spread = 0.0;
        voice.set_pitch_wheel_ratio(2.0);
        voice.activate_next_grain(&asset, &parameters);
        assert_eq!(voice.grains()[0].reader().pitch_ratio(), 2.0);
    }

    #[test]
    fn panning_and_volume() {
        let asset = dc_asset(2000);
        let envelope = envelope_parameters(10);
        let parameters = VoiceParameters {
            panning: -1.0,
            volume: 0.5,
            ..Default::default()
        };
        let mut voice = Voice::new(8, SAMPLE_RATE, 64);
        voice.start_note(&asset, 60, 1, 1.0, 1.0, 0, &envelope);
        let mut output = vec![0.0; 64 * 2];
        voice.render_next_block(&mut output, 2, &parameters, &envelope);
        let left = output.iter().step_by(2).cloned().fold(0.0, f32::max);
        let right = output.iter().skip(1).step_by(2).cloned().fold(0.0, f32::max);
        assert!(left > 0.0 && left <= 0.5);
        assert!(right.abs() < 1e-6);
    }
}
