//! Polyphonic granular engine: voice management, MIDI handling and parameters.

use std::{sync::Arc, time::Duration};

use crossbeam_channel::Sender;
use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;
use strum::VariantNames;

use crate::{
    asset::SampleAsset,
    error::Error,
    grain::{GrainShape, GrainWindowMode},
    parameter::{
        EnumParameter, FloatParameter, IntegerParameter, Parameter, ParameterScaling,
        ParameterStore,
    },
    utils::{
        adsr::AdsrParameters, db_to_linear, linear_to_db, pitch_wheel_ratio, PITCH_WHEEL_CENTER,
    },
    voice::{Voice, VoiceParameters, VoiceState},
};

// -------------------------------------------------------------------------------------------------

mod handle;

use handle::EngineMessage;

pub use handle::EngineHandle;

// -------------------------------------------------------------------------------------------------

/// Options to configure an [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// By default 8. Maximum number of simultaneously playing notes.
    pub voices: usize,

    /// By default 2. Number of interleaved output channels: 1 (mono) or 2 (stereo).
    pub channel_count: usize,

    /// By default 32. Capacity of each voice's grain pool: the upper bound of the
    /// "Grain Count" parameter.
    pub max_grains: usize,

    /// By default 1024. Size of the queue which buffers events from [`EngineHandle`]s
    /// until the next render call.
    pub message_queue_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            voices: 8,
            channel_count: 2,
            max_grains: 32,
            message_queue_size: 1024,
        }
    }
}

impl EngineOptions {
    pub fn voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn max_grains(mut self, max_grains: usize) -> Self {
        self.max_grains = max_grains;
        self
    }

    pub fn message_queue_size(mut self, size: usize) -> Self {
        self.message_queue_size = size;
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.voices == 0 {
            return Err(Error::ParameterError(
                "engine options 'voices' must be > 0".to_string(),
            ));
        }
        if !(1..=2).contains(&self.channel_count) {
            return Err(Error::ParameterError(format!(
                "engine options 'channel_count' value is '{}'. Must be 1 or 2",
                self.channel_count
            )));
        }
        if self.max_grains == 0 {
            return Err(Error::ParameterError(
                "engine options 'max_grains' must be > 0".to_string(),
            ));
        }
        if self.message_queue_size == 0 {
            return Err(Error::ParameterError(
                "engine options 'message_queue_size' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Voice lifecycle events, optionally sent by the [`Engine`] from the render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatusEvent {
    /// A voice started playing the given note.
    VoiceStarted { note: u8, channel: u8 },
    /// A voice finished playing the given note and is idle now.
    VoiceStopped { note: u8, channel: u8 },
}

// -------------------------------------------------------------------------------------------------

/// Polyphonic granular sampler engine, which plays a single [`SampleAsset`] on a fixed number
/// of [`Voice`]s.
///
/// The engine itself lives in the audio thread: MIDI events and parameter changes are passed
/// in from other threads via [`EngineHandle`]s and get applied at the start of each
/// [`render_next_block`](Self::render_next_block) call. Rendering never allocates, locks or
/// blocks.
pub struct Engine {
    options: EngineOptions,
    asset: Arc<SampleAsset>,
    voices: Vec<Voice>,
    sustained_voices: Vec<bool>,
    note_counter: u64,
    pitch_wheel_positions: [u16; 16],
    sustain_pedals: [bool; 16],
    envelope_parameters: AdsrParameters,
    parameters: Arc<ParameterStore>,
    message_queue: Arc<ArrayQueue<EngineMessage>>,
    status_sender: Option<Sender<EngineStatusEvent>>,
    sample_rate: u32,
    max_block_size: usize,
}

impl Engine {
    // Grain parameters
    const MIN_GRAIN_RATE_HZ: f32 = 1.0;
    const MAX_GRAIN_RATE_HZ: f32 = 100.0;
    const MIN_GRAIN_DURATION_MS: f32 = 1.0;
    const MAX_GRAIN_DURATION_MS: f32 = 1000.0;

    pub const GRAIN_RATE: FloatParameter = FloatParameter::new(
        FourCC(*b"GRAT"),
        "Grain Rate",
        Self::MIN_GRAIN_RATE_HZ..=Self::MAX_GRAIN_RATE_HZ,
        10.0,
    )
    .with_scaling(ParameterScaling::Exponential(2.0))
    .with_unit("Hz");

    pub const GRAIN_DURATION: FloatParameter = FloatParameter::new(
        FourCC(*b"GDUR"),
        "Grain Duration",
        Self::MIN_GRAIN_DURATION_MS..=Self::MAX_GRAIN_DURATION_MS,
        100.0,
    )
    .with_scaling(ParameterScaling::Exponential(2.0))
    .with_unit("ms");

    pub const POSITION: FloatParameter =
        FloatParameter::new(FourCC(*b"GPOS"), "Position", 0.0..=1.0, 0.0);

    pub const POSITION_SPREAD: FloatParameter =
        FloatParameter::new(FourCC(*b"GRPS"), "Randomize Position", 0.0..=1.0, 0.0);

    pub const PITCH_SPREAD: FloatParameter =
        FloatParameter::new(FourCC(*b"GRPT"), "Randomize Pitch", 0.0..=12.0, 0.0)
            .with_unit("st");

    pub const GRAIN_COUNT: IntegerParameter =
        IntegerParameter::new(FourCC(*b"GCNT"), "Grain Count", 1..=64, 8);

    pub const GRAIN_FADE: FloatParameter =
        FloatParameter::new(FourCC(*b"GFAD"), "Grain Fade", 0.0..=0.5, 0.25);

    pub const GRAIN_WINDOW: EnumParameter = EnumParameter::new(
        FourCC(*b"GWND"),
        "Grain Window",
        GrainWindowMode::VARIANTS,
        GrainWindowMode::Linear as usize,
    );

    // Note envelope parameters
    const MIN_TIME_MS: f32 = 0.0;
    const MAX_TIME_MS: f32 = 10000.0;

    pub const AMP_ATTACK: FloatParameter = FloatParameter::new(
        FourCC(*b"AATK"),
        "Attack",
        Self::MIN_TIME_MS..=Self::MAX_TIME_MS,
        10.0,
    )
    .with_scaling(ParameterScaling::Exponential(3.0))
    .with_unit("ms");
    pub const AMP_DECAY: FloatParameter = FloatParameter::new(
        FourCC(*b"ADCY"),
        "Decay",
        Self::MIN_TIME_MS..=Self::MAX_TIME_MS,
        100.0,
    )
    .with_scaling(ParameterScaling::Exponential(3.0))
    .with_unit("ms");
    pub const AMP_SUSTAIN: FloatParameter = FloatParameter::new(
        FourCC(*b"ASTN"), //
        "Sustain",
        0.0..=1.0,
        1.0,
    );
    pub const AMP_RELEASE: FloatParameter = FloatParameter::new(
        FourCC(*b"AREL"),
        "Release",
        Self::MIN_TIME_MS..=Self::MAX_TIME_MS,
        200.0,
    )
    .with_scaling(ParameterScaling::Exponential(3.0))
    .with_unit("ms");

    // Output parameters
    pub const VOLUME: FloatParameter = FloatParameter::new(
        FourCC(*b"SVOL"),
        "Volume",
        0.000001..=15.848932, // db_to_linear(-60.0)..=db_to_linear(24.0)
        1.0,                  // 0dB
    );

    pub const PANNING: FloatParameter =
        FloatParameter::new(FourCC(*b"SPAN"), "Panning", -1.0..=1.0, 0.0);

    pub const PITCH_BEND_RANGE: IntegerParameter =
        IntegerParameter::new(FourCC(*b"PBRG"), "Pitch Bend Range", 0..=24, 2).with_unit("st");

    /// All engine parameter descriptors.
    pub fn parameters() -> Vec<Box<dyn Parameter>> {
        let percent_to_string = |v: f32| format!("{:.1} %", v * 100.0);
        let string_to_percent = |s: &str| {
            let s = s
                .trim_start()
                .trim_end_matches(|c: char| c == '%' || c.is_whitespace());
            s.parse::<f32>().ok().map(|v| v / 100.0)
        };

        let gain_to_string = |v: f32| {
            let db = linear_to_db(v);
            if db <= -60.0 {
                "-INF".to_string()
            } else {
                format!("{:.2}", db)
            }
        };
        let string_to_gain = |s: &str| {
            if s.trim().eq_ignore_ascii_case("-inf") || s.trim().eq_ignore_ascii_case("inf") {
                Some(*Self::VOLUME.range().start())
            } else {
                let s = s.trim_start().trim_end_matches(|c: char| {
                    c.eq_ignore_ascii_case(&'d')
                        || c.eq_ignore_ascii_case(&'b')
                        || c.is_whitespace()
                });
                s.parse::<f32>().ok().map(db_to_linear)
            }
        };

        let pan_to_string = |v: f32| {
            let v = v * 50.0;
            if v.abs() < 0.1 {
                "C".to_string()
            } else if v < 0.0 {
                format!("{:.0}L", v.abs())
            } else {
                format!("{:.0}R", v)
            }
        };
        let string_to_pan = |s: &str| {
            let s = s.trim();
            if s.eq_ignore_ascii_case("c") {
                return Some(0.0);
            }
            let (value, sign) = match s.chars().last() {
                Some(c) if c.eq_ignore_ascii_case(&'l') => (&s[..s.len() - 1], -1.0),
                Some(c) if c.eq_ignore_ascii_case(&'r') => (&s[..s.len() - 1], 1.0),
                _ => return None,
            };
            value.trim().parse::<f32>().ok().map(|v| sign * v / 50.0)
        };

        vec![
            Self::GRAIN_RATE.into_box(),
            Self::GRAIN_DURATION.into_box(),
            Self::POSITION
                .with_display(percent_to_string, string_to_percent)
                .into_box(),
            Self::POSITION_SPREAD
                .with_display(percent_to_string, string_to_percent)
                .into_box(),
            Self::PITCH_SPREAD.into_box(),
            Self::GRAIN_COUNT.into_box(),
            Self::GRAIN_FADE
                .with_display(percent_to_string, string_to_percent)
                .into_box(),
            Self::GRAIN_WINDOW.into_box(),
            Self::AMP_ATTACK.into_box(),
            Self::AMP_DECAY.into_box(),
            Self::AMP_SUSTAIN
                .with_display(percent_to_string, string_to_percent)
                .into_box(),
            Self::AMP_RELEASE.into_box(),
            Self::VOLUME
                .with_unit("dB")
                .with_scaling(ParameterScaling::Decibel(-60.0, 24.0))
                .with_display(gain_to_string, string_to_gain)
                .into_box(),
            Self::PANNING
                .with_display(pan_to_string, string_to_pan)
                .into_box(),
            Self::PITCH_BEND_RANGE.into_box(),
        ]
    }

    /// Create a new engine which plays the given asset with the given output sample rate.
    /// `max_block_size` is the maximum expected number of frames per render call: larger
    /// blocks are fine, but get processed in chunks.
    pub fn new(
        options: EngineOptions,
        asset: Arc<SampleAsset>,
        sample_rate: u32,
        max_block_size: usize,
    ) -> Result<Self, Error> {
        options.validate()?;
        Self::validate_timing(sample_rate, max_block_size)?;

        let voices = (0..options.voices)
            .map(|_| Voice::new(options.max_grains, sample_rate, max_block_size))
            .collect();
        let sustained_voices = vec![false; options.voices];

        let mut envelope_parameters = AdsrParameters::default();
        envelope_parameters.set_sample_rate(sample_rate)?;

        let parameters = Arc::new(ParameterStore::new(Self::parameters())?);
        let message_queue = Arc::new(ArrayQueue::new(options.message_queue_size));

        log::info!(
            "Creating granular engine for asset '{}' with {} voices at {} Hz",
            asset.name(),
            options.voices,
            sample_rate
        );

        Ok(Self {
            options,
            asset,
            voices,
            sustained_voices,
            note_counter: 0,
            pitch_wheel_positions: [PITCH_WHEEL_CENTER; 16],
            sustain_pedals: [false; 16],
            envelope_parameters,
            parameters,
            message_queue,
            status_sender: None,
            sample_rate,
            max_block_size,
        })
    }

    /// The engine's options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Number of interleaved output channels.
    pub fn channel_count(&self) -> usize {
        self.options.channel_count
    }

    /// Current output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The asset that is played.
    pub fn asset(&self) -> &Arc<SampleAsset> {
        &self.asset
    }

    /// Create a new handle to control the engine from other threads.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(Arc::clone(&self.message_queue), Arc::clone(&self.parameters))
    }

    /// Set or remove a sender for voice lifecycle events. Events are sent without blocking:
    /// when the channel is full, events get dropped.
    pub fn set_status_sender(&mut self, sender: Option<Sender<EngineStatusEvent>>) {
        self.status_sender = sender;
    }

    /// Apply a new output sample rate and maximum block size. Must not be called from
    /// real-time threads. Calling it again with the same values has no effect.
    pub fn prepare(&mut self, sample_rate: u32, max_block_size: usize) -> Result<(), Error> {
        Self::validate_timing(sample_rate, max_block_size)?;
        if sample_rate == self.sample_rate && max_block_size == self.max_block_size {
            return Ok(());
        }
        log::debug!("Preparing granular engine: {sample_rate} Hz, {max_block_size} frames");
        self.envelope_parameters.set_sample_rate(sample_rate)?;
        for voice in &mut self.voices {
            voice.prepare(sample_rate, max_block_size);
        }
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        Ok(())
    }

    /// Replace the played asset. All playing voices get stopped immediately. Must not be
    /// called from real-time threads, as this may free the old asset.
    pub fn set_asset(&mut self, asset: Arc<SampleAsset>) {
        log::info!("Replacing engine asset with '{}'", asset.name());
        self.stop_all_notes();
        for voice in &mut self.voices {
            voice.release_asset();
        }
        self.asset = asset;
    }

    /// Immediately stop all playing voices without tail-off.
    pub fn stop_all_notes(&mut self) {
        for index in 0..self.voices.len() {
            self.stop_voice(index, false);
        }
    }

    /// Number of currently playing (active or releasing) voices.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Total number of grain onsets of all voices since the engine got created.
    pub fn grain_onset_count(&self) -> u64 {
        self.voices.iter().map(|v| v.onset_count()).sum()
    }

    /// Access the engine's voices, e.g. to inspect their state.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Apply pending events, then add the output of all playing voices into the given
    /// interleaved output buffer. The buffer's length must be a multiple of the engine's
    /// channel count. Empty buffers are a no-op.
    pub fn render_next_block(&mut self, output: &mut [f32]) {
        Self::assert_no_alloc(|| self.process(output));
    }

    fn process(&mut self, output: &mut [f32]) {
        let channel_count = self.options.channel_count;
        debug_assert!(
            output.len() % channel_count == 0,
            "Output buffer size must be a multiple of the channel count"
        );
        let frame_count = output.len() / channel_count;
        if frame_count == 0 {
            return;
        }
        let output = &mut output[..frame_count * channel_count];

        // snapshot parameters
        let parameters = self.voice_parameters();
        self.update_envelope_parameters();
        let bend_range = self.parameters.get(Self::PITCH_BEND_RANGE.id());

        // apply queued events
        while let Some(message) = self.message_queue.pop() {
            self.process_message(message);
        }

        // render voices
        for (voice, sustained) in self.voices.iter_mut().zip(&mut self.sustained_voices) {
            if !voice.is_active() {
                continue;
            }
            let pitch_wheel_position = self.pitch_wheel_positions[voice.channel() as usize - 1];
            voice.set_pitch_wheel_ratio(pitch_wheel_ratio(pitch_wheel_position, bend_range));
            voice.render_next_block(
                output,
                channel_count,
                &parameters,
                &self.envelope_parameters,
            );
            if !voice.is_active() {
                *sustained = false;
                Self::send_status(
                    &self.status_sender,
                    EngineStatusEvent::VoiceStopped {
                        note: voice.note(),
                        channel: voice.channel(),
                    },
                );
            }
        }
    }

    fn process_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::NoteOn {
                channel,
                note,
                velocity,
            } => {
                self.trigger_note_on(channel, note, velocity);
            }
            EngineMessage::NoteOff {
                channel,
                note,
                allow_tail_off,
            } => {
                self.trigger_note_off(channel, note, allow_tail_off);
            }
            EngineMessage::PitchWheel { channel, value } => {
                self.pitch_wheel_positions[channel as usize - 1] = value;
            }
            EngineMessage::Controller {
                channel,
                controller,
                value,
            } => {
                self.trigger_controller(channel, controller, value);
            }
            EngineMessage::AllNotesOff { allow_tail_off } => {
                for index in 0..self.voices.len() {
                    self.stop_voice(index, allow_tail_off);
                }
            }
        }
    }

    fn trigger_note_on(&mut self, channel: u8, note: u8, velocity: f32) {
        if velocity <= 0.0 {
            // a note-on with zero velocity is a note-off
            self.trigger_note_off(channel, note, true);
            return;
        }
        if !self.asset.applies_to_channel(channel) || !self.asset.applies_to_note(note) {
            return;
        }

        // tail off voices which already play the same note
        for index in 0..self.voices.len() {
            let voice = &self.voices[index];
            if voice.state() == VoiceState::Active
                && voice.note() == note
                && voice.channel() == channel
            {
                self.stop_voice(index, true);
            }
        }

        // allocate a new voice
        let index = self.next_free_voice_index();
        if self.voices[index].is_active() {
            self.stop_voice(index, false);
        }

        let bend_range = self.parameters.get(Self::PITCH_BEND_RANGE.id());
        let wheel_ratio =
            pitch_wheel_ratio(self.pitch_wheel_positions[channel as usize - 1], bend_range);
        self.note_counter += 1;
        self.voices[index].start_note(
            &self.asset,
            note,
            channel,
            velocity,
            wheel_ratio,
            self.note_counter,
            &self.envelope_parameters,
        );
        self.sustained_voices[index] = false;
        Self::send_status(
            &self.status_sender,
            EngineStatusEvent::VoiceStarted { note, channel },
        );
    }

    fn trigger_note_off(&mut self, channel: u8, note: u8, allow_tail_off: bool) {
        for index in 0..self.voices.len() {
            let voice = &self.voices[index];
            if voice.state() == VoiceState::Active
                && voice.note() == note
                && voice.channel() == channel
            {
                if self.sustain_pedals[channel as usize - 1] {
                    // deferred until the pedal gets released
                    self.sustained_voices[index] = true;
                } else {
                    self.stop_voice(index, allow_tail_off);
                }
            }
        }
    }

    fn trigger_controller(&mut self, channel: u8, controller: u8, value: u8) {
        const SUSTAIN_PEDAL: u8 = 64;
        const ALL_SOUND_OFF: u8 = 120;
        const ALL_NOTES_OFF: u8 = 123;

        let channel_index = channel as usize - 1;
        match controller {
            SUSTAIN_PEDAL => {
                let pedal_down = value >= 64;
                self.sustain_pedals[channel_index] = pedal_down;
                if !pedal_down {
                    for index in 0..self.voices.len() {
                        if self.sustained_voices[index] && self.voices[index].channel() == channel
                        {
                            self.stop_voice(index, true);
                        }
                    }
                }
            }
            ALL_SOUND_OFF | ALL_NOTES_OFF => {
                let allow_tail_off = controller == ALL_NOTES_OFF;
                for index in 0..self.voices.len() {
                    if self.voices[index].channel() == channel {
                        self.stop_voice(index, allow_tail_off);
                    }
                }
            }
            _ => (),
        }
    }

    /// Stop the voice at the given index and send a status event when it's idle now.
    fn stop_voice(&mut self, index: usize, allow_tail_off: bool) {
        let voice = &mut self.voices[index];
        if !voice.is_active() {
            return;
        }
        voice.stop_note(allow_tail_off, &self.envelope_parameters);
        self.sustained_voices[index] = false;
        if !voice.is_active() {
            Self::send_status(
                &self.status_sender,
                EngineStatusEvent::VoiceStopped {
                    note: voice.note(),
                    channel: voice.channel(),
                },
            );
        }
    }

    /// Find a free voice or the best candidate to steal.
    /// Returns the index of the new voice, which is always valid.
    fn next_free_voice_index(&self) -> usize {
        // Try to find a completely free voice first
        if let Some(index) = self.voices.iter().position(|v| !v.is_active()) {
            return index;
        }
        // Else steal the oldest releasing voice, then the oldest active one
        let oldest = |state: VoiceState| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.state() == state)
                .min_by_key(|(_, v)| v.note_age())
                .map(|(index, _)| index)
        };
        oldest(VoiceState::Releasing)
            .or_else(|| oldest(VoiceState::Active))
            .unwrap_or(0)
    }

    /// Read all voice parameters from the parameter store.
    fn voice_parameters(&self) -> VoiceParameters {
        let store = &self.parameters;
        VoiceParameters {
            grain_rate: store.get(Self::GRAIN_RATE.id()),
            grain_duration: store.get(Self::GRAIN_DURATION.id()),
            position: store.get(Self::POSITION.id()),
            position_spread: store.get(Self::POSITION_SPREAD.id()),
            pitch_spread: store.get(Self::PITCH_SPREAD.id()),
            grain_count: (store.get(Self::GRAIN_COUNT.id()).round() as usize)
                .clamp(1, self.options.max_grains),
            grain_shape: GrainShape {
                fade: store.get(Self::GRAIN_FADE.id()),
                window: GrainWindowMode::from_repr(store.get(Self::GRAIN_WINDOW.id()) as u8)
                    .unwrap_or_default(),
            },
            volume: store.get(Self::VOLUME.id()),
            panning: store.get(Self::PANNING.id()),
        }
    }

    /// Apply note envelope parameter changes. The asset's attack and release times act as
    /// lower bounds.
    fn update_envelope_parameters(&mut self) {
        let store = &self.parameters;
        let duration = |id: FourCC| Duration::from_secs_f32(store.get(id).max(0.0) / 1000.0);
        let attack = duration(Self::AMP_ATTACK.id()).max(self.asset.attack());
        let decay = duration(Self::AMP_DECAY.id());
        let sustain = store.get(Self::AMP_SUSTAIN.id()).clamp(0.0, 1.0);
        let release = duration(Self::AMP_RELEASE.id()).max(self.asset.release());
        let result = self
            .envelope_parameters
            .setup(attack, decay, sustain, release);
        debug_assert!(result.is_ok(), "Invalid envelope parameters");
    }

    fn send_status(sender: &Option<Sender<EngineStatusEvent>>, event: EngineStatusEvent) {
        if let Some(sender) = sender {
            // never block the render thread: drop events when the channel is full
            let _ = sender.try_send(event);
        }
    }

    fn validate_timing(sample_rate: u32, max_block_size: usize) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Invalid sample rate: must be > 0".to_string(),
            ));
        }
        if max_block_size == 0 {
            return Err(Error::ParameterError(
                "Invalid max block size: must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
        #[cfg(feature = "assert-allocs")]
        return assert_no_alloc::assert_no_alloc::<T, F>(func);

        #[cfg(not(feature = "assert-allocs"))]
        return func();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;
    use crate::{asset::AssetOptions, utils::adsr::AdsrStage};

    const SAMPLE_RATE: u32 = 44100;
    const BLOCK_SIZE: usize = 512;

    fn sine_asset(seconds: f32, options: AssetOptions) -> Result<Arc<SampleAsset>, Error> {
        let frames = (seconds * SAMPLE_RATE as f32) as usize;
        let samples = (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / SAMPLE_RATE as f32).sin())
            .collect();
        Ok(Arc::new(SampleAsset::new(
            "sine",
            vec![samples],
            SAMPLE_RATE,
            options,
        )?))
    }

    fn engine(options: EngineOptions) -> Result<Engine, Error> {
        let asset = sine_asset(2.0, AssetOptions::default())?;
        Engine::new(options, asset, SAMPLE_RATE, BLOCK_SIZE)
    }

    fn render(engine: &mut Engine, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * engine.channel_count()];
        engine.render_next_block(&mut output);
        output
    }

    #[test]
    fn options() {
        assert!(EngineOptions::default().validate().is_ok());
        assert!(EngineOptions::default().voices(0).validate().is_err());
        assert!(EngineOptions::default().channel_count(3).validate().is_err());
        assert!(EngineOptions::default().max_grains(0).validate().is_err());
        assert!(EngineOptions::default()
            .message_queue_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn parameter_descriptors() -> Result<(), Error> {
        let parameters = Engine::parameters();
        assert_eq!(parameters.len(), 15);
        let store = ParameterStore::new(parameters)?;
        let volume = store.parameter(Engine::VOLUME.id())?;
        assert_eq!(volume.plain_value_to_string(1.0, true), "0.00 dB");
        assert_eq!(volume.string_to_plain_value("-INF"), Some(0.000001));
        let panning = store.parameter(Engine::PANNING.id())?;
        assert_eq!(panning.plain_value_to_string(0.0, false), "C");
        assert_eq!(panning.plain_value_to_string(-1.0, false), "50L");
        assert_eq!(panning.string_to_plain_value("25R"), Some(0.5));
        let window = store.parameter(Engine::GRAIN_WINDOW.id())?;
        assert_eq!(window.string_to_plain_value("equal power"), Some(1.0));
        Ok(())
    }

    #[test]
    fn scenario_grain_onsets() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default().channel_count(1))?;
        let handle = engine.handle();
        handle.set_parameter(Engine::GRAIN_RATE.id(), 20.0)?;
        handle.set_parameter(Engine::GRAIN_DURATION.id(), 50.0)?;
        handle.set_parameter(Engine::GRAIN_COUNT.id(), 4.0)?;
        handle.note_on(1, 60, 1.0)?;

        let grain_count = 4.0_f32;
        let peak_bound = grain_count * (1.0 / grain_count.sqrt());
        let mut rendered = 0;
        while rendered < SAMPLE_RATE as usize {
            let output = render(&mut engine, BLOCK_SIZE);
            assert!(output.iter().all(|v| v.abs() <= peak_bound + 1e-4));
            assert!(engine.voices()[0].active_grain_count() <= 4);
            rendered += BLOCK_SIZE;
        }
        assert!((19..=21).contains(&engine.grain_onset_count()));
        Ok(())
    }

    #[test]
    fn scenario_stop_without_tail_off() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.note_on(1, 60, 1.0)?;
        let output = render(&mut engine, BLOCK_SIZE);
        assert!(output.iter().any(|v| *v != 0.0));
        assert_eq!(engine.active_voice_count(), 1);

        handle.note_off(1, 60, false)?;
        let output = render(&mut engine, BLOCK_SIZE);
        assert!(output.iter().all(|v| *v == 0.0));
        assert_eq!(engine.active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn scenario_stop_with_tail_off() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.set_parameter(Engine::AMP_RELEASE.id(), 50.0)?;
        handle.note_on(1, 60, 1.0)?;
        for _ in 0..4 {
            render(&mut engine, BLOCK_SIZE);
        }
        handle.note_off(1, 60, true)?;

        let mut last_level = engine.voices()[0].envelope_output();
        let mut blocks = 0;
        loop {
            render(&mut engine, 64);
            let voice = &engine.voices()[0];
            let level = voice.envelope_output();
            if voice.state() == VoiceState::Idle {
                assert_eq!(voice.envelope_stage(), AdsrStage::Idle);
                break;
            }
            assert_eq!(voice.state(), VoiceState::Releasing);
            assert!(level < last_level);
            last_level = level;
            blocks += 1;
            assert!(blocks < 1000, "voice never stopped");
        }
        assert_eq!(engine.active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn zero_samples_is_noop() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        engine.handle().note_on(1, 60, 1.0)?;
        engine.render_next_block(&mut []);
        // events stay queued until something gets rendered
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.grain_onset_count(), 0);
        Ok(())
    }

    #[test]
    fn ignores_inapplicable_notes() -> Result<(), Error> {
        let asset = sine_asset(
            1.0,
            AssetOptions::default()
                .note_range(48..=72)
                .midi_channel(2),
        )?;
        let mut engine = Engine::new(EngineOptions::default(), asset, SAMPLE_RATE, BLOCK_SIZE)?;
        let handle = engine.handle();
        handle.note_on(2, 80, 1.0)?;
        handle.note_on(1, 60, 1.0)?;
        let output = render(&mut engine, BLOCK_SIZE);
        assert_eq!(engine.active_voice_count(), 0);
        assert!(output.iter().all(|v| *v == 0.0));
        handle.note_on(2, 60, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        assert_eq!(engine.active_voice_count(), 1);
        Ok(())
    }

    #[test]
    fn voice_stealing() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default().voices(2))?;
        let handle = engine.handle();
        handle.note_on(1, 60, 1.0)?;
        handle.note_on(1, 62, 1.0)?;
        handle.note_on(1, 64, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        let mut notes = engine.voices().iter().map(|v| v.note()).collect::<Vec<_>>();
        notes.sort();
        assert_eq!(notes, vec![62, 64]);

        // releasing voices get stolen first
        handle.note_off(1, 64, true)?;
        handle.note_on(1, 65, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        let mut notes = engine.voices().iter().map(|v| v.note()).collect::<Vec<_>>();
        notes.sort();
        assert_eq!(notes, vec![62, 65]);
        Ok(())
    }

    #[test]
    fn retrigger_tails_off() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.note_on(1, 60, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        handle.note_on(1, 60, 1.0)?;
        render(&mut engine, 64);
        let states = engine.voices()[..2]
            .iter()
            .map(|v| v.state())
            .collect::<Vec<_>>();
        assert_eq!(states, vec![VoiceState::Releasing, VoiceState::Active]);
        Ok(())
    }

    #[test]
    fn sustain_pedal() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.controller_moved(1, 64, 127)?;
        handle.note_on(1, 60, 1.0)?;
        handle.note_off(1, 60, true)?;
        render(&mut engine, BLOCK_SIZE);
        assert_eq!(engine.voices()[0].state(), VoiceState::Active);

        handle.controller_moved(1, 64, 0)?;
        render(&mut engine, 64);
        assert_eq!(engine.voices()[0].state(), VoiceState::Releasing);

        handle.controller_moved(1, 120, 0)?;
        render(&mut engine, 64);
        assert_eq!(engine.active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn all_notes_off() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.note_on(1, 60, 1.0)?;
        handle.note_on(3, 64, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        assert_eq!(engine.active_voice_count(), 2);
        handle.all_notes_off(true)?;
        render(&mut engine, 64);
        assert!(engine
            .voices()
            .iter()
            .filter(|v| v.is_active())
            .all(|v| v.state() == VoiceState::Releasing));
        engine.stop_all_notes();
        assert_eq!(engine.active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn pitch_wheel() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.set_parameter(Engine::GRAIN_RATE.id(), 100.0)?; // onset every 441 samples
        handle.set_parameter(Engine::GRAIN_DURATION.id(), 1000.0)?;
        handle.set_parameter(Engine::GRAIN_COUNT.id(), 2.0)?;
        handle.set_parameter(Engine::PITCH_BEND_RANGE.id(), 12.0)?;
        handle.note_on(1, 60, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        let pitch_ratios = |engine: &Engine| {
            engine.voices()[0]
                .grains()
                .iter()
                .take(2)
                .map(|g| g.reader().pitch_ratio())
                .collect::<Vec<_>>()
        };
        assert_eq!(pitch_ratios(&engine), vec![1.0, 1.0]);

        // sounding grains keep their pitch
        handle.pitch_wheel_moved(1, 16383)?;
        render(&mut engine, 64);
        assert_eq!(pitch_ratios(&engine), vec![1.0, 1.0]);

        // the next grain reads twice as fast
        render(&mut engine, BLOCK_SIZE);
        assert_eq!(pitch_ratios(&engine), vec![2.0, 1.0]);
        let grains = engine.voices()[0].grains();
        assert_eq!(grains[0].reader().position(), 2.0 * 206.0);
        assert_eq!(grains[1].reader().position(), 71.0 + 64.0 + 512.0);

        handle.pitch_wheel_moved(1, 0)?;
        render(&mut engine, BLOCK_SIZE);
        assert_eq!(pitch_ratios(&engine), vec![2.0, 0.5]);
        // wheel changes don't stop playing notes
        assert_eq!(engine.active_voice_count(), 1);
        Ok(())
    }

    #[test]
    fn zero_velocity_note_on_releases() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let handle = engine.handle();
        handle.note_on(1, 60, 0.0)?;
        render(&mut engine, 64);
        assert_eq!(engine.active_voice_count(), 0);

        handle.note_on(1, 60, 1.0)?;
        render(&mut engine, BLOCK_SIZE);
        handle.note_on(1, 60, 0.0)?;
        render(&mut engine, 64);
        assert_eq!(engine.active_voice_count(), 1);
        assert_eq!(engine.voices()[0].state(), VoiceState::Releasing);
        Ok(())
    }

    #[test]
    fn mono_output_mixes_both_asset_channels() -> Result<(), Error> {
        let render_stereo_asset = |left: f32, right: f32| -> Result<Vec<f32>, Error> {
            let frames = SAMPLE_RATE as usize;
            let asset = Arc::new(SampleAsset::new(
                "stereo",
                vec![vec![left; frames], vec![right; frames]],
                SAMPLE_RATE,
                AssetOptions::default(),
            )?);
            let mut engine = Engine::new(
                EngineOptions::default().channel_count(1),
                asset,
                SAMPLE_RATE,
                BLOCK_SIZE,
            )?;
            engine.handle().note_on(1, 60, 1.0)?;
            Ok(render(&mut engine, 20 * BLOCK_SIZE))
        };
        let right_only = render_stereo_asset(0.0, 0.5)?;
        assert!(right_only.iter().any(|v| v.abs() > 0.0));
        let left_only = render_stereo_asset(0.5, 0.0)?;
        assert_eq!(left_only, right_only);
        Ok(())
    }

    #[test]
    fn asset_envelope_times_are_minimums() -> Result<(), Error> {
        let asset = sine_asset(
            1.0,
            AssetOptions::default()
                .attack(Duration::from_millis(100))
                .release(Duration::from_millis(200)),
        )?;
        let mut engine = Engine::new(EngineOptions::default(), asset, SAMPLE_RATE, BLOCK_SIZE)?;
        let handle = engine.handle();
        handle.set_parameter(Engine::AMP_ATTACK.id(), 0.0)?;
        handle.set_parameter(Engine::AMP_RELEASE.id(), 0.0)?;
        handle.note_on(1, 60, 1.0)?;

        // 50 ms into the 100 ms attack
        render(&mut engine, 2205);
        assert_eq!(
            engine.envelope_parameters.attack_time(),
            Duration::from_millis(100)
        );
        assert_eq!(
            engine.envelope_parameters.release_time(),
            Duration::from_millis(200)
        );
        assert_eq!(engine.voices()[0].envelope_stage(), AdsrStage::Attack);
        assert!(engine.voices()[0].envelope_output() < 0.9);

        render(&mut engine, 4410);
        assert_eq!(engine.voices()[0].envelope_output(), 1.0);

        // 150 ms into the 200 ms release
        handle.note_off(1, 60, true)?;
        render(&mut engine, 6615);
        assert_eq!(engine.voices()[0].state(), VoiceState::Releasing);
        render(&mut engine, 4410);
        assert_eq!(engine.active_voice_count(), 0);

        // longer parameter values win
        handle.set_parameter(Engine::AMP_ATTACK.id(), 300.0)?;
        render(&mut engine, 64);
        let attack = engine.envelope_parameters.attack_time().as_secs_f32();
        assert!((attack - 0.3).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn status_events() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        let (sender, receiver) = bounded(16);
        engine.set_status_sender(Some(sender));
        let handle = engine.handle();
        handle.note_on(1, 60, 1.0)?;
        render(&mut engine, 64);
        handle.note_off(1, 60, false)?;
        render(&mut engine, 64);
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![
                EngineStatusEvent::VoiceStarted {
                    note: 60,
                    channel: 1
                },
                EngineStatusEvent::VoiceStopped {
                    note: 60,
                    channel: 1
                }
            ]
        );
        Ok(())
    }

    #[test]
    fn prepare_and_set_asset() -> Result<(), Error> {
        let mut engine = engine(EngineOptions::default())?;
        assert!(engine.prepare(0, 128).is_err());
        engine.prepare(48000, 256)?;
        engine.prepare(48000, 256)?;
        assert_eq!(engine.sample_rate(), 48000);

        engine.handle().note_on(1, 60, 1.0)?;
        render(&mut engine, 1024);
        assert_eq!(engine.active_voice_count(), 1);
        engine.set_asset(sine_asset(0.5, AssetOptions::default())?);
        assert_eq!(engine.active_voice_count(), 0);
        Ok(())
    }
}
