//! Decoded, immutable sample data with playback metadata.

use std::{ops::RangeInclusive, path::Path, time::Duration};

use symphonia::core::audio::SampleBuffer;

use crate::{error::Error, utils::decoder::AudioDecoder};

// -------------------------------------------------------------------------------------------------

/// Options for creating a [`SampleAsset`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssetOptions {
    /// By default 60 (middle C). The MIDI note at which the sample plays back at its recorded
    /// pitch.
    pub root_note: u8,
    /// By default 0..=127. Notes outside of this range are ignored.
    pub note_range: RangeInclusive<u8>,
    /// By default all 16 MIDI channels. Bit `n` enables MIDI channel `n + 1`.
    pub midi_channels: u16,
    /// By default 20 ms. Minimum note attack time, applied to avoid clicks.
    pub attack: Duration,
    /// By default 20 ms. Minimum note release time, applied to avoid clicks.
    pub release: Duration,
    /// By default 10 seconds. Longer samples are rejected.
    pub max_duration: Duration,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            root_note: 60,
            note_range: 0..=127,
            midi_channels: 0xFFFF,
            attack: Duration::from_millis(20),
            release: Duration::from_millis(20),
            max_duration: Duration::from_secs(10),
        }
    }
}

impl AssetOptions {
    pub fn root_note(mut self, note: u8) -> Self {
        self.root_note = note;
        self
    }

    pub fn note_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.note_range = range;
        self
    }

    pub fn midi_channels(mut self, mask: u16) -> Self {
        self.midi_channels = mask;
        self
    }

    /// Restrict the asset to a single MIDI channel in range 1..=16.
    pub fn midi_channel(mut self, channel: u8) -> Self {
        self.midi_channels = if (1..=16).contains(&channel) {
            1 << (channel - 1)
        } else {
            0
        };
        self
    }

    pub fn attack(mut self, duration: Duration) -> Self {
        self.attack = duration;
        self
    }

    pub fn release(mut self, duration: Duration) -> Self {
        self.release = duration;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.root_note > 127 {
            return Err(Error::ParameterError(format!(
                "asset options 'root_note' value is '{}'",
                self.root_note
            )));
        }
        if self.note_range.is_empty() || *self.note_range.end() > 127 {
            return Err(Error::ParameterError(format!(
                "asset options 'note_range' value is '{:?}'",
                self.note_range
            )));
        }
        if self.midi_channels == 0 {
            return Err(Error::ParameterError(
                "asset options 'midi_channels' must enable at least one channel".to_string(),
            ));
        }
        if self.max_duration.is_zero() {
            return Err(Error::ParameterError(
                "asset options 'max_duration' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// An immutable, decoded mono or stereo sample, shared by all voices and grains that play it.
///
/// Besides the planar sample data, an asset defines where and how it can be played: its root
/// note, the notes and MIDI channels it applies to, and minimum note attack and release times.
/// Wrap it into an `Arc` to share it with an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct SampleAsset {
    name: String,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    options: AssetOptions,
}

impl SampleAsset {
    /// Create a new asset from planar (one buffer per channel) sample data.
    ///
    /// Fails when the options are invalid, when there are no or more than two channels,
    /// when the sample data is empty or when its duration exceeds the configured maximum.
    pub fn new(
        name: &str,
        channels: Vec<Vec<f32>>,
        sample_rate: u32,
        options: AssetOptions,
    ) -> Result<Self, Error> {
        options.validate()?;
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "asset sample rate must be > 0".to_string(),
            ));
        }
        if channels.is_empty() || channels.len() > 2 {
            return Err(Error::UnsupportedChannelLayout(channels.len()));
        }
        let frame_count = channels[0].len();
        if channels.iter().any(|c| c.len() != frame_count) {
            return Err(Error::ParameterError(
                "asset channel buffers must have the same length".to_string(),
            ));
        }
        if frame_count == 0 {
            return Err(Error::EmptyAsset);
        }
        let duration = Duration::from_secs_f64(frame_count as f64 / sample_rate as f64);
        if duration > options.max_duration {
            return Err(Error::AssetTooLong(duration, options.max_duration));
        }
        Ok(Self {
            name: name.to_string(),
            channels,
            sample_rate,
            options,
        })
    }

    /// Create a new asset from interleaved sample data with the given channel layout.
    pub fn from_interleaved(
        name: &str,
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
        options: AssetOptions,
    ) -> Result<Self, Error> {
        if channel_count == 0 || channel_count > 2 {
            return Err(Error::UnsupportedChannelLayout(channel_count));
        }
        if samples.len() % channel_count != 0 {
            return Err(Error::ParameterError(format!(
                "interleaved sample count {} is not a multiple of the channel count {}",
                samples.len(),
                channel_count
            )));
        }
        let frame_count = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(name, channels, sample_rate, options)
    }

    /// Decode the given audio file into a new asset.
    pub fn from_file<P: AsRef<Path>>(path: P, options: AssetOptions) -> Result<Self, Error> {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let decoder = AudioDecoder::from_file(path.as_ref())?;
        Self::decode(&name, decoder, options)
    }

    /// Decode the given encoded audio file buffer into a new asset.
    pub fn from_file_buffer(
        buffer: Vec<u8>,
        name: &str,
        options: AssetOptions,
    ) -> Result<Self, Error> {
        let decoder = AudioDecoder::from_buffer(buffer)?;
        Self::decode(name, decoder, options)
    }

    fn decode(name: &str, mut decoder: AudioDecoder, options: AssetOptions) -> Result<Self, Error> {
        options.validate()?;
        let signal_spec = decoder.signal_spec()?;
        let sample_rate = signal_spec.rate;
        let channel_count = signal_spec.channels.count();
        if channel_count == 0 || channel_count > 2 {
            return Err(Error::UnsupportedChannelLayout(channel_count));
        }
        if sample_rate == 0 {
            return Err(Error::MediaFileProbeError);
        }

        // reject long files before decoding them, when the container tells us the length
        let max_frames = (options.max_duration.as_secs_f64() * sample_rate as f64) as u64;
        let duration_of = |frames: u64| Duration::from_secs_f64(frames as f64 / sample_rate as f64);
        if let Some(frame_count) = decoder.frame_count() {
            if frame_count > max_frames {
                log::warn!("Rejecting sample '{name}': too long ({frame_count} frames)");
                return Err(Error::AssetTooLong(
                    duration_of(frame_count),
                    options.max_duration,
                ));
            }
        }

        // decode the entire file in chunks of max_frames_per_packet sizes
        let decode_buffer_capacity = decoder
            .codec_params()
            .max_frames_per_packet
            .unwrap_or(16 * 1024);
        let mut decode_buffer = SampleBuffer::<f32>::new(decode_buffer_capacity, signal_spec);
        let mut samples = Vec::with_capacity(
            decoder.frame_count().unwrap_or(0) as usize * channel_count,
        );
        while decoder.read_packet(&mut decode_buffer).is_some() {
            samples.extend_from_slice(decode_buffer.samples());
            let frame_count = (samples.len() / channel_count) as u64;
            if frame_count > max_frames {
                log::warn!("Rejecting sample '{name}': too long");
                return Err(Error::AssetTooLong(
                    duration_of(frame_count),
                    options.max_duration,
                ));
            }
        }
        if samples.is_empty() {
            return Err(Error::EmptyAsset);
        }

        let asset = Self::from_interleaved(name, &samples, channel_count, sample_rate, options)?;
        log::info!(
            "Loaded sample '{}': {} frames, {} channels, {} Hz",
            asset.name,
            asset.frame_count(),
            asset.channel_count(),
            asset.sample_rate
        );
        Ok(asset)
    }

    /// The asset's name, usually the file name it got loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample rate of the recorded sample data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels: 1 (mono) or 2 (stereo).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames, always > 0.
    pub fn frame_count(&self) -> usize {
        self.channels[0].len()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Sample data of the given channel index. Stereo assets have two channels, mono assets
    /// return their only channel for any index.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index.min(self.channels.len() - 1)]
    }

    pub fn root_note(&self) -> u8 {
        self.options.root_note
    }

    pub fn note_range(&self) -> &RangeInclusive<u8> {
        &self.options.note_range
    }

    pub fn midi_channels(&self) -> u16 {
        self.options.midi_channels
    }

    /// Minimum note attack time.
    pub fn attack(&self) -> Duration {
        self.options.attack
    }

    /// Minimum note release time.
    pub fn release(&self) -> Duration {
        self.options.release
    }

    pub fn max_duration(&self) -> Duration {
        self.options.max_duration
    }

    /// Returns true when the asset should play the given MIDI note.
    pub fn applies_to_note(&self, note: u8) -> bool {
        self.options.note_range.contains(&note)
    }

    /// Returns true when the asset should play notes on the given MIDI channel (1..=16).
    pub fn applies_to_channel(&self, channel: u8) -> bool {
        (1..=16).contains(&channel) && self.options.midi_channels & (1 << (channel - 1)) != 0
    }
}

// -------------------------------------------------------------------------------------------------
