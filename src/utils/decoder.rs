use std::{fs::File, io, path::Path};

use symphonia::core::{
    audio::{SampleBuffer, SignalSpec},
    codecs::{CodecParameters, Decoder, DecoderOptions},
    conv::ConvertibleSample,
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    units::TimeStamp,
};

use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// Decodes the default track of an audio file or file buffer with symphonia.
pub struct AudioDecoder {
    track_id: u32, // Internal track index.
    decoder: Box<dyn Decoder>,
    format: Box<dyn FormatReader>,
}

impl AudioDecoder {
    /// Create a new decoder from the given file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref()).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                Error::MediaFileNotFound
            } else {
                Error::IoError(err)
            }
        })?;
        let source_stream = MediaSourceStream::new(Box::new(file), Default::default());
        Self::from_source_stream(source_stream, path.as_ref().extension().and_then(|e| e.to_str()))
    }

    /// Create a new decoder from the given buffer. The buffer must be owned, as symphonia
    /// does not allow reading non static buffer refs.
    pub fn from_buffer(buffer: Vec<u8>) -> Result<Self, Error> {
        let cursor = Box::new(io::Cursor::new(buffer));
        let source_stream = MediaSourceStream::new(cursor, Default::default());
        Self::from_source_stream(source_stream, None)
    }

    fn from_source_stream(
        source_stream: MediaSourceStream,
        extension: Option<&str>,
    ) -> Result<Self, Error> {
        // Help the format registry guess what format reader is appropriate.
        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        // Use the default options when reading and decoding.
        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();
        let decoder_opts: DecoderOptions = Default::default();

        // Probe the media source stream for a format.
        let probed = symphonia::default::get_probe()
            .format(&hint, source_stream, &format_opts, &metadata_opts)
            .map_err(|_| Error::MediaFileProbeError)?;

        let format = probed.format;

        let track = format.default_track().ok_or(Error::MediaFileNotFound)?;
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|err| Error::AudioDecodingError(Box::new(err)))?;

        Ok(Self {
            track_id,
            decoder,
            format,
        })
    }

    pub fn codec_params(&self) -> &CodecParameters {
        self.decoder.codec_params()
    }

    /// Sample rate and channel layout of the decoded track. Fails when the container does
    /// not specify them.
    pub fn signal_spec(&self) -> Result<SignalSpec, Error> {
        let params = self.codec_params();
        match (params.sample_rate, params.channels) {
            (Some(rate), Some(channels)) => Ok(SignalSpec { rate, channels }),
            _ => Err(Error::MediaFileProbeError),
        }
    }

    /// Number of frames in the track, when the container tells us.
    pub fn frame_count(&self) -> Option<u64> {
        self.codec_params().n_frames
    }

    /// Read a next packet of audio from this decoder.  Returns `None` in case
    /// of EOF or internal error.
    pub fn read_packet<S>(&mut self, samples: &mut SampleBuffer<S>) -> Option<TimeStamp>
    where
        S: ConvertibleSample,
    {
        loop {
            // Demux an encoded packet from the media format.
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(io)) if io.kind() == io::ErrorKind::UnexpectedEof => {
                    return None; // End of this stream.
                }
                Err(err) => {
                    log::error!("format error: {err}");
                    return None; // We cannot recover from format errors, quit.
                }
            };
            // Consume any new metadata that has been read since the last packet.
            while !self.format.metadata().is_latest() {
                self.format.metadata().pop();
            }
            // If the packet does not belong to the selected track, skip over it.
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    samples.copy_interleaved_ref(decoded);
                    return Some(packet.ts());
                }
                Err(SymphoniaError::IoError(err)) => {
                    // The packet failed to decode due to an IO error, skip the packet.
                    log::warn!("io decode error: {err}");
                    continue;
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    // The packet failed to decode due to invalid data, skip the packet.
                    log::warn!("decode error: {err}");
                    continue;
                }
                Err(err) => {
                    log::error!("fatal decode error: {err}");
                    return None;
                }
            };
        }
    }
}
