use std::{error, fmt, io, time::Duration};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by multigrain.
///
/// Errors are only ever reported from the non real-time side: loading assets, configuring
/// the engine, or sending events via an [`EngineHandle`](crate::EngineHandle). Rendering
/// itself never fails.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    MediaFileNotFound,
    MediaFileProbeError,
    AudioDecodingError(Box<dyn error::Error + Send + Sync>),
    EmptyAsset,
    /// Actual and maximum allowed duration of the rejected asset.
    AssetTooLong(Duration, Duration),
    UnsupportedChannelLayout(usize),
    ParameterError(String),
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MediaFileNotFound => write!(f, "Audio file not found"),
            Self::MediaFileProbeError => write!(f, "Audio file failed to probe"),
            Self::AudioDecodingError(err) => err.fmt(f),
            Self::EmptyAsset => write!(f, "Sample asset contains no audio frames"),
            Self::AssetTooLong(duration, max_duration) => write!(
                f,
                "Sample asset is too long: {:.2}s (max. {:.2}s)",
                duration.as_secs_f64(),
                max_duration.as_secs_f64()
            ),
            Self::UnsupportedChannelLayout(channel_count) => {
                write!(f, "Unsupported sample channel layout: {channel_count} channels")
            }
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send engine message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

// -------------------------------------------------------------------------------------------------
