#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod asset;
mod engine;
mod error;
mod grain;
mod voice;

// public, flat re-exports
pub use error::Error;

pub use asset::{AssetOptions, SampleAsset};

pub use engine::{Engine, EngineHandle, EngineOptions, EngineStatusEvent};

pub use voice::{Voice, VoiceParameters, VoiceState};

// public mods
pub mod grains {
    //! Grain building blocks: read cursor, envelope and the pooled grain itself.

    pub use super::grain::{Grain, GrainEnvelope, GrainReader, GrainShape, GrainWindowMode};
}

pub mod parameter;
pub mod utils;
