//! Renders a short granular chord offline into a wav file.
//!
//! Uses the given sample file or a synthesized tone when no input file is specified.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use arg::{parse_args, Args};
use crossbeam_channel::bounded;

use multigrain::{AssetOptions, Engine, EngineOptions, EngineStatusEvent, Error, SampleAsset};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const SAMPLE_RATE: u32 = 44100;
const BLOCK_SIZE: usize = 512;

// -------------------------------------------------------------------------------------------------

/// Program arguments.
#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "i", long = "input")]
    /// Sample file to play. By default a synthesized tone is played.
    input_path: Option<PathBuf>,
    #[arg(short = "o", long = "output")]
    /// Wav file to write. By default \"render-grains.wav\".
    output_path: Option<PathBuf>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    log_level: Option<log::Level>,
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse args and init logger
    let args = parse_args::<Arguments>();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        // disable logging in chatty modules
        .with_module_level("symphonia_core", log::LevelFilter::Warn)
        .with_module_level("symphonia_format", log::LevelFilter::Warn)
        .init()
        .expect("Failed to set logger");

    // Load or create the sample
    let asset = Arc::new(match &args.input_path {
        Some(path) => SampleAsset::from_file(path, AssetOptions::default())?,
        None => synthesized_tone()?,
    });

    // Create the engine and a channel for voice status events
    let mut engine = Engine::new(
        EngineOptions::default().voices(4),
        asset,
        SAMPLE_RATE,
        BLOCK_SIZE,
    )?;
    let (status_sender, status_receiver) = bounded(64);
    engine.set_status_sender(Some(status_sender));

    // Configure a slowly evolving, slightly detuned grain cloud
    let handle = engine.handle();
    handle.set_parameter(Engine::GRAIN_RATE.id(), 30.0)?;
    handle.set_parameter(Engine::GRAIN_DURATION.id(), 120.0)?;
    handle.set_parameter(Engine::GRAIN_COUNT.id(), 8.0)?;
    handle.set_parameter(Engine::POSITION.id(), 0.3)?;
    handle.set_parameter(Engine::POSITION_SPREAD.id(), 0.1)?;
    handle.set_parameter(Engine::PITCH_SPREAD.id(), 0.2)?;
    handle.set_parameter(Engine::AMP_ATTACK.id(), 300.0)?;
    handle.set_parameter(Engine::AMP_RELEASE.id(), 1200.0)?;
    handle.set_parameter(Engine::VOLUME.id(), 0.5)?;

    // Play a chord, then release it
    let mut output = Vec::new();
    for note in [60, 64, 67] {
        handle.note_on(1, note, 0.8)?;
    }
    render(&mut engine, 3.0, &mut output);
    handle.all_notes_off(true)?;
    render(&mut engine, 2.0, &mut output);

    for event in status_receiver.try_iter() {
        match event {
            EngineStatusEvent::VoiceStarted { note, channel } => {
                log::info!("Voice started: note {note} on channel {channel}");
            }
            EngineStatusEvent::VoiceStopped { note, channel } => {
                log::info!("Voice stopped: note {note} on channel {channel}");
            }
        }
    }
    log::info!(
        "Rendered {} grains, {} voices still active",
        engine.grain_onset_count(),
        engine.active_voice_count()
    );

    // Write the result
    let output_path = args
        .output_path
        .unwrap_or_else(|| PathBuf::from("render-grains.wav"));
    write_wav(&output_path, engine.channel_count(), &output)?;
    println!("Wrote {}", output_path.display());
    Ok(())
}

// -------------------------------------------------------------------------------------------------

/// Render the given number of seconds in blocks and append them to the output.
fn render(engine: &mut Engine, seconds: f32, output: &mut Vec<f32>) {
    let channel_count = engine.channel_count();
    let mut block = vec![0.0; BLOCK_SIZE * channel_count];
    let block_count = (seconds * SAMPLE_RATE as f32 / BLOCK_SIZE as f32).ceil() as usize;
    for _ in 0..block_count {
        block.fill(0.0);
        engine.render_next_block(&mut block);
        output.extend_from_slice(&block);
    }
}

/// Create a two second long, harmonically rich tone at middle C.
fn synthesized_tone() -> Result<SampleAsset, Error> {
    let frequency = 261.63;
    let samples = (0..SAMPLE_RATE as usize * 2)
        .map(|frame| {
            let phase = frame as f32 * frequency / SAMPLE_RATE as f32;
            (1..=6)
                .map(|harmonic| {
                    let harmonic = harmonic as f32;
                    (phase * harmonic * std::f32::consts::TAU).sin() / harmonic
                })
                .sum::<f32>()
                * 0.5
        })
        .collect();
    SampleAsset::new("tone", vec![samples], SAMPLE_RATE, AssetOptions::default())
}

fn write_wav(path: &Path, channel_count: usize, samples: &[f32]) -> Result<(), Error> {
    let spec = hound::WavSpec {
        channels: channel_count as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(io::Error::other)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(io::Error::other)?;
    }
    writer.finalize().map_err(io::Error::other)?;
    Ok(())
}
