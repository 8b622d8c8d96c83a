//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use log::info;
use serde_json::json;

use crate::cli::script::{run_script, ScriptStep};
use crate::cli::DeviceKind;
use crate::config::EngineConfig;
use crate::control::ControlLoop;
use crate::engine::buffer::{calculate_peak, calculate_rms};
use crate::engine::device::{DeviceFactory, ManualDeviceHandle, OutputDevice, SimulatedDevice};
use crate::engine::io::{generate_test_tone, read_wav, write_wav};
use crate::engine::source::{AudioSource, SourceFormat};
use crate::engine::transport::{PlaybackMode, TransportController};

/// Print a source's format and levels.
pub fn info(input: &Path) -> anyhow::Result<()> {
    let source = open_source(input)?;

    let report = json!({
        "path": input,
        "format": source.format(),
        "frames": source.length_frames(),
        "duration_seconds": source.duration_secs(),
        "peak_db": finite_or_null(calculate_peak(source.frames())),
        "rms_db": finite_or_null(calculate_rms(source.frames())),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Render a source offline and print the artifact.
pub fn render(
    input: &Path,
    pitch: f32,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(output) = output {
        let name = output
            .file_name()
            .ok_or_else(|| anyhow!("output path has no file name: {}", output.display()))?;
        config.output_file_name = name.to_string_lossy().into_owned();
        config.output_dir = Some(
            output
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        );
    }

    let source = open_source(input)?;
    // Nothing pulls this device; rendering never goes live.
    let devices = ManualDeviceHandle::new();
    let mut transport = TransportController::new(source, devices.factory(), config)?;
    transport.set_pitch(pitch);

    let artifact = transport.request_render().context("render failed")?;

    let (_, rendered) = read_wav(&artifact.path)?;
    let report = json!({
        "artifact": artifact,
        "duration_seconds": artifact.duration_secs(),
        "peak_db": finite_or_null(calculate_peak(&rendered)),
        "rms_db": finite_or_null(calculate_rms(&rendered)),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Play a source live and log progress until it ends.
pub fn play(
    input: &Path,
    pitch: f32,
    device: DeviceKind,
    speed: Option<f64>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(speed) = speed {
        config.device_speed = speed;
        config.validate()?;
    }

    let source = open_source(input)?;
    let duration = source.duration_secs();
    let mut transport = TransportController::new(source, device_factory(device, &config)?, config)?;
    transport.set_pitch(pitch);

    let (_session_tx, session_rx) = crossbeam_channel::unbounded();
    let (handle, join) = ControlLoop::spawn(transport, session_rx)?;

    handle.play().context("could not start playback")?;
    let updates = handle.subscribe()?;
    info!("Playing {:.2}s at {} cents", duration, pitch);

    let mut last_logged = f64::NEG_INFINITY;
    for status in updates.iter() {
        if status.mode != PlaybackMode::Live {
            break;
        }
        if status.current_time_seconds - last_logged >= 0.5 {
            info!(
                "{:6.2}s / {:.2}s ({:3.0}%)",
                status.current_time_seconds,
                status.duration_seconds,
                status.progress_fraction * 100.0
            );
            last_logged = status.current_time_seconds;
        }
    }

    handle.shutdown()?;
    join.join()
        .map_err(|_| anyhow!("control thread panicked"))?;
    println!("Playback finished");

    Ok(())
}

/// Replay a script against a live control loop, printing each step's status.
pub fn script(
    input: &Path,
    script_path: &Path,
    device: DeviceKind,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let content = fs::read_to_string(script_path)
        .with_context(|| format!("could not read script {}", script_path.display()))?;
    let steps: Vec<ScriptStep> = serde_json::from_str(&content)
        .with_context(|| format!("invalid script {}", script_path.display()))?;

    let config = load_config(config_path)?;
    let source = open_source(input)?;
    let transport = TransportController::new(source, device_factory(device, &config)?, config)?;

    let (_session_tx, session_rx) = crossbeam_channel::unbounded();
    let (handle, join) = ControlLoop::spawn(transport, session_rx)?;

    let outcomes = run_script(&handle, &steps)?;
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }

    handle.shutdown()?;
    join.join()
        .map_err(|_| anyhow!("control thread panicked"))?;

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!("{} steps, {} refused or failed", outcomes.len(), failed);
    Ok(())
}

/// Write a sine test tone.
pub fn tone(
    output: &Path,
    frequency: f32,
    duration: f32,
    sample_rate: u32,
    channels: u16,
    float: bool,
) -> anyhow::Result<()> {
    if duration.is_nan() || duration < 0.0 {
        bail!("duration must not be negative");
    }
    let format = if float {
        SourceFormat::float32(sample_rate, channels)
    } else {
        SourceFormat::pcm16(sample_rate, channels)
    };
    format.validate()?;

    let buffer = generate_test_tone(frequency, duration, sample_rate, channels as usize);
    let path = write_wav(output, &buffer, format)?;
    println!("Wrote {} frames to {}", buffer.len(), path.display());

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn open_source(input: &Path) -> anyhow::Result<AudioSource> {
    AudioSource::open(input).with_context(|| format!("could not load {}", input.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("could not load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn device_factory(
    kind: DeviceKind,
    config: &EngineConfig,
) -> anyhow::Result<impl DeviceFactory + 'static> {
    if kind == DeviceKind::Cpal && !cfg!(feature = "cpal") {
        bail!("this build has no cpal support; rebuild with --features cpal");
    }

    let period = config.device_period_frames as usize;
    let speed = config.device_speed;
    Ok(move || -> Box<dyn OutputDevice> {
        match kind {
            #[cfg(feature = "cpal")]
            DeviceKind::Cpal => Box::new(crate::engine::cpal_output::CpalDevice::new()),
            _ => Box::new(SimulatedDevice::new(period, speed)),
        }
    })
}

/// JSON has no infinities; silent audio reports null levels
fn finite_or_null(db: f32) -> serde_json::Value {
    if db.is_finite() {
        json!(db)
    } else {
        serde_json::Value::Null
    }
}
