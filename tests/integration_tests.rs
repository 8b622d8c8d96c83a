//! Integration Tests
//!
//! End-to-end tests for the Repitch load -> graph -> render pipeline.

use std::path::Path;

use approx::assert_relative_eq;
use hound::WavReader;
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

use repitch::engine::{
    generate_test_tone, read_wav, write_wav, AudioBuffer, AudioSource, GraphMode,
    ManualDeviceHandle, PlaybackMode, SourceFormat, TransportController,
};
use repitch::EngineConfig;

/// Helper to write a source file and build a transport rendering next to it
fn setup(
    buffer: &AudioBuffer,
    format: SourceFormat,
) -> (TransportController, ManualDeviceHandle, TempDir) {
    let dir = tempdir().unwrap();
    let input = dir.path().join("testAudio.wav");
    write_wav(&input, buffer, format).unwrap();

    let source = AudioSource::open(&input).unwrap();
    let devices = ManualDeviceHandle::new();
    let config = EngineConfig {
        output_dir: Some(dir.path().join("out")),
        ..Default::default()
    };
    let transport = TransportController::new(source, devices.factory(), config).unwrap();
    (transport, devices, dir)
}

fn wav_frames(path: &Path) -> u32 {
    WavReader::open(path).unwrap().duration()
}

// === Offline Render Tests ===

#[test]
fn test_one_second_render_has_exact_length() {
    let tone = generate_test_tone(440.0, 1.0, 44100, 2);
    let (mut transport, _devices, _dir) = setup(&tone, SourceFormat::pcm16(44100, 2));

    let artifact = transport.request_render().unwrap();

    assert_eq!(artifact.frame_count, 44100);
    assert_relative_eq!(artifact.duration_secs(), 1.0);
    assert_eq!(wav_frames(&artifact.path), 44100);
    assert_eq!(transport.mode(), PlaybackMode::Idle);
    assert_eq!(transport.graph().mode(), GraphMode::Live);
}

#[test]
fn test_zero_cents_render_is_bit_exact() {
    let tone = generate_test_tone(1000.0, 0.5, 22050, 1);
    let (mut transport, _devices, dir) = setup(&tone, SourceFormat::pcm16(22050, 1));

    let artifact = transport.request_render().unwrap();

    let mut input = WavReader::open(dir.path().join("testAudio.wav")).unwrap();
    let mut output = WavReader::open(&artifact.path).unwrap();
    assert_eq!(input.spec(), output.spec());

    let input: Vec<i16> = input.samples::<i16>().map(|s| s.unwrap()).collect();
    let output: Vec<i16> = output.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(input, output);
}

#[test]
fn test_zero_length_source_renders_empty_file() {
    let empty = AudioBuffer::new(0, 2, 44100);
    let (mut transport, _devices, _dir) = setup(&empty, SourceFormat::float32(44100, 2));

    let artifact = transport.request_render().unwrap();

    assert_eq!(artifact.frame_count, 0);
    assert!(artifact.path.exists());
    assert_eq!(wav_frames(&artifact.path), 0);
}

#[test]
fn test_render_length_not_multiple_of_budget() {
    let tone = generate_test_tone(440.0, 0.25, 48000, 2);
    let (mut transport, _devices, _dir) = setup(&tone, SourceFormat::float32(48000, 2));

    let artifact = transport.request_render().unwrap();
    assert_eq!(artifact.frame_count, 12000);
    assert_eq!(wav_frames(&artifact.path), 12000);
}

#[test]
fn test_pitched_render_keeps_duration_and_format() {
    let tone = generate_test_tone(441.0, 1.0, 44100, 2);
    let format = SourceFormat::pcm16(44100, 2);
    let (mut transport, _devices, _dir) = setup(&tone, format);
    transport.set_pitch(600.0);

    let artifact = transport.request_render().unwrap();
    let (rendered_format, rendered) = read_wav(&artifact.path).unwrap();

    assert_eq!(rendered_format, format);
    assert_eq!(rendered.len(), tone.len());
    assert!(rendered.is_finite());
    assert_ne!(rendered, tone);

    // Shifted sine stays near the dry level once the windows settle
    let peak = rendered.channel(0)[22050..]
        .iter()
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(peak > 0.2 && peak <= 0.51, "peak was {}", peak);
}

#[test]
fn test_render_after_playback_restores_live_graph() {
    let tone = generate_test_tone(440.0, 1.0, 44100, 1);
    let (mut transport, devices, _dir) = setup(&tone, SourceFormat::float32(44100, 1));

    transport.request_play().unwrap();
    devices.pull(512).unwrap();

    let artifact = transport.request_render().unwrap();
    assert_eq!(artifact.frame_count, 44100);
    assert_eq!(transport.mode(), PlaybackMode::Idle);
    assert!(!transport.status().is_playing);
    assert_eq!(transport.graph().mode(), GraphMode::Live);
    assert!(devices.is_running());

    // And live playback still works afterwards
    transport.request_play().unwrap();
    assert!(devices.pull(512).is_some());
    assert_eq!(transport.graph().player_sample_time(), 512);
}

#[test]
fn test_failed_render_discards_output() {
    let mut tone = generate_test_tone(440.0, 0.5, 8000, 1);
    tone.channel_mut(0)[3000] = f32::NAN;
    let dir = tempdir().unwrap();
    let source = AudioSource::from_buffer(tone, SourceFormat::float32(8000, 1)).unwrap();
    let config = EngineConfig {
        output_dir: Some(dir.path().to_path_buf()),
        max_frame_budget: 1024,
        ..Default::default()
    };
    let mut transport =
        TransportController::new(source, ManualDeviceHandle::new().factory(), config).unwrap();

    let err = transport.request_render().unwrap_err();
    assert_eq!(err.error_code(), "RENDER");
    assert!(!dir.path().join("audioProcessed.wav").exists());
    assert_eq!(transport.mode(), PlaybackMode::Idle);
    assert!(transport.status().rendered_artifact_path.is_none());
}

// === Source Loading Tests ===

#[test]
fn test_missing_source_is_an_error_not_a_crash() {
    let err = AudioSource::open("/definitely/not/here/testAudio.wav").unwrap_err();
    assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    assert!(!err.is_recoverable());
}

#[test]
fn test_garbage_source_is_unavailable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("noise.wav");
    std::fs::write(&path, b"definitely not RIFF").unwrap();
    assert_eq!(
        AudioSource::open(&path).unwrap_err().error_code(),
        "SOURCE_UNAVAILABLE"
    );
}
