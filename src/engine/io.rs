//! Audio file I/O for Repitch
//!
//! Reads WAV sources into float buffers and writes rendered chunks back out
//! in the source's own container format. Integer PCM uses a symmetric
//! `2^(bits-1)` scale in both directions, so a sample that goes through the
//! graph unchanged is written back with its original value.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use hound::{WavReader, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::engine::offline::RenderSink;
use crate::engine::source::{SampleKind, SourceFormat};
use crate::error::{EngineError, Result};

/// Read a WAV file into its format descriptor and decoded frames
pub fn read_wav(path: &Path) -> Result<(SourceFormat, AudioBuffer)> {
    let reader = WavReader::open(path)?;
    let format = SourceFormat::from_wav_spec(reader.spec());
    format.validate()?;

    let interleaved = read_samples_as_f32(reader, &format)?;
    let buffer =
        AudioBuffer::from_interleaved(&interleaved, format.channels as usize, format.sample_rate)?;

    Ok((format, buffer))
}

/// Write a whole buffer to a WAV file in the given format
pub fn write_wav(path: &Path, buffer: &AudioBuffer, format: SourceFormat) -> Result<PathBuf> {
    let mut sink = WavFileSink::create(path, format)?;
    if let Err(e) = sink.write(buffer) {
        sink.discard();
        return Err(e);
    }
    sink.finish()
}

/// Generate a sine test tone on every channel
pub fn generate_test_tone(
    frequency: f32,
    duration_secs: f32,
    sample_rate: u32,
    channels: usize,
) -> AudioBuffer {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_frames, channels, sample_rate);
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;

    for channel in &mut buffer.samples {
        for (i, sample) in channel.iter_mut().enumerate() {
            *sample = 0.5 * (angular_freq * i as f32).sin();
        }
    }

    buffer
}

// ============================================================================
// WAV render sink
// ============================================================================

/// Render sink writing sequential chunks to a WAV file
///
/// The file is created up front. [`RenderSink::finish`] finalizes the
/// header; [`RenderSink::discard`] deletes whatever was written so far.
pub struct WavFileSink {
    path: PathBuf,
    format: SourceFormat,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl WavFileSink {
    /// Create (or truncate) the output file
    pub fn create(path: impl AsRef<Path>, format: SourceFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        format.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let writer = WavWriter::create(&path, format.wav_spec())?;
        Ok(Self {
            path,
            format,
            writer: Some(writer),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSink for WavFileSink {
    fn format(&self) -> SourceFormat {
        self.format
    }

    fn write(&mut self, chunk: &AudioBuffer) -> Result<()> {
        if chunk.channels() != self.format.channels as usize {
            return Err(EngineError::render(format!(
                "chunk has {} channels, sink expects {}",
                chunk.channels(),
                self.format.channels
            )));
        }

        let format = self.format;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EngineError::render("sink already closed"))?;

        for frame in 0..chunk.len() {
            for channel in &chunk.samples {
                write_sample(writer, &format, channel[frame])?;
            }
        }

        self.frames_written += chunk.len() as u64;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(self.path)
    }

    fn discard(mut self) {
        // Dropping the writer flushes the header; the file goes right after.
        drop(self.writer.take());
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!(
                "Could not remove partial render {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

// ============================================================================
// Internal helper functions
// ============================================================================

#[inline]
fn int_scale(bits: u16) -> f64 {
    (1_u64 << (bits - 1)) as f64
}

/// Float sample to signed integer PCM of the given width
#[inline]
fn quantize(sample: f32, bits: u16) -> i32 {
    let scale = int_scale(bits);
    (sample as f64 * scale).round().clamp(-scale, scale - 1.0) as i32
}

fn write_sample<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    format: &SourceFormat,
    sample: f32,
) -> Result<()> {
    match (format.sample_kind, format.bits_per_sample) {
        (SampleKind::Float, _) => writer.write_sample(sample)?,
        (SampleKind::Int, 8) => writer.write_sample(quantize(sample, 8) as i8)?,
        (SampleKind::Int, 16) => writer.write_sample(quantize(sample, 16) as i16)?,
        (SampleKind::Int, bits) => writer.write_sample(quantize(sample, bits))?,
    }
    Ok(())
}

/// Read samples from a WAV reader and convert to f32
fn read_samples_as_f32<R: Read>(
    mut reader: WavReader<R>,
    format: &SourceFormat,
) -> Result<Vec<f32>> {
    let samples = match format.sample_kind {
        SampleKind::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        SampleKind::Int => {
            let scale = int_scale(format.bits_per_sample) as f32;
            match format.bits_per_sample {
                8 => reader
                    .samples::<i8>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()?,
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()?,
                // 24-bit stored as i32 in hound
                _ => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()?,
            }
        }
    };

    Ok(samples)
}

// ============================================================================
// Tests
// ============================================================================
