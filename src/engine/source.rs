//! Immutable audio source
//!
//! The decoded input the player schedules. It is loaded once at startup and
//! shared read-only between the control thread and the render thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::{SampleFormat, WavSpec};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::read_wav;
use crate::error::{EngineError, Result};

/// Integer or floating point PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Int,
    Float,
}

/// Container format of a source, mirrored exactly by rendered artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_kind: SampleKind,
}

impl SourceFormat {
    /// 32-bit float PCM
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            sample_kind: SampleKind::Float,
        }
    }

    /// 16-bit integer PCM
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            sample_kind: SampleKind::Int,
        }
    }

    pub fn from_wav_spec(spec: WavSpec) -> Self {
        Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            sample_kind: match spec.sample_format {
                SampleFormat::Int => SampleKind::Int,
                SampleFormat::Float => SampleKind::Float,
            },
        }
    }

    pub fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: match self.sample_kind {
                SampleKind::Int => SampleFormat::Int,
                SampleKind::Float => SampleFormat::Float,
            },
        }
    }

    /// Reject formats the reader and the sink cannot round-trip
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(EngineError::UnsupportedFormat {
                format: "zero-channel audio".to_string(),
            });
        }
        if self.sample_rate == 0 {
            return Err(EngineError::UnsupportedFormat {
                format: "zero sample rate".to_string(),
            });
        }
        match (self.sample_kind, self.bits_per_sample) {
            (SampleKind::Int, 8 | 16 | 24 | 32) | (SampleKind::Float, 32) => Ok(()),
            (kind, bits) => Err(EngineError::UnsupportedFormat {
                format: format!("{}-bit {:?} PCM", bits, kind),
            }),
        }
    }

    /// Convert a frame count to seconds at this format's rate
    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

#[derive(Debug)]
struct SourceData {
    format: SourceFormat,
    frames: AudioBuffer,
    path: Option<PathBuf>,
}

/// Decoded, immutable input audio
///
/// Cloning is cheap; every clone shares the same decoded frames.
#[derive(Debug, Clone)]
pub struct AudioSource {
    inner: Arc<SourceData>,
}

impl AudioSource {
    /// Load a WAV file
    ///
    /// Any failure (missing file, unreadable header, unsupported sample
    /// format) is reported as [`EngineError::SourceUnavailable`] so startup
    /// can present it instead of crashing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |source: Option<Box<dyn std::error::Error + Send + Sync>>| {
            EngineError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        };

        if !path.exists() {
            return Err(unavailable(None));
        }

        let (format, frames) = read_wav(path).map_err(|e| unavailable(Some(Box::new(e))))?;
        log::debug!(
            "Loaded source {} ({} frames @ {} Hz, {} ch)",
            path.display(),
            frames.len(),
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            inner: Arc::new(SourceData {
                format,
                frames,
                path: Some(path.to_path_buf()),
            }),
        })
    }

    /// Wrap already-decoded frames
    pub fn from_buffer(frames: AudioBuffer, format: SourceFormat) -> Result<Self> {
        format.validate()?;
        if frames.channels() != format.channels as usize {
            return Err(EngineError::UnsupportedFormat {
                format: format!(
                    "buffer has {} channels but format declares {}",
                    frames.channels(),
                    format.channels
                ),
            });
        }
        if frames.sample_rate != format.sample_rate {
            return Err(EngineError::UnsupportedFormat {
                format: format!(
                    "buffer rate {} Hz does not match format rate {} Hz",
                    frames.sample_rate, format.sample_rate
                ),
            });
        }

        Ok(Self {
            inner: Arc::new(SourceData {
                format,
                frames,
                path: None,
            }),
        })
    }

    pub fn format(&self) -> SourceFormat {
        self.inner.format
    }

    /// Path the source was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Total length in sample frames
    pub fn length_frames(&self) -> u64 {
        self.inner.frames.len() as u64
    }

    pub fn duration_secs(&self) -> f64 {
        self.inner.format.frames_to_secs(self.length_frames())
    }

    /// The decoded frames
    pub fn frames(&self) -> &AudioBuffer {
        &self.inner.frames
    }

    /// Copy frames starting at `start` into the front of `out`
    ///
    /// Returns the number of frames copied, which is short of `out.len()`
    /// only when the source runs out. Frames past that point are left
    /// untouched.
    pub fn read_into(&self, start: u64, out: &mut AudioBuffer) -> usize {
        let total = self.inner.frames.len();
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(total);
        let count = (total - start).min(out.len());

        for (ch, dest) in out.samples.iter_mut().enumerate() {
            // Extra output channels repeat the last source channel
            let src_ch = ch.min(self.inner.frames.channels().saturating_sub(1));
            if let Some(src) = self.inner.frames.samples.get(src_ch) {
                dest[..count].copy_from_slice(&src[start..start + count]);
            }
        }

        count
    }
}
