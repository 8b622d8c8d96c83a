//! Offline rendering
//!
//! Pulls the whole source through an offline-configured [`AudioGraph`] in
//! budget-sized chunks and hands each chunk to a [`RenderSink`] before the
//! next one is requested. There is no cancellation: a render either
//! consumes the full source or aborts on the first failed chunk, in which
//! case the sink is discarded.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::AudioGraph;
use crate::engine::source::{AudioSource, SourceFormat};
use crate::error::{EngineError, Result};

/// Consecutive non-success pulls tolerated before a render gives up
pub const DEFAULT_MAX_STALLED_PULLS: u32 = 64;

/// Outcome of one manual render pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The chunk was rendered and may be written
    Success,
    /// Nothing upstream to render from yet
    InsufficientData,
    /// The graph is busy; try again
    CannotRenderNow,
    /// The chunk is unusable
    Error,
}

/// Destination for rendered chunks, written strictly in order
pub trait RenderSink {
    /// Format the sink writes; must match the rendered source
    fn format(&self) -> SourceFormat;

    fn write(&mut self, chunk: &AudioBuffer) -> Result<()>;

    fn frames_written(&self) -> u64;

    /// Close the sink and return where the output lives
    fn finish(self) -> Result<PathBuf>
    where
        Self: Sized;

    /// Throw away everything written so far
    fn discard(self)
    where
        Self: Sized;
}

/// A completed render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub frame_count: u64,
    pub created_at: DateTime<Utc>,
}

impl RenderedArtifact {
    pub fn duration_secs(&self) -> f64 {
        self.format.frames_to_secs(self.frame_count)
    }
}

/// Synchronous chunked renderer
#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    max_stalled_pulls: u32,
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STALLED_PULLS)
    }
}

impl OfflineRenderer {
    pub fn new(max_stalled_pulls: u32) -> Self {
        Self { max_stalled_pulls }
    }

    /// Render `source` through `graph` into `sink`
    ///
    /// The graph must already be configured for offline rendering. The
    /// player is stopped again before returning, whatever the outcome.
    pub fn render<S: RenderSink>(
        &self,
        source: &AudioSource,
        graph: &mut AudioGraph,
        mut sink: S,
    ) -> Result<RenderedArtifact> {
        let format = source.format();
        let sink_format = sink.format();
        if sink_format != format {
            sink.discard();
            return Err(EngineError::render(format!(
                "sink format {:?} does not match source format {:?}",
                sink_format, format
            )));
        }

        log::info!(
            "[RENDER] Rendering {} frames ({:.2}s) at {} cents",
            source.length_frames(),
            source.duration_secs(),
            graph.pitch()
        );

        let outcome = self.pull_all(source, graph, &mut sink);
        graph.stop_player();

        let frame_count = match outcome {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("[RENDER] Aborted: {}", e);
                sink.discard();
                return Err(e);
            }
        };

        let path = sink.finish().map_err(|e| EngineError::Render {
            reason: "could not finalize output".to_string(),
            source: Some(Box::new(e)),
        })?;

        log::info!("[RENDER] Wrote {} frames to {}", frame_count, path.display());
        Ok(RenderedArtifact {
            path,
            format,
            frame_count,
            created_at: Utc::now(),
        })
    }

    fn pull_all<S: RenderSink>(
        &self,
        source: &AudioSource,
        graph: &mut AudioGraph,
        sink: &mut S,
    ) -> Result<u64> {
        let budget = graph
            .max_frame_budget()
            .ok_or_else(|| EngineError::render("graph is not configured for offline rendering"))?;
        let total = source.length_frames();
        let format = source.format();

        graph.schedule_source(source.clone());
        graph.play_player();

        let mut chunk =
            AudioBuffer::with_capacity(budget as usize, format.channels as usize, format.sample_rate);
        let mut frames_rendered: u64 = 0;
        let mut stalled: u32 = 0;

        while frames_rendered < total {
            let frames = (total - frames_rendered).min(u64::from(budget)) as u32;

            let status = graph.render_offline(frames, &mut chunk).map_err(|e| EngineError::Render {
                reason: format!("pull failed at frame {}", frames_rendered),
                source: Some(Box::new(e)),
            })?;

            match status {
                RenderStatus::Success => {
                    stalled = 0;
                    sink.write(&chunk).map_err(|e| EngineError::Render {
                        reason: format!("could not write chunk at frame {}", frames_rendered),
                        source: Some(Box::new(e)),
                    })?;
                    frames_rendered += chunk.len() as u64;
                }
                RenderStatus::InsufficientData | RenderStatus::CannotRenderNow => {
                    stalled += 1;
                    if stalled > self.max_stalled_pulls {
                        return Err(EngineError::render(format!(
                            "graph stalled ({:?}) at frame {}",
                            status, frames_rendered
                        )));
                    }
                    log::debug!("[RENDER] {:?} at frame {}, retrying", status, frames_rendered);
                }
                RenderStatus::Error => {
                    return Err(EngineError::render(format!(
                        "chunk at frame {} failed to render",
                        frames_rendered
                    )));
                }
            }
        }

        Ok(frames_rendered)
    }
}
