//! Repitch - Pitch-Shifting Playback and Offline Render Engine
//!
//! Repitch plays an audio file through a pitch-shift effect, live to an
//! output device or offline into a WAV file, and keeps playback consistent
//! while the audio session interrupts it, changes its route or resets.
//!
//! # Architecture
//!
//! - [`engine::AudioGraph`]: player -> pitch effect -> output, configured
//!   either for live output or for offline pulls
//! - [`engine::TransportController`]: the Idle / Live / Offline /
//!   Interrupted state machine that owns the graph
//! - [`engine::OfflineRenderer`]: chunked render loop into a sink
//! - [`session::RouteMonitor`]: session notifications to transport calls
//! - [`control::ControlLoop`]: the thread that owns the transport and
//!   serializes everything that reaches it

pub mod cli;
pub mod config;
pub mod control;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod session;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
