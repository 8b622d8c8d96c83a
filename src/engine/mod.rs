//! Audio Engine Module
//!
//! Core audio engine including:
//! - Source loading and sample buffers
//! - The player -> pitch -> output graph and its output devices
//! - Transport state machine
//! - Offline rendering and WAV I/O

pub mod buffer;
#[cfg(feature = "cpal")]
pub mod cpal_output;
pub mod device;
pub mod graph;
pub mod io;
pub mod nodes;
pub mod offline;
pub mod source;
pub mod ticker;
pub mod transport;

pub use buffer::AudioBuffer;
#[cfg(feature = "cpal")]
pub use cpal_output::CpalDevice;
pub use device::{
    DeviceFactory, ManualDevice, ManualDeviceHandle, OutputDevice, RenderCallback,
    SimulatedDevice,
};
pub use graph::{AudioGraph, EngineEvent, GraphMode};
pub use io::{generate_test_tone, read_wav, write_wav, WavFileSink};
pub use nodes::{NodeId, NodeKind, ScheduleToken};
pub use offline::{OfflineRenderer, RenderSink, RenderStatus, RenderedArtifact};
pub use source::{AudioSource, SampleKind, SourceFormat};
pub use ticker::ProgressTicker;
pub use transport::{PlaybackMode, PlaybackStatus, TransportController};
