//! Effect trait definition
//!
//! The contract the graph's effect node drives on the render thread.

use serde_json::Value;

use crate::engine::AudioBuffer;
use crate::error::Result;

/// An in-place audio processor living in the effect slot of the graph
///
/// `process` runs on the render thread (live) or the control thread
/// (offline) and must not block or allocate once `prepare` has run.
pub trait Effect: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare the effect for processing
    ///
    /// Called when the graph is (re)attached with a new sample rate,
    /// channel count or block size.
    fn prepare(&mut self, sample_rate: u32, channels: usize, max_block_size: usize);

    /// Clear any internal buffers/state (delay lines, phases)
    fn reset(&mut self);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get all parameters as JSON (for status reports)
    fn get_params(&self) -> Value;

    /// Set a single parameter by name
    fn set_param(&mut self, name: &str, value: &Value) -> Result<()>;
}
