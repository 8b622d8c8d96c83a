//! DSP Effects
//!
//! The effect slot of the processing graph. Effects implement [`Effect`]
//! so the graph can prepare, reset and run them without knowing what they
//! are.

mod effect;
mod pitch;

pub use effect::Effect;
pub use pitch::{cents_to_ratio, PitchParameter, PitchShifter, CENTS_PER_OCTAVE};
