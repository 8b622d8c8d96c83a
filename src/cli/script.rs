//! Scripted replays
//!
//! A script is a JSON array of steps, each one a UI command, a session
//! notification or a pause:
//!
//! ```json
//! [
//!   { "action": "set_slider", "value": 0.5 },
//!   { "action": "play" },
//!   { "action": "wait", "ms": 200 },
//!   { "action": "session", "event": { "type": "interruption", "kind": 1 } },
//!   { "action": "session", "event": { "type": "interruption", "kind": 0, "options": 1 } },
//!   { "action": "render" }
//! ]
//! ```

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::ControlHandle;
use crate::dsp::CENTS_PER_OCTAVE;
use crate::engine::transport::PlaybackStatus;
use crate::error::{EngineError, Result};
use crate::session::events::SessionEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    Play,
    Stop,
    /// The single play/stop button
    TogglePlay,
    Render,
    SetPitch { cents: f32 },
    /// Pitch slider position, one unit per octave
    SetSlider { value: f32 },
    Session { event: SessionEvent },
    Wait { ms: u64 },
    Status,
}

/// What happened at one step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action: ScriptStep,
    /// Error code and message when the step was refused or failed
    pub error: Option<String>,
    pub status: PlaybackStatus,
}

/// Run `steps` in order against a control loop
///
/// Failed steps are recorded and the script continues. Only losing the
/// control loop aborts the run.
pub fn run_script(handle: &ControlHandle, steps: &[ScriptStep]) -> Result<Vec<StepOutcome>> {
    let mut outcomes = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        log::debug!("[SCRIPT] Step {}: {:?}", index, step);
        let result = match step {
            ScriptStep::Play => handle.play(),
            ScriptStep::Stop => handle.stop(),
            ScriptStep::TogglePlay => handle.toggle_play(),
            ScriptStep::Render => handle.render().map(|_| ()),
            ScriptStep::SetPitch { cents } => handle.set_pitch(*cents),
            ScriptStep::SetSlider { value } => handle.set_pitch(value * CENTS_PER_OCTAVE),
            ScriptStep::Session { event } => handle.notify(event.clone()),
            ScriptStep::Wait { ms } => {
                thread::sleep(Duration::from_millis(*ms));
                Ok(())
            }
            ScriptStep::Status => Ok(()),
        };

        let error = match result {
            Ok(()) => None,
            Err(EngineError::Disconnected) => return Err(EngineError::Disconnected),
            Err(e) => Some(format!("{}: {}", e.error_code(), e)),
        };

        outcomes.push(StepOutcome {
            step: index,
            action: step.clone(),
            error,
            status: handle.status()?,
        });
    }

    Ok(outcomes)
}
