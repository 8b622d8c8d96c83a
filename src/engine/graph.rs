//! Audio processing graph
//!
//! Three logical nodes, player -> pitch effect -> output, run in one of two
//! mutually exclusive configurations:
//!
//! - **Live**: an [`OutputDevice`] pulls periods on its own thread.
//! - **Offline**: the caller pulls bounded chunks with
//!   [`AudioGraph::render_offline`] as fast as it likes.
//!
//! Switching always stops and detaches the previous configuration before
//! the next one is attached, so the running device never sees a topology
//! change. The player and the effect live behind one mutex; the device
//! thread only ever `try_lock`s it and renders silence if the control
//! thread is holding it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::dsp::{Effect, PitchParameter, PitchShifter};
use crate::engine::buffer::AudioBuffer;
use crate::engine::device::{OutputDevice, RenderCallback};
use crate::engine::nodes::{EffectNode, NodeId, NodeKind, OutputNode, PlayerNode, ScheduleToken};
use crate::engine::offline::RenderStatus;
use crate::engine::source::{AudioSource, SourceFormat};
use crate::error::{EngineError, Result};

/// Block size the effect is prepared for in live mode
const LIVE_BLOCK_HINT: usize = 1024;

/// Notification sent from the render thread to the control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The player reached the end of the schedule identified by `token`
    PlaybackCompleted { token: ScheduleToken },
}

/// Current graph configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// Nodes exist but nothing is connected
    Detached,
    /// Connected to a running output device
    Live,
    /// Connected for manual pulls of at most `max_frames` frames
    Offline { max_frames: u32 },
}

impl fmt::Display for GraphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphMode::Detached => write!(f, "Detached"),
            GraphMode::Live => write!(f, "Live"),
            GraphMode::Offline { max_frames } => write!(f, "Offline ({} frames)", max_frames),
        }
    }
}

/// The part of the graph the render thread touches
struct SignalChain {
    player: PlayerNode,
    effect: EffectNode,
}

impl SignalChain {
    fn render(&mut self, out: &mut AudioBuffer) -> Option<ScheduleToken> {
        let finished = self.player.render(out);
        self.effect.effect_mut().process(out);
        finished
    }
}

/// Player, pitch effect and output, plus the device driving them live
pub struct AudioGraph {
    format: SourceFormat,
    player_id: NodeId,
    effect_id: NodeId,
    output: OutputNode,
    chain: Arc<Mutex<SignalChain>>,
    player_clock: Arc<AtomicU64>,
    pitch: Arc<PitchParameter>,
    connections: Vec<(NodeId, NodeId)>,
    mode: GraphMode,
    device: Box<dyn OutputDevice>,
    events: Sender<EngineEvent>,
    offline_sample_time: u64,
}

impl AudioGraph {
    /// Build a detached graph for `format` with fresh node identities
    ///
    /// Completion events from live playback are sent on `events`.
    pub fn new(
        format: SourceFormat,
        device: Box<dyn OutputDevice>,
        events: Sender<EngineEvent>,
        pitch_cents: f32,
    ) -> Self {
        let pitch = Arc::new(PitchParameter::new(pitch_cents));
        let player = PlayerNode::new();
        let effect = EffectNode::new(Box::new(PitchShifter::new(Arc::clone(&pitch))));

        Self {
            format,
            player_id: player.id(),
            effect_id: effect.id(),
            output: OutputNode::new(),
            player_clock: player.clock(),
            chain: Arc::new(Mutex::new(SignalChain { player, effect })),
            pitch,
            connections: Vec::new(),
            mode: GraphMode::Detached,
            device,
            events,
            offline_sample_time: 0,
        }
    }

    // ========================================================================
    // Topology
    // ========================================================================

    /// Connect for real-time output and start the device
    ///
    /// Idempotent while already live. An offline configuration is torn down
    /// first. If the device refuses to start the graph is left detached and
    /// the device's [`EngineError::EngineStart`] is returned.
    pub fn configure_for_live(&mut self) -> Result<()> {
        if self.mode == GraphMode::Live && self.device.is_running() {
            log::debug!("[GRAPH] Already live");
            return Ok(());
        }

        self.detach();
        self.attach();
        self.prepare_effect(LIVE_BLOCK_HINT);

        let chain = Arc::clone(&self.chain);
        let events = self.events.clone();
        let callback: RenderCallback = Box::new(move |out: &mut AudioBuffer| {
            let finished = match chain.try_lock() {
                Some(mut chain) => chain.render(out),
                None => {
                    out.silence();
                    None
                }
            };
            if let Some(token) = finished {
                // The receiver is gone only when the transport is shutting down
                let _ = events.send(EngineEvent::PlaybackCompleted { token });
            }
        });

        match self.device.start(&self.format, callback) {
            Ok(()) => {
                self.mode = GraphMode::Live;
                log::debug!("[GRAPH] Live on {} device", self.device.name());
                Ok(())
            }
            Err(e) => {
                self.detach();
                log::warn!("[GRAPH] Device {} failed to start: {}", self.device.name(), e);
                Err(e)
            }
        }
    }

    /// Connect for manual rendering in chunks of at most `max_frames`
    ///
    /// Refused with [`EngineError::EngineConfig`] while live playback is in
    /// progress or when `max_frames` is zero. Otherwise any live
    /// configuration is stopped and detached first.
    pub fn configure_for_offline(&mut self, max_frames: u32) -> Result<()> {
        if max_frames == 0 {
            return Err(EngineError::engine_config("frame budget must be non-zero"));
        }
        if self.mode == GraphMode::Live && self.chain.lock().player.is_playing() {
            return Err(EngineError::engine_config(
                "live playback in progress; stop it before rendering offline",
            ));
        }

        self.detach();
        self.attach();
        self.prepare_effect(max_frames as usize);
        self.offline_sample_time = 0;
        self.mode = GraphMode::Offline { max_frames };

        log::debug!("[GRAPH] Offline, {} frames per pull", max_frames);
        Ok(())
    }

    /// Stop the device and disconnect every node; idempotent
    pub fn teardown(&mut self) {
        if self.mode != GraphMode::Detached {
            log::debug!("[GRAPH] Teardown from {}", self.mode);
        }
        self.detach();
        self.chain.lock().player.stop();
    }

    fn attach(&mut self) {
        self.connections = vec![
            (self.player_id, self.effect_id),
            (self.effect_id, self.output.id()),
        ];
    }

    fn detach(&mut self) {
        self.device.stop();
        self.connections.clear();
        self.mode = GraphMode::Detached;
    }

    fn prepare_effect(&mut self, max_block_size: usize) {
        let mut chain = self.chain.lock();
        let effect = chain.effect.effect_mut();
        effect.prepare(
            self.format.sample_rate,
            self.format.channels as usize,
            max_block_size,
        );
        effect.reset();
    }

    // ========================================================================
    // Offline Rendering
    // ========================================================================

    /// Render the next `frames` frames into `out`
    ///
    /// `out` is resized to `frames`. Errors are configuration misuse; a
    /// chunk that renders but is unusable comes back as a status.
    pub fn render_offline(&mut self, frames: u32, out: &mut AudioBuffer) -> Result<RenderStatus> {
        let max_frames = match self.mode {
            GraphMode::Offline { max_frames } => max_frames,
            mode => {
                return Err(EngineError::engine_config(format!(
                    "manual render requested while {}",
                    mode
                )))
            }
        };
        if frames > max_frames {
            return Err(EngineError::engine_config(format!(
                "requested {} frames, budget is {}",
                frames, max_frames
            )));
        }
        if out.channels() != self.format.channels as usize {
            return Err(EngineError::engine_config(format!(
                "render buffer has {} channels, graph has {}",
                out.channels(),
                self.format.channels
            )));
        }

        let Some(mut chain) = self.chain.try_lock() else {
            return Ok(RenderStatus::CannotRenderNow);
        };
        if !chain.player.is_playing() {
            return Ok(RenderStatus::InsufficientData);
        }

        out.set_len(frames as usize);
        chain.render(out);
        drop(chain);

        if !out.is_finite() {
            return Ok(RenderStatus::Error);
        }
        self.offline_sample_time += u64::from(frames);
        Ok(RenderStatus::Success)
    }

    /// Frames rendered since the graph entered offline mode
    pub fn manual_rendering_sample_time(&self) -> u64 {
        self.offline_sample_time
    }

    /// Per-pull frame budget, when offline
    pub fn max_frame_budget(&self) -> Option<u32> {
        match self.mode {
            GraphMode::Offline { max_frames } => Some(max_frames),
            _ => None,
        }
    }

    // ========================================================================
    // Player
    // ========================================================================

    /// Schedule the source on the player from its first frame
    pub fn schedule_source(&mut self, source: AudioSource) -> ScheduleToken {
        self.chain.lock().player.schedule(source)
    }

    pub fn play_player(&mut self) {
        self.chain.lock().player.play();
    }

    pub fn stop_player(&mut self) {
        self.chain.lock().player.stop();
    }

    pub fn player_is_playing(&self) -> bool {
        self.chain.lock().player.is_playing()
    }

    /// Frames played of the current schedule, readable without locking
    pub fn player_sample_time(&self) -> u64 {
        self.player_clock.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Parameters / Introspection
    // ========================================================================

    /// Set the pitch in cents; picked up on the next processed block
    pub fn set_pitch(&self, cents: f32) {
        self.pitch.set(cents);
    }

    pub fn pitch(&self) -> f32 {
        self.pitch.get()
    }

    /// Current parameters of the effect node
    pub fn effect_params(&self) -> serde_json::Value {
        self.chain.lock().effect.effect().get_params()
    }

    pub fn node_ids(&self) -> [(NodeKind, NodeId); 3] {
        [
            (NodeKind::Player, self.player_id),
            (NodeKind::Effect, self.effect_id),
            (NodeKind::Output, self.output.id()),
        ]
    }

    /// Current edges; empty when detached
    pub fn connections(&self) -> &[(NodeId, NodeId)] {
        &self.connections
    }

    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Whether the output device is running
    pub fn is_running(&self) -> bool {
        self.device.is_running()
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraph")
            .field("format", &self.format)
            .field("mode", &self.mode)
            .field("connections", &self.connections)
            .field("device", &self.device.name())
            .finish()
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}
