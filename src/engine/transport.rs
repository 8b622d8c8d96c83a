//! Transport State Machine for Repitch
//!
//! Owns the playback mode and the audio graph, and mediates every play,
//! stop, render and session request against the graph's lifecycle.
//!
//! ```text
//! Idle --play--> Live --stop / end of source--> Idle
//! Live --interruption began--> Interrupted --ended(resume)--> Live
//!                              Interrupted --ended(no resume) / stop--> Idle
//! Idle / Live --render--> Offline --> Idle (graph live-configured again)
//! any --service reset--> Idle (graph rebuilt)
//! ```
//!
//! The render thread never calls in here. It reports end-of-source as an
//! [`EngineEvent`] on a channel that the control thread drains with
//! [`TransportController::process_events`].

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::engine::device::DeviceFactory;
use crate::engine::graph::{AudioGraph, EngineEvent};
use crate::engine::io::WavFileSink;
use crate::engine::nodes::ScheduleToken;
use crate::engine::offline::{OfflineRenderer, RenderedArtifact};
use crate::engine::source::AudioSource;
use crate::engine::ticker::ProgressTicker;
use crate::error::{EngineError, Result};

/// Playback modes; exactly one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Nothing playing (default state)
    #[default]
    Idle,
    /// Source playing through the output device
    Live,
    /// Offline render in progress
    Offline,
    /// Playback suspended by the session
    Interrupted,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Idle => write!(f, "Idle"),
            PlaybackMode::Live => write!(f, "Live"),
            PlaybackMode::Offline => write!(f, "Offline"),
            PlaybackMode::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// State published to the UI collaborator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub mode: PlaybackMode,
    pub is_playing: bool,
    /// Position over duration, in `[0, 1]`
    pub progress_fraction: f64,
    pub current_time_seconds: f64,
    pub duration_seconds: f64,
    pub is_headphones_connected: bool,
    pub rendered_artifact_path: Option<PathBuf>,
}

/// Manages playback mode, the audio graph and published status
///
/// All methods run on the single control thread that owns the controller.
pub struct TransportController {
    source: AudioSource,
    graph: AudioGraph,
    devices: Box<dyn DeviceFactory>,
    config: EngineConfig,
    renderer: OfflineRenderer,

    /// Current playback mode
    mode: PlaybackMode,

    /// Whether an interruption cut off live playback
    was_playing_before_interruption: bool,

    /// Schedule whose completion ends the current playback
    current_token: Option<ScheduleToken>,

    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    ticker: ProgressTicker,
    status: PlaybackStatus,
    subscribers: Vec<Sender<PlaybackStatus>>,
}

impl TransportController {
    /// Create a controller for `source`, with devices from `devices`
    ///
    /// The graph is live-configured right away so the first play starts
    /// immediately. A device that refuses to start here is only logged;
    /// the next play tries again and reports the error.
    pub fn new(
        source: AudioSource,
        devices: impl DeviceFactory + 'static,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (events_tx, events_rx) = unbounded();
        let graph = AudioGraph::new(source.format(), devices.create(), events_tx.clone(), 0.0);
        let status = PlaybackStatus {
            duration_seconds: source.duration_secs(),
            ..Default::default()
        };

        let mut transport = Self {
            ticker: ProgressTicker::new(config.progress_interval()),
            source,
            graph,
            devices: Box::new(devices),
            config,
            renderer: OfflineRenderer::default(),
            mode: PlaybackMode::Idle,
            was_playing_before_interruption: false,
            current_token: None,
            events_tx,
            events_rx,
            status,
            subscribers: Vec::new(),
        };

        if let Err(e) = transport.graph.configure_for_live() {
            log::warn!("[TRANSPORT] Output not started at load: {}", e);
        }
        Ok(transport)
    }

    // ========================================================================
    // UI Requests
    // ========================================================================

    /// Play the source from its start
    ///
    /// No-op while already playing. Rejected while rendering or
    /// interrupted. If the device cannot start, the controller stays Idle
    /// and the [`EngineError::EngineStart`] is returned.
    pub fn request_play(&mut self) -> Result<()> {
        match self.mode {
            PlaybackMode::Live => {
                log::debug!("[TRANSPORT] Already playing");
                return Ok(());
            }
            PlaybackMode::Offline | PlaybackMode::Interrupted => {
                return Err(self.rejected("play"));
            }
            PlaybackMode::Idle => {}
        }

        if let Err(e) = self.graph.configure_for_live() {
            self.enter_idle();
            return Err(e);
        }

        let token = self.graph.schedule_source(self.source.clone());
        self.graph.play_player();
        self.current_token = Some(token);
        self.ticker.start();
        self.set_mode(PlaybackMode::Live);

        log::debug!(
            "[TRANSPORT] Play ({:.3}s at {} cents)",
            self.source.duration_secs(),
            self.graph.pitch()
        );
        Ok(())
    }

    /// Stop playback and reset progress
    ///
    /// While interrupted this also forgets the pending resume. No-op while
    /// idle.
    pub fn request_stop(&mut self) -> Result<()> {
        match self.mode {
            PlaybackMode::Live => {
                self.enter_idle();
                log::debug!("[TRANSPORT] Stop");
            }
            PlaybackMode::Interrupted => {
                self.was_playing_before_interruption = false;
                self.enter_idle();
                log::debug!("[TRANSPORT] Stop while interrupted, resume cancelled");
            }
            PlaybackMode::Idle => {
                log::debug!("[TRANSPORT] Already stopped");
            }
            PlaybackMode::Offline => return Err(self.rejected("stop")),
        }
        Ok(())
    }

    /// Stop because the output device went away
    ///
    /// Unlike [`TransportController::request_stop`], a pending resume
    /// survives: while interrupted the output is already stopped, so this
    /// leaves the mode and the resume memory alone.
    pub fn stop_for_route_loss(&mut self) {
        match self.mode {
            PlaybackMode::Live => {
                self.enter_idle();
                log::debug!("[TRANSPORT] Output lost, stopped");
            }
            mode => {
                log::debug!("[TRANSPORT] Output lost while {}, nothing to stop", mode);
            }
        }
    }

    /// Play/stop toggle of a single transport button
    pub fn toggle_play(&mut self) -> Result<()> {
        if self.mode == PlaybackMode::Live {
            self.request_stop()
        } else {
            self.request_play()
        }
    }

    /// Render the whole source offline to the configured output file
    ///
    /// Blocks until the render completes or fails. Live playback is stopped
    /// first. Whatever the outcome, the controller ends Idle with the graph
    /// live-configured again; if that restart fails its error is returned
    /// instead of the artifact.
    pub fn request_render(&mut self) -> Result<RenderedArtifact> {
        match self.mode {
            PlaybackMode::Offline | PlaybackMode::Interrupted => {
                return Err(self.rejected("render"));
            }
            PlaybackMode::Live => {
                log::debug!("[TRANSPORT] Stopping playback for render");
                self.enter_idle();
            }
            PlaybackMode::Idle => {}
        }

        self.set_mode(PlaybackMode::Offline);
        let started = Instant::now();
        let rendered = self.render_to_file();
        let restored = self.graph.configure_for_live();
        self.enter_idle();

        let outcome = rendered.and_then(|artifact| restored.map(|()| artifact));
        match &outcome {
            Ok(artifact) => {
                log::info!(
                    "[TRANSPORT] Rendered {:.3}s in {:.3}s",
                    artifact.duration_secs(),
                    started.elapsed().as_secs_f64()
                );
                self.status.rendered_artifact_path = Some(artifact.path.clone());
            }
            Err(e) => {
                log::warn!("[TRANSPORT] Render failed: {}", e);
                self.status.rendered_artifact_path = None;
            }
        }
        self.publish();
        outcome
    }

    fn render_to_file(&mut self) -> Result<RenderedArtifact> {
        self.graph.configure_for_offline(self.config.max_frame_budget)?;

        let path = self.config.output_path();
        let sink = WavFileSink::create(&path, self.source.format()).map_err(|e| {
            EngineError::Render {
                reason: format!("could not create {}", path.display()),
                source: Some(Box::new(e)),
            }
        })?;

        self.renderer.render(&self.source, &mut self.graph, sink)
    }

    /// Set the pitch in cents; never changes the playback mode
    pub fn set_pitch(&mut self, cents: f32) {
        self.graph.set_pitch(cents);
        log::debug!("[TRANSPORT] Pitch {} cents", cents);
    }

    pub fn pitch_cents(&self) -> f32 {
        self.graph.pitch()
    }

    // ========================================================================
    // Session Events
    // ========================================================================

    /// The session took the output away
    ///
    /// From Live: remember that playback was running, stop the output and
    /// enter Interrupted. Ignored in every other mode.
    pub fn on_interruption_began(&mut self) {
        match self.mode {
            PlaybackMode::Live => {
                self.was_playing_before_interruption = true;
                self.halt_playback();
                self.graph.teardown();
                self.set_mode(PlaybackMode::Interrupted);
                log::debug!("[TRANSPORT] Interrupted during playback");
            }
            mode => {
                log::debug!("[TRANSPORT] Interruption began while {}, ignored", mode);
            }
        }
    }

    /// The session gave the output back
    ///
    /// Resumes playback when the session allows it and playback was running
    /// when the interruption began; otherwise settles in Idle.
    pub fn on_interruption_ended(&mut self, should_resume: bool) -> Result<()> {
        if self.mode != PlaybackMode::Interrupted {
            log::debug!("[TRANSPORT] Interruption ended while {}, ignored", self.mode);
            return Ok(());
        }

        let resume = should_resume && self.was_playing_before_interruption;
        self.was_playing_before_interruption = false;
        self.enter_idle();

        if resume {
            log::debug!("[TRANSPORT] Resuming after interruption");
            self.request_play()
        } else {
            log::debug!("[TRANSPORT] Interruption over, staying stopped");
            Ok(())
        }
    }

    /// The platform reset its media services
    ///
    /// Every device object is gone: stop everything, build a new graph with
    /// fresh nodes and a fresh device, live-configure it and settle in Idle.
    /// The pitch carries over. Failing to start the new device is logged,
    /// not returned.
    pub fn on_service_reset(&mut self) {
        log::warn!("[TRANSPORT] Media services reset while {}, rebuilding graph", self.mode);

        let pitch = self.graph.pitch();
        self.was_playing_before_interruption = false;
        self.enter_idle();
        self.graph.teardown();

        self.graph = AudioGraph::new(
            self.source.format(),
            self.devices.create(),
            self.events_tx.clone(),
            pitch,
        );
        if let Err(e) = self.graph.configure_for_live() {
            log::warn!("[TRANSPORT] Rebuilt graph did not start: {}", e);
        }
    }

    /// Publish the headphone flag derived from the current route
    pub(crate) fn set_headphones_connected(&mut self, connected: bool) {
        if self.status.is_headphones_connected != connected {
            self.status.is_headphones_connected = connected;
            self.publish();
        }
    }

    // ========================================================================
    // Engine Events / Progress
    // ========================================================================

    /// Apply every pending engine event; returns how many were handled
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one engine event and apply it
    pub fn wait_for_event(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Apply one engine event
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PlaybackCompleted { token } => {
                if self.mode == PlaybackMode::Live && self.current_token == Some(token) {
                    log::debug!("[TRANSPORT] Reached end of source");
                    self.enter_idle();
                } else {
                    log::debug!("[TRANSPORT] Stale completion for player {} ignored", token.player());
                }
            }
        }
    }

    /// Recompute playback progress from the player clock and publish it
    pub fn tick_progress(&mut self) -> &PlaybackStatus {
        if self.mode == PlaybackMode::Live {
            let frames = self.graph.player_sample_time();
            let current = self.source.format().frames_to_secs(frames);
            let duration = self.status.duration_seconds;

            self.status.current_time_seconds = current;
            self.status.progress_fraction = if duration > 0.0 {
                (current / duration).clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.publish();
        }
        &self.status
    }

    /// Engine events, for callers that select on several channels
    pub fn engine_events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    /// Progress ticks; never fires unless playing
    pub fn progress_ticks(&self) -> Receiver<Instant> {
        self.ticker.receiver()
    }

    /// Receive every published status, starting with the current one
    pub fn subscribe(&mut self) -> Receiver<PlaybackStatus> {
        let (tx, rx) = unbounded();
        // Fresh channel, the receiver is alive
        let _ = tx.send(self.status.clone());
        self.subscribers.push(tx);
        rx
    }

    /// Stop playback and release the output device
    pub fn shutdown(&mut self) {
        self.enter_idle();
        self.graph.teardown();
        log::debug!("[TRANSPORT] Shut down");
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.mode == PlaybackMode::Live
    }

    pub fn status(&self) -> &PlaybackStatus {
        &self.status
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn was_playing_before_interruption(&self) -> bool {
        self.was_playing_before_interruption
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Halt the schedule, cancel progress ticks and zero progress
    ///
    /// Publishes nothing; the caller picks the mode that follows.
    fn halt_playback(&mut self) {
        self.ticker.stop();
        self.graph.stop_player();
        self.current_token = None;
        self.status.current_time_seconds = 0.0;
        self.status.progress_fraction = 0.0;
    }

    fn enter_idle(&mut self) {
        self.halt_playback();
        self.set_mode(PlaybackMode::Idle);
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode != mode {
            log::debug!("[TRANSPORT] {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        self.status.mode = mode;
        self.status.is_playing = mode == PlaybackMode::Live;
        self.publish();
    }

    fn publish(&mut self) {
        let status = &self.status;
        self.subscribers.retain(|tx| tx.send(status.clone()).is_ok());
    }

    fn rejected(&self, operation: &'static str) -> EngineError {
        log::debug!("[TRANSPORT] Cannot {} while {}", operation, self.mode);
        EngineError::InvalidTransition {
            operation,
            mode: self.mode.to_string(),
        }
    }
}

impl fmt::Debug for TransportController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportController")
            .field("mode", &self.mode)
            .field("graph", &self.graph)
            .field("status", &self.status)
            .finish()
    }
}

impl Drop for TransportController {
    fn drop(&mut self) {
        self.ticker.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::AudioBuffer;
    use crate::engine::device::ManualDeviceHandle;
    use crate::engine::graph::GraphMode;
    use crate::engine::source::SourceFormat;
    use tempfile::{tempdir, TempDir};

    const RATE: u32 = 1000;

    fn source(frames: usize) -> AudioSource {
        let mut buffer = AudioBuffer::new(frames, 2, RATE);
        for channel in &mut buffer.samples {
            channel.fill(0.25);
        }
        AudioSource::from_buffer(buffer, SourceFormat::float32(RATE, 2)).unwrap()
    }

    fn transport(frames: usize) -> (TransportController, ManualDeviceHandle, TempDir) {
        let dir = tempdir().unwrap();
        let handle = ManualDeviceHandle::new();
        let config = EngineConfig {
            output_dir: Some(dir.path().to_path_buf()),
            max_frame_budget: 256,
            ..Default::default()
        };
        let transport = TransportController::new(source(frames), handle.factory(), config).unwrap();
        (transport, handle, dir)
    }

    // ------------------------------------------------------------------------
    // Basic State Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_state_is_idle() {
        let (transport, handle, _dir) = transport(1000);
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.status().is_playing);
        assert_eq!(transport.status().duration_seconds, 1.0);
        assert_eq!(transport.graph().mode(), GraphMode::Live);
        assert_eq!(handle.start_count(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let handle = ManualDeviceHandle::new();
        let config = EngineConfig {
            max_frame_budget: 0,
            ..Default::default()
        };
        assert!(TransportController::new(source(10), handle.factory(), config).is_err());
    }

    // ------------------------------------------------------------------------
    // Play / Stop
    // ------------------------------------------------------------------------

    #[test]
    fn test_play_and_stop() {
        let (mut transport, handle, _dir) = transport(1000);

        transport.request_play().unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Live);
        assert!(transport.status().is_playing);

        handle.pull(250).unwrap();
        let status = transport.tick_progress().clone();
        assert_eq!(status.current_time_seconds, 0.25);
        assert_eq!(status.progress_fraction, 0.25);

        transport.request_stop().unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.status().is_playing);
        assert_eq!(transport.status().progress_fraction, 0.0);
        assert_eq!(transport.status().current_time_seconds, 0.0);
    }

    #[test]
    fn test_play_while_playing_is_noop() {
        let (mut transport, handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        handle.pull(100).unwrap();
        transport.request_play().unwrap();
        assert_eq!(transport.graph().player_sample_time(), 100);
        assert_eq!(handle.start_count(), 1);
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_stop().unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn test_natural_end_returns_to_idle() {
        let (mut transport, handle, _dir) = transport(300);
        transport.request_play().unwrap();

        handle.pull(256).unwrap();
        assert_eq!(transport.process_events(), 0);
        handle.pull(256).unwrap();
        assert_eq!(transport.process_events(), 1);

        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.status().is_playing);
        assert_eq!(transport.status().progress_fraction, 0.0);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let (mut transport, handle, _dir) = transport(100);
        transport.request_play().unwrap();
        handle.pull(128).unwrap();

        // Restart before the completion of the first schedule is processed
        transport.request_stop().unwrap();
        transport.request_play().unwrap();
        assert_eq!(transport.process_events(), 1);
        assert_eq!(transport.mode(), PlaybackMode::Live);
    }

    #[test]
    fn test_start_failure_reverts_to_idle() {
        let (mut transport, handle, _dir) = transport(1000);
        transport.on_service_reset();
        handle.fail_starts(true);
        transport.on_service_reset();

        let err = transport.request_play().unwrap_err();
        assert!(matches!(err, EngineError::EngineStart { .. }));
        assert!(err.is_recoverable());
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.status().is_playing);

        handle.fail_starts(false);
        transport.request_play().unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Live);
    }

    #[test]
    fn test_pitch_does_not_change_mode() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.set_pitch(-600.0);
        assert_eq!(transport.pitch_cents(), -600.0);
        assert_eq!(transport.mode(), PlaybackMode::Idle);

        transport.request_play().unwrap();
        transport.set_pitch(600.0);
        assert_eq!(transport.pitch_cents(), 600.0);
        assert_eq!(transport.mode(), PlaybackMode::Live);
    }

    // ------------------------------------------------------------------------
    // Interruptions
    // ------------------------------------------------------------------------

    #[test]
    fn test_interruption_with_resume() {
        let (mut transport, handle, _dir) = transport(1000);
        transport.request_play().unwrap();

        transport.on_interruption_began();
        assert_eq!(transport.mode(), PlaybackMode::Interrupted);
        assert!(!transport.status().is_playing);
        assert!(transport.was_playing_before_interruption());
        assert!(!handle.is_running());

        transport.on_interruption_ended(true).unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Live);
        assert!(transport.status().is_playing);
        assert!(handle.is_running());
    }

    #[test]
    fn test_interruption_without_resume() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.on_interruption_began();
        transport.on_interruption_ended(false).unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.was_playing_before_interruption());
    }

    #[test]
    fn test_interruption_while_idle_is_ignored() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.on_interruption_began();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        transport.on_interruption_ended(true).unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn test_play_rejected_while_interrupted() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.on_interruption_began();

        let err = transport.request_play().unwrap_err();
        assert_eq!(err.to_string(), "Cannot play while Interrupted");
        assert_eq!(transport.mode(), PlaybackMode::Interrupted);
    }

    #[test]
    fn test_stop_while_interrupted_cancels_resume() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.on_interruption_began();
        transport.request_stop().unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);

        transport.on_interruption_ended(true).unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn test_route_loss_while_interrupted_keeps_resume() {
        let (mut transport, handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.on_interruption_began();

        transport.stop_for_route_loss();
        assert_eq!(transport.mode(), PlaybackMode::Interrupted);
        assert!(transport.was_playing_before_interruption());

        transport.on_interruption_ended(true).unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Live);
        assert!(handle.is_running());
    }

    #[test]
    fn test_route_loss_stops_live_playback() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.stop_for_route_loss();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert_eq!(transport.status().progress_fraction, 0.0);

        transport.stop_for_route_loss();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn test_interruption_publishes_single_transition() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        let rx = transport.subscribe();
        assert_eq!(rx.try_recv().unwrap().mode, PlaybackMode::Live);

        transport.on_interruption_began();

        let modes: Vec<PlaybackMode> = rx.try_iter().map(|s| s.mode).collect();
        assert_eq!(modes, vec![PlaybackMode::Interrupted]);
    }

    // ------------------------------------------------------------------------
    // Render
    // ------------------------------------------------------------------------

    #[test]
    fn test_render_from_idle() {
        let (mut transport, handle, dir) = transport(1000);
        let artifact = transport.request_render().unwrap();

        assert_eq!(artifact.frame_count, 1000);
        assert_eq!(artifact.path, dir.path().join("audioProcessed.wav"));
        assert!(artifact.path.exists());
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert_eq!(transport.graph().mode(), GraphMode::Live);
        assert!(handle.is_running());
        assert_eq!(
            transport.status().rendered_artifact_path.as_deref(),
            Some(artifact.path.as_path())
        );
    }

    #[test]
    fn test_render_stops_playback() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.request_render().unwrap();
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.status().is_playing);
        assert!(!transport.graph().player_is_playing());
        assert_eq!(transport.graph().mode(), GraphMode::Live);
    }

    #[test]
    fn test_render_restart_failure_is_surfaced() {
        let (mut transport, handle, _dir) = transport(1000);
        handle.fail_starts(true);

        let err = transport.request_render().unwrap_err();
        assert!(matches!(err, EngineError::EngineStart { .. }));
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(transport.status().rendered_artifact_path.is_none());
    }

    #[test]
    fn test_render_rejected_while_interrupted() {
        let (mut transport, _handle, _dir) = transport(1000);
        transport.request_play().unwrap();
        transport.on_interruption_began();
        assert!(matches!(
            transport.request_render(),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    // ------------------------------------------------------------------------
    // Service Reset / Publishing
    // ------------------------------------------------------------------------

    #[test]
    fn test_service_reset_rebuilds_graph() {
        let (mut transport, handle, _dir) = transport(1000);
        transport.set_pitch(600.0);
        transport.request_play().unwrap();
        let before = transport.graph().node_ids();

        transport.on_service_reset();

        let after = transport.graph().node_ids();
        for ((_, old), (_, new)) in before.iter().zip(after.iter()) {
            assert_ne!(old, new);
        }
        assert_eq!(transport.mode(), PlaybackMode::Idle);
        assert!(!transport.status().is_playing);
        assert_eq!(transport.pitch_cents(), 600.0);
        assert_eq!(transport.graph().mode(), GraphMode::Live);
        assert_eq!(handle.start_count(), 2);
    }

    #[test]
    fn test_subscribers_see_transitions() {
        let (mut transport, _handle, _dir) = transport(1000);
        let rx = transport.subscribe();
        assert_eq!(rx.try_recv().unwrap().mode, PlaybackMode::Idle);

        transport.request_play().unwrap();
        transport.request_stop().unwrap();

        let modes: Vec<PlaybackMode> = rx.try_iter().map(|s| s.mode).collect();
        assert_eq!(modes.first(), Some(&PlaybackMode::Live));
        assert_eq!(modes.last(), Some(&PlaybackMode::Idle));
    }

    #[test]
    fn test_progress_ticker_follows_live_mode() {
        let (mut transport, _handle, _dir) = transport(1000);
        let idle_ticks = transport.progress_ticks();
        assert!(idle_ticks.recv_timeout(Duration::from_millis(40)).is_err());

        transport.request_play().unwrap();
        assert!(transport
            .progress_ticks()
            .recv_timeout(Duration::from_secs(1))
            .is_ok());

        transport.request_stop().unwrap();
        assert!(transport
            .progress_ticks()
            .recv_timeout(Duration::from_millis(40))
            .is_err());
    }
}
