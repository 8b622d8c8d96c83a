//! Graph nodes
//!
//! The three logical nodes of the processing graph: the player that reads
//! the source, the effect slot, and the output endpoint. Every node gets a
//! fresh [`NodeId`] when it is created, so a rebuilt graph is
//! distinguishable from the one it replaced.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::dsp::Effect;
use crate::engine::buffer::AudioBuffer;
use crate::engine::source::AudioSource;

/// Opaque node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a node in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Player,
    Effect,
    Output,
}

/// Identifies one scheduling of the source on one player node
///
/// Completion events carry the token of the schedule that finished, which
/// lets the transport ignore completions of schedules it already stopped
/// or of players that belonged to a discarded graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleToken {
    player: NodeId,
    sequence: u64,
}

impl ScheduleToken {
    pub fn player(&self) -> NodeId {
        self.player
    }
}

// ============================================================================
// Player
// ============================================================================

#[derive(Debug)]
struct Schedule {
    source: AudioSource,
    position: u64,
    token: ScheduleToken,
    finished: bool,
}

/// Source node: plays one scheduled [`AudioSource`] from its start
///
/// The number of frames played is mirrored in an atomic clock so the
/// control thread can read progress without locking the render path.
#[derive(Debug)]
pub struct PlayerNode {
    id: NodeId,
    scheduled: Option<Schedule>,
    playing: bool,
    clock: Arc<AtomicU64>,
    next_sequence: u64,
}

impl PlayerNode {
    pub fn new() -> Self {
        Self {
            id: NodeId::new(),
            scheduled: None,
            playing: false,
            clock: Arc::new(AtomicU64::new(0)),
            next_sequence: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Schedule `source` from its first frame, replacing any previous schedule
    ///
    /// The player stays stopped until [`PlayerNode::play`].
    pub fn schedule(&mut self, source: AudioSource) -> ScheduleToken {
        let token = ScheduleToken {
            player: self.id,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.scheduled = Some(Schedule {
            source,
            position: 0,
            token,
            finished: false,
        });
        self.playing = false;
        self.clock.store(0, Ordering::Relaxed);
        token
    }

    /// Start consuming the scheduled source; no-op if nothing is scheduled
    pub fn play(&mut self) {
        self.playing = self.scheduled.is_some();
    }

    /// Stop and drop the schedule
    pub fn stop(&mut self) {
        self.playing = false;
        self.scheduled = None;
        self.clock.store(0, Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Frames of the current schedule played so far
    pub fn sample_time(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub(crate) fn clock(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.clock)
    }

    /// Fill `out` with the next frames of the schedule
    ///
    /// Frames past the end of the source are silent. Returns the schedule's
    /// token exactly once: on the first call that reaches the end.
    pub fn render(&mut self, out: &mut AudioBuffer) -> Option<ScheduleToken> {
        let schedule = match (self.playing, self.scheduled.as_mut()) {
            (true, Some(schedule)) => schedule,
            _ => {
                out.silence();
                return None;
            }
        };

        let copied = schedule.source.read_into(schedule.position, out);
        for channel in &mut out.samples {
            channel[copied..].fill(0.0);
        }
        schedule.position += copied as u64;
        self.clock.store(schedule.position, Ordering::Relaxed);

        if !schedule.finished && schedule.position >= schedule.source.length_frames() {
            schedule.finished = true;
            return Some(schedule.token);
        }
        None
    }
}

impl Default for PlayerNode {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Effect / Output
// ============================================================================

/// Effect slot node
pub struct EffectNode {
    id: NodeId,
    effect: Box<dyn Effect>,
}

impl EffectNode {
    pub fn new(effect: Box<dyn Effect>) -> Self {
        Self {
            id: NodeId::new(),
            effect,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn effect(&self) -> &dyn Effect {
        self.effect.as_ref()
    }

    pub fn effect_mut(&mut self) -> &mut dyn Effect {
        self.effect.as_mut()
    }
}

impl fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectNode")
            .field("id", &self.id)
            .field("effect", &self.effect.effect_type())
            .finish()
    }
}

/// Output endpoint: the device in live mode, the render pull in offline mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputNode {
    id: NodeId,
}

impl OutputNode {
    pub fn new() -> Self {
        Self { id: NodeId::new() }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Default for OutputNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::source::SourceFormat;

    fn source(frames: usize) -> AudioSource {
        let mut buffer = AudioBuffer::new(frames, 1, 1000);
        buffer.channel_mut(0).fill(0.25);
        AudioSource::from_buffer(buffer, SourceFormat::float32(1000, 1)).unwrap()
    }

    #[test]
    fn test_node_ids_are_unique() {
        let a = PlayerNode::new();
        let b = PlayerNode::new();
        assert_ne!(a.id(), b.id());
        assert_ne!(OutputNode::new().id(), OutputNode::new().id());
    }

    #[test]
    fn test_unscheduled_player_renders_silence() {
        let mut player = PlayerNode::new();
        player.play();
        assert!(!player.is_playing());

        let mut out = AudioBuffer::new(8, 1, 1000);
        out.channel_mut(0).fill(1.0);
        assert_eq!(player.render(&mut out), None);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_completion_fires_once() {
        let mut player = PlayerNode::new();
        let token = player.schedule(source(10));
        player.play();

        let mut out = AudioBuffer::new(4, 1, 1000);
        assert_eq!(player.render(&mut out), None);
        assert_eq!(player.render(&mut out), None);
        assert_eq!(player.render(&mut out), Some(token));
        assert_eq!(player.sample_time(), 10);
        // Tail of the last block is silent
        assert_eq!(out.channel(0), &[0.25, 0.25, 0.0, 0.0]);

        assert_eq!(player.render(&mut out), None);
        assert_eq!(player.sample_time(), 10);
    }

    #[test]
    fn test_zero_length_source_completes_on_first_pull() {
        let mut player = PlayerNode::new();
        let token = player.schedule(source(0));
        player.play();
        let mut out = AudioBuffer::new(4, 1, 1000);
        assert_eq!(player.render(&mut out), Some(token));
    }

    #[test]
    fn test_reschedule_issues_new_token() {
        let mut player = PlayerNode::new();
        let first = player.schedule(source(10));
        let second = player.schedule(source(10));
        assert_ne!(first, second);
        assert_eq!(first.player(), second.player());
    }

    #[test]
    fn test_stop_resets_clock() {
        let mut player = PlayerNode::new();
        player.schedule(source(10));
        player.play();
        let mut out = AudioBuffer::new(4, 1, 1000);
        player.render(&mut out);
        assert_eq!(player.sample_time(), 4);

        player.stop();
        assert!(!player.is_playing());
        assert_eq!(player.sample_time(), 0);
    }
}
