//! Pitch Shift Effect
//!
//! Dual-tap delay-line pitch shifter. Two read heads sweep through a short
//! delay line at a rate set by the pitch ratio, half a window apart, and are
//! crossfaded with triangular windows that sum to one. Duration is
//! unchanged; only pitch moves.
//!
//! The pitch lives in a [`PitchParameter`] shared with whoever holds the
//! graph, so the control thread can move it while the render thread is
//! processing without touching the topology.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::dsp::effect::Effect;
use crate::engine::AudioBuffer;
use crate::error::{EngineError, Result};

// ============================================================================
// Constants
// ============================================================================

/// One octave in cents
pub const CENTS_PER_OCTAVE: f32 = 1200.0;

/// Length of the sweep window in milliseconds
const WINDOW_MS: f32 = 50.0;

/// Smallest usable window, for very low sample rates
const MIN_WINDOW_FRAMES: usize = 16;

/// Convert a pitch offset in cents to a frequency ratio
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    2.0_f32.powf(cents / CENTS_PER_OCTAVE)
}

// ============================================================================
// Pitch Parameter
// ============================================================================

/// Lock-free pitch value in cents (f32 bits in an `AtomicU32`)
#[derive(Debug)]
pub struct PitchParameter {
    bits: AtomicU32,
}

impl PitchParameter {
    pub fn new(cents: f32) -> Self {
        Self {
            bits: AtomicU32::new(cents.to_bits()),
        }
    }

    /// Current pitch in cents
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Set the pitch in cents; any finite value is accepted
    #[inline]
    pub fn set(&self, cents: f32) {
        self.bits.store(cents.to_bits(), Ordering::Relaxed);
    }

    /// Set from a slider position where one unit is one octave
    ///
    /// The app's slider snaps to -0.5, 0 and 0.5, i.e. -600, 0 and +600 cents.
    pub fn set_normalized(&self, value: f32) {
        self.set(value * CENTS_PER_OCTAVE);
    }
}

impl Default for PitchParameter {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// ============================================================================
// Delay Line
// ============================================================================

#[derive(Debug, Clone)]
struct DelayLine {
    data: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len.max(2)],
            write_pos: 0,
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) {
        self.data[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.data.len();
    }

    /// Read `delay` frames behind the newest sample, linearly interpolated
    #[inline]
    fn read(&self, delay: f32) -> f32 {
        let len = self.data.len();
        let newest = (self.write_pos + len - 1) % len;
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = (whole as usize) % len;

        let i0 = (newest + len - whole) % len;
        let i1 = (i0 + len - 1) % len;
        self.data[i0] * (1.0 - frac) + self.data[i1] * frac
    }

    fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
    }
}

/// Triangular crossfade window: 0 at the edges, 1 in the middle
#[inline]
fn triangle(phase: f32) -> f32 {
    1.0 - (2.0 * phase - 1.0).abs()
}

// ============================================================================
// Pitch Shifter
// ============================================================================

/// Time-domain pitch shifter
///
/// At exactly 0 cents the input passes through untouched, sample for sample.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use repitch::dsp::{Effect, PitchParameter, PitchShifter};
/// use repitch::engine::AudioBuffer;
///
/// let pitch = Arc::new(PitchParameter::new(600.0));
/// let mut shifter = PitchShifter::new(Arc::clone(&pitch));
/// shifter.prepare(44100, 2, 512);
///
/// let mut buffer = AudioBuffer::new(512, 2, 44100);
/// shifter.process(&mut buffer);
/// pitch.set(-600.0); // picked up on the next block
/// ```
#[derive(Debug, Clone)]
pub struct PitchShifter {
    param: Arc<PitchParameter>,
    sample_rate: u32,
    window: usize,
    lines: Vec<DelayLine>,
    phase: f32,
}

impl PitchShifter {
    /// Create a shifter reading its pitch from `param`
    pub fn new(param: Arc<PitchParameter>) -> Self {
        Self {
            param,
            sample_rate: 0,
            window: MIN_WINDOW_FRAMES,
            lines: Vec::new(),
            phase: 0.0,
        }
    }

    /// Shared handle to the pitch value
    pub fn parameter(&self) -> &Arc<PitchParameter> {
        &self.param
    }

    /// Current pitch in cents
    pub fn pitch_cents(&self) -> f32 {
        self.param.get()
    }

    /// Sweep window length in frames
    pub fn window_frames(&self) -> usize {
        self.window
    }
}

impl Effect for PitchShifter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.lines.len() != buffer.channels() || self.sample_rate != buffer.sample_rate {
            self.prepare(buffer.sample_rate, buffer.channels(), buffer.len());
        }

        let cents = self.param.get();
        let window = self.window as f32;
        let step = (1.0 - cents_to_ratio(cents)) / window;
        // Past roughly +150000 cents the ratio overflows; pass those through dry
        let bypass = cents == 0.0 || !step.is_finite();

        for frame in 0..buffer.len() {
            let p1 = self.phase;
            let p2 = (p1 + 0.5).fract();
            let (g1, g2) = (triangle(p1), triangle(p2));

            for (ch, line) in self.lines.iter_mut().enumerate() {
                let input = buffer.samples[ch][frame];
                line.push(input);
                if !bypass {
                    buffer.samples[ch][frame] = g1 * line.read(p1 * window) + g2 * line.read(p2 * window);
                }
            }

            if !bypass {
                self.phase = (self.phase + step).rem_euclid(1.0);
                if self.phase >= 1.0 {
                    self.phase = 0.0;
                }
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.window = ((WINDOW_MS * sample_rate as f32 / 1000.0) as usize).max(MIN_WINDOW_FRAMES);
        self.lines = (0..channels).map(|_| DelayLine::new(self.window + 2)).collect();
        self.phase = 0.0;
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.phase = 0.0;
    }

    fn effect_type(&self) -> &'static str {
        "pitch"
    }

    fn get_params(&self) -> Value {
        json!({
            "pitch_cents": self.param.get(),
            "window_frames": self.window,
        })
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "pitch_cents" => {
                let cents = value.as_f64().ok_or_else(|| EngineError::InvalidConfig {
                    reason: format!("pitch_cents must be a number, got {}", value),
                })?;
                self.param.set(cents as f32);
                Ok(())
            }
            _ => Err(EngineError::InvalidConfig {
                reason: format!("Unknown pitch parameter: {}", name),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    fn shifted_tone(cents: f32) -> AudioBuffer {
        let mut buffer = generate_test_tone(441.0, 1.0, 44100, 1);
        let mut shifter = PitchShifter::new(Arc::new(PitchParameter::new(cents)));
        shifter.prepare(44100, 1, 512);
        for chunk_start in (0..buffer.len()).step_by(512) {
            let end = (chunk_start + 512).min(buffer.len());
            let mut chunk = AudioBuffer::new(end - chunk_start, 1, 44100);
            chunk.channel_mut(0).copy_from_slice(&buffer.channel(0)[chunk_start..end]);
            shifter.process(&mut chunk);
            buffer.channel_mut(0)[chunk_start..end].copy_from_slice(chunk.channel(0));
        }
        buffer
    }

    /// Ratio of output to input zero crossings over the settled second half
    fn crossing_ratio(cents: f32) -> f32 {
        let dry = generate_test_tone(441.0, 1.0, 44100, 1);
        let wet = shifted_tone(cents);
        let half = dry.len() / 2;
        zero_crossings(&wet.channel(0)[half..]) as f32
            / zero_crossings(&dry.channel(0)[half..]) as f32
    }

    #[test]
    fn test_cents_to_ratio() {
        assert!((cents_to_ratio(0.0) - 1.0).abs() < 1e-6);
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-5);
        assert!((cents_to_ratio(-1200.0) - 0.5).abs() < 1e-6);
        assert!((cents_to_ratio(600.0) - std::f32::consts::SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_parameter_is_shared() {
        let param = Arc::new(PitchParameter::default());
        let shifter = PitchShifter::new(Arc::clone(&param));
        assert_eq!(shifter.pitch_cents(), 0.0);

        param.set(-600.0);
        assert_eq!(shifter.pitch_cents(), -600.0);

        param.set_normalized(0.5);
        assert_eq!(shifter.pitch_cents(), 600.0);
    }

    #[test]
    fn test_zero_cents_is_bit_exact() {
        let dry = generate_test_tone(441.0, 0.2, 44100, 2);
        let mut wet = dry.clone();
        let mut shifter = PitchShifter::new(Arc::new(PitchParameter::new(0.0)));
        shifter.prepare(44100, 2, wet.len());
        shifter.process(&mut wet);
        assert_eq!(wet, dry);
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let ratio = crossing_ratio(1200.0);
        assert!((1.8..2.2).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_octave_down_halves_frequency() {
        let ratio = crossing_ratio(-1200.0);
        assert!((0.45..0.55).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_shift_preserves_length_and_level() {
        let wet = shifted_tone(600.0);
        assert_eq!(wet.len(), 44100);
        assert!(wet.is_finite());
        let peak = wet
            .channel(0)
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!(peak <= 0.5 + 1e-3, "peak was {}", peak);
        assert!(peak > 0.3, "peak was {}", peak);
    }

    #[test]
    fn test_extreme_pitch_stays_finite() {
        let dry = generate_test_tone(441.0, 1.0, 44100, 1);
        for cents in [200_000.0, f32::INFINITY, f32::NAN] {
            let wet = shifted_tone(cents);
            assert!(wet.is_finite(), "{} cents", cents);
            assert_eq!(wet, dry);
        }
        assert!(shifted_tone(-200_000.0).is_finite());
    }

    #[test]
    fn test_recovers_after_extreme_pitch() {
        let param = Arc::new(PitchParameter::new(200_000.0));
        let mut shifter = PitchShifter::new(Arc::clone(&param));
        shifter.prepare(44100, 1, 512);

        let mut block = generate_test_tone(441.0, 0.05, 44100, 1);
        shifter.process(&mut block);
        param.set(1200.0);
        let mut block = generate_test_tone(441.0, 0.05, 44100, 1);
        shifter.process(&mut block);
        assert!(block.is_finite());
    }

    #[test]
    fn test_prepare_sizes_window_from_sample_rate() {
        let mut shifter = PitchShifter::new(Arc::new(PitchParameter::default()));
        shifter.prepare(48000, 2, 512);
        assert_eq!(shifter.window_frames(), 2400);
        shifter.prepare(100, 1, 512);
        assert_eq!(shifter.window_frames(), MIN_WINDOW_FRAMES);
    }

    #[test]
    fn test_set_param() {
        let mut shifter = PitchShifter::new(Arc::new(PitchParameter::default()));
        shifter.set_param("pitch_cents", &json!(-600)).unwrap();
        assert_eq!(shifter.pitch_cents(), -600.0);
        assert_eq!(shifter.get_params()["pitch_cents"], json!(-600.0));

        assert!(shifter.set_param("pitch_cents", &json!("high")).is_err());
        assert!(shifter.set_param("rate", &json!(1.0)).is_err());
    }
}
