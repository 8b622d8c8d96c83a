//! Output devices
//!
//! A device owns a real-time thread that pulls one period of audio from the
//! graph through a [`RenderCallback`]. The graph never talks to the
//! platform directly; it only sees [`OutputDevice`], and the transport only
//! sees a [`DeviceFactory`] it can ask for fresh devices after the platform
//! invalidated the old ones.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::buffer::AudioBuffer;
use crate::engine::source::SourceFormat;
use crate::error::{EngineError, Result};

/// Pulls one period of processed audio; runs on the device thread
pub type RenderCallback = Box<dyn FnMut(&mut AudioBuffer) + Send + 'static>;

/// A sink that consumes audio in real time
pub trait OutputDevice: Send {
    /// Start pulling from `callback` at the format's rate
    ///
    /// Fails with [`EngineError::EngineStart`] if the device cannot run.
    fn start(&mut self, format: &SourceFormat, callback: RenderCallback) -> Result<()>;

    /// Stop pulling and drop the callback; no-op when stopped
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn name(&self) -> &str;
}

/// Builds output devices
pub trait DeviceFactory: Send {
    fn create(&self) -> Box<dyn OutputDevice>;
}

impl<F> DeviceFactory for F
where
    F: Fn() -> Box<dyn OutputDevice> + Send,
{
    fn create(&self) -> Box<dyn OutputDevice> {
        self()
    }
}

// ============================================================================
// Simulated Device
// ============================================================================

/// Software clocked device that discards what it pulls
///
/// Each period it renders `period_frames` frames, then sleeps for the
/// period's duration divided by `speed`. An infinite speed pulls as fast as
/// the graph renders.
pub struct SimulatedDevice {
    period_frames: usize,
    speed: f64,
    running: Arc<AtomicBool>,
    periods: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    pub fn new(period_frames: usize, speed: f64) -> Self {
        Self {
            period_frames: period_frames.max(1),
            speed,
            running: Arc::new(AtomicBool::new(false)),
            periods: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// Number of periods pulled since creation
    pub fn periods_rendered(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    fn period_duration(&self, sample_rate: u32) -> Duration {
        let secs = self.period_frames as f64 / sample_rate as f64 / self.speed;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

impl OutputDevice for SimulatedDevice {
    fn start(&mut self, format: &SourceFormat, mut callback: RenderCallback) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::engine_start("simulated device is already running"));
        }
        if self.speed.is_nan() || self.speed <= 0.0 {
            return Err(EngineError::engine_start(format!(
                "simulated device speed must be positive, got {}",
                self.speed
            )));
        }

        let period = self.period_duration(format.sample_rate);
        let mut buffer = AudioBuffer::new(
            self.period_frames,
            format.channels as usize,
            format.sample_rate,
        );
        let running = Arc::clone(&self.running);
        let periods = Arc::clone(&self.periods);

        running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("repitch-render".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    callback(&mut buffer);
                    periods.fetch_add(1, Ordering::Relaxed);
                    if period.is_zero() {
                        thread::yield_now();
                    } else {
                        thread::sleep(period);
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                log::debug!(
                    "[DEVICE] Simulated device started ({} frames/period, x{})",
                    self.period_frames,
                    self.speed
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(EngineError::EngineStart {
                    reason: "could not spawn render thread".to_string(),
                    source: Some(Box::new(e)),
                })
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::warn!("[DEVICE] Render thread panicked");
            }
            log::debug!("[DEVICE] Simulated device stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Manual Device
// ============================================================================

#[derive(Default)]
struct ManualState {
    callback: Option<RenderCallback>,
    format: Option<SourceFormat>,
    owner: Option<u64>,
    next_device: u64,
    starts: usize,
    fail_starts: bool,
}

/// Device whose periods are pulled by the test or script holding the handle
pub struct ManualDevice {
    id: u64,
    state: Arc<Mutex<ManualState>>,
}

/// Shared control side of every [`ManualDevice`] it creates
///
/// Only the most recently started device is live; stopping or dropping an
/// older device does not disturb it.
#[derive(Clone, Default)]
pub struct ManualDeviceHandle {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDeviceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a device bound to this handle
    pub fn device(&self) -> ManualDevice {
        let mut state = self.state.lock();
        let id = state.next_device;
        state.next_device += 1;
        ManualDevice {
            id,
            state: Arc::clone(&self.state),
        }
    }

    /// A factory handing out devices bound to this handle
    pub fn factory(&self) -> impl DeviceFactory + 'static {
        let handle = self.clone();
        move || -> Box<dyn OutputDevice> { Box::new(handle.device()) }
    }

    /// Pull one period of `frames` frames from the running device
    ///
    /// Returns `None` when no device is running.
    pub fn pull(&self, frames: usize) -> Option<AudioBuffer> {
        let mut state = self.state.lock();
        let format = state.format?;
        let callback = state.callback.as_mut()?;
        let mut buffer = AudioBuffer::new(frames, format.channels as usize, format.sample_rate);
        callback(&mut buffer);
        Some(buffer)
    }

    /// Make every subsequent start fail with an engine-start error
    pub fn fail_starts(&self, fail: bool) {
        self.state.lock().fail_starts = fail;
    }

    /// Successful starts across all devices of this handle
    pub fn start_count(&self) -> usize {
        self.state.lock().starts
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().callback.is_some()
    }
}

impl OutputDevice for ManualDevice {
    fn start(&mut self, format: &SourceFormat, callback: RenderCallback) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_starts {
            return Err(EngineError::engine_start("manual device refused to start"));
        }
        if state.owner == Some(self.id) {
            return Err(EngineError::engine_start("manual device is already running"));
        }
        state.callback = Some(callback);
        state.format = Some(*format);
        state.owner = Some(self.id);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        if state.owner == Some(self.id) {
            state.callback = None;
            state.format = None;
            state.owner = None;
        }
    }

    fn is_running(&self) -> bool {
        self.state.lock().owner == Some(self.id)
    }

    fn name(&self) -> &str {
        "manual"
    }
}

impl Drop for ManualDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
