//! Progress ticker
//!
//! A cancellable periodic timer for publishing playback progress at display
//! cadence. Running, it is a `crossbeam_channel::tick`; stopped, its
//! receiver never fires, so it can sit in a `select!` unconditionally.

use std::time::{Duration, Instant};

use crossbeam_channel::{never, tick, Receiver};

#[derive(Debug)]
pub struct ProgressTicker {
    interval: Duration,
    rx: Option<Receiver<Instant>>,
}

impl ProgressTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval, rx: None }
    }

    /// Start ticking; restarts the period if already running
    pub fn start(&mut self) {
        self.rx = Some(tick(self.interval));
    }

    /// Cancel; pending ticks are dropped with the channel
    pub fn stop(&mut self) {
        self.rx = None;
    }

    pub fn is_running(&self) -> bool {
        self.rx.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Receiver to select on
    pub fn receiver(&self) -> Receiver<Instant> {
        match &self.rx {
            Some(rx) => rx.clone(),
            None => never(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_only_while_running() {
        let mut ticker = ProgressTicker::new(Duration::from_millis(1));
        assert!(!ticker.is_running());
        assert!(ticker
            .receiver()
            .recv_timeout(Duration::from_millis(20))
            .is_err());

        ticker.start();
        assert!(ticker.is_running());
        assert!(ticker
            .receiver()
            .recv_timeout(Duration::from_secs(1))
            .is_ok());

        ticker.stop();
        assert!(!ticker.is_running());
        assert!(ticker
            .receiver()
            .recv_timeout(Duration::from_millis(20))
            .is_err());
    }
}
