//! Route monitor
//!
//! Stateless translator from session notifications to transport calls.
//! Each notification maps to at most one transport operation; payloads that
//! cannot be decoded are dropped without touching any state.

use crate::engine::transport::TransportController;
use crate::error::{EngineError, Result};
use crate::session::events::{
    AudioRoute, InterruptionKind, InterruptionOptions, RouteChangeReason, SessionEvent,
};

/// What a session notification asks the transport to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
    /// Publish the new headphone flag, and stop if the old output is gone
    RouteChanged { headphones: bool, stop_playback: bool },
    ServicesReset,
    /// Nothing to do for this notification
    Ignore,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteMonitor;

impl RouteMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Decode a notification
    ///
    /// Malformed interruption payloads are [`EngineError::SessionInterruption`].
    /// Every decodable route change recomputes the headphone flag; only a
    /// missing or unknown reason is `Ignore`.
    pub fn translate(&self, event: &SessionEvent) -> Result<SessionAction> {
        match event {
            SessionEvent::Interruption { kind, options } => {
                let raw = kind.ok_or_else(|| EngineError::SessionInterruption {
                    reason: "interruption without a type".to_string(),
                })?;
                match InterruptionKind::try_from(raw)? {
                    InterruptionKind::Began => Ok(SessionAction::InterruptionBegan),
                    InterruptionKind::Ended => {
                        let bits = options.ok_or_else(|| EngineError::SessionInterruption {
                            reason: "ended interruption without options".to_string(),
                        })?;
                        Ok(SessionAction::InterruptionEnded {
                            should_resume: InterruptionOptions::from_bits(bits).should_resume(),
                        })
                    }
                }
            }
            SessionEvent::RouteChange {
                reason, current, ..
            } => Ok(Self::route_action(*reason, current)),
            SessionEvent::ServicesReset => Ok(SessionAction::ServicesReset),
        }
    }

    fn route_action(reason: Option<u32>, current: &AudioRoute) -> SessionAction {
        let reason = match reason.map(RouteChangeReason::try_from) {
            Some(Ok(reason)) => reason,
            Some(Err(e)) => {
                log::debug!("[SESSION] {}", e);
                return SessionAction::Ignore;
            }
            None => {
                log::debug!("[SESSION] Route change without a reason");
                return SessionAction::Ignore;
            }
        };

        log::debug!("[SESSION] Route change: {:?}", reason);
        SessionAction::RouteChanged {
            headphones: current.has_headphones(),
            stop_playback: reason == RouteChangeReason::OldDeviceUnavailable,
        }
    }

    /// Decode a notification and apply it to `transport`
    ///
    /// Undecodable payloads are logged and ignored. Errors come only from
    /// the transport operation itself, such as a failed resume.
    pub fn dispatch(&self, event: &SessionEvent, transport: &mut TransportController) -> Result<()> {
        let action = match self.translate(event) {
            Ok(action) => action,
            Err(e) => {
                log::debug!("[SESSION] Ignored: {}", e);
                return Ok(());
            }
        };

        match action {
            SessionAction::InterruptionBegan => transport.on_interruption_began(),
            SessionAction::InterruptionEnded { should_resume } => {
                transport.on_interruption_ended(should_resume)?
            }
            SessionAction::RouteChanged {
                headphones,
                stop_playback,
            } => {
                transport.set_headphones_connected(headphones);
                if stop_playback {
                    transport.stop_for_route_loss();
                }
            }
            SessionAction::ServicesReset => transport.on_service_reset(),
            SessionAction::Ignore => {}
        }
        Ok(())
    }

    /// Publish the headphone flag of the route in effect at startup
    pub fn observe_route(&self, route: &AudioRoute, transport: &mut TransportController) {
        transport.set_headphones_connected(route.has_headphones());
    }
}
