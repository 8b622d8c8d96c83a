//! Audio Session Module
//!
//! Interruption, route-change and service-reset notifications and the
//! monitor that turns them into transport operations.

pub mod events;
pub mod route;

pub use events::{
    AudioRoute, InterruptionKind, InterruptionOptions, PortDescription, PortType,
    RouteChangeReason, SessionEvent,
};
pub use route::{RouteMonitor, SessionAction};
