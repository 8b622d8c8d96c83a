//! Session notifications
//!
//! Raw payloads as the platform delivers them: numeric codes that may be
//! missing or unknown. Decoding into typed values happens in
//! [`crate::session::RouteMonitor`].

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// An out-of-band notification from the audio session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Another audio client took or returned the output
    Interruption {
        #[serde(default)]
        kind: Option<u32>,
        #[serde(default)]
        options: Option<u32>,
    },
    /// The output route changed
    RouteChange {
        #[serde(default)]
        reason: Option<u32>,
        #[serde(default)]
        current: AudioRoute,
        #[serde(default)]
        previous: Option<AudioRoute>,
    },
    /// Media services were reset; every engine object is invalid
    ServicesReset,
}

impl SessionEvent {
    pub fn interruption_began() -> Self {
        SessionEvent::Interruption {
            kind: Some(InterruptionKind::Began as u32),
            options: None,
        }
    }

    pub fn interruption_ended(should_resume: bool) -> Self {
        let options = if should_resume {
            InterruptionOptions::SHOULD_RESUME
        } else {
            0
        };
        SessionEvent::Interruption {
            kind: Some(InterruptionKind::Ended as u32),
            options: Some(options),
        }
    }

    pub fn route_change(reason: RouteChangeReason, current: AudioRoute) -> Self {
        SessionEvent::RouteChange {
            reason: Some(reason as u32),
            current,
            previous: None,
        }
    }
}

// ============================================================================
// Interruptions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InterruptionKind {
    Ended = 0,
    Began = 1,
}

impl TryFrom<u32> for InterruptionKind {
    type Error = EngineError;

    fn try_from(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(InterruptionKind::Ended),
            1 => Ok(InterruptionKind::Began),
            other => Err(EngineError::SessionInterruption {
                reason: format!("unknown interruption type {}", other),
            }),
        }
    }
}

/// Option bits delivered with an ended interruption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptionOptions(u32);

impl InterruptionOptions {
    pub const SHOULD_RESUME: u32 = 1;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn should_resume(&self) -> bool {
        self.0 & Self::SHOULD_RESUME != 0
    }
}

// ============================================================================
// Route Changes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RouteChangeReason {
    Unknown = 0,
    NewDeviceAvailable = 1,
    OldDeviceUnavailable = 2,
    CategoryChange = 3,
    Override = 4,
    WakeFromSleep = 6,
    NoSuitableRouteForCategory = 7,
    RouteConfigurationChange = 8,
}

impl TryFrom<u32> for RouteChangeReason {
    type Error = EngineError;

    fn try_from(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => RouteChangeReason::Unknown,
            1 => RouteChangeReason::NewDeviceAvailable,
            2 => RouteChangeReason::OldDeviceUnavailable,
            3 => RouteChangeReason::CategoryChange,
            4 => RouteChangeReason::Override,
            6 => RouteChangeReason::WakeFromSleep,
            7 => RouteChangeReason::NoSuitableRouteForCategory,
            8 => RouteChangeReason::RouteConfigurationChange,
            other => {
                return Err(EngineError::SessionInterruption {
                    reason: format!("unknown route change reason {}", other),
                })
            }
        })
    }
}

/// Kind of an output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    BuiltInSpeaker,
    BuiltInReceiver,
    Headphones,
    BluetoothA2dp,
    BluetoothHfp,
    BluetoothLe,
    LineOut,
    Hdmi,
    AirPlay,
    Usb,
    CarAudio,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescription {
    pub port_type: PortType,
    #[serde(default)]
    pub name: String,
}

impl PortDescription {
    pub fn new(port_type: PortType, name: impl Into<String>) -> Self {
        Self {
            port_type,
            name: name.into(),
        }
    }
}

/// The set of outputs audio is currently routed to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioRoute {
    #[serde(default)]
    pub outputs: Vec<PortDescription>,
}

impl AudioRoute {
    pub fn new(outputs: Vec<PortDescription>) -> Self {
        Self { outputs }
    }

    pub fn speaker() -> Self {
        Self::new(vec![PortDescription::new(PortType::BuiltInSpeaker, "Speaker")])
    }

    pub fn headphones() -> Self {
        Self::new(vec![PortDescription::new(PortType::Headphones, "Headphones")])
    }

    /// Whether any output is wired headphones
    pub fn has_headphones(&self) -> bool {
        self.outputs
            .iter()
            .any(|port| port.port_type == PortType::Headphones)
    }
}
