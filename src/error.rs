use crate::descriptor::{ChannelId, ModuleId, ModuleRole, Pin};
use crate::pin_router::PinFunction;

/// Deployment table conflicts. All of these are fatal at build or startup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Two channels claim the same shared module
    DuplicateModule { module: ModuleId },
    /// A pin is used twice, across channels or as both rx and tx of one channel
    DuplicatePin { pin: Pin },
    /// A channel claims a module held by another subsystem
    ModuleReserved { module: ModuleId, role: ModuleRole },
    /// Module id outside the dispatch table
    ModuleOutOfRange { module: ModuleId },
    UnknownChannel { channel: ChannelId },
    TooManyChannels,
}

/// Pin-function routing failure for a single pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoutingError {
    /// The pin has no such function on this chip
    Unsupported { pin: Pin, function: PinFunction },
    /// The function exists but is wired to a different module than the channel's
    WrongModule { pin: Pin, module: ModuleId },
    /// The pin mux refused the request
    Rejected { pin: Pin },
}

impl RoutingError {
    pub fn pin(&self) -> Pin {
        match *self {
            RoutingError::Unsupported { pin, .. } => pin,
            RoutingError::WrongModule { pin, .. } => pin,
            RoutingError::Rejected { pin } => pin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelError {
    /// `read_byte` on an empty receive queue
    Empty,
    /// Transmit on a channel that never came up or was faulted by setup
    NotActive,
}
