//! Serial relay over shared microcontroller communication modules
//!
//! Several logical serial channels are mapped onto shared hardware modules, their pins
//! routed away from the modules' default peripherals, and relayed into one diagnostic
//! channel by a cooperative loop that also sends a periodic heartbeat on every channel.
//!
//! Data path: module interrupt -> [`dispatch::InterruptTable`] -> channel receive queue
//! -> [`scheduler::Scheduler`] drain -> diagnostic sink.

#![cfg_attr(not(test), no_std)]

pub mod log;

pub mod board;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod loopback;
pub mod pin_router;
pub mod rx_queue;
pub mod scheduler;
pub mod serial;
pub mod startup;

#[cfg(feature = "rp2350")]
pub mod rp2350;

pub use descriptor::{ChannelConfig, ChannelId, Deployment, ModuleId, Pad, Pin, SerialCapability};
pub use dispatch::{InterruptService, InterruptTable};
pub use error::{ChannelError, ConfigError, RoutingError};
pub use pin_router::{InitOrder, PinFunction, PinMux};
pub use scheduler::{Clock, DiagnosticSink, Scheduler, TimerState};
pub use serial::{SerialChannel, SerialModule, SerialPort};
