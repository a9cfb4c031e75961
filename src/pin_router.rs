//! Pin-function routing
//!
//! A pin is driven by its default peripheral until the pin mux hands it to the
//! function a shared module needs. Whether that hand-over has to happen before or
//! after the module is enabled depends on the chip and pin/pad combination, so it is
//! a deployment constant ([`InitOrder`]) rather than something the code decides.

use heapless::Vec;

use crate::descriptor::{ChannelConfig, Pin};
use crate::error::RoutingError;

/// Multiplexer function a pin is switched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinFunction {
    /// The module's primary pin function (SAMD `PIO_SERCOM`, RP2350 `F2` UART)
    Primary,
    /// The module's alternate pin function (SAMD `PIO_SERCOM_ALT`, RP2350 `F11` UART aux)
    Alternate,
}

/// Order of module enable and pin routing during channel bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitOrder {
    RouteThenInit,
    InitThenRoute,
}

pub trait PinMux {
    /// Switch `pin` to `function`.
    ///
    /// Must be idempotent: repeating the call re-asserts the same routing.
    fn route(&mut self, pin: Pin, function: PinFunction) -> Result<(), RoutingError>;
}

impl<T: PinMux + ?Sized> PinMux for &mut T {
    fn route(&mut self, pin: Pin, function: PinFunction) -> Result<(), RoutingError> {
        (**self).route(pin, function)
    }
}

/// Outcome of routing both pins of one channel, tx first like the board tables list them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRoutingResult {
    pub failures: Vec<RoutingError, 2>,
}

impl PinRoutingResult {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Routes the tx and rx pin of `config`, attempting both even if the first fails.
pub fn route_channel<M: PinMux + ?Sized>(mux: &mut M, config: &ChannelConfig) -> PinRoutingResult {
    let mut failures = Vec::new();
    for pin in [config.tx_pin, config.rx_pin] {
        if let Err(e) = mux.route(pin, config.function) {
            // capacity is exactly two pins
            let _ = failures.push(e);
        }
    }
    PinRoutingResult { failures }
}
