//! Channel bring-up
//!
//! Brings every channel up in table order, applying the deployment's [`InitOrder`]
//! between module enable and pin routing. A channel whose pins cannot be routed is
//! faulted and reported; the remaining channels come up normally.

use core::fmt::Write;

use heapless::Vec;

use crate::descriptor::{ChannelId, MAX_CHANNELS};
use crate::error::RoutingError;
use crate::pin_router::{route_channel, InitOrder, PinMux, PinRoutingResult};
use crate::scheduler::{Clock, DiagnosticSink, DiagnosticWriter};
use crate::serial::SerialPort;
use crate::{log_error, log_info, log_warn};

/// Cap on the wait for the diagnostic channel to come up
pub const READY_TIMEOUT_MS: u32 = 10_000;

/// Blocks until `diag` is ready or `timeout_ms` elapsed. Returns readiness.
pub fn wait_until_ready<D, C>(diag: &D, clock: &C, timeout_ms: u32) -> bool
where
    D: DiagnosticSink + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now_ms();
    loop {
        if diag.is_ready() {
            return true;
        }
        if clock.now_ms().wrapping_sub(start) >= timeout_ms {
            log_warn!("diagnostic channel not ready after {} ms, continuing", timeout_ms);
            return false;
        }
        core::hint::spin_loop();
    }
}

/// A pin that could not be routed during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupFailure {
    pub channel: ChannelId,
    pub error: RoutingError,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub failures: Vec<SetupFailure, { 2 * MAX_CHANNELS }>,
}

impl SetupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, channel: ChannelId) -> bool {
        self.failures.iter().any(|f| f.channel == channel)
    }

    /// Writes the error summary, one line per failed pin
    pub fn write_to<D: DiagnosticSink + ?Sized>(&self, diag: &mut D) {
        let mut out = DiagnosticWriter(diag);
        let errors = self.failures.len();
        if errors == 0 {
            let _ = out.write_str("\nInitialized all serial ports without error.\n");
            return;
        }
        let _ = write!(
            out,
            "** {} error{} while setting up the serial ports **\n",
            errors,
            if errors > 1 { "s" } else { "" }
        );
        for failure in &self.failures {
            let _ = match failure.error {
                RoutingError::Unsupported { pin, function } => write!(
                    out,
                    "  Pin {} could not be reassigned to {:?}\n",
                    pin.0, function
                ),
                RoutingError::WrongModule { pin, module } => write!(
                    out,
                    "  Pin {} is not connected to module {}\n",
                    pin.0, module.0
                ),
                RoutingError::Rejected { pin } => {
                    write!(out, "  Pin {} could not be reassigned\n", pin.0)
                }
            };
        }
    }
}

/// Brings one channel up following `order`. The channel is faulted on routing failure.
pub fn bring_up<P>(port: &dyn SerialPort, mux: &mut P, order: InitOrder, baud: u32) -> PinRoutingResult
where
    P: PinMux + ?Sized,
{
    let config = port.config();
    let routing = match order {
        InitOrder::InitThenRoute => {
            port.initialize(baud);
            route_channel(mux, config)
        }
        InitOrder::RouteThenInit => {
            let routing = route_channel(mux, config);
            if routing.is_ok() {
                port.initialize(baud);
            }
            routing
        }
    };

    if !routing.is_ok() {
        port.fault();
        for e in &routing.failures {
            log_error!("{}: pin routing failed: {:?}", config.name, e);
        }
    }
    routing
}

/// Brings up all `ports`, reporting progress and failures on `diag`
pub fn setup<P, D>(
    ports: &[&dyn SerialPort],
    mux: &mut P,
    order: InitOrder,
    baud: u32,
    diag: &mut D,
) -> SetupReport
where
    P: PinMux + ?Sized,
    D: DiagnosticSink + ?Sized,
{
    log_info!("bringing up {} channels, order {:?}", ports.len(), order);

    let mut report = SetupReport::default();
    for port in ports {
        let _ = write!(
            DiagnosticWriter(&mut *diag),
            "Setting up {}\n",
            port.config().name
        );
        let routing = bring_up(*port, mux, order, baud);
        for error in routing.failures {
            // two pins per channel, sized for MAX_CHANNELS
            let _ = report.failures.push(SetupFailure {
                channel: port.id(),
                error,
            });
        }
    }

    report.write_to(diag);
    let _ = DiagnosticWriter(&mut *diag).write_str("Setup completed, starting loop\n");
    diag.flush();
    report
}
