//! Software loopback backend
//!
//! Stands in for the board: modules whose transmit side drives another module's
//! receive register, a pin mux that can be told to refuse pins, a settable clock and
//! a capturing diagnostic console. The relay ring can run end to end on the host
//! with it, with interrupts delivered by calling the dispatch table explicitly.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, Vec};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::descriptor::{ModuleId, Pad, Pin};
use crate::dispatch::InterruptTable;
use crate::error::RoutingError;
use crate::pin_router::{PinFunction, PinMux};
use crate::scheduler::{Clock, DiagnosticSink};
use crate::serial::SerialModule;

/// Receive register depth. Deeper than real hardware so tests can defer
/// interrupt delivery across a whole burst.
pub const LOOPBACK_FIFO_DEPTH: usize = 256;

struct Line<'a> {
    settings: Option<(u32, Pad, Pad)>,
    fifo: Deque<u8, LOOPBACK_FIFO_DEPTH>,
    pending: bool,
    dropped: u32,
    transmitted: u32,
    peer: Option<&'a LoopbackModule<'a>>,
}

pub struct LoopbackModule<'a> {
    module: ModuleId,
    line: Mutex<CriticalSectionRawMutex, RefCell<Line<'a>>>,
}

impl<'a> LoopbackModule<'a> {
    pub const fn new(module: ModuleId) -> Self {
        Self {
            module,
            line: Mutex::new(RefCell::new(Line {
                settings: None,
                fifo: Deque::new(),
                pending: false,
                dropped: 0,
                transmitted: 0,
                peer: None,
            })),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.module
    }

    /// Wire this module's tx to `peer`'s rx
    pub fn connect(&self, peer: &'a LoopbackModule<'a>) {
        self.line.lock(|l| l.borrow_mut().peer = Some(peer));
    }

    /// Bytes arriving on the rx pin. Ignored while the module is disabled.
    pub fn inject(&self, bytes: &[u8]) {
        self.line.lock(|l| {
            let mut line = l.borrow_mut();
            if line.settings.is_none() {
                return;
            }
            for &b in bytes {
                if line.fifo.push_back(b).is_err() {
                    line.dropped += 1;
                }
            }
            line.pending = !line.fifo.is_empty();
        });
    }

    pub fn interrupt_pending(&self) -> bool {
        self.line.lock(|l| l.borrow().pending)
    }

    pub fn line_settings(&self) -> Option<(u32, Pad, Pad)> {
        self.line.lock(|l| l.borrow().settings)
    }

    pub fn transmitted(&self) -> u32 {
        self.line.lock(|l| l.borrow().transmitted)
    }

    /// Bytes lost because the receive register was full
    pub fn dropped(&self) -> u32 {
        self.line.lock(|l| l.borrow().dropped)
    }
}

impl SerialModule for LoopbackModule<'_> {
    fn enable(&self, baud: u32, rx_pad: Pad, tx_pad: Pad) {
        self.line
            .lock(|l| l.borrow_mut().settings = Some((baud, rx_pad, tx_pad)));
    }

    fn read_received(&self) -> Option<u8> {
        self.line.lock(|l| l.borrow_mut().fifo.pop_front())
    }

    fn clear_interrupt(&self) {
        self.line.lock(|l| {
            let mut line = l.borrow_mut();
            line.pending = !line.fifo.is_empty();
        });
    }

    fn write_byte(&self, byte: u8) {
        let peer = self.line.lock(|l| {
            let mut line = l.borrow_mut();
            line.transmitted += 1;
            line.peer
        });
        if let Some(peer) = peer {
            peer.inject(&[byte]);
        }
    }

    fn flush(&self) {}
}

/// Delivers every pending receive interrupt through `table`, like the NVIC would.
/// Returns how many interrupts were delivered.
pub fn deliver_interrupts(modules: &[&LoopbackModule<'_>], table: &InterruptTable<'_>) -> usize {
    let mut delivered = 0;
    for module in modules {
        if module.interrupt_pending() {
            table.dispatch(module.id());
            delivered += 1;
        }
    }
    delivered
}

/// Pin mux that accepts every request except for pins it was told to refuse
#[derive(Default)]
pub struct LoopbackPinMux {
    refused: Vec<Pin, 8>,
    routed: Vec<(Pin, PinFunction), 32>,
}

impl LoopbackPinMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(mut self, pin: Pin) -> Self {
        let _ = self.refused.push(pin);
        self
    }

    /// Current function of `pin`, if it was routed
    pub fn function_of(&self, pin: Pin) -> Option<PinFunction> {
        self.routed
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, f)| *f)
    }

    pub fn route_calls(&self) -> usize {
        self.routed.len()
    }
}

impl PinMux for LoopbackPinMux {
    fn route(&mut self, pin: Pin, function: PinFunction) -> Result<(), RoutingError> {
        if self.refused.contains(&pin) {
            return Err(RoutingError::Unsupported { pin, function });
        }
        let _ = self.routed.push((pin, function));
        Ok(())
    }
}

/// Settable millisecond clock, optionally advancing on every read
pub struct LoopbackClock {
    now: AtomicU32,
    step: u32,
}

impl LoopbackClock {
    pub const fn new(now_ms: u32) -> Self {
        Self::ticking(now_ms, 0)
    }

    pub const fn ticking(now_ms: u32, step_ms: u32) -> Self {
        Self {
            now: AtomicU32::new(now_ms),
            step: step_ms,
        }
    }

    pub fn set(&self, now_ms: u32) {
        self.now.store(now_ms, Ordering::Relaxed);
    }

    pub fn advance(&self, ms: u32) {
        // wraps like the hardware counter
        let _ = self
            .now
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| Some(t.wrapping_add(ms)));
    }
}

impl Clock for LoopbackClock {
    fn now_ms(&self) -> u32 {
        let now = self.now.load(Ordering::Relaxed);
        if self.step != 0 {
            self.advance(self.step);
        }
        now
    }
}

pub const CONSOLE_CAPACITY: usize = 4096;

/// Diagnostic sink that keeps everything written to it
pub struct LoopbackConsole {
    ready: AtomicBool,
    out: Vec<u8, CONSOLE_CAPACITY>,
    flushes: u32,
}

impl LoopbackConsole {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            out: Vec::new(),
            flushes: 0,
        }
    }

    pub fn never_ready() -> Self {
        let console = Self::new();
        console.ready.store(false, Ordering::Relaxed);
        console
    }

    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    /// Output as text; invalid UTF-8 yields an empty string
    pub fn text(&self) -> &str {
        core::str::from_utf8(&self.out).unwrap_or("")
    }

    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    pub fn clear(&mut self) {
        self.out.clear();
        self.flushes = 0;
    }
}

impl Default for LoopbackConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for LoopbackConsole {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn write_byte(&mut self, byte: u8) {
        let _ = self.out.push(byte);
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}
