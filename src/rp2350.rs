//! RP2350 backend: PL011 UARTs driven at register level, IO bank function select as
//! the pin mux, the embassy time driver as clock and defmt as diagnostic sink.

use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::pac;
use embassy_time::Instant;
use heapless::Vec;

use crate::board::rp2350_uart_lane;
use crate::descriptor::{ModuleId, Pad, Pin};
use crate::error::RoutingError;
use crate::pin_router::{PinFunction, PinMux};
use crate::scheduler::{Clock, DiagnosticSink};
use crate::serial::SerialModule;

const FUNCSEL_UART: u8 = 2;
const FUNCSEL_UART_AUX: u8 = 11;
const BANK0_PINS: u8 = 48;

pub struct Rp2350Uart {
    module: ModuleId,
    regs: pac::uart::Uart,
}

impl Rp2350Uart {
    pub fn new(module: ModuleId) -> Self {
        let regs = if module.0 == 0 { pac::UART0 } else { pac::UART1 };
        Self { module, regs }
    }

    fn unreset(&self) {
        let resets = pac::RESETS;
        let uart0 = self.module.0 == 0;
        resets.reset().modify(|r| {
            if uart0 {
                r.set_uart0(false)
            } else {
                r.set_uart1(false)
            }
        });
        loop {
            let done = resets.reset_done().read();
            if (uart0 && done.uart0()) || (!uart0 && done.uart1()) {
                break;
            }
            core::hint::spin_loop();
        }
    }
}

fn unmask<I: InterruptExt>(irq: I) {
    irq.unpend();
    irq.set_priority(Priority::P1);
    unsafe { cortex_m::peripheral::NVIC::unmask(irq) };
}

/// PL011 integer and fractional divisors for `baud`
fn baud_divisors(clk_peri: u32, baud: u32) -> (u16, u8) {
    let div = 8 * clk_peri / baud;
    let ibrd = div >> 7;
    if ibrd == 0 {
        (1, 0)
    } else if ibrd >= 65535 {
        (65535, 0)
    } else {
        (ibrd as u16, (((div & 0x7f) + 1) / 2) as u8)
    }
}

impl SerialModule for Rp2350Uart {
    fn enable(&self, baud: u32, _rx_pad: Pad, _tx_pad: Pad) {
        // lanes are fixed by the pin on RP2350; the pads only matter to the pin mux
        self.unreset();

        let (ibrd, fbrd) = baud_divisors(embassy_rp::clocks::clk_peri_freq(), baud);
        let r = self.regs;
        r.uartibrd().write(|w| w.set_baud_divint(ibrd));
        r.uartfbrd().write(|w| w.set_baud_divfrac(fbrd));
        // lcr_h write latches the divisors
        r.uartlcr_h().write(|w| {
            w.set_wlen(0b11);
            w.set_fen(true);
        });
        r.uartimsc().write(|w| {
            w.set_rxim(true);
            w.set_rtim(true);
        });
        r.uartcr().write(|w| {
            w.set_uarten(true);
            w.set_txe(true);
            w.set_rxe(true);
        });

        if self.module.0 == 0 {
            unmask(embassy_rp::interrupt::UART0_IRQ);
        } else {
            unmask(embassy_rp::interrupt::UART1_IRQ);
        }
    }

    fn read_received(&self) -> Option<u8> {
        if self.regs.uartfr().read().rxfe() {
            return None;
        }
        // framing/parity flags are ignored: raw byte transport
        Some(self.regs.uartdr().read().data())
    }

    fn clear_interrupt(&self) {
        self.regs.uarticr().write(|w| {
            w.set_rxic(true);
            w.set_rtic(true);
            w.set_oeic(true);
        });
    }

    fn write_byte(&self, byte: u8) {
        while self.regs.uartfr().read().txff() {
            core::hint::spin_loop();
        }
        self.regs.uartdr().write(|w| w.set_data(byte));
    }

    fn flush(&self) {
        while self.regs.uartfr().read().busy() {
            core::hint::spin_loop();
        }
    }
}

/// IO bank 0 function select
pub struct Rp2350PinMux {
    expected: Vec<(Pin, ModuleId), 16>,
}

impl Rp2350PinMux {
    pub fn new() -> Self {
        Self {
            expected: Vec::new(),
        }
    }

    /// Routing `pin` must land on `module`; checked before touching the IO bank
    pub fn expect(&mut self, pin: Pin, module: ModuleId) {
        let _ = self.expected.push((pin, module));
    }
}

impl Default for Rp2350PinMux {
    fn default() -> Self {
        Self::new()
    }
}

impl PinMux for Rp2350PinMux {
    fn route(&mut self, pin: Pin, function: PinFunction) -> Result<(), RoutingError> {
        if pin.0 >= BANK0_PINS {
            return Err(RoutingError::Rejected { pin });
        }
        let (module, _lane) =
            rp2350_uart_lane(pin, function).ok_or(RoutingError::Unsupported { pin, function })?;
        if let Some(&(_, wanted)) = self.expected.iter().find(|(p, _)| *p == pin) {
            if wanted != module {
                return Err(RoutingError::WrongModule { pin, module });
            }
        }

        let funcsel = match function {
            PinFunction::Primary => FUNCSEL_UART,
            PinFunction::Alternate => FUNCSEL_UART_AUX,
        };
        let n = pin.0 as usize;
        pac::PADS_BANK0.gpio(n).modify(|w| {
            w.set_ie(true);
            w.set_od(false);
            w.set_pue(true);
            w.set_iso(false);
        });
        pac::IO_BANK0.gpio(n).ctrl().write(|w| w.set_funcsel(funcsel));
        Ok(())
    }
}

/// Milliseconds since boot from the embassy time driver, truncated to wrap at 2^32
pub struct UptimeClock;

impl Clock for UptimeClock {
    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }
}

const CONSOLE_LINE: usize = 96;

/// Diagnostic sink on top of defmt (carried by defmt-serial on the console UART).
///
/// defmt is frame oriented, so bytes are collected into lines and a frame is emitted
/// when a flush follows a newline or the line buffer is full.
pub struct DefmtConsole {
    line: Vec<u8, CONSOLE_LINE>,
}

impl DefmtConsole {
    pub const fn new() -> Self {
        Self { line: Vec::new() }
    }

    fn emit(&mut self) {
        let text = match self.line.last() {
            Some(b'\n') => &self.line[..self.line.len() - 1],
            _ => &self.line[..],
        };
        if !text.is_empty() {
            defmt::println!("{=[u8]:a}", text);
        }
        self.line.clear();
    }
}

impl Default for DefmtConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for DefmtConsole {
    fn is_ready(&self) -> bool {
        // defmt-serial blocks on the console UART, which is up before the relay starts
        true
    }

    fn write_byte(&mut self, byte: u8) {
        if self.line.push(byte).is_err() {
            self.emit();
            let _ = self.line.push(byte);
        }
    }

    fn flush(&mut self) {
        if self.line.last() == Some(&b'\n') || self.line.is_full() {
            self.emit();
        }
    }
}
