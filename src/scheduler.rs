//! Cooperative relay loop
//!
//! Each iteration visits every channel once, in table order. A visit drains the bytes
//! the channel had buffered when the visit started into the diagnostic sink, flushing
//! after every byte, then fires the channel's heartbeat if its interval elapsed.
//! Flushing per byte makes the diagnostic sink the pace of the whole relay; that is
//! the intended trade of throughput for visibility.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::descriptor::{ChannelId, MAX_CHANNELS};
use crate::error::ConfigError;
use crate::serial::{ChannelState, SerialPort};
use crate::{log_debug, log_warn};

/// Monotonic millisecond clock. Wraps at `u32::MAX`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Append-only output for relayed bytes and status text
pub trait DiagnosticSink {
    /// The host side is connected
    fn is_ready(&self) -> bool;

    fn write_byte(&mut self, byte: u8);

    fn flush(&mut self);

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }
}

/// `core::fmt::Write` adapter over a [`DiagnosticSink`]
pub struct DiagnosticWriter<'a, D: DiagnosticSink + ?Sized>(pub &'a mut D);

impl<D: DiagnosticSink + ?Sized> Write for DiagnosticWriter<'_, D> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Value carried by a channel's heartbeat line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeartbeatCounter {
    /// 1, 2, 3, ... per channel
    Sequence,
    /// The channel's interrupt-service count at firing time
    ServiceCount,
}

/// Per-channel periodic timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub last_fire_ms: u32,
    pub interval_ms: u32,
}

impl TimerState {
    pub const fn new(now_ms: u32, interval_ms: u32) -> Self {
        Self {
            last_fire_ms: now_ms,
            interval_ms,
        }
    }

    /// Wraparound-safe elapsed check
    pub const fn is_due(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_fire_ms) >= self.interval_ms
    }

    pub fn fire(&mut self, now_ms: u32) {
        self.last_fire_ms = now_ms;
    }
}

const HEARTBEAT_LEN: usize = 32;

struct Slot<'a> {
    port: &'a dyn SerialPort,
    timer: TimerState,
    fired: u32,
}

/// What one [`Scheduler::poll`] did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub relayed: usize,
    pub heartbeats: usize,
}

/// Loop context: owns every channel's timer and heartbeat counter
pub struct Scheduler<'a> {
    slots: Vec<Slot<'a>, MAX_CHANNELS>,
    start_ms: u32,
}

impl<'a> Scheduler<'a> {
    pub fn new(start_ms: u32) -> Self {
        Self {
            slots: Vec::new(),
            start_ms,
        }
    }

    /// Adds a channel; its first heartbeat is due one interval after `start_ms`
    pub fn add(&mut self, port: &'a dyn SerialPort) -> Result<(), ConfigError> {
        let timer = TimerState::new(self.start_ms, port.config().interval_ms);
        self.slots
            .push(Slot {
                port,
                timer,
                fired: 0,
            })
            .map_err(|_| ConfigError::TooManyChannels)
    }

    /// Heartbeats fired so far by `channel`
    pub fn fired(&self, channel: ChannelId) -> u32 {
        self.slots
            .iter()
            .find(|s| s.port.id() == channel)
            .map(|s| s.fired)
            .unwrap_or(0)
    }

    pub fn timer(&self, channel: ChannelId) -> Option<TimerState> {
        self.slots
            .iter()
            .find(|s| s.port.id() == channel)
            .map(|s| s.timer)
    }

    /// One pass over every channel
    pub fn poll<C, D>(&mut self, clock: &C, diag: &mut D) -> PollSummary
    where
        C: Clock + ?Sized,
        D: DiagnosticSink + ?Sized,
    {
        let mut summary = PollSummary::default();
        for slot in self.slots.iter_mut() {
            if slot.port.state() != ChannelState::Active {
                continue;
            }
            summary.relayed += drain(slot.port, diag);
            if fire_heartbeat(slot, clock.now_ms(), diag) {
                summary.heartbeats += 1;
            }
        }
        summary
    }

    pub fn run<C, D>(&mut self, clock: &C, diag: &mut D) -> !
    where
        C: Clock + ?Sized,
        D: DiagnosticSink + ?Sized,
    {
        loop {
            self.poll(clock, diag);
        }
    }
}

fn drain<D: DiagnosticSink + ?Sized>(port: &dyn SerialPort, diag: &mut D) -> usize {
    // bytes arriving during the visit wait for the next pass
    let pending = port.available();
    let mut relayed = 0;
    while relayed < pending {
        match port.read_byte() {
            Ok(byte) => {
                diag.write_byte(byte);
                diag.flush();
                relayed += 1;
            }
            Err(_) => break,
        }
    }
    relayed
}

fn fire_heartbeat<D: DiagnosticSink + ?Sized>(slot: &mut Slot<'_>, now_ms: u32, diag: &mut D) -> bool {
    if !slot.timer.is_due(now_ms) {
        return false;
    }

    let config = slot.port.config();
    let value = match config.counter {
        HeartbeatCounter::Sequence => slot.fired.wrapping_add(1),
        HeartbeatCounter::ServiceCount => slot.port.service_count(),
    };

    let _ = write!(
        DiagnosticWriter(&mut *diag),
        "\nWriting {} to {}\n",
        value,
        config.name
    );
    diag.flush();

    let mut line: String<HEARTBEAT_LEN> = String::new();
    if write!(line, "{}: {}\n", config.name, value).is_err() {
        log_warn!("heartbeat line for {} truncated", config.name);
    }
    if let Err(e) = slot.port.write_and_flush(line.as_bytes()) {
        log_warn!("{} heartbeat not sent: {:?}", config.name, e);
    }
    log_debug!("{} heartbeat {} at {} ms", config.name, value, now_ms);

    slot.fired = slot.fired.wrapping_add(1);
    slot.timer.fire(now_ms);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_threshold() {
        let t = TimerState::new(1_000, 500);
        assert!(!t.is_due(1_499));
        assert!(t.is_due(1_500));
        assert!(t.is_due(1_501));
    }

    #[test]
    fn timer_across_clock_wrap() {
        let t = TimerState::new(u32::MAX - 99, 200);
        // 199 ms elapsed, counter wrapped
        assert!(!t.is_due(99));
        assert!(t.is_due(100));
        assert!(t.is_due(101));
    }

    #[test]
    fn fire_resets_to_firing_time() {
        let mut t = TimerState::new(0, 1_000);
        t.fire(1_003);
        assert_eq!(t.last_fire_ms, 1_003);
        assert!(!t.is_due(2_002));
        assert!(t.is_due(2_003));
    }

    #[test]
    fn sequence_counter_wraps_instead_of_overflowing() {
        use crate::board::XIAO_THREE_USARTS;
        use crate::loopback::{LoopbackConsole, LoopbackModule};
        use crate::serial::SerialChannel;

        let caps = XIAO_THREE_USARTS.claim().unwrap();
        let module = LoopbackModule::new(crate::board::SERCOM4);
        let channel: SerialChannel<_, 8> =
            SerialChannel::new(caps.into_iter().next().unwrap(), &module);
        channel.initialize(115_200);

        let mut slot = Slot {
            port: &channel,
            timer: TimerState::new(0, 1_000),
            fired: u32::MAX,
        };
        let mut console = LoopbackConsole::new();
        assert!(fire_heartbeat(&mut slot, 1_000, &mut console));

        assert_eq!(slot.fired, 0);
        assert_eq!(console.text(), "\nWriting 0 to Serial1\n");
        assert_eq!(module.transmitted(), "Serial1: 0\n".len() as u32);
    }

    #[test]
    fn writer_forwards_formatted_text() {
        struct Capture(std::vec::Vec<u8>);
        impl DiagnosticSink for Capture {
            fn is_ready(&self) -> bool {
                true
            }
            fn write_byte(&mut self, byte: u8) {
                self.0.push(byte);
            }
            fn flush(&mut self) {}
        }

        let mut sink = Capture(std::vec::Vec::new());
        write!(DiagnosticWriter(&mut sink), "{}-{}", 1, "a").unwrap();
        assert_eq!(sink.0, b"1-a");
    }
}
