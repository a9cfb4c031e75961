//! Logical serial channels backed by shared hardware modules

use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::descriptor::{ChannelConfig, ChannelId, ModuleId, Pad, SerialCapability};
use crate::dispatch::InterruptService;
use crate::error::ChannelError;
use crate::rx_queue::RxQueue;

/// Receive queue depth per channel, same as the Arduino core's serial ring buffer
pub const RX_QUEUE_CAPACITY: usize = 64;

/// Register-level access to one shared module running in asynchronous serial mode.
///
/// Methods take `&self` because the interrupt handler and the scheduler loop touch
/// disjoint registers of the same module concurrently.
pub trait SerialModule {
    /// Put the module in asynchronous serial mode and unmask its receive interrupt
    fn enable(&self, baud: u32, rx_pad: Pad, tx_pad: Pad);

    /// Pop one byte from the receive data register, if any
    fn read_received(&self) -> Option<u8>;

    /// Acknowledge the pending receive interrupt
    fn clear_interrupt(&self);

    /// Blocks until the transmit data register accepts `byte`
    fn write_byte(&self, byte: u8);

    /// Blocks until the last byte has left the shift register
    fn flush(&self);
}

impl<T: SerialModule + ?Sized> SerialModule for &T {
    fn enable(&self, baud: u32, rx_pad: Pad, tx_pad: Pad) {
        (**self).enable(baud, rx_pad, tx_pad)
    }

    fn read_received(&self) -> Option<u8> {
        (**self).read_received()
    }

    fn clear_interrupt(&self) {
        (**self).clear_interrupt()
    }

    fn write_byte(&self, byte: u8) {
        (**self).write_byte(byte)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    Uninitialized = 0,
    Active = 1,
    /// Setup could not route the channel's pins
    Faulted = 2,
}

impl ChannelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ChannelState::Active,
            2 => ChannelState::Faulted,
            _ => ChannelState::Uninitialized,
        }
    }
}

/// Object-safe view of a channel, used by setup and the scheduler loop
pub trait SerialPort {
    fn id(&self) -> ChannelId;
    fn config(&self) -> &'static ChannelConfig;
    fn state(&self) -> ChannelState;
    fn initialize(&self, baud: u32);
    /// Leave the channel non-functional; it is skipped from then on
    fn fault(&self);
    fn available(&self) -> usize;
    fn read_byte(&self) -> Result<u8, ChannelError>;
    /// Transmits `byte` and blocks until the module reports transmit complete
    fn write_byte(&self, byte: u8) -> Result<(), ChannelError>;
    /// Transmits `bytes` and blocks until the module reports transmit complete
    fn write_and_flush(&self, bytes: &[u8]) -> Result<(), ChannelError>;
    /// Number of times the interrupt handler ran
    fn service_count(&self) -> u32;
    /// Received bytes dropped on a full queue
    fn overruns(&self) -> u32;
}

pub struct SerialChannel<M, const N: usize = RX_QUEUE_CAPACITY> {
    id: ChannelId,
    config: &'static ChannelConfig,
    module: M,
    rx: RxQueue<N>,
    state: AtomicU8,
    serviced: AtomicU32,
}

impl<M: SerialModule, const N: usize> SerialChannel<M, N> {
    pub fn new(capability: SerialCapability, module: M) -> Self {
        Self {
            id: capability.id(),
            config: capability.config(),
            module,
            rx: RxQueue::new(),
            state: AtomicU8::new(ChannelState::Uninitialized as u8),
            serviced: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn module(&self) -> &M {
        &self.module
    }
}

impl<M: SerialModule, const N: usize> SerialPort for SerialChannel<M, N> {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn config(&self) -> &'static ChannelConfig {
        self.config
    }

    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn initialize(&self, baud: u32) {
        self.module
            .enable(baud, self.config.rx_pad, self.config.tx_pad);
        // a fault recorded before init (route-then-init) sticks
        let _ = self.state.compare_exchange(
            ChannelState::Uninitialized as u8,
            ChannelState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn fault(&self) {
        self.state
            .store(ChannelState::Faulted as u8, Ordering::Release);
    }

    fn available(&self) -> usize {
        self.rx.len()
    }

    fn read_byte(&self) -> Result<u8, ChannelError> {
        self.rx.pop().ok_or(ChannelError::Empty)
    }

    fn write_byte(&self, byte: u8) -> Result<(), ChannelError> {
        if self.state() != ChannelState::Active {
            return Err(ChannelError::NotActive);
        }
        self.module.write_byte(byte);
        self.module.flush();
        Ok(())
    }

    fn write_and_flush(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.state() != ChannelState::Active {
            return Err(ChannelError::NotActive);
        }
        for &byte in bytes {
            self.module.write_byte(byte);
        }
        self.module.flush();
        Ok(())
    }

    fn service_count(&self) -> u32 {
        self.serviced.load(Ordering::Relaxed)
    }

    fn overruns(&self) -> u32 {
        self.rx.overruns()
    }
}

impl<M: SerialModule, const N: usize> InterruptService for SerialChannel<M, N> {
    fn module_id(&self) -> ModuleId {
        self.config.module
    }

    fn on_interrupt(&self) {
        self.serviced.fetch_add(1, Ordering::Relaxed);
        while let Some(byte) = self.module.read_received() {
            // overflow is counted inside the queue
            self.rx.push(byte);
        }
        self.module.clear_interrupt();
    }
}
