//! Peripheral descriptors
//!
//! Each logical serial channel is bound at compile time to one shared hardware module,
//! an rx/tx pin pair, and the module-internal pad for each direction. A [`Deployment`]
//! groups the channels of one build together with the modules that other subsystems
//! hold, and is checked by [`Deployment::validate`], a `const fn`, so a conflicting
//! table fails to compile when the board module asserts it.

use heapless::Vec;

use crate::error::ConfigError;
use crate::pin_router::{InitOrder, PinFunction};
use crate::scheduler::HeartbeatCounter;

/// Upper bound on channels per deployment
pub const MAX_CHANNELS: usize = 8;

/// Number of shared module slots known to the dispatch table
pub const MAX_MODULES: usize = 8;

/// Shared hardware module instance (SERCOMn, UARTn, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleId(pub u8);

impl ModuleId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Physical pin, numbered the way the board's pin table numbers it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin(pub u8);

/// Index of a channel within its deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(pub u8);

/// Module-internal data path connecting a serial signal to a pin route
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pad {
    Pad0 = 0,
    Pad1 = 1,
    Pad2 = 2,
    Pad3 = 3,
}

/// What a shared module is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModuleRole {
    Serial,
    Spi,
    I2c,
    Swd,
    /// Log console (defmt transport)
    Console,
}

/// A module held by a subsystem other than the serial relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub module: ModuleId,
    pub role: ModuleRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Tag used in heartbeat lines and setup messages
    pub name: &'static str,
    pub module: ModuleId,
    pub rx_pin: Pin,
    pub tx_pin: Pin,
    pub rx_pad: Pad,
    pub tx_pad: Pad,
    /// Function both pins are routed to
    pub function: PinFunction,
    pub interval_ms: u32,
    pub counter: HeartbeatCounter,
}

#[derive(Debug, Clone, Copy)]
pub struct Deployment {
    pub name: &'static str,
    pub channels: &'static [ChannelConfig],
    pub reserved: &'static [Reservation],
    pub order: InitOrder,
    pub baud: u32,
}

impl Deployment {
    /// Checks module, pin and reservation disjointness.
    ///
    /// Usable in const context: `const _: () = assert!(DEPLOYMENT.validate().is_ok());`
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.len() > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels);
        }

        let mut i = 0;
        while i < self.channels.len() {
            let a = &self.channels[i];

            if a.module.index() >= MAX_MODULES {
                return Err(ConfigError::ModuleOutOfRange { module: a.module });
            }
            if a.rx_pin.0 == a.tx_pin.0 {
                return Err(ConfigError::DuplicatePin { pin: a.rx_pin });
            }

            let mut r = 0;
            while r < self.reserved.len() {
                if self.reserved[r].module.0 == a.module.0 {
                    return Err(ConfigError::ModuleReserved {
                        module: a.module,
                        role: self.reserved[r].role,
                    });
                }
                r += 1;
            }

            let mut j = i + 1;
            while j < self.channels.len() {
                let b = &self.channels[j];
                if a.module.0 == b.module.0 {
                    return Err(ConfigError::DuplicateModule { module: b.module });
                }
                if b.rx_pin.0 == a.rx_pin.0 || b.rx_pin.0 == a.tx_pin.0 {
                    return Err(ConfigError::DuplicatePin { pin: b.rx_pin });
                }
                if b.tx_pin.0 == a.rx_pin.0 || b.tx_pin.0 == a.tx_pin.0 {
                    return Err(ConfigError::DuplicatePin { pin: b.tx_pin });
                }
                j += 1;
            }
            i += 1;
        }
        Ok(())
    }

    pub fn describe(&self, channel: ChannelId) -> Result<&'static ChannelConfig, ConfigError> {
        self.channels
            .get(channel.0 as usize)
            .ok_or(ConfigError::UnknownChannel { channel })
    }

    /// Validates the table and issues one serial capability per channel.
    ///
    /// A [`crate::serial::SerialChannel`] can only be built from a capability, so every
    /// running channel is backed by a module that passed validation.
    pub fn claim(&self) -> Result<Vec<SerialCapability, MAX_CHANNELS>, ConfigError> {
        self.validate()?;

        let mut caps = Vec::new();
        for (index, config) in self.channels.iter().enumerate() {
            caps.push(SerialCapability {
                id: ChannelId(index as u8),
                config,
            })
            .map_err(|_| ConfigError::TooManyChannels)?;
        }
        Ok(caps)
    }

    pub fn role_of(&self, module: ModuleId) -> Option<ModuleRole> {
        if self.channels.iter().any(|c| c.module == module) {
            return Some(ModuleRole::Serial);
        }
        self.reserved
            .iter()
            .find(|r| r.module == module)
            .map(|r| r.role)
    }
}

/// Proof that a module was granted the serial role by a validated deployment
#[derive(Debug)]
pub struct SerialCapability {
    id: ChannelId,
    config: &'static ChannelConfig,
}

impl SerialCapability {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn config(&self) -> &'static ChannelConfig {
        self.config
    }
}
