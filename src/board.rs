//! Deployment tables
//!
//! Every table is validated during compilation: a module or pin conflict turns into a
//! const-evaluation panic instead of a silently dead channel.
//!
//! Seeeduino XIAO (SAMD21G): module ids are SERCOM numbers, pins are the board's pin
//! table indices (A0..A10 = 0..10, SWCLK = 17, SWDIO = 18). Serial1 is the stock
//! SERCOM4 port. Serial2 takes SERCOM0 from SPI and Serial3 takes SERCOM2 from I2C,
//! so neither bus is available in these builds. SERCOM1 backs the SWD debug port
//! unless the four-port table takes it.
//!
//! Raspberry Pi Pico 2 (RP2350): module ids are UART numbers, pins are GPIO numbers.
//! UART1 carries the defmt console; UART0 is the relay channel, on its default pins
//! or, with the `alt-pins` feature, on the UART-aux pins GP2/GP3.

use crate::descriptor::{ChannelConfig, Deployment, ModuleId, ModuleRole, Pad, Pin, Reservation};
use crate::pin_router::{InitOrder, PinFunction};
use crate::scheduler::HeartbeatCounter;

pub const USART_BAUD: u32 = 115_200;

pub const SERCOM0: ModuleId = ModuleId(0);
pub const SERCOM1: ModuleId = ModuleId(1);
pub const SERCOM2: ModuleId = ModuleId(2);
pub const SERCOM4: ModuleId = ModuleId(4);

pub const UART0: ModuleId = ModuleId(0);
pub const UART1: ModuleId = ModuleId(1);

/// Init/route order selected at build time
pub const INIT_ORDER: InitOrder = if cfg!(feature = "init-before-route") {
    InitOrder::InitThenRoute
} else {
    InitOrder::RouteThenInit
};

const XIAO_SERIAL1: ChannelConfig = ChannelConfig {
    name: "Serial1",
    module: SERCOM4,
    rx_pin: Pin(7),
    tx_pin: Pin(6),
    rx_pad: Pad::Pad1,
    tx_pad: Pad::Pad0,
    function: PinFunction::Alternate,
    interval_ms: 1000,
    counter: HeartbeatCounter::Sequence,
};

const XIAO_SERIAL2: ChannelConfig = ChannelConfig {
    name: "Serial2",
    module: SERCOM0,
    rx_pin: Pin(9),
    tx_pin: Pin(10),
    rx_pad: Pad::Pad1,
    tx_pad: Pad::Pad2,
    function: PinFunction::Alternate,
    interval_ms: 1300,
    counter: HeartbeatCounter::Sequence,
};

const XIAO_SERIAL3: ChannelConfig = ChannelConfig {
    name: "Serial3",
    module: SERCOM2,
    rx_pin: Pin(5),
    tx_pin: Pin(4),
    rx_pad: Pad::Pad1,
    tx_pad: Pad::Pad0,
    function: PinFunction::Alternate,
    interval_ms: 1600,
    counter: HeartbeatCounter::Sequence,
};

const XIAO_SERIAL3_ALT: ChannelConfig = ChannelConfig {
    rx_pin: Pin(3),
    tx_pin: Pin(2),
    rx_pad: Pad::Pad3,
    tx_pad: Pad::Pad2,
    ..XIAO_SERIAL3
};

const XIAO_SERIAL4: ChannelConfig = ChannelConfig {
    name: "Serial4",
    module: SERCOM1,
    rx_pin: Pin(18),
    tx_pin: Pin(17),
    rx_pad: Pad::Pad3,
    tx_pad: Pad::Pad2,
    function: PinFunction::Alternate,
    interval_ms: 1900,
    counter: HeartbeatCounter::Sequence,
};

const XIAO_SWD: [Reservation; 1] = [Reservation {
    module: SERCOM1,
    role: ModuleRole::Swd,
}];

/// Ring wiring: A6 -> A9, A10 -> A5, A4 -> A7
pub const XIAO_THREE_USARTS: Deployment = Deployment {
    name: "3usarts",
    channels: &[XIAO_SERIAL1, XIAO_SERIAL2, XIAO_SERIAL3],
    reserved: &XIAO_SWD,
    order: InitOrder::InitThenRoute,
    baud: USART_BAUD,
};

/// Serial3 on A2/A3 (pads 2/3), heartbeats carry interrupt-service counts.
///
/// Ring wiring: A6 -> A9, A10 -> A3, A2 -> A7. On the SAMD21 this mapping only
/// works when the module is enabled before its pins are routed.
pub const XIAO_THREE_USARTS_ALT: Deployment = Deployment {
    name: "xiao_usarts",
    channels: &[
        XIAO_SERIAL1,
        ChannelConfig {
            counter: HeartbeatCounter::ServiceCount,
            ..XIAO_SERIAL2
        },
        ChannelConfig {
            counter: HeartbeatCounter::ServiceCount,
            ..XIAO_SERIAL3_ALT
        },
    ],
    reserved: &XIAO_SWD,
    order: InitOrder::InitThenRoute,
    baud: USART_BAUD,
};

/// SERCOM1 taken from SWD. Ring wiring: A6 -> A9, A10 -> A5, A4 -> SWDIO, SWCLK -> A7
pub const XIAO_FOUR_USARTS: Deployment = Deployment {
    name: "4usarts",
    channels: &[XIAO_SERIAL1, XIAO_SERIAL2, XIAO_SERIAL3, XIAO_SERIAL4],
    reserved: &[],
    order: InitOrder::InitThenRoute,
    baud: USART_BAUD,
};

const PICO2_SERIAL1: ChannelConfig = ChannelConfig {
    name: "Serial1",
    module: UART0,
    rx_pin: Pin(1),
    tx_pin: Pin(0),
    rx_pad: Pad::Pad1,
    tx_pad: Pad::Pad0,
    function: PinFunction::Primary,
    interval_ms: 1000,
    counter: HeartbeatCounter::Sequence,
};

const PICO2_SERIAL1_AUX: ChannelConfig = ChannelConfig {
    rx_pin: Pin(3),
    tx_pin: Pin(2),
    rx_pad: Pad::Pad3,
    tx_pad: Pad::Pad2,
    function: PinFunction::Alternate,
    ..PICO2_SERIAL1
};

const PICO2_SERIAL1_SELECTED: ChannelConfig = if cfg!(feature = "alt-pins") {
    PICO2_SERIAL1_AUX
} else {
    PICO2_SERIAL1
};

/// Log console on UART1 (GP4 tx, GP5 rx)
pub const PICO2_CONSOLE_TX: Pin = Pin(4);
pub const PICO2_CONSOLE_RX: Pin = Pin(5);

/// Single channel looped onto itself: GP0 -> GP1, or GP2 -> GP3 with `alt-pins`
pub const PICO2: Deployment = Deployment {
    name: "pico2-relay",
    channels: &[PICO2_SERIAL1_SELECTED],
    reserved: &[Reservation {
        module: UART1,
        role: ModuleRole::Console,
    }],
    order: INIT_ORDER,
    baud: USART_BAUD,
};

/// Which UART and lane an RP2350 GPIO carries under `function`.
///
/// UARTs alternate in blocks of eight GPIOs offset by four: GP0-3 UART0, GP4-11 UART1,
/// GP12-19 UART0, GP20-27 UART1, and so on.
/// F2: lane `n % 4` (tx, rx, cts, rts). F11 (UART aux): the cts/rts lanes carry tx/rx.
pub fn rp2350_uart_lane(pin: Pin, function: PinFunction) -> Option<(ModuleId, Pad)> {
    let module = ModuleId(((pin.0 as u16 + 4) / 8 % 2) as u8);
    match (function, pin.0 % 4) {
        (PinFunction::Primary, 0) => Some((module, Pad::Pad0)),
        (PinFunction::Primary, 1) => Some((module, Pad::Pad1)),
        (PinFunction::Alternate, 2) => Some((module, Pad::Pad2)),
        (PinFunction::Alternate, 3) => Some((module, Pad::Pad3)),
        _ => None,
    }
}

const _: () = assert!(XIAO_THREE_USARTS.validate().is_ok());
const _: () = assert!(XIAO_THREE_USARTS_ALT.validate().is_ok());
const _: () = assert!(XIAO_FOUR_USARTS.validate().is_ok());
const _: () = assert!(PICO2.validate().is_ok());
