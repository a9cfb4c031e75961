#![no_std]
#![no_main]

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::UART1;
use embassy_rp::uart;
use portable_atomic::{AtomicPtr, Ordering};
use static_cell::StaticCell;
use usart_relay::board::{self, PICO2};
use usart_relay::rp2350::{DefmtConsole, Rp2350PinMux, Rp2350Uart, UptimeClock};
use usart_relay::scheduler::Clock;
use usart_relay::startup::{self, READY_TIMEOUT_MS};
use usart_relay::{InterruptTable, Scheduler, SerialChannel, SerialPort};
use {defmt_serial as _, panic_probe as _};

// Program metadata for `picotool info`.
#[link_section = ".bi_entries"]
#[used]
pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
    embassy_rp::binary_info::rp_program_name!(c"usart-relay"),
    embassy_rp::binary_info::rp_program_description!(c"UART relay with heartbeats"),
    embassy_rp::binary_info::rp_cargo_version!(),
    embassy_rp::binary_info::rp_program_build_attribute!(),
];

static DISPATCH: AtomicPtr<InterruptTable<'static>> = AtomicPtr::new(core::ptr::null_mut());

// interrupt handlers
bind_interrupts!(struct Irqs {
    UART0_IRQ => Uart0InterruptHandler;
});

struct Uart0InterruptHandler;
impl embassy_rp::interrupt::typelevel::Handler<embassy_rp::interrupt::typelevel::UART0_IRQ>
    for Uart0InterruptHandler
{
    unsafe fn on_interrupt() {
        let table = DISPATCH.load(Ordering::Acquire);
        if !table.is_null() {
            (*table).dispatch(board::UART0);
        }
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    // init peripherals
    let p = embassy_rp::init(Default::default());

    // console uart, carries defmt
    static CONSOLE_UART: StaticCell<uart::Uart<'static, UART1, uart::Blocking>> = StaticCell::new();
    let uart1 = CONSOLE_UART.init(uart::Uart::new_blocking(
        p.UART1,
        p.PIN_4, // tx
        p.PIN_5, // rx
        uart::Config::default(),
    ));
    defmt_serial::defmt_serial(uart1);

    // UART0 is driven at register level by the relay; keep the HAL off it
    let _relay_uart = p.UART0;

    info!("{}: {} channel(s)", PICO2.name, PICO2.channels.len());

    let caps = unwrap!(PICO2.claim());
    let cap = unwrap!(caps.into_iter().next());
    let module = Rp2350Uart::new(cap.config().module);

    static SERIAL1: StaticCell<SerialChannel<Rp2350Uart>> = StaticCell::new();
    let serial1: &'static SerialChannel<Rp2350Uart> =
        SERIAL1.init(SerialChannel::new(cap, module));

    // dispatch table is complete before any UART interrupt is unmasked
    static TABLE: StaticCell<InterruptTable<'static>> = StaticCell::new();
    let table = TABLE.init(InterruptTable::new());
    unwrap!(table.bind(serial1));
    DISPATCH.store(table as *mut _, Ordering::Release);

    let clock = UptimeClock;
    let mut console = DefmtConsole::new();
    if !startup::wait_until_ready(&console, &clock, READY_TIMEOUT_MS) {
        warn!("console not ready, relaying anyway");
    }

    let mut mux = Rp2350PinMux::new();
    for config in PICO2.channels {
        mux.expect(config.tx_pin, config.module);
        mux.expect(config.rx_pin, config.module);
    }

    let ports: [&dyn SerialPort; 1] = [serial1];
    let report = startup::setup(&ports, &mut mux, PICO2.order, PICO2.baud, &mut console);
    if !report.is_clean() {
        warn!("{} pin(s) failed to route", report.failures.len());
    }

    let mut scheduler = Scheduler::new(clock.now_ms());
    for port in ports {
        unwrap!(scheduler.add(port));
    }
    scheduler.run(&clock, &mut console)
}
