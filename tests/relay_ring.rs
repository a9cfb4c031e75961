use usart_relay::board::{
    SERCOM0, SERCOM1, SERCOM2, SERCOM4, XIAO_FOUR_USARTS, XIAO_THREE_USARTS, XIAO_THREE_USARTS_ALT,
};
use usart_relay::loopback::{deliver_interrupts, LoopbackClock, LoopbackConsole, LoopbackModule, LoopbackPinMux};
use usart_relay::serial::ChannelState;
use usart_relay::startup::setup;
use usart_relay::{
    ChannelConfig, ChannelId, ConfigError, Deployment, InitOrder, InterruptTable, Pin, Scheduler,
    SerialChannel, SerialPort,
};

/// Steps the clock one millisecond at a time from `from` to `to` inclusive, delivering
/// pending interrupts before every loop iteration.
fn run(
    from: u32,
    to: u32,
    clock: &LoopbackClock,
    modules: &[&LoopbackModule<'_>],
    table: &InterruptTable<'_>,
    scheduler: &mut Scheduler<'_>,
    console: &mut LoopbackConsole,
) {
    for t in from..=to {
        clock.set(t);
        deliver_interrupts(modules, table);
        scheduler.poll(clock, console);
    }
}

#[test]
fn three_port_ring_relays_every_heartbeat() {
    let m4 = LoopbackModule::new(SERCOM4);
    let m0 = LoopbackModule::new(SERCOM0);
    let m2 = LoopbackModule::new(SERCOM2);
    // A6 -> A9, A10 -> A5, A4 -> A7
    m4.connect(&m0);
    m0.connect(&m2);
    m2.connect(&m4);

    let mut caps = XIAO_THREE_USARTS.claim().unwrap().into_iter();
    let s1: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m4);
    let s2: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m0);
    let s3: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m2);

    let mut table = InterruptTable::new();
    table.bind(&s1).unwrap();
    table.bind(&s2).unwrap();
    table.bind(&s3).unwrap();

    let ports: [&dyn SerialPort; 3] = [&s1, &s2, &s3];
    let mut mux = LoopbackPinMux::new();
    let mut console = LoopbackConsole::new();
    let report = setup(
        &ports,
        &mut mux,
        XIAO_THREE_USARTS.order,
        XIAO_THREE_USARTS.baud,
        &mut console,
    );
    assert!(report.is_clean());
    assert_eq!(
        console.text(),
        "Setting up Serial1\n\
         Setting up Serial2\n\
         Setting up Serial3\n\
         \nInitialized all serial ports without error.\n\
         Setup completed, starting loop\n"
    );
    assert_eq!(mux.route_calls(), 6);
    console.clear();

    let clock = LoopbackClock::new(0);
    let mut scheduler = Scheduler::new(0);
    for port in ports {
        scheduler.add(port).unwrap();
    }

    let modules = [&m4, &m0, &m2];
    run(0, 3200, &clock, &modules, &table, &mut scheduler, &mut console);

    assert_eq!(scheduler.fired(ChannelId(0)), 3);
    assert_eq!(scheduler.fired(ChannelId(1)), 2);
    assert_eq!(scheduler.fired(ChannelId(2)), 2);

    let text = console.text();
    for line in [
        "\nWriting 1 to Serial1\n",
        "\nWriting 3 to Serial1\n",
        "\nWriting 2 to Serial2\n",
        "\nWriting 2 to Serial3\n",
    ] {
        assert!(text.contains(line), "missing {line:?}");
    }

    // Serial1's lines come back through Serial2, in order
    let first = text.find("Serial1: 1\n").unwrap();
    let second = text.find("Serial1: 2\n").unwrap();
    let third = text.find("Serial1: 3\n").unwrap();
    assert!(first < second && second < third);
    assert!(text.contains("Serial2: 2\n"));
    assert!(text.contains("Serial3: 1\n"));

    // Serial3's 3200 ms heartbeat is still sitting in Serial1's receive register
    assert!(!text.contains("Serial3: 2\n"));
    assert!(m4.interrupt_pending());
    assert_eq!(table.spurious(), 0);
}

#[test]
fn received_bytes_are_relayed_in_order() {
    let m4 = LoopbackModule::new(SERCOM4);
    let caps = XIAO_THREE_USARTS.claim().unwrap();
    let s1: SerialChannel<_> = SerialChannel::new(caps.into_iter().next().unwrap(), &m4);

    let mut table = InterruptTable::new();
    table.bind(&s1).unwrap();

    let ports: [&dyn SerialPort; 1] = [&s1];
    let mut console = LoopbackConsole::new();
    setup(&ports, &mut LoopbackPinMux::new(), InitOrder::InitThenRoute, 115_200, &mut console);
    console.clear();

    let mut scheduler = Scheduler::new(0);
    scheduler.add(&s1).unwrap();
    let clock = LoopbackClock::new(10);

    let payload: Vec<u8> = (0..64u8).map(|b| b'0' + b % 64).collect();
    m4.inject(&payload);
    deliver_interrupts(&[&m4], &table);
    let summary = scheduler.poll(&clock, &mut console);

    assert_eq!(summary.relayed, 64);
    assert_eq!(summary.heartbeats, 0);
    assert_eq!(console.bytes(), &payload[..]);
    // one flush per relayed byte
    assert_eq!(console.flushes(), 64);
    assert_eq!(s1.overruns(), 0);
}

#[test]
fn bytes_written_on_one_channel_arrive_on_the_next() {
    let m4 = LoopbackModule::new(SERCOM4);
    let m0 = LoopbackModule::new(SERCOM0);
    // A6 -> A9
    m4.connect(&m0);

    let mut caps = XIAO_THREE_USARTS.claim().unwrap().into_iter();
    let s1: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m4);
    let s2: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m0);

    let mut table = InterruptTable::new();
    table.bind(&s1).unwrap();
    table.bind(&s2).unwrap();

    let ports: [&dyn SerialPort; 2] = [&s1, &s2];
    let mut console = LoopbackConsole::new();
    let report = setup(
        &ports,
        &mut LoopbackPinMux::new(),
        XIAO_THREE_USARTS.order,
        XIAO_THREE_USARTS.baud,
        &mut console,
    );
    assert!(report.is_clean());

    let payload: Vec<u8> = (0..64u8).map(|b| b.wrapping_mul(37)).collect();
    s1.write_and_flush(&payload).unwrap();
    assert_eq!(m4.transmitted(), 64);

    assert_eq!(deliver_interrupts(&[&m4, &m0], &table), 1);
    assert_eq!(s2.service_count(), 1);
    assert_eq!(s2.available(), 64);
    assert_eq!(s2.overruns(), 0);

    let received: Vec<u8> = (0..64).map(|_| s2.read_byte().unwrap()).collect();
    assert_eq!(received, payload);
    assert_eq!(s2.read_byte(), Err(usart_relay::ChannelError::Empty));
    assert_eq!(s1.available(), 0);
}

#[test]
fn queue_overflow_keeps_the_oldest_bytes() {
    let m4 = LoopbackModule::new(SERCOM4);
    let caps = XIAO_THREE_USARTS.claim().unwrap();
    let s1: SerialChannel<_> = SerialChannel::new(caps.into_iter().next().unwrap(), &m4);

    let mut table = InterruptTable::new();
    table.bind(&s1).unwrap();
    s1.initialize(115_200);

    let payload: Vec<u8> = (0..80u8).collect();
    m4.inject(&payload);
    deliver_interrupts(&[&m4], &table);

    assert_eq!(s1.available(), 64);
    assert_eq!(s1.overruns(), 16);

    let mut scheduler = Scheduler::new(0);
    scheduler.add(&s1).unwrap();
    let mut console = LoopbackConsole::new();
    scheduler.poll(&LoopbackClock::new(1), &mut console);
    assert_eq!(console.bytes(), &payload[..64]);
}

#[test]
fn routing_failure_only_takes_down_its_channel() {
    let m4 = LoopbackModule::new(SERCOM4);
    let m0 = LoopbackModule::new(SERCOM0);
    let m2 = LoopbackModule::new(SERCOM2);
    m4.connect(&m0);
    m0.connect(&m2);
    m2.connect(&m4);

    let mut caps = XIAO_THREE_USARTS.claim().unwrap().into_iter();
    let s1: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m4);
    let s2: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m0);
    let s3: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m2);

    let mut table = InterruptTable::new();
    table.bind(&s1).unwrap();
    table.bind(&s2).unwrap();
    table.bind(&s3).unwrap();

    let ports: [&dyn SerialPort; 3] = [&s1, &s2, &s3];
    // Serial2's rx pin (A9)
    let mut mux = LoopbackPinMux::new().refuse(Pin(9));
    let mut console = LoopbackConsole::new();
    let report = setup(
        &ports,
        &mut mux,
        XIAO_THREE_USARTS.order,
        XIAO_THREE_USARTS.baud,
        &mut console,
    );

    assert!(report.failed(ChannelId(1)));
    assert!(!report.failed(ChannelId(0)));
    assert!(!report.failed(ChannelId(2)));
    assert!(console
        .text()
        .contains("** 1 error while setting up the serial ports **\n  Pin 9 could not be reassigned to Alternate\n"));
    assert!(console.text().ends_with("Setup completed, starting loop\n"));

    assert_eq!(s1.state(), ChannelState::Active);
    assert_eq!(s2.state(), ChannelState::Faulted);
    assert_eq!(s3.state(), ChannelState::Active);
    console.clear();

    let clock = LoopbackClock::new(0);
    let mut scheduler = Scheduler::new(0);
    for port in ports {
        scheduler.add(port).unwrap();
    }
    run(0, 1700, &clock, &[&m4, &m0, &m2], &table, &mut scheduler, &mut console);

    assert_eq!(scheduler.fired(ChannelId(0)), 1);
    assert_eq!(scheduler.fired(ChannelId(1)), 0);
    assert_eq!(scheduler.fired(ChannelId(2)), 1);

    let text = console.text();
    assert!(text.contains("\nWriting 1 to Serial1\n"));
    assert!(!text.contains("Serial2"));
    // Serial1's heartbeat reached the faulted channel but was never relayed
    assert!(!text.contains("Serial1: 1\n"));
    // Serial3's heartbeat came back through Serial1
    assert!(text.contains("Serial3: 1\n"));
}

#[test]
fn route_then_init_leaves_failed_module_disabled() {
    let m4 = LoopbackModule::new(SERCOM4);
    let m0 = LoopbackModule::new(SERCOM0);
    m4.connect(&m0);

    let mut caps = XIAO_THREE_USARTS.claim().unwrap().into_iter();
    let s1: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m4);
    let s2: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m0);

    let ports: [&dyn SerialPort; 2] = [&s1, &s2];
    let mut mux = LoopbackPinMux::new().refuse(Pin(10));
    let mut console = LoopbackConsole::new();
    let report = setup(&ports, &mut mux, InitOrder::RouteThenInit, 115_200, &mut console);

    assert!(report.failed(ChannelId(1)));
    assert!(m4.line_settings().is_some());
    assert_eq!(m0.line_settings(), None);
    assert_eq!(s2.state(), ChannelState::Faulted);

    // a disabled module ignores traffic on its pins
    s1.write_and_flush(b"x").unwrap();
    assert!(!m0.interrupt_pending());
}

#[test]
fn service_count_heartbeats() {
    let m4 = LoopbackModule::new(SERCOM4);
    let m0 = LoopbackModule::new(SERCOM0);
    let m2 = LoopbackModule::new(SERCOM2);
    // A6 -> A9, A10 -> A3, A2 -> A7
    m4.connect(&m0);
    m0.connect(&m2);
    m2.connect(&m4);

    let mut caps = XIAO_THREE_USARTS_ALT.claim().unwrap().into_iter();
    let s1: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m4);
    let s2: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m0);
    let s3: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m2);

    let mut table = InterruptTable::new();
    for owner in [&s1, &s2, &s3] {
        table.bind(owner).unwrap();
    }

    let ports: [&dyn SerialPort; 3] = [&s1, &s2, &s3];
    let mut mux = LoopbackPinMux::new();
    let mut console = LoopbackConsole::new();
    let report = setup(
        &ports,
        &mut mux,
        XIAO_THREE_USARTS_ALT.order,
        XIAO_THREE_USARTS_ALT.baud,
        &mut console,
    );
    assert!(report.is_clean());
    assert_eq!(mux.function_of(Pin(2)), Some(usart_relay::PinFunction::Alternate));
    console.clear();

    let clock = LoopbackClock::new(0);
    let mut scheduler = Scheduler::new(0);
    for port in ports {
        scheduler.add(port).unwrap();
    }
    run(0, 2700, &clock, &[&m4, &m0, &m2], &table, &mut scheduler, &mut console);

    let text = console.text();
    // Serial1 counts its own heartbeats
    assert!(text.contains("\nWriting 2 to Serial1\n"));
    // Serial2 had been serviced once at 1300 ms and twice at 2600 ms
    assert!(text.contains("\nWriting 1 to Serial2\n"));
    assert!(text.contains("\nWriting 2 to Serial2\n"));
    assert_eq!(s2.service_count(), 2);
    // Serial3 had received Serial2's first line by 1600 ms
    assert!(text.contains("\nWriting 1 to Serial3\n"));
    assert!(text.contains("Serial3: 1\n"));
}

#[test]
fn four_port_ring_uses_the_debug_module() {
    let m4 = LoopbackModule::new(SERCOM4);
    let m0 = LoopbackModule::new(SERCOM0);
    let m2 = LoopbackModule::new(SERCOM2);
    let m1 = LoopbackModule::new(SERCOM1);
    // A6 -> A9, A10 -> A5, A4 -> SWDIO, SWCLK -> A7
    m4.connect(&m0);
    m0.connect(&m2);
    m2.connect(&m1);
    m1.connect(&m4);

    let mut caps = XIAO_FOUR_USARTS.claim().unwrap().into_iter();
    let s1: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m4);
    let s2: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m0);
    let s3: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m2);
    let s4: SerialChannel<_> = SerialChannel::new(caps.next().unwrap(), &m1);
    assert!(caps.next().is_none());

    let mut table = InterruptTable::new();
    for owner in [&s1, &s2, &s3, &s4] {
        table.bind(owner).unwrap();
    }

    let ports: [&dyn SerialPort; 4] = [&s1, &s2, &s3, &s4];
    let mut console = LoopbackConsole::new();
    let report = setup(
        &ports,
        &mut LoopbackPinMux::new(),
        XIAO_FOUR_USARTS.order,
        XIAO_FOUR_USARTS.baud,
        &mut console,
    );
    assert!(report.is_clean());
    assert!(console.text().contains("Setting up Serial4\n"));
    console.clear();

    let clock = LoopbackClock::new(0);
    let mut scheduler = Scheduler::new(0);
    for port in ports {
        scheduler.add(port).unwrap();
    }
    run(0, 1950, &clock, &[&m4, &m0, &m2, &m1], &table, &mut scheduler, &mut console);

    for (id, name) in [(0, "Serial1"), (1, "Serial2"), (2, "Serial3"), (3, "Serial4")] {
        assert_eq!(scheduler.fired(ChannelId(id)), 1, "{name}");
        assert!(console.text().contains(&format!("{name}: 1\n")), "{name} not relayed");
    }
}

#[test]
fn two_channels_on_one_module_are_rejected() {
    static CHANNELS: [ChannelConfig; 2] = [
        ChannelConfig {
            name: "Serial1",
            module: SERCOM0,
            rx_pin: Pin(9),
            tx_pin: Pin(10),
            rx_pad: usart_relay::Pad::Pad1,
            tx_pad: usart_relay::Pad::Pad2,
            function: usart_relay::PinFunction::Alternate,
            interval_ms: 1000,
            counter: usart_relay::scheduler::HeartbeatCounter::Sequence,
        },
        ChannelConfig {
            name: "Serial2",
            module: SERCOM0,
            rx_pin: Pin(5),
            tx_pin: Pin(4),
            rx_pad: usart_relay::Pad::Pad1,
            tx_pad: usart_relay::Pad::Pad0,
            function: usart_relay::PinFunction::Alternate,
            interval_ms: 1300,
            counter: usart_relay::scheduler::HeartbeatCounter::Sequence,
        },
    ];
    let deployment = Deployment {
        channels: &CHANNELS,
        ..XIAO_FOUR_USARTS
    };

    assert_eq!(
        deployment.claim().unwrap_err(),
        ConfigError::DuplicateModule { module: SERCOM0 }
    );
}

#[test]
fn interrupt_for_unowned_module_is_counted() {
    let m4 = LoopbackModule::new(SERCOM4);
    let caps = XIAO_THREE_USARTS.claim().unwrap();
    let s1: SerialChannel<_> = SerialChannel::new(caps.into_iter().next().unwrap(), &m4);

    let mut table = InterruptTable::new();
    table.bind(&s1).unwrap();

    table.dispatch(SERCOM1);
    assert_eq!(table.spurious(), 1);
    assert_eq!(s1.service_count(), 0);
}
