//! Driver tests against simulated hardware
//!
//! Each test builds its own board: an interrupt controller over `SimItc`
//! and a two-line driver over `SimUart`/`SimGpio`, all leaked so they are
//! `'static` like the statics they stand in for. `Board::pump` plays the
//! role of the hardware and the trap entry: it lets the transmitters shift
//! out, drives the controller's request lines from each UART and services
//! interrupts until none are pending.

use core::fmt::Write;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::boxed::Box;
use std::vec::Vec;

use mcu_itc::mmio::sources;
use mcu_itc::sim::SimItc;
use mcu_itc::{InterruptController, InterruptHandler, Priority, Source};
use spin::Mutex;

use crate::mmio::{CORE_CLOCK_HZ, UART1_PINS, UART2_PINS};
use crate::sim::{SimGpio, SimUart, SIM_FIFO_DEPTH};
use crate::{
    Callback, Direction, FifoLevels, LineConfig, LineErrors, PinDirection, PinFunction, UartDriver,
    UartError, DEFAULT_BUFFER_SIZE,
};

type Driver = UartDriver<SimUart, SimGpio, 2>;

const LINE_SOURCES: [Source; 2] = [sources::UART1, sources::UART2];

struct Board {
    itc: &'static InterruptController<SimItc>,
    uart: &'static Driver,
}

fn storage() -> &'static mut [u8] {
    Box::leak(Box::new([0u8; DEFAULT_BUFFER_SIZE]))
}

fn board() -> Board {
    let itc: &'static InterruptController<SimItc> =
        Box::leak(Box::new(InterruptController::new(SimItc::new())));
    itc.init();

    let lines = [
        LineConfig::new(SimUart::new(), sources::UART1, UART1_PINS, storage(), storage()),
        LineConfig::new(SimUart::new(), sources::UART2, UART2_PINS, storage(), storage()),
    ];
    let uart: &'static Driver = Box::leak(Box::new(UartDriver::new(
        itc,
        SimGpio::new(),
        CORE_CLOCK_HZ,
        lines,
    )));

    Board { itc, uart }
}

/// Board with line 0 initialized as "uart1"
fn uart1() -> Board {
    let board = board();
    board.uart.init(0, 115_200, "uart1").unwrap();
    board
}

fn leak_callback(f: impl Fn(usize) + Sync + 'static) -> Callback {
    Box::leak(Box::new(f))
}

impl Board {
    fn sim(&self, line: usize) -> &SimUart {
        self.uart.registers(line).unwrap()
    }

    /// Service interrupts until no line requests any; returns how many ran
    fn pump(&self) -> usize {
        let mut serviced = 0;
        loop {
            for (line, source) in LINE_SOURCES.into_iter().enumerate() {
                self.sim(line).shift_out();
                let pending = self.sim(line).irq_pending();
                self.itc.registers().set_line(source, pending);
            }
            if self.itc.service_normal_interrupt().is_none() {
                return serviced;
            }
            serviced += 1;
            assert!(serviced < 10_000, "interrupt storm");
        }
    }

    /// Feed `bytes` into line `line` one FIFO-load at a time
    fn deliver(&self, line: usize, bytes: &[u8]) {
        for chunk in bytes.chunks(SIM_FIFO_DEPTH) {
            assert_eq!(self.sim(line).inject(chunk), chunk.len());
            self.pump();
        }
    }
}

// ---- init ----

#[test]
fn test_init_rejects_missing_line() {
    let board = board();
    assert_eq!(
        board.uart.init(2, 9600, "uart3"),
        Err(UartError::NoSuchDevice { line: 2 })
    );

    for line in 0..2 {
        assert_eq!(board.sim(line).divisor(), None);
        assert!(!board.sim(line).is_enabled());
        assert_eq!(board.uart.device_name(line), None);
    }
    assert!(!board.itc.has_handler(sources::UART1));
    assert!(!board.itc.has_handler(sources::UART2));
    assert_eq!(board.uart.gpio().direction(UART1_PINS.tx), None);
}

#[test]
fn test_init_rejects_bad_arguments_without_side_effects() {
    let board = board();

    assert!(matches!(
        board.uart.init(0, 9600, ""),
        Err(UartError::InvalidArgument(_))
    ));
    assert!(matches!(
        board.uart.init(0, 0, "uart1"),
        Err(UartError::InvalidArgument(_))
    ));
    assert!(matches!(
        board.uart.init(0, 50_000_000, "uart1"),
        Err(UartError::InvalidArgument(_))
    ));

    assert_eq!(board.sim(0).divisor(), None);
    assert!(!board.sim(0).is_enabled());
    assert!(!board.itc.has_handler(sources::UART1));
    assert_eq!(board.uart.device_name(0), None);
}

#[test]
fn test_init_programs_divisor() {
    let board = board();
    board.uart.init(0, 9600, "uart1").unwrap();

    let divisor = board.sim(0).divisor().unwrap();
    assert_eq!(divisor.increment(), 63);
    assert_eq!(divisor.register_value(), (63 << 16) | 9999);
    assert!(board.sim(0).is_enabled());
}

#[test]
fn test_init_configures_pins() {
    let board = uart1();
    let gpio = board.uart.gpio();

    for pin in [UART1_PINS.tx, UART1_PINS.rx, UART1_PINS.cts, UART1_PINS.rts] {
        assert_eq!(gpio.function(pin), PinFunction::Alternate1);
    }
    assert_eq!(gpio.direction(UART1_PINS.tx), Some(PinDirection::Output));
    assert_eq!(gpio.direction(UART1_PINS.cts), Some(PinDirection::Output));
    assert_eq!(gpio.direction(UART1_PINS.rx), Some(PinDirection::Input));
    assert_eq!(gpio.direction(UART1_PINS.rts), Some(PinDirection::Input));

    // Line 1 untouched
    assert_eq!(gpio.direction(UART2_PINS.tx), None);
}

#[test]
fn test_init_registers_interrupt() {
    let board = uart1();

    assert!(board.itc.has_handler(sources::UART1));
    assert!(board.itc.is_enabled(sources::UART1));
    assert_eq!(board.itc.priority(sources::UART1), Priority::Normal);
    assert!(!board.itc.has_handler(sources::UART2));
}

#[test]
fn test_init_masks_and_levels() {
    let board = uart1();

    assert!(!board.sim(0).rx_masked());
    assert!(board.sim(0).tx_masked());
    assert_eq!(board.sim(0).fifo_levels(), FifoLevels { rx: 1, tx: 31 });
}

#[test]
fn test_init_records_name() {
    let board = uart1();
    board.uart.init(1, 9600, "uart2").unwrap();

    assert_eq!(board.uart.device_name(0), Some("uart1"));
    assert_eq!(board.uart.find_line("uart2"), Some(1));
    assert_eq!(board.uart.find_line("uart9"), None);
    assert_eq!(board.uart.device_name(5), None);
}

#[test]
fn test_reinit_clears_state() {
    let board = uart1();
    let hits: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));
    let callback = leak_callback(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    board.uart.set_receive_callback(0, Some(callback)).unwrap();
    board.deliver(0, b"xyz");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(board.uart.send(0, b"abc"), Ok(3));

    board.uart.init(0, 9600, "uart1").unwrap();
    assert_eq!(board.uart.rx_pending(0), Ok(0));
    assert_eq!(board.uart.tx_pending(0), Ok(0));
    assert!(board.sim(0).tx_masked());

    // Callback was cleared
    board.deliver(0, b"q");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ---- level 1 ----

#[test]
fn test_send_drains_in_order() {
    let board = uart1();

    assert_eq!(board.uart.send(0, b"hi"), Ok(2));
    assert!(!board.sim(0).tx_masked());

    board.pump();
    assert_eq!(board.sim(0).take_transmitted(), b"hi");
    // Idle transmitter parks itself
    assert!(board.sim(0).tx_masked());
    assert_eq!(board.uart.tx_pending(0), Ok(0));
}

#[test]
fn test_send_short_count_when_full() {
    let board = uart1();
    let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

    assert_eq!(board.uart.send(0, &data), Ok(DEFAULT_BUFFER_SIZE));
    assert_eq!(board.uart.send(0, b"more"), Ok(0));
    assert_eq!(board.uart.tx_pending(0), Ok(DEFAULT_BUFFER_SIZE));

    board.pump();
    assert_eq!(board.sim(0).take_transmitted(), &data[..DEFAULT_BUFFER_SIZE]);
}

#[test]
fn test_send_preconditions() {
    let board = uart1();

    assert_eq!(
        board.uart.send(3, b"a"),
        Err(UartError::NoSuchDevice { line: 3 })
    );
    assert!(matches!(
        board.uart.send(0, b""),
        Err(UartError::InvalidArgument(_))
    ));
}

#[test]
fn test_receive_buffered_bytes() {
    let board = uart1();
    board.deliver(0, b"hello");
    assert_eq!(board.uart.rx_pending(0), Ok(5));

    let mut out = [0u8; 3];
    assert_eq!(board.uart.receive(0, &mut out), Ok(3));
    assert_eq!(&out, b"hel");

    let mut out = [0u8; 8];
    assert_eq!(board.uart.receive(0, &mut out), Ok(2));
    assert_eq!(&out[..2], b"lo");
}

#[test]
fn test_receive_empty_leaves_output_untouched() {
    let board = uart1();
    let mut out = [0xAAu8; 4];

    assert_eq!(board.uart.receive(0, &mut out), Ok(0));
    assert_eq!(out, [0xAA; 4]);
}

#[test]
fn test_receive_preconditions() {
    let board = uart1();

    assert_eq!(
        board.uart.receive(2, &mut [0u8; 1]),
        Err(UartError::NoSuchDevice { line: 2 })
    );
    assert!(matches!(
        board.uart.receive(0, &mut []),
        Err(UartError::InvalidArgument(_))
    ));
}

#[test]
fn test_receive_backpressure_and_overruns() {
    let board = uart1();
    let data: Vec<u8> = (0..DEFAULT_BUFFER_SIZE as u32).map(|i| i as u8).collect();

    board.deliver(0, &data);
    assert_eq!(board.uart.rx_pending(0), Ok(DEFAULT_BUFFER_SIZE));
    // Full buffer parks receive
    assert!(board.sim(0).rx_masked());

    // Masked: the line no longer requests service
    board.sim(0).inject(b"lost");
    assert_eq!(board.pump(), 0);

    // Entered anyway, the handler drains and drops
    board.uart.on_interrupt(sources::UART1);
    board.uart.on_interrupt(sources::UART1);
    assert_eq!(board.sim(0).rx_fifo_len(), 0);
    assert_eq!(board.uart.rx_overruns(0), Ok(4));
    assert!(board.sim(0).rx_masked());

    // Buffered data is intact
    let mut out = [0u8; DEFAULT_BUFFER_SIZE];
    assert_eq!(board.uart.receive(0, &mut out), Ok(DEFAULT_BUFFER_SIZE));
    assert_eq!(&out[..], &data[..]);
    assert!(!board.sim(0).rx_masked());
}

#[test]
fn test_receive_releases_backpressure() {
    let board = uart1();
    let data = [0x42u8; DEFAULT_BUFFER_SIZE];
    board.deliver(0, &data);
    assert!(board.sim(0).rx_masked());

    assert_eq!(board.uart.receive(0, &mut [0u8; 1]), Ok(1));
    assert!(!board.sim(0).rx_masked());

    board.deliver(0, b"z");
    assert_eq!(board.uart.rx_pending(0), Ok(DEFAULT_BUFFER_SIZE));
    assert_eq!(board.uart.rx_overruns(0), Ok(0));
}

// ---- level 0 ----

#[test]
fn test_send_byte_follows_buffered_bytes() {
    let board = uart1();

    assert_eq!(board.uart.send(0, b"ab"), Ok(2));
    board.uart.send_byte(0, b'c');

    assert_eq!(board.sim(0).take_transmitted(), b"abc");
    assert_eq!(board.uart.tx_pending(0), Ok(0));
    assert!(board.sim(0).tx_masked());
}

#[test]
fn test_send_byte_waits_for_fifo_room() {
    let board = uart1();

    for i in 0..(SIM_FIFO_DEPTH as u8 + 4) {
        board.uart.send_byte(0, i);
    }

    let sent = board.sim(0).take_transmitted();
    let expected: Vec<u8> = (0..(SIM_FIFO_DEPTH as u8 + 4)).collect();
    assert_eq!(sent, expected);
}

#[test]
fn test_receive_byte_prefers_buffer() {
    let board = uart1();
    board.deliver(0, b"xy");

    // Arrived after the handler ran; still in the FIFO
    board.sim(0).inject(b"z");

    assert_eq!(board.uart.receive_byte(0), b'x');
    assert_eq!(board.uart.receive_byte(0), b'y');
    assert_eq!(board.uart.receive_byte(0), b'z');
    assert_eq!(board.uart.rx_pending(0), Ok(0));
}

#[test]
#[should_panic(expected = "No such device")]
fn test_send_byte_missing_line_panics() {
    let board = board();
    board.uart.send_byte(7, b'a');
}

#[test]
#[should_panic(expected = "No such device")]
fn test_receive_byte_missing_line_panics() {
    let board = board();
    board.uart.receive_byte(2);
}

// ---- callbacks ----

#[test]
fn test_receive_callback_may_receive() {
    let board = uart1();
    let uart = board.uart;
    let got: &'static Mutex<Vec<u8>> = Box::leak(Box::new(Mutex::new(Vec::new())));

    let callback = leak_callback(move |line| {
        let mut buf = [0u8; 8];
        let n = uart.receive(line, &mut buf).unwrap();
        got.lock().extend_from_slice(&buf[..n]);
    });
    uart.set_receive_callback(0, Some(callback)).unwrap();

    board.deliver(0, b"hello");
    assert_eq!(*got.lock(), b"hello");
    assert_eq!(uart.rx_pending(0), Ok(0));
    assert!(!board.sim(0).rx_masked());
}

#[test]
fn test_send_callback_may_send() {
    let board = uart1();
    let uart = board.uart;
    let calls: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));

    let callback = leak_callback(move |line| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            assert_eq!(uart.send(line, b"!"), Ok(1));
        }
    });
    uart.set_send_callback(0, Some(callback)).unwrap();

    uart.send(0, b"ab").unwrap();
    board.pump();

    assert_eq!(board.sim(0).take_transmitted(), b"ab!");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(board.sim(0).tx_masked());
}

#[test]
fn test_receive_callback_sends_while_transmit_is_guarded() {
    let board = uart1();
    let uart = board.uart;
    let echoed: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));

    let callback = leak_callback(move |line| {
        echoed.fetch_add(uart.send(line, b"e").unwrap(), Ordering::SeqCst);
    });
    uart.set_receive_callback(0, Some(callback)).unwrap();

    // Foreground inside send_byte, waiting for FIFO room
    let tx = uart.line_state(0).suppress(Direction::Tx);
    board.sim(0).inject(b"x");
    uart.on_interrupt(sources::UART1);

    assert_eq!(echoed.load(Ordering::SeqCst), 1);
    assert_eq!(uart.tx_pending(0), Ok(1));
    // Transmit is left to the guard holder
    assert!(board.sim(0).take_transmitted().is_empty());

    drop(tx);
    board.pump();
    assert_eq!(board.sim(0).take_transmitted(), b"e");
    assert_eq!(uart.rx_pending(0), Ok(1));
}

#[test]
fn test_send_callback_receives_while_receive_is_guarded() {
    let board = uart1();
    let uart = board.uart;
    let got: &'static Mutex<Vec<u8>> = Box::leak(Box::new(Mutex::new(Vec::new())));
    board.deliver(0, b"ab");

    let callback = leak_callback(move |line| {
        let mut buf = [0u8; 4];
        let n = uart.receive(line, &mut buf).unwrap();
        got.lock().extend_from_slice(&buf[..n]);
    });
    uart.set_send_callback(0, Some(callback)).unwrap();
    uart.send(0, b"z").unwrap();

    // Foreground inside receive_byte, waiting on an empty FIFO
    let rx = uart.line_state(0).suppress(Direction::Rx);
    uart.on_interrupt(sources::UART1);

    assert_eq!(*got.lock(), b"ab");
    assert_eq!(board.sim(0).take_transmitted(), b"z");
    drop(rx);
    assert_eq!(uart.rx_pending(0), Ok(0));
    assert!(!board.sim(0).rx_masked());
}

#[test]
fn test_handler_leaves_line_alone_while_buffer_locked() {
    let board = uart1();
    let uart = board.uart;
    let callback = leak_callback(move |line| {
        uart.send(line, b"e").unwrap();
    });
    uart.set_receive_callback(0, Some(callback)).unwrap();

    let line = uart.line_state(0);
    let tx = line.suppress(Direction::Tx);
    let buffer = tx.buffer();
    // Whole line masked while a buffer is locked
    assert!(board.sim(0).rx_masked());

    board.sim(0).inject(b"x");
    assert!(!board.sim(0).irq_pending());
    // Entered anyway, the handler defers instead of spinning
    uart.on_interrupt(sources::UART1);
    assert_eq!(board.sim(0).rx_fifo_len(), 1);

    drop(buffer);
    drop(tx);
    assert_eq!(board.pump(), 1);
    assert_eq!(uart.rx_pending(0), Ok(1));
    assert_eq!(board.sim(0).take_transmitted(), b"e");
}

#[test]
fn test_callback_preconditions() {
    let board = uart1();
    let callback = leak_callback(|_| {});

    assert!(matches!(
        board.uart.set_receive_callback(0, None),
        Err(UartError::InvalidArgument(_))
    ));
    assert!(matches!(
        board.uart.set_send_callback(0, None),
        Err(UartError::InvalidArgument(_))
    ));
    assert_eq!(
        board.uart.set_send_callback(9, Some(callback)),
        Err(UartError::NoSuchDevice { line: 9 })
    );
}

// ---- handler ----

#[test]
fn test_lines_are_independent() {
    let board = uart1();
    board.uart.init(1, 9600, "uart2").unwrap();

    board.deliver(1, b"two");
    assert_eq!(board.uart.rx_pending(0), Ok(0));
    assert_eq!(board.uart.rx_pending(1), Ok(3));

    board.uart.send(0, b"one").unwrap();
    board.pump();
    assert_eq!(board.sim(0).take_transmitted(), b"one");
    assert!(board.sim(1).take_transmitted().is_empty());
}

#[test]
fn test_unknown_source_ignored() {
    let board = uart1();
    board.uart.on_interrupt(sources::TIMER);
    assert_eq!(board.uart.rx_pending(0), Ok(0));
}

#[test]
fn test_line_errors_latched() {
    let board = uart1();

    board.sim(0).inject_errors(LineErrors::PARITY | LineErrors::FRAME);
    board.deliver(0, b"?");

    assert_eq!(
        board.uart.take_line_errors(0),
        Ok(LineErrors::PARITY | LineErrors::FRAME)
    );
    assert_eq!(board.uart.take_line_errors(0), Ok(LineErrors::empty()));
    assert_eq!(
        board.uart.take_line_errors(4),
        Err(UartError::NoSuchDevice { line: 4 })
    );
}

#[test]
fn test_global_suppression_defers_service() {
    let board = uart1();
    board.sim(0).inject(b"q");

    {
        let _cs = board.itc.critical_section();
        board.itc.registers().set_line(sources::UART1, board.sim(0).irq_pending());
        assert_eq!(board.itc.service_normal_interrupt(), None);
    }

    assert_eq!(board.pump(), 1);
    assert_eq!(board.uart.rx_pending(0), Ok(1));
}

// ---- console ----

#[test]
fn test_serial_port_translates_newlines() {
    let board = uart1();
    let mut port = board.uart.port(0).unwrap();

    write!(port, "ok\n{}\n", 42).unwrap();
    assert_eq!(board.sim(0).take_transmitted(), b"ok\r\n42\r\n");
}

#[test]
fn test_serial_port_missing_line() {
    let board = board();
    assert!(matches!(
        board.uart.port(2),
        Err(UartError::NoSuchDevice { line: 2 })
    ));
}
