//! Simulated UART and GPIO hardware for host-side testing
//!
//! [`SimUart`] models both FIFOs, the trigger levels, the per-direction
//! masks and the sticky error bits. Transmitted bytes land on a virtual
//! wire once they are shifted out of the transmit FIFO.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::FifoLevels;
use crate::gpio::{Gpio, Pin, PinDirection, PinFunction, Port, PIN_COUNT};
use crate::regs::{BaudDivisor, LineErrors, UartRegisters, UartStatus};
use crate::Direction;

/// Depth of each simulated hardware FIFO
pub const SIM_FIFO_DEPTH: usize = 32;

#[derive(Debug, Default)]
struct SimUartState {
    rx_fifo: VecDeque<u8>,
    tx_fifo: VecDeque<u8>,
    wire: Vec<u8>,
    rx_masked: bool,
    tx_masked: bool,
    enabled: bool,
    divisor: Option<BaudDivisor>,
    levels: FifoLevels,
    errors: LineErrors,
}

impl SimUartState {
    fn rx_ready(&self) -> bool {
        self.rx_fifo.len() >= usize::from(self.levels.rx.max(1))
    }

    fn tx_ready(&self) -> bool {
        SIM_FIFO_DEPTH - self.tx_fifo.len() >= usize::from(self.levels.tx.max(1))
    }
}

/// Simulated UART line
#[derive(Debug, Default)]
pub struct SimUart {
    state: Mutex<SimUartState>,
}

impl SimUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `bytes` from the remote end into the receive FIFO
    ///
    /// Bytes that do not fit are lost and raise the receive overrun flag.
    /// Returns how many bytes were accepted.
    pub fn inject(&self, bytes: &[u8]) -> usize {
        let mut state = self.state.lock();
        let room = SIM_FIFO_DEPTH - state.rx_fifo.len();
        let accepted = bytes.len().min(room);
        state.rx_fifo.extend(&bytes[..accepted]);
        if accepted < bytes.len() {
            state.errors |= LineErrors::RX_OVERRUN;
        }
        accepted
    }

    /// Raise line error flags, as a noisy line would
    pub fn inject_errors(&self, errors: LineErrors) {
        self.state.lock().errors |= errors;
    }

    /// Move everything in the transmit FIFO onto the wire
    pub fn shift_out(&self) {
        let mut state = self.state.lock();
        let SimUartState { tx_fifo, wire, .. } = &mut *state;
        wire.extend(tx_fifo.drain(..));
    }

    /// Shift out and return everything transmitted so far
    pub fn take_transmitted(&self) -> Vec<u8> {
        self.shift_out();
        core::mem::take(&mut self.state.lock().wire)
    }

    pub fn divisor(&self) -> Option<BaudDivisor> {
        self.state.lock().divisor
    }

    pub fn fifo_levels(&self) -> FifoLevels {
        self.state.lock().levels
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn rx_masked(&self) -> bool {
        self.state.lock().rx_masked
    }

    pub fn tx_masked(&self) -> bool {
        self.state.lock().tx_masked
    }

    pub fn rx_fifo_len(&self) -> usize {
        self.state.lock().rx_fifo.len()
    }

    pub fn tx_fifo_len(&self) -> usize {
        self.state.lock().tx_fifo.len()
    }

    /// Whether the line's interrupt request is asserted
    pub fn irq_pending(&self) -> bool {
        let state = self.state.lock();
        (!state.rx_masked && state.rx_ready()) || (!state.tx_masked && state.tx_ready())
    }
}

impl UartRegisters for SimUart {
    fn configure(&self, divisor: BaudDivisor) {
        let mut state = self.state.lock();
        state.rx_masked = true;
        state.tx_masked = true;
        state.divisor = Some(divisor);
        state.enabled = true;
    }

    fn set_fifo_levels(&self, levels: FifoLevels) {
        self.state.lock().levels = levels;
    }

    fn status(&self) -> UartStatus {
        let mut state = self.state.lock();
        let mut status = UartStatus::from_bits_truncate(state.errors.bits());
        status.set(UartStatus::RX_READY, state.rx_ready());
        status.set(UartStatus::TX_READY, state.tx_ready());
        // Error bits clear on read
        state.errors = LineErrors::empty();
        status
    }

    fn rx_level(&self) -> usize {
        self.state.lock().rx_fifo.len()
    }

    fn tx_room(&self) -> usize {
        let mut state = self.state.lock();
        let room = SIM_FIFO_DEPTH - state.tx_fifo.len();
        if room == 0 {
            // Each poll of a full FIFO gives the shifter time for one byte
            if let Some(byte) = state.tx_fifo.pop_front() {
                state.wire.push(byte);
            }
        }
        room
    }

    fn read_data(&self) -> u8 {
        let mut state = self.state.lock();
        match state.rx_fifo.pop_front() {
            Some(byte) => byte,
            None => {
                state.errors |= LineErrors::RX_UNDERRUN;
                0
            }
        }
    }

    fn write_data(&self, byte: u8) {
        let mut state = self.state.lock();
        if state.tx_fifo.len() < SIM_FIFO_DEPTH {
            state.tx_fifo.push_back(byte);
        } else {
            state.errors |= LineErrors::TX_OVERRUN;
        }
    }

    fn set_masked(&self, direction: Direction, masked: bool) {
        let mut state = self.state.lock();
        match direction {
            Direction::Rx => state.rx_masked = masked,
            Direction::Tx => state.tx_masked = masked,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SimPin {
    direction: Option<PinDirection>,
    function: PinFunction,
}

/// Simulated GPIO controller
///
/// Records pin configuration; output levels written to a port read back
/// from it.
#[derive(Debug)]
pub struct SimGpio {
    pins: Mutex<[SimPin; PIN_COUNT as usize]>,
    ports: Mutex<[u32; 2]>,
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGpio {
    pub const fn new() -> Self {
        Self {
            pins: Mutex::new(
                [SimPin {
                    direction: None,
                    function: PinFunction::Normal,
                }; PIN_COUNT as usize],
            ),
            ports: Mutex::new([0; 2]),
        }
    }

    /// Configured direction, `None` if never set
    pub fn direction(&self, pin: Pin) -> Option<PinDirection> {
        self.pins.lock()[usize::from(pin.id())].direction
    }

    pub fn function(&self, pin: Pin) -> PinFunction {
        self.pins.lock()[usize::from(pin.id())].function
    }
}

impl Gpio for SimGpio {
    fn set_pin_direction(&self, pin: Pin, direction: PinDirection) {
        self.pins.lock()[usize::from(pin.id())].direction = Some(direction);
    }

    fn set_pin_function(&self, pin: Pin, function: PinFunction) {
        self.pins.lock()[usize::from(pin.id())].function = function;
    }

    fn set_port(&self, port: Port, mask: u32) {
        self.ports.lock()[port.index()] |= mask;
    }

    fn clear_port(&self, port: Port, mask: u32) {
        self.ports.lock()[port.index()] &= !mask;
    }

    fn read_port(&self, port: Port) -> u32 {
        self.ports.lock()[port.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_clears_errors_on_read() {
        let uart = SimUart::new();
        uart.inject_errors(LineErrors::FRAME);

        assert!(uart.status().contains(UartStatus::FRAME_ERROR));
        assert!(!uart.status().contains(UartStatus::FRAME_ERROR));
    }

    #[test]
    fn test_inject_overflow_sets_overrun() {
        let uart = SimUart::new();
        let bytes = [0x55u8; SIM_FIFO_DEPTH + 3];

        assert_eq!(uart.inject(&bytes), SIM_FIFO_DEPTH);
        assert!(uart.status().contains(UartStatus::RX_OVERRUN));
    }

    #[test]
    fn test_full_tx_fifo_drains_when_polled() {
        let uart = SimUart::new();
        for i in 0..SIM_FIFO_DEPTH {
            uart.write_data(i as u8);
        }

        assert_eq!(uart.tx_room(), 0);
        assert_eq!(uart.tx_room(), 1);
        assert_eq!(uart.take_transmitted().len(), SIM_FIFO_DEPTH);
    }

    #[test]
    fn test_gpio_ports() {
        let gpio = SimGpio::new();
        let pin = Pin::from_id(33);

        gpio.set_pin(pin);
        assert!(gpio.read_pin(pin));
        assert_eq!(gpio.read_port(Port::new(1).unwrap()), 1 << 1);

        gpio.clear_pin(pin);
        assert!(!gpio.read_pin(pin));
    }
}
