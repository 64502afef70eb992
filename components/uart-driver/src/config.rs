//! Per-line configuration
//!
//! Everything a line needs that is fixed at build time: its registers, its
//! interrupt source, its pins, FIFO trigger levels and buffer storage.

use mcu_itc::Source;
use static_assertions::const_assert;

use crate::gpio::{Pin, PinFunction};

/// Default size of each software ring buffer
pub const DEFAULT_BUFFER_SIZE: usize = 256;

const_assert!(DEFAULT_BUFFER_SIZE.is_power_of_two());

/// Receive interrupt fires as soon as one byte is waiting
pub const DEFAULT_RX_TRIGGER: u8 = 1;

/// Transmit interrupt fires while at least this many FIFO slots are free
pub const DEFAULT_TX_TRIGGER: u8 = 31;

/// FIFO interrupt trigger levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoLevels {
    pub rx: u8,
    pub tx: u8,
}

impl Default for FifoLevels {
    fn default() -> Self {
        Self {
            rx: DEFAULT_RX_TRIGGER,
            tx: DEFAULT_TX_TRIGGER,
        }
    }
}

/// Pins a line is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartPins {
    pub tx: Pin,
    pub rx: Pin,
    pub cts: Pin,
    pub rts: Pin,
    /// Multiplexer function that connects the pins to the UART
    pub function: PinFunction,
}

impl UartPins {
    /// Pins configured as outputs
    pub fn outputs(&self) -> [Pin; 2] {
        [self.tx, self.cts]
    }

    /// Pins configured as inputs
    pub fn inputs(&self) -> [Pin; 2] {
        [self.rx, self.rts]
    }
}

/// Static description of one UART line
pub struct LineConfig<R> {
    pub regs: R,
    pub source: Source,
    pub pins: UartPins,
    pub fifo: FifoLevels,
    pub rx_storage: &'static mut [u8],
    pub tx_storage: &'static mut [u8],
}

impl<R> LineConfig<R> {
    /// Line with default FIFO levels
    ///
    /// `rx_storage` and `tx_storage` back the ring buffers; their lengths are
    /// the buffer capacities.
    pub fn new(
        regs: R,
        source: Source,
        pins: UartPins,
        rx_storage: &'static mut [u8],
        tx_storage: &'static mut [u8],
    ) -> Self {
        Self {
            regs,
            source,
            pins,
            fifo: FifoLevels::default(),
            rx_storage,
            tx_storage,
        }
    }

    pub fn with_fifo_levels(mut self, fifo: FifoLevels) -> Self {
        self.fifo = fifo;
        self
    }
}
