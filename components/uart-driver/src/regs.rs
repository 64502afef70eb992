//! UART register interface
//!
//! The driver reaches line hardware only through [`UartRegisters`]. Bit
//! layouts of the status register follow the reference board; other
//! backends translate to these flags.

use bitflags::bitflags;

use crate::config::FifoLevels;
use crate::Direction;

/// Fixed modulus of the fractional baud divisor
pub const BAUD_MODULUS: u32 = 9999;

bitflags! {
    /// Line status
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartStatus: u32 {
        const START_ERROR  = 1 << 0;
        const PARITY_ERROR = 1 << 1;
        const FRAME_ERROR  = 1 << 2;
        const TX_OVERRUN   = 1 << 3;
        const RX_OVERRUN   = 1 << 4;
        const RX_UNDERRUN  = 1 << 5;
        /// Receive FIFO reached its trigger level
        const RX_READY     = 1 << 6;
        /// Transmit FIFO has at least its trigger level of free room
        const TX_READY     = 1 << 7;
    }
}

bitflags! {
    /// Hardware error conditions latched by the interrupt handler
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineErrors: u32 {
        const START     = 1 << 0;
        const PARITY    = 1 << 1;
        const FRAME     = 1 << 2;
        const TX_OVERRUN = 1 << 3;
        const RX_OVERRUN = 1 << 4;
        const RX_UNDERRUN = 1 << 5;
    }
}

impl UartStatus {
    /// Error bits of this status
    pub fn errors(self) -> LineErrors {
        LineErrors::from_bits_truncate(self.bits())
    }
}

/// Fractional baud rate divisor
///
/// The hardware divides a reference of `core_clock / 16` by
/// `modulus / increment`. The modulus is fixed at [`BAUD_MODULUS`] and the
/// increment is computed, so precision is bounded by integer truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudDivisor {
    increment: u16,
    modulus: u16,
}

impl BaudDivisor {
    /// Divisor for `baud_rate` from a `core_clock_hz` reference
    ///
    /// Returns `None` when the rate is zero or the increment does not fit
    /// its 16-bit field (including a zero increment).
    pub fn for_baud(baud_rate: u32, core_clock_hz: u32) -> Option<Self> {
        let reference = u64::from(core_clock_hz / 16);
        if baud_rate == 0 || reference == 0 {
            return None;
        }

        let increment = u64::from(baud_rate) * u64::from(BAUD_MODULUS) / reference;
        let increment = u16::try_from(increment).ok().filter(|&inc| inc != 0)?;

        Some(Self {
            increment,
            modulus: BAUD_MODULUS as u16,
        })
    }

    pub fn increment(&self) -> u16 {
        self.increment
    }

    pub fn modulus(&self) -> u16 {
        self.modulus
    }

    /// Value for the divisor register: increment high, modulus low
    pub fn register_value(&self) -> u32 {
        (u32::from(self.increment) << 16) | u32::from(self.modulus)
    }
}

/// UART line register access
///
/// All methods take `&self`: registers are shared, volatile state touched
/// from both foreground and interrupt context.
pub trait UartRegisters {
    /// Stop the line, program `divisor`, restart it
    ///
    /// Both directions are left masked.
    fn configure(&self, divisor: BaudDivisor);

    /// Program the FIFO interrupt trigger levels
    fn set_fifo_levels(&self, levels: FifoLevels);

    /// Read the status register
    fn status(&self) -> UartStatus;

    /// Bytes waiting in the receive FIFO
    fn rx_level(&self) -> usize;

    /// Free slots in the transmit FIFO
    fn tx_room(&self) -> usize;

    /// Pop one byte from the receive FIFO
    fn read_data(&self) -> u8;

    /// Push one byte into the transmit FIFO
    fn write_data(&self, byte: u8);

    /// Mask or unmask a direction's ready interrupt
    fn set_masked(&self, direction: Direction, masked: bool);
}
