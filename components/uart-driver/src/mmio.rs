//! Memory-mapped UART and GPIO backends for the reference board
//!
//! MC1322x-class register blocks. Addresses, offsets and the board's pin
//! routing live here; the driver only sees [`UartRegisters`] and [`Gpio`].

use core::ptr::{read_volatile, write_volatile};

use bitflags::bitflags;

use crate::config::{FifoLevels, UartPins};
use crate::gpio::{Gpio, Pin, PinDirection, PinFunction, Port};
use crate::regs::{BaudDivisor, UartRegisters, UartStatus};
use crate::Direction;

/// UART1 base address
pub const UART1_BASE: usize = 0x8000_5000;
/// UART2 base address
pub const UART2_BASE: usize = 0x8000_B000;
/// GPIO base address
pub const GPIO_BASE: usize = 0x8000_0000;

/// Core clock of the reference board
pub const CORE_CLOCK_HZ: u32 = 24_000_000;

/// UART register offsets
const UCON: usize = 0x00;   // Control
const USTAT: usize = 0x04;  // Status
const UDATA: usize = 0x08;  // Data (read: RX FIFO, write: TX FIFO)
const URXCON: usize = 0x0C; // Write: RX trigger level, read: RX FIFO fill
const UTXCON: usize = 0x10; // Write: TX trigger level, read: TX FIFO room
const UBR: usize = 0x18;    // Baud divisor (increment << 16 | modulus)

/// Trigger level field width
const FIFO_LEVEL_MASK: u32 = 0x1F;
/// FIFO fill/room field width
const FIFO_COUNT_MASK: u32 = 0x3F;

bitflags! {
    /// UCON bits used by this driver
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartControl: u32 {
        const TX_ENABLE = 1 << 0;
        const RX_ENABLE = 1 << 1;
        /// Transmit-ready interrupt masked
        const MASK_TX   = 1 << 13;
        /// Receive-ready interrupt masked
        const MASK_RX   = 1 << 14;
    }
}

/// UART1 pin routing
pub const UART1_PINS: UartPins = UartPins {
    tx: Pin::from_id(14),
    rx: Pin::from_id(15),
    cts: Pin::from_id(16),
    rts: Pin::from_id(17),
    function: PinFunction::Alternate1,
};

/// UART2 pin routing
pub const UART2_PINS: UartPins = UartPins {
    tx: Pin::from_id(18),
    rx: Pin::from_id(19),
    cts: Pin::from_id(20),
    rts: Pin::from_id(21),
    function: PinFunction::Alternate1,
};

/// MC1322x UART registers
pub struct Mc1322xUart {
    base: usize,
}

impl Mc1322xUart {
    /// Wrap the register block at `base`
    ///
    /// # Safety
    /// The caller must ensure that `base` points to valid UART MMIO registers
    /// and that only one driver line uses them.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        // SAFETY: `new` requires `base` to map the UART register block
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn control(&self) -> UartControl {
        UartControl::from_bits_retain(self.read_reg(UCON))
    }

    fn set_control(&self, control: UartControl) {
        self.write_reg(UCON, control.bits());
    }
}

impl UartRegisters for Mc1322xUart {
    fn configure(&self, divisor: BaudDivisor) {
        // Divisor may only change with both directions disabled
        self.set_control(UartControl::MASK_TX | UartControl::MASK_RX);
        self.write_reg(UBR, divisor.register_value());
        self.set_control(self.control() | UartControl::TX_ENABLE | UartControl::RX_ENABLE);
    }

    fn set_fifo_levels(&self, levels: FifoLevels) {
        self.write_reg(URXCON, u32::from(levels.rx) & FIFO_LEVEL_MASK);
        self.write_reg(UTXCON, u32::from(levels.tx) & FIFO_LEVEL_MASK);
    }

    fn status(&self) -> UartStatus {
        UartStatus::from_bits_truncate(self.read_reg(USTAT))
    }

    fn rx_level(&self) -> usize {
        (self.read_reg(URXCON) & FIFO_COUNT_MASK) as usize
    }

    fn tx_room(&self) -> usize {
        (self.read_reg(UTXCON) & FIFO_COUNT_MASK) as usize
    }

    fn read_data(&self) -> u8 {
        self.read_reg(UDATA) as u8
    }

    fn write_data(&self, byte: u8) {
        self.write_reg(UDATA, u32::from(byte));
    }

    fn set_masked(&self, direction: Direction, masked: bool) {
        let bit = match direction {
            Direction::Rx => UartControl::MASK_RX,
            Direction::Tx => UartControl::MASK_TX,
        };
        let mut control = self.control();
        control.set(bit, masked);
        self.set_control(control);
    }
}

/// GPIO register offsets (each a pair: port 0, port 1)
const GPIO_DATA: usize = 0x08;
const GPIO_FUNC_SEL: usize = 0x18; // Four registers, 16 pins each
const GPIO_DATA_SET: usize = 0x48;
const GPIO_DATA_RESET: usize = 0x50;
const GPIO_PAD_DIR_SET: usize = 0x58;
const GPIO_PAD_DIR_RESET: usize = 0x60;

/// MC1322x GPIO registers
pub struct Mc1322xGpio {
    base: usize,
}

impl Mc1322xGpio {
    /// Wrap the register block at `base`
    ///
    /// # Safety
    /// The caller must ensure that `base` points to valid GPIO MMIO registers.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        // SAFETY: `new` requires `base` to map the GPIO register block
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }

    /// Register of `port` in a port-pair bank
    fn port_reg(offset: usize, port: Port) -> usize {
        offset + port.index() * 4
    }
}

impl Gpio for Mc1322xGpio {
    fn set_pin_direction(&self, pin: Pin, direction: PinDirection) {
        let offset = match direction {
            PinDirection::Input => GPIO_PAD_DIR_RESET,
            PinDirection::Output => GPIO_PAD_DIR_SET,
        };
        self.write_reg(Self::port_reg(offset, pin.port()), pin.mask());
    }

    fn set_pin_function(&self, pin: Pin, function: PinFunction) {
        let offset = GPIO_FUNC_SEL + usize::from(pin.id() / 16) * 4;
        let shift = u32::from(pin.id() % 16) * 2;

        let value = self.read_reg(offset) & !(0b11 << shift);
        self.write_reg(offset, value | ((function as u32) << shift));
    }

    fn set_port(&self, port: Port, mask: u32) {
        self.write_reg(Self::port_reg(GPIO_DATA_SET, port), mask);
    }

    fn clear_port(&self, port: Port, mask: u32) {
        self.write_reg(Self::port_reg(GPIO_DATA_RESET, port), mask);
    }

    fn read_port(&self, port: Port) -> u32 {
        self.read_reg(Self::port_reg(GPIO_DATA, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    /// Zeroed word block standing in for a register window
    fn window() -> &'static mut [u32; 32] {
        Box::leak(Box::new([0u32; 32]))
    }

    #[test]
    fn test_uart_configure_leaves_directions_masked() {
        let mem = window();
        // SAFETY: the leaked block covers every UART offset
        let uart = unsafe { Mc1322xUart::new(mem.as_mut_ptr() as usize) };
        let divisor = BaudDivisor::for_baud(9600, CORE_CLOCK_HZ).unwrap();

        uart.configure(divisor);
        assert_eq!(uart.read_reg(UBR), (63 << 16) | 9999);
        assert_eq!(
            uart.control(),
            UartControl::TX_ENABLE
                | UartControl::RX_ENABLE
                | UartControl::MASK_TX
                | UartControl::MASK_RX
        );

        uart.set_masked(Direction::Rx, false);
        assert_eq!(
            uart.control(),
            UartControl::TX_ENABLE | UartControl::RX_ENABLE | UartControl::MASK_TX
        );
    }

    #[test]
    fn test_uart_fifo_levels_truncate_to_field() {
        let mem = window();
        // SAFETY: as above
        let uart = unsafe { Mc1322xUart::new(mem.as_mut_ptr() as usize) };

        uart.set_fifo_levels(FifoLevels { rx: 1, tx: 0xFF });
        assert_eq!(uart.read_reg(URXCON), 1);
        assert_eq!(uart.read_reg(UTXCON), 0x1F);
    }

    #[test]
    fn test_gpio_function_and_direction() {
        let mem = window();
        // SAFETY: the leaked block covers every GPIO offset used here
        let gpio = unsafe { Mc1322xGpio::new(mem.as_mut_ptr() as usize) };

        for pin in UART1_PINS.outputs().into_iter().chain(UART1_PINS.inputs()) {
            gpio.set_pin_function(pin, PinFunction::Alternate1);
        }
        gpio.set_pin_function(Pin::from_id(18), PinFunction::Alternate2);
        gpio.set_pin_direction(UART1_PINS.tx, PinDirection::Output);
        gpio.set_pin_direction(UART1_PINS.rx, PinDirection::Input);

        // Pins 14..=17 straddle the first two function-select registers
        assert_eq!(gpio.read_reg(GPIO_FUNC_SEL), (1 << 28) | (1 << 30));
        assert_eq!(gpio.read_reg(GPIO_FUNC_SEL + 4), 1 | (1 << 2) | (2 << 4));
        assert_eq!(gpio.read_reg(GPIO_PAD_DIR_SET), 1 << 14);
        assert_eq!(gpio.read_reg(GPIO_PAD_DIR_RESET), 1 << 15);
    }
}
