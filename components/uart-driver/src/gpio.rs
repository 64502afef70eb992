//! GPIO interface used for UART pin setup
//!
//! Pins and ports are validated when constructed, so the [`Gpio`] methods
//! themselves cannot fail.

use thiserror::Error;

/// Pins addressable on the reference board
pub const PIN_COUNT: u8 = 64;

/// Pins per 32-bit port
pub const PINS_PER_PORT: u8 = 32;

/// Error types for GPIO identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GpioError {
    #[error("Invalid GPIO pin {pin} (max {max})", max = PIN_COUNT - 1)]
    InvalidPin { pin: u8 },

    #[error("Invalid GPIO port {port}")]
    InvalidPort { port: u8 },
}

/// GPIO pin number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pin(u8);

impl Pin {
    pub const fn new(pin: u8) -> Result<Self, GpioError> {
        if pin < PIN_COUNT {
            Ok(Self(pin))
        } else {
            Err(GpioError::InvalidPin { pin })
        }
    }

    /// Pin for a board table constant
    ///
    /// # Panics
    /// Panics (at compile time in const context) if `pin` is out of range
    pub const fn from_id(pin: u8) -> Self {
        assert!(pin < PIN_COUNT, "GPIO pin out of range");
        Self(pin)
    }

    pub const fn id(self) -> u8 {
        self.0
    }

    /// Port holding this pin
    pub const fn port(self) -> Port {
        Port(self.0 / PINS_PER_PORT)
    }

    /// This pin's bit within its port
    pub const fn mask(self) -> u32 {
        1 << (self.0 % PINS_PER_PORT)
    }
}

/// 32-pin GPIO port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port(u8);

impl Port {
    pub const fn new(port: u8) -> Result<Self, GpioError> {
        if port < PIN_COUNT / PINS_PER_PORT {
            Ok(Self(port))
        } else {
            Err(GpioError::InvalidPort { port })
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

/// Pin multiplexer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFunction {
    Normal = 0,
    Alternate1 = 1,
    Alternate2 = 2,
    Alternate3 = 3,
}

/// GPIO controller
pub trait Gpio {
    fn set_pin_direction(&self, pin: Pin, direction: PinDirection);

    fn set_pin_function(&self, pin: Pin, function: PinFunction);

    /// Drive the pins in `mask` high
    fn set_port(&self, port: Port, mask: u32);

    /// Drive the pins in `mask` low
    fn clear_port(&self, port: Port, mask: u32);

    /// Input levels of the whole port
    fn read_port(&self, port: Port) -> u32;

    fn set_pin(&self, pin: Pin) {
        self.set_port(pin.port(), pin.mask());
    }

    fn clear_pin(&self, pin: Pin) {
        self.clear_port(pin.port(), pin.mask());
    }

    fn read_pin(&self, pin: Pin) -> bool {
        self.read_port(pin.port()) & pin.mask() != 0
    }
}
