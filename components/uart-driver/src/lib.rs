//! UART Driver - Interrupt-driven serial I/O
//!
//! # Purpose
//! Serial driver for single-core, no-OS targets. Application code gets two
//! layers over each UART line:
//!
//! - **Level 0** (blocking, byte-granular): [`UartDriver::send_byte`] and
//!   [`UartDriver::receive_byte`] spin on the hardware FIFO.
//! - **Level 1** (non-blocking, buffer-granular): [`UartDriver::send`] and
//!   [`UartDriver::receive`] only touch the software ring buffers; the
//!   interrupt handler moves bytes between ring buffers and FIFOs.
//!
//! # Integration Points
//! - Depends on: `mcu-ring` (ring buffers), `mcu-itc` (handler registration)
//! - Consumes: [`UartRegisters`] (line hardware), [`Gpio`] (pin setup)
//! - Provides to: applications, consoles ([`SerialPort`])
//!
//! # Concurrency
//! The interrupt handler and foreground code share each line's buffers and
//! callbacks. Foreground code touches a direction only while holding a
//! suppression guard for it, which masks that direction's interrupt and
//! makes the handler skip it. Guards nest; releasing one restores the
//! previous mask state instead of unmasking unconditionally.
//!
//! Buffer locks are held only for the copy itself, with the whole line
//! masked. Nothing waits on hardware while holding one, so callbacks may
//! use the other direction while foreground code is blocked in level 0.
//!
//! # Example
//! ```rust,ignore
//! use mcu_itc::{mmio::{sources, Mc1322xItc, ITC_BASE}, InterruptController};
//! use mcu_uart::mmio::*;
//!
//! static ITC: InterruptController<Mc1322xItc> =
//!     InterruptController::new(unsafe { Mc1322xItc::new(ITC_BASE) });
//!
//! // Leaked or placed in a static cell by the board's startup code
//! let uart: &'static UartDriver<Mc1322xUart, Mc1322xGpio, 2> = board_uart();
//!
//! ITC.init();
//! uart.init(0, 115_200, "uart1")?;
//! uart.send(0, b"hello\r\n")?;
//! writeln!(uart.port(0)?, "echo: {}", uart.receive_byte(0) as char)?;
//! ```
//!
//! # Testing Strategy
//! - Unit tests: divisor math, guard nesting, GPIO helpers
//! - Driver tests (`tests` module): full init/level 0/level 1/handler flows
//!   against simulated registers (`sim`)

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod config;
mod driver;
pub mod gpio;
mod line;
pub mod mmio;
mod port;
pub mod regs;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

#[cfg(test)]
mod tests;

pub use config::{FifoLevels, LineConfig, UartPins, DEFAULT_BUFFER_SIZE};
pub use driver::UartDriver;
pub use gpio::{Gpio, GpioError, Pin, PinDirection, PinFunction, Port};
pub use port::{BlockingSerial, SerialPort};
pub use regs::{BaudDivisor, LineErrors, UartRegisters, UartStatus, BAUD_MODULUS};

use thiserror::Error;

/// Error types for UART operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UartError {
    #[error("No such device: UART line {line}")]
    NoSuchDevice { line: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = core::result::Result<T, UartError>;

/// Transfer direction of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Hardware to application
    Rx,
    /// Application to hardware
    Tx,
}

/// User callback, invoked from interrupt context with the line index
///
/// Called after the handler has moved bytes for the callback's direction.
/// It may call the driver's level-1 operations.
pub type Callback = &'static (dyn Fn(usize) + Sync);
