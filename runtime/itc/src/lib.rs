//! Interrupt Controller - Source dispatch for a single-core, no-OS target
//!
//! # Purpose
//! Maps interrupt sources to handlers and provides the global and per-source
//! gating used by drivers to build critical sections.
//!
//! # Integration Points
//! - Depends on: the platform's controller registers (through [`ItcRegisters`])
//! - Provides to: device drivers (UART), the platform trap entry
//! - The trap entry calls [`InterruptController::service_normal_interrupt`] or
//!   [`InterruptController::service_fast_interrupt`]; the vector table and the
//!   CPU mode switch are outside this crate.
//!
//! # Architecture
//! - [`Source`]: validated source identifier, one bit per source in every mask
//! - [`InterruptHandler`]: callable invoked when a source is serviced
//! - [`InterruptController`]: handler table plus enable, priority, force and
//!   nesting global suppression over any [`ItcRegisters`] backend
//! - [`mmio`]: register backend for the reference board
//! - `sim` (feature `sim`): simulated registers for host tests

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod controller;
pub mod mmio;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use controller::{CriticalSection, InterruptController, InterruptState};

use static_assertions::const_assert;
use thiserror::Error;

/// Number of sources a controller can address (one bit each in a `u32` mask)
pub const MAX_SOURCES: usize = 32;

const_assert!(MAX_SOURCES <= u32::BITS as usize);

/// Error types for interrupt controller operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ItcError {
    #[error("Invalid interrupt source {id} (max {max})", max = MAX_SOURCES - 1)]
    InvalidSource { id: u8 },
}

pub type Result<T> = core::result::Result<T, ItcError>;

/// Interrupt source identifier
///
/// Always in `0..MAX_SOURCES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Source(u8);

impl Source {
    /// Validate a raw source number
    pub const fn new(id: u8) -> Result<Self> {
        if (id as usize) < MAX_SOURCES {
            Ok(Self(id))
        } else {
            Err(ItcError::InvalidSource { id })
        }
    }

    /// Source for a board table constant
    ///
    /// # Panics
    /// Panics (at compile time in const context) if `id` is out of range
    pub const fn from_id(id: u8) -> Self {
        assert!((id as usize) < MAX_SOURCES, "interrupt source out of range");
        Self(id)
    }

    /// Raw source number
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Index into per-source tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// This source's bit in enable/force/type masks
    pub const fn bit(self) -> u32 {
        1 << self.0
    }
}

impl core::fmt::Display for Source {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "src{}", self.0)
    }
}

/// Interrupt class of a source
///
/// Selects which service routine dispatches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Serviced by [`InterruptController::service_normal_interrupt`]
    Normal,
    /// Serviced by [`InterruptController::service_fast_interrupt`]
    Fast,
}

/// Handler invoked when a source's vector is serviced
///
/// Runs in interrupt context: it must not block and must not wait for
/// foreground code.
pub trait InterruptHandler: Sync {
    /// Service `source`
    fn on_interrupt(&self, source: Source);
}

impl<F> InterruptHandler for F
where
    F: Fn(Source) + Sync,
{
    fn on_interrupt(&self, source: Source) {
        self(source)
    }
}

/// Driver-facing view of the controller
///
/// Lets a driver register and gate its own sources without naming the
/// controller's register backend.
pub trait InterruptRegistry: Sync {
    /// Register `handler` for `source`, replacing any previous handler
    fn set_handler(&self, source: Source, handler: &'static dyn InterruptHandler);

    /// Classify `source` as normal or fast
    fn set_priority(&self, source: Source, priority: Priority);

    /// Allow `source` to raise interrupts
    fn enable_interrupt(&self, source: Source);

    /// Stop `source` from raising interrupts
    fn disable_interrupt(&self, source: Source);
}

/// Interrupt controller register access
///
/// Implementations wrap the hardware (or a simulation of it). All methods
/// take `&self`: registers are shared, volatile state.
pub trait ItcRegisters {
    /// Current per-source enable mask
    fn enable_mask(&self) -> u32;

    /// Replace the whole enable mask
    fn set_enable_mask(&self, mask: u32);

    /// Enable a single source
    fn enable_source(&self, source: Source);

    /// Disable a single source
    fn disable_source(&self, source: Source);

    /// Set or clear the fast-interrupt type bit of one source
    fn set_fast(&self, source: Source, fast: bool);

    /// Whether the source is classified as fast
    fn is_fast(&self, source: Source) -> bool;

    /// Current force mask
    fn forced(&self) -> u32;

    /// Replace the force mask
    fn set_forced(&self, mask: u32);

    /// Enable normal and fast interrupt arbitration
    fn enable_arbitration(&self);

    /// Highest-priority pending source of a class, if any
    fn pending_vector(&self, class: Priority) -> Option<Source>;
}
