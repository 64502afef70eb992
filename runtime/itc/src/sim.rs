//! Simulated controller registers for host-side testing
//!
//! Models the pieces of the controller the dispatch logic depends on: raw
//! request lines, enable, type and force masks, and highest-number-wins
//! vector selection.

use spin::Mutex;

use crate::{ItcRegisters, Priority, Source};

#[derive(Debug, Default, Clone, Copy)]
struct SimItcState {
    raised: u32,
    enabled: u32,
    fast: u32,
    forced: u32,
    arbitration: bool,
}

/// Simulated interrupt controller
#[derive(Debug, Default)]
pub struct SimItc {
    state: Mutex<SimItcState>,
}

impl SimItc {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SimItcState {
                raised: 0,
                enabled: 0,
                fast: 0,
                forced: 0,
                arbitration: false,
            }),
        }
    }

    /// Assert a device request line
    pub fn raise(&self, source: Source) {
        self.state.lock().raised |= source.bit();
    }

    /// Deassert a device request line
    pub fn lower(&self, source: Source) {
        self.state.lock().raised &= !source.bit();
    }

    /// Drive a request line to `level`
    pub fn set_line(&self, source: Source, level: bool) {
        if level {
            self.raise(source);
        } else {
            self.lower(source);
        }
    }

    /// Whether `init` turned arbitration on
    pub fn arbitration_enabled(&self) -> bool {
        self.state.lock().arbitration
    }

    /// Sources that would currently interrupt the CPU in `class`
    pub fn pending(&self, class: Priority) -> u32 {
        let state = self.state.lock();
        if !state.arbitration {
            return 0;
        }
        let live = (state.raised | state.forced) & state.enabled;
        match class {
            Priority::Normal => live & !state.fast,
            Priority::Fast => live & state.fast,
        }
    }
}

impl ItcRegisters for SimItc {
    fn enable_mask(&self) -> u32 {
        self.state.lock().enabled
    }

    fn set_enable_mask(&self, mask: u32) {
        self.state.lock().enabled = mask;
    }

    fn enable_source(&self, source: Source) {
        self.state.lock().enabled |= source.bit();
    }

    fn disable_source(&self, source: Source) {
        self.state.lock().enabled &= !source.bit();
    }

    fn set_fast(&self, source: Source, fast: bool) {
        let mut state = self.state.lock();
        if fast {
            state.fast |= source.bit();
        } else {
            state.fast &= !source.bit();
        }
    }

    fn is_fast(&self, source: Source) -> bool {
        self.state.lock().fast & source.bit() != 0
    }

    fn forced(&self) -> u32 {
        self.state.lock().forced
    }

    fn set_forced(&self, mask: u32) {
        self.state.lock().forced = mask;
    }

    fn enable_arbitration(&self) {
        self.state.lock().arbitration = true;
    }

    fn pending_vector(&self, class: Priority) -> Option<Source> {
        let pending = self.pending(class);
        if pending == 0 {
            return None;
        }
        let highest = (u32::BITS - 1 - pending.leading_zeros()) as u8;
        Source::new(highest).ok()
    }
}
