//! Handler table, gating and dispatch

use core::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, trace, warn};
use spin::Mutex;

use crate::{InterruptHandler, InterruptRegistry, ItcRegisters, Priority, Source, MAX_SOURCES};

type HandlerTable = [Option<&'static dyn InterruptHandler>; MAX_SOURCES];

/// Interrupt controller
///
/// Owns the handler table and the global suppression state. Lives for the
/// whole program, normally in a `static`.
///
/// ## Global suppression
///
/// [`disable_all`](Self::disable_all) / [`restore_all`](Self::restore_all)
/// nest. Only the outermost `disable_all` saves the enable mask and clears
/// it; only the matching outermost `restore_all` writes it back. Enabling or
/// disabling a source while suppressed edits the saved mask, so the change
/// takes effect when suppression ends.
pub struct InterruptController<R: ItcRegisters> {
    regs: R,
    handlers: Mutex<HandlerTable>,
    /// Nesting depth of global suppression
    depth: AtomicU32,
    /// Enable mask saved by the outermost `disable_all`
    saved_mask: AtomicU32,
}

/// Token returned by [`InterruptController::disable_all`]
///
/// Must be handed back to [`InterruptController::restore_all`] in LIFO order.
#[must_use = "global interrupts stay disabled until this state is restored"]
#[derive(Debug)]
pub struct InterruptState {
    level: u32,
}

impl InterruptState {
    /// Nesting level this token was issued at (1 = outermost)
    pub fn level(&self) -> u32 {
        self.level
    }
}

/// Scoped global suppression
///
/// Restores the previous state when dropped.
pub struct CriticalSection<'a, R: ItcRegisters> {
    itc: &'a InterruptController<R>,
    state: Option<InterruptState>,
}

impl<R: ItcRegisters> Drop for CriticalSection<'_, R> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.itc.restore_all(state);
        }
    }
}

impl<R: ItcRegisters> InterruptController<R> {
    /// Create a controller over `regs`
    ///
    /// Call [`init`](Self::init) before enabling any source.
    pub const fn new(regs: R) -> Self {
        Self {
            regs,
            handlers: Mutex::new([None; MAX_SOURCES]),
            depth: AtomicU32::new(0),
            saved_mask: AtomicU32::new(0),
        }
    }

    /// Access the register backend
    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Reset the controller
    ///
    /// Clears the handler table and any forced interrupts, disables every
    /// source and enables normal and fast arbitration.
    pub fn init(&self) {
        self.with_interrupts_disabled(|| {
            *self.handlers.lock() = [None; MAX_SOURCES];
        });

        self.regs.set_forced(0);
        self.regs.set_enable_mask(0);
        self.depth.store(0, Ordering::Release);
        self.saved_mask.store(0, Ordering::Release);
        self.regs.enable_arbitration();

        info!("[ITC] Initialized ({} sources, all disabled)", MAX_SOURCES);
    }

    /// Register `handler` for `source`, replacing any previous handler
    pub fn set_handler(&self, source: Source, handler: &'static dyn InterruptHandler) {
        self.with_interrupts_disabled(|| {
            self.handlers.lock()[source.index()] = Some(handler);
        });
        debug!("[ITC] Handler set for {}", source);
    }

    /// Remove the handler for `source`
    ///
    /// The source is disabled as well: a live vector without a handler is a
    /// fatal error.
    pub fn clear_handler(&self, source: Source) {
        self.disable_interrupt(source);
        self.with_interrupts_disabled(|| {
            self.handlers.lock()[source.index()] = None;
        });
        debug!("[ITC] Handler cleared for {}", source);
    }

    /// Whether a handler is registered for `source`
    pub fn has_handler(&self, source: Source) -> bool {
        self.with_interrupts_disabled(|| self.handlers.lock()[source.index()].is_some())
    }

    /// Allow `source` to raise interrupts
    pub fn enable_interrupt(&self, source: Source) {
        if self.depth.load(Ordering::Acquire) > 0 {
            self.saved_mask.fetch_or(source.bit(), Ordering::AcqRel);
        } else {
            self.regs.enable_source(source);
        }
        debug!("[ITC] Enabled {}", source);
    }

    /// Stop `source` from raising interrupts
    pub fn disable_interrupt(&self, source: Source) {
        if self.depth.load(Ordering::Acquire) > 0 {
            self.saved_mask.fetch_and(!source.bit(), Ordering::AcqRel);
        } else {
            self.regs.disable_source(source);
        }
        debug!("[ITC] Disabled {}", source);
    }

    /// Whether `source` is enabled (or will be once suppression ends)
    pub fn is_enabled(&self, source: Source) -> bool {
        let mask = if self.depth.load(Ordering::Acquire) > 0 {
            self.saved_mask.load(Ordering::Acquire)
        } else {
            self.regs.enable_mask()
        };
        mask & source.bit() != 0
    }

    /// Classify `source` as normal or fast
    ///
    /// Only this source's classification changes.
    pub fn set_priority(&self, source: Source, priority: Priority) {
        self.regs.set_fast(source, priority == Priority::Fast);
    }

    /// Current classification of `source`
    pub fn priority(&self, source: Source) -> Priority {
        if self.regs.is_fast(source) {
            Priority::Fast
        } else {
            Priority::Normal
        }
    }

    /// Suppress all sources
    ///
    /// Returns the state to pass back to [`restore_all`](Self::restore_all).
    pub fn disable_all(&self) -> InterruptState {
        let depth = self.depth.load(Ordering::Acquire);
        if depth == 0 {
            let mask = self.regs.enable_mask();
            self.regs.set_enable_mask(0);
            self.saved_mask.store(mask, Ordering::Release);
        }
        self.depth.store(depth + 1, Ordering::Release);

        InterruptState { level: depth + 1 }
    }

    /// Undo the matching [`disable_all`](Self::disable_all)
    pub fn restore_all(&self, state: InterruptState) {
        let depth = self.depth.load(Ordering::Acquire);
        if depth == 0 {
            warn!("[ITC] restore_all without matching disable_all");
            return;
        }
        debug_assert_eq!(state.level, depth, "restore_all out of order");

        self.depth.store(depth - 1, Ordering::Release);
        if depth == 1 {
            self.regs.set_enable_mask(self.saved_mask.load(Ordering::Acquire));
        }
    }

    /// Suppress all sources until the returned guard is dropped
    pub fn critical_section(&self) -> CriticalSection<'_, R> {
        CriticalSection {
            itc: self,
            state: Some(self.disable_all()),
        }
    }

    /// Run `f` with all sources suppressed
    pub fn with_interrupts_disabled<T>(&self, f: impl FnOnce() -> T) -> T {
        let _cs = self.critical_section();
        f()
    }

    /// Current global suppression depth (0 = not suppressed)
    pub fn suppression_depth(&self) -> u32 {
        self.depth.load(Ordering::Acquire)
    }

    /// Raise `source` artificially, for debugging
    pub fn force_interrupt(&self, source: Source) {
        let forced = self.regs.forced();
        self.regs.set_forced(forced | source.bit());
    }

    /// Withdraw a forced `source`
    pub fn unforce_interrupt(&self, source: Source) {
        let forced = self.regs.forced();
        self.regs.set_forced(forced & !source.bit());
    }

    /// Dispatch the highest-priority pending normal interrupt
    ///
    /// Returns the serviced source, or `None` if nothing was pending.
    ///
    /// # Panics
    /// Panics if the pending source has no registered handler.
    pub fn service_normal_interrupt(&self) -> Option<Source> {
        self.dispatch(Priority::Normal)
    }

    /// Dispatch the highest-priority pending fast interrupt
    ///
    /// # Panics
    /// Panics if the pending source has no registered handler.
    pub fn service_fast_interrupt(&self) -> Option<Source> {
        self.dispatch(Priority::Fast)
    }

    fn dispatch(&self, class: Priority) -> Option<Source> {
        let Some(source) = self.regs.pending_vector(class) else {
            warn!("[ITC] Spurious {:?} interrupt", class);
            return None;
        };

        // Foreground only locks the table with every source suppressed, so a
        // held lock here can never be released
        let Some(table) = self.handlers.try_lock() else {
            panic!("[ITC] Handler table locked while servicing {}", source);
        };
        // Copy the handler out so it runs without the table locked
        let handler = table[source.index()];
        drop(table);
        match handler {
            Some(handler) => {
                trace!("[ITC] Servicing {} ({:?})", source, class);
                handler.on_interrupt(source);
                Some(source)
            }
            None => panic!("[ITC] {} is pending with no registered handler", source),
        }
    }
}

impl<R: ItcRegisters + Sync> InterruptRegistry for InterruptController<R> {
    fn set_handler(&self, source: Source, handler: &'static dyn InterruptHandler) {
        InterruptController::set_handler(self, source, handler)
    }

    fn set_priority(&self, source: Source, priority: Priority) {
        InterruptController::set_priority(self, source, priority)
    }

    fn enable_interrupt(&self, source: Source) {
        InterruptController::enable_interrupt(self, source)
    }

    fn disable_interrupt(&self, source: Source) {
        InterruptController::disable_interrupt(self, source)
    }
}
