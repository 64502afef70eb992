//! Per-line state and per-direction suppression
//!
//! Each direction of a line carries its ring buffer, its callback and two
//! pieces of mask state:
//!
//! - `depth`: number of live foreground [`Suppressed`] guards
//! - `parked`: set by the interrupt handler when it has nothing to do for
//!   the direction (RX buffer full, TX buffer empty)
//!
//! On top of that, the whole line is masked while foreground code holds
//! either buffer lock (`held`). The interrupt handler leaves a held line
//! alone, so a callback can never spin on a lock owned by the code it
//! preempted.
//!
//! The hardware mask always equals `held > 0 || depth > 0 || parked`.
//! Guards nest, so releasing an inner guard never unmasks a direction an
//! outer guard holds.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use mcu_itc::Source;
use mcu_ring::RingBuffer;
use spin::{Mutex, MutexGuard};

use crate::config::{FifoLevels, LineConfig, UartPins};
use crate::regs::{LineErrors, UartRegisters};
use crate::{Callback, Direction};

pub(crate) struct Channel {
    buffer: Mutex<RingBuffer<'static>>,
    callback: Mutex<Option<Callback>>,
    depth: AtomicU8,
    parked: AtomicBool,
}

impl Channel {
    fn new(storage: &'static mut [u8]) -> Self {
        Self {
            buffer: Mutex::new(RingBuffer::new(storage)),
            callback: Mutex::new(None),
            depth: AtomicU8::new(0),
            parked: AtomicBool::new(false),
        }
    }

    /// Buffer access from interrupt context
    ///
    /// `None` if foreground code holds it, which the guard discipline rules
    /// out outside of misuse.
    pub(crate) fn try_buffer(&self) -> Option<MutexGuard<'_, RingBuffer<'static>>> {
        self.buffer.try_lock()
    }

    pub(crate) fn callback(&self) -> Option<Callback> {
        *self.callback.lock()
    }
}

/// One UART line
pub(crate) struct Line<R> {
    pub(crate) regs: R,
    pub(crate) source: Source,
    pub(crate) pins: UartPins,
    pub(crate) fifo: FifoLevels,
    rx: Channel,
    tx: Channel,
    name: Mutex<Option<&'static str>>,
    held: AtomicU8,
    overruns: AtomicU32,
    errors: AtomicU32,
}

impl<R: UartRegisters> Line<R> {
    pub(crate) fn new(config: LineConfig<R>) -> Self {
        Self {
            regs: config.regs,
            source: config.source,
            pins: config.pins,
            fifo: config.fifo,
            rx: Channel::new(config.rx_storage),
            tx: Channel::new(config.tx_storage),
            name: Mutex::new(None),
            held: AtomicU8::new(0),
            overruns: AtomicU32::new(0),
            errors: AtomicU32::new(0),
        }
    }

    pub(crate) fn channel(&self, direction: Direction) -> &Channel {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    /// Mask `direction` until the returned guard is dropped
    pub(crate) fn suppress(&self, direction: Direction) -> Suppressed<'_, R> {
        // Depth first: from here on the handler skips this direction
        self.channel(direction).depth.fetch_add(1, Ordering::AcqRel);
        self.regs.set_masked(direction, true);
        Suppressed {
            line: self,
            direction,
        }
    }

    /// Mask both directions until the returned hold is dropped
    fn hold(&self) -> Hold<'_, R> {
        self.held.fetch_add(1, Ordering::AcqRel);
        self.regs.set_masked(Direction::Rx, true);
        self.regs.set_masked(Direction::Tx, true);
        Hold { line: self }
    }

    /// Whether foreground code is inside one of the line's locks
    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire) > 0
    }

    /// Whether foreground code currently holds a guard on `direction`
    pub(crate) fn is_guarded(&self, direction: Direction) -> bool {
        self.channel(direction).depth.load(Ordering::Acquire) > 0
    }

    pub(crate) fn is_parked(&self, direction: Direction) -> bool {
        self.channel(direction).parked.load(Ordering::Acquire)
    }

    /// Park or unpark `direction` from interrupt context
    pub(crate) fn set_parked(&self, direction: Direction, parked: bool) {
        self.channel(direction).parked.store(parked, Ordering::Release);
        self.sync_mask(direction);
    }

    fn sync_mask(&self, direction: Direction) {
        let masked =
            self.is_held() || self.is_guarded(direction) || self.is_parked(direction);
        self.regs.set_masked(direction, masked);
    }

    pub(crate) fn name(&self) -> Option<&'static str> {
        let _hold = self.hold();
        *self.name.lock()
    }

    pub(crate) fn set_name(&self, name: &'static str) {
        let _hold = self.hold();
        *self.name.lock() = Some(name);
    }

    pub(crate) fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Acquire)
    }

    pub(crate) fn add_overruns(&self, dropped: u32) {
        self.overruns.fetch_add(dropped, Ordering::AcqRel);
    }

    pub(crate) fn latch_errors(&self, errors: LineErrors) {
        if !errors.is_empty() {
            self.errors.fetch_or(errors.bits(), Ordering::AcqRel);
        }
    }

    pub(crate) fn take_errors(&self) -> LineErrors {
        LineErrors::from_bits_truncate(self.errors.swap(0, Ordering::AcqRel))
    }

    /// Zero the overrun counter and latched errors
    pub(crate) fn reset_status(&self) {
        self.overruns.store(0, Ordering::Release);
        self.errors.store(0, Ordering::Release);
    }

    /// Occupancy of a direction's buffer
    pub(crate) fn pending(&self, direction: Direction) -> usize {
        self.suppress(direction).buffer().len()
    }
}

/// Foreground suppression of one direction
///
/// While alive the direction is masked in hardware and the interrupt
/// handler leaves its buffer and callback alone. Dropping it restores the
/// mask to whatever the remaining guards and the park flag require.
#[must_use = "the direction is only suppressed while the guard is alive"]
pub(crate) struct Suppressed<'a, R: UartRegisters> {
    line: &'a Line<R>,
    direction: Direction,
}

impl<'a, R: UartRegisters> Suppressed<'a, R> {
    /// Lock the direction's buffer, masking the whole line meanwhile
    ///
    /// Keep the returned guard short-lived: never wait on hardware with it.
    pub(crate) fn buffer(&self) -> BufferGuard<'a, R> {
        let hold = self.line.hold();
        BufferGuard {
            buffer: self.line.channel(self.direction).buffer.lock(),
            _hold: hold,
        }
    }

    pub(crate) fn set_callback(&self, callback: Option<Callback>) {
        let _hold = self.line.hold();
        *self.line.channel(self.direction).callback.lock() = callback;
    }

    /// Leave the direction masked once all guards are gone
    ///
    /// The mask itself is written when the guard drops.
    pub(crate) fn park(&self) {
        self.line
            .channel(self.direction)
            .parked
            .store(true, Ordering::Release);
    }

    /// Let the direction interrupt again once all guards are gone
    pub(crate) fn unpark(&self) {
        self.line
            .channel(self.direction)
            .parked
            .store(false, Ordering::Release);
    }
}

impl<R: UartRegisters> Drop for Suppressed<'_, R> {
    fn drop(&mut self) {
        self.line
            .channel(self.direction)
            .depth
            .fetch_sub(1, Ordering::AcqRel);
        self.line.sync_mask(self.direction);
    }
}

/// Whole-line mask held across a foreground lock
struct Hold<'a, R: UartRegisters> {
    line: &'a Line<R>,
}

impl<R: UartRegisters> Drop for Hold<'_, R> {
    fn drop(&mut self) {
        self.line.held.fetch_sub(1, Ordering::AcqRel);
        self.line.sync_mask(Direction::Rx);
        self.line.sync_mask(Direction::Tx);
    }
}

/// Foreground lock on a direction's buffer
pub(crate) struct BufferGuard<'a, R: UartRegisters> {
    // Unlocked before the hold is released
    buffer: MutexGuard<'a, RingBuffer<'static>>,
    _hold: Hold<'a, R>,
}

impl<R: UartRegisters> Deref for BufferGuard<'_, R> {
    type Target = RingBuffer<'static>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl<R: UartRegisters> DerefMut for BufferGuard<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}
