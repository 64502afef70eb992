//! UART driver: initialization, level 0, level 1 and the interrupt handler

use core::marker::PhantomData;

use log::{debug, info, trace, warn};
use mcu_itc::{InterruptHandler, InterruptRegistry, Priority, Source};
use spin::relax::{RelaxStrategy, Spin};

use crate::config::LineConfig;
use crate::gpio::{Gpio, PinDirection};
use crate::line::Line;
use crate::port::{BlockingSerial, SerialPort};
use crate::regs::{BaudDivisor, LineErrors, UartRegisters, UartStatus};
use crate::{Callback, Direction, Result, UartError};

/// Interrupt-driven driver for `LINES` UART lines
///
/// Lives for the whole program (normally in a `static` or leaked), because
/// [`init`](Self::init) registers it with the interrupt controller.
///
/// `W` is how level-0 calls wait for the hardware. The default spins.
pub struct UartDriver<R, G, const LINES: usize, W = Spin> {
    itc: &'static dyn InterruptRegistry,
    gpio: G,
    core_clock_hz: u32,
    lines: [Line<R>; LINES],
    _relax: PhantomData<fn() -> W>,
}

impl<R, G, const LINES: usize, W> UartDriver<R, G, LINES, W>
where
    R: UartRegisters + Sync + 'static,
    G: Gpio + Sync + 'static,
    W: RelaxStrategy + 'static,
{
    /// Create a driver over `lines`
    ///
    /// No hardware is touched until [`init`](Self::init).
    pub fn new(
        itc: &'static dyn InterruptRegistry,
        gpio: G,
        core_clock_hz: u32,
        lines: [LineConfig<R>; LINES],
    ) -> Self {
        Self {
            itc,
            gpio,
            core_clock_hz,
            lines: lines.map(Line::new),
            _relax: PhantomData,
        }
    }

    /// Bring up `line` at `baud_rate` under `device_name`
    ///
    /// Programs the divisor and pins, clears both buffers, callbacks and
    /// status counters, registers the line's interrupt and unmasks receive.
    /// Transmit stays masked until there is something to send.
    ///
    /// Arguments are checked before anything is modified.
    pub fn init(
        &'static self,
        line: usize,
        baud_rate: u32,
        device_name: &'static str,
    ) -> Result<()> {
        let l = self.line(line)?;
        if device_name.is_empty() {
            return Err(UartError::InvalidArgument("empty device name"));
        }
        if baud_rate == 0 {
            return Err(UartError::InvalidArgument("baud rate must be non-zero"));
        }
        let divisor = BaudDivisor::for_baud(baud_rate, self.core_clock_hz)
            .ok_or(UartError::InvalidArgument("baud rate out of range for core clock"))?;

        let rx = l.suppress(Direction::Rx);
        let tx = l.suppress(Direction::Tx);

        l.regs.configure(divisor);
        self.configure_pins(l);

        rx.buffer().clear();
        tx.buffer().clear();
        rx.set_callback(None);
        tx.set_callback(None);
        l.regs.set_fifo_levels(l.fifo);

        self.itc.set_priority(l.source, Priority::Normal);
        self.itc.set_handler(l.source, self);
        self.itc.enable_interrupt(l.source);

        l.reset_status();
        l.set_name(device_name);

        // Nothing to send yet; receive is live once the guards drop
        tx.park();
        rx.unpark();
        drop(tx);
        drop(rx);

        info!(
            "[UART] {} (line {}) initialized at {} baud (divisor {:#x}, {})",
            device_name,
            line,
            baud_rate,
            divisor.register_value(),
            l.source
        );
        Ok(())
    }

    fn configure_pins(&self, line: &Line<R>) {
        let pins = line.pins;
        for pin in pins.outputs().into_iter().chain(pins.inputs()) {
            self.gpio.set_pin_function(pin, pins.function);
        }
        for pin in pins.outputs() {
            self.gpio.set_pin_direction(pin, PinDirection::Output);
        }
        for pin in pins.inputs() {
            self.gpio.set_pin_direction(pin, PinDirection::Input);
        }
        debug!(
            "[UART] Pins tx={} rx={} cts={} rts={} ({:?})",
            pins.tx.id(),
            pins.rx.id(),
            pins.cts.id(),
            pins.rts.id(),
            pins.function
        );
    }

    fn line(&self, line: usize) -> Result<&Line<R>> {
        self.lines.get(line).ok_or(UartError::NoSuchDevice { line })
    }

    #[cfg(test)]
    pub(crate) fn line_state(&self, line: usize) -> &Line<R> {
        &self.lines[line]
    }

    fn line_or_panic(&self, line: usize) -> &Line<R> {
        match self.lines.get(line) {
            Some(l) => l,
            None => panic!("[UART] No such device: UART line {}", line),
        }
    }

    // ---- Level 0 ----

    /// Transmit `byte`, blocking until the FIFO accepts it
    ///
    /// Bytes already queued by [`send`](Self::send) go out first.
    ///
    /// # Panics
    /// Panics if `line` does not exist.
    pub fn send_byte(&self, line: usize, byte: u8) {
        let l = self.line_or_panic(line);
        let guard = l.suppress(Direction::Tx);

        // One byte per lock: the buffer is never held while waiting
        loop {
            let Some(queued) = guard.buffer().read() else { break };
            self.wait_tx_room(l);
            l.regs.write_data(queued);
        }

        self.wait_tx_room(l);
        l.regs.write_data(byte);

        // Buffer is empty now
        guard.park();
    }

    /// Receive one byte, blocking until one is available
    ///
    /// Buffered bytes are returned before the FIFO is read.
    ///
    /// # Panics
    /// Panics if `line` does not exist.
    pub fn receive_byte(&self, line: usize) -> u8 {
        let l = self.line_or_panic(line);
        let guard = l.suppress(Direction::Rx);

        let buffered = guard.buffer().read();
        if let Some(byte) = buffered {
            guard.unpark();
            return byte;
        }

        while l.regs.rx_level() == 0 {
            W::relax();
        }
        l.regs.read_data()
    }

    fn wait_tx_room(&self, line: &Line<R>) {
        while line.regs.tx_room() == 0 {
            W::relax();
        }
    }

    // ---- Level 1 ----

    /// Queue `bytes` for transmission without blocking
    ///
    /// Returns how many bytes were queued: fewer than `bytes.len()` when the
    /// buffer fills up, 0 when it already was full.
    pub fn send(&self, line: usize, bytes: &[u8]) -> Result<usize> {
        let l = self.line(line)?;
        if bytes.is_empty() {
            return Err(UartError::InvalidArgument("empty send buffer"));
        }

        let guard = l.suppress(Direction::Tx);
        let queued = {
            let mut buffer = guard.buffer();
            bytes.iter().take_while(|&&byte| buffer.write(byte)).count()
        };
        if queued > 0 {
            guard.unpark();
        }
        Ok(queued)
    }

    /// Take up to `out.len()` received bytes without blocking
    ///
    /// Returns how many bytes were copied; 0 leaves `out` untouched.
    pub fn receive(&self, line: usize, out: &mut [u8]) -> Result<usize> {
        let l = self.line(line)?;
        if out.is_empty() {
            return Err(UartError::InvalidArgument("empty receive buffer"));
        }

        let guard = l.suppress(Direction::Rx);
        let received = {
            let mut buffer = guard.buffer();
            out.iter_mut()
                .map_while(|slot| buffer.read().map(|byte| *slot = byte))
                .count()
        };
        if received > 0 {
            // Room again: release receive backpressure
            guard.unpark();
        }
        Ok(received)
    }

    /// Install the callback run after the handler receives bytes
    pub fn set_receive_callback(&self, line: usize, callback: Option<Callback>) -> Result<()> {
        self.set_callback(line, Direction::Rx, callback)
    }

    /// Install the callback run after the handler transmits bytes
    pub fn set_send_callback(&self, line: usize, callback: Option<Callback>) -> Result<()> {
        self.set_callback(line, Direction::Tx, callback)
    }

    fn set_callback(
        &self,
        line: usize,
        direction: Direction,
        callback: Option<Callback>,
    ) -> Result<()> {
        let l = self.line(line)?;
        if callback.is_none() {
            return Err(UartError::InvalidArgument("missing callback"));
        }
        l.suppress(direction).set_callback(callback);
        Ok(())
    }

    // ---- Queries ----

    /// Name given to `line` by [`init`](Self::init)
    pub fn device_name(&self, line: usize) -> Option<&'static str> {
        self.lines.get(line).and_then(Line::name)
    }

    /// Line initialized under `name`
    pub fn find_line(&self, name: &str) -> Option<usize> {
        self.lines.iter().position(|l| l.name() == Some(name))
    }

    /// Bytes the handler dropped because the receive buffer was full
    pub fn rx_overruns(&self, line: usize) -> Result<u32> {
        Ok(self.line(line)?.overruns())
    }

    /// Hardware error flags seen since the last call
    pub fn take_line_errors(&self, line: usize) -> Result<LineErrors> {
        Ok(self.line(line)?.take_errors())
    }

    /// Bytes waiting in the receive buffer
    pub fn rx_pending(&self, line: usize) -> Result<usize> {
        Ok(self.line(line)?.pending(Direction::Rx))
    }

    /// Bytes waiting in the transmit buffer
    pub fn tx_pending(&self, line: usize) -> Result<usize> {
        Ok(self.line(line)?.pending(Direction::Tx))
    }

    /// Register block of `line`
    pub fn registers(&self, line: usize) -> Option<&R> {
        self.lines.get(line).map(|l| &l.regs)
    }

    /// GPIO controller used for pin setup
    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Blocking `fmt::Write` handle on `line`
    pub fn port(&self, line: usize) -> Result<SerialPort<'_>> {
        self.line(line)?;
        Ok(SerialPort::new(self, line))
    }

    // ---- Interrupt context ----

    fn service(&self, index: usize, line: &Line<R>) {
        // Masked in hardware; only reachable through a stale or forced vector
        if line.is_held() {
            trace!("[UART] Line {} held by foreground, deferred", index);
            return;
        }

        let status = line.regs.status();
        let errors = status.errors();
        if !errors.is_empty() {
            line.latch_errors(errors);
            if errors.contains(LineErrors::RX_OVERRUN) {
                warn!("[UART] Line {}: hardware receive overrun", index);
            }
        }
        trace!("[UART] Line {} status {:?}", index, status);

        let rx_ready = status.contains(UartStatus::RX_READY) || line.regs.rx_level() > 0;
        if rx_ready && !line.is_guarded(Direction::Rx) {
            self.service_rx(index, line);
        }
        if !line.is_guarded(Direction::Tx) && !line.is_parked(Direction::Tx) {
            self.service_tx(index, line);
        }
    }

    fn service_rx(&self, index: usize, line: &Line<R>) {
        let channel = line.channel(Direction::Rx);
        let Some(mut buffer) = channel.try_buffer() else {
            warn!("[UART] Line {}: receive buffer busy, skipped", index);
            return;
        };

        let mut moved = 0usize;
        let mut dropped = 0u32;
        while line.regs.rx_level() > 0 {
            let byte = line.regs.read_data();
            if buffer.write(byte) {
                moved += 1;
            } else {
                dropped += 1;
            }
        }
        drop(buffer);

        if dropped > 0 {
            line.add_overruns(dropped);
            warn!("[UART] Line {}: receive buffer full, dropped {} bytes", index, dropped);
        }

        if moved > 0 {
            if let Some(callback) = channel.callback() {
                callback(index);
            }
        }

        // The callback may have drained the buffer
        if let Some(buffer) = channel.try_buffer() {
            let full = buffer.is_full();
            drop(buffer);
            line.set_parked(Direction::Rx, full);
        }
    }

    fn service_tx(&self, index: usize, line: &Line<R>) {
        let channel = line.channel(Direction::Tx);
        let Some(mut buffer) = channel.try_buffer() else {
            warn!("[UART] Line {}: transmit buffer busy, skipped", index);
            return;
        };

        let mut moved = 0usize;
        while !buffer.is_empty() && line.regs.tx_room() > 0 {
            let Some(byte) = buffer.read() else { break };
            line.regs.write_data(byte);
            moved += 1;
        }
        drop(buffer);

        if moved > 0 {
            if let Some(callback) = channel.callback() {
                callback(index);
            }
        }

        // The callback may have queued more
        if let Some(buffer) = channel.try_buffer() {
            let empty = buffer.is_empty();
            drop(buffer);
            line.set_parked(Direction::Tx, empty);
        }
    }
}

impl<R, G, const LINES: usize, W> InterruptHandler for UartDriver<R, G, LINES, W>
where
    R: UartRegisters + Sync + 'static,
    G: Gpio + Sync + 'static,
    W: RelaxStrategy + 'static,
{
    fn on_interrupt(&self, source: Source) {
        match self.lines.iter().position(|l| l.source == source) {
            Some(index) => self.service(index, &self.lines[index]),
            None => warn!("[UART] Interrupt from {} maps to no line", source),
        }
    }
}

impl<R, G, const LINES: usize, W> BlockingSerial for UartDriver<R, G, LINES, W>
where
    R: UartRegisters + Sync + 'static,
    G: Gpio + Sync + 'static,
    W: RelaxStrategy + 'static,
{
    fn send_byte(&self, line: usize, byte: u8) {
        UartDriver::send_byte(self, line, byte)
    }

    fn receive_byte(&self, line: usize) -> u8 {
        UartDriver::receive_byte(self, line)
    }
}
