//! Blocking serial handle for console-style output

use core::fmt;

/// Byte-granular blocking I/O on numbered lines
///
/// Implemented by [`UartDriver`](crate::UartDriver); lets consumers such as
/// [`SerialPort`] stay independent of the driver's type parameters.
pub trait BlockingSerial: Sync {
    /// Write one byte, waiting for the hardware to accept it
    fn send_byte(&self, line: usize, byte: u8);

    /// Read one byte, waiting for one to arrive
    fn receive_byte(&self, line: usize) -> u8;
}

/// One line of a [`BlockingSerial`], usable with `write!`
///
/// `\n` is sent as `\r\n` for terminals.
#[derive(Clone, Copy)]
pub struct SerialPort<'a> {
    serial: &'a dyn BlockingSerial,
    line: usize,
}

impl<'a> SerialPort<'a> {
    pub fn new(serial: &'a dyn BlockingSerial, line: usize) -> Self {
        Self { serial, line }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Write one raw byte (no newline translation)
    pub fn write_byte(&self, byte: u8) {
        self.serial.send_byte(self.line, byte);
    }

    pub fn read_byte(&self) -> u8 {
        self.serial.receive_byte(self.line)
    }

    /// Write `bytes`, translating LF to CRLF
    pub fn write_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for SerialPort<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use spin::Mutex;
    use std::vec::Vec;

    #[derive(Default)]
    struct Loopback {
        wire: Mutex<Vec<(usize, u8)>>,
    }

    impl BlockingSerial for Loopback {
        fn send_byte(&self, line: usize, byte: u8) {
            self.wire.lock().push((line, byte));
        }

        fn receive_byte(&self, _line: usize) -> u8 {
            b'?'
        }
    }

    #[test]
    fn test_write_translates_newlines() {
        let serial = Loopback::default();
        let mut port = SerialPort::new(&serial, 1);

        write!(port, "ok\n{}\n", 7).unwrap();

        let wire: Vec<(usize, u8)> = serial.wire.lock().clone();
        assert!(wire.iter().all(|&(line, _)| line == 1));
        let bytes: Vec<u8> = wire.into_iter().map(|(_, b)| b).collect();
        assert_eq!(bytes, b"ok\r\n7\r\n");
    }

    #[test]
    fn test_raw_byte_not_translated() {
        let serial = Loopback::default();
        let port = SerialPort::new(&serial, 0);

        port.write_byte(b'\n');
        assert_eq!(*serial.wire.lock(), vec![(0, b'\n')]);
        assert_eq!(port.read_byte(), b'?');
    }
}
