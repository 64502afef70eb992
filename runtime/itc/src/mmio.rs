//! Memory-mapped controller backend for the reference board
//!
//! MC1322x-class ITC register block. Register offsets and the board's
//! source numbers live here and nowhere else; the controller logic only
//! sees [`ItcRegisters`].

use core::ptr::{read_volatile, write_volatile};

use bitflags::bitflags;

use crate::{ItcRegisters, Priority, Source};

/// ITC base address on the reference board
pub const ITC_BASE: usize = 0x8002_0000;

/// ITC register offsets
const INTCNTL: usize = 0x00;   // Control
const INTENNUM: usize = 0x08;  // Enable one source by number
const INTDISNUM: usize = 0x0C; // Disable one source by number
const INTENABLE: usize = 0x10; // Enable mask
const INTTYPE: usize = 0x14;   // 1 = fast, 0 = normal
const NIVECTOR: usize = 0x28;  // Highest pending normal source
const FIVECTOR: usize = 0x2C;  // Highest pending fast source
const INTFRC: usize = 0x34;    // Force mask
const NIPEND: usize = 0x38;    // Pending normal mask
const FIPEND: usize = 0x3C;    // Pending fast mask

bitflags! {
    /// INTCNTL bits used by this driver
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntControl: u32 {
        /// Fast interrupt arbitration disabled
        const FIDIS = 1 << 19;
        /// Normal interrupt arbitration disabled
        const NIDIS = 1 << 20;
    }
}

/// Interrupt source numbers on the reference board
pub mod sources {
    use crate::Source;

    pub const ASM: Source = Source::from_id(0);
    pub const UART1: Source = Source::from_id(1);
    pub const UART2: Source = Source::from_id(2);
    pub const CRM: Source = Source::from_id(3);
    pub const I2C: Source = Source::from_id(4);
    pub const TIMER: Source = Source::from_id(5);
    pub const SPIF: Source = Source::from_id(6);
    pub const MACA: Source = Source::from_id(7);
    pub const SSI: Source = Source::from_id(8);
    pub const ADC: Source = Source::from_id(9);
    pub const SPI: Source = Source::from_id(10);
}

/// MC1322x interrupt controller registers
pub struct Mc1322xItc {
    base: usize,
}

impl Mc1322xItc {
    /// Wrap the register block at `base`
    ///
    /// # Safety
    /// The caller must ensure that `base` points to valid ITC MMIO registers
    /// and that no other code accesses them.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        // SAFETY: `new` requires `base` to map the ITC register block
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl ItcRegisters for Mc1322xItc {
    fn enable_mask(&self) -> u32 {
        self.read_reg(INTENABLE)
    }

    fn set_enable_mask(&self, mask: u32) {
        self.write_reg(INTENABLE, mask);
    }

    fn enable_source(&self, source: Source) {
        self.write_reg(INTENNUM, source.id() as u32);
    }

    fn disable_source(&self, source: Source) {
        self.write_reg(INTDISNUM, source.id() as u32);
    }

    fn set_fast(&self, source: Source, fast: bool) {
        let types = self.read_reg(INTTYPE);
        let types = if fast {
            types | source.bit()
        } else {
            types & !source.bit()
        };
        self.write_reg(INTTYPE, types);
    }

    fn is_fast(&self, source: Source) -> bool {
        self.read_reg(INTTYPE) & source.bit() != 0
    }

    fn forced(&self) -> u32 {
        self.read_reg(INTFRC)
    }

    fn set_forced(&self, mask: u32) {
        self.write_reg(INTFRC, mask);
    }

    fn enable_arbitration(&self) {
        let control = IntControl::from_bits_retain(self.read_reg(INTCNTL));
        let control = control - (IntControl::FIDIS | IntControl::NIDIS);
        self.write_reg(INTCNTL, control.bits());
    }

    fn pending_vector(&self, class: Priority) -> Option<Source> {
        let (pending, vector) = match class {
            Priority::Normal => (NIPEND, NIVECTOR),
            Priority::Fast => (FIPEND, FIVECTOR),
        };

        if self.read_reg(pending) == 0 {
            return None;
        }
        Source::new(self.read_reg(vector) as u8).ok()
    }
}
