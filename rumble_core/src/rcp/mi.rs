//! The MIPS interface: interrupt routing between the RCP and the CPU.

use super::SetClear;
use strum::{FromRepr, IntoStaticStr};

/// Value of the version register.
pub const VERSION: u32 = 0x0202_0102;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    Mode,
    Version,
    Intr,
    IntrMask,
}

impl Reg {
    #[inline(always)]
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::from_repr((offset >> 2) as u8)
    }
}

/// An interrupt line of the RCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[repr(u8)]
pub enum Interrupt {
    Sp,
    Si,
    Ai,
    Vi,
    Pi,
    Dp,
}

impl Interrupt {
    #[inline(always)]
    pub const fn bit(self) -> u32 {
        1 << self as u8
    }
}

const MODE_INIT: u32 = 1 << 7;
const MODE_EBUS_TEST: u32 = 1 << 8;
const MODE_RDRAM_REG: u32 = 1 << 9;

const MODE_PAIRS: [SetClear; 3] = [
    SetClear::new(0x0080, 0x0100, MODE_INIT),
    SetClear::new(0x0200, 0x0400, MODE_EBUS_TEST),
    SetClear::new(0x1000, 0x2000, MODE_RDRAM_REG),
];

const MASK_PAIRS: [SetClear; 6] = [
    SetClear::new(0x001, 0x002, Interrupt::Sp.bit()),
    SetClear::new(0x004, 0x008, Interrupt::Si.bit()),
    SetClear::new(0x010, 0x020, Interrupt::Ai.bit()),
    SetClear::new(0x040, 0x080, Interrupt::Vi.bit()),
    SetClear::new(0x100, 0x200, Interrupt::Pi.bit()),
    SetClear::new(0x400, 0x800, Interrupt::Dp.bit()),
];

/// Written to the mode register to acknowledge the DP interrupt.
const MODE_CLEAR_DP: u32 = 0x0800;

#[derive(Debug, Clone, Default)]
pub struct Mi {
    pub mode: u32,
    pub intr: u32,
    pub mask: u32,
}

impl Mi {
    pub fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Mode => self.mode,
            Reg::Version => VERSION,
            Reg::Intr => self.intr,
            Reg::IntrMask => self.mask,
        }
    }

    /// Handles a write to the mode register. Returns whether the DP interrupt was acknowledged.
    pub fn write_mode(&mut self, value: u32) -> bool {
        self.mode = (self.mode & !0x7F) | (value & 0x7F);
        self.mode = SetClear::apply(&MODE_PAIRS, value, self.mode);

        if value & MODE_CLEAR_DP != 0 {
            self.lower(Interrupt::Dp);
            true
        } else {
            false
        }
    }

    /// Handles a write to the mask register.
    pub fn write_mask(&mut self, value: u32) {
        self.mask = SetClear::apply(&MASK_PAIRS, value, self.mask);
    }

    #[inline(always)]
    pub fn raise(&mut self, interrupt: Interrupt) {
        self.intr |= interrupt.bit();
    }

    #[inline(always)]
    pub fn lower(&mut self, interrupt: Interrupt) {
        self.intr &= !interrupt.bit();
    }

    /// Whether any raised interrupt is unmasked.
    #[inline(always)]
    pub fn pending(&self) -> bool {
        self.intr & self.mask != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mask_pairs() {
        let mut mi = Mi::default();
        mi.write_mask(0x0AAA);
        assert_eq!(mi.mask, 0x3F);

        mi.write_mask(0x0041);
        assert_eq!(mi.mask, 0x3F & !(Interrupt::Sp.bit() | Interrupt::Vi.bit()));
    }

    #[test]
    fn mode_acknowledges_dp() {
        let mut mi = Mi::default();
        mi.raise(Interrupt::Dp);
        mi.raise(Interrupt::Vi);

        assert!(mi.write_mode(MODE_CLEAR_DP | 0x15));
        assert_eq!(mi.intr, Interrupt::Vi.bit());
        assert_eq!(mi.mode & 0x7F, 0x15);
    }

    #[test]
    fn pending_needs_mask() {
        let mut mi = Mi::default();
        mi.raise(Interrupt::Ai);
        assert!(!mi.pending());

        mi.write_mask(0x020);
        assert!(mi.pending());
        assert_eq!(mi.read(Reg::Version), VERSION);
    }
}
