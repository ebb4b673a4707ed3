//! The serial interface: DMA between RDRAM and the PIF RAM.

use strum::{FromRepr, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    DramAddr,
    /// Writing it copies the PIF RAM to RDRAM.
    PifAddrRd64b,
    Reserved2,
    Reserved3,
    /// Writing it copies RDRAM to the PIF RAM.
    PifAddrWr64b,
    Reserved5,
    Status,
}

impl Reg {
    #[inline(always)]
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::from_repr((offset >> 2) as u8)
    }
}

pub mod status {
    pub const DMA_BUSY: u32 = 1 << 0;
    pub const IO_BUSY: u32 = 1 << 1;
    pub const ERROR: u32 = 1 << 3;
    pub const INTERRUPT: u32 = 1 << 12;
}

#[derive(Debug, Clone, Default)]
pub struct Si {
    pub regs: [u32; 7],
}

impl Si {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) {
        self.regs[reg as usize] = value;
    }

    /// Marks a transfer as complete and the interrupt as raised.
    pub fn complete(&mut self) {
        let status = &mut self.regs[Reg::Status as usize];
        *status &= !(status::DMA_BUSY | status::IO_BUSY);
        *status |= status::INTERRUPT;
    }

    /// Acknowledges the interrupt.
    pub fn acknowledge(&mut self) {
        self.regs[Reg::Status as usize] &= !status::INTERRUPT;
    }
}
