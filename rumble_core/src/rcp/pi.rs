//! The peripheral interface: DMA between RDRAM and the cartridge.

use strum::{FromRepr, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    DramAddr,
    CartAddr,
    /// Writing it copies RDRAM to the cartridge.
    RdLen,
    /// Writing it copies the cartridge to RDRAM.
    WrLen,
    Status,
    Dom1Latency,
    Dom1PulseWidth,
    Dom1PageSize,
    Dom1Release,
    Dom2Latency,
    Dom2PulseWidth,
    Dom2PageSize,
    Dom2Release,
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
    pub const ERROR: u32 = 1 << 2;
}

/// Written to the status register to acknowledge the PI interrupt.
pub const STATUS_CLEAR_INTERRUPT: u32 = 1 << 1;

#[derive(Debug, Clone, Default)]
pub struct Pi {
    pub regs: [u32; 13],
}

impl Pi {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) {
        self.regs[reg as usize] = value;
    }

    /// Marks a DMA as in flight.
    pub fn start_dma(&mut self, bits: u32) {
        self.regs[Reg::Status as usize] |= bits;
    }

    /// Marks the DMA in flight as done.
    pub fn finish_dma(&mut self) {
        self.regs[Reg::Status as usize] &= !(status::DMA_BUSY | status::IO_BUSY);
    }

    /// DMA transfer length, as encoded in the length registers.
    #[inline(always)]
    pub fn dma_length(value: u32) -> u32 {
        (value & 0x00FF_FFFF) + 1
    }

    /// Loads the domain 1 timings from the first word of the ROM header.
    pub fn set_dom1_timings(&mut self, header: u32) {
        self.write(Reg::Dom1Latency, header & 0xFF);
        self.write(Reg::Dom1PulseWidth, (header >> 8) & 0xFF);
        self.write(Reg::Dom1PageSize, (header >> 16) & 0x0F);
        self.write(Reg::Dom1Release, (header >> 20) & 0x03);
    }
}
