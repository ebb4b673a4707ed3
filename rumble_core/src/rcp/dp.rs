//! The RDP command and span interfaces.

use super::SetClear;
use strum::{FromRepr, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    Start,
    End,
    Current,
    Status,
    Clock,
    BufBusy,
    PipeBusy,
    Tmem,
}

impl Reg {
    #[inline(always)]
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::from_repr((offset >> 2) as u8)
    }
}

pub mod status {
    pub const XBUS_DMEM_DMA: u32 = 1 << 0;
    pub const FREEZE: u32 = 1 << 1;
    pub const FLUSH: u32 = 1 << 2;
    pub const START_GCLK: u32 = 1 << 3;
    pub const TMEM_BUSY: u32 = 1 << 4;
    pub const PIPE_BUSY: u32 = 1 << 5;
    pub const CMD_BUSY: u32 = 1 << 6;
    pub const CBUF_READY: u32 = 1 << 7;
}

const STATUS_PAIRS: [SetClear; 3] = [
    SetClear::new(1 << 0, 1 << 1, status::XBUS_DMEM_DMA),
    SetClear::new(1 << 2, 1 << 3, status::FREEZE),
    SetClear::new(1 << 4, 1 << 5, status::FLUSH),
];

const WRITE_CLEAR_TMEM: u32 = 1 << 6;
const WRITE_CLEAR_PIPE: u32 = 1 << 7;
const WRITE_CLEAR_CMD: u32 = 1 << 8;
const WRITE_CLEAR_CLOCK: u32 = 1 << 9;

#[derive(Debug, Clone, Default)]
pub struct Dpc {
    pub regs: [u32; 8],
}

impl Dpc {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) {
        self.regs[reg as usize] = value;
    }

    /// Handles a write to the start register, which also rewinds the current pointer.
    pub fn write_start(&mut self, value: u32) {
        self.write(Reg::Start, value);
        self.write(Reg::Current, value);
    }

    /// Handles a write to the status register. Returns whether the RDP was unfrozen.
    pub fn write_status(&mut self, value: u32) -> bool {
        let before = self.read(Reg::Status);
        let status = SetClear::apply(&STATUS_PAIRS, value, before);
        self.write(Reg::Status, status);

        if value & WRITE_CLEAR_TMEM != 0 {
            self.write(Reg::Tmem, 0);
        }

        if value & WRITE_CLEAR_PIPE != 0 {
            self.write(Reg::PipeBusy, 0);
        }

        if value & WRITE_CLEAR_CMD != 0 {
            self.write(Reg::BufBusy, 0);
        }

        if value & WRITE_CLEAR_CLOCK != 0 {
            self.write(Reg::Clock, 0);
        }

        before & status::FREEZE != 0 && status & status::FREEZE == 0
    }

    #[inline(always)]
    pub fn frozen(&self) -> bool {
        self.read(Reg::Status) & status::FREEZE != 0
    }
}

/// The span interface: test registers that only store what is written.
#[derive(Debug, Clone, Default)]
pub struct Dps {
    pub regs: [u32; 4],
}
