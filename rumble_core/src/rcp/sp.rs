//! The RSP interface: DMA between RDRAM and the RSP memories, and the RSP status.

use super::SetClear;
use strum::{FromRepr, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    MemAddr,
    DramAddr,
    /// Writing it copies RDRAM to the RSP memories.
    RdLen,
    /// Writing it copies the RSP memories to RDRAM.
    WrLen,
    Status,
    DmaFull,
    DmaBusy,
    Semaphore,
}

impl Reg {
    #[inline(always)]
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::from_repr((offset >> 2) as u8)
    }
}

pub mod status {
    pub const HALT: u32 = 1 << 0;
    pub const BROKE: u32 = 1 << 1;
    pub const DMA_BUSY: u32 = 1 << 2;
    pub const DMA_FULL: u32 = 1 << 3;
    pub const IO_FULL: u32 = 1 << 4;
    pub const SINGLE_STEP: u32 = 1 << 5;
    pub const INTERRUPT_ON_BREAK: u32 = 1 << 6;
    /// First of the eight signal bits. Signal `n` is `SIGNAL_0 << n`.
    pub const SIGNAL_0: u32 = 1 << 7;
    /// Signal 1, set once a yielded task has been saved.
    pub const YIELDED: u32 = SIGNAL_0 << 1;
    /// Signal 2, set once a task completes.
    pub const TASK_DONE: u32 = SIGNAL_0 << 2;
}

const STATUS_PAIRS: [SetClear; 11] = [
    SetClear::new(1 << 0, 1 << 1, status::HALT),
    SetClear::new(1 << 2, 0, status::BROKE),
    SetClear::new(1 << 5, 1 << 6, status::SINGLE_STEP),
    SetClear::new(1 << 7, 1 << 8, status::INTERRUPT_ON_BREAK),
    SetClear::new(1 << 9, 1 << 10, status::SIGNAL_0),
    SetClear::new(1 << 11, 1 << 12, status::SIGNAL_0 << 1),
    SetClear::new(1 << 13, 1 << 14, status::SIGNAL_0 << 2),
    SetClear::new(1 << 15, 1 << 16, status::SIGNAL_0 << 3),
    SetClear::new(1 << 17, 1 << 18, status::SIGNAL_0 << 4),
    SetClear::new(1 << 19, 1 << 20, status::SIGNAL_0 << 5),
    SetClear::new(1 << 21, 1 << 22, status::SIGNAL_0 << 6),
];

const SIGNAL_7_PAIR: SetClear = SetClear::new(1 << 23, 1 << 24, status::SIGNAL_0 << 7);

const WRITE_CLEAR_INTERRUPT: u32 = 1 << 3;
const WRITE_SET_INTERRUPT: u32 = 1 << 4;

/// Consequences of a status write that the owner of the RSP interface must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusWrite {
    pub clear_interrupt: bool,
    pub set_interrupt: bool,
    /// The RSP left the halted state and should run its task.
    pub resume: bool,
}

/// The decoded shape of a DMA length register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaShape {
    /// Bytes per row, always a multiple of 8.
    pub length: u32,
    /// Number of rows.
    pub count: u32,
    /// Bytes skipped in RDRAM after every row.
    pub skip: u32,
}

impl DmaShape {
    pub fn decode(value: u32) -> Self {
        Self {
            length: ((value & 0xFFF) | 7) + 1,
            count: ((value >> 12) & 0xFF) + 1,
            skip: (value >> 20) & 0xFFF,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sp {
    pub regs: [u32; 8],
    pub pc: u32,
    pub ibist: u32,
}

impl Default for Sp {
    fn default() -> Self {
        let mut regs = [0; 8];
        regs[Reg::Status as usize] = status::HALT;

        Self {
            regs,
            pc: 0,
            ibist: 0,
        }
    }
}

impl Sp {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) {
        self.regs[reg as usize] = value;
    }

    #[inline(always)]
    pub fn status(&self) -> u32 {
        self.read(Reg::Status)
    }

    #[inline(always)]
    pub fn set_status_bits(&mut self, bits: u32) {
        self.regs[Reg::Status as usize] |= bits;
    }

    /// Reads the semaphore, which becomes taken as a side effect.
    pub fn read_semaphore(&mut self) -> u32 {
        let value = self.read(Reg::Semaphore);
        self.write(Reg::Semaphore, 1);
        value
    }

    /// Handles a write to the status register.
    pub fn write_status(&mut self, value: u32) -> StatusWrite {
        let mut status = SetClear::apply(&STATUS_PAIRS, value, self.status());
        status = SetClear::apply(&[SIGNAL_7_PAIR], value, status);
        self.write(Reg::Status, status);

        let unhalting = value & ((1 << 0) | (1 << 2)) != 0;
        StatusWrite {
            clear_interrupt: value & WRITE_CLEAR_INTERRUPT != 0,
            set_interrupt: value & WRITE_SET_INTERRUPT != 0,
            resume: unhalting && status & (status::HALT | status::BROKE) == 0,
        }
    }

    /// Whether the RSP is running.
    #[inline(always)]
    pub fn running(&self) -> bool {
        self.status() & (status::HALT | status::BROKE) == 0
    }
}
