//! The flash RAM command state machine.

use super::{SaveMedium, log_error};
use tracing::{trace, warn};

/// Offset of the command register on domain 2.
pub const COMMAND_OFFSET: u32 = 0x0001_0000;
/// Size of an erase sector and of a write page.
pub const PAGE_LEN: usize = 128;

const STATUS_ERASE: u64 = 0x1111_8008_00C2_0000;
const STATUS_ERASE_OFFSET: u64 = 0x1111_8004_00C2_0000;
const STATUS_ID: u64 = 0x1111_8001_00C2_0000;
const STATUS_READ: u64 = 0x1111_8004_F000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Erase,
    Write,
    Read,
    Status,
}

pub struct FlashRam {
    pub mode: Mode,
    pub status: u64,
    pub erase_offset: usize,
    /// RDRAM address of the page buffered for the next write.
    pub write_pointer: u32,
    medium: Box<dyn SaveMedium>,
}

impl std::fmt::Debug for FlashRam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashRam")
            .field("mode", &self.mode)
            .field("status", &format_args!("0x{:016X}", self.status))
            .field("erase_offset", &self.erase_offset)
            .field("write_pointer", &self.write_pointer)
            .finish_non_exhaustive()
    }
}

impl FlashRam {
    pub fn new(medium: Box<dyn SaveMedium>) -> Self {
        Self {
            mode: Mode::Idle,
            status: 0,
            erase_offset: 0,
            write_pointer: 0,
            medium,
        }
    }

    /// Reads a word of the status register.
    pub fn read_status(&self, offset: u32) -> u32 {
        if offset & 4 == 0 {
            (self.status >> 32) as u32
        } else {
            self.status as u32
        }
    }

    /// Executes a command written to the command register.
    pub fn command(&mut self, value: u32, rdram: &[u8]) {
        trace!(target: "cart", "flash command 0x{value:08X}");

        match value >> 24 {
            0x4B => {
                self.mode = Mode::Erase;
                self.erase_offset = (value & 0xFFFF) as usize * PAGE_LEN;
            }
            0x78 => {
                self.mode = Mode::Erase;
                self.status = STATUS_ERASE;
            }
            0xA5 => {
                self.erase_offset = (value & 0xFFFF) as usize * PAGE_LEN;
                self.status = STATUS_ERASE_OFFSET;
            }
            0xB4 => self.mode = Mode::Write,
            0xD2 => self.execute(rdram),
            0xE1 => {
                self.mode = Mode::Status;
                self.status = STATUS_ID;
            }
            0xF0 => {
                self.mode = Mode::Read;
                self.status = STATUS_READ;
            }
            _ => warn!(target: "cart", "unknown flash command 0x{value:08X}"),
        }
    }

    fn execute(&mut self, rdram: &[u8]) {
        match self.mode {
            Mode::Erase => {
                let page = [0xFF; PAGE_LEN];
                log_error("flash", self.medium.write(self.erase_offset, &page));
            }
            Mode::Write => {
                let start = self.write_pointer as usize;
                let page = rdram.get(start..start + PAGE_LEN).unwrap_or_default();
                log_error("flash", self.medium.write(self.erase_offset, page));
            }
            mode => warn!(target: "cart", "flash execute in {mode:?} mode"),
        }
    }

    /// Copies from the flash to `rdram`, as a PI DMA.
    pub fn dma_read(&mut self, cart_addr: u32, rdram: &mut [u8]) {
        match self.mode {
            Mode::Status => {
                let high = ((self.status >> 32) as u32).to_be_bytes();
                let low = (self.status as u32).to_be_bytes();
                for (dst, src) in rdram.iter_mut().zip(high.iter().chain(&low)) {
                    *dst = *src;
                }
            }
            Mode::Read => {
                let offset = (cart_addr & 0xFFFF) as usize * 2;
                log_error("flash", self.medium.read(offset, rdram));
            }
            mode => warn!(target: "cart", "flash DMA read in {mode:?} mode"),
        }
    }

    /// Handles a DMA to the flash. The page stays in RDRAM at `dram_addr` until it is executed.
    pub fn dma_write(&mut self, dram_addr: u32) {
        match self.mode {
            Mode::Write => self.write_pointer = dram_addr,
            mode => warn!(target: "cart", "flash DMA write in {mode:?} mode"),
        }
    }
}
