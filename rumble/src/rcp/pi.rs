use crate::{Machine, scheduler::Event};
use rumble_core::{
    mem::{RDRAM_BASE_LEN, RDRAM_LEN, ROM_START},
    rcp::{
        mi::Interrupt,
        pi::{Pi, Reg, STATUS_CLEAR_INTERRUPT, status},
    },
    write_masked,
};
use tracing::{debug, trace, warn};

/// Start of cartridge domain 2, where save media live.
const CART_SAVE_START: u32 = 0x0800_0000;
/// Start of the PIF as seen by the PI.
const PIF_START: u32 = 0x1FC0_0000;
/// Completion delay of DMAs that don't read the ROM.
const SHORT_DMA_DELAY: u32 = 0x1000;
/// Cartridge address of the copy the boot code makes of the game's entry code.
const BOOT_COPY_ADDR: u32 = 0x1000_1000;
/// Last RDRAM byte a ROM DMA may write.
const RDRAM_LIMIT: usize = 0x7F_FFFF;

/// Status bit that resets the DMA controller when written.
const STATUS_RESET: u32 = 1 << 0;

impl Machine {
    pub(crate) fn read_pi(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(reg) => self.rcp.pi.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_pi(&mut self, offset: u32, value: u32, mask: u32) {
        let Some(reg) = Reg::from_offset(offset) else {
            return;
        };

        match reg {
            Reg::RdLen => {
                self.rcp.pi.write(reg, value & mask);
                self.pi_dma_to_cart();
            }
            Reg::WrLen => {
                self.rcp.pi.write(reg, value & mask);
                self.pi_dma_to_rdram();
            }
            Reg::Status => {
                let value = value & mask;
                if value & STATUS_CLEAR_INTERRUPT != 0 {
                    self.lower_rcp(Interrupt::Pi);
                }

                if value & STATUS_RESET != 0 {
                    self.rcp.pi.finish_dma();
                }
            }
            _ => {
                let current = self.rcp.pi.read(reg);
                self.rcp.pi.write(reg, write_masked(current, value, mask));
            }
        }
    }

    fn schedule_pi(&mut self, bits: u32, delay: u32) {
        self.rcp.pi.start_dma(bits);
        self.update_count();
        let count = self.count();
        self.scheduler.add(Event::Pi, delay, count);
    }

    /// RDRAM to cartridge.
    fn pi_dma_to_cart(&mut self) {
        let len = Pi::dma_length(self.rcp.pi.read(Reg::RdLen)) as usize;
        let dram = self.rcp.pi.read(Reg::DramAddr) & 0x00FF_FFFF;
        let cart = self.rcp.pi.read(Reg::CartAddr);

        trace!(target: "pi", "DMA of {len} bytes from RDRAM 0x{dram:06X} to cart 0x{cart:08X}");

        if (CART_SAVE_START..ROM_START).contains(&cart) {
            let start = dram as usize;
            let end = (start + len).min(self.memory.rdram.len());
            let data = self.memory.rdram.get(start..end).unwrap_or_default();
            self.cart.dma_write(cart, dram, data);
        } else {
            debug!(target: "pi", "ignored DMA to cart 0x{cart:08X}");
        }

        self.schedule_pi(status::DMA_BUSY, SHORT_DMA_DELAY);
    }

    /// Cartridge to RDRAM.
    fn pi_dma_to_rdram(&mut self) {
        let len = Pi::dma_length(self.rcp.pi.read(Reg::WrLen));
        let dram = self.rcp.pi.read(Reg::DramAddr) & 0x00FF_FFFF;
        let cart = self.rcp.pi.read(Reg::CartAddr);

        trace!(target: "pi", "DMA of {len} bytes from cart 0x{cart:08X} to RDRAM 0x{dram:06X}");

        if cart < ROM_START {
            if cart >= CART_SAVE_START {
                let start = dram as usize;
                let end = (start + len as usize).min(self.memory.rdram.len());
                if let Some(buf) = self.memory.rdram.get_mut(start..end) {
                    self.cart.dma_read(cart, buf);
                }
            } else {
                debug!(target: "pi", "ignored DMA from cart 0x{cart:08X}");
            }

            self.schedule_pi(status::DMA_BUSY, SHORT_DMA_DELAY);
            return;
        }

        if cart >= PIF_START {
            self.schedule_pi(status::DMA_BUSY, SHORT_DMA_DELAY);
            return;
        }

        let rom_offset = (cart - ROM_START) as usize;
        let mut copied = 0;
        for i in 0..len as usize {
            let src = rom_offset + i;
            let dst = dram as usize + i;
            if src >= self.rom.len() || dst > RDRAM_LIMIT {
                break;
            }

            self.memory.rdram[dst] = self.rom.data[src];
            copied += 1;
        }

        if copied < len {
            warn!(target: "pi", "ROM DMA clamped to {copied} of {len} bytes");
        }

        if cart == BOOT_COPY_ADDR {
            let size = if self.config.disable_extra_mem {
                RDRAM_BASE_LEN
            } else {
                RDRAM_LEN
            };

            let offset = self.rom.cic.memory_size_offset();
            debug!(target: "pi", "reporting {size} bytes of RDRAM at 0x{offset:03X}");
            self.memory.set_rdram_word(offset, size as u32);
        }

        self.schedule_pi(status::DMA_BUSY | status::IO_BUSY, len / 8);
    }
}
