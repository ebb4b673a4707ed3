//! The physical bus: dispatches word accesses to the device owning each region.
//!
//! Every device is word addressed. Narrower accesses are turned into a word access with a lane
//! mask, and double-word accesses into two word accesses routed through the region of the first
//! word.

use crate::Machine;
use rumble_core::{
    mem::{PIF_RAM_START, PhysicalAddress, Primitive, PrimitiveRw, ROM_START, Region},
    pif, write_masked,
};
use tracing::trace;

/// Start of cartridge domain 2.
const CART_SAVE_START: u32 = 0x0800_0000;

impl Machine {
    /// Reads the word at `phys`, which must be word aligned, from `region`.
    pub(crate) fn read_region(&mut self, region: Region, phys: PhysicalAddress) -> u32 {
        let addr = phys.value();
        let offset = phys.row_offset();

        match region {
            Region::Rdram => self.memory.rdram_word(addr),
            Region::RdramRegs => self
                .rcp
                .rdram
                .regs
                .get((offset >> 2) as usize)
                .copied()
                .unwrap_or(0),
            Region::SpMem => self.memory.sp_mem[(addr & 0x1FFC) as usize..].read(),
            Region::SpRegs => self.read_sp(offset),
            Region::SpPc => match offset {
                0 => self.rcp.sp.pc,
                4 => self.rcp.sp.ibist,
                _ => 0,
            },
            Region::DpCommand => self.read_dpc(offset),
            Region::DpSpan => self
                .rcp
                .dps
                .regs
                .get((offset >> 2) as usize)
                .copied()
                .unwrap_or(0),
            Region::Mi => self.read_mi(offset),
            Region::Vi => self.read_vi(offset),
            Region::Ai => self.read_ai(offset),
            Region::Pi => self.read_pi(offset),
            Region::Ri => self
                .rcp
                .ri
                .regs
                .get((offset >> 2) as usize)
                .copied()
                .unwrap_or(0),
            Region::Si => self.read_si(offset),
            Region::CartSave => self.cart.read_domain2(addr - CART_SAVE_START),
            Region::Rom => {
                let word = self.rom.word(addr - ROM_START);
                self.cart.read_rom(word)
            }
            Region::Pif => {
                if addr >= PIF_RAM_START {
                    let index = ((addr - PIF_RAM_START) & 0x3C) as usize;
                    self.pif.ram[index..].read()
                } else {
                    0
                }
            }
            Region::Unmapped => {
                trace!(target: "bus", "read from unmapped address {phys}");
                0
            }
        }
    }

    /// Writes the bits of `value` selected by `mask` to the word at `phys`, which must be word
    /// aligned, in `region`.
    pub(crate) fn write_region(
        &mut self,
        region: Region,
        phys: PhysicalAddress,
        value: u32,
        mask: u32,
    ) {
        let addr = phys.value();
        let offset = phys.row_offset();

        match region {
            Region::Rdram => {
                let current = self.memory.rdram_word(addr);
                self.memory
                    .set_rdram_word(addr, write_masked(current, value, mask));
            }
            Region::RdramRegs => {
                if let Some(reg) = self.rcp.rdram.regs.get_mut((offset >> 2) as usize) {
                    *reg = write_masked(*reg, value, mask);
                }
            }
            Region::SpMem => {
                let buf = &mut self.memory.sp_mem[(addr & 0x1FFC) as usize..];
                let current: u32 = buf.read();
                buf.write(write_masked(current, value, mask));
            }
            Region::SpRegs => self.write_sp(offset, value, mask),
            Region::SpPc => match offset {
                0 => self.rcp.sp.pc = write_masked(self.rcp.sp.pc, value, mask) & 0xFFC,
                4 => self.rcp.sp.ibist = write_masked(self.rcp.sp.ibist, value, mask),
                _ => (),
            },
            Region::DpCommand => self.write_dpc(offset, value, mask),
            Region::DpSpan => {
                if let Some(reg) = self.rcp.dps.regs.get_mut((offset >> 2) as usize) {
                    *reg = write_masked(*reg, value, mask);
                }
            }
            Region::Mi => self.write_mi(offset, value, mask),
            Region::Vi => self.write_vi(offset, value, mask),
            Region::Ai => self.write_ai(offset, value, mask),
            Region::Pi => self.write_pi(offset, value, mask),
            Region::Ri => {
                if let Some(reg) = self.rcp.ri.regs.get_mut((offset >> 2) as usize) {
                    *reg = write_masked(*reg, value, mask);
                }
            }
            Region::Si => self.write_si(offset, value, mask),
            Region::CartSave => {
                self.cart
                    .write_domain2(addr - CART_SAVE_START, value & mask, &self.memory.rdram)
            }
            Region::Rom => self.cart.write_rom(value & mask),
            Region::Pif => {
                if addr < PIF_RAM_START {
                    trace!(target: "bus", "write to the PIF boot ROM at {phys}");
                    return;
                }

                let index = ((addr - PIF_RAM_START) & 0x3C) as usize;
                let buf = &mut self.pif.ram[index..];
                let current: u32 = buf.read();
                buf.write(write_masked(current, value, mask));

                if index == pif::COMMAND & !3 {
                    self.pif_ram_written();
                }
            }
            Region::Unmapped => {
                trace!(target: "bus", "write of 0x{value:08X} to unmapped address {phys}");
            }
        }
    }

    /// Reads a primitive at `phys`.
    pub fn read_physical<P: Primitive>(&mut self, phys: PhysicalAddress) -> P {
        let region = self.regions.region(phys);
        let aligned = PhysicalAddress::masked(phys.value() & !3);

        if P::SIZE == 8 {
            let high = self.read_region(region, aligned);
            let low = self.read_region(region, aligned + 4);
            return P::from_u64((u64::from(high) << 32) | u64::from(low));
        }

        let word = self.read_region(region, aligned);
        P::from_word(word, phys.value())
    }

    /// Writes a primitive at `phys`.
    pub fn write_physical<P: Primitive>(&mut self, phys: PhysicalAddress, value: P) {
        if P::SIZE == 8 {
            self.write_masked_u64(phys, value.to_u64(), u64::MAX);
            return;
        }

        let region = self.regions.region(phys);
        let aligned = PhysicalAddress::masked(phys.value() & !3);
        let (word, mask) = value.to_word(phys.value());
        self.write_region(region, aligned, word, mask);
    }

    /// Writes the bits of the double-word `value` selected by `mask` at `phys`, as two masked word
    /// writes.
    pub fn write_masked_u64(&mut self, phys: PhysicalAddress, value: u64, mask: u64) {
        let region = self.regions.region(phys);
        let aligned = PhysicalAddress::masked(phys.value() & !7);

        let high_mask = (mask >> 32) as u32;
        let low_mask = mask as u32;

        if high_mask != 0 {
            self.write_region(region, aligned, (value >> 32) as u32, high_mask);
        }

        if low_mask != 0 {
            self.write_region(region, aligned + 4, value as u32, low_mask);
        }
    }

    /// Reads the instruction word at `phys`. ROM is read directly, leaving the write latch alone.
    #[inline(always)]
    pub(crate) fn fetch_word(&mut self, region: Region, phys: PhysicalAddress) -> u32 {
        match region {
            Region::Rdram => self.memory.rdram_word(phys.value()),
            Region::Rom => self.rom.word(phys.value() - ROM_START),
            _ => self.read_region(region, phys),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::cpu::test::machine;
    use rumble_core::{
        mem::{PhysicalAddress, Region},
        rcp::mi,
    };

    fn phys(addr: u32) -> PhysicalAddress {
        PhysicalAddress::masked(addr)
    }

    #[test]
    fn sub_word_writes_keep_neighbours() {
        let mut machine = machine();
        machine.write_physical(phys(0x1000), 0x1122_3344u32);
        machine.write_physical(phys(0x1001), 0xAAu8);
        machine.write_physical(phys(0x1002), 0xBBCCu16);

        assert_eq!(machine.read_physical::<u32>(phys(0x1000)), 0x11AA_BBCC);
        assert_eq!(machine.read_physical::<u8>(phys(0x1003)), 0xCC);
        assert_eq!(machine.read_physical::<u16>(phys(0x1000)), 0x11AA);
    }

    #[test]
    fn double_words_are_two_words() {
        let mut machine = machine();
        machine.write_physical(phys(0x2000), 0x0123_4567_89AB_CDEFu64);

        assert_eq!(machine.read_physical::<u32>(phys(0x2000)), 0x0123_4567);
        assert_eq!(machine.read_physical::<u32>(phys(0x2004)), 0x89AB_CDEF);
        assert_eq!(machine.read_physical::<u64>(phys(0x2000)), 0x0123_4567_89AB_CDEF);

        machine.write_masked_u64(phys(0x2000), 0, 0x0000_00FF_FF00_0000);
        assert_eq!(machine.read_physical::<u64>(phys(0x2000)), 0x0123_4500_00AB_CDEF);
    }

    #[test]
    fn unmapped_reads_zero() {
        let mut machine = machine();
        assert_eq!(machine.regions.region(phys(0x0500_0000)), Region::Unmapped);
        machine.write_physical(phys(0x0500_0000), 0xFFFF_FFFFu32);
        assert_eq!(machine.read_physical::<u32>(phys(0x0500_0000)), 0);
    }

    #[test]
    fn rom_reads_consume_the_latch() {
        let mut machine = machine();
        let word = machine.rom.word(0x40);

        machine.write_physical(phys(0x1000_0040), 0xDEAD_BEEFu32);
        assert_eq!(machine.read_physical::<u32>(phys(0x1000_0040)), 0xDEAD_BEEF);
        assert_eq!(machine.read_physical::<u32>(phys(0x1000_0040)), word);
    }

    #[test]
    fn sp_memory_is_big_endian() {
        let mut machine = machine();
        machine.write_physical(phys(0x0400_1004), 0xCAFEu16);
        assert_eq!(machine.memory.imem_word(4), 0x0000_CAFE);
        assert_eq!(machine.read_physical::<u8>(phys(0x0400_1006)), 0xCA);
    }

    #[test]
    fn masked_register_writes() {
        let mut machine = machine();
        // set the SP and VI mask bits with a half-word write
        machine.write_physical(phys(0x0430_000E), 0x0082u16);
        assert_eq!(
            machine.rcp.mi.mask,
            mi::Interrupt::Sp.bit() | mi::Interrupt::Vi.bit()
        );

        // a byte write to the high lane doesn't disturb the mask
        machine.write_physical(phys(0x0430_000C), 0xFFu8);
        assert_eq!(
            machine.rcp.mi.mask,
            mi::Interrupt::Sp.bit() | mi::Interrupt::Vi.bit()
        );
    }
}
