//! Virtual to physical address translation.

use crate::Machine;
use rumble_core::{
    cpu::tlb::Access,
    mem::{Address, PhysicalAddress},
    rom::Header,
};

/// Virtual window GoldenEye expects to be mapped onto its ROM.
const GOLDENEYE_WINDOW: std::ops::Range<u32> = 0x7F00_0000..0x8000_0000;

/// ROM base of the GoldenEye window for the given header, or `None` for any other title.
pub fn goldeneye_base(header: &Header) -> Option<u32> {
    if header.name() != "GOLDENEYE" {
        return None;
    }

    Some(match header.country_code {
        b'J' => 0xB003_79B0,
        b'P' => 0xB003_29F0,
        _ => 0xB003_4B30,
    })
}

impl Machine {
    /// Translates a virtual address. Returns `None` on a TLB miss.
    #[inline(always)]
    pub fn translate(&self, addr: Address, access: Access) -> Option<PhysicalAddress> {
        if let Some(phys) = addr.direct() {
            return Some(phys);
        }

        if let Some(base) = self.goldeneye_base {
            if GOLDENEYE_WINDOW.contains(&addr.value()) {
                let target = base.wrapping_add(addr.value() & 0x00FF_FFFF);
                return Some(PhysicalAddress::masked(target));
            }
        }

        self.tlb
            .lookup(addr.value(), access)
            .map(PhysicalAddress::masked)
    }
}

#[cfg(test)]
mod test {
    use crate::cpu::test::machine;
    use rumble_core::{
        cpu::tlb::{Access, Entry},
        mem::{Address, PhysicalAddress},
    };

    #[test]
    fn direct_segments_bypass_the_tlb() {
        let machine = machine();
        assert_eq!(
            machine.translate(Address(0xA460_0010), Access::Read),
            PhysicalAddress::new(0x0460_0010)
        );
        assert_eq!(machine.translate(Address(0x0000_1000), Access::Read), None);
    }

    #[test]
    fn mapped_pages_go_through_the_tlb() {
        let mut machine = machine();
        let lo = ((0x0020_0000u32 >> 12) << 6) | 0b110;
        let lo_odd = ((0x0020_1000u32 >> 12) << 6) | 0b110;
        machine
            .tlb
            .write(0, Entry::from_registers(0, 0x0000_4000, lo, lo_odd));

        for _ in 0..2 {
            assert_eq!(
                machine.translate(Address(0x0000_5004), Access::Write),
                PhysicalAddress::new(0x0020_1004)
            );
        }
    }

    #[test]
    fn goldeneye_window() {
        let mut machine = machine();
        assert_eq!(machine.translate(Address(0x7F00_0010), Access::Read), None);

        machine.goldeneye_base = Some(0xB003_4B30);
        assert_eq!(
            machine.translate(Address(0x7F00_0010), Access::Read),
            PhysicalAddress::new(0x1003_4B40)
        );
    }
}
