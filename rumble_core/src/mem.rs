//! Items related to the memory of the N64.

mod primitive;

use crate::util::boxed_slice;

pub use primitive::{Primitive, PrimitiveRw};

/// A memory segment refers to a specific range of virtual addresses, each with it's own purpose
/// and properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Kernel User SEGment
    ///
    /// User virtual memory, mapped through the TLB.
    KUSEG,
    /// Kernel SEGment 0
    ///
    /// Maps to the first 512MiB of physical memory directly, utilizing the cache.
    KSEG0,
    /// Kernel SEGment 1
    ///
    /// Maps to the first 512MiB of physical memory directly and does not utilize the cache.
    KSEG1,
    /// Kernel SEGment 2 and 3
    ///
    /// Supervisor and kernel virtual memory, mapped through the TLB.
    KSEG2,
}

impl Segment {
    #[inline(always)]
    pub const fn start(&self) -> Address {
        match self {
            Segment::KUSEG => Address(0x0000_0000),
            Segment::KSEG0 => Address(0x8000_0000),
            Segment::KSEG1 => Address(0xA000_0000),
            Segment::KSEG2 => Address(0xC000_0000),
        }
    }

    /// Whether addresses in this segment go through the TLB.
    #[inline(always)]
    pub const fn is_mapped(&self) -> bool {
        matches!(self, Segment::KUSEG | Segment::KSEG2)
    }
}

/// A physical memory region, i.e. the device that owns a given physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Nothing is mapped here: reads return zero and writes are dropped.
    Unmapped,
    Rdram,
    RdramRegs,
    /// DMEM and IMEM.
    SpMem,
    SpRegs,
    /// The RSP program counter and the IMEM BIST register.
    SpPc,
    DpCommand,
    DpSpan,
    Mi,
    Vi,
    Ai,
    Pi,
    Ri,
    Si,
    /// Cartridge domain 2, where SRAM and flash RAM live.
    CartSave,
    /// Cartridge domain 1, the ROM image.
    Rom,
    /// The PIF boot ROM and RAM.
    Pif,
}

impl Region {
    /// Whether instructions can be fetched from this region.
    #[inline(always)]
    pub const fn is_executable(&self) -> bool {
        matches!(self, Region::Rdram | Region::Rom | Region::SpMem)
    }
}

/// Size of the RDRAM, including the expansion pak.
pub const RDRAM_LEN: usize = 8 * bytesize::MIB as usize;
/// Size of the RDRAM without the expansion pak.
pub const RDRAM_BASE_LEN: usize = 4 * bytesize::MIB as usize;
/// Size of the RSP memories (DMEM followed by IMEM).
pub const SP_MEM_LEN: usize = 8 * bytesize::KIB as usize;
/// Offset of IMEM inside the RSP memories.
pub const IMEM_OFFSET: usize = 0x1000;

/// Start of the cartridge ROM window.
pub const ROM_START: u32 = 0x1000_0000;
/// Start of the PIF RAM.
pub const PIF_RAM_START: u32 = 0x1FC0_07C0;

/// Number of rows of the region map: one per 64KiB of the physical address space.
pub const REGION_ROWS: usize = 0x2000;

/// Maps every 64KiB of the physical address space to the region that owns it.
#[derive(Clone)]
pub struct RegionMap {
    rows: Box<[Region]>,
}

impl std::fmt::Debug for RegionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionMap").finish_non_exhaustive()
    }
}

impl RegionMap {
    /// Builds the map for a cartridge of `rom_len` bytes and `rdram_len` bytes of RDRAM.
    ///
    /// The ROM window covers the image rounded up to 64KiB. Everything after it is open bus.
    pub fn new(rom_len: usize, rdram_len: usize) -> Self {
        let mut rows = boxed_slice(Region::Unmapped, REGION_ROWS);

        let rdram_rows = rdram_len.div_ceil(0x1_0000);
        rows[..rdram_rows].fill(Region::Rdram);

        rows[0x03F0] = Region::RdramRegs;
        rows[0x0400] = Region::SpMem;
        rows[0x0404] = Region::SpRegs;
        rows[0x0408] = Region::SpPc;
        rows[0x0410] = Region::DpCommand;
        rows[0x0420] = Region::DpSpan;
        rows[0x0430] = Region::Mi;
        rows[0x0440] = Region::Vi;
        rows[0x0450] = Region::Ai;
        rows[0x0460] = Region::Pi;
        rows[0x0470] = Region::Ri;
        rows[0x0480] = Region::Si;
        rows[0x0800] = Region::CartSave;

        let rom_first = (ROM_START >> 16) as usize;
        let rom_rows = rom_len.div_ceil(0x1_0000).min(0x0FC0);
        rows[rom_first..rom_first + rom_rows].fill(Region::Rom);

        rows[0x1FC0] = Region::Pif;

        Self { rows }
    }

    #[inline(always)]
    pub fn region(&self, addr: PhysicalAddress) -> Region {
        self.rows[(addr.value() >> 16) as usize]
    }
}

/// A physical memory address. This is a thin wrapper around a [`u32`], with the extra guarantee
/// that it's in the `0x0000_0000..0x2000_0000` range (512 MiB).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd)]
pub struct PhysicalAddress(u32);

impl std::fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:04X}_{:04X}",
            (self.0 & 0xFFFF_0000) >> 16,
            self.0 & 0xFFFF
        )
    }
}

impl std::fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl PhysicalAddress {
    /// Creates a new [`PhysicalAddress`] from an absolute address.
    #[inline(always)]
    pub const fn new(address: u32) -> Option<Self> {
        if address < 0x2000_0000 {
            Some(Self(address))
        } else {
            None
        }
    }

    /// Creates a new [`PhysicalAddress`] by dropping the top three bits of `address`.
    #[inline(always)]
    pub const fn masked(address: u32) -> Self {
        Self(address & 0x1FFF_FFFF)
    }

    #[inline(always)]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Offset of this address inside its 64KiB row.
    #[inline(always)]
    pub const fn row_offset(&self) -> u32 {
        self.0 & 0xFFFF
    }
}

impl std::ops::Add<u32> for PhysicalAddress {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self::masked(self.0.wrapping_add(rhs))
    }
}

/// A virtual memory address. This is a thin wrapper around a [`u32`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Address(pub u32);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:04X}_{:04X}",
            (self.0 & 0xFFFF_0000) >> 16,
            self.0 & 0xFFFF
        )
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Address {
    /// Returns the value of this address. Equivalent to `self.0`.
    #[inline(always)]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns `true` if this address is aligned to the given alignment.
    #[inline(always)]
    pub const fn is_aligned(self, alignment: u32) -> bool {
        self.0 % alignment == 0
    }

    /// Returns the segment of this address.
    #[inline(always)]
    pub const fn segment(self) -> Segment {
        match self.0 {
            0x0000_0000..=0x7FFF_FFFF => Segment::KUSEG,
            0x8000_0000..=0x9FFF_FFFF => Segment::KSEG0,
            0xA000_0000..=0xBFFF_FFFF => Segment::KSEG1,
            0xC000_0000..=0xFFFF_FFFF => Segment::KSEG2,
        }
    }

    /// Returns the physical address this virtual address maps to, if it's in one of the directly
    /// mapped segments.
    #[inline(always)]
    pub const fn direct(self) -> Option<PhysicalAddress> {
        if self.segment().is_mapped() {
            None
        } else {
            Some(PhysicalAddress::masked(self.0))
        }
    }
}

impl std::ops::Add<u32> for Address {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl std::ops::Add<i32> for Address {
    type Output = Self;

    fn add(self, rhs: i32) -> Self::Output {
        Self(self.0.wrapping_add_signed(rhs))
    }
}

impl std::ops::Sub<u32> for Address {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_sub(rhs))
    }
}

impl PartialEq<u32> for Address {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

/// The plain memories of the machine: RDRAM and the RSP memories.
pub struct Memory {
    /// Main memory, always allocated with the expansion pak.
    pub rdram: Box<[u8]>,
    /// DMEM (`0x0000..0x1000`) followed by IMEM (`0x1000..0x2000`).
    pub sp_mem: Box<[u8]>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory").finish_non_exhaustive()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            rdram: boxed_slice(0, RDRAM_LEN),
            sp_mem: boxed_slice(0, SP_MEM_LEN),
        }
    }
}

impl Memory {
    /// Zeroes both memories.
    pub fn clear(&mut self) {
        self.rdram.fill(0);
        self.sp_mem.fill(0);
    }

    /// Reads the big-endian word at `offset` of RDRAM. Out of range offsets read as zero.
    #[inline(always)]
    pub fn rdram_word(&self, offset: u32) -> u32 {
        self.rdram
            .get(offset as usize..)
            .map_or(0, |buf| buf.read())
    }

    /// Writes a big-endian word at `offset` of RDRAM. Out of range offsets are dropped.
    #[inline(always)]
    pub fn set_rdram_word(&mut self, offset: u32, value: u32) {
        if let Some(buf) = self.rdram.get_mut(offset as usize..) {
            buf.write(value);
        }
    }

    /// Reads the big-endian word at `offset` of IMEM.
    #[inline(always)]
    pub fn imem_word(&self, offset: u32) -> u32 {
        let offset = IMEM_OFFSET + (offset as usize & 0xFFC);
        self.sp_mem[offset..].read()
    }

    /// Writes a big-endian word at `offset` of IMEM.
    #[inline(always)]
    pub fn set_imem_word(&mut self, offset: u32, value: u32) {
        let offset = IMEM_OFFSET + (offset as usize & 0xFFC);
        self.sp_mem[offset..].write(value);
    }

    /// Reads the big-endian word at `offset` of DMEM.
    #[inline(always)]
    pub fn dmem_word(&self, offset: u32) -> u32 {
        self.sp_mem[offset as usize & 0xFFC..].read()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn segments() {
        assert_eq!(Address(0x0000_1000).segment(), Segment::KUSEG);
        assert_eq!(Address(0x8000_0400).direct(), PhysicalAddress::new(0x400));
        assert_eq!(Address(0xA400_0040).direct(), PhysicalAddress::new(0x0400_0040));
        assert_eq!(Address(0xC000_0000).direct(), None);
        assert_eq!(Address(0x7F00_0000).direct(), None);
    }

    #[test]
    fn region_map_scales_with_rom() {
        let map = RegionMap::new(0x2_0001, RDRAM_LEN);
        let at = |addr| map.region(PhysicalAddress::masked(addr));

        assert_eq!(at(0x0000_0000), Region::Rdram);
        assert_eq!(at(0x007F_FFFC), Region::Rdram);
        assert_eq!(at(0x0080_0000), Region::Unmapped);
        assert_eq!(at(0x0400_1000), Region::SpMem);
        assert_eq!(at(0x0430_0004), Region::Mi);
        assert_eq!(at(0x1000_0000), Region::Rom);
        assert_eq!(at(0x1002_FFFC), Region::Rom);
        assert_eq!(at(0x1003_0000), Region::Unmapped);
        assert_eq!(at(0x1FC0_07FC), Region::Pif);
    }

    #[test]
    fn small_rdram_leaves_expansion_unmapped() {
        let map = RegionMap::new(0x1000, RDRAM_BASE_LEN);
        assert_eq!(map.region(PhysicalAddress::masked(0x003F_FFFC)), Region::Rdram);
        assert_eq!(map.region(PhysicalAddress::masked(0x0040_0000)), Region::Unmapped);
    }
}
