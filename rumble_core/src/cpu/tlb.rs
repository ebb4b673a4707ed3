//! The translation lookaside buffer.
//!
//! Besides the 32 architectural entries, the TLB keeps two lookup tables with one row per 4KiB
//! virtual page (2^20 rows each): one for reads and fetches, one for writes. A row is either zero
//! (not resident) or `0x8000_0000 | physical page`. Rows are filled when an entry is written
//! ([`Tlb::map`]) and cleared before it is overwritten ([`Tlb::unmap`]).

use crate::util::boxed_slice;

/// Number of entries of the TLB.
pub const ENTRIES: usize = 32;
/// Number of rows of each lookup table.
pub const LUT_ROWS: usize = 1 << 20;

/// Marks a lookup table row as resident.
const RESIDENT: u32 = 0x8000_0000;

/// The intent of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    /// An instruction fetch. Uses the read table but is not an architectural access.
    Fetch,
}

/// One half of the doubled page mapped by an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// Page frame number.
    pub pfn: u32,
    /// Cache algorithm. Kept for `TLBR`, otherwise unused.
    pub cache: u8,
    pub dirty: bool,
    pub valid: bool,

    /// First virtual address covered by this half.
    pub start: u32,
    /// Last virtual address covered by this half.
    pub end: u32,
    /// Physical address `start` maps to.
    pub phys: u64,
}

impl Page {
    fn from_entry_lo(value: u32) -> Self {
        Self {
            pfn: (value & 0x3FFF_FFC0) >> 6,
            cache: ((value >> 3) & 0b111) as u8,
            dirty: value & 0b100 != 0,
            valid: value & 0b010 != 0,
            ..Default::default()
        }
    }

    fn entry_lo(&self, global: bool) -> u32 {
        (self.pfn << 6)
            | (u32::from(self.cache) << 3)
            | (u32::from(self.dirty) << 2)
            | (u32::from(self.valid) << 1)
            | u32::from(global)
    }

    /// Whether this half can be installed in the lookup tables.
    fn mappable(&self) -> bool {
        self.valid
            && self.start < self.end
            && !(self.start >= 0x8000_0000 && self.end < 0xC000_0000)
            && self.phys < 0x2000_0000
    }

    #[inline(always)]
    pub fn contains(&self, address: u32) -> bool {
        (self.start..=self.end).contains(&address)
    }
}

/// A TLB entry, mapping a pair of adjacent virtual pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entry {
    /// Page mask, in units of 4KiB pages.
    pub mask: u16,
    /// Virtual page number divided by 2.
    pub vpn2: u32,
    pub asid: u8,
    pub global: bool,
    pub even: Page,
    pub odd: Page,
}

impl Entry {
    /// Builds an entry from the values of the `PageMask`, `EntryHi`, `EntryLo0` and `EntryLo1`
    /// registers.
    pub fn from_registers(page_mask: u32, entry_hi: u32, entry_lo0: u32, entry_lo1: u32) -> Self {
        let mut entry = Self {
            mask: ((page_mask & 0x01FF_E000) >> 13) as u16,
            vpn2: (entry_hi & 0xFFFF_E000) >> 13,
            asid: entry_hi as u8,
            global: entry_lo0 & entry_lo1 & 1 != 0,
            even: Page::from_entry_lo(entry_lo0),
            odd: Page::from_entry_lo(entry_lo1),
        };

        entry.compute_ranges();
        entry
    }

    /// Recomputes the virtual ranges and physical bases of both halves.
    fn compute_ranges(&mut self) {
        let size = (u32::from(self.mask) << 12) + 0xFFF;

        self.even.start = self.vpn2 << 13;
        self.even.end = self.even.start.wrapping_add(size);
        self.even.phys = u64::from(self.even.pfn) << 12;

        self.odd.start = self.even.end.wrapping_add(1);
        self.odd.end = self.odd.start.wrapping_add(size);
        self.odd.phys = u64::from(self.odd.pfn) << 12;
    }

    pub fn page_mask(&self) -> u32 {
        u32::from(self.mask) << 13
    }

    pub fn entry_hi(&self) -> u32 {
        (self.vpn2 << 13) | u32::from(self.asid)
    }

    pub fn entry_lo0(&self) -> u32 {
        self.even.entry_lo(self.global)
    }

    pub fn entry_lo1(&self) -> u32 {
        self.odd.entry_lo(self.global)
    }

    /// Whether this entry matches the given `EntryHi` value, honoring the page mask, the global bit
    /// and the ASID.
    pub fn matches(&self, entry_hi: u32) -> bool {
        let vpn2 = (entry_hi & 0xFFFF_E000) >> 13;
        let mask = u32::from(self.mask);
        (self.vpn2 & !mask) == (vpn2 & !mask) && (self.global || self.asid == entry_hi as u8)
    }

    /// Whether either half of this entry covers the address, regardless of validity.
    pub fn covers(&self, address: u32) -> bool {
        self.even.contains(address) || self.odd.contains(address)
    }
}

/// The TLB and its lookup tables.
pub struct Tlb {
    pub entries: [Entry; ENTRIES],
    lut_read: Box<[u32]>,
    lut_write: Box<[u32]>,
}

impl std::fmt::Debug for Tlb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tlb")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self {
            entries: [Entry::default(); ENTRIES],
            lut_read: boxed_slice(0, LUT_ROWS),
            lut_write: boxed_slice(0, LUT_ROWS),
        }
    }
}

impl Tlb {
    /// Clears every entry and both lookup tables.
    pub fn reset(&mut self) {
        self.entries = [Entry::default(); ENTRIES];
        self.lut_read.fill(0);
        self.lut_write.fill(0);
    }

    fn fill(&mut self, page: Page, dirty_only: bool, clear: bool) {
        if !page.mappable() {
            return;
        }

        let mut address = u64::from(page.start);
        while address < u64::from(page.end) {
            let row = (address >> 12) as usize;
            let value = if clear {
                0
            } else {
                RESIDENT | (page.phys + (address - u64::from(page.start))) as u32
            };

            self.lut_read[row] = value;
            if !dirty_only || page.dirty {
                self.lut_write[row] = value;
            }

            address += 0x1000;
        }
    }

    /// Installs the lookup table rows of entry `index`.
    pub fn map(&mut self, index: usize) {
        let entry = self.entries[index];
        self.fill(entry.even, true, false);
        self.fill(entry.odd, true, false);
    }

    /// Removes the lookup table rows of entry `index`.
    pub fn unmap(&mut self, index: usize) {
        let entry = self.entries[index];
        self.fill(entry.even, false, true);
        self.fill(entry.odd, false, true);
    }

    /// Replaces entry `index`, keeping the lookup tables consistent.
    pub fn write(&mut self, index: usize, entry: Entry) {
        let index = index % ENTRIES;
        self.unmap(index);
        self.entries[index] = entry;
        self.map(index);
    }

    /// Finds the entry matching the given `EntryHi` value.
    pub fn probe(&self, entry_hi: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(entry_hi))
    }

    /// Whether any entry covers the address, regardless of validity.
    pub fn covers(&self, address: u32) -> bool {
        self.entries.iter().any(|e| e.covers(address))
    }

    /// Translates a virtual address through the lookup tables. Returns the physical address, or
    /// `None` if the page is not resident for the given access.
    #[inline(always)]
    pub fn lookup(&self, address: u32, access: Access) -> Option<u32> {
        let row = (address >> 12) as usize;
        let value = match access {
            Access::Read | Access::Fetch => self.lut_read[row],
            Access::Write => self.lut_write[row],
        };

        (value != 0).then(|| ((value & 0xFFFF_F000) | (address & 0xFFF)) & 0x1FFF_FFFF)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    prop_compose! {
        fn entry_registers()(
            mask in prop::sample::select(vec![0u32, 0x0000_6000, 0x0001_E000, 0x0007_E000, 0x01FF_E000]),
            entry_hi in any::<u32>().prop_map(|v| v & 0xFFFF_E0FF),
            lo0 in any::<u32>().prop_map(|v| v & 0x3FFF_FFFF),
            lo1 in any::<u32>().prop_map(|v| v & 0x3FFF_FFFF),
        ) -> (u32, u32, u32, u32) {
            // the global bit is the AND of both halves, so only keep it when both agree
            let global = lo0 & lo1 & 1;
            (mask, entry_hi, (lo0 & !1) | global, (lo1 & !1) | global)
        }
    }

    proptest! {
        #[test]
        fn registers_round_trip((mask, hi, lo0, lo1) in entry_registers()) {
            let entry = Entry::from_registers(mask, hi, lo0, lo1);
            prop_assert_eq!(entry.page_mask(), mask);
            prop_assert_eq!(entry.entry_hi(), hi);
            prop_assert_eq!(entry.entry_lo0(), lo0);
            prop_assert_eq!(entry.entry_lo1(), lo1);
        }

        #[test]
        fn lookup_is_idempotent((mask, hi, lo0, lo1) in entry_registers(), offset in 0u32..0x2000) {
            let mut tlb = Tlb::default();
            let entry = Entry::from_registers(mask, hi, lo0, lo1);
            tlb.write(3, entry);

            let address = entry.even.start.wrapping_add(offset);
            let first = tlb.lookup(address, Access::Read);
            let second = tlb.lookup(address, Access::Read);
            prop_assert_eq!(first, second);
        }
    }

    fn small_entry(vaddr: u32, paddr: u32, dirty: bool) -> Entry {
        let lo = ((paddr >> 12) << 6) | (u32::from(dirty) << 2) | 0b010;
        let lo_odd = (((paddr + 0x1000) >> 12) << 6) | (u32::from(dirty) << 2) | 0b010;
        Entry::from_registers(0, vaddr, lo, lo_odd)
    }

    #[test]
    fn maps_both_halves() {
        let mut tlb = Tlb::default();
        tlb.write(0, small_entry(0x0040_0000, 0x0010_0000, true));

        assert_eq!(tlb.lookup(0x0040_0123, Access::Read), Some(0x0010_0123));
        assert_eq!(tlb.lookup(0x0040_1FFC, Access::Write), Some(0x0010_1FFC));
        assert_eq!(tlb.lookup(0x0040_2000, Access::Read), None);
    }

    #[test]
    fn clean_pages_are_read_only() {
        let mut tlb = Tlb::default();
        tlb.write(0, small_entry(0x0040_0000, 0x0010_0000, false));

        assert_eq!(tlb.lookup(0x0040_0000, Access::Fetch), Some(0x0010_0000));
        assert_eq!(tlb.lookup(0x0040_0000, Access::Write), None);
    }

    #[test]
    fn rewrite_unmaps_old_rows() {
        let mut tlb = Tlb::default();
        tlb.write(5, small_entry(0x0040_0000, 0x0010_0000, true));
        tlb.write(5, small_entry(0x0080_0000, 0x0020_0000, true));

        assert_eq!(tlb.lookup(0x0040_0000, Access::Read), None);
        assert_eq!(tlb.lookup(0x0080_0004, Access::Read), Some(0x0020_0004));
    }

    #[test]
    fn direct_segment_is_never_mapped() {
        let mut tlb = Tlb::default();
        tlb.write(0, small_entry(0x8000_0000, 0x0010_0000, true));
        assert_eq!(tlb.lookup(0x8000_0000, Access::Read), None);
    }

    #[test]
    fn probe_honors_asid_and_global() {
        let mut tlb = Tlb::default();
        let mut entry = small_entry(0x0040_0000 | 0x12, 0x0010_0000, true);
        tlb.write(7, entry);

        assert_eq!(tlb.probe(0x0040_0012), Some(7));
        assert_eq!(tlb.probe(0x0040_0013), None);

        entry.global = true;
        tlb.write(7, entry);
        assert_eq!(tlb.probe(0x0040_0013), Some(7));
    }
}
