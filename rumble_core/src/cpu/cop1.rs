//! COP1, the floating point unit.
//!
//! The FPU has 32 64-bit storage slots, also viewed as 64 words (word `2n` is the low half of slot
//! `n`, word `2n + 1` its high half). Depending on the `FR` bit of the status register, the
//! architectural registers map onto them in one of two ways:
//!
//! - `FR = 1`: single `n` is word `2n`, double `n` is slot `n`.
//! - `FR = 0`: single `n` is word `n`, so singles are packed in pairs in slots `0..16`. Double `n`
//!   is slot `n / 2` and is only meaningful for even `n`.
//!
//! Switching modes must first repack the data ([`Cop1::shuffle_data`]) and only then recompute the
//! mapping ([`Cop1::set_pointers`]).

use bitos::bitos;
use zerocopy::{
    byteorder::{LittleEndian, U32},
    transmute,
};

/// Value of `FCR0` (implementation and revision).
pub const FCR0_RESET: u32 = 0x0000_0511;

/// Rounding mode, as selected by the low bits of `FCR31`.
#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Nearest,
    Truncate,
    Ceil,
    Floor,
}

impl RoundingMode {
    #[inline(always)]
    pub fn round_f32(self, value: f32) -> f32 {
        match self {
            RoundingMode::Nearest => value.round_ties_even(),
            RoundingMode::Truncate => value.trunc(),
            RoundingMode::Ceil => value.ceil(),
            RoundingMode::Floor => value.floor(),
        }
    }

    #[inline(always)]
    pub fn round_f64(self, value: f64) -> f64 {
        match self {
            RoundingMode::Nearest => value.round_ties_even(),
            RoundingMode::Truncate => value.trunc(),
            RoundingMode::Ceil => value.ceil(),
            RoundingMode::Floor => value.floor(),
        }
    }
}

/// The control/status register, `FCR31`.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fcr31 {
    #[bits(0..2)]
    pub rounding_mode: RoundingMode,
    /// Result of the last compare instruction, tested by `BC1F`/`BC1T`.
    #[bits(23)]
    pub condition: bool,
}

#[derive(Debug, Clone)]
pub struct Cop1 {
    /// The storage slots.
    pub fgr: [u64; 32],
    pub fcr0: u32,
    pub fcr31: Fcr31,
    /// Word index of every single precision register.
    singles: [u8; 32],
    /// Slot index of every double precision register.
    doubles: [u8; 32],
}

impl Default for Cop1 {
    fn default() -> Self {
        let mut cop1 = Self {
            fgr: [0; 32],
            fcr0: FCR0_RESET,
            fcr31: Fcr31::default(),
            singles: [0; 32],
            doubles: [0; 32],
        };

        cop1.set_pointers(false);
        cop1
    }
}

impl Cop1 {
    /// Resets the FPU to its power-on state, with the given register mode.
    pub fn reset(&mut self, fr: bool) {
        *self = Self::default();
        self.set_pointers(fr);
    }

    /// Reads word `index` of the 64-word view of the slots.
    #[inline(always)]
    fn word(&self, index: usize) -> u32 {
        let halves: [U32<LittleEndian>; 2] = transmute!(self.fgr[index / 2].to_le_bytes());
        halves[index % 2].get()
    }

    /// Writes word `index` of the 64-word view of the slots.
    #[inline(always)]
    fn set_word(&mut self, index: usize, value: u32) {
        let mut halves: [U32<LittleEndian>; 2] = transmute!(self.fgr[index / 2].to_le_bytes());
        halves[index % 2] = U32::new(value);

        let bytes: [u8; 8] = transmute!(halves);
        self.fgr[index / 2] = u64::from_le_bytes(bytes);
    }

    /// Repacks the slots for a register mode change from `from_fr` to `to_fr`, so every
    /// architectural single keeps its value. Does nothing if the mode does not change.
    pub fn shuffle_data(&mut self, from_fr: bool, to_fr: bool) {
        if from_fr == to_fr {
            return;
        }

        if to_fr {
            let packed: [u32; 32] = std::array::from_fn(|i| self.word(i));
            for (i, value) in packed.into_iter().enumerate() {
                self.set_word(2 * i, value);
            }
        } else {
            let spread: [u32; 32] = std::array::from_fn(|i| self.word(2 * i));
            for (i, value) in spread.into_iter().enumerate() {
                self.set_word(i, value);
            }
        }
    }

    /// Recomputes which word every single and which slot every double refers to.
    pub fn set_pointers(&mut self, fr: bool) {
        for i in 0..32u8 {
            if fr {
                self.singles[i as usize] = 2 * i;
                self.doubles[i as usize] = i;
            } else {
                self.singles[i as usize] = i;
                self.doubles[i as usize] = i / 2;
            }
        }
    }

    /// Reads the bits of single precision register `index`.
    #[inline(always)]
    pub fn read_single(&self, index: usize) -> u32 {
        self.word(self.singles[index] as usize)
    }

    /// Writes the bits of single precision register `index`.
    #[inline(always)]
    pub fn write_single(&mut self, index: usize, value: u32) {
        self.set_word(self.singles[index] as usize, value);
    }

    /// Reads the bits of double precision register `index`.
    #[inline(always)]
    pub fn read_double(&self, index: usize) -> u64 {
        self.fgr[self.doubles[index] as usize]
    }

    /// Writes the bits of double precision register `index`.
    #[inline(always)]
    pub fn write_double(&mut self, index: usize, value: u64) {
        self.fgr[self.doubles[index] as usize] = value;
    }

    #[inline(always)]
    pub fn read_f32(&self, index: usize) -> f32 {
        f32::from_bits(self.read_single(index))
    }

    #[inline(always)]
    pub fn write_f32(&mut self, index: usize, value: f32) {
        self.write_single(index, value.to_bits());
    }

    #[inline(always)]
    pub fn read_f64(&self, index: usize) -> f64 {
        f64::from_bits(self.read_double(index))
    }

    #[inline(always)]
    pub fn write_f64(&mut self, index: usize, value: f64) {
        self.write_double(index, value.to_bits());
    }

    #[inline(always)]
    pub fn rounding_mode(&self) -> RoundingMode {
        self.fcr31.rounding_mode()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn cop1(fr: bool) -> impl Strategy<Value = Cop1> {
        any::<[u64; 32]>().prop_map(move |fgr| {
            let mut cop1 = Cop1::default();
            cop1.set_pointers(fr);
            cop1.fgr = fgr;
            cop1
        })
    }

    fn switch(cop1: &mut Cop1, from: bool, to: bool) {
        cop1.shuffle_data(from, to);
        cop1.set_pointers(to);
    }

    proptest! {
        #[test]
        fn singles_survive_mode_switch(fr in any::<bool>(), mut cop1 in cop1(false)) {
            cop1.set_pointers(fr);
            let before: [u32; 32] = std::array::from_fn(|i| cop1.read_single(i));

            switch(&mut cop1, fr, !fr);
            let during: [u32; 32] = std::array::from_fn(|i| cop1.read_single(i));
            prop_assert_eq!(before, during);

            switch(&mut cop1, !fr, fr);
            let after: [u32; 32] = std::array::from_fn(|i| cop1.read_single(i));
            prop_assert_eq!(before, after);
        }

        #[test]
        fn packed_double_is_single_pair(mut cop1 in cop1(false), index in (0usize..16).prop_map(|i| i * 2)) {
            let low = cop1.read_single(index);
            let high = cop1.read_single(index + 1);
            prop_assert_eq!(cop1.read_double(index), (u64::from(high) << 32) | u64::from(low));

            cop1.write_double(index, 0x1122_3344_5566_7788);
            prop_assert_eq!(cop1.read_single(index), 0x5566_7788);
            prop_assert_eq!(cop1.read_single(index + 1), 0x1122_3344);
        }
    }

    #[test]
    fn wide_mode_maps_slots_directly() {
        let mut cop1 = Cop1::default();
        cop1.set_pointers(true);

        cop1.write_f64(3, 1.5);
        assert_eq!(cop1.fgr[3], 1.5f64.to_bits());

        cop1.write_single(5, 0xDEAD_BEEF);
        assert_eq!(cop1.fgr[5] as u32, 0xDEAD_BEEF);
    }

    #[test]
    fn rounding_modes() {
        assert_eq!(RoundingMode::Nearest.round_f32(2.5), 2.0);
        assert_eq!(RoundingMode::Nearest.round_f32(3.5), 4.0);
        assert_eq!(RoundingMode::Truncate.round_f64(-1.7), -1.0);
        assert_eq!(RoundingMode::Ceil.round_f64(1.2), 2.0);
        assert_eq!(RoundingMode::Floor.round_f32(-1.2), -2.0);
    }
}
