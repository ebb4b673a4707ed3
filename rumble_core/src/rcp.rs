//! Register files of the devices of the RCP, the N64's peripheral chip.
//!
//! Every device owns its registers and any auxiliary state. Side effects that cross devices (DMA,
//! interrupts, collaborator calls) are not handled here.

pub mod ai;
pub mod dp;
pub mod mi;
pub mod pi;
pub mod ri;
pub mod si;
pub mod sp;
pub mod vi;

/// A set/clear bit pair of a write-only control register: writing `clear` clears `target`,
/// writing `set` sets it. When both are written, the set wins.
#[derive(Debug, Clone, Copy)]
pub struct SetClear {
    pub clear: u32,
    pub set: u32,
    pub target: u32,
}

impl SetClear {
    pub const fn new(clear: u32, set: u32, target: u32) -> Self {
        Self { clear, set, target }
    }

    /// Applies every pair of `pairs` for the written `value` to `current`.
    pub fn apply(pairs: &[SetClear], value: u32, current: u32) -> u32 {
        pairs.iter().fold(current, |acc, pair| {
            let mut acc = acc;
            if value & pair.clear != 0 {
                acc &= !pair.target;
            }

            if value & pair.set != 0 {
                acc |= pair.target;
            }

            acc
        })
    }
}

/// Every device register file of the RCP.
#[derive(Debug, Clone, Default)]
pub struct Rcp {
    pub mi: mi::Mi,
    pub sp: sp::Sp,
    pub dpc: dp::Dpc,
    pub dps: dp::Dps,
    pub vi: vi::Vi,
    pub ai: ai::Ai,
    pub pi: pi::Pi,
    pub si: si::Si,
    pub ri: ri::Ri,
    pub rdram: ri::RdramRegs,
}

impl Rcp {
    /// Puts every device in its power-on state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
