//! The video interface.

use strum::{FromRepr, IntoStaticStr};

/// VI period used when `V_SYNC` is zero.
pub const DEFAULT_DELAY: u32 = 500_000;

/// `V_SYNC` is 10 bits wide.
pub const V_SYNC_MASK: u32 = 0x3FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    Status,
    Origin,
    Width,
    VIntr,
    Current,
    Burst,
    VSync,
    HSync,
    Leap,
    HStart,
    VStart,
    VBurst,
    XScale,
    YScale,
}

impl Reg {
    #[inline(always)]
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::from_repr((offset >> 2) as u8)
    }
}

/// Bit of the status register selecting interlaced output.
pub const STATUS_SERRATE: u32 = 1 << 6;

#[derive(Debug, Clone)]
pub struct Vi {
    pub regs: [u32; 14],
    /// COUNT units between two VIs.
    pub delay: u32,
    /// The field being drawn, toggled every VI in interlaced modes.
    pub field: bool,
}

impl Default for Vi {
    fn default() -> Self {
        Self {
            regs: [0; 14],
            delay: DEFAULT_DELAY,
            field: false,
        }
    }
}

impl Vi {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    /// Stores a value. Returns whether it differs from the previous one.
    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) -> bool {
        let value = match reg {
            Reg::VSync => value & V_SYNC_MASK,
            _ => value,
        };

        let changed = self.regs[reg as usize] != value;
        self.regs[reg as usize] = value;
        changed
    }

    /// Recomputes the VI period for `refresh` COUNT units per line.
    pub fn update_delay(&mut self, refresh: u32) {
        let v_sync = self.read(Reg::VSync);
        self.delay = if v_sync == 0 {
            DEFAULT_DELAY
        } else {
            (v_sync & V_SYNC_MASK).wrapping_add(1).wrapping_mul(refresh)
        };
    }

    /// Advances the field after a VI.
    pub fn advance_field(&mut self) {
        self.field = if self.read(Reg::Status) & STATUS_SERRATE != 0 {
            !self.field
        } else {
            false
        };
    }

    /// Computes the current half-line, given the COUNT units remaining until the next VI.
    pub fn current_line(&self, remaining: u32, refresh: u32) -> u32 {
        let elapsed = self.delay.wrapping_sub(remaining);
        let line = elapsed / refresh.max(1);
        (line & !1) | u32::from(self.field)
    }
}
