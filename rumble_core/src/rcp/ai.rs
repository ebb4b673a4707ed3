//! The audio interface.
//!
//! The AI plays one buffer while holding at most one more: a two-entry FIFO of DMA lengths and the
//! COUNT units each takes to drain.

use strum::{FromRepr, IntoStaticStr};

/// `AI_DACRATE` is 14 bits wide.
pub const DACRATE_MASK: u32 = 0x3FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Reg {
    DramAddr,
    Len,
    Control,
    Status,
    DacRate,
    BitRate,
}

impl Reg {
    #[inline(always)]
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::from_repr((offset >> 2) as u8)
    }
}

pub mod status {
    pub const BUSY: u32 = 1 << 30;
    pub const FULL: u32 = 1 << 31;
}

/// A buffer handed to the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dma {
    pub length: u32,
    /// COUNT units the buffer takes to play.
    pub delay: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Ai {
    pub regs: [u32; 6],
    /// The buffer playing.
    pub current: Dma,
    /// The buffer queued after it.
    pub next: Dma,
}

impl Ai {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg as usize]
    }

    /// Stores a value. Returns whether it differs from the previous one.
    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) -> bool {
        let value = match reg {
            Reg::DacRate => value & DACRATE_MASK,
            _ => value,
        };

        let changed = self.regs[reg as usize] != value;
        self.regs[reg as usize] = value;
        changed
    }

    #[inline(always)]
    pub fn status(&self) -> u32 {
        self.read(Reg::Status)
    }

    #[inline(always)]
    pub fn busy(&self) -> bool {
        self.status() & status::BUSY != 0
    }

    /// Queues a buffer. Returns `true` if it starts playing right away, in which case its
    /// completion must be scheduled after `dma.delay`.
    pub fn push(&mut self, dma: Dma) -> bool {
        if self.busy() {
            self.next = dma;
            self.regs[Reg::Status as usize] |= status::FULL;
            false
        } else {
            self.current = dma;
            self.regs[Reg::Status as usize] |= status::BUSY;
            true
        }
    }

    /// Retires the playing buffer. Returns the delay of the next one if the FIFO was full, in which
    /// case it becomes the playing buffer.
    pub fn pop(&mut self) -> Option<u32> {
        if self.status() & status::FULL != 0 {
            self.current = self.next;
            self.regs[Reg::Status as usize] &= !status::FULL;
            Some(self.current.delay)
        } else {
            self.regs[Reg::Status as usize] &= !status::BUSY;
            None
        }
    }

    /// Bytes of the playing buffer left, given the COUNT units left until it ends.
    pub fn remaining(&self, left: u32) -> u32 {
        if self.current.delay == 0 {
            return 0;
        }

        let remaining = u64::from(left) * u64::from(self.current.length) / u64::from(self.current.delay);
        remaining as u32
    }

    /// Clears the status register and the FIFO.
    pub fn clear_status(&mut self) {
        self.regs[Reg::Status as usize] = 0;
        self.current = Dma::default();
        self.next = Dma::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dacrate_keeps_its_width() {
        let mut ai = Ai::default();
        assert!(ai.write(Reg::DacRate, u32::MAX));
        assert_eq!(ai.read(Reg::DacRate), DACRATE_MASK);
        assert!(!ai.write(Reg::DacRate, 0xFFFF_C000 | DACRATE_MASK));
    }

    #[test]
    fn fifo() {
        let mut ai = Ai::default();
        let a = Dma { length: 0x100, delay: 1000 };
        let b = Dma { length: 0x200, delay: 2000 };

        assert!(ai.push(a));
        assert!(!ai.push(b));
        assert_eq!(ai.status(), status::BUSY | status::FULL);

        assert_eq!(ai.pop(), Some(2000));
        assert_eq!(ai.current, b);
        assert_eq!(ai.status(), status::BUSY);

        assert_eq!(ai.pop(), None);
        assert_eq!(ai.status(), 0);
    }

    #[test]
    fn remaining_length() {
        let mut ai = Ai::default();
        ai.push(Dma { length: 0x1000, delay: 4000 });
        assert_eq!(ai.remaining(2000), 0x800);
        assert_eq!(ai.remaining(0), 0);
    }
}
