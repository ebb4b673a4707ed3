//! Core crate of the rumble N64 emulator. This crate contains the architectural state of the
//! machine (registers, TLB, device register files, memories) and the pure logic that operates on a
//! single piece of that state. Anything that crosses components (the bus, the scheduler, the
//! interpreter) lives in the `rumble` crate.

pub mod cpu;
pub mod mem;
pub mod pif;
pub mod rcp;
pub mod rom;

mod util;

pub use binrw;
pub use util::{boxed_slice, write_masked};

/// Time unit of the machine: ticks of the COP0 COUNT register.
pub type Count = u32;

/// Sign extends the given word to a doubleword.
#[inline(always)]
pub const fn sign_extend(value: u32) -> u64 {
    value as i32 as i64 as u64
}
