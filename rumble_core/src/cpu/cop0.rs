//! COP0, the system control coprocessor.

use super::Reg;
use bitos::{
    bitos,
    integer::{u2, u5},
};
use strum::IntoStaticStr;

/// General exception vector when `BEV` is clear.
pub const GENERAL_VECTOR: u32 = 0x8000_0180;
/// TLB refill vector when `BEV` is clear.
pub const REFILL_VECTOR: u32 = 0x8000_0000;
/// Base of the exception vectors when `BEV` is set.
pub const BOOT_VECTOR_BASE: u32 = 0xBFC0_0200;

/// Exception codes, as stored in [`Cause::exception_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[repr(u8)]
pub enum Exception {
    Interrupt = 0x00,
    TlbModification = 0x01,
    TlbLoad = 0x02,
    TlbStore = 0x03,
    AddressErrorLoad = 0x04,
    AddressErrorStore = 0x05,
    BusErrorInstruction = 0x06,
    BusErrorData = 0x07,
    Syscall = 0x08,
    Breakpoint = 0x09,
    ReservedInstruction = 0x0A,
    CopUnusable = 0x0B,
    ArithmeticOverflow = 0x0C,
    Trap = 0x0D,
    FloatingPoint = 0x0F,
    Watch = 0x17,
}

impl Exception {
    #[inline(always)]
    pub fn code(self) -> u5 {
        u5::new(self as u8)
    }
}

/// The status register (index 12).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    /// `IE`
    #[bits(0)]
    pub interrupts_enabled: bool,
    /// `EXL`
    #[bits(1)]
    pub exception_level: bool,
    /// `ERL`
    #[bits(2)]
    pub error_level: bool,
    /// `KSU`
    #[bits(3..5)]
    pub mode: u2,
    /// `IM0..IM7`
    #[bits(8..16)]
    pub interrupt_mask: u8,
    /// `BEV`: exception vectors live in the boot segment.
    #[bits(22)]
    pub boot_exception_vectors: bool,
    /// `FR`: the FPU exposes 32 64-bit registers instead of 16.
    #[bits(26)]
    pub fpu_64bit_registers: bool,
    #[bits(28)]
    pub cop0_usable: bool,
    #[bits(29)]
    pub cop1_usable: bool,
}

impl Status {
    /// Whether the CPU currently accepts interrupts: `IE` set, `EXL` and `ERL` clear.
    #[inline(always)]
    pub fn accepts_interrupts(&self) -> bool {
        self.interrupts_enabled() && !self.exception_level() && !self.error_level()
    }
}

/// The cause register (index 13).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cause {
    #[bits(2..7)]
    pub exception_code: u5,
    /// `IP0..IP7`
    #[bits(8..16)]
    pub interrupt_pending: u8,
    /// `CE`: the coprocessor referenced by a coprocessor unusable exception.
    #[bits(28..30)]
    pub coprocessor: u2,
    /// `BD`
    #[bits(31)]
    pub branch_delay: bool,
}

impl Cause {
    /// `IP2`, wired to the MI interrupt line.
    pub const RCP_INTERRUPT: u8 = 1 << 2;
    /// `IP4`, the pre-NMI line raised by the reset button.
    pub const RESET_INTERRUPT: u8 = 1 << 4;
    /// `IP7`, raised when COUNT reaches COMPARE.
    pub const TIMER_INTERRUPT: u8 = 1 << 7;

    /// Sets the given pending bits and clears the exception code, which is the shape an
    /// interrupting device leaves the register in.
    #[inline(always)]
    pub fn with_interrupt(self, bits: u8) -> Self {
        self.with_interrupt_pending(self.interrupt_pending() | bits)
            .with_exception_code(Exception::Interrupt.code())
    }
}

/// The registers of COP0.
#[derive(Debug, Clone)]
pub struct Registers(pub [u32; 32]);

impl Default for Registers {
    fn default() -> Self {
        Self([0; 32])
    }
}

impl Registers {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u32 {
        self.0[reg.index()]
    }

    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u32) {
        self.0[reg.index()] = value;
    }

    #[inline(always)]
    pub fn status(&self) -> Status {
        Status::from_bits(self.read(Reg::COP0_STATUS))
    }

    #[inline(always)]
    pub fn set_status(&mut self, status: Status) {
        self.write(Reg::COP0_STATUS, status.to_bits());
    }

    #[inline(always)]
    pub fn cause(&self) -> Cause {
        Cause::from_bits(self.read(Reg::COP0_CAUSE))
    }

    #[inline(always)]
    pub fn set_cause(&mut self, cause: Cause) {
        self.write(Reg::COP0_CAUSE, cause.to_bits());
    }

    #[inline(always)]
    pub fn count(&self) -> u32 {
        self.read(Reg::COP0_COUNT)
    }

    #[inline(always)]
    pub fn set_count(&mut self, value: u32) {
        self.write(Reg::COP0_COUNT, value);
    }

    #[inline(always)]
    pub fn compare(&self) -> u32 {
        self.read(Reg::COP0_COMPARE)
    }

    /// Whether an interrupt is both pending in CAUSE and unmasked in STATUS, with the CPU in a
    /// state that accepts it.
    pub fn interrupt_requested(&self) -> bool {
        let status = self.status();
        status.accepts_interrupts()
            && (status.interrupt_mask() & self.cause().interrupt_pending()) != 0
    }

    /// Computes the value `Random` takes for the current COUNT and `Wired`.
    pub fn random(&self) -> u32 {
        let wired = self.read(Reg::COP0_WIRED).min(31);
        (self.count() / 2) % (32 - wired) + wired
    }

    /// Puts the registers in their power-on state.
    pub fn reset(&mut self) {
        self.0 = [0; 32];
        self.write(Reg::COP0_RANDOM, 31);
        self.write(Reg::COP0_STATUS, 0x3400_0000);
        self.write(Reg::COP0_CONFIG, 0x0006_E463);
        self.write(Reg::COP0_PREVID, 0x0000_0B00);
        self.write(Reg::COP0_COUNT, 0x5000);
        self.write(Reg::COP0_CAUSE, 0x0000_005C);
        self.write(Reg::COP0_CONTEXT, 0x007F_FFF0);
        self.write(Reg::COP0_EPC, 0xFFFF_FFFF);
        self.write(Reg::COP0_BAD_VADDR, 0xFFFF_FFFF);
        self.write(Reg::COP0_ERROR_EPC, 0xFFFF_FFFF);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reset_values() {
        let mut regs = Registers::default();
        regs.reset();

        assert_eq!(regs.read(Reg::COP0_RANDOM), 31);
        assert!(regs.status().cop0_usable());
        assert!(regs.status().cop1_usable());
        assert!(regs.status().fpu_64bit_registers());
        assert!(!regs.status().accepts_interrupts());
        assert_eq!(regs.count(), 0x5000);
    }

    #[test]
    fn interrupt_shape_clears_code() {
        let cause = Cause::from_bits(0x0000_005C).with_interrupt(Cause::RCP_INTERRUPT);
        assert_eq!(cause.to_bits(), 0x0000_0400);
    }

    #[test]
    fn random_respects_wired() {
        let mut regs = Registers::default();
        regs.write(Reg::COP0_WIRED, 8);
        for count in [0, 1, 100, 0xFFFF_FFFF] {
            regs.set_count(count);
            let random = regs.random();
            assert!((8..32).contains(&random));
        }
    }

    #[test]
    fn interrupt_requested_needs_ie_and_mask() {
        let mut regs = Registers::default();
        regs.set_cause(Cause::default().with_interrupt(Cause::TIMER_INTERRUPT));
        assert!(!regs.interrupt_requested());

        regs.set_status(
            Status::default()
                .with_interrupts_enabled(true)
                .with_interrupt_mask(Cause::TIMER_INTERRUPT),
        );
        assert!(regs.interrupt_requested());

        regs.set_status(regs.status().with_exception_level(true));
        assert!(!regs.interrupt_requested());
    }
}
