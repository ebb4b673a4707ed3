//! Architectural exceptions: general exceptions and TLB refills.

use crate::Machine;
use bitos::integer::u2;
use rumble_core::cpu::{
    Reg,
    cop0::{BOOT_VECTOR_BASE, Exception, GENERAL_VECTOR, REFILL_VECTOR},
    tlb::Access,
};
use tracing::{debug, trace};

/// Offset of the general vector from the base of the exception vectors.
const GENERAL_OFFSET: u32 = 0x180;

impl Machine {
    /// Accounts for the instructions retired since the last update in COUNT.
    #[inline(always)]
    pub fn update_count(&mut self) {
        let pc = self.cpu.regs.pc;
        let retired = pc.wrapping_sub(self.cpu.last_addr) >> 2;
        let count = self
            .cop0
            .count()
            .wrapping_add(retired.wrapping_mul(self.count_per_op));

        self.cop0.set_count(count);
        self.cpu.last_addr = pc;
    }

    fn vector_base(&self) -> u32 {
        if self.cop0.status().boot_exception_vectors() {
            BOOT_VECTOR_BASE
        } else {
            REFILL_VECTOR
        }
    }

    /// Jumps to `vector`. Inside a delay slot, the jump is deferred to the next scheduler poll so
    /// the branch being executed does not commit.
    fn enter_vector(&mut self, vector: u32) {
        self.cpu.regs.pc = vector;
        self.cpu.last_addr = vector;

        if self.cpu.delay_slot {
            self.cpu.skip_jump = Some(vector);
            let count = self.count();
            self.scheduler.expire(count);
        }
    }

    /// Raises a general exception. The PC must hold the address of the faulting instruction.
    pub fn exception(&mut self, exception: Exception) {
        self.exception_with_coprocessor(exception, 0);
    }

    /// Raises a general exception, recording `coprocessor` in the `CE` field of CAUSE.
    pub fn exception_with_coprocessor(&mut self, exception: Exception, coprocessor: u8) {
        if exception == Exception::Interrupt {
            trace!(target: "cpu", "interrupt at 0x{:08X}", self.cpu.regs.pc);
        } else {
            debug!(
                target: "cpu",
                "{} exception at 0x{:08X}",
                <&'static str>::from(exception),
                self.cpu.regs.pc
            );
        }

        self.update_count();

        let mut epc = self.cpu.regs.pc;
        if self.cpu.delay_slot {
            epc = epc.wrapping_sub(4);
        }

        let cause = self
            .cop0
            .cause()
            .with_exception_code(exception.code())
            .with_coprocessor(u2::new(coprocessor & 0b11))
            .with_branch_delay(self.cpu.delay_slot);

        self.cop0.set_cause(cause);
        self.cop0.write(Reg::COP0_EPC, epc);
        self.cop0
            .set_status(self.cop0.status().with_exception_level(true));

        let vector = self.vector_base() + GENERAL_OFFSET;
        debug_assert!(vector == GENERAL_VECTOR || vector == BOOT_VECTOR_BASE + GENERAL_OFFSET);
        self.enter_vector(vector);
    }

    /// Raises an address error for an access to `addr`.
    pub fn address_error(&mut self, addr: u32, store: bool) {
        self.cop0.write(Reg::COP0_BAD_VADDR, addr);
        self.exception(if store {
            Exception::AddressErrorStore
        } else {
            Exception::AddressErrorLoad
        });
    }

    /// Raises a TLB refill exception for a miss on `addr`.
    ///
    /// Data accesses reach here with the PC already past the faulting instruction, while fetch
    /// misses are taken before the PC moves.
    pub fn tlb_refill(&mut self, addr: u32, access: Access) {
        debug!(target: "tlb", "{access:?} miss at 0x{addr:08X} (pc 0x{:08X})", self.cpu.regs.pc);

        if access != Access::Fetch {
            self.update_count();
        }

        let code = if access == Access::Write {
            Exception::TlbStore
        } else {
            Exception::TlbLoad
        };

        let context = self.cop0.read(Reg::COP0_CONTEXT);
        self.cop0.write(Reg::COP0_BAD_VADDR, addr);
        self.cop0.write(
            Reg::COP0_CONTEXT,
            (context & 0xFF80_000F) | ((addr >> 9) & 0x007F_FFF0),
        );
        self.cop0.write(Reg::COP0_ENTRY_HI, addr & 0xFFFF_E000);

        let mut cause = self
            .cop0
            .cause()
            .with_exception_code(code.code())
            .with_branch_delay(self.cpu.delay_slot);

        let base = self.vector_base();
        let status = self.cop0.status();
        let vector = if status.exception_level() {
            base + GENERAL_OFFSET
        } else {
            let mut epc = if access == Access::Fetch {
                addr
            } else {
                self.cpu.regs.pc.wrapping_sub(4)
            };

            if self.cpu.delay_slot {
                epc = epc.wrapping_sub(4);
            }

            self.cop0.write(Reg::COP0_EPC, epc);
            self.cop0.set_status(status.with_exception_level(true));

            let covered = (0x8000_0000..0xC000_0000).contains(&addr) || self.tlb.covers(addr);
            if covered { base + GENERAL_OFFSET } else { base }
        };

        if !self.cpu.delay_slot {
            cause = cause.with_branch_delay(false);
        }

        self.cop0.set_cause(cause);
        self.enter_vector(vector);
    }
}

#[cfg(test)]
mod test {
    use crate::cpu::test::machine;
    use rumble_core::cpu::{
        Reg,
        cop0::{Exception, GENERAL_VECTOR, REFILL_VECTOR},
        tlb::Access,
    };

    #[test]
    fn general_exception() {
        let mut machine = machine();
        machine.cpu.regs.pc = 0x8000_1000;
        machine.cpu.last_addr = 0x8000_1000;
        machine.exception(Exception::Syscall);

        assert_eq!(machine.cpu.regs.pc, GENERAL_VECTOR);
        assert_eq!(machine.cop0.read(Reg::COP0_EPC), 0x8000_1000);
        assert!(machine.cop0.status().exception_level());
        assert_eq!(machine.cop0.cause().exception_code(), Exception::Syscall.code());
        assert!(!machine.cop0.cause().branch_delay());
    }

    #[test]
    fn exception_in_delay_slot_defers_the_jump() {
        let mut machine = machine();
        machine.cpu.regs.pc = 0x8000_1004;
        machine.cpu.last_addr = 0x8000_1004;
        machine.cpu.delay_slot = true;
        machine.exception(Exception::Breakpoint);

        assert_eq!(machine.cop0.read(Reg::COP0_EPC), 0x8000_1000);
        assert!(machine.cop0.cause().branch_delay());
        assert_eq!(machine.cpu.skip_jump, Some(GENERAL_VECTOR));
        assert!(machine.scheduler.due(machine.count()));
    }

    #[test]
    fn refill_vectors() {
        let mut machine = machine();
        machine.cpu.regs.pc = 0x8000_2004;
        machine.tlb_refill(0x0040_0000, Access::Read);

        assert_eq!(machine.cpu.regs.pc, REFILL_VECTOR);
        assert_eq!(machine.cop0.read(Reg::COP0_EPC), 0x8000_2000);
        assert_eq!(machine.cop0.read(Reg::COP0_BAD_VADDR), 0x0040_0000);
        assert_eq!(machine.cop0.read(Reg::COP0_ENTRY_HI), 0x0040_0000);
        assert_eq!(machine.cop0.cause().exception_code(), Exception::TlbLoad.code());
    }

    #[test]
    fn refill_at_exception_level_uses_general_vector() {
        let mut machine = machine();
        machine
            .cop0
            .set_status(machine.cop0.status().with_exception_level(true));
        machine.cop0.write(Reg::COP0_EPC, 0x1234_5678);
        machine.cpu.regs.pc = 0x0040_0000;
        machine.tlb_refill(0x0040_0000, Access::Fetch);

        assert_eq!(machine.cpu.regs.pc, GENERAL_VECTOR);
        assert_eq!(machine.cop0.read(Reg::COP0_EPC), 0x1234_5678);
    }
}
