use super::Interpreter;
use rumble_core::{
    cpu::{
        Reg,
        instr::{BranchCop1Kind, Instruction},
    },
    sign_extend,
};

/// A control transfer about to happen.
struct Jump {
    target: u32,
    taken: bool,
    /// Register receiving the return address. [`Reg::R0`] for no link.
    link: Reg,
    /// Likely branches skip their delay slot when not taken.
    likely: bool,
}

impl Interpreter<'_> {
    /// Target of a PC relative branch.
    #[inline(always)]
    fn branch_target(&self, instr: Instruction) -> u32 {
        let offset = i32::from(instr.signed_imm16()) << 2;
        self.machine
            .cpu
            .regs
            .pc
            .wrapping_add(4)
            .wrapping_add_signed(offset)
    }

    /// Whether the branch at the PC jumps to itself with a NOP in its delay slot, i.e. waits for
    /// an interrupt.
    fn is_idle_loop(&self, jump: &Jump) -> bool {
        let pc = self.machine.cpu.regs.pc;
        jump.taken
            && jump.target == pc
            && self
                .peek(pc.wrapping_add(4))
                .is_some_and(|slot| slot == Instruction::NOP)
    }

    /// Advances COUNT up to the next scheduled event, keeping it aligned to 4.
    fn skip_idle_loop(&mut self) {
        self.machine.update_count();
        if self.machine.scheduler.is_empty() {
            return;
        }

        let count = self.machine.count();
        let skip = self.machine.scheduler.next_due().wrapping_sub(count);
        if skip > 3 && skip < 0x8000_0000 {
            self.machine.cop0.set_count(count.wrapping_add(skip & !3));
        }
    }

    /// Performs a jump or branch: links, runs the delay slot and commits the target unless an
    /// exception was raised in the slot.
    fn jump(&mut self, jump: Jump) {
        let pc = self.machine.cpu.regs.pc;
        if jump.link != Reg::R0 {
            self.set_gpr(jump.link, sign_extend(pc.wrapping_add(8)));
        }

        if self.is_idle_loop(&jump) {
            self.skip_idle_loop();
        }

        if !jump.likely || jump.taken {
            self.advance();
            self.machine.cpu.delay_slot = true;
            if let Some(slot) = self.fetch() {
                self.exec(slot);
            }

            self.machine.update_count();
            self.machine.cpu.delay_slot = false;

            if jump.taken && self.machine.cpu.skip_jump.is_none() {
                self.machine.cpu.regs.pc = jump.target;
            }
        } else {
            self.machine.cpu.regs.pc = pc.wrapping_add(8);
            self.machine.update_count();
        }

        self.machine.cpu.last_addr = self.machine.cpu.regs.pc;

        // a pending skip is serviced even with an empty queue
        let count = self.machine.count();
        if self.machine.cpu.skip_jump.is_some() || self.machine.scheduler.due(count) {
            self.machine.fire();
        }
    }

    fn branch(&mut self, instr: Instruction, taken: bool, link: Reg, likely: bool) {
        let target = self.branch_target(instr);
        self.jump(Jump {
            target,
            taken,
            link,
            likely,
        });
    }

    /// `pc = (pc & 0xF000_0000) | (imm26 << 2)`
    pub fn j(&mut self, instr: Instruction) {
        let pc = self.machine.cpu.regs.pc.wrapping_add(4);
        let target = (pc & 0xF000_0000) | (instr.imm26().value() << 2);
        self.jump(Jump {
            target,
            taken: true,
            link: Reg::R0,
            likely: false,
        });
    }

    /// `ra = pc + 8; pc = (pc & 0xF000_0000) | (imm26 << 2)`
    pub fn jal(&mut self, instr: Instruction) {
        let pc = self.machine.cpu.regs.pc.wrapping_add(4);
        let target = (pc & 0xF000_0000) | (instr.imm26().value() << 2);
        self.jump(Jump {
            target,
            taken: true,
            link: Reg::RA,
            likely: false,
        });
    }

    /// `pc = rs`
    pub fn jr(&mut self, instr: Instruction) {
        let target = self.gpr(instr.rs()) as u32;
        self.jump(Jump {
            target,
            taken: true,
            link: Reg::R0,
            likely: false,
        });
    }

    /// `rd = pc + 8; pc = rs`
    pub fn jalr(&mut self, instr: Instruction) {
        let target = self.gpr(instr.rs()) as u32;
        self.jump(Jump {
            target,
            taken: true,
            link: instr.rd(),
            likely: false,
        });
    }

    /// `if rs == rt { branch }`
    pub fn beq(&mut self, instr: Instruction) {
        let taken = self.gpr(instr.rs()) == self.gpr(instr.rt());
        self.branch(instr, taken, Reg::R0, false);
    }

    /// `if rs != rt { branch }`
    pub fn bne(&mut self, instr: Instruction) {
        let taken = self.gpr(instr.rs()) != self.gpr(instr.rt());
        self.branch(instr, taken, Reg::R0, false);
    }

    /// `if rs <= 0 { branch }`
    pub fn blez(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) <= 0;
        self.branch(instr, taken, Reg::R0, false);
    }

    /// `if rs > 0 { branch }`
    pub fn bgtz(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) > 0;
        self.branch(instr, taken, Reg::R0, false);
    }

    /// `if rs < 0 { branch }`
    pub fn bltz(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) < 0;
        self.branch(instr, taken, Reg::R0, false);
    }

    /// `if rs >= 0 { branch }`
    pub fn bgez(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) >= 0;
        self.branch(instr, taken, Reg::R0, false);
    }

    /// `if rs == rt { branch } else { skip slot }`
    pub fn beql(&mut self, instr: Instruction) {
        let taken = self.gpr(instr.rs()) == self.gpr(instr.rt());
        self.branch(instr, taken, Reg::R0, true);
    }

    /// `if rs != rt { branch } else { skip slot }`
    pub fn bnel(&mut self, instr: Instruction) {
        let taken = self.gpr(instr.rs()) != self.gpr(instr.rt());
        self.branch(instr, taken, Reg::R0, true);
    }

    /// `if rs <= 0 { branch } else { skip slot }`
    pub fn blezl(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) <= 0;
        self.branch(instr, taken, Reg::R0, true);
    }

    /// `if rs > 0 { branch } else { skip slot }`
    pub fn bgtzl(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) > 0;
        self.branch(instr, taken, Reg::R0, true);
    }

    /// `if rs < 0 { branch } else { skip slot }`
    pub fn bltzl(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) < 0;
        self.branch(instr, taken, Reg::R0, true);
    }

    /// `if rs >= 0 { branch } else { skip slot }`
    pub fn bgezl(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) >= 0;
        self.branch(instr, taken, Reg::R0, true);
    }

    /// `ra = pc + 8; if rs < 0 { branch }`
    pub fn bltzal(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) < 0;
        self.branch(instr, taken, Reg::RA, false);
    }

    /// `ra = pc + 8; if rs >= 0 { branch }`
    pub fn bgezal(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) >= 0;
        self.branch(instr, taken, Reg::RA, false);
    }

    /// `ra = pc + 8; if rs < 0 { branch } else { skip slot }`
    pub fn bltzall(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) < 0;
        self.branch(instr, taken, Reg::RA, true);
    }

    /// `ra = pc + 8; if rs >= 0 { branch } else { skip slot }`
    pub fn bgezall(&mut self, instr: Instruction) {
        let taken = (self.gpr(instr.rs()) as i64) >= 0;
        self.branch(instr, taken, Reg::RA, true);
    }

    /// Branches on the FPU condition bit.
    pub fn bc1(&mut self, instr: Instruction) {
        let condition = self.machine.cop1.fcr31.condition();
        let (taken, likely) = match instr.bc1_kind() {
            BranchCop1Kind::BC1F => (!condition, false),
            BranchCop1Kind::BC1T => (condition, false),
            BranchCop1Kind::BC1FL => (!condition, true),
            BranchCop1Kind::BC1TL => (condition, true),
        };

        self.branch(instr, taken, Reg::R0, likely);
    }
}

#[cfg(test)]
mod tests {
    use bitos::integer::u5;
    use crate::{
        cpu::test::{BASE, load, machine, step, test_machine},
        scheduler::Event,
    };
    use rumble_core::{
        cpu::{
            Reg,
            cop0::{Exception, GENERAL_VECTOR},
            instr::{BranchCop1Kind, Instruction, Opcode, RegImmOpcode, SpecialOpcode},
        },
        sign_extend,
    };

    #[test]
    fn delay_slot_runs_when_not_taken() {
        test_machine! {
            machine([0; 32]) =>
            bne(Reg::R0, Reg::R0, 3)
            addiu(Reg::R9, Reg::R0, 5)
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 5);
        assert_eq!(machine.cpu.regs.pc, BASE + 8);
        assert!(!machine.cpu.delay_slot);
    }

    #[test]
    fn taken_branch_runs_the_slot_then_commits() {
        test_machine! {
            machine([0; 32]) =>
            beq(Reg::R0, Reg::R0, 3)
            addiu(Reg::R9, Reg::R0, 7)
        };

        let before = machine.count();
        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 7);
        assert_eq!(machine.cpu.regs.pc, BASE + 0x10);
        assert_eq!(machine.count(), before + 2 * machine.count_per_op);
    }

    #[test]
    fn likely_branch_skips_the_slot_when_not_taken() {
        test_machine! {
            machine([0; 32]) =>
            bnel(Reg::R0, Reg::R0, 3)
            addiu(Reg::R9, Reg::R0, 7)
            beql(Reg::R0, Reg::R0, 3)
            addiu(Reg::R10, Reg::R0, 7)
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0);
        assert_eq!(machine.cpu.regs.pc, BASE + 8);

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R10), 7);
        assert_eq!(machine.cpu.regs.pc, BASE + 0x18);
    }

    #[test]
    fn jumps_link() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = sign_extend(0x8000_4000);
        test_machine! {
            machine(gp) =>
            jal(0x8000_3000)
            sll(Reg::R0, Reg::R0, u5::new(0))
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, 0x8000_3000);
        assert_eq!(machine.cpu.regs.read(Reg::RA), sign_extend(BASE + 8));

        load(
            &mut machine,
            0x8000_3000,
            &[Instruction::special(
                SpecialOpcode::JALR,
                Reg::R9,
                Reg::T0,
                Reg::R0,
            )],
        );

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, 0x8000_4000);
        assert_eq!(machine.cpu.regs.read(Reg::R9), sign_extend(0x8000_3008));
    }

    #[test]
    fn branch_and_link_links_when_not_taken() {
        let mut machine = machine();
        machine.cpu.regs.write(Reg::T0, u64::MAX);
        let bgezal = Instruction::NOP
            .with_op(Opcode::REGIMM)
            .with_regimm_op(RegImmOpcode::BGEZAL)
            .with_rs(Reg::T0)
            .with_signed_imm16(3);
        load(&mut machine, BASE, &[bgezal]);

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, BASE + 8);
        assert_eq!(machine.cpu.regs.read(Reg::RA), sign_extend(BASE + 8));
    }

    #[test]
    fn exception_in_the_slot_cancels_the_branch() {
        test_machine! {
            machine([0; 32]) =>
            beq(Reg::R0, Reg::R0, 3)
            syscall()
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, GENERAL_VECTOR);
        assert_eq!(machine.cpu.skip_jump, None);
        assert_eq!(machine.cop0.read(Reg::COP0_EPC), BASE);
        assert!(machine.cop0.cause().branch_delay());
        assert_eq!(
            machine.cop0.cause().exception_code(),
            Exception::Syscall.code()
        );
    }

    #[test]
    fn idle_loop_skips_to_the_next_event() {
        test_machine! {
            machine([0; 32]) =>
            beq(Reg::R0, Reg::R0, -1)
        };

        let before = machine.count();
        machine.scheduler.add(Event::Bootstrap, 1000, before);

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, BASE);
        assert!(machine.count().wrapping_sub(before) >= 1000);
        assert!(machine.scheduler.bootstrap_done());
    }

    #[test]
    fn fpu_condition_branches() {
        test_machine! {
            machine([0; 32]) =>
            bc1(BranchCop1Kind::BC1T, 3)
            sll(Reg::R0, Reg::R0, u5::new(0))
        };

        machine.cop1.fcr31 = machine.cop1.fcr31.with_condition(true);
        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, BASE + 0x10);

        load(
            &mut machine,
            BASE,
            &[
                Instruction::bc1(BranchCop1Kind::BC1FL, 3),
                Instruction::addiu(Reg::R9, Reg::R0, 1),
            ],
        );

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, BASE + 8);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0);
    }
}
