use super::Interpreter;
use crate::scheduler::Event;
use rumble_core::{
    cpu::{
        Reg,
        cop0::{Cause, Status},
        cop1::Fcr31,
        instr::Instruction,
        tlb::Entry,
    },
    sign_extend,
};
use tracing::trace;

/// Bit of `Index` set by `TLBP` when no entry matches.
const PROBE_FAILURE: u32 = 0x8000_0000;
/// Bits of CAUSE writable by software: the two software interrupts.
const CAUSE_WRITABLE: u32 = 0x0000_0300;

impl Interpreter<'_> {
    /// `rt = cop0[rd]`
    pub fn mfc0(&mut self, instr: Instruction) {
        let reg = instr.rd();
        let value = match reg {
            Reg::COP0_RANDOM => {
                self.machine.update_count();
                self.machine.cop0.random()
            }
            Reg::COP0_COUNT => {
                self.machine.update_count();
                self.machine.count()
            }
            _ => self.machine.cop0.read(reg),
        };

        self.set_gpr(instr.rt(), sign_extend(value));
        self.advance();
    }

    /// `cop0[rd] = rt`, with the write side effects of each register
    pub fn mtc0(&mut self, instr: Instruction) {
        let value = self.gpr(instr.rt()) as u32;
        let cop0 = &mut self.machine.cop0;

        match instr.rd() {
            Reg::COP0_INDEX => cop0.write(Reg::COP0_INDEX, value & 0x8000_003F),
            Reg::COP0_RANDOM | Reg::COP0_BAD_VADDR | Reg::COP0_PREVID => (),
            reg @ (Reg::COP0_ENTRY_LO0 | Reg::COP0_ENTRY_LO1) => cop0.write(reg, value & 0x3FFF_FFFF),
            Reg::COP0_CONTEXT => {
                let current = cop0.read(Reg::COP0_CONTEXT);
                cop0.write(
                    Reg::COP0_CONTEXT,
                    (value & 0xFF80_0000) | (current & 0x007F_FFF0),
                );
            }
            Reg::COP0_PAGE_MASK => cop0.write(Reg::COP0_PAGE_MASK, value & 0x01FF_E000),
            Reg::COP0_WIRED => {
                cop0.write(Reg::COP0_WIRED, value);
                cop0.write(Reg::COP0_RANDOM, 31);
            }
            Reg::COP0_COUNT => {
                self.machine.update_count();
                let count = self.machine.count();
                let compare = self.machine.cop0.compare();
                self.machine.scheduler.translate(count, value, compare);
                self.machine.cop0.set_count(value);
            }
            Reg::COP0_ENTRY_HI => cop0.write(Reg::COP0_ENTRY_HI, value & 0xFFFF_E0FF),
            Reg::COP0_COMPARE => {
                self.machine.update_count();
                let count = self.machine.count();
                self.machine.scheduler.remove(Event::Compare);
                self.machine.scheduler.add_at(Event::Compare, value, count);

                let cop0 = &mut self.machine.cop0;
                cop0.write(Reg::COP0_COMPARE, value);
                let cause = cop0.cause();
                cop0.set_cause(
                    cause.with_interrupt_pending(cause.interrupt_pending() & !Cause::TIMER_INTERRUPT),
                );
            }
            Reg::COP0_STATUS => {
                let old = cop0.status().fpu_64bit_registers();
                let new = Status::from_bits(value).fpu_64bit_registers();
                if old != new {
                    trace!(target: "cpu", "FPU register mode switched to FR = {new}");
                    self.machine.cop1.shuffle_data(old, new);
                    self.machine.cop1.set_pointers(new);
                }

                self.machine.cop0.write(Reg::COP0_STATUS, value);
                self.machine.check_interrupt();
            }
            Reg::COP0_CAUSE => {
                let current = cop0.read(Reg::COP0_CAUSE);
                cop0.write(
                    Reg::COP0_CAUSE,
                    (current & !CAUSE_WRITABLE) | (value & CAUSE_WRITABLE),
                );
                self.machine.check_interrupt();
            }
            Reg::COP0_TAG_LO => cop0.write(Reg::COP0_TAG_LO, value & 0x0FFF_FFC0),
            Reg::COP0_TAG_HI => cop0.write(Reg::COP0_TAG_HI, 0),
            reg => cop0.write(reg, value),
        }

        self.advance();
    }

    /// Loads the entry selected by `Index` into `PageMask`, `EntryHi` and `EntryLo0/1`.
    pub fn tlbr(&mut self, _: Instruction) {
        let cop0 = &mut self.machine.cop0;
        let index = (cop0.read(Reg::COP0_INDEX) & 0x1F) as usize;
        let entry = self.machine.tlb.entries[index];

        cop0.write(Reg::COP0_PAGE_MASK, entry.page_mask());
        cop0.write(Reg::COP0_ENTRY_HI, entry.entry_hi());
        cop0.write(Reg::COP0_ENTRY_LO0, entry.entry_lo0());
        cop0.write(Reg::COP0_ENTRY_LO1, entry.entry_lo1());
        self.advance();
    }

    fn entry_from_registers(&self) -> Entry {
        let cop0 = &self.machine.cop0;
        Entry::from_registers(
            cop0.read(Reg::COP0_PAGE_MASK),
            cop0.read(Reg::COP0_ENTRY_HI),
            cop0.read(Reg::COP0_ENTRY_LO0),
            cop0.read(Reg::COP0_ENTRY_LO1),
        )
    }

    /// Writes `PageMask`, `EntryHi` and `EntryLo0/1` to the entry selected by `Index`.
    pub fn tlbwi(&mut self, _: Instruction) {
        let index = (self.machine.cop0.read(Reg::COP0_INDEX) & 0x1F) as usize;
        let entry = self.entry_from_registers();

        trace!(target: "tlb", "TLBWI {index}: {entry:?}");
        self.machine.tlb.write(index, entry);
        self.advance();
    }

    /// Writes `PageMask`, `EntryHi` and `EntryLo0/1` to the entry selected by `Random`.
    pub fn tlbwr(&mut self, _: Instruction) {
        self.machine.update_count();
        let index = self.machine.cop0.random();
        self.machine.cop0.write(Reg::COP0_RANDOM, index);
        let entry = self.entry_from_registers();

        trace!(target: "tlb", "TLBWR {index}: {entry:?}");
        self.machine.tlb.write(index as usize, entry);
        self.advance();
    }

    /// Looks up the entry matching `EntryHi` and stores its index in `Index`.
    pub fn tlbp(&mut self, _: Instruction) {
        let cop0 = &mut self.machine.cop0;
        let entry_hi = cop0.read(Reg::COP0_ENTRY_HI);

        match self.machine.tlb.probe(entry_hi) {
            Some(index) => cop0.write(Reg::COP0_INDEX, index as u32),
            None => {
                let current = cop0.read(Reg::COP0_INDEX);
                cop0.write(Reg::COP0_INDEX, current | PROBE_FAILURE);
            }
        }

        self.advance();
    }

    /// Returns from an exception or error handler.
    pub fn eret(&mut self, _: Instruction) {
        self.advance();
        self.machine.update_count();

        let cop0 = &mut self.machine.cop0;
        let status = cop0.status();
        let target = if status.error_level() {
            cop0.set_status(status.with_error_level(false));
            cop0.read(Reg::COP0_ERROR_EPC)
        } else {
            cop0.set_status(status.with_exception_level(false));
            cop0.read(Reg::COP0_EPC)
        };

        let cpu = &mut self.machine.cpu;
        cpu.ll_bit = false;
        cpu.regs.pc = target;
        cpu.last_addr = target;

        self.machine.check_interrupt();
    }

    /// `rt = (signext)fs`
    pub fn mfc1(&mut self, instr: Instruction) {
        let value = self.machine.cop1.read_single(instr.fs_index());
        self.set_gpr(instr.rt(), sign_extend(value));
        self.advance();
    }

    /// `rt = (double)fs`
    pub fn dmfc1(&mut self, instr: Instruction) {
        let value = self.machine.cop1.read_double(instr.fs_index());
        self.set_gpr(instr.rt(), value);
        self.advance();
    }

    /// `rt = fcr[fs]`
    pub fn cfc1(&mut self, instr: Instruction) {
        let cop1 = &self.machine.cop1;
        let value = match instr.fs().value() {
            0 => cop1.fcr0,
            31 => cop1.fcr31.to_bits(),
            _ => 0,
        };

        self.set_gpr(instr.rt(), sign_extend(value));
        self.advance();
    }

    /// `fs = rt`
    pub fn mtc1(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as u32;
        self.machine.cop1.write_single(instr.fs_index(), rt);
        self.advance();
    }

    /// `(double)fs = rt`
    pub fn dmtc1(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.machine.cop1.write_double(instr.fs_index(), rt);
        self.advance();
    }

    /// `fcr[fs] = rt`. Only `FCR31` is writable.
    pub fn ctc1(&mut self, instr: Instruction) {
        if instr.fs().value() == 31 {
            let rt = self.gpr(instr.rt()) as u32;
            self.machine.cop1.fcr31 = Fcr31::from_bits(rt);
        }

        self.advance();
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cpu::test::{BASE, load, machine, step, test_machine},
        scheduler::Event,
    };
    use bitos::integer::u5;
    use rumble_core::{
        cpu::{
            Reg,
            cop0::Cause,
            cop1::RoundingMode,
            instr::{Cop1Opcode, Instruction, TlbOpcode},
        },
        sign_extend,
    };

    #[test]
    fn tlb_write_then_read() {
        let mut gp = [0; 32];
        gp[Reg::R9.index()] = 0x0040_0005;
        gp[Reg::R10.index()] = 0x401F;
        gp[Reg::R11.index()] = 0x405F;
        gp[Reg::R12.index()] = 7;
        test_machine! {
            machine(gp) =>
            mtc0(Reg::R9, Reg::COP0_ENTRY_HI)
            mtc0(Reg::R10, Reg::COP0_ENTRY_LO0)
            mtc0(Reg::R11, Reg::COP0_ENTRY_LO1)
            mtc0(Reg::R12, Reg::COP0_INDEX)
            tlb(TlbOpcode::TLBWI)
            mtc0(Reg::R0, Reg::COP0_ENTRY_HI)
            mtc0(Reg::R0, Reg::COP0_ENTRY_LO0)
            tlb(TlbOpcode::TLBR)
        };

        step(&mut machine, 8);
        assert!(machine.tlb.covers(0x0040_1800));
        assert_eq!(machine.cop0.read(Reg::COP0_ENTRY_HI), 0x0040_0005);
        assert_eq!(machine.cop0.read(Reg::COP0_ENTRY_LO0), 0x401F);
        assert_eq!(machine.cop0.read(Reg::COP0_ENTRY_LO1), 0x405F);
        assert_eq!(machine.cop0.read(Reg::COP0_PAGE_MASK), 0);
    }

    #[test]
    fn tlb_probe() {
        let mut gp = [0; 32];
        gp[Reg::R9.index()] = 0x0040_0005;
        gp[Reg::R10.index()] = 0x401F;
        gp[Reg::R12.index()] = 7;
        gp[Reg::R13.index()] = 0x0080_0005;
        test_machine! {
            machine(gp) =>
            mtc0(Reg::R9, Reg::COP0_ENTRY_HI)
            mtc0(Reg::R10, Reg::COP0_ENTRY_LO0)
            mtc0(Reg::R10, Reg::COP0_ENTRY_LO1)
            mtc0(Reg::R12, Reg::COP0_INDEX)
            tlb(TlbOpcode::TLBWI)
            mtc0(Reg::R0, Reg::COP0_INDEX)
            tlb(TlbOpcode::TLBP)
            mtc0(Reg::R13, Reg::COP0_ENTRY_HI)
            tlb(TlbOpcode::TLBP)
        };

        step(&mut machine, 7);
        assert_eq!(machine.cop0.read(Reg::COP0_INDEX), 7);

        step(&mut machine, 2);
        assert_eq!(machine.cop0.read(Reg::COP0_INDEX), 0x8000_0007);
    }

    #[test]
    fn compare_write_acknowledges_the_timer() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 0x0010_0000;
        test_machine! {
            machine(gp) =>
            mtc0(Reg::T0, Reg::COP0_COMPARE)
        };

        let cause = machine.cop0.cause().with_interrupt(Cause::TIMER_INTERRUPT);
        machine.cop0.set_cause(cause);

        step(&mut machine, 1);
        assert_eq!(machine.cop0.compare(), 0x0010_0000);
        assert_eq!(
            machine.cop0.cause().interrupt_pending() & Cause::TIMER_INTERRUPT,
            0
        );
        assert_eq!(machine.scheduler.time_of(Event::Compare), Some(0x0010_0000));
    }

    #[test]
    fn fpu_mode_switch_keeps_singles() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 0x3000_0000;
        test_machine! {
            machine(gp) =>
            mtc0(Reg::T0, Reg::COP0_STATUS)
        };

        assert!(machine.cop0.status().fpu_64bit_registers());
        machine.cop1.write_single(1, 0xDEAD_BEEF);
        machine.cop1.write_single(2, 0x1234_5678);

        step(&mut machine, 1);
        assert!(!machine.cop0.status().fpu_64bit_registers());
        assert_eq!(machine.cop1.read_single(1), 0xDEAD_BEEF);
        assert_eq!(machine.cop1.read_single(2), 0x1234_5678);
    }

    #[test]
    fn eret_returns_to_epc() {
        let mut machine = machine();
        load(&mut machine, BASE, &[Instruction::tlb(TlbOpcode::ERET)]);
        machine
            .cop0
            .set_status(machine.cop0.status().with_exception_level(true));
        machine.cop0.write(Reg::COP0_EPC, BASE + 0x100);
        machine.cpu.ll_bit = true;

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, BASE + 0x100);
        assert!(!machine.cop0.status().exception_level());
        assert!(!machine.cpu.ll_bit);
    }

    #[test]
    fn eret_prefers_the_error_level() {
        let mut machine = machine();
        load(&mut machine, BASE, &[Instruction::tlb(TlbOpcode::ERET)]);
        let status = machine
            .cop0
            .status()
            .with_exception_level(true)
            .with_error_level(true);
        machine.cop0.set_status(status);
        machine.cop0.write(Reg::COP0_EPC, BASE + 0x100);
        machine.cop0.write(Reg::COP0_ERROR_EPC, BASE + 0x200);

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, BASE + 0x200);
        assert!(!machine.cop0.status().error_level());
        assert!(machine.cop0.status().exception_level());
    }

    #[test]
    fn count_reads_are_current() {
        test_machine! {
            machine([0; 32]) =>
            addiu(Reg::T0, Reg::R0, 1)
            addiu(Reg::T0, Reg::R0, 2)
            addiu(Reg::T0, Reg::R0, 3)
            mfc0(Reg::R9, Reg::COP0_COUNT)
        };

        let before = machine.count();
        step(&mut machine, 4);
        let expected = before.wrapping_add(3 * machine.count_per_op);
        assert_eq!(machine.cpu.regs.read(Reg::R9), sign_extend(expected));
    }

    #[test]
    fn fpu_control_registers() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 0x0080_0003;
        let ctc1 = Instruction::mtc1(Reg::T0, u5::new(31)).with_cop1_op(Cop1Opcode::CTC1);
        let cfc1 = Instruction::mtc1(Reg::R9, u5::new(31)).with_cop1_op(Cop1Opcode::CFC1);
        let fcr0 = Instruction::mtc1(Reg::R10, u5::new(0)).with_cop1_op(Cop1Opcode::CFC1);

        let mut machine = machine();
        machine.cpu.regs.gp = gp;
        load(&mut machine, BASE, &[ctc1, cfc1, fcr0]);

        step(&mut machine, 3);
        assert!(machine.cop1.fcr31.condition());
        assert_eq!(machine.cop1.rounding_mode(), RoundingMode::Floor);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0x0080_0003);
        assert_eq!(
            machine.cpu.regs.read(Reg::R10),
            u64::from(machine.cop1.fcr0)
        );
    }

    #[test]
    fn fpu_moves_sign_extend() {
        test_machine! {
            machine([0; 32]) =>
            mfc1(Reg::R9, u5::new(4))
        };

        machine.cop1.write_single(4, 0x8000_0001);
        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0xFFFF_FFFF_8000_0001);
    }
}
