use super::Interpreter;
use rumble_core::{
    cpu::{cop0::Exception, instr::Instruction},
    sign_extend,
};

/// Sign extends the low word of `value`.
#[inline(always)]
fn sext(value: u64) -> u64 {
    sign_extend(value as u32)
}

impl Interpreter<'_> {
    /// `rt = imm16 << 16`
    pub fn lui(&mut self, instr: Instruction) {
        let result = sign_extend(u32::from(instr.imm16()) << 16);
        self.set_gpr(instr.rt(), result);
        self.advance();
    }

    /// `rt = rs | imm16`
    pub fn ori(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        self.set_gpr(instr.rt(), rs | u64::from(instr.imm16()));
        self.advance();
    }

    /// `rt = rs & imm16`
    pub fn andi(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        self.set_gpr(instr.rt(), rs & u64::from(instr.imm16()));
        self.advance();
    }

    /// `rt = rs ^ imm16`
    pub fn xori(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        self.set_gpr(instr.rt(), rs ^ u64::from(instr.imm16()));
        self.advance();
    }

    /// `rt = rs + signed_imm16`, trapping on signed overflow
    pub fn addi(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i32;
        let Some(result) = rs.checked_add(i32::from(instr.signed_imm16())) else {
            self.machine.exception(Exception::ArithmeticOverflow);
            return;
        };

        self.set_gpr(instr.rt(), i64::from(result) as u64);
        self.advance();
    }

    /// `rt = rs + signed_imm16`
    pub fn addiu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as u32;
        let result = rs.wrapping_add_signed(i32::from(instr.signed_imm16()));
        self.set_gpr(instr.rt(), sign_extend(result));
        self.advance();
    }

    /// `rt = rs + signed_imm16`, 64 bits wide and trapping on signed overflow
    pub fn daddi(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let Some(result) = rs.checked_add(i64::from(instr.signed_imm16())) else {
            self.machine.exception(Exception::ArithmeticOverflow);
            return;
        };

        self.set_gpr(instr.rt(), result as u64);
        self.advance();
    }

    /// `rt = rs + signed_imm16`, 64 bits wide
    pub fn daddiu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let result = rs.wrapping_add_signed(i64::from(instr.signed_imm16()));
        self.set_gpr(instr.rt(), result);
        self.advance();
    }

    /// `if rs < signed_imm16 { rt = 1 } else { rt = 0 }`
    pub fn slti(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let result = rs < i64::from(instr.signed_imm16());
        self.set_gpr(instr.rt(), u64::from(result));
        self.advance();
    }

    /// `if rs < (unsigned)signed_imm16 { rt = 1 } else { rt = 0 }`
    pub fn sltiu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let imm = i64::from(instr.signed_imm16()) as u64;
        self.set_gpr(instr.rt(), u64::from(rs < imm));
        self.advance();
    }

    /// `rd = rs + rt`, trapping on signed overflow
    pub fn add(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i32;
        let rt = self.gpr(instr.rt()) as i32;
        let Some(result) = rs.checked_add(rt) else {
            self.machine.exception(Exception::ArithmeticOverflow);
            return;
        };

        self.set_gpr(instr.rd(), i64::from(result) as u64);
        self.advance();
    }

    /// `rd = rs + rt`
    pub fn addu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), sext(rs.wrapping_add(rt)));
        self.advance();
    }

    /// `rd = rs - rt`, trapping on signed overflow
    pub fn sub(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i32;
        let rt = self.gpr(instr.rt()) as i32;
        let Some(result) = rs.checked_sub(rt) else {
            self.machine.exception(Exception::ArithmeticOverflow);
            return;
        };

        self.set_gpr(instr.rd(), i64::from(result) as u64);
        self.advance();
    }

    /// `rd = rs - rt`
    pub fn subu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), sext(rs.wrapping_sub(rt)));
        self.advance();
    }

    /// `rd = rs + rt`, 64 bits wide and trapping on signed overflow
    pub fn dadd(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let rt = self.gpr(instr.rt()) as i64;
        let Some(result) = rs.checked_add(rt) else {
            self.machine.exception(Exception::ArithmeticOverflow);
            return;
        };

        self.set_gpr(instr.rd(), result as u64);
        self.advance();
    }

    /// `rd = rs + rt`, 64 bits wide
    pub fn daddu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rs.wrapping_add(rt));
        self.advance();
    }

    /// `rd = rs - rt`, 64 bits wide and trapping on signed overflow
    pub fn dsub(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let rt = self.gpr(instr.rt()) as i64;
        let Some(result) = rs.checked_sub(rt) else {
            self.machine.exception(Exception::ArithmeticOverflow);
            return;
        };

        self.set_gpr(instr.rd(), result as u64);
        self.advance();
    }

    /// `rd = rs - rt`, 64 bits wide
    pub fn dsubu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rs.wrapping_sub(rt));
        self.advance();
    }

    /// `rd = rs & rt`
    pub fn and(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rs & rt);
        self.advance();
    }

    /// `rd = rs | rt`
    pub fn or(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rs | rt);
        self.advance();
    }

    /// `rd = rs ^ rt`
    pub fn xor(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rs ^ rt);
        self.advance();
    }

    /// `rd = !(rs | rt)`
    pub fn nor(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), !(rs | rt));
        self.advance();
    }

    /// `if rs < rt { rd = 1 } else { rd = 0 }`
    pub fn slt(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let rt = self.gpr(instr.rt()) as i64;
        self.set_gpr(instr.rd(), u64::from(rs < rt));
        self.advance();
    }

    /// `if rs < rt { rd = 1 } else { rd = 0 }`, unsigned
    pub fn sltu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), u64::from(rs < rt));
        self.advance();
    }

    /// `rd = rt << sa`
    pub fn sll(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as u32;
        let result = rt << instr.sa().value();
        self.set_gpr(instr.rd(), sign_extend(result));
        self.advance();
    }

    /// `rd = rt >> sa`
    pub fn srl(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as u32;
        let result = rt >> instr.sa().value();
        self.set_gpr(instr.rd(), sign_extend(result));
        self.advance();
    }

    /// `rd = rt >> sa`, arithmetic
    pub fn sra(&mut self, instr: Instruction) {
        // the shift sees the whole register, so bits above the low word can shift in
        let rt = self.gpr(instr.rt()) as i64;
        let result = (rt >> instr.sa().value()) as u64;
        self.set_gpr(instr.rd(), sext(result));
        self.advance();
    }

    /// `rd = rt << (rs & 0x1F)`
    pub fn sllv(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as u32;
        let rs = self.gpr(instr.rs()) as u32 & 0x1F;
        self.set_gpr(instr.rd(), sign_extend(rt << rs));
        self.advance();
    }

    /// `rd = rt >> (rs & 0x1F)`
    pub fn srlv(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as u32;
        let rs = self.gpr(instr.rs()) as u32 & 0x1F;
        self.set_gpr(instr.rd(), sign_extend(rt >> rs));
        self.advance();
    }

    /// `rd = rt >> (rs & 0x1F)`, arithmetic
    pub fn srav(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as i64;
        let rs = self.gpr(instr.rs()) as u32 & 0x1F;
        self.set_gpr(instr.rd(), sext((rt >> rs) as u64));
        self.advance();
    }

    /// `rd = rt << sa`, 64 bits wide
    pub fn dsll(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rt << instr.sa().value());
        self.advance();
    }

    /// `rd = rt >> sa`, 64 bits wide
    pub fn dsrl(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rt >> instr.sa().value());
        self.advance();
    }

    /// `rd = rt >> sa`, 64 bits wide and arithmetic
    pub fn dsra(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as i64;
        self.set_gpr(instr.rd(), (rt >> instr.sa().value()) as u64);
        self.advance();
    }

    /// `rd = rt << (sa + 32)`
    pub fn dsll32(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rt << (instr.sa().value() + 32));
        self.advance();
    }

    /// `rd = rt >> (sa + 32)`
    pub fn dsrl32(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rd(), rt >> (instr.sa().value() + 32));
        self.advance();
    }

    /// `rd = rt >> (sa + 32)`, arithmetic
    pub fn dsra32(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as i64;
        self.set_gpr(instr.rd(), (rt >> (instr.sa().value() + 32)) as u64);
        self.advance();
    }

    /// `rd = rt << (rs & 0x3F)`
    pub fn dsllv(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        let rs = self.gpr(instr.rs()) as u32 & 0x3F;
        self.set_gpr(instr.rd(), rt << rs);
        self.advance();
    }

    /// `rd = rt >> (rs & 0x3F)`
    pub fn dsrlv(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        let rs = self.gpr(instr.rs()) as u32 & 0x3F;
        self.set_gpr(instr.rd(), rt >> rs);
        self.advance();
    }

    /// `rd = rt >> (rs & 0x3F)`, arithmetic
    pub fn dsrav(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt()) as i64;
        let rs = self.gpr(instr.rs()) as u32 & 0x3F;
        self.set_gpr(instr.rd(), (rt >> rs) as u64);
        self.advance();
    }

    /// `rd = hi`
    pub fn mfhi(&mut self, instr: Instruction) {
        let hi = self.machine.cpu.regs.hi;
        self.set_gpr(instr.rd(), hi);
        self.advance();
    }

    /// `rd = lo`
    pub fn mflo(&mut self, instr: Instruction) {
        let lo = self.machine.cpu.regs.lo;
        self.set_gpr(instr.rd(), lo);
        self.advance();
    }

    /// `hi = rs`
    pub fn mthi(&mut self, instr: Instruction) {
        self.machine.cpu.regs.hi = self.gpr(instr.rs());
        self.advance();
    }

    /// `lo = rs`
    pub fn mtlo(&mut self, instr: Instruction) {
        self.machine.cpu.regs.lo = self.gpr(instr.rs());
        self.advance();
    }

    fn set_hi_lo_words(&mut self, result: u64) {
        let regs = &mut self.machine.cpu.regs;
        regs.lo = sign_extend(result as u32);
        regs.hi = sign_extend((result >> 32) as u32);
    }

    /// `hi:lo = rs * rt`
    pub fn mult(&mut self, instr: Instruction) {
        let rs = i64::from(self.gpr(instr.rs()) as i32);
        let rt = i64::from(self.gpr(instr.rt()) as i32);
        self.set_hi_lo_words((rs * rt) as u64);
        self.advance();
    }

    /// `hi:lo = rs * rt`, unsigned
    pub fn multu(&mut self, instr: Instruction) {
        let rs = u64::from(self.gpr(instr.rs()) as u32);
        let rt = u64::from(self.gpr(instr.rt()) as u32);
        self.set_hi_lo_words(rs * rt);
        self.advance();
    }

    /// `hi:lo = rs * rt`, 64 bits wide
    pub fn dmult(&mut self, instr: Instruction) {
        let rs = i128::from(self.gpr(instr.rs()) as i64);
        let rt = i128::from(self.gpr(instr.rt()) as i64);
        let result = (rs * rt) as u128;

        let regs = &mut self.machine.cpu.regs;
        regs.lo = result as u64;
        regs.hi = (result >> 64) as u64;
        self.advance();
    }

    /// `hi:lo = rs * rt`, 64 bits wide and unsigned
    pub fn dmultu(&mut self, instr: Instruction) {
        let rs = u128::from(self.gpr(instr.rs()));
        let rt = u128::from(self.gpr(instr.rt()));
        let result = rs * rt;

        let regs = &mut self.machine.cpu.regs;
        regs.lo = result as u64;
        regs.hi = (result >> 64) as u64;
        self.advance();
    }

    /// `lo = rs / rt; hi = rs % rt`
    ///
    /// Division by zero doesn't trap: `lo` is -1 for a non-negative dividend and 1 otherwise,
    /// while `hi` takes the dividend.
    pub fn div(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i32;
        let rt = self.gpr(instr.rt()) as i32;

        let (quotient, remainder) = if rt == 0 {
            (if rs < 0 { 1 } else { -1 }, rs)
        } else {
            (rs.wrapping_div(rt), rs.wrapping_rem(rt))
        };

        let regs = &mut self.machine.cpu.regs;
        regs.lo = i64::from(quotient) as u64;
        regs.hi = i64::from(remainder) as u64;
        self.advance();
    }

    /// `lo = rs / rt; hi = rs % rt`, unsigned
    pub fn divu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as u32;
        let rt = self.gpr(instr.rt()) as u32;

        let (quotient, remainder) = if rt == 0 {
            (u32::MAX, rs)
        } else {
            (rs / rt, rs % rt)
        };

        let regs = &mut self.machine.cpu.regs;
        regs.lo = sign_extend(quotient);
        regs.hi = sign_extend(remainder);
        self.advance();
    }

    /// `lo = rs / rt; hi = rs % rt`, 64 bits wide
    pub fn ddiv(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let rt = self.gpr(instr.rt()) as i64;

        let (quotient, remainder) = if rt == 0 {
            (if rs < 0 { 1 } else { -1 }, rs)
        } else {
            (rs.wrapping_div(rt), rs.wrapping_rem(rt))
        };

        let regs = &mut self.machine.cpu.regs;
        regs.lo = quotient as u64;
        regs.hi = remainder as u64;
        self.advance();
    }

    /// `lo = rs / rt; hi = rs % rt`, 64 bits wide and unsigned
    pub fn ddivu(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs());
        let rt = self.gpr(instr.rt());

        let (quotient, remainder) = if rt == 0 {
            (u64::MAX, rs)
        } else {
            (rs / rt, rs % rt)
        };

        let regs = &mut self.machine.cpu.regs;
        regs.lo = quotient;
        regs.hi = remainder;
        self.advance();
    }
}

#[cfg(test)]
mod tests {
    use crate::cpu::test::{any_reg, any_writable_reg, gprs, step, test_machine};
    use bitos::integer::u5;
    use proptest::prelude::*;
    use rumble_core::{
        cpu::{
            Reg,
            cop0::{Exception, GENERAL_VECTOR},
            instr::SpecialOpcode,
        },
        sign_extend,
    };

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn lui(gp in gprs(), rt in any_writable_reg(), imm in any::<u16>()) {
            test_machine! {
                machine(gp) =>
                lui(rt, imm)
            };

            step(&mut machine, 1);
            prop_assert_eq!(machine.cpu.regs.read(rt), sign_extend(u32::from(imm) << 16));
        }

        #[test]
        fn ori(gp in gprs(), rt in any_writable_reg(), rs in any_reg(), imm in any::<u16>()) {
            test_machine! {
                machine(gp) =>
                ori(rt, rs, imm)
            };

            let rs = machine.cpu.regs.read(rs);
            step(&mut machine, 1);
            prop_assert_eq!(machine.cpu.regs.read(rt), rs | u64::from(imm));
        }

        #[test]
        fn addiu(gp in gprs(), rt in any_writable_reg(), rs in any_reg(), imm in any::<i16>()) {
            test_machine! {
                machine(gp) =>
                addiu(rt, rs, imm)
            };

            let rs = machine.cpu.regs.read(rs) as u32;
            step(&mut machine, 1);
            prop_assert_eq!(
                machine.cpu.regs.read(rt),
                sign_extend(rs.wrapping_add_signed(i32::from(imm)))
            );
        }

        #[test]
        fn sll(gp in gprs(), rd in any_writable_reg(), rt in any_reg(), sa in 0u8..32) {
            test_machine! {
                machine(gp) =>
                sll(rd, rt, u5::new(sa))
            };

            let rt = machine.cpu.regs.read(rt) as u32;
            step(&mut machine, 1);
            prop_assert_eq!(machine.cpu.regs.read(rd), sign_extend(rt << sa));
        }

        #[test]
        fn addu(gp in gprs(), rd in any_writable_reg(), rs in any_reg(), rt in any_reg()) {
            test_machine! {
                machine(gp) =>
                addu(rd, rs, rt)
            };

            let rs = machine.cpu.regs.read(rs);
            let rt = machine.cpu.regs.read(rt);
            step(&mut machine, 1);
            prop_assert_eq!(machine.cpu.regs.read(rd), sign_extend(rs.wrapping_add(rt) as u32));
        }

        #[test]
        fn dmultu(gp in gprs(), rs in any_reg(), rt in any_reg()) {
            test_machine! {
                machine(gp) =>
                special(SpecialOpcode::DMULTU, Reg::R0, rs, rt)
            };

            let rs = u128::from(machine.cpu.regs.read(rs));
            let rt = u128::from(machine.cpu.regs.read(rt));
            let product = rs * rt;
            step(&mut machine, 1);
            prop_assert_eq!(machine.cpu.regs.lo, product as u64);
            prop_assert_eq!(machine.cpu.regs.hi, (product >> 64) as u64);
        }
    }

    #[test]
    fn add_overflow_traps() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 0x7FFF_FFFF;
        gp[Reg::R9.index()] = 1;
        test_machine! {
            machine(gp) =>
            special(SpecialOpcode::ADD, Reg::R10, Reg::T0, Reg::R9)
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R10), 0);
        assert_eq!(machine.cpu.regs.pc, GENERAL_VECTOR);
        assert_eq!(
            machine.cop0.cause().exception_code(),
            Exception::ArithmeticOverflow.code()
        );
    }

    #[test]
    fn division_by_zero_does_not_trap() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 7;
        gp[Reg::R9.index()] = sign_extend(-7i32 as u32);
        test_machine! {
            machine(gp) =>
            special(SpecialOpcode::DIV, Reg::R0, Reg::T0, Reg::R0)
            special(SpecialOpcode::MFLO, Reg::R10, Reg::R0, Reg::R0)
            special(SpecialOpcode::MFHI, Reg::R11, Reg::R0, Reg::R0)
            special(SpecialOpcode::DIV, Reg::R0, Reg::R9, Reg::R0)
            special(SpecialOpcode::DIVU, Reg::R0, Reg::T0, Reg::R0)
        };

        step(&mut machine, 3);
        assert_eq!(machine.cpu.regs.read(Reg::R10), u64::MAX);
        assert_eq!(machine.cpu.regs.read(Reg::R11), 7);

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.lo, 1);
        assert_eq!(machine.cpu.regs.hi, sign_extend(-7i32 as u32));

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.lo, u64::MAX);
        assert_eq!(machine.cpu.regs.hi, 7);
    }

    #[test]
    fn mult_splits_the_product() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = sign_extend(-2i32 as u32);
        gp[Reg::R9.index()] = 0x4000_0000;
        test_machine! {
            machine(gp) =>
            special(SpecialOpcode::MULT, Reg::R0, Reg::T0, Reg::R9)
        };

        step(&mut machine, 1);
        // -0x8000_0000
        assert_eq!(machine.cpu.regs.lo, 0xFFFF_FFFF_8000_0000);
        assert_eq!(machine.cpu.regs.hi, u64::MAX);
    }

    #[test]
    fn doubleword_shifts() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 0x8000_0000_0000_0001;
        test_machine! {
            machine(gp) =>
            special(SpecialOpcode::DSRA32, Reg::R9, Reg::R0, Reg::T0)
            special(SpecialOpcode::DSLL32, Reg::R10, Reg::R0, Reg::T0)
        };

        step(&mut machine, 2);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0xFFFF_FFFF_8000_0000);
        assert_eq!(machine.cpu.regs.read(Reg::R10), 0x0000_0001_0000_0000);
    }
}
