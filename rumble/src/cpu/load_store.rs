use super::Interpreter;
use rumble_core::{
    cpu::{Reg, instr::Instruction, tlb::Access},
    mem::{Address, PhysicalAddress, Primitive},
    sign_extend,
};

impl Interpreter<'_> {
    /// `rs + signed_imm16`
    #[inline(always)]
    fn effective_address(&self, instr: Instruction) -> u32 {
        let rs = self.gpr(instr.rs()) as u32;
        rs.wrapping_add_signed(i32::from(instr.signed_imm16()))
    }

    /// Resolves the physical address of a data access of `size` bytes at `addr`, moving the PC
    /// past the instruction. Returns `None` if the access raised an exception.
    fn data_address(&mut self, addr: u32, size: u32, access: Access) -> Option<PhysicalAddress> {
        if !Address(addr).is_aligned(size) {
            self.machine.address_error(addr, access == Access::Write);
            return None;
        }

        self.advance();
        let phys = self.machine.translate(Address(addr), access);
        if phys.is_none() {
            self.machine.tlb_refill(addr, access);
        }

        phys
    }

    fn load<P: Primitive>(&mut self, instr: Instruction) -> Option<P> {
        let addr = self.effective_address(instr);
        let phys = self.data_address(addr, P::SIZE, Access::Read)?;
        Some(self.machine.read_physical::<P>(phys))
    }

    fn store<P: Primitive>(&mut self, instr: Instruction, value: P) {
        let addr = self.effective_address(instr);
        if let Some(phys) = self.data_address(addr, P::SIZE, Access::Write) {
            self.machine.write_physical(phys, value);
        }
    }

    /// Writes the bits of `value` selected by `mask` to the word containing `phys`.
    fn store_word_masked(&mut self, phys: PhysicalAddress, value: u32, mask: u32) {
        let (value, mask) = if phys.value() & 4 == 0 {
            (u64::from(value) << 32, u64::from(mask) << 32)
        } else {
            (u64::from(value), u64::from(mask))
        };

        self.machine.write_masked_u64(phys, value, mask);
    }

    /// `rt = (signext)(byte)[rs + signed_imm16]`
    pub fn lb(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u8>(instr) {
            self.set_gpr(instr.rt(), i64::from(value as i8) as u64);
        }
    }

    /// `rt = (byte)[rs + signed_imm16]`
    pub fn lbu(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u8>(instr) {
            self.set_gpr(instr.rt(), u64::from(value));
        }
    }

    /// `rt = (signext)(half)[rs + signed_imm16]`
    pub fn lh(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u16>(instr) {
            self.set_gpr(instr.rt(), i64::from(value as i16) as u64);
        }
    }

    /// `rt = (half)[rs + signed_imm16]`
    pub fn lhu(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u16>(instr) {
            self.set_gpr(instr.rt(), u64::from(value));
        }
    }

    /// `rt = (signext)[rs + signed_imm16]`
    pub fn lw(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u32>(instr) {
            self.set_gpr(instr.rt(), sign_extend(value));
        }
    }

    /// `rt = [rs + signed_imm16]`
    pub fn lwu(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u32>(instr) {
            self.set_gpr(instr.rt(), u64::from(value));
        }
    }

    /// `rt = (double)[rs + signed_imm16]`
    pub fn ld(&mut self, instr: Instruction) {
        if let Some(value) = self.load::<u64>(instr) {
            self.set_gpr(instr.rt(), value);
        }
    }

    /// Loads the bytes from `rs + signed_imm16` up to the end of the word into the high bytes of
    /// `rt`.
    pub fn lwl(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Read) else {
            return;
        };

        let word: u32 = self
            .machine
            .read_physical(PhysicalAddress::masked(phys.value() & !3));
        let shift = (addr & 3) * 8;
        let keep = (1u32 << shift).wrapping_sub(1);

        let rt = self.gpr(instr.rt()) as u32;
        let result = (rt & keep) | (word << shift);
        self.set_gpr(instr.rt(), sign_extend(result));
    }

    /// Loads the bytes from the start of the word up to `rs + signed_imm16` into the low bytes
    /// of `rt`.
    pub fn lwr(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Read) else {
            return;
        };

        let word: u32 = self
            .machine
            .read_physical(PhysicalAddress::masked(phys.value() & !3));
        let shift = (3 - (addr & 3)) * 8;

        let rt = self.gpr(instr.rt());
        let result = if shift == 0 {
            sign_extend(word)
        } else {
            let low = (rt as u32 & !(u32::MAX >> shift)) | (word >> shift);
            (rt & 0xFFFF_FFFF_0000_0000) | u64::from(low)
        };

        self.set_gpr(instr.rt(), result);
    }

    /// Loads the bytes from `rs + signed_imm16` up to the end of the double-word into the high
    /// bytes of `rt`.
    pub fn ldl(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Read) else {
            return;
        };

        let dword: u64 = self
            .machine
            .read_physical(PhysicalAddress::masked(phys.value() & !7));
        let shift = (addr & 7) * 8;
        let keep = (1u64 << shift).wrapping_sub(1);

        let rt = self.gpr(instr.rt());
        self.set_gpr(instr.rt(), (rt & keep) | (dword << shift));
    }

    /// Loads the bytes from the start of the double-word up to `rs + signed_imm16` into the low
    /// bytes of `rt`.
    pub fn ldr(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Read) else {
            return;
        };

        let dword: u64 = self
            .machine
            .read_physical(PhysicalAddress::masked(phys.value() & !7));
        let shift = (7 - (addr & 7)) * 8;

        let rt = self.gpr(instr.rt());
        let keep = !(u64::MAX >> shift);
        self.set_gpr(instr.rt(), (rt & keep) | (dword >> shift));
    }

    /// `(byte)[rs + signed_imm16] = rt`
    pub fn sb(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.store(instr, rt as u8);
    }

    /// `(half)[rs + signed_imm16] = rt`
    pub fn sh(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.store(instr, rt as u16);
    }

    /// `[rs + signed_imm16] = rt`
    pub fn sw(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.store(instr, rt as u32);
    }

    /// `(double)[rs + signed_imm16] = rt`
    pub fn sd(&mut self, instr: Instruction) {
        let rt = self.gpr(instr.rt());
        self.store(instr, rt);
    }

    /// Stores the high bytes of `rt` from `rs + signed_imm16` up to the end of the word.
    pub fn swl(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Write) else {
            return;
        };

        let shift = (addr & 3) * 8;
        let rt = self.gpr(instr.rt()) as u32;
        self.store_word_masked(phys, rt >> shift, u32::MAX >> shift);
    }

    /// Stores the low bytes of `rt` from the start of the word up to `rs + signed_imm16`.
    pub fn swr(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Write) else {
            return;
        };

        let shift = (3 - (addr & 3)) * 8;
        let rt = self.gpr(instr.rt()) as u32;
        self.store_word_masked(phys, rt << shift, u32::MAX << shift);
    }

    /// Stores the high bytes of `rt` from `rs + signed_imm16` up to the end of the double-word.
    pub fn sdl(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Write) else {
            return;
        };

        let shift = (addr & 7) * 8;
        let rt = self.gpr(instr.rt());
        self.machine
            .write_masked_u64(phys, rt >> shift, u64::MAX >> shift);
    }

    /// Stores the low bytes of `rt` from the start of the double-word up to
    /// `rs + signed_imm16`.
    pub fn sdr(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 1, Access::Write) else {
            return;
        };

        let shift = (7 - (addr & 7)) * 8;
        let rt = self.gpr(instr.rt());
        self.machine
            .write_masked_u64(phys, rt << shift, u64::MAX << shift);
    }

    /// `rt = (signext)[rs + signed_imm16]`, arming the load-linked bit.
    pub fn ll(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 4, Access::Read) else {
            return;
        };

        let value: u32 = self.machine.read_physical(phys);
        self.set_gpr(instr.rt(), sign_extend(value));

        self.machine.cpu.ll_bit = true;
        self.machine
            .cop0
            .write(Reg::COP0_LL_ADDR, phys.value() >> 4);
    }

    /// `if ll_bit { [rs + signed_imm16] = rt; rt = 1 } else { rt = 0 }`
    pub fn sc(&mut self, instr: Instruction) {
        let addr = self.effective_address(instr);
        let Some(phys) = self.data_address(addr, 4, Access::Write) else {
            return;
        };

        let linked = self.machine.cpu.ll_bit;
        if linked {
            let rt = self.gpr(instr.rt());
            self.machine.write_physical(phys, rt as u32);
        }

        self.set_gpr(instr.rt(), u64::from(linked));
        self.machine.cpu.ll_bit = false;
    }

    /// `ft = [rs + signed_imm16]`
    pub fn lwc1(&mut self, instr: Instruction) {
        if !self.require_cop1() {
            return;
        }

        if let Some(value) = self.load::<u32>(instr) {
            self.machine.cop1.write_single(instr.ft_index(), value);
        }
    }

    /// `ft = (double)[rs + signed_imm16]`
    pub fn ldc1(&mut self, instr: Instruction) {
        if !self.require_cop1() {
            return;
        }

        if let Some(value) = self.load::<u64>(instr) {
            self.machine.cop1.write_double(instr.ft_index(), value);
        }
    }

    /// `[rs + signed_imm16] = ft`
    pub fn swc1(&mut self, instr: Instruction) {
        if !self.require_cop1() {
            return;
        }

        let value = self.machine.cop1.read_single(instr.ft_index());
        self.store(instr, value);
    }

    /// `(double)[rs + signed_imm16] = ft`
    pub fn sdc1(&mut self, instr: Instruction) {
        if !self.require_cop1() {
            return;
        }

        let value = self.machine.cop1.read_double(instr.ft_index());
        self.store(instr, value);
    }
}

#[cfg(test)]
mod tests {
    use crate::cpu::test::{BASE, step, test_machine};
    use rumble_core::{
        cpu::{
            Reg,
            cop0::{Exception, GENERAL_VECTOR, REFILL_VECTOR},
            instr::Opcode,
        },
        sign_extend,
    };

    /// Registers with `T0` pointing at RDRAM 0x2000 through KSEG0.
    fn regs() -> [u64; 32] {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = sign_extend(0x8000_2000);
        gp
    }

    #[test]
    fn lwl_lwr_assemble_an_unaligned_word() {
        test_machine! {
            machine(regs()) =>
            immediate(Opcode::LWL, Reg::R9, Reg::T0, 1)
            immediate(Opcode::LWR, Reg::R9, Reg::T0, 4)
        };

        machine.memory.rdram[0x2000..0x2008]
            .copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);

        step(&mut machine, 2);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0x1122_3344);
    }

    #[test]
    fn swl_swr_store_an_unaligned_word() {
        let mut gp = regs();
        gp[Reg::R9.index()] = 0xAABB_CCDD;
        test_machine! {
            machine(gp) =>
            immediate(Opcode::SWL, Reg::R9, Reg::T0, 1)
            immediate(Opcode::SWR, Reg::R9, Reg::T0, 4)
        };

        step(&mut machine, 2);
        assert_eq!(
            &machine.memory.rdram[0x2000..0x2008],
            &[0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn ldl_ldr_assemble_an_unaligned_doubleword() {
        test_machine! {
            machine(regs()) =>
            immediate(Opcode::LDL, Reg::R9, Reg::T0, 3)
            immediate(Opcode::LDR, Reg::R9, Reg::T0, 10)
        };

        let bytes: Vec<u8> = (0..16).collect();
        machine.memory.rdram[0x2000..0x2010].copy_from_slice(&bytes);

        step(&mut machine, 2);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0x0304_0506_0708_090A);
    }

    #[test]
    fn byte_loads_extend() {
        test_machine! {
            machine(regs()) =>
            immediate(Opcode::LB, Reg::R9, Reg::T0, 0)
            immediate(Opcode::LBU, Reg::R10, Reg::T0, 0)
            immediate(Opcode::LH, Reg::R11, Reg::T0, 0)
        };

        machine.memory.rdram[0x2000] = 0x80;
        machine.memory.rdram[0x2001] = 0x01;

        step(&mut machine, 3);
        assert_eq!(machine.cpu.regs.read(Reg::R9), 0xFFFF_FFFF_FFFF_FF80);
        assert_eq!(machine.cpu.regs.read(Reg::R10), 0x80);
        assert_eq!(machine.cpu.regs.read(Reg::R11), 0xFFFF_FFFF_FFFF_8001);
    }

    #[test]
    fn store_conditional_needs_the_link() {
        let mut gp = regs();
        gp[Reg::R10.index()] = 5;
        gp[Reg::R11.index()] = 9;
        test_machine! {
            machine(gp) =>
            immediate(Opcode::LL, Reg::R9, Reg::T0, 0)
            immediate(Opcode::SC, Reg::R10, Reg::T0, 0)
            immediate(Opcode::SC, Reg::R11, Reg::T0, 0)
        };

        step(&mut machine, 2);
        assert_eq!(machine.cpu.regs.read(Reg::R10), 1);
        assert_eq!(machine.memory.rdram_word(0x2000), 5);
        assert_eq!(machine.cop0.read(Reg::COP0_LL_ADDR), 0x200);

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.read(Reg::R11), 0);
        assert_eq!(machine.memory.rdram_word(0x2000), 5);
    }

    #[test]
    fn load_miss_refills_at_the_load() {
        let mut gp = [0; 32];
        gp[Reg::T0.index()] = 0x4000;
        test_machine! {
            machine(gp) =>
            lw(Reg::R9, Reg::T0, 0)
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, REFILL_VECTOR);
        assert_eq!(machine.cop0.read(Reg::COP0_EPC), BASE);
        assert_eq!(machine.cop0.read(Reg::COP0_BAD_VADDR), 0x4000);
        assert_eq!(
            machine.cop0.cause().exception_code(),
            Exception::TlbLoad.code()
        );
    }

    #[test]
    fn unaligned_store_is_an_address_error() {
        test_machine! {
            machine(regs()) =>
            sw(Reg::R9, Reg::T0, 2)
        };

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, GENERAL_VECTOR);
        assert_eq!(machine.cop0.read(Reg::COP0_EPC), BASE);
        assert_eq!(
            machine.cop0.cause().exception_code(),
            Exception::AddressErrorStore.code()
        );
    }

    #[test]
    fn fpu_loads_need_cop1() {
        test_machine! {
            machine(regs()) =>
            immediate(Opcode::LWC1, Reg::R1, Reg::T0, 0)
        };

        machine
            .cop0
            .set_status(machine.cop0.status().with_cop1_usable(false));

        step(&mut machine, 1);
        assert_eq!(machine.cpu.regs.pc, GENERAL_VECTOR);
        assert_eq!(
            machine.cop0.cause().exception_code(),
            Exception::CopUnusable.code()
        );
        assert_eq!(machine.cop0.cause().coprocessor().value(), 1);
    }

    #[test]
    fn fpu_loads_and_stores() {
        test_machine! {
            machine(regs()) =>
            immediate(Opcode::LDC1, Reg::R2, Reg::T0, 0)
            immediate(Opcode::SDC1, Reg::R2, Reg::T0, 8)
        };

        machine.memory.set_rdram_word(0x2000, 0x4000_0000);
        machine.memory.set_rdram_word(0x2004, 0x0000_0001);

        step(&mut machine, 2);
        assert_eq!(machine.cop1.read_double(2), 0x4000_0000_0000_0001);
        assert_eq!(machine.memory.rdram_word(0x2008), 0x4000_0000);
        assert_eq!(machine.memory.rdram_word(0x200C), 0x0000_0001);
    }
}
