//! Implementation of the VR4300 CPU.

mod arith_logic;
mod coproc;
mod exception;
mod fpu;
mod jump_branch;
mod load_store;


use crate::Machine;
use rumble_core::{
    cpu::{
        Reg,
        cop0::Exception,
        instr::{
            Cop0Opcode, Cop1Opcode, Instruction, Opcode, RegImmOpcode, SpecialOpcode, TlbOpcode,
        },
        tlb::Access,
    },
    mem::{Address, ROM_START, Region},
};
use tracing::error;

pub use rumble_core::cpu::Cpu;

/// An interpreter of the VR4300 CPU.
pub struct Interpreter<'a> {
    machine: &'a mut Machine,
}

impl<'a> Interpreter<'a> {
    pub fn new(machine: &'a mut Machine) -> Self {
        Self { machine }
    }

    /// Runs until a stop is requested.
    pub fn run(&mut self) {
        while !self.machine.stopped() {
            self.step();
        }
    }

    /// Executes the instruction at the PC, then services the scheduler if it's due.
    pub fn step(&mut self) {
        if let Some(instr) = self.fetch() {
            self.exec(instr);
        }

        self.machine.update_count();
        let count = self.machine.count();
        if self.machine.scheduler.due(count) {
            self.machine.fire();
        }
    }

    /// Fetches the instruction at the PC. Returns `None` if the fetch raised an exception or
    /// stopped the machine.
    fn fetch(&mut self) -> Option<Instruction> {
        let pc = self.machine.cpu.regs.pc;
        let addr = Address(pc);

        if !addr.is_aligned(4) {
            self.machine.address_error(pc, false);
            return None;
        }

        let Some(phys) = self.machine.translate(addr, Access::Fetch) else {
            self.machine.tlb_refill(pc, Access::Fetch);
            return None;
        };

        let region = self.machine.regions.region(phys);
        if !region.is_executable() {
            error!(target: "cpu", "fetch from {addr} ({phys}), which is not executable");
            self.machine.stop();
            return None;
        }

        Some(Instruction::from_bits(self.machine.fetch_word(region, phys)))
    }

    /// Reads the instruction at `addr` without side effects, if it lives in executable memory.
    fn peek(&self, addr: u32) -> Option<Instruction> {
        let phys = self.machine.translate(Address(addr), Access::Fetch)?;
        match self.machine.regions.region(phys) {
            Region::Rdram => Some(Instruction::from_bits(
                self.machine.memory.rdram_word(phys.value()),
            )),
            Region::Rom => Some(Instruction::from_bits(
                self.machine.rom.word(phys.value() - ROM_START),
            )),
            _ => None,
        }
    }

    #[inline(always)]
    fn gpr(&self, reg: Reg) -> u64 {
        self.machine.cpu.regs.read(reg)
    }

    /// Writes a general purpose register, discarding writes to [`Reg::R0`].
    #[inline(always)]
    fn set_gpr(&mut self, reg: Reg, value: u64) {
        if reg != Reg::R0 {
            self.machine.cpu.regs.write(reg, value);
        }
    }

    /// Moves the PC to the next instruction.
    #[inline(always)]
    fn advance(&mut self) {
        let regs = &mut self.machine.cpu.regs;
        regs.pc = regs.pc.wrapping_add(4);
    }

    /// Checks that COP1 is usable, raising a coprocessor unusable exception if it isn't.
    fn require_cop1(&mut self) -> bool {
        if self.machine.cop0.status().cop1_usable() {
            return true;
        }

        self.machine
            .exception_with_coprocessor(Exception::CopUnusable, 1);
        false
    }

    /// The fallback of every opcode without an implementation: logs and stops the machine.
    #[cold]
    #[inline(never)]
    fn not_implemented(&mut self, instr: Instruction) {
        error!(
            target: "cpu",
            "can't execute {instr} at 0x{:08X}",
            self.machine.cpu.regs.pc
        );
        self.machine.stop();
    }

    fn exec(&mut self, instr: Instruction) {
        let Some(op) = instr.op() else {
            self.not_implemented(instr);
            return;
        };

        match op {
            Opcode::SPECIAL => self.exec_special(instr),
            Opcode::REGIMM => self.exec_regimm(instr),
            Opcode::J => self.j(instr),
            Opcode::JAL => self.jal(instr),
            Opcode::BEQ => self.beq(instr),
            Opcode::BNE => self.bne(instr),
            Opcode::BLEZ => self.blez(instr),
            Opcode::BGTZ => self.bgtz(instr),
            Opcode::ADDI => self.addi(instr),
            Opcode::ADDIU => self.addiu(instr),
            Opcode::SLTI => self.slti(instr),
            Opcode::SLTIU => self.sltiu(instr),
            Opcode::ANDI => self.andi(instr),
            Opcode::ORI => self.ori(instr),
            Opcode::XORI => self.xori(instr),
            Opcode::LUI => self.lui(instr),
            Opcode::COP0 => self.exec_cop0(instr),
            Opcode::COP1 => self.exec_cop1(instr),
            Opcode::BEQL => self.beql(instr),
            Opcode::BNEL => self.bnel(instr),
            Opcode::BLEZL => self.blezl(instr),
            Opcode::BGTZL => self.bgtzl(instr),
            Opcode::DADDI => self.daddi(instr),
            Opcode::DADDIU => self.daddiu(instr),
            Opcode::LDL => self.ldl(instr),
            Opcode::LDR => self.ldr(instr),
            Opcode::LB => self.lb(instr),
            Opcode::LH => self.lh(instr),
            Opcode::LWL => self.lwl(instr),
            Opcode::LW => self.lw(instr),
            Opcode::LBU => self.lbu(instr),
            Opcode::LHU => self.lhu(instr),
            Opcode::LWR => self.lwr(instr),
            Opcode::LWU => self.lwu(instr),
            Opcode::SB => self.sb(instr),
            Opcode::SH => self.sh(instr),
            Opcode::SWL => self.swl(instr),
            Opcode::SW => self.sw(instr),
            Opcode::SDL => self.sdl(instr),
            Opcode::SDR => self.sdr(instr),
            Opcode::SWR => self.swr(instr),
            Opcode::CACHE => self.advance(),
            Opcode::LL => self.ll(instr),
            Opcode::LWC1 => self.lwc1(instr),
            Opcode::LDC1 => self.ldc1(instr),
            Opcode::LD => self.ld(instr),
            Opcode::SC => self.sc(instr),
            Opcode::SWC1 => self.swc1(instr),
            Opcode::SDC1 => self.sdc1(instr),
            Opcode::SD => self.sd(instr),
            Opcode::COP2
            | Opcode::LWC2
            | Opcode::LLD
            | Opcode::LDC2
            | Opcode::SWC2
            | Opcode::SCD
            | Opcode::SDC2 => self.not_implemented(instr),
        }
    }

    fn exec_special(&mut self, instr: Instruction) {
        let Some(op) = instr.special_op() else {
            self.not_implemented(instr);
            return;
        };

        match op {
            SpecialOpcode::SLL => self.sll(instr),
            SpecialOpcode::SRL => self.srl(instr),
            SpecialOpcode::SRA => self.sra(instr),
            SpecialOpcode::SLLV => self.sllv(instr),
            SpecialOpcode::SRLV => self.srlv(instr),
            SpecialOpcode::SRAV => self.srav(instr),
            SpecialOpcode::JR => self.jr(instr),
            SpecialOpcode::JALR => self.jalr(instr),
            SpecialOpcode::SYSCALL => self.syscall(instr),
            SpecialOpcode::BREAK => self.breakpoint(instr),
            SpecialOpcode::SYNC => self.advance(),
            SpecialOpcode::MFHI => self.mfhi(instr),
            SpecialOpcode::MTHI => self.mthi(instr),
            SpecialOpcode::MFLO => self.mflo(instr),
            SpecialOpcode::MTLO => self.mtlo(instr),
            SpecialOpcode::DSLLV => self.dsllv(instr),
            SpecialOpcode::DSRLV => self.dsrlv(instr),
            SpecialOpcode::DSRAV => self.dsrav(instr),
            SpecialOpcode::MULT => self.mult(instr),
            SpecialOpcode::MULTU => self.multu(instr),
            SpecialOpcode::DIV => self.div(instr),
            SpecialOpcode::DIVU => self.divu(instr),
            SpecialOpcode::DMULT => self.dmult(instr),
            SpecialOpcode::DMULTU => self.dmultu(instr),
            SpecialOpcode::DDIV => self.ddiv(instr),
            SpecialOpcode::DDIVU => self.ddivu(instr),
            SpecialOpcode::ADD => self.add(instr),
            SpecialOpcode::ADDU => self.addu(instr),
            SpecialOpcode::SUB => self.sub(instr),
            SpecialOpcode::SUBU => self.subu(instr),
            SpecialOpcode::AND => self.and(instr),
            SpecialOpcode::OR => self.or(instr),
            SpecialOpcode::XOR => self.xor(instr),
            SpecialOpcode::NOR => self.nor(instr),
            SpecialOpcode::SLT => self.slt(instr),
            SpecialOpcode::SLTU => self.sltu(instr),
            SpecialOpcode::DADD => self.dadd(instr),
            SpecialOpcode::DADDU => self.daddu(instr),
            SpecialOpcode::DSUB => self.dsub(instr),
            SpecialOpcode::DSUBU => self.dsubu(instr),
            SpecialOpcode::TGE => self.tge(instr),
            SpecialOpcode::TGEU => self.tgeu(instr),
            SpecialOpcode::TLT => self.tlt(instr),
            SpecialOpcode::TLTU => self.tltu(instr),
            SpecialOpcode::TEQ => self.teq(instr),
            SpecialOpcode::TNE => self.tne(instr),
            SpecialOpcode::DSLL => self.dsll(instr),
            SpecialOpcode::DSRL => self.dsrl(instr),
            SpecialOpcode::DSRA => self.dsra(instr),
            SpecialOpcode::DSLL32 => self.dsll32(instr),
            SpecialOpcode::DSRL32 => self.dsrl32(instr),
            SpecialOpcode::DSRA32 => self.dsra32(instr),
        }
    }

    fn exec_regimm(&mut self, instr: Instruction) {
        let Some(op) = instr.regimm_op() else {
            self.not_implemented(instr);
            return;
        };

        match op {
            RegImmOpcode::BLTZ => self.bltz(instr),
            RegImmOpcode::BGEZ => self.bgez(instr),
            RegImmOpcode::BLTZL => self.bltzl(instr),
            RegImmOpcode::BGEZL => self.bgezl(instr),
            RegImmOpcode::TGEI => self.tgei(instr),
            RegImmOpcode::TGEIU => self.tgeiu(instr),
            RegImmOpcode::TLTI => self.tlti(instr),
            RegImmOpcode::TLTIU => self.tltiu(instr),
            RegImmOpcode::TEQI => self.teqi(instr),
            RegImmOpcode::TNEI => self.tnei(instr),
            RegImmOpcode::BLTZAL => self.bltzal(instr),
            RegImmOpcode::BGEZAL => self.bgezal(instr),
            RegImmOpcode::BLTZALL => self.bltzall(instr),
            RegImmOpcode::BGEZALL => self.bgezall(instr),
        }
    }

    fn exec_cop0(&mut self, instr: Instruction) {
        let Some(op) = instr.cop0_op() else {
            self.not_implemented(instr);
            return;
        };

        match op {
            Cop0Opcode::MFC0 => self.mfc0(instr),
            Cop0Opcode::MTC0 => self.mtc0(instr),
            Cop0Opcode::DMFC0 | Cop0Opcode::DMTC0 => self.not_implemented(instr),
            Cop0Opcode::CO => match instr.tlb_op() {
                Some(TlbOpcode::TLBR) => self.tlbr(instr),
                Some(TlbOpcode::TLBWI) => self.tlbwi(instr),
                Some(TlbOpcode::TLBWR) => self.tlbwr(instr),
                Some(TlbOpcode::TLBP) => self.tlbp(instr),
                Some(TlbOpcode::ERET) => self.eret(instr),
                None => self.not_implemented(instr),
            },
        }
    }

    fn exec_cop1(&mut self, instr: Instruction) {
        let Some(op) = instr.cop1_op() else {
            self.not_implemented(instr);
            return;
        };

        if !self.require_cop1() {
            return;
        }

        match op {
            Cop1Opcode::MFC1 => self.mfc1(instr),
            Cop1Opcode::DMFC1 => self.dmfc1(instr),
            Cop1Opcode::CFC1 => self.cfc1(instr),
            Cop1Opcode::MTC1 => self.mtc1(instr),
            Cop1Opcode::DMTC1 => self.dmtc1(instr),
            Cop1Opcode::CTC1 => self.ctc1(instr),
            Cop1Opcode::BC1 => self.bc1(instr),
            Cop1Opcode::S => self.exec_single(instr),
            Cop1Opcode::D => self.exec_double(instr),
            Cop1Opcode::W => self.exec_word(instr),
            Cop1Opcode::L => self.exec_long(instr),
        }
    }
}
