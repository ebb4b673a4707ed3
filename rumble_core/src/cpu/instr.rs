use super::Reg;
use bitos::{
    bitos,
    integer::{u5, u26},
};
use strum::IntoStaticStr;

/// The primary opcode of a [`Instruction`].
#[bitos(6)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Opcode {
    SPECIAL = 0x00,
    REGIMM = 0x01,
    J = 0x02,
    JAL = 0x03,
    BEQ = 0x04,
    BNE = 0x05,
    BLEZ = 0x06,
    BGTZ = 0x07,
    ADDI = 0x08,
    ADDIU = 0x09,
    SLTI = 0x0A,
    SLTIU = 0x0B,
    ANDI = 0x0C,
    ORI = 0x0D,
    XORI = 0x0E,
    LUI = 0x0F,
    COP0 = 0x10,
    COP1 = 0x11,
    COP2 = 0x12,
    BEQL = 0x14,
    BNEL = 0x15,
    BLEZL = 0x16,
    BGTZL = 0x17,
    DADDI = 0x18,
    DADDIU = 0x19,
    LDL = 0x1A,
    LDR = 0x1B,
    LB = 0x20,
    LH = 0x21,
    LWL = 0x22,
    LW = 0x23,
    LBU = 0x24,
    LHU = 0x25,
    LWR = 0x26,
    LWU = 0x27,
    SB = 0x28,
    SH = 0x29,
    SWL = 0x2A,
    SW = 0x2B,
    SDL = 0x2C,
    SDR = 0x2D,
    SWR = 0x2E,
    CACHE = 0x2F,
    LL = 0x30,
    LWC1 = 0x31,
    LWC2 = 0x32,
    LLD = 0x34,
    LDC1 = 0x35,
    LDC2 = 0x36,
    LD = 0x37,
    SC = 0x38,
    SWC1 = 0x39,
    SWC2 = 0x3A,
    SCD = 0x3C,
    SDC1 = 0x3D,
    SDC2 = 0x3E,
    SD = 0x3F,
}

/// The opcode of a [`Instruction`] whose primary opcode is [`Opcode::SPECIAL`].
#[bitos(6)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum SpecialOpcode {
    SLL = 0x00,
    SRL = 0x02,
    SRA = 0x03,
    SLLV = 0x04,
    SRLV = 0x06,
    SRAV = 0x07,
    JR = 0x08,
    JALR = 0x09,
    SYSCALL = 0x0C,
    BREAK = 0x0D,
    SYNC = 0x0F,
    MFHI = 0x10,
    MTHI = 0x11,
    MFLO = 0x12,
    MTLO = 0x13,
    DSLLV = 0x14,
    DSRLV = 0x16,
    DSRAV = 0x17,
    MULT = 0x18,
    MULTU = 0x19,
    DIV = 0x1A,
    DIVU = 0x1B,
    DMULT = 0x1C,
    DMULTU = 0x1D,
    DDIV = 0x1E,
    DDIVU = 0x1F,
    ADD = 0x20,
    ADDU = 0x21,
    SUB = 0x22,
    SUBU = 0x23,
    AND = 0x24,
    OR = 0x25,
    XOR = 0x26,
    NOR = 0x27,
    SLT = 0x2A,
    SLTU = 0x2B,
    DADD = 0x2C,
    DADDU = 0x2D,
    DSUB = 0x2E,
    DSUBU = 0x2F,
    TGE = 0x30,
    TGEU = 0x31,
    TLT = 0x32,
    TLTU = 0x33,
    TEQ = 0x34,
    TNE = 0x36,
    DSLL = 0x38,
    DSRL = 0x3A,
    DSRA = 0x3B,
    DSLL32 = 0x3C,
    DSRL32 = 0x3E,
    DSRA32 = 0x3F,
}

/// The opcode of a [`Instruction`] whose primary opcode is [`Opcode::REGIMM`].
#[bitos(5)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum RegImmOpcode {
    BLTZ = 0x00,
    BGEZ = 0x01,
    BLTZL = 0x02,
    BGEZL = 0x03,
    TGEI = 0x08,
    TGEIU = 0x09,
    TLTI = 0x0A,
    TLTIU = 0x0B,
    TEQI = 0x0C,
    TNEI = 0x0E,
    BLTZAL = 0x10,
    BGEZAL = 0x11,
    BLTZALL = 0x12,
    BGEZALL = 0x13,
}

/// The `rs` field of a COP0 instruction.
#[bitos(5)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Cop0Opcode {
    MFC0 = 0x00,
    DMFC0 = 0x01,
    MTC0 = 0x04,
    DMTC0 = 0x05,
    /// Coprocessor operation, further decoded by [`Instruction::tlb_op`].
    CO = 0x10,
}

/// The function field of a COP0 coprocessor operation.
#[bitos(6)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum TlbOpcode {
    TLBR = 0x01,
    TLBWI = 0x02,
    TLBWR = 0x06,
    TLBP = 0x08,
    ERET = 0x18,
}

/// The `rs` field of a COP1 instruction.
#[bitos(5)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Cop1Opcode {
    MFC1 = 0x00,
    DMFC1 = 0x01,
    CFC1 = 0x02,
    MTC1 = 0x04,
    DMTC1 = 0x05,
    CTC1 = 0x06,
    BC1 = 0x08,
    S = 0x10,
    D = 0x11,
    W = 0x14,
    L = 0x15,
}

/// The kind of a `BC1` branch.
#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum BranchCop1Kind {
    BC1F,
    BC1T,
    BC1FL,
    BC1TL,
}

/// The function field of a COP1 arithmetic instruction.
#[allow(non_camel_case_types)]
#[bitos(6)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum FpuOpcode {
    ADD = 0x00,
    SUB = 0x01,
    MUL = 0x02,
    DIV = 0x03,
    SQRT = 0x04,
    ABS = 0x05,
    MOV = 0x06,
    NEG = 0x07,
    ROUND_L = 0x08,
    TRUNC_L = 0x09,
    CEIL_L = 0x0A,
    FLOOR_L = 0x0B,
    ROUND_W = 0x0C,
    TRUNC_W = 0x0D,
    CEIL_W = 0x0E,
    FLOOR_W = 0x0F,
    CVT_S = 0x20,
    CVT_D = 0x21,
    CVT_W = 0x24,
    CVT_L = 0x25,
    C_F = 0x30,
    C_UN = 0x31,
    C_EQ = 0x32,
    C_UEQ = 0x33,
    C_OLT = 0x34,
    C_ULT = 0x35,
    C_OLE = 0x36,
    C_ULE = 0x37,
    C_SF = 0x38,
    C_NGLE = 0x39,
    C_SEQ = 0x3A,
    C_NGL = 0x3B,
    C_LT = 0x3C,
    C_NGE = 0x3D,
    C_LE = 0x3E,
    C_NGT = 0x3F,
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// The operation executed by this instruction.
    #[bits(26..32)]
    pub op: Option<Opcode>,

    /// The operation executed by this instruction if it's primary opcode is
    /// [`Opcode::SPECIAL`].
    #[bits(0..6)]
    pub special_op: Option<SpecialOpcode>,

    #[bits(16..21)]
    pub regimm_op: Option<RegImmOpcode>,

    #[bits(21..26)]
    pub cop0_op: Option<Cop0Opcode>,

    #[bits(0..6)]
    pub tlb_op: Option<TlbOpcode>,

    #[bits(21..26)]
    pub cop1_op: Option<Cop1Opcode>,

    #[bits(16..18)]
    pub bc1_kind: BranchCop1Kind,

    #[bits(0..6)]
    pub fpu_op: Option<FpuOpcode>,

    /// The destination register of this instruction.
    #[bits(11..16)]
    pub rd: Reg,

    /// The target register of this instruction.
    #[bits(16..21)]
    pub rt: Reg,

    /// The source register of this instruction.
    #[bits(21..26)]
    pub rs: Reg,

    /// Shift amount.
    #[bits(6..11)]
    pub sa: u5,

    /// FPU destination register.
    #[bits(6..11)]
    pub fd: u5,

    /// FPU source register.
    #[bits(11..16)]
    pub fs: u5,

    /// FPU target register.
    #[bits(16..21)]
    pub ft: u5,

    /// The unsigned 16 bit immediate value of this instruction.
    #[bits(0..16)]
    pub imm16: u16,

    /// The signed 16 bit immediate value of this instruction.
    #[bits(0..16)]
    pub signed_imm16: i16,

    /// The 26 bit immediate value of this instruction.
    #[bits(0..26)]
    pub imm26: u26,
}

impl Default for Instruction {
    fn default() -> Self {
        Self::NOP
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mnemonic() {
            Some(mnemonic) => write!(f, "{mnemonic} (0x{:08X})", self.to_bits()),
            None => write!(f, "ILLEGAL (0x{:08X})", self.to_bits()),
        }
    }
}

impl Instruction {
    pub const NOP: Self = Instruction(0x0000_0000);

    #[inline(always)]
    pub fn fs_index(&self) -> usize {
        usize::from(self.fs().value())
    }

    #[inline(always)]
    pub fn ft_index(&self) -> usize {
        usize::from(self.ft().value())
    }

    #[inline(always)]
    pub fn fd_index(&self) -> usize {
        usize::from(self.fd().value())
    }

    /// Returns the mnemonic of this instruction, or `None` if it does not decode.
    pub fn mnemonic(&self) -> Option<String> {
        let name = |s: &'static str| Some(s.to_owned());
        match self.op()? {
            Opcode::SPECIAL => name(self.special_op()?.into()),
            Opcode::REGIMM => name(self.regimm_op()?.into()),
            Opcode::COP0 => match self.cop0_op()? {
                Cop0Opcode::CO => name(self.tlb_op()?.into()),
                op => name(op.into()),
            },
            Opcode::COP1 => match self.cop1_op()? {
                Cop1Opcode::BC1 => name(self.bc1_kind().into()),
                op @ (Cop1Opcode::S | Cop1Opcode::D | Cop1Opcode::W | Cop1Opcode::L) => {
                    let fmt: &'static str = op.into();
                    let func: &'static str = self.fpu_op()?.into();
                    Some(format!("{func}.{fmt}"))
                }
                op => name(op.into()),
            },
            op => name(op.into()),
        }
    }

    #[inline(always)]
    pub fn sll(rd: Reg, rt: Reg, sa: u5) -> Self {
        Self::NOP
            .with_special_op(SpecialOpcode::SLL)
            .with_rd(rd)
            .with_rt(rt)
            .with_sa(sa)
    }

    #[inline(always)]
    pub fn special(op: SpecialOpcode, rd: Reg, rs: Reg, rt: Reg) -> Self {
        Self::NOP
            .with_special_op(op)
            .with_rd(rd)
            .with_rs(rs)
            .with_rt(rt)
    }

    #[inline(always)]
    pub fn immediate(op: Opcode, rt: Reg, rs: Reg, imm: i16) -> Self {
        Self::NOP
            .with_op(op)
            .with_rt(rt)
            .with_rs(rs)
            .with_signed_imm16(imm)
    }

    #[inline(always)]
    pub fn addu(rd: Reg, rs: Reg, rt: Reg) -> Self {
        Self::special(SpecialOpcode::ADDU, rd, rs, rt)
    }

    #[inline(always)]
    pub fn addiu(rt: Reg, rs: Reg, imm: i16) -> Self {
        Self::immediate(Opcode::ADDIU, rt, rs, imm)
    }

    #[inline(always)]
    pub fn ori(rt: Reg, rs: Reg, imm: u16) -> Self {
        Self::NOP
            .with_op(Opcode::ORI)
            .with_rt(rt)
            .with_rs(rs)
            .with_imm16(imm)
    }

    #[inline(always)]
    pub fn lui(rt: Reg, imm: u16) -> Self {
        Self::NOP.with_op(Opcode::LUI).with_rt(rt).with_imm16(imm)
    }

    #[inline(always)]
    pub fn lw(rt: Reg, rs: Reg, imm: i16) -> Self {
        Self::immediate(Opcode::LW, rt, rs, imm)
    }

    #[inline(always)]
    pub fn sw(rt: Reg, rs: Reg, imm: i16) -> Self {
        Self::immediate(Opcode::SW, rt, rs, imm)
    }

    #[inline(always)]
    pub fn beq(rs: Reg, rt: Reg, imm: i16) -> Self {
        Self::NOP
            .with_op(Opcode::BEQ)
            .with_rs(rs)
            .with_rt(rt)
            .with_signed_imm16(imm)
    }

    #[inline(always)]
    pub fn bne(rs: Reg, rt: Reg, imm: i16) -> Self {
        Self::beq(rs, rt, imm).with_op(Opcode::BNE)
    }

    #[inline(always)]
    pub fn beql(rs: Reg, rt: Reg, imm: i16) -> Self {
        Self::beq(rs, rt, imm).with_op(Opcode::BEQL)
    }

    #[inline(always)]
    pub fn bnel(rs: Reg, rt: Reg, imm: i16) -> Self {
        Self::beq(rs, rt, imm).with_op(Opcode::BNEL)
    }

    #[inline(always)]
    pub fn j(target: u32) -> Self {
        Self::NOP
            .with_op(Opcode::J)
            .with_imm26(u26::new((target >> 2) & 0x03FF_FFFF))
    }

    #[inline(always)]
    pub fn jal(target: u32) -> Self {
        Self::j(target).with_op(Opcode::JAL)
    }

    #[inline(always)]
    pub fn jr(rs: Reg) -> Self {
        Self::NOP.with_special_op(SpecialOpcode::JR).with_rs(rs)
    }

    #[inline(always)]
    pub fn syscall() -> Self {
        Self::NOP.with_special_op(SpecialOpcode::SYSCALL)
    }

    #[inline(always)]
    pub fn mfc0(rt: Reg, rd: Reg) -> Self {
        Self::NOP
            .with_op(Opcode::COP0)
            .with_cop0_op(Cop0Opcode::MFC0)
            .with_rt(rt)
            .with_rd(rd)
    }

    #[inline(always)]
    pub fn mtc0(rt: Reg, rd: Reg) -> Self {
        Self::mfc0(rt, rd).with_cop0_op(Cop0Opcode::MTC0)
    }

    #[inline(always)]
    pub fn tlb(op: TlbOpcode) -> Self {
        Self::NOP
            .with_op(Opcode::COP0)
            .with_cop0_op(Cop0Opcode::CO)
            .with_tlb_op(op)
    }

    #[inline(always)]
    pub fn mtc1(rt: Reg, fs: u5) -> Self {
        Self::NOP
            .with_op(Opcode::COP1)
            .with_cop1_op(Cop1Opcode::MTC1)
            .with_rt(rt)
            .with_fs(fs)
    }

    #[inline(always)]
    pub fn mfc1(rt: Reg, fs: u5) -> Self {
        Self::mtc1(rt, fs).with_cop1_op(Cop1Opcode::MFC1)
    }

    #[inline(always)]
    pub fn fpu(fmt: Cop1Opcode, op: FpuOpcode, fd: u5, fs: u5, ft: u5) -> Self {
        Self::NOP
            .with_op(Opcode::COP1)
            .with_cop1_op(fmt)
            .with_fpu_op(op)
            .with_fd(fd)
            .with_fs(fs)
            .with_ft(ft)
    }

    #[inline(always)]
    pub fn bc1(kind: BranchCop1Kind, imm: i16) -> Self {
        Self::NOP
            .with_op(Opcode::COP1)
            .with_cop1_op(Cop1Opcode::BC1)
            .with_bc1_kind(kind)
            .with_signed_imm16(imm)
    }
}

/// Assembles a list of [`Instruction`] builder calls into an array.
#[macro_export]
macro_rules! mips {
    ( $( $op:ident ($($args:tt)*) )* ) => {
        [
            $(
                $crate::cpu::instr::Instruction::$op( $($args)* )
            ),*
        ]
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_fields() {
        // addiu $t0, $zero, -1
        let instr = Instruction::from_bits(0x2408_FFFF);
        assert_eq!(instr.op(), Some(Opcode::ADDIU));
        assert_eq!(instr.rt(), Reg::T0);
        assert_eq!(instr.rs(), Reg::R0);
        assert_eq!(instr.signed_imm16(), -1);
    }

    #[test]
    fn builders_match_encoding() {
        assert_eq!(Instruction::lui(Reg::T0, 0xA400).to_bits(), 0x3C08_A400);
        assert_eq!(Instruction::jr(Reg::RA).to_bits(), 0x03E0_0008);
        assert_eq!(Instruction::tlb(TlbOpcode::ERET).to_bits(), 0x4200_0018);
        assert_eq!(Instruction::mtc0(Reg::T0, Reg::COP0_STATUS).to_bits(), 0x4088_6000);
    }

    #[test]
    fn mnemonics() {
        assert_eq!(Instruction::NOP.mnemonic().as_deref(), Some("SLL"));
        assert_eq!(
            Instruction::tlb(TlbOpcode::TLBWI).mnemonic().as_deref(),
            Some("TLBWI")
        );

        let add_s = Instruction::fpu(
            Cop1Opcode::S,
            FpuOpcode::ADD,
            u5::new(0),
            u5::new(1),
            u5::new(2),
        );
        assert_eq!(add_s.mnemonic().as_deref(), Some("ADD.S"));

        // primary opcode 0x1C is reserved on the VR4300
        assert_eq!(Instruction::from_bits(0x7000_0000).mnemonic(), None);
    }
}
