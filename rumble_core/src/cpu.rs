//! Items related to the CPU of the N64, the VR4300 (a MIPS R4300i derivative).

pub mod cop0;
pub mod cop1;
pub mod instr;
pub mod tlb;

use bitos::bitos;
use strum::{IntoStaticStr, VariantArray};

/// Address of the first instruction executed after a reset: the boot code copied into DMEM.
pub const BOOT_VECTOR: u32 = 0xA400_0040;

/// A general purpose register of the CPU, or the index of a COP0 register.
#[bitos(5)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray, IntoStaticStr)]
pub enum Reg {
    /// Hardwired to zero. Instruction handlers discard every write to it.
    R0,
    /// `AT`, the assembler temporary.
    R1,
    /// `V0`, first return value.
    R2,
    /// `V1`, second return value.
    R3,
    /// `A0`, first argument.
    R4,
    /// `A1`, second argument.
    R5,
    /// `A2`, third argument.
    R6,
    /// `A3`, fourth argument.
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    R16,
    R17,
    R18,
    R19,
    R20,
    R21,
    R22,
    R23,
    R24,
    R25,
    /// `K0`, reserved for the kernel's exception handlers.
    R26,
    /// `K1`, reserved for the kernel's exception handlers.
    R27,
    /// `GP`, global pointer.
    R28,
    /// `SP`, stack pointer.
    R29,
    /// `FP`, frame pointer.
    R30,
    /// `RA`, return address. Written by the linking jumps and branches.
    R31,
}

impl Reg {
    pub const ZERO: Reg = Reg::R0;
    pub const AT: Reg = Reg::R1;
    pub const V0: Reg = Reg::R2;
    pub const V1: Reg = Reg::R3;
    pub const A0: Reg = Reg::R4;
    pub const A1: Reg = Reg::R5;
    pub const A2: Reg = Reg::R6;
    pub const A3: Reg = Reg::R7;
    pub const T0: Reg = Reg::R8;
    pub const S6: Reg = Reg::R22;
    pub const SP: Reg = Reg::R29;
    pub const RA: Reg = Reg::R31;

    pub const COP0_INDEX: Reg = Reg::R0;
    pub const COP0_RANDOM: Reg = Reg::R1;
    pub const COP0_ENTRY_LO0: Reg = Reg::R2;
    pub const COP0_ENTRY_LO1: Reg = Reg::R3;
    pub const COP0_CONTEXT: Reg = Reg::R4;
    pub const COP0_PAGE_MASK: Reg = Reg::R5;
    pub const COP0_WIRED: Reg = Reg::R6;
    pub const COP0_BAD_VADDR: Reg = Reg::R8;
    pub const COP0_COUNT: Reg = Reg::R9;
    pub const COP0_ENTRY_HI: Reg = Reg::R10;
    pub const COP0_COMPARE: Reg = Reg::R11;
    pub const COP0_STATUS: Reg = Reg::R12;
    pub const COP0_CAUSE: Reg = Reg::R13;
    pub const COP0_EPC: Reg = Reg::R14;
    pub const COP0_PREVID: Reg = Reg::R15;
    pub const COP0_CONFIG: Reg = Reg::R16;
    pub const COP0_LL_ADDR: Reg = Reg::R17;
    pub const COP0_WATCH_LO: Reg = Reg::R18;
    pub const COP0_WATCH_HI: Reg = Reg::R19;
    pub const COP0_XCONTEXT: Reg = Reg::R20;
    pub const COP0_PARITY_ERROR: Reg = Reg::R26;
    pub const COP0_CACHE_ERROR: Reg = Reg::R27;
    pub const COP0_TAG_LO: Reg = Reg::R28;
    pub const COP0_TAG_HI: Reg = Reg::R29;
    pub const COP0_ERROR_EPC: Reg = Reg::R30;

    /// Returns the index of this register.
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// The general purpose registers of the CPU, together with `HI`, `LO` and the program counter.
///
/// Every register is 64 bits wide and has no inherent signedness. The register file itself does
/// not protect [`Reg::R0`]: handlers are responsible for discarding writes to it.
#[derive(Clone, Default)]
pub struct Registers {
    pub gp: [u64; 32],
    pub hi: u64,
    pub lo: u64,
    pub pc: u32,
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (reg, value) in Reg::VARIANTS.iter().zip(self.gp) {
            let name: &'static str = reg.into();
            map.entry(&name, &format_args!("0x{value:016X}"));
        }

        map.entry(&"HI", &format_args!("0x{:016X}", self.hi));
        map.entry(&"LO", &format_args!("0x{:016X}", self.lo));
        map.entry(&"PC", &format_args!("0x{:08X}", self.pc));
        map.finish()
    }
}

impl Registers {
    #[inline(always)]
    pub fn read(&self, reg: Reg) -> u64 {
        self.gp[reg.index()]
    }

    /// Writes a value to a register. This _does not_ ignore writes to [`Reg::R0`].
    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: u64) {
        self.gp[reg.index()] = value;
    }
}

/// State of the CPU outside of the register file.
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    pub regs: Registers,
    /// The load-linked bit, set by `LL` and consumed by `SC`.
    pub ll_bit: bool,
    /// Whether the instruction currently executing sits in a branch delay slot.
    pub delay_slot: bool,
    /// Address the next due scheduler poll must jump to instead of servicing the queue. Left by
    /// exceptions raised inside a delay slot so the in-flight branch does not commit.
    pub skip_jump: Option<u32>,
    /// Address of the last instruction whose execution has been accounted for in COUNT.
    pub last_addr: u32,
}

impl Cpu {
    /// Resets the CPU to its power-on state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
