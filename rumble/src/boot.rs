//! Hard and soft reset: the state the PIF boot ROM leaves the machine in.
//!
//! The PIF ROM is not emulated. Instead, the registers it would have set up are seeded directly
//! and execution starts at the boot code copied into DMEM.

use crate::Machine;
use rumble_core::{
    cpu::{BOOT_VECTOR, Reg},
    pif::Pif,
    rcp::{sp, vi},
    rom::{BOOT_CODE_END, Cic, HEADER_LEN, VideoStandard},
    sign_extend,
};
use tracing::{debug, info, warn};

/// Value the boot code expects in `VI_V_INTR`.
const VI_V_INTR_RESET: u32 = 1023;

/// Registers that differ between PAL and NTSC consoles for a given boot chip.
struct RegionValues {
    r5: u32,
    r14: u32,
    r24: u32,
}

/// Registers the boot chip leaves behind.
struct CicValues {
    r1: u32,
    r2: u32,
    r4: u32,
    r12: u32,
    r13: u32,
    r15: u32,
    r25: u32,
}

fn region_values(cic: Cic, standard: VideoStandard) -> Option<RegionValues> {
    let pal = standard == VideoStandard::Pal;
    let (r5, r14, r24) = match (cic, pal) {
        (Cic::Nus6101, _) => return None,
        (Cic::Nus6102, true) => (0xC0F1_D859, 0x2DE1_08EA, 0),
        (Cic::Nus6103, true) => (0xD464_6273, 0x1AF9_9984, 0),
        (Cic::Nus6105, true) => (0xDECA_AAD1, 0x0CF8_5C13, 2),
        (Cic::Nus6106, true) => (0xB04D_C903, 0x1AF9_9984, 2),
        (Cic::Nus6102, false) => (0xC959_73D5, 0x2449_A366, 3),
        (Cic::Nus6103, false) => (0x9531_5A28, 0x5BAC_A1DF, 3),
        (Cic::Nus6105, false) => (0x5493_FB9A, 0xC2C2_0384, 3),
        (Cic::Nus6106, false) => (0xE067_221F, 0x5CD2_B70F, 3),
    };

    Some(RegionValues { r5, r14, r24 })
}

fn cic_values(cic: Cic) -> Option<CicValues> {
    Some(match cic {
        Cic::Nus6101 => return None,
        Cic::Nus6102 => CicValues {
            r1: 1,
            r2: 0x0EBD_A536,
            r4: 0xA536,
            r12: 0xED10_D0B3,
            r13: 0x1402_A4CC,
            r15: 0x3103_E121,
            r25: 0x9DEB_B54F,
        },
        Cic::Nus6103 => CicValues {
            r1: 1,
            r2: 0x49A5_EE96,
            r4: 0xEE96,
            r12: 0xCE9D_FBF7,
            r13: 0xCE9D_FBF7,
            r15: 0x18B6_3D28,
            r25: 0x825B_21C9,
        },
        Cic::Nus6105 => CicValues {
            r1: 0,
            r2: 0xF58B_0FBF,
            r4: 0x0FBF,
            r12: 0x9651_F81E,
            r13: 0x2D42_AAC5,
            r15: 0x5658_4D60,
            r25: 0xCDCE_565F,
        },
        Cic::Nus6106 => CicValues {
            r1: 0,
            r2: 0xA959_30A4,
            r4: 0x30A4,
            r12: 0xBCB5_9510,
            r13: 0xBCB5_9510,
            r15: 0x7A3C_07F4,
            r25: 0x465E_3F72,
        },
    })
}

/// IMEM contents the 6105 boot code relies on.
const CIC_6105_IMEM: [(u32, u32); 7] = [
    (0x00, 0x3C0D_BFC0),
    (0x08, 0x25AD_07C0),
    (0x0C, 0x3108_0080),
    (0x10, 0x5500_FFFC),
    (0x14, 0x3C0D_BFC0),
    (0x18, 0x8DA8_0024),
    (0x1C, 0x3C0B_B000),
];

impl Machine {
    /// Puts the whole machine in its power-on state: CPU, COP0, FPU, TLB, memories and devices.
    pub fn hard_reset(&mut self) {
        info!(target: "boot", "hard reset");

        self.cpu.reset();
        self.cop0.reset();
        self.cop1.reset(self.cop0.status().fpu_64bit_registers());
        self.tlb.reset();
        self.memory.clear();
        self.rcp.reset();
        self.pif = Pif::default();
        self.cart.latch = None;

        self.frames = 0;
        self.rsp_task_locked = false;

        let regs = &mut self.cpu.regs;
        regs.write(Reg::R20, self.rom.standard.tv_type());
        regs.write(Reg::S6, self.rom.cic.seed());
    }

    /// Seeds the state the PIF boot ROM leaves for the cartridge boot code and points the CPU at
    /// it.
    pub fn soft_reset(&mut self) {
        let cic = self.rom.cic;
        let standard = self.rom.standard;
        debug!(
            target: "boot",
            "soft reset with {} on {}",
            <&'static str>::from(cic),
            <&'static str>::from(standard)
        );

        match self.rom.data.get(HEADER_LEN..BOOT_CODE_END) {
            Some(code) => self.memory.sp_mem[HEADER_LEN..BOOT_CODE_END].copy_from_slice(code),
            None => warn!(target: "boot", "ROM too small to hold the boot code"),
        }

        let regs = &mut self.cpu.regs;
        regs.gp = [0; 32];
        regs.hi = 0;
        regs.lo = 0;

        regs.write(Reg::R6, sign_extend(0xA400_1F0C));
        regs.write(Reg::R7, sign_extend(0xA400_1F08));
        regs.write(Reg::T0, 0xC0);
        regs.write(Reg::R10, 0x40);
        regs.write(Reg::R11, sign_extend(BOOT_VECTOR));
        regs.write(Reg::SP, sign_extend(0xA400_1FF0));

        regs.write(Reg::R20, standard.tv_type());
        regs.write(Reg::S6, cic.seed());

        if standard == VideoStandard::Pal {
            regs.write(Reg::R23, 6);
            regs.write(Reg::RA, sign_extend(0xA400_1554));
        } else {
            regs.write(Reg::R24, 3);
            regs.write(Reg::RA, sign_extend(0xA400_1550));
        }

        if let Some(values) = region_values(cic, standard) {
            regs.write(Reg::A1, sign_extend(values.r5));
            regs.write(Reg::R14, sign_extend(values.r14));
            if values.r24 != 0 {
                regs.write(Reg::R24, u64::from(values.r24));
            }
        }

        if let Some(values) = cic_values(cic) {
            regs.write(Reg::AT, u64::from(values.r1));
            regs.write(Reg::V0, sign_extend(values.r2));
            regs.write(Reg::V1, sign_extend(values.r2));
            regs.write(Reg::A0, u64::from(values.r4));
            regs.write(Reg::R12, sign_extend(values.r12));
            regs.write(Reg::R13, sign_extend(values.r13));
            regs.write(Reg::R15, sign_extend(values.r15));
            regs.write(Reg::R25, sign_extend(values.r25));
        }

        if cic == Cic::Nus6105 {
            for (offset, word) in CIC_6105_IMEM {
                self.memory.set_imem_word(offset, word);
            }

            let word = if standard == VideoStandard::Pal {
                0xBDA8_07FC
            } else {
                0x8DA8_07FC
            };
            self.memory.set_imem_word(0x04, word);
        }

        self.cpu.regs.pc = BOOT_VECTOR;
        self.cpu.last_addr = BOOT_VECTOR;
        self.cpu.delay_slot = false;
        self.cpu.skip_jump = None;

        let header = self.rom.word(0);
        self.rcp.pi.set_dom1_timings(header);
        self.rcp.vi.write(vi::Reg::VIntr, VI_V_INTR_RESET);
        self.rcp.sp.write(sp::Reg::Status, sp::status::HALT);
    }
}
