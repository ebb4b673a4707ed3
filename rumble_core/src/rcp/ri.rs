//! The RDRAM interface and the RDRAM configuration registers. Both only store what is written.

#[derive(Debug, Clone, Default)]
pub struct Ri {
    pub regs: [u32; 8],
}

#[derive(Debug, Clone, Default)]
pub struct RdramRegs {
    pub regs: [u32; 10],
}
