use super::Interpreter;
use rumble_core::cpu::{cop0::Exception, instr::Instruction};

impl Interpreter<'_> {
    pub fn syscall(&mut self, _: Instruction) {
        self.machine.exception(Exception::Syscall);
    }

    pub fn breakpoint(&mut self, _: Instruction) {
        self.machine.exception(Exception::Breakpoint);
    }

    /// Raises a trap exception if `condition` holds, or moves on otherwise.
    fn trap_if(&mut self, condition: bool) {
        if condition {
            self.machine.exception(Exception::Trap);
        } else {
            self.advance();
        }
    }

    /// `trap if rs >= rt`
    pub fn tge(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let rt = self.gpr(instr.rt()) as i64;
        self.trap_if(rs >= rt);
    }

    /// `trap if rs >= rt`, unsigned
    pub fn tgeu(&mut self, instr: Instruction) {
        let condition = self.gpr(instr.rs()) >= self.gpr(instr.rt());
        self.trap_if(condition);
    }

    /// `trap if rs < rt`
    pub fn tlt(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        let rt = self.gpr(instr.rt()) as i64;
        self.trap_if(rs < rt);
    }

    /// `trap if rs < rt`, unsigned
    pub fn tltu(&mut self, instr: Instruction) {
        let condition = self.gpr(instr.rs()) < self.gpr(instr.rt());
        self.trap_if(condition);
    }

    /// `trap if rs == rt`
    pub fn teq(&mut self, instr: Instruction) {
        let condition = self.gpr(instr.rs()) == self.gpr(instr.rt());
        self.trap_if(condition);
    }

    /// `trap if rs != rt`
    pub fn tne(&mut self, instr: Instruction) {
        let condition = self.gpr(instr.rs()) != self.gpr(instr.rt());
        self.trap_if(condition);
    }

    /// `trap if rs >= signed_imm16`
    pub fn tgei(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        self.trap_if(rs >= i64::from(instr.signed_imm16()));
    }

    /// `trap if rs >= (unsigned)signed_imm16`
    pub fn tgeiu(&mut self, instr: Instruction) {
        let imm = i64::from(instr.signed_imm16()) as u64;
        let condition = self.gpr(instr.rs()) >= imm;
        self.trap_if(condition);
    }

    /// `trap if rs < signed_imm16`
    pub fn tlti(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        self.trap_if(rs < i64::from(instr.signed_imm16()));
    }

    /// `trap if rs < (unsigned)signed_imm16`
    pub fn tltiu(&mut self, instr: Instruction) {
        let imm = i64::from(instr.signed_imm16()) as u64;
        let condition = self.gpr(instr.rs()) < imm;
        self.trap_if(condition);
    }

    /// `trap if rs == signed_imm16`
    pub fn teqi(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        self.trap_if(rs == i64::from(instr.signed_imm16()));
    }

    /// `trap if rs != signed_imm16`
    pub fn tnei(&mut self, instr: Instruction) {
        let rs = self.gpr(instr.rs()) as i64;
        self.trap_if(rs != i64::from(instr.signed_imm16()));
    }
}
