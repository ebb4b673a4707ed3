use crate::Machine;
use rumble_core::{
    rcp::{dp::Reg, mi::Interrupt},
    write_masked,
};
use tracing::debug;

impl Machine {
    pub(crate) fn read_dpc(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(reg) => self.rcp.dpc.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_dpc(&mut self, offset: u32, value: u32, mask: u32) {
        let Some(reg) = Reg::from_offset(offset) else {
            return;
        };

        match reg {
            Reg::Start => {
                let value = write_masked(self.rcp.dpc.read(reg), value, mask);
                self.rcp.dpc.write_start(value);
            }
            Reg::End => {
                let value = write_masked(self.rcp.dpc.read(reg), value, mask);
                self.rcp.dpc.write(reg, value);

                self.plugins
                    .display
                    .process_rdp_list(&self.memory, &self.rcp.dpc);
                self.rcp.mi.raise(Interrupt::Dp);
                self.check_interrupt();
            }
            Reg::Status => {
                let unfrozen = self.rcp.dpc.write_status(value & mask);
                if unfrozen && self.rsp_task_locked {
                    debug!(target: "dp", "RDP unfrozen, resuming the pending task");
                    self.rsp_task_locked = false;
                    self.prepare_rsp();
                }
            }
            Reg::Current | Reg::Clock | Reg::BufBusy | Reg::PipeBusy | Reg::Tmem => (),
        }
    }
}
