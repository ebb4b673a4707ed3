use crate::Machine;
use rumble_core::rcp::mi::Reg;
use tracing::trace;

impl Machine {
    pub(crate) fn read_mi(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(reg) => self.rcp.mi.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_mi(&mut self, offset: u32, value: u32, mask: u32) {
        let value = value & mask;
        match Reg::from_offset(offset) {
            Some(Reg::Mode) => {
                self.rcp.mi.write_mode(value);
                self.check_interrupt();
            }
            Some(Reg::IntrMask) => {
                self.rcp.mi.write_mask(value);
                self.check_interrupt();
            }
            Some(reg) => trace!(
                target: "bus",
                "ignored write of 0x{value:08X} to MI {}",
                <&'static str>::from(reg)
            ),
            None => (),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::cpu::test::machine;
    use rumble_core::{
        cpu::cop0::{Cause, Status},
        rcp::mi::{Interrupt, VERSION},
    };

    #[test]
    fn version_is_read_only() {
        let mut machine = machine();
        machine.write_mi(0x04, 0, u32::MAX);
        assert_eq!(machine.read_mi(0x04), VERSION);
    }

    #[test]
    fn unmasking_a_raised_line_requests_an_interrupt() {
        let mut machine = machine();
        machine.cop0.set_status(
            Status::default()
                .with_interrupts_enabled(true)
                .with_interrupt_mask(Cause::RCP_INTERRUPT),
        );
        machine.rcp.mi.raise(Interrupt::Pi);
        assert!(!machine.cop0.interrupt_requested());

        machine.write_mi(0x0C, 0x200, u32::MAX);
        assert!(machine.cop0.interrupt_requested());
        assert!(machine.scheduler.due(machine.count()));
    }

    #[test]
    fn mode_write_acknowledges_dp() {
        let mut machine = machine();
        machine.rcp.mi.raise(Interrupt::Dp);
        machine.write_mi(0x00, 0x0800, u32::MAX);
        assert_eq!(machine.read_mi(0x08), 0);
    }
}
