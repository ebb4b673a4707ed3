use crate::{Machine, scheduler::Event};
use rumble_core::{
    rcp::{mi::Interrupt, vi::Reg},
    write_masked,
};

impl Machine {
    pub(crate) fn read_vi(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(Reg::Current) => {
                self.update_count();
                let count = self.count();
                let remaining = self
                    .scheduler
                    .time_of(Event::Vi)
                    .map_or(0, |due| due.wrapping_sub(count));

                let line = self.rcp.vi.current_line(remaining, self.config.vi_refresh);
                self.rcp.vi.regs[Reg::Current as usize] = line;
                line
            }
            Some(reg) => self.rcp.vi.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_vi(&mut self, offset: u32, value: u32, mask: u32) {
        let Some(reg) = Reg::from_offset(offset) else {
            return;
        };

        match reg {
            Reg::Current => self.lower_rcp(Interrupt::Vi),
            Reg::Status => {
                let value = write_masked(self.rcp.vi.read(reg), value, mask);
                if self.rcp.vi.write(reg, value) {
                    self.plugins.display.vi_status_changed(value);
                }
            }
            Reg::Width => {
                let value = write_masked(self.rcp.vi.read(reg), value, mask);
                if self.rcp.vi.write(reg, value) {
                    self.plugins.display.vi_width_changed(value);
                }
            }
            _ => {
                let value = write_masked(self.rcp.vi.read(reg), value, mask);
                self.rcp.vi.write(reg, value);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{cpu::test::machine, scheduler::Event};
    use rumble_core::rcp::{mi::Interrupt, vi};

    #[test]
    fn current_line_counts_from_the_last_vi() {
        let mut machine = machine();
        machine.write_vi(0x18, 0x20D, u32::MAX);
        machine.rcp.vi.update_delay(machine.config.vi_refresh);

        let count = machine.count();
        let delay = machine.rcp.vi.delay;
        let refresh = machine.config.vi_refresh;
        // 20 lines in
        machine
            .scheduler
            .add(Event::Vi, delay - 20 * refresh, count);

        assert_eq!(machine.read_vi(0x10), 20);
    }

    #[test]
    fn widest_v_sync_sets_a_finite_period() {
        let mut machine = machine();
        machine.write_vi(0x18, u32::MAX, u32::MAX);
        assert_eq!(machine.read_vi(0x18), vi::V_SYNC_MASK);

        let refresh = machine.config.vi_refresh;
        machine.rcp.vi.update_delay(refresh);
        assert_eq!(machine.rcp.vi.delay, (vi::V_SYNC_MASK + 1) * refresh);
    }

    #[test]
    fn current_write_acknowledges() {
        let mut machine = machine();
        machine.rcp.mi.raise(Interrupt::Vi);
        machine.write_vi(0x10, 0, u32::MAX);
        assert_eq!(machine.rcp.mi.intr & Interrupt::Vi.bit(), 0);
    }

    #[test]
    fn registers_store_masked_values() {
        let mut machine = machine();
        machine.write_vi(0x04, 0x0010_0000, u32::MAX);
        machine.write_vi(0x04, 0x0000_FFFF, 0x0000_00FF);
        assert_eq!(machine.rcp.vi.read(vi::Reg::Origin), 0x0010_00FF);
    }
}
