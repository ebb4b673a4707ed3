use crate::{Machine, scheduler::Event};
use rumble_core::{
    rcp::{
        ai::{Dma, Reg},
        mi::Interrupt,
    },
    write_masked,
};
use tracing::{trace, warn};

impl Machine {
    pub(crate) fn read_ai(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(Reg::Len) => {
                if !self.rcp.ai.busy() {
                    return 0;
                }

                self.update_count();
                let count = self.count();
                let left = self
                    .scheduler
                    .time_of(Event::Ai)
                    .map_or(0, |due| due.wrapping_sub(count));

                self.rcp.ai.remaining(left)
            }
            Some(reg) => self.rcp.ai.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_ai(&mut self, offset: u32, value: u32, mask: u32) {
        let Some(reg) = Reg::from_offset(offset) else {
            return;
        };

        let value = write_masked(self.rcp.ai.read(reg), value, mask);
        match reg {
            Reg::Len => {
                self.rcp.ai.write(reg, value);
                self.queue_audio(value);
            }
            Reg::Status => self.lower_rcp(Interrupt::Ai),
            Reg::DacRate => {
                if self.rcp.ai.write(reg, value) {
                    let dacrate = self.rcp.ai.read(reg);
                    self.plugins.audio.dacrate_changed(self.rom.standard, dacrate);
                }
            }
            Reg::DramAddr | Reg::Control | Reg::BitRate => {
                self.rcp.ai.write(reg, value);
            }
        }
    }

    /// Hands a buffer of `length` bytes to the AI and the audio collaborator.
    fn queue_audio(&mut self, length: u32) {
        let dacrate = self.rcp.ai.read(Reg::DacRate);
        if dacrate == 0 {
            warn!(target: "ai", "buffer of {length} bytes queued with a zero DAC rate");
            return;
        }

        let frequency = u64::from(self.rom.standard.dac_clock() / (dacrate + 1));
        let delay = u64::from(length)
            .saturating_mul(u64::from(self.rcp.vi.delay))
            .saturating_mul(u64::from(self.rom.standard.refresh_rate()))
            / (frequency * 4).max(1);
        let delay = u32::try_from(delay).unwrap_or(u32::MAX);

        trace!(target: "ai", "queued {length} bytes, playing for {delay} COUNT units");

        if self.rcp.ai.push(Dma { length, delay }) {
            self.update_count();
            let count = self.count();
            self.scheduler.add(Event::Ai, delay, count);
        }

        let dram = (self.rcp.ai.read(Reg::DramAddr) & 0x00FF_FFFF) as usize;
        let samples = self
            .memory
            .rdram
            .get(dram..dram + length as usize)
            .unwrap_or_default();
        self.plugins.audio.length_changed(samples);
    }
}

#[cfg(test)]
mod test {
    use crate::{cpu::test::machine, scheduler::Event};
    use rumble_core::rcp::{ai, mi::Interrupt};

    #[test]
    fn zero_dacrate_queues_nothing() {
        let mut machine = machine();
        machine.write_ai(0x04, 0x1000, u32::MAX);

        assert!(!machine.rcp.ai.busy());
        assert_eq!(machine.scheduler.time_of(Event::Ai), None);
        assert_eq!(machine.read_ai(0x04), 0);
    }

    #[test]
    fn widest_dacrate_still_queues() {
        let mut machine = machine();
        machine.write_ai(0x10, u32::MAX, u32::MAX);
        assert_eq!(machine.read_ai(0x10), ai::DACRATE_MASK);

        machine.write_ai(0x04, 0x1000, u32::MAX);
        assert!(machine.rcp.ai.busy());
        assert!(machine.scheduler.time_of(Event::Ai).is_some());
    }

    #[test]
    fn second_buffer_fills_the_fifo() {
        let mut machine = machine();
        machine.write_ai(0x10, 0x3E52, u32::MAX);
        machine.write_ai(0x04, 0x1000, u32::MAX);

        assert!(machine.rcp.ai.busy());
        let due = machine.scheduler.time_of(Event::Ai);
        assert!(due.is_some());

        machine.write_ai(0x04, 0x800, u32::MAX);
        assert_eq!(
            machine.rcp.ai.status(),
            ai::status::BUSY | ai::status::FULL
        );
        // the second buffer doesn't move the completion
        assert_eq!(machine.scheduler.time_of(Event::Ai), due);
        assert_eq!(machine.read_ai(0x04), 0x1000);
    }

    #[test]
    fn status_write_acknowledges() {
        let mut machine = machine();
        machine.rcp.mi.raise(Interrupt::Ai);
        machine.write_ai(0x0C, 0, u32::MAX);
        assert_eq!(machine.rcp.mi.intr & Interrupt::Ai.bit(), 0);
    }
}
