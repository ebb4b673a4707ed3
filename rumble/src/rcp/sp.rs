use crate::{Machine, plugin::Task, scheduler::Event};
use rumble_core::rcp::{
    mi::Interrupt,
    sp::{DmaShape, Reg},
};
use tracing::{debug, trace};

/// Direction of an RSP DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToSpMem,
    ToRdram,
}

impl Machine {
    pub(crate) fn read_sp(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(Reg::Semaphore) => self.rcp.sp.read_semaphore(),
            Some(reg) => self.rcp.sp.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_sp(&mut self, offset: u32, value: u32, mask: u32) {
        let Some(reg) = Reg::from_offset(offset) else {
            return;
        };

        match reg {
            Reg::MemAddr | Reg::DramAddr => {
                let current = self.rcp.sp.read(reg);
                self.rcp
                    .sp
                    .write(reg, rumble_core::write_masked(current, value, mask));
            }
            Reg::RdLen => {
                self.rcp.sp.write(reg, value & mask);
                self.sp_dma(Direction::ToSpMem);
            }
            Reg::WrLen => {
                self.rcp.sp.write(reg, value & mask);
                self.sp_dma(Direction::ToRdram);
            }
            Reg::Status => {
                let effect = self.rcp.sp.write_status(value & mask);
                if effect.clear_interrupt {
                    self.rcp.mi.lower(Interrupt::Sp);
                }

                if effect.set_interrupt {
                    self.rcp.mi.raise(Interrupt::Sp);
                }

                self.check_interrupt();

                if effect.resume {
                    self.prepare_rsp();
                }
            }
            Reg::Semaphore => self.rcp.sp.write(Reg::Semaphore, 0),
            Reg::DmaFull | Reg::DmaBusy => (),
        }
    }

    fn sp_dma(&mut self, direction: Direction) {
        let len_reg = match direction {
            Direction::ToSpMem => Reg::RdLen,
            Direction::ToRdram => Reg::WrLen,
        };

        let shape = DmaShape::decode(self.rcp.sp.read(len_reg));
        let mem_addr = self.rcp.sp.read(Reg::MemAddr) & 0x1FFF;
        let bank = mem_addr & 0x1000;
        let mut mem = mem_addr & 0xFFF;
        let mut dram = self.rcp.sp.read(Reg::DramAddr) & 0x00FF_FFF8;

        trace!(
            target: "sp",
            "{direction:?} DMA: mem 0x{mem_addr:04X}, dram 0x{dram:06X}, {}x{} bytes, skip {}",
            shape.count,
            shape.length,
            shape.skip
        );

        for _ in 0..shape.count {
            for _ in 0..shape.length {
                let sp_index = (bank | mem) as usize;
                if let Some(byte) = self.memory.rdram.get_mut(dram as usize) {
                    match direction {
                        Direction::ToSpMem => self.memory.sp_mem[sp_index] = *byte,
                        Direction::ToRdram => *byte = self.memory.sp_mem[sp_index],
                    }
                }

                mem = (mem + 1) & 0xFFF;
                dram = dram.wrapping_add(1);
            }

            dram = dram.wrapping_add(shape.skip);
        }

        self.rcp.sp.write(Reg::MemAddr, bank | mem);
        self.rcp.sp.write(Reg::DramAddr, dram);
    }

    /// Runs the task found in DMEM through the RSP collaborator and schedules its completion.
    pub(crate) fn prepare_rsp(&mut self) {
        let task = Task::from_type(self.memory.dmem_word(Task::TYPE_OFFSET));

        if task == Task::Graphics && self.rcp.dpc.frozen() {
            debug!(target: "sp", "graphics task waits for the RDP to unfreeze");
            self.rsp_task_locked = true;
            return;
        }

        debug!(target: "sp", "running {} task", <&'static str>::from(task));
        let signals = self
            .plugins
            .rsp
            .run(task, &mut self.memory, &mut self.rcp);
        self.update_count();

        let count = self.count();
        if signals.sp_interrupt {
            let delay = match task {
                Task::Graphics => 1000,
                Task::Audio => 4000,
                Task::Other => 0,
            };

            self.scheduler.add(Event::Sp, delay, count);
        }

        if task == Task::Graphics && signals.dp_interrupt {
            self.scheduler.add(Event::Dp, 1000, count);
        }

        let clear = match task {
            Task::Graphics | Task::Audio => 0x303,
            Task::Other => 0x203,
        };

        self.rcp
            .sp
            .write(Reg::Status, self.rcp.sp.status() & !clear);
    }
}

#[cfg(test)]
mod test {
    use crate::{cpu::test::machine, scheduler::Event};
    use rumble_core::rcp::{dp, sp};

    #[test]
    fn dma_to_dmem_and_back() {
        let mut machine = machine();
        for (i, byte) in machine.memory.rdram[0x1000..0x1010].iter_mut().enumerate() {
            *byte = i as u8;
        }

        machine.write_sp(0x00, 0x0000_0FF8, u32::MAX);
        machine.write_sp(0x04, 0x0000_1000, u32::MAX);
        // two rows of 8 bytes, wrapping around the end of DMEM
        machine.write_sp(0x08, 0x0000_1007, u32::MAX);

        assert_eq!(&machine.memory.sp_mem[0xFF8..0x1000], &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(&machine.memory.sp_mem[0..8], &[8, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(machine.rcp.sp.read(sp::Reg::MemAddr), 0x008);

        machine.write_sp(0x00, 0x0000_0000, u32::MAX);
        machine.write_sp(0x04, 0x0000_2000, u32::MAX);
        machine.write_sp(0x0C, 0x0000_0007, u32::MAX);
        assert_eq!(&machine.memory.rdram[0x2000..0x2008], &[8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn dma_skip_advances_rdram() {
        let mut machine = machine();
        machine.memory.rdram[0x3000..0x3008].fill(0xAA);
        machine.memory.rdram[0x3010..0x3018].fill(0xBB);

        machine.write_sp(0x00, 0x0000_1000, u32::MAX);
        machine.write_sp(0x04, 0x0000_3000, u32::MAX);
        machine.write_sp(0x08, 0x0080_1007, u32::MAX);

        assert_eq!(&machine.memory.sp_mem[0x1000..0x1008], &[0xAA; 8]);
        assert_eq!(&machine.memory.sp_mem[0x1008..0x1010], &[0xBB; 8]);
    }

    #[test]
    fn semaphore() {
        let mut machine = machine();
        assert_eq!(machine.read_sp(0x1C), 0);
        assert_eq!(machine.read_sp(0x1C), 1);
        machine.write_sp(0x1C, 0xFFFF_FFFF, u32::MAX);
        assert_eq!(machine.read_sp(0x1C), 0);
    }

    #[test]
    fn resuming_runs_the_task() {
        let mut machine = machine();
        machine.memory.sp_mem[0xFC0..0xFC4].copy_from_slice(&2u32.to_be_bytes());

        // clear halt
        machine.write_sp(0x10, 1, u32::MAX);

        assert_eq!(machine.rcp.sp.status() & sp::status::HALT, 0);
        let count = machine.count();
        assert_eq!(machine.scheduler.time_of(Event::Sp), Some(count.wrapping_add(4000)));
    }

    #[test]
    fn frozen_rdp_locks_graphics_tasks() {
        let mut machine = machine();
        machine.memory.sp_mem[0xFC0..0xFC4].copy_from_slice(&1u32.to_be_bytes());
        machine.rcp.dpc.write_status(1 << 3);

        machine.write_sp(0x10, 1, u32::MAX);
        assert!(machine.rsp_task_locked);
        assert_eq!(machine.scheduler.time_of(Event::Sp), None);

        // unfreezing restarts the task
        machine.write_dpc(0x0C, 1 << 2, u32::MAX);
        assert!(!machine.rsp_task_locked);
        assert!(!machine.rcp.dpc.frozen());
        assert!(machine.scheduler.time_of(Event::Sp).is_some());
        assert!(machine.scheduler.time_of(Event::Dp).is_some());
        assert_eq!(machine.rcp.dpc.read(dp::Reg::Start), 0);
    }
}
