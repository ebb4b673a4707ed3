//! Servicing of scheduled events and interrupt dispatch.

use crate::{Machine, scheduler::Event};
use rumble_core::{
    cpu::{
        BOOT_VECTOR, Reg,
        cop0::{Cause, Exception},
    },
    mem::Address,
    rcp::{dp, mi::Interrupt, sp},
    rom::database::{PatchClass, PatchSize},
};
use tracing::{trace, warn};

/// VIs during which boot patches apply.
const BOOT_PATCH_FRAMES: u32 = 60;
/// Delay between the reset button press and the NMI.
const NMI_DELAY: u32 = 50_000_000;

impl Machine {
    /// Mirrors the MI interrupt line into CAUSE and, if the CPU would take an interrupt, makes a
    /// check event due right away.
    pub fn check_interrupt(&mut self) {
        let cause = self.cop0.cause();
        let pending = cause.interrupt_pending();
        let pending = if self.rcp.mi.pending() {
            pending | Cause::RCP_INTERRUPT
        } else {
            pending & !Cause::RCP_INTERRUPT
        };

        self.cop0.set_cause(cause.with_interrupt_pending(pending));

        if self.cop0.interrupt_requested() {
            let count = self.count();
            self.scheduler.push_front(Event::Check, count);
        }
    }

    /// Raises an RCP interrupt line from a device completion and dispatches it.
    pub(crate) fn raise_rcp(&mut self, interrupt: Interrupt) {
        trace!(target: "cpu", "raised {} interrupt", <&'static str>::from(interrupt));
        self.rcp.mi.raise(interrupt);
        self.dispatch_rcp();
    }

    /// Lowers an RCP interrupt line after an acknowledge write.
    pub(crate) fn lower_rcp(&mut self, interrupt: Interrupt) {
        self.rcp.mi.lower(interrupt);
        self.check_interrupt();
    }

    fn dispatch_rcp(&mut self) {
        if !self.rcp.mi.pending() {
            return;
        }

        self.cop0
            .set_cause(self.cop0.cause().with_interrupt(Cause::RCP_INTERRUPT));
        self.dispatch_cpu();
    }

    fn dispatch_cpu(&mut self) {
        if self.cop0.interrupt_requested() {
            self.exception(Exception::Interrupt);
        }
    }

    fn apply_patches(&mut self) {
        let class = if self.frames < BOOT_PATCH_FRAMES {
            PatchClass::Boot
        } else {
            PatchClass::Live
        };

        for index in 0..self.patches.len() {
            let patch = self.patches[index];
            if patch.class != class {
                continue;
            }

            let Some(phys) = Address(patch.address).direct() else {
                warn!(target: "rom", "patch at 0x{:08X} is not in a direct segment", patch.address);
                continue;
            };

            match patch.size {
                PatchSize::Byte => self.write_physical(phys, patch.value as u8),
                PatchSize::Half => self.write_physical(phys, patch.value),
            }
        }
    }

    fn vertical_blank(&mut self, time: u32) {
        if self.shared.take_reset() {
            let count = self.count();
            self.scheduler.add(Event::Hw2, 0, count);
            self.scheduler.add(Event::Nmi, NMI_DELAY, count);
        }

        self.apply_patches();
        self.frames = self.frames.wrapping_add(1);

        self.plugins.display.update_screen(&self.memory, &self.rcp.vi);
        self.pacer.frame(&self.shared);

        self.rcp.vi.update_delay(self.config.vi_refresh);
        self.rcp.vi.advance_field();

        let count = self.count();
        let next = time.wrapping_add(self.rcp.vi.delay);
        self.scheduler.add_at(Event::Vi, next, count);

        self.raise_rcp(Interrupt::Vi);
    }

    fn compare(&mut self) {
        let count_per_op = self.count_per_op;
        let compare = self.cop0.compare();

        // the timer event is scheduled one instruction ahead so it sorts after the instruction
        // that reaches COMPARE
        let count = self.count().wrapping_add(count_per_op);
        self.cop0.set_count(count);
        self.scheduler.add_at(Event::Compare, compare, count);
        self.cop0.set_count(count.wrapping_sub(count_per_op));

        self.cop0
            .set_cause(self.cop0.cause().with_interrupt(Cause::TIMER_INTERRUPT));
        self.dispatch_cpu();
    }

    fn non_maskable_reset(&mut self) {
        let status = self.cop0.read(Reg::COP0_STATUS);
        self.cop0
            .write(Reg::COP0_STATUS, (status & !0x0038_0000) | 0x0050_0004);
        self.cop0.write(Reg::COP0_CAUSE, 0);

        self.soft_reset();
        self.cop0.set_count(0);
        self.frames = 0;
        self.scheduler.initialize(0);
        self.rcp.ai.clear_status();

        let mut error_epc = self.cpu.regs.pc;
        if self.cpu.delay_slot {
            error_epc = error_epc.wrapping_sub(4);
        }

        self.cop0.write(Reg::COP0_ERROR_EPC, error_epc);
        self.cpu.delay_slot = false;
        self.cpu.skip_jump = None;
        self.cpu.regs.pc = BOOT_VECTOR;
        self.cpu.last_addr = BOOT_VECTOR;
    }

    /// Services the event at the front of the scheduler. Called when the scheduler is due.
    pub fn fire(&mut self) {
        if self.stopped() {
            self.frames = 0;
            return;
        }

        if let Some(target) = self.cpu.skip_jump.take() {
            self.cpu.regs.pc = target;
            self.cpu.last_addr = target;
            self.scheduler.reschedule();
            return;
        }

        let Some(scheduled) = self.scheduler.pop() else {
            return;
        };

        let Some(event) = scheduled.event() else {
            warn!(
                target: "scheduler",
                "unknown event kind {} due at {}",
                scheduled.kind,
                scheduled.time
            );
            return;
        };

        trace!(target: "scheduler", "firing {} at {}", <&'static str>::from(event), scheduled.time);

        match event {
            Event::Vi => self.vertical_blank(scheduled.time),
            Event::Compare => self.compare(),
            Event::Check => self.exception(Exception::Interrupt),
            Event::Si => {
                self.pif.ram[rumble_core::pif::COMMAND] = 0;
                self.rcp.si.complete();
                self.raise_rcp(Interrupt::Si);
            }
            Event::Pi => {
                self.rcp.pi.finish_dma();
                self.raise_rcp(Interrupt::Pi);
            }
            Event::Bootstrap => {
                let count = self.count();
                self.scheduler.finish_bootstrap(count);
            }
            Event::Ai => {
                if let Some(delay) = self.rcp.ai.pop() {
                    let count = self.count();
                    self.scheduler
                        .add_at(Event::Ai, scheduled.time.wrapping_add(delay), count);
                }

                self.raise_rcp(Interrupt::Ai);
            }
            Event::Sp => {
                self.rcp
                    .sp
                    .set_status_bits(sp::status::HALT | sp::status::BROKE | sp::status::TASK_DONE);

                if self.rcp.sp.status() & sp::status::INTERRUPT_ON_BREAK != 0 {
                    self.raise_rcp(Interrupt::Sp);
                }
            }
            Event::Dp => {
                let status = self.rcp.dpc.read(dp::Reg::Status);
                self.rcp.dpc.write(
                    dp::Reg::Status,
                    (status & !dp::status::FREEZE) | dp::status::XBUS_DMEM_DMA | dp::status::CBUF_READY,
                );
                self.raise_rcp(Interrupt::Dp);
            }
            Event::Hw2 => {
                let status = self.cop0.read(Reg::COP0_STATUS);
                self.cop0
                    .write(Reg::COP0_STATUS, (status & !0x0038_0000) | 0x1000);
                self.cop0
                    .set_cause(self.cop0.cause().with_interrupt(Cause::RESET_INTERRUPT));
                self.exception(Exception::Interrupt);
            }
            Event::Nmi => self.non_maskable_reset(),
        }
    }
}
