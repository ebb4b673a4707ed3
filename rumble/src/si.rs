//! The serial interface and the PIF: controller and EEPROM commands.

use crate::{Machine, scheduler::Event};
use rumble_core::{
    mem::PIF_RAM_START,
    pif::{self, COMMAND_BOOT_DONE, COMMAND_CHALLENGE, EEPROM_CHANNEL, RAM_LEN},
    rcp::{
        mi::Interrupt,
        si::{Reg, status},
    },
    write_masked,
};
use tracing::{trace, warn};

/// Delay of an SI DMA completion.
const DMA_DELAY: u32 = 0x900;
/// Delay of the SI interrupt following the end of the boot sequence.
const BOOT_DONE_DELAY: u32 = 0x15A;

/// Bit of the receive length byte set when nothing answered on the channel.
const NO_RESPONSE: u8 = 0x80;
/// Bit of the receive length byte set when the transfer length is wrong.
const BAD_LENGTH: u8 = 0x40;

mod command {
    pub const STATUS: u8 = 0x00;
    pub const READ_BUTTONS: u8 = 0x01;
    pub const READ_EEPROM: u8 = 0x04;
    pub const WRITE_EEPROM: u8 = 0x05;
    pub const RESET: u8 = 0xFF;
}

/// Which side of an SI DMA a walk of the PIF RAM happens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// The CPU just filled the PIF RAM.
    Write,
    /// The CPU is about to read the PIF RAM back.
    Read,
}

impl Machine {
    pub(crate) fn read_si(&mut self, offset: u32) -> u32 {
        match Reg::from_offset(offset) {
            Some(reg) => self.rcp.si.read(reg),
            None => 0,
        }
    }

    pub(crate) fn write_si(&mut self, offset: u32, value: u32, mask: u32) {
        let Some(reg) = Reg::from_offset(offset) else {
            return;
        };

        match reg {
            Reg::PifAddrRd64b => {
                self.rcp.si.write(reg, value & mask);
                self.check_pif_address(value & mask);

                self.walk_pif(Walk::Read);
                let dram = (self.rcp.si.read(Reg::DramAddr) & 0x00FF_FFFF) as usize;
                if let Some(buf) = self.memory.rdram.get_mut(dram..dram + RAM_LEN) {
                    buf.copy_from_slice(&self.pif.ram);
                }

                self.complete_si();
            }
            Reg::PifAddrWr64b => {
                self.rcp.si.write(reg, value & mask);
                self.check_pif_address(value & mask);

                let dram = (self.rcp.si.read(Reg::DramAddr) & 0x00FF_FFFF) as usize;
                if let Some(buf) = self.memory.rdram.get(dram..dram + RAM_LEN) {
                    self.pif.ram.copy_from_slice(buf);
                }

                self.pif_ram_written();
                self.complete_si();
            }
            Reg::Status => {
                self.rcp.si.acknowledge();
                self.lower_rcp(Interrupt::Si);
            }
            _ => {
                let current = self.rcp.si.read(reg);
                self.rcp.si.write(reg, write_masked(current, value, mask));
            }
        }
    }

    fn check_pif_address(&self, addr: u32) {
        if addr != PIF_RAM_START {
            warn!(target: "si", "SI DMA with PIF address 0x{addr:08X}");
        }
    }

    fn complete_si(&mut self) {
        if self.config.delay_si {
            let current = self.rcp.si.read(Reg::Status);
            self.rcp.si.write(Reg::Status, current | status::DMA_BUSY);
            self.update_count();
            let count = self.count();
            self.scheduler.add(Event::Si, DMA_DELAY, count);
        } else {
            self.rcp.si.complete();
            self.rcp.mi.raise(Interrupt::Si);
            self.check_interrupt();
        }
    }

    /// Handles a write to the word of the PIF RAM holding the command byte.
    pub(crate) fn pif_ram_written(&mut self) {
        match self.pif.command() {
            COMMAND_CHALLENGE => {
                trace!(target: "si", "answering the CIC challenge");
                self.pif.answer_challenge();
            }
            COMMAND_BOOT_DONE => {
                self.pif.ram[pif::COMMAND] = 0;
                self.update_count();
                let count = self.count();
                self.scheduler.add(Event::Si, BOOT_DONE_DELAY, count);
            }
            command if command > 1 => {
                warn!(target: "si", "unknown PIF command 0x{command:02X}");
            }
            _ => self.walk_pif(Walk::Write),
        }
    }

    fn walk_pif(&mut self, walk: Walk) {
        let controllers = self.plugins.input.controllers();
        let input = &mut self.plugins.input;
        let eeprom = &mut self.cart.eeprom;

        self.pif.for_each_command(|channel, block| {
            if block.len() < 3 {
                return;
            }

            match (channel, walk) {
                (0..4, Walk::Write) => {
                    let controller = controllers[channel];
                    match block[2] {
                        command::STATUS | command::RESET => {
                            if block[1] & NO_RESPONSE != 0 || block.len() < 6 {
                                return;
                            }

                            if controller.present {
                                block[3] = 0x05;
                                block[4] = 0x00;
                                block[5] = u8::from(controller.pak);
                            } else {
                                block[1] |= NO_RESPONSE;
                            }
                        }
                        command::READ_BUTTONS => {
                            if !controller.present {
                                block[1] |= NO_RESPONSE;
                            }
                        }
                        command => trace!(
                            target: "si",
                            "skipped controller command 0x{command:02X} on channel {channel}"
                        ),
                    }
                }
                (0..4, Walk::Read) => {
                    if block[2] == command::READ_BUTTONS
                        && controllers[channel].present
                        && block.len() >= 7
                    {
                        let buttons = input.buttons(channel);
                        block[3..7].copy_from_slice(&buttons.to_bits().to_be_bytes());
                    }
                }
                (EEPROM_CHANNEL, Walk::Write) => match block[2] {
                    command::STATUS | command::RESET => {
                        if block[1] != 3 || block.len() < 6 {
                            block[1] |= BAD_LENGTH;
                            return;
                        }

                        block[3] = 0x00;
                        block[4] = eeprom.type_byte();
                        block[5] = 0x00;
                    }
                    command::READ_EEPROM => {
                        if let Some(data) = block.get_mut(3..12) {
                            let (index, buf) = data.split_at_mut(1);
                            eeprom.read_block(usize::from(index[0]), buf);
                        }
                    }
                    command::WRITE_EEPROM => {
                        if let Some(data) = block.get(3..12) {
                            eeprom.write_block(usize::from(data[0]), &data[1..]);
                        }
                    }
                    command => warn!(target: "si", "unknown EEPROM command 0x{command:02X}"),
                },
                _ => (),
            }
        });
    }
}

#[cfg(test)]
mod test {
    use crate::{cpu::test::machine, scheduler::Event};
    use rumble_core::{
        mem::PIF_RAM_START,
        pif::COMMAND,
        rcp::{mi::Interrupt, si},
    };

    /// Writes `frame` into RDRAM at 0x1000 and DMAs it to the PIF.
    fn send(machine: &mut crate::Machine, frame: &[u8]) {
        machine.memory.rdram[0x1000..0x1040].fill(0);
        machine.memory.rdram[0x1000..0x1000 + frame.len()].copy_from_slice(frame);
        machine.write_si(0x00, 0x1000, u32::MAX);
        machine.write_si(0x10, PIF_RAM_START, u32::MAX);
    }

    fn receive(machine: &mut crate::Machine) -> [u8; 64] {
        machine.write_si(0x00, 0x2000, u32::MAX);
        machine.write_si(0x04, PIF_RAM_START, u32::MAX);

        let mut buf = [0; 64];
        buf.copy_from_slice(&machine.memory.rdram[0x2000..0x2040]);
        buf
    }

    #[test]
    fn controller_status() {
        let mut machine = machine();
        machine.config.delay_si = false;

        // channel 0: status, channel 1: status, then the end marker
        let frame = [
            0x01, 0x03, 0x00, 0xFF, 0xFF, 0xFF, 0x01, 0x03, 0x00, 0xFF, 0xFF, 0xFF, 0xFE,
        ];
        send(&mut machine, &frame);
        let response = receive(&mut machine);

        assert_eq!(&response[..6], &[0x01, 0x03, 0x00, 0x05, 0x00, 0x00]);
        // nothing plugged on channel 1
        assert_eq!(response[7], 0x83);
        assert_ne!(machine.rcp.mi.intr & Interrupt::Si.bit(), 0);
        assert_ne!(machine.rcp.si.read(si::Reg::Status) & si::status::INTERRUPT, 0);
    }

    #[test]
    fn controller_buttons() {
        let mut machine = machine();
        machine.config.delay_si = false;

        let frame = [0x01, 0x04, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE];
        send(&mut machine, &frame);
        let response = receive(&mut machine);

        // the null input presses nothing
        assert_eq!(&response[3..7], &[0, 0, 0, 0]);
    }

    #[test]
    fn eeprom_blocks() {
        let mut machine = machine();
        machine.config.delay_si = false;

        // skip the four controller channels
        let mut frame = vec![0x00, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0x0A, 0x01, 0x05, 0x02, 1, 2, 3, 4, 5, 6, 7, 8, 0x00, 0xFE]);
        send(&mut machine, &frame);

        let mut frame = vec![0x00, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0x02, 0x08, 0x04, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0xFE]);
        send(&mut machine, &frame);
        let response = receive(&mut machine);

        assert_eq!(&response[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn eeprom_status() {
        let mut machine = machine();
        machine.config.delay_si = false;

        let mut frame = vec![0x00, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0x01, 0x03, 0x00, 0xFF, 0xFF, 0xFF, 0xFE]);
        send(&mut machine, &frame);
        let response = receive(&mut machine);

        assert_eq!(&response[7..10], &[0x00, 0x80, 0x00]);
    }

    #[test]
    fn delayed_completion() {
        let mut machine = machine();
        send(&mut machine, &[0xFE]);

        assert_eq!(machine.rcp.mi.intr & Interrupt::Si.bit(), 0);
        let count = machine.count();
        assert_eq!(machine.scheduler.time_of(Event::Si), Some(count.wrapping_add(0x900)));

        machine.write_si(0x18, 0, u32::MAX);
        assert_eq!(machine.rcp.si.read(si::Reg::Status) & si::status::INTERRUPT, 0);
    }

    #[test]
    fn boot_done_schedules_an_interrupt() {
        let mut machine = machine();
        machine.pif.ram[COMMAND] = 0x08;
        machine.pif_ram_written();

        assert_eq!(machine.pif.ram[COMMAND], 0);
        let count = machine.count();
        assert_eq!(machine.scheduler.time_of(Event::Si), Some(count.wrapping_add(0x15A)));
    }

    #[test]
    fn challenge_is_answered() {
        let mut machine = machine();
        machine.pif.ram[0x30..0x3F].fill(0x11);
        machine.pif.ram[COMMAND] = 0x02;
        machine.pif_ram_written();

        assert_eq!(machine.pif.ram[COMMAND], 0);
        assert_ne!(&machine.pif.ram[0x30..0x3F], &[0x11; 15]);
    }
}
