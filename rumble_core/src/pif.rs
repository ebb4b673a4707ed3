//! The PIF RAM and its command framing.
//!
//! The 64 bytes of PIF RAM hold a sequence of per-channel command blocks, terminated by the
//! command byte at offset `0x3F`. Each block starts with the number of bytes to transmit and to
//! receive, followed by the command byte and its payload.

/// Size of the PIF RAM.
pub const RAM_LEN: usize = 64;
/// Offset of the PIF command byte.
pub const COMMAND: usize = 0x3F;

/// Channel of the cartridge EEPROM.
pub const EEPROM_CHANNEL: usize = 4;

/// PIF command requesting the CIC-6105 challenge to be answered.
pub const COMMAND_CHALLENGE: u8 = 0x02;
/// PIF command acknowledging the end of the boot sequence.
pub const COMMAND_BOOT_DONE: u8 = 0x08;

#[derive(Debug, Clone)]
pub struct Pif {
    pub ram: [u8; RAM_LEN],
}

impl Default for Pif {
    fn default() -> Self {
        Self { ram: [0; RAM_LEN] }
    }
}

impl Pif {
    #[inline(always)]
    pub fn command(&self) -> u8 {
        self.ram[COMMAND]
    }

    /// Walks the command blocks, calling `f` with the channel and the block (starting at its
    /// transmit length byte) of every command found.
    ///
    /// A zero byte skips to the next channel, `0xFF` is padding, and any other byte with either of
    /// the top two bits set ends the walk.
    pub fn for_each_command(&mut self, mut f: impl FnMut(usize, &mut [u8])) {
        let mut channel = 0;
        let mut i = 0;

        while i < COMMAND {
            match self.ram[i] {
                0x00 => {
                    channel += 1;
                    if channel > 6 {
                        break;
                    }
                }
                0xFF => (),
                tx if tx & 0xC0 == 0 => {
                    let rx = self.ram.get(i + 1).copied().unwrap_or(0) & 0x3F;
                    f(channel, &mut self.ram[i..COMMAND]);

                    i += usize::from(tx) + usize::from(rx) + 1;
                    channel += 1;
                }
                _ => break,
            }

            i += 1;
        }
    }

    /// Answers the CIC-6105 challenge stored at offset `0x30`.
    pub fn answer_challenge(&mut self) {
        let mut challenge = [0u8; 30];
        for i in 0..15 {
            challenge[i * 2] = (self.ram[48 + i] >> 4) & 0x0F;
            challenge[i * 2 + 1] = self.ram[48 + i] & 0x0F;
        }

        let response = cic_6105_response(&challenge);

        self.ram[46] = 0;
        self.ram[47] = 0;
        for i in 0..15 {
            self.ram[48 + i] = (response[i * 2] << 4) | response[i * 2 + 1];
        }

        self.ram[COMMAND] = 0;
    }
}

/// Computes the CIC-6105 response to a challenge, one nibble per byte.
pub fn cic_6105_response(challenge: &[u8; 30]) -> [u8; 30] {
    const LUT0: [u8; 16] = [
        0x4, 0x7, 0xA, 0x7, 0xE, 0x5, 0xE, 0x1, 0xC, 0xF, 0x8, 0xF, 0x6, 0x3, 0x6, 0x9,
    ];
    const LUT1: [u8; 16] = [
        0x4, 0x1, 0xA, 0x7, 0xE, 0x5, 0xE, 0x1, 0xC, 0x9, 0x8, 0x5, 0x6, 0x3, 0xC, 0x9,
    ];

    let mut response = [0u8; 30];
    let mut key = 0xBu8;
    let mut alternate = false;

    for (rsp, &chl) in response.iter_mut().zip(challenge) {
        *rsp = key.wrapping_add(chl.wrapping_mul(5)) & 0xF;
        let lut = if alternate { &LUT1 } else { &LUT0 };
        key = lut[usize::from(*rsp)];

        let sign = (*rsp >> 3) & 1;
        let magnitude = if sign == 1 { !*rsp } else { *rsp } & 0x7;
        let mut modifier = if magnitude % 3 == 1 { sign } else { 1 - sign };

        if alternate {
            match *rsp {
                0x1 | 0x9 => modifier = 1,
                0xB | 0xE => modifier = 0,
                _ => (),
            }
        }

        alternate = modifier == 1;
    }

    response
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn walk_visits_channels() {
        let mut pif = Pif::default();
        // channel 0: status (tx 1, rx 3), channel 1: skipped, channel 2: read buttons
        let frame = [
            0xFF, 0x01, 0x03, 0x00, 0xAA, 0xAA, 0xAA, 0x00, 0x01, 0x04, 0x01, 0xBB, 0xBB, 0xBB,
            0xBB, 0xFE,
        ];
        pif.ram[..frame.len()].copy_from_slice(&frame);

        let mut seen = Vec::new();
        pif.for_each_command(|channel, block| seen.push((channel, block[2])));

        assert_eq!(seen, vec![(0, 0x00), (2, 0x01)]);
    }

    #[test]
    fn walk_stops_at_end_marker() {
        let mut pif = Pif::default();
        pif.ram[0] = 0xFE;
        pif.ram[1] = 0x01;

        let mut count = 0;
        pif.for_each_command(|_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn challenge_clears_command() {
        let mut pif = Pif::default();
        pif.ram[COMMAND] = COMMAND_CHALLENGE;
        pif.ram[48..63].fill(0x5A);
        pif.answer_challenge();

        let nibbles = cic_6105_response(&[0x5, 0xA].repeat(15).try_into().unwrap());
        assert_eq!(pif.command(), 0);
        assert_eq!(pif.ram[48], (nibbles[0] << 4) | nibbles[1]);
        assert_eq!(pif.ram[62], (nibbles[28] << 4) | nibbles[29]);
    }

    #[test]
    fn response_is_nibbles() {
        let challenge = std::array::from_fn(|i| (i * 7 % 16) as u8);
        let response = cic_6105_response(&challenge);
        assert!(response.iter().all(|&n| n < 16));
        assert_eq!(response[0], 0xB);
    }
}
