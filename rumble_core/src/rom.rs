//! Items related to cartridge ROM images.

pub mod database;

use binrw::{BinRead, BinReaderExt};
use easyerr::Error;
use std::io::Cursor;
use strum::IntoStaticStr;

/// Size of the ROM header.
pub const HEADER_LEN: usize = 0x40;
/// End of the boot code (IPL3) in the ROM.
pub const BOOT_CODE_END: usize = 0x1000;

/// Byte order of a ROM image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum ByteOrder {
    /// `.z64`: native big-endian order.
    Big,
    /// `.v64`: every half-word byteswapped.
    ByteSwapped,
    /// `.n64`: every word little-endian.
    Little,
}

impl ByteOrder {
    /// Detects the byte order from the first word of the image.
    pub fn detect(magic: [u8; 4]) -> Option<Self> {
        match magic {
            [0x80, 0x37, 0x12, 0x40] => Some(Self::Big),
            [0x37, 0x80, 0x40, 0x12] => Some(Self::ByteSwapped),
            [0x40, 0x12, 0x37, 0x80] => Some(Self::Little),
            _ => None,
        }
    }

    /// Rewrites `data` in big-endian order.
    pub fn canonicalize(self, data: &mut [u8]) {
        match self {
            Self::Big => (),
            Self::ByteSwapped => data.chunks_exact_mut(2).for_each(|c| c.swap(0, 1)),
            Self::Little => data.chunks_exact_mut(4).for_each(|c| c.reverse()),
        }
    }
}

/// The header at the start of every ROM image.
#[derive(Debug, Clone, BinRead)]
#[br(big)]
pub struct Header {
    /// PI domain 1 timings.
    pub pi_timings: u32,
    pub clock_rate: u32,
    pub entry_point: u32,
    pub release: u32,
    pub crc1: u32,
    pub crc2: u32,
    #[br(pad_before = 8)]
    pub name: [u8; 20],
    #[br(pad_before = 7)]
    pub media_format: u8,
    pub cartridge_id: u16,
    pub country_code: u8,
    pub version: u8,
}

impl Header {
    /// The internal name, without trailing padding.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name)
            .trim_end_matches(['\0', ' '])
            .to_owned()
    }
}

/// The boot chip of a cartridge, which determines the boot seed and a few reset-time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Cic {
    Nus6101,
    Nus6102,
    Nus6103,
    Nus6105,
    Nus6106,
}

impl Cic {
    /// Detects the boot chip from the checksum of the boot code. Unknown boot code is assumed to
    /// be for the 6102, by far the most common chip.
    pub fn detect(rom: &[u8]) -> Self {
        let end = rom.len().min(BOOT_CODE_END);
        let sum = rom
            .get(HEADER_LEN..end)
            .unwrap_or_default()
            .chunks_exact(4)
            .map(|w| u64::from(u32::from_be_bytes([w[0], w[1], w[2], w[3]])))
            .fold(0u64, u64::wrapping_add);

        match sum {
            0x0000_00D0_027F_DF31 | 0x0000_00CF_FB63_1223 => Self::Nus6101,
            0x0000_00D0_57C8_5244 => Self::Nus6102,
            0x0000_00D6_497E_414B => Self::Nus6103,
            0x0000_011A_49F6_0E96 => Self::Nus6105,
            0x0000_00D6_D5BE_5580 => Self::Nus6106,
            _ => Self::Nus6102,
        }
    }

    /// The seed the boot code finds in `S6`.
    pub const fn seed(self) -> u64 {
        match self {
            Self::Nus6101 | Self::Nus6102 => 0x3F,
            Self::Nus6103 => 0x78,
            Self::Nus6105 => 0x91,
            Self::Nus6106 => 0x85,
        }
    }

    /// Offset in RDRAM where the boot code expects the memory size to be stored.
    pub const fn memory_size_offset(self) -> u32 {
        match self {
            Self::Nus6105 => 0x3F0,
            _ => 0x318,
        }
    }
}

/// The video standard of the console a cartridge was released for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum VideoStandard {
    Pal,
    Ntsc,
    Mpal,
}

impl VideoStandard {
    pub fn from_country_code(code: u8) -> Self {
        match code {
            b'D' | b'F' | b'I' | b'P' | b'S' | b'U' | b'X' | b'Y' => Self::Pal,
            b'B' => Self::Mpal,
            _ => Self::Ntsc,
        }
    }

    /// Value the boot code expects in `S4`.
    pub const fn tv_type(self) -> u64 {
        match self {
            Self::Pal => 0,
            Self::Ntsc => 1,
            Self::Mpal => 2,
        }
    }

    /// VIs per second.
    pub const fn refresh_rate(self) -> u32 {
        match self {
            Self::Pal => 50,
            Self::Ntsc | Self::Mpal => 60,
        }
    }

    /// Frequency of the audio DAC clock, in Hz.
    pub const fn dac_clock(self) -> u32 {
        match self {
            Self::Pal => 49_656_530,
            Self::Ntsc => 48_681_812,
            Self::Mpal => 48_628_316,
        }
    }
}

#[derive(Debug, Error)]
pub enum RomError {
    #[error("image is too small ({len} bytes)")]
    TooSmall { len: usize },
    #[error("unknown image byte order (magic {magic:02X?})")]
    UnknownByteOrder { magic: [u8; 4] },
    #[error("malformed header")]
    Header { source: binrw::Error },
}

/// A cartridge ROM image, in big-endian order.
pub struct Rom {
    pub data: Box<[u8]>,
    pub header: Header,
    pub byte_order: ByteOrder,
    pub cic: Cic,
    pub standard: VideoStandard,
}

impl std::fmt::Debug for Rom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rom")
            .field("header", &self.header)
            .field("byte_order", &self.byte_order)
            .field("cic", &self.cic)
            .field("standard", &self.standard)
            .finish_non_exhaustive()
    }
}

#[expect(clippy::len_without_is_empty, reason = "not a collection")]
impl Rom {
    /// Parses a ROM image in any of the three byte orders.
    pub fn new(mut data: Vec<u8>) -> Result<Self, RomError> {
        if data.len() < BOOT_CODE_END {
            return Err(RomError::TooSmall { len: data.len() });
        }

        let magic = [data[0], data[1], data[2], data[3]];
        let byte_order = ByteOrder::detect(magic).ok_or(RomError::UnknownByteOrder { magic })?;
        byte_order.canonicalize(&mut data);

        let header: Header = Cursor::new(&data[..HEADER_LEN])
            .read_be()
            .map_err(|source| RomError::Header { source })?;

        let cic = Cic::detect(&data);
        let standard = VideoStandard::from_country_code(header.country_code);

        Ok(Self {
            data: data.into_boxed_slice(),
            header,
            byte_order,
            cic,
            standard,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Reads the big-endian word at `offset`. Out of range offsets read as zero.
    #[inline(always)]
    pub fn word(&self, offset: u32) -> u32 {
        self.data
            .get(offset as usize..offset as usize + 4)
            .map_or(0, |w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
    }
}
