//! The cartridge: save media on domain 2, the EEPROM behind the PIF and the ROM write latch.

pub mod flash;

use easyerr::{Error, ResultExt};
use flash::FlashRam;
use rumble_core::rom::database::SaveType;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};
use tracing::{debug, warn};

/// Size of the battery backed SRAM.
pub const SRAM_LEN: usize = 32 * bytesize::KIB as usize;
/// Size of the flash RAM.
pub const FLASH_LEN: usize = 128 * bytesize::KIB as usize;
/// Size of the 4Kbit EEPROM.
pub const EEPROM_4K_LEN: usize = 512;
/// Size of the 16Kbit EEPROM.
pub const EEPROM_16K_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("couldn't open save file {path:?}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't access save file")]
    Io { source: std::io::Error },
}

/// Storage of a save medium, addressed by byte offset.
pub trait SaveMedium: Send {
    /// Reads `buf.len()` bytes at `offset`. Bytes past the end of the storage read as zero.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), SaveError>;

    /// Writes `data` at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), SaveError>;
}

/// A save medium kept in memory.
#[derive(Debug, Clone)]
pub struct MemorySave {
    pub data: Vec<u8>,
}

impl MemorySave {
    pub fn new(len: usize) -> Self {
        Self { data: vec![0; len] }
    }
}

impl SaveMedium for MemorySave {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), SaveError> {
        buf.fill(0);
        if let Some(src) = self.data.get(offset..) {
            let len = src.len().min(buf.len());
            buf[..len].copy_from_slice(&src[..len]);
        }

        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), SaveError> {
        let end = offset + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }

        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }
}

/// A save medium backed by a file, opened (and created if needed) on first access.
#[derive(Debug)]
pub struct FileSave {
    path: PathBuf,
    file: Option<File>,
}

impl FileSave {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn file(&mut self) -> Result<&mut File, SaveError> {
        match &mut self.file {
            Some(file) => Ok(file),
            slot => {
                debug!(target: "cart", "opening save file {:?}", self.path);
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&self.path)
                    .context(SaveCtx::Open {
                        path: self.path.clone(),
                    })?;

                Ok(slot.insert(file))
            }
        }
    }
}

impl SaveMedium for FileSave {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), SaveError> {
        let file = self.file()?;
        buf.fill(0);

        file.seek(SeekFrom::Start(offset as u64))
            .context(SaveCtx::Io)?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]).context(SaveCtx::Io)? {
                0 => break,
                n => filled += n,
            }
        }

        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), SaveError> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset as u64))
            .context(SaveCtx::Io)?;
        file.write_all(data).context(SaveCtx::Io)?;
        file.flush().context(SaveCtx::Io)
    }
}

/// Logs a failed save medium access. Bus accesses never fail, so errors end here.
pub(crate) fn log_error(medium: &str, result: Result<(), SaveError>) {
    if let Err(e) = result {
        warn!(target: "cart", "{medium} access failed: {e}");
    }
}

/// What lives on cartridge domain 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain2 {
    /// Not known yet: decided by the first access.
    Unknown,
    Sram,
    Flash,
}

/// The EEPROM, accessed through PIF channel 4.
pub struct Eeprom {
    pub len: usize,
    pub medium: Box<dyn SaveMedium>,
}

impl std::fmt::Debug for Eeprom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eeprom")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl Eeprom {
    /// Value of the type byte of the status response.
    pub fn type_byte(&self) -> u8 {
        if self.len == EEPROM_16K_LEN { 0xC0 } else { 0x80 }
    }

    /// Reads the 8 byte block `block`.
    pub fn read_block(&mut self, block: usize, buf: &mut [u8]) {
        if (block + 1) * 8 > self.len {
            warn!(target: "cart", "EEPROM read of block {block} out of range");
            return;
        }

        log_error("EEPROM", self.medium.read(block * 8, buf));
    }

    /// Writes the 8 byte block `block`.
    pub fn write_block(&mut self, block: usize, data: &[u8]) {
        if (block + 1) * 8 > self.len {
            warn!(target: "cart", "EEPROM write of block {block} out of range");
            return;
        }

        log_error("EEPROM", self.medium.write(block * 8, data));
    }
}

/// Where the save media of a cartridge are stored.
#[derive(Debug, Clone)]
pub enum SaveStorage {
    Memory,
    /// Files in this directory, named after the game.
    Directory { dir: PathBuf, name: String },
}

impl SaveStorage {
    fn medium(&self, extension: &str, len: usize) -> Box<dyn SaveMedium> {
        match self {
            SaveStorage::Memory => Box::new(MemorySave::new(len)),
            SaveStorage::Directory { dir, name } => {
                Box::new(FileSave::new(dir.join(format!("{name}.{extension}"))))
            }
        }
    }
}

/// The cartridge.
pub struct Cart {
    pub domain2: Domain2,
    pub sram: Box<dyn SaveMedium>,
    pub flash: FlashRam,
    pub eeprom: Eeprom,
    /// Last value written to the ROM window, returned by the next ROM read.
    pub latch: Option<u32>,
}

impl std::fmt::Debug for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("domain2", &self.domain2)
            .field("flash", &self.flash)
            .field("eeprom", &self.eeprom)
            .field("latch", &self.latch)
            .finish_non_exhaustive()
    }
}

impl Cart {
    pub fn new(save_type: SaveType, storage: &SaveStorage) -> Self {
        let domain2 = match save_type {
            SaveType::Sram => Domain2::Sram,
            SaveType::FlashRam => Domain2::Flash,
            _ => Domain2::Unknown,
        };

        let eeprom_len = if save_type == SaveType::Eeprom16k {
            EEPROM_16K_LEN
        } else {
            EEPROM_4K_LEN
        };

        Self {
            domain2,
            sram: storage.medium("sra", SRAM_LEN),
            flash: FlashRam::new(storage.medium("fla", FLASH_LEN)),
            eeprom: Eeprom {
                len: eeprom_len,
                medium: storage.medium("eep", eeprom_len),
            },
            latch: None,
        }
    }

    /// Decides what lives on domain 2 on the first access, if not decided yet.
    pub fn detect(&mut self, kind: Domain2) -> Domain2 {
        if self.domain2 == Domain2::Unknown {
            debug!(target: "cart", "detected {kind:?} on domain 2");
            self.domain2 = kind;
        }

        self.domain2
    }

    /// Handles a word read from domain 2.
    pub fn read_domain2(&mut self, offset: u32) -> u32 {
        match self.detect(Domain2::Flash) {
            Domain2::Flash => self.flash.read_status(offset),
            _ => 0,
        }
    }

    /// Handles a word write to domain 2.
    pub fn write_domain2(&mut self, offset: u32, value: u32, rdram: &[u8]) {
        if offset >= flash::COMMAND_OFFSET {
            match self.detect(Domain2::Flash) {
                Domain2::Flash => self.flash.command(value, rdram),
                _ => warn!(target: "cart", "flash command 0x{value:08X} on a non-flash cartridge"),
            }
        }
    }

    /// Copies from domain 2 to `rdram`, as a PI DMA.
    pub fn dma_read(&mut self, cart_addr: u32, rdram: &mut [u8]) {
        match self.detect(Domain2::Sram) {
            Domain2::Flash => self.flash.dma_read(cart_addr, rdram),
            _ => {
                let offset = (cart_addr & 0xFFFF) as usize;
                log_error("SRAM", self.sram.read(offset, rdram));
            }
        }
    }

    /// Copies `data`, found in RDRAM at `dram_addr`, to domain 2 as a PI DMA.
    pub fn dma_write(&mut self, cart_addr: u32, dram_addr: u32, data: &[u8]) {
        match self.detect(Domain2::Sram) {
            Domain2::Flash => self.flash.dma_write(dram_addr),
            _ => {
                let offset = (cart_addr & 0xFFFF) as usize;
                log_error("SRAM", self.sram.write(offset, data));
            }
        }
    }

    /// Handles a read from the ROM window, consuming the latch if a write left one.
    pub fn read_rom(&mut self, word: u32) -> u32 {
        self.latch.take().unwrap_or(word)
    }

    /// Handles a write to the ROM window.
    pub fn write_rom(&mut self, value: u32) {
        self.latch = Some(value);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_save_zero_fills() {
        let mut save = MemorySave::new(4);
        save.write(2, &[1, 2, 3]).unwrap();

        let mut buf = [0xFF; 8];
        save.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn file_save_is_lazy() {
        let dir = std::env::temp_dir().join(format!("rumble-save-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("lazy.sra");
        let _ = std::fs::remove_file(&path);

        let mut save = FileSave::new(&path);
        assert!(!path.exists());

        let mut buf = [0xAA; 4];
        save.read(16, &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);
        assert!(path.exists());

        save.write(16, &[1, 2, 3, 4]).unwrap();
        save.read(14, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 1, 2]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rom_latch_is_read_once() {
        let mut cart = Cart::new(SaveType::Auto, &SaveStorage::Memory);
        cart.write_rom(0xDEAD_BEEF);
        assert_eq!(cart.read_rom(0x1234), 0xDEAD_BEEF);
        assert_eq!(cart.read_rom(0x1234), 0x1234);
    }

    #[test]
    fn first_dma_selects_sram() {
        let mut cart = Cart::new(SaveType::Auto, &SaveStorage::Memory);
        cart.dma_write(0x0800_0010, 0, &[1, 2, 3, 4]);
        assert_eq!(cart.domain2, Domain2::Sram);

        let mut buf = [0; 4];
        cart.dma_read(0x0800_0010, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);

        // once decided, register accesses don't switch to flash
        assert_eq!(cart.read_domain2(0), 0);
        assert_eq!(cart.domain2, Domain2::Sram);
    }

    #[test]
    fn database_forces_eeprom_size() {
        let cart = Cart::new(SaveType::Eeprom16k, &SaveStorage::Memory);
        assert_eq!(cart.eeprom.len, EEPROM_16K_LEN);
        assert_eq!(cart.eeprom.type_byte(), 0xC0);
    }
}
