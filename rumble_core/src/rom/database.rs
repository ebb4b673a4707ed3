//! The per-title database: timing overrides, save media and patches, keyed by the header CRCs.
//!
//! The database is a RON list of entries:
//!
//! ```ron
//! [
//!     (
//!         crc1: 0x12345678,
//!         crc2: 0x9ABCDEF0,
//!         name: "SOME GAME",
//!         count_per_op: 3,
//!         save_type: "flash_ram",
//!         patches: [(address: 0x8000_1234, value: 0x2400, size: "half", class: "live")],
//!     ),
//! ]
//! ```
//!
//! Every field but the CRCs and the name is optional. Entries that fail to deserialize are skipped
//! with a warning.

use easyerr::Error;
use serde::Deserialize;
use strum::{EnumString, IntoStaticStr};
use tracing::warn;

/// The save medium of a cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, EnumString, IntoStaticStr)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case")]
pub enum SaveType {
    /// Detected from the first accesses to cartridge domain 2.
    #[default]
    Auto,
    None,
    Eeprom4k,
    Eeprom16k,
    Sram,
    FlashRam,
}

impl TryFrom<String> for SaveType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Width of a patch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, EnumString)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case")]
pub enum PatchSize {
    Byte,
    Half,
}

impl TryFrom<String> for PatchSize {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// When a patch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, EnumString)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case")]
pub enum PatchClass {
    /// Applied on each of the first 60 VIs.
    Boot,
    /// Applied on every VI after the first 60.
    Live,
}

impl TryFrom<String> for PatchClass {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A write to RDRAM applied every VI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Patch {
    /// Virtual address in one of the direct segments.
    pub address: u32,
    pub value: u16,
    pub size: PatchSize,
    pub class: PatchClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entry {
    pub crc1: u32,
    pub crc2: u32,
    pub name: String,
    /// COUNT increment per instruction. Zero keeps the configured value.
    #[serde(default)]
    pub count_per_op: u32,
    #[serde(default)]
    pub save_type: SaveType,
    #[serde(default)]
    pub patches: Vec<Patch>,
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid database document")]
    Parse { source: ron::error::SpannedError },
}

#[derive(Debug, Clone, Default)]
pub struct Database {
    pub entries: Vec<Entry>,
}

impl Database {
    /// Parses a database document. Only a document that is not a RON list at all is an error.
    pub fn parse(text: &str) -> Result<Self, DatabaseError> {
        let values: Vec<ron::Value> =
            ron::from_str(text).map_err(|source| DatabaseError::Parse { source })?;

        let entries = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match value.into_rust::<Entry>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(target: "rom", "skipping malformed database entry #{index}: {e}");
                    None
                }
            })
            .collect();

        Ok(Self { entries })
    }

    /// Finds the entry of the title with the given header CRCs.
    pub fn lookup(&self, crc1: u32, crc2: u32) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.crc1 == crc1 && entry.crc2 == crc2)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DOCUMENT: &str = r#"[
        (
            crc1: 0x12345678,
            crc2: 0x9ABCDEF0,
            name: "RUMBLE TEST",
            count_per_op: 1,
            save_type: "flash_ram",
            patches: [
                (address: 0x80001234, value: 0x2400, size: "half", class: "live"),
            ],
        ),
        (
            crc1: "not a number",
            crc2: 0,
            name: "BROKEN",
        ),
        (
            crc1: 1,
            crc2: 2,
            name: "MINIMAL",
        ),
    ]"#;

    #[test]
    fn skips_malformed_entries() {
        let database = Database::parse(DOCUMENT).unwrap();
        assert_eq!(database.entries.len(), 2);

        let entry = database.lookup(0x1234_5678, 0x9ABC_DEF0).unwrap();
        assert_eq!(entry.count_per_op, 1);
        assert_eq!(entry.save_type, SaveType::FlashRam);
        assert_eq!(
            entry.patches,
            vec![Patch {
                address: 0x8000_1234,
                value: 0x2400,
                size: PatchSize::Half,
                class: PatchClass::Live,
            }]
        );

        let minimal = database.lookup(1, 2).unwrap();
        assert_eq!(minimal.save_type, SaveType::Auto);
        assert!(minimal.patches.is_empty());
    }

    #[test]
    fn rejects_non_lists() {
        assert!(Database::parse("42").is_err());
        assert!(Database::parse("[").is_err());
    }
}
