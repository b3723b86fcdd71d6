//! Read-only lookup of localized strings from Aurora talk tables (`.tlk` files).
//!
//! GFF localized-string fields store a 32-bit string ref. The two high bits are reserved;
//! bit 24 selects the module's custom table over the game's default table, and the low
//! 24 bits index into the selected table.

use std::{
    fs,
    io::SeekFrom,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use bitflags::bitflags;
use thiserror::Error;
use tracing::debug;

use aurorakit_core::{
    binary::Deserializer, serializable_bitflags, string::FixedString, tag::FileTag, Deserialize,
    Serialize,
};

pub const TLK_TAG: FileTag = FileTag::new(b"TLK ");
pub const TLK_VERSION: FileTag = FileTag::new(b"V3.0");

/// String ref sentinel meaning "no string". Compared as an unsigned 32-bit value.
pub const NO_STRING_REF: u32 = 0xFFFF_FFFF;

const CUSTOM_TABLE_BIT: u32 = 0x0100_0000;
const INDEX_MASK: u32 = 0x00FF_FFFF;

const HEADER_BYTE_LENGTH: u64 = 20;
const ELEMENT_BYTE_LENGTH: u64 = 40;

#[derive(Debug, Error)]
pub enum TlkError {
    #[error("{}: not a talk table (tag {tag:?}, version {version:?})", .path.display())]
    Format {
        path: PathBuf,
        tag: FileTag,
        version: FileTag,
    },
    #[error("string ref index {index} is out of range (table holds {count} entries)")]
    OutOfRange { index: u32, count: u32 },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct TalkTableHeader {
    file_type: FileTag,
    version: FileTag,
    language_id: u32,
    string_count: u32,
    string_entries_offset: u32,
}

/// One element of the string data table. 40 bytes on disk; only the flags and the
/// offset/size pair are consumed, the sound fields are carried for layout only.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct StringDataElement {
    flags: StringFlags,
    sound_resref: FixedString<16>,
    volume_variance: u32,
    pitch_variance: u32,
    offset_to_string: u32,
    string_size: u32,
    sound_length: f32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StringFlags: u32 {
        const TEXT_PRESENT = 0x0001;
        const SND_PRESENT = 0x0002;
        const SND_LENGTH_PRESENT = 0x0004;
    }
}

serializable_bitflags!(StringFlags);

/// One `.tlk` file, held in memory. The header is validated eagerly; individual strings
/// are resolved on demand.
#[derive(Debug, Clone)]
pub struct TalkTable {
    image: Vec<u8>,
    string_count: u32,
    string_entries_offset: u32,
}

impl TalkTable {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Opening talk table");
        let image = fs::read(path)
            .with_context(|| format!("cannot read talk table {}", path.display()))?;
        Self::from_image(image, path)
    }

    fn from_image(image: Vec<u8>, path: &Path) -> anyhow::Result<Self> {
        let header = {
            let mut deserializer = Deserializer::from_buffer(image.as_slice());
            deserializer
                .deserialize::<TalkTableHeader>()
                .context("cannot deserialize talk table header")?
        };
        if header.file_type != TLK_TAG || header.version != TLK_VERSION {
            bail!(TlkError::Format {
                path: path.to_owned(),
                tag: header.file_type,
                version: header.version,
            });
        }
        Ok(Self {
            image,
            string_count: header.string_count,
            string_entries_offset: header.string_entries_offset,
        })
    }

    pub fn string_count(&self) -> u32 {
        self.string_count
    }

    /// Resolves the table entry at `index` (already masked down from a string ref).
    ///
    /// An index outside the table is an error, never a silent empty string; silent
    /// fallbacks here have historically hidden masking bugs in callers.
    pub fn get(&self, index: u32) -> anyhow::Result<String> {
        if index >= self.string_count {
            bail!(TlkError::OutOfRange {
                index,
                count: self.string_count,
            });
        }

        let mut deserializer = Deserializer::from_buffer(self.image.as_slice());
        deserializer.seek(SeekFrom::Start(
            HEADER_BYTE_LENGTH + u64::from(index) * ELEMENT_BYTE_LENGTH,
        ))?;
        let element = deserializer
            .deserialize::<StringDataElement>()
            .with_context(|| format!("cannot deserialize string data element {index}"))?;

        if !element.flags.contains(StringFlags::TEXT_PRESENT) {
            return Ok(String::new());
        }

        deserializer.seek(SeekFrom::Start(
            u64::from(self.string_entries_offset) + u64::from(element.offset_to_string),
        ))?;
        let mut bytes = vec![0; element.string_size as usize];
        deserializer
            .read_bytes(&mut bytes)
            .with_context(|| format!("cannot read text of string entry {index}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Policy layer over a required default table and an optional module-specific custom table.
#[derive(Debug, Clone)]
pub struct TlkLookup {
    default: TalkTable,
    custom: Option<TalkTable>,
}

impl TlkLookup {
    pub fn new(default: TalkTable, custom: Option<TalkTable>) -> Self {
        Self { default, custom }
    }

    /// Resolves a raw string ref as stored in a GFF field.
    pub fn lookup(&self, string_ref: u32) -> anyhow::Result<String> {
        if string_ref == NO_STRING_REF {
            return Ok(String::new());
        }

        let index = string_ref & INDEX_MASK;
        if string_ref & CUSTOM_TABLE_BIT != 0 {
            match &self.custom {
                Some(custom) => custom.get(index),
                // A module may reference a custom table that was never installed.
                None => Ok(String::new()),
            }
        } else {
            self.default.get(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use aurorakit_core::binary::{Serialize as _, Serializer};

    use super::*;

    fn table_with(strings: &[Option<&str>]) -> TalkTable {
        let entries_offset = HEADER_BYTE_LENGTH + strings.len() as u64 * ELEMENT_BYTE_LENGTH;
        let mut image = vec![];
        let mut cursor = Cursor::new(&mut image);
        let mut serializer = Serializer::new(&mut cursor);

        let header = TalkTableHeader {
            file_type: TLK_TAG,
            version: TLK_VERSION,
            language_id: 0,
            string_count: strings.len() as u32,
            string_entries_offset: entries_offset as u32,
        };
        header.serialize(&mut serializer).unwrap();

        let mut text_offset = 0u32;
        for string in strings {
            let element = StringDataElement {
                flags: if string.is_some() {
                    StringFlags::TEXT_PRESENT
                } else {
                    StringFlags::empty()
                },
                sound_resref: FixedString::default(),
                volume_variance: 0,
                pitch_variance: 0,
                offset_to_string: text_offset,
                string_size: string.map_or(0, |s| s.len() as u32),
                sound_length: 0.0,
            };
            element.serialize(&mut serializer).unwrap();
            text_offset += string.map_or(0, |s| s.len() as u32);
        }
        for string in strings.iter().flatten() {
            serializer.write_bytes(string.as_bytes()).unwrap();
        }

        TalkTable::from_image(image, Path::new("test.tlk")).unwrap()
    }

    #[test]
    fn resolves_present_text() {
        let table = table_with(&[Some("Hello"), Some("World")]);
        assert_eq!(table.get(0).unwrap(), "Hello");
        assert_eq!(table.get(1).unwrap(), "World");
    }

    #[test]
    fn absent_text_flag_yields_empty() {
        let table = table_with(&[None]);
        assert_eq!(table.get(0).unwrap(), "");
    }

    #[test]
    fn out_of_range_is_an_error() {
        let table = table_with(&[Some("only")]);
        let err = table.get(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TlkError>(),
            Some(TlkError::OutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn no_string_sentinel_reads_nothing() {
        let lookup = TlkLookup::new(table_with(&[]), None);
        assert_eq!(lookup.lookup(NO_STRING_REF).unwrap(), "");
    }

    #[test]
    fn custom_bit_selects_custom_table() {
        let lookup = TlkLookup::new(
            table_with(&[Some("default")]),
            Some(table_with(&[Some("custom")])),
        );
        assert_eq!(lookup.lookup(0).unwrap(), "default");
        assert_eq!(lookup.lookup(CUSTOM_TABLE_BIT).unwrap(), "custom");
    }

    #[test]
    fn missing_custom_table_yields_empty() {
        let lookup = TlkLookup::new(table_with(&[Some("default")]), None);
        assert_eq!(lookup.lookup(CUSTOM_TABLE_BIT).unwrap(), "");
    }

    #[test]
    fn rejects_wrong_version() {
        let mut image = vec![];
        let mut cursor = Cursor::new(&mut image);
        TalkTableHeader {
            file_type: TLK_TAG,
            version: FileTag::new(b"V4.0"),
            language_id: 0,
            string_count: 0,
            string_entries_offset: 20,
        }
        .serialize(&mut Serializer::new(&mut cursor))
        .unwrap();
        let err = TalkTable::from_image(image, Path::new("bad.tlk")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TlkError>(),
            Some(TlkError::Format { .. })
        ));
    }
}
