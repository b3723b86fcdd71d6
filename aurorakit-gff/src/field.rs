use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::{bail, Context};

use aurorakit_core::binary::{Deserializer, Serialize as _, Serializer};
use aurorakit_tlk::TlkLookup;

use crate::{
    locstring::{LocalizedString, Substring},
    GffError,
};

/// Longest string the field data block will hold, from page 4 of the GFF documentation.
const STRING_MAX_LENGTH: usize = 1024;
/// Resource names are capped at 16 characters and stored lowercase.
const RESREF_MAX_LENGTH: usize = 16;

/// GFF field type codes, from table 3.4 of the GFF documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Byte,
    Char,
    Word,
    Short,
    Dword,
    Int,
    Dword64,
    Int64,
    Float,
    Double,
    String,
    ResRef,
    LocString,
    Void,
    Struct,
    List,
}

impl FieldKind {
    pub fn from_raw(raw: u32) -> anyhow::Result<Self> {
        Ok(match raw {
            0 => Self::Byte,
            1 => Self::Char,
            2 => Self::Word,
            3 => Self::Short,
            4 => Self::Dword,
            5 => Self::Int,
            6 => Self::Dword64,
            7 => Self::Int64,
            8 => Self::Float,
            9 => Self::Double,
            10 => Self::String,
            11 => Self::ResRef,
            12 => Self::LocString,
            13 => Self::Void,
            14 => Self::Struct,
            15 => Self::List,
            _ => bail!(GffError::UnknownFieldType(raw)),
        })
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Byte => 0,
            Self::Char => 1,
            Self::Word => 2,
            Self::Short => 3,
            Self::Dword => 4,
            Self::Int => 5,
            Self::Dword64 => 6,
            Self::Int64 => 7,
            Self::Float => 8,
            Self::Double => 9,
            Self::String => 10,
            Self::ResRef => 11,
            Self::LocString => 12,
            Self::Void => 13,
            Self::Struct => 14,
            Self::List => 15,
        }
    }

    /// Simple kinds store their value inline in the field's data slot.
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            Self::Byte
                | Self::Char
                | Self::Word
                | Self::Short
                | Self::Dword
                | Self::Int
                | Self::Float
        )
    }

    /// Complex kinds whose payload lives in the field data block, i.e. everything that is
    /// neither simple nor a struct/list reference.
    pub fn has_data_payload(self) -> bool {
        !self.is_simple() && !matches!(self, Self::Struct | Self::List)
    }
}

/// One field of a record: 12 bytes of header (type, label index, data slot), plus for
/// payload-bearing kinds the decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GffField {
    kind: FieldKind,
    label_index: u32,
    /// Inline value for simple kinds, struct index for struct kinds, list-table byte
    /// offset for list kinds. For payload-bearing kinds this is the parse-time offset
    /// into the field data block; a fresh offset is computed on every write, so it is
    /// never meaningful after mutation.
    data: u32,
    payload: Option<FieldPayload>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldPayload {
    Dword64(u64),
    Int64(i64),
    Double(f64),
    String(String),
    ResRef(String),
    LocString(LocalizedString),
    Void(Vec<u8>),
}

impl GffField {
    pub fn new(kind: FieldKind, label_index: u32, data: u32) -> Self {
        Self {
            kind,
            label_index,
            data,
            payload: None,
        }
    }

    pub fn with_payload(kind: FieldKind, label_index: u32, payload: FieldPayload) -> Self {
        Self {
            kind,
            label_index,
            data: 0,
            payload: Some(payload),
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn label_index(&self) -> u32 {
        self.label_index
    }

    pub fn data(&self) -> u32 {
        self.data
    }

    pub(crate) fn set_data(&mut self, data: u32) {
        self.data = data;
    }

    pub fn payload(&self) -> Option<&FieldPayload> {
        self.payload.as_ref()
    }

    /// Decodes this field's payload from the field data block. `field_data_offset` is the
    /// absolute stream position of the block.
    pub fn read_payload(
        &mut self,
        deserializer: &mut Deserializer<impl Read + Seek>,
        field_data_offset: u64,
        tlk: Option<&TlkLookup>,
    ) -> anyhow::Result<()> {
        debug_assert!(self.kind.has_data_payload());
        deserializer.seek(SeekFrom::Start(field_data_offset + u64::from(self.data)))?;

        let payload = match self.kind {
            FieldKind::Dword64 => FieldPayload::Dword64(deserializer.deserialize()?),
            FieldKind::Int64 => FieldPayload::Int64(deserializer.deserialize()?),
            FieldKind::Double => FieldPayload::Double(deserializer.deserialize()?),
            FieldKind::String => {
                let length = deserializer.deserialize::<u32>()?;
                let mut bytes = vec![0; length as usize];
                deserializer
                    .read_bytes(&mut bytes)
                    .context("cannot read string field payload")?;
                FieldPayload::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            FieldKind::ResRef => {
                let length = deserializer.deserialize::<u8>()?;
                let mut bytes = vec![0; length as usize];
                deserializer
                    .read_bytes(&mut bytes)
                    .context("cannot read resref field payload")?;
                FieldPayload::ResRef(String::from_utf8_lossy(&bytes).into_owned())
            }
            FieldKind::LocString => {
                // Total byte size first, which we ignore and recompute at write time.
                let _total_size = deserializer.deserialize::<u32>()?;
                let string_ref = deserializer.deserialize::<u32>()?;
                let substring_count = deserializer.deserialize::<u32>()?;

                let mut locstring = LocalizedString::new(string_ref);
                for _ in 0..substring_count {
                    let language_id = deserializer.deserialize::<u32>()?;
                    let length = deserializer.deserialize::<u32>()?;
                    let mut bytes = vec![0; length as usize];
                    deserializer
                        .read_bytes(&mut bytes)
                        .context("cannot read localized substring")?;
                    locstring.substrings.push(Substring {
                        language_id,
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                    });
                }
                // No embedded text means the string lives in the talk table.
                if locstring.substrings.is_empty() {
                    if let Some(tlk) = tlk {
                        locstring.resolved = Some(
                            tlk.lookup(string_ref)
                                .context("cannot resolve string ref through the talk table")?,
                        );
                    }
                }
                FieldPayload::LocString(locstring)
            }
            FieldKind::Void => {
                let length = deserializer.deserialize::<u32>()?;
                let mut bytes = vec![0; length as usize];
                deserializer
                    .read_bytes(&mut bytes)
                    .context("cannot read void field payload")?;
                FieldPayload::Void(bytes)
            }
            _ => unreachable!("simple, struct, and list fields have no data payload"),
        };
        self.payload = Some(payload);
        Ok(())
    }

    /// Size the payload will occupy in the field data block.
    pub fn payload_byte_size(&self) -> anyhow::Result<u32> {
        let payload = self
            .payload
            .as_ref()
            .with_context(|| format!("{:?} field has no payload", self.kind))?;
        Ok(match payload {
            FieldPayload::Dword64(_) | FieldPayload::Int64(_) | FieldPayload::Double(_) => 8,
            FieldPayload::String(text) => 4 + text.len() as u32,
            FieldPayload::ResRef(name) => 1 + name.len() as u32,
            FieldPayload::LocString(locstring) => 4 + locstring.byte_size(),
            FieldPayload::Void(bytes) => 4 + bytes.len() as u32,
        })
    }

    /// Encodes the payload into the field data block. Must write exactly
    /// [`Self::payload_byte_size`] bytes.
    pub fn write_payload(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        let payload = self
            .payload
            .as_ref()
            .with_context(|| format!("{:?} field has no payload", self.kind))?;
        match payload {
            FieldPayload::Dword64(value) => value.serialize(serializer)?,
            FieldPayload::Int64(value) => value.serialize(serializer)?,
            FieldPayload::Double(value) => value.serialize(serializer)?,
            FieldPayload::String(text) => {
                (text.len() as u32).serialize(serializer)?;
                serializer.write_bytes(text.as_bytes())?;
            }
            FieldPayload::ResRef(name) => {
                (name.len() as u8).serialize(serializer)?;
                serializer.write_bytes(name.as_bytes())?;
            }
            FieldPayload::LocString(locstring) => {
                locstring.byte_size().serialize(serializer)?;
                locstring.string_ref.serialize(serializer)?;
                (locstring.substrings.len() as u32).serialize(serializer)?;
                for substring in &locstring.substrings {
                    substring.language_id.serialize(serializer)?;
                    (substring.text.len() as u32).serialize(serializer)?;
                    serializer.write_bytes(substring.text.as_bytes())?;
                }
            }
            FieldPayload::Void(bytes) => {
                (bytes.len() as u32).serialize(serializer)?;
                serializer.write_bytes(bytes)?;
            }
        }
        Ok(())
    }

    /// The field's value rendered as a string. Simple kinds render their inline word;
    /// struct and list kinds have no scalar value.
    pub fn string_data(&self) -> anyhow::Result<String> {
        if self.kind.is_simple() {
            return Ok(self.data.to_string());
        }
        let payload = self
            .payload
            .as_ref()
            .with_context(|| format!("{:?} field has no payload", self.kind))?;
        Ok(match payload {
            FieldPayload::Dword64(value) => value.to_string(),
            FieldPayload::Int64(value) => value.to_string(),
            FieldPayload::Double(value) => value.to_string(),
            FieldPayload::String(text) => text.clone(),
            FieldPayload::ResRef(name) => name.clone(),
            FieldPayload::LocString(locstring) => locstring.text(),
            FieldPayload::Void(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        })
    }

    /// Replaces the field's value from a string. Simple kinds parse the numeric slot in
    /// place; payload-bearing kinds replace the in-memory payload, and the data offset is
    /// recomputed at the next serialize.
    pub fn set_string_data(&mut self, value: &str) -> anyhow::Result<()> {
        if self.kind.is_simple() {
            self.data = value
                .parse()
                .with_context(|| format!("cannot store {value:?} in a {:?} field", self.kind))?;
            return Ok(());
        }
        match self.kind {
            FieldKind::Struct | FieldKind::List => {
                bail!(
                    "cannot assign a value to a {:?} field; it references other structs",
                    self.kind
                )
            }
            FieldKind::Dword64 => self.payload = Some(FieldPayload::Dword64(value.parse()?)),
            FieldKind::Int64 => self.payload = Some(FieldPayload::Int64(value.parse()?)),
            FieldKind::Double => self.payload = Some(FieldPayload::Double(value.parse()?)),
            FieldKind::String => {
                let mut text = value.to_owned();
                text.truncate(STRING_MAX_LENGTH);
                self.payload = Some(FieldPayload::String(text));
            }
            FieldKind::ResRef => {
                let mut name = value.to_lowercase();
                name.truncate(RESREF_MAX_LENGTH);
                self.payload = Some(FieldPayload::ResRef(name));
            }
            FieldKind::LocString => match &mut self.payload {
                Some(FieldPayload::LocString(locstring)) => locstring.set_text(value)?,
                _ => {
                    let mut locstring = LocalizedString::new(aurorakit_tlk::NO_STRING_REF);
                    locstring.set_text(value)?;
                    self.payload = Some(FieldPayload::LocString(locstring));
                }
            },
            FieldKind::Void => self.payload = Some(FieldPayload::Void(value.as_bytes().to_vec())),
            _ => unreachable!(),
        }
        Ok(())
    }
}
