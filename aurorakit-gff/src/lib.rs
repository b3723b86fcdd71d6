//! The generic structured-record codec (GFF).
//!
//! A record is a tree of structs, each holding labelled, typed fields. Variable-length
//! payloads, labels, and list memberships live in shared side tables; fields reference
//! them by offset or index. Offsets are write-time artifacts: they are recomputed from
//! scratch on every serialize and carry no identity.

pub mod builder;
pub mod field;
pub mod locstring;
pub mod writer;

use std::io::{Read, Seek, SeekFrom};

use anyhow::{bail, Context};
use thiserror::Error;
use tracing::{debug, trace};

use aurorakit_core::{
    binary::Deserializer,
    string::FixedString,
    tag::FileTag,
    Deserialize, Serialize,
};
use aurorakit_tlk::TlkLookup;

use field::{FieldKind, GffField};

pub const GFF_VERSION: FileTag = FileTag::new(b"V3.2");

/// The reserved struct type tag marking the root of the tree. All-ones, compared as an
/// unsigned 32-bit value.
pub const ROOT_STRUCT_TYPE: u32 = 0xFFFF_FFFF;

/// Field labels are 16 bytes on disk, space padded.
pub type Label = FixedString<16, b' '>;

#[derive(Debug, Error)]
pub enum GffError {
    #[error("unsupported record version {0} (only V3.2 records can be read)")]
    UnsupportedVersion(FileTag),
    #[error("unknown field type code {0}")]
    UnknownFieldType(u32),
    #[error("record has no field labelled {0:?}")]
    FieldNotFound(String),
    #[error("{table} index {index} is out of range (table length {len})")]
    OutOfRange {
        table: &'static str,
        index: u32,
        len: usize,
    },
    #[error("no list starts at byte offset {0} in the list indices table")]
    ListNotFound(u32),
    #[error("record has no root struct")]
    MissingRoot,
}

/// One struct of a record. 12 bytes on disk, three unsigned words.
///
/// `data_or_offset` has a dual meaning gated strictly by `field_count`: with exactly one
/// field it is a direct index into the field array; with more it is a byte offset into
/// the field indices table covering `field_count` entries. This is not a type tag, so
/// resolution must branch on the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct GffStruct {
    pub type_id: u32,
    pub data_or_offset: u32,
    pub field_count: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct GffHeader {
    pub file_type: FileTag,
    pub version: FileTag,
    pub struct_offset: u32,
    pub struct_count: u32,
    pub field_offset: u32,
    pub field_count: u32,
    pub label_offset: u32,
    pub label_count: u32,
    pub field_data_offset: u32,
    pub field_data_size: u32,
    pub field_indices_offset: u32,
    pub field_indices_size: u32,
    pub list_indices_offset: u32,
    pub list_indices_size: u32,
}

/// One parsed record.
#[derive(Debug, Clone)]
pub struct Gff {
    pub(crate) file_type: FileTag,
    pub(crate) structs: Vec<GffStruct>,
    pub(crate) fields: Vec<GffField>,
    pub(crate) labels: Vec<Label>,
    pub(crate) field_indices: Vec<u32>,
    pub(crate) list_indices: Vec<Vec<u32>>,
}

impl Gff {
    /// Parses a record starting at absolute stream position `start`. All header offsets
    /// are relative to `start`. Payloads of payload-bearing fields are decoded eagerly;
    /// localized strings with no embedded text resolve through `tlk` when one is given.
    pub fn deserialize(
        deserializer: &mut Deserializer<impl Read + Seek>,
        start: u64,
        tlk: Option<&TlkLookup>,
    ) -> anyhow::Result<Self> {
        deserializer.seek(SeekFrom::Start(start))?;
        let header = deserializer
            .deserialize::<GffHeader>()
            .context("cannot deserialize record header")?;
        if header.version != GFF_VERSION {
            bail!(GffError::UnsupportedVersion(header.version));
        }
        trace!(file_type = %header.file_type, "Deserializing record");

        // Labels are read first so that everything after them can be debugged by name.
        deserializer.seek(SeekFrom::Start(start + u64::from(header.label_offset)))?;
        let mut labels = Vec::with_capacity(header.label_count as usize);
        for i in 0..header.label_count {
            labels.push(
                deserializer
                    .deserialize::<Label>()
                    .with_context(|| format!("cannot deserialize label {i}"))?,
            );
        }

        deserializer.seek(SeekFrom::Start(start + u64::from(header.struct_offset)))?;
        let mut structs = Vec::with_capacity(header.struct_count as usize);
        for i in 0..header.struct_count {
            structs.push(
                deserializer
                    .deserialize::<GffStruct>()
                    .with_context(|| format!("cannot deserialize struct {i}"))?,
            );
        }

        deserializer.seek(SeekFrom::Start(start + u64::from(header.field_offset)))?;
        let mut fields = Vec::with_capacity(header.field_count as usize);
        for i in 0..header.field_count {
            let raw_kind = deserializer.deserialize::<u32>()?;
            let label_index = deserializer.deserialize::<u32>()?;
            let data = deserializer.deserialize::<u32>()?;
            let kind = FieldKind::from_raw(raw_kind)
                .with_context(|| format!("field {i} has an invalid type"))?;
            fields.push(GffField::new(kind, label_index, data));
        }
        let field_data_offset = start + u64::from(header.field_data_offset);
        for (i, field) in fields.iter_mut().enumerate() {
            if field.kind().has_data_payload() {
                field
                    .read_payload(deserializer, field_data_offset, tlk)
                    .with_context(|| format!("cannot read payload of field {i}"))?;
            }
        }

        deserializer.seek(SeekFrom::Start(
            start + u64::from(header.field_indices_offset),
        ))?;
        let mut field_indices = Vec::with_capacity(header.field_indices_size as usize / 4);
        let mut bytes_read = 0;
        while bytes_read < header.field_indices_size {
            field_indices.push(deserializer.deserialize::<u32>()?);
            bytes_read += 4;
        }

        deserializer.seek(SeekFrom::Start(
            start + u64::from(header.list_indices_offset),
        ))?;
        let mut list_indices = vec![];
        let mut bytes_read = 0;
        while bytes_read < header.list_indices_size {
            let element_count = deserializer.deserialize::<u32>()?;
            bytes_read += 4;
            let mut elements = Vec::with_capacity(element_count as usize);
            for _ in 0..element_count {
                elements.push(deserializer.deserialize::<u32>()?);
                bytes_read += 4;
            }
            list_indices.push(elements);
        }

        debug!(
            file_type = %header.file_type,
            structs = structs.len(),
            fields = fields.len(),
            labels = labels.len(),
            "Deserialized record"
        );

        Ok(Self {
            file_type: header.file_type,
            structs,
            fields,
            labels,
            field_indices,
            list_indices,
        })
    }

    pub fn file_type(&self) -> FileTag {
        self.file_type
    }

    pub fn structs(&self) -> &[GffStruct] {
        &self.structs
    }

    pub fn fields(&self) -> &[GffField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> anyhow::Result<&GffField> {
        self.fields.get(index).ok_or_else(|| {
            GffError::OutOfRange {
                table: "field",
                index: index as u32,
                len: self.fields.len(),
            }
            .into()
        })
    }

    pub fn label(&self, index: u32) -> anyhow::Result<&str> {
        self.labels
            .get(index as usize)
            .map(Label::as_str)
            .ok_or_else(|| {
                GffError::OutOfRange {
                    table: "label",
                    index,
                    len: self.labels.len(),
                }
                .into()
            })
    }

    pub fn field_label(&self, field_index: usize) -> anyhow::Result<&str> {
        self.label(self.field(field_index)?.label_index())
    }

    /// Index of the unique struct carrying the reserved root type tag.
    pub fn root_index(&self) -> anyhow::Result<usize> {
        self.structs
            .iter()
            .position(|s| s.type_id == ROOT_STRUCT_TYPE)
            .ok_or_else(|| GffError::MissingRoot.into())
    }

    /// Resolves the field indices logically contained in the struct at `struct_index`.
    pub fn struct_fields(&self, struct_index: usize) -> anyhow::Result<Vec<usize>> {
        let s = self.structs.get(struct_index).ok_or(GffError::OutOfRange {
            table: "struct",
            index: struct_index as u32,
            len: self.structs.len(),
        })?;
        match s.field_count {
            0 => Ok(vec![]),
            1 => {
                let index = s.data_or_offset as usize;
                if index >= self.fields.len() {
                    bail!(GffError::OutOfRange {
                        table: "field",
                        index: s.data_or_offset,
                        len: self.fields.len(),
                    });
                }
                Ok(vec![index])
            }
            _ => {
                // A byte offset into the field indices table; each entry is a DWORD.
                let start = (s.data_or_offset / 4) as usize;
                let end = start + s.field_count as usize;
                if end > self.field_indices.len() {
                    bail!(GffError::OutOfRange {
                        table: "field index",
                        index: s.data_or_offset,
                        len: self.field_indices.len(),
                    });
                }
                self.field_indices[start..end]
                    .iter()
                    .map(|&index| {
                        if (index as usize) < self.fields.len() {
                            Ok(index as usize)
                        } else {
                            Err(GffError::OutOfRange {
                                table: "field",
                                index,
                                len: self.fields.len(),
                            }
                            .into())
                        }
                    })
                    .collect()
            }
        }
    }

    /// Finds a field anywhere in the record by label, case-insensitively. A linear scan
    /// of the whole field array; callers must only ask for labels the record's declared
    /// type actually carries.
    pub fn find_field(&self, label: &str) -> anyhow::Result<usize> {
        self.fields
            .iter()
            .position(|field| {
                self.labels
                    .get(field.label_index() as usize)
                    .is_some_and(|l| l.as_str().eq_ignore_ascii_case(label))
            })
            .ok_or_else(|| GffError::FieldNotFound(label.to_owned()).into())
    }

    /// Finds a field within one struct by label, case-insensitively.
    pub fn struct_find_field(&self, struct_index: usize, label: &str) -> anyhow::Result<usize> {
        self.struct_fields(struct_index)?
            .into_iter()
            .find(|&index| {
                self.field_label(index)
                    .is_ok_and(|l| l.eq_ignore_ascii_case(label))
            })
            .ok_or_else(|| GffError::FieldNotFound(label.to_owned()).into())
    }

    pub fn struct_has_field(&self, struct_index: usize, label: &str) -> bool {
        self.struct_find_field(struct_index, label).is_ok()
    }

    /// The struct indices making up the list referenced by the field at `field_index`.
    ///
    /// Lists are stored concatenated, each as a count followed by that many struct
    /// indices, so membership is recovered by a linear scan accumulating byte offsets
    /// until the field's stored offset is matched.
    pub fn list_structs(&self, field_index: usize) -> anyhow::Result<Vec<usize>> {
        let field = self.field(field_index)?;
        if field.kind() != FieldKind::List {
            bail!(
                "field {:?} is a {:?}, not a list",
                self.field_label(field_index).unwrap_or("?"),
                field.kind()
            );
        }

        let mut counted_offset = 0u32;
        for list in &self.list_indices {
            if counted_offset == field.data() {
                return list
                    .iter()
                    .map(|&index| {
                        if (index as usize) < self.structs.len() {
                            Ok(index as usize)
                        } else {
                            Err(GffError::OutOfRange {
                                table: "struct",
                                index,
                                len: self.structs.len(),
                            }
                            .into())
                        }
                    })
                    .collect();
            } else if counted_offset > field.data() {
                break;
            }
            counted_offset += (list.len() as u32 + 1) * 4;
        }
        bail!(GffError::ListNotFound(field.data()))
    }

    /// The struct index referenced by a struct-typed field.
    pub fn field_struct(&self, field_index: usize) -> anyhow::Result<usize> {
        let field = self.field(field_index)?;
        if field.kind() != FieldKind::Struct {
            bail!(
                "field {:?} is a {:?}, not a struct",
                self.field_label(field_index).unwrap_or("?"),
                field.kind()
            );
        }
        let index = field.data() as usize;
        if index >= self.structs.len() {
            bail!(GffError::OutOfRange {
                table: "struct",
                index: field.data(),
                len: self.structs.len(),
            });
        }
        Ok(index)
    }

    /// The value of the record-level field with the given label, rendered as a string.
    pub fn string(&self, label: &str) -> anyhow::Result<String> {
        self.fields[self.find_field(label)?].string_data()
    }

    /// The value of a field within one struct, rendered as a string.
    pub fn struct_string(&self, struct_index: usize, label: &str) -> anyhow::Result<String> {
        self.fields[self.struct_find_field(struct_index, label)?].string_data()
    }

    /// Replaces the value of the record-level field with the given label. Purely an
    /// in-memory mutation; nothing is written through until the archive is saved.
    pub fn set_field(&mut self, label: &str, value: &str) -> anyhow::Result<()> {
        let index = self.find_field(label)?;
        self.set_field_at(index, value)
    }

    pub fn set_field_at(&mut self, field_index: usize, value: &str) -> anyhow::Result<()> {
        let len = self.fields.len();
        self.fields
            .get_mut(field_index)
            .ok_or(GffError::OutOfRange {
                table: "field",
                index: field_index as u32,
                len,
            })?
            .set_string_data(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GffBuilder;

    fn sample() -> Gff {
        let mut b = GffBuilder::new("UTP ").unwrap();
        let root = b.root();
        b.add_resref(root, "TemplateResRef", "chest001").unwrap();
        b.add_resref(root, "OnUsed", "").unwrap();
        b.add_dword(root, "Hardness", 5).unwrap();
        let list = b.add_list(root, "ItemList").unwrap();
        let item = b.add_list_struct(list, 0);
        b.add_resref(item, "InventoryRes", "potion01").unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn find_field_is_case_insensitive() {
        let gff = sample();
        assert!(gff.find_field("onused").is_ok());
        assert!(gff.find_field("ONUSED").is_ok());
    }

    #[test]
    fn missing_field_is_typed() {
        let gff = sample();
        let err = gff.find_field("NoSuchLabel").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GffError>(),
            Some(GffError::FieldNotFound(_))
        ));
    }

    #[test]
    fn set_field_replaces_string_payload() {
        let mut gff = sample();
        gff.set_field("OnUsed", "se_chest001_0").unwrap();
        assert_eq!(gff.string("OnUsed").unwrap(), "se_chest001_0");
    }

    #[test]
    fn set_field_parses_simple_slots() {
        let mut gff = sample();
        gff.set_field("Hardness", "12").unwrap();
        assert_eq!(gff.string("Hardness").unwrap(), "12");
        assert!(gff.set_field("Hardness", "not a number").is_err());
    }

    #[test]
    fn resrefs_are_lowercased() {
        let mut gff = sample();
        gff.set_field("TemplateResRef", "CHEST002").unwrap();
        assert_eq!(gff.string("TemplateResRef").unwrap(), "chest002");
    }

    #[test]
    fn list_membership_resolves_through_offsets() {
        let gff = sample();
        let list_field = gff.find_field("ItemList").unwrap();
        let members = gff.list_structs(list_field).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(
            gff.struct_string(members[0], "InventoryRes").unwrap(),
            "potion01"
        );
    }
}
