//! Two-phase record serialization.
//!
//! Sections are written in the fixed order structs, fields, labels, field data, field
//! indices, list indices, each phase reporting how many bytes it consumed so the next
//! phase's offset is known. Only once every section has actually been written is the
//! header written, by seeking back to the start offset; payload lengths may have changed
//! relative to the original parse, so the header cannot be produced any earlier.

use std::io::{Seek, SeekFrom, Write};

use anyhow::{ensure, Context};

use aurorakit_core::binary::{Serialize as _, Serializer};

use crate::{Gff, GffHeader, GFF_VERSION};

/// 14 header slots, 4 bytes each.
const HEADER_BYTE_LENGTH: u32 = 56;

impl Gff {
    /// Writes the record at absolute stream position `start` and returns its total byte
    /// length. All header offsets are relative to `start`. The stream is left positioned
    /// just past the record.
    pub fn serialize(&self, writer: &mut (impl Write + Seek), start: u64) -> anyhow::Result<u64> {
        // Lay out the field data block up front: every payload-bearing field gets a fresh
        // offset, in field order. Offsets from a previous parse are never reused.
        let mut data_offsets = vec![0u32; self.fields.len()];
        let mut field_data_size = 0u32;
        for (i, field) in self.fields.iter().enumerate() {
            if field.kind().has_data_payload() {
                data_offsets[i] = field_data_size;
                field_data_size += field
                    .payload_byte_size()
                    .with_context(|| format!("cannot size payload of field {i}"))?;
            }
        }

        let struct_offset = HEADER_BYTE_LENGTH;
        writer.seek(SeekFrom::Start(start + u64::from(struct_offset)))?;

        let struct_size = self.write_structs(writer)?;
        let field_offset = struct_offset + struct_size;
        let field_size = self.write_fields(writer, &data_offsets)?;
        let label_offset = field_offset + field_size;
        let label_size = self.write_labels(writer)?;
        let field_data_offset = label_offset + label_size;
        let written_data_size = self.write_field_data(writer)?;
        ensure!(
            written_data_size == field_data_size,
            "field data block layout mismatch: planned {field_data_size} bytes, wrote {written_data_size}"
        );
        let field_indices_offset = field_data_offset + field_data_size;
        let field_indices_size = self.write_field_indices(writer)?;
        let list_indices_offset = field_indices_offset + field_indices_size;
        let list_indices_size = self.write_list_indices(writer)?;
        let total = list_indices_offset + list_indices_size;

        let header = GffHeader {
            file_type: self.file_type,
            version: GFF_VERSION,
            struct_offset,
            struct_count: self.structs.len() as u32,
            field_offset,
            field_count: self.fields.len() as u32,
            label_offset,
            label_count: self.labels.len() as u32,
            field_data_offset,
            field_data_size,
            field_indices_offset,
            field_indices_size,
            list_indices_offset,
            list_indices_size,
        };
        writer.seek(SeekFrom::Start(start))?;
        header
            .serialize(&mut Serializer::new(&mut *writer))
            .context("cannot serialize record header")?;
        writer.seek(SeekFrom::Start(start + u64::from(total)))?;

        Ok(u64::from(total))
    }

    fn write_structs(&self, writer: &mut impl Write) -> anyhow::Result<u32> {
        let mut serializer = Serializer::new(writer);
        for s in &self.structs {
            s.serialize(&mut serializer)
                .context("cannot serialize struct")?;
        }
        Ok(self.structs.len() as u32 * 12)
    }

    fn write_fields(&self, writer: &mut impl Write, data_offsets: &[u32]) -> anyhow::Result<u32> {
        let mut serializer = Serializer::new(writer);
        for (i, field) in self.fields.iter().enumerate() {
            let data = if field.kind().has_data_payload() {
                data_offsets[i]
            } else {
                field.data()
            };
            field.kind().raw().serialize(&mut serializer)?;
            field.label_index().serialize(&mut serializer)?;
            data.serialize(&mut serializer)?;
        }
        Ok(self.fields.len() as u32 * 12)
    }

    fn write_labels(&self, writer: &mut impl Write) -> anyhow::Result<u32> {
        let mut serializer = Serializer::new(writer);
        for label in &self.labels {
            label
                .serialize(&mut serializer)
                .with_context(|| format!("cannot serialize label {label:?}"))?;
        }
        Ok(self.labels.len() as u32 * 16)
    }

    fn write_field_data(&self, writer: &mut impl Write) -> anyhow::Result<u32> {
        let mut serializer = Serializer::new(writer);
        let mut written = 0;
        for field in &self.fields {
            if field.kind().has_data_payload() {
                field.write_payload(&mut serializer)?;
                written += field.payload_byte_size()?;
            }
        }
        Ok(written)
    }

    fn write_field_indices(&self, writer: &mut impl Write) -> anyhow::Result<u32> {
        let mut serializer = Serializer::new(writer);
        for index in &self.field_indices {
            index.serialize(&mut serializer)?;
        }
        Ok(self.field_indices.len() as u32 * 4)
    }

    fn write_list_indices(&self, writer: &mut impl Write) -> anyhow::Result<u32> {
        let mut serializer = Serializer::new(writer);
        let mut written = 0;
        for list in &self.list_indices {
            (list.len() as u32).serialize(&mut serializer)?;
            for index in list {
                index.serialize(&mut serializer)?;
            }
            written += (list.len() as u32 + 1) * 4;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use aurorakit_core::binary::Deserializer;
    use aurorakit_tlk::NO_STRING_REF;

    use crate::{
        builder::GffBuilder,
        field::FieldKind,
        locstring::{LocalizedString, Substring},
        Gff,
    };

    fn roundtrip(gff: &Gff) -> Gff {
        let mut buffer = vec![];
        let mut cursor = Cursor::new(&mut buffer);
        let length = gff.serialize(&mut cursor, 0).unwrap();
        assert_eq!(length, buffer.len() as u64);
        Gff::deserialize(&mut Deserializer::from_buffer(buffer.as_slice()), 0, None).unwrap()
    }

    /// Structural equivalence from the roots down: same labels, same kinds, same resolved
    /// values, same list memberships. Raw offsets are allowed to differ.
    fn assert_equivalent(a: &Gff, b: &Gff) {
        assert_eq!(a.file_type(), b.file_type());
        assert_eq!(a.structs().len(), b.structs().len());
        assert_eq!(a.fields().len(), b.fields().len());
        assert_equivalent_structs(a, a.root_index().unwrap(), b, b.root_index().unwrap());
    }

    fn assert_equivalent_structs(a: &Gff, ai: usize, b: &Gff, bi: usize) {
        assert_eq!(a.structs()[ai].type_id, b.structs()[bi].type_id);
        let a_fields = a.struct_fields(ai).unwrap();
        let b_fields = b.struct_fields(bi).unwrap();
        assert_eq!(a_fields.len(), b_fields.len());
        for (&af, &bf) in a_fields.iter().zip(&b_fields) {
            assert_eq!(
                a.field_label(af).unwrap(),
                b.field_label(bf).unwrap()
            );
            let kind = a.fields()[af].kind();
            assert_eq!(kind, b.fields()[bf].kind());
            match kind {
                FieldKind::Struct => assert_equivalent_structs(
                    a,
                    a.field_struct(af).unwrap(),
                    b,
                    b.field_struct(bf).unwrap(),
                ),
                FieldKind::List => {
                    let a_members = a.list_structs(af).unwrap();
                    let b_members = b.list_structs(bf).unwrap();
                    assert_eq!(a_members.len(), b_members.len());
                    for (&am, &bm) in a_members.iter().zip(&b_members) {
                        assert_equivalent_structs(a, am, b, bm);
                    }
                }
                _ => assert_eq!(
                    a.fields()[af].string_data().unwrap(),
                    b.fields()[bf].string_data().unwrap()
                ),
            }
        }
    }

    fn placeable() -> Gff {
        let mut b = GffBuilder::new("UTP ").unwrap();
        let root = b.root();
        b.add_resref(root, "TemplateResRef", "chest001").unwrap();
        b.add_string(root, "Comment", "a test chest").unwrap();
        b.add_dword(root, "Hardness", 5).unwrap();
        b.add_resref(root, "OnUsed", "").unwrap();
        b.add_void(root, "PaletteData", &[1, 2, 3, 4]).unwrap();
        let mut name = LocalizedString::new(NO_STRING_REF);
        name.substrings.push(Substring {
            language_id: 0,
            text: "Chest".to_owned(),
        });
        b.add_locstring(root, "LocName", name).unwrap();
        let list = b.add_list(root, "ItemList").unwrap();
        for i in 0..3 {
            let item = b.add_list_struct(list, i);
            b.add_resref(item, "InventoryRes", &format!("potion{i:02}"))
                .unwrap();
            b.add_dword(item, "Repos_PosX", i).unwrap();
        }
        let second = b.add_list(root, "VarTable").unwrap();
        let var = b.add_list_struct(second, 0);
        b.add_string(var, "Name", "tutorial_done").unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn roundtrip_is_field_for_field_equivalent() {
        let original = placeable();
        let reparsed = roundtrip(&original);
        assert_equivalent(&original, &reparsed);
    }

    #[test]
    fn roundtrip_survives_mutation_that_changes_lengths() {
        let mut original = placeable();
        original
            .set_field("OnUsed", "se_chest001_0")
            .unwrap();
        original
            .set_field("Comment", "a much, much longer comment than before")
            .unwrap();
        let reparsed = roundtrip(&original);
        assert_equivalent(&original, &reparsed);
        assert_eq!(reparsed.string("OnUsed").unwrap(), "se_chest001_0");
    }

    #[test]
    fn single_field_struct_stores_a_direct_field_index() {
        let mut b = GffBuilder::new("GFF ").unwrap();
        let root = b.root();
        b.add_dword(root, "A", 1).unwrap();
        b.add_dword(root, "B", 2).unwrap();
        let child = b.add_struct_field(root, "Child", 7).unwrap();
        b.add_dword(child, "Only", 42).unwrap();
        let gff = roundtrip(&b.finish().unwrap());

        let child_index = gff.field_struct(gff.find_field("Child").unwrap()).unwrap();
        let child_struct = gff.structs()[child_index];
        assert_eq!(child_struct.field_count, 1);
        // A one-field struct points directly into the field array; "Only" is the fourth
        // field overall, so the stored value is the bare index 3.
        assert_eq!(child_struct.data_or_offset, 3);
        assert_eq!(gff.struct_string(child_index, "Only").unwrap(), "42");
    }

    #[test]
    fn multi_field_struct_stores_a_field_index_byte_offset() {
        let mut b = GffBuilder::new("GFF ").unwrap();
        let root = b.root();
        b.add_dword(root, "A", 1).unwrap();
        b.add_dword(root, "B", 2).unwrap();
        b.add_dword(root, "C", 3).unwrap();
        let gff = roundtrip(&b.finish().unwrap());

        let root_struct = gff.structs()[gff.root_index().unwrap()];
        assert_eq!(root_struct.field_count, 3);
        // Three fields resolve through the field indices table at the stored byte offset.
        assert_eq!(root_struct.data_or_offset, 0);
        assert_eq!(
            gff.struct_fields(gff.root_index().unwrap()).unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn locstring_total_size_is_recomputed_after_mutation() {
        let mut gff = placeable();
        // Grow the embedded name, then make sure the reparsed copy sees the new text.
        gff.set_field("LocName", "Chest of Many Wonders").unwrap();
        let reparsed = roundtrip(&gff);
        assert_eq!(
            reparsed.string("LocName").unwrap(),
            "Chest of Many Wonders"
        );
    }
}
