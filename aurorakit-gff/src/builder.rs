//! In-memory construction of fresh records.
//!
//! The builder keeps per-struct field lists and per-list member lists in natural form and
//! only flattens them into the on-disk index tables in [`GffBuilder::finish`].

use anyhow::Context;

use aurorakit_core::tag::FileTag;

use crate::{
    field::{FieldKind, FieldPayload, GffField},
    locstring::LocalizedString,
    Gff, GffStruct, Label, ROOT_STRUCT_TYPE,
};

#[derive(Debug, Clone, Copy)]
pub struct StructHandle(usize);

#[derive(Debug, Clone, Copy)]
pub struct ListHandle(usize);

#[derive(Debug)]
pub struct GffBuilder {
    file_type: FileTag,
    structs: Vec<GffStruct>,
    struct_fields: Vec<Vec<usize>>,
    fields: Vec<GffField>,
    labels: Vec<Label>,
    lists: Vec<Vec<u32>>,
    list_fields: Vec<(usize, usize)>,
}

impl GffBuilder {
    pub fn new(file_type: &str) -> anyhow::Result<Self> {
        let mut tag = [b' '; 4];
        let bytes = file_type.as_bytes();
        anyhow::ensure!(bytes.len() <= 4, "record type tag {file_type:?} is too long");
        tag[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            file_type: FileTag::new(&tag),
            structs: vec![GffStruct {
                type_id: ROOT_STRUCT_TYPE,
                data_or_offset: 0,
                field_count: 0,
            }],
            struct_fields: vec![vec![]],
            fields: vec![],
            labels: vec![],
            lists: vec![],
            list_fields: vec![],
        })
    }

    pub fn root(&self) -> StructHandle {
        StructHandle(0)
    }

    fn label_index(&mut self, label: &str) -> anyhow::Result<u32> {
        if let Some(index) = self.labels.iter().position(|l| l.as_str() == label) {
            return Ok(index as u32);
        }
        self.labels.push(
            Label::try_from(label).with_context(|| format!("label {label:?} does not fit"))?,
        );
        Ok(self.labels.len() as u32 - 1)
    }

    fn push_field(&mut self, owner: StructHandle, field: GffField) -> usize {
        let index = self.fields.len();
        self.fields.push(field);
        self.struct_fields[owner.0].push(index);
        index
    }

    pub fn add_dword(&mut self, owner: StructHandle, label: &str, value: u32) -> anyhow::Result<()> {
        let label_index = self.label_index(label)?;
        self.push_field(owner, GffField::new(FieldKind::Dword, label_index, value));
        Ok(())
    }

    pub fn add_string(&mut self, owner: StructHandle, label: &str, text: &str) -> anyhow::Result<()> {
        let label_index = self.label_index(label)?;
        self.push_field(
            owner,
            GffField::with_payload(
                FieldKind::String,
                label_index,
                FieldPayload::String(text.to_owned()),
            ),
        );
        Ok(())
    }

    pub fn add_resref(&mut self, owner: StructHandle, label: &str, name: &str) -> anyhow::Result<()> {
        let label_index = self.label_index(label)?;
        self.push_field(
            owner,
            GffField::with_payload(
                FieldKind::ResRef,
                label_index,
                FieldPayload::ResRef(name.to_lowercase()),
            ),
        );
        Ok(())
    }

    pub fn add_locstring(
        &mut self,
        owner: StructHandle,
        label: &str,
        locstring: LocalizedString,
    ) -> anyhow::Result<()> {
        let label_index = self.label_index(label)?;
        self.push_field(
            owner,
            GffField::with_payload(
                FieldKind::LocString,
                label_index,
                FieldPayload::LocString(locstring),
            ),
        );
        Ok(())
    }

    pub fn add_void(&mut self, owner: StructHandle, label: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let label_index = self.label_index(label)?;
        self.push_field(
            owner,
            GffField::with_payload(
                FieldKind::Void,
                label_index,
                FieldPayload::Void(bytes.to_vec()),
            ),
        );
        Ok(())
    }

    /// Adds a struct-typed field and returns a handle to the new child struct.
    pub fn add_struct_field(
        &mut self,
        owner: StructHandle,
        label: &str,
        type_id: u32,
    ) -> anyhow::Result<StructHandle> {
        let child = self.new_struct(type_id);
        let label_index = self.label_index(label)?;
        self.push_field(
            owner,
            GffField::new(FieldKind::Struct, label_index, child.0 as u32),
        );
        Ok(child)
    }

    /// Adds a list-typed field. Members are attached with [`Self::add_list_struct`].
    pub fn add_list(&mut self, owner: StructHandle, label: &str) -> anyhow::Result<ListHandle> {
        let list = ListHandle(self.lists.len());
        self.lists.push(vec![]);
        let label_index = self.label_index(label)?;
        // The data slot holds the list id until finish() replaces it with the real
        // byte offset into the list indices table.
        let field_index = self.push_field(
            owner,
            GffField::new(FieldKind::List, label_index, list.0 as u32),
        );
        self.list_fields.push((field_index, list.0));
        Ok(list)
    }

    pub fn add_list_struct(&mut self, list: ListHandle, type_id: u32) -> StructHandle {
        let child = self.new_struct(type_id);
        self.lists[list.0].push(child.0 as u32);
        child
    }

    fn new_struct(&mut self, type_id: u32) -> StructHandle {
        self.structs.push(GffStruct {
            type_id,
            data_or_offset: 0,
            field_count: 0,
        });
        self.struct_fields.push(vec![]);
        StructHandle(self.structs.len() - 1)
    }

    /// Flattens the builder state into a record, computing the field-index and list-index
    /// side tables.
    pub fn finish(mut self) -> anyhow::Result<Gff> {
        let mut field_indices: Vec<u32> = vec![];
        for (s, owned) in self.structs.iter_mut().zip(&self.struct_fields) {
            s.field_count = owned.len() as u32;
            s.data_or_offset = match owned.len() {
                0 => 0,
                1 => owned[0] as u32,
                _ => {
                    let byte_offset = field_indices.len() as u32 * 4;
                    field_indices.extend(owned.iter().map(|&i| i as u32));
                    byte_offset
                }
            };
        }

        let mut list_offsets = Vec::with_capacity(self.lists.len());
        let mut running = 0u32;
        for list in &self.lists {
            list_offsets.push(running);
            running += (list.len() as u32 + 1) * 4;
        }
        for &(field_index, list_id) in &self.list_fields {
            self.fields[field_index].set_data(list_offsets[list_id]);
        }

        Ok(Gff {
            file_type: self.file_type,
            structs: self.structs,
            fields: self.fields,
            labels: self.labels,
            field_indices,
            list_indices: self.lists,
        })
    }
}
