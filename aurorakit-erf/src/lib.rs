//! The archive container (ERF).
//!
//! An archive indexes a flat collection of named, typed resources: a key table naming
//! each resource and an index table locating its bytes in the trailing data segment.
//! Structured resources are materialized through the record codec at load; everything
//! else is carried as raw bytes. Saving always rewrites the whole file, backing up the
//! previous contents first.

pub mod dialogue;
pub mod entry;
pub mod header;
pub mod key;
pub mod object;
pub mod strip;

use std::{
    fs,
    io::{Cursor, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context};
use chrono::Datelike;
use thiserror::Error;
use tracing::{debug, info};

use aurorakit_core::{
    binary::{Deserializer, Serialize as _, Serializer},
    tag::FileTag,
};
use aurorakit_gff::Gff;
use aurorakit_tlk::TlkLookup;

use entry::{IndexEntry, ResourceData, ResourceEntry};
use header::{ErfHeader, ERF_VERSION, HEADER_BYTE_LENGTH, INDEX_ENTRY_BYTE_LENGTH, KEY_BYTE_LENGTH};
use key::{ResRef, ResourceKey, ResourceType};
use strip::ScriptSlots;

#[derive(Debug, Error)]
pub enum ErfError {
    #[error("{}: not a supported archive (tag {tag}, version {version})", .path.display())]
    Format {
        path: PathBuf,
        tag: FileTag,
        version: FileTag,
    },
    #[error("archive declares a negative entry count ({0})")]
    NegativeEntryCount(i32),
    #[error("archive has no resource named {0:?}")]
    ResourceNotFound(String),
    #[error("resource {0:?} is a raw resource, not a structured record")]
    NotStructured(String),
}

#[derive(Debug)]
pub struct Erf {
    path: PathBuf,
    file_type: FileTag,
    language_count: u32,
    /// The localized-string blob, passed through save cycles unmodified.
    localized_strings: Vec<u8>,
    description_str_ref: u32,
    pub(crate) entries: Vec<ResourceEntry>,
    pub(crate) slots: ScriptSlots,
}

impl Erf {
    /// Creates an empty archive that will be written to `path` on save.
    pub fn create(path: impl Into<PathBuf>, file_type: FileTag, slots: ScriptSlots) -> Self {
        Self {
            path: path.into(),
            file_type,
            language_count: 0,
            localized_strings: vec![],
            description_str_ref: aurorakit_tlk::NO_STRING_REF,
            entries: vec![],
            slots,
        }
    }

    /// Reads an archive from disk. Structured resources parse through the record codec,
    /// resolving talk-table references through `tlk` when one is given. Generated
    /// content from a previous build cycle is stripped, so loading a previously saved
    /// archive is idempotent.
    pub fn load(
        path: impl Into<PathBuf>,
        tlk: Option<&TlkLookup>,
        slots: ScriptSlots,
    ) -> anyhow::Result<Self> {
        let path = path.into();
        info!(?path, "Loading archive");
        let image = fs::read(&path)
            .with_context(|| format!("cannot read archive {}", path.display()))?;
        let mut deserializer = Deserializer::from_buffer(image.as_slice());

        let header = deserializer
            .deserialize::<ErfHeader>()
            .context("cannot deserialize archive header")?;
        if header.version != ERF_VERSION {
            bail!(ErfError::Format {
                path,
                tag: header.file_type,
                version: header.version,
            });
        }
        if header.entry_count < 0 {
            bail!(ErfError::NegativeEntryCount(header.entry_count));
        }
        let entry_count = header.entry_count as usize;

        deserializer.seek(SeekFrom::Start(u64::from(header.localized_string_offset)))?;
        let mut localized_strings = vec![0; header.localized_string_size as usize];
        deserializer
            .read_bytes(&mut localized_strings)
            .context("cannot read localized string blob")?;

        deserializer.seek(SeekFrom::Start(u64::from(header.key_table_offset)))?;
        let mut keys = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            keys.push(
                deserializer
                    .deserialize::<ResourceKey>()
                    .with_context(|| format!("cannot deserialize key {i}"))?,
            );
        }

        deserializer.seek(SeekFrom::Start(u64::from(header.index_table_offset)))?;
        let mut index = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            index.push(
                deserializer
                    .deserialize::<IndexEntry>()
                    .with_context(|| format!("cannot deserialize index entry {i}"))?,
            );
        }

        // Keys and index entries pair by position; data offsets are relative to the
        // data segment, which starts right after the index table.
        let data_segment = u64::from(header.index_table_offset)
            + entry_count as u64 * u64::from(INDEX_ENTRY_BYTE_LENGTH);

        let mut entries = Vec::with_capacity(entry_count);
        for (key, index_entry) in keys.into_iter().zip(index) {
            // Generated journals belong to the journal feature, which rebuilds them from
            // its own data; they never survive a load.
            if key.kind == ResourceType::JOURNAL {
                debug!(resref = %key.resref, "Skipping journal resource");
                continue;
            }

            let start = data_segment + u64::from(index_entry.offset);
            let data = if key.kind.is_record() {
                let gff = Gff::deserialize(&mut deserializer, start, tlk)
                    .with_context(|| format!("cannot parse record {:?}", key.resref))?;
                ResourceData::Record(gff)
            } else {
                let begin = start as usize;
                let end = begin + index_entry.size as usize;
                ensure!(
                    end <= image.len(),
                    "resource {:?} extends past the end of the archive",
                    key.resref
                );
                ResourceData::Raw(image[begin..end].to_vec())
            };
            entries.push(ResourceEntry { key, data });
        }

        debug!(entries = entries.len(), "Loaded archive");

        let mut erf = Self {
            path,
            file_type: header.file_type,
            language_count: header.language_count,
            localized_strings,
            description_str_ref: header.description_str_ref,
            entries,
            slots,
        };
        erf.strip_generated()
            .context("cannot strip generated content")?;
        Ok(erf)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_type(&self) -> FileTag {
        self.file_type
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ResourceEntry] {
        &mut self.entries
    }

    pub fn script_slots(&self) -> &ScriptSlots {
        &self.slots
    }

    /// Finds a resource by name, case-insensitively.
    pub fn entry(&self, resref: &str) -> Option<&ResourceEntry> {
        self.entries
            .iter()
            .find(|entry| entry.resref().eq_ignore_ascii_case(resref))
    }

    pub fn entry_mut(&mut self, resref: &str) -> Option<&mut ResourceEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.resref().eq_ignore_ascii_case(resref))
    }

    /// The record stored under `resref`, or a typed error naming what went wrong.
    pub fn record(&self, resref: &str) -> anyhow::Result<&Gff> {
        let entry = self
            .entry(resref)
            .ok_or_else(|| ErfError::ResourceNotFound(resref.to_owned()))?;
        entry
            .record()
            .ok_or_else(|| ErfError::NotStructured(resref.to_owned()).into())
    }

    pub fn record_mut(&mut self, resref: &str) -> anyhow::Result<&mut Gff> {
        let entry = self
            .entry_mut(resref)
            .ok_or_else(|| ErfError::ResourceNotFound(resref.to_owned()))?;
        entry
            .record_mut()
            .ok_or_else(|| ErfError::NotStructured(resref.to_owned()).into())
    }

    /// Registers a raw resource. The name is lowercased; a name that is already taken or
    /// does not fit the key table is an error.
    pub fn add_raw(
        &mut self,
        resref: &str,
        kind: ResourceType,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()> {
        let resref = resref.to_lowercase();
        ensure!(
            self.entry(&resref).is_none(),
            "archive already has a resource named {resref:?}"
        );
        let resref = ResRef::try_from(resref.as_str())
            .with_context(|| format!("resource name {resref:?} does not fit the key table"))?;
        self.entries.push(ResourceEntry {
            key: ResourceKey::new(resref, kind),
            data: ResourceData::Raw(bytes),
        });
        Ok(())
    }

    pub fn add_record(&mut self, resref: &str, kind: ResourceType, gff: Gff) -> anyhow::Result<()> {
        let resref = resref.to_lowercase();
        ensure!(
            self.entry(&resref).is_none(),
            "archive already has a resource named {resref:?}"
        );
        let resref = ResRef::try_from(resref.as_str())
            .with_context(|| format!("resource name {resref:?} does not fit the key table"))?;
        self.entries.push(ResourceEntry {
            key: ResourceKey::new(resref, kind),
            data: ResourceData::Record(gff),
        });
        Ok(())
    }

    pub fn remove(&mut self, resref: &str) -> Option<ResourceEntry> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.resref().eq_ignore_ascii_case(resref))?;
        Some(self.entries.remove(position))
    }

    /// Writes the archive back to its path. The previous file contents are copied to a
    /// `.bak` sibling first; any failure after that point leaves the backup as the
    /// recovery mechanism. After a successful write the generated content from this
    /// build cycle is stripped again so the next cycle starts clean.
    pub fn save(&mut self) -> anyhow::Result<()> {
        if self.path.exists() {
            let backup = self.path.with_extension("bak");
            info!(?backup, "Backing up archive");
            fs::copy(&self.path, &backup)
                .with_context(|| format!("cannot back up archive to {}", backup.display()))?;
        }

        let image = self.write_image().context("cannot serialize archive")?;
        fs::write(&self.path, &image)
            .with_context(|| format!("cannot write archive {}", self.path.display()))?;
        info!(path = ?self.path, bytes = image.len(), "Saved archive");

        self.strip_generated()
            .context("cannot strip generated content after save")?;
        Ok(())
    }

    /// Assembles the full archive image in memory: placeholder header and index table
    /// first, then the data segment threading a running offset forward, then a seek back
    /// to write the index table and header once every offset and size is known.
    fn write_image(&mut self) -> anyhow::Result<Vec<u8>> {
        // The target reader requires entries ordered by name, then extension.
        self.entries.sort_by(|a, b| {
            let by_name = a.resref().to_uppercase().cmp(&b.resref().to_uppercase());
            by_name.then_with(|| a.key.extension().cmp(b.key.extension()))
        });
        for (id, entry) in self.entries.iter_mut().enumerate() {
            entry.key.resource_id = id as u32;
        }

        let entry_count = self.entries.len() as u32;
        let localized_string_offset = HEADER_BYTE_LENGTH;
        let key_table_offset = localized_string_offset + self.localized_strings.len() as u32;
        let index_table_offset = key_table_offset + entry_count * KEY_BYTE_LENGTH;
        let data_segment = index_table_offset + entry_count * INDEX_ENTRY_BYTE_LENGTH;

        let mut image = vec![];
        let mut cursor = Cursor::new(&mut image);

        let today = chrono::Local::now();
        let mut header = ErfHeader {
            file_type: self.file_type,
            version: ERF_VERSION,
            language_count: self.language_count,
            localized_string_size: self.localized_strings.len() as u32,
            entry_count: entry_count as i32,
            localized_string_offset: 0,
            key_table_offset: 0,
            index_table_offset: 0,
            build_year: today.year().saturating_sub(1900) as u32,
            build_day: today.ordinal(),
            description_str_ref: self.description_str_ref,
            reserved: [0; 116],
        };
        header
            .serialize(&mut Serializer::new(&mut cursor))
            .context("cannot serialize placeholder header")?;

        Serializer::new(&mut cursor).write_bytes(&self.localized_strings)?;

        for entry in &self.entries {
            entry
                .key
                .serialize(&mut Serializer::new(&mut cursor))
                .with_context(|| format!("cannot serialize key for {:?}", entry.resref()))?;
        }

        // Index entries cannot be final yet; sizes are only known once the data is
        // actually serialized.
        let index_table_position = cursor.position();
        for _ in &self.entries {
            IndexEntry { offset: 0, size: 0 }.serialize(&mut Serializer::new(&mut cursor))?;
        }

        let mut index = Vec::with_capacity(self.entries.len());
        let mut data_offset = 0u32;
        for entry in &self.entries {
            let start = u64::from(data_segment) + u64::from(data_offset);
            let size = match &entry.data {
                ResourceData::Raw(bytes) => {
                    cursor.seek(SeekFrom::Start(start))?;
                    Serializer::new(&mut cursor).write_bytes(bytes)?;
                    bytes.len() as u32
                }
                ResourceData::Record(gff) => gff
                    .serialize(&mut cursor, start)
                    .with_context(|| format!("cannot serialize record {:?}", entry.resref()))?
                    as u32,
            };
            index.push(IndexEntry {
                offset: data_offset,
                size,
            });
            data_offset += size;
        }

        cursor.set_position(index_table_position);
        for index_entry in &index {
            index_entry.serialize(&mut Serializer::new(&mut cursor))?;
        }

        header.localized_string_offset = localized_string_offset;
        header.key_table_offset = key_table_offset;
        header.index_table_offset = index_table_offset;
        cursor.set_position(0);
        header
            .serialize(&mut Serializer::new(&mut cursor))
            .context("cannot serialize archive header")?;

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use aurorakit_gff::builder::GffBuilder;
    use tempfile::TempDir;

    use super::*;
    use crate::object::GameObject;

    const MOD_TAG: FileTag = FileTag::new(b"MOD ");

    fn placeable(resref: &str, on_used: &str) -> Gff {
        let mut b = GffBuilder::new("UTP ").unwrap();
        let root = b.root();
        b.add_resref(root, "TemplateResRef", resref).unwrap();
        b.add_resref(root, "OnUsed", on_used).unwrap();
        b.add_resref(root, "Tag", resref).unwrap();
        b.finish().unwrap()
    }

    fn instance_file(instances: &[(&str, &str)]) -> Gff {
        let mut b = GffBuilder::new("GIT ").unwrap();
        let root = b.root();
        let list = b.add_list(root, "Placeable List").unwrap();
        for (template, on_used) in instances {
            let s = b.add_list_struct(list, 9);
            b.add_resref(s, "TemplateResRef", template).unwrap();
            b.add_resref(s, "OnUsed", on_used).unwrap();
        }
        b.finish().unwrap()
    }

    fn module(dir: &TempDir) -> Erf {
        let mut erf = Erf::create(
            dir.path().join("test.mod"),
            MOD_TAG,
            ScriptSlots::default(),
        );
        erf.add_record(
            "chest001",
            ResourceType::PLACEABLE_BLUEPRINT,
            placeable("chest001", "se_chest001_0"),
        )
        .unwrap();
        erf.add_record(
            "area001",
            ResourceType::GAME_INSTANCE,
            instance_file(&[("chest001", "se_chest001_0"), ("door001", "custom_script")]),
        )
        .unwrap();
        erf.add_raw(
            "se_chest001_0",
            ResourceType::SCRIPT_COMPILED,
            vec![0xde, 0xad],
        )
        .unwrap();
        erf.add_raw("readme", ResourceType(10), b"hello".to_vec())
            .unwrap();
        erf
    }

    #[test]
    fn strip_removes_generated_resources_and_slot_references() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        erf.strip_generated().unwrap();

        assert!(erf.entry("se_chest001_0").is_none());
        assert_eq!(erf.record("chest001").unwrap().string("OnUsed").unwrap(), "");
        // The reference inside the instance list must be cleared too.
        let git = erf.record("area001").unwrap();
        let list = git.find_field("Placeable List").unwrap();
        let members = git.list_structs(list).unwrap();
        assert_eq!(git.struct_string(members[0], "OnUsed").unwrap(), "");
        // Non-generated scripts survive.
        assert_eq!(
            git.struct_string(members[1], "OnUsed").unwrap(),
            "custom_script"
        );
    }

    #[test]
    fn strip_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut once = module(&dir);
        once.strip_generated().unwrap();
        let mut twice = module(&dir);
        twice.strip_generated().unwrap();
        twice.strip_generated().unwrap();

        assert_eq!(once.entries().len(), twice.entries().len());
        for (a, b) in once.entries().iter().zip(twice.entries()) {
            assert_eq!(a.resref(), b.resref());
            match (a.record(), b.record()) {
                (Some(ga), Some(gb)) => {
                    for (fa, fb) in ga.fields().iter().zip(gb.fields()) {
                        if !matches!(
                            fa.kind(),
                            aurorakit_gff::field::FieldKind::Struct
                                | aurorakit_gff::field::FieldKind::List
                        ) {
                            assert_eq!(fa.string_data().unwrap(), fb.string_data().unwrap());
                        }
                        assert_eq!(fa.kind(), fb.kind());
                    }
                }
                (None, None) => {}
                _ => panic!("entry {:?} changed shape", a.resref()),
            }
        }
    }

    #[test]
    fn save_then_load_roundtrips_and_backs_up() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        let path = erf.path().to_owned();
        erf.save().unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("bak").exists());

        // Saving again backs up the first save.
        erf.save().unwrap();
        assert!(path.with_extension("bak").exists());

        let reloaded = Erf::load(&path, None, ScriptSlots::default()).unwrap();
        // Generated resources were stripped before the second save, and again on load.
        assert!(reloaded.entry("se_chest001_0").is_none());
        assert!(reloaded.entry("readme").is_some());
        assert_eq!(
            reloaded.record("chest001").unwrap().string("Tag").unwrap(),
            "chest001"
        );
        // Entries come back sorted by name.
        let names: Vec<_> = reloaded.entries().iter().map(|e| e.resref().to_owned()).collect();
        let mut sorted = names.clone();
        sorted.sort_by_key(|n| n.to_uppercase());
        assert_eq!(names, sorted);
    }

    #[test]
    fn typed_errors_distinguish_missing_from_unstructured() {
        let dir = TempDir::new().unwrap();
        let erf = module(&dir);

        let missing = erf.record("nope").unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<ErfError>(),
            Some(ErfError::ResourceNotFound(_))
        ));

        let raw = erf.record("readme").unwrap_err();
        assert!(matches!(
            raw.downcast_ref::<ErfError>(),
            Some(ErfError::NotStructured(_))
        ));
    }

    #[test]
    fn load_rejects_wrong_version() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        erf.save().unwrap();
        let path = erf.path().to_owned();

        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(b"V2.0");
        fs::write(&path, &bytes).unwrap();

        let err = Erf::load(&path, None, ScriptSlots::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ErfError>(),
            Some(ErfError::Format { .. })
        ));
    }

    #[test]
    fn game_objects_surface_blueprints() {
        let dir = TempDir::new().unwrap();
        let erf = module(&dir);
        let object = GameObject::from_record("chest001", erf.record("chest001").unwrap()).unwrap();
        assert_eq!(object.kind, "placeable");
        assert_eq!(object.tag, "chest001");
        assert_eq!(object.template_id, "chest001.UTP");
    }
}
