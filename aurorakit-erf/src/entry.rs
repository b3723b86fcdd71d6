use aurorakit_core::{Deserialize, Serialize};
use aurorakit_gff::Gff;

use crate::key::ResourceKey;

/// One entry of the archive's index table: where a resource's bytes live. 8 bytes on
/// disk. The offset is relative to the start of the data segment, not the file; both
/// values are save-time artifacts recomputed on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexEntry {
    pub offset: u32,
    pub size: u32,
}

/// One resource held by an archive: a key paired with either raw bytes or a parsed
/// record, never both.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub key: ResourceKey,
    pub data: ResourceData,
}

#[derive(Debug, Clone)]
pub enum ResourceData {
    Raw(Vec<u8>),
    Record(Gff),
}

impl ResourceEntry {
    pub fn resref(&self) -> &str {
        self.key.resref.as_str()
    }

    pub fn is_record(&self) -> bool {
        matches!(self.data, ResourceData::Record(_))
    }

    pub fn record(&self) -> Option<&Gff> {
        match &self.data {
            ResourceData::Record(gff) => Some(gff),
            ResourceData::Raw(_) => None,
        }
    }

    pub fn record_mut(&mut self) -> Option<&mut Gff> {
        match &mut self.data {
            ResourceData::Record(gff) => Some(gff),
            ResourceData::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&[u8]> {
        match &self.data {
            ResourceData::Raw(bytes) => Some(bytes),
            ResourceData::Record(_) => None,
        }
    }
}
