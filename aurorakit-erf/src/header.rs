use aurorakit_core::{tag::FileTag, Deserialize, Serialize};

pub const ERF_VERSION: FileTag = FileTag::new(b"V1.0");

/// Header slots plus the 116-byte reserved block.
pub(crate) const HEADER_BYTE_LENGTH: u32 = 160;
pub(crate) const KEY_BYTE_LENGTH: u32 = 24;
pub(crate) const INDEX_ENTRY_BYTE_LENGTH: u32 = 8;

/// The fixed archive header. The build date fields are recomputed on every save; the
/// reserved block is not round-tripped and re-zeroes on save.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErfHeader {
    pub file_type: FileTag,
    pub version: FileTag,
    pub language_count: u32,
    pub localized_string_size: u32,
    pub entry_count: i32,
    pub localized_string_offset: u32,
    pub key_table_offset: u32,
    pub index_table_offset: u32,
    /// Years since 1900.
    pub build_year: u32,
    /// Day of the year.
    pub build_day: u32,
    pub description_str_ref: u32,
    pub reserved: [u8; 116],
}
