use std::io::{Read, Write};

use anyhow::Context;

use aurorakit_core::{
    binary::{Deserializer, Serialize as _, Serializer},
    string::FixedString,
    Deserialize, Serialize,
};

/// The maximum length of a resource name, in characters.
pub const RESREF_MAX_LENGTH: usize = 16;

/// A resource name: 16 bytes on disk, NUL padded, unique within an archive, compared
/// case-insensitively. Stored lowercase by convention.
pub type ResRef = FixedString<16>;

/// A resource type code from table 1.3.1 of the Key/BIF documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceType(pub u16);

impl ResourceType {
    pub const SCRIPT_SOURCE: Self = Self(2009);
    pub const SCRIPT_COMPILED: Self = Self(2010);
    pub const AREA: Self = Self(2012);
    pub const MODULE_INFO: Self = Self(2014);
    pub const CREATURE_INSTANCE: Self = Self(2015);
    pub const GAME_INSTANCE: Self = Self(2023);
    pub const ITEM_BLUEPRINT: Self = Self(2025);
    pub const CREATURE_BLUEPRINT: Self = Self(2027);
    pub const CONVERSATION: Self = Self(2029);
    pub const PALETTE: Self = Self(2030);
    pub const TRIGGER_BLUEPRINT: Self = Self(2032);
    pub const SOUND_BLUEPRINT: Self = Self(2035);
    pub const GENERAL_GFF: Self = Self(2037);
    pub const FACTION: Self = Self(2038);
    pub const ENCOUNTER_BLUEPRINT: Self = Self(2040);
    pub const DOOR_BLUEPRINT: Self = Self(2042);
    pub const PLACEABLE_BLUEPRINT: Self = Self(2044);
    pub const INSTANCE_COMMENTS: Self = Self(2046);
    pub const GUI_LAYOUT: Self = Self(2047);
    pub const STORE_BLUEPRINT: Self = Self(2051);
    pub const JOURNAL: Self = Self(2056);
    pub const WAYPOINT_BLUEPRINT: Self = Self(2058);
    pub const PLOT_INSTANCE: Self = Self(2065);

    /// File extension associated with the type code, from table 1.3.1 of the Key/BIF
    /// documentation.
    pub fn extension(self) -> &'static str {
        match self.0 {
            1 => "bmp",
            3 => "tga",
            4 => "wav",
            6 => "plt",
            7 => "ini",
            10 => "txt",
            2002 => "mdl",
            2009 => "nss",
            2010 => "ncs",
            2012 => "are",
            2013 => "set",
            2014 => "ifo",
            2015 => "bic",
            2016 => "wok",
            2017 => "2da",
            2022 => "txi",
            2023 => "git",
            2025 => "uti",
            2027 => "utc",
            2029 => "dlg",
            2030 => "itp",
            2032 => "utt",
            2033 => "dds",
            2035 => "uts",
            2036 => "ltr",
            2037 => "gff",
            2038 => "fac",
            2040 => "ute",
            2042 => "utd",
            2044 => "utp",
            2045 => "dft",
            2046 => "gic",
            2047 => "gui",
            2051 => "utm",
            2052 => "dwk",
            2053 => "pwk",
            2056 => "jrl",
            2058 => "utw",
            2060 => "ssf",
            2064 => "ndb",
            2065 => "ptm",
            2066 => "ptt",
            _ => "n/a",
        }
    }

    /// Whether resources of this type are structured records (GFF files), as opposed to
    /// opaque byte blobs. Based on table 1.3.1 of the Key/BIF documentation.
    pub fn is_record(self) -> bool {
        matches!(
            self,
            Self::AREA
                | Self::MODULE_INFO
                | Self::CREATURE_INSTANCE
                | Self::GAME_INSTANCE
                | Self::ITEM_BLUEPRINT
                | Self::CREATURE_BLUEPRINT
                | Self::CONVERSATION
                | Self::PALETTE
                | Self::TRIGGER_BLUEPRINT
                | Self::SOUND_BLUEPRINT
                | Self::GENERAL_GFF
                | Self::FACTION
                | Self::ENCOUNTER_BLUEPRINT
                | Self::DOOR_BLUEPRINT
                | Self::PLACEABLE_BLUEPRINT
                | Self::INSTANCE_COMMENTS
                | Self::GUI_LAYOUT
                | Self::STORE_BLUEPRINT
                | Self::JOURNAL
                | Self::WAYPOINT_BLUEPRINT
                | Self::PLOT_INSTANCE
        )
    }

    /// Blueprint types have placed instances in the area instance files; editing a
    /// blueprint's script slot must propagate to those instances.
    pub fn is_blueprint(self) -> bool {
        matches!(
            self,
            Self::ITEM_BLUEPRINT
                | Self::CREATURE_BLUEPRINT
                | Self::TRIGGER_BLUEPRINT
                | Self::SOUND_BLUEPRINT
                | Self::ENCOUNTER_BLUEPRINT
                | Self::DOOR_BLUEPRINT
                | Self::PLACEABLE_BLUEPRINT
                | Self::STORE_BLUEPRINT
                | Self::WAYPOINT_BLUEPRINT
        )
    }
}

impl aurorakit_core::binary::Deserialize for ResourceType {
    fn deserialize(deserializer: &mut Deserializer<impl Read>) -> anyhow::Result<Self> {
        Ok(Self(
            deserializer
                .deserialize()
                .context("cannot deserialize resource type code")?,
        ))
    }
}

impl aurorakit_core::binary::Serialize for ResourceType {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        self.0.serialize(serializer)
    }
}

/// One entry of the archive's key table. 24 bytes on disk.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceKey {
    pub resref: ResRef,
    /// Redundant with the entry's position; recomputed as the sorted index at save time.
    pub resource_id: u32,
    pub kind: ResourceType,
    unused: [u8; 2],
}

impl ResourceKey {
    pub fn new(resref: ResRef, kind: ResourceType) -> Self {
        Self {
            resref,
            resource_id: 0,
            kind,
            unused: [0; 2],
        }
    }

    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}
