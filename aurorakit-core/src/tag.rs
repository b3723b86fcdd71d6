use std::{
    fmt::{self, Debug, Display},
    io::{Read, Write},
};

use anyhow::Context;

use crate::binary::{Deserialize, Deserializer, Serialize, Serializer};

/// A 4-character file/resource tag, as found at the start of every Aurora file format
/// (`"MOD "`, `"V1.0"`, `"UTP "`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileTag([u8; 4]);

impl FileTag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// The tag with trailing spaces removed, e.g. `"UTP " -> "UTP"`.
    pub fn trimmed(&self) -> &str {
        std::str::from_utf8(&self.0)
            .unwrap_or("????")
            .trim_end_matches(' ')
    }

    /// Case-insensitive comparison against a trimmed tag name.
    pub fn matches(&self, name: &str) -> bool {
        self.trimmed().eq_ignore_ascii_case(name.trim_end_matches(' '))
    }
}

impl Debug for FileTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.trimmed(), f)
    }
}

impl Display for FileTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self.trimmed(), f)
    }
}

impl Deserialize for FileTag {
    fn deserialize(deserializer: &mut Deserializer<impl Read>) -> anyhow::Result<Self> {
        let mut buf = [0; 4];
        deserializer
            .read_bytes(&mut buf)
            .context("cannot read file tag")?;
        Ok(Self(buf))
    }
}

impl Serialize for FileTag {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        serializer.write_bytes(&self.0)
    }
}
