use std::{
    fmt::{self, Debug, Display},
    io::{Read, Write},
};

use anyhow::{bail, Context};

use crate::binary::{Deserialize, Deserializer, Serialize, Serializer};

/// A fixed-width string field, `LEN` bytes on disk, padded with `PAD`.
///
/// Trailing padding is stripped on read; both NUL and space padding are accepted regardless
/// of `PAD`, since files written by different tools disagree on which to use.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct FixedString<const LEN: usize, const PAD: u8 = 0> {
    text: String,
}

impl<const LEN: usize, const PAD: u8> FixedString<LEN, PAD> {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl<const LEN: usize, const PAD: u8> TryFrom<&str> for FixedString<LEN, PAD> {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() > LEN {
            bail!("string {value:?} does not fit in {LEN} bytes");
        }
        Ok(Self {
            text: value.to_owned(),
        })
    }
}

impl<const LEN: usize, const PAD: u8> Debug for FixedString<LEN, PAD> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.text, f)
    }
}

impl<const LEN: usize, const PAD: u8> Display for FixedString<LEN, PAD> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.text, f)
    }
}

impl<const LEN: usize, const PAD: u8> Deserialize for FixedString<LEN, PAD> {
    fn deserialize(deserializer: &mut Deserializer<impl Read>) -> anyhow::Result<Self> {
        let mut buf = vec![0; LEN];
        deserializer
            .read_bytes(&mut buf)
            .with_context(|| format!("cannot read fixed {LEN}-byte string"))?;
        while matches!(buf.last(), Some(0) | Some(b' ')) {
            buf.pop();
        }
        let text = String::from_utf8(buf).context("fixed-width string is not valid UTF-8")?;
        Ok(Self { text })
    }
}

impl<const LEN: usize, const PAD: u8> Serialize for FixedString<LEN, PAD> {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> anyhow::Result<()> {
        let bytes = self.text.as_bytes();
        if bytes.len() > LEN {
            bail!("string {:?} does not fit in {LEN} bytes", self.text);
        }
        serializer.write_bytes(bytes)?;
        serializer.write_bytes(&vec![PAD; LEN - bytes.len()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{deserialize, serialize};

    #[test]
    fn pads_and_strips() {
        let name = FixedString::<8, b' '>::try_from("Tag").unwrap();
        let bytes = serialize(&name).unwrap();
        assert_eq!(&bytes, b"Tag     ");
        let back: FixedString<8, b' '> = deserialize(&bytes).unwrap();
        assert_eq!(back.as_str(), "Tag");
    }

    #[test]
    fn accepts_nul_padding_regardless_of_pad_byte() {
        let back: FixedString<8, b' '> = deserialize(b"Tag\0\0\0\0\0").unwrap();
        assert_eq!(back.as_str(), "Tag");
    }

    #[test]
    fn rejects_overlong() {
        assert!(FixedString::<4>::try_from("abcde").is_err());
    }
}
