use anyhow::bail;

use aurorakit_tlk::NO_STRING_REF;

/// A localized string field payload (`CExoLocString`).
///
/// Holds a string ref into the talk table plus any number of substrings embedded directly
/// in the record. Embedded text takes priority over the talk table, which matches what the
/// game's own toolset does.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalizedString {
    pub string_ref: u32,
    pub substrings: Vec<Substring>,
    /// Text resolved from the talk table at parse time. A read-side cache only; it is
    /// never written back to disk.
    pub resolved: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Substring {
    pub language_id: u32,
    pub text: String,
}

impl LocalizedString {
    pub fn new(string_ref: u32) -> Self {
        Self {
            string_ref,
            substrings: vec![],
            resolved: None,
        }
    }

    /// Serialized size in bytes, excluding the leading total-size word itself.
    pub fn byte_size(&self) -> u32 {
        let mut size = 8;
        for substring in &self.substrings {
            size += 8 + substring.text.len() as u32;
        }
        size
    }

    pub fn text(&self) -> String {
        self.substrings
            .iter()
            .find(|substring| substring.language_id == 0)
            .map(|substring| substring.text.clone())
            .or_else(|| self.resolved.clone())
            .unwrap_or_default()
    }

    /// Replaces the embedded text. Only legal for strings that do not resolve through the
    /// talk table; the talk table is read-only.
    pub fn set_text(&mut self, value: &str) -> anyhow::Result<()> {
        if self.string_ref != NO_STRING_REF {
            bail!("cannot set text on a localized string resolved from the talk table (string ref {})", self.string_ref);
        }
        match self
            .substrings
            .iter_mut()
            .find(|substring| substring.language_id == 0)
        {
            Some(substring) => substring.text = value.to_owned(),
            None => self.substrings.push(Substring {
                language_id: 0,
                text: value.to_owned(),
            }),
        }
        Ok(())
    }
}
