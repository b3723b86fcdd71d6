//! Removal of previously generated content.
//!
//! Every save leaves generated script resources in the archive and their names in script
//! slot fields. Stripping them on load (and again after save) makes repeated save cycles
//! idempotent: the next build always starts from a clean module.

use tracing::debug;

use aurorakit_gff::{field::FieldKind, Gff};

use crate::{entry::ResourceData, Erf};

/// Name prefix of generated script resources.
pub const GENERATED_PREFIX: &str = "se_";
/// Name prefix of generated include resources.
pub const GENERATED_INCLUDE_PREFIX: &str = "i_se_";

/// Whether a resource name follows the generated-name convention.
pub fn is_generated(resref: &str) -> bool {
    resref.starts_with(GENERATED_PREFIX) || resref.starts_with(GENERATED_INCLUDE_PREFIX)
}

/// Recognizer for the field labels that hold script references.
///
/// The authoritative slot list lives in the translator description upstream; this carries
/// the same policy as plain data so the engine has no dependency on that layer.
#[derive(Debug, Clone)]
pub struct ScriptSlots {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl ScriptSlots {
    pub fn new(exact: Vec<String>, prefixes: Vec<String>) -> Self {
        Self { exact, prefixes }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.exact.iter().any(|e| e.eq_ignore_ascii_case(label))
            || self.prefixes.iter().any(|p| {
                label
                    .get(..p.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(p))
            })
    }
}

impl Default for ScriptSlots {
    fn default() -> Self {
        Self {
            exact: ["Active", "EndConversation", "EndConverAbort"]
                .map(String::from)
                .to_vec(),
            prefixes: ["Script", "On"].map(String::from).to_vec(),
        }
    }
}

impl Erf {
    /// Removes every generated resource and clears every script slot that still points at
    /// one. Running this twice yields the same archive as running it once.
    pub fn strip_generated(&mut self) -> anyhow::Result<()> {
        let before = self.entries.len();
        self.entries.retain(|entry| !is_generated(entry.resref()));
        if self.entries.len() != before {
            debug!(
                removed = before - self.entries.len(),
                "Stripped generated resources"
            );
        }

        let slots = &self.slots;
        for entry in &mut self.entries {
            if let ResourceData::Record(gff) = &mut entry.data {
                strip_record(gff, slots)?;
            }
        }
        Ok(())
    }
}

fn strip_record(gff: &mut Gff, slots: &ScriptSlots) -> anyhow::Result<()> {
    let root = gff.root_index()?;
    strip_struct(gff, root, slots)
}

fn strip_struct(gff: &mut Gff, struct_index: usize, slots: &ScriptSlots) -> anyhow::Result<()> {
    for field_index in gff.struct_fields(struct_index)? {
        match gff.fields()[field_index].kind() {
            FieldKind::Struct => {
                let child = gff.field_struct(field_index)?;
                strip_struct(gff, child, slots)?;
            }
            // Recursion descends into list members too; script slots on placed instances
            // and dialogue lines all live inside lists.
            FieldKind::List => {
                for child in gff.list_structs(field_index)? {
                    strip_struct(gff, child, slots)?;
                }
            }
            _ => {
                let label = gff.field_label(field_index)?;
                if slots.matches(label) {
                    let value = gff.fields()[field_index].string_data()?;
                    if is_generated(&value) {
                        gff.set_field_at(field_index, "")?;
                    }
                }
            }
        }
    }
    Ok(())
}
