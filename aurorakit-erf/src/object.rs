//! Typed read views over record shapes, surfaced to the embedding application as generic
//! game resources.

use anyhow::bail;
use tracing::warn;

use aurorakit_gff::Gff;

/// A summary of one blueprint/module/area record: the identity the editor layers work
/// with. Mutation still flows through the record codec, this is a read view only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameObject {
    /// `resref.EXT`, unique across the archive.
    pub template_id: String,
    pub kind: String,
    pub name: String,
    pub tag: String,
}

impl GameObject {
    pub fn from_record(resref: &str, gff: &Gff) -> anyhow::Result<Self> {
        let tag = gff.file_type();
        if kind_of(tag.trimmed()).is_none() {
            bail!("{} records do not generate an object representation", tag);
        }

        Ok(Self {
            template_id: format!("{resref}.{}", tag.trimmed()),
            kind: kind_of(tag.trimmed()).unwrap_or("void").to_owned(),
            name: display_name(resref, gff),
            tag: display_tag(gff),
        })
    }
}

/// Maps a record's type tag to the editor-facing kind name. Unknown tags do not generate
/// objects.
fn kind_of(tag: &str) -> Option<&'static str> {
    Some(match tag.to_ascii_uppercase().as_str() {
        "UTC" => "creature",
        "UTD" => "door",
        "UTE" => "encounter",
        "UTI" => "item",
        "UTM" => "merchant",
        "UTP" => "placeable",
        "UTS" => "sound",
        "UTT" => "trigger",
        "UTW" => "waypoint",
        "DLG" => "dialogue",
        "IFO" => "module",
        "ARE" => "area",
        _ => return None,
    })
}

/// The display name field varies by record type; anything without one falls back to its
/// resource name.
fn display_name(resref: &str, gff: &Gff) -> String {
    let tag = gff.file_type();
    if tag.matches("UTC") {
        let first = gff.string("FirstName").unwrap_or_default();
        let last = gff.string("LastName").unwrap_or_default();
        if last.is_empty() {
            first
        } else {
            format!("{first} {last}")
        }
    } else if tag.matches("UTD") || tag.matches("UTP") || tag.matches("UTM") || tag.matches("UTS") {
        gff.string("LocName").unwrap_or_else(|_| fallback(resref, gff))
    } else if tag.matches("UTI") || tag.matches("UTE") || tag.matches("UTT") || tag.matches("UTW") {
        gff.string("LocalizedName")
            .unwrap_or_else(|_| fallback(resref, gff))
    } else if tag.matches("IFO") {
        gff.string("Mod_Name").unwrap_or_else(|_| fallback(resref, gff))
    } else if tag.matches("ARE") {
        gff.string("Name").unwrap_or_else(|_| fallback(resref, gff))
    } else {
        resref.to_owned()
    }
}

fn fallback(resref: &str, gff: &Gff) -> String {
    warn!(
        resref,
        file_type = %gff.file_type(),
        "Record is missing its display name field"
    );
    resref.to_owned()
}

fn display_tag(gff: &Gff) -> String {
    let label = if gff.file_type().matches("IFO") {
        "Mod_Tag"
    } else {
        "Tag"
    };
    gff.string(label).unwrap_or_default()
}
