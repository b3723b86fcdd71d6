//! Views over branching conversation records (`DLG`).
//!
//! A conversation stores its NPC lines in `EntryList` and player lines in `ReplyList`.
//! Links between them go through sync structs, which reference a line by its `Index`
//! into the opposite list. A line within the tree is addressed by a path of indices
//! alternating NPC/player depth, joined with `#` in receiver identifiers.

use anyhow::{bail, Context};

use aurorakit_gff::Gff;

pub const NPC_ENTRY_LIST: &str = "EntryList";
pub const PLAYER_REPLY_LIST: &str = "ReplyList";
pub const STARTING_LIST: &str = "StartingList";

/// Separator between a resource name and its index path in a receiver identifier.
/// Must never be a character that can occur in a resource name.
pub const INDEX_SEPARATOR: char = '#';

/// A read view over one conversation record.
pub struct Conversation<'a> {
    gff: &'a Gff,
}

impl<'a> Conversation<'a> {
    pub fn new(gff: &'a Gff) -> anyhow::Result<Self> {
        if !gff.file_type().matches("DLG") {
            bail!("{} record is not a conversation", gff.file_type());
        }
        Ok(Self { gff })
    }

    /// Resolves an index path to the line's sync struct.
    pub fn line(&self, path: &[usize]) -> anyhow::Result<DialogueLine> {
        let struct_index = line_struct(self.gff, path)?;
        Ok(DialogueLine {
            struct_index,
            // Lines alternate NPC, player, NPC, ... so an even path length lands on a
            // player line.
            is_player_line: path.len() % 2 == 0,
        })
    }
}

/// One line of a conversation, located by its sync struct.
#[derive(Debug, Clone, Copy)]
pub struct DialogueLine {
    pub struct_index: usize,
    pub is_player_line: bool,
}

impl DialogueLine {
    /// The spoken text, read from the dialogue struct the sync struct points at.
    pub fn text(&self, gff: &Gff) -> anyhow::Result<String> {
        let dialogue = resolve_sync_struct(gff, self.struct_index, self.is_player_line)?;
        gff.struct_string(dialogue, "Text")
    }
}

/// Follows a sync struct to the dialogue struct it references: the `Index` field selects
/// into the top-level entry or reply list.
fn resolve_sync_struct(
    gff: &Gff,
    sync_index: usize,
    is_player_line: bool,
) -> anyhow::Result<usize> {
    let list_label = if is_player_line {
        PLAYER_REPLY_LIST
    } else {
        NPC_ENTRY_LIST
    };
    let index: usize = gff
        .struct_string(sync_index, "Index")
        .context("sync struct has no Index field")?
        .parse()
        .context("sync struct Index is not a number")?;

    let list_field = gff.find_field(list_label)?;
    let members = gff.list_structs(list_field)?;
    members.get(index).copied().with_context(|| {
        format!("sync struct references {list_label}[{index}] but the list has {} members", members.len())
    })
}

/// Walks an index path from the starting list down to a line's sync struct.
fn line_struct(gff: &Gff, path: &[usize]) -> anyhow::Result<usize> {
    let (&first, rest) = path
        .split_first()
        .context("dialogue line path is empty")?;

    let starting = gff.find_field(STARTING_LIST)?;
    let roots = gff.list_structs(starting)?;
    let mut sync = roots
        .get(first)
        .copied()
        .with_context(|| format!("starting list has no entry {first}"))?;

    for (depth, &index) in rest.iter().enumerate() {
        let i = depth + 1;
        let is_player_line = i % 2 == 0;
        let child_label = if is_player_line {
            NPC_ENTRY_LIST_CHILD
        } else {
            PLAYER_REPLY_LIST_CHILD
        };
        let dialogue = resolve_sync_struct(gff, sync, is_player_line)?;
        let child_field = gff.struct_find_field(dialogue, child_label)?;
        let children = gff.list_structs(child_field)?;
        sync = children
            .get(index)
            .copied()
            .with_context(|| format!("{child_label} has no entry {index}"))?;
    }
    Ok(sync)
}

/// Child sync-struct lists inside a dialogue struct, pointing at the next depth.
const NPC_ENTRY_LIST_CHILD: &str = "EntriesList";
const PLAYER_REPLY_LIST_CHILD: &str = "RepliesList";

/// The field a script slot assignment should land on for the line at `path`.
///
/// `Active` (the line's condition) lives on the sync struct itself; every other slot
/// lives on the dialogue struct the sync struct resolves to.
pub fn slot_field_index(gff: &Gff, path: &[usize], slot: &str) -> anyhow::Result<usize> {
    let sync = line_struct(gff, path)?;
    let is_player_line = path.len() % 2 == 0;

    if slot.eq_ignore_ascii_case("Active") {
        gff.struct_find_field(sync, slot)
    } else {
        let dialogue = resolve_sync_struct(gff, sync, is_player_line)?;
        gff.struct_find_field(dialogue, slot)
    }
}

#[cfg(test)]
mod tests {
    use aurorakit_gff::builder::GffBuilder;

    use super::*;

    /// One NPC entry ("Hello") with one player reply ("Hi yourself").
    fn conversation() -> Gff {
        let mut b = GffBuilder::new("DLG ").unwrap();
        let root = b.root();

        let entries = b.add_list(root, NPC_ENTRY_LIST).unwrap();
        let entry = b.add_list_struct(entries, 0);
        b.add_string(entry, "Text", "Hello").unwrap();
        b.add_resref(entry, "Script", "").unwrap();
        let replies_of_entry = b.add_list(entry, PLAYER_REPLY_LIST_CHILD).unwrap();
        let reply_sync = b.add_list_struct(replies_of_entry, 0);
        b.add_dword(reply_sync, "Index", 0).unwrap();
        b.add_resref(reply_sync, "Active", "").unwrap();

        let replies = b.add_list(root, PLAYER_REPLY_LIST).unwrap();
        let reply = b.add_list_struct(replies, 0);
        b.add_string(reply, "Text", "Hi yourself").unwrap();
        b.add_resref(reply, "Script", "").unwrap();

        let starting = b.add_list(root, STARTING_LIST).unwrap();
        let start_sync = b.add_list_struct(starting, 0);
        b.add_dword(start_sync, "Index", 0).unwrap();
        b.add_resref(start_sync, "Active", "").unwrap();

        b.finish().unwrap()
    }

    #[test]
    fn resolves_npc_line_text() {
        let gff = conversation();
        let convo = Conversation::new(&gff).unwrap();
        let line = convo.line(&[0]).unwrap();
        assert!(!line.is_player_line);
        assert_eq!(line.text(&gff).unwrap(), "Hello");
    }

    #[test]
    fn resolves_player_line_text() {
        let gff = conversation();
        let convo = Conversation::new(&gff).unwrap();
        let line = convo.line(&[0, 0]).unwrap();
        assert!(line.is_player_line);
        assert_eq!(line.text(&gff).unwrap(), "Hi yourself");
    }

    #[test]
    fn active_slot_lands_on_the_sync_struct() {
        let mut gff = conversation();
        let field = slot_field_index(&gff, &[0], "Active").unwrap();
        gff.set_field_at(field, "se_convo_0").unwrap();

        // The dialogue struct's Script slot is untouched.
        let convo = Conversation::new(&gff).unwrap();
        let line = convo.line(&[0]).unwrap();
        let dialogue = resolve_sync_struct(&gff, line.struct_index, false).unwrap();
        assert_eq!(gff.struct_string(dialogue, "Script").unwrap(), "");
        assert_eq!(
            gff.struct_string(line.struct_index, "Active").unwrap(),
            "se_convo_0"
        );
    }

    #[test]
    fn script_slot_lands_on_the_dialogue_struct() {
        let mut gff = conversation();
        let field = slot_field_index(&gff, &[0, 0], "Script").unwrap();
        gff.set_field_at(field, "se_convo_1").unwrap();

        let convo = Conversation::new(&gff).unwrap();
        let line = convo.line(&[0, 0]).unwrap();
        let dialogue = resolve_sync_struct(&gff, line.struct_index, true).unwrap();
        assert_eq!(
            gff.struct_string(dialogue, "Script").unwrap(),
            "se_convo_1"
        );
    }
}
