use std::path::Path;

use anyhow::Context;
use tracing::info;

use aurorakit_erf::{strip::ScriptSlots, Erf};
use aurorakit_gff::{field::FieldKind, Gff};

pub fn gffdump(filename: &Path, resref: &str) -> anyhow::Result<()> {
    info!(?filename, resref, "Opening archive");
    let erf = Erf::load(filename, None, ScriptSlots::default()).context("cannot load archive")?;
    let gff = erf.record(resref)?;

    println!("{} ({})", resref, gff.file_type());
    print_struct(gff, gff.root_index()?, 1)?;
    Ok(())
}

fn print_struct(gff: &Gff, struct_index: usize, depth: usize) -> anyhow::Result<()> {
    let indent = depth * 2;
    for field_index in gff.struct_fields(struct_index)? {
        let label = gff.field_label(field_index)?;
        let field = &gff.fields()[field_index];
        match field.kind() {
            FieldKind::Struct => {
                let child = gff.field_struct(field_index)?;
                println!(
                    "{:indent$}{label} (struct, type {})",
                    "",
                    gff.structs()[child].type_id
                );
                print_struct(gff, child, depth + 1)?;
            }
            FieldKind::List => {
                let members = gff.list_structs(field_index)?;
                println!("{:indent$}{label} (list of {})", "", members.len());
                for (i, member) in members.into_iter().enumerate() {
                    println!("{:indent$}  [{i}]", "");
                    print_struct(gff, member, depth + 2)?;
                }
            }
            kind => {
                println!(
                    "{:indent$}{label}: {:?} ({kind:?})",
                    "",
                    field.string_data().unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}
