use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context;
use clap::Subcommand;
use tracing::{debug, info};

use aurorakit_core::binary::Deserializer;
use aurorakit_erf::{header::ErfHeader, strip::ScriptSlots, Erf};

#[derive(Clone, Subcommand)]
pub enum Erfdump {
    /// Dump the archive header.
    Summary,

    /// Dump the key table.
    Keys,
}

pub fn erfdump(filename: &Path, dump: Erfdump) -> anyhow::Result<()> {
    match dump {
        Erfdump::Summary => {
            info!(?filename, "Opening archive");
            let reader = BufReader::new(File::open(filename)?);
            let mut deserializer = Deserializer::new(reader)?;

            debug!("Reading header");
            let header = deserializer
                .deserialize::<ErfHeader>()
                .context("cannot deserialize archive header")?;
            println!("{:#?}", header);
        }
        Erfdump::Keys => {
            let erf = Erf::load(filename, None, ScriptSlots::default())
                .context("cannot load archive")?;

            debug!("Printing key table");
            for (i, entry) in erf.entries().iter().enumerate() {
                println!(
                    "{i:6} {:16} .{:3} (type {})",
                    entry.resref(),
                    entry.key.extension(),
                    entry.key.kind.0,
                );
            }
        }
    }

    Ok(())
}
