mod build;
mod erfdump;
mod gffdump;

use std::path::PathBuf;

use build::{build, parse_source};
use clap::{Parser, Subcommand};
use erfdump::{erfdump, Erfdump};
use gffdump::gffdump;
use tracing::{error, info, metadata::LevelFilter};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Subcommand)]
enum Command {
    /// Read data from a module archive.
    ///
    /// Aurora archive files include .mod, .erf, .sav, .nwm, and .hak files. These are all
    /// the same format, distinguished only by the file tag in the header.
    Erfdump {
        /// Archive to read from.
        filename: PathBuf,

        /// Which part to dump into stdout.
        #[clap(subcommand)]
        what: Erfdump,
    },

    /// Pretty-print one record's field tree.
    Gffdump {
        /// Archive to read from.
        filename: PathBuf,

        /// Name of the record to dump.
        resref: String,
    },

    /// Inject generated scripts into a module, compile them, and save.
    Build {
        /// Module archive to build.
        filename: PathBuf,

        /// Path to the external script compiler.
        #[clap(long)]
        compiler: PathBuf,

        /// Script sources to inject, as receiver-id=path pairs
        /// (e.g. chest001.UTP=onused.nss).
        #[clap(long = "source", value_parser = parse_source)]
        sources: Vec<(String, PathBuf)>,

        /// Slot label the injected scripts attach to.
        #[clap(long, default_value = "OnUsed")]
        slot: String,

        /// Include files copied beside the sources at compile time.
        #[clap(long = "include")]
        includes: Vec<PathBuf>,

        /// Directory of additional script sources to register in the module.
        #[clap(long)]
        scripts_dir: Option<PathBuf>,

        /// Default talk table used to resolve localized strings.
        #[clap(long)]
        tlk: Option<PathBuf>,

        /// Save without running the compiler.
        #[clap(long)]
        no_compile: bool,
    },
}

#[derive(Parser)]
struct Args {
    /// Tool to run.
    #[clap(subcommand)]
    command: Command,
}

fn fallible_main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Erfdump { filename, what } => erfdump(&filename, what)?,
        Command::Gffdump { filename, resref } => gffdump(&filename, &resref)?,
        Command::Build {
            filename,
            compiler,
            sources,
            slot,
            includes,
            scripts_dir,
            tlk,
            no_compile,
        } => build(
            &filename,
            compiler,
            sources,
            &slot,
            includes,
            scripts_dir,
            tlk,
            no_compile,
        )?,
    }

    Ok(())
}

fn main() {
    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().without_time());
    tracing::subscriber::set_global_default(subscriber)
        .expect("cannot set default tracing subscriber");

    info!("Aurora toolkit version {}", env!("CARGO_PKG_VERSION"));

    match fallible_main() {
        Ok(_) => (),
        Err(err) => {
            error!("in fallible_main: {err:?}");
        }
    }
}
