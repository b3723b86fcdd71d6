use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;
use tracing::{info, warn};
use walkdir::WalkDir;

use aurorakit_erf::{strip::ScriptSlots, Erf};
use aurorakit_pipeline::{BuildPipeline, CompilerConfig};
use aurorakit_tlk::{TalkTable, TlkLookup};

/// Parses a `receiver-id=path` pair from the command line.
pub fn parse_source(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((receiver, path)) if !receiver.is_empty() && !path.is_empty() => {
            Ok((receiver.to_owned(), PathBuf::from(path)))
        }
        _ => Err(format!(
            "expected receiver-id=path (e.g. chest001.UTP=onused.nss), got {value:?}"
        )),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn build(
    filename: &Path,
    compiler: PathBuf,
    sources: Vec<(String, PathBuf)>,
    slot: &str,
    includes: Vec<PathBuf>,
    scripts_dir: Option<PathBuf>,
    tlk: Option<PathBuf>,
    no_compile: bool,
) -> anyhow::Result<()> {
    let tlk = tlk
        .map(TalkTable::open)
        .transpose()
        .context("cannot open talk table")?
        .map(|table| TlkLookup::new(table, None));

    let mut erf = Erf::load(filename, tlk.as_ref(), ScriptSlots::default())
        .context("cannot load module")?;
    let mut pipeline = BuildPipeline::new(CompilerConfig { compiler, includes });

    if let Some(dir) = scripts_dir {
        register_script_directory(&pipeline, &mut erf, &dir)?;
    }

    for (receiver, path) in &sources {
        let code = fs::read_to_string(path)
            .with_context(|| format!("cannot read script source {}", path.display()))?;
        let name = pipeline.add_script(&mut erf, &code, receiver)?;
        pipeline.update_slot(&mut erf, receiver, slot)?;
        info!(%name, %receiver, slot, "Injected script");
    }

    pipeline.save_module(&mut erf, !no_compile)?;
    Ok(())
}

/// Registers every `.nss` file under `dir` as a source resource named after its stem.
fn register_script_directory(
    pipeline: &BuildPipeline,
    erf: &mut Erf,
    dir: &Path,
) -> anyhow::Result<()> {
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("cannot walk {}", dir.display()))?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if stem.starts_with('.') || path.extension().and_then(|e| e.to_str()) != Some("nss") {
            continue;
        }
        let code = match fs::read_to_string(path) {
            Ok(code) => code,
            Err(error) => {
                warn!(?path, %error, "Cannot read script source, skipping it");
                continue;
            }
        };
        pipeline.add_include(erf, &stem.to_lowercase(), &code)?;
        info!(?path, "Registered script source");
    }
    Ok(())
}
