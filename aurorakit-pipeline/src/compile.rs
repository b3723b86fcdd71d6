//! The external script compiler driver.
//!
//! Pending sources are written to a scratch directory under deterministic filenames,
//! declared include files are copied alongside, and the configured compiler runs over a
//! glob of the generated sources with the scratch directory as its working directory.
//! Output only replaces sources in the archive once every expected artifact exists, so a
//! failed compile leaves the archive untouched.

use std::{
    fs,
    path::PathBuf,
    process::{Command, ExitStatus},
};

use anyhow::{bail, Context};
use thiserror::Error;
use tracing::{debug, warn};

use aurorakit_erf::strip::GENERATED_PREFIX;

/// Extension of script source files handed to the compiler.
pub const SOURCE_EXTENSION: &str = "nss";
/// Extension the compiler gives its output files.
pub const COMPILED_EXTENSION: &str = "ncs";

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Path to the external compiler executable.
    pub compiler: PathBuf,
    /// Include files copied into the scratch directory before every compile.
    pub includes: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("there are no pending scripts to compile")]
    NothingToCompile,
    #[error("compiler does not exist at {}", .0.display())]
    CompilerMissing(PathBuf),
    #[error("compiler exited with {status}")]
    CompilerFailed { status: ExitStatus },
    /// The compiler claimed success but one of its expected outputs is absent. A
    /// toolchain inconsistency, not a problem with the user's scripts.
    #[error("compiler reported success but produced no output for {0:?}")]
    MissingOutput(String),
}

/// Compiles `sources` (resource name, source text) pairs and returns the compiled bytes
/// per name, in the same order.
pub fn compile_sources(
    config: &CompilerConfig,
    sources: &[(String, Vec<u8>)],
) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
    if sources.is_empty() {
        bail!(CompileError::NothingToCompile);
    }
    if !config.compiler.exists() {
        bail!(CompileError::CompilerMissing(config.compiler.clone()));
    }

    let scratch = tempfile::tempdir().context("cannot create compilation scratch directory")?;
    for (name, code) in sources {
        let path = scratch.path().join(format!("{name}.{SOURCE_EXTENSION}"));
        fs::write(&path, code)
            .with_context(|| format!("cannot write script source {}", path.display()))?;
    }
    for include in &config.includes {
        let Some(file_name) = include.file_name() else {
            continue;
        };
        if let Err(error) = fs::copy(include, scratch.path().join(file_name)) {
            warn!(?include, %error, "Cannot copy include file, skipping it");
        }
    }

    let source_glob = scratch
        .path()
        .join(format!("{GENERATED_PREFIX}*.{SOURCE_EXTENSION}"));
    debug!(compiler = ?config.compiler, ?source_glob, "Invoking compiler");
    // output() drains both pipes to completion, so a chatty compiler cannot deadlock on
    // a full OS pipe buffer.
    let output = Command::new(&config.compiler)
        .arg(&source_glob)
        .arg(scratch.path())
        .current_dir(scratch.path())
        .output()
        .with_context(|| format!("cannot run compiler {}", config.compiler.display()))?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("compiler: {line}");
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        debug!("compiler: {line}");
    }

    if !output.status.success() {
        bail!(CompileError::CompilerFailed {
            status: output.status
        });
    }

    let mut compiled = Vec::with_capacity(sources.len());
    for (name, _) in sources {
        let path = scratch.path().join(format!("{name}.{COMPILED_EXTENSION}"));
        if !path.exists() {
            bail!(CompileError::MissingOutput(name.clone()));
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("cannot read compiled output {}", path.display()))?;
        compiled.push((name.clone(), bytes));
    }
    Ok(compiled)
}
