//! The build pipeline: turns generated script text into compiled archive resources and
//! keeps every record that references a script consistent.
//!
//! The upstream editor layers supply (script text, receiver id, slot label) tuples; that
//! is the entire surface this crate consumes. A build cycle is add scripts, update
//! slots, compile, save.

pub mod compile;
pub mod name;

use anyhow::Context;
use tracing::{debug, info};

use aurorakit_erf::{dialogue, key::ResourceType, Erf};

pub use compile::{CompileError, CompilerConfig};
pub use name::derive_script_name;

/// A generated script that has not been through the compiler yet.
#[derive(Debug, Clone)]
struct PendingScript {
    name: String,
    receiver: String,
}

pub struct BuildPipeline {
    config: CompilerConfig,
    pending: Vec<PendingScript>,
    counter: u32,
}

impl BuildPipeline {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            pending: vec![],
            counter: 0,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(|script| script.name.as_str())
    }

    /// Registers generated script text as a new source resource, named after the record
    /// that will reference it, and marks it pending compilation. Returns the derived
    /// name.
    pub fn add_script(
        &mut self,
        erf: &mut Erf,
        code: &str,
        receiver_id: &str,
    ) -> anyhow::Result<String> {
        let name = derive_script_name(receiver_id, self.counter);
        self.counter += 1;

        erf.add_raw(&name, ResourceType::SCRIPT_SOURCE, code.as_bytes().to_vec())
            .with_context(|| format!("cannot register script source {name:?}"))?;
        self.pending.push(PendingScript {
            name: name.clone(),
            receiver: receiver_id.to_owned(),
        });
        debug!(%name, receiver_id, "Added script source");
        Ok(name)
    }

    /// Registers a support source (an include file) under its own name, pending nothing;
    /// includes are only ever consumed by the compiler alongside generated sources.
    pub fn add_include(&self, erf: &mut Erf, name: &str, code: &str) -> anyhow::Result<()> {
        erf.add_raw(name, ResourceType::SCRIPT_SOURCE, code.as_bytes().to_vec())
            .with_context(|| format!("cannot register include source {name:?}"))
    }

    /// Points the receiver's script slot at the script most recently generated for it,
    /// and propagates the same change to every placed instance of the receiver.
    ///
    /// The receiver id may carry a `#`-separated index path addressing a dialogue line
    /// inside a conversation record. Propagation is a full scan over every struct of
    /// every record in the archive; there is no maintained index, so the cost is
    /// O(resources x fields) per update.
    pub fn update_slot(&self, erf: &mut Erf, receiver_id: &str, slot: &str) -> anyhow::Result<()> {
        let script = self
            .pending
            .iter()
            .rev()
            .find(|script| script.receiver == receiver_id)
            .with_context(|| format!("no pending script was generated for {receiver_id:?}"))?
            .name
            .clone();

        let (resref, index_path) = parse_receiver_id(receiver_id)?;

        let file_type = {
            let gff = erf.record_mut(&resref)?;
            let field = if !index_path.is_empty() && gff.file_type().matches("DLG") {
                dialogue::slot_field_index(gff, &index_path, slot)?
            } else {
                gff.find_field(slot)?
            };
            gff.set_field_at(field, &script)?;
            gff.file_type()
        };
        debug!(receiver_id, slot, %script, %file_type, "Updated script slot");

        if resource_kind(erf, &resref).is_some_and(ResourceType::is_blueprint) {
            propagate_to_instances(erf, &resref, slot, &script)?;
        }
        Ok(())
    }

    /// Runs the external compiler over every pending source and folds the output back
    /// into the archive. Outputs replace their sources only after all of them exist, so
    /// a failed compile leaves the archive exactly as it was.
    pub fn compile(&mut self, erf: &mut Erf) -> anyhow::Result<()> {
        let sources = self
            .pending
            .iter()
            .map(|script| {
                let bytes = erf
                    .entry(&script.name)
                    .and_then(|entry| entry.raw())
                    .with_context(|| {
                        format!("pending script {:?} is missing from the archive", script.name)
                    })?;
                Ok((script.name.clone(), bytes.to_vec()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let compiled = compile::compile_sources(&self.config, &sources)?;

        for (name, bytes) in compiled {
            erf.remove(&name);
            erf.add_raw(&name, ResourceType::SCRIPT_COMPILED, bytes)
                .with_context(|| format!("cannot register compiled script {name:?}"))?;
        }
        info!(count = self.pending.len(), "Compiled pending scripts");
        self.pending.clear();
        Ok(())
    }

    /// Saves the archive, optionally compiling pending scripts first. The caller may
    /// save without compiling after a failed compile; the archive is still consistent.
    pub fn save_module(&mut self, erf: &mut Erf, compile: bool) -> anyhow::Result<()> {
        if compile && !self.pending.is_empty() {
            self.compile(erf).context("compilation failed")?;
        }
        erf.save()
    }
}

/// Splits a receiver identifier into its resource name and optional index path, e.g.
/// `"convo.DLG#0#1"` into `("convo", [0, 1])`.
fn parse_receiver_id(receiver_id: &str) -> anyhow::Result<(String, Vec<usize>)> {
    let mut parts = receiver_id.split(dialogue::INDEX_SEPARATOR);
    let base = parts.next().unwrap_or(receiver_id);
    let resref = base.rsplit_once('.').map_or(base, |(stem, _)| stem);

    let index_path = parts
        .map(|part| {
            part.parse()
                .with_context(|| format!("{part:?} is not a valid index in {receiver_id:?}"))
        })
        .collect::<anyhow::Result<Vec<usize>>>()?;
    Ok((resref.to_lowercase(), index_path))
}

fn resource_kind(erf: &Erf, resref: &str) -> Option<ResourceType> {
    erf.entry(resref).map(|entry| entry.key.kind)
}

/// Overwrites `slot` in every struct, of every other record, that back-references the
/// template by name and carries the slot. The back-reference is a lookup relation keyed
/// on the stored name, not an ownership edge, so this is a deliberate linear scan.
fn propagate_to_instances(
    erf: &mut Erf,
    template_resref: &str,
    slot: &str,
    script: &str,
) -> anyhow::Result<()> {
    let mut updated = 0;
    for entry in erf.entries_mut() {
        if entry.resref().eq_ignore_ascii_case(template_resref) {
            continue;
        }
        let Some(gff) = entry.record_mut() else {
            continue;
        };
        // Every struct of the record lives in its flat struct array, so a flat scan
        // covers arbitrarily nested instance lists.
        for struct_index in 0..gff.structs().len() {
            let references_template = gff
                .struct_find_field(struct_index, "TemplateResRef")
                .ok()
                .map(|field| gff.fields()[field].string_data())
                .transpose()?
                .is_some_and(|value| value.eq_ignore_ascii_case(template_resref));
            if !references_template {
                continue;
            }
            if let Ok(field) = gff.struct_find_field(struct_index, slot) {
                gff.set_field_at(field, script)?;
                updated += 1;
            }
        }
    }
    debug!(template_resref, slot, updated, "Propagated slot to instances");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use aurorakit_erf::{key::ResourceType, strip::ScriptSlots, Erf};
    use aurorakit_gff::{builder::GffBuilder, Gff};
    use aurorakit_core::tag::FileTag;
    use tempfile::TempDir;

    use super::*;

    const MOD_TAG: FileTag = FileTag::new(b"MOD ");

    fn blueprint(resref: &str) -> Gff {
        let mut b = GffBuilder::new("UTP ").unwrap();
        let root = b.root();
        b.add_resref(root, "TemplateResRef", resref).unwrap();
        b.add_resref(root, "OnUsed", "").unwrap();
        b.finish().unwrap()
    }

    fn instance_file(templates: &[&str]) -> Gff {
        let mut b = GffBuilder::new("GIT ").unwrap();
        let root = b.root();
        let list = b.add_list(root, "Placeable List").unwrap();
        for template in templates {
            let s = b.add_list_struct(list, 9);
            b.add_resref(s, "TemplateResRef", template).unwrap();
            b.add_resref(s, "OnUsed", "").unwrap();
        }
        b.finish().unwrap()
    }

    fn module(dir: &TempDir) -> Erf {
        let mut erf = Erf::create(
            dir.path().join("test.mod"),
            MOD_TAG,
            ScriptSlots::default(),
        );
        erf.add_record(
            "template",
            ResourceType::PLACEABLE_BLUEPRINT,
            blueprint("template"),
        )
        .unwrap();
        erf.add_record(
            "other",
            ResourceType::PLACEABLE_BLUEPRINT,
            blueprint("other"),
        )
        .unwrap();
        erf.add_record(
            "area001",
            ResourceType::GAME_INSTANCE,
            instance_file(&["template", "template", "other"]),
        )
        .unwrap();
        erf
    }

    /// A stub compiler: copies every generated source to its expected output path.
    #[cfg(unix)]
    fn stub_compiler(dir: &TempDir, script: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("compiler.sh");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn pipeline(compiler: std::path::PathBuf) -> BuildPipeline {
        BuildPipeline::new(CompilerConfig {
            compiler,
            includes: vec![],
        })
    }

    fn instance_slots(erf: &Erf) -> Vec<String> {
        let git = erf.record("area001").unwrap();
        let list = git.find_field("Placeable List").unwrap();
        git.list_structs(list)
            .unwrap()
            .into_iter()
            .map(|s| git.struct_string(s, "OnUsed").unwrap())
            .collect()
    }

    #[test]
    fn update_slot_propagates_to_matching_instances_only() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        let mut pipeline = pipeline("unused".into());

        let name = pipeline
            .add_script(&mut erf, "void main() {}", "template.UTP")
            .unwrap();
        assert_eq!(name, "se_template_0");
        pipeline
            .update_slot(&mut erf, "template.UTP", "OnUsed")
            .unwrap();

        assert_eq!(
            erf.record("template").unwrap().string("OnUsed").unwrap(),
            "se_template_0"
        );
        // Exactly the two instances referencing the template change; the third stays.
        assert_eq!(instance_slots(&erf), vec!["se_template_0", "se_template_0", ""]);
        assert_eq!(erf.record("other").unwrap().string("OnUsed").unwrap(), "");
    }

    #[test]
    fn update_slot_reports_missing_receivers() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        let mut pipeline = pipeline("unused".into());
        pipeline
            .add_script(&mut erf, "void main() {}", "ghost.UTP")
            .unwrap();

        let err = pipeline
            .update_slot(&mut erf, "ghost.UTP", "OnUsed")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<aurorakit_erf::ErfError>(),
            Some(aurorakit_erf::ErfError::ResourceNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failed_compile_leaves_the_archive_unmodified() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        let compiler = stub_compiler(&dir, "exit 1");
        let mut pipeline = pipeline(compiler);

        pipeline
            .add_script(&mut erf, "void main() {}", "template.UTP")
            .unwrap();
        let err = pipeline.compile(&mut erf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompileError>(),
            Some(CompileError::CompilerFailed { .. })
        ));

        // The source is still registered and still pending; no output was folded in.
        let entry = erf.entry("se_template_0").unwrap();
        assert_eq!(entry.key.kind, ResourceType::SCRIPT_SOURCE);
        assert_eq!(pipeline.pending().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn missing_output_is_a_distinct_toolchain_error() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        let compiler = stub_compiler(&dir, "exit 0");
        let mut pipeline = pipeline(compiler);

        pipeline
            .add_script(&mut erf, "void main() {}", "template.UTP")
            .unwrap();
        let err = pipeline.compile(&mut erf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompileError>(),
            Some(CompileError::MissingOutput(name)) if name == "se_template_0"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn end_to_end_build_cycle() {
        let dir = TempDir::new().unwrap();
        let mut erf = module(&dir);
        let compiler = stub_compiler(
            &dir,
            r#"for f in se_*.nss; do cp "$f" "${f%.nss}.ncs"; done"#,
        );
        let mut pipeline = pipeline(compiler);

        pipeline
            .add_script(&mut erf, "print(1)", "template.UTP")
            .unwrap();
        pipeline
            .update_slot(&mut erf, "template.UTP", "OnUsed")
            .unwrap();

        assert_eq!(
            erf.record("template").unwrap().string("OnUsed").unwrap(),
            "se_template_0"
        );
        assert_eq!(instance_slots(&erf)[0], "se_template_0");

        pipeline.compile(&mut erf).unwrap();

        // The compiled resource replaced the source.
        let entry = erf.entry("se_template_0").unwrap();
        assert_eq!(entry.key.kind, ResourceType::SCRIPT_COMPILED);
        assert_eq!(entry.raw().unwrap(), b"print(1)".as_slice());
        assert_eq!(pipeline.pending().count(), 0);

        // Saving writes the compiled script out, then strips it from memory so the next
        // build cycle starts clean.
        pipeline.save_module(&mut erf, false).unwrap();
        assert!(erf.entry("se_template_0").is_none());
        assert_eq!(erf.record("template").unwrap().string("OnUsed").unwrap(), "");

        // The saved file still carries everything, and a reload strips it again.
        let saved = fs::read(dir.path().join("test.mod")).unwrap();
        assert!(saved.len() > 160);
        let reloaded = Erf::load(dir.path().join("test.mod"), None, ScriptSlots::default()).unwrap();
        assert!(reloaded.entry("se_template_0").is_none());
    }
}
