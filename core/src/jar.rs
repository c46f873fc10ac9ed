//! JAR fan-out: one task per `.class` entry, and the single-class path.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use bumpalo::Bump;
use declass_jvm::ClassFile;
use declass_zip::Archive;
use log::{debug, error};

use crate::apk::RunSummary;
use crate::errors::TaskError;
use crate::java;
use crate::pool::{clamp_workers, WorkerPool};
use crate::task::{class_output_path, ApkContext, TaskKind};

/// Decompile every `.class` entry of a JAR into `out_dir`.
pub fn process_jar(path: &Path, out_dir: &Path, workers: u32) -> Result<RunSummary, TaskError> {
    let archive = Archive::open(fs::read(path)?)?;

    let entries: Vec<String> = archive
        .names()
        .filter(|name| name.ends_with(".class"))
        .map(str::to_owned)
        .collect();
    debug!("{} class entries in {}", entries.len(), path.display());

    let ctx = Arc::new(ApkContext::new(out_dir.to_path_buf(), TaskKind::Decompile));
    let pool = WorkerPool::new(clamp_workers(workers));

    for name in entries {
        let bytes = match archive.read(&name) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("{name}: {err}");
                continue;
            }
        };
        ctx.note_added();
        let ctx_task = Arc::clone(&ctx);
        pool.enqueue(move |arena| {
            if let Err(err) = decompile_class_bytes(arena, &bytes, &ctx_task.out_dir) {
                error!("{name}: {err}");
            }
            ctx_task.note_done();
        });
    }

    pool.join();
    ctx.finish();
    let (added, done) = ctx.counts();
    Ok(RunSummary { added, done })
}

/// Decompile a standalone `.class` file into `out_dir`.
pub fn process_class_file(path: &Path, out_dir: &Path) -> Result<(), TaskError> {
    let bytes = fs::read(path)?;
    let arena = Bump::new();
    decompile_class_bytes(&arena, &bytes, out_dir)
}

fn decompile_class_bytes(arena: &Bump, bytes: &[u8], out_dir: &Path) -> Result<(), TaskError> {
    let class = ClassFile::parse(bytes)?;
    let internal = class.class_name()?.to_owned();
    let text = java::write_class_file(&class, arena)?;

    let path = class_output_path(out_dir, &internal, "java");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}
